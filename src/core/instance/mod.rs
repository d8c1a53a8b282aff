//! Instances and their lifecycle.
//!
//! `Store` owns every part and population of a run. The lifecycle phases are
//! `impl Simulator` blocks spread over `part`, `population` and `connect`.

pub(crate) mod connect;
pub(crate) mod eval;
pub mod instance;
pub(crate) mod part;
pub(crate) mod population;
pub mod store;

pub use eval::Phase;
pub use instance::{Instance, Role, Roster};
pub use store::Store;
