pub mod config;
pub(crate) mod resources;
pub mod simulator;

// Re-export commonly used types
pub use config::SimulationConfig;
pub use simulator::{InstanceSnapshot, Instances, Simulator};
