pub mod core;

// Re-export commonly used types
pub use crate::core::builder::Simulation;
pub use crate::core::errors::{Result, SimError};
pub use crate::core::execution::{InstanceSnapshot, SimulationConfig, Simulator};
pub use crate::core::model::{
    BinaryOp, Combiner, ConnectionBinding, Equation, EquationSet, Expr, Hop, InputMode, PartBuilder,
    Scope, UnaryOp, Variable,
};
pub use crate::core::types::{InstanceId, RefId, VarId};
pub use crate::core::values::{Matrix, Value};
