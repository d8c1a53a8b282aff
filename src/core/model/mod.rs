//! Compiled model description consumed by the engine.

pub mod equation_set;
pub mod expr;
pub mod variable;

pub use equation_set::{ConnectionBinding, EquationSet, Hop, PartBuilder, VariableReference};
pub use expr::{BinaryOp, Expr, InputMode, UnaryOp};
pub use variable::{Combiner, Equation, Scope, Slot, Storage, Variable};
