use super::expr::Expr;
use crate::core::errors::Result;
use crate::core::types::{RefId, VarId};
use crate::core::values::{Matrix, Value};
use serde::{Deserialize, Serialize};

/// How a new result merges into the value already buffered for a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Combiner {
    #[default]
    Replace,
    Add,
    Multiply,
    Divide,
    Min,
    Max,
}

impl Combiner {
    /// Accumulator identity shaped like `like`. `Replace` has none.
    pub fn identity(&self, like: &Value) -> Option<Value> {
        let matrix = match like {
            Value::Matrix(m) => Some(m),
            _ => None,
        };
        let value = match self {
            Combiner::Replace => return None,
            Combiner::Add => match matrix {
                Some(m) => Value::Matrix(m.cleared(0.0)),
                None => like.cleared(0.0),
            },
            Combiner::Multiply | Combiner::Divide => match matrix {
                Some(m) => Value::Matrix(Matrix::identity(m.rows(), m.columns())),
                None => Value::Scalar(1.0),
            },
            Combiner::Min => match matrix {
                Some(m) => Value::Matrix(m.cleared(f64::INFINITY)),
                None => Value::Scalar(f64::INFINITY),
            },
            Combiner::Max => match matrix {
                Some(m) => Value::Matrix(m.cleared(f64::NEG_INFINITY)),
                None => Value::Scalar(f64::NEG_INFINITY),
            },
        };
        Some(value)
    }

    /// Folds `result` into `current`.
    pub fn fold(&self, current: &Value, result: &Value) -> Result<Value> {
        match self {
            Combiner::Replace => Ok(result.clone()),
            Combiner::Add => current.add(result),
            Combiner::Multiply => current.multiply(result),
            Combiner::Divide => current.divide(result),
            Combiner::Min => current.min(result),
            Combiner::Max => current.max(result),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Scope {
    /// One value per part.
    #[default]
    Local,
    /// One value per population.
    Global,
}

/// Storage class decided when the owning `EquationSet` is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Storage {
    /// Computed and discarded within one phase.
    Temporary,
    /// One slot; reads see writes immediately.
    #[default]
    Single,
    /// Separate read ("current") and write ("final") slots.
    Buffered,
}

/// Location of a value inside an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Slot {
    #[default]
    None,
    Float(usize),
    Object(usize),
    Temp(usize),
}

/// One conditional (or default) equation of a variable.
#[derive(Debug, Clone)]
pub struct Equation {
    pub condition: Option<Expr>,
    pub expression: Expr,
}

impl Equation {
    pub fn new(expression: Expr) -> Self {
        Self {
            condition: None,
            expression,
        }
    }

    pub fn when(condition: Expr, expression: Expr) -> Self {
        Self {
            condition: Some(condition),
            expression,
        }
    }
}

/// Compiled description of one model variable.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub scope: Scope,
    pub combiner: Combiner,
    pub equations: Vec<Equation>,
    /// Initial value, also the shape template for accumulator identities.
    pub default: Value,
    pub derivative: Option<VarId>,
    pub buffered: bool,
    pub temporary: bool,
    /// Written by other parts through references.
    pub external_write: bool,
    pub init_only: bool,
    /// Results go to a remote variable instead of local storage.
    pub target: Option<RefId>,

    pub(crate) storage: Storage,
    pub(crate) read_slot: Slot,
    pub(crate) write_slot: Slot,
}

impl Variable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: Scope::Local,
            combiner: Combiner::Replace,
            equations: Vec::new(),
            default: Value::Scalar(0.0),
            derivative: None,
            buffered: false,
            temporary: false,
            external_write: false,
            init_only: false,
            target: None,
            storage: Storage::Single,
            read_slot: Slot::None,
            write_slot: Slot::None,
        }
    }

    pub fn global(mut self) -> Self {
        self.scope = Scope::Global;
        self
    }

    pub fn combiner(mut self, combiner: Combiner) -> Self {
        self.combiner = combiner;
        self
    }

    /// Adds an unconditional equation.
    pub fn equals(mut self, expression: Expr) -> Self {
        self.equations.push(Equation::new(expression));
        self
    }

    /// Adds a conditional equation.
    pub fn when(mut self, condition: Expr, expression: Expr) -> Self {
        self.equations.push(Equation::when(condition, expression));
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    pub fn derivative(mut self, derivative: VarId) -> Self {
        self.derivative = Some(derivative);
        self
    }

    pub fn buffered(mut self) -> Self {
        self.buffered = true;
        self
    }

    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    pub fn external_write(mut self) -> Self {
        self.external_write = true;
        self
    }

    pub fn init_only(mut self) -> Self {
        self.init_only = true;
        self
    }

    pub fn target(mut self, reference: RefId) -> Self {
        self.target = Some(reference);
        self
    }

    pub fn storage(&self) -> Storage {
        self.storage
    }

    pub fn is_buffered(&self) -> bool {
        self.storage == Storage::Buffered
    }

    pub fn is_temporary(&self) -> bool {
        self.storage == Storage::Temporary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identities() {
        let s = Value::Scalar(7.0);
        assert_eq!(Combiner::Add.identity(&s), Some(Value::Scalar(0.0)));
        assert_eq!(Combiner::Multiply.identity(&s), Some(Value::Scalar(1.0)));
        assert_eq!(Combiner::Divide.identity(&s), Some(Value::Scalar(1.0)));
        assert_eq!(Combiner::Min.identity(&s), Some(Value::Scalar(f64::INFINITY)));
        assert_eq!(Combiner::Max.identity(&s), Some(Value::Scalar(f64::NEG_INFINITY)));
        assert_eq!(Combiner::Replace.identity(&s), None);

        let m = Value::Matrix(Matrix::filled(2, 2, 5.0));
        assert_eq!(
            Combiner::Multiply.identity(&m),
            Some(Value::Matrix(Matrix::identity(2, 2)))
        );
        assert_eq!(
            Combiner::Max.identity(&m),
            Some(Value::Matrix(Matrix::filled(2, 2, f64::NEG_INFINITY)))
        );
    }

    #[test]
    fn test_fold_starts_from_identity() {
        for combiner in [Combiner::Add, Combiner::Multiply, Combiner::Min, Combiner::Max] {
            let start = combiner.identity(&Value::Scalar(0.0)).unwrap();
            let folded = combiner.fold(&start, &Value::Scalar(4.0)).unwrap();
            assert_eq!(folded, Value::Scalar(4.0), "{combiner:?}");
        }
    }
}
