use crate::core::types::{RefId, VarId};
use crate::core::values::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
    Transpose,
    Abs,
    Exp,
    Log,
    Sqrt,
    Floor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    MultiplyElementwise,
    Divide,
    Modulo,
    Power,
    Min,
    Max,
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    And,
    Or,
}

/// Flags selecting how `input()` addresses its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputMode {
    /// Rows are addressed by the time column rather than by line number.
    pub time: bool,
    /// Interpolate between the current and next row.
    pub smooth: bool,
    /// Integer column index instead of fractional interpolation.
    pub raw: bool,
    /// Return the column count instead of a value.
    pub columns: bool,
}

impl InputMode {
    pub fn time() -> Self {
        Self {
            time: true,
            ..Self::default()
        }
    }

    pub fn smooth() -> Self {
        Self {
            time: true,
            smooth: true,
            ..Self::default()
        }
    }

    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }

    pub fn columns(mut self) -> Self {
        self.columns = true;
        self
    }
}

/// Compiled operator tree evaluated against one instance.
#[derive(Debug, Clone)]
pub enum Expr {
    Constant(Value),
    /// Variable of the evaluating part's own equation set.
    Var(VarId),
    /// Variable reached through a resolved reference.
    Ref(RefId),
    /// `$t`
    Time,
    /// `$dt`
    Dt,
    /// `$init`
    Init,
    /// `$connect`
    Connect,
    /// `$index`
    Index,
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Element {
        matrix: Box<Expr>,
        row: Box<Expr>,
        column: Option<Box<Expr>>,
    },
    /// Uniform draw in [0,1), or a column of draws.
    Uniform(Option<Box<Expr>>),
    /// Standard normal draw, or a column of draws.
    Gaussian(Option<Box<Expr>>),
    Input {
        path: Box<Expr>,
        line: Box<Expr>,
        column: Box<Expr>,
        mode: InputMode,
    },
    Output {
        path: Option<Box<Expr>>,
        column: Box<Expr>,
        value: Box<Expr>,
    },
    /// Constant matrix read from a file.
    MatrixFile(Box<Expr>),
}

impl Expr {
    pub fn constant(value: impl Into<Value>) -> Self {
        Expr::Constant(value.into())
    }

    pub fn var(v: VarId) -> Self {
        Expr::Var(v)
    }

    pub fn reference(r: RefId) -> Self {
        Expr::Ref(r)
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary(op, Box::new(operand))
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary(op, Box::new(left), Box::new(right))
    }

    pub fn lt(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Less, self, other)
    }

    pub fn le(self, other: Expr) -> Self {
        Self::binary(BinaryOp::LessEqual, self, other)
    }

    pub fn gt(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Greater, self, other)
    }

    pub fn ge(self, other: Expr) -> Self {
        Self::binary(BinaryOp::GreaterEqual, self, other)
    }

    pub fn equal(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Equal, self, other)
    }

    pub fn and(self, other: Expr) -> Self {
        Self::binary(BinaryOp::And, self, other)
    }

    pub fn or(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Or, self, other)
    }

    pub fn min(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Min, self, other)
    }

    pub fn max(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Max, self, other)
    }

    pub fn uniform() -> Self {
        Expr::Uniform(None)
    }

    pub fn gaussian() -> Self {
        Expr::Gaussian(None)
    }

    pub fn element(matrix: Expr, row: Expr, column: Expr) -> Self {
        Expr::Element {
            matrix: Box::new(matrix),
            row: Box::new(row),
            column: Some(Box::new(column)),
        }
    }

    pub fn input(path: &str, line: Expr, column: Expr, mode: InputMode) -> Self {
        Expr::Input {
            path: Box::new(Expr::constant(path)),
            line: Box::new(line),
            column: Box::new(column),
            mode,
        }
    }

    /// `output()` to the default stream.
    pub fn output(column: &str, value: Expr) -> Self {
        Expr::Output {
            path: None,
            column: Box::new(Expr::constant(column)),
            value: Box::new(value),
        }
    }

    pub fn output_to(path: &str, column: Expr, value: Expr) -> Self {
        Expr::Output {
            path: Some(Box::new(Expr::constant(path))),
            column: Box::new(column),
            value: Box::new(value),
        }
    }

    pub fn matrix_file(path: &str) -> Self {
        Expr::MatrixFile(Box::new(Expr::constant(path)))
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::constant(value)
    }
}

macro_rules! impl_binary_operator {
    ($trait:ident, $method:ident, $op:expr) => {
        impl std::ops::$trait for Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, self, rhs)
            }
        }

        impl std::ops::$trait<f64> for Expr {
            type Output = Expr;

            fn $method(self, rhs: f64) -> Expr {
                Expr::binary($op, self, Expr::constant(rhs))
            }
        }
    };
}

impl_binary_operator!(Add, add, BinaryOp::Add);
impl_binary_operator!(Sub, sub, BinaryOp::Subtract);
impl_binary_operator!(Mul, mul, BinaryOp::Multiply);
impl_binary_operator!(Div, div, BinaryOp::Divide);
impl_binary_operator!(Rem, rem, BinaryOp::Modulo);

impl std::ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::unary(UnaryOp::Negate, self)
    }
}
