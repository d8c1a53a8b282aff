use super::matrix::Matrix;
use super::print;
use crate::core::errors::{Result, SimError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Runtime value of every variable and expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Scalar(f64),
    Matrix(Matrix),
    Text(String),
}

impl Default for Value {
    fn default() -> Self {
        Value::Scalar(0.0)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Scalar(value)
    }
}

impl From<Matrix> for Value {
    fn from(value: Matrix) -> Self {
        Value::Matrix(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

fn truth(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Scalar(_) => "scalar",
            Value::Matrix(_) => "matrix",
            Value::Text(_) => "text",
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(v) => Some(*v),
            Value::Matrix(m) if m.rows() == 1 && m.columns() == 1 => Some(m.first()),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(t) => Some(t),
            _ => None,
        }
    }

    /// Nonzero scalars, matrices with any nonzero element, and non-empty text are true.
    pub fn is_true(&self) -> bool {
        match self {
            Value::Scalar(v) => *v != 0.0,
            Value::Matrix(m) => m.iter().any(|v| *v != 0.0),
            Value::Text(t) => !t.is_empty(),
        }
    }

    /// Zero-equivalent value of the same shape.
    pub fn cleared(&self, fill: f64) -> Value {
        match self {
            Value::Scalar(_) => Value::Scalar(fill),
            Value::Matrix(m) => Value::Matrix(m.cleared(fill)),
            Value::Text(_) => Value::Text(String::new()),
        }
    }

    /// Point coordinates, taken from the first column of a matrix.
    pub fn to_point(&self) -> Vec<f64> {
        match self {
            Value::Scalar(v) => vec![*v],
            Value::Matrix(m) => m.raw_column(0),
            Value::Text(_) => Vec::new(),
        }
    }

    /// Applies an element-wise numeric operation with scalar broadcast.
    fn elementwise(
        &self,
        that: &Value,
        op: &'static str,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Value> {
        match (self, that) {
            (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(f(*a, *b))),
            (Value::Scalar(a), Value::Matrix(b)) => Ok(Value::Matrix(b.map(|x| f(*a, x)))),
            (Value::Matrix(a), Value::Scalar(b)) => Ok(Value::Matrix(a.map(|x| f(x, *b)))),
            (Value::Matrix(a), Value::Matrix(b)) => Ok(Value::Matrix(a.zip(b, f))),
            _ => Err(SimError::mismatch(op, self.type_name(), that.type_name())),
        }
    }

    pub fn add(&self, that: &Value) -> Result<Value> {
        match (self, that) {
            (Value::Text(a), Value::Text(b)) => Ok(Value::Text(format!("{a}{b}"))),
            (Value::Text(a), Value::Scalar(b)) => Ok(Value::Text(format!("{a}{}", print(*b)))),
            (Value::Scalar(a), Value::Text(b)) => Ok(Value::Text(format!("{}{b}", print(*a)))),
            _ => self.elementwise(that, "add", |a, b| a + b),
        }
    }

    pub fn subtract(&self, that: &Value) -> Result<Value> {
        self.elementwise(that, "subtract", |a, b| a - b)
    }

    /// Scalar product, scalar broadcast, or true matrix product.
    pub fn multiply(&self, that: &Value) -> Result<Value> {
        match (self, that) {
            (Value::Matrix(a), Value::Matrix(b)) => Ok(Value::Matrix(a.product(b))),
            _ => self.elementwise(that, "multiply", |a, b| a * b),
        }
    }

    pub fn multiply_elementwise(&self, that: &Value) -> Result<Value> {
        self.elementwise(that, "multiply", |a, b| a * b)
    }

    pub fn divide(&self, that: &Value) -> Result<Value> {
        self.elementwise(that, "divide", |a, b| a / b)
    }

    pub fn modulo(&self, that: &Value) -> Result<Value> {
        self.elementwise(that, "modulo", |a, b| a % b)
    }

    pub fn power(&self, that: &Value) -> Result<Value> {
        self.elementwise(that, "raise", f64::powf)
    }

    pub fn min(&self, that: &Value) -> Result<Value> {
        self.elementwise(that, "min", f64::min)
    }

    pub fn max(&self, that: &Value) -> Result<Value> {
        self.elementwise(that, "max", f64::max)
    }

    pub fn eq(&self, that: &Value) -> Result<Value> {
        match (self, that) {
            (Value::Text(a), Value::Text(b)) => Ok(Value::Scalar(truth(a == b))),
            _ => self.elementwise(that, "compare", |a, b| truth(a == b)),
        }
    }

    pub fn ne(&self, that: &Value) -> Result<Value> {
        match (self, that) {
            (Value::Text(a), Value::Text(b)) => Ok(Value::Scalar(truth(a != b))),
            _ => self.elementwise(that, "compare", |a, b| truth(a != b)),
        }
    }

    pub fn gt(&self, that: &Value) -> Result<Value> {
        self.elementwise(that, "compare", |a, b| truth(a > b))
    }

    pub fn ge(&self, that: &Value) -> Result<Value> {
        self.elementwise(that, "compare", |a, b| truth(a >= b))
    }

    pub fn lt(&self, that: &Value) -> Result<Value> {
        self.elementwise(that, "compare", |a, b| truth(a < b))
    }

    pub fn le(&self, that: &Value) -> Result<Value> {
        self.elementwise(that, "compare", |a, b| truth(a <= b))
    }

    pub fn and(&self, that: &Value) -> Result<Value> {
        self.elementwise(that, "and", |a, b| truth(a != 0.0 && b != 0.0))
    }

    pub fn or(&self, that: &Value) -> Result<Value> {
        self.elementwise(that, "or", |a, b| truth(a != 0.0 || b != 0.0))
    }

    pub fn not(&self) -> Result<Value> {
        match self {
            Value::Scalar(v) => Ok(Value::Scalar(truth(*v == 0.0))),
            Value::Matrix(m) => Ok(Value::Matrix(m.map(|v| truth(v == 0.0)))),
            Value::Text(_) => Err(SimError::mismatch("negate", "text", "nothing")),
        }
    }

    pub fn negate(&self) -> Result<Value> {
        match self {
            Value::Scalar(v) => Ok(Value::Scalar(-v)),
            Value::Matrix(m) => Ok(Value::Matrix(m.map(|v| -v))),
            Value::Text(_) => Err(SimError::mismatch("negate", "text", "nothing")),
        }
    }

    pub fn transpose(&self) -> Result<Value> {
        match self {
            Value::Matrix(m) => Ok(Value::Matrix(m.transpose())),
            Value::Scalar(_) => Ok(self.clone()),
            Value::Text(_) => Err(SimError::mismatch("transpose", "text", "nothing")),
        }
    }

    /// Total order over scalars, with 1x1 matrices treated as scalars.
    pub fn compare_to(&self, that: &Value) -> Result<Ordering> {
        match (self, that) {
            (Value::Text(a), Value::Text(b)) => Ok(a.cmp(b)),
            (Value::Scalar(_) | Value::Matrix(_), Value::Scalar(_) | Value::Matrix(_)) => {
                match (self.as_scalar(), that.as_scalar()) {
                    (Some(a), Some(b)) => Ok(a.total_cmp(&b)),
                    _ => Err(SimError::mismatch(
                        "order",
                        self.type_name(),
                        that.type_name(),
                    )),
                }
            }
            _ => Err(SimError::mismatch("order", self.type_name(), that.type_name())),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Scalar(v) => write!(f, "{}", print(*v)),
            Value::Matrix(m) => write!(f, "{m}"),
            Value::Text(t) => write!(f, "{t}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Scalar(x), Value::Scalar(y)) => (x - y).abs() < 1e-12,
            (Value::Matrix(x), Value::Matrix(y)) => {
                x.rows() == y.rows()
                    && x.columns() == y.columns()
                    && x.iter().zip(y.iter()).all(|(p, q)| (p - q).abs() < 1e-12)
            }
            _ => false,
        }
    }

    #[test]
    fn test_add_then_subtract_restores_operand() {
        let a = Value::Scalar(0.1);
        let b = Value::Scalar(0.7);
        assert!(close(&a.add(&b).unwrap().subtract(&b).unwrap(), &a));

        let m = Value::Matrix(Matrix::from_rows(&[vec![1.5, -2.0], vec![0.25, 8.0]]));
        let n = Value::Matrix(Matrix::from_rows(&[vec![0.3, 0.6], vec![-1.0, 1e-3]]));
        assert!(close(&m.add(&n).unwrap().subtract(&n).unwrap(), &m));
    }

    #[test]
    fn test_scalar_broadcast() {
        let m = Value::Matrix(Matrix::from_rows(&[vec![1.0, 2.0]]));
        let r = Value::Scalar(10.0).subtract(&m).unwrap();
        assert_eq!(r, Value::Matrix(Matrix::from_rows(&[vec![9.0, 8.0]])));
        let r = m.multiply(&Value::Scalar(2.0)).unwrap();
        assert_eq!(r, Value::Matrix(Matrix::from_rows(&[vec![2.0, 4.0]])));
    }

    #[test]
    fn test_comparison_yields_truth_values() {
        assert_eq!(Value::Scalar(1.0).lt(&Value::Scalar(2.0)).unwrap(), Value::Scalar(1.0));
        assert_eq!(Value::Scalar(3.0).lt(&Value::Scalar(2.0)).unwrap(), Value::Scalar(0.0));
        let m = Value::Matrix(Matrix::from_rows(&[vec![1.0, 3.0]]));
        assert_eq!(
            m.ge(&Value::Scalar(2.0)).unwrap(),
            Value::Matrix(Matrix::from_rows(&[vec![0.0, 1.0]]))
        );
    }

    #[test]
    fn test_logic_treats_nonzero_as_true() {
        assert_eq!(Value::Scalar(-2.0).and(&Value::Scalar(0.5)).unwrap(), Value::Scalar(1.0));
        assert_eq!(Value::Scalar(0.0).or(&Value::Scalar(0.0)).unwrap(), Value::Scalar(0.0));
        assert_eq!(Value::Scalar(0.0).not().unwrap(), Value::Scalar(1.0));
    }

    #[test]
    fn test_type_mismatch() {
        let text = Value::from("abc");
        let m = Value::Matrix(Matrix::new(2, 2));
        assert!(matches!(text.add(&m), Err(SimError::TypeMismatch { .. })));
        assert!(matches!(text.multiply(&Value::Scalar(1.0)), Err(SimError::TypeMismatch { .. })));
    }

    #[test]
    fn test_text_concatenation() {
        let r = Value::from("n=").add(&Value::Scalar(3.0)).unwrap();
        assert_eq!(r, Value::from("n=3"));
    }

    #[test]
    fn test_compare_to() {
        let one = Value::Matrix(Matrix::filled(1, 1, 1.0));
        assert_eq!(one.compare_to(&Value::Scalar(2.0)).unwrap(), Ordering::Less);
        assert_eq!(Value::Scalar(2.0).compare_to(&one).unwrap(), Ordering::Greater);
        let wide = Value::Matrix(Matrix::new(1, 2));
        assert!(wide.compare_to(&Value::Scalar(0.0)).is_err());
    }
}
