use serde::{Deserialize, Serialize};

/// Dense 2-D array of doubles, stored column-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    columns: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Zero-filled matrix of the given shape.
    pub fn new(rows: usize, columns: usize) -> Self {
        Self::filled(rows, columns, 0.0)
    }

    pub fn filled(rows: usize, columns: usize, value: f64) -> Self {
        Self {
            rows,
            columns,
            data: vec![value; rows * columns],
        }
    }

    /// Square identity, or the closest thing to it for a non-square shape.
    pub fn identity(rows: usize, columns: usize) -> Self {
        let mut result = Self::new(rows, columns);
        for i in 0..rows.min(columns) {
            result.set(i, i, 1.0);
        }
        result
    }

    /// Single column holding `values`.
    pub fn column(values: &[f64]) -> Self {
        Self {
            rows: values.len(),
            columns: 1,
            data: values.to_vec(),
        }
    }

    /// Build from row-major nested rows. Short rows are zero padded.
    pub fn from_rows(rows: &[Vec<f64>]) -> Self {
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut result = Self::new(rows.len(), columns);
        for (r, row) in rows.iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                result.set(r, c, *v);
            }
        }
        result
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Element at (row, column); out-of-range positions read as 0.
    pub fn get(&self, row: usize, column: usize) -> f64 {
        if row >= self.rows || column >= self.columns {
            return 0.0;
        }
        self.data[column * self.rows + row]
    }

    pub fn set(&mut self, row: usize, column: usize, value: f64) {
        if row < self.rows && column < self.columns {
            self.data[column * self.rows + row] = value;
        }
    }

    /// First element, used when a matrix is demoted to a scalar.
    pub fn first(&self) -> f64 {
        self.data.first().copied().unwrap_or(0.0)
    }

    /// Raw values of one column.
    pub fn raw_column(&self, column: usize) -> Vec<f64> {
        if column >= self.columns {
            return Vec::new();
        }
        let start = column * self.rows;
        self.data[start..start + self.rows].to_vec()
    }

    /// Same shape, every element set to `value`.
    pub fn cleared(&self, value: f64) -> Self {
        Self::filled(self.rows, self.columns, value)
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            rows: self.rows,
            columns: self.columns,
            data: self.data.iter().map(|v| f(*v)).collect(),
        }
    }

    /// Element-wise combination over this matrix's shape.
    pub fn zip(&self, other: &Matrix, f: impl Fn(f64, f64) -> f64) -> Self {
        let mut result = Self::new(self.rows, self.columns);
        for c in 0..self.columns {
            for r in 0..self.rows {
                result.set(r, c, f(self.get(r, c), other.get(r, c)));
            }
        }
        result
    }

    /// Matrix product. The inner dimension is taken from `self`.
    pub fn product(&self, other: &Matrix) -> Self {
        let mut result = Self::new(self.rows, other.columns);
        for c in 0..other.columns {
            for r in 0..self.rows {
                let mut sum = 0.0;
                for k in 0..self.columns {
                    sum += self.get(r, k) * other.get(k, c);
                }
                result.set(r, c, sum);
            }
        }
        result
    }

    pub fn transpose(&self) -> Self {
        let mut result = Self::new(self.columns, self.rows);
        for c in 0..self.columns {
            for r in 0..self.rows {
                result.set(c, r, self.get(r, c));
            }
        }
        result
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.data.iter()
    }
}

impl std::fmt::Display for Matrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for r in 0..self.rows {
            if r > 0 {
                write!(f, ";")?;
            }
            for c in 0..self.columns {
                if c > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{}", super::print(self.get(r, c)))?;
            }
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_major_layout() {
        let m = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]);
        assert_eq!(m.raw_column(0), vec![1.0, 3.0]);
        assert_eq!(m.raw_column(1), vec![2.0, 4.0]);
        assert_eq!(m.get(5, 5), 0.0);
    }

    #[test]
    fn test_product_and_identity() {
        let m = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]);
        assert_eq!(m.product(&Matrix::identity(2, 2)), m);
        let p = m.product(&m);
        assert_eq!(p, Matrix::from_rows(&[vec![7.0, 10.0], vec![15.0, 22.0]]));
    }

    #[test]
    fn test_display() {
        let m = Matrix::from_rows(&[vec![1.0, 0.5], vec![3.0, 4.0]]);
        assert_eq!(m.to_string(), "[1,0.5;3,4]");
    }
}
