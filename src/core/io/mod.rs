//! File-backed tables read by `input()` and `matrix()` and written by `output()`.

pub mod input;
pub mod output;

pub use input::InputHolder;
pub use output::OutputHolder;

use crate::core::values::Matrix;
use log::warn;
use std::fs;

/// Parses a whitespace table into a matrix, one text line per row.
///
/// Unreadable files degrade to a 1x1 zero matrix.
pub fn read_matrix(path: &str) -> Matrix {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            warn!("matrix file {path} unavailable ({e}); using zero");
            return Matrix::new(1, 1);
        }
    };
    let rows: Vec<Vec<f64>> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.split_whitespace()
                .map(|token| token.parse().unwrap_or(0.0))
                .collect()
        })
        .collect();
    if rows.is_empty() {
        return Matrix::new(1, 1);
    }
    Matrix::from_rows(&rows)
}
