use crate::core::errors::{Result, SimError};
use crate::core::values::{print, Value};
use log::warn;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Accumulates `output()` calls into rows of a tab-separated table.
///
/// One row is emitted per distinct time value; the first column is `$t`.
pub struct OutputHolder {
    out: Box<dyn Write>,
    path: PathBuf,
    columns: Vec<String>,
    column_map: HashMap<String, usize>,
    row: Vec<Option<String>>,
    row_time: Option<f64>,
    header_width: usize,
}

impl std::fmt::Debug for OutputHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputHolder")
            .field("path", &self.path)
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

impl OutputHolder {
    /// Creates the file at `path`, falling back to stdout when that fails.
    pub fn open(path: &Path) -> Self {
        let out: Box<dyn Write> = match File::create(path) {
            Ok(file) => Box::new(BufWriter::new(file)),
            Err(e) => {
                warn!("cannot create output {} ({e}); writing to stdout", path.display());
                Box::new(std::io::stdout())
            }
        };
        Self::with_writer(out, path.to_path_buf())
    }

    pub(crate) fn with_writer(out: Box<dyn Write>, path: PathBuf) -> Self {
        Self {
            out,
            path,
            columns: Vec::new(),
            column_map: HashMap::new(),
            row: Vec::new(),
            row_time: None,
            header_width: 0,
        }
    }

    fn io_error(&self, source: std::io::Error) -> SimError {
        SimError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    /// Records `value` under `column` for the row at `time`.
    pub fn trace(&mut self, time: f64, column: &str, value: &Value) -> Result<()> {
        if self.row_time.is_some_and(|t| t != time) {
            self.write_row()?;
        }
        self.row_time = Some(time);

        let index = match self.column_map.get(column) {
            Some(i) => *i,
            None => {
                self.columns.push(column.to_string());
                self.column_map.insert(column.to_string(), self.columns.len() - 1);
                self.columns.len() - 1
            }
        };
        if self.row.len() <= index {
            self.row.resize(index + 1, None);
        }
        self.row[index] = Some(value.to_string());
        Ok(())
    }

    fn write_row(&mut self) -> Result<()> {
        let Some(time) = self.row_time.take() else {
            return Ok(());
        };
        let mut text = String::new();
        if self.columns.len() > self.header_width {
            text.push_str("$t");
            for c in &self.columns {
                text.push('\t');
                text.push_str(c);
            }
            text.push('\n');
            self.header_width = self.columns.len();
        }
        text.push_str(&print(time));
        for i in 0..self.columns.len() {
            text.push('\t');
            if let Some(Some(v)) = self.row.get(i) {
                text.push_str(v);
            }
        }
        text.push('\n');
        self.row.clear();
        self.out
            .write_all(text.as_bytes())
            .map_err(|e| self.io_error(e))
    }

    /// Writes any pending row and flushes the stream.
    pub fn close(&mut self) -> Result<()> {
        self.write_row()?;
        self.out.flush().map_err(|e| self.io_error(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_rows_and_header_growth() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.out");
        let mut holder = OutputHolder::open(&path);
        holder.trace(0.0, "a", &Value::Scalar(1.0)).unwrap();
        holder.trace(0.1, "a", &Value::Scalar(0.5)).unwrap();
        holder.trace(0.1, "b", &Value::Scalar(2.0)).unwrap();
        holder.trace(0.2, "b", &Value::Scalar(3.0)).unwrap();
        holder.close().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "$t\ta\n0\t1\n$t\ta\tb\n0.1\t0.5\t2\n0.2\t\t3\n"
        );
    }

    #[test]
    fn test_close_without_rows_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.out");
        let mut holder = OutputHolder::open(&path);
        holder.close().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }
}
