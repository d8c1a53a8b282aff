use crate::core::errors::{Result, SimError};
use crate::core::model::InputMode;
use crate::core::values::Value;
use log::warn;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

type LineSource = Lines<Box<dyn BufRead>>;

/// Cursor over one whitespace-delimited input table.
///
/// Rows are read lazily as the requested line (or time) advances. The
/// holder keeps the current row and one row of look-ahead.
pub struct InputHolder {
    lines: Option<LineSource>,
    current_line: f64,
    current_values: Vec<f64>,
    next_line: f64,
    next_values: Vec<f64>,
    column_map: BTreeMap<String, usize>,
    column_count: usize,
    time_column: usize,
    time_column_set: bool,
    epsilon: f64,
}

impl std::fmt::Debug for InputHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputHolder")
            .field("current_line", &self.current_line)
            .field("column_map", &self.column_map)
            .finish_non_exhaustive()
    }
}

impl InputHolder {
    /// Opens `path`; an empty path reads stdin. A missing file yields a
    /// holder that only ever returns a zero row.
    pub fn open(path: &str, dt: f64) -> Self {
        let lines = if path.is_empty() {
            let reader: Box<dyn BufRead> = Box::new(BufReader::new(std::io::stdin()));
            Some(reader.lines())
        } else {
            match File::open(Path::new(path)) {
                Ok(file) => {
                    let reader: Box<dyn BufRead> = Box::new(BufReader::new(file));
                    Some(reader.lines())
                }
                Err(e) => {
                    warn!("input file {path} unavailable ({e}); reading zeros");
                    None
                }
            }
        };
        Self::from_lines(lines, dt)
    }

    fn from_lines(lines: Option<LineSource>, dt: f64) -> Self {
        let mut epsilon = f64::EPSILON.sqrt();
        if dt > 0.0 {
            epsilon = epsilon.min(dt / 1000.0);
        }
        Self {
            lines,
            current_line: -1.0,
            current_values: vec![0.0],
            next_line: -1.0,
            next_values: vec![0.0],
            column_map: BTreeMap::new(),
            column_count: 0,
            time_column: 0,
            time_column_set: false,
            epsilon,
        }
    }

    #[cfg(test)]
    pub(crate) fn from_text(text: &str, dt: f64) -> Self {
        let reader: Box<dyn BufRead> = Box::new(std::io::Cursor::new(text.to_string()));
        Self::from_lines(Some(reader.lines()), dt)
    }

    fn read_line(&mut self) -> Option<String> {
        let lines = self.lines.as_mut()?;
        match lines.next() {
            Some(Ok(line)) => Some(line),
            Some(Err(e)) => {
                warn!("input read failed ({e}); treating as end of data");
                self.lines = None;
                None
            }
            None => {
                self.lines = None;
                None
            }
        }
    }

    /// Advances until the current row covers `requested`.
    fn get_row(&mut self, requested: f64, time: bool) {
        loop {
            if self.next_line < 0.0 {
                if let Some(line) = self.read_line() {
                    if !line.is_empty() && !self.parse(&line, time) {
                        continue;
                    }
                }
            }

            if requested <= self.current_line {
                break;
            }
            if self.next_line < 0.0 {
                break;
            }
            if requested < self.next_line - self.epsilon {
                break;
            }
            self.current_line = self.next_line;
            self.current_values = std::mem::replace(&mut self.next_values, vec![0.0]);
            self.next_line = -1.0;
        }
    }

    /// Consumes one non-empty line. Returns false for a header row.
    fn parse(&mut self, line: &str, time: bool) -> bool {
        let columns: Vec<&str> = line.split(|c: char| c.is_whitespace()).collect();
        self.column_count = self.column_count.max(columns.len());

        if let Some(first) = columns[0].chars().next() {
            if first < '-' || first == '/' || first > '9' {
                for (i, header) in columns.iter().enumerate() {
                    if !header.is_empty() {
                        self.column_map.insert(header.to_string(), i);
                    }
                }
                if time && !self.time_column_set {
                    let mut best = 0;
                    for (header, i) in &self.column_map {
                        let rank = match header.as_str() {
                            "t" => 1,
                            "TIME" => 2,
                            "$t" => 3,
                            _ => 0,
                        };
                        if rank > best {
                            best = rank;
                            self.time_column = *i;
                        }
                    }
                    self.time_column_set = true;
                }
                return false;
            }
        }

        let mut values = vec![0.0; self.column_count];
        for (i, c) in columns.iter().enumerate() {
            values[i] = if c.is_empty() { 0.0 } else { c.parse().unwrap_or(0.0) };
        }
        self.next_line = if time {
            values.get(self.time_column).copied().unwrap_or(0.0)
        } else {
            self.current_line + 1.0
        };
        self.next_values = values;
        true
    }

    /// Current row, or the row linearly interpolated toward the next one.
    fn row(&self, requested: f64, smooth: bool) -> Vec<f64> {
        if !smooth
            || self.current_line < 0.0
            || self.next_line <= self.current_line
            || requested <= self.current_line
        {
            return self.current_values.clone();
        }
        let b = ((requested - self.current_line) / (self.next_line - self.current_line)).clamp(0.0, 1.0);
        let width = self.current_values.len().max(self.next_values.len());
        (0..width)
            .map(|i| {
                let a = self.current_values.get(i).copied().unwrap_or(0.0);
                let z = self.next_values.get(i).copied().unwrap_or(0.0);
                (1.0 - b) * a + b * z
            })
            .collect()
    }

    /// Evaluates one `input()` call.
    pub fn evaluate(&mut self, line: &Value, column: &Value, mode: InputMode) -> Result<Value> {
        let requested = line.as_scalar().unwrap_or(0.0);
        let time = mode.time || mode.smooth;
        self.get_row(requested, time);

        if mode.columns {
            let mut count = self.column_count;
            if time {
                count = count.saturating_sub(1);
            }
            return Ok(Value::Scalar(count as f64));
        }

        let values = self.row(requested, mode.smooth);
        let column = match column {
            Value::Text(name) => {
                let value = self
                    .column_map
                    .get(name)
                    .and_then(|i| values.get(*i))
                    .copied()
                    .unwrap_or(0.0);
                return Ok(Value::Scalar(value));
            }
            other => other
                .as_scalar()
                .ok_or_else(|| SimError::mismatch("input", "scalar", other.type_name()))?,
        };

        let at = |i: i64| values.get(i as usize).copied().unwrap_or(0.0);
        let columns = values.len() as i64;
        let last = columns - 1;
        let time_column = self.time_column as i64;

        if mode.raw {
            let mut c = column.round() as i64;
            if time && c >= time_column {
                c += 1;
            }
            if c < 0 {
                c = 0;
            } else if c >= columns {
                c = last;
            }
            return Ok(Value::Scalar(at(c)));
        }

        let column = if time {
            column * (last - 1) as f64
        } else {
            column * last as f64
        };
        let mut c = column.floor() as i64;
        let b = column - c as f64;
        let mut d = c + 1;
        if time {
            if c >= time_column {
                c += 1;
            }
            if d >= time_column {
                d += 1;
            }
        }
        if c < 0 {
            if time && time_column == 0 && columns > 1 {
                return Ok(Value::Scalar(at(1)));
            }
            return Ok(Value::Scalar(at(0)));
        }
        if c >= last {
            if time && time_column == last && columns > 1 {
                return Ok(Value::Scalar(at(last - 1)));
            }
            return Ok(Value::Scalar(at(last)));
        }
        Ok(Value::Scalar((1.0 - b) * at(c) + b * at(d)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "t x y\n0 1 2\n1 3 4\n";

    fn scalar(v: Value) -> f64 {
        v.as_scalar().unwrap()
    }

    #[test]
    fn test_smooth_interpolates_between_rows() {
        let mut h = InputHolder::from_text(TABLE, 0.1);
        let t = Value::Scalar(0.5);
        let x = scalar(h.evaluate(&t, &Value::from("x"), InputMode::smooth()).unwrap());
        let y = scalar(h.evaluate(&t, &Value::from("y"), InputMode::smooth()).unwrap());
        assert!((x - 2.0).abs() < 1e-12);
        assert!((y - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_time_mode_holds_current_row() {
        let mut h = InputHolder::from_text(TABLE, 0.1);
        let x = scalar(h.evaluate(&Value::Scalar(0.5), &Value::from("x"), InputMode::time()).unwrap());
        assert_eq!(x, 1.0);
        let x = scalar(h.evaluate(&Value::Scalar(1.0), &Value::from("x"), InputMode::time()).unwrap());
        assert_eq!(x, 3.0);
        let x = scalar(h.evaluate(&Value::Scalar(7.0), &Value::from("x"), InputMode::time()).unwrap());
        assert_eq!(x, 3.0);
    }

    #[test]
    fn test_time_column_priority() {
        let mut h = InputHolder::from_text("t $t v\n9 0 5\n", 0.1);
        let v = scalar(h.evaluate(&Value::Scalar(0.0), &Value::from("v"), InputMode::time()).unwrap());
        assert_eq!(v, 5.0);
        assert_eq!(h.time_column, 1);
    }

    #[test]
    fn test_raw_columns_skip_time() {
        let mut h = InputHolder::from_text(TABLE, 0.1);
        let mode = InputMode::time().raw();
        let t = Value::Scalar(0.0);
        assert_eq!(scalar(h.evaluate(&t, &Value::Scalar(0.0), mode).unwrap()), 1.0);
        assert_eq!(scalar(h.evaluate(&t, &Value::Scalar(1.0), mode).unwrap()), 2.0);
        assert_eq!(scalar(h.evaluate(&t, &Value::Scalar(9.0), mode).unwrap()), 2.0);
        let count = h.evaluate(&t, &Value::Scalar(0.0), InputMode::time().columns()).unwrap();
        assert_eq!(scalar(count), 2.0);
    }

    #[test]
    fn test_fractional_columns_interpolate() {
        let mut h = InputHolder::from_text("10 20 30\n", 0.1);
        let line = Value::Scalar(0.0);
        let mode = InputMode::default();
        assert_eq!(scalar(h.evaluate(&line, &Value::Scalar(0.25), mode).unwrap()), 15.0);
        assert_eq!(scalar(h.evaluate(&line, &Value::Scalar(1.0), mode).unwrap()), 30.0);
        assert_eq!(scalar(h.evaluate(&line, &Value::Scalar(-1.0), mode).unwrap()), 10.0);
    }

    #[test]
    fn test_unknown_column_and_missing_file_read_zero() {
        let mut h = InputHolder::from_text(TABLE, 0.1);
        let v = h.evaluate(&Value::Scalar(0.0), &Value::from("nope"), InputMode::time()).unwrap();
        assert_eq!(v, Value::Scalar(0.0));

        let mut missing = InputHolder::open("/nonexistent/partsim/input.txt", 0.1);
        let v = missing.evaluate(&Value::Scalar(3.0), &Value::Scalar(0.0), InputMode::time()).unwrap();
        assert_eq!(v, Value::Scalar(0.0));
    }
}
