use crate::core::errors::Result;
use crate::core::io::{read_matrix, InputHolder, OutputHolder};
use crate::core::model::InputMode;
use crate::core::values::{Matrix, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;

/// State shared by every evaluation of one run.
///
/// Caches are get-or-create and live until the run closes them.
#[derive(Debug)]
pub(crate) struct Resources {
    pub rng: StdRng,
    inputs: BTreeMap<String, InputHolder>,
    outputs: BTreeMap<PathBuf, OutputHolder>,
    matrices: BTreeMap<String, Rc<Matrix>>,
    default_output: PathBuf,
}

impl Resources {
    pub fn new(seed: u64, default_output: PathBuf) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            matrices: BTreeMap::new(),
            default_output,
        }
    }

    pub fn uniform(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    pub fn gaussian(&mut self) -> f64 {
        self.rng.sample(StandardNormal)
    }

    pub fn input(
        &mut self,
        path: &str,
        line: &Value,
        column: &Value,
        mode: InputMode,
        dt: f64,
    ) -> Result<Value> {
        self.inputs
            .entry(path.to_string())
            .or_insert_with(|| InputHolder::open(path, dt))
            .evaluate(line, column, mode)
    }

    pub fn output(&mut self, path: Option<&str>, time: f64, column: &str, value: &Value) -> Result<()> {
        let path = path.map_or_else(|| self.default_output.clone(), PathBuf::from);
        self.outputs
            .entry(path)
            .or_insert_with_key(|p| OutputHolder::open(p))
            .trace(time, column, value)
    }

    pub fn matrix(&mut self, path: &str) -> Rc<Matrix> {
        let matrix = self
            .matrices
            .entry(path.to_string())
            .or_insert_with(|| Rc::new(read_matrix(path)));
        Rc::clone(matrix)
    }

    /// Flushes and drops every stream.
    pub fn close(&mut self) -> Result<()> {
        self.inputs.clear();
        let mut outputs = std::mem::take(&mut self.outputs);
        for holder in outputs.values_mut() {
            holder.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_stream_is_reproducible() {
        let mut a = Resources::new(7, PathBuf::from("out"));
        let mut b = Resources::new(7, PathBuf::from("out"));
        for _ in 0..10 {
            assert_eq!(a.uniform(), b.uniform());
            assert_eq!(a.gaussian(), b.gaussian());
        }
    }

    #[test]
    fn test_matrix_cache_returns_same_instance() {
        let mut r = Resources::new(0, PathBuf::from("out"));
        let a = r.matrix("/nonexistent/partsim/m.txt");
        let b = r.matrix("/nonexistent/partsim/m.txt");
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_default_output_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out");
        let mut r = Resources::new(0, path.clone());
        r.output(None, 0.0, "x", &Value::Scalar(1.0)).unwrap();
        r.close().unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "$t\tx\n0\t1\n");
    }
}
