use crate::core::errors::Result;
use crate::core::execution::{SimulationConfig, Simulator};
use crate::core::model::{EquationSet, PartBuilder};
use log::debug;
use std::rc::Rc;

/// Imperative API for configuring a run before it starts
///
/// `build()` instantiates the model and runs every `init`, so the returned
/// simulator is ready to `step()` or `run()`.
pub struct Simulation {
    model: Rc<EquationSet>,
    config: SimulationConfig,
}

impl Simulation {
    /// Create a simulation of a compiled model with the default configuration
    pub fn new(model: Rc<EquationSet>) -> Self {
        Self {
            model,
            config: SimulationConfig::default(),
        }
    }

    /// Compile `part` and wrap it
    pub fn from_part(part: PartBuilder) -> Result<Self> {
        Ok(Self::new(part.build()?))
    }

    pub fn with_config(mut self, config: SimulationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Instantiate the model and schedule its first step
    pub fn build(self) -> Result<Simulator> {
        debug!("building simulation of {} with {:?}", self.model.name, self.config);
        Simulator::new(self.model, self.config)
    }

    /// Build and run to completion, returning the final time
    pub fn run(self) -> Result<f64> {
        self.build()?.run()
    }
}
