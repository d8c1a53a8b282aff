mod population_tests;
mod scheduler_tests;

use crate::core::builder::Simulation;
use crate::core::execution::{SimulationConfig, Simulator};
use crate::core::model::PartBuilder;
use crate::core::types::InstanceId;

pub(super) fn start(model: PartBuilder) -> Simulator {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = SimulationConfig::new()
        .with_default_dt(0.1)
        .with_output_path(std::env::temp_dir().join("partsim-core-tests.out"));
    Simulation::from_part(model)
        .unwrap()
        .with_config(config)
        .build()
        .unwrap()
}

/// The single instance of the top-level model.
pub(super) fn model_part(sim: &Simulator) -> InstanceId {
    let population = sim.model_population().unwrap();
    sim.population_members(population).unwrap()[0]
}

pub(super) fn scalar(sim: &Simulator, id: InstanceId, name: &str) -> f64 {
    sim.value(id, name)
        .unwrap()
        .and_then(|v| v.as_scalar())
        .unwrap()
}
