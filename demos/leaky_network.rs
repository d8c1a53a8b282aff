//! Leaky integrate-and-fire network with random recurrent connectivity.
//!
//! Usage: leaky_network [seed] [output path]

use log::{error, info};
use partsim::{
    Combiner, ConnectionBinding, Equation, Expr, Hop, PartBuilder, Simulation, SimulationConfig,
    Variable,
};

fn network() -> PartBuilder {
    let mut model = PartBuilder::new("network");
    model.variable(Variable::new("$p").equals(Expr::Time.lt(Expr::constant(0.05))));

    let mut neuron = PartBuilder::new("neuron");
    neuron.variable(Variable::new("$n").global().default_value(20.0));
    let input = neuron.variable(
        Variable::new("I")
            .external_write()
            .combiner(Combiner::Add),
    );
    let drive = neuron.variable(Variable::new("drive").equals(Expr::uniform() * 30.0));
    let tau = neuron.variable(Variable::new("tau").default_value(0.01).init_only());
    let slope = neuron.variable(Variable::new("V'"));
    let v = neuron.variable(Variable::new("V").derivative(slope));
    neuron.equation(
        slope,
        Equation::new((Expr::var(drive) + Expr::var(input) - Expr::var(v)) / Expr::var(tau)),
    );
    neuron.equation(
        v,
        Equation::when(Expr::var(v).gt(Expr::constant(1.0)), Expr::constant(0.0)),
    );
    neuron.variable(Variable::new("trace").equals(Expr::Output {
        path: None,
        column: Box::new(Expr::Index),
        value: Box::new(Expr::var(v)),
    }));
    model.part(neuron);

    let mut synapse = PartBuilder::new("synapse");
    synapse.variable(Variable::new("$p").default_value(0.1));
    let target = synapse.reference(vec![Hop::Endpoint(1)], input);
    synapse.variable(
        Variable::new("current")
            .target(target)
            .combiner(Combiner::Add)
            .equals(Expr::gaussian() * 0.5),
    );
    synapse.bind(ConnectionBinding::new("pre", 0));
    synapse.bind(ConnectionBinding::new("post", 0));
    model.part(synapse);
    model
}

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let seed = args.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let output = args.next().unwrap_or_else(|| "leaky_network.out".to_string());

    let config = SimulationConfig::new()
        .with_seed(seed)
        .with_default_dt(1e-3)
        .with_output_path(&output);

    let result = Simulation::from_part(network()).and_then(|sim| sim.with_config(config).run());
    match result {
        Ok(end) => info!("simulated until t={end}; trace written to {output}"),
        Err(e) => {
            error!("simulation failed: {e}");
            std::process::exit(1);
        }
    }
}
