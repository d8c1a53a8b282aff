use partsim::{
    ConnectionBinding, Expr, InputMode, PartBuilder, SimError, Simulation, SimulationConfig,
    Value, Variable,
};
use std::fs;
use std::path::Path;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Model whose single instance draws a noisy walk and records it until t = 0.5.
fn noisy_walk() -> PartBuilder {
    let mut model = PartBuilder::new("walk");
    let x = model.variable(Variable::new("x"));
    model.equation(x, partsim::Equation::new(Expr::var(x) + Expr::gaussian()));
    model.variable(Variable::new("trace").equals(Expr::output("x", Expr::var(x))));
    model.variable(Variable::new("$p").equals(Expr::Time.lt(Expr::constant(0.45))));

    let mut cells = PartBuilder::new("cell");
    cells.variable(Variable::new("$n").global().default_value(4.0));
    model.part(cells);
    let mut links = PartBuilder::new("link");
    links.variable(Variable::new("$p").default_value(0.5));
    let max = links.variable(Variable::new("$max").global().default_value(2.0));
    links.bind(ConnectionBinding::new("pre", 0));
    links.bind(ConnectionBinding::new("post", 0).with_max(max));
    model.part(links);
    model
}

fn run_to(path: &Path, seed: u64) -> f64 {
    let config = SimulationConfig::new()
        .with_seed(seed)
        .with_default_dt(0.1)
        .with_output_path(path);
    Simulation::from_part(noisy_walk())
        .unwrap()
        .with_config(config)
        .run()
        .unwrap()
}

#[test]
fn test_same_seed_gives_identical_output() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.out");
    let second = dir.path().join("second.out");

    let end = run_to(&first, 42);
    run_to(&second, 42);
    assert!(end > 0.45);

    let a = fs::read(&first).unwrap();
    let b = fs::read(&second).unwrap();
    assert!(!a.is_empty());
    assert_eq!(a, b);

    let text = String::from_utf8(a).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("$t\tx"));
    assert_eq!(lines.next().map(|l| l.starts_with("0\t")), Some(true));
}

#[test]
fn test_different_seeds_diverge() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("a.out");
    let second = dir.path().join("b.out");
    run_to(&first, 1);
    run_to(&second, 2);
    assert_ne!(fs::read(first).unwrap(), fs::read(second).unwrap());
}

#[test]
fn test_smooth_input_interpolates_between_rows() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let table = dir.path().join("table.txt");
    fs::write(&table, "t x y\n0 1 2\n1 3 4\n").unwrap();
    let path = table.to_str().unwrap();

    let mut model = PartBuilder::new("reader");
    model.variable(Variable::new("x").equals(Expr::input(
        path,
        Expr::Time,
        Expr::constant("x"),
        InputMode::smooth(),
    )));
    model.variable(Variable::new("y").equals(Expr::input(
        path,
        Expr::Time,
        Expr::constant("y"),
        InputMode::smooth(),
    )));
    let config = SimulationConfig::new()
        .with_default_dt(0.5)
        .with_output_path(dir.path().join("out"));
    let mut sim = Simulation::from_part(model)
        .unwrap()
        .with_config(config)
        .build()
        .unwrap();

    let population = sim.model_population().unwrap();
    let reader = sim.population_members(population).unwrap()[0];
    assert_eq!(sim.value(reader, "x").unwrap(), Some(Value::Scalar(1.0)));

    sim.step().unwrap();
    assert_eq!(sim.time(), 0.5);
    assert_eq!(sim.value(reader, "x").unwrap(), Some(Value::Scalar(2.0)));
    assert_eq!(sim.value(reader, "y").unwrap(), Some(Value::Scalar(3.0)));
}

#[test]
fn test_missing_input_reads_zero() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.txt");

    let mut model = PartBuilder::new("reader");
    model.variable(Variable::new("x").default_value(5.0).equals(Expr::input(
        missing.to_str().unwrap(),
        Expr::Time,
        Expr::constant(0.0),
        InputMode::time(),
    )));
    let sim = Simulation::from_part(model)
        .unwrap()
        .with_config(SimulationConfig::new().with_output_path(dir.path().join("out")))
        .build()
        .unwrap();
    let population = sim.model_population().unwrap();
    let reader = sim.population_members(population).unwrap()[0];
    assert_eq!(sim.value(reader, "x").unwrap(), Some(Value::Scalar(0.0)));
}

#[test]
fn test_type_mismatch_aborts_initialisation() {
    init_logging();
    let mut model = PartBuilder::new("broken");
    model.variable(Variable::new("x").equals(Expr::constant("volts") - Expr::constant(1.0)));
    let result = Simulation::from_part(model).unwrap().build();
    assert!(matches!(result, Err(SimError::TypeMismatch { .. })));
}

#[test]
fn test_min_is_unsupported() {
    let mut model = PartBuilder::new("model");
    model.part(PartBuilder::new("A"));
    let mut c = PartBuilder::new("C");
    let min = c.variable(Variable::new("$min").global().default_value(1.0));
    c.bind(ConnectionBinding::new("A", 0).with_min(min));
    model.part(c);
    assert!(matches!(
        Simulation::from_part(model),
        Err(SimError::Unsupported(_))
    ));
}

#[test]
fn test_instances_and_snapshots_are_exposed() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let sim = Simulation::from_part(noisy_walk())
        .unwrap()
        .with_config(SimulationConfig::new().with_output_path(dir.path().join("out")))
        .build()
        .unwrap();

    let walk = sim
        .instances()
        .find(|(_, instance)| instance.name() == "walk")
        .map(|(id, _)| id)
        .unwrap();
    let snapshot = sim.snapshot(walk).unwrap();
    assert!(snapshot.values.iter().any(|(name, _)| name == "x"));
    assert_eq!(sim.instances().filter(|(_, i)| i.name() == "cell").count(), 4);
    sim.check_invariants().unwrap();
}
