use super::{model_part, scalar, start};
use crate::core::model::{Combiner, ConnectionBinding, Equation, Expr, Hop, PartBuilder, Variable};

fn constant_population(name: &str, n: f64) -> PartBuilder {
    let mut part = PartBuilder::new(name);
    part.variable(Variable::new("$n").global().default_value(n));
    part
}

#[test]
fn test_constant_n_creates_consecutive_indices() {
    let mut model = PartBuilder::new("model");
    model.part(constant_population("A", 5.0));
    let sim = start(model);

    let a = sim.child_population(model_part(&sim), 0).unwrap();
    let members = sim.population_members(a).unwrap();
    let indices: Vec<Option<usize>> = members
        .iter()
        .map(|m| sim.instance(*m).unwrap().index())
        .collect();
    assert_eq!(indices, (0..5).map(Some).collect::<Vec<_>>());
    assert!(members.iter().all(|m| sim.is_live(*m)));
    sim.check_invariants().unwrap();
}

#[test]
fn test_resize_to_current_size_is_a_no_op() {
    let mut model = PartBuilder::new("model");
    model.part(constant_population("A", 5.0));
    let mut sim = start(model);

    let a = sim.child_population(model_part(&sim), 0).unwrap();
    let before = sim.population_members(a).unwrap();
    sim.resize(a, 5).unwrap();
    assert_eq!(sim.population_members(a).unwrap(), before);
    sim.check_invariants().unwrap();
}

#[test]
fn test_shrink_removes_from_the_end_and_recycles_indices() {
    let mut model = PartBuilder::new("model");
    model.part(constant_population("A", 5.0));
    let mut sim = start(model);

    let a = sim.child_population(model_part(&sim), 0).unwrap();
    let before = sim.population_members(a).unwrap();
    sim.resize(a, 3).unwrap();
    assert_eq!(sim.population_members(a).unwrap(), before[..3].to_vec());
    assert!(!sim.is_live(before[4]));

    sim.resize(a, 4).unwrap();
    let after = sim.population_members(a).unwrap();
    assert_eq!(after.len(), 4);
    let reused = sim.instance(after[3]).unwrap().index();
    assert!(matches!(reused, Some(3) | Some(4)));
    sim.check_invariants().unwrap();
}

#[test]
fn test_dynamic_n_grows_each_step() {
    let mut model = PartBuilder::new("model");
    let mut a = PartBuilder::new("A");
    let n = a.variable(Variable::new("$n").global().default_value(2.0));
    a.equation(n, Equation::new(Expr::var(n) + 1.0));
    model.part(a);
    let mut sim = start(model);

    let a = sim.child_population(model_part(&sim), 0).unwrap();
    assert_eq!(sim.population_size(a).unwrap(), 3);
    sim.step().unwrap();
    assert_eq!(sim.population_size(a).unwrap(), 4);
    sim.step().unwrap();
    assert_eq!(sim.population_size(a).unwrap(), 5);
    assert_eq!(scalar(&sim, a, "$n"), 5.0);
    sim.check_invariants().unwrap();
}

#[test]
fn test_random_death_is_reconciled_into_n() {
    let mut model = PartBuilder::new("model");
    let mut a = constant_population("A", 20.0);
    a.variable(Variable::new("$p").default_value(0.5));
    model.part(a);
    let mut sim = start(model);

    let a = sim.child_population(model_part(&sim), 0).unwrap();
    for _ in 0..3 {
        sim.step().unwrap();
        let live = sim.population_size(a).unwrap();
        assert_eq!(scalar(&sim, a, "$n"), live as f64);
        sim.check_invariants().unwrap();
    }
    assert!(sim.population_size(a).unwrap() < 20);
}

#[test]
fn test_accumulator_resets_to_identity_after_finish() {
    let mut model = PartBuilder::new("model");
    let mut a = constant_population("A", 2.0);
    let current = a.variable(Variable::new("I").external_write().combiner(Combiner::Add));
    let peak = a.variable(
        Variable::new("peak")
            .external_write()
            .combiner(Combiner::Max)
            .default_value(0.0),
    );
    model.part(a);

    let mut c = PartBuilder::new("C");
    c.bind(ConnectionBinding::new("A", 0));
    let to_current = c.reference(vec![Hop::Endpoint(0)], current);
    let to_peak = c.reference(vec![Hop::Endpoint(0)], peak);
    c.variable(
        Variable::new("w")
            .target(to_current)
            .combiner(Combiner::Add)
            .equals(Expr::constant(1.5)),
    );
    c.variable(
        Variable::new("m")
            .target(to_peak)
            .combiner(Combiner::Max)
            .equals(Expr::constant(4.0)),
    );
    model.part(c);
    let mut sim = start(model);

    let model_id = model_part(&sim);
    let a = sim.child_population(model_id, 0).unwrap();
    let c = sim.child_population(model_id, 1).unwrap();
    assert_eq!(sim.population_size(c).unwrap(), 2);

    sim.step().unwrap();
    for member in sim.population_members(a).unwrap() {
        let instance = sim.instance(member).unwrap();
        let set = instance.equations().clone();
        let i = &set.variables[current.0];
        let p = &set.variables[peak.0];
        assert_eq!(instance.get(i).unwrap().as_scalar(), Some(1.5));
        assert_eq!(instance.get_final(i).unwrap().as_scalar(), Some(0.0));
        assert_eq!(instance.get(p).unwrap().as_scalar(), Some(4.0));
        assert_eq!(instance.get_final(p).unwrap().as_scalar(), Some(f64::NEG_INFINITY));
    }
}

#[test]
fn test_accumulators_fold_every_writer() {
    let mut model = PartBuilder::new("model");
    let mut a = constant_population("A", 2.0);
    let product = a.variable(Variable::new("gain").external_write().combiner(Combiner::Multiply));
    let quotient = a.variable(Variable::new("decay").external_write().combiner(Combiner::Divide));
    let lowest = a.variable(Variable::new("lowest").external_write().combiner(Combiner::Min));
    model.part(a);
    model.part(constant_population("B", 3.0));

    // Every A member receives one connection per B member.
    let mut c = PartBuilder::new("C");
    c.bind(ConnectionBinding::new("A", 0));
    c.bind(ConnectionBinding::new("B", 1));
    let to_product = c.reference(vec![Hop::Endpoint(0)], product);
    let to_quotient = c.reference(vec![Hop::Endpoint(0)], quotient);
    let to_lowest = c.reference(vec![Hop::Endpoint(0)], lowest);
    for (name, target, combiner) in [
        ("g", to_product, Combiner::Multiply),
        ("d", to_quotient, Combiner::Divide),
    ] {
        c.variable(
            Variable::new(name)
                .target(target)
                .combiner(combiner)
                .equals(Expr::constant(2.0)),
        );
    }
    c.variable(
        Variable::new("l")
            .target(to_lowest)
            .combiner(Combiner::Min)
            .equals(Expr::Index + 3.0),
    );
    model.part(c);
    let mut sim = start(model);

    let model_id = model_part(&sim);
    let a = sim.child_population(model_id, 0).unwrap();
    let c = sim.child_population(model_id, 2).unwrap();
    assert_eq!(sim.population_size(c).unwrap(), 6);

    sim.step().unwrap();
    let connections = sim.population_members(c).unwrap();
    for member in sim.population_members(a).unwrap() {
        let writers: Vec<f64> = connections
            .iter()
            .map(|id| sim.instance(*id).unwrap())
            .filter(|connection| connection.endpoints()[0] == Some(member))
            .map(|connection| connection.index().unwrap() as f64 + 3.0)
            .collect();
        assert_eq!(writers.len(), 3);
        let minimum = writers.iter().copied().fold(f64::INFINITY, f64::min);

        let instance = sim.instance(member).unwrap();
        let set = instance.equations().clone();
        let g = &set.variables[product.0];
        let d = &set.variables[quotient.0];
        let l = &set.variables[lowest.0];
        assert_eq!(instance.get(g).unwrap().as_scalar(), Some(8.0));
        assert_eq!(instance.get(d).unwrap().as_scalar(), Some(0.125));
        assert_eq!(instance.get(l).unwrap().as_scalar(), Some(minimum));
        assert_eq!(instance.get_final(g).unwrap().as_scalar(), Some(1.0));
        assert_eq!(instance.get_final(d).unwrap().as_scalar(), Some(1.0));
        assert_eq!(instance.get_final(l).unwrap().as_scalar(), Some(f64::INFINITY));
    }
    sim.check_invariants().unwrap();
}

#[test]
fn test_die_cascades_into_child_populations() {
    let mut model = PartBuilder::new("model");
    let mut cell = constant_population("cell", 2.0);
    cell.part(constant_population("channel", 3.0));
    model.part(cell);
    let mut sim = start(model);

    let cells = sim.child_population(model_part(&sim), 0).unwrap();
    let first = sim.population_members(cells).unwrap()[0];
    let channels = sim.child_population(first, 0).unwrap();
    let members = sim.population_members(channels).unwrap();
    assert_eq!(members.len(), 3);

    sim.die(first).unwrap();
    assert!(members.iter().all(|m| !sim.is_live(*m)));
    assert!(!sim.is_live(first));
    assert_eq!(sim.population_size(cells).unwrap(), 1);
    sim.check_invariants().unwrap();
}
