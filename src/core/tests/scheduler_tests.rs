use super::{model_part, scalar, start};
use crate::core::event::Event;
use crate::core::model::{Equation, Expr, PartBuilder, Variable};
use crate::core::types::Period;

#[test]
fn test_forward_euler_integration() {
    let mut model = PartBuilder::new("model");
    let slope = model.variable(Variable::new("V'").default_value(3.0));
    model.variable(Variable::new("V").default_value(2.0).derivative(slope));
    let mut sim = start(model);

    let id = model_part(&sim);
    assert!(sim.step().unwrap());
    assert!((sim.time() - 0.1).abs() < 1e-12);
    assert!((scalar(&sim, id, "V") - 2.3).abs() < 1e-12);
}

#[test]
fn test_model_dt_moves_the_wrapper_along() {
    let mut model = PartBuilder::new("model");
    model.variable(Variable::new("$dt").default_value(0.25));
    let sim = start(model);

    let id = model_part(&sim);
    let key = sim.instance(id).unwrap().event().unwrap();
    assert_eq!(sim.instance(sim.wrapper).unwrap().event(), Some(key));
    assert_eq!(sim.periods.len(), 1);
    assert_eq!(sim.periods.get(&Period(0.25)), Some(&key));
    assert_eq!(sim.scheduler.len(), 1);
    assert_eq!(sim.scheduler.peek_next_time(), Some(0.25));
    sim.check_invariants().unwrap();
}

#[test]
fn test_parts_with_equal_dt_share_a_step() {
    let mut model = PartBuilder::new("model");
    let mut slow = PartBuilder::new("slow");
    slow.variable(Variable::new("$n").global().default_value(3.0));
    slow.variable(Variable::new("$dt").default_value(0.5));
    model.part(slow);
    let mut sim = start(model);

    let population = sim.child_population(model_part(&sim), 0).unwrap();
    let members = sim.population_members(population).unwrap();
    let key = sim.instance(members[0]).unwrap().event().unwrap();
    assert!(members
        .iter()
        .all(|m| sim.instance(*m).unwrap().event() == Some(key)));
    assert_ne!(sim.instance(model_part(&sim)).unwrap().event(), Some(key));
    assert_eq!(sim.steps.get(&key).unwrap().len(), 3);

    // 0.1 .. 0.4 belong to the default step; the slow step first fires at 0.5.
    let mut times = Vec::new();
    for _ in 0..6 {
        sim.step().unwrap();
        times.push(sim.time());
    }
    assert!((times[4] - 0.5).abs() < 1e-9);
    assert!((times[5] - 0.5).abs() < 1e-9);
}

#[test]
fn test_one_shot_event_runs_update_and_finish() {
    let mut model = PartBuilder::new("model");
    let hits = model.variable(Variable::new("hits"));
    model.equation(hits, Equation::new(Expr::var(hits) + 1.0));
    let mut sim = start(model);

    let id = model_part(&sim);
    assert_eq!(scalar(&sim, id, "hits"), 1.0);
    sim.schedule_once(0.05, vec![id]);
    sim.step().unwrap();
    assert_eq!(sim.time(), 0.05);
    assert_eq!(scalar(&sim, id, "hits"), 2.0);
    sim.step().unwrap();
    assert_eq!(scalar(&sim, id, "hits"), 3.0);
}

#[test]
fn test_run_ends_once_the_model_dies() {
    let mut model = PartBuilder::new("model");
    model.variable(Variable::new("$p").equals(Expr::Time.lt(Expr::constant(0.35))));
    let mut sim = start(model);

    let id = model_part(&sim);
    let end = sim.run().unwrap();
    assert!((end - 0.5).abs() < 1e-9);
    assert!(!sim.is_live(id));
    assert!(!sim.is_live(sim.wrapper));
    assert!(sim.scheduler.is_empty());
    assert!(sim.steps.is_empty());
}

#[test]
fn test_instances_walks_every_scheduled_part() {
    let mut model = PartBuilder::new("model");
    let mut fast = PartBuilder::new("fast");
    fast.variable(Variable::new("$n").global().default_value(2.0));
    let mut slow = PartBuilder::new("slow");
    slow.variable(Variable::new("$n").global().default_value(3.0));
    slow.variable(Variable::new("$dt").default_value(0.5));
    model.part(fast);
    model.part(slow);
    let sim = start(model);

    let names: Vec<String> = sim
        .instances()
        .map(|(_, instance)| instance.name().to_string())
        .collect();
    assert_eq!(names, vec!["model", "fast", "fast", "slow", "slow", "slow"]);
    assert!(matches!(
        sim.scheduler.ordered()[0].event,
        Event::Step(_)
    ));
}

#[test]
fn test_snapshot_lists_stored_values() {
    let mut model = PartBuilder::new("model");
    model.variable(Variable::new("x").default_value(4.0));
    model.variable(Variable::new("scratch").temporary().equals(Expr::constant(1.0)));
    let sim = start(model);

    let snapshot = sim.snapshot(model_part(&sim)).unwrap();
    assert_eq!(snapshot.name, "model");
    assert_eq!(snapshot.index, Some(0));
    assert!(snapshot.live);
    assert_eq!(snapshot.values.len(), 1);
    assert_eq!(snapshot.values[0].0, "x");
}
