use super::config::SimulationConfig;
use super::resources::Resources;
use crate::core::errors::{Result, SimError};
use crate::core::event::{Event, EventScheduler, EventStep};
use crate::core::instance::eval::{resolve_references, EvalContext, Phase, RemoteWrite};
use crate::core::instance::{Instance, Role, Store};
use crate::core::model::{Combiner, EquationSet};
use crate::core::types::{EventKey, InstanceId, Period};
use crate::core::values::Value;
use log::{info, trace};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;

/// Named current values of one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub name: String,
    pub index: Option<usize>,
    pub live: bool,
    pub values: Vec<(String, Value)>,
}

/// Run context: event queue, instance arena, deferred work and shared resources.
///
/// All structural changes (resize, connect) requested while an event is
/// running are queued here and drained once the event completes.
pub struct Simulator {
    pub(crate) config: SimulationConfig,
    pub(crate) model: Rc<EquationSet>,
    pub(crate) store: Store,
    pub(crate) scheduler: EventScheduler,
    pub(crate) steps: HashMap<EventKey, EventStep>,
    pub(crate) periods: BTreeMap<Period, EventKey>,
    pub(crate) resize_queue: VecDeque<(InstanceId, i64)>,
    pub(crate) connect_queue: VecDeque<InstanceId>,
    pub(crate) clear_new_queue: Vec<InstanceId>,
    pub(crate) resources: Resources,
    pub(crate) time: f64,
    pub(crate) wrapper: InstanceId,
    next_key: u64,
}

impl Simulator {
    /// Instantiates `model` under the wrapper and runs every `init`.
    ///
    /// On return the first step is scheduled at `default_dt` and the model
    /// population has been sized and connected.
    pub fn new(model: Rc<EquationSet>, config: SimulationConfig) -> Result<Self> {
        let mut store = Store::new();
        let wrapper = store.insert(Instance::new(
            EquationSet::wrapper(Rc::clone(&model)),
            Role::Part,
            None,
        ));
        let resources = Resources::new(config.seed, config.output_path.clone());
        let mut simulator = Self {
            config,
            model,
            store,
            scheduler: EventScheduler::new(),
            steps: HashMap::new(),
            periods: BTreeMap::new(),
            resize_queue: VecDeque::new(),
            connect_queue: VecDeque::new(),
            clear_new_queue: Vec::new(),
            resources,
            time: 0.0,
            wrapper,
            next_key: 0,
        };

        let dt = simulator.config.default_dt;
        let key = simulator.create_step(0.0, dt);
        simulator.enqueue(key, wrapper)?;
        simulator.init_part(wrapper)?;
        simulator.update_populations()?;

        let step = simulator.step_mut(key)?;
        if step.is_empty() {
            simulator.retire_step(key);
        } else {
            step.t = dt;
            simulator.scheduler.schedule(Event::Step(key), dt);
        }
        Ok(simulator)
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn model(&self) -> &Rc<EquationSet> {
        &self.model
    }

    /// Time of the event being run, or of the last one run.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Runs events until the queue is empty, then closes every stream.
    pub fn run(&mut self) -> Result<f64> {
        info!(
            "running {} (seed {}, dt {})",
            self.model.name, self.config.seed, self.config.default_dt
        );
        let mut events = 0u64;
        while self.step()? {
            events += 1;
        }
        self.close()?;
        info!("{} finished at t={} after {events} events", self.model.name, self.time);
        Ok(self.time)
    }

    /// Runs the earliest pending event. `false` once the queue is drained.
    pub fn step(&mut self) -> Result<bool> {
        let Some(scheduled) = self.scheduler.pop_next() else {
            return Ok(false);
        };
        self.time = scheduled.time;
        match scheduled.event {
            Event::Step(key) => {
                trace!("{key} at t={}", self.time);
                self.run_step(key)?;
            }
            Event::Once { targets } => {
                trace!("one-shot event for {} parts at t={}", targets.len(), self.time);
                self.run_once(&targets)?;
            }
        }
        Ok(true)
    }

    /// Flushes output streams and drops input holders.
    pub fn close(&mut self) -> Result<()> {
        self.resources.close()
    }

    /// Queues `update` and `finish` for `targets` at absolute time `t`.
    pub fn schedule_once(&mut self, t: f64, targets: Vec<InstanceId>) {
        self.scheduler.schedule(Event::Once { targets }, t);
    }

    fn run_step(&mut self, key: EventKey) -> Result<()> {
        let (members, dt) = {
            let step = self.steps.get(&key).ok_or_else(|| unknown_step(key))?;
            (step.members(&self.store)?, step.dt)
        };

        for id in &members {
            if self.store.is_live(*id) {
                self.integrate_part(*id, dt)?;
            }
        }
        for id in &members {
            if self.store.is_live(*id) {
                self.update_part(*id)?;
            }
        }
        for id in &members {
            if self.store.is_live(*id) && !self.finish_part(*id)? {
                self.die(*id)?;
            }
        }
        self.update_populations()?;

        let step = self.step_mut(key)?;
        if step.is_empty() {
            self.retire_step(key);
        } else {
            step.t += step.dt;
            let t = step.t;
            self.scheduler.schedule(Event::Step(key), t);
        }
        Ok(())
    }

    fn run_once(&mut self, targets: &[InstanceId]) -> Result<()> {
        for id in targets {
            if self.store.is_live(*id) {
                self.update_part(*id)?;
            }
        }
        for id in targets {
            if self.store.is_live(*id) && !self.finish_part(*id)? {
                self.die(*id)?;
            }
        }
        self.update_populations()
    }

    /// Drains the deferred resize, connect and clear-new queues, in that order.
    pub(crate) fn update_populations(&mut self) -> Result<()> {
        while let Some((population, n)) = self.resize_queue.pop_front() {
            if self.store.contains(population) {
                self.resize(population, n)?;
            }
        }
        while let Some(population) = self.connect_queue.pop_front() {
            if self.store.contains(population) {
                self.connect(population)?;
            }
        }
        for population in std::mem::take(&mut self.clear_new_queue) {
            if self.store.contains(population) {
                self.clear_new(population)?;
            }
        }
        Ok(())
    }

    pub(crate) fn queue_resize(&mut self, population: InstanceId, n: i64) {
        self.resize_queue.push_back((population, n));
    }

    pub(crate) fn queue_connect(&mut self, population: InstanceId) {
        if !self.connect_queue.contains(&population) {
            self.connect_queue.push_back(population);
        }
    }

    pub(crate) fn queue_clear_new(&mut self, population: InstanceId) {
        if !self.clear_new_queue.contains(&population) {
            self.clear_new_queue.push(population);
        }
    }

    fn create_step(&mut self, t: f64, dt: f64) -> EventKey {
        let key = EventKey(self.next_key);
        self.next_key += 1;
        self.steps.insert(key, EventStep::new(key, t, dt));
        self.periods.insert(Period(dt), key);
        key
    }

    fn retire_step(&mut self, key: EventKey) {
        if let Some(step) = self.steps.remove(&key) {
            if self.periods.get(&Period(step.dt)) == Some(&key) {
                self.periods.remove(&Period(step.dt));
            }
        }
    }

    fn step_mut(&mut self, key: EventKey) -> Result<&mut EventStep> {
        self.steps.get_mut(&key).ok_or_else(|| unknown_step(key))
    }

    pub(crate) fn enqueue(&mut self, key: EventKey, id: InstanceId) -> Result<()> {
        let step = self.steps.get_mut(&key).ok_or_else(|| unknown_step(key))?;
        step.enqueue(&mut self.store, id)
    }

    pub(crate) fn dequeue(&mut self, id: InstanceId) -> Result<()> {
        let Some(key) = self.store.get(id)?.event else {
            return Ok(());
        };
        let step = self.steps.get_mut(&key).ok_or_else(|| unknown_step(key))?;
        step.dequeue(&mut self.store, id)
    }

    /// Finds or creates the step for `dt`, starting at the current time plus `dt`.
    pub(crate) fn step_for(&mut self, dt: f64) -> EventKey {
        if let Some(key) = self.periods.get(&Period(dt)) {
            return *key;
        }
        let t = self.time + dt;
        let key = self.create_step(t, dt);
        self.scheduler.schedule(Event::Step(key), t);
        key
    }

    /// Period the instance (or its nearest scheduled container) runs at.
    pub(crate) fn period_of(&self, id: InstanceId) -> f64 {
        let mut current = Some(id);
        while let Some(c) = current {
            let Ok(instance) = self.store.get(c) else {
                break;
            };
            if let Some(step) = instance.event.and_then(|key| self.steps.get(&key)) {
                return step.dt;
            }
            current = instance.container;
        }
        self.config.default_dt
    }

    pub(crate) fn resolve(&mut self, id: InstanceId) -> Result<()> {
        let resolved = resolve_references(&self.store, self.store.get(id)?);
        self.store.get_mut(id)?.resolved = resolved;
        Ok(())
    }

    /// Checks the instance out of the arena, runs `f` on it, then applies
    /// the remote writes it produced.
    pub(crate) fn evaluate<T>(
        &mut self,
        id: InstanceId,
        phase: Phase,
        f: impl FnOnce(&mut EvalContext<'_>) -> Result<T>,
    ) -> Result<T> {
        let dt = self.period_of(id);
        let mut instance = self.store.take(id)?;
        let outcome = {
            let mut ctx = EvalContext::new(
                &self.store,
                &mut self.resources,
                &mut instance,
                self.time,
                dt,
                phase,
            );
            f(&mut ctx).map(|value| (value, std::mem::take(&mut ctx.writes)))
        };
        self.store.put(id, instance)?;
        let (value, writes) = outcome?;
        self.apply_writes(writes)?;
        Ok(value)
    }

    fn apply_writes(&mut self, writes: Vec<RemoteWrite>) -> Result<()> {
        for write in writes {
            if !self.store.is_live(write.target) {
                continue;
            }
            let target = self.store.get_mut(write.target)?;
            let equations = Rc::clone(&target.equations);
            let var = equations.variable(write.variable)?;
            let value = match write.combiner {
                Combiner::Replace => write.value,
                combiner => combiner.fold(&target.get_final(var)?, &write.value)?,
            };
            target.set(var, value)?;
        }
        Ok(())
    }

    /// Borrow of an instance held by the arena.
    pub fn instance(&self, id: InstanceId) -> Result<&Instance> {
        self.store.get(id)
    }

    pub fn is_live(&self, id: InstanceId) -> bool {
        self.store.is_live(id)
    }

    /// Population holding the instances of the top-level model.
    pub fn model_population(&self) -> Result<InstanceId> {
        self.child_population(self.wrapper, 0)
    }

    /// The `k`-th child population of `part`.
    pub fn child_population(&self, part: InstanceId, k: usize) -> Result<InstanceId> {
        self.store.get(part)?.populations.get(k).copied().ok_or_else(|| {
            SimError::invariant(format!("{part} has no child population {k}"))
        })
    }

    /// Live members of a population in index order.
    pub fn population_members(&self, population: InstanceId) -> Result<Vec<InstanceId>> {
        let roster = self
            .store
            .get(population)?
            .roster()
            .ok_or_else(|| SimError::invariant(format!("{population} is not a population")))?;
        Ok(roster.members().collect())
    }

    pub fn population_size(&self, population: InstanceId) -> Result<usize> {
        Ok(self.population_members(population)?.len())
    }

    /// Current value of the named variable, `None` when the instance has no
    /// stored variable of that name.
    pub fn value(&self, id: InstanceId, name: &str) -> Result<Option<Value>> {
        Ok(self.store.get(id)?.value(name))
    }

    pub fn snapshot(&self, id: InstanceId) -> Result<InstanceSnapshot> {
        let instance = self.store.get(id)?;
        let scope = instance.scope();
        let values = instance
            .equations
            .variables
            .iter()
            .filter(|v| v.scope == scope && v.target.is_none() && !v.is_temporary())
            .map(|v| Ok((v.name.clone(), instance.get(v)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(InstanceSnapshot {
            name: instance.name().to_string(),
            index: instance.index,
            live: instance.live,
            values,
        })
    }

    /// Single pass over every scheduled part, in dispatch order.
    pub fn instances(&self) -> Instances<'_> {
        let heads: Vec<InstanceId> = self
            .scheduler
            .ordered()
            .into_iter()
            .filter_map(|scheduled| match scheduled.event {
                Event::Step(key) => self.steps.get(&key).and_then(EventStep::head),
                Event::Once { .. } => None,
            })
            .collect();
        Instances {
            store: &self.store,
            wrapper: self.wrapper,
            heads: heads.into_iter(),
            head: None,
            cursor: None,
        }
    }

    /// Verifies roster and event-list bookkeeping.
    pub fn check_invariants(&self) -> Result<()> {
        for (id, instance) in self.store.iter() {
            let Some(roster) = instance.roster() else {
                continue;
            };
            let live = roster.members.iter().flatten().count();
            if live != roster.n {
                return Err(SimError::invariant(format!(
                    "{} ({id}) counts {} members but holds {live}",
                    instance.name(),
                    roster.n
                )));
            }
            let mut seen = vec![false; roster.members.len()];
            for index in &roster.free {
                match roster.members.get(*index) {
                    Some(None) if !seen[*index] => seen[*index] = true,
                    _ => {
                        return Err(SimError::invariant(format!(
                            "{} ({id}) has free index {index} in use",
                            instance.name()
                        )))
                    }
                }
            }
            for (index, member) in roster.members.iter().enumerate() {
                let Some(member) = member else { continue };
                let part = self.store.get(*member)?;
                if part.index != Some(index) || part.container != Some(id) {
                    return Err(SimError::invariant(format!(
                        "{member} sits at index {index} of {} but disagrees",
                        instance.name()
                    )));
                }
            }
        }
        for (key, step) in &self.steps {
            for member in step.members(&self.store)? {
                if self.store.get(member)?.event != Some(*key) {
                    return Err(SimError::invariant(format!("{member} is listed in {key} but not marked")));
                }
            }
        }
        Ok(())
    }
}

fn unknown_step(key: EventKey) -> SimError {
    SimError::invariant(format!("no event step {key}"))
}

/// Lazy walk over the circular member lists of every scheduled step.
pub struct Instances<'a> {
    store: &'a Store,
    wrapper: InstanceId,
    heads: std::vec::IntoIter<InstanceId>,
    head: Option<InstanceId>,
    cursor: Option<InstanceId>,
}

impl<'a> Iterator for Instances<'a> {
    type Item = (InstanceId, &'a Instance);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(current) = self.cursor {
                let instance = self.store.get(current).ok()?;
                self.cursor = instance.next.filter(|n| Some(*n) != self.head);
                if current == self.wrapper {
                    continue;
                }
                return Some((current, instance));
            }
            let head = self.heads.next()?;
            self.head = Some(head);
            self.cursor = Some(head);
        }
    }
}
