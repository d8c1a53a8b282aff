//! Connection formation between the endpoint populations of a connection type.
//!
//! One iterator per endpoint enumerates candidates; iterators are chained so
//! that exhausting one advances the next, which yields every combination of
//! endpoints exactly once per pass. A reusable probe instance carries the
//! current combination while `$p` is evaluated, and becomes the new
//! connection when it is accepted.

use super::eval::{resolve_references, EvalContext, Phase};
use super::instance::{Instance, Role};
use super::store::Store;
use crate::core::errors::{Result, SimError};
use crate::core::execution::resources::Resources;
use crate::core::execution::Simulator;
use crate::core::model::EquationSet;
use crate::core::spatial::{Entry, KdTree};
use crate::core::types::{CountKey, InstanceId, VarId};
use crate::core::values::Value;
use log::debug;
use rand::seq::SliceRandom;
use std::rc::Rc;

struct PassEnv<'a> {
    store: &'a Store,
    resources: &'a mut Resources,
    time: f64,
    dt: f64,
}

/// Evaluates `target` on the probe in the connect phase; remote writes are dropped.
fn probe_value(
    env: &mut PassEnv<'_>,
    probe: &mut Instance,
    dependencies: &[VarId],
    target: VarId,
) -> Result<Value> {
    probe.resolved = resolve_references(env.store, probe);
    let mut ctx = EvalContext::new(
        env.store,
        &mut *env.resources,
        probe,
        env.time,
        env.dt,
        Phase::Connect,
    );
    for v in dependencies {
        if let Some(result) = ctx.evaluate(*v)? {
            ctx.set_local(*v, result)?;
        }
    }
    match ctx.evaluate(target)? {
        Some(value) => Ok(value),
        None => ctx.get(target),
    }
}

struct ConnectIterator {
    /// Binding position this iterator fills on the probe.
    endpoint: usize,
    count_key: CountKey,
    max: u32,
    members: Vec<Option<InstanceId>>,
    firstborn: usize,
    new_only: bool,
    permute: Option<usize>,
    contained: bool,
    started: bool,
    candidates: Vec<InstanceId>,
    i: usize,
    p: Option<InstanceId>,
    tree: Option<KdTree<InstanceId>>,
    project: Option<VarId>,
    rank: i32,
}

impl ConnectIterator {
    fn new(
        endpoint: usize,
        slot: usize,
        population: InstanceId,
        connections: &Instance,
        scratch: &mut Instance,
        env: &mut PassEnv<'_>,
    ) -> Result<Self> {
        let equations = Rc::clone(&connections.equations);
        let binding = &equations.bindings[endpoint];
        let global = |v: Option<VarId>| -> Result<Option<f64>> {
            match v {
                Some(v) => Ok(Some(connections.scalar(equations.variable(v)?)?)),
                None => Ok(None),
            }
        };
        let max = global(binding.max)?.map_or(0, |m| m.max(0.0) as u32);
        let k = global(binding.k)?.map_or(0, |k| k.max(0.0) as usize);
        let radius = global(binding.radius)?.unwrap_or(0.0);

        let roster = env
            .store
            .get(population)?
            .roster()
            .ok_or_else(|| SimError::invariant(format!("{population} is not a population")))?;
        let members = roster.members.clone();
        let firstborn = roster.firstborn;

        let mut rank = if binding.project.is_some() { 1 } else { 0 };
        let mut tree = None;
        if k > 0 || radius > 0.0 {
            rank -= 2;
            let mut index = KdTree::new(
                if k > 0 { k } else { usize::MAX },
                if radius > 0.0 { radius } else { f64::INFINITY },
            );
            let mut entries = Vec::new();
            for member in members.iter().flatten() {
                let point = match binding.project {
                    Some(project) => {
                        scratch.endpoints[endpoint] = Some(*member);
                        probe_value(env, scratch, &[], project)?.to_point()
                    }
                    None => env.store.get(*member)?.xyz(),
                };
                entries.push(Entry { point, item: *member });
            }
            index.set(entries);
            tree = Some(index);
        }

        Ok(Self {
            endpoint,
            count_key: CountKey { connection: slot, endpoint },
            max,
            members,
            firstborn,
            new_only: false,
            permute: None,
            contained: false,
            started: false,
            candidates: Vec::new(),
            i: 0,
            p: None,
            tree,
            project: binding.project,
            rank,
        })
    }

    fn size(&self) -> usize {
        self.members.len()
    }
}

struct ConnectPass {
    iterators: Vec<ConnectIterator>,
    probe: Instance,
    spatial: bool,
    query: Vec<f64>,
    /// `$xyz` of the connection itself, when it has equations.
    own_xyz: Option<VarId>,
}

impl ConnectPass {
    fn reset(&mut self, pos: usize, new_only: bool, env: &mut PassEnv<'_>) {
        let it = &mut self.iterators[pos];
        it.new_only = new_only;
        it.i = 0;
        it.candidates = match (&it.tree, it.permute) {
            (Some(tree), Some(_)) => tree.find(&self.query),
            _ => {
                let base = if new_only { it.firstborn.min(it.members.len()) } else { 0 };
                let mut slice = it.members[base..].to_vec();
                slice.shuffle(&mut env.resources.rng);
                slice.into_iter().flatten().collect()
            }
        };
    }

    /// All parts from `pos` inward are established members.
    fn old(&self, pos: usize, store: &Store) -> Result<bool> {
        let it = &self.iterators[pos];
        let Some(p) = it.p else {
            return Ok(true);
        };
        if store.get(p)?.newborn {
            return Ok(false);
        }
        match it.permute {
            Some(inner) => self.old(inner, store),
            None => Ok(true),
        }
    }

    fn next(&mut self, pos: usize, env: &mut PassEnv<'_>) -> Result<bool> {
        loop {
            let it = &self.iterators[pos];
            if it.i >= it.candidates.len() {
                match it.permute {
                    None => {
                        if it.started {
                            return Ok(false);
                        }
                        let new_only = !it.contained;
                        self.iterators[pos].started = true;
                        self.reset(pos, new_only, env);
                    }
                    Some(inner) => {
                        let contained = it.contained;
                        if !self.next(inner, env)? {
                            return Ok(false);
                        }
                        let new_only = !contained && self.old(inner, env.store)?;
                        self.reset(pos, new_only, env);
                    }
                }
            }

            let it = &mut self.iterators[pos];
            let mut found = None;
            while it.i < it.candidates.len() {
                let candidate = it.candidates[it.i];
                it.i += 1;
                let Ok(part) = env.store.get(candidate) else {
                    continue;
                };
                if !part.live
                    || (it.new_only && !part.newborn)
                    || (it.max > 0 && part.count(it.count_key) >= it.max)
                {
                    continue;
                }
                found = Some(candidate);
                break;
            }

            if let Some(candidate) = found {
                it.p = Some(candidate);
                let innermost = it.permute.is_none();
                self.probe.endpoints[it.endpoint] = Some(candidate);
                if innermost && self.spatial {
                    self.query = self.query_point(pos, env)?;
                }
                return Ok(true);
            }
        }
    }

    fn query_point(&mut self, pos: usize, env: &mut PassEnv<'_>) -> Result<Vec<f64>> {
        if let Some(xyz) = self.own_xyz {
            return Ok(probe_value(env, &mut self.probe, &[], xyz)?.to_point());
        }
        let it = &self.iterators[pos];
        match (it.project, it.p) {
            (Some(project), _) => Ok(probe_value(env, &mut self.probe, &[], project)?.to_point()),
            (None, Some(p)) => Ok(env.store.get(p)?.xyz()),
            (None, None) => Ok(vec![0.0; 3]),
        }
    }

    /// Loads the current combination into a fresh probe. Returns `true` when
    /// some endpoint is already saturated, forcing the iterator past it.
    fn set_probe(&mut self, pos: usize, store: &Store) -> Result<bool> {
        let it = &self.iterators[pos];
        let (p, max, key, endpoint, permute) = (it.p, it.max, it.count_key, it.endpoint, it.permute);
        let mut saturated = false;
        if let Some(p) = p {
            if max > 0 && store.get(p)?.count(key) >= max {
                saturated = true;
            } else {
                self.probe.endpoints[endpoint] = Some(p);
            }
        }
        if let Some(inner) = permute {
            if self.set_probe(inner, store)? {
                let it = &mut self.iterators[pos];
                it.i = it.candidates.len();
                saturated = true;
            }
        }
        Ok(saturated)
    }

    fn create_probability(
        &mut self,
        equations: &EquationSet,
        env: &mut PassEnv<'_>,
    ) -> Result<f64> {
        let Some(p) = equations.specials.p else {
            return Ok(1.0);
        };
        let value = probe_value(env, &mut self.probe, &equations.p_dependencies, p)?;
        value
            .as_scalar()
            .ok_or_else(|| SimError::mismatch("$p", "scalar", value.type_name()))
    }
}

impl Simulator {
    /// Runs one connect pass for the connection population `population`.
    pub(crate) fn connect(&mut self, population: InstanceId) -> Result<()> {
        let connections = self.store.get(population)?;
        let equations = Rc::clone(&connections.equations);
        let container = connections
            .container
            .ok_or_else(|| SimError::invariant(format!("{population} has no container")))?;
        let slot = connections
            .roster()
            .map(|roster| roster.slot)
            .ok_or_else(|| SimError::invariant(format!("{population} is not a population")))?;
        let siblings = self.store.get(container)?.populations.clone();
        let count = equations.bindings.len();

        let mut targets = Vec::with_capacity(count);
        for binding in &equations.bindings {
            let Some(target) = siblings.get(binding.endpoint).copied() else {
                return Ok(());
            };
            if self.population_size(target)? == 0 {
                return Ok(());
            }
            targets.push(target);
        }

        let dt = self.period_of(container);
        let mut scratch = Instance::new(Rc::clone(&equations), Role::Part, Some(population));
        let mut iterators = Vec::with_capacity(count);
        {
            let connections = self.store.get(population)?;
            let mut env = PassEnv {
                store: &self.store,
                resources: &mut self.resources,
                time: self.time,
                dt,
            };
            for (i, target) in targets.iter().enumerate() {
                iterators.push(ConnectIterator::new(
                    i,
                    slot,
                    *target,
                    connections,
                    &mut scratch,
                    &mut env,
                )?);
            }
        }
        for target in &targets {
            self.queue_clear_new(*target);
        }

        let nothing_new = iterators.iter().all(|it| it.firstborn >= it.size());
        if nothing_new && count > 1 {
            return Ok(());
        }

        // Most established members outermost.
        for i in 1..count {
            let mut j = i;
            while j > 0 && iterators[j - 1].firstborn < iterators[j].firstborn {
                iterators.swap(j - 1, j);
                j -= 1;
            }
        }

        let own_xyz = equations
            .specials
            .xyz
            .filter(|v| !equations.variables[v.0].equations.is_empty());
        let spatial = iterators.iter().any(|it| it.tree.is_some());
        if spatial && own_xyz.is_none() {
            let last = count - 1;
            let mut best = last;
            for i in 0..last {
                if iterators[i].rank > iterators[best].rank {
                    best = i;
                }
            }
            if best != last {
                let it = iterators.remove(best);
                iterators.push(it);
            }
        }
        for i in 1..count {
            iterators[i - 1].permute = Some(i);
            iterators[i].contained = true;
        }

        let mut pass = ConnectPass {
            iterators,
            probe: Instance::new(Rc::clone(&equations), Role::Part, Some(population)),
            spatial,
            query: vec![0.0; 3],
            own_xyz,
        };
        pass.set_probe(0, &self.store)?;

        let key = self.container_event(population)?;
        let mut created = 0usize;
        loop {
            let create = {
                let mut env = PassEnv {
                    store: &self.store,
                    resources: &mut self.resources,
                    time: self.time,
                    dt,
                };
                if !pass.next(0, &mut env)? {
                    break;
                }
                pass.create_probability(&equations, &mut env)?
            };
            if create <= 0.0 || (create < 1.0 && create < self.resources.uniform()) {
                continue;
            }

            let fresh = Instance::new(Rc::clone(&equations), Role::Part, Some(population));
            let probe = std::mem::replace(&mut pass.probe, fresh);
            let id = self.store.insert(probe);
            self.admit(population, id)?;
            self.enqueue(key, id)?;
            self.init_part(id)?;
            created += 1;
            pass.set_probe(0, &self.store)?;
        }

        debug!("connect {}: created {created} connections", equations.name);
        Ok(())
    }
}
