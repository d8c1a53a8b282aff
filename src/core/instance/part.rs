//! Lifecycle of a single part: init, integrate, update, finish and die.
//!
//! The phase routines at the top operate on whichever scope the evaluated
//! instance holds, so populations reuse them for their global variables.

use super::eval::{EvalContext, Phase};
use super::instance::{Instance, Role, Roster};
use crate::core::errors::{Result, SimError};
use crate::core::execution::Simulator;
use crate::core::model::Storage;
use crate::core::types::{CountKey, InstanceId};
use crate::core::values::Value;
use log::debug;
use std::rc::Rc;

pub(crate) fn init_values(ctx: &mut EvalContext<'_>) -> Result<()> {
    let equations = Rc::clone(&ctx.this.equations);
    let plan = equations.plan(ctx.this.scope());
    for v in &plan.init {
        if let Some(result) = ctx.evaluate(*v)? {
            ctx.set_local(*v, result)?;
        }
    }
    for v in &plan.commit_after_init {
        ctx.this.commit(equations.variable(*v)?)?;
    }
    reset_identities(ctx.this)
}

/// Forward Euler: `a += a' * dt` on the current value.
pub(crate) fn integrate_values(ctx: &mut EvalContext<'_>, dt: f64) -> Result<()> {
    let equations = Rc::clone(&ctx.this.equations);
    let plan = equations.plan(ctx.this.scope());
    for v in &plan.integrated {
        let var = equations.variable(*v)?;
        let Some(d) = var.derivative else { continue };
        let slope = ctx.get(d)?;
        let advanced = ctx.this.get(var)?.add(&slope.multiply(&Value::Scalar(dt))?)?;
        ctx.this.set_final(var, advanced)?;
    }
    Ok(())
}

pub(crate) fn update_values(ctx: &mut EvalContext<'_>) -> Result<()> {
    let equations = Rc::clone(&ctx.this.equations);
    let plan = equations.plan(ctx.this.scope());
    for v in &plan.update {
        match ctx.evaluate(*v)? {
            Some(result) => ctx.assign(*v, result)?,
            None => {
                let var = equations.variable(*v)?;
                if var.storage == Storage::Buffered && var.target.is_none() {
                    let current = ctx.this.get(var)?;
                    ctx.this.set(var, current)?;
                }
            }
        }
    }
    for v in &plan.commit_after_update {
        ctx.this.commit(equations.variable(*v)?)?;
    }
    Ok(())
}

/// Merges externally written values and resets their accumulators.
pub(crate) fn finish_values(instance: &mut Instance) -> Result<()> {
    let equations = Rc::clone(&instance.equations);
    for v in &equations.plan(instance.scope()).commit_at_finish {
        instance.commit(equations.variable(*v)?)?;
    }
    reset_identities(instance)
}

fn reset_identities(instance: &mut Instance) -> Result<()> {
    let equations = Rc::clone(&instance.equations);
    for v in &equations.plan(instance.scope()).identity_reset {
        let var = equations.variable(*v)?;
        if let Some(identity) = var.combiner.identity(&var.default) {
            instance.set(var, identity)?;
        }
    }
    Ok(())
}

impl Simulator {
    /// Child slot of a connection part's type inside its container.
    fn connection_slot(&self, id: InstanceId) -> Result<usize> {
        let population = self
            .store
            .get(id)?
            .container
            .ok_or_else(|| SimError::invariant(format!("connection {id} has no population")))?;
        self.store
            .get(population)?
            .roster()
            .map(|roster| roster.slot)
            .ok_or_else(|| SimError::invariant(format!("{population} is not a population")))
    }

    fn endpoint_died(&self, id: InstanceId) -> Result<bool> {
        let instance = self.store.get(id)?;
        Ok(instance
            .endpoints
            .iter()
            .flatten()
            .any(|e| !self.store.is_live(*e)))
    }

    pub(crate) fn init_part(&mut self, id: InstanceId) -> Result<()> {
        self.resolve(id)?;
        self.evaluate(id, Phase::Init, init_values)?;

        let equations = Rc::clone(&self.store.get(id)?.equations);
        if equations.is_connection() {
            let slot = self.connection_slot(id)?;
            let endpoints = self.store.get(id)?.endpoints.clone();
            for (i, endpoint) in endpoints.iter().enumerate() {
                let Some(endpoint) = endpoint else { continue };
                let part = self.store.get_mut(*endpoint)?;
                *part
                    .counts
                    .entry(CountKey { connection: slot, endpoint: i })
                    .or_insert(0) += 1;
                part.referrers += 1;
            }
        }

        let mut populations = Vec::with_capacity(equations.parts.len());
        for (k, child) in equations.parts.iter().enumerate() {
            let population = Instance::new(Rc::clone(child), Role::Population(Roster::new(k)), Some(id));
            populations.push(self.store.insert(population));
        }
        self.store.get_mut(id)?.populations = populations.clone();
        for population in populations {
            self.init_population(population)?;
        }

        self.apply_dt(id)
    }

    pub(crate) fn integrate_part(&mut self, id: InstanceId, dt: f64) -> Result<()> {
        if self.endpoint_died(id)? {
            return Ok(());
        }
        self.evaluate(id, Phase::Update, |ctx| integrate_values(ctx, dt))?;
        for population in self.store.get(id)?.populations.clone() {
            self.evaluate(population, Phase::Update, |ctx| integrate_values(ctx, dt))?;
        }
        Ok(())
    }

    pub(crate) fn update_part(&mut self, id: InstanceId) -> Result<()> {
        if self.endpoint_died(id)? {
            return Ok(());
        }
        self.evaluate(id, Phase::Update, update_values)?;
        for population in self.store.get(id)?.populations.clone() {
            self.evaluate(population, Phase::Update, update_values)?;
        }
        Ok(())
    }

    /// `false` means the part must die.
    pub(crate) fn finish_part(&mut self, id: InstanceId) -> Result<bool> {
        for population in self.store.get(id)?.populations.clone() {
            self.finish_population(population)?;
        }
        if self.endpoint_died(id)? {
            return Ok(false);
        }

        let instance = self.store.get(id)?;
        let equations = Rc::clone(&instance.equations);
        if equations.lethal_p {
            if let Some(p) = equations.specials.p {
                let p = instance.scalar(equations.variable(p)?)?;
                if p <= 0.0 || (p < 1.0 && p < self.resources.uniform()) {
                    return Ok(false);
                }
            }
        }

        finish_values(self.store.get_mut(id)?)?;
        self.apply_dt(id)?;

        if equations.wrapper {
            let population = self.child_population(id, 0)?;
            if self.population_size(population)? == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Moves the part when its `$dt` disagrees with its current period.
    fn apply_dt(&mut self, id: InstanceId) -> Result<()> {
        let instance = self.store.get(id)?;
        let Some(v) = instance.equations.specials.dt else {
            return Ok(());
        };
        let dt = instance.scalar(instance.equations.variable(v)?)?;
        if dt > 0.0 && dt != self.period_of(id) {
            self.move_instance(id, dt)?;
        }
        Ok(())
    }

    /// Relocates a part to the step for `dt`, keeping the model instance
    /// co-scheduled with the wrapper.
    pub fn move_instance(&mut self, id: InstanceId, dt: f64) -> Result<()> {
        let key = self.step_for(dt);
        if self.store.get(id)?.event != Some(key) {
            self.dequeue(id)?;
            self.enqueue(key, id)?;
            debug!("{id} moved to period {dt}");
        }

        let population = self.store.get(id)?.container;
        if let Some(population) = population {
            let wrapper = self.wrapper;
            if self.store.get(population)?.container == Some(wrapper)
                && self.store.is_live(wrapper)
                && self.store.get(wrapper)?.event != Some(key)
            {
                self.dequeue(wrapper)?;
                self.enqueue(key, wrapper)?;
            }
        }
        Ok(())
    }

    /// Removes a part from its population and event, killing everything it
    /// contains. Safe to call more than once.
    pub(crate) fn die(&mut self, id: InstanceId) -> Result<()> {
        let instance = self.store.get_mut(id)?;
        if !instance.live {
            return Ok(());
        }
        instance.live = false;
        let populations = instance.populations.clone();
        let endpoints = instance.endpoints.clone();
        let container = instance.container;
        let index = instance.index;
        let is_connection = instance.equations.is_connection();

        for population in &populations {
            for member in self.population_members(*population)? {
                self.die(member)?;
            }
        }

        if is_connection {
            let slot = self.connection_slot(id)?;
            for (i, endpoint) in endpoints.iter().enumerate() {
                if let Some(endpoint) = endpoint {
                    self.release(*endpoint, CountKey { connection: slot, endpoint: i })?;
                }
            }
        }

        if let (Some(population), Some(index)) = (container, index) {
            self.store.get_mut(population)?.roster_mut()?.remove(index);
        }
        self.dequeue(id)?;

        for population in populations {
            self.store.remove(population)?;
        }
        if self.store.get(id)?.referrers == 0 {
            self.store.remove(id)?;
        }
        Ok(())
    }

    fn release(&mut self, endpoint: InstanceId, key: CountKey) -> Result<()> {
        let part = self.store.get_mut(endpoint)?;
        if let Some(count) = part.counts.get_mut(&key) {
            *count = count.saturating_sub(1);
        }
        part.referrers = part.referrers.saturating_sub(1);
        if !part.live && part.referrers == 0 {
            self.store.remove(endpoint)?;
        }
        Ok(())
    }
}
