use super::eval::Phase;
use super::instance::{Instance, Role};
use super::part::{finish_values, init_values};
use crate::core::errors::{Result, SimError};
use crate::core::execution::Simulator;
use crate::core::types::{EventKey, InstanceId};
use crate::core::values::Value;
use log::debug;
use std::rc::Rc;

impl Simulator {
    pub(crate) fn init_population(&mut self, population: InstanceId) -> Result<()> {
        self.resolve(population)?;
        self.evaluate(population, Phase::Init, init_values)?;

        let instance = self.store.get(population)?;
        let equations = Rc::clone(&instance.equations);
        if !equations.bindings.is_empty() {
            self.queue_connect(population);
            return Ok(());
        }
        let requested = match equations.specials.n {
            Some(n) => instance.scalar(equations.variable(n)?)?,
            None => 1.0,
        };
        self.resize(population, requested as i64)
    }

    /// Reconciles `$n` with the live count and queues any structural change.
    pub(crate) fn finish_population(&mut self, population: InstanceId) -> Result<()> {
        let instance = self.store.get(population)?;
        let equations = Rc::clone(&instance.equations);
        let live = self.roster_len(population)? as i64;
        let n_var = match equations.specials.n {
            Some(n) => Some(equations.variable(n)?),
            None => None,
        };

        // Deaths are written back into `$n` even when `$n` itself is constant.
        if let Some(var) = n_var {
            if equations.can_die() && var.derivative.is_none() {
                let old = instance.scalar(var)?;
                let requested = scalar(instance.get_final(var)?)?;
                if equations.can_resize && requested != old {
                    self.queue_resize(population, requested as i64);
                } else {
                    self.queue_resize(population, -1);
                }
            }
        }

        finish_values(self.store.get_mut(population)?)?;

        if let Some(var) = n_var {
            if equations.can_resize {
                let requested = self.store.get(population)?.scalar(var)? as i64;
                if equations.can_die() {
                    if var.derivative.is_some() {
                        self.queue_resize(population, requested);
                    }
                } else if requested != live {
                    self.queue_resize(population, requested);
                }
            }
        }
        Ok(())
    }

    fn roster_len(&self, population: InstanceId) -> Result<usize> {
        self.store
            .get(population)?
            .roster()
            .map(|roster| roster.n)
            .ok_or_else(|| SimError::invariant(format!("{population} is not a population")))
    }

    /// Grows or shrinks to `requested` members. `-1` only writes the live
    /// count back into `$n` when the two disagree.
    pub(crate) fn resize(&mut self, population: InstanceId, requested: i64) -> Result<()> {
        let before = self.roster_len(population)?;
        if requested < 0 {
            let instance = self.store.get_mut(population)?;
            let equations = Rc::clone(&instance.equations);
            if let Some(n) = equations.specials.n {
                let var = equations.variable(n)?;
                if instance.scalar(var)? as usize != before {
                    let count = Value::Scalar(before as f64);
                    instance.set_final(var, count.clone())?;
                    if var.is_buffered() {
                        instance.set(var, count)?;
                    }
                }
            }
            return Ok(());
        }

        let requested = requested as usize;
        while self.roster_len(population)? < requested {
            self.create_member(population)?;
        }
        if before > requested {
            let members = self.population_members(population)?;
            let mut n = members.len();
            for member in members.into_iter().rev() {
                if n <= requested {
                    break;
                }
                self.die(member)?;
                n -= 1;
            }
        }
        let after = self.roster_len(population)?;
        if after != before {
            debug!(
                "resized {} from {before} to {after}",
                self.store.get(population)?.name()
            );
        }
        Ok(())
    }

    /// Adds `id` to the roster, flagging it newborn when connections watch
    /// this population.
    pub(crate) fn admit(&mut self, population: InstanceId, id: InstanceId) -> Result<()> {
        let pop = self.store.get_mut(population)?;
        let newborn = pop.equations.connected;
        let index = pop.roster_mut()?.insert(id, newborn);
        let part = self.store.get_mut(id)?;
        part.index = Some(index);
        part.newborn = newborn;
        Ok(())
    }

    /// Event key of the part containing `population`.
    pub(crate) fn container_event(&self, population: InstanceId) -> Result<EventKey> {
        let container = self
            .store
            .get(population)?
            .container
            .ok_or_else(|| SimError::invariant(format!("{population} has no container")))?;
        self.store
            .get(container)?
            .event
            .ok_or_else(|| SimError::invariant(format!("container {container} is not scheduled")))
    }

    fn create_member(&mut self, population: InstanceId) -> Result<InstanceId> {
        let equations = Rc::clone(&self.store.get(population)?.equations);
        let key = self.container_event(population)?;
        let id = self
            .store
            .insert(Instance::new(Rc::clone(&equations), Role::Part, Some(population)));
        self.admit(population, id)?;
        self.enqueue(key, id)?;
        self.init_part(id)?;
        if equations.connected {
            self.queue_dependent_connects(population)?;
        }
        Ok(id)
    }

    /// Queues a connect pass for every sibling connection type bound to `population`.
    fn queue_dependent_connects(&mut self, population: InstanceId) -> Result<()> {
        let instance = self.store.get(population)?;
        let slot = instance
            .roster()
            .map(|roster| roster.slot)
            .ok_or_else(|| SimError::invariant(format!("{population} is not a population")))?;
        let Some(container) = instance.container else {
            return Ok(());
        };
        let siblings = self.store.get(container)?.populations.clone();
        for sibling in siblings {
            let bound = self
                .store
                .get(sibling)?
                .equations
                .bindings
                .iter()
                .any(|b| b.endpoint == slot);
            if bound {
                self.queue_connect(sibling);
            }
        }
        Ok(())
    }

    /// Marks every member as established; later growth counts as newborn.
    pub(crate) fn clear_new(&mut self, population: InstanceId) -> Result<()> {
        let members: Vec<InstanceId> = {
            let roster = self.store.get_mut(population)?.roster_mut()?;
            let fresh = roster.members[roster.firstborn.min(roster.members.len())..]
                .iter()
                .flatten()
                .copied()
                .collect();
            roster.firstborn = roster.members.len();
            fresh
        };
        for member in members {
            self.store.get_mut(member)?.newborn = false;
        }
        Ok(())
    }
}

fn scalar(value: Value) -> Result<f64> {
    value
        .as_scalar()
        .ok_or_else(|| SimError::mismatch("$n", "scalar", value.type_name()))
}
