use crate::core::errors::{Result, SimError};
use crate::core::model::{EquationSet, Scope, Slot, Variable};
use crate::core::types::{CountKey, EventKey, InstanceId};
use crate::core::values::Value;
use std::collections::HashMap;
use std::rc::Rc;

/// Live-member bookkeeping of a population.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    pub(crate) members: Vec<Option<InstanceId>>,
    pub(crate) free: Vec<usize>,
    pub(crate) next_index: usize,
    /// Lowest index created since the last connect pass.
    pub(crate) firstborn: usize,
    pub(crate) n: usize,
    /// Position of this population among the container part's children.
    pub(crate) slot: usize,
}

impl Roster {
    pub(crate) fn new(slot: usize) -> Self {
        Self {
            slot,
            ..Self::default()
        }
    }

    /// Assigns an index to `id`, recycling from the free stack first.
    pub(crate) fn insert(&mut self, id: InstanceId, newborn: bool) -> usize {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.next_index += 1;
                self.next_index - 1
            }
        };
        if self.members.len() <= index {
            self.members.resize(index + 1, None);
        }
        self.members[index] = Some(id);
        self.n += 1;
        if newborn {
            self.firstborn = self.firstborn.min(index);
        }
        index
    }

    pub(crate) fn remove(&mut self, index: usize) {
        if let Some(slot) = self.members.get_mut(index) {
            if slot.take().is_some() {
                self.n -= 1;
                self.free.push(index);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn members(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.members.iter().flatten().copied()
    }
}

#[derive(Debug, Clone)]
pub enum Role {
    Part,
    Population(Roster),
}

/// Storage and bookkeeping of one simulated object.
#[derive(Debug, Clone)]
pub struct Instance {
    pub(crate) equations: Rc<EquationSet>,
    pub(crate) role: Role,
    pub(crate) floats: Vec<f64>,
    pub(crate) objects: Vec<Value>,
    /// Population of a part, or container part of a population.
    pub(crate) container: Option<InstanceId>,
    pub(crate) endpoints: Vec<Option<InstanceId>>,
    /// Child populations, one per child part type.
    pub(crate) populations: Vec<InstanceId>,
    pub(crate) resolved: Vec<Option<InstanceId>>,
    pub(crate) index: Option<usize>,
    pub(crate) live: bool,
    pub(crate) newborn: bool,
    pub(crate) event: Option<EventKey>,
    pub(crate) prev: Option<InstanceId>,
    pub(crate) next: Option<InstanceId>,
    /// Connections currently attached, per connection type and endpoint.
    pub(crate) counts: HashMap<CountKey, u32>,
    /// Connections that still hold this part as an endpoint.
    pub(crate) referrers: u32,
}

impl Instance {
    pub(crate) fn new(equations: Rc<EquationSet>, role: Role, container: Option<InstanceId>) -> Self {
        let scope = match role {
            Role::Part => Scope::Local,
            Role::Population(_) => Scope::Global,
        };
        let plan = equations.plan(scope);
        let mut floats = vec![0.0; plan.floats];
        let mut objects = vec![Value::default(); plan.objects];
        for v in equations.variables.iter().filter(|v| v.scope == scope) {
            for slot in [v.read_slot, v.write_slot] {
                match (slot, &v.default) {
                    (Slot::Float(i), Value::Scalar(d)) => floats[i] = *d,
                    (Slot::Object(i), default) => objects[i] = default.clone(),
                    _ => {}
                }
            }
        }
        let endpoints = vec![None; equations.bindings.len()];
        Self {
            equations,
            role,
            floats,
            objects,
            container,
            endpoints,
            populations: Vec::new(),
            resolved: Vec::new(),
            index: None,
            live: true,
            newborn: false,
            event: None,
            prev: None,
            next: None,
            counts: HashMap::new(),
            referrers: 0,
        }
    }

    pub fn equations(&self) -> &Rc<EquationSet> {
        &self.equations
    }

    pub fn name(&self) -> &str {
        &self.equations.name
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn is_population(&self) -> bool {
        matches!(self.role, Role::Population(_))
    }

    pub fn scope(&self) -> Scope {
        match self.role {
            Role::Part => Scope::Local,
            Role::Population(_) => Scope::Global,
        }
    }

    pub fn roster(&self) -> Option<&Roster> {
        match &self.role {
            Role::Population(roster) => Some(roster),
            Role::Part => None,
        }
    }

    pub(crate) fn roster_mut(&mut self) -> Result<&mut Roster> {
        match &mut self.role {
            Role::Population(roster) => Ok(roster),
            Role::Part => Err(SimError::invariant(format!(
                "{} is a part, not a population",
                self.equations.name
            ))),
        }
    }

    pub fn endpoints(&self) -> &[Option<InstanceId>] {
        &self.endpoints
    }

    pub fn populations(&self) -> &[InstanceId] {
        &self.populations
    }

    pub fn event(&self) -> Option<EventKey> {
        self.event
    }

    pub fn count(&self, key: CountKey) -> u32 {
        self.counts.get(&key).copied().unwrap_or(0)
    }

    fn read(&self, slot: Slot, var: &Variable) -> Result<Value> {
        match slot {
            Slot::Float(i) => Ok(Value::Scalar(self.floats[i])),
            Slot::Object(i) => Ok(self.objects[i].clone()),
            Slot::Temp(_) | Slot::None => Err(SimError::invariant(format!(
                "{}.{} has no storage",
                self.equations.name, var.name
            ))),
        }
    }

    fn write(&mut self, slot: Slot, var: &Variable, value: Value) -> Result<()> {
        match slot {
            Slot::Float(i) => {
                let scalar = value
                    .as_scalar()
                    .ok_or_else(|| SimError::mismatch("store", "scalar", value.type_name()))?;
                self.floats[i] = scalar;
                Ok(())
            }
            Slot::Object(i) => {
                self.objects[i] = value;
                Ok(())
            }
            Slot::Temp(_) | Slot::None => Err(SimError::invariant(format!(
                "{}.{} has no storage",
                self.equations.name, var.name
            ))),
        }
    }

    /// Current value.
    pub fn get(&self, var: &Variable) -> Result<Value> {
        self.read(var.read_slot, var)
    }

    /// Pending value, the target of writes during a phase.
    pub fn get_final(&self, var: &Variable) -> Result<Value> {
        self.read(var.write_slot, var)
    }

    pub fn set(&mut self, var: &Variable, value: Value) -> Result<()> {
        self.write(var.write_slot, var, value)
    }

    /// Overwrites the current value directly.
    pub fn set_final(&mut self, var: &Variable, value: Value) -> Result<()> {
        self.write(var.read_slot, var, value)
    }

    /// Copies the pending value over the current one.
    pub(crate) fn commit(&mut self, var: &Variable) -> Result<()> {
        let pending = self.get_final(var)?;
        self.set_final(var, pending)
    }

    /// Current value of a variable of this instance's own equation set.
    pub fn value(&self, name: &str) -> Option<Value> {
        let v = self.equations.find(name)?;
        let var = &self.equations.variables[v.0];
        if var.scope != self.scope() {
            return None;
        }
        self.get(var).ok()
    }

    pub(crate) fn scalar(&self, var: &Variable) -> Result<f64> {
        let value = self.get(var)?;
        value
            .as_scalar()
            .ok_or_else(|| SimError::mismatch("read", "scalar", value.type_name()))
    }

    /// Coordinates from `$xyz`, or the origin when the part has none.
    pub(crate) fn xyz(&self) -> Vec<f64> {
        let stored = self
            .equations
            .specials
            .xyz
            .and_then(|v| self.equations.variables.get(v.0))
            .filter(|var| !var.is_temporary())
            .and_then(|var| self.get(var).ok());
        match stored {
            Some(value) => value.to_point(),
            None => vec![0.0; 3],
        }
    }
}
