use super::expr::Expr;
use super::variable::{Equation, Scope, Slot, Storage, Variable};
use crate::core::errors::{Result, SimError};
use crate::core::types::{RefId, VarId};
use crate::core::values::Value;
use std::rc::Rc;

/// One step of a reference path, taken from the evaluating instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hop {
    /// To the enclosing part (a population steps to its container part).
    Up,
    /// From a part to the population holding its globals.
    Population,
    /// To the k-th child population of a part.
    Child(usize),
    /// From a connection part to its i-th endpoint.
    Endpoint(usize),
}

#[derive(Debug, Clone)]
pub struct VariableReference {
    pub hops: Vec<Hop>,
    /// Variable inside the equation set the path lands on.
    pub variable: VarId,
}

/// Declares one endpoint of a connection type.
#[derive(Debug, Clone)]
pub struct ConnectionBinding {
    pub name: String,
    /// Sibling child index (inside the shared container type) of the endpoint type.
    pub endpoint: usize,
    pub max: Option<VarId>,
    pub min: Option<VarId>,
    pub k: Option<VarId>,
    pub radius: Option<VarId>,
    pub project: Option<VarId>,
}

impl ConnectionBinding {
    pub fn new(name: impl Into<String>, endpoint: usize) -> Self {
        Self {
            name: name.into(),
            endpoint,
            max: None,
            min: None,
            k: None,
            radius: None,
            project: None,
        }
    }

    pub fn with_max(mut self, v: VarId) -> Self {
        self.max = Some(v);
        self
    }

    pub fn with_min(mut self, v: VarId) -> Self {
        self.min = Some(v);
        self
    }

    pub fn with_k(mut self, v: VarId) -> Self {
        self.k = Some(v);
        self
    }

    pub fn with_radius(mut self, v: VarId) -> Self {
        self.radius = Some(v);
        self
    }

    pub fn with_project(mut self, v: VarId) -> Self {
        self.project = Some(v);
        self
    }
}

/// Ordered variable lists for each lifecycle phase of one scope.
#[derive(Debug, Default, Clone)]
pub(crate) struct PhasePlan {
    pub init: Vec<VarId>,
    pub update: Vec<VarId>,
    pub integrated: Vec<VarId>,
    pub commit_after_init: Vec<VarId>,
    pub commit_after_update: Vec<VarId>,
    pub commit_at_finish: Vec<VarId>,
    pub identity_reset: Vec<VarId>,
    pub floats: usize,
    pub objects: usize,
    pub temps: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Specials {
    pub n: Option<VarId>,
    pub p: Option<VarId>,
    pub xyz: Option<VarId>,
    pub dt: Option<VarId>,
}

/// Compiled description of one part type.
#[derive(Debug)]
pub struct EquationSet {
    pub name: String,
    pub variables: Vec<Variable>,
    pub references: Vec<VariableReference>,
    pub parts: Vec<Rc<EquationSet>>,
    pub bindings: Vec<ConnectionBinding>,
    /// Some connection type binds to this type.
    pub connected: bool,
    pub(crate) p_dependencies: Vec<VarId>,
    pub(crate) specials: Specials,
    pub(crate) local: PhasePlan,
    pub(crate) global: PhasePlan,
    pub(crate) can_resize: bool,
    pub(crate) lethal_p: bool,
    pub(crate) wrapper: bool,
}

impl EquationSet {
    /// Synthetic top-level part whose only child is `model`.
    pub(crate) fn wrapper(model: Rc<EquationSet>) -> Rc<EquationSet> {
        Rc::new(EquationSet {
            name: "wrapper".to_string(),
            variables: Vec::new(),
            references: Vec::new(),
            parts: vec![model],
            bindings: Vec::new(),
            connected: false,
            p_dependencies: Vec::new(),
            specials: Specials::default(),
            local: PhasePlan::default(),
            global: PhasePlan::default(),
            can_resize: false,
            lethal_p: false,
            wrapper: true,
        })
    }

    pub fn is_connection(&self) -> bool {
        !self.bindings.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<VarId> {
        self.variables
            .iter()
            .position(|v| v.name == name)
            .map(VarId)
    }

    pub fn variable(&self, v: VarId) -> Result<&Variable> {
        self.variables
            .get(v.0)
            .ok_or_else(|| SimError::InvalidModel(format!("{} has no variable {}", self.name, v.0)))
    }

    pub fn reference(&self, r: RefId) -> Result<&VariableReference> {
        self.references
            .get(r.0)
            .ok_or_else(|| SimError::InvalidModel(format!("{} has no reference {}", self.name, r.0)))
    }

    pub(crate) fn plan(&self, scope: Scope) -> &PhasePlan {
        match scope {
            Scope::Local => &self.local,
            Scope::Global => &self.global,
        }
    }

    /// Parts may die, so the population may shrink without `$n` changing.
    pub(crate) fn can_die(&self) -> bool {
        self.lethal_p || self.is_connection()
    }
}

/// Assembles an `EquationSet` tree and derives its storage layout.
#[derive(Debug, Clone)]
pub struct PartBuilder {
    name: String,
    variables: Vec<Variable>,
    references: Vec<VariableReference>,
    parts: Vec<PartBuilder>,
    bindings: Vec<ConnectionBinding>,
    p_dependencies: Vec<VarId>,
    connected: bool,
}

impl PartBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variables: Vec::new(),
            references: Vec::new(),
            parts: Vec::new(),
            bindings: Vec::new(),
            p_dependencies: Vec::new(),
            connected: false,
        }
    }

    pub fn variable(&mut self, variable: Variable) -> VarId {
        self.variables.push(variable);
        VarId(self.variables.len() - 1)
    }

    /// Adds an equation to a variable declared earlier.
    pub fn equation(&mut self, v: VarId, equation: Equation) -> &mut Self {
        if let Some(variable) = self.variables.get_mut(v.0) {
            variable.equations.push(equation);
        }
        self
    }

    pub fn derivative(&mut self, v: VarId, derivative: VarId) -> &mut Self {
        if let Some(variable) = self.variables.get_mut(v.0) {
            variable.derivative = Some(derivative);
        }
        self
    }

    pub fn reference(&mut self, hops: Vec<Hop>, variable: VarId) -> RefId {
        self.references.push(VariableReference { hops, variable });
        RefId(self.references.len() - 1)
    }

    /// Adds a child part type, returning its index among the children.
    pub fn part(&mut self, child: PartBuilder) -> usize {
        self.parts.push(child);
        self.parts.len() - 1
    }

    pub fn bind(&mut self, binding: ConnectionBinding) -> usize {
        self.bindings.push(binding);
        self.bindings.len() - 1
    }

    /// Local variables that `$p` reads while a connection is being probed.
    pub fn p_depends_on(&mut self, v: VarId) -> &mut Self {
        self.p_dependencies.push(v);
        self
    }

    pub fn build(self) -> Result<Rc<EquationSet>> {
        self.build_inner()
    }

    fn build_inner(mut self) -> Result<Rc<EquationSet>> {
        let child_count = self.parts.len();
        let mut targets = Vec::new();
        for (index, child) in self.parts.iter().enumerate() {
            for binding in &child.bindings {
                if binding.endpoint >= child_count || binding.endpoint == index {
                    return Err(SimError::InvalidModel(format!(
                        "{}: binding {} names endpoint {} which is not a sibling part",
                        child.name, binding.name, binding.endpoint
                    )));
                }
                targets.push(binding.endpoint);
            }
        }
        for t in targets {
            self.parts[t].connected = true;
        }

        let parts = std::mem::take(&mut self.parts)
            .into_iter()
            .map(PartBuilder::build_inner)
            .collect::<Result<Vec<_>>>()?;

        self.validate(&parts)?;

        let specials = Specials {
            n: self.special("$n", Scope::Global)?,
            p: self.special("$p", Scope::Local)?,
            xyz: self.special("$xyz", Scope::Local)?,
            dt: self.special("$dt", Scope::Local)?,
        };

        let n_dynamic = specials.n.is_some_and(|n| {
            let v = &self.variables[n.0];
            v.derivative.is_some() || (!v.init_only && !v.equations.is_empty())
        });

        for (index, v) in self.variables.iter_mut().enumerate() {
            let id = Some(VarId(index));
            let is_n = specials.n == id;
            let is_special = is_n || specials.p == id || specials.xyz == id || specials.dt == id;
            v.storage = if v.target.is_some() {
                Storage::Single
            } else if v.temporary && !is_special {
                Storage::Temporary
            } else if v.buffered || v.external_write || (is_n && n_dynamic) {
                Storage::Buffered
            } else {
                Storage::Single
            };
        }

        let local = self.plan(Scope::Local, specials.n);
        let global = self.plan(Scope::Global, specials.n);

        let is_connection = !self.bindings.is_empty();
        let lethal_p = specials.p.is_some_and(|p| {
            let v = &self.variables[p.0];
            if is_connection {
                v.equations.iter().any(|e| {
                    e.condition
                        .as_ref()
                        .is_some_and(|c| !matches!(c, Expr::Connect))
                })
            } else {
                true
            }
        });

        Ok(Rc::new(EquationSet {
            name: self.name,
            variables: self.variables,
            references: self.references,
            parts,
            bindings: self.bindings,
            connected: self.connected,
            p_dependencies: self.p_dependencies,
            specials,
            local,
            global,
            can_resize: n_dynamic,
            lethal_p,
            wrapper: false,
        }))
    }

    fn special(&self, name: &str, scope: Scope) -> Result<Option<VarId>> {
        match self.variables.iter().position(|v| v.name == name) {
            Some(i) if self.variables[i].scope != scope => Err(SimError::InvalidModel(format!(
                "{}: {name} must be {scope:?}",
                self.name
            ))),
            Some(i) => Ok(Some(VarId(i))),
            None => Ok(None),
        }
    }

    fn validate(&self, parts: &[Rc<EquationSet>]) -> Result<()> {
        let count = self.variables.len();
        let invalid = |what: String| Err(SimError::InvalidModel(format!("{}: {what}", self.name)));

        for v in &self.variables {
            if let Some(d) = v.derivative {
                let Some(dv) = self.variables.get(d.0) else {
                    return invalid(format!("{} has an unknown derivative", v.name));
                };
                if dv.scope != v.scope || dv.temporary {
                    return invalid(format!("derivative of {} must share its scope and be stored", v.name));
                }
            }
            if let Some(r) = v.target {
                if r.0 >= self.references.len() {
                    return invalid(format!("{} writes through an unknown reference", v.name));
                }
            }
        }

        for r in &self.references {
            for hop in &r.hops {
                match hop {
                    Hop::Child(k) if *k >= parts.len() => {
                        return invalid(format!("reference names child part {k}"));
                    }
                    Hop::Endpoint(i) if *i >= self.bindings.len() => {
                        return invalid(format!("reference names endpoint {i}"));
                    }
                    _ => {}
                }
            }
        }

        for binding in &self.bindings {
            if binding.min.is_some() {
                return Err(SimError::Unsupported(format!(
                    "{}: $min on binding {} is not implemented",
                    self.name, binding.name
                )));
            }
            for v in [binding.max, binding.k, binding.radius].into_iter().flatten() {
                match self.variables.get(v.0) {
                    Some(var) if var.scope == Scope::Global => {}
                    _ => return invalid(format!("binding {} limits must be global variables", binding.name)),
                }
            }
            if let Some(v) = binding.project {
                if v.0 >= count {
                    return invalid(format!("binding {} projects an unknown variable", binding.name));
                }
            }
        }

        if self.p_dependencies.iter().any(|v| v.0 >= count) {
            return invalid("unknown $p dependency".to_string());
        }
        Ok(())
    }

    fn plan(&mut self, scope: Scope, n: Option<VarId>) -> PhasePlan {
        let mut plan = PhasePlan::default();

        fn allocate(default: &Value, plan: &mut PhasePlan) -> Slot {
            match default {
                Value::Scalar(_) => {
                    plan.floats += 1;
                    Slot::Float(plan.floats - 1)
                }
                _ => {
                    plan.objects += 1;
                    Slot::Object(plan.objects - 1)
                }
            }
        }

        for (index, v) in self.variables.iter_mut().enumerate() {
            if v.scope != scope {
                continue;
            }
            let id = VarId(index);
            let is_n = n == Some(id);

            if v.target.is_none() {
                match v.storage {
                    Storage::Temporary => {
                        plan.temps += 1;
                        v.read_slot = Slot::Temp(plan.temps - 1);
                        v.write_slot = v.read_slot;
                    }
                    Storage::Single => {
                        v.read_slot = allocate(&v.default, &mut plan);
                        v.write_slot = v.read_slot;
                    }
                    Storage::Buffered => {
                        v.read_slot = allocate(&v.default, &mut plan);
                        v.write_slot = allocate(&v.default, &mut plan);
                    }
                }
            }

            let has_equations = !v.equations.is_empty();
            if has_equations && v.target.is_none() {
                plan.init.push(id);
            }
            if has_equations && !v.init_only {
                plan.update.push(id);
            }
            if v.derivative.is_some() {
                plan.integrated.push(id);
            }
            if v.storage == Storage::Buffered {
                plan.commit_after_init.push(id);
                if v.external_write || is_n {
                    plan.commit_at_finish.push(id);
                } else {
                    plan.commit_after_update.push(id);
                }
            }
            if v.external_write && v.combiner.identity(&v.default).is_some() {
                plan.identity_reset.push(id);
            }
        }
        plan
    }
}
