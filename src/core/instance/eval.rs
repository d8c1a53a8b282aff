use super::instance::Instance;
use super::store::Store;
use crate::core::errors::{Result, SimError};
use crate::core::execution::resources::Resources;
use crate::core::model::{BinaryOp, Combiner, EquationSet, Expr, Hop, Scope, Slot, Storage, UnaryOp};
use crate::core::types::{InstanceId, RefId, VarId};
use crate::core::values::{Matrix, Value};
use std::rc::Rc;

/// Lifecycle phase an evaluation runs in; drives `$init` and `$connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Update,
    Connect,
}

/// Write aimed at another instance, applied once the writer is stored again.
#[derive(Debug, Clone)]
pub(crate) struct RemoteWrite {
    pub target: InstanceId,
    pub variable: VarId,
    pub combiner: Combiner,
    pub value: Value,
}

fn hop(store: &Store, from: &Instance, hop: Hop) -> Option<InstanceId> {
    match hop {
        Hop::Up if from.is_population() => from.container,
        Hop::Up => store.get(from.container?).ok()?.container,
        Hop::Population if from.is_population() => None,
        Hop::Population => from.container,
        Hop::Child(k) => from.populations.get(k).copied(),
        Hop::Endpoint(i) => from.endpoints.get(i).copied().flatten(),
    }
}

/// Binds every reference of `instance` to the instance it lands on.
///
/// Paths that cannot be walked (an endpoint not yet set, a missing child)
/// stay unbound and fail only if they are read.
pub(crate) fn resolve_references(store: &Store, instance: &Instance) -> Vec<Option<InstanceId>> {
    instance
        .equations
        .references
        .iter()
        .map(|reference| {
            let mut hops = reference.hops.iter();
            let first = hops.next()?;
            let mut current = hop(store, instance, *first)?;
            for h in hops {
                current = hop(store, store.get(current).ok()?, *h)?;
            }
            Some(current)
        })
        .collect()
}

/// Evaluation state for one instance during one phase.
pub(crate) struct EvalContext<'a> {
    pub store: &'a Store,
    pub resources: &'a mut Resources,
    pub this: &'a mut Instance,
    pub time: f64,
    pub dt: f64,
    pub phase: Phase,
    temps: Vec<Value>,
    pub writes: Vec<RemoteWrite>,
}

impl<'a> EvalContext<'a> {
    pub fn new(
        store: &'a Store,
        resources: &'a mut Resources,
        this: &'a mut Instance,
        time: f64,
        dt: f64,
        phase: Phase,
    ) -> Self {
        let scope = this.scope();
        let equations = Rc::clone(&this.equations);
        let mut temps = vec![Value::default(); equations.plan(scope).temps];
        for v in equations.variables.iter().filter(|v| v.scope == scope) {
            if let Slot::Temp(i) = v.read_slot {
                temps[i] = v.default.clone();
            }
        }
        Self {
            store,
            resources,
            this,
            time,
            dt,
            phase,
            temps,
            writes: Vec::new(),
        }
    }

    fn equations(&self) -> Rc<EquationSet> {
        Rc::clone(&self.this.equations)
    }

    fn unresolved(&self, what: String) -> SimError {
        SimError::UnresolvedReference {
            instance: self.this.equations.name.clone(),
            reference: what,
        }
    }

    fn target(&self, r: RefId) -> Result<InstanceId> {
        self.this
            .resolved
            .get(r.0)
            .copied()
            .flatten()
            .ok_or_else(|| self.unresolved(format!("reference {}", r.0)))
    }

    /// Reads a variable of this instance's equation set.
    pub fn get(&self, v: VarId) -> Result<Value> {
        let equations = self.equations();
        let var = equations.variable(v)?;
        if let Some(r) = var.target {
            return self.get_reference(r);
        }
        if var.scope != self.this.scope() {
            if var.scope == Scope::Global {
                let population = self
                    .this
                    .container
                    .ok_or_else(|| self.unresolved(var.name.clone()))?;
                return self.store.get(population)?.get(var);
            }
            return Err(self.unresolved(var.name.clone()));
        }
        match (var.storage, var.read_slot) {
            (Storage::Temporary, Slot::Temp(i)) => Ok(self.temps[i].clone()),
            (Storage::Buffered, _) if self.phase == Phase::Init => self.this.get_final(var),
            _ => self.this.get(var),
        }
    }

    /// Reads the variable a resolved reference points at.
    pub fn get_reference(&self, r: RefId) -> Result<Value> {
        let equations = self.equations();
        let reference = equations.reference(r)?;
        let target = self.store.get(self.target(r)?)?;
        let var = target.equations.variable(reference.variable)?;
        target.get(var)
    }

    /// Stores a result in this instance, replacing what is there.
    pub fn set_local(&mut self, v: VarId, value: Value) -> Result<()> {
        let equations = self.equations();
        let var = equations.variable(v)?;
        if var.scope != self.this.scope() || var.target.is_some() {
            return Err(self.unresolved(var.name.clone()));
        }
        match var.read_slot {
            Slot::Temp(i) => {
                self.temps[i] = value;
                Ok(())
            }
            _ => self.this.set(var, value),
        }
    }

    /// Merges a result through the variable's combiner, locally or remotely.
    pub fn assign(&mut self, v: VarId, result: Value) -> Result<()> {
        let equations = self.equations();
        let var = equations.variable(v)?;
        if let Some(r) = var.target {
            let target = self.target(r)?;
            let reference = equations.reference(r)?;
            self.writes.push(RemoteWrite {
                target,
                variable: reference.variable,
                combiner: var.combiner,
                value: result,
            });
            return Ok(());
        }
        if var.combiner == Combiner::Replace {
            return self.set_local(v, result);
        }
        let current = match var.read_slot {
            Slot::Temp(i) => self.temps[i].clone(),
            _ => self.this.get_final(var)?,
        };
        let folded = var.combiner.fold(&current, &result)?;
        self.set_local(v, folded)
    }

    /// Picks the first equation whose condition holds, else the
    /// unconditional one. `None` when nothing applies.
    pub fn evaluate(&mut self, v: VarId) -> Result<Option<Value>> {
        let equations = self.equations();
        let var = equations.variable(v)?;
        let mut fallback = None;
        for equation in &var.equations {
            match &equation.condition {
                Some(condition) => {
                    if self.eval(condition)?.is_true() {
                        return self.eval(&equation.expression).map(Some);
                    }
                }
                None => {
                    if fallback.is_none() {
                        fallback = Some(&equation.expression);
                    }
                }
            }
        }
        match fallback {
            Some(expression) => self.eval(expression).map(Some),
            None => Ok(None),
        }
    }

    fn text(&mut self, expr: &Expr, op: &'static str) -> Result<String> {
        match self.eval(expr)? {
            Value::Text(t) => Ok(t),
            other => Err(SimError::mismatch(op, "text", other.type_name())),
        }
    }

    fn scalar(&mut self, expr: &Expr, op: &'static str) -> Result<f64> {
        let value = self.eval(expr)?;
        value
            .as_scalar()
            .ok_or_else(|| SimError::mismatch(op, "scalar", value.type_name()))
    }

    fn draws(&mut self, dims: &Option<Box<Expr>>, mut draw: impl FnMut(&mut Resources) -> f64) -> Result<Value> {
        match dims {
            None => Ok(Value::Scalar(draw(&mut *self.resources))),
            Some(dims) => {
                let n = self.scalar(dims, "draw")?.max(0.0) as usize;
                let values: Vec<f64> = (0..n).map(|_| draw(&mut *self.resources)).collect();
                Ok(Value::Matrix(Matrix::column(&values)))
            }
        }
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Constant(value) => Ok(value.clone()),
            Expr::Var(v) => self.get(*v),
            Expr::Ref(r) => self.get_reference(*r),
            Expr::Time => Ok(Value::Scalar(self.time)),
            Expr::Dt => Ok(Value::Scalar(self.dt)),
            Expr::Init => Ok(Value::Scalar(if self.phase == Phase::Init { 1.0 } else { 0.0 })),
            Expr::Connect => Ok(Value::Scalar(if self.phase == Phase::Connect { 1.0 } else { 0.0 })),
            Expr::Index => Ok(Value::Scalar(self.this.index.map_or(0.0, |i| i as f64))),
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                unary(*op, &value)
            }
            Expr::Binary(op, left, right) => {
                let a = self.eval(left)?;
                let b = self.eval(right)?;
                binary(*op, &a, &b)
            }
            Expr::Element { matrix, row, column } => {
                let m = self.eval(matrix)?;
                let r = self.scalar(row, "index")?;
                let c = match column {
                    Some(c) => self.scalar(c, "index")?,
                    None => 0.0,
                };
                match m {
                    Value::Matrix(m) => Ok(Value::Scalar(m.get(r as usize, c as usize))),
                    Value::Scalar(_) => Ok(m),
                    Value::Text(_) => Err(SimError::mismatch("index", "text", "scalar")),
                }
            }
            Expr::Uniform(dims) => self.draws(dims, Resources::uniform),
            Expr::Gaussian(dims) => self.draws(dims, Resources::gaussian),
            Expr::Input { path, line, column, mode } => {
                let path = self.text(path, "input")?;
                let line = self.eval(line)?;
                let column = self.eval(column)?;
                self.resources.input(&path, &line, &column, *mode, self.dt)
            }
            Expr::Output { path, column, value } => {
                let path = match path {
                    Some(p) => Some(self.text(p, "output")?),
                    None => None,
                };
                let column = self.eval(column)?.to_string();
                let value = self.eval(value)?;
                self.resources
                    .output(path.as_deref(), self.time, &column, &value)?;
                Ok(value)
            }
            Expr::MatrixFile(path) => {
                let path = self.text(path, "matrix")?;
                Ok(Value::Matrix(self.resources.matrix(&path).as_ref().clone()))
            }
        }
    }
}

fn numeric(value: &Value, op: &'static str, f: fn(f64) -> f64) -> Result<Value> {
    match value {
        Value::Scalar(v) => Ok(Value::Scalar(f(*v))),
        Value::Matrix(m) => Ok(Value::Matrix(m.map(f))),
        Value::Text(_) => Err(SimError::mismatch(op, "text", "nothing")),
    }
}

pub(crate) fn unary(op: UnaryOp, value: &Value) -> Result<Value> {
    match op {
        UnaryOp::Negate => value.negate(),
        UnaryOp::Not => value.not(),
        UnaryOp::Transpose => value.transpose(),
        UnaryOp::Abs => numeric(value, "abs", f64::abs),
        UnaryOp::Exp => numeric(value, "exp", f64::exp),
        UnaryOp::Log => numeric(value, "log", f64::ln),
        UnaryOp::Sqrt => numeric(value, "sqrt", f64::sqrt),
        UnaryOp::Floor => numeric(value, "floor", f64::floor),
    }
}

pub(crate) fn binary(op: BinaryOp, a: &Value, b: &Value) -> Result<Value> {
    match op {
        BinaryOp::Add => a.add(b),
        BinaryOp::Subtract => a.subtract(b),
        BinaryOp::Multiply => a.multiply(b),
        BinaryOp::MultiplyElementwise => a.multiply_elementwise(b),
        BinaryOp::Divide => a.divide(b),
        BinaryOp::Modulo => a.modulo(b),
        BinaryOp::Power => a.power(b),
        BinaryOp::Min => a.min(b),
        BinaryOp::Max => a.max(b),
        BinaryOp::Equal => a.eq(b),
        BinaryOp::NotEqual => a.ne(b),
        BinaryOp::Greater => a.gt(b),
        BinaryOp::GreaterEqual => a.ge(b),
        BinaryOp::Less => a.lt(b),
        BinaryOp::LessEqual => a.le(b),
        BinaryOp::And => a.and(b),
        BinaryOp::Or => a.or(b),
    }
}
