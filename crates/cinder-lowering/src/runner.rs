//! Reference evaluator for lowered state machines.
//!
//! A direct tree-walking interpreter over the bound tree, used by tests and
//! by `cinder run` to observe the behaviour of generated code: values handed
//! out by `MoveNext`, the order host calls happen in, and which finally
//! blocks run on `Dispose`.
//!
//! ## Control flow
//!
//! Executing a statement yields a `Flow`. A `goto` produces `Flow::Jump`,
//! which bubbles up until a block finds a child declaring the label (see
//! `BoundStatement::declares_entry_label`) and re-enters that child at the
//! label. A jump that bubbles out of a try block runs the finally block on
//! the way out, like a real `leave`.
//!
//! Exceptions travel as `Unwind::Throw` and run finally and fault handlers;
//! internal failures travel as `Unwind::Fatal` and run nothing.
//!
//! ## Host calls
//!
//! Calls to `Callee::Host` are recorded in the trace as `Name(args)` and
//! return `null`, or throw when the name was registered with `fail_on`.
//!
//! ## Storage
//!
//! Every instance owns its fields and its locals. Locals therefore survive
//! across `MoveNext` calls, which is what the lowered body expects.

use crate::error::RunError;
use crate::shape::{CURRENT_THREAD_ID, IteratorStateMachine};
use crate::state::StateNumber;
use cinder_bound::{
    BinaryOp, BoundCatchBlock, BoundExpr, BoundStatement, BoundSwitchSection, Callee, LabelId,
    Literal, LocalId, MethodId,
};
use cinder_common::limits::{MAX_EVAL_CALL_DEPTH, MAX_EVAL_STEPS};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use tracing::trace;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Null,
    Int(i64),
    Bool(bool),
    Str(String),
    /// A state machine instance, by index.
    Instance(usize),
    /// Any other object, by type name.
    Object(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Str(value) => f.write_str(value),
            Self::Instance(index) => write!(f, "<instance #{index}>"),
            Self::Object(type_name) => write!(f, "<{type_name}>"),
        }
    }
}

impl Value {
    const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int(_) => "int",
            Self::Bool(_) => "bool",
            Self::Str(_) => "string",
            Self::Instance(_) => "instance",
            Self::Object(_) => "object",
        }
    }
}

enum Flow {
    Normal,
    Jump(LabelId),
    Return(Value),
}

enum Unwind {
    Throw(Value),
    Fatal(RunError),
}

impl From<RunError> for Unwind {
    fn from(error: RunError) -> Self {
        Self::Fatal(error)
    }
}

impl From<Unwind> for RunError {
    fn from(unwind: Unwind) -> Self {
        match unwind {
            Unwind::Throw(value) => Self::Unhandled(value.to_string()),
            Unwind::Fatal(error) => error,
        }
    }
}

type Exec<T> = Result<T, Unwind>;

#[derive(Default)]
struct InstanceData {
    fields: FxHashMap<u32, Value>,
    locals: FxHashMap<LocalId, Value>,
}

/// One method invocation.
struct Activation {
    this: Option<usize>,
    args: Vec<Value>,
    /// Locals of static methods (instance methods use the instance's).
    locals: FxHashMap<LocalId, Value>,
}

pub struct StateMachineRunner<'m> {
    machine: &'m IteratorStateMachine,
    instances: Vec<InstanceData>,
    trace: Vec<String>,
    fail_on: FxHashSet<String>,
    thread_id: i64,
    steps: u64,
    call_depth: u32,
}

impl<'m> StateMachineRunner<'m> {
    pub fn new(machine: &'m IteratorStateMachine) -> Self {
        Self {
            machine,
            instances: Vec::new(),
            trace: Vec::new(),
            fail_on: FxHashSet::default(),
            thread_id: 1,
            steps: 0,
            call_depth: 0,
        }
    }

    /// Make host calls to `name` throw.
    pub fn fail_on(mut self, name: impl Into<String>) -> Self {
        self.fail_on.insert(name.into());
        self
    }

    /// Id reported by the thread-id host call from now on.
    pub const fn set_thread_id(&mut self, thread_id: i64) {
        self.thread_id = thread_id;
    }

    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    pub fn take_trace(&mut self) -> Vec<String> {
        std::mem::take(&mut self.trace)
    }

    // =========================================================================
    // Protocol
    // =========================================================================

    /// Call the kick-off method, returning the new instance.
    pub fn kick_off(&mut self) -> Result<usize, RunError> {
        let value = self.call_top(self.machine.members.kick_off, None)?;
        Self::expect_instance(value)
    }

    /// `GetEnumerator` for enumerables; enumerators are their own enumerator.
    pub fn get_enumerator(&mut self, instance: usize) -> Result<usize, RunError> {
        match self.machine.members.get_enumerator {
            Some(method) => {
                let value = self.call_top(method, Some(instance))?;
                Self::expect_instance(value)
            }
            None => Ok(instance),
        }
    }

    pub fn move_next(&mut self, instance: usize) -> Result<bool, RunError> {
        match self.call_top(self.machine.members.move_next, Some(instance))? {
            Value::Bool(more) => Ok(more),
            other => Err(RunError::TypeMismatch {
                expected: "bool",
                found: other.type_name().to_string(),
            }),
        }
    }

    pub fn current(&mut self, instance: usize) -> Result<Value, RunError> {
        self.call_top(self.machine.members.current_getter, Some(instance))
    }

    pub fn dispose(&mut self, instance: usize) -> Result<(), RunError> {
        self.call_top(self.machine.members.dispose, Some(instance))
            .map(|_| ())
    }

    pub fn reset(&mut self, instance: usize) -> Result<(), RunError> {
        self.call_top(self.machine.members.reset, Some(instance))
            .map(|_| ())
    }

    pub fn state(&self, instance: usize) -> Result<StateNumber, RunError> {
        let data = self
            .instances
            .get(instance)
            .ok_or(RunError::UnknownInstance(instance))?;
        match data.fields.get(&self.machine.state_field.0) {
            Some(Value::Int(state)) => Ok(*state as StateNumber),
            Some(other) => Err(RunError::TypeMismatch {
                expected: "int",
                found: other.type_name().to_string(),
            }),
            None => Ok(0),
        }
    }

    pub fn set_state(&mut self, instance: usize, state: StateNumber) -> Result<(), RunError> {
        let field = self.machine.state_field.0;
        let data = self
            .instances
            .get_mut(instance)
            .ok_or(RunError::UnknownInstance(instance))?;
        data.fields.insert(field, Value::Int(i64::from(state)));
        Ok(())
    }

    /// Kick off, get an enumerator and pull up to `take` values (all when
    /// `None`). With `dispose`, the enumerator is disposed afterwards, as a
    /// `foreach` would.
    pub fn enumerate(&mut self, take: Option<usize>, dispose: bool) -> Result<Vec<Value>, RunError> {
        let mut values = Vec::new();
        self.enumerate_into(&mut values, take, dispose)?;
        Ok(values)
    }

    /// [`enumerate`](Self::enumerate) into `values`, which keeps whatever
    /// was yielded before an error.
    pub fn enumerate_into(
        &mut self,
        values: &mut Vec<Value>,
        take: Option<usize>,
        dispose: bool,
    ) -> Result<(), RunError> {
        let enumerable = self.kick_off()?;
        let enumerator = self.get_enumerator(enumerable)?;
        let start = values.len();
        while take.is_none_or(|n| values.len() - start < n) && self.move_next(enumerator)? {
            values.push(self.current(enumerator)?);
        }
        if dispose {
            self.dispose(enumerator)?;
        }
        Ok(())
    }

    fn expect_instance(value: Value) -> Result<usize, RunError> {
        match value {
            Value::Instance(index) => Ok(index),
            other => Err(RunError::TypeMismatch {
                expected: "instance",
                found: other.type_name().to_string(),
            }),
        }
    }

    fn call_top(&mut self, method: MethodId, this: Option<usize>) -> Result<Value, RunError> {
        self.steps = 0;
        self.call_depth = 0;
        Ok(self.call(method, this, Vec::new())?)
    }

    // =========================================================================
    // Calls
    // =========================================================================

    fn call(&mut self, method: MethodId, this: Option<usize>, args: Vec<Value>) -> Exec<Value> {
        let machine = self.machine;
        let body = machine
            .body(method)
            .ok_or(RunError::UnknownMethod(method.0))?;
        if self.call_depth >= MAX_EVAL_CALL_DEPTH {
            return Err(RunError::CallDepthExceeded(MAX_EVAL_CALL_DEPTH).into());
        }
        if let Some(index) = this
            && index >= self.instances.len()
        {
            return Err(RunError::UnknownInstance(index).into());
        }

        trace!(method = machine.tables.method_name(method), ?this, "call");
        let mut activation = Activation {
            this,
            args,
            locals: FxHashMap::default(),
        };
        self.call_depth += 1;
        let result = self.exec(body, None, &mut activation);
        self.call_depth -= 1;

        match result? {
            Flow::Normal => Ok(Value::Null),
            Flow::Return(value) => Ok(value),
            Flow::Jump(label) => Err(self.unknown_label(label).into()),
        }
    }

    fn host_call(&mut self, name: &str, args: &[Value]) -> Exec<Value> {
        if name == CURRENT_THREAD_ID {
            return Ok(Value::Int(self.thread_id));
        }
        let rendered: Vec<String> = args
            .iter()
            .map(|arg| match arg {
                Value::Str(s) => format!("{s:?}"),
                other => other.to_string(),
            })
            .collect();
        self.trace.push(format!("{name}({})", rendered.join(", ")));
        if self.fail_on.contains(name) {
            return Err(Unwind::Throw(Value::Str(format!("{name} failed"))));
        }
        Ok(Value::Null)
    }

    fn new_object(&mut self, type_name: &str, args: Vec<Value>) -> Exec<Value> {
        if type_name != self.machine.name {
            return Ok(Value::Object(type_name.to_string()));
        }
        let index = self.instances.len();
        self.instances.push(InstanceData::default());
        self.call(self.machine.members.constructor, Some(index), args)?;
        Ok(Value::Instance(index))
    }

    fn unknown_label(&self, label: LabelId) -> RunError {
        RunError::UnknownLabel(self.machine.tables.label_name(label).to_string())
    }

    // =========================================================================
    // Statements
    // =========================================================================

    /// Execute `statement`, starting at `entry` when given.
    fn exec(
        &mut self,
        statement: &'m BoundStatement,
        entry: Option<LabelId>,
        act: &mut Activation,
    ) -> Exec<Flow> {
        self.steps += 1;
        if self.steps > MAX_EVAL_STEPS {
            return Err(RunError::StepLimitExceeded(MAX_EVAL_STEPS).into());
        }

        match statement {
            BoundStatement::Block(statements) => self.exec_block(statements, entry, act),
            BoundStatement::Label(_) => Ok(Flow::Normal),
            BoundStatement::Expression(expr) => {
                self.eval(expr, act)?;
                Ok(Flow::Normal)
            }
            BoundStatement::Goto(label) => Ok(Flow::Jump(*label)),
            BoundStatement::ConditionalGoto {
                condition,
                jump_if_true,
                label,
            } => {
                let value = self.eval_bool(condition, act)?;
                Ok(if value == *jump_if_true {
                    Flow::Jump(*label)
                } else {
                    Flow::Normal
                })
            }
            BoundStatement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if let Some(label) = entry {
                    if then_branch.declares_entry_label(label) {
                        return self.exec(then_branch, entry, act);
                    }
                    return match else_branch {
                        Some(else_branch) => self.exec(else_branch, entry, act),
                        None => Ok(Flow::Jump(label)),
                    };
                }
                if self.eval_bool(condition, act)? {
                    self.exec(then_branch, None, act)
                } else if let Some(else_branch) = else_branch {
                    self.exec(else_branch, None, act)
                } else {
                    Ok(Flow::Normal)
                }
            }
            BoundStatement::Switch {
                expression,
                sections,
            } => self.exec_switch(expression, sections, entry, act),
            BoundStatement::Try {
                try_block,
                catch_blocks,
                finally_block,
                prefer_fault_handler,
                ..
            } => self.exec_try(
                try_block,
                catch_blocks,
                finally_block.as_deref(),
                *prefer_fault_handler,
                entry,
                act,
            ),
            BoundStatement::YieldReturn { .. } | BoundStatement::YieldBreak => {
                Err(RunError::UnloweredYield.into())
            }
            BoundStatement::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr, act)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            BoundStatement::Throw(expr) => {
                let value = self.eval(expr, act)?;
                Err(Unwind::Throw(value))
            }
        }
    }

    fn exec_block(
        &mut self,
        statements: &'m [BoundStatement],
        mut entry: Option<LabelId>,
        act: &mut Activation,
    ) -> Exec<Flow> {
        let mut index = 0;
        loop {
            let flow = match entry.take() {
                Some(label) => {
                    let Some(position) = statements
                        .iter()
                        .position(|s| s.declares_entry_label(label))
                    else {
                        return Ok(Flow::Jump(label));
                    };
                    index = position;
                    self.exec(&statements[index], Some(label), act)?
                }
                None => match statements.get(index) {
                    Some(statement) => self.exec(statement, None, act)?,
                    None => return Ok(Flow::Normal),
                },
            };
            match flow {
                Flow::Normal => index += 1,
                Flow::Jump(label) => entry = Some(label),
                Flow::Return(value) => return Ok(Flow::Return(value)),
            }
        }
    }

    fn exec_switch(
        &mut self,
        expression: &BoundExpr,
        sections: &'m [BoundSwitchSection],
        mut entry: Option<LabelId>,
        act: &mut Activation,
    ) -> Exec<Flow> {
        let mut section = match entry {
            Some(label) => sections
                .iter()
                .position(|s| s.body.iter().any(|st| st.declares_entry_label(label))),
            None => {
                let value = self.eval_int(expression, act)?;
                sections.iter().position(|s| s.values.contains(&value))
            }
        };
        loop {
            let Some(index) = section else {
                return Ok(match entry {
                    Some(label) => Flow::Jump(label),
                    None => Flow::Normal,
                });
            };
            match self.exec_block(&sections[index].body, entry.take(), act)? {
                // a jump may land in a sibling section
                Flow::Jump(label) => {
                    section = sections
                        .iter()
                        .position(|s| s.body.iter().any(|st| st.declares_entry_label(label)));
                    entry = Some(label);
                }
                other => return Ok(other),
            }
        }
    }

    fn exec_try(
        &mut self,
        try_block: &'m BoundStatement,
        catch_blocks: &'m [BoundCatchBlock],
        finally_block: Option<&'m BoundStatement>,
        prefer_fault_handler: bool,
        entry: Option<LabelId>,
        act: &mut Activation,
    ) -> Exec<Flow> {
        let mut result = self.exec(try_block, entry, act);

        // catch clauses are catch-all; the first one wins
        if let Some(catch) = catch_blocks.first() {
            result = match result {
                Err(Unwind::Throw(value)) => {
                    if let Some(local) = catch.local {
                        self.set_local(act, local, value);
                    }
                    self.exec(&catch.body, None, act)
                }
                other => other,
            };
        }

        if let Some(handler) = finally_block {
            let run_handler = match &result {
                Err(Unwind::Fatal(_)) => false,
                Err(Unwind::Throw(_)) => true,
                Ok(_) => !prefer_fault_handler,
            };
            if run_handler {
                // an exception thrown by the handler replaces the pending one
                match self.exec(handler, None, act)? {
                    Flow::Normal => {}
                    other => return Ok(other),
                }
            }
        }
        result
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn eval(&mut self, expr: &BoundExpr, act: &mut Activation) -> Exec<Value> {
        match expr {
            BoundExpr::Literal(literal) => Ok(match literal {
                Literal::Null => Value::Null,
                Literal::Bool(value) => Value::Bool(*value),
                Literal::Int(value) => Value::Int(*value),
                Literal::Str(value) => Value::Str(value.clone()),
            }),
            BoundExpr::Local(local) => Ok(self.get_local(act, *local)),
            BoundExpr::Parameter(index) => act
                .args
                .get(*index as usize)
                .cloned()
                .ok_or_else(|| RunError::UnknownParameter(*index).into()),
            BoundExpr::This => act
                .this
                .map(Value::Instance)
                .ok_or_else(|| RunError::NoReceiver.into()),
            BoundExpr::Field { receiver, field } => {
                let instance = self.eval_instance(receiver, act)?;
                Ok(self.instances[instance]
                    .fields
                    .get(&field.0)
                    .cloned()
                    .unwrap_or(Value::Null))
            }
            BoundExpr::Assign { target, value } => {
                let value = self.eval(value, act)?;
                match target.as_ref() {
                    BoundExpr::Local(local) => self.set_local(act, *local, value.clone()),
                    BoundExpr::Field { receiver, field } => {
                        let instance = self.eval_instance(receiver, act)?;
                        self.instances[instance]
                            .fields
                            .insert(field.0, value.clone());
                    }
                    _ => return Err(RunError::NotAssignable.into()),
                }
                Ok(value)
            }
            BoundExpr::Binary { op, left, right } => self.eval_binary(*op, left, right, act),
            BoundExpr::Not(operand) => Ok(Value::Bool(!self.eval_bool(operand, act)?)),
            BoundExpr::Call {
                receiver,
                callee,
                args,
            } => {
                let this = match receiver {
                    Some(receiver) => Some(self.eval_instance(receiver, act)?),
                    None => act.this,
                };
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, act)?);
                }
                match callee {
                    Callee::Synthesized(method) => self.call(*method, this, values),
                    Callee::Host(name) => self.host_call(name, &values),
                }
            }
            BoundExpr::New { type_name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, act)?);
                }
                self.new_object(type_name, values)
            }
        }
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        left: &BoundExpr,
        right: &BoundExpr,
        act: &mut Activation,
    ) -> Exec<Value> {
        match op {
            BinaryOp::And => {
                let value = self.eval_bool(left, act)? && self.eval_bool(right, act)?;
                return Ok(Value::Bool(value));
            }
            BinaryOp::Or => {
                let value = self.eval_bool(left, act)? || self.eval_bool(right, act)?;
                return Ok(Value::Bool(value));
            }
            _ => {}
        }

        let left = self.eval(left, act)?;
        let right = self.eval(right, act)?;
        match (op, left, right) {
            (BinaryOp::Eq, l, r) => Ok(Value::Bool(l == r)),
            (BinaryOp::Ne, l, r) => Ok(Value::Bool(l != r)),
            (BinaryOp::Add, Value::Str(l), r) => Ok(Value::Str(format!("{l}{r}"))),
            (op, Value::Int(l), Value::Int(r)) => Ok(match op {
                BinaryOp::Add => Value::Int(l.wrapping_add(r)),
                BinaryOp::Sub => Value::Int(l.wrapping_sub(r)),
                BinaryOp::Mul => Value::Int(l.wrapping_mul(r)),
                BinaryOp::Lt => Value::Bool(l < r),
                BinaryOp::Le => Value::Bool(l <= r),
                BinaryOp::Gt => Value::Bool(l > r),
                BinaryOp::Ge => Value::Bool(l >= r),
                BinaryOp::Eq | BinaryOp::Ne | BinaryOp::And | BinaryOp::Or => Value::Null,
            }),
            (_, l, r) => Err(RunError::TypeMismatch {
                expected: "int",
                found: format!("{} and {}", l.type_name(), r.type_name()),
            }
            .into()),
        }
    }

    fn eval_bool(&mut self, expr: &BoundExpr, act: &mut Activation) -> Exec<bool> {
        match self.eval(expr, act)? {
            Value::Bool(value) => Ok(value),
            other => Err(RunError::TypeMismatch {
                expected: "bool",
                found: other.type_name().to_string(),
            }
            .into()),
        }
    }

    fn eval_int(&mut self, expr: &BoundExpr, act: &mut Activation) -> Exec<i64> {
        match self.eval(expr, act)? {
            Value::Int(value) => Ok(value),
            other => Err(RunError::TypeMismatch {
                expected: "int",
                found: other.type_name().to_string(),
            }
            .into()),
        }
    }

    fn eval_instance(&mut self, expr: &BoundExpr, act: &mut Activation) -> Exec<usize> {
        match self.eval(expr, act)? {
            Value::Instance(index) if index < self.instances.len() => Ok(index),
            Value::Instance(index) => Err(RunError::UnknownInstance(index).into()),
            other => Err(RunError::TypeMismatch {
                expected: "instance",
                found: other.type_name().to_string(),
            }
            .into()),
        }
    }

    fn get_local(&self, act: &Activation, local: LocalId) -> Value {
        let locals = match act.this {
            Some(index) => &self.instances[index].locals,
            None => &act.locals,
        };
        locals.get(&local).cloned().unwrap_or(Value::Null)
    }

    fn set_local(&mut self, act: &mut Activation, local: LocalId, value: Value) {
        match act.this {
            Some(index) => {
                self.instances[index].locals.insert(local, value);
            }
            None => {
                act.locals.insert(local, value);
            }
        }
    }
}

#[cfg(test)]
#[path = "../tests/runner_tests.rs"]
mod tests;
