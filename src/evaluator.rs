use crate::Error;
use crate::ast::{Closure, PrimitiveFn, Value, list};
use crate::builtinops::{OpKind, find_scheme_op, find_special_form, get_builtin_ops};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::trace;

pub(crate) mod specialforms;

/// One lexical scope: bindings in insertion order plus an optional parent.
///
/// Bindings are only ever appended; lookup scans newest first, so a later
/// entry for a name shadows every earlier entry for it in the same frame.
struct Frame {
    bindings: RefCell<Vec<(String, Value)>>,
    parent: Option<Environment>,
}

impl Frame {
    fn local(&self, name: &str) -> Option<Value> {
        self.bindings
            .borrow()
            .iter()
            .rev()
            .find(|(bound, _)| bound == name)
            .map(|(_, value)| value.clone())
    }

    fn contains(&self, name: &str) -> bool {
        self.bindings.borrow().iter().any(|(bound, _)| bound == name)
    }
}

/// Shared handle to a frame.
///
/// Cloning is cheap and yields another reference to the same frame, which is
/// how closures capture their defining scope. Parent links only point toward
/// the global frame.
#[derive(Clone)]
pub struct Environment(Rc<Frame>);

impl Environment {
    /// Create a root frame with no parent and no bindings
    pub fn new() -> Self {
        Environment(Rc::new(Frame {
            bindings: RefCell::new(Vec::new()),
            parent: None,
        }))
    }

    /// Create an empty frame whose parent is `parent`
    pub fn with_parent(parent: &Environment) -> Self {
        Environment(Rc::new(Frame {
            bindings: RefCell::new(Vec::new()),
            parent: Some(parent.clone()),
        }))
    }

    pub fn parent(&self) -> Option<&Environment> {
        self.0.parent.as_ref()
    }

    /// Add a binding to this frame. An existing binding of the same name is
    /// shadowed, not replaced.
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.0.bindings.borrow_mut().push((name.into(), value));
    }

    /// Find the newest binding of `name`, walking outward through parents
    pub fn get(&self, name: &str) -> Option<Value> {
        let mut frame = Some(self);
        while let Some(env) = frame {
            if let Some(value) = env.0.local(name) {
                return Some(value);
            }
            frame = env.parent();
        }
        None
    }

    /// Like [`Environment::get`], failing with `UnboundVariable` on a miss
    pub fn lookup(&self, name: &str) -> Result<Value, Error> {
        self.get(name)
            .ok_or_else(|| Error::UnboundVariable(name.to_owned()))
    }

    /// Rebind an existing name.
    ///
    /// The first frame (from this one outward) that binds `name` receives a
    /// new, shadowing entry; older entries stay in place. Fails with
    /// `UndefinedMutation` when no frame in the chain binds the name.
    pub fn set(&self, name: &str, value: Value) -> Result<(), Error> {
        let mut frame = Some(self);
        while let Some(env) = frame {
            if env.0.contains(name) {
                env.define(name, value);
                return Ok(());
            }
            frame = env.parent();
        }
        Err(Error::UndefinedMutation(name.to_owned()))
    }

    /// Bind a primitive procedure in this frame under `id`.
    ///
    /// # Example
    /// ```
    /// use framelisp::{Environment, Value, Error, eval};
    /// use framelisp::ast::{list, sym, val};
    ///
    /// fn answer(_args: &Value) -> Result<Value, Error> {
    ///     Ok(Value::Integer(42))
    /// }
    ///
    /// let env = Environment::new();
    /// env.register_primitive("answer", answer);
    /// assert_eq!(eval(&list(vec![sym("answer")]), &env), Ok(val(42)));
    /// ```
    pub fn register_primitive(&self, id: &'static str, func: PrimitiveFn) {
        self.define(id, Value::Primitive { id, func });
    }

    /// Get all visible bindings in this environment and its parents.
    /// Returns a Vec of (name, value) pairs sorted by name; shadowed entries are omitted.
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut chain = Vec::new();
        let mut frame = Some(self);
        while let Some(env) = frame {
            chain.push(env);
            frame = env.parent();
        }

        // Root first, so inner and newer entries override
        let mut bindings = HashMap::new();
        for env in chain.into_iter().rev() {
            for (name, value) in env.0.bindings.borrow().iter() {
                bindings.insert(name.clone(), value.clone());
            }
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }

    fn depth(&self) -> usize {
        std::iter::successors(self.parent(), |env| env.parent()).count()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Values may be closures capturing this very frame, so only names are shown
        let names: Vec<String> = self
            .0
            .bindings
            .borrow()
            .iter()
            .map(|(name, _)| name.clone())
            .collect();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("depth", &self.depth())
            .finish()
    }
}

/// Tunables for an [`Evaluator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalConfig {
    /// Maximum number of nested evaluations before `DepthExceeded` is raised
    pub max_depth: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            max_depth: crate::DEFAULT_MAX_EVAL_DEPTH,
        }
    }
}

/// Recursive expression evaluator.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    config: EvalConfig,
}

/// Evaluate an expression in `env` with the default configuration
pub fn eval(expr: &Value, env: &Environment) -> Result<Value, Error> {
    Evaluator::default().eval(expr, env)
}

/// Apply a closure to already evaluated arguments with the default configuration
pub fn apply(closure: &Closure, args: Vec<Value>) -> Result<Value, Error> {
    Evaluator::default().apply(closure, args)
}

impl Evaluator {
    pub fn new(config: EvalConfig) -> Self {
        Evaluator { config }
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Evaluate an expression (public API)
    pub fn eval(&self, expr: &Value, env: &Environment) -> Result<Value, Error> {
        self.eval_with_depth_tracking(expr, env, 0)
    }

    /// Apply a closure to already evaluated arguments (public API)
    pub fn apply(&self, closure: &Closure, args: Vec<Value>) -> Result<Value, Error> {
        self.apply_closure(closure, args, 0)
    }

    /// Evaluate an expression with depth tracking to prevent stack overflow
    pub(crate) fn eval_with_depth_tracking(
        &self,
        expr: &Value,
        env: &Environment,
        depth: usize,
    ) -> Result<Value, Error> {
        if depth >= self.config.max_depth {
            return Err(Error::DepthExceeded(self.config.max_depth));
        }
        ensure_sufficient_stack(|| self.dispatch(expr, env, depth))
    }

    fn dispatch(&self, expr: &Value, env: &Environment, depth: usize) -> Result<Value, Error> {
        match expr {
            // Self-evaluating forms, including the empty list
            Value::Integer(_)
            | Value::Double(_)
            | Value::Bool(_)
            | Value::String(_)
            | Value::Empty
            | Value::Closure(_)
            | Value::Primitive { .. }
            | Value::Void => Ok(expr.clone()),

            // Variable lookup
            Value::Symbol(name) => env.lookup(name),

            // Special form or procedure application
            Value::Pair(pair) => self
                .eval_pair(expr, &pair.head, &pair.tail, env, depth)
                .map_err(|err| add_context(err, expr)),
        }
    }

    fn eval_pair(
        &self,
        expr: &Value,
        head: &Value,
        tail: &Value,
        env: &Environment,
        depth: usize,
    ) -> Result<Value, Error> {
        // Keywords are matched before the head is treated as a variable, so
        // they cannot be shadowed by user bindings
        if let Value::Symbol(keyword) = head
            && let Some((handler, arity)) = find_special_form(keyword)
        {
            let operands = tail.list_items().ok_or_else(|| {
                Error::EvalError(format!("{keyword}: operands must form a proper list"))
            })?;
            arity.validate_for(keyword, operands.len())?;
            return handler(self, &operands, env, depth);
        }

        // Data that reached evaluation without an enclosing quote
        if !matches!(head, Value::Symbol(_) | Value::Pair(_)) {
            return Ok(expr.clone());
        }

        let operator = self.eval_with_depth_tracking(head, env, depth + 1)?;
        match operator {
            Value::Closure(closure) => {
                let args = self.eval_args(tail, env, depth)?;
                self.apply_closure(&closure, args, depth + 1)
            }
            Value::Primitive { id, func } => {
                let args = self.eval_args(tail, env, depth)?;
                // Registered primitives are checked against the registry arity
                if let Some(op) = find_scheme_op(id) {
                    op.validate_arity(args.len())?;
                }
                func(&list(args))
            }
            Value::Symbol(name) => Err(Error::NotAProcedure(name)),
            // Not callable: hand the expression back untouched
            _ => Ok(expr.clone()),
        }
    }

    /// Evaluate each argument expression once, left to right
    fn eval_args(&self, args: &Value, env: &Environment, depth: usize) -> Result<Vec<Value>, Error> {
        let mut evaluated = Vec::new();
        let mut remaining = args.iter();
        for arg in remaining.by_ref() {
            evaluated.push(self.eval_with_depth_tracking(arg, env, depth + 1)?);
        }
        match remaining.rest() {
            Value::Empty => Ok(evaluated),
            improper => Err(Error::EvalError(format!(
                "argument list must be a proper list, found tail {improper}"
            ))),
        }
    }

    /// Bind parameters in a fresh child of the captured frame and run the body
    pub(crate) fn apply_closure(
        &self,
        closure: &Closure,
        args: Vec<Value>,
        depth: usize,
    ) -> Result<Value, Error> {
        if closure.params.len() != args.len() {
            return Err(Error::arity_error(closure.params.len(), args.len()));
        }

        let frame = Environment::with_parent(&closure.env);
        for (param, arg) in closure.params.iter().zip(args) {
            frame.define(param.clone(), arg);
        }
        trace!(params = ?closure.params, frame_depth = frame.depth(), "applying closure");

        match unwrap_begin(&closure.body) {
            Some(forms) => self.eval_sequence(&forms, &frame, depth),
            None => self.eval_sequence(&closure.body, &frame, depth),
        }
    }

    /// Evaluate forms in order, each exactly once, yielding the last value
    pub(crate) fn eval_sequence(
        &self,
        forms: &[Value],
        env: &Environment,
        depth: usize,
    ) -> Result<Value, Error> {
        let mut result = Value::Void;
        for form in forms {
            result = self.eval_with_depth_tracking(form, env, depth + 1)?;
        }
        Ok(result)
    }
}

/// A lone `(begin e1 e2 ...)` body is flattened into its forms
fn unwrap_begin(body: &[Value]) -> Option<Vec<Value>> {
    match body {
        [Value::Pair(form)] if matches!(&form.head, Value::Symbol(s) if s == "begin") => form
            .tail
            .list_items()
            .filter(|forms| !forms.is_empty()),
        _ => None,
    }
}

const CONTEXT_MARKER: &str = "\n  Context: ";

/// Helper function to add expression context to errors.
/// Only the innermost failing expression is recorded.
fn add_context(error: Error, expr: &Value) -> Error {
    match error {
        Error::EvalError(msg) if !msg.contains(CONTEXT_MARKER) => {
            Error::EvalError(format!("{msg}{CONTEXT_MARKER}while evaluating: {expr}"))
        }
        Error::TypeError(msg) if !msg.contains(CONTEXT_MARKER) => {
            Error::TypeError(format!("{msg}{CONTEXT_MARKER}while evaluating: {expr}"))
        }
        // Unbound variables, arity and depth errors carry their own context
        other => other,
    }
}

/// Minimum stack space to keep available before recursing (100KB red zone)
#[cfg(not(target_arch = "wasm32"))]
const RED_ZONE: usize = 100 * 1024;

/// Stack space to allocate each time the red zone is hit (1MB)
#[cfg(not(target_arch = "wasm32"))]
const STACK_PER_RECURSION: usize = 1024 * 1024;

#[inline]
#[cfg(not(target_arch = "wasm32"))]
fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

/// Create a global environment with every primitive procedure bound
pub fn create_global_env() -> Environment {
    let env = Environment::new();

    for builtin_op in get_builtin_ops() {
        if let OpKind::Primitive(func) = builtin_op.op_kind {
            env.register_primitive(builtin_op.scheme_id, func);
        }
    }

    env
}
