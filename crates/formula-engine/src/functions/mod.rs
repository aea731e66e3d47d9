//! Function descriptors, signature checking and the registry.
//!
//! A function is a [`FunctionDef`]: arity, per-position parameter types and
//! evaluation modes, an optional check closure run by the binder, and an
//! [`Invoke`] strategy run by the interpreter. Builtins and host functions
//! go through the same registry.

mod builtins;
mod check;
mod mutation;
mod registry;

pub use check::{ArgError, ArgInfo, CheckContext, CheckFn, CheckOutcome};
pub use registry::{FunctionRegistry, Lookup};

use crate::cancel::CancellationToken;
use crate::error::{ConfigError, Result};
use crate::interpreter::CallContext;
use crate::value::FormulaValue;
use formula_types::DType;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

/// How the interpreter passes an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamMode {
    /// Evaluated before the call, left to right
    Eager,
    /// Evaluated by the function once per row of the first argument, with
    /// that row in scope
    Lambda,
    /// Evaluated by the function when (and if) it wants the value
    Lazy,
    /// A bare name, not resolved (`Set` target)
    Identifier,
}

/// Pure function over evaluated arguments.
pub type SyncFn = Arc<dyn Fn(&[FormulaValue]) -> FormulaValue + Send + Sync>;

/// Host function over evaluated arguments that may suspend.
pub type HostAsyncFn = Arc<
    dyn Fn(Vec<FormulaValue>, CancellationToken) -> BoxFuture<'static, Result<FormulaValue>>
        + Send
        + Sync,
>;

/// Function with access to the call context (lambdas, deferred arguments,
/// engine variables).
pub type ContextFn = for<'a> fn(CallContext<'a>) -> BoxFuture<'a, Result<FormulaValue>>;

#[derive(Clone)]
pub enum Invoke {
    Sync(SyncFn),
    Async(HostAsyncFn),
    Context(ContextFn),
}

/// Descriptor of one function overload.
#[derive(Clone)]
pub struct FunctionDef {
    /// Name as called, including a namespace prefix (`Math.Clamp`)
    pub name: String,
    pub min_arity: usize,
    pub max_arity: usize,
    /// Declared parameter types; the last one repeats
    pub params: Vec<DType>,
    /// Parameter modes; the last one repeats
    pub modes: Vec<ParamMode>,
    pub return_type: DType,
    /// Only allowed in formulas with side effects enabled
    pub is_behavior: bool,
    /// Error arguments short-circuit the call (eager invokes only)
    pub propagates_errors: bool,
    pub check: Option<CheckFn>,
    pub invoke: Invoke,
}

impl FunctionDef {
    fn with_invoke(name: impl Into<String>, params: Vec<DType>, return_type: DType, invoke: Invoke) -> Self {
        let arity = params.len();
        Self {
            name: name.into(),
            min_arity: arity,
            max_arity: arity,
            params,
            modes: vec![ParamMode::Eager],
            return_type,
            is_behavior: false,
            propagates_errors: true,
            check: None,
            invoke,
        }
    }

    pub fn sync<F>(name: impl Into<String>, params: Vec<DType>, return_type: DType, f: F) -> Self
    where
        F: Fn(&[FormulaValue]) -> FormulaValue + Send + Sync + 'static,
    {
        Self::with_invoke(name, params, return_type, Invoke::Sync(Arc::new(f)))
    }

    pub fn host_async<F>(name: impl Into<String>, params: Vec<DType>, return_type: DType, f: F) -> Self
    where
        F: Fn(Vec<FormulaValue>, CancellationToken) -> BoxFuture<'static, Result<FormulaValue>>
            + Send
            + Sync
            + 'static,
    {
        Self::with_invoke(name, params, return_type, Invoke::Async(Arc::new(f)))
    }

    pub fn with_context(
        name: impl Into<String>,
        params: Vec<DType>,
        return_type: DType,
        f: ContextFn,
    ) -> Self {
        Self::with_invoke(name, params, return_type, Invoke::Context(f))
    }

    pub fn with_arity(mut self, min: usize, max: usize) -> Self {
        self.min_arity = min;
        self.max_arity = max;
        self
    }

    /// Any number of arguments from `min_arity` on.
    pub fn variadic(mut self) -> Self {
        self.max_arity = usize::MAX;
        self
    }

    pub fn with_modes(mut self, modes: Vec<ParamMode>) -> Self {
        self.modes = modes;
        self
    }

    pub fn behavior(mut self) -> Self {
        self.is_behavior = true;
        self
    }

    /// Receive error arguments instead of short-circuiting on them.
    pub fn keeps_errors(mut self) -> Self {
        self.propagates_errors = false;
        self
    }

    pub fn with_check<F>(mut self, f: F) -> Self
    where
        F: Fn(&CheckContext<'_>) -> CheckOutcome + Send + Sync + 'static,
    {
        self.check = Some(Arc::new(f));
        self
    }

    pub fn mode(&self, index: usize) -> ParamMode {
        repeat_last(&self.modes, index).copied().unwrap_or(ParamMode::Eager)
    }

    pub fn param(&self, index: usize) -> DType {
        repeat_last(&self.params, index).cloned().unwrap_or(DType::Unknown)
    }

    pub fn accepts_arity(&self, arity: usize) -> bool {
        (self.min_arity..=self.max_arity).contains(&arity)
    }

    pub fn is_async(&self) -> bool {
        !matches!(self.invoke, Invoke::Sync(_))
    }

    /// Host contract checks performed at registration.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.min_arity > self.max_arity {
            return Err(ConfigError::InvalidArity {
                name: self.name.clone(),
                min: self.min_arity,
                max: self.max_arity,
            });
        }
        let eager_only = self.modes.iter().all(|m| *m == ParamMode::Eager);
        if !eager_only && !matches!(self.invoke, Invoke::Context(_)) {
            return Err(ConfigError::NonEagerParams {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn check_call(&self, ctx: &CheckContext<'_>) -> CheckOutcome {
        match &self.check {
            Some(check) => check(ctx),
            None => check::check_params(ctx),
        }
    }
}

fn repeat_last<T>(items: &[T], index: usize) -> Option<&T> {
    items.get(index).or_else(|| items.last())
}

impl fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDef")
            .field("name", &self.name)
            .field("min_arity", &self.min_arity)
            .field("max_arity", &self.max_arity)
            .field("return_type", &self.return_type)
            .field("is_behavior", &self.is_behavior)
            .field("is_async", &self.is_async())
            .finish_non_exhaustive()
    }
}
