//! Tree-walking evaluation over a bound formula.
//!
//! Evaluation is depth-first and strictly left to right. Each node's value
//! is converted with the coercion the binder recorded for it, and runtime
//! errors pick up the span of the innermost node that produced them.
//!
//! Runtime scopes mirror the binder's: frame 0 is the rule record and every
//! lambda row pushes a frame, so a bound `ScopeField { scope, .. }` indexes
//! the frame directly.
//!
//! `Err` is reserved for cancellation and host faults; everything a formula
//! can get wrong is a [`FormulaValue::Error`].

pub(crate) mod coerce;
pub(crate) mod ops;

use crate::binder::{BindKind, Binding};
use crate::cancel::CancellationToken;
use crate::error::{EvalError, Result};
use crate::functions::{Invoke, ParamMode};
use crate::value::{DValue, ErrorCode, ErrorValue, FormulaValue, RecordValue, TableRef, table_value};
use formula_ast::{BinaryOp, Expr, ExprKind, Span};
use formula_types::{DType, EnumLiteral, RecordType};
use futures::FutureExt;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{instrument, trace};

/// Row frames visible to an expression.
#[derive(Debug, Clone)]
pub(crate) struct Scope {
    frames: Vec<RecordValue>,
    depth: usize,
}

impl Scope {
    fn new(rule: RecordValue) -> Self {
        Self {
            frames: vec![rule],
            depth: 0,
        }
    }

    fn with_row(&self, row: RecordValue) -> Self {
        let mut frames = self.frames.clone();
        frames.push(row);
        Self {
            frames,
            depth: self.depth,
        }
    }

    fn frame(&self, index: usize) -> Option<&RecordValue> {
        self.frames.get(index)
    }

    fn deeper(&self) -> Self {
        Self {
            frames: self.frames.clone(),
            depth: self.depth + 1,
        }
    }
}

/// Argument as handed to a context function.
#[derive(Debug)]
pub enum ArgValue<'a> {
    Value(FormulaValue),
    /// Lambda or lazy argument, evaluated on demand
    Deferred(Lambda<'a>),
    /// Identifier parameter
    Name(String),
}

/// Unevaluated argument with the scope of its call site.
#[derive(Debug)]
pub struct Lambda<'a> {
    expr: &'a Expr,
    scope: Scope,
}

/// Evaluation state of one formula run.
#[derive(Debug)]
pub struct Interpreter {
    binding: Arc<Binding>,
    /// Never locked across an await
    globals: Mutex<IndexMap<String, FormulaValue>>,
    self_value: Option<FormulaValue>,
    parent_value: Option<FormulaValue>,
    cancel: CancellationToken,
    max_call_depth: usize,
}

impl Interpreter {
    pub fn new(
        binding: Arc<Binding>,
        globals: IndexMap<String, FormulaValue>,
        cancel: CancellationToken,
        max_call_depth: usize,
    ) -> Self {
        Self {
            binding,
            globals: Mutex::new(globals),
            self_value: None,
            parent_value: None,
            cancel,
            max_call_depth,
        }
    }

    /// Values for `Self` and `Parent`.
    pub fn with_host_objects(
        mut self,
        self_value: Option<FormulaValue>,
        parent_value: Option<FormulaValue>,
    ) -> Self {
        self.self_value = self_value;
        self.parent_value = parent_value;
        self
    }

    /// Evaluate `root` with `rule` as the rule scope.
    #[instrument(skip_all, name = "eval")]
    pub async fn run(&self, root: &Expr, rule: RecordValue) -> Result<FormulaValue> {
        self.cancel.check()?;
        let scope = Scope::new(rule);
        let value = self.eval(root, &scope).await?;
        trace!(result = %value, "evaluated");
        Ok(value)
    }

    /// Globals after the run, including variables assigned by `Set`.
    pub fn into_globals(self) -> IndexMap<String, FormulaValue> {
        self.globals
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    fn global(&self, name: &str) -> Option<FormulaValue> {
        self.globals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn set_global(&self, name: &str, value: FormulaValue) {
        self.globals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value);
    }

    pub(crate) fn eval<'s>(
        &'s self,
        expr: &'s Expr,
        scope: &'s Scope,
    ) -> BoxFuture<'s, Result<FormulaValue>> {
        async move {
            let value = self.eval_node(expr, scope).await?;
            let value = match self.binding.coercion(expr.id) {
                Some(ty) => coerce::coerce(value, ty),
                None => value,
            };
            Ok(match value {
                FormulaValue::Error(e) => FormulaValue::Error(e.with_span(expr.span)),
                value => value,
            })
        }
        .boxed()
    }

    async fn eval_node(&self, expr: &Expr, scope: &Scope) -> Result<FormulaValue> {
        match &expr.kind {
            // === Literals ===
            ExprKind::BoolLit(b) => Ok(FormulaValue::Boolean(*b)),
            ExprKind::NumLit(n) => Ok(FormulaValue::Number(*n)),
            ExprKind::DecLit(d) => Ok(FormulaValue::Decimal(*d)),
            ExprKind::StrLit(s) => Ok(FormulaValue::String(s.clone())),
            ExprKind::StrInterp(parts) => {
                let mut text = String::new();
                for part in parts {
                    let value = self.eval(part, scope).await?;
                    match value.to_text() {
                        Some(piece) => text.push_str(&piece),
                        None if value.is_error() => return Ok(value),
                        None => {
                            return Ok(FormulaValue::error(
                                ErrorCode::TypeMismatch,
                                format!("{value} has no text form"),
                            ));
                        }
                    }
                }
                Ok(FormulaValue::String(text))
            }

            // === Operators ===
            ExprKind::Unary { op, operand } => {
                let value = self.eval(operand, scope).await?;
                Ok(ops::unary(*op, value))
            }
            ExprKind::Binary { op, left, right } => self.eval_binary(*op, left, right, scope).await,
            ExprKind::Variadic { children, .. } => {
                let mut last = FormulaValue::Blank;
                for child in children {
                    last = self.eval(child, scope).await?;
                }
                Ok(last)
            }

            // === Names and calls ===
            ExprKind::Call { args, .. } => self.eval_call(expr, args, scope).await,
            ExprKind::FirstName(ident) => self.eval_name(expr, &ident.name, scope),
            ExprKind::DottedName { left, right } => {
                if let Some(BindKind::EnumMember { value }) = self.binding.kind(expr.id) {
                    return Ok(enum_value(value));
                }
                let value = self.eval(left, scope).await?;
                let field = match self.binding.kind(expr.id) {
                    Some(BindKind::Field { field }) => field.as_str(),
                    _ => right.name.as_str(),
                };
                self.eval_field(value, field).await
            }
            ExprKind::SelfRef => Ok(self.self_value.clone().unwrap_or(FormulaValue::Blank)),
            ExprKind::ParentRef => Ok(self.parent_value.clone().unwrap_or(FormulaValue::Blank)),

            // === Aggregates ===
            ExprKind::Record(fields) => {
                let ty = self
                    .binding
                    .ty(expr.id)
                    .record_type()
                    .cloned()
                    .unwrap_or_default();
                let mut values = IndexMap::with_capacity(fields.len());
                for (name, value) in fields {
                    values.insert(name.name.clone(), self.eval(value, scope).await?);
                }
                Ok(FormulaValue::Record(RecordValue::new(ty, values)))
            }
            ExprKind::Table(rows) => {
                let ty = self
                    .binding
                    .ty(expr.id)
                    .record_type()
                    .cloned()
                    .unwrap_or_default();
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    out.push(match self.eval(row, scope).await? {
                        FormulaValue::Record(r) => DValue::Value(r),
                        FormulaValue::Error(e) => DValue::Error(e),
                        FormulaValue::Blank => DValue::Blank,
                        scalar => DValue::Value(RecordValue::from_fields([("Value", scalar)])),
                    });
                }
                Ok(table_value(ty, out))
            }
            ExprKind::As { left, .. } => self.eval(left, scope).await,

            ExprKind::Blank => Ok(FormulaValue::Blank),
            ExprKind::Error(message) => Err(EvalError::Internal(format!(
                "evaluated a syntax error node: {message}"
            ))),
        }
    }

    fn eval_name(&self, expr: &Expr, name: &str, scope: &Scope) -> Result<FormulaValue> {
        let missing_frame = || EvalError::Internal(format!("no row scope for '{name}'"));
        match self.binding.kind(expr.id) {
            Some(BindKind::Global { name }) => Ok(self.global(name).unwrap_or(FormulaValue::Blank)),
            Some(BindKind::ScopeField { scope: index, field }) => scope
                .frame(*index)
                .map(|row| row.field(field))
                .ok_or_else(missing_frame),
            Some(BindKind::ThisRecord { scope: index } | BindKind::Alias { scope: index }) => scope
                .frame(*index)
                .map(|row| FormulaValue::Record(row.clone()))
                .ok_or_else(missing_frame),
            Some(BindKind::EnumMember { value }) => Ok(enum_value(value)),
            Some(BindKind::Enum) => Ok(FormulaValue::error(
                ErrorCode::NotSupported,
                format!("'{name}' is a type, not a value"),
            )),
            Some(BindKind::SelfRef) => Ok(self.self_value.clone().unwrap_or(FormulaValue::Blank)),
            Some(BindKind::ParentRef) => Ok(self.parent_value.clone().unwrap_or(FormulaValue::Blank)),
            Some(BindKind::Field { .. } | BindKind::Unknown) | None => {
                Err(EvalError::NotBound(expr.span.start as usize))
            }
        }
    }

    async fn eval_field(&self, value: FormulaValue, field: &str) -> Result<FormulaValue> {
        match value {
            FormulaValue::Record(record) => Ok(record.field(field)),
            FormulaValue::Table(table) => self.project_column(&table, field).await,
            FormulaValue::UntypedObject(object) => Ok(match object.get(field) {
                Some(inner) => FormulaValue::UntypedObject(Arc::new(inner.clone())),
                None => FormulaValue::Blank,
            }),
            FormulaValue::Blank => Ok(FormulaValue::Blank),
            FormulaValue::Error(e) => Ok(FormulaValue::Error(e)),
            other => Ok(FormulaValue::error(
                ErrorCode::TypeMismatch,
                format!("{other} has no field '{field}'"),
            )),
        }
    }

    /// `T.col`: one-column table, row errors kept in place.
    async fn project_column(&self, table: &TableRef, field: &str) -> Result<FormulaValue> {
        let field_ty = table
            .record_type()
            .field_type(field)
            .unwrap_or(DType::Unknown);
        let ty = RecordType::empty().with_field(field, field_ty);
        let rows = table.rows(&self.cancel).await?;
        let projected = rows
            .into_iter()
            .map(|row| {
                row.map(|record| {
                    RecordValue::new(
                        ty.clone(),
                        IndexMap::from([(field.to_string(), record.field(field))]),
                    )
                })
            })
            .collect();
        Ok(table_value(ty, projected))
    }

    async fn eval_binary(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        scope: &Scope,
    ) -> Result<FormulaValue> {
        let lv = self.eval(left, scope).await?;
        if op.is_logical() {
            if lv.is_error() {
                return Ok(lv);
            }
            let l = lv.as_bool().unwrap_or(false);
            if (op == BinaryOp::And && !l) || (op == BinaryOp::Or && l) {
                return Ok(FormulaValue::Boolean(l));
            }
            let rv = self.eval(right, scope).await?;
            return Ok(match rv {
                FormulaValue::Error(_) => rv,
                rv => FormulaValue::Boolean(rv.as_bool().unwrap_or(false)),
            });
        }
        let rv = self.eval(right, scope).await?;
        match (op, &lv, &rv) {
            (BinaryOp::In | BinaryOp::ExactIn, _, FormulaValue::Table(table)) if !lv.is_error() => {
                self.table_contains(op, &lv, table).await
            }
            _ => Ok(ops::binary(op, lv, rv)),
        }
    }

    /// `x in T`: compares against the first column of every value row.
    async fn table_contains(
        &self,
        op: BinaryOp,
        needle: &FormulaValue,
        table: &TableRef,
    ) -> Result<FormulaValue> {
        let rows = table.rows(&self.cancel).await?;
        let found = rows.iter().filter_map(DValue::value).any(|row| {
            let Some((_, cell)) = row.fields().next() else {
                return false;
            };
            match (op, needle, cell) {
                (BinaryOp::In, FormulaValue::String(a), FormulaValue::String(b)) => {
                    a.to_lowercase() == b.to_lowercase()
                }
                _ => ops::equals(needle, cell),
            }
        });
        Ok(FormulaValue::Boolean(found))
    }

    async fn eval_call(
        &self,
        call: &Expr,
        args: &[Arc<Expr>],
        scope: &Scope,
    ) -> Result<FormulaValue> {
        let Some(info) = self.binding.call(call.id) else {
            return Err(EvalError::NotBound(call.span.start as usize));
        };
        let def = &info.function;
        if scope.depth >= self.max_call_depth {
            return Ok(FormulaValue::error(
                ErrorCode::MaxCallDepth,
                format!("'{}' exceeds the maximum call depth of {}", def.name, self.max_call_depth),
            ));
        }
        let inner = scope.deeper();
        let count = if info.all_marker {
            args.len().saturating_sub(1)
        } else {
            args.len()
        };
        let args = &args[..count];
        trace!(function = %def.name, args = args.len(), "call");

        match &def.invoke {
            Invoke::Sync(f) => {
                let values = self.eval_all(args, &inner).await?;
                if def.propagates_errors
                    && let Some(error) = first_error(&values)
                {
                    return Ok(error);
                }
                Ok(f(&values))
            }
            Invoke::Async(f) => {
                let values = self.eval_all(args, &inner).await?;
                if def.propagates_errors
                    && let Some(error) = first_error(&values)
                {
                    return Ok(error);
                }
                self.cancel.check()?;
                f(values, self.cancel.clone()).await
            }
            Invoke::Context(f) => {
                let mut values = Vec::with_capacity(args.len());
                for (index, arg) in args.iter().enumerate() {
                    values.push(match def.mode(index) {
                        ParamMode::Eager => ArgValue::Value(self.eval(arg, &inner).await?),
                        ParamMode::Lambda | ParamMode::Lazy => ArgValue::Deferred(Lambda {
                            expr: arg.as_ref(),
                            scope: inner.clone(),
                        }),
                        ParamMode::Identifier => match &arg.kind {
                            ExprKind::FirstName(ident) => ArgValue::Name(ident.name.clone()),
                            _ => return Err(EvalError::NotBound(arg.span.start as usize)),
                        },
                    });
                }
                self.cancel.check()?;
                f(CallContext {
                    interp: self,
                    call,
                    all_marker: info.all_marker,
                    args: values,
                })
                .await
            }
        }
    }

    async fn eval_all(&self, args: &[Arc<Expr>], scope: &Scope) -> Result<Vec<FormulaValue>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg, scope).await?);
        }
        Ok(values)
    }
}

fn first_error(values: &[FormulaValue]) -> Option<FormulaValue> {
    values.iter().find(|v| v.is_error()).cloned()
}

fn enum_value(value: &EnumLiteral) -> FormulaValue {
    match value {
        EnumLiteral::Boolean(b) => FormulaValue::Boolean(*b),
        EnumLiteral::Number(n) => FormulaValue::Number(*n),
        EnumLiteral::String(s) => FormulaValue::String(s.clone()),
    }
}

/// What a context function sees of its call.
pub struct CallContext<'a> {
    interp: &'a Interpreter,
    call: &'a Expr,
    all_marker: bool,
    args: Vec<ArgValue<'a>>,
}

impl<'a> CallContext<'a> {
    pub fn cancel(&self) -> &CancellationToken {
        &self.interp.cancel
    }

    /// Arguments passed, not counting an `"ALL"` marker.
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// The trailing `"ALL"` marker was present.
    pub fn all_marker(&self) -> bool {
        self.all_marker
    }

    /// Value of an eager argument; Blank for missing or deferred ones.
    pub fn value(&self, index: usize) -> FormulaValue {
        match self.args.get(index) {
            Some(ArgValue::Value(v)) => v.clone(),
            _ => FormulaValue::Blank,
        }
    }

    pub fn values_from(&self, start: usize) -> Vec<FormulaValue> {
        (start..self.args.len()).map(|i| self.value(i)).collect()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        match self.args.get(index) {
            Some(ArgValue::Name(name)) => Some(name),
            _ => None,
        }
    }

    /// Evaluate a deferred argument in its call-site scope.
    pub async fn eval_lazy(&self, index: usize) -> Result<FormulaValue> {
        match self.args.get(index) {
            Some(ArgValue::Deferred(lambda)) => self.interp.eval(lambda.expr, &lambda.scope).await,
            Some(ArgValue::Value(v)) => Ok(v.clone()),
            _ => Ok(FormulaValue::Blank),
        }
    }

    /// Evaluate a lambda argument with `row` pushed as the innermost scope.
    pub async fn eval_row(&self, index: usize, row: &RecordValue) -> Result<FormulaValue> {
        match self.args.get(index) {
            Some(ArgValue::Deferred(lambda)) => {
                let scope = lambda.scope.with_row(row.clone());
                self.interp.eval(lambda.expr, &scope).await
            }
            Some(ArgValue::Value(v)) => Ok(v.clone()),
            _ => Ok(FormulaValue::Blank),
        }
    }

    /// Materialize a table's rows under this call's cancellation token.
    pub async fn rows(&self, table: &TableRef) -> Result<Vec<DValue<RecordValue>>> {
        self.cancel().check()?;
        table.rows(self.cancel()).await
    }

    pub fn variable(&self, name: &str) -> Option<FormulaValue> {
        self.interp.global(name)
    }

    pub fn set_variable(&self, name: &str, value: FormulaValue) {
        self.interp.set_global(name, value);
    }

    pub fn arg_expr(&self, index: usize) -> Option<&'a Expr> {
        match self.call.kind {
            ExprKind::Call { ref args, .. } => args.get(index).map(|arg| &**arg),
            _ => None,
        }
    }

    /// Bound type of an argument.
    pub fn arg_type(&self, index: usize) -> DType {
        self.arg_expr(index)
            .map_or(DType::Unknown, |e| self.interp.binding.ty(e.id))
    }

    /// Bound type of the call.
    pub fn return_type(&self) -> DType {
        self.interp.binding.ty(self.call.id)
    }

    pub fn span(&self) -> Span {
        self.call.span
    }

    /// Error value located at this call.
    pub fn error(&self, code: ErrorCode, message: impl Into<String>) -> FormulaValue {
        FormulaValue::Error(ErrorValue::new(code, message).with_span(self.call.span))
    }
}
