use super::FunctionDef;
use crate::error::ErrorKind;
use crate::symbols::SymbolEntry;
use formula_ast::{Expr, Span};
use formula_types::{DType, Features, RecordType};
use std::sync::Arc;

/// Signature check run by the binder for every call site.
pub type CheckFn = Arc<dyn Fn(&CheckContext<'_>) -> CheckOutcome + Send + Sync>;

/// A bound argument as seen by a signature check.
#[derive(Debug)]
pub struct ArgInfo<'a> {
    pub expr: &'a Expr,
    /// Bound type; for lambda parameters, the type of the per-row body
    pub ty: DType,
    /// Set when the argument is a plain reference to a global
    pub global: Option<&'a SymbolEntry>,
}

pub struct CheckContext<'a> {
    pub def: &'a FunctionDef,
    pub args: &'a [ArgInfo<'a>],
    pub features: &'a Features,
    /// The whole call
    pub span: Span,
}

impl CheckContext<'_> {
    /// Require argument `index` to be usable as `expected`, recording a
    /// coercion when one is needed and an error when none exists.
    pub fn expect_arg(&self, outcome: &mut CheckOutcome, index: usize, expected: &DType) {
        let Some(arg) = self.args.get(index) else {
            return;
        };
        match arg.ty.coercion_sub_type(expected, self.features) {
            Some((ty, true)) => outcome.coerce(index, ty),
            Some((_, false)) => {}
            None => outcome.error(
                Some(index),
                ErrorKind::TypeMismatch,
                format!("expected {expected}, found {}", arg.ty),
            ),
        }
    }

    /// Require argument `index` to be a table and return its row type.
    ///
    /// `None` when it is not one; error-typed arguments are not reported
    /// again.
    pub fn expect_table(&self, outcome: &mut CheckOutcome, index: usize) -> Option<RecordType> {
        let arg = self.args.get(index)?;
        match &arg.ty {
            DType::Table(row) => Some(row.clone()),
            ty if ty.is_error_like() => None,
            ty => {
                outcome.error(
                    Some(index),
                    ErrorKind::TypeMismatch,
                    format!("expected a table, found {ty}"),
                );
                None
            }
        }
    }

    pub fn arg_span(&self, index: Option<usize>) -> Span {
        index
            .and_then(|i| self.args.get(i))
            .map_or(self.span, |a| a.expr.span)
    }
}

/// Problem found by a signature check, attached to an argument or, with
/// `arg: None`, to the whole call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgError {
    pub arg: Option<usize>,
    pub kind: ErrorKind,
    pub message: String,
}

/// Result of a signature check.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub return_type: DType,
    /// Argument index to the type it is coerced to before the call
    pub coercions: Vec<(usize, DType)>,
    pub errors: Vec<ArgError>,
    /// The last argument is a literal `"ALL"` marker, not a value
    pub all_marker: bool,
    /// Variable introduced by this call (`Set` on a new name)
    pub declares: Option<(String, DType)>,
}

impl CheckOutcome {
    pub fn new(return_type: DType) -> Self {
        Self {
            return_type,
            coercions: Vec::new(),
            errors: Vec::new(),
            all_marker: false,
            declares: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn coerce(&mut self, arg: usize, ty: DType) {
        self.coercions.push((arg, ty));
    }

    pub fn error(&mut self, arg: Option<usize>, kind: ErrorKind, message: impl Into<String>) {
        self.errors.push(ArgError {
            arg,
            kind,
            message: message.into(),
        });
    }
}

/// Check every argument against the declared parameter types.
pub(crate) fn check_params(ctx: &CheckContext<'_>) -> CheckOutcome {
    let mut outcome = CheckOutcome::new(ctx.def.return_type.clone());
    for index in 0..ctx.args.len() {
        if ctx.def.mode(index) != super::ParamMode::Identifier {
            ctx.expect_arg(&mut outcome, index, &ctx.def.param(index));
        }
    }
    outcome
}
