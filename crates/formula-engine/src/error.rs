//! Diagnostics and engine errors.
//!
//! # Design
//!
//! - [`Diagnostic`]: a check-time problem (parse or bind) with a span,
//!   severity and stable message key; never a Rust error
//! - [`EvalError`]: host/infra faults only: cancellation, host faults,
//!   evaluating a formula that failed its check
//! - [`ConfigError`]: host contract violations while configuring an engine
//!
//! Runtime formula errors (division by zero, not found, ...) are values:
//! see [`ErrorValue`](crate::value::ErrorValue).

use formula_ast::Span;
use formula_parser::{ParseError, ParseErrorKind};
use std::fmt;
use thiserror::Error;

/// Engine result type
pub type Result<T> = std::result::Result<T, EvalError>;

/// Host and infrastructure faults raised out of evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("evaluation was cancelled")]
    Cancelled,

    #[error("host fault: {0}")]
    HostFault(String),

    #[error("formula did not pass its check ({0} error(s))")]
    NotBound(usize),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Invalid engine configuration supplied by the host.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("function '{name}': min arity {min} exceeds max arity {max}")]
    InvalidArity { name: String, min: usize, max: usize },

    #[error("function '{name}': only context functions take lambda, lazy or identifier parameters")]
    NonEagerParams { name: String },

    #[error("function '{name}' with arity {arity} is already registered")]
    DuplicateFunction { name: String, arity: usize },

    #[error("'{0}' is already defined")]
    DuplicateSymbol(String),

    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// The formula is valid but suspicious
    Warning,
    /// The formula cannot be evaluated
    Severe,
}

/// Category of check-time diagnostic.
///
/// # Invariant
///
/// The discriminant values must match the `ERROR_KIND_KEYS` array indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorKind {
    // Parse phase
    /// Syntax error (invalid token, unexpected end of input, ...)
    Syntax = 0,
    /// `Set` or `;` chaining without side effects enabled
    SideEffects = 1,

    // Name resolution
    /// Name not found in any scope
    UnknownName = 2,
    /// No function with this name
    UnknownFunction = 3,
    /// Function exists but not with this many arguments
    WrongArgCount = 4,
    /// Field access on a record type that lacks the field
    UnknownField = 5,
    /// `.` applied to a non-aggregate
    InvalidDot = 6,

    // Typing
    /// Operand or argument type not accepted
    TypeMismatch = 7,
    /// Two shapes that cannot be merged
    IncompatibleTypes = 8,
    /// Argument has the right type but an invalid form
    InvalidArgument = 9,

    // Mutation
    /// Behavior function in a formula without side effects
    BehaviorOnly = 10,
    /// Write to a read-only or computed field
    ReadOnlyField = 11,
    /// Target cannot be modified
    NotMutable = 12,

    // Generic
    /// Bug in the engine
    Internal = 13,
}

/// Stable message keys for error kinds.
///
/// Index matches ErrorKind discriminant.
const ERROR_KIND_KEYS: &[&str] = &[
    "ErrSyntax",           // 0: Syntax
    "ErrSideEffects",      // 1: SideEffects
    "ErrUnknownName",      // 2: UnknownName
    "ErrUnknownFunction",  // 3: UnknownFunction
    "ErrWrongArgCount",    // 4: WrongArgCount
    "ErrUnknownField",     // 5: UnknownField
    "ErrInvalidDot",       // 6: InvalidDot
    "ErrTypeMismatch",     // 7: TypeMismatch
    "ErrIncompatibleTypes", // 8: IncompatibleTypes
    "ErrInvalidArgument",  // 9: InvalidArgument
    "ErrBehaviorOnly",     // 10: BehaviorOnly
    "ErrReadOnlyField",    // 11: ReadOnlyField
    "ErrNotMutable",       // 12: NotMutable
    "ErrInternal",         // 13: Internal
];

impl ErrorKind {
    /// Stable, localizable message key.
    pub fn key(self) -> &'static str {
        ERROR_KIND_KEYS[self as usize]
    }
}

/// Check-time diagnostic with source location and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Category of this diagnostic
    pub kind: ErrorKind,
    /// Severity level
    pub severity: Severity,
    /// Offending source text
    pub span: Span,
    /// Human-readable message
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, span: Span, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Severe,
            span,
            message: message.into(),
        }
    }

    pub fn warning(kind: ErrorKind, span: Span, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::new(kind, span, message)
        }
    }

    pub fn message_key(&self) -> &'static str {
        self.kind.key()
    }

    pub fn is_severe(&self) -> bool {
        self.severity == Severity::Severe
    }
}

impl From<&ParseError> for Diagnostic {
    fn from(error: &ParseError) -> Self {
        let kind = match error.kind {
            ParseErrorKind::SideEffectsNotAllowed => ErrorKind::SideEffects,
            _ => ErrorKind::Syntax,
        };
        Diagnostic::new(kind, error.span, error.message.clone())
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Severe => write!(f, "error"),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} at {}..{}",
            self.severity, self.message, self.span.start, self.span.end
        )
    }
}
