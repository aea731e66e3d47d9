//! Runtime values.
//!
//! - [`FormulaValue`]: tagged union produced by evaluation
//! - [`ErrorValue`]: first-class runtime error carrying one or more
//!   [`ExpressionError`]s; never a Rust `Err`
//! - [`DValue`]: per-row `{Value, Blank, Error}` result, so one bad row
//!   never aborts iteration of the rest
//! - [`RecordValue`]: copy-on-write field map with its [`RecordType`]
//! - [`TableValue`]: async, cancellable row source; [`InMemoryTable`] is
//!   the owned-copy implementation

mod record;
mod table;

pub use record::RecordValue;
pub use table::{InMemoryTable, TableRef, TableValue};
pub(crate) use table::table_value;

use crate::error::Severity;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use formula_ast::Span;
use formula_types::DType;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum FormulaValue {
    Blank,
    Error(ErrorValue),
    Boolean(bool),
    Number(f64),
    Decimal(Decimal),
    String(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    Guid(Uuid),
    Record(RecordValue),
    Table(TableRef),
    /// Opaque host value; only coerced on demand.
    UntypedObject(Arc<serde_json::Value>),
}

impl FormulaValue {
    pub fn string(s: impl Into<String>) -> Self {
        FormulaValue::String(s.into())
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        FormulaValue::Error(ErrorValue::new(code, message))
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, FormulaValue::Blank)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, FormulaValue::Error(_))
    }

    pub fn as_error(&self) -> Option<&ErrorValue> {
        match self {
            FormulaValue::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&RecordValue> {
        match self {
            FormulaValue::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            FormulaValue::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FormulaValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view of `Number` and `Decimal`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FormulaValue::Number(n) => Some(*n),
            FormulaValue::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    /// Static type of this value.
    pub fn dtype(&self) -> DType {
        match self {
            FormulaValue::Blank => DType::Blank,
            FormulaValue::Error(_) => DType::Error,
            FormulaValue::Boolean(_) => DType::Boolean,
            FormulaValue::Number(_) => DType::Number,
            FormulaValue::Decimal(_) => DType::Decimal,
            FormulaValue::String(_) => DType::String,
            FormulaValue::Date(_) => DType::Date,
            FormulaValue::DateTime(_) => DType::DateTime,
            FormulaValue::Time(_) => DType::Time,
            FormulaValue::Guid(_) => DType::Guid,
            FormulaValue::Record(r) => DType::Record(r.record_type().clone()),
            FormulaValue::Table(t) => DType::Table(t.record_type()),
            FormulaValue::UntypedObject(_) => DType::UntypedObject,
        }
    }

    /// Text form used by `&`, interpolation and `Text`. `None` for values
    /// without one (records, tables, errors).
    pub fn to_text(&self) -> Option<String> {
        Some(match self {
            FormulaValue::Blank => String::new(),
            FormulaValue::Boolean(b) => b.to_string(),
            FormulaValue::Number(n) => format_number(*n),
            FormulaValue::Decimal(d) => d.normalize().to_string(),
            FormulaValue::String(s) => s.clone(),
            FormulaValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            FormulaValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            FormulaValue::Time(t) => t.format("%H:%M:%S").to_string(),
            FormulaValue::Guid(g) => g.hyphenated().to_string(),
            FormulaValue::UntypedObject(v) => match v.as_ref() {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            },
            FormulaValue::Error(_) | FormulaValue::Record(_) | FormulaValue::Table(_) => {
                return None;
            }
        })
    }

    /// Strict value equality used to match rows.
    ///
    /// `Number` and `Decimal` compare numerically; records compare field
    /// by field; tables only equal themselves; errors equal nothing.
    pub fn value_eq(&self, other: &FormulaValue) -> bool {
        use FormulaValue as V;
        match (self, other) {
            (V::Blank, V::Blank) => true,
            (V::Boolean(a), V::Boolean(b)) => a == b,
            (V::Decimal(a), V::Decimal(b)) => a == b,
            (V::Number(_) | V::Decimal(_), V::Number(_) | V::Decimal(_)) => {
                self.as_f64() == other.as_f64()
            }
            (V::String(a), V::String(b)) => a == b,
            (V::Date(a), V::Date(b)) => a == b,
            (V::DateTime(a), V::DateTime(b)) => a == b,
            (V::Time(a), V::Time(b)) => a == b,
            (V::Guid(a), V::Guid(b)) => a == b,
            (V::Record(a), V::Record(b)) => a.len() == b.len() && a.matches(b),
            (V::Table(a), V::Table(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            (V::UntypedObject(a), V::UntypedObject(b)) => a == b,
            _ => false,
        }
    }
}

/// Integral values print without a fraction.
pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl From<bool> for FormulaValue {
    fn from(b: bool) -> Self {
        FormulaValue::Boolean(b)
    }
}

impl From<f64> for FormulaValue {
    fn from(n: f64) -> Self {
        FormulaValue::Number(n)
    }
}

impl From<Decimal> for FormulaValue {
    fn from(d: Decimal) -> Self {
        FormulaValue::Decimal(d)
    }
}

impl From<&str> for FormulaValue {
    fn from(s: &str) -> Self {
        FormulaValue::String(s.to_string())
    }
}

impl From<String> for FormulaValue {
    fn from(s: String) -> Self {
        FormulaValue::String(s)
    }
}

impl From<RecordValue> for FormulaValue {
    fn from(r: RecordValue) -> Self {
        FormulaValue::Record(r)
    }
}

impl From<ErrorValue> for FormulaValue {
    fn from(e: ErrorValue) -> Self {
        FormulaValue::Error(e)
    }
}

impl fmt::Display for FormulaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaValue::Blank => f.write_str("Blank()"),
            FormulaValue::Error(e) => write!(f, "{e}"),
            FormulaValue::String(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            FormulaValue::Record(r) => write!(f, "{r}"),
            FormulaValue::Table(t) => write!(f, "Table{}", DType::Table(t.record_type())),
            other => f.write_str(&other.to_text().unwrap_or_default()),
        }
    }
}

/// Category of runtime error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Custom,
    DivisionByZero,
    InvalidArgument,
    NotFound,
    TypeMismatch,
    NotSupported,
    Numeric,
    /// A host callback failed or panicked
    HostFault,
    MaxCallDepth,
}

/// One runtime error with its originating message.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionError {
    pub code: ErrorCode,
    pub message: String,
    pub span: Option<Span>,
    pub severity: Severity,
}

/// Runtime error value; `errors` is never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorValue {
    pub errors: Vec<ExpressionError>,
}

impl ErrorValue {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            errors: vec![ExpressionError {
                code,
                message: message.into(),
                span: None,
                severity: Severity::Severe,
            }],
        }
    }

    pub fn division_by_zero() -> Self {
        Self::new(ErrorCode::DivisionByZero, "division by zero")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn not_supported(operation: &str) -> Self {
        Self::new(
            ErrorCode::NotSupported,
            format!("{operation} is not supported by this data source"),
        )
    }

    /// Attach `span` to errors that have none yet.
    pub fn with_span(mut self, span: Span) -> Self {
        for error in &mut self.errors {
            error.span.get_or_insert(span);
        }
        self
    }

    /// Code of the first error.
    pub fn code(&self) -> ErrorCode {
        self.errors.first().map_or(ErrorCode::Custom, |e| e.code)
    }

    pub fn message(&self) -> &str {
        self.errors.first().map_or("", |e| e.message.as_str())
    }

    pub fn extend(&mut self, other: ErrorValue) {
        self.errors.extend(other.errors);
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Error(")?;
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{:?}: {}", e.code, e.message)?;
        }
        f.write_str(")")
    }
}

/// Row-level result of a table operation.
#[derive(Debug, Clone)]
pub enum DValue<T> {
    Value(T),
    Blank,
    Error(ErrorValue),
}

impl<T> DValue<T> {
    pub fn is_value(&self) -> bool {
        matches!(self, DValue::Value(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, DValue::Error(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            DValue::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> DValue<U> {
        match self {
            DValue::Value(v) => DValue::Value(f(v)),
            DValue::Blank => DValue::Blank,
            DValue::Error(e) => DValue::Error(e),
        }
    }
}

impl DValue<RecordValue> {
    pub fn into_formula_value(self) -> FormulaValue {
        match self {
            DValue::Value(r) => FormulaValue::Record(r),
            DValue::Blank => FormulaValue::Blank,
            DValue::Error(e) => FormulaValue::Error(e),
        }
    }

    /// Row view of a value: records are rows, errors are error rows,
    /// everything else is blank.
    pub fn from_formula_value(value: FormulaValue) -> Self {
        match value {
            FormulaValue::Record(r) => DValue::Value(r),
            FormulaValue::Error(e) => DValue::Error(e),
            _ => DValue::Blank,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_text() {
        assert_eq!(FormulaValue::Number(3.0).to_text().unwrap(), "3");
        assert_eq!(FormulaValue::Number(0.25).to_text().unwrap(), "0.25");
        assert_eq!(FormulaValue::Decimal(Decimal::new(1500, 3)).to_text().unwrap(), "1.5");
        assert_eq!(FormulaValue::Blank.to_text().unwrap(), "");
    }

    #[test]
    fn test_numeric_equality_across_representations() {
        assert!(FormulaValue::Number(2.0).value_eq(&FormulaValue::Decimal(Decimal::new(2, 0))));
        assert!(!FormulaValue::Number(2.0).value_eq(&FormulaValue::string("2")));
        let err = FormulaValue::error(ErrorCode::Custom, "x");
        assert!(!err.value_eq(&err));
    }

    #[test]
    fn test_error_span_is_kept_once_set() {
        let e = ErrorValue::division_by_zero()
            .with_span(Span::new(1, 4))
            .with_span(Span::new(0, 9));
        assert_eq!(e.errors[0].span, Some(Span::new(1, 4)));
        assert_eq!(e.code(), ErrorCode::DivisionByZero);
    }
}
