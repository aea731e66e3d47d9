// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Binder, interpreter and table mutation functions for the formula
//! language.
//!
//! A formula goes through three stages:
//!
//! ```text
//! text ── parse ──> Expr ── bind ──> Binding ── eval ──> FormulaValue
//!                   (formula-parser)  (types, coercions,  (async, cancellable,
//!                                      diagnostics)        errors as values)
//! ```
//!
//! [`Engine`] ties them together with a symbol table of host globals, the
//! function registry and the configuration. Host tables implement
//! [`TableValue`]; mutation functions (`Collect`, `Patch`, `Remove`, ...)
//! reach them only through that trait.
//!
//! ```
//! # use formula_engine::*;
//! # use formula_types::RecordType;
//! let engine = Engine::new(EngineConfig::default());
//! let result = engine.check("If(1 > 2, \"a\", \"b\")", &RecordType::empty());
//! assert!(result.success);
//! ```

pub mod binder;
pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod functions;
pub mod interpreter;
pub mod symbols;
pub mod value;

pub use binder::{BindContext, BindKind, Binding, bind};
pub use cancel::CancellationToken;
pub use config::{DEFAULT_MAX_CALL_DEPTH, EngineConfig};
pub use engine::{CheckResult, Engine};
pub use error::{ConfigError, Diagnostic, ErrorKind, EvalError, Result, Severity};
pub use functions::{CheckContext, CheckOutcome, FunctionDef, FunctionRegistry, Invoke, ParamMode};
pub use interpreter::CallContext;
pub use symbols::{SymbolEntry, SymbolKind, SymbolTable};
pub use value::{
    DValue, ErrorCode, ErrorValue, ExpressionError, FormulaValue, InMemoryTable, RecordValue,
    TableRef, TableValue,
};
