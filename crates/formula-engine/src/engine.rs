//! Host-facing facade: globals, functions, check, eval and completion.

use crate::binder::{BindContext, Binding, bind};
use crate::cancel::CancellationToken;
use crate::config::EngineConfig;
use crate::error::{ConfigError, Diagnostic, EvalError, Result};
use crate::functions::{FunctionDef, FunctionRegistry};
use crate::interpreter::Interpreter;
use crate::symbols::SymbolTable;
use crate::value::{ErrorCode, FormulaValue, RecordValue, TableRef};
use formula_parser::{ParseResult, parse};
use formula_types::{DType, EnumType, RecordType};
use futures::FutureExt;
use indexmap::IndexMap;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::instrument::WithSubscriber;
use tracing::{debug, dispatcher, warn};

/// Outcome of parsing and binding one formula.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub parse: ParseResult,
    pub binding: Arc<Binding>,
    /// Parse and bind diagnostics ordered by position
    pub diagnostics: Vec<Diagnostic>,
    pub return_type: DType,
    /// No severe diagnostics
    pub success: bool,
}

impl CheckResult {
    /// Severe diagnostics only.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_severe())
    }
}

/// One formula environment: globals, functions and configuration.
///
/// Variables assigned by `Set` persist in the engine between evaluations.
/// Evaluations against one engine are serialized by `&mut self`.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    symbols: SymbolTable,
    values: IndexMap<String, FormulaValue>,
    registry: Arc<FunctionRegistry>,
    self_value: Option<FormulaValue>,
    parent_value: Option<FormulaValue>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    /// Engine with the builtin function library.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            symbols: SymbolTable::new(),
            values: IndexMap::new(),
            registry: Arc::new(FunctionRegistry::with_builtins()),
            self_value: None,
            parent_value: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Variable that `Set` may assign, typed by its initial value.
    pub fn add_variable(
        &mut self,
        name: impl Into<String>,
        value: FormulaValue,
    ) -> std::result::Result<(), ConfigError> {
        let name = name.into();
        self.symbols.add_variable(name.clone(), value.dtype(), true)?;
        self.values.insert(name, value);
        Ok(())
    }

    /// Read-only global.
    pub fn add_constant(
        &mut self,
        name: impl Into<String>,
        value: FormulaValue,
    ) -> std::result::Result<(), ConfigError> {
        let name = name.into();
        self.symbols.add_variable(name.clone(), value.dtype(), false)?;
        self.values.insert(name, value);
        Ok(())
    }

    /// Mutable variable of type `ty`, Blank until assigned.
    pub fn declare_variable(
        &mut self,
        name: impl Into<String>,
        ty: DType,
    ) -> std::result::Result<(), ConfigError> {
        let name = name.into();
        self.symbols.add_variable(name.clone(), ty, true)?;
        self.values.insert(name, FormulaValue::Blank);
        Ok(())
    }

    /// Table that mutation functions may write, except for `read_only_fields`.
    pub fn add_data_source<I, S>(
        &mut self,
        name: impl Into<String>,
        table: TableRef,
        read_only_fields: I,
    ) -> std::result::Result<(), ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        self.symbols
            .add_data_source(name.clone(), table.record_type(), read_only_fields)?;
        debug!(%name, "data source added");
        self.values.insert(name, FormulaValue::Table(table));
        Ok(())
    }

    pub fn add_enum(&mut self, ty: EnumType) -> std::result::Result<(), ConfigError> {
        self.symbols.add_enum(ty)
    }

    /// Register a host function next to the builtins.
    pub fn register_function(&mut self, def: FunctionDef) -> std::result::Result<(), ConfigError> {
        Arc::make_mut(&mut self.registry).register(def)
    }

    /// Value of `Self`.
    pub fn set_self(&mut self, value: FormulaValue) {
        self.self_value = Some(value);
    }

    /// Value of `Parent`.
    pub fn set_parent(&mut self, value: FormulaValue) {
        self.parent_value = Some(value);
    }

    /// Current value of a global, including `Set` variables.
    pub fn variable(&self, name: &str) -> Option<&FormulaValue> {
        self.values.get(name)
    }

    fn bind_context<'a>(&'a self, schema: &'a RecordType) -> BindContext<'a> {
        BindContext {
            symbols: &self.symbols,
            registry: &self.registry,
            features: &self.config.features,
            allow_side_effects: self.config.parser.allow_side_effects,
            rule_scope: schema,
            self_type: self.self_value.as_ref().map(FormulaValue::dtype),
            parent_type: self.parent_value.as_ref().map(FormulaValue::dtype),
        }
    }

    /// Parse and bind `text` with the fields of `schema` in scope.
    pub fn check(&self, text: &str, schema: &RecordType) -> CheckResult {
        dispatcher::with_default(&self.config.dispatch, || {
            let parse = parse(text, &self.config.parser);
            let binding = bind(&parse.root, &self.bind_context(schema));

            let mut diagnostics: Vec<Diagnostic> =
                parse.errors.iter().map(Diagnostic::from).collect();
            diagnostics.extend(binding.diagnostics().iter().cloned());
            diagnostics.sort_by_key(|d| d.span.start);
            let success = !diagnostics.iter().any(Diagnostic::is_severe);
            debug!(success, diagnostics = diagnostics.len(), "checked");

            CheckResult {
                return_type: binding.root_type().clone(),
                parse,
                binding: Arc::new(binding),
                diagnostics,
                success,
            }
        })
    }

    /// Check and evaluate `text` with `rule` as the rule scope.
    ///
    /// Formula errors are `Ok(FormulaValue::Error)`. `Err` means the
    /// formula failed its check, or the evaluation was cancelled.
    pub async fn eval(
        &mut self,
        text: &str,
        rule: &RecordValue,
        cancel: CancellationToken,
    ) -> Result<FormulaValue> {
        let check = self.check(text, rule.record_type());
        self.eval_checked(&check, rule, cancel).await
    }

    /// Evaluate a formula checked earlier against `rule`'s type.
    pub async fn eval_checked(
        &mut self,
        check: &CheckResult,
        rule: &RecordValue,
        cancel: CancellationToken,
    ) -> Result<FormulaValue> {
        if !check.success {
            return Err(EvalError::NotBound(check.errors().count()));
        }
        let interp = Interpreter::new(
            check.binding.clone(),
            self.values.clone(),
            cancel,
            self.config.max_call_depth,
        )
        .with_host_objects(self.self_value.clone(), self.parent_value.clone());

        let outcome = AssertUnwindSafe(interp.run(&check.parse.root, rule.clone()))
            .catch_unwind()
            .with_subscriber(self.config.dispatch.clone())
            .await;

        let result = match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(EvalError::HostFault(message))) => {
                dispatcher::with_default(&self.config.dispatch, || {
                    warn!(%message, "host fault during evaluation");
                });
                Ok(FormulaValue::error(ErrorCode::HostFault, message))
            }
            Ok(Err(error)) => Err(error),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                dispatcher::with_default(&self.config.dispatch, || {
                    warn!(%message, "host callback panicked");
                });
                Ok(FormulaValue::error(ErrorCode::HostFault, message))
            }
        };

        self.values = interp.into_globals();
        for (name, ty) in check.binding.declared() {
            self.symbols.declare(name, ty.clone());
        }
        result
    }

    /// Completion candidates at byte offset `cursor`, with no rule scope.
    pub fn suggest(&self, text: &str, cursor: usize) -> Vec<String> {
        self.suggest_in(text, cursor, &RecordType::empty())
    }

    /// Completion candidates at byte offset `cursor`.
    ///
    /// After `expr.` these are the members of `expr`'s type (fields,
    /// display names, enum members); otherwise globals and function names.
    /// Candidates start with the word under the cursor, ignoring case.
    pub fn suggest_in(&self, text: &str, cursor: usize, schema: &RecordType) -> Vec<String> {
        let cursor = cursor.min(text.len());
        if !text.is_char_boundary(cursor) {
            return Vec::new();
        }
        let before = &text[..cursor];
        let word_start = before
            .char_indices()
            .rev()
            .take_while(|(_, c)| is_name_char(*c))
            .last()
            .map_or(cursor, |(i, _)| i);
        let word = before[word_start..].to_lowercase();
        let head = &before[..word_start];

        let mut candidates = match head.strip_suffix('.') {
            Some(left) => {
                let path = &left[trailing_operand_start(left)..];
                dispatcher::with_default(&self.config.dispatch, || {
                    self.members_of(path, schema)
                })
            }
            None => self
                .symbols
                .iter()
                .map(|entry| entry.name.clone())
                .chain(schema.field_names(false).unwrap_or_default())
                .chain(self.registry.names().map(str::to_string))
                .collect(),
        };
        candidates.retain(|name| name.to_lowercase().starts_with(&word));
        candidates.sort_by_key(|name| name.to_lowercase());
        candidates.dedup();
        candidates
    }

    fn members_of(&self, path: &str, schema: &RecordType) -> Vec<String> {
        if path.trim().is_empty() {
            return Vec::new();
        }
        let parse = parse(path, &self.config.parser);
        let binding = bind(&parse.root, &self.bind_context(schema));
        match binding.root_type() {
            DType::Enum(e) => e.members.keys().cloned().collect(),
            DType::Record(row) | DType::Table(row) => {
                let names = row.field_names(true).unwrap_or_default();
                let displays: Vec<String> = names
                    .iter()
                    .filter_map(|name| row.display_name_for(name))
                    .collect();
                names.into_iter().chain(displays).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Start of the dotted path, call or parenthesized operand ending `text`.
fn trailing_operand_start(text: &str) -> usize {
    let mut depth = 0usize;
    let mut quoted = false;
    let mut start = text.len();
    for (i, c) in text.char_indices().rev() {
        match c {
            '\'' => quoted = !quoted,
            _ if quoted => {}
            ')' => depth += 1,
            '(' if depth > 0 => depth -= 1,
            _ if depth > 0 => {}
            c if is_name_char(c) || c == '.' || c == '@' => {}
            _ => break,
        }
        start = i;
    }
    start
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "host callback panicked".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_operand() {
        let text = "If(x, First(T).";
        let left = text.strip_suffix('.').unwrap();
        assert_eq!(&left[trailing_operand_start(left)..], "First(T)");
        let text = "1 + 'My Table'.Rows";
        assert_eq!(&text[trailing_operand_start(text)..], "'My Table'.Rows");
    }

    #[test]
    fn test_check_reports_parse_and_bind_errors_in_order() {
        let engine = Engine::default();
        let result = engine.check("Nope + (1 +", &RecordType::empty());
        assert!(!result.success);
        let starts: Vec<u32> = result.diagnostics.iter().map(|d| d.span.start).collect();
        let mut sorted = starts.clone();
        sorted.sort_unstable();
        assert_eq!(starts, sorted);
    }

    #[test]
    fn test_suggest_globals_and_functions() {
        let mut engine = Engine::default();
        engine.add_constant("Filtered", FormulaValue::Number(1.0)).unwrap();
        let names = engine.suggest("Fil", 3);
        assert_eq!(names, vec!["Filter".to_string(), "Filtered".to_string()]);
    }
}
