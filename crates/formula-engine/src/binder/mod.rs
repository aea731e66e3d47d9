//! Name resolution and type inference over a parsed formula.
//!
//! The binder walks the tree once, children before parents, and records a
//! [`BindInfo`] for every node in a side table keyed by [`NodeId`]. Problems
//! become [`Diagnostic`]s; binding never stops early, so independent
//! sub-expressions still get types after an error.
//!
//! # Scopes
//!
//! Names resolve innermost first:
//!
//! 1. row scopes opened by lambda parameters (`Filter(T, a > 1)`), then the
//!    rule scope supplied by the host; within a scope the `As` alias,
//!    `ThisRecord` and the row's fields
//! 2. globals: host symbols, then variables declared by `Set` earlier in the
//!    same formula
//!
//! `@name` skips the row scopes.
//!
//! Record types reached through `.` are only ever asked for single fields,
//! so self-referential schemas bind without being enumerated.

mod calls;
mod operators;

use crate::error::{Diagnostic, ErrorKind};
use crate::functions::{FunctionDef, FunctionRegistry};
use crate::symbols::{SymbolEntry, SymbolKind, SymbolTable};
use formula_ast::{Expr, ExprKind, Ident, NodeId, Span};
use formula_types::{DType, EnumLiteral, Features, RecordType};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// How a name node relates to its scope.
#[derive(Debug, Clone, PartialEq)]
pub enum BindKind {
    /// Host variable, data source or `Set`-declared variable
    Global { name: String },
    /// Field of the row in scope `scope` (0 is the rule scope)
    ScopeField { scope: usize, field: String },
    /// `ThisRecord`: the whole row of a scope
    ThisRecord { scope: usize },
    /// `As` alias naming the row of a scope
    Alias { scope: usize },
    /// Field or column reached with `.`, by logical name
    Field { field: String },
    EnumMember { value: EnumLiteral },
    /// Name of an enum type itself
    Enum,
    SelfRef,
    ParentRef,
    /// Unresolved; a diagnostic was reported
    Unknown,
}

#[derive(Debug, Clone)]
pub struct BindInfo {
    pub ty: DType,
    /// `None` for nodes that are not names
    pub kind: Option<BindKind>,
    /// Type the node's value is converted to before its parent uses it
    pub coerce_to: Option<DType>,
}

/// Function resolved for a call node.
#[derive(Debug, Clone)]
pub struct CallInfo {
    pub function: Arc<FunctionDef>,
    /// The last argument is the literal `"ALL"` marker and is not evaluated
    pub all_marker: bool,
}

/// Side tables produced by one bind pass.
#[derive(Debug, Clone)]
pub struct Binding {
    infos: HashMap<NodeId, BindInfo>,
    calls: HashMap<NodeId, CallInfo>,
    diagnostics: Vec<Diagnostic>,
    declared: Vec<(String, DType)>,
    root_type: DType,
}

impl Binding {
    pub fn info(&self, id: NodeId) -> Option<&BindInfo> {
        self.infos.get(&id)
    }

    /// Bound type of a node, `Unknown` for nodes never visited.
    pub fn ty(&self, id: NodeId) -> DType {
        self.info(id).map_or(DType::Unknown, |i| i.ty.clone())
    }

    pub fn kind(&self, id: NodeId) -> Option<&BindKind> {
        self.info(id)?.kind.as_ref()
    }

    pub fn coercion(&self, id: NodeId) -> Option<&DType> {
        self.info(id)?.coerce_to.as_ref()
    }

    pub fn call(&self, id: NodeId) -> Option<&CallInfo> {
        self.calls.get(&id)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Variables introduced by `Set`, in declaration order.
    pub fn declared(&self) -> &[(String, DType)] {
        &self.declared
    }

    pub fn root_type(&self) -> &DType {
        &self.root_type
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_severe)
    }
}

/// Inputs of a bind pass.
pub struct BindContext<'a> {
    pub symbols: &'a SymbolTable,
    pub registry: &'a FunctionRegistry,
    pub features: &'a Features,
    /// Behavior functions are allowed
    pub allow_side_effects: bool,
    /// Fields in scope without qualification
    pub rule_scope: &'a RecordType,
    pub self_type: Option<DType>,
    pub parent_type: Option<DType>,
}

/// Bind `root` and return its side tables.
#[instrument(skip_all, name = "bind")]
pub fn bind(root: &Expr, ctx: &BindContext<'_>) -> Binding {
    let mut binder = Binder {
        ctx,
        scopes: vec![RowScope {
            row: ctx.rule_scope.clone(),
            alias: None,
        }],
        declared: IndexMap::new(),
        binding: Binding {
            infos: HashMap::new(),
            calls: HashMap::new(),
            diagnostics: Vec::new(),
            declared: Vec::new(),
            root_type: DType::Unknown,
        },
    };
    let root_type = binder.bind(root);
    let mut binding = binder.binding;
    binding.root_type = root_type;
    binding.declared = binder
        .declared
        .into_iter()
        .map(|(name, entry)| (name, entry.ty))
        .collect();
    debug!(
        nodes = binding.infos.len(),
        diagnostics = binding.diagnostics.len(),
        root_type = %binding.root_type,
        "bound"
    );
    binding
}

struct RowScope {
    row: RecordType,
    alias: Option<String>,
}

struct Binder<'a> {
    ctx: &'a BindContext<'a>,
    scopes: Vec<RowScope>,
    declared: IndexMap<String, SymbolEntry>,
    binding: Binding,
}

impl Binder<'_> {
    fn bind(&mut self, expr: &Expr) -> DType {
        let (ty, kind) = match &expr.kind {
            ExprKind::BoolLit(_) => (DType::Boolean, None),
            ExprKind::NumLit(_) => (DType::Number, None),
            ExprKind::DecLit(_) => (DType::Decimal, None),
            ExprKind::StrLit(_) => (DType::String, None),
            ExprKind::StrInterp(parts) => {
                for part in parts {
                    let ty = self.bind(part);
                    self.require(part, &ty, &DType::String, || {
                        format!("cannot use a value of type {ty} in a string")
                    });
                }
                (DType::String, None)
            }
            ExprKind::Unary { op, operand } => (self.bind_unary(*op, operand), None),
            ExprKind::Binary { op, left, right } => (self.bind_binary(*op, left, right), None),
            ExprKind::Variadic { children, .. } => {
                let mut last = DType::Void;
                for child in children {
                    last = self.bind(child);
                }
                (last, None)
            }
            ExprKind::Call {
                namespace,
                head,
                args,
            } => (self.bind_call(expr, namespace, head, args), None),
            ExprKind::FirstName(ident) => {
                let (ty, kind) = self.resolve_name(ident);
                (ty, Some(kind))
            }
            ExprKind::DottedName { left, right } => self.bind_dotted(left, right),
            ExprKind::SelfRef => self.bind_host_object(expr.span, "Self", BindKind::SelfRef),
            ExprKind::ParentRef => self.bind_host_object(expr.span, "Parent", BindKind::ParentRef),
            ExprKind::Record(fields) => {
                let mut record = RecordType::empty();
                for (name, value) in fields {
                    let ty = self.bind(value);
                    record = record.with_field(name.name.clone(), ty);
                }
                (DType::Record(record), None)
            }
            ExprKind::Table(rows) => (self.bind_table(rows), None),
            ExprKind::As { left, alias } => {
                let ty = self.bind(left);
                self.error(
                    alias.span,
                    ErrorKind::InvalidArgument,
                    "'As' can only name the first argument of a function that iterates over rows",
                );
                (ty, None)
            }
            ExprKind::Blank => (DType::Blank, None),
            ExprKind::Error(_) => (DType::Error, None),
        };
        self.record(expr.id, ty.clone(), kind);
        ty
    }

    fn record(&mut self, id: NodeId, ty: DType, kind: Option<BindKind>) {
        self.binding.infos.insert(
            id,
            BindInfo {
                ty,
                kind,
                coerce_to: None,
            },
        );
    }

    fn set_coercion(&mut self, id: NodeId, ty: DType) {
        if let Some(info) = self.binding.infos.get_mut(&id) {
            info.coerce_to = Some(ty);
        }
    }

    fn error(&mut self, span: Span, kind: ErrorKind, message: impl Into<String>) {
        self.binding
            .diagnostics
            .push(Diagnostic::new(kind, span, message));
    }

    /// Use `expr` (bound as `ty`) where `target` is expected, recording the
    /// coercion or reporting `message` when there is none.
    fn require(
        &mut self,
        expr: &Expr,
        ty: &DType,
        target: &DType,
        message: impl FnOnce() -> String,
    ) -> bool {
        match ty.coercion_sub_type(target, self.ctx.features) {
            Some((_, false)) => true,
            Some((coerced, true)) => {
                self.set_coercion(expr.id, coerced);
                true
            }
            None => {
                self.error(expr.span, ErrorKind::TypeMismatch, message());
                false
            }
        }
    }

    fn global(&self, name: &str) -> Option<&SymbolEntry> {
        self.ctx
            .symbols
            .get(name)
            .or_else(|| self.declared.get(name))
    }

    fn resolve_name(&mut self, ident: &Ident) -> (DType, BindKind) {
        let name = ident.name.as_str();
        if !ident.disambiguated {
            if name == "ThisRecord" {
                let scope = self.scopes.len() - 1;
                return (
                    DType::Record(self.scopes[scope].row.clone()),
                    BindKind::ThisRecord { scope },
                );
            }
            for (scope, row_scope) in self.scopes.iter().enumerate().rev() {
                if row_scope.alias.as_deref() == Some(name) {
                    return (DType::Record(row_scope.row.clone()), BindKind::Alias { scope });
                }
                if let Some(field) = row_scope.row.resolve_name(name) {
                    let ty = row_scope.row.field_type(&field).unwrap_or(DType::Unknown);
                    return (ty, BindKind::ScopeField { scope, field });
                }
            }
        }
        if let Some(entry) = self.global(name) {
            let kind = match entry.kind {
                SymbolKind::Enum => BindKind::Enum,
                SymbolKind::Variable | SymbolKind::DataSource => BindKind::Global {
                    name: name.to_string(),
                },
            };
            return (entry.ty.clone(), kind);
        }
        self.error(
            ident.span,
            ErrorKind::UnknownName,
            format!("name isn't recognized: '{name}'"),
        );
        (DType::Error, BindKind::Unknown)
    }

    fn bind_dotted(&mut self, left: &Expr, right: &Ident) -> (DType, Option<BindKind>) {
        let left_ty = self.bind(left);
        if let (Some(BindKind::Enum), DType::Enum(e)) = (self.binding.kind(left.id), &left_ty) {
            return match e.member(&right.name) {
                Some(value) => (
                    left_ty.clone(),
                    Some(BindKind::EnumMember {
                        value: value.clone(),
                    }),
                ),
                None => {
                    let message = format!("'{}' is not a member of {}", right.name, e.name);
                    self.error(right.span, ErrorKind::UnknownField, message);
                    (DType::Error, None)
                }
            };
        }
        match &left_ty {
            DType::Record(record) | DType::Table(record) => {
                let Some(field) = record.resolve_name(&right.name) else {
                    let message = format!("field '{}' does not exist in {left_ty}", right.name);
                    self.error(right.span, ErrorKind::UnknownField, message);
                    return (DType::Error, None);
                };
                let field_ty = record.field_type(&field).unwrap_or(DType::Unknown);
                let ty = if left_ty.is_table() {
                    DType::table([(field.clone(), field_ty)])
                } else {
                    field_ty
                };
                (ty, Some(BindKind::Field { field }))
            }
            DType::UntypedObject => (
                DType::UntypedObject,
                Some(BindKind::Field {
                    field: right.name.clone(),
                }),
            ),
            ty if ty.is_error_like() => (DType::Error, None),
            ty => {
                let message = format!("'.' needs a record or table on its left, found {ty}");
                self.error(right.span, ErrorKind::InvalidDot, message);
                (DType::Error, None)
            }
        }
    }

    fn bind_host_object(&mut self, span: Span, name: &str, kind: BindKind) -> (DType, Option<BindKind>) {
        let ty = match kind {
            BindKind::SelfRef => self.ctx.self_type.clone(),
            _ => self.ctx.parent_type.clone(),
        };
        match ty {
            Some(ty) => (ty, Some(kind)),
            None => {
                self.error(
                    span,
                    ErrorKind::UnknownName,
                    format!("'{name}' is not available in this formula"),
                );
                (DType::Error, Some(BindKind::Unknown))
            }
        }
    }

    /// `[a, b, ...]`: rows are unioned; scalar rows become `{Value: x}`.
    fn bind_table(&mut self, rows: &[Arc<Expr>]) -> DType {
        let mut row_ty: Option<DType> = None;
        for row in rows {
            let ty = self.bind(row);
            let ty = match ty {
                DType::Record(_) => ty,
                ty if ty.is_error_like() => continue,
                ty if self.ctx.features.table_syntax_allows_records_only => {
                    self.error(
                        row.span,
                        ErrorKind::TypeMismatch,
                        format!("table rows must be records, found {ty}"),
                    );
                    continue;
                }
                ty => DType::record([("Value", ty)]),
            };
            row_ty = Some(match row_ty {
                None => ty,
                Some(previous) => {
                    let (union, error) = DType::union(&previous, &ty, self.ctx.features);
                    if let Some(error) = error {
                        self.error(row.span, ErrorKind::IncompatibleTypes, error.to_string());
                    }
                    union
                }
            });
        }
        match row_ty {
            Some(DType::Record(record)) => DType::Table(record),
            _ => DType::Table(RecordType::empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formula_parser::{ParserOptions, parse};

    fn bind_text(text: &str, symbols: &SymbolTable) -> (Arc<Expr>, Binding) {
        let parsed = parse(text, &ParserOptions::default());
        assert!(parsed.success, "{:?}", parsed.errors);
        let registry = FunctionRegistry::with_builtins();
        let features = Features::default();
        let rule_scope = RecordType::empty().with_field("Amount", DType::Number);
        let ctx = BindContext {
            symbols,
            registry: &registry,
            features: &features,
            allow_side_effects: false,
            rule_scope: &rule_scope,
            self_type: None,
            parent_type: None,
        };
        let binding = bind(&parsed.root, &ctx);
        (parsed.root, binding)
    }

    #[test]
    fn test_rule_scope_field() {
        let (root, binding) = bind_text("Amount * 2", &SymbolTable::new());
        assert!(!binding.has_errors());
        assert_eq!(binding.root_type(), &DType::Number);
        let ExprKind::Binary { left, right, .. } = &root.kind else {
            panic!("expected binary");
        };
        assert_eq!(
            binding.kind(left.id),
            Some(&BindKind::ScopeField {
                scope: 0,
                field: "Amount".into()
            })
        );
        // Decimal literal widened to the Number side.
        assert_eq!(binding.coercion(right.id), Some(&DType::Number));
    }

    #[test]
    fn test_unknown_name_keeps_binding() {
        let (_, binding) = bind_text("Missing + Amount", &SymbolTable::new());
        assert_eq!(binding.diagnostics().len(), 1);
        assert_eq!(binding.diagnostics()[0].kind, ErrorKind::UnknownName);
        assert_eq!(binding.root_type(), &DType::Number);
    }

    #[test]
    fn test_lambda_scope_shadows_globals() {
        let mut symbols = SymbolTable::new();
        symbols
            .add_data_source("T", RecordType::empty().with_field("a", DType::Number), Vec::<String>::new())
            .unwrap();
        symbols.add_variable("a", DType::String, true).unwrap();
        let (root, binding) = bind_text("Filter(T, a > 1)", &symbols);
        assert!(!binding.has_errors(), "{:?}", binding.diagnostics());
        let ExprKind::Call { args, .. } = &root.kind else {
            panic!("expected call");
        };
        let ExprKind::Binary { left, .. } = &args[1].kind else {
            panic!("expected binary");
        };
        assert_eq!(
            binding.kind(left.id),
            Some(&BindKind::ScopeField {
                scope: 1,
                field: "a".into()
            })
        );
        assert!(binding.root_type().is_table());
    }

    #[test]
    fn test_disambiguated_name_skips_row_scopes() {
        let mut symbols = SymbolTable::new();
        symbols.add_variable("Amount", DType::String, true).unwrap();
        let (_, binding) = bind_text("@Amount & \"!\"", &symbols);
        assert!(!binding.has_errors());
        assert_eq!(binding.root_type(), &DType::String);
    }

    #[test]
    fn test_table_literal_unions_rows() {
        let (_, binding) = bind_text("[{a: 1}, {b: \"x\"}]", &SymbolTable::new());
        assert!(!binding.has_errors());
        assert_eq!(
            binding.root_type(),
            &DType::table([("a", DType::Decimal), ("b", DType::String)])
        );

        let (_, binding) = bind_text("[1, 2]", &SymbolTable::new());
        assert_eq!(binding.root_type(), &DType::table([("Value", DType::Decimal)]));

        let (_, binding) = bind_text("[{a: 1}, {a: [1]}]", &SymbolTable::new());
        assert_eq!(binding.diagnostics()[0].kind, ErrorKind::IncompatibleTypes);
    }

    #[test]
    fn test_enum_member() {
        let mut symbols = SymbolTable::new();
        symbols
            .add_enum(formula_types::EnumType::new(
                "Color",
                formula_types::Kind::String,
                [("Red", EnumLiteral::String("red".into()))],
            ))
            .unwrap();
        let (_, binding) = bind_text("Color.Red", &symbols);
        assert!(!binding.has_errors());
        let (_, binding) = bind_text("Color.Blue", &symbols);
        assert_eq!(binding.diagnostics()[0].kind, ErrorKind::UnknownField);
    }
}
