//! Call binding: overload lookup, per-mode argument binding and signature
//! checks.

use super::{BindKind, Binder, CallInfo, RowScope};
use crate::error::{Diagnostic, ErrorKind};
use crate::functions::{ArgInfo, CheckContext, FunctionDef, Lookup, ParamMode};
use crate::symbols::SymbolEntry;
use formula_ast::{Expr, ExprKind, Ident};
use formula_types::{DType, RecordType};
use std::sync::Arc;
use tracing::trace;

/// Name a call is registered under: `Math.Clamp` for `Math.Clamp(...)`.
pub(crate) fn qualified_name(namespace: &[String], head: &Ident) -> String {
    if namespace.is_empty() {
        head.name.clone()
    } else {
        format!("{}.{}", namespace.join("."), head.name)
    }
}

impl Binder<'_> {
    pub(super) fn bind_call(
        &mut self,
        call: &Expr,
        namespace: &[String],
        head: &Ident,
        args: &[Arc<Expr>],
    ) -> DType {
        let name = qualified_name(namespace, head);
        let registry = self.ctx.registry;
        let def = match registry.lookup(&name, args.len()) {
            Lookup::Found(def) => Arc::clone(def),
            Lookup::WrongArity(def) => {
                let expected = arity_text(def);
                self.error(
                    head.span,
                    ErrorKind::WrongArgCount,
                    format!(
                        "'{name}' takes {expected} arguments, {} were given",
                        args.len()
                    ),
                );
                self.bind_all(args);
                return DType::Error;
            }
            Lookup::NotFound => {
                self.error(
                    head.span,
                    ErrorKind::UnknownFunction,
                    format!("'{name}' is an unknown or unsupported function"),
                );
                self.bind_all(args);
                return DType::Error;
            }
        };
        trace!(function = %name, args = args.len(), "binding call");

        if def.is_behavior && !self.ctx.allow_side_effects {
            self.error(
                head.span,
                ErrorKind::BehaviorOnly,
                format!("'{name}' can only be used in formulas that allow side effects"),
            );
        }

        let types = self.bind_args(&def, args);
        let outcome = {
            let infos: Vec<ArgInfo<'_>> = args
                .iter()
                .zip(&types)
                .map(|(arg, ty)| ArgInfo {
                    expr: arg.as_ref(),
                    ty: ty.clone(),
                    global: self.global_reference(arg),
                })
                .collect();
            let check = CheckContext {
                def: &def,
                args: &infos,
                features: self.ctx.features,
                span: call.span,
            };
            def.check_call(&check)
        };

        for (index, ty) in &outcome.coercions {
            if let Some(arg) = args.get(*index) {
                self.set_coercion(arg.id, ty.clone());
            }
        }
        for error in &outcome.errors {
            let span = error
                .arg
                .and_then(|i| args.get(i))
                .map_or(call.span, |a| a.span);
            self.binding
                .diagnostics
                .push(Diagnostic::new(error.kind, span, error.message.clone()));
        }
        if let Some((variable, ty)) = &outcome.declares
            && self.ctx.symbols.get(variable).is_none()
        {
            self.declared
                .insert(variable.clone(), SymbolEntry::declared(variable, ty.clone()));
        }

        self.binding.calls.insert(
            call.id,
            CallInfo {
                function: def,
                all_marker: outcome.all_marker,
            },
        );
        if outcome.is_valid() {
            outcome.return_type
        } else {
            DType::Error
        }
    }

    fn bind_all(&mut self, args: &[Arc<Expr>]) {
        for arg in args {
            self.bind(arg);
        }
    }

    /// Bind arguments according to their parameter modes. Lambda arguments
    /// see the rows of the first argument.
    fn bind_args(&mut self, def: &FunctionDef, args: &[Arc<Expr>]) -> Vec<DType> {
        let has_lambda = (0..args.len()).any(|i| def.mode(i) == ParamMode::Lambda);
        let mut types = Vec::with_capacity(args.len());
        let mut pushed = false;

        for (index, arg) in args.iter().enumerate() {
            let ty = match (&arg.kind, def.mode(index)) {
                (ExprKind::As { left, alias }, _) if index == 0 && has_lambda => {
                    let ty = self.bind(left);
                    self.record(arg.id, ty.clone(), None);
                    self.push_row_scope(&ty, Some(alias.name.clone()));
                    pushed = true;
                    types.push(ty);
                    continue;
                }
                (_, ParamMode::Lambda) => {
                    if !pushed {
                        let source = types.first().cloned().unwrap_or(DType::Unknown);
                        self.push_row_scope(&source, None);
                        pushed = true;
                    }
                    self.bind(arg)
                }
                (_, ParamMode::Identifier) => self.bind_identifier(arg),
                (_, ParamMode::Eager | ParamMode::Lazy) => {
                    let ty = self.bind(arg);
                    if index == 0 && has_lambda && !pushed {
                        self.push_row_scope(&ty, None);
                        pushed = true;
                    }
                    ty
                }
            };
            types.push(ty);
        }

        if pushed {
            self.scopes.pop();
        }
        types
    }

    fn push_row_scope(&mut self, source: &DType, alias: Option<String>) {
        let row = match source {
            DType::Table(row) | DType::Record(row) => row.clone(),
            _ => RecordType::empty(),
        };
        self.scopes.push(RowScope { row, alias });
    }

    /// A bare name naming a variable, resolved or not.
    fn bind_identifier(&mut self, arg: &Expr) -> DType {
        let ExprKind::FirstName(ident) = &arg.kind else {
            self.bind(arg);
            self.error(
                arg.span,
                ErrorKind::InvalidArgument,
                "expected a variable name",
            );
            return DType::Error;
        };
        let ty = self
            .global(&ident.name)
            .map_or(DType::Unknown, |entry| entry.ty.clone());
        self.record(
            arg.id,
            ty.clone(),
            Some(BindKind::Global {
                name: ident.name.clone(),
            }),
        );
        ty
    }

    fn global_reference(&self, arg: &Expr) -> Option<&SymbolEntry> {
        match self.binding.kind(arg.id)? {
            BindKind::Global { name } => self.global(name),
            _ => None,
        }
    }
}

fn arity_text(def: &FunctionDef) -> String {
    if def.min_arity == def.max_arity {
        def.min_arity.to_string()
    } else if def.max_arity == usize::MAX {
        format!("at least {}", def.min_arity)
    } else {
        format!("{} to {}", def.min_arity, def.max_arity)
    }
}
