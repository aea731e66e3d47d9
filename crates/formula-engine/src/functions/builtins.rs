//! Builtin library: logic, conversion and table functions.
//!
//! Table functions iterate rows of their first argument and keep row-level
//! errors in place: an error row never stops the iteration.

use super::{CheckContext, CheckOutcome, FunctionDef, ParamMode};
use crate::error::{ErrorKind, Result};
use crate::interpreter::CallContext;
use crate::interpreter::coerce;
use crate::value::{DValue, ErrorCode, FormulaValue, RecordValue, TableRef, table_value};
use formula_types::{DType, RecordType};
use futures::FutureExt;
use futures::future::BoxFuture;
use indexmap::IndexMap;

pub(super) fn definitions() -> Vec<FunctionDef> {
    use ParamMode::{Eager, Identifier, Lambda, Lazy};
    vec![
        // === Logic ===
        FunctionDef::sync("Blank", vec![], DType::Blank, |_| FormulaValue::Blank),
        FunctionDef::sync("IsBlank", vec![DType::Unknown], DType::Boolean, |args| {
            FormulaValue::Boolean(match args.first() {
                Some(FormulaValue::Blank) | None => true,
                Some(FormulaValue::String(s)) => s.is_empty(),
                _ => false,
            })
        }),
        FunctionDef::sync("IsError", vec![DType::Unknown], DType::Boolean, |args| {
            FormulaValue::Boolean(args.first().is_some_and(FormulaValue::is_error))
        })
        .keeps_errors(),
        FunctionDef::with_context("If", vec![DType::Boolean, DType::Unknown], DType::Unknown, if_)
            .with_arity(2, usize::MAX)
            .with_modes(vec![Eager, Lazy])
            .with_check(check_if),

        // === Conversion ===
        FunctionDef::sync("Text", vec![DType::String], DType::String, |args| {
            args.first()
                .cloned()
                .map_or(FormulaValue::Blank, coerce::to_text)
        }),
        FunctionDef::sync("Value", vec![DType::Number], DType::Number, |args| {
            args.first()
                .cloned()
                .map_or(FormulaValue::Blank, coerce::to_number)
        }),

        // === Tables ===
        FunctionDef::with_context("CountRows", vec![DType::Unknown], DType::Number, count_rows)
            .with_check(|ctx| {
                let mut outcome = CheckOutcome::new(DType::Number);
                ctx.expect_table(&mut outcome, 0);
                outcome
            }),
        FunctionDef::with_context("First", vec![DType::Unknown], DType::Unknown, first)
            .with_check(|ctx| {
                let mut outcome = CheckOutcome::new(DType::Error);
                if let Some(row) = ctx.expect_table(&mut outcome, 0) {
                    outcome.return_type = DType::Record(row);
                }
                outcome
            }),
        FunctionDef::sync("Defaults", vec![DType::Unknown], DType::Unknown, defaults).with_check(
            |ctx| {
                let mut outcome = CheckOutcome::new(DType::Error);
                if let Some(row) = ctx.expect_table(&mut outcome, 0) {
                    outcome.return_type = DType::Record(row);
                }
                outcome
            },
        ),
        FunctionDef::with_context("Filter", vec![DType::Unknown, DType::Boolean], DType::Unknown, filter)
            .with_arity(2, usize::MAX)
            .with_modes(vec![Eager, Lambda])
            .with_check(|ctx| {
                let mut outcome = CheckOutcome::new(DType::Error);
                if ctx.expect_table(&mut outcome, 0).is_some() {
                    outcome.return_type = ctx.args[0].ty.clone();
                }
                for index in 1..ctx.args.len() {
                    ctx.expect_arg(&mut outcome, index, &DType::Boolean);
                }
                outcome
            }),
        FunctionDef::with_context("LookUp", vec![DType::Unknown, DType::Boolean, DType::Unknown], DType::Unknown, lookup)
            .with_arity(2, 3)
            .with_modes(vec![Eager, Lambda])
            .with_check(|ctx| {
                let mut outcome = CheckOutcome::new(DType::Error);
                let row = ctx.expect_table(&mut outcome, 0);
                ctx.expect_arg(&mut outcome, 1, &DType::Boolean);
                outcome.return_type = match (ctx.args.get(2), row) {
                    (Some(result), _) => result.ty.clone(),
                    (None, Some(row)) => DType::Record(row),
                    (None, None) => DType::Error,
                };
                outcome
            }),
        FunctionDef::with_context("ForAll", vec![DType::Unknown, DType::Unknown], DType::Unknown, for_all)
            .with_modes(vec![Eager, Lambda])
            .with_check(|ctx| {
                let mut outcome = CheckOutcome::new(DType::Error);
                ctx.expect_table(&mut outcome, 0);
                outcome.return_type = match &ctx.args[1].ty {
                    DType::Record(row) => DType::Table(row.clone()),
                    ty if ty.is_error_like() => DType::Error,
                    DType::Void => DType::Void,
                    ty => DType::table([("Value", ty.clone())]),
                };
                outcome
            }),
        FunctionDef::with_context("Sum", vec![DType::Unknown, DType::Number], DType::Number, sum)
            .with_modes(vec![Eager, Lambda])
            .with_check(|ctx| {
                let mut outcome = CheckOutcome::new(DType::Number);
                ctx.expect_table(&mut outcome, 0);
                ctx.expect_arg(&mut outcome, 1, &DType::Number);
                outcome
            }),

        // === Variables ===
        FunctionDef::with_context("Set", vec![DType::Unknown, DType::Unknown], DType::Void, set)
            .behavior()
            .with_modes(vec![Identifier, Eager])
            .with_check(check_set),
    ]
}

/// `If(cond, then, [cond, then, ...], [else])`: result is the union of
/// every branch.
fn check_if(ctx: &CheckContext<'_>) -> CheckOutcome {
    let count = ctx.args.len();
    let mut outcome = CheckOutcome::new(DType::Unknown);
    let mut branches = Vec::new();
    for index in 0..count {
        let is_condition = index % 2 == 0 && index + 1 < count;
        if is_condition {
            ctx.expect_arg(&mut outcome, index, &DType::Boolean);
        } else {
            branches.push(index);
        }
    }

    let mut result = DType::Blank;
    for &index in &branches {
        let (union, error) = DType::union(&result, &ctx.args[index].ty, ctx.features);
        if let Some(error) = error {
            outcome.error(Some(index), ErrorKind::IncompatibleTypes, error.to_string());
        }
        result = union;
    }
    if outcome.is_valid() {
        for &index in &branches {
            ctx.expect_arg(&mut outcome, index, &result);
        }
    }
    outcome.return_type = result;
    outcome
}

/// `Set(name, value)`: assigns a mutable variable or declares a new one.
fn check_set(ctx: &CheckContext<'_>) -> CheckOutcome {
    let mut outcome = CheckOutcome::new(DType::Void);
    let Some(target) = ctx.args.first() else {
        return outcome;
    };
    let Some(name) = target.expr.as_path().filter(|p| p.len() == 1).and_then(|mut p| p.pop()) else {
        return outcome;
    };
    match target.global {
        Some(entry) if entry.mutable => ctx.expect_arg(&mut outcome, 1, &entry.ty),
        Some(_) => outcome.error(
            Some(0),
            ErrorKind::NotMutable,
            format!("'{name}' cannot be assigned"),
        ),
        None => {
            let ty = ctx.args.get(1).map_or(DType::Unknown, |a| a.ty.clone());
            outcome.declares = Some((name, ty));
        }
    }
    outcome
}

/// The table in argument 0, or the value to return instead of iterating.
pub(super) fn table_arg(ctx: &CallContext<'_>, index: usize) -> std::result::Result<TableRef, FormulaValue> {
    match ctx.value(index) {
        FormulaValue::Table(table) => Ok(table),
        FormulaValue::Error(e) => Err(FormulaValue::Error(e)),
        FormulaValue::Blank => Err(FormulaValue::Blank),
        other => Err(ctx.error(
            ErrorCode::TypeMismatch,
            format!("expected a table, found {other}"),
        )),
    }
}

fn return_row_type(ctx: &CallContext<'_>) -> RecordType {
    ctx.return_type().record_type().cloned().unwrap_or_default()
}

fn if_(ctx: CallContext<'_>) -> BoxFuture<'_, Result<FormulaValue>> {
    async move {
        let count = ctx.arg_count();
        let mut index = 0;
        while index + 1 < count {
            let condition = if index == 0 {
                ctx.value(0)
            } else {
                ctx.eval_lazy(index).await?
            };
            match condition {
                FormulaValue::Error(_) => return Ok(condition),
                FormulaValue::Boolean(true) => return ctx.eval_lazy(index + 1).await,
                _ => index += 2,
            }
        }
        if index < count {
            ctx.eval_lazy(index).await
        } else {
            Ok(FormulaValue::Blank)
        }
    }
    .boxed()
}

fn count_rows(ctx: CallContext<'_>) -> BoxFuture<'_, Result<FormulaValue>> {
    async move {
        let table = match table_arg(&ctx, 0) {
            Ok(table) => table,
            Err(FormulaValue::Blank) => return Ok(FormulaValue::Number(0.0)),
            Err(value) => return Ok(value),
        };
        let rows = ctx.rows(&table).await?;
        Ok(FormulaValue::Number(rows.len() as f64))
    }
    .boxed()
}

fn first(ctx: CallContext<'_>) -> BoxFuture<'_, Result<FormulaValue>> {
    async move {
        let table = match table_arg(&ctx, 0) {
            Ok(table) => table,
            Err(value) => return Ok(value),
        };
        let rows = ctx.rows(&table).await?;
        Ok(rows
            .into_iter()
            .next()
            .map_or(FormulaValue::Blank, DValue::into_formula_value))
    }
    .boxed()
}

fn defaults(args: &[FormulaValue]) -> FormulaValue {
    match args.first() {
        Some(FormulaValue::Table(table)) => {
            let ty = table.record_type();
            let fields: IndexMap<String, FormulaValue> = ty
                .known_fields()
                .map(|fields| {
                    fields
                        .map(|(name, _)| (name.to_string(), FormulaValue::Blank))
                        .collect()
                })
                .unwrap_or_default();
            FormulaValue::Record(RecordValue::new(ty, fields))
        }
        Some(other) => other.clone(),
        None => FormulaValue::Blank,
    }
}

fn filter(ctx: CallContext<'_>) -> BoxFuture<'_, Result<FormulaValue>> {
    async move {
        let table = match table_arg(&ctx, 0) {
            Ok(table) => table,
            Err(value) => return Ok(value),
        };
        let rows = ctx.rows(&table).await?;
        let mut kept = Vec::new();
        'rows: for row in rows {
            let record = match row {
                DValue::Value(record) => record,
                DValue::Error(e) => {
                    kept.push(DValue::Error(e));
                    continue;
                }
                DValue::Blank => continue,
            };
            for index in 1..ctx.arg_count() {
                match ctx.eval_row(index, &record).await? {
                    FormulaValue::Boolean(true) => {}
                    FormulaValue::Error(e) => {
                        kept.push(DValue::Error(e));
                        continue 'rows;
                    }
                    _ => continue 'rows,
                }
            }
            kept.push(DValue::Value(record));
        }
        Ok(table_value(table.record_type(), kept))
    }
    .boxed()
}

fn lookup(ctx: CallContext<'_>) -> BoxFuture<'_, Result<FormulaValue>> {
    async move {
        let table = match table_arg(&ctx, 0) {
            Ok(table) => table,
            Err(value) => return Ok(value),
        };
        for row in ctx.rows(&table).await? {
            let DValue::Value(record) = row else {
                continue;
            };
            match ctx.eval_row(1, &record).await? {
                FormulaValue::Boolean(true) if ctx.arg_count() > 2 => {
                    return ctx.eval_row(2, &record).await;
                }
                FormulaValue::Boolean(true) => return Ok(FormulaValue::Record(record)),
                error @ FormulaValue::Error(_) => return Ok(error),
                _ => {}
            }
        }
        Ok(FormulaValue::Blank)
    }
    .boxed()
}

fn for_all(ctx: CallContext<'_>) -> BoxFuture<'_, Result<FormulaValue>> {
    async move {
        let table = match table_arg(&ctx, 0) {
            Ok(table) => table,
            Err(value) => return Ok(value),
        };
        let rows = ctx.rows(&table).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let record = match row {
                DValue::Value(record) => record,
                DValue::Error(e) => {
                    out.push(DValue::Error(e));
                    continue;
                }
                DValue::Blank => {
                    out.push(DValue::Blank);
                    continue;
                }
            };
            out.push(match ctx.eval_row(1, &record).await? {
                FormulaValue::Record(r) => DValue::Value(r),
                FormulaValue::Error(e) => DValue::Error(e),
                FormulaValue::Blank => DValue::Blank,
                value => DValue::Value(RecordValue::from_fields([("Value", value)])),
            });
        }
        Ok(table_value(return_row_type(&ctx), out))
    }
    .boxed()
}

fn sum(ctx: CallContext<'_>) -> BoxFuture<'_, Result<FormulaValue>> {
    async move {
        let table = match table_arg(&ctx, 0) {
            Ok(table) => table,
            Err(FormulaValue::Blank) => return Ok(FormulaValue::Number(0.0)),
            Err(value) => return Ok(value),
        };
        let mut total = 0.0;
        for row in ctx.rows(&table).await? {
            let record = match row {
                DValue::Value(record) => record,
                DValue::Error(e) => return Ok(FormulaValue::Error(e)),
                DValue::Blank => continue,
            };
            match coerce::to_number(ctx.eval_row(1, &record).await?) {
                FormulaValue::Number(n) => total += n,
                error @ FormulaValue::Error(_) => return Ok(error),
                _ => {}
            }
        }
        Ok(FormulaValue::Number(total))
    }
    .boxed()
}

fn set(ctx: CallContext<'_>) -> BoxFuture<'_, Result<FormulaValue>> {
    async move {
        let Some(name) = ctx.name(0) else {
            return Ok(ctx.error(ErrorCode::InvalidArgument, "expected a variable name"));
        };
        ctx.set_variable(name, ctx.value(1));
        Ok(FormulaValue::Blank)
    }
    .boxed()
}
