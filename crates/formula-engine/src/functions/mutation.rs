//! Table mutation functions: `Collect`, `ClearCollect`, `Clear`, `Patch`,
//! `Remove` and `Update`.
//!
//! # Checking
//!
//! The first argument must be a table reachable by name: a data source or
//! a mutable variable. Records written to it are checked field by field
//! against the table's row type (unknown and read-only fields are errors)
//! and their shapes are unioned, so conflicting change records are caught
//! before anything runs.
//!
//! # Running
//!
//! Every call first checks its eager arguments: the first error argument is
//! the result and the table is never touched. Multiple change records are
//! merged left to right, later fields overwriting earlier ones, before the
//! single call into [`TableValue`](crate::value::TableValue).

use super::builtins::table_arg;
use super::{CheckContext, CheckOutcome, FunctionDef, ParamMode};
use crate::error::{ErrorKind, Result};
use crate::interpreter::CallContext;
use crate::interpreter::coerce::coerce;
use crate::symbols::{SymbolEntry, SymbolKind};
use crate::value::{DValue, ErrorCode, FormulaValue, RecordValue, TableRef};
use formula_types::{DType, RecordType};
use futures::FutureExt;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use tracing::{Instrument, debug, debug_span};

pub(super) fn definitions() -> Vec<FunctionDef> {
    use ParamMode::{Eager, Lazy};
    vec![
        FunctionDef::with_context("Collect", vec![DType::Unknown], DType::Unknown, collect)
            .with_arity(2, usize::MAX)
            .behavior()
            .with_check(|ctx| {
                let mut outcome = CheckOutcome::new(DType::Error);
                if let Some((row, entry)) = target_table(ctx, &mut outcome) {
                    outcome.return_type = DType::Table(row.clone());
                    check_writes(ctx, &mut outcome, 1..ctx.args.len(), &row, Some(entry), true);
                }
                outcome
            }),
        FunctionDef::with_context("ClearCollect", vec![DType::Unknown], DType::Unknown, clear_collect)
            .with_arity(2, usize::MAX)
            .with_modes(vec![Eager, Lazy])
            .behavior()
            .with_check(|ctx| {
                let mut outcome = CheckOutcome::new(DType::Error);
                if let Some((row, entry)) = target_table(ctx, &mut outcome) {
                    outcome.return_type = DType::Table(row.clone());
                    check_writes(ctx, &mut outcome, 1..ctx.args.len(), &row, Some(entry), true);
                }
                outcome
            }),
        FunctionDef::with_context("Clear", vec![DType::Unknown], DType::Void, clear)
            .behavior()
            .with_check(|ctx| {
                let mut outcome = CheckOutcome::new(DType::Void);
                target_table(ctx, &mut outcome);
                outcome
            }),
        FunctionDef::with_context("Patch", vec![DType::Unknown], DType::Unknown, patch)
            .with_arity(2, usize::MAX)
            .behavior()
            .with_check(check_patch),
        FunctionDef::with_context("Remove", vec![DType::Unknown], DType::Void, remove)
            .with_arity(2, usize::MAX)
            .behavior()
            .with_check(check_remove),
        FunctionDef::with_context("Update", vec![DType::Unknown], DType::Void, update)
            .with_arity(3, 4)
            .behavior()
            .with_check(check_update),
    ]
}

// === Checking ===

/// Row type and symbol of a mutable first argument.
fn target_table<'c>(
    ctx: &CheckContext<'c>,
    outcome: &mut CheckOutcome,
) -> Option<(RecordType, &'c SymbolEntry)> {
    let row = ctx.expect_table(outcome, 0)?;
    let target = &ctx.args[0];
    match target.global {
        Some(entry)
            if entry.kind == SymbolKind::DataSource
                || (entry.kind == SymbolKind::Variable && entry.mutable) =>
        {
            Some((row, entry))
        }
        _ => {
            let name = target
                .expr
                .as_path()
                .map_or_else(|| "this table".to_string(), |path| format!("'{}'", path.join(".")));
            outcome.error(
                Some(0),
                ErrorKind::NotMutable,
                format!("{name} cannot be modified; use a data source or a variable"),
            );
            None
        }
    }
}

/// Check record (or, with `allow_tables`, table) arguments against the
/// target row type. `entry` is set for arguments that write; read-only
/// fields are only enforced for those.
fn check_writes(
    ctx: &CheckContext<'_>,
    outcome: &mut CheckOutcome,
    indices: impl Iterator<Item = usize>,
    row: &RecordType,
    entry: Option<&SymbolEntry>,
    allow_tables: bool,
) {
    let mut shape = DType::Blank;
    for index in indices {
        let Some(arg) = ctx.args.get(index) else {
            continue;
        };
        let (fields, expected) = match &arg.ty {
            DType::Record(fields) => (fields, DType::Record(row.clone())),
            DType::Table(fields) if allow_tables => (fields, DType::Table(row.clone())),
            DType::Blank => continue,
            ty if ty.is_error_like() => continue,
            ty => {
                outcome.error(
                    Some(index),
                    ErrorKind::TypeMismatch,
                    format!("expected a record, found {ty}"),
                );
                continue;
            }
        };

        let mut clean = true;
        for (name, _) in fields.expanded_fields() {
            if !row.has_field(&name) {
                outcome.error(
                    Some(index),
                    ErrorKind::UnknownField,
                    format!("field '{name}' does not exist in the target table"),
                );
                clean = false;
            } else if entry.is_some_and(|e| e.is_read_only_field(&name)) {
                outcome.error(
                    Some(index),
                    ErrorKind::ReadOnlyField,
                    format!("field '{name}' is read-only"),
                );
                clean = false;
            }
        }
        if !clean {
            continue;
        }

        let (union, error) = DType::union(&shape, &DType::Record(fields.clone()), ctx.features);
        if let Some(error) = error {
            outcome.error(Some(index), ErrorKind::IncompatibleTypes, error.to_string());
            continue;
        }
        shape = union;
        ctx.expect_arg(outcome, index, &expected);
    }
}

/// `Patch(T, base, changes...)` or `Patch(record, changes...)`.
fn check_patch(ctx: &CheckContext<'_>) -> CheckOutcome {
    let mut outcome = CheckOutcome::new(DType::Error);
    if let Some(DType::Record(first)) = ctx.args.first().map(|a| &a.ty) {
        let mut merged = DType::Record(first.clone());
        for index in 1..ctx.args.len() {
            let ty = &ctx.args[index].ty;
            if !matches!(ty, DType::Record(_) | DType::Blank) && !ty.is_error_like() {
                outcome.error(
                    Some(index),
                    ErrorKind::TypeMismatch,
                    format!("expected a record, found {ty}"),
                );
                continue;
            }
            let (union, error) = DType::union(&merged, ty, ctx.features);
            if let Some(error) = error {
                outcome.error(Some(index), ErrorKind::IncompatibleTypes, error.to_string());
            }
            merged = union;
        }
        outcome.return_type = merged;
        return outcome;
    }

    let Some((row, entry)) = target_table(ctx, &mut outcome) else {
        return outcome;
    };
    outcome.return_type = DType::Record(row.clone());
    if ctx.args.len() < 3 {
        outcome.error(
            None,
            ErrorKind::WrongArgCount,
            "Patch on a table needs a base record and at least one change record",
        );
        return outcome;
    }
    check_writes(ctx, &mut outcome, 1..2, &row, None, false);
    check_writes(ctx, &mut outcome, 2..ctx.args.len(), &row, Some(entry), false);
    outcome
}

/// `Remove(T, record..., ["All"])`.
fn check_remove(ctx: &CheckContext<'_>) -> CheckOutcome {
    let mut outcome = CheckOutcome::new(DType::Void);
    let mut end = ctx.args.len();
    if end > 2 && let Some(marker) = ctx.args[end - 1].expr.as_str_literal() {
        end -= 1;
        if marker.eq_ignore_ascii_case("all") {
            outcome.all_marker = true;
        } else {
            outcome.error(
                Some(end),
                ErrorKind::InvalidArgument,
                "only the literal \"All\" may follow the records to remove",
            );
        }
    }
    if let Some((row, _)) = target_table(ctx, &mut outcome) {
        check_writes(ctx, &mut outcome, 1..end, &row, None, true);
    }
    outcome
}

/// `Update(T, base, replacement, ["All"])`.
fn check_update(ctx: &CheckContext<'_>) -> CheckOutcome {
    let mut outcome = CheckOutcome::new(DType::Void);
    if let Some(marker) = ctx.args.get(3) {
        match marker.expr.as_str_literal() {
            Some(text) if text.eq_ignore_ascii_case("all") => outcome.all_marker = true,
            _ => outcome.error(
                Some(3),
                ErrorKind::InvalidArgument,
                "the last argument of Update must be the literal \"All\"",
            ),
        }
    }
    if let Some((row, entry)) = target_table(ctx, &mut outcome) {
        check_writes(ctx, &mut outcome, 1..2, &row, None, false);
        check_writes(ctx, &mut outcome, 2..3, &row, Some(entry), false);
    }
    outcome
}

// === Running ===

/// The first error among the eager arguments (including errors left in
/// record fields by a failed coercion), or Blank when an argument at one of
/// `blank_positions` is blank.
fn check_args(ctx: &CallContext<'_>, blank_positions: &[usize]) -> Option<FormulaValue> {
    for index in 0..ctx.arg_count() {
        let value = ctx.value(index);
        if value.is_error() {
            return Some(value);
        }
        if let Some(error) = value.as_record().and_then(field_error) {
            return Some(error);
        }
        if value.is_blank() && blank_positions.contains(&index) {
            return Some(FormulaValue::Blank);
        }
    }
    None
}

/// First error stored in a field of `record`, nested records included.
fn field_error(record: &RecordValue) -> Option<FormulaValue> {
    record.fields().find_map(|(_, value)| match value {
        FormulaValue::Error(_) => Some(value.clone()),
        FormulaValue::Record(inner) => field_error(inner),
        _ => None,
    })
}

/// Fold change records left to right; later fields win.
fn merge_changes(values: &[FormulaValue]) -> RecordValue {
    values
        .iter()
        .filter_map(FormulaValue::as_record)
        .fold(RecordValue::empty(), |acc, changes| acc.merged(changes))
}

/// Records named by `values`, tables expanded in row order. Table rows are
/// converted to the `target` row type field by field.
async fn records_of(
    ctx: &CallContext<'_>,
    values: Vec<FormulaValue>,
    target: &RecordType,
) -> Result<std::result::Result<Vec<RecordValue>, FormulaValue>> {
    let row_type = DType::Record(target.clone());
    let mut records = Vec::new();
    for value in values {
        match value {
            FormulaValue::Record(record) => match field_error(&record) {
                Some(error) => return Ok(Err(error)),
                None => records.push(record),
            },
            FormulaValue::Table(table) => {
                for row in ctx.rows(&table).await? {
                    match row {
                        DValue::Value(record) => {
                            match coerce(FormulaValue::Record(record), &row_type) {
                                FormulaValue::Record(record) => match field_error(&record) {
                                    Some(error) => return Ok(Err(error)),
                                    None => records.push(record),
                                },
                                other => return Ok(Err(other)),
                            }
                        }
                        DValue::Error(e) => return Ok(Err(FormulaValue::Error(e))),
                        DValue::Blank => {}
                    }
                }
            }
            FormulaValue::Error(_) => return Ok(Err(value)),
            _ => {}
        }
    }
    Ok(Ok(records))
}

/// Append each record in order; stops at the first failed row.
async fn append_all(
    ctx: &CallContext<'_>,
    table: &TableRef,
    records: Vec<RecordValue>,
) -> Result<FormulaValue> {
    for record in records {
        ctx.cancel().check()?;
        if let DValue::Error(e) = table.append(record, ctx.cancel()).await? {
            return Ok(FormulaValue::Error(e));
        }
    }
    Ok(FormulaValue::Table(table.clone()))
}

fn collect(ctx: CallContext<'_>) -> BoxFuture<'_, Result<FormulaValue>> {
    async move {
        if let Some(early) = check_args(&ctx, &[0]) {
            return Ok(early);
        }
        let table = match table_arg(&ctx, 0) {
            Ok(table) => table,
            Err(value) => return Ok(value),
        };
        let records = match records_of(&ctx, ctx.values_from(1), &table.record_type()).await? {
            Ok(records) => records,
            Err(error) => return Ok(error),
        };
        debug!(records = records.len(), "collect");
        append_all(&ctx, &table, records).await
    }
    .instrument(debug_span!("mutation", function = "Collect"))
    .boxed()
}

fn clear_collect(ctx: CallContext<'_>) -> BoxFuture<'_, Result<FormulaValue>> {
    async move {
        if let Some(early) = check_args(&ctx, &[0]) {
            return Ok(early);
        }
        let table = match table_arg(&ctx, 0) {
            Ok(table) => table,
            Err(value) => return Ok(value),
        };
        ctx.cancel().check()?;
        if let DValue::Error(e) = table.clear(ctx.cancel()).await? {
            debug!("clear failed; nothing collected");
            return Ok(FormulaValue::Error(e));
        }
        let mut sources = Vec::with_capacity(ctx.arg_count().saturating_sub(1));
        for index in 1..ctx.arg_count() {
            sources.push(ctx.eval_lazy(index).await?);
        }
        let records = match records_of(&ctx, sources, &table.record_type()).await? {
            Ok(records) => records,
            Err(error) => return Ok(error),
        };
        append_all(&ctx, &table, records).await
    }
    .instrument(debug_span!("mutation", function = "ClearCollect"))
    .boxed()
}

fn clear(ctx: CallContext<'_>) -> BoxFuture<'_, Result<FormulaValue>> {
    async move {
        if let Some(early) = check_args(&ctx, &[0]) {
            return Ok(early);
        }
        let table = match table_arg(&ctx, 0) {
            Ok(table) => table,
            Err(value) => return Ok(value),
        };
        ctx.cancel().check()?;
        Ok(match table.clear(ctx.cancel()).await? {
            DValue::Error(e) => FormulaValue::Error(e),
            _ => FormulaValue::Blank,
        })
    }
    .instrument(debug_span!("mutation", function = "Clear"))
    .boxed()
}

fn patch(ctx: CallContext<'_>) -> BoxFuture<'_, Result<FormulaValue>> {
    async move {
        if let Some(early) = check_args(&ctx, &[0]) {
            return Ok(early);
        }
        if let FormulaValue::Record(record) = ctx.value(0) {
            let changes = merge_changes(&ctx.values_from(1));
            return Ok(FormulaValue::Record(record.merged(&changes)));
        }
        let table = match table_arg(&ctx, 0) {
            Ok(table) => table,
            Err(value) => return Ok(value),
        };
        let base = match ctx.value(1) {
            FormulaValue::Record(record) => record,
            _ => RecordValue::empty(),
        };
        let changes = merge_changes(&ctx.values_from(2));
        debug!(fields = changes.len(), "patch");
        ctx.cancel().check()?;
        Ok(table
            .patch(&base, &changes, ctx.cancel())
            .await?
            .into_formula_value())
    }
    .instrument(debug_span!("mutation", function = "Patch"))
    .boxed()
}

fn remove(ctx: CallContext<'_>) -> BoxFuture<'_, Result<FormulaValue>> {
    async move {
        if let Some(early) = check_args(&ctx, &[0]) {
            return Ok(early);
        }
        let table = match table_arg(&ctx, 0) {
            Ok(table) => table,
            Err(value) => return Ok(value),
        };
        let records = match records_of(&ctx, ctx.values_from(1), &table.record_type()).await? {
            Ok(records) => records,
            Err(error) => return Ok(error),
        };
        debug!(records = records.len(), all = ctx.all_marker(), "remove");
        ctx.cancel().check()?;
        Ok(match table.remove(&records, ctx.all_marker(), ctx.cancel()).await? {
            DValue::Error(e) => FormulaValue::Error(e),
            _ => FormulaValue::Blank,
        })
    }
    .instrument(debug_span!("mutation", function = "Remove"))
    .boxed()
}

fn update(ctx: CallContext<'_>) -> BoxFuture<'_, Result<FormulaValue>> {
    async move {
        if let Some(early) = check_args(&ctx, &[0, 1]) {
            return Ok(early);
        }
        let table = match table_arg(&ctx, 0) {
            Ok(table) => table,
            Err(value) => return Ok(value),
        };
        let (FormulaValue::Record(base), FormulaValue::Record(replacement)) =
            (ctx.value(1), ctx.value(2))
        else {
            return Ok(ctx.error(ErrorCode::InvalidArgument, "Update needs a base and a replacement record"));
        };

        // Fields missing from the replacement are cleared.
        let row_type = table.record_type();
        let mut fields: IndexMap<String, FormulaValue> = row_type
            .known_fields()
            .map(|known| {
                known
                    .map(|(name, _)| (name.to_string(), FormulaValue::Blank))
                    .collect()
            })
            .unwrap_or_default();
        for (name, value) in replacement.fields() {
            fields.insert(name.to_string(), value.clone());
        }
        let full = RecordValue::new(row_type, fields);

        let matches: Vec<RecordValue> = ctx
            .rows(&table)
            .await?
            .into_iter()
            .filter_map(|row| match row {
                DValue::Value(record) if record.matches(&base) => Some(record),
                _ => None,
            })
            .take(if ctx.all_marker() { usize::MAX } else { 1 })
            .collect();
        if matches.is_empty() {
            return Ok(ctx.error(ErrorCode::NotFound, "no record matches the base record"));
        }
        debug!(rows = matches.len(), "update");
        for row in &matches {
            ctx.cancel().check()?;
            if let DValue::Error(e) = table.patch(row, &full, ctx.cancel()).await? {
                return Ok(FormulaValue::Error(e));
            }
        }
        Ok(FormulaValue::Blank)
    }
    .instrument(debug_span!("mutation", function = "Update"))
    .boxed()
}
