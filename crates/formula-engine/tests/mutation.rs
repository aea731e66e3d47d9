//! Mutation function tests: argument checks, dispatch to `TableValue`,
//! change merging and the `"All"` marker.

mod common;

use common::*;
use formula_engine::{
    CancellationToken, DValue, Engine, ErrorCode, ErrorKind, FormulaValue, FunctionDef,
    InMemoryTable, RecordValue, TableValue,
};
use formula_types::{DType, RecordType};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

async fn eval(engine: &mut Engine, text: &str) -> FormulaValue {
    engine
        .eval(text, &RecordValue::empty(), CancellationToken::new())
        .await
        .unwrap_or_else(|e| panic!("'{text}' failed: {e}"))
}

/// Engine with `T` backed by an in-memory table holding `rows`.
fn memory_engine(rows: &[(f64, f64)]) -> (Engine, Arc<InMemoryTable>) {
    let table = Arc::new(InMemoryTable::from_records(
        row_type(),
        rows.iter().map(|&(a, b)| row(a, b)),
    ));
    let mut engine = engine();
    engine.add_data_source("T", table.clone(), NO_READ_ONLY).unwrap();
    (engine, table)
}

fn mock_engine(table: Arc<MockTable>) -> Engine {
    let mut engine = engine();
    engine.add_data_source("T", table, NO_READ_ONLY).unwrap();
    engine
        .register_function(FunctionDef::sync(
            "Fail",
            vec![],
            DType::record([("a", DType::Number)]),
            |_| FormulaValue::error(ErrorCode::Custom, "boom"),
        ))
        .unwrap();
    engine
}

fn error_kinds(engine: &Engine, text: &str) -> Vec<ErrorKind> {
    let result = engine.check(text, &RecordType::empty());
    assert!(!result.success, "expected '{text}' to fail its check");
    result.errors().map(|d| d.kind).collect()
}

// =============================================================================
// Error short-circuit
// =============================================================================

#[tokio::test]
async fn test_error_argument_never_reaches_the_table() {
    for text in [
        "Collect(T, Fail())",
        "Collect(T, {a: 1}, Fail())",
        "Patch(T, Fail(), {a: 1})",
        "Patch(T, {a: 1}, Fail())",
        "Remove(T, Fail())",
        "Update(T, Fail(), {a: 1})",
    ] {
        let table = Arc::new(MockTable::new(Vec::new()));
        let mut engine = mock_engine(table.clone());
        let value = eval(&mut engine, text).await;
        let error = value.as_error().unwrap_or_else(|| panic!("'{text}' gave {value}"));
        assert_eq!(error.message(), "boom", "{text}");
        assert_eq!(table.calls.total(), 0, "{text} touched the table");
    }
}

#[tokio::test]
async fn test_blank_table_argument_is_blank() {
    let mut engine = engine();
    engine
        .declare_variable("Empty", DType::table([("a", DType::Number)]))
        .unwrap();
    let value = eval(&mut engine, "Collect(Empty, {a: 1})").await;
    assert!(value.is_blank());
}

// =============================================================================
// Patch
// =============================================================================

#[tokio::test]
async fn test_patch_later_changes_win() {
    let table = Arc::new(MockTable::new(Vec::new()));
    let mut engine = mock_engine(table.clone());
    eval(&mut engine, "Patch(T, {a: 1}, {a: 1, b: 1}, {a: 2})").await;

    let patched = table.patched.lock().unwrap();
    assert_eq!(patched.len(), 1);
    let (base, changes) = &patched[0];
    assert_eq!(base.field("a").as_f64(), Some(1.0));
    assert_eq!(changes.field("a").as_f64(), Some(2.0));
    assert_eq!(changes.field("b").as_f64(), Some(1.0));
    assert_eq!(changes.len(), 2);
}

#[tokio::test]
async fn test_patch_updates_first_match_or_inserts() {
    let (mut engine, table) = memory_engine(&[(1.0, 1.0), (2.0, 2.0)]);
    let updated = eval(&mut engine, "Patch(T, LookUp(T, a = 2), {b: 20})").await;
    assert_eq!(updated.as_record().unwrap().field("b").as_f64(), Some(20.0));

    eval(&mut engine, "Patch(T, Defaults(T), {a: 3, b: 3})").await;
    assert_eq!(column_a(table.as_ref()).await, vec![Some(1.0), Some(2.0), Some(3.0)]);
}

#[tokio::test]
async fn test_patch_record_form_merges() {
    let mut engine = engine();
    let value = eval(&mut engine, "Patch({a: 1, b: 2}, {b: 3}, {c: \"x\"})").await;
    let record = value.as_record().unwrap();
    assert_eq!(record.field("a").as_f64(), Some(1.0));
    assert_eq!(record.field("b").as_f64(), Some(3.0));
    assert_eq!(record.field("c").to_text().as_deref(), Some("x"));
}

#[tokio::test]
async fn test_failed_field_coercion_never_reaches_the_table() {
    for text in [
        "Patch(T, First(T), {b: \"x\"})",
        "Collect(T, {a: \"y\"})",
        "Collect(T, {a: 1}, {a: \"y\"})",
        "Remove(T, {a: \"y\"})",
    ] {
        let table = Arc::new(MockTable::new(vec![DValue::Value(row(1.0, 1.0))]));
        let mut engine = mock_engine(table.clone());
        let value = eval(&mut engine, text).await;
        let error = value.as_error().unwrap_or_else(|| panic!("'{text}' gave {value}"));
        assert_eq!(error.code(), ErrorCode::TypeMismatch, "{text}");
        assert_eq!(table.calls.append.load(Ordering::SeqCst), 0, "{text}");
        assert_eq!(table.calls.patch.load(Ordering::SeqCst), 0, "{text}");
        assert_eq!(table.calls.remove.load(Ordering::SeqCst), 0, "{text}");
    }
}

// =============================================================================
// Collect and ClearCollect
// =============================================================================

#[tokio::test]
async fn test_collect_appends_in_argument_order() {
    let (mut engine, table) = memory_engine(&[(0.0, 0.0)]);
    let value = eval(&mut engine, "Collect(T, {a: 1}, [{a: 2}, {a: 3}], {a: 4, b: 9})").await;
    assert!(matches!(value, FormulaValue::Table(_)));
    assert_eq!(
        column_a(table.as_ref()).await,
        vec![Some(0.0), Some(1.0), Some(2.0), Some(3.0), Some(4.0)]
    );
}

#[tokio::test]
async fn test_clear_collect_replaces_contents() {
    let (mut engine, table) = memory_engine(&[(5.0, 5.0), (6.0, 6.0)]);
    eval(&mut engine, "ClearCollect(T, {a: 1})").await;
    assert_eq!(column_a(table.as_ref()).await, vec![Some(1.0)]);
}

#[tokio::test]
async fn test_clear_collect_stops_when_clear_fails() {
    let table = Arc::new(MockTable::new(vec![DValue::Value(row(5.0, 5.0))]).failing_clear());
    let mut engine = mock_engine(table.clone());
    let sources = Arc::new(AtomicUsize::new(0));
    let counter = sources.clone();
    engine
        .register_function(FunctionDef::sync(
            "Source",
            vec![],
            DType::record([("a", DType::Number)]),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                FormulaValue::Record(RecordValue::from_fields([("a", FormulaValue::Number(1.0))]))
            },
        ))
        .unwrap();

    let value = eval(&mut engine, "ClearCollect(T, Source())").await;
    assert_eq!(value.as_error().unwrap().message(), "permission denied");
    assert_eq!(table.calls.clear.load(Ordering::SeqCst), 1);
    assert_eq!(table.calls.append.load(Ordering::SeqCst), 0);
    assert_eq!(sources.load(Ordering::SeqCst), 0, "source evaluated after a failed clear");
}

#[tokio::test]
async fn test_clear_collect_clears_before_a_failing_source() {
    let table = Arc::new(MockTable::new(vec![DValue::Value(row(5.0, 5.0))]));
    let mut engine = mock_engine(table.clone());

    let value = eval(&mut engine, "ClearCollect(T, Fail())").await;
    assert_eq!(value.as_error().unwrap().message(), "boom");
    assert_eq!(table.calls.clear.load(Ordering::SeqCst), 1);
    assert_eq!(table.calls.append.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_clear_empties_table() {
    let (mut engine, table) = memory_engine(&[(1.0, 1.0), (2.0, 2.0)]);
    let value = eval(&mut engine, "Clear(T)").await;
    assert!(value.is_blank());
    assert!(table.is_empty().await);
}

// =============================================================================
// Remove
// =============================================================================

#[tokio::test]
async fn test_remove_first_match_only() {
    let (mut engine, table) = memory_engine(&[(1.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
    eval(&mut engine, "Remove(T, {a: 1, b: 0})").await;
    assert_eq!(column_a(table.as_ref()).await, vec![Some(1.0), Some(2.0)]);
}

#[tokio::test]
async fn test_remove_all_literal_removes_every_match() {
    let (mut engine, table) = memory_engine(&[(1.0, 0.0), (1.0, 0.0), (2.0, 0.0), (3.0, 0.0)]);
    eval(&mut engine, "Remove(T, {a: 1}, {a: 2}, \"ALL\")").await;
    assert_eq!(column_a(table.as_ref()).await, vec![Some(3.0)]);

    let (mut engine, table) = memory_engine(&[(1.0, 0.0), (1.0, 1.0)]);
    eval(&mut engine, "Remove(T, {a: 1}, \"all\")").await;
    assert!(table.is_empty().await);
}

#[tokio::test]
async fn test_remove_missing_record_is_not_found() {
    let (mut engine, _) = memory_engine(&[(1.0, 0.0)]);
    let value = eval(&mut engine, "Remove(T, {a: 7})").await;
    assert_eq!(value.as_error().unwrap().code(), ErrorCode::NotFound);
}

#[test]
fn test_remove_all_marker_must_be_literal() {
    let (engine, _) = memory_engine(&[]);
    let kinds = error_kinds(&engine, "Set(mode, \"ALL\"); Remove(T, {a: 1}, mode)");
    assert_eq!(kinds, vec![ErrorKind::TypeMismatch]);

    let kinds = error_kinds(&engine, "Remove(T, {a: 1}, \"some\")");
    assert_eq!(kinds, vec![ErrorKind::InvalidArgument]);
}

// =============================================================================
// Update
// =============================================================================

#[tokio::test]
async fn test_update_replaces_whole_record() {
    let (mut engine, table) = memory_engine(&[(1.0, 1.0), (1.0, 2.0), (2.0, 3.0)]);
    eval(&mut engine, "Update(T, First(T), {a: 9})").await;
    let rows = table.rows(&CancellationToken::new()).await.unwrap();
    let first = rows[0].value().unwrap();
    assert_eq!(first.field("a").as_f64(), Some(9.0));
    assert!(first.field("b").is_blank());
    assert_eq!(rows[1].value().unwrap().field("b").as_f64(), Some(2.0));
}

#[tokio::test]
async fn test_update_all_and_not_found() {
    let (mut engine, table) = memory_engine(&[(1.0, 1.0), (1.0, 2.0), (2.0, 3.0)]);
    eval(&mut engine, "Update(T, {a: 1}, {a: 7, b: 7}, \"All\")").await;
    assert_eq!(column_a(table.as_ref()).await, vec![Some(7.0), Some(7.0), Some(2.0)]);

    let value = eval(&mut engine, "Update(T, {a: 42}, {a: 1})").await;
    assert_eq!(value.as_error().unwrap().code(), ErrorCode::NotFound);
}

// =============================================================================
// Check-time rules
// =============================================================================

#[test]
fn test_target_must_be_mutable() {
    let (mut engine, _) = memory_engine(&[]);
    engine
        .add_constant(
            "Fixed",
            FormulaValue::Table(InMemoryTable::new(row_type()).into_ref()),
        )
        .unwrap();
    assert_eq!(error_kinds(&engine, "Collect(Fixed, {a: 1})"), vec![ErrorKind::NotMutable]);
    assert_eq!(
        error_kinds(&engine, "Collect(Filter(T, a > 1), {a: 1})"),
        vec![ErrorKind::NotMutable]
    );
}

#[test]
fn test_written_fields_are_checked() {
    let mut engine = engine();
    let ty = RecordType::empty()
        .with_field("id", DType::Number)
        .with_field("name", DType::String);
    engine
        .add_data_source("People", InMemoryTable::new(ty).into_ref(), ["id"])
        .unwrap();

    assert_eq!(
        error_kinds(&engine, "Patch(People, First(People), {id: 5})"),
        vec![ErrorKind::ReadOnlyField]
    );
    assert_eq!(
        error_kinds(&engine, "Collect(People, {nickname: \"x\"})"),
        vec![ErrorKind::UnknownField]
    );
    assert!(engine.check("Patch(People, First(People), {name: \"x\"})", &RecordType::empty()).success);
    assert!(engine.check("Remove(People, {id: 5})", &RecordType::empty()).success);
}

#[test]
fn test_conflicting_change_records() {
    let (engine, _) = memory_engine(&[]);
    let kinds = error_kinds(&engine, "Collect(T, {a: 1}, {a: \"x\"})");
    assert!(kinds.contains(&ErrorKind::IncompatibleTypes), "{kinds:?}");
}

#[test]
fn test_mutation_needs_side_effects() {
    let mut engine = Engine::default();
    engine
        .add_data_source("T", InMemoryTable::new(row_type()).into_ref(), NO_READ_ONLY)
        .unwrap();
    let result = engine.check("Collect(T, {a: 1})", &RecordType::empty());
    assert!(!result.success);
    assert!(result.errors().any(|d| d.kind == ErrorKind::BehaviorOnly));
}
