//! End-to-end evaluation: rule scope, row isolation, cancellation, host
//! faults, `Set` persistence and logging.

mod common;

use common::*;
use formula_engine::{
    CancellationToken, DValue, Engine, EngineConfig, ErrorCode, ErrorKind, ErrorValue, EvalError,
    FormulaValue, FunctionDef, RecordValue,
};
use formula_types::DType;
use futures::FutureExt;
use std::io;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

async fn eval(engine: &mut Engine, text: &str) -> FormulaValue {
    engine
        .eval(text, &RecordValue::empty(), CancellationToken::new())
        .await
        .unwrap_or_else(|e| panic!("'{text}' failed: {e}"))
}

/// Five rows `a = 1..=5`, the third of which failed to load.
fn table_with_bad_row() -> Arc<MockTable> {
    let rows = (1..=5)
        .map(|i| {
            if i == 3 {
                DValue::Error(ErrorValue::new(ErrorCode::Custom, "row 3 is corrupt"))
            } else {
                DValue::Value(row(f64::from(i), 0.0))
            }
        })
        .collect();
    Arc::new(MockTable::new(rows))
}

#[tokio::test]
async fn test_rule_scope_fields() {
    let mut engine = Engine::default();
    let rule = RecordValue::from_fields([("Amount", FormulaValue::Number(21.0))]);
    let value = engine
        .eval("Amount * 2", &rule, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(number(&value), 42.0);
}

#[tokio::test]
async fn test_failed_check_is_not_evaluated() {
    let mut engine = Engine::default();
    let result = engine
        .eval("Nope + 1", &RecordValue::empty(), CancellationToken::new())
        .await;
    assert_eq!(result.unwrap_err(), EvalError::NotBound(1));
}

#[tokio::test]
async fn test_deeply_nested_formula_is_a_diagnostic() {
    let mut engine = Engine::default();
    let text = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
    let result = engine.check(&text, &formula_types::RecordType::empty());
    assert!(!result.success);
    let kinds: Vec<ErrorKind> = result.errors().map(|d| d.kind).collect();
    assert_eq!(kinds, vec![ErrorKind::Syntax]);

    let result = engine
        .eval(&text, &RecordValue::empty(), CancellationToken::new())
        .await;
    assert_eq!(result.unwrap_err(), EvalError::NotBound(1));
}

// =============================================================================
// Row isolation
// =============================================================================

#[tokio::test]
async fn test_bad_row_does_not_stop_iteration() {
    let mut engine = engine();
    engine
        .add_data_source("T", table_with_bad_row(), NO_READ_ONLY)
        .unwrap();

    let FormulaValue::Table(doubled) = eval(&mut engine, "ForAll(T, a * 2)").await else {
        panic!("ForAll should return a table");
    };
    let rows = doubled.rows(&CancellationToken::new()).await.unwrap();
    assert_eq!(rows.len(), 5);
    for (index, expected) in [(0, 2.0), (1, 4.0), (3, 8.0), (4, 10.0)] {
        let value = rows[index].value().unwrap().field("Value");
        assert_eq!(value.as_f64(), Some(expected), "row {index}");
    }
    assert!(rows[2].is_error());

    assert_eq!(number(&eval(&mut engine, "CountRows(T)").await), 5.0);
    assert_eq!(number(&eval(&mut engine, "CountRows(Filter(T, a > 1))").await), 4.0);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancelled_token_stops_before_any_table_call() {
    let table = Arc::new(MockTable::new(Vec::new()));
    let mut engine = engine();
    engine.add_data_source("T", table.clone(), NO_READ_ONLY).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = engine
        .eval("Collect(T, {a: 1})", &RecordValue::empty(), cancel)
        .await;
    assert_eq!(result.unwrap_err(), EvalError::Cancelled);
    assert_eq!(table.calls.total(), 0);
}

#[tokio::test]
async fn test_cancellation_mid_formula() {
    let table = Arc::new(MockTable::new(Vec::new()));
    let mut engine = engine();
    engine.add_data_source("T", table.clone(), NO_READ_ONLY).unwrap();
    engine
        .register_function(FunctionDef::host_async(
            "CancelNow",
            vec![],
            DType::record([("a", DType::Number)]),
            |_, cancel| {
                async move {
                    cancel.cancel();
                    Ok(FormulaValue::Record(RecordValue::from_fields([(
                        "a",
                        FormulaValue::Number(1.0),
                    )])))
                }
                .boxed()
            },
        ))
        .unwrap();

    let result = engine
        .eval("Collect(T, CancelNow())", &RecordValue::empty(), CancellationToken::new())
        .await;
    assert_eq!(result.unwrap_err(), EvalError::Cancelled);
    assert_eq!(table.calls.append.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Host faults
// =============================================================================

#[tokio::test]
async fn test_host_panic_becomes_error_value() {
    let mut engine = Engine::default();
    engine
        .register_function(FunctionDef::sync("Explode", vec![], DType::Number, |_| {
            panic!("host exploded")
        }))
        .unwrap();

    let value = eval(&mut engine, "1 + Explode()").await;
    let error = value.as_error().unwrap();
    assert_eq!(error.code(), ErrorCode::HostFault);
    assert_eq!(error.message(), "host exploded");

    assert_eq!(number(&eval(&mut engine, "1 + 1").await), 2.0);
}

// =============================================================================
// Variables
// =============================================================================

#[tokio::test]
async fn test_set_variables_persist() {
    let mut engine = engine();
    let value = eval(&mut engine, "Set(x, 5); x * 2").await;
    assert_eq!(number(&value), 10.0);
    assert!(engine.symbols().get("x").is_some_and(|entry| entry.mutable));

    eval(&mut engine, "Set(x, x + 1)").await;
    assert_eq!(engine.variable("x").and_then(FormulaValue::as_f64), Some(6.0));
}

#[tokio::test]
async fn test_collect_into_variable_table() {
    let mut engine = engine();
    eval(&mut engine, "Set(Items, [{a: 1}]); Collect(Items, {a: 2})").await;
    assert_eq!(number(&eval(&mut engine, "CountRows(Items)").await), 2.0);
    assert_eq!(number(&eval(&mut engine, "Sum(Items, a)").await), 3.0);
}

// =============================================================================
// Logging
// =============================================================================

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_logs_go_to_the_configured_dispatch() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    let config = EngineConfig::default()
        .with_side_effects()
        .with_dispatch(tracing::Dispatch::new(subscriber));
    let mut engine = Engine::new(config);
    engine
        .add_data_source("T", Arc::new(MockTable::new(Vec::new())), NO_READ_ONLY)
        .unwrap();
    eval(&mut engine, "Collect(T, {a: 1})").await;

    let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
    assert!(logs.contains("checked"), "{logs}");
    assert!(logs.contains("Collect"), "{logs}");
}
