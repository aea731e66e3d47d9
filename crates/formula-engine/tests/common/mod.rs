//! Shared fixtures: engines, row helpers and a call-counting table.

#![allow(dead_code)]

use async_trait::async_trait;
use formula_engine::{
    CancellationToken, DValue, Engine, EngineConfig, ErrorValue, FormulaValue, RecordValue,
    Result, TableValue,
};
use formula_types::{DType, RecordType};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const NO_READ_ONLY: [&str; 0] = [];

/// Engine that accepts behavior formulas.
pub fn engine() -> Engine {
    Engine::new(EngineConfig::default().with_side_effects())
}

/// `{a: Number, b: Number}`
pub fn row_type() -> RecordType {
    RecordType::empty()
        .with_field("a", DType::Number)
        .with_field("b", DType::Number)
}

pub fn row(a: f64, b: f64) -> RecordValue {
    RecordValue::from_fields([("a", FormulaValue::Number(a)), ("b", FormulaValue::Number(b))])
}

pub fn number(value: &FormulaValue) -> f64 {
    value
        .as_f64()
        .unwrap_or_else(|| panic!("expected a number, got {value}"))
}

/// Values of column `a`, error and blank rows as `None`.
pub async fn column_a(table: &dyn TableValue) -> Vec<Option<f64>> {
    table
        .rows(&CancellationToken::new())
        .await
        .unwrap()
        .iter()
        .map(|row| row.value().and_then(|r| r.field("a").as_f64()))
        .collect()
}

#[derive(Debug, Default)]
pub struct Calls {
    pub rows: AtomicUsize,
    pub append: AtomicUsize,
    pub patch: AtomicUsize,
    pub remove: AtomicUsize,
    pub clear: AtomicUsize,
}

impl Calls {
    pub fn total(&self) -> usize {
        [&self.rows, &self.append, &self.patch, &self.remove, &self.clear]
            .iter()
            .map(|c| c.load(Ordering::SeqCst))
            .sum()
    }
}

/// Table that records every call and whose rows never change.
#[derive(Debug)]
pub struct MockTable {
    ty: RecordType,
    rows: Vec<DValue<RecordValue>>,
    pub calls: Calls,
    pub clear_fails: bool,
    /// `(base, changes)` of every patch
    pub patched: Mutex<Vec<(RecordValue, RecordValue)>>,
}

impl MockTable {
    pub fn new(rows: Vec<DValue<RecordValue>>) -> Self {
        Self {
            ty: row_type(),
            rows,
            calls: Calls::default(),
            clear_fails: false,
            patched: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_clear(mut self) -> Self {
        self.clear_fails = true;
        self
    }
}

#[async_trait]
impl TableValue for MockTable {
    fn record_type(&self) -> RecordType {
        self.ty.clone()
    }

    async fn rows(&self, cancel: &CancellationToken) -> Result<Vec<DValue<RecordValue>>> {
        self.calls.rows.fetch_add(1, Ordering::SeqCst);
        cancel.check()?;
        Ok(self.rows.clone())
    }

    async fn append(
        &self,
        record: RecordValue,
        cancel: &CancellationToken,
    ) -> Result<DValue<RecordValue>> {
        self.calls.append.fetch_add(1, Ordering::SeqCst);
        cancel.check()?;
        Ok(DValue::Value(record))
    }

    async fn patch(
        &self,
        base: &RecordValue,
        changes: &RecordValue,
        cancel: &CancellationToken,
    ) -> Result<DValue<RecordValue>> {
        self.calls.patch.fetch_add(1, Ordering::SeqCst);
        cancel.check()?;
        self.patched
            .lock()
            .unwrap()
            .push((base.clone(), changes.clone()));
        Ok(DValue::Value(base.merged(changes)))
    }

    async fn remove(
        &self,
        _records: &[RecordValue],
        _all: bool,
        cancel: &CancellationToken,
    ) -> Result<DValue<()>> {
        self.calls.remove.fetch_add(1, Ordering::SeqCst);
        cancel.check()?;
        Ok(DValue::Value(()))
    }

    async fn clear(&self, cancel: &CancellationToken) -> Result<DValue<()>> {
        self.calls.clear.fetch_add(1, Ordering::SeqCst);
        cancel.check()?;
        if self.clear_fails {
            return Ok(DValue::Error(ErrorValue::new(
                formula_engine::ErrorCode::Custom,
                "permission denied",
            )));
        }
        Ok(DValue::Value(()))
    }
}
