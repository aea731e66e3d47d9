use super::{DValue, ErrorValue, FormulaValue, RecordValue};
use crate::cancel::CancellationToken;
use crate::error::Result;
use async_trait::async_trait;
use formula_types::{DType, RecordType};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

/// Shared handle to a table.
pub type TableRef = Arc<dyn TableValue>;

/// Async row source, possibly backed by a remote store.
///
/// Every method is cancellable and reports expected failures (not found,
/// permission denied) as `DValue::Error`; `Err` is reserved for
/// cancellation and host faults. Mutations default to "not supported".
#[async_trait]
pub trait TableValue: Send + Sync + fmt::Debug {
    /// Row type.
    fn record_type(&self) -> RecordType;

    /// Materialize all rows. A bad row is an error row, not an `Err`.
    async fn rows(&self, cancel: &CancellationToken) -> Result<Vec<DValue<RecordValue>>>;

    async fn schema(&self, cancel: &CancellationToken) -> Result<DType> {
        cancel.check()?;
        Ok(DType::Table(self.record_type()))
    }

    async fn append(
        &self,
        _record: RecordValue,
        cancel: &CancellationToken,
    ) -> Result<DValue<RecordValue>> {
        cancel.check()?;
        Ok(DValue::Error(ErrorValue::not_supported("Collect")))
    }

    /// Update the first row matching `base` with `changes`, or insert when
    /// nothing matches.
    async fn patch(
        &self,
        _base: &RecordValue,
        _changes: &RecordValue,
        cancel: &CancellationToken,
    ) -> Result<DValue<RecordValue>> {
        cancel.check()?;
        Ok(DValue::Error(ErrorValue::not_supported("Patch")))
    }

    /// Remove the first row matching each record, or every matching row
    /// when `all` is set.
    async fn remove(
        &self,
        _records: &[RecordValue],
        _all: bool,
        cancel: &CancellationToken,
    ) -> Result<DValue<()>> {
        cancel.check()?;
        Ok(DValue::Error(ErrorValue::not_supported("Remove")))
    }

    async fn clear(&self, cancel: &CancellationToken) -> Result<DValue<()>> {
        cancel.check()?;
        Ok(DValue::Error(ErrorValue::not_supported("Clear")))
    }
}

/// Table holding an owned copy of its rows.
#[derive(Debug)]
pub struct InMemoryTable {
    ty: RecordType,
    rows: RwLock<Vec<DValue<RecordValue>>>,
}

impl InMemoryTable {
    pub fn new(ty: RecordType) -> Self {
        Self::with_rows(ty, Vec::new())
    }

    pub fn with_rows(ty: RecordType, rows: impl IntoIterator<Item = DValue<RecordValue>>) -> Self {
        Self {
            ty,
            rows: RwLock::new(rows.into_iter().collect()),
        }
    }

    pub fn from_records(ty: RecordType, records: impl IntoIterator<Item = RecordValue>) -> Self {
        let mut table = Self::new(ty);
        let rows = records
            .into_iter()
            .map(|r| DValue::Value(table.conform(r)))
            .collect();
        *table.rows.get_mut() = rows;
        table
    }

    pub fn into_ref(self) -> TableRef {
        Arc::new(self)
    }

    /// Row count including error and blank rows.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Lay `record` out in column order, blank-filling missing columns.
    fn conform(&self, record: RecordValue) -> RecordValue {
        let Some(columns) = self.ty.field_names(false) else {
            return record;
        };
        let mut row = RecordValue::empty().with_type(self.ty.clone());
        for column in &columns {
            row.set(column.clone(), record.field(column));
        }
        for (name, value) in record.fields() {
            if !row.record_type().has_field(name) {
                row.set(name, value.clone());
            }
        }
        row
    }
}

#[async_trait]
impl TableValue for InMemoryTable {
    fn record_type(&self) -> RecordType {
        self.ty.clone()
    }

    async fn rows(&self, cancel: &CancellationToken) -> Result<Vec<DValue<RecordValue>>> {
        cancel.check()?;
        Ok(self.rows.read().await.clone())
    }

    async fn append(
        &self,
        record: RecordValue,
        cancel: &CancellationToken,
    ) -> Result<DValue<RecordValue>> {
        cancel.check()?;
        let row = self.conform(record);
        self.rows.write().await.push(DValue::Value(row.clone()));
        trace!(fields = row.len(), "row appended");
        Ok(DValue::Value(row))
    }

    async fn patch(
        &self,
        base: &RecordValue,
        changes: &RecordValue,
        cancel: &CancellationToken,
    ) -> Result<DValue<RecordValue>> {
        cancel.check()?;
        let mut rows = self.rows.write().await;
        let found = if base.is_empty() {
            None
        } else {
            rows.iter()
                .position(|row| row.value().is_some_and(|r| r.matches(base)))
        };
        let updated = match found {
            Some(index) => {
                let merged = match &rows[index] {
                    DValue::Value(row) => row.merged(changes),
                    _ => base.merged(changes),
                };
                rows[index] = DValue::Value(merged.clone());
                merged
            }
            None => {
                let inserted = self.conform(base.merged(changes));
                rows.push(DValue::Value(inserted.clone()));
                inserted
            }
        };
        trace!(updated = found.is_some(), "row patched");
        Ok(DValue::Value(updated))
    }

    async fn remove(
        &self,
        records: &[RecordValue],
        all: bool,
        cancel: &CancellationToken,
    ) -> Result<DValue<()>> {
        cancel.check()?;
        let mut rows = self.rows.write().await;
        let mut missing = 0usize;
        for pattern in records {
            let matches = |row: &DValue<RecordValue>| row.value().is_some_and(|r| r.matches(pattern));
            if all {
                let before = rows.len();
                rows.retain(|row| !matches(row));
                if rows.len() == before {
                    missing += 1;
                }
            } else if let Some(index) = rows.iter().position(matches) {
                rows.remove(index);
            } else {
                missing += 1;
            }
        }
        if missing > 0 {
            return Ok(DValue::Error(ErrorValue::not_found(format!(
                "{missing} record(s) to remove were not found"
            ))));
        }
        Ok(DValue::Value(()))
    }

    async fn clear(&self, cancel: &CancellationToken) -> Result<DValue<()>> {
        cancel.check()?;
        self.rows.write().await.clear();
        Ok(DValue::Value(()))
    }
}

/// Formula value for a table built from rows.
pub(crate) fn table_value(ty: RecordType, rows: Vec<DValue<RecordValue>>) -> FormulaValue {
    FormulaValue::Table(InMemoryTable::with_rows(ty, rows).into_ref())
}
