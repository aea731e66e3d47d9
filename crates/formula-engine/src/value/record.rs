use super::FormulaValue;
use formula_types::{DType, RecordType};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Named fields with their record type.
///
/// Field storage is shared between clones and copied on the first write,
/// so passing records around (rows, lambda scopes, arguments) is cheap.
///
/// # Invariant
///
/// Every stored field is a field of the record type; writes to a new field
/// extend the type.
#[derive(Debug, Clone, Default)]
pub struct RecordValue {
    ty: RecordType,
    fields: Arc<IndexMap<String, FormulaValue>>,
}

impl RecordValue {
    pub fn new(ty: RecordType, fields: IndexMap<String, FormulaValue>) -> Self {
        let mut record = Self {
            ty,
            fields: Arc::new(IndexMap::new()),
        };
        for (name, value) in fields {
            record.set(name, value);
        }
        record
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Record whose type is inferred from the values.
    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, FormulaValue)>,
        S: Into<String>,
    {
        let mut record = Self::empty();
        for (name, value) in fields {
            record.set(name, value);
        }
        record
    }

    pub fn record_type(&self) -> &RecordType {
        &self.ty
    }

    pub fn get(&self, name: &str) -> Option<&FormulaValue> {
        self.fields.get(name)
    }

    /// Field value, `Blank` when absent.
    pub fn field(&self, name: &str) -> FormulaValue {
        self.get(name).cloned().unwrap_or(FormulaValue::Blank)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FormulaValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn set(&mut self, name: impl Into<String>, value: FormulaValue) {
        let name = name.into();
        if !self.ty.has_field(&name) {
            let ty = match value.dtype() {
                DType::Error => DType::Unknown,
                other => other,
            };
            self.ty = std::mem::take(&mut self.ty).with_field(name.clone(), ty);
        }
        Arc::make_mut(&mut self.fields).insert(name, value);
    }

    pub fn with(mut self, name: impl Into<String>, value: FormulaValue) -> Self {
        self.set(name, value);
        self
    }

    /// Replace the declared type, keeping the stored fields.
    pub fn with_type(mut self, ty: RecordType) -> Self {
        self.ty = ty;
        let fields = std::mem::take(Arc::make_mut(&mut self.fields));
        for (name, value) in fields {
            self.set(name, value);
        }
        self
    }

    /// `self` with every field of `changes` written over it.
    pub fn merged(&self, changes: &RecordValue) -> RecordValue {
        let mut merged = self.clone();
        for (name, value) in changes.fields() {
            merged.set(name, value.clone());
        }
        merged
    }

    /// Every field of `pattern` is present here with an equal value.
    pub fn matches(&self, pattern: &RecordValue) -> bool {
        pattern
            .fields()
            .all(|(name, expected)| self.get(name).is_some_and(|v| v.value_eq(expected)))
    }

    /// Fields are stored in the same allocation.
    pub fn shares_storage(&self, other: &RecordValue) -> bool {
        Arc::ptr_eq(&self.fields, &other.fields)
    }
}

impl fmt::Display for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.fields().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}:{value}")?;
        }
        f.write_str("}")
    }
}
