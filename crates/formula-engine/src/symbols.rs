//! Global names visible to formulas.

use crate::error::ConfigError;
use formula_types::{DType, EnumType, RecordType};
use indexmap::IndexMap;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    /// Host-provided or `Set`-declared value
    Variable,
    /// Table backed by a [`TableValue`](crate::value::TableValue)
    DataSource,
    /// Option set; members are reached with `Name.Member`
    Enum,
}

#[derive(Debug, Clone)]
pub struct SymbolEntry {
    pub name: String,
    pub ty: DType,
    pub kind: SymbolKind,
    /// `Set` may assign it
    pub mutable: bool,
    /// Columns that mutation functions must not write
    pub read_only_fields: HashSet<String>,
}

impl SymbolEntry {
    /// Mutable variable introduced by `Set`.
    pub(crate) fn declared(name: &str, ty: DType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            kind: SymbolKind::Variable,
            mutable: true,
            read_only_fields: HashSet::new(),
        }
    }

    pub fn is_read_only_field(&self, field: &str) -> bool {
        self.read_only_fields.contains(field)
    }

    pub fn enum_type(&self) -> Option<&EnumType> {
        match &self.ty {
            DType::Enum(e) if self.kind == SymbolKind::Enum => Some(e),
            _ => None,
        }
    }
}

/// Globals in declaration order.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    entries: IndexMap<String, SymbolEntry>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(
        &mut self,
        name: impl Into<String>,
        ty: DType,
        mutable: bool,
    ) -> Result<(), ConfigError> {
        let name = name.into();
        self.insert(SymbolEntry {
            name,
            ty,
            kind: SymbolKind::Variable,
            mutable,
            read_only_fields: HashSet::new(),
        })
    }

    pub fn add_data_source<I, S>(
        &mut self,
        name: impl Into<String>,
        row: RecordType,
        read_only_fields: I,
    ) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(SymbolEntry {
            name: name.into(),
            ty: DType::Table(row),
            kind: SymbolKind::DataSource,
            mutable: false,
            read_only_fields: read_only_fields.into_iter().map(Into::into).collect(),
        })
    }

    pub fn add_enum(&mut self, ty: EnumType) -> Result<(), ConfigError> {
        self.insert(SymbolEntry {
            name: ty.name.clone(),
            ty: DType::Enum(ty),
            kind: SymbolKind::Enum,
            mutable: false,
            read_only_fields: HashSet::new(),
        })
    }

    fn insert(&mut self, entry: SymbolEntry) -> Result<(), ConfigError> {
        if self.entries.contains_key(&entry.name) {
            return Err(ConfigError::DuplicateSymbol(entry.name));
        }
        self.entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    /// Add a mutable variable declared by `Set`, keeping an existing entry.
    pub(crate) fn declare(&mut self, name: &str, ty: DType) {
        if !self.entries.contains_key(name) {
            self.entries
                .insert(name.to_string(), SymbolEntry::declared(name, ty));
        }
    }

    pub fn get(&self, name: &str) -> Option<&SymbolEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SymbolEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
