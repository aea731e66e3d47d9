//! Record field maps: eagerly known or driven through a lazy source.
//!
//! A [`RecordType`] is the payload of both `DType::Record` and
//! `DType::Table`; it is reference counted, so wrapping a record as a table
//! (or unwrapping a table's row type) never copies the field map.

use crate::dtype::DType;
use crate::error::TypeError;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Field lookup for record types that cannot (or should not) be enumerated
/// eagerly, e.g. self-referential host schemas.
///
/// Lookups are by logical name. [`field_names`](Self::field_names) is only
/// called when enumeration is explicitly requested (completion lists, exact
/// comparisons against a differently-sourced type).
pub trait RecordTypeSource: Send + Sync + fmt::Debug {
    /// Two sources with the same identity describe the same type.
    fn identity(&self) -> &str;

    fn try_get_field_type(&self, name: &str) -> Option<DType>;

    fn field_names(&self) -> Vec<String>;

    fn display_name_for(&self, _logical: &str) -> Option<String> {
        None
    }

    fn logical_name_for(&self, _display: &str) -> Option<String> {
        None
    }
}

/// Bijective logical ↔ display name mapping within one record type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayNames {
    to_display: HashMap<String, String>,
    to_logical: HashMap<String, String>,
}

impl DisplayNames {
    pub fn is_empty(&self) -> bool {
        self.to_display.is_empty()
    }

    pub fn display_for(&self, logical: &str) -> Option<&str> {
        self.to_display.get(logical).map(String::as_str)
    }

    pub fn logical_for(&self, display: &str) -> Option<&str> {
        self.to_logical.get(display).map(String::as_str)
    }

    /// Add a pair; fails if either side is already mapped differently.
    pub fn insert(&mut self, logical: &str, display: &str) -> Result<(), TypeError> {
        if let Some(existing) = self.to_display.get(logical) {
            if existing == display {
                return Ok(());
            }
            return Err(TypeError::DisplayNameRedefined {
                logical: logical.to_string(),
                existing: existing.clone(),
            });
        }
        if let Some(existing) = self.to_logical.get(display) {
            return Err(TypeError::DisplayNameTaken {
                display: display.to_string(),
                existing: existing.clone(),
            });
        }
        self.to_display.insert(logical.to_string(), display.to_string());
        self.to_logical.insert(display.to_string(), logical.to_string());
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.to_display
            .iter()
            .map(|(l, d)| (l.as_str(), d.as_str()))
    }
}

#[derive(Debug, Clone, Default)]
struct KnownFields {
    fields: IndexMap<String, DType>,
    display: DisplayNames,
}

#[derive(Debug, Clone)]
enum Repr {
    Known(Arc<KnownFields>),
    Lazy(Arc<dyn RecordTypeSource>),
}

/// Ordered field map of a record or table type.
///
/// Insertion order is kept for display but is irrelevant to equality.
#[derive(Debug, Clone)]
pub struct RecordType {
    repr: Repr,
}

impl Default for RecordType {
    fn default() -> Self {
        Self::empty()
    }
}

impl RecordType {
    pub fn empty() -> Self {
        Self {
            repr: Repr::Known(Arc::default()),
        }
    }

    /// Build from `(name, type)` pairs. Later duplicates are an error.
    pub fn from_fields<I, S>(fields: I) -> Result<Self, TypeError>
    where
        I: IntoIterator<Item = (S, DType)>,
        S: Into<String>,
    {
        let mut known = KnownFields::default();
        for (name, ty) in fields {
            let name = name.into();
            if known.fields.contains_key(&name) {
                return Err(TypeError::DuplicateField(name));
            }
            known.fields.insert(name, ty);
        }
        Ok(Self {
            repr: Repr::Known(Arc::new(known)),
        })
    }

    pub fn lazy(source: Arc<dyn RecordTypeSource>) -> Self {
        Self {
            repr: Repr::Lazy(source),
        }
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self.repr, Repr::Lazy(_))
    }

    /// Identity of a lazy source, `None` for known field maps.
    pub fn lazy_identity(&self) -> Option<&str> {
        match &self.repr {
            Repr::Lazy(source) => Some(source.identity()),
            Repr::Known(_) => None,
        }
    }

    /// Add or replace a field. Lazy types are left unchanged.
    pub fn with_field(mut self, name: impl Into<String>, ty: DType) -> Self {
        if let Repr::Known(known) = &mut self.repr {
            Arc::make_mut(known).fields.insert(name.into(), ty);
        }
        self
    }

    /// Attach a display name to an existing field.
    pub fn with_display_name(mut self, logical: &str, display: &str) -> Result<Self, TypeError> {
        let Repr::Known(known) = &mut self.repr else {
            return Ok(self);
        };
        if !known.fields.contains_key(logical) {
            return Err(TypeError::UnknownField(logical.to_string()));
        }
        if display != logical && known.fields.contains_key(display) {
            return Err(TypeError::DisplayNameTaken {
                display: display.to_string(),
                existing: display.to_string(),
            });
        }
        Arc::make_mut(known).display.insert(logical, display)?;
        Ok(self)
    }

    /// Type of field `name` (logical name).
    pub fn field_type(&self, name: &str) -> Option<DType> {
        match &self.repr {
            Repr::Known(known) => known.fields.get(name).cloned(),
            Repr::Lazy(source) => source.try_get_field_type(name),
        }
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_type(name).is_some()
    }

    /// Field names in declaration order.
    ///
    /// Lazy types are only enumerated when `expand` is set; otherwise `None`.
    pub fn field_names(&self, expand: bool) -> Option<Vec<String>> {
        match &self.repr {
            Repr::Known(known) => Some(known.fields.keys().cloned().collect()),
            Repr::Lazy(source) if expand => Some(source.field_names()),
            Repr::Lazy(_) => None,
        }
    }

    /// `(name, type)` pairs of a known field map; `None` for lazy types.
    pub fn known_fields(&self) -> Option<impl Iterator<Item = (&str, &DType)>> {
        match &self.repr {
            Repr::Known(known) => Some(known.fields.iter().map(|(n, t)| (n.as_str(), t))),
            Repr::Lazy(_) => None,
        }
    }

    /// `(name, type)` pairs, enumerating lazy sources.
    pub fn expanded_fields(&self) -> Vec<(String, DType)> {
        match &self.repr {
            Repr::Known(known) => known
                .fields
                .iter()
                .map(|(n, t)| (n.clone(), t.clone()))
                .collect(),
            Repr::Lazy(source) => source
                .field_names()
                .into_iter()
                .filter_map(|name| source.try_get_field_type(&name).map(|ty| (name, ty)))
                .collect(),
        }
    }

    pub fn len(&self) -> Option<usize> {
        match &self.repr {
            Repr::Known(known) => Some(known.fields.len()),
            Repr::Lazy(_) => None,
        }
    }

    pub fn display_names(&self) -> Option<&DisplayNames> {
        match &self.repr {
            Repr::Known(known) => Some(&known.display),
            Repr::Lazy(_) => None,
        }
    }

    pub fn display_name_for(&self, logical: &str) -> Option<String> {
        match &self.repr {
            Repr::Known(known) => known.display.display_for(logical).map(str::to_string),
            Repr::Lazy(source) => source.display_name_for(logical),
        }
    }

    /// Resolve a name as written (logical or display) to the logical name.
    pub fn resolve_name(&self, written: &str) -> Option<String> {
        if self.has_field(written) {
            return Some(written.to_string());
        }
        match &self.repr {
            Repr::Known(known) => known.display.logical_for(written).map(str::to_string),
            Repr::Lazy(source) => source.logical_name_for(written),
        }
    }

    /// Merge display names of `other` into `self` where they do not clash.
    pub(crate) fn absorb_display_names(mut self, other: &RecordType) -> Self {
        let (Repr::Known(known), Some(names)) = (&mut self.repr, other.display_names()) else {
            return self;
        };
        if names.is_empty() {
            return self;
        }
        let known = Arc::make_mut(known);
        for (logical, display) in names.iter() {
            if known.fields.contains_key(logical) && !known.fields.contains_key(display) {
                // Clashes keep the first mapping.
                let _ = known.display.insert(logical, display);
            }
        }
        self
    }

    /// Pointer identity of the underlying storage.
    pub(crate) fn same_storage(&self, other: &RecordType) -> bool {
        match (&self.repr, &other.repr) {
            (Repr::Known(a), Repr::Known(b)) => Arc::ptr_eq(a, b),
            (Repr::Lazy(a), Repr::Lazy(b)) => a.identity() == b.identity(),
            _ => false,
        }
    }
}
