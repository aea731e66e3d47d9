//! The structural type representation.

use crate::record::RecordType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Type tag of a [`DType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    /// Not yet inferred; accepted everywhere so it never cascades errors.
    Unknown,
    /// Result of an ill-typed subexpression.
    Error,
    /// Type decided at runtime (host values whose schema is not known).
    Deferred,
    /// The type of the literal `Blank()`.
    Blank,
    /// Statement-position results (`Set`, mutation functions).
    Void,
    Boolean,
    Number,
    Decimal,
    String,
    Date,
    DateTime,
    Time,
    Guid,
    UntypedObject,
    Record,
    Table,
    Enum,
}

impl Kind {
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            Kind::Boolean
                | Kind::Number
                | Kind::Decimal
                | Kind::String
                | Kind::Date
                | Kind::DateTime
                | Kind::Time
                | Kind::Guid
        )
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Kind::Number | Kind::Decimal)
    }

    pub fn is_date_time(self) -> bool {
        matches!(self, Kind::Date | Kind::DateTime | Kind::Time)
    }

    /// The plain type for a primitive or marker kind. `None` for aggregates
    /// and enums, which need a payload.
    pub fn to_type(self) -> Option<DType> {
        Some(match self {
            Kind::Unknown => DType::Unknown,
            Kind::Error => DType::Error,
            Kind::Deferred => DType::Deferred,
            Kind::Blank => DType::Blank,
            Kind::Void => DType::Void,
            Kind::Boolean => DType::Boolean,
            Kind::Number => DType::Number,
            Kind::Decimal => DType::Decimal,
            Kind::String => DType::String,
            Kind::Date => DType::Date,
            Kind::DateTime => DType::DateTime,
            Kind::Time => DType::Time,
            Kind::Guid => DType::Guid,
            Kind::UntypedObject => DType::UntypedObject,
            Kind::Record | Kind::Table | Kind::Enum => return None,
        })
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A member value of an enum type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EnumLiteral {
    Boolean(bool),
    Number(f64),
    String(String),
}

/// Named option set, e.g. `Color.Red`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumType {
    pub name: String,
    /// Primitive kind of the member values.
    pub backing: Kind,
    pub members: Arc<IndexMap<String, EnumLiteral>>,
}

impl EnumType {
    pub fn new<I, S>(name: impl Into<String>, backing: Kind, members: I) -> Self
    where
        I: IntoIterator<Item = (S, EnumLiteral)>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            backing,
            members: Arc::new(members.into_iter().map(|(n, v)| (n.into(), v)).collect()),
        }
    }

    pub fn member(&self, name: &str) -> Option<&EnumLiteral> {
        self.members.get(name)
    }

    pub fn backing_type(&self) -> DType {
        self.backing.to_type().unwrap_or(DType::Unknown)
    }
}

/// Structural type.
///
/// Tables are records wrapped with a table marker; both carry the same
/// reference-counted [`RecordType`], so [`DType::to_table`] and
/// [`DType::to_record`] are cheap.
#[derive(Debug, Clone)]
pub enum DType {
    Unknown,
    Error,
    Deferred,
    Blank,
    Void,
    Boolean,
    Number,
    Decimal,
    String,
    Date,
    DateTime,
    Time,
    Guid,
    UntypedObject,
    Record(RecordType),
    Table(RecordType),
    Enum(EnumType),
}

impl DType {
    pub fn kind(&self) -> Kind {
        match self {
            DType::Unknown => Kind::Unknown,
            DType::Error => Kind::Error,
            DType::Deferred => Kind::Deferred,
            DType::Blank => Kind::Blank,
            DType::Void => Kind::Void,
            DType::Boolean => Kind::Boolean,
            DType::Number => Kind::Number,
            DType::Decimal => Kind::Decimal,
            DType::String => Kind::String,
            DType::Date => Kind::Date,
            DType::DateTime => Kind::DateTime,
            DType::Time => Kind::Time,
            DType::Guid => Kind::Guid,
            DType::UntypedObject => Kind::UntypedObject,
            DType::Record(_) => Kind::Record,
            DType::Table(_) => Kind::Table,
            DType::Enum(_) => Kind::Enum,
        }
    }

    /// Record type from `(name, type)` pairs; a repeated name keeps the last
    /// type ([`RecordType::from_fields`] reports duplicates instead).
    pub fn record<I, S>(fields: I) -> DType
    where
        I: IntoIterator<Item = (S, DType)>,
        S: Into<String>,
    {
        let record = fields
            .into_iter()
            .fold(RecordType::empty(), |acc, (name, ty)| acc.with_field(name, ty));
        DType::Record(record)
    }

    /// Table type whose rows have the given fields.
    pub fn table<I, S>(fields: I) -> DType
    where
        I: IntoIterator<Item = (S, DType)>,
        S: Into<String>,
    {
        DType::record(fields).to_table()
    }

    pub fn is_record(&self) -> bool {
        matches!(self, DType::Record(_))
    }

    pub fn is_table(&self) -> bool {
        matches!(self, DType::Table(_))
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, DType::Record(_) | DType::Table(_))
    }

    /// `Error`, `Unknown` and `Deferred` suppress further diagnostics.
    pub fn is_error_like(&self) -> bool {
        matches!(self, DType::Error | DType::Unknown | DType::Deferred)
    }

    pub fn record_type(&self) -> Option<&RecordType> {
        match self {
            DType::Record(r) | DType::Table(r) => Some(r),
            _ => None,
        }
    }

    /// Wrap a record as a table (tables stay tables).
    pub fn to_table(&self) -> DType {
        match self {
            DType::Record(r) | DType::Table(r) => DType::Table(r.clone()),
            other => other.clone(),
        }
    }

    /// Row type of a table (records stay records).
    pub fn to_record(&self) -> DType {
        match self {
            DType::Record(r) | DType::Table(r) => DType::Record(r.clone()),
            other => other.clone(),
        }
    }

    pub fn field_type(&self, name: &str) -> Option<DType> {
        self.record_type()?.field_type(name)
    }

    pub fn field_names(&self, expand: bool) -> Option<Vec<String>> {
        self.record_type()?.field_names(expand)
    }

    /// Structural equality: same kind, same field-name set with recursively
    /// equal field types. Field order and display names are ignored.
    pub fn equivalent(&self, other: &DType) -> bool {
        Equivalence::default().same(self, other)
    }
}

impl PartialEq for DType {
    fn eq(&self, other: &Self) -> bool {
        self.equivalent(other)
    }
}

/// Structural comparison that terminates on self-referential lazy types by
/// assuming pairs already under comparison are equal.
#[derive(Default)]
struct Equivalence {
    visited: HashSet<(String, String)>,
}

impl Equivalence {
    fn same(&mut self, a: &DType, b: &DType) -> bool {
        match (a, b) {
            (DType::Record(x), DType::Record(y)) | (DType::Table(x), DType::Table(y)) => {
                self.fields_eq(x, y)
            }
            (DType::Enum(x), DType::Enum(y)) => x.name == y.name && x.backing == y.backing,
            _ => a.kind() == b.kind(),
        }
    }

    fn fields_eq(&mut self, x: &RecordType, y: &RecordType) -> bool {
        if x.same_storage(y) {
            return true;
        }
        if let (Some(ix), Some(iy)) = (x.lazy_identity(), y.lazy_identity()) {
            if !self.visited.insert((ix.to_string(), iy.to_string())) {
                return true;
            }
        }
        let xs = x.expanded_fields();
        let ys = y.expanded_fields();
        if xs.len() != ys.len() {
            return false;
        }
        xs.iter().all(|(name, xt)| match y.field_type(name) {
            Some(yt) => self.same(xt, &yt),
            None => false,
        })
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::Record(r) => {
                f.write_str("{")?;
                write_fields(f, r)?;
                f.write_str("}")
            }
            DType::Table(r) => {
                f.write_str("*[")?;
                write_fields(f, r)?;
                f.write_str("]")
            }
            DType::Enum(e) => write!(f, "Enum({})", e.name),
            other => write!(f, "{}", other.kind()),
        }
    }
}

fn write_fields(f: &mut fmt::Formatter<'_>, record: &RecordType) -> fmt::Result {
    if let Some(identity) = record.lazy_identity() {
        return write!(f, "<{identity}>");
    }
    if let Some(fields) = record.known_fields() {
        for (i, (name, ty)) in fields.enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}:{ty}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let ty = DType::table([("a", DType::Number), ("b", DType::record([("c", DType::String)]))]);
        assert_eq!(ty.to_string(), "*[a:Number, b:{c:String}]");
    }

    #[test]
    fn test_table_record_wrap_shares_storage() {
        let record = DType::record([("a", DType::Number)]);
        let table = record.to_table();
        let (Some(r), Some(t)) = (record.record_type(), table.record_type()) else {
            panic!("expected aggregates");
        };
        assert!(r.same_storage(t));
        assert_eq!(table.to_record(), record);
    }

    #[test]
    fn test_equality_ignores_field_order() {
        let a = DType::record([("x", DType::Number), ("y", DType::String)]);
        let b = DType::record([("y", DType::String), ("x", DType::Number)]);
        assert_eq!(a, b);
        assert_ne!(a, b.to_table());
        assert_ne!(a, DType::record([("x", DType::Number)]));
    }

    #[test]
    fn test_enum_backing_type() {
        let color = EnumType::new(
            "Color",
            Kind::String,
            [("Red", EnumLiteral::String("red".into()))],
        );
        assert_eq!(color.backing_type(), DType::String);
        assert_eq!(color.member("Red"), Some(&EnumLiteral::String("red".into())));
    }
}
