//! Acceptance, coercion and union over [`DType`].
//!
//! All three walk records structurally and never rely on reference identity,
//! except that lazy sources with the same identity are the same type. Pairs
//! of lazy types already under comparison are assumed to hold, which makes
//! the walks terminate on self-referential types.

use crate::dtype::{DType, Kind};
use crate::error::UnionError;
use crate::features::Features;
use crate::record::RecordType;
use std::collections::HashSet;

impl DType {
    /// Can a value of type `other` be used where `self` is expected?
    ///
    /// Not symmetric: a record or table type accepts any record whose fields
    /// are a subset of its own with accepted field types. With `exact` the
    /// field sets must match and no widening (`Date` into `DateTime`) is
    /// allowed. With `allow_coercion`, primitives that have an engine
    /// coercion into the expected kind are accepted too.
    pub fn accepts(
        &self,
        other: &DType,
        exact: bool,
        allow_coercion: bool,
        features: &Features,
    ) -> bool {
        Acceptor {
            exact,
            allow_coercion,
            features,
            visited: HashSet::new(),
        }
        .accepts(self, other)
    }

    /// Is there an engine coercion from `self` into `target`?
    pub fn can_coerce_to(&self, target: &DType, features: &Features) -> bool {
        self.coercion_sub_type(target, features).is_some()
    }

    /// The type `self` takes on when used where `target` is expected, and
    /// whether a runtime coercion is needed to get there.
    ///
    /// Records coerce field by field: the result keeps the source's field
    /// set with each field's coerced type. `None` when no coercion exists.
    pub fn coercion_sub_type(&self, target: &DType, features: &Features) -> Option<(DType, bool)> {
        if target.accepts(self, false, false, features) {
            return Some((self.clone(), false));
        }
        match (self, target) {
            (DType::Record(source), DType::Record(expected)) => {
                coerce_fields(source, expected, features).map(|(r, n)| (DType::Record(r), n))
            }
            (DType::Table(source), DType::Table(expected)) => {
                coerce_fields(source, expected, features).map(|(r, n)| (DType::Table(r), n))
            }
            (DType::Enum(e), _) => {
                let (_, needed) = e.backing_type().coercion_sub_type(target, features)?;
                Some((target.clone(), needed))
            }
            _ if primitive_coercion(self.kind(), target.kind(), features) => {
                Some((target.clone(), true))
            }
            _ => None,
        }
    }

    /// Least specific common type of `a` and `b`.
    ///
    /// Records and tables merge their field sets; shared fields are unioned
    /// recursively. Incompatible types (e.g. `String` and a table) yield
    /// `DType::Error` at that position and the first such conflict is
    /// returned alongside; the rest of the union is still computed.
    pub fn union(a: &DType, b: &DType, features: &Features) -> (DType, Option<UnionError>) {
        let mut unioner = Unioner {
            features,
            path: Vec::new(),
            error: None,
            visited: HashSet::new(),
        };
        let ty = unioner.union(a, b);
        (ty, unioner.error)
    }
}

struct Acceptor<'f> {
    exact: bool,
    allow_coercion: bool,
    features: &'f Features,
    visited: HashSet<(String, String)>,
}

impl Acceptor<'_> {
    fn accepts(&mut self, expected: &DType, actual: &DType) -> bool {
        match (expected, actual) {
            (DType::Unknown | DType::Error | DType::Deferred | DType::Void, _) => true,
            (_, DType::Unknown | DType::Error | DType::Deferred | DType::Blank) => true,
            (DType::Record(e), DType::Record(a)) | (DType::Table(e), DType::Table(a)) => {
                self.fields_accept(e, a)
            }
            (DType::Enum(e), DType::Enum(a)) => e.name == a.name,
            (_, DType::Enum(a)) if !self.exact => self.accepts(expected, &a.backing_type()),
            _ if expected.kind() == actual.kind() => true,
            _ => {
                (!self.exact && widens(expected.kind(), actual.kind(), self.features))
                    || (self.allow_coercion
                        && primitive_coercion(actual.kind(), expected.kind(), self.features))
            }
        }
    }

    fn fields_accept(&mut self, expected: &RecordType, actual: &RecordType) -> bool {
        if expected.same_storage(actual) {
            return true;
        }
        if let (Some(ie), Some(ia)) = (expected.lazy_identity(), actual.lazy_identity()) {
            if !self.visited.insert((ie.to_string(), ia.to_string())) {
                return true;
            }
        }

        // Every actual field must exist in the expected type. Lookups go
        // through the expected side so lazy expected types are not expanded.
        let actual_fields = actual.expanded_fields();
        for (name, actual_ty) in &actual_fields {
            let Some(expected_ty) = expected.field_type(name) else {
                return false;
            };
            if !self.accepts(&expected_ty, actual_ty) {
                return false;
            }
        }

        if self.exact {
            let expected_len = match expected.len() {
                Some(len) => len,
                None => expected.expanded_fields().len(),
            };
            return expected_len == actual_fields.len();
        }
        true
    }
}

/// Widening without a runtime conversion.
fn widens(expected: Kind, actual: Kind, features: &Features) -> bool {
    match (expected, actual) {
        (Kind::DateTime, Kind::Date) => true,
        (Kind::DateTime, Kind::Time) | (Kind::Date, Kind::DateTime) => {
            features.legacy_date_time_accepts
        }
        (Kind::Number, k) if k.is_date_time() => features.legacy_date_time_accepts,
        _ => false,
    }
}

/// Engine-sanctioned primitive conversions.
fn primitive_coercion(from: Kind, to: Kind, features: &Features) -> bool {
    if from == to {
        return true;
    }
    match (from, to) {
        (Kind::UntypedObject, to) => to.is_primitive(),
        (from, Kind::String) => from.is_primitive(),
        (Kind::String, to) => to.is_primitive(),
        (Kind::Number, Kind::Decimal) | (Kind::Decimal, Kind::Number) => true,
        (Kind::Boolean, to) | (to, Kind::Boolean) if to.is_numeric() => true,
        (Kind::Date, Kind::DateTime) | (Kind::DateTime, Kind::Date) => true,
        (Kind::Time, Kind::DateTime) | (Kind::DateTime, Kind::Time) => {
            features.legacy_date_time_accepts
        }
        (from, to) if from.is_date_time() && to.is_numeric() => true,
        (from, to) if from.is_numeric() && to.is_date_time() => true,
        _ => false,
    }
}

fn coerce_fields(
    source: &RecordType,
    expected: &RecordType,
    features: &Features,
) -> Option<(RecordType, bool)> {
    let mut needed = false;
    let mut result = RecordType::empty();
    for (name, source_ty) in source.expanded_fields() {
        let expected_ty = expected.field_type(&name)?;
        let (ty, field_needed) = source_ty.coercion_sub_type(&expected_ty, features)?;
        needed |= field_needed;
        result = result.with_field(name, ty);
    }
    Some((result, needed))
}

struct Unioner<'f> {
    features: &'f Features,
    path: Vec<String>,
    error: Option<UnionError>,
    visited: HashSet<(String, String)>,
}

impl Unioner<'_> {
    fn union(&mut self, a: &DType, b: &DType) -> DType {
        match (a, b) {
            (DType::Unknown | DType::Blank | DType::Deferred, other) => other.clone(),
            (other, DType::Unknown | DType::Blank | DType::Deferred) => other.clone(),
            (DType::Error, _) | (_, DType::Error) => DType::Error,
            (DType::Record(x), DType::Record(y)) => DType::Record(self.union_fields(x, y)),
            (DType::Table(x), DType::Table(y)) => DType::Table(self.union_fields(x, y)),
            _ if a == b => a.clone(),
            (DType::Enum(e), other) | (other, DType::Enum(e))
                if e.backing == other.kind() =>
            {
                other.clone()
            }
            _ => match common_primitive(a.kind(), b.kind(), self.features) {
                Some(kind) => kind.to_type().unwrap_or(DType::Error),
                None => {
                    if self.error.is_none() {
                        self.error = Some(UnionError::new(&self.path, a.to_string(), b.to_string()));
                    }
                    DType::Error
                }
            },
        }
    }

    fn union_fields(&mut self, x: &RecordType, y: &RecordType) -> RecordType {
        if x.same_storage(y) {
            return x.clone();
        }
        if let (Some(ix), Some(iy)) = (x.lazy_identity(), y.lazy_identity()) {
            if !self.visited.insert((ix.to_string(), iy.to_string())) {
                return x.clone();
            }
        }

        let mut merged: Vec<(String, DType)> = x.expanded_fields();
        for (name, y_ty) in y.expanded_fields() {
            match merged.iter().position(|(n, _)| *n == name) {
                Some(i) => {
                    self.path.push(name);
                    let ty = self.union(&merged[i].1, &y_ty);
                    self.path.pop();
                    merged[i].1 = ty;
                }
                None => merged.push((name, y_ty)),
            }
        }

        merged
            .into_iter()
            .fold(RecordType::empty(), |acc, (name, ty)| acc.with_field(name, ty))
            .absorb_display_names(x)
            .absorb_display_names(y)
    }
}

fn common_primitive(a: Kind, b: Kind, features: &Features) -> Option<Kind> {
    match (a, b) {
        (Kind::Number, Kind::Decimal) | (Kind::Decimal, Kind::Number) => Some(Kind::Number),
        (Kind::Date, Kind::DateTime) | (Kind::DateTime, Kind::Date) => Some(Kind::DateTime),
        (Kind::Time, k) | (k, Kind::Time)
            if features.legacy_date_time_accepts && k.is_date_time() =>
        {
            Some(Kind::DateTime)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const F: Features = Features {
        legacy_date_time_accepts: false,
        table_syntax_allows_records_only: false,
    };

    #[test]
    fn test_table_accepts_subset_record() {
        let table = DType::table([("a", DType::Number), ("b", DType::String)]);
        let row = DType::table([("a", DType::Number)]);
        assert!(table.accepts(&row, false, false, &F));
        assert!(!row.accepts(&table, false, false, &F));
        assert!(!table.accepts(&row, true, false, &F));
    }

    #[test]
    fn test_coercion_mode() {
        let table = DType::table([("a", DType::Number)]);
        let text_row = DType::table([("a", DType::String)]);
        assert!(!table.accepts(&text_row, false, false, &F));
        assert!(table.accepts(&text_row, false, true, &F));
    }

    #[test]
    fn test_blank_and_error_are_accepted() {
        assert!(DType::Number.accepts(&DType::Blank, true, false, &F));
        assert!(DType::table([("a", DType::Number)]).accepts(&DType::Error, true, false, &F));
        assert!(DType::Error.accepts(&DType::String, true, false, &F));
    }

    #[test]
    fn test_legacy_date_time_flag() {
        assert!(DType::DateTime.accepts(&DType::Date, false, false, &F));
        assert!(!DType::DateTime.accepts(&DType::Date, true, false, &F));
        assert!(!DType::Date.accepts(&DType::DateTime, false, false, &F));
        assert!(DType::Date.accepts(&DType::DateTime, false, false, &Features::legacy()));
        assert!(!DType::Number.accepts(&DType::Date, false, false, &F));
        assert!(DType::Number.accepts(&DType::Date, false, false, &Features::legacy()));
    }

    #[test]
    fn test_coercion_sub_type_records() {
        let source = DType::record([("a", DType::String), ("b", DType::Number)]);
        let target = DType::record([("a", DType::Number), ("b", DType::Number), ("c", DType::Boolean)]);
        let (ty, needed) = source.coercion_sub_type(&target, &F).unwrap();
        assert!(needed);
        assert_eq!(ty, DType::record([("a", DType::Number), ("b", DType::Number)]));

        let (same, needed) = DType::record([("b", DType::Number)])
            .coercion_sub_type(&target, &F)
            .unwrap();
        assert!(!needed);
        assert_eq!(same, DType::record([("b", DType::Number)]));

        let extra = DType::record([("z", DType::Number)]);
        assert!(extra.coercion_sub_type(&target, &F).is_none());
    }

    #[test]
    fn test_no_coercion_between_text_and_table() {
        let table = DType::table([("a", DType::Number)]);
        assert!(!DType::String.can_coerce_to(&table, &F));
        assert!(!table.can_coerce_to(&DType::String, &F));
    }

    #[test]
    fn test_union_merges_fields() {
        let a = DType::table([("a", DType::Number), ("b", DType::Date)]);
        let b = DType::table([("b", DType::DateTime), ("c", DType::String)]);
        let (ty, error) = DType::union(&a, &b, &F);
        assert!(error.is_none());
        assert_eq!(
            ty,
            DType::table([("a", DType::Number), ("b", DType::DateTime), ("c", DType::String)])
        );
    }

    #[test]
    fn test_union_numeric_escalates_to_number() {
        let (ty, error) = DType::union(&DType::Decimal, &DType::Number, &F);
        assert!(error.is_none());
        assert_eq!(ty, DType::Number);
    }

    #[test]
    fn test_union_reports_incompatible_field() {
        let a = DType::record([("x", DType::String)]);
        let b = DType::record([("x", DType::table([("y", DType::Number)]))]);
        let (ty, error) = DType::union(&a, &b, &F);
        let error = error.unwrap();
        assert_eq!(error.at, "for field 'x'");
        assert_eq!(ty.field_type("x"), Some(DType::Error));
    }

    #[test]
    fn test_union_time_needs_legacy_flag() {
        assert!(DType::union(&DType::Time, &DType::Date, &F).1.is_some());
        let (ty, error) = DType::union(&DType::Time, &DType::Date, &Features::legacy());
        assert!(error.is_none());
        assert_eq!(ty, DType::DateTime);
    }
}
