use serde::{Deserialize, Serialize};

/// Compatibility switches threaded through every acceptance, coercion and
/// union computation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    /// Pre-V1 date/time rules: `DateTime` also accepts `Time`, `Date`
    /// accepts `DateTime`, `Number` accepts every date/time kind, and
    /// `Time` unions with the other date/time kinds.
    pub legacy_date_time_accepts: bool,
    /// `[...]` literals must contain records; without this flag scalar
    /// rows are wrapped into a single `Value` column.
    pub table_syntax_allows_records_only: bool,
}

impl Features {
    pub fn legacy() -> Self {
        Self {
            legacy_date_time_accepts: true,
            ..Self::default()
        }
    }
}
