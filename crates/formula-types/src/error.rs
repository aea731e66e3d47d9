use thiserror::Error;

/// Misuse of the type-construction API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("field '{0}' is declared twice")]
    DuplicateField(String),
    #[error("display name '{display}' is already used by field '{existing}'")]
    DisplayNameTaken { display: String, existing: String },
    #[error("field '{logical}' already has display name '{existing}'")]
    DisplayNameRedefined { logical: String, existing: String },
    #[error("unknown field '{0}'")]
    UnknownField(String),
}

/// Two types that cannot be merged into a common supertype.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("incompatible types {at}: {left} and {right}")]
pub struct UnionError {
    /// `for field 'a.b'`, or `at top level`.
    pub at: String,
    pub left: String,
    pub right: String,
}

impl UnionError {
    pub(crate) fn new(path: &[String], left: String, right: String) -> Self {
        let at = if path.is_empty() {
            "at top level".to_string()
        } else {
            format!("for field '{}'", path.join("."))
        };
        Self { at, left, right }
    }
}
