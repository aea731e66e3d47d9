// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Structural type system for the formula language.
//!
//! - [`DType`]: primitive kinds, records, tables, enums and the marker
//!   types (`Unknown`, `Error`, `Deferred`, `Blank`, `Void`)
//! - [`RecordType`]: field maps, either known up front or looked up
//!   through a [`RecordTypeSource`] so self-referential schemas are never
//!   materialized
//! - [`DType::accepts`], [`DType::coercion_sub_type`] and [`DType::union`],
//!   all parameterized by [`Features`]
//!
//! # Examples
//!
//! ```
//! # use formula_types::*;
//! let people = DType::table([("Name", DType::String), ("Age", DType::Number)]);
//! let insert = DType::record([("Name", DType::String)]);
//! assert!(people.to_record().accepts(&insert, false, false, &Features::default()));
//! ```

mod dtype;
mod error;
mod features;
mod record;
mod relations;

pub use dtype::{DType, EnumLiteral, EnumType, Kind};
pub use error::{TypeError, UnionError};
pub use features::Features;
pub use record::{DisplayNames, RecordType, RecordTypeSource};
