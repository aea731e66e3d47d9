//! Runtime side of binder-recorded coercions.
//!
//! Blank and error values pass through every conversion unchanged. Empty
//! text converts to Blank for every non-text target.

use crate::value::{ErrorCode, FormulaValue, RecordValue};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use formula_types::DType;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::str::FromStr;
use uuid::Uuid;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Day zero of serial date numbers.
pub(crate) fn serial_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or(NaiveDate::MIN)
}

/// Convert `value` to `target`.
pub(crate) fn coerce(value: FormulaValue, target: &DType) -> FormulaValue {
    if matches!(value, FormulaValue::Blank | FormulaValue::Error(_)) {
        return value;
    }
    match target {
        DType::Number => to_number(value),
        DType::Decimal => to_decimal(value),
        DType::String => to_text(value),
        DType::Boolean => to_boolean(value),
        DType::Date => to_date(value),
        DType::DateTime => to_datetime(value),
        DType::Time => to_time(value),
        DType::Guid => to_guid(value),
        DType::Record(ty) => match value {
            FormulaValue::Record(record) => FormulaValue::Record(coerce_fields(record, ty)),
            other => other,
        },
        _ => value,
    }
}

fn coerce_fields(record: RecordValue, target: &formula_types::RecordType) -> RecordValue {
    let mut out = record.clone();
    for (name, value) in record.fields() {
        if let Some(ty) = target.field_type(name)
            && !value.dtype().equivalent(&ty)
        {
            out.set(name, coerce(value.clone(), &ty));
        }
    }
    out
}

fn mismatch(value: &FormulaValue, target: &str) -> FormulaValue {
    FormulaValue::error(
        ErrorCode::TypeMismatch,
        format!("cannot convert {value} to {target}"),
    )
}

/// Text view of an untyped host value, if it has a scalar one.
fn untyped_scalar(value: &serde_json::Value) -> FormulaValue {
    match value {
        serde_json::Value::Null => FormulaValue::Blank,
        serde_json::Value::Bool(b) => FormulaValue::Boolean(*b),
        serde_json::Value::Number(n) => n.as_f64().map_or(FormulaValue::Blank, FormulaValue::Number),
        serde_json::Value::String(s) => FormulaValue::String(s.clone()),
        other => FormulaValue::UntypedObject(std::sync::Arc::new(other.clone())),
    }
}

pub(crate) fn to_number(value: FormulaValue) -> FormulaValue {
    match value {
        FormulaValue::Number(_) | FormulaValue::Blank | FormulaValue::Error(_) => value,
        FormulaValue::Decimal(d) => d
            .to_f64()
            .map_or_else(|| mismatch(&value, "Number"), FormulaValue::Number),
        FormulaValue::Boolean(b) => FormulaValue::Number(if b { 1.0 } else { 0.0 }),
        FormulaValue::String(ref s) => match s.trim() {
            "" => FormulaValue::Blank,
            text => text
                .parse::<f64>()
                .map_or_else(|_| mismatch(&value, "Number"), FormulaValue::Number),
        },
        FormulaValue::Date(d) => FormulaValue::Number((d - serial_epoch()).num_days() as f64),
        FormulaValue::DateTime(dt) => FormulaValue::Number(datetime_serial(dt)),
        FormulaValue::Time(t) => FormulaValue::Number(time_fraction(t)),
        FormulaValue::UntypedObject(ref v) => match untyped_scalar(v) {
            FormulaValue::UntypedObject(_) => mismatch(&value, "Number"),
            scalar => to_number(scalar),
        },
        _ => mismatch(&value, "Number"),
    }
}

pub(crate) fn to_decimal(value: FormulaValue) -> FormulaValue {
    match value {
        FormulaValue::Decimal(_) | FormulaValue::Blank | FormulaValue::Error(_) => value,
        FormulaValue::Number(n) => Decimal::try_from(n).map_or_else(
            |_| FormulaValue::error(ErrorCode::Numeric, format!("{n} is out of the decimal range")),
            FormulaValue::Decimal,
        ),
        FormulaValue::Boolean(b) => FormulaValue::Decimal(if b { Decimal::ONE } else { Decimal::ZERO }),
        FormulaValue::String(ref s) => match s.trim() {
            "" => FormulaValue::Blank,
            text => Decimal::from_str(text)
                .or_else(|_| Decimal::from_scientific(&text.to_lowercase()))
                .map_or_else(|_| mismatch(&value, "Decimal"), FormulaValue::Decimal),
        },
        FormulaValue::UntypedObject(ref v) => match untyped_scalar(v) {
            FormulaValue::UntypedObject(_) => mismatch(&value, "Decimal"),
            scalar => to_decimal(scalar),
        },
        other => match to_number(other) {
            FormulaValue::Number(n) => to_decimal(FormulaValue::Number(n)),
            failed => failed,
        },
    }
}

pub(crate) fn to_text(value: FormulaValue) -> FormulaValue {
    match value.to_text() {
        Some(text) => FormulaValue::String(text),
        None if value.is_error() => value,
        None => mismatch(&value, "Text"),
    }
}

pub(crate) fn to_boolean(value: FormulaValue) -> FormulaValue {
    match value {
        FormulaValue::Boolean(_) | FormulaValue::Blank | FormulaValue::Error(_) => value,
        FormulaValue::Number(n) => FormulaValue::Boolean(n != 0.0),
        FormulaValue::Decimal(d) => FormulaValue::Boolean(!d.is_zero()),
        FormulaValue::String(ref s) => match s.trim().to_ascii_lowercase().as_str() {
            "" => FormulaValue::Blank,
            "true" => FormulaValue::Boolean(true),
            "false" => FormulaValue::Boolean(false),
            _ => mismatch(&value, "Boolean"),
        },
        FormulaValue::UntypedObject(ref v) => match untyped_scalar(v) {
            FormulaValue::UntypedObject(_) => mismatch(&value, "Boolean"),
            scalar => to_boolean(scalar),
        },
        _ => mismatch(&value, "Boolean"),
    }
}

pub(crate) fn to_date(value: FormulaValue) -> FormulaValue {
    match value {
        FormulaValue::Date(_) | FormulaValue::Blank | FormulaValue::Error(_) => value,
        FormulaValue::DateTime(dt) => FormulaValue::Date(dt.date()),
        FormulaValue::String(ref s) if s.trim().is_empty() => FormulaValue::Blank,
        FormulaValue::String(ref s) => parse_date(s.trim())
            .or_else(|| parse_datetime(s.trim()).map(|dt| dt.date()))
            .map_or_else(|| mismatch(&value, "Date"), FormulaValue::Date),
        other => match to_number(other) {
            FormulaValue::Number(n) => Duration::try_days(n.floor() as i64)
                .and_then(|days| serial_epoch().checked_add_signed(days))
                .map_or_else(|| out_of_range(n), FormulaValue::Date),
            failed => failed,
        },
    }
}

pub(crate) fn to_datetime(value: FormulaValue) -> FormulaValue {
    match value {
        FormulaValue::DateTime(_) | FormulaValue::Blank | FormulaValue::Error(_) => value,
        FormulaValue::Date(d) => FormulaValue::DateTime(d.and_time(NaiveTime::MIN)),
        FormulaValue::Time(t) => FormulaValue::DateTime(serial_epoch().and_time(t)),
        FormulaValue::String(ref s) if s.trim().is_empty() => FormulaValue::Blank,
        FormulaValue::String(ref s) => parse_datetime(s.trim())
            .or_else(|| parse_date(s.trim()).map(|d| d.and_time(NaiveTime::MIN)))
            .map_or_else(|| mismatch(&value, "DateTime"), FormulaValue::DateTime),
        other => match to_number(other) {
            FormulaValue::Number(n) => serial_datetime(n),
            failed => failed,
        },
    }
}

pub(crate) fn to_time(value: FormulaValue) -> FormulaValue {
    match value {
        FormulaValue::Time(_) | FormulaValue::Blank | FormulaValue::Error(_) => value,
        FormulaValue::DateTime(dt) => FormulaValue::Time(dt.time()),
        FormulaValue::String(ref s) if s.trim().is_empty() => FormulaValue::Blank,
        FormulaValue::String(ref s) => ["%H:%M:%S", "%H:%M"]
            .iter()
            .find_map(|f| NaiveTime::parse_from_str(s.trim(), f).ok())
            .map_or_else(|| mismatch(&value, "Time"), FormulaValue::Time),
        other => match to_number(other) {
            FormulaValue::Number(n) => match serial_datetime(n.fract().abs()) {
                FormulaValue::DateTime(dt) => FormulaValue::Time(dt.time()),
                failed => failed,
            },
            failed => failed,
        },
    }
}

pub(crate) fn to_guid(value: FormulaValue) -> FormulaValue {
    match value {
        FormulaValue::Guid(_) | FormulaValue::Blank | FormulaValue::Error(_) => value,
        FormulaValue::String(ref s) if s.trim().is_empty() => FormulaValue::Blank,
        FormulaValue::String(ref s) => Uuid::parse_str(s.trim())
            .map_or_else(|_| mismatch(&value, "GUID"), FormulaValue::Guid),
        _ => mismatch(&value, "GUID"),
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
}

fn out_of_range(n: f64) -> FormulaValue {
    FormulaValue::error(ErrorCode::Numeric, format!("{n} is out of the date range"))
}

pub(crate) fn datetime_serial(dt: NaiveDateTime) -> f64 {
    (dt - serial_epoch().and_time(NaiveTime::MIN)).num_milliseconds() as f64 / MILLIS_PER_DAY
}

fn time_fraction(t: NaiveTime) -> f64 {
    (t.num_seconds_from_midnight() as f64 * 1000.0 + (t.nanosecond() / 1_000_000) as f64)
        / MILLIS_PER_DAY
}

/// Date-time `days` after the serial epoch, fractional days included.
pub(crate) fn serial_datetime(days: f64) -> FormulaValue {
    if !days.is_finite() {
        return out_of_range(days);
    }
    let millis = (days * MILLIS_PER_DAY).round() as i64;
    Duration::try_milliseconds(millis)
        .and_then(|offset| serial_epoch().and_time(NaiveTime::MIN).checked_add_signed(offset))
        .map_or_else(|| out_of_range(days), FormulaValue::DateTime)
}
