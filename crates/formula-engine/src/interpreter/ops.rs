//! Operator semantics over evaluated operands.
//!
//! Operands arrive already coerced to the types the binder chose. Blank
//! reads as zero in arithmetic and as empty text in `&`.

use super::coerce::{datetime_serial, serial_datetime};
use crate::value::{ErrorCode, ErrorValue, FormulaValue};
use chrono::{Duration, NaiveTime};
use formula_ast::{BinaryOp, UnaryOp};
use rust_decimal::Decimal;
use std::cmp::Ordering;

pub(crate) fn unary(op: UnaryOp, value: FormulaValue) -> FormulaValue {
    match (op, value) {
        (_, FormulaValue::Error(e)) => FormulaValue::Error(e),
        (UnaryOp::Not, FormulaValue::Boolean(b)) => FormulaValue::Boolean(!b),
        (UnaryOp::Not, FormulaValue::Blank) => FormulaValue::Boolean(true),
        (UnaryOp::Neg, FormulaValue::Number(n)) => FormulaValue::Number(-n),
        (UnaryOp::Neg, FormulaValue::Decimal(d)) => FormulaValue::Decimal(-d),
        (UnaryOp::Neg | UnaryOp::Percent, FormulaValue::Blank) => FormulaValue::Number(0.0),
        (UnaryOp::Percent, FormulaValue::Number(n)) => FormulaValue::Number(n / 100.0),
        (UnaryOp::Percent, FormulaValue::Decimal(d)) => FormulaValue::Decimal(d / Decimal::ONE_HUNDRED),
        (op, other) => type_error(&format!("'{op}'"), &other),
    }
}

/// Every binary operator except the short-circuiting and table-membership
/// ones, which need the interpreter.
pub(crate) fn binary(op: BinaryOp, left: FormulaValue, right: FormulaValue) -> FormulaValue {
    if let FormulaValue::Error(e) = left {
        return FormulaValue::Error(e);
    }
    if let FormulaValue::Error(e) = right {
        return FormulaValue::Error(e);
    }
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Pow => {
            arithmetic(op, left, right)
        }
        BinaryOp::Eq => FormulaValue::Boolean(equals(&left, &right)),
        BinaryOp::NotEq => FormulaValue::Boolean(!equals(&left, &right)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, &left, &right),
        BinaryOp::Concat => concat(&left, &right),
        BinaryOp::In | BinaryOp::ExactIn => contains_text(op, &left, &right),
        BinaryOp::And | BinaryOp::Or => {
            let l = left.as_bool().unwrap_or(false);
            let r = right.as_bool().unwrap_or(false);
            FormulaValue::Boolean(if op == BinaryOp::And { l && r } else { l || r })
        }
    }
}

fn type_error(op: &str, value: &FormulaValue) -> FormulaValue {
    FormulaValue::error(
        ErrorCode::TypeMismatch,
        format!("{op} cannot be applied to {value}"),
    )
}

fn numeric_error(message: &str) -> FormulaValue {
    FormulaValue::error(ErrorCode::Numeric, message)
}

pub(crate) fn arithmetic(op: BinaryOp, left: FormulaValue, right: FormulaValue) -> FormulaValue {
    use FormulaValue as V;
    match (&left, &right) {
        (V::Date(_) | V::DateTime(_), V::Date(_) | V::DateTime(_)) if op == BinaryOp::Sub => {
            FormulaValue::Number(serial(&left) - serial(&right))
        }
        (V::Date(d), V::Number(_) | V::Decimal(_) | V::Blank) => {
            let days = number(&right).unwrap_or(0.0);
            let days = if op == BinaryOp::Sub { -days } else { days };
            Duration::try_days(days.trunc() as i64)
                .and_then(|offset| d.checked_add_signed(offset))
                .map_or_else(|| numeric_error("date out of range"), FormulaValue::Date)
        }
        (V::DateTime(_), V::Number(_) | V::Decimal(_) | V::Blank) => {
            let days = number(&right).unwrap_or(0.0);
            let days = if op == BinaryOp::Sub { -days } else { days };
            serial_datetime(serial(&left) + days)
        }
        (V::Number(_) | V::Decimal(_) | V::Blank, V::Date(_) | V::DateTime(_)) if op == BinaryOp::Add => {
            arithmetic(op, right.clone(), left.clone())
        }
        (V::Decimal(_) | V::Blank, V::Decimal(_) | V::Blank)
            if op != BinaryOp::Pow && !(left.is_blank() && right.is_blank()) =>
        {
            decimal_arithmetic(op, decimal(&left), decimal(&right))
        }
        _ => match (number(&left), number(&right)) {
            (Some(l), Some(r)) => float_arithmetic(op, l, r),
            (None, _) => type_error(&format!("'{op}'"), &left),
            (_, None) => type_error(&format!("'{op}'"), &right),
        },
    }
}

fn number(value: &FormulaValue) -> Option<f64> {
    match value {
        FormulaValue::Blank => Some(0.0),
        other => other.as_f64(),
    }
}

fn decimal(value: &FormulaValue) -> Decimal {
    match value {
        FormulaValue::Decimal(d) => *d,
        _ => Decimal::ZERO,
    }
}

fn serial(value: &FormulaValue) -> f64 {
    match value {
        FormulaValue::Date(d) => datetime_serial(d.and_time(NaiveTime::MIN)),
        FormulaValue::DateTime(dt) => datetime_serial(*dt),
        _ => 0.0,
    }
}

fn float_arithmetic(op: BinaryOp, l: f64, r: f64) -> FormulaValue {
    let result = match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div if r == 0.0 => return FormulaValue::Error(ErrorValue::division_by_zero()),
        BinaryOp::Div => l / r,
        _ => l.powf(r),
    };
    if result.is_finite() {
        FormulaValue::Number(result)
    } else {
        numeric_error("numeric overflow")
    }
}

fn decimal_arithmetic(op: BinaryOp, l: Decimal, r: Decimal) -> FormulaValue {
    let result = match op {
        BinaryOp::Add => l.checked_add(r),
        BinaryOp::Sub => l.checked_sub(r),
        BinaryOp::Mul => l.checked_mul(r),
        BinaryOp::Div if r.is_zero() => return FormulaValue::Error(ErrorValue::division_by_zero()),
        BinaryOp::Div => l.checked_div(r),
        _ => None,
    };
    result.map_or_else(|| numeric_error("decimal overflow"), FormulaValue::Decimal)
}

/// `=` semantics: Blank equals empty text, numbers compare across kinds.
pub(crate) fn equals(left: &FormulaValue, right: &FormulaValue) -> bool {
    use FormulaValue as V;
    match (left, right) {
        (V::Blank, V::String(s)) | (V::String(s), V::Blank) => s.is_empty(),
        (V::Number(_) | V::Decimal(_), V::Number(_) | V::Decimal(_)) => {
            left.as_f64() == right.as_f64()
        }
        _ => left.value_eq(right),
    }
}

fn compare(op: BinaryOp, left: &FormulaValue, right: &FormulaValue) -> FormulaValue {
    use FormulaValue as V;
    let ordering = match (left, right) {
        (V::Decimal(a), V::Decimal(b)) => Some(a.cmp(b)),
        (V::Date(_) | V::DateTime(_), V::Date(_) | V::DateTime(_)) => {
            serial(left).partial_cmp(&serial(right))
        }
        (V::Time(a), V::Time(b)) => Some(a.cmp(b)),
        _ => match (number(left), number(right)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            (None, _) => return type_error(&format!("'{op}'"), left),
            (_, None) => return type_error(&format!("'{op}'"), right),
        },
    };
    let Some(ordering) = ordering else {
        return FormulaValue::Boolean(false);
    };
    FormulaValue::Boolean(match op {
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    })
}

fn concat(left: &FormulaValue, right: &FormulaValue) -> FormulaValue {
    match (left.to_text(), right.to_text()) {
        (Some(l), Some(r)) => FormulaValue::String(l + &r),
        (None, _) => type_error("'&'", left),
        (_, None) => type_error("'&'", right),
    }
}

/// `a in "text"`: substring test, case-insensitive unless `exactin`.
pub(crate) fn contains_text(op: BinaryOp, needle: &FormulaValue, haystack: &FormulaValue) -> FormulaValue {
    let (Some(needle), Some(haystack)) = (needle.to_text(), haystack.to_text()) else {
        return type_error(&format!("'{op}'"), haystack);
    };
    FormulaValue::Boolean(if op == BinaryOp::ExactIn {
        haystack.contains(&needle)
    } else {
        haystack.to_lowercase().contains(&needle.to_lowercase())
    })
}
