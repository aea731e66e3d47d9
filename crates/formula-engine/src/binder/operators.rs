//! Operator typing.

use super::Binder;
use crate::error::ErrorKind;
use formula_ast::{BinaryOp, Expr, UnaryOp};
use formula_types::{DType, Kind};

impl Binder<'_> {
    pub(super) fn bind_unary(&mut self, op: UnaryOp, operand: &Expr) -> DType {
        let ty = self.bind(operand);
        match op {
            UnaryOp::Not => {
                self.require(operand, &ty, &DType::Boolean, || {
                    format!("'Not' needs a Boolean, found {ty}")
                });
                DType::Boolean
            }
            UnaryOp::Neg | UnaryOp::Percent => {
                let result = numeric_result(&ty, &DType::Blank);
                self.require(operand, &ty, &result, || {
                    format!("'{op}' needs a number, found {ty}")
                });
                result
            }
        }
    }

    pub(super) fn bind_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> DType {
        let lt = self.bind(left);
        let rt = self.bind(right);

        match op {
            // === Logical ===
            BinaryOp::And | BinaryOp::Or => {
                for (expr, ty) in [(left, &lt), (right, &rt)] {
                    self.require(expr, ty, &DType::Boolean, || {
                        format!("'{op}' needs Boolean operands, found {ty}")
                    });
                }
                DType::Boolean
            }

            // === Text ===
            BinaryOp::Concat => {
                for (expr, ty) in [(left, &lt), (right, &rt)] {
                    self.require(expr, ty, &DType::String, || {
                        format!("cannot join a value of type {ty} as text")
                    });
                }
                DType::String
            }

            // === Arithmetic ===
            BinaryOp::Add | BinaryOp::Sub => match date_arithmetic(op, &lt, &rt) {
                Some(result) => result,
                None => self.bind_arithmetic(op, left, &lt, right, &rt),
            },
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Pow => {
                self.bind_arithmetic(op, left, &lt, right, &rt)
            }

            // === Comparison ===
            BinaryOp::Eq | BinaryOp::NotEq => {
                self.bind_equality(op, left, &lt, right, &rt);
                DType::Boolean
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                self.bind_ordering(op, left, &lt, right, &rt);
                DType::Boolean
            }

            // === Membership ===
            BinaryOp::In | BinaryOp::ExactIn => {
                match &rt {
                    DType::Table(_) => {}
                    ty if ty.is_error_like() => {}
                    _ => {
                        self.require(right, &rt, &DType::String, || {
                            format!("'{op}' needs text or a table on its right, found {rt}")
                        });
                        self.require(left, &lt, &DType::String, || {
                            format!("'{op}' needs text on its left, found {lt}")
                        });
                    }
                }
                DType::Boolean
            }
        }
    }

    fn bind_arithmetic(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        lt: &DType,
        right: &Expr,
        rt: &DType,
    ) -> DType {
        let result = if op == BinaryOp::Pow {
            DType::Number
        } else {
            numeric_result(lt, rt)
        };
        for (expr, ty) in [(left, lt), (right, rt)] {
            self.require(expr, ty, &result, || {
                format!("'{op}' needs numeric operands, found {ty}")
            });
        }
        result
    }

    fn bind_equality(&mut self, op: BinaryOp, left: &Expr, lt: &DType, right: &Expr, rt: &DType) {
        if lt.is_aggregate() || rt.is_aggregate() {
            self.error(
                left.span.merge(&right.span),
                ErrorKind::TypeMismatch,
                format!("'{op}' cannot compare records or tables"),
            );
            return;
        }
        if lt.kind().is_numeric() && rt.kind().is_numeric() && lt.kind() != rt.kind() {
            self.set_numeric_operands(left, lt, right, rt);
            return;
        }
        let features = self.ctx.features;
        let comparable = lt.accepts(rt, false, false, features) || rt.accepts(lt, false, false, features);
        if !comparable {
            self.error(
                left.span.merge(&right.span),
                ErrorKind::IncompatibleTypes,
                format!("cannot compare {lt} with {rt}"),
            );
        }
    }

    fn bind_ordering(&mut self, op: BinaryOp, left: &Expr, lt: &DType, right: &Expr, rt: &DType) {
        let orderable = |ty: &DType| {
            let kind = ty.kind();
            kind.is_numeric()
                || kind.is_date_time()
                || matches!(kind, Kind::Blank | Kind::Unknown | Kind::Error | Kind::Deferred)
        };
        for (expr, ty) in [(left, lt), (right, rt)] {
            if !orderable(ty) {
                self.error(
                    expr.span,
                    ErrorKind::TypeMismatch,
                    format!("'{op}' needs numbers or dates, found {ty}"),
                );
            }
        }
        if lt.kind().is_numeric() && rt.kind().is_numeric() && lt.kind() != rt.kind() {
            self.set_numeric_operands(left, lt, right, rt);
        }
    }

    /// Mixed `Number`/`Decimal` operands compare as `Number`.
    fn set_numeric_operands(&mut self, left: &Expr, lt: &DType, right: &Expr, rt: &DType) {
        if lt.kind() == Kind::Decimal {
            self.set_coercion(left.id, DType::Number);
        }
        if rt.kind() == Kind::Decimal {
            self.set_coercion(right.id, DType::Number);
        }
    }
}

/// `Decimal` only when every non-blank operand is `Decimal`.
fn numeric_result(a: &DType, b: &DType) -> DType {
    let decimal_or_blank = |ty: &DType| matches!(ty.kind(), Kind::Decimal | Kind::Blank);
    let any_decimal = a.kind() == Kind::Decimal || b.kind() == Kind::Decimal;
    if any_decimal && decimal_or_blank(a) && decimal_or_blank(b) {
        DType::Decimal
    } else {
        DType::Number
    }
}

/// Date arithmetic: date + days, date - date, datetime - datetime.
fn date_arithmetic(op: BinaryOp, lt: &DType, rt: &DType) -> Option<DType> {
    let (l, r) = (lt.kind(), rt.kind());
    match (op, l, r) {
        (_, Kind::Date | Kind::DateTime, r) if r.is_numeric() => Some(lt.clone()),
        (BinaryOp::Add, l, Kind::Date | Kind::DateTime) if l.is_numeric() => Some(rt.clone()),
        (BinaryOp::Sub, Kind::Date | Kind::DateTime, Kind::Date | Kind::DateTime) => {
            Some(DType::Number)
        }
        _ => None,
    }
}
