//! Pratt parser core - precedence climbing for binary and unary operators.

use super::super::{ParseError, TokenStream};
use super::atoms;
use formula_ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use formula_lexer::TokenKind;
use std::sync::Arc;

/// Operator associativity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Assoc {
    Left,
    Right,
}

/// Get binary operator metadata (precedence, associativity, and operator enum).
///
/// Returns (precedence, associativity, op) where higher precedence = tighter binding.
fn binary_op_info(token: &TokenKind) -> Option<(u8, Assoc, BinaryOp)> {
    match token {
        TokenKind::Or | TokenKind::PipePipe => Some((10, Assoc::Left, BinaryOp::Or)),
        TokenKind::And | TokenKind::AmpAmp => Some((20, Assoc::Left, BinaryOp::And)),
        TokenKind::Eq => Some((30, Assoc::Left, BinaryOp::Eq)),
        TokenKind::NotEq => Some((30, Assoc::Left, BinaryOp::NotEq)),
        TokenKind::Lt => Some((30, Assoc::Left, BinaryOp::Lt)),
        TokenKind::LtEq => Some((30, Assoc::Left, BinaryOp::Le)),
        TokenKind::Gt => Some((30, Assoc::Left, BinaryOp::Gt)),
        TokenKind::GtEq => Some((30, Assoc::Left, BinaryOp::Ge)),
        TokenKind::In => Some((30, Assoc::Left, BinaryOp::In)),
        TokenKind::ExactIn => Some((30, Assoc::Left, BinaryOp::ExactIn)),
        TokenKind::Ampersand => Some((40, Assoc::Left, BinaryOp::Concat)),
        TokenKind::Plus => Some((50, Assoc::Left, BinaryOp::Add)),
        TokenKind::Minus => Some((50, Assoc::Left, BinaryOp::Sub)),
        TokenKind::Star => Some((60, Assoc::Left, BinaryOp::Mul)),
        TokenKind::Slash => Some((60, Assoc::Left, BinaryOp::Div)),
        TokenKind::Caret => Some((70, Assoc::Right, BinaryOp::Pow)),
        _ => None,
    }
}

/// Pratt parser - handles binary operators with precedence climbing.
///
/// Every operand and every left fold is one nesting level, so the depth of
/// the tree built here never exceeds [`MAX_NESTING`](super::super::MAX_NESTING).
pub(super) fn parse_pratt(stream: &mut TokenStream, min_prec: u8) -> Arc<Expr> {
    if let Err(error) = stream.descend() {
        return error;
    }
    let mut levels = 1;
    let start = stream.current_pos();
    let mut left = parse_prefix(stream);

    while let Some(token) = stream.peek() {
        let Some((prec, assoc, op)) = binary_op_info(token) else {
            break;
        };
        if prec < min_prec {
            break;
        }
        if let Err(error) = stream.descend() {
            left = error;
            break;
        }
        levels += 1;
        stream.advance();

        let next_prec = if assoc == Assoc::Left { prec + 1 } else { prec };
        let right = parse_pratt(stream, next_prec);
        left = stream.node_from(start, ExprKind::Binary { op, left, right });
    }

    stream.ascend(levels);
    left
}

/// Parse prefix operators. They bind tighter than every binary operator,
/// so `-2^2` is `(-2)^2`.
fn parse_prefix(stream: &mut TokenStream) -> Arc<Expr> {
    let op = match stream.peek() {
        Some(TokenKind::Minus) => UnaryOp::Neg,
        Some(TokenKind::Bang | TokenKind::Not) => UnaryOp::Not,
        _ => return parse_postfix(stream),
    };
    if let Err(error) = stream.descend() {
        return error;
    }
    let start = stream.current_pos();
    stream.advance();
    let operand = parse_prefix(stream);
    stream.ascend(1);
    stream.node_from(start, ExprKind::Unary { op, operand })
}

/// Parse postfix forms: percent, field access and namespaced calls.
fn parse_postfix(stream: &mut TokenStream) -> Arc<Expr> {
    let start = stream.current_pos();
    let mut expr = atoms::parse_atom(stream);
    let mut levels = 0;

    loop {
        if matches!(stream.peek(), Some(TokenKind::Percent | TokenKind::Dot)) {
            if let Err(error) = stream.descend() {
                expr = error;
                break;
            }
            levels += 1;
        }
        match stream.peek() {
            Some(TokenKind::Percent) => {
                stream.advance();
                expr = stream.node_from(
                    start,
                    ExprKind::Unary {
                        op: UnaryOp::Percent,
                        operand: expr,
                    },
                );
            }
            Some(TokenKind::Dot) => {
                stream.advance();
                let Some(field) = atoms::take_ident(stream) else {
                    let error = ParseError::unexpected_token(
                        stream.peek(),
                        "after '.'",
                        stream.current_span(),
                    );
                    stream.record(error);
                    stream.ascend(levels);
                    let message = "expected a field name after '.'".to_string();
                    return stream.node_from(start, ExprKind::Error(message));
                };

                if stream.check(&TokenKind::LParen) {
                    // `a.b.F(x)`: the dotted path is a function namespace.
                    expr = match expr.as_path() {
                        Some(namespace) => atoms::parse_call(stream, start, namespace, field),
                        None => not_callable(stream, start),
                    };
                } else {
                    expr = stream.node_from(
                        start,
                        ExprKind::DottedName {
                            left: expr,
                            right: field,
                        },
                    );
                }
            }
            Some(TokenKind::LParen) => {
                expr = not_callable(stream, start);
            }
            _ => break,
        }
    }

    stream.ascend(levels);
    expr
}

/// Consume an argument list applied to something that is not a name and
/// cover the whole construct with an error node.
fn not_callable(stream: &mut TokenStream, start: usize) -> Arc<Expr> {
    let paren = stream.current_span();
    stream.record(ParseError::invalid_syntax(
        "only named functions can be called",
        paren,
    ));
    atoms::parse_call_args(stream);
    stream.node_from(
        start,
        ExprKind::Error("only named functions can be called".to_string()),
    )
}
