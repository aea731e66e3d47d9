//! Atomic expressions - literals, names, calls, records, tables and
//! interpolated strings.

use super::super::{ParseError, TokenStream};
use formula_ast::{Expr, ExprKind, Ident};
use formula_lexer::TokenKind;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

/// Parse an atom. Always returns a node; on failure an `Error` node.
///
/// Closing delimiters and separators are never consumed here, so the
/// enclosing construct can still find them.
pub(super) fn parse_atom(stream: &mut TokenStream) -> Arc<Expr> {
    let start = stream.current_pos();

    match stream.peek() {
        Some(TokenKind::True) => {
            stream.advance();
            stream.node_from(start, ExprKind::BoolLit(true))
        }
        Some(TokenKind::False) => {
            stream.advance();
            stream.node_from(start, ExprKind::BoolLit(false))
        }
        Some(TokenKind::Number(text)) => {
            stream.advance();
            parse_number(stream, start, text)
        }
        Some(TokenKind::Str(text)) => {
            stream.advance();
            stream.node_from(start, ExprKind::StrLit(text.to_string()))
        }
        Some(TokenKind::InterpStart) => parse_interpolation(stream),
        Some(TokenKind::Ident { .. }) => parse_name(stream),
        Some(TokenKind::At) => parse_disambiguated(stream),
        Some(TokenKind::SelfKw) => {
            stream.advance();
            stream.node_from(start, ExprKind::SelfRef)
        }
        Some(TokenKind::Parent) => {
            stream.advance();
            stream.node_from(start, ExprKind::ParentRef)
        }
        Some(TokenKind::LParen) => parse_parenthesized(stream),
        Some(TokenKind::LBrace) => parse_record(stream),
        Some(TokenKind::LBracket) => parse_table(stream),
        Some(TokenKind::Error(lex)) => {
            let span = stream.current_span();
            stream.advance();
            stream.error_node(ParseError::lex(lex, span))
        }
        found @ (None
        | Some(
            TokenKind::RParen
            | TokenKind::RBrace
            | TokenKind::RBracket
            | TokenKind::IslandEnd
            | TokenKind::InterpEnd
            | TokenKind::ListSep
            | TokenKind::ChainSep,
        )) => {
            let error = ParseError::unexpected_token(
                found,
                "where an operand was expected",
                stream.empty_span(),
            );
            stream.error_node(error)
        }
        found => {
            let span = stream.current_span();
            stream.advance();
            stream.error_node(ParseError::unexpected_token(found, "in expression", span))
        }
    }
}

/// Consume an identifier token if one is next.
pub(super) fn take_ident(stream: &mut TokenStream) -> Option<Ident> {
    match stream.peek() {
        Some(TokenKind::Ident { name, .. }) => {
            let span = stream.current_span();
            stream.advance();
            Some(Ident::new(name.to_string(), span))
        }
        _ => None,
    }
}

/// Numeric literal. Decimal unless the options ask for floats; values
/// outside the decimal range fall back to `f64`.
fn parse_number(stream: &mut TokenStream, start: usize, text: &str) -> Arc<Expr> {
    let decimal = if stream.options.numbers_as_float {
        None
    } else {
        parse_decimal(text)
    };
    let kind = match decimal {
        Some(value) => Some(ExprKind::DecLit(value)),
        None => text
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(ExprKind::NumLit),
    };
    match kind {
        Some(kind) => stream.node_from(start, kind),
        None => {
            let error =
                ParseError::invalid_syntax(format!("number '{text}' is out of range"), stream.span_from(start));
            stream.error_node(error)
        }
    }
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    let mut text = text.to_ascii_lowercase();
    if text.starts_with('.') {
        text.insert(0, '0');
    }
    if text.contains(['e', 'E']) {
        Decimal::from_scientific(&text).ok()
    } else {
        Decimal::from_str(&text).ok()
    }
}

/// `name` or `name(args)`.
fn parse_name(stream: &mut TokenStream) -> Arc<Expr> {
    let start = stream.current_pos();
    let Some(ident) = take_ident(stream) else {
        let error = ParseError::unexpected_token(stream.peek(), "where a name was expected", stream.current_span());
        return stream.error_node(error);
    };
    if stream.check(&TokenKind::LParen) {
        parse_call(stream, start, Vec::new(), ident)
    } else {
        stream.node_from(start, ExprKind::FirstName(ident))
    }
}

/// `@name`: resolve against globals only.
fn parse_disambiguated(stream: &mut TokenStream) -> Arc<Expr> {
    let start = stream.current_pos();
    stream.advance();
    let Some(mut ident) = take_ident(stream) else {
        let error = ParseError::unexpected_token(stream.peek(), "after '@'", stream.span_from(start));
        return stream.error_node(error);
    };
    ident.disambiguated = true;
    if stream.check(&TokenKind::LParen) {
        parse_call(stream, start, Vec::new(), ident)
    } else {
        stream.node_from(start, ExprKind::FirstName(ident))
    }
}

/// Parse the argument list of a call whose head was already consumed.
pub(super) fn parse_call(
    stream: &mut TokenStream,
    start: usize,
    namespace: Vec<String>,
    head: Ident,
) -> Arc<Expr> {
    if namespace.is_empty() && head.name == "Set" && !stream.options.allow_side_effects {
        stream.record(ParseError::side_effects("Set", head.span));
    }
    let args = parse_call_args(stream);
    stream.node_from(
        start,
        ExprKind::Call {
            namespace,
            head,
            args,
        },
    )
}

/// `( arg, ... )`. Empty positions become `Blank` nodes.
pub(super) fn parse_call_args(stream: &mut TokenStream) -> Vec<Arc<Expr>> {
    if !stream.expect(TokenKind::LParen) {
        return Vec::new();
    }
    parse_list(stream, &TokenKind::RParen, |stream| {
        if matches!(stream.peek(), Some(TokenKind::ListSep | TokenKind::RParen)) {
            let span = stream.empty_span();
            return Some(stream.node(ExprKind::Blank, span));
        }
        Some(parse_arg(stream))
    })
}

/// One call argument: a chain, optionally followed by `As alias`.
fn parse_arg(stream: &mut TokenStream) -> Arc<Expr> {
    let start = stream.current_pos();
    let expr = super::parse_chain(stream);
    if !stream.eat(&TokenKind::As) {
        return expr;
    }
    match take_ident(stream) {
        Some(alias) => stream.node_from(start, ExprKind::As { left: expr, alias }),
        None => {
            let error = ParseError::unexpected_token(stream.peek(), "after 'As'", stream.current_span());
            stream.record(error);
            expr
        }
    }
}

fn parse_parenthesized(stream: &mut TokenStream) -> Arc<Expr> {
    stream.advance();
    let inner = super::parse_chain(stream);
    if !stream.expect(TokenKind::RParen) && !stream.at_end() {
        stream.synchronize();
        stream.eat(&TokenKind::RParen);
    }
    inner
}

/// `{ name: expr, ... }`
fn parse_record(stream: &mut TokenStream) -> Arc<Expr> {
    let start = stream.current_pos();
    stream.advance();
    let fields = parse_list(stream, &TokenKind::RBrace, |stream| {
        let Some(name) = take_ident(stream) else {
            let error = ParseError::invalid_syntax(
                "record fields must start with a field name",
                stream.current_span(),
            );
            stream.record(error);
            stream.synchronize();
            return None;
        };
        stream.expect(TokenKind::Colon);
        Some((name, super::parse_expr(stream)))
    });

    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(fields.len());
    for (name, value) in fields {
        if seen.insert(name.name.clone()) {
            unique.push((name, value));
        } else {
            stream.record(ParseError::invalid_syntax(
                format!("duplicate field name '{}'", name.name),
                name.span,
            ));
        }
    }
    stream.node_from(start, ExprKind::Record(unique))
}

/// `[ expr, ... ]`
fn parse_table(stream: &mut TokenStream) -> Arc<Expr> {
    let start = stream.current_pos();
    stream.advance();
    let rows = parse_list(stream, &TokenKind::RBracket, |stream| {
        Some(super::parse_expr(stream))
    });
    stream.node_from(start, ExprKind::Table(rows))
}

/// `$"text {island} text"`
fn parse_interpolation(stream: &mut TokenStream) -> Arc<Expr> {
    let start = stream.current_pos();
    stream.advance();
    let mut parts = Vec::new();

    loop {
        let part_start = stream.current_pos();
        match stream.peek() {
            Some(TokenKind::InterpText(text)) => {
                stream.advance();
                parts.push(stream.node_from(part_start, ExprKind::StrLit(text.to_string())));
            }
            Some(TokenKind::IslandStart) => {
                stream.advance();
                parts.push(super::parse_expr(stream));
                if !stream.expect(TokenKind::IslandEnd) {
                    stream.synchronize();
                    stream.eat(&TokenKind::IslandEnd);
                }
            }
            Some(TokenKind::InterpEnd) => {
                stream.advance();
                break;
            }
            Some(TokenKind::Error(lex)) => {
                let span = stream.current_span();
                stream.advance();
                stream.record(ParseError::lex(lex, span));
                break;
            }
            found => {
                let error = ParseError::unexpected_token(
                    found,
                    "in interpolated string",
                    stream.current_span(),
                );
                stream.record(error);
                break;
            }
        }
    }

    stream.node_from(start, ExprKind::StrInterp(parts))
}

/// Items separated by list separators up to `close`, which is consumed.
///
/// `item` returns `None` after reporting its own error; junk after an item
/// is skipped up to the next separator or closing delimiter.
fn parse_list<'s, T>(
    stream: &mut TokenStream<'s>,
    close: &TokenKind,
    mut item: impl FnMut(&mut TokenStream<'s>) -> Option<T>,
) -> Vec<T> {
    let mut items = Vec::new();
    if stream.eat(close) {
        return items;
    }
    loop {
        if let Some(value) = item(stream) {
            items.push(value);
        }
        if stream.eat(&TokenKind::ListSep) {
            continue;
        }
        if stream.eat(close) {
            break;
        }
        let error = ParseError::expected_token(close, stream.peek(), stream.current_span());
        stream.record(error);
        if stream.at_end() {
            break;
        }
        stream.synchronize();
        if stream.eat(&TokenKind::ListSep) {
            continue;
        }
        stream.eat(close);
        break;
    }
    items
}
