//! Expression parser using Pratt parsing (precedence climbing).
//!
//! ## Precedence Levels (lowest to highest)
//!
//! 1. `;` (Chain) - variadic, behavior formulas only
//! 2. `||` / `Or` - left associative
//! 3. `&&` / `And` - left associative
//! 4. `=`, `<>`, `<`, `<=`, `>`, `>=`, `in`, `exactin` - left associative
//! 5. `&` (Concat) - left associative
//! 6. `+`, `-` - left associative
//! 7. `*`, `/` - left associative
//! 8. `^` (Power) - right associative
//! 9. Prefix `-`, `!`, `Not`
//! 10. Postfix: `%`, `.field`, `ns.Func(args)`
//!
//! ## Module Organization
//!
//! - `pratt` - Pratt parser core (precedence climbing, unary and postfix ops)
//! - `atoms` - literals, names, calls, records, tables, interpolated strings

mod atoms;
mod pratt;

use super::{ParseError, TokenStream};
use formula_ast::{Expr, ExprKind, VariadicOp};
use formula_lexer::TokenKind;
use std::sync::Arc;

/// Parse an expression without `;` chaining.
pub(super) fn parse_expr(stream: &mut TokenStream) -> Arc<Expr> {
    pratt::parse_pratt(stream, 0)
}

/// Parse `expr (; expr)*`. A single expression is returned unwrapped; a
/// trailing separator is allowed.
pub(super) fn parse_chain(stream: &mut TokenStream) -> Arc<Expr> {
    let start = stream.current_pos();
    let first = parse_expr(stream);
    if !stream.check(&TokenKind::ChainSep) {
        return first;
    }

    let mut children = vec![first];
    while stream.check(&TokenKind::ChainSep) {
        let span = stream.current_span();
        stream.advance();
        if !stream.options.allow_side_effects {
            stream.record(ParseError::side_effects("Expression chaining", span));
        }
        if ends_chain(stream.peek()) {
            break;
        }
        children.push(parse_expr(stream));
    }

    stream.node_from(
        start,
        ExprKind::Variadic {
            op: VariadicOp::Chain,
            children,
        },
    )
}

fn ends_chain(token: Option<&TokenKind>) -> bool {
    matches!(
        token,
        None | Some(
            TokenKind::RParen
                | TokenKind::RBrace
                | TokenKind::RBracket
                | TokenKind::IslandEnd
                | TokenKind::InterpEnd
                | TokenKind::ListSep
        )
    )
}
