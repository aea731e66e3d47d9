//! Parse error types.

use formula_ast::Span;
use formula_lexer::{LexError, TokenKind};
use std::fmt;

/// Parse error with source location and context.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    /// Kind of parse error
    pub kind: ParseErrorKind,
    /// Source location where error occurred
    pub span: Span,
    /// Human-readable error message
    pub message: String,
}

/// Category of parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A token other than the one the grammar requires at this point.
    ///
    /// Example: `F(1 2)`: expected a list separator or `)`.
    UnexpectedToken,

    /// Input ended while a construct was still open.
    ///
    /// Example: `F(1,`: missing argument and `)`.
    UnexpectedEof,

    /// Tokens are present but violate the grammar.
    ///
    /// Example: `{1: 2}`: record field names must be identifiers.
    InvalidSyntax,

    /// The tokenizer produced an error token (unterminated string, stray
    /// character, ...).
    Lex,

    /// `Set(...)` or `;`-chaining in a formula parsed without
    /// [`ParserOptions::allow_side_effects`](super::ParserOptions).
    SideEffectsNotAllowed,

    /// Operands nested deeper than [`MAX_NESTING`](super::MAX_NESTING).
    ///
    /// Example: two hundred and one opening parentheses.
    NestedTooDeeply,
}

impl ParseError {
    /// Create an "expected token" error.
    pub fn expected_token(expected: &TokenKind, found: Option<&TokenKind>, span: Span) -> Self {
        let message = match found {
            Some(token) => format!("expected '{}', found '{}'", expected, token),
            None => format!("expected '{}', found end of input", expected),
        };
        Self {
            kind: if found.is_none() {
                ParseErrorKind::UnexpectedEof
            } else {
                ParseErrorKind::UnexpectedToken
            },
            span,
            message,
        }
    }

    /// Create an "unexpected token" error.
    pub fn unexpected_token(found: Option<&TokenKind>, context: &str, span: Span) -> Self {
        let message = match found {
            Some(token) => format!("unexpected '{}' {}", token, context),
            None => format!("unexpected end of input {}", context),
        };
        Self {
            kind: if found.is_none() {
                ParseErrorKind::UnexpectedEof
            } else {
                ParseErrorKind::UnexpectedToken
            },
            span,
            message,
        }
    }

    /// Create an "invalid syntax" error.
    pub fn invalid_syntax(message: impl Into<String>, span: Span) -> Self {
        Self {
            kind: ParseErrorKind::InvalidSyntax,
            span,
            message: message.into(),
        }
    }

    pub fn lex(error: &LexError, span: Span) -> Self {
        Self {
            kind: ParseErrorKind::Lex,
            span,
            message: error.to_string(),
        }
    }

    pub fn side_effects(what: &str, span: Span) -> Self {
        Self {
            kind: ParseErrorKind::SideEffectsNotAllowed,
            span,
            message: format!("{what} is only allowed in behavior formulas"),
        }
    }

    pub fn nested_too_deeply(span: Span) -> Self {
        Self {
            kind: ParseErrorKind::NestedTooDeeply,
            span,
            message: format!("expression is nested more than {} levels deep", super::MAX_NESTING),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}..{}", self.message, self.span.start, self.span.end)
    }
}

impl std::error::Error for ParseError {}
