// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Hand-written recursive descent parser for the formula language.
//!
//! The parser never aborts: malformed subtrees become
//! [`ExprKind::Error`](formula_ast::ExprKind::Error) nodes with a matching
//! [`ParseError`], and parsing continues with the siblings.
//!
//! ```
//! # use formula_parser::*;
//! let result = parse("Sum(1, 2) * 3", &ParserOptions::default());
//! assert!(result.success);
//! ```

pub mod parser;

pub use parser::{
    Comment, MAX_NESTING, ParseError, ParseErrorKind, ParseResult, ParserOptions, parse,
    parse_tokens,
};

// Re-export lexer
pub use formula_lexer::{Culture, Token, TokenKind};
