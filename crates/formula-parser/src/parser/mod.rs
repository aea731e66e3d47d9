//! Hand-written recursive descent parser for formulas.
//!
//! ## Architecture
//!
//! - `stream`: TokenStream wrapper with lookahead, node ids and the error sink
//! - `error`: ParseError and its categories
//! - `expr`: expression parser using Pratt parsing
//!
//! The parser never aborts. Malformed input produces `Error` nodes (or
//! `Blank` nodes for missing arguments) plus a [`ParseError`], and parsing
//! continues with the surrounding construct.

mod error;
mod expr;
mod stream;

pub use error::{ParseError, ParseErrorKind};
pub use stream::MAX_NESTING;
use stream::TokenStream;

use formula_ast::{Expr, ExprKind, Span};
use formula_lexer::{Culture, Token, TokenKind, tokenize};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Options controlling what the parser accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    /// Accept `Set(...)` and `;`-chained expressions (behavior formulas).
    pub allow_side_effects: bool,
    /// Represent numeric literals as `f64` instead of `Decimal`.
    pub numbers_as_float: bool,
    /// Separator family of the formula text.
    pub culture: Culture,
}

impl ParserOptions {
    pub fn with_side_effects(mut self) -> Self {
        self.allow_side_effects = true;
        self
    }

    pub fn with_numbers_as_float(mut self) -> Self {
        self.numbers_as_float = true;
        self
    }

    pub fn with_culture(mut self, culture: Culture) -> Self {
        self.culture = culture;
        self
    }
}

/// A comment stripped from the token stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub text: String,
    pub span: Span,
}

/// Outcome of parsing one formula.
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Always present; an `Error` node when nothing could be parsed.
    pub root: Arc<Expr>,
    /// `true` iff `errors` is empty.
    pub success: bool,
    pub errors: Vec<ParseError>,
    pub comments: Vec<Comment>,
    /// Every node id in `root` is below this value.
    pub node_count: u32,
}

/// Tokenize and parse `text`.
#[instrument(skip_all, name = "parse", fields(len = text.len()))]
pub fn parse(text: &str, options: &ParserOptions) -> ParseResult {
    let tokens = tokenize(text, options.culture);
    parse_tokens(&tokens, options)
}

/// Parse an already tokenized formula.
pub fn parse_tokens(tokens: &[Token], options: &ParserOptions) -> ParseResult {
    let mut comments = Vec::new();
    let mut code = Vec::with_capacity(tokens.len());
    for token in tokens {
        match &token.kind {
            TokenKind::Comment(text) => comments.push(Comment {
                text: text.to_string(),
                span: Span::from(token.span.clone()),
            }),
            _ => code.push(token.clone()),
        }
    }

    let mut stream = TokenStream::new(&code, options);
    let root = if stream.at_end() {
        stream.node(ExprKind::Blank, Span::default())
    } else {
        expr::parse_chain(&mut stream)
    };

    // Report the first stray token; after that only lexer errors are new
    // information.
    let mut reported = false;
    while !stream.at_end() {
        let span = stream.current_span();
        match stream.advance() {
            Some(TokenKind::Error(lex)) => stream.record(ParseError::lex(lex, span)),
            found if !reported => {
                stream.record(ParseError::unexpected_token(
                    found,
                    "after end of expression",
                    span,
                ));
                reported = true;
            }
            _ => {}
        }
    }

    let node_count = stream.node_count();
    let errors = stream.errors;
    debug!(
        nodes = node_count,
        errors = errors.len(),
        comments = comments.len(),
        "parsed formula"
    );
    ParseResult {
        root,
        success: errors.is_empty(),
        errors,
        comments,
        node_count,
    }
}
