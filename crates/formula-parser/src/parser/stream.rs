//! Token stream wrapper for the hand-written parser.

use super::{ParseError, ParserOptions};
use formula_ast::{Expr, ExprKind, NodeId, Span};
use formula_lexer::{Token, TokenKind};
use std::mem::discriminant;
use std::sync::Arc;

/// Deepest nesting of operands, arguments, fields and parentheses the
/// parser descends into. Deeper input is skipped with a
/// [`NestedTooDeeply`](super::ParseErrorKind::NestedTooDeeply) error.
pub const MAX_NESTING: usize = 200;

/// Token stream with lookahead, span tracking, node-id allocation and the
/// error sink used for recovery.
pub struct TokenStream<'src> {
    tokens: &'src [Token],
    pos: usize,
    next_id: u32,
    depth: usize,
    pub(crate) options: &'src ParserOptions,
    pub(crate) errors: Vec<ParseError>,
}

impl<'src> TokenStream<'src> {
    /// Create a new stream over trivia-free tokens.
    pub fn new(tokens: &'src [Token], options: &'src ParserOptions) -> Self {
        Self {
            tokens,
            pos: 0,
            next_id: 0,
            depth: 0,
            options,
            errors: Vec::new(),
        }
    }

    /// Peek at the current token without consuming it.
    pub fn peek(&self) -> Option<&'src TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    /// Advance to the next token and return the current one.
    pub fn advance(&mut self) -> Option<&'src TokenKind> {
        let token = self.tokens.get(self.pos).map(|t| &t.kind);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Check if the current token has the same kind as `expected` (payloads
    /// are ignored).
    pub fn check(&self, expected: &TokenKind) -> bool {
        matches!(self.peek(), Some(t) if discriminant(t) == discriminant(expected))
    }

    /// Consume `expected` if present.
    pub fn eat(&mut self, expected: &TokenKind) -> bool {
        if self.check(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Expect a specific token; records an error and leaves the stream in
    /// place when it is missing.
    pub fn expect(&mut self, expected: TokenKind) -> bool {
        if self.eat(&expected) {
            return true;
        }
        let error = ParseError::expected_token(&expected, self.peek(), self.current_span());
        self.errors.push(error);
        false
    }

    /// Check if we've reached the end of the token stream.
    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Get the current position in the token stream.
    pub fn current_pos(&self) -> usize {
        self.pos
    }

    /// End offset of the last consumed token (0 before the first).
    pub fn prev_end(&self) -> u32 {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(0, |t| t.span.end as u32)
    }

    /// Zero-width span right after the last consumed token.
    ///
    /// Used for synthesized nodes (missing operands, blank arguments) so they
    /// always sit inside the span of the construct being built.
    pub fn empty_span(&self) -> Span {
        Span::point(self.prev_end())
    }

    /// Span from the token at `start` through the last consumed token.
    pub fn span_from(&self, start: usize) -> Span {
        if self.pos <= start {
            return self.empty_span();
        }
        let start_byte = self.tokens.get(start).map_or(0, |t| t.span.start as u32);
        Span::new(start_byte, self.prev_end().max(start_byte))
    }

    /// Span of the current token, or an empty span at end of input.
    pub fn current_span(&self) -> Span {
        match self.tokens.get(self.pos) {
            Some(token) => Span::from(token.span.clone()),
            None => self.empty_span(),
        }
    }

    /// Allocate a node.
    pub fn node(&mut self, kind: ExprKind, span: Span) -> Arc<Expr> {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        Arc::new(Expr::new(id, kind, span))
    }

    /// Allocate a node spanning from the token at `start` to the last
    /// consumed token, widened to cover every child.
    ///
    /// Zero-width recovery children sit at the end of the previous token,
    /// which can precede `start` when whitespace separates them.
    pub fn node_from(&mut self, start: usize, kind: ExprKind) -> Arc<Expr> {
        let mut expr = Expr::new(NodeId(self.next_id), kind, self.span_from(start));
        self.next_id += 1;
        let span = expr
            .children()
            .iter()
            .fold(expr.span, |acc, child| acc.merge(&child.span));
        expr.span = span;
        Arc::new(expr)
    }

    /// Record `error` and return an `Error` node at its span.
    pub fn error_node(&mut self, error: ParseError) -> Arc<Expr> {
        let span = error.span;
        let message = error.message.clone();
        self.errors.push(error);
        self.node(ExprKind::Error(message), span)
    }

    /// Enter one nesting level. Past [`MAX_NESTING`] the rest of the
    /// enclosing construct is skipped and returned as an error node.
    pub fn descend(&mut self) -> Result<(), Arc<Expr>> {
        if self.depth >= MAX_NESTING {
            let at = self.current_span();
            let skipped = self.synchronize();
            let span = if skipped.is_empty() { at } else { skipped };
            return Err(self.error_node(ParseError::nested_too_deeply(span)));
        }
        self.depth += 1;
        Ok(())
    }

    /// Leave `levels` nesting levels entered with [`descend`](Self::descend).
    pub fn ascend(&mut self, levels: usize) {
        self.depth = self.depth.saturating_sub(levels);
    }

    pub fn record(&mut self, error: ParseError) {
        self.errors.push(error);
    }

    pub fn node_count(&self) -> u32 {
        self.next_id
    }

    /// Skip tokens until a list separator, closing delimiter or chain
    /// separator at nesting depth zero. Returns the skipped span.
    pub fn synchronize(&mut self) -> Span {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token {
                TokenKind::LParen | TokenKind::LBrace | TokenKind::LBracket | TokenKind::IslandStart => {
                    depth += 1
                }
                TokenKind::RParen | TokenKind::RBrace | TokenKind::RBracket | TokenKind::IslandEnd
                    if depth > 0 =>
                {
                    depth -= 1
                }
                TokenKind::RParen
                | TokenKind::RBrace
                | TokenKind::RBracket
                | TokenKind::IslandEnd
                | TokenKind::InterpEnd
                | TokenKind::ListSep
                | TokenKind::ChainSep
                    if depth == 0 =>
                {
                    break;
                }
                _ => {}
            }
            self.pos += 1;
        }
        self.span_from(start)
    }
}
