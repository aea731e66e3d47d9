//! Mode-aware tokenizer on top of the raw logos token set.
//!
//! The tokenizer keeps a small mode stack so interpolated strings can nest
//! islands that contain arbitrary sub-expressions (including further
//! interpolated strings and record literals with their own braces).

use crate::raw::Raw;
use crate::token::{Culture, LexError, Token, TokenKind};
use logos::Logos;
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Ordinary expression text. `island` is set inside `{ }` of an
    /// interpolated string; `depth` counts open record braces in that island.
    Code { depth: u32, island: bool },
    /// Literal text of an interpolated string.
    InterpText,
}

const TOP: Mode = Mode::Code {
    depth: 0,
    island: false,
};

/// Lazy, restartable tokenizer.
///
/// Never panics on malformed input: problems come out as
/// [`TokenKind::Error`] tokens and tokenizing continues after them.
pub struct Tokenizer<'src> {
    src: &'src str,
    pos: usize,
    culture: Culture,
    modes: Vec<Mode>,
    pending: VecDeque<Token>,
}

impl<'src> Tokenizer<'src> {
    pub fn new(src: &'src str, culture: Culture) -> Self {
        Self::from_checkpoint(src, culture, 0)
    }

    /// Start tokenizing at `offset`.
    ///
    /// The offset should come from [`Tokenizer::checkpoint`] (or be a token
    /// start outside any string); restarting inside a string literal lexes the
    /// remainder as code.
    pub fn from_checkpoint(src: &'src str, culture: Culture, offset: usize) -> Self {
        let mut pos = offset.min(src.len());
        while !src.is_char_boundary(pos) {
            pos -= 1;
        }
        Self {
            src,
            pos,
            culture,
            modes: vec![TOP],
            pending: VecDeque::new(),
        }
    }

    /// Offset from which a fresh tokenizer reproduces the remaining tokens,
    /// or `None` while inside an interpolated string.
    pub fn checkpoint(&self) -> Option<usize> {
        (self.pending.is_empty() && self.modes.len() == 1).then_some(self.pos)
    }

    fn mode(&self) -> Mode {
        self.modes.last().copied().unwrap_or(TOP)
    }

    fn lex_code(&mut self) -> Option<Token> {
        let src = self.src;
        let rest = &src[self.pos..];
        let mut lex = Raw::lexer(rest);
        let raw = lex.next()?;
        let range = lex.span();
        let start = self.pos + range.start;
        self.pos += range.end;

        let kind = match raw {
            Err(()) => {
                let c = rest[range.start..].chars().next().unwrap_or('\u{FFFD}');
                // Resync on a char boundary whatever logos consumed.
                self.pos = start + c.len_utf8();
                TokenKind::Error(LexError::UnexpectedChar(c))
            }
            Ok(raw) => self.finish_raw(raw, lex.slice()),
        };
        Some(Token::new(kind, start..self.pos))
    }

    fn finish_raw(&mut self, raw: Raw, slice: &str) -> TokenKind {
        match raw {
            Raw::LineComment => TokenKind::Comment(Rc::from(slice)),
            Raw::BlockCommentStart => match self.src[self.pos..].find("*/") {
                Some(i) => {
                    let body_start = self.pos - 2;
                    self.pos += i + 2;
                    TokenKind::Comment(Rc::from(&self.src[body_start..self.pos]))
                }
                None => {
                    self.pos = self.src.len();
                    TokenKind::Error(LexError::UnterminatedComment)
                }
            },
            Raw::Quote => match self.scan_quoted('"') {
                Some(s) => TokenKind::Str(Rc::from(s.as_str())),
                None => TokenKind::Error(LexError::UnterminatedString),
            },
            Raw::SingleQuote => match self.scan_quoted('\'') {
                Some(s) => TokenKind::Ident {
                    name: Rc::from(s.as_str()),
                    quoted: true,
                },
                None => TokenKind::Error(LexError::UnterminatedIdentifier),
            },
            Raw::InterpStart => {
                self.modes.push(Mode::InterpText);
                TokenKind::InterpStart
            }
            Raw::Number => TokenKind::Number(Rc::from(self.finish_number(slice).as_str())),
            Raw::Ident => TokenKind::Ident {
                name: Rc::from(slice),
                quoted: false,
            },
            Raw::True => TokenKind::True,
            Raw::False => TokenKind::False,
            Raw::And => TokenKind::And,
            Raw::Or => TokenKind::Or,
            Raw::Not => TokenKind::Not,
            Raw::In => TokenKind::In,
            Raw::ExactIn => TokenKind::ExactIn,
            Raw::As => TokenKind::As,
            Raw::SelfKw => TokenKind::SelfKw,
            Raw::Parent => TokenKind::Parent,
            Raw::Plus => TokenKind::Plus,
            Raw::Minus => TokenKind::Minus,
            Raw::Star => TokenKind::Star,
            Raw::Slash => TokenKind::Slash,
            Raw::Caret => TokenKind::Caret,
            Raw::Ampersand => TokenKind::Ampersand,
            Raw::Percent => TokenKind::Percent,
            Raw::Eq => TokenKind::Eq,
            Raw::NotEq => TokenKind::NotEq,
            Raw::Lt => TokenKind::Lt,
            Raw::LtEq => TokenKind::LtEq,
            Raw::Gt => TokenKind::Gt,
            Raw::GtEq => TokenKind::GtEq,
            Raw::AmpAmp => TokenKind::AmpAmp,
            Raw::PipePipe => TokenKind::PipePipe,
            Raw::Bang => TokenKind::Bang,
            Raw::Dot => TokenKind::Dot,
            Raw::At => TokenKind::At,
            Raw::Colon => TokenKind::Colon,
            Raw::Comma => match self.culture {
                Culture::Invariant => TokenKind::ListSep,
                Culture::CommaDecimal => TokenKind::Error(LexError::MisplacedSeparator(',')),
            },
            Raw::Semicolon => match self.culture {
                Culture::Invariant => TokenKind::ChainSep,
                Culture::CommaDecimal => TokenKind::ListSep,
            },
            Raw::DoubleSemicolon => TokenKind::ChainSep,
            Raw::LParen => TokenKind::LParen,
            Raw::RParen => TokenKind::RParen,
            Raw::LBracket => TokenKind::LBracket,
            Raw::RBracket => TokenKind::RBracket,
            Raw::LBrace => {
                if let Some(Mode::Code { depth, .. }) = self.modes.last_mut() {
                    *depth += 1;
                }
                TokenKind::LBrace
            }
            Raw::RBrace => match self.modes.last_mut() {
                Some(Mode::Code {
                    depth: 0,
                    island: true,
                }) => {
                    self.modes.pop();
                    TokenKind::IslandEnd
                }
                Some(Mode::Code { depth, .. }) => {
                    *depth = depth.saturating_sub(1);
                    TokenKind::RBrace
                }
                _ => TokenKind::RBrace,
            },
        }
    }

    /// Normalize a numeric literal, absorbing a `,fraction` tail in
    /// comma-decimal cultures.
    fn finish_number(&mut self, slice: &str) -> String {
        let mut text = slice.to_string();
        if self.culture != Culture::CommaDecimal || slice.contains(['.', 'e', 'E']) {
            return text;
        }
        let src = self.src;
        let rest = &src[self.pos..];
        let mut chars = rest.char_indices();
        if !matches!(chars.next(), Some((_, ','))) {
            return text;
        }
        let digits: usize = rest[1..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .count();
        if digits == 0 {
            return text;
        }
        text.push('.');
        text.push_str(&rest[1..1 + digits]);
        let mut consumed = 1 + digits;

        let tail = &rest[consumed..];
        if let Some(exp) = tail.strip_prefix(['e', 'E']) {
            let sign = usize::from(exp.starts_with(['+', '-']));
            let exp_digits = exp[sign..].chars().take_while(|c| c.is_ascii_digit()).count();
            if exp_digits > 0 {
                text.push_str(&tail[..1 + sign + exp_digits]);
                consumed += 1 + sign + exp_digits;
            }
        }
        self.pos += consumed;
        text
    }

    /// Scan a quoted body whose opening quote was already consumed. A doubled
    /// quote is an escaped quote. Returns `None` when input ends first.
    fn scan_quoted(&mut self, quote: char) -> Option<String> {
        let mut out = String::new();
        let mut chars = self.src[self.pos..].char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == quote {
                if matches!(chars.peek(), Some((_, n)) if *n == quote) {
                    chars.next();
                    out.push(quote);
                    continue;
                }
                self.pos += i + c.len_utf8();
                return Some(out);
            }
            out.push(c);
        }
        self.pos = self.src.len();
        None
    }

    fn lex_interp_text(&mut self) -> Option<Token> {
        let src = self.src;
        let start = self.pos;
        let rest = &src[start..];
        let mut text = String::new();
        let mut chars = rest.char_indices().peekable();

        while let Some((i, c)) = chars.next() {
            let doubled = matches!(chars.peek(), Some((_, n)) if *n == c);
            match c {
                '"' | '{' | '}' if doubled => {
                    chars.next();
                    text.push(c);
                }
                '"' => {
                    self.push_text(start, start + i, text);
                    self.modes.pop();
                    self.pending
                        .push_back(Token::new(TokenKind::InterpEnd, start + i..start + i + 1));
                    self.pos = start + i + 1;
                    return self.pending.pop_front();
                }
                '{' => {
                    self.push_text(start, start + i, text);
                    self.modes.push(Mode::Code {
                        depth: 0,
                        island: true,
                    });
                    self.pending
                        .push_back(Token::new(TokenKind::IslandStart, start + i..start + i + 1));
                    self.pos = start + i + 1;
                    return self.pending.pop_front();
                }
                _ => text.push(c),
            }
        }

        let end = self.src.len();
        self.push_text(start, end, text);
        self.pending.push_back(Token::new(
            TokenKind::Error(LexError::UnterminatedString),
            end..end,
        ));
        self.modes.truncate(1);
        self.pos = end;
        self.pending.pop_front()
    }

    fn push_text(&mut self, start: usize, end: usize, text: String) {
        if !text.is_empty() {
            self.pending.push_back(Token::new(
                TokenKind::InterpText(Rc::from(text.as_str())),
                start..end,
            ));
        }
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if let Some(token) = self.pending.pop_front() {
            return Some(token);
        }
        match self.mode() {
            Mode::InterpText => self.lex_interp_text(),
            Mode::Code { .. } => match self.lex_code() {
                Some(token) => Some(token),
                None if self.modes.len() > 1 => {
                    // Input ended inside an island.
                    self.modes.truncate(1);
                    let end = self.src.len();
                    Some(Token::new(
                        TokenKind::Error(LexError::UnterminatedString),
                        end..end,
                    ))
                }
                None => None,
            },
        }
    }
}

/// Tokenize a whole formula.
pub fn tokenize(src: &str, culture: Culture) -> Vec<Token> {
    Tokenizer::new(src, culture).collect()
}
