// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Lexical analysis for the formula language.
//!
//! # Design
//!
//! - `Raw`: culture-independent atoms recognized by logos
//! - [`Tokenizer`]: lazy iterator that finishes string bodies, quoted
//!   identifiers and comments, resolves separators against the [`Culture`],
//!   and tracks interpolated-string islands on a mode stack
//! - Malformed input becomes [`TokenKind::Error`] tokens; the tokenizer never
//!   fails and never panics
//!
//! # Examples
//!
//! ```
//! # use formula_lexer::*;
//! let kinds: Vec<TokenKind> = tokenize("Sum(1, 2)", Culture::Invariant)
//!     .into_iter()
//!     .map(|t| t.kind)
//!     .collect();
//! assert_eq!(kinds.len(), 6);
//! ```

mod raw;
mod token;
mod tokenizer;

pub use token::{Culture, LexError, Token, TokenKind};
pub use tokenizer::{Tokenizer, tokenize};

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn lex(source: &str) -> Vec<TokenKind> {
        tokenize(source, Culture::Invariant)
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn ident(name: &str) -> TokenKind {
        TokenKind::Ident {
            name: Rc::from(name),
            quoted: false,
        }
    }

    fn num(text: &str) -> TokenKind {
        TokenKind::Number(Rc::from(text))
    }

    #[test]
    fn test_numbers_with_exponents() {
        assert_eq!(
            lex("2e-3 1.5 .25 10E+2"),
            vec![num("2e-3"), num("1.5"), num(".25"), num("10E+2")]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            lex("+ - * / ^ & = <> < <= > >= && || !"),
            vec![
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Caret,
                TokenKind::Ampersand,
                TokenKind::Eq,
                TokenKind::NotEq,
                TokenKind::Lt,
                TokenKind::LtEq,
                TokenKind::Gt,
                TokenKind::GtEq,
                TokenKind::AmpAmp,
                TokenKind::PipePipe,
                TokenKind::Bang,
            ]
        );
    }

    #[test]
    fn test_keywords_are_case_sensitive() {
        assert_eq!(
            lex("And and true True"),
            vec![TokenKind::And, ident("and"), TokenKind::True, ident("True")]
        );
    }

    #[test]
    fn test_string_with_escaped_quote() {
        assert_eq!(
            lex(r#""say ""hi""""#),
            vec![TokenKind::Str(Rc::from(r#"say "hi""#))]
        );
    }

    #[test]
    fn test_unterminated_string_is_error_token() {
        let tokens = lex(r#"1 & "abc"#);
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[2], TokenKind::Error(LexError::UnterminatedString));
    }

    #[test]
    fn test_quoted_identifier() {
        assert_eq!(
            lex("'First Name'.x"),
            vec![
                TokenKind::Ident {
                    name: Rc::from("First Name"),
                    quoted: true
                },
                TokenKind::Dot,
                ident("x"),
            ]
        );
    }

    #[test]
    fn test_comments_are_tokens() {
        let tokens = lex("1 // trailing\n + /* block */ 2");
        assert_eq!(
            tokens,
            vec![
                num("1"),
                TokenKind::Comment(Rc::from("// trailing")),
                TokenKind::Plus,
                TokenKind::Comment(Rc::from("/* block */")),
                num("2"),
            ]
        );
    }

    #[test]
    fn test_unterminated_comment() {
        assert_eq!(
            lex("1 /* never closed"),
            vec![num("1"), TokenKind::Error(LexError::UnterminatedComment)]
        );
    }

    #[test]
    fn test_invariant_separators() {
        assert_eq!(
            lex("F(1,2);G()"),
            vec![
                ident("F"),
                TokenKind::LParen,
                num("1"),
                TokenKind::ListSep,
                num("2"),
                TokenKind::RParen,
                TokenKind::ChainSep,
                ident("G"),
                TokenKind::LParen,
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn test_comma_decimal_separators() {
        let kinds: Vec<TokenKind> = tokenize("F(1,5;2);;G()", Culture::CommaDecimal)
            .into_iter()
            .map(|t| t.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                ident("F"),
                TokenKind::LParen,
                num("1.5"),
                TokenKind::ListSep,
                num("2"),
                TokenKind::RParen,
                TokenKind::ChainSep,
                ident("G"),
                TokenKind::LParen,
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn test_comma_decimal_exponent() {
        let kinds: Vec<TokenKind> = tokenize("2,5e3", Culture::CommaDecimal)
            .into_iter()
            .map(|t| t.kind)
            .collect();
        assert_eq!(kinds, vec![num("2.5e3")]);
    }

    #[test]
    fn test_string_interpolation_islands() {
        assert_eq!(
            lex(r#"$"a{x}b{{c""""#),
            vec![
                TokenKind::InterpStart,
                TokenKind::InterpText(Rc::from("a")),
                TokenKind::IslandStart,
                ident("x"),
                TokenKind::IslandEnd,
                TokenKind::InterpText(Rc::from("b{c\"")),
                TokenKind::InterpEnd,
            ]
        );
    }

    #[test]
    fn test_island_with_record_braces() {
        assert_eq!(
            lex(r#"$"{ {a:1}.a }""#),
            vec![
                TokenKind::InterpStart,
                TokenKind::IslandStart,
                TokenKind::LBrace,
                ident("a"),
                TokenKind::Colon,
                num("1"),
                TokenKind::RBrace,
                TokenKind::Dot,
                ident("a"),
                TokenKind::IslandEnd,
                TokenKind::InterpEnd,
            ]
        );
    }

    #[test]
    fn test_nested_interpolation() {
        let tokens = lex(r#"$"x{$"y{1}"}""#);
        assert_eq!(tokens.first(), Some(&TokenKind::InterpStart));
        assert_eq!(tokens.last(), Some(&TokenKind::InterpEnd));
        assert_eq!(
            tokens
                .iter()
                .filter(|t| **t == TokenKind::InterpStart)
                .count(),
            2
        );
    }

    #[test]
    fn test_unterminated_interpolation() {
        let tokens = lex(r#"$"abc{1"#);
        assert_eq!(
            tokens.last(),
            Some(&TokenKind::Error(LexError::UnterminatedString))
        );
    }

    #[test]
    fn test_unknown_char_is_error_and_lexing_continues() {
        assert_eq!(
            lex("1 # 2"),
            vec![
                num("1"),
                TokenKind::Error(LexError::UnexpectedChar('#')),
                num("2")
            ]
        );
    }

    #[test]
    fn test_non_ascii_unknown_char() {
        assert_eq!(
            lex("1 § 2"),
            vec![
                num("1"),
                TokenKind::Error(LexError::UnexpectedChar('§')),
                num("2")
            ]
        );
    }

    #[test]
    fn test_restart_from_checkpoint() {
        let src = "Sum(a, b) + Max(c)";
        let mut tokenizer = Tokenizer::new(src, Culture::Invariant);
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(tokenizer.next().unwrap());
        }
        let offset = tokenizer.checkpoint().unwrap();
        let resumed: Vec<Token> = Tokenizer::from_checkpoint(src, Culture::Invariant, offset).collect();
        let remaining: Vec<Token> = tokenizer.collect();
        assert_eq!(resumed, remaining);
        assert_eq!(resumed[0].kind, TokenKind::Plus);
    }

    #[test]
    fn test_no_checkpoint_inside_interpolation() {
        let mut tokenizer = Tokenizer::new(r#"$"a{1}""#, Culture::Invariant);
        tokenizer.next();
        assert_eq!(tokenizer.checkpoint(), None);
    }

    #[test]
    fn test_spans_cover_source() {
        let tokens = tokenize("abc + 12", Culture::Invariant);
        assert_eq!(tokens[0].span, 0..3);
        assert_eq!(tokens[1].span, 4..5);
        assert_eq!(tokens[2].span, 6..8);
    }
}
