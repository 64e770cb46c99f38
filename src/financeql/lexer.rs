//! FinanceQL lexer.
//!
//! Byte-wise scanner over UTF-8 source. Notable rules:
//! - Numbers accept Indian-scale suffixes: `cr`/`crore` (1e7) and `l`/`lakh`
//!   (1e5). When trailing letters turn out not to be a known suffix the
//!   scanner rolls back and recomputes line/column from the start of the
//!   source; rollback is rare enough that the O(pos) recompute is fine.
//! - `=` is silently lexed as `==`.
//! - `#` starts a comment running to end of line.
//! - `!` not followed by `=` is a lex error.
//! - `true`/`false` emerge as identifiers; the parser turns them into
//!   boolean literals.

use super::token::{Pos, Token, TokenKind};
use crate::error::QlError;

pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, bytes: src.as_bytes(), pos: 0, line: 1, column: 1 }
    }

    /// Scan the whole source into a token stream terminated by Eof.
    pub fn tokenize(mut self) -> Result<Vec<Token>, QlError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn here(&self) -> Pos {
        Pos { offset: self.pos, line: self.line, column: self.column }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(b)
    }

    /// Rewind to `target` and recompute line/column by rescanning from the
    /// start. O(pos), acceptable because suffix rollback is rare.
    fn rollback_to(&mut self, target: usize) {
        self.pos = 0;
        self.line = 1;
        self.column = 1;
        while self.pos < target {
            self.bump();
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => {
                    self.bump();
                }
                Some(b'#') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => return,
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, QlError> {
        self.skip_trivia();
        let pos = self.here();

        let Some(b) = self.peek() else {
            return Ok(Token::new(TokenKind::Eof, "", pos));
        };

        match b {
            b'0'..=b'9' => self.lex_number(pos),
            b'"' | b'\'' => self.lex_string(pos),
            b if b.is_ascii_alphabetic() || b == b'_' => Ok(self.lex_ident(pos)),
            b'+' => self.single(TokenKind::Plus, "+", pos),
            b'-' => self.single(TokenKind::Minus, "-", pos),
            b'*' => self.single(TokenKind::Star, "*", pos),
            b'/' => self.single(TokenKind::Slash, "/", pos),
            b'(' => self.single(TokenKind::LParen, "(", pos),
            b')' => self.single(TokenKind::RParen, ")", pos),
            b'[' => self.single(TokenKind::LBracket, "[", pos),
            b']' => self.single(TokenKind::RBracket, "]", pos),
            b',' => self.single(TokenKind::Comma, ",", pos),
            b'|' => self.single(TokenKind::Pipe, "|", pos),
            b'>' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    Ok(Token::new(TokenKind::Ge, ">=", pos))
                } else {
                    Ok(Token::new(TokenKind::Gt, ">", pos))
                }
            }
            b'<' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    Ok(Token::new(TokenKind::Le, "<=", pos))
                } else {
                    Ok(Token::new(TokenKind::Lt, "<", pos))
                }
            }
            b'=' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    Ok(Token::new(TokenKind::Eq, "==", pos))
                } else {
                    // Single = means equality here.
                    Ok(Token::new(TokenKind::Eq, "=", pos))
                }
            }
            b'!' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    Ok(Token::new(TokenKind::Ne, "!=", pos))
                } else {
                    Err(QlError::Parse {
                        pos: pos.offset,
                        line: pos.line,
                        column: pos.column,
                        message: "unexpected '!'".into(),
                        hint: Some("did you mean '!='?".into()),
                    })
                }
            }
            other => Err(QlError::Parse {
                pos: pos.offset,
                line: pos.line,
                column: pos.column,
                message: format!("unexpected character '{}'", other as char),
                hint: None,
            }),
        }
    }

    fn single(&mut self, kind: TokenKind, literal: &str, pos: Pos) -> Result<Token, QlError> {
        self.bump();
        Ok(Token::new(kind, literal, pos))
    }

    fn lex_number(&mut self, pos: Pos) -> Result<Token, QlError> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b) if b.is_ascii_digit()) {
            self.bump();
            while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                self.bump();
            }
        }
        let digits_end = self.pos;
        let digits = &self.src[start..digits_end];
        let value: f64 = digits.parse().map_err(|_| QlError::Parse {
            pos: pos.offset,
            line: pos.line,
            column: pos.column,
            message: format!("malformed number '{digits}'"),
            hint: None,
        })?;

        // Indian-scale suffix attempt: consume trailing letters and check
        // them against the known forms; roll back when they are something
        // else (a unit like `30d`, or an adjoining identifier).
        let suffix_start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_alphabetic()) {
            self.bump();
        }
        let suffix = self.src[suffix_start..self.pos].to_lowercase();
        let multiplier = match suffix.as_str() {
            "" => None,
            "cr" | "crore" => Some(1e7),
            "l" | "lakh" => Some(1e5),
            _ => {
                self.rollback_to(suffix_start);
                None
            }
        };

        let (value, literal_end) = match multiplier {
            Some(m) => (value * m, self.pos),
            None => (value, digits_end),
        };
        Ok(Token::new(TokenKind::Number(value), &self.src[start..literal_end], pos))
    }

    fn lex_string(&mut self, pos: Pos) -> Result<Token, QlError> {
        let quote = self.bump().expect("string opener");
        // Collected as bytes so multi-byte UTF-8 sequences survive intact.
        let mut out: Vec<u8> = Vec::new();
        loop {
            match self.bump() {
                None => {
                    return Err(QlError::Parse {
                        pos: pos.offset,
                        line: pos.line,
                        column: pos.column,
                        message: "unterminated string".into(),
                        hint: None,
                    })
                }
                Some(b) if b == quote => break,
                Some(b'\\') => match self.bump() {
                    Some(b'n') => out.push(b'\n'),
                    Some(b't') => out.push(b'\t'),
                    Some(b'\\') => out.push(b'\\'),
                    Some(b'"') => out.push(b'"'),
                    Some(b'\'') => out.push(b'\''),
                    // Unknown escapes pass through literally.
                    Some(other) => {
                        out.push(b'\\');
                        out.push(other);
                    }
                    None => {
                        return Err(QlError::Parse {
                            pos: pos.offset,
                            line: pos.line,
                            column: pos.column,
                            message: "unterminated string".into(),
                            hint: None,
                        })
                    }
                },
                Some(b) => out.push(b),
            }
        }
        let literal = self.src[pos.offset..self.pos].to_string();
        Ok(Token::new(
            TokenKind::Str(String::from_utf8_lossy(&out).into_owned()),
            literal,
            pos,
        ))
    }

    fn lex_ident(&mut self, pos: Pos) -> Token {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'_') {
            self.bump();
        }
        let text = &self.src[start..self.pos];
        let kind = match text.to_lowercase().as_str() {
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            _ => TokenKind::Ident(text.to_string()),
        };
        Token::new(kind, text, pos)
    }
}

/// Convenience wrapper.
pub fn tokenize(src: &str) -> Result<Vec<Token>, QlError> {
    Lexer::new(src).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_basic_expression() {
        assert_eq!(
            kinds("(10 + 5) * 2"),
            vec![
                TokenKind::LParen,
                TokenKind::Number(10.0),
                TokenKind::Plus,
                TokenKind::Number(5.0),
                TokenKind::RParen,
                TokenKind::Star,
                TokenKind::Number(2.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_indian_scale_suffixes() {
        assert_eq!(kinds("5cr"), vec![TokenKind::Number(5e7), TokenKind::Eof]);
        assert_eq!(kinds("2crore"), vec![TokenKind::Number(2e7), TokenKind::Eof]);
        assert_eq!(kinds("3l"), vec![TokenKind::Number(3e5), TokenKind::Eof]);
        assert_eq!(kinds("1.5lakh"), vec![TokenKind::Number(1.5e5), TokenKind::Eof]);
        assert_eq!(kinds("5CR"), vec![TokenKind::Number(5e7), TokenKind::Eof]);
    }

    #[test]
    fn test_suffix_rollback_for_units() {
        // `30d` is a number and an identifier, not a failed suffix.
        assert_eq!(
            kinds("30d"),
            vec![TokenKind::Number(30.0), TokenKind::Ident("d".into()), TokenKind::Eof]
        );
        assert_eq!(
            kinds("2mo"),
            vec![TokenKind::Number(2.0), TokenKind::Ident("mo".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_rollback_preserves_positions() {
        let tokens = tokenize("1x 2").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Ident("x".into()));
        assert_eq!(tokens[1].pos.column, 2);
        assert_eq!(tokens[2].kind, TokenKind::Number(2.0));
        assert_eq!(tokens[2].pos.column, 4);
    }

    #[test]
    fn test_equals_is_equality() {
        assert_eq!(
            kinds("a = 1"),
            vec![TokenKind::Ident("a".into()), TokenKind::Eq, TokenKind::Number(1.0), TokenKind::Eof]
        );
        assert_eq!(
            kinds("a == 1"),
            vec![TokenKind::Ident("a".into()), TokenKind::Eq, TokenKind::Number(1.0), TokenKind::Eof]
        );
    }

    #[test]
    fn test_bang_without_equals_is_error() {
        let err = tokenize("!true").unwrap_err();
        match err {
            QlError::Parse { column, hint, .. } => {
                assert_eq!(column, 1);
                assert!(hint.unwrap().contains("!="));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(
            kinds(r#""hello\nworld""#),
            vec![TokenKind::Str("hello\nworld".into()), TokenKind::Eof]
        );
        assert_eq!(kinds("'single'"), vec![TokenKind::Str("single".into()), TokenKind::Eof]);
        // Unknown escape passes through literally.
        assert_eq!(kinds(r#""a\qb""#), vec![TokenKind::Str("a\\qb".into()), TokenKind::Eof]);
    }

    #[test]
    fn test_comments_stripped() {
        assert_eq!(
            kinds("1 # the rest is ignored\n+ 2"),
            vec![TokenKind::Number(1.0), TokenKind::Plus, TokenKind::Number(2.0), TokenKind::Eof]
        );
    }

    #[test]
    fn test_keywords_case_insensitive() {
        assert_eq!(kinds("AND or Not"), vec![TokenKind::And, TokenKind::Or, TokenKind::Not, TokenKind::Eof]);
    }

    #[test]
    fn test_comparison_operators() {
        assert_eq!(
            kinds(">= <= != > <"),
            vec![
                TokenKind::Ge,
                TokenKind::Le,
                TokenKind::Ne,
                TokenKind::Gt,
                TokenKind::Lt,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_line_and_column_tracking() {
        let tokens = tokenize("1 +\n  2").unwrap();
        assert_eq!(tokens[0].pos.line, 1);
        assert_eq!(tokens[2].pos.line, 2);
        assert_eq!(tokens[2].pos.column, 3);
    }

    #[test]
    fn test_round_trip_lex() {
        // Re-emitting literals with spaces re-lexes to the same kinds.
        let src = "price ( RELIANCE ) [ 30 d ] > 100.5 and \"x\" != 'y'";
        let tokens = tokenize(src).unwrap();
        let emitted: Vec<String> =
            tokens.iter().filter(|t| t.kind != TokenKind::Eof).map(|t| t.literal.clone()).collect();
        let relexed = tokenize(&emitted.join(" ")).unwrap();
        let a: Vec<&TokenKind> = tokens.iter().map(|t| &t.kind).collect();
        let b: Vec<&TokenKind> = relexed.iter().map(|t| &t.kind).collect();
        assert_eq!(a, b);
    }
}
