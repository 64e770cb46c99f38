//! FinanceQL recursive-descent parser.
//!
//! Precedence, lowest to highest:
//! pipe `|` -> OR -> AND -> NOT -> comparison -> additive -> multiplicative
//! -> unary `-` -> postfix range selector -> primary.
//!
//! Comparisons are non-associative: `a < b < c` fails as a trailing token
//! after the first comparison. `screener(...)` and `alert(...)` parse into
//! dedicated nodes so the filter AST stays introspectable.

use super::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use super::lexer::tokenize;
use super::token::{Pos, Token, TokenKind};
use crate::error::QlError;

/// Parse a complete expression; the entire input must be consumed.
pub fn parse(src: &str) -> Result<Expr, QlError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, index: 0 };
    let expr = parser.parse_expression()?;
    let trailing = parser.peek();
    if trailing.kind != TokenKind::Eof {
        return Err(parser.error_at(
            trailing.pos,
            format!("trailing token after expression: '{}'", trailing.literal),
            None,
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, QlError> {
        if self.peek().kind == kind {
            Ok(self.advance())
        } else {
            let token = self.peek().clone();
            Err(self.error_at(
                token.pos,
                format!("expected {what}, found '{}'", describe(&token)),
                None,
            ))
        }
    }

    fn error_at(&self, pos: Pos, message: String, hint: Option<String>) -> QlError {
        QlError::Parse { pos: pos.offset, line: pos.line, column: pos.column, message, hint }
    }

    // pipe: left-associative, lowest precedence
    fn parse_expression(&mut self) -> Result<Expr, QlError> {
        let mut left = self.parse_or()?;
        while self.peek().kind == TokenKind::Pipe {
            self.advance();
            let right = self.parse_or()?;
            let pos = left.pos;
            left = Expr::new(
                ExprKind::Pipe { left: Box::new(left), right: Box::new(right) },
                pos,
            );
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> Result<Expr, QlError> {
        let mut left = self.parse_and()?;
        while self.peek().kind == TokenKind::Or {
            self.advance();
            let right = self.parse_and()?;
            let pos = left.pos;
            left = Expr::new(
                ExprKind::Binary { op: BinaryOp::Or, left: Box::new(left), right: Box::new(right) },
                pos,
            );
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, QlError> {
        let mut left = self.parse_not()?;
        while self.peek().kind == TokenKind::And {
            self.advance();
            let right = self.parse_not()?;
            let pos = left.pos;
            left = Expr::new(
                ExprKind::Binary { op: BinaryOp::And, left: Box::new(left), right: Box::new(right) },
                pos,
            );
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, QlError> {
        if self.peek().kind == TokenKind::Not {
            let token = self.advance();
            let operand = self.parse_not()?;
            return Ok(Expr::new(
                ExprKind::Unary { op: UnaryOp::Not, operand: Box::new(operand) },
                token.pos,
            ));
        }
        self.parse_comparison()
    }

    // Non-associative: at most one comparison per level.
    fn parse_comparison(&mut self) -> Result<Expr, QlError> {
        let left = self.parse_additive()?;
        let op = match self.peek().kind {
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Ge => BinaryOp::Ge,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Eq => BinaryOp::Eq,
            TokenKind::Ne => BinaryOp::Ne,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_additive()?;
        let pos = left.pos;
        Ok(Expr::new(
            ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) },
            pos,
        ))
    }

    fn parse_additive(&mut self) -> Result<Expr, QlError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            let pos = left.pos;
            left = Expr::new(
                ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) },
                pos,
            );
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, QlError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            let pos = left.pos;
            left = Expr::new(
                ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) },
                pos,
            );
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, QlError> {
        if self.peek().kind == TokenKind::Minus {
            let token = self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::new(
                ExprKind::Unary { op: UnaryOp::Neg, operand: Box::new(operand) },
                token.pos,
            ));
        }
        self.parse_postfix()
    }

    /// A range selector may follow any primary: `price(X)[30d]`, `X[2w]`.
    fn parse_postfix(&mut self) -> Result<Expr, QlError> {
        let mut expr = self.parse_primary()?;
        while self.peek().kind == TokenKind::LBracket {
            self.advance();
            let (duration, days) = self.parse_duration()?;
            self.expect(TokenKind::RBracket, "']'")?;
            let pos = expr.pos;
            expr = Expr::new(
                ExprKind::Range { inner: Box::new(expr), duration, days },
                pos,
            );
        }
        Ok(expr)
    }

    fn parse_duration(&mut self) -> Result<(String, i64), QlError> {
        let token = self.peek().clone();
        let TokenKind::Number(value) = token.kind else {
            return Err(self.error_at(
                token.pos,
                format!("expected duration, found '{}'", describe(&token)),
                Some("write a window like [30d], [4w] or [1y]".into()),
            ));
        };
        self.advance();

        // Optional unit identifier directly after the number.
        let (literal, days) = if let TokenKind::Ident(unit) = &self.peek().kind {
            let unit = unit.clone();
            let factor = match unit.to_lowercase().as_str() {
                "d" => 1.0,
                "w" => 7.0,
                "mo" | "m" | "month" | "months" => 30.0,
                "y" | "yr" | "year" | "years" => 365.0,
                // Unknown units round the bare number.
                _ => {
                    self.advance();
                    let literal = format!("{}{}", token.literal, unit);
                    return Ok((literal, value.round() as i64));
                }
            };
            self.advance();
            (format!("{}{}", token.literal, unit), (value * factor).round() as i64)
        } else {
            (token.literal.clone(), value.round() as i64)
        };
        Ok((literal, days))
    }

    fn parse_primary(&mut self) -> Result<Expr, QlError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(value) => Ok(Expr::new(ExprKind::Number(value), token.pos)),
            TokenKind::Str(value) => Ok(Expr::new(ExprKind::Str(value), token.pos)),
            TokenKind::Star => Ok(Expr::new(ExprKind::PipeInput, token.pos)),
            TokenKind::LParen => {
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Ident(name) => {
                // Boolean literals surface as identifiers.
                match name.to_lowercase().as_str() {
                    "true" => return Ok(Expr::new(ExprKind::Bool(true), token.pos)),
                    "false" => return Ok(Expr::new(ExprKind::Bool(false), token.pos)),
                    _ => {}
                }
                if self.peek().kind != TokenKind::LParen {
                    return Ok(Expr::new(ExprKind::Ident(name), token.pos));
                }
                match name.to_lowercase().as_str() {
                    "screener" => self.parse_screener(token.pos),
                    "alert" => self.parse_alert(token.pos),
                    _ => self.parse_call(name, token.pos),
                }
            }
            _ => Err(self.error_at(
                token.pos,
                format!("unexpected token '{}'", describe(&token)),
                None,
            )),
        }
    }

    fn parse_call(&mut self, name: String, pos: Pos) -> Result<Expr, QlError> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if self.peek().kind != TokenKind::RParen {
            loop {
                args.push(self.parse_expression()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(Expr::new(ExprKind::Call { name, args }, pos))
    }

    fn parse_screener(&mut self, pos: Pos) -> Result<Expr, QlError> {
        self.expect(TokenKind::LParen, "'('")?;
        let filter = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')'")?;
        Ok(Expr::new(ExprKind::Screener { filter: Box::new(filter) }, pos))
    }

    fn parse_alert(&mut self, pos: Pos) -> Result<Expr, QlError> {
        self.expect(TokenKind::LParen, "'('")?;
        let condition = self.parse_expression()?;
        let message = if self.eat(&TokenKind::Comma) {
            let token = self.advance();
            match token.kind {
                TokenKind::Str(message) => Some(message),
                _ => {
                    return Err(self.error_at(
                        token.pos,
                        "alert message must be a string literal".into(),
                        Some("alert(condition, \"message\")".into()),
                    ))
                }
            }
        } else {
            None
        };
        self.expect(TokenKind::RParen, "')'")?;
        Ok(Expr::new(ExprKind::Alert { condition: Box::new(condition), message }, pos))
    }
}

fn describe(token: &Token) -> String {
    if token.kind == TokenKind::Eof {
        "end of input".to_string()
    } else {
        token.literal.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic_precedence() {
        let expr = parse("1 + 2 * 3").unwrap();
        assert_eq!(expr.to_string(), "(1 + (2 * 3))");
        let expr = parse("(10 + 5) * 2 - 3").unwrap();
        assert_eq!(expr.to_string(), "(((10 + 5) * 2) - 3)");
    }

    #[test]
    fn test_range_selector_on_call() {
        let expr = parse("price(RELIANCE)[30d]").unwrap();
        let ExprKind::Range { inner, duration, days } = &expr.kind else {
            panic!("expected range, got {expr:?}");
        };
        assert_eq!(duration, "30d");
        assert_eq!(*days, 30);
        let ExprKind::Call { name, args } = &inner.kind else {
            panic!("expected call inside range");
        };
        assert_eq!(name, "price");
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn test_duration_units() {
        let cases = [
            ("x[30]", 30),
            ("x[30d]", 30),
            ("x[4w]", 28),
            ("x[2mo]", 60),
            ("x[3m]", 90),
            ("x[1y]", 365),
            ("x[2years]", 730),
            // Unknown unit rounds the bare number.
            ("x[15q]", 15),
        ];
        for (src, expected) in cases {
            let expr = parse(src).unwrap();
            let ExprKind::Range { days, .. } = expr.kind else {
                panic!("{src}: expected range");
            };
            assert_eq!(days, expected, "{src}");
        }
    }

    #[test]
    fn test_comparison_non_associative() {
        let err = parse("1 < 2 < 3").unwrap_err();
        match err {
            QlError::Parse { message, .. } => assert!(message.contains("trailing token")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_close_paren_fails_at_column_1() {
        let err = parse(")").unwrap_err();
        match err {
            QlError::Parse { column, line, .. } => {
                assert_eq!(line, 1);
                assert_eq!(column, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_pipe_lowest_precedence() {
        let expr = parse("21 | double(*)").unwrap();
        let ExprKind::Pipe { left, right } = &expr.kind else {
            panic!("expected pipe");
        };
        assert_eq!(left.to_string(), "21");
        let ExprKind::Call { name, args } = &right.kind else {
            panic!("expected call on pipe right");
        };
        assert_eq!(name, "double");
        assert!(matches!(args[0].kind, ExprKind::PipeInput));
    }

    #[test]
    fn test_logical_ladder() {
        let expr = parse("not a > 1 and b < 2 or c == 3").unwrap();
        // NOT binds tighter than AND, AND tighter than OR.
        assert_eq!(expr.to_string(), "(((NOT (a > 1)) AND (b < 2)) OR (c == 3))");
    }

    #[test]
    fn test_screener_node() {
        let expr = parse("screener(pe(*) < 20 and roe(*) > 15)").unwrap();
        let ExprKind::Screener { filter } = &expr.kind else {
            panic!("expected screener node");
        };
        assert!(matches!(filter.kind, ExprKind::Binary { op: BinaryOp::And, .. }));
    }

    #[test]
    fn test_alert_node_with_message() {
        let expr = parse("alert(rsi(TCS, 14) > 70, 'overbought')").unwrap();
        let ExprKind::Alert { condition, message } = &expr.kind else {
            panic!("expected alert node");
        };
        assert!(matches!(condition.kind, ExprKind::Binary { .. }));
        assert_eq!(message.as_deref(), Some("overbought"));

        let expr = parse("alert(price(TCS) > 4000)").unwrap();
        let ExprKind::Alert { message, .. } = &expr.kind else { panic!() };
        assert!(message.is_none());
    }

    #[test]
    fn test_alert_message_must_be_string() {
        let err = parse("alert(true, 42)").unwrap_err();
        match err {
            QlError::Parse { message, .. } => {
                assert!(message.contains("string literal"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_bool_literals() {
        assert!(matches!(parse("true").unwrap().kind, ExprKind::Bool(true)));
        assert!(matches!(parse("FALSE").unwrap().kind, ExprKind::Bool(false)));
    }

    #[test]
    fn test_unary_minus() {
        let expr = parse("-5 + 3").unwrap();
        assert_eq!(expr.to_string(), "((-5) + 3)");
    }

    #[test]
    fn test_display_round_trip() {
        let sources = [
            "(10 + 5) * 2 - 3",
            "price(RELIANCE)[30d] > sma(RELIANCE, 50)",
            "screener(pe(*) < 20)",
            "alert(rsi(TCS, 14) > 70, \"overbought\")",
            "21 | double(*)",
            "not true and false",
        ];
        for src in sources {
            let first = parse(src).unwrap();
            let second = parse(&first.to_string()).unwrap();
            assert_eq!(first.to_string(), second.to_string(), "{src}");
        }
    }

    #[test]
    fn test_indian_scale_in_expression() {
        let expr = parse("market_cap(TCS) > 5cr").unwrap();
        let ExprKind::Binary { right, .. } = &expr.kind else { panic!() };
        assert!(matches!(right.kind, ExprKind::Number(v) if v == 5e7));
    }
}
