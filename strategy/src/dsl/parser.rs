use super::ast::{Action, ArithOp, CompareOp, Condition, Expr, Field, Indicator, Program, Rule};
use super::lexer::{lex, Token};
use crate::DslError;
use rust_decimal::Decimal;
use std::str::FromStr;

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

/// Parses a restricted rule language into a [`Program`]:
///
/// ```text
/// IF close > sma(20) AND close > open THEN BUY 10;
/// IF crossover(close, sma(20)) THEN SELL 10;
/// ```
///
/// Deliberately small: arithmetic/comparison over candle fields, two
/// indicators (`sma`, `rsi`), and a `crossover` test, per the Design Notes —
/// the DSL only needs to express simple entry/exit conditions, not arbitrary
/// computation.
pub fn parse(source: &str) -> Result<Program, DslError> {
    let tokens = lex(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut rules = Vec::new();
    while parser.pos < parser.tokens.len() {
        rules.push(parser.parse_rule()?);
        parser.eat_optional_semicolons();
    }
    Ok(Program { rules })
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn pos_of(&self) -> usize {
        self.tokens.get(self.pos).map(|(p, _)| *p).unwrap_or(0)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        t
    }

    fn eat_optional_semicolons(&mut self) {
        while matches!(self.peek(), Some(Token::Semicolon)) {
            self.pos += 1;
        }
    }

    fn expect_keyword(&mut self, word: &str) -> Result<(), DslError> {
        match self.advance() {
            Some(Token::Ident(ref s)) if s.eq_ignore_ascii_case(word) => Ok(()),
            _ => Err(DslError::Parse {
                pos: self.pos_of(),
                message: format!("expected '{word}'"),
            }),
        }
    }

    fn parse_rule(&mut self) -> Result<Rule, DslError> {
        self.expect_keyword("IF")?;
        let condition = self.parse_or()?;
        self.expect_keyword("THEN")?;
        let action = match self.advance() {
            Some(Token::Ident(ref s)) if s.eq_ignore_ascii_case("buy") => Action::Buy,
            Some(Token::Ident(ref s)) if s.eq_ignore_ascii_case("sell") => Action::Sell,
            _ => {
                return Err(DslError::Parse {
                    pos: self.pos_of(),
                    message: "expected BUY or SELL".into(),
                })
            }
        };
        let quantity = self.parse_number()?;
        Ok(Rule {
            condition,
            action,
            quantity,
        })
    }

    fn parse_or(&mut self) -> Result<Condition, DslError> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Ident(s)) if s.eq_ignore_ascii_case("or")) {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = Condition::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Condition, DslError> {
        let mut lhs = self.parse_condition_primary()?;
        while matches!(self.peek(), Some(Token::Ident(s)) if s.eq_ignore_ascii_case("and")) {
            self.pos += 1;
            let rhs = self.parse_condition_primary()?;
            lhs = Condition::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_condition_primary(&mut self) -> Result<Condition, DslError> {
        if matches!(self.peek(), Some(Token::Ident(s)) if s.eq_ignore_ascii_case("crossover")) {
            self.pos += 1;
            self.expect(Token::LParen)?;
            let a = self.parse_expr()?;
            self.expect(Token::Comma)?;
            let b = self.parse_expr()?;
            self.expect(Token::RParen)?;
            return Ok(Condition::Crossover(a, b));
        }
        let lhs = self.parse_expr()?;
        let op = match self.advance() {
            Some(Token::Gt) => CompareOp::Gt,
            Some(Token::Gte) => CompareOp::Gte,
            Some(Token::Lt) => CompareOp::Lt,
            Some(Token::Lte) => CompareOp::Lte,
            Some(Token::Eq) => CompareOp::Eq,
            _ => {
                return Err(DslError::Parse {
                    pos: self.pos_of(),
                    message: "expected a comparison operator".into(),
                })
            }
        };
        let rhs = self.parse_expr()?;
        Ok(Condition::Compare(op, lhs, rhs))
    }

    fn expect(&mut self, expected: Token) -> Result<(), DslError> {
        match self.advance() {
            Some(t) if t == expected => Ok(()),
            _ => Err(DslError::Parse {
                pos: self.pos_of(),
                message: format!("expected {expected:?}"),
            }),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, DslError> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_term()?;
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, DslError> {
        let mut lhs = self.parse_primary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => ArithOp::Mul,
                Some(Token::Slash) => ArithOp::Div,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_primary()?;
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_primary(&mut self) -> Result<Expr, DslError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(
                Decimal::from_str(&n).map_err(|_| DslError::Parse {
                    pos: self.pos_of(),
                    message: format!("invalid number literal '{n}'"),
                })?,
            )),
            Some(Token::LParen) => {
                let e = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(e)
            }
            Some(Token::Ident(name)) => self.parse_ident_expr(&name),
            _ => Err(DslError::Parse {
                pos: self.pos_of(),
                message: "expected a value".into(),
            }),
        }
    }

    fn parse_ident_expr(&mut self, name: &str) -> Result<Expr, DslError> {
        if matches!(self.peek(), Some(Token::LParen)) {
            self.pos += 1;
            let period = self.parse_number()?;
            self.expect(Token::RParen)?;
            let period = period.to_string().parse::<usize>().map_err(|_| DslError::Parse {
                pos: self.pos_of(),
                message: "indicator period must be a positive integer".into(),
            })?;
            return match name.to_ascii_lowercase().as_str() {
                "sma" => Ok(Expr::Indicator(Indicator::Sma { period })),
                "rsi" => Ok(Expr::Indicator(Indicator::Rsi { period })),
                other => Err(DslError::UnknownIndicator(other.to_owned())),
            };
        }
        match name.to_ascii_lowercase().as_str() {
            "open" => Ok(Expr::Field(Field::Open)),
            "high" => Ok(Expr::Field(Field::High)),
            "low" => Ok(Expr::Field(Field::Low)),
            "close" => Ok(Expr::Field(Field::Close)),
            "volume" => Ok(Expr::Field(Field::Volume)),
            other => Err(DslError::UnknownField(other.to_owned())),
        }
    }

    fn parse_number(&mut self) -> Result<Decimal, DslError> {
        match self.advance() {
            Some(Token::Number(n)) => Decimal::from_str(&n).map_err(|_| DslError::Parse {
                pos: self.pos_of(),
                message: format!("invalid number literal '{n}'"),
            }),
            _ => Err(DslError::Parse {
                pos: self.pos_of(),
                message: "expected a number".into(),
            }),
        }
    }
}
