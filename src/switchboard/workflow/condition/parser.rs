// SPDX-License-Identifier: MIT

//! Tokenizer and recursive-descent parser for condition expressions
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr    := and ("or" and)*
//! and     := unary ("and" unary)*
//! unary   := "not" unary | primary
//! primary := "(" expr ")" | "true" | "false" | path (op operand)?
//! operand := string | number | "true" | "false" | "null" | path
//! ```

use super::ast::{CompareOp, Expression, Literal, Operand};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConditionError {
    #[error("unexpected end of condition")]
    UnexpectedEnd,

    #[error("unexpected token '{0}' in condition")]
    UnexpectedToken(String),

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Op(CompareOp),
    And,
    Or,
    Not,
    True,
    False,
    Null,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(s) => s.clone(),
            Token::Str(s) => format!("'{}'", s),
            Token::Num(n) => n.to_string(),
            Token::Op(op) => op.to_string(),
            Token::And => "and".into(),
            Token::Or => "or".into(),
            Token::Not => "not".into(),
            Token::True => "true".into(),
            Token::False => "false".into(),
            Token::Null => "null".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
        }
    }
}

/// Parse a condition expression string into an AST
pub fn parse(input: &str) -> Result<Expression, ConditionError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr()?;
    match parser.peek() {
        None => Ok(expr),
        Some(t) => Err(ConditionError::UnexpectedToken(t.describe())),
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ConditionError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&ch| ch == quote)
                    .map(|p| start + p)
                    .ok_or(ConditionError::UnterminatedString)?;
                tokens.push(Token::Str(chars[start..end].iter().collect()));
                i = end + 1;
            }
            '=' | '!' | '>' | '<' => {
                let next = chars.get(i + 1).copied();
                let (op, width) = match (c, next) {
                    ('=', Some('=')) => (CompareOp::Eq, 2),
                    ('!', Some('=')) => (CompareOp::NotEq, 2),
                    ('>', Some('=')) => (CompareOp::Gte, 2),
                    ('<', Some('=')) => (CompareOp::Lte, 2),
                    ('>', _) => (CompareOp::Gt, 1),
                    ('<', _) => (CompareOp::Lt, 1),
                    _ => return Err(ConditionError::UnexpectedChar(c)),
                };
                tokens.push(Token::Op(op));
                i += width;
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| ConditionError::InvalidNumber(text.clone()))?;
                tokens.push(Token::Num(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "contains" => Token::Op(CompareOp::Contains),
                    _ => Token::Ident(word),
                });
            }
            other => return Err(ConditionError::UnexpectedChar(other)),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, ConditionError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ConditionError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<Expression, ConditionError> {
        let mut left = self.and()?;
        while self.eat(&Token::Or) {
            let right = self.and()?;
            left = Expression::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expression, ConditionError> {
        let mut left = self.unary()?;
        while self.eat(&Token::And) {
            let right = self.unary()?;
            left = Expression::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expression, ConditionError> {
        if self.eat(&Token::Not) {
            return Ok(Expression::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expression, ConditionError> {
        match self.next()? {
            Token::LParen => {
                let inner = self.expr()?;
                match self.next()? {
                    Token::RParen => Ok(inner),
                    other => Err(ConditionError::UnexpectedToken(other.describe())),
                }
            }
            Token::True => Ok(Expression::True),
            Token::False => Ok(Expression::False),
            Token::Ident(path) => match self.peek() {
                Some(Token::Op(op)) => {
                    let op = *op;
                    self.pos += 1;
                    let right = self.operand()?;
                    Ok(Expression::Compare {
                        left: path,
                        op,
                        right,
                    })
                }
                _ => Ok(Expression::Truthy(path)),
            },
            other => Err(ConditionError::UnexpectedToken(other.describe())),
        }
    }

    fn operand(&mut self) -> Result<Operand, ConditionError> {
        Ok(match self.next()? {
            Token::Str(s) => Operand::Literal(Literal::String(s)),
            Token::Num(n) => Operand::Literal(Literal::Number(n)),
            Token::True => Operand::Literal(Literal::Boolean(true)),
            Token::False => Operand::Literal(Literal::Boolean(false)),
            Token::Null => Operand::Literal(Literal::Null),
            Token::Ident(path) => Operand::Path(path),
            other => return Err(ConditionError::UnexpectedToken(other.describe())),
        })
    }
}
