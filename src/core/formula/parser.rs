//! Arithmetic parser
//!
//! Converts tokens into an expression tree using recursive descent with the
//! usual precedence: unary sign binds tightest, then `* /`, then `+ -`.
//! Binary operators of equal precedence associate left to right.

use super::tokenizer::{Token, TokenizeError};

/// Expression tree for whitelisted arithmetic
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    BinaryOp {
        op: char,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: char,
        operand: Box<Expr>,
    },
}

/// Error during parsing
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl From<TokenizeError> for ParseError {
    fn from(e: TokenizeError) -> Self {
        Self::new(e.message, e.position)
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Parse error at position {}: {}",
            self.position, self.message
        )
    }
}

impl std::error::Error for ParseError {}

/// Deepest nesting of parentheses and unary signs accepted.
pub const MAX_NESTING: usize = 256;

/// Tallest expression tree accepted. Long operator chains grow the tree
/// without nesting, and evaluation recurses once per level.
pub const MAX_HEIGHT: usize = 1024;

/// An expression with the height of its tree
type Node = (Expr, usize);

/// Parser for arithmetic tokens
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    nesting: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
            nesting: 0,
        }
    }

    /// Parse the tokens into an expression tree
    pub fn parse(mut self) -> Result<Expr, ParseError> {
        if self.tokens.is_empty() {
            return Err(ParseError::new("Empty expression", 0));
        }
        let (expr, _) = self.expression()?;

        if !self.is_at_end() {
            return Err(ParseError::new(
                format!("Unexpected token after expression: {:?}", self.peek()),
                self.position,
            ));
        }

        Ok(expr)
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.position += 1;
        }
    }

    fn match_token(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_any_operator(&mut self, ops: &[char]) -> Option<char> {
        if let Some(Token::Operator(c)) = self.peek() {
            if ops.contains(c) {
                let op = *c;
                self.advance();
                return Some(op);
            }
        }
        None
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            return Err(ParseError::new(
                format!("Expression nested deeper than {} levels", MAX_NESTING),
                self.position,
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.nesting -= 1;
    }

    fn grow(&self, height: usize) -> Result<usize, ParseError> {
        if height > MAX_HEIGHT {
            return Err(ParseError::new(
                format!("Expression has more than {} levels", MAX_HEIGHT),
                self.position,
            ));
        }
        Ok(height)
    }

    fn binary(&self, op: char, left: Node, right: Node) -> Result<Node, ParseError> {
        let height = self.grow(left.1.max(right.1) + 1)?;
        let expr = Expr::BinaryOp {
            op,
            left: Box::new(left.0),
            right: Box::new(right.0),
        };
        Ok((expr, height))
    }

    /// Expression: term (( "+" | "-" ) term)*
    fn expression(&mut self) -> Result<Node, ParseError> {
        let mut left = self.term()?;

        while let Some(op) = self.match_any_operator(&['+', '-']) {
            let right = self.term()?;
            left = self.binary(op, left, right)?;
        }

        Ok(left)
    }

    /// Term: unary (( "*" | "/" ) unary)*
    fn term(&mut self) -> Result<Node, ParseError> {
        let mut left = self.unary()?;

        while let Some(op) = self.match_any_operator(&['*', '/']) {
            let right = self.unary()?;
            left = self.binary(op, left, right)?;
        }

        Ok(left)
    }

    /// Unary: ( "+" | "-" ) unary | primary
    fn unary(&mut self) -> Result<Node, ParseError> {
        if let Some(op) = self.match_any_operator(&['+', '-']) {
            self.enter()?;
            let (operand, height) = self.unary()?;
            self.leave();
            let height = self.grow(height + 1)?;
            Ok((
                Expr::UnaryOp {
                    op,
                    operand: Box::new(operand),
                },
                height,
            ))
        } else {
            self.primary()
        }
    }

    /// Primary: NUMBER | "(" expression ")"
    fn primary(&mut self) -> Result<Node, ParseError> {
        match self.peek().cloned() {
            Some(Token::Number(n)) => {
                self.advance();
                Ok((Expr::Number(n), 1))
            }
            Some(Token::OpenParen) => {
                self.advance();
                self.enter()?;
                let node = self.expression()?;
                self.leave();
                if !self.match_token(&Token::CloseParen) {
                    return Err(ParseError::new(
                        "Expected ')' after expression",
                        self.position,
                    ));
                }
                Ok(node)
            }
            Some(token) => Err(ParseError::new(
                format!("Unexpected token: {:?}", token),
                self.position,
            )),
            None => Err(ParseError::new(
                "Unexpected end of expression",
                self.position,
            )),
        }
    }
}

/// Convenience function to parse tokens into an expression tree
pub fn parse(tokens: Vec<Token>) -> Result<Expr, ParseError> {
    Parser::new(tokens).parse()
}
