// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Pratt parser for equations

use super::error::{ParseError, ParseResult};
use super::tokenizer::{Token, Tokenizer};
use crate::ast::{BinaryOperator, ExpressionNode, UnaryOperator};

/// Deepest expression tree the parser builds, and deepest nesting it follows
pub const MAX_EXPRESSION_DEPTH: usize = 512;

/// Operator precedence levels (higher = tighter binding)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    /// Lowest precedence, the whole expression
    Lowest = 1,
    /// Additive operators (+, -)
    Additive = 2,
    /// Multiplicative operators (*, /, %)
    Multiplicative = 3,
    /// Unary operators (+, -)
    Unary = 4,
    /// Member access (.)
    Member = 5,
}

impl Precedence {
    /// Get the next higher precedence level for left-associative operators
    #[inline(always)]
    pub const fn next_level(self) -> Self {
        match self {
            Precedence::Lowest => Precedence::Additive,
            Precedence::Additive => Precedence::Multiplicative,
            Precedence::Multiplicative => Precedence::Unary,
            Precedence::Unary => Precedence::Member,
            Precedence::Member => Precedence::Member,
        }
    }
}

#[inline(always)]
fn token_to_binary_op(token: &Token<'_>) -> Option<(BinaryOperator, Precedence)> {
    match token {
        Token::Plus => Some((BinaryOperator::Add, Precedence::Additive)),
        Token::Minus => Some((BinaryOperator::Subtract, Precedence::Additive)),
        Token::Multiply => Some((BinaryOperator::Multiply, Precedence::Multiplicative)),
        Token::Divide => Some((BinaryOperator::Divide, Precedence::Multiplicative)),
        Token::Percent => Some((BinaryOperator::Modulo, Precedence::Multiplicative)),
        _ => None,
    }
}

/// Precedence climbing parser over a single token of lookahead
///
/// ### Precedence Levels (highest to lowest):
/// - **Member** (5): `.` - record member access
/// - **Unary** (4): `+`, `-`
/// - **Multiplicative** (3): `*`, `/`, `%`
/// - **Additive** (2): `+`, `-`
///
/// Both the call nesting (parentheses, unary operators) and the depth of the
/// tree being built are capped at [`MAX_EXPRESSION_DEPTH`], so later tree
/// walks never run out of stack.
pub struct PrattParser<'input> {
    tokenizer: Tokenizer<'input>,
    current_token: Option<Token<'input>>,
    current_position: usize,
    nesting: usize,
}

/// Parsed subexpression with the depth of its tree
type Parsed = (ExpressionNode, usize);

impl<'input> PrattParser<'input> {
    /// Create a parser positioned on the first token
    pub fn new(input: &'input str) -> ParseResult<Self> {
        let mut parser = Self {
            tokenizer: Tokenizer::new(input),
            current_token: None,
            current_position: 0,
            nesting: 0,
        };
        parser.advance()?;
        Ok(parser)
    }

    #[inline(always)]
    fn advance(&mut self) -> ParseResult<()> {
        self.current_token = self.tokenizer.next_token()?;
        self.current_position = self.tokenizer.token_start();
        Ok(())
    }

    #[inline(always)]
    fn current(&self) -> Option<&Token<'input>> {
        self.current_token.as_ref()
    }

    fn expect(&mut self, expected: Token<'input>, description: &str) -> ParseResult<()> {
        match &self.current_token {
            Some(token) if std::mem::discriminant(token) == std::mem::discriminant(&expected) => {
                self.advance()
            }
            Some(_) => Err(ParseError::ExpectedToken {
                expected: description.to_string(),
                position: self.current_position,
            }),
            None => Err(ParseError::UnexpectedEof),
        }
    }

    fn unexpected(&self) -> ParseError {
        match self.current() {
            Some(token) => ParseError::UnexpectedToken {
                token: format!("{token:?}"),
                position: self.current_position,
            },
            None => ParseError::UnexpectedEof,
        }
    }

    #[inline]
    fn check_depth(&self, depth: usize) -> ParseResult<usize> {
        if depth > MAX_EXPRESSION_DEPTH {
            return Err(ParseError::MaxDepthExceeded {
                limit: MAX_EXPRESSION_DEPTH,
                position: self.current_position,
            });
        }
        Ok(depth)
    }

    /// Parse a complete equation, optionally terminated by `;`
    pub fn parse_statement(&mut self) -> ParseResult<ExpressionNode> {
        let expr = self.parse_expression_with_precedence(Precedence::Lowest)?;

        if let Some(Token::Semicolon) = self.current() {
            self.advance()?;
        }

        match self.current() {
            None => Ok(expr),
            Some(_) => Err(ParseError::TrailingInput {
                position: self.current_position,
            }),
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Parsed> {
        match self.current() {
            Some(Token::Identifier(name)) => {
                let name = *name;
                self.advance()?;
                Ok((ExpressionNode::identifier(name), 1))
            }
            Some(Token::Number(value)) => {
                let value = *value;
                self.advance()?;
                Ok((ExpressionNode::number(value), 1))
            }
            Some(Token::LeftParen) => {
                self.advance()?;
                let parsed = self.parse_operand(Precedence::Lowest)?;
                self.expect(Token::RightParen, "')'")?;
                Ok(parsed)
            }
            Some(Token::Minus) => {
                self.advance()?;
                let (operand, depth) = self.parse_operand(Precedence::Unary)?;
                let depth = self.check_depth(depth + 1)?;
                Ok((ExpressionNode::unary_op(UnaryOperator::Minus, operand), depth))
            }
            Some(Token::Plus) => {
                self.advance()?;
                let (operand, depth) = self.parse_operand(Precedence::Unary)?;
                let depth = self.check_depth(depth + 1)?;
                Ok((ExpressionNode::unary_op(UnaryOperator::Plus, operand), depth))
            }
            _ => Err(self.unexpected()),
        }
    }

    fn parse_postfix(&mut self, (mut left, mut depth): Parsed) -> ParseResult<Parsed> {
        while let Some(Token::Dot) = self.current() {
            self.advance()?;
            match self.current() {
                Some(Token::Identifier(member)) => {
                    let member = *member;
                    self.advance()?;
                    depth = self.check_depth(depth + 1)?;
                    left = ExpressionNode::member(left, member);
                }
                _ => {
                    return Err(ParseError::ExpectedToken {
                        expected: "member name after '.'".to_string(),
                        position: self.current_position,
                    });
                }
            }
        }
        Ok((left, depth))
    }

    fn parse_operand(&mut self, min_precedence: Precedence) -> ParseResult<Parsed> {
        self.nesting = self.check_depth(self.nesting + 1)?;

        let primary = self.parse_primary()?;
        let (mut left, mut depth) = self.parse_postfix(primary)?;

        while let Some((op, precedence)) = self.current().and_then(token_to_binary_op) {
            if precedence < min_precedence {
                break;
            }
            self.advance()?;
            let (right, right_depth) = self.parse_operand(precedence.next_level())?;
            depth = self.check_depth(depth.max(right_depth) + 1)?;
            left = ExpressionNode::binary_op(op, left, right);
        }

        self.nesting -= 1;
        Ok((left, depth))
    }

    /// Parse an expression whose binary operators bind at least as tightly as `min_precedence`
    pub fn parse_expression_with_precedence(
        &mut self,
        min_precedence: Precedence,
    ) -> ParseResult<ExpressionNode> {
        self.parse_operand(min_precedence).map(|(expr, _)| expr)
    }
}

/// Parse an equation into an AST
pub fn parse_expression_pratt(input: &str) -> ParseResult<ExpressionNode> {
    PrattParser::new(input)?.parse_statement()
}
