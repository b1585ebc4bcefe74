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

//! Tokenizer for equation text
//!
//! - Zero-copy identifier slices borrowed from the input
//! - Byte-level scanning, the grammar is pure ASCII
//! - `//` and `/* */` comments are skipped like whitespace

use super::error::{ParseError, ParseResult};

/// Equation token
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'input> {
    /// Numeric literal (e.g., 42, 3.5, 1e-3)
    Number(f64),
    /// Identifier (e.g., state, prevState, value)
    Identifier(&'input str),
    /// Addition operator (+)
    Plus,
    /// Subtraction operator (-)
    Minus,
    /// Multiplication operator (*)
    Multiply,
    /// Division operator (/)
    Divide,
    /// Remainder operator (%)
    Percent,
    /// Left parenthesis (
    LeftParen,
    /// Right parenthesis )
    RightParen,
    /// Dot operator (.) for member access
    Dot,
    /// Semicolon (;) terminating a statement
    Semicolon,
}

impl<'input> Token<'input> {
    /// Get identifier string
    #[inline]
    pub fn as_identifier(&self) -> Option<&'input str> {
        match self {
            Token::Identifier(s) => Some(s),
            _ => None,
        }
    }

    /// Check if this token is an identifier
    #[inline]
    pub fn is_identifier(&self) -> bool {
        matches!(self, Token::Identifier(_))
    }
}

/// Tokenizer over a borrowed equation string
#[derive(Clone)]
pub struct Tokenizer<'input> {
    input: &'input str,
    bytes: &'input [u8],
    pos: usize,
    end: usize,
    token_start: usize,
}

impl<'input> Tokenizer<'input> {
    /// Create a new tokenizer
    #[inline]
    pub fn new(input: &'input str) -> Self {
        let bytes = input.as_bytes();
        Self {
            input,
            bytes,
            pos: 0,
            end: bytes.len(),
            token_start: 0,
        }
    }

    #[inline(always)]
    fn slice(&self, start: usize, end: usize) -> &'input str {
        &self.input[start..end]
    }

    #[inline(always)]
    fn is_id_start(ch: u8) -> bool {
        matches!(ch, b'A'..=b'Z' | b'a'..=b'z' | b'_' | b'$')
    }

    #[inline(always)]
    fn is_id_continue(ch: u8) -> bool {
        matches!(ch, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'$')
    }

    #[inline(always)]
    fn peek_byte(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    /// Scan digits, an optional fraction and an optional exponent
    fn parse_number(&mut self) -> ParseResult<Token<'input>> {
        let start = self.pos;

        while self.pos < self.end && self.bytes[self.pos].is_ascii_digit() {
            self.pos += 1;
        }

        // Only treat '.' as a decimal point when a digit follows, `1.value` is not a number
        if self.peek_byte(0) == Some(b'.') && self.peek_byte(1).is_some_and(|b| b.is_ascii_digit())
        {
            self.pos += 1;
            while self.pos < self.end && self.bytes[self.pos].is_ascii_digit() {
                self.pos += 1;
            }
        }

        if matches!(self.peek_byte(0), Some(b'e' | b'E')) {
            let mut lookahead = 1;
            if matches!(self.peek_byte(1), Some(b'+' | b'-')) {
                lookahead = 2;
            }
            if self.peek_byte(lookahead).is_some_and(|b| b.is_ascii_digit()) {
                self.pos += lookahead;
                while self.pos < self.end && self.bytes[self.pos].is_ascii_digit() {
                    self.pos += 1;
                }
            }
        }

        let text = self.slice(start, self.pos);
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| ParseError::InvalidLiteral {
                literal_type: "number".to_string(),
                value: text.to_string(),
                position: start,
            })
    }

    #[inline(always)]
    fn skip_whitespace(&mut self) {
        while self.pos < self.end {
            match self.bytes[self.pos] {
                b' ' | b'\t' | b'\r' | b'\n' => self.pos += 1,
                _ => break,
            }
        }
    }

    fn skip_single_line_comment(&mut self) {
        self.pos += 2;
        while self.pos < self.end && !matches!(self.bytes[self.pos], b'\n' | b'\r') {
            self.pos += 1;
        }
    }

    fn skip_multi_line_comment(&mut self) -> ParseResult<()> {
        let start = self.pos;
        self.pos += 2;

        while self.pos + 1 < self.end {
            if self.bytes[self.pos] == b'*' && self.bytes[self.pos + 1] == b'/' {
                self.pos += 2;
                return Ok(());
            }
            self.pos += 1;
        }

        Err(ParseError::UnexpectedToken {
            token: "Unclosed multi-line comment".to_string(),
            position: start,
        })
    }

    fn skip_trivia(&mut self) -> ParseResult<()> {
        loop {
            self.skip_whitespace();
            match (self.peek_byte(0), self.peek_byte(1)) {
                (Some(b'/'), Some(b'/')) => self.skip_single_line_comment(),
                (Some(b'/'), Some(b'*')) => self.skip_multi_line_comment()?,
                _ => return Ok(()),
            }
        }
    }

    fn parse_identifier(&mut self) -> &'input str {
        let start = self.pos;
        while self.pos < self.end && Self::is_id_continue(self.bytes[self.pos]) {
            self.pos += 1;
        }
        self.slice(start, self.pos)
    }

    /// Produce the next token, or `None` at end of input
    pub fn next_token(&mut self) -> ParseResult<Option<Token<'input>>> {
        self.skip_trivia()?;
        self.token_start = self.pos;

        if self.pos >= self.end {
            return Ok(None);
        }

        let single = |tokenizer: &mut Self, token: Token<'input>| {
            tokenizer.pos += 1;
            token
        };

        let token = match self.bytes[self.pos] {
            b'.' if self.peek_byte(1).is_some_and(|b| b.is_ascii_digit()) => {
                // `.5` style literal
                let start = self.pos;
                self.pos += 1;
                while self.pos < self.end && self.bytes[self.pos].is_ascii_digit() {
                    self.pos += 1;
                }
                let text = self.slice(start, self.pos);
                Token::Number(text.parse::<f64>().map_err(|_| ParseError::InvalidLiteral {
                    literal_type: "number".to_string(),
                    value: text.to_string(),
                    position: start,
                })?)
            }
            b'.' => single(self, Token::Dot),
            b'(' => single(self, Token::LeftParen),
            b')' => single(self, Token::RightParen),
            b';' => single(self, Token::Semicolon),
            b'+' => single(self, Token::Plus),
            b'-' => single(self, Token::Minus),
            b'*' => single(self, Token::Multiply),
            b'/' => single(self, Token::Divide),
            b'%' => single(self, Token::Percent),
            b'0'..=b'9' => self.parse_number()?,
            ch if Self::is_id_start(ch) => Token::Identifier(self.parse_identifier()),
            _ => {
                let character = self.input[self.pos..].chars().next().unwrap_or('\u{fffd}');
                return Err(ParseError::UnexpectedCharacter {
                    character,
                    position: self.pos,
                });
            }
        };

        Ok(Some(token))
    }

    /// Start position of the most recently produced token
    pub fn token_start(&self) -> usize {
        self.token_start
    }

    /// Current byte position
    pub fn position(&self) -> usize {
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drain the tokenizer, keeping each token's byte range
    fn scan(input: &str) -> ParseResult<Vec<(Token<'_>, usize, usize)>> {
        let mut tokenizer = Tokenizer::new(input);
        let mut tokens = Vec::new();
        while let Some(token) = tokenizer.next_token()? {
            tokens.push((token, tokenizer.token_start(), tokenizer.position()));
        }
        Ok(tokens)
    }

    #[test]
    fn test_tokenizer_basic() {
        let mut tokenizer = Tokenizer::new("state.value");

        let token1 = tokenizer.next_token().unwrap().unwrap();
        assert_eq!(token1.as_identifier(), Some("state"));

        let token2 = tokenizer.next_token().unwrap().unwrap();
        assert_eq!(token2, Token::Dot);

        let token3 = tokenizer.next_token().unwrap().unwrap();
        assert_eq!(token3.as_identifier(), Some("value"));

        assert!(tokenizer.next_token().unwrap().is_none());
    }

    #[test]
    fn test_equation_tokens() {
        let kinds: Vec<_> = scan("(state.value - prevState.value) % 2;")
            .unwrap()
            .into_iter()
            .map(|(token, _, _)| token)
            .collect();

        assert_eq!(kinds[0], Token::LeftParen);
        assert_eq!(kinds[1], Token::Identifier("state"));
        assert_eq!(kinds[4], Token::Minus);
        assert_eq!(kinds[8], Token::RightParen);
        assert_eq!(kinds[9], Token::Percent);
        assert_eq!(kinds[11], Token::Semicolon);
        assert_eq!(kinds.len(), 12);
    }

    #[test]
    fn test_numbers() {
        let mut tokenizer = Tokenizer::new("42 3.25 1e3 2.5E-1 .5");

        assert_eq!(tokenizer.next_token().unwrap().unwrap(), Token::Number(42.0));
        assert_eq!(tokenizer.next_token().unwrap().unwrap(), Token::Number(3.25));
        assert_eq!(tokenizer.next_token().unwrap().unwrap(), Token::Number(1000.0));
        assert_eq!(tokenizer.next_token().unwrap().unwrap(), Token::Number(0.25));
        assert_eq!(tokenizer.next_token().unwrap().unwrap(), Token::Number(0.5));
    }

    #[test]
    fn test_token_positions() {
        let tokens = scan("  a +b").unwrap();
        assert_eq!((tokens[0].1, tokens[0].2), (2, 3));
        assert_eq!((tokens[1].1, tokens[1].2), (4, 5));
        assert_eq!((tokens[2].1, tokens[2].2), (5, 6));
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = scan("a /* inline */ * 2 // trailing").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].0, Token::Multiply);
    }

    #[test]
    fn test_unexpected_character() {
        let err = scan("state.value # 1").unwrap_err();
        assert_eq!(
            err,
            ParseError::UnexpectedCharacter {
                character: '#',
                position: 12
            }
        );
        assert!(scan("(a, b) => a").is_err());
    }

    #[test]
    fn test_unclosed_comment() {
        assert!(scan("1 /* never closed").is_err());
    }
}
