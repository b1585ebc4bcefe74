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

//! Abstract Syntax Tree (AST) definitions for equations
//!
//! The tree is deliberately small: an equation is a single arithmetic
//! expression over the two state records.

use std::fmt;

/// Binary arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    /// Addition (+)
    Add,
    /// Subtraction (-)
    Subtract,
    /// Multiplication (*)
    Multiply,
    /// Division (/)
    Divide,
    /// Floating point remainder (%)
    Modulo,
}

impl BinaryOperator {
    /// Apply the operator to two numbers
    #[inline]
    pub fn apply(self, left: f64, right: f64) -> f64 {
        match self {
            Self::Add => left + right,
            Self::Subtract => left - right,
            Self::Multiply => left * right,
            Self::Divide => left / right,
            Self::Modulo => left % right,
        }
    }

    /// Source symbol of the operator
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
        }
    }
}

/// Unary arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    /// Negation (-)
    Minus,
    /// Identity (+)
    Plus,
}

impl UnaryOperator {
    /// Apply the operator to a number
    #[inline]
    pub fn apply(self, operand: f64) -> f64 {
        match self {
            Self::Minus => -operand,
            Self::Plus => operand,
        }
    }
}

/// Expression node of an equation
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionNode {
    /// Numeric literal
    Number(f64),

    /// Reference to a parameter (e.g. `state`)
    Identifier(String),

    /// Member access on a record (e.g. `state.value`)
    Member {
        /// Object expression
        object: Box<ExpressionNode>,
        /// Member name
        member: String,
    },

    /// Binary operation
    BinaryOp {
        /// Operator
        op: BinaryOperator,
        /// Left operand
        left: Box<ExpressionNode>,
        /// Right operand
        right: Box<ExpressionNode>,
    },

    /// Unary operation
    UnaryOp {
        /// Operator
        op: UnaryOperator,
        /// Operand
        operand: Box<ExpressionNode>,
    },
}

impl ExpressionNode {
    /// Create a numeric literal
    pub fn number(value: f64) -> Self {
        Self::Number(value)
    }

    /// Create an identifier
    pub fn identifier(name: impl Into<String>) -> Self {
        Self::Identifier(name.into())
    }

    /// Create a member access
    pub fn member(object: ExpressionNode, member: impl Into<String>) -> Self {
        Self::Member {
            object: Box::new(object),
            member: member.into(),
        }
    }

    /// Create a binary operation
    pub fn binary_op(op: BinaryOperator, left: ExpressionNode, right: ExpressionNode) -> Self {
        Self::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Create a unary operation
    pub fn unary_op(op: UnaryOperator, operand: ExpressionNode) -> Self {
        Self::UnaryOp {
            op,
            operand: Box::new(operand),
        }
    }

    /// Get the literal value if this is a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

}

impl fmt::Display for ExpressionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Identifier(name) => write!(f, "{name}"),
            Self::Member { object, member } => write!(f, "{object}.{member}"),
            Self::BinaryOp { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Self::UnaryOp { op, operand } => match op {
                UnaryOperator::Minus => write!(f, "-{operand}"),
                UnaryOperator::Plus => write!(f, "+{operand}"),
            },
        }
    }
}
