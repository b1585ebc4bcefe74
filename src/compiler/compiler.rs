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

//! Expression compiler for equations
//!
//! Converts a parsed equation into [`Bytecode`]. Parameter references are
//! resolved to positions, member names are checked against the record layout,
//! and operations on literal operands are folded at compile time.

use crate::ast::{BinaryOperator, ExpressionNode, UnaryOperator};
use crate::compiler::bytecode::{Bytecode, Instruction, ParameterIndex};
use crate::parser::MAX_EXPRESSION_DEPTH;
use thiserror::Error;

/// Members a [`StateRecord`](crate::state::StateRecord) exposes to compiled code
pub const RECORD_MEMBERS: &[&str] = &["value"];

/// Compilation error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompilationError {
    /// Identifier that is not a parameter
    #[error("Unknown identifier: {0}")]
    UnknownIdentifier(String),

    /// Member that records do not have
    #[error("Unknown member: {0}")]
    UnknownMember(String),

    /// Operand of the wrong kind (a record where a number is required, or the reverse)
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Expected operand kind
        expected: &'static str,
        /// Actual operand kind
        found: &'static str,
    },

    /// Maximum recursion depth exceeded
    #[error("Maximum recursion depth exceeded")]
    MaxRecursionDepthExceeded,

    /// A pool or parameter index does not fit its operand width
    #[error("Too many {0}")]
    TooMany(&'static str),
}

/// Result type for compilation operations
pub type CompilationResult<T> = Result<T, CompilationError>;

/// Configuration for the expression compiler
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Maximum tree depth the compiler walks, folding included
    pub max_recursion_depth: usize,
    /// Whether to fold operations on literal operands
    pub constant_folding: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_recursion_depth: MAX_EXPRESSION_DEPTH,
            constant_folding: true,
        }
    }
}

/// Static kind of a compiled subexpression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operand {
    Number,
    Record,
}

impl Operand {
    fn name(self) -> &'static str {
        match self {
            Operand::Number => "number",
            Operand::Record => "record",
        }
    }
}

/// Expression compiler that converts an AST to bytecode
pub struct ExpressionCompiler {
    config: CompilerConfig,
    recursion_depth: usize,
}

impl ExpressionCompiler {
    /// Create a new expression compiler
    pub fn new() -> Self {
        Self::with_config(CompilerConfig::default())
    }

    /// Create a new expression compiler with custom configuration
    pub fn with_config(config: CompilerConfig) -> Self {
        Self {
            config,
            recursion_depth: 0,
        }
    }

    /// Compiler configuration
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile an equation body whose free identifiers are `params`
    pub fn compile(
        &mut self,
        expr: &ExpressionNode,
        params: &[String],
    ) -> CompilationResult<Bytecode> {
        if params.len() > ParameterIndex::MAX as usize + 1 {
            return Err(CompilationError::TooMany("parameters"));
        }

        let mut bytecode = Bytecode::new();
        bytecode.params = params.to_vec();
        bytecode.source = Some(expr.to_string());

        self.recursion_depth = 0;
        let kind = if self.config.constant_folding {
            let folded = self.fold_constants(expr, 1)?;
            self.compile_node(&folded, &mut bytecode)?
        } else {
            self.compile_node(expr, &mut bytecode)?
        };
        expect_number(kind)?;
        bytecode.emit(Instruction::Return);
        bytecode.calculate_max_stack_depth();

        log::trace!("Compiled equation:\n{}", bytecode.disassemble());
        Ok(bytecode)
    }

    /// Replace operations whose operands are all literals with their result
    fn fold_constants(
        &self,
        expr: &ExpressionNode,
        depth: usize,
    ) -> CompilationResult<ExpressionNode> {
        if depth > self.config.max_recursion_depth {
            return Err(CompilationError::MaxRecursionDepthExceeded);
        }

        Ok(match expr {
            ExpressionNode::BinaryOp { op, left, right } => {
                let left = self.fold_constants(left, depth + 1)?;
                let right = self.fold_constants(right, depth + 1)?;
                match (left.as_number(), right.as_number()) {
                    (Some(l), Some(r)) => ExpressionNode::number(op.apply(l, r)),
                    _ => ExpressionNode::binary_op(*op, left, right),
                }
            }
            ExpressionNode::UnaryOp { op, operand } => {
                let operand = self.fold_constants(operand, depth + 1)?;
                match operand.as_number() {
                    Some(value) => ExpressionNode::number(op.apply(value)),
                    None if *op == UnaryOperator::Plus => operand,
                    None => ExpressionNode::unary_op(*op, operand),
                }
            }
            ExpressionNode::Member { object, member } => {
                ExpressionNode::member(self.fold_constants(object, depth + 1)?, member.clone())
            }
            ExpressionNode::Number(_) | ExpressionNode::Identifier(_) => expr.clone(),
        })
    }

    fn compile_node(
        &mut self,
        expr: &ExpressionNode,
        bytecode: &mut Bytecode,
    ) -> CompilationResult<Operand> {
        self.recursion_depth += 1;
        if self.recursion_depth > self.config.max_recursion_depth {
            return Err(CompilationError::MaxRecursionDepthExceeded);
        }

        let result = match expr {
            ExpressionNode::Number(value) => {
                if bytecode.constants.len() > u16::MAX as usize {
                    return Err(CompilationError::TooMany("constants"));
                }
                let index = bytecode.add_constant(*value);
                bytecode.emit(Instruction::PushConstant(index));
                Ok(Operand::Number)
            }
            ExpressionNode::Identifier(name) => {
                let position = bytecode
                    .params
                    .iter()
                    .position(|param| param == name)
                    .ok_or_else(|| CompilationError::UnknownIdentifier(name.clone()))?;
                bytecode.emit(Instruction::LoadParameter(position as ParameterIndex));
                Ok(Operand::Record)
            }
            ExpressionNode::Member { object, member } => {
                let kind = self.compile_node(object, bytecode)?;
                if kind != Operand::Record {
                    return Err(CompilationError::TypeMismatch {
                        expected: Operand::Record.name(),
                        found: kind.name(),
                    });
                }
                if !RECORD_MEMBERS.contains(&member.as_str()) {
                    return Err(CompilationError::UnknownMember(member.clone()));
                }
                let index = bytecode.add_string(member);
                bytecode.emit(Instruction::LoadProperty(index));
                Ok(Operand::Number)
            }
            ExpressionNode::BinaryOp { op, left, right } => {
                expect_number(self.compile_node(left, bytecode)?)?;
                expect_number(self.compile_node(right, bytecode)?)?;
                bytecode.emit(binary_instruction(*op));
                Ok(Operand::Number)
            }
            ExpressionNode::UnaryOp { op, operand } => {
                expect_number(self.compile_node(operand, bytecode)?)?;
                if *op == UnaryOperator::Minus {
                    bytecode.emit(Instruction::Negate);
                }
                Ok(Operand::Number)
            }
        };

        self.recursion_depth -= 1;
        result
    }
}

impl Default for ExpressionCompiler {
    fn default() -> Self {
        Self::new()
    }
}

fn expect_number(kind: Operand) -> CompilationResult<()> {
    match kind {
        Operand::Number => Ok(()),
        other => Err(CompilationError::TypeMismatch {
            expected: Operand::Number.name(),
            found: other.name(),
        }),
    }
}

fn binary_instruction(op: BinaryOperator) -> Instruction {
    match op {
        BinaryOperator::Add => Instruction::Add,
        BinaryOperator::Subtract => Instruction::Subtract,
        BinaryOperator::Multiply => Instruction::Multiply,
        BinaryOperator::Divide => Instruction::Divide,
        BinaryOperator::Modulo => Instruction::Modulo,
    }
}
