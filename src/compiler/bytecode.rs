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

//! Bytecode instruction set for equations
//!
//! This module defines a compact stack bytecode that the JIT lowers to
//! native code and the `compile` command prints.

use std::fmt;

/// Index into the constant pool
pub type ConstantIndex = u16;

/// Index into the string pool
pub type StringIndex = u16;

/// Index into the parameter list
pub type ParameterIndex = u8;

/// Bytecode instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    // === Stack Operations ===
    /// Push a constant value onto the stack
    /// Operand: index into constant pool
    PushConstant(ConstantIndex),

    /// Push a parameter record onto the stack
    /// Operand: parameter position
    LoadParameter(ParameterIndex),

    // === Member Access ===
    /// Replace the record on top of the stack with one of its members
    /// Operand: index into string pool
    /// Stack: [record] -> [number]
    LoadProperty(StringIndex),

    // === Arithmetic Operations ===
    /// Stack: [left, right] -> [left + right]
    Add,

    /// Stack: [left, right] -> [left - right]
    Subtract,

    /// Stack: [left, right] -> [left * right]
    Multiply,

    /// Stack: [left, right] -> [left / right]
    Divide,

    /// Stack: [left, right] -> [left % right]
    Modulo,

    /// Stack: [value] -> [-value]
    Negate,

    // === Control Flow ===
    /// Pop the result and stop
    Return,
}

impl Instruction {
    /// Get the size in bytes of this instruction including operands
    pub fn size(&self) -> usize {
        match self {
            Self::Add
            | Self::Subtract
            | Self::Multiply
            | Self::Divide
            | Self::Modulo
            | Self::Negate
            | Self::Return => 1,
            Self::LoadParameter(_) => 2,
            Self::PushConstant(_) | Self::LoadProperty(_) => 3,
        }
    }

    /// Get the stack effect of this instruction (positive = pushes, negative = pops)
    pub fn stack_effect(&self) -> i8 {
        match self {
            Self::PushConstant(_) | Self::LoadParameter(_) => 1,
            Self::LoadProperty(_) | Self::Negate => 0,
            Self::Add | Self::Subtract | Self::Multiply | Self::Divide | Self::Modulo => -1,
            Self::Return => -1,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PushConstant(idx) => write!(f, "PUSH_CONST {idx}"),
            Self::LoadParameter(idx) => write!(f, "LOAD_PARAM {idx}"),
            Self::LoadProperty(idx) => write!(f, "LOAD_PROP {idx}"),
            Self::Add => write!(f, "ADD"),
            Self::Subtract => write!(f, "SUB"),
            Self::Multiply => write!(f, "MUL"),
            Self::Divide => write!(f, "DIV"),
            Self::Modulo => write!(f, "MOD"),
            Self::Negate => write!(f, "NEG"),
            Self::Return => write!(f, "RETURN"),
        }
    }
}

/// Bytecode program containing instructions and constant pools
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    /// Instruction sequence
    pub instructions: Vec<Instruction>,

    /// Constant value pool
    pub constants: Vec<f64>,

    /// String constant pool (member names)
    pub strings: Vec<String>,

    /// Parameter names in declaration order
    pub params: Vec<String>,

    /// Maximum stack depth required for execution
    pub max_stack_depth: usize,

    /// Original source text (for debugging)
    pub source: Option<String>,
}

impl Bytecode {
    /// Create new empty bytecode
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constant to the pool and return its index
    pub fn add_constant(&mut self, value: f64) -> ConstantIndex {
        // Compare bit patterns so NaN and -0.0 deduplicate correctly
        if let Some(index) = self
            .constants
            .iter()
            .position(|v| v.to_bits() == value.to_bits())
        {
            return index as ConstantIndex;
        }

        let index = self.constants.len();
        self.constants.push(value);
        index as ConstantIndex
    }

    /// Add a string to the pool and return its index
    pub fn add_string(&mut self, string: &str) -> StringIndex {
        if let Some(index) = self.strings.iter().position(|s| s == string) {
            return index as StringIndex;
        }

        let index = self.strings.len();
        self.strings.push(string.to_string());
        index as StringIndex
    }

    /// Add an instruction to the bytecode
    pub fn emit(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Calculate the maximum stack depth required
    pub fn calculate_max_stack_depth(&mut self) {
        let mut current_depth = 0i32;
        let mut max_depth = 0i32;

        for instruction in &self.instructions {
            current_depth += instruction.stack_effect() as i32;
            max_depth = max_depth.max(current_depth);
        }

        self.max_stack_depth = max_depth.max(0) as usize;
    }

    /// Get the size in bytes of the bytecode
    pub fn size(&self) -> usize {
        self.instructions.iter().map(|i| i.size()).sum()
    }

    /// Pretty print the bytecode for debugging
    pub fn disassemble(&self) -> String {
        let mut output = String::new();
        output.push_str("=== BYTECODE DISASSEMBLY ===\n");

        if let Some(source) = &self.source {
            output.push_str(&format!("Source: {source}\n"));
        }

        output.push_str(&format!("Parameters: {}\n", self.params.join(", ")));
        output.push_str(&format!("Max Stack Depth: {}\n", self.max_stack_depth));
        output.push_str("\n--- CONSTANTS ---\n");
        for (i, constant) in self.constants.iter().enumerate() {
            output.push_str(&format!("{i:4}: {constant:?}\n"));
        }

        output.push_str("\n--- STRINGS ---\n");
        for (i, string) in self.strings.iter().enumerate() {
            output.push_str(&format!("{i:4}: \"{string}\"\n"));
        }

        output.push_str("\n--- INSTRUCTIONS ---\n");
        for (i, instruction) in self.instructions.iter().enumerate() {
            output.push_str(&format!("{i:4}: {instruction}\n"));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_size() {
        assert_eq!(Instruction::Add.size(), 1);
        assert_eq!(Instruction::LoadParameter(1).size(), 2);
        assert_eq!(Instruction::PushConstant(0).size(), 3);
    }

    #[test]
    fn test_constant_deduplication() {
        let mut bytecode = Bytecode::new();
        assert_eq!(bytecode.add_constant(1.5), 0);
        assert_eq!(bytecode.add_constant(2.0), 1);
        assert_eq!(bytecode.add_constant(1.5), 0);
        assert_eq!(bytecode.add_constant(f64::NAN), 2);
        assert_eq!(bytecode.add_constant(f64::NAN), 2);
        assert_eq!(bytecode.constants.len(), 3);
    }

    #[test]
    fn test_string_deduplication() {
        let mut bytecode = Bytecode::new();
        assert_eq!(bytecode.add_string("value"), 0);
        assert_eq!(bytecode.add_string("value"), 0);
        assert_eq!(bytecode.strings.len(), 1);
    }

    #[test]
    fn test_max_stack_depth_calculation() {
        let mut bytecode = Bytecode::new();
        bytecode.emit(Instruction::LoadParameter(1));
        bytecode.emit(Instruction::LoadProperty(0));
        bytecode.emit(Instruction::LoadParameter(0));
        bytecode.emit(Instruction::LoadProperty(0));
        bytecode.emit(Instruction::Subtract);
        bytecode.emit(Instruction::Return);
        bytecode.calculate_max_stack_depth();
        assert_eq!(bytecode.max_stack_depth, 2);
    }

    #[test]
    fn test_disassembly() {
        let mut bytecode = Bytecode::new();
        bytecode.source = Some("1 + 2".to_string());
        let index = bytecode.add_constant(3.0);
        bytecode.emit(Instruction::PushConstant(index));
        bytecode.emit(Instruction::Return);

        let listing = bytecode.disassemble();
        assert!(listing.contains("Source: 1 + 2"));
        assert!(listing.contains("PUSH_CONST 0"));
        assert!(listing.contains("RETURN"));
    }
}
