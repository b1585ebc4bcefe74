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

//! Cranelift IR generation for equation bytecode
//!
//! Translates the stack bytecode into SSA form by replaying the operand
//! stack at compile time. Records arrive as pointers and members are loaded
//! by their offset in [`StateRecord`].

use cranelift::prelude::*;
use cranelift_module::{Linkage, Module};
use smallvec::SmallVec;
use std::mem::offset_of;

use crate::compiler::{Bytecode, Instruction};
use crate::error::{EngineError, Result};
use crate::state::StateRecord;

/// Runtime symbol providing floating point remainder, Cranelift has no `frem`
pub const REM_SYMBOL: &str = "state_fn_rem";

/// Floating point remainder called from generated code
pub extern "C" fn state_fn_rem(left: f64, right: f64) -> f64 {
    left % right
}

/// Value on the compile-time stack
#[derive(Debug, Clone, Copy)]
enum JitValue {
    Number(Value),
    Record(Value),
}

/// Build the body of `(prev: *const StateRecord, state: *const StateRecord) -> f64`
pub fn build_function(
    func: &mut codegen::ir::Function,
    func_ctx: &mut FunctionBuilderContext,
    bytecode: &Bytecode,
    module: &mut dyn Module,
) -> Result<()> {
    let mut builder = FunctionBuilder::new(func, func_ctx);

    let entry_block = builder.create_block();
    builder.append_block_params_for_function_params(entry_block);
    builder.switch_to_block(entry_block);
    builder.seal_block(entry_block);

    let params: SmallVec<[Value; 2]> = builder.block_params(entry_block).iter().copied().collect();
    let mut stack: SmallVec<[JitValue; 8]> = SmallVec::new();
    let mut rem_ref = None;

    for (pc, instruction) in bytecode.instructions.iter().enumerate() {
        match *instruction {
            Instruction::PushConstant(index) => {
                let constant = bytecode
                    .constants
                    .get(index as usize)
                    .copied()
                    .ok_or_else(|| EngineError::jit(format!("bad constant at {pc}")))?;
                stack.push(JitValue::Number(builder.ins().f64const(constant)));
            }
            Instruction::LoadParameter(index) => {
                let param = params
                    .get(index as usize)
                    .copied()
                    .ok_or_else(|| EngineError::jit(format!("bad parameter at {pc}")))?;
                stack.push(JitValue::Record(param));
            }
            Instruction::LoadProperty(index) => {
                let member = bytecode
                    .strings
                    .get(index as usize)
                    .ok_or_else(|| EngineError::jit(format!("bad member at {pc}")))?;
                let offset = match member.as_str() {
                    "value" => offset_of!(StateRecord, value) as i32,
                    other => return Err(EngineError::jit(format!("unknown member '{other}'"))),
                };
                let record = match stack.pop() {
                    Some(JitValue::Record(ptr)) => ptr,
                    _ => return Err(EngineError::jit(format!("expected record at {pc}"))),
                };
                let loaded = builder
                    .ins()
                    .load(types::F64, MemFlags::trusted(), record, offset);
                stack.push(JitValue::Number(loaded));
            }
            Instruction::Add
            | Instruction::Subtract
            | Instruction::Multiply
            | Instruction::Divide
            | Instruction::Modulo => {
                let right = pop_number(&mut stack, pc)?;
                let left = pop_number(&mut stack, pc)?;
                let result = match instruction {
                    Instruction::Add => builder.ins().fadd(left, right),
                    Instruction::Subtract => builder.ins().fsub(left, right),
                    Instruction::Multiply => builder.ins().fmul(left, right),
                    Instruction::Divide => builder.ins().fdiv(left, right),
                    _ => {
                        let func_ref = match rem_ref {
                            Some(func_ref) => func_ref,
                            None => {
                                let mut sig = module.make_signature();
                                sig.params.push(AbiParam::new(types::F64));
                                sig.params.push(AbiParam::new(types::F64));
                                sig.returns.push(AbiParam::new(types::F64));
                                let func_id = module
                                    .declare_function(REM_SYMBOL, Linkage::Import, &sig)
                                    .map_err(|e| EngineError::jit(e.to_string()))?;
                                let func_ref = module.declare_func_in_func(func_id, builder.func);
                                rem_ref = Some(func_ref);
                                func_ref
                            }
                        };
                        let call = builder.ins().call(func_ref, &[left, right]);
                        builder.inst_results(call)[0]
                    }
                };
                stack.push(JitValue::Number(result));
            }
            Instruction::Negate => {
                let value = pop_number(&mut stack, pc)?;
                stack.push(JitValue::Number(builder.ins().fneg(value)));
            }
            Instruction::Return => {
                let value = pop_number(&mut stack, pc)?;
                builder.ins().return_(&[value]);
                builder.finalize();
                return Ok(());
            }
        }
    }

    Err(EngineError::jit("bytecode ended without a return"))
}

fn pop_number(stack: &mut SmallVec<[JitValue; 8]>, pc: usize) -> Result<Value> {
    match stack.pop() {
        Some(JitValue::Number(value)) => Ok(value),
        Some(JitValue::Record(_)) => Err(EngineError::jit(format!("expected number at {pc}"))),
        None => Err(EngineError::jit(format!("stack underflow at {pc}"))),
    }
}
