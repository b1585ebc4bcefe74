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

//! Cranelift-based JIT compiler for equations
//!
//! Equations are parsed, compiled to bytecode and lowered to native code in a
//! single process-wide [`JITModule`]. Code emitted into the module is never
//! freed, so every compiled function stays callable for the rest of the
//! process. A JIT module cannot redefine a symbol, so each compilation mints a
//! fresh `compute_value_<n>` name.

pub mod codegen;

use std::sync::atomic::{AtomicUsize, Ordering};

use cranelift::prelude::*;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{Linkage, Module};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::compiler::ExpressionCompiler;
use crate::error::{EngineError, Result};
use crate::parser::parse;
use crate::state::{StateFunction, StateRecord};
use crate::{PREV_STATE_PARAM, STATE_PARAM};

/// Prefix of generated function symbols
pub const SYMBOL_PREFIX: &str = "compute_value_";

/// Source of unique symbol suffixes
static SYMBOL_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Process-wide compiler, created on first use
static SHARED_COMPILER: Lazy<Result<Mutex<JitCompiler>>> =
    Lazy::new(|| JitCompiler::new().map(Mutex::new));

/// Mint the next unique function symbol
pub fn next_symbol() -> String {
    format!(
        "{SYMBOL_PREFIX}{}",
        SYMBOL_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// Signature of generated code
type RawStateFn = extern "C" fn(*const StateRecord, *const StateRecord) -> f64;

struct SharedModule(JITModule);

// SAFETY: the module is only reachable through the mutex in `SHARED_COMPILER`,
// and the finalized code it hands out is immutable.
unsafe impl Send for SharedModule {}

/// JIT compiler owning a code module
pub struct JitCompiler {
    module: SharedModule,
    func_ctx: FunctionBuilderContext,
    functions_compiled: usize,
}

impl JitCompiler {
    /// Create a compiler targeting the host ISA
    pub fn new() -> Result<Self> {
        let mut flag_builder = settings::builder();
        // PLT-free code keeps aarch64 hosts working
        for (name, value) in [("use_colocated_libcalls", "false"), ("is_pic", "false")] {
            flag_builder
                .set(name, value)
                .map_err(|e| EngineError::jit(format!("failed to set {name}: {e}")))?;
        }

        let isa = cranelift_native::builder()
            .map_err(|e| EngineError::jit(format!("host ISA unsupported: {e}")))?
            .finish(settings::Flags::new(flag_builder))
            .map_err(|e| EngineError::jit(format!("failed to build ISA: {e}")))?;

        let mut builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
        builder.symbol(codegen::REM_SYMBOL, codegen::state_fn_rem as *const u8);

        Ok(Self {
            module: SharedModule(JITModule::new(builder)),
            func_ctx: FunctionBuilderContext::new(),
            functions_compiled: 0,
        })
    }

    /// Run `f` with the process-wide compiler
    pub fn with_shared<T>(f: impl FnOnce(&mut JitCompiler) -> Result<T>) -> Result<T> {
        match &*SHARED_COMPILER {
            Ok(compiler) => f(&mut *compiler.lock()),
            Err(err) => Err(err.clone()),
        }
    }

    /// Number of functions this compiler has emitted
    pub fn functions_compiled(&self) -> usize {
        self.functions_compiled
    }

    /// Compile an equation over `prevState` and `state` to native code
    pub fn compile(&mut self, equation: &str) -> Result<JitFunction> {
        let expr = parse(equation)?;
        let params = [PREV_STATE_PARAM.to_string(), STATE_PARAM.to_string()];
        let bytecode = ExpressionCompiler::new().compile(&expr, &params)?;

        let module = &mut self.module.0;
        let pointer_type = module.target_config().pointer_type();

        let mut ctx = module.make_context();
        ctx.func.signature.params.push(AbiParam::new(pointer_type));
        ctx.func.signature.params.push(AbiParam::new(pointer_type));
        ctx.func.signature.returns.push(AbiParam::new(types::F64));

        codegen::build_function(&mut ctx.func, &mut self.func_ctx, &bytecode, module)?;

        let symbol = next_symbol();
        let func_id = module
            .declare_function(&symbol, Linkage::Local, &ctx.func.signature)
            .map_err(|e| EngineError::jit(format!("declare {symbol}: {e}")))?;
        module
            .define_function(func_id, &mut ctx)
            .map_err(|e| EngineError::jit(format!("define {symbol}: {e}")))?;
        module.clear_context(&mut ctx);
        module
            .finalize_definitions()
            .map_err(|e| EngineError::jit(format!("finalize {symbol}: {e}")))?;

        let code_ptr = module.get_finalized_function(func_id);
        // SAFETY: the function was generated with exactly the `RawStateFn` signature
        // using the host's default calling convention.
        let function: RawStateFn = unsafe { std::mem::transmute(code_ptr) };

        self.functions_compiled += 1;
        log::debug!("JIT compiled {symbol} for equation '{equation}'");

        Ok(JitFunction {
            symbol,
            equation: equation.to_string(),
            function,
        })
    }
}

/// Native state function produced by the JIT
#[derive(Debug, Clone)]
pub struct JitFunction {
    symbol: String,
    equation: String,
    function: RawStateFn,
}

impl JitFunction {
    /// Symbol the function was emitted under
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Equation the function computes
    pub fn equation(&self) -> &str {
        &self.equation
    }
}

impl StateFunction for JitFunction {
    #[inline]
    fn compute_value(&self, prev_state: &StateRecord, state: &StateRecord) -> f64 {
        (self.function)(prev_state, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_default_equation() {
        let function = JitCompiler::with_shared(|jit| jit.compile("state.value - prevState.value"))
            .unwrap();
        let result = function.compute_value(&StateRecord::new(31.0), &StateRecord::new(42.0));
        assert_eq!(result, 11.0);
        assert!(function.symbol().starts_with(SYMBOL_PREFIX));
    }

    #[test]
    fn test_modulo_uses_runtime_symbol() {
        let function =
            JitCompiler::with_shared(|jit| jit.compile("state.value % 4 + -prevState.value * 0.5"))
                .unwrap();
        let result = function.compute_value(&StateRecord::new(2.0), &StateRecord::new(11.0));
        assert_eq!(result, 2.0);
    }

    #[test]
    fn test_symbols_are_unique() {
        let first = JitCompiler::with_shared(|jit| jit.compile("state.value")).unwrap();
        let second = JitCompiler::with_shared(|jit| jit.compile("state.value")).unwrap();
        assert_ne!(first.symbol(), second.symbol());
    }

    #[test]
    fn test_invalid_equation_is_an_error() {
        let err = JitCompiler::with_shared(|jit| jit.compile("state.value +")).unwrap_err();
        assert!(matches!(err, EngineError::Parse(_)));
        let err = JitCompiler::with_shared(|jit| jit.compile("state.weight")).unwrap_err();
        assert!(matches!(err, EngineError::Compilation(_)));
    }
}
