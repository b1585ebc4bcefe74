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

//! Dynamic compilation strategy backed by the Cranelift JIT

use crate::error::Result;
use crate::jit::{JitCompiler, JitFunction};
use crate::state::{FallbackFunction, StateFunction};

/// Compile `equation` to native code in the process-wide JIT module
///
/// Every call emits a new uniquely named function, even for an equation that
/// was compiled before.
pub fn compile_dynamic(equation: &str) -> Result<JitFunction> {
    JitCompiler::with_shared(|jit| jit.compile(equation))
}

/// Compile `equation`, substituting a zero-returning stub on failure
///
/// The failure is logged and kept as the stub's
/// [`reason`](FallbackFunction::reason).
pub fn eval_dynamic(equation: &str) -> Box<dyn StateFunction> {
    match compile_dynamic(equation) {
        Ok(function) => Box::new(function),
        Err(err) => {
            log::error!("Dynamic compilation of '{equation}' failed: {err}");
            Box::new(FallbackFunction::new(err.to_string()))
        }
    }
}
