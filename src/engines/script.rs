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

//! Embedded script engine strategy backed by rhai

use rhai::{AST, CallFnOptions, Dynamic, Engine, Scope};

use super::rhai_support::{new_engine, to_number};
use crate::error::{EngineError, Result};
use crate::state::{FallbackFunction, StateFunction, StateRecord};
use crate::{PREV_STATE_PARAM, STATE_PARAM};

/// Name of the script function wrapping the equation
pub const SCRIPT_FUNCTION: &str = "computeValue";

/// Equation wrapped in a named script function
pub struct ScriptFunction {
    engine: Engine,
    ast: AST,
}

impl ScriptFunction {
    fn call(&self, prev_state: &StateRecord, state: &StateRecord) -> Result<f64> {
        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
        let result = self
            .engine
            .call_fn_with_options::<Dynamic>(
                options,
                &mut Scope::new(),
                &self.ast,
                SCRIPT_FUNCTION,
                (*prev_state, *state),
            )
            .map_err(|err| EngineError::script(err.to_string()))?;
        to_number(result).map_err(EngineError::script)
    }

    /// Generated script source
    pub fn source(&self) -> Option<&str> {
        self.ast.source()
    }
}

impl StateFunction for ScriptFunction {
    fn compute_value(&self, prev_state: &StateRecord, state: &StateRecord) -> f64 {
        match self.call(prev_state, state) {
            Ok(value) => value,
            Err(err) => {
                log::error!("Script function failed: {err}");
                f64::NAN
            }
        }
    }
}

/// Compile `equation` into a rhai function and bind it to [`StateFunction`]
///
/// Only compilation happens here. Failures that need real inputs, such as a
/// member records do not have, surface when the function is called.
pub fn compile_script(equation: &str) -> Result<ScriptFunction> {
    let engine = new_engine();
    let source = format!(
        "fn {SCRIPT_FUNCTION}({PREV_STATE_PARAM}, {STATE_PARAM}) {{ return {equation}; }}"
    );
    let mut ast = engine
        .compile(&source)
        .map_err(|err| EngineError::script(err.to_string()))?;
    ast.set_source(source.as_str());

    log::debug!("Bound script function for '{equation}'");
    Ok(ScriptFunction { engine, ast })
}

/// Compile `equation`, substituting a zero-returning stub on failure
pub fn eval_script(equation: &str) -> Box<dyn StateFunction> {
    match compile_script(equation) {
        Ok(function) => Box::new(function),
        Err(err) => {
            log::error!("Script engine could not bind '{equation}': {err}");
            Box::new(FallbackFunction::new(err.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_difference() {
        let function = compile_script("state.value - prevState.value").unwrap();
        let result = function.compute_value(&StateRecord::new(31.0), &StateRecord::new(42.0));
        assert_eq!(result, 11.0);
        assert!(function.source().unwrap().contains("fn computeValue"));
    }

    #[test]
    fn test_integer_results_are_numbers() {
        let function = compile_script("40 + 2").unwrap();
        let result = function.compute_value(&StateRecord::new(0.0), &StateRecord::new(0.0));
        assert_eq!(result, 42.0);
    }

    #[test]
    fn test_undeclared_variable_falls_back() {
        let function = eval_script("unknown.value");
        assert!(function.is_fallback());
        assert_eq!(
            function.compute_value(&StateRecord::new(31.0), &StateRecord::new(42.0)),
            0.0
        );
    }

    #[test]
    fn test_unknown_member_fails_at_call_time() {
        let function = compile_script("state.weight").unwrap();
        assert!(!function.is_fallback());
        assert!(
            function
                .compute_value(&StateRecord::new(31.0), &StateRecord::new(42.0))
                .is_nan()
        );
    }

    #[test]
    fn test_equation_undefined_at_zero() {
        let function =
            compile_script("100 / (state.value.to_int() - prevState.value.to_int())").unwrap();
        let result = function.compute_value(&StateRecord::new(31.0), &StateRecord::new(42.0));
        assert_eq!(result, 9.0);
    }

    #[test]
    fn test_syntax_error_is_reported() {
        assert!(matches!(
            compile_script("state.value +"),
            Err(EngineError::Script { .. })
        ));
    }
}
