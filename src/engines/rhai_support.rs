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

//! rhai engine setup shared by the script and shell strategies

use rhai::{Dynamic, Engine};

use crate::state::StateRecord;

/// Create a rhai engine that understands [`StateRecord`]
///
/// Variables must be declared, so an equation naming anything but its
/// parameters (or session variables) fails to compile.
pub(crate) fn new_engine() -> Engine {
    let mut engine = Engine::new();
    engine.set_strict_variables(true);
    engine
        .register_type_with_name::<StateRecord>("StateRecord")
        .register_get("value", |record: &mut StateRecord| record.value);
    engine
}

/// Convert a script result to a number, accepting integers
pub(crate) fn to_number(value: Dynamic) -> std::result::Result<f64, String> {
    if let Ok(float) = value.as_float() {
        return Ok(float);
    }
    value
        .as_int()
        .map(|int| int as f64)
        .map_err(|type_name| format!("expected a number, got {type_name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhai::Scope;

    #[test]
    fn test_records_expose_value() {
        let engine = new_engine();
        let mut scope = Scope::new();
        scope.push("state", StateRecord::new(2.5));
        let result: f64 = engine.eval_with_scope(&mut scope, "state.value * 2.0").unwrap();
        assert_eq!(result, 5.0);
    }

    #[test]
    fn test_undeclared_variables_do_not_compile() {
        assert!(new_engine().compile("unknown.value").is_err());
        assert!(new_engine().compile("let known = 1; known + 1").is_ok());
    }

    #[test]
    fn test_to_number() {
        assert_eq!(to_number(Dynamic::from_float(1.5)), Ok(1.5));
        assert_eq!(to_number(Dynamic::from_int(9)), Ok(9.0));
        assert!(to_number(Dynamic::from("text".to_string())).is_err());
    }
}
