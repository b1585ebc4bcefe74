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

//! Evaluation strategies
//!
//! Each strategy turns an equation into a [`StateFunction`]. The set is
//! closed and enumerated by [`EngineKind`].
//!
//! | Strategy | Backing facility | On construction failure |
//! |----------|------------------|-------------------------|
//! | native   | hand-written closure | cannot fail |
//! | dynamic  | Cranelift JIT | logs and returns a [`FallbackFunction`](crate::state::FallbackFunction) |
//! | shell    | rhai shell session | propagates |
//! | script   | rhai script function | logs and returns a [`FallbackFunction`](crate::state::FallbackFunction) |
//! | polyglot | isolated QuickJS context | propagates |

pub mod dynamic;
pub mod native;
pub mod polyglot;
mod rhai_support;
pub mod script;
pub mod shell;

pub use dynamic::{compile_dynamic, eval_dynamic};
pub use native::eval_native;
pub use polyglot::eval_polyglot;
pub use script::{ScriptFunction, compile_script, eval_script};
pub use shell::{ShellFunction, ShellSession, eval_shell};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::state::StateFunction;

/// Evaluation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Hand-written baseline
    Native,
    /// Equation compiled to native code at runtime
    Dynamic,
    /// Lambda taken out of a shell session
    Shell,
    /// Function declared in an embedded script engine
    Script,
    /// Arrow function evaluated in a polyglot context
    Polyglot,
}

impl EngineKind {
    /// Every strategy, in report order
    pub const ALL: [EngineKind; 5] = [
        EngineKind::Native,
        EngineKind::Dynamic,
        EngineKind::Shell,
        EngineKind::Script,
        EngineKind::Polyglot,
    ];

    /// Every strategy, in report order
    pub fn all() -> &'static [EngineKind] {
        &Self::ALL
    }

    /// Short lowercase name
    pub fn name(self) -> &'static str {
        match self {
            EngineKind::Native => "native",
            EngineKind::Dynamic => "dynamic",
            EngineKind::Shell => "shell",
            EngineKind::Script => "script",
            EngineKind::Polyglot => "polyglot",
        }
    }

    /// Name the strategy is reported and filtered under
    pub fn benchmark_name(self) -> &'static str {
        match self {
            EngineKind::Native => "eval_native",
            EngineKind::Dynamic => "eval_dynamic",
            EngineKind::Shell => "eval_shell",
            EngineKind::Script => "eval_script",
            EngineKind::Polyglot => "eval_polyglot",
        }
    }

    /// Whether construction failures are replaced by a zero-returning stub
    pub fn has_fallback(self) -> bool {
        matches!(self, EngineKind::Dynamic | EngineKind::Script)
    }

    /// Build the state function for `equation`, applying the strategy's failure policy
    ///
    /// The native strategy ignores `equation`.
    pub fn instantiate(self, equation: &str) -> Result<Box<dyn StateFunction>> {
        log::debug!("Instantiating {} for '{equation}'", self.benchmark_name());
        Ok(match self {
            EngineKind::Native => Box::new(eval_native()),
            EngineKind::Dynamic => eval_dynamic(equation),
            EngineKind::Shell => Box::new(eval_shell(equation)?),
            EngineKind::Script => eval_script(equation),
            EngineKind::Polyglot => Box::new(eval_polyglot(equation)?),
        })
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.benchmark_name())
    }
}

impl FromStr for EngineKind {
    type Err = EngineError;

    /// Accepts the short name or the benchmark name, case-insensitively
    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        let name = lowered.strip_prefix("eval_").unwrap_or(&lowered);
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| EngineError::config(format!("unknown engine '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateRecord;

    #[test]
    fn test_names() {
        let names: Vec<_> = EngineKind::all().iter().map(|k| k.benchmark_name()).collect();
        assert_eq!(
            names,
            vec!["eval_native", "eval_dynamic", "eval_shell", "eval_script", "eval_polyglot"]
        );
    }

    #[test]
    fn test_from_str() {
        assert_eq!("shell".parse::<EngineKind>().unwrap(), EngineKind::Shell);
        assert_eq!("EVAL_Polyglot".parse::<EngineKind>().unwrap(), EngineKind::Polyglot);
        assert!("graal".parse::<EngineKind>().is_err());
    }

    #[test]
    fn test_fallback_policy() {
        assert!(EngineKind::Dynamic.has_fallback());
        assert!(EngineKind::Script.has_fallback());
        assert!(!EngineKind::Shell.has_fallback());
        assert!(!EngineKind::Polyglot.has_fallback());
    }

    #[test]
    fn test_instantiate_all() {
        let (prev, state) = (StateRecord::new(31.0), StateRecord::new(42.0));
        for kind in EngineKind::all() {
            let function = kind.instantiate("state.value - prevState.value").unwrap();
            assert_eq!(function.compute_value(&prev, &state), 11.0, "{kind}");
        }
    }
}
