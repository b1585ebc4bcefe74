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

//! State function benchmark harness
//!
//! Measures what it costs to evaluate a small runtime-supplied equation against
//! two state records, using several evaluation strategies:
//!
//! - a hand-written native closure (the baseline)
//! - Cranelift JIT compilation of the equation text
//! - a REPL-style rhai shell session
//! - a rhai script engine function
//! - an arrow-function literal evaluated in an isolated QuickJS context
//!
//! ```rust,no_run
//! use state_function_bench::{EngineKind, StateFunction, StateRecord};
//!
//! let function = EngineKind::Polyglot
//!     .instantiate("state.value - prevState.value")
//!     .unwrap();
//! let prev = StateRecord::new(31.0);
//! let state = StateRecord::new(42.0);
//! assert_eq!(function.compute_value(&prev, &state), 11.0);
//! ```

pub mod ast;
pub mod compiler;
pub mod config;
pub mod driver;
pub mod engines;
pub mod error;
pub mod jit;
pub mod parser;
pub mod polyglot;
pub mod report;
pub mod state;

pub use config::BenchmarkConfig;
pub use driver::{BenchmarkDriver, BenchmarkResult, Statistics, Trial};
pub use engines::{
    EngineKind, compile_dynamic, compile_script, eval_dynamic, eval_native, eval_polyglot,
    eval_script, eval_shell,
};
pub use error::{EngineError, Result};
pub use report::BenchmarkReport;
pub use state::{FallbackFunction, StateFunction, StateRecord};

/// Equation benchmarked by default
pub const DEFAULT_EQUATION: &str = "state.value - prevState.value";

/// Name of the parameter bound to the previous timestep's record
pub const PREV_STATE_PARAM: &str = "prevState";

/// Name of the parameter bound to the current timestep's record
pub const STATE_PARAM: &str = "state";
