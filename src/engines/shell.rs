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

//! REPL-style shell strategy
//!
//! A [`ShellSession`] evaluates snippets against a persistent scope and, like
//! an interactive shell, reports results only as text. To get a callable
//! lambda out of the session, the snippet passes it to the built-in `emit`
//! function, which sends it over a channel owned by the session. Each session
//! has its own engine and channel, so concurrent sessions cannot observe each
//! other's lambdas.

use std::sync::Arc;

use rhai::{AST, Dynamic, Engine, EvalAltResult, FnPtr, Scope};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

use super::rhai_support::{new_engine, to_number};
use crate::error::{EngineError, Result};
use crate::state::{StateFunction, StateRecord};
use crate::{PREV_STATE_PARAM, STATE_PARAM};

/// Built-in function a snippet calls to hand a lambda to the host
pub const EMIT_FUNCTION: &str = "emit";

/// In-process shell session
pub struct ShellSession {
    engine: Arc<Engine>,
    scope: Scope<'static>,
    emitted: UnboundedReceiver<FnPtr>,
    snippets: usize,
}

impl ShellSession {
    /// Start a new session
    pub fn new() -> Self {
        let (sender, emitted) = unbounded_channel();

        let mut engine = new_engine();
        engine.register_fn(
            EMIT_FUNCTION,
            move |function: FnPtr| -> std::result::Result<(), Box<EvalAltResult>> {
                sender
                    .send(function)
                    .map_err(|_| "shell session has been closed".into())
            },
        );

        log::debug!("Started shell session");
        Self {
            engine: Arc::new(engine),
            scope: Scope::new(),
            emitted,
            snippets: 0,
        }
    }

    /// Number of snippets evaluated so far
    pub fn snippets_evaluated(&self) -> usize {
        self.snippets
    }

    fn run(&mut self, snippet: &str) -> Result<(AST, Dynamic)> {
        self.snippets += 1;
        let ast = self
            .engine
            .compile_with_scope(&self.scope, snippet)
            .map_err(|err| EngineError::shell(err.to_string()))?;
        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut self.scope, &ast)
            .map_err(|err| EngineError::shell(err.to_string()))?;
        Ok((ast, result))
    }

    /// Evaluate a snippet and return its textual result
    ///
    /// Variables declared by a snippet stay visible to later snippets.
    pub fn eval(&mut self, snippet: &str) -> Result<String> {
        let (_, result) = self.run(snippet)?;
        Ok(if result.is_unit() {
            String::new()
        } else {
            result.to_string()
        })
    }

    /// Evaluate a lambda over `prevState` and `state` and take it out of the session
    ///
    /// The lambda is handed back without being called.
    pub fn evaluate_function(&mut self, equation: &str) -> Result<ShellFunction> {
        let snippet = format!("{EMIT_FUNCTION}(|{PREV_STATE_PARAM}, {STATE_PARAM}| {equation});");
        let (ast, _) = self.run(&snippet)?;

        let function = self
            .emitted
            .try_recv()
            .map_err(|_| EngineError::shell("snippet did not emit a function"))?;
        // Leave nothing behind for the next snippet
        while self.emitted.try_recv().is_ok() {}

        Ok(ShellFunction {
            engine: Arc::clone(&self.engine),
            ast,
            function,
        })
    }
}

impl Default for ShellSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        log::debug!("Closed shell session after {} snippets", self.snippets);
    }
}

/// Lambda taken out of a shell session
pub struct ShellFunction {
    engine: Arc<Engine>,
    ast: AST,
    function: FnPtr,
}

impl ShellFunction {
    fn call(&self, prev_state: &StateRecord, state: &StateRecord) -> Result<f64> {
        let result = self
            .function
            .call::<Dynamic>(&self.engine, &self.ast, (*prev_state, *state))
            .map_err(|err| EngineError::shell(err.to_string()))?;
        to_number(result).map_err(EngineError::shell)
    }
}

impl StateFunction for ShellFunction {
    fn compute_value(&self, prev_state: &StateRecord, state: &StateRecord) -> f64 {
        match self.call(prev_state, state) {
            Ok(value) => value,
            Err(err) => {
                log::error!("Shell function failed: {err}");
                f64::NAN
            }
        }
    }
}

/// Evaluate `equation` in a fresh shell session; failures propagate
pub fn eval_shell(equation: &str) -> Result<ShellFunction> {
    ShellSession::new().evaluate_function(equation)
}
