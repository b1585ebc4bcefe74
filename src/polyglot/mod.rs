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

//! Isolated polyglot execution contexts
//!
//! A [`Context`] owns an embedded QuickJS runtime and hands back [`Value`]s.
//! Guest functions stay inside the runtime that created them and are called
//! back with host [`StateRecord`]s exposed as guest objects. What guest code
//! may see of those records is decided by the context's [`HostAccess`].
//!
//! ```rust
//! use state_function_bench::polyglot::{Context, HostAccess};
//! use state_function_bench::{StateFunction, StateRecord};
//!
//! let context = Context::builder()
//!     .allow_experimental_options(true)
//!     .allow_host_access(HostAccess::All)
//!     .build()
//!     .unwrap();
//! let value = context
//!     .eval("js", "(prevState, state) => state.value - prevState.value")
//!     .unwrap();
//! let function = value.as_state_function().unwrap();
//! assert_eq!(function.compute_value(&StateRecord::new(31.0), &StateRecord::new(42.0)), 11.0);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use rquickjs::{CatchResultExt, CaughtError, Ctx, Function, Object, Runtime};

use crate::error::{EngineError, Result};
use crate::state::{StateFunction, StateRecord};

/// Language ids a context can evaluate
pub const SUPPORTED_LANGUAGES: &[&str] = &["js"];

/// Evaluate guest source in strict mode; experimental
pub const STRICT_OPTION: &str = "js.strict";

/// Heap limit of the runtime in bytes
pub const MEMORY_LIMIT_OPTION: &str = "js.memory-limit";

/// Stack the runtime may use before raising a guest `RangeError`, in bytes
pub const STACK_SIZE_OPTION: &str = "js.stack-size";

/// Default guest stack budget, well inside a test thread's stack
const DEFAULT_STACK_SIZE: usize = 512 * 1024;

/// Global holding the stand-in passed for records when host access is off
const DENIED_RECORD: &str = "__host_denied_record";

const DENIED_RECORD_PRELUDE: &str = r#"
globalThis.__host_denied_record = new Proxy(Object.freeze({}), {
    get(_, member) {
        throw new TypeError("host access denied for member '" + String(member) + "'");
    },
});
"#;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// How much of the host guest code may touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostAccess {
    /// Records reach guest code as opaque objects whose members throw
    #[default]
    None,
    /// Records reach guest code as objects exposing `value`
    All,
}

/// Builder for [`Context`]
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    allow_experimental_options: bool,
    host_access: HostAccess,
    options: HashMap<String, String>,
}

impl ContextBuilder {
    /// Permit options marked experimental
    pub fn allow_experimental_options(mut self, allow: bool) -> Self {
        self.allow_experimental_options = allow;
        self
    }

    /// Set the host access policy
    pub fn allow_host_access(mut self, access: HostAccess) -> Self {
        self.host_access = access;
        self
    }

    /// Set a context option
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Validate the options and start the runtime
    pub fn build(self) -> Result<Context> {
        let mut strict = false;
        let mut memory_limit = None;
        let mut stack_size = DEFAULT_STACK_SIZE;

        for (key, value) in &self.options {
            let invalid = || EngineError::polyglot(format!("invalid value '{value}' for '{key}'"));
            match key.as_str() {
                STRICT_OPTION => {
                    if !self.allow_experimental_options {
                        return Err(EngineError::polyglot(format!(
                            "option '{key}' is experimental and experimental options are not allowed"
                        )));
                    }
                    strict = value.parse::<bool>().map_err(|_| invalid())?;
                }
                MEMORY_LIMIT_OPTION => {
                    memory_limit = Some(value.parse::<usize>().map_err(|_| invalid())?);
                }
                STACK_SIZE_OPTION => {
                    stack_size = value.parse::<usize>().map_err(|_| invalid())?;
                }
                _ => return Err(EngineError::polyglot(format!("unknown option '{key}'"))),
            }
        }

        let runtime = Runtime::new().map_err(|err| EngineError::polyglot(err.to_string()))?;
        runtime.set_max_stack_size(stack_size);
        if let Some(limit) = memory_limit {
            runtime.set_memory_limit(limit);
        }
        let inner = rquickjs::Context::full(&runtime)
            .map_err(|err| EngineError::polyglot(err.to_string()))?;

        if self.host_access == HostAccess::None {
            inner.with(|ctx| {
                ctx.eval::<(), _>(DENIED_RECORD_PRELUDE)
                    .catch(&ctx)
                    .map_err(guest_error)
            })?;
        }

        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        log::debug!("Created polyglot context #{id} (host access: {:?})", self.host_access);

        Ok(Context {
            id,
            host_access: self.host_access,
            strict,
            inner,
            next_slot: AtomicUsize::new(0),
        })
    }
}

/// Isolated guest-language execution context
pub struct Context {
    id: u64,
    host_access: HostAccess,
    strict: bool,
    inner: rquickjs::Context,
    next_slot: AtomicUsize,
}

impl Context {
    /// Start building a context
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// Create a context with default settings (no host access)
    pub fn create() -> Result<Self> {
        Self::builder().build()
    }

    /// Unique id of the context within the process
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Host access policy of the context
    pub fn host_access(&self) -> HostAccess {
        self.host_access
    }

    /// Evaluate `source` written in `language`
    ///
    /// A function evaluates to an executable [`Value`] that keeps the runtime
    /// alive. A number evaluates to its value. Any other result is an error.
    pub fn eval(&self, language: &str, source: &str) -> Result<Value> {
        if !SUPPORTED_LANGUAGES.contains(&language) {
            return Err(EngineError::UnsupportedLanguage {
                language: language.to_string(),
            });
        }

        let script = if self.strict {
            format!("\"use strict\";\n{source}")
        } else {
            source.to_string()
        };
        let slot = format!(
            "__guest_fn_{}",
            self.next_slot.fetch_add(1, Ordering::Relaxed)
        );

        self.inner.with(|ctx| {
            let value = ctx
                .eval::<rquickjs::Value, _>(script)
                .catch(&ctx)
                .map_err(guest_error)?;

            if value.is_function() {
                ctx.globals()
                    .set(slot.as_str(), value)
                    .catch(&ctx)
                    .map_err(guest_error)?;
                Ok(Value::Function(GuestFunction {
                    context_id: self.id,
                    host_access: self.host_access,
                    inner: self.inner.clone(),
                    slot,
                    source: source.trim().trim_end_matches(';').trim_end().to_string(),
                }))
            } else if let Some(number) = value.as_number() {
                Ok(Value::Number(number))
            } else {
                Err(EngineError::polyglot(format!(
                    "a {:?} value cannot be passed to the host",
                    value.type_of()
                )))
            }
        })
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("host_access", &self.host_access)
            .field("strict", &self.strict)
            .finish_non_exhaustive()
    }
}

fn guest_error(err: CaughtError<'_>) -> EngineError {
    EngineError::polyglot(err.to_string())
}

/// Expose a host record to guest code
fn host_record<'js>(
    ctx: &Ctx<'js>,
    record: &StateRecord,
    access: HostAccess,
) -> rquickjs::Result<rquickjs::Value<'js>> {
    match access {
        HostAccess::All => {
            let object = Object::new(ctx.clone())?;
            object.set("value", record.value)?;
            Ok(object.into_value())
        }
        HostAccess::None => ctx.globals().get(DENIED_RECORD),
    }
}

/// Guest function living in a context's runtime
#[derive(Clone)]
pub struct GuestFunction {
    context_id: u64,
    host_access: HostAccess,
    inner: rquickjs::Context,
    slot: String,
    source: String,
}

impl GuestFunction {
    /// Id of the context that evaluated the function
    pub fn context_id(&self) -> u64 {
        self.context_id
    }

    /// Source text the function was evaluated from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Call the function with a pair of host records
    pub fn call(&self, prev_state: &StateRecord, state: &StateRecord) -> Result<f64> {
        self.inner.with(|ctx| {
            let result = (|| {
                let function: Function = ctx.globals().get(self.slot.as_str())?;
                let prev = host_record(&ctx, prev_state, self.host_access)?;
                let current = host_record(&ctx, state, self.host_access)?;
                function.call::<_, rquickjs::Value>((prev, current))
            })()
            .catch(&ctx)
            .map_err(guest_error)?;

            result.as_number().ok_or_else(|| {
                EngineError::polyglot(format!(
                    "guest function returned a {:?} value, expected a number",
                    result.type_of()
                ))
            })
        })
    }
}

impl fmt::Debug for GuestFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestFunction")
            .field("context_id", &self.context_id)
            .field("slot", &self.slot)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Result of evaluating guest source
#[derive(Debug, Clone)]
pub enum Value {
    /// Guest number
    Number(f64),
    /// Executable guest function
    Function(GuestFunction),
}

impl Value {
    /// Get the number if this value is one
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(value) => Some(*value),
            Value::Function(_) => None,
        }
    }

    /// Whether the value can be executed
    pub fn can_execute(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    /// Bind a guest function to [`StateFunction`]
    pub fn as_state_function(self) -> Result<PolyglotFunction> {
        match self {
            Value::Function(function) => Ok(PolyglotFunction { function }),
            Value::Number(_) => Err(EngineError::polyglot("value is not executable")),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(value) => write!(f, "{value}"),
            Value::Function(function) => f.write_str(&function.source),
        }
    }
}

/// Guest function bound to the [`StateFunction`] capability
#[derive(Debug, Clone)]
pub struct PolyglotFunction {
    function: GuestFunction,
}

impl PolyglotFunction {
    /// Underlying guest function
    pub fn guest(&self) -> &GuestFunction {
        &self.function
    }
}

impl StateFunction for PolyglotFunction {
    fn compute_value(&self, prev_state: &StateRecord, state: &StateRecord) -> f64 {
        match self.function.call(prev_state, state) {
            Ok(value) => value,
            Err(err) => {
                log::error!("Guest function failed: {err}");
                f64::NAN
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_access() -> Context {
        Context::builder()
            .allow_experimental_options(true)
            .allow_host_access(HostAccess::All)
            .build()
            .unwrap()
    }

    #[test]
    fn test_eval_arrow_function() {
        let value = full_access()
            .eval("js", "(prevState, state) => state.value - prevState.value")
            .unwrap();
        assert!(value.can_execute());
        let function = value.as_state_function().unwrap();
        let result = function
            .guest()
            .call(&StateRecord::new(31.0), &StateRecord::new(42.0))
            .unwrap();
        assert_eq!(result, 11.0);
    }

    #[test]
    fn test_eval_plain_expression() {
        let value = full_access().eval("js", "6 * 7").unwrap();
        assert_eq!(value.as_number(), Some(42.0));
        assert!(!value.can_execute());
    }

    #[test]
    fn test_other_values_stay_in_the_guest() {
        let err = full_access().eval("js", "'text'").unwrap_err();
        assert!(matches!(err, EngineError::Polyglot { .. }));
    }

    #[test]
    fn test_unsupported_language() {
        let err = full_access().eval("python", "lambda: 1").unwrap_err();
        assert_eq!(
            err,
            EngineError::UnsupportedLanguage {
                language: "python".to_string()
            }
        );
    }

    #[test]
    fn test_guest_exceptions_are_errors() {
        let context = full_access();
        assert!(context.eval("js", "(a, b) =>").is_err());

        let function = context
            .eval("js", "(a, b) => { throw new Error('boom'); }")
            .unwrap()
            .as_state_function()
            .unwrap();
        let err = function
            .guest()
            .call(&StateRecord::new(1.0), &StateRecord::new(2.0))
            .unwrap_err();
        assert!(err.to_string().contains("boom"), "{err}");
        assert!(
            function
                .compute_value(&StateRecord::new(1.0), &StateRecord::new(2.0))
                .is_nan()
        );
    }

    #[test]
    fn test_experimental_option_requires_permission() {
        let err = Context::builder()
            .option(STRICT_OPTION, "true")
            .build()
            .unwrap_err();
        assert!(matches!(err, EngineError::Polyglot { .. }));

        let context = Context::builder()
            .allow_experimental_options(true)
            .allow_host_access(HostAccess::All)
            .option(STRICT_OPTION, "true")
            .build()
            .unwrap();
        // Assigning to an undeclared variable only throws in strict mode
        let function = context
            .eval("js", "(a, b) => { leaked = 1; return b.value; }")
            .unwrap()
            .as_state_function()
            .unwrap();
        assert!(
            function
                .guest()
                .call(&StateRecord::new(1.0), &StateRecord::new(2.0))
                .is_err()
        );
    }

    #[test]
    fn test_option_values_are_checked() {
        assert!(Context::builder().option("js.unknown", "true").build().is_err());
        assert!(
            Context::builder()
                .option(MEMORY_LIMIT_OPTION, "plenty")
                .build()
                .is_err()
        );
        assert!(
            Context::builder()
                .option(STACK_SIZE_OPTION, "262144")
                .build()
                .is_ok()
        );
    }

    #[test]
    fn test_contexts_are_isolated() {
        let first = full_access();
        let second = full_access();
        assert_ne!(first.id(), second.id());

        first.eval("js", "globalThis.shared = 5").unwrap();
        assert!(second.eval("js", "shared").is_err());
    }
}
