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

//! State records and the state function capability

use serde::{Deserialize, Serialize};

/// Observed value of one timestep
///
/// The layout is fixed so JIT-compiled code can load `value` by offset.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Observed value
    pub value: f64,
}

impl StateRecord {
    /// Create a record holding `value`
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

/// Function that computes a desired value based on the state of
/// the current and previous timesteps
pub trait StateFunction: Send + Sync {
    /// Compute the value for the given pair of records
    fn compute_value(&self, prev_state: &StateRecord, state: &StateRecord) -> f64;

    /// Failure that caused this function to be a stub, if it is one
    fn fallback_reason(&self) -> Option<&str> {
        None
    }

    /// Whether this function is a stub standing in for a strategy that failed to build
    fn is_fallback(&self) -> bool {
        self.fallback_reason().is_some()
    }
}

impl<F> StateFunction for F
where
    F: Fn(&StateRecord, &StateRecord) -> f64 + Send + Sync,
{
    #[inline]
    fn compute_value(&self, prev_state: &StateRecord, state: &StateRecord) -> f64 {
        self(prev_state, state)
    }
}

/// Zero-returning stub used when a strategy is unavailable on this host
///
/// Unlike a legitimate zero result, the stub identifies itself through
/// [`StateFunction::is_fallback`] and keeps the failure that caused it.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackFunction {
    reason: String,
}

impl FallbackFunction {
    /// Create a stub recording why the real function could not be built
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Failure that caused the fallback
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl StateFunction for FallbackFunction {
    fn compute_value(&self, _prev_state: &StateRecord, _state: &StateRecord) -> f64 {
        0.0
    }

    fn fallback_reason(&self) -> Option<&str> {
        Some(&self.reason)
    }
}
