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

//! Native baseline strategy

use crate::state::{StateFunction, StateRecord};

/// Hand-written `state.value - prevState.value`, the reference every other
/// strategy is checked against
///
/// The equation is fixed at compile time, so none is accepted.
pub fn eval_native() -> impl StateFunction + Copy + 'static {
    |prev_state: &StateRecord, state: &StateRecord| state.value - prev_state.value
}
