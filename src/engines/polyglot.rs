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

//! Polyglot context strategy

use crate::error::Result;
use crate::polyglot::{Context, HostAccess, PolyglotFunction};
use crate::{PREV_STATE_PARAM, STATE_PARAM};

/// Guest language the equation is embedded in
pub const GUEST_LANGUAGE: &str = "js";

/// Evaluate `(prevState, state) => <equation>` in a fresh isolated context
///
/// The context allows experimental options and full host access. Context
/// construction and evaluation failures propagate. The function itself is
/// not called here.
pub fn eval_polyglot(equation: &str) -> Result<PolyglotFunction> {
    let context = Context::builder()
        .allow_experimental_options(true)
        .allow_host_access(HostAccess::All)
        .build()?;
    let source = format!("({PREV_STATE_PARAM}, {STATE_PARAM}) => {equation}");
    context.eval(GUEST_LANGUAGE, &source)?.as_state_function()
}
