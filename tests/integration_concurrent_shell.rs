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

//! Integration tests for concurrent shell evaluation

use std::sync::Arc;
use std::sync::Barrier;
use std::thread;

use state_function_bench::engines::{ShellSession, eval_shell};
use state_function_bench::{StateFunction, StateRecord};

const THREADS: usize = 8;
const ROUNDS: usize = 5;

#[test]
fn test_concurrent_sessions_do_not_cross_talk() {
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|id| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let (prev, state) = (StateRecord::new(1.0), StateRecord::new(2.0));
                for round in 0..ROUNDS {
                    // Each caller's equation yields a value only it can produce
                    let tag = (id * ROUNDS + round) as f64;
                    let equation = format!("state.value - prevState.value + {tag}.0");
                    let function = eval_shell(&equation).unwrap();
                    assert_eq!(function.compute_value(&prev, &state), 1.0 + tag);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_functions_can_move_across_threads() {
    let function: Arc<dyn StateFunction> =
        Arc::new(eval_shell("state.value * prevState.value").unwrap());

    let handles: Vec<_> = (1..=4)
        .map(|i| {
            let function = Arc::clone(&function);
            thread::spawn(move || {
                let value = i as f64;
                function.compute_value(&StateRecord::new(value), &StateRecord::new(value))
            })
        })
        .collect();

    let results: Vec<f64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results, vec![1.0, 4.0, 9.0, 16.0]);
}

#[test]
fn test_session_keeps_state_between_snippets() {
    let mut session = ShellSession::new();
    session.eval("let offset = 100.0;").unwrap();
    assert_eq!(session.eval("offset / 4.0").unwrap(), "25.0");
}
