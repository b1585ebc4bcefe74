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

//! Benchmark report rendering

use comfy_table::{Table, presets::UTF8_FULL};
use serde::{Deserialize, Serialize};

use crate::driver::BenchmarkResult;
use crate::error::Result;

/// Marker appended to the name of a row that measured a fallback stub
pub const FALLBACK_MARKER: &str = "(fallback)";

/// Results of a benchmark run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    /// Equation that was benchmarked
    pub equation: String,
    /// One row per strategy
    pub results: Vec<BenchmarkResult>,
}

impl BenchmarkReport {
    /// Create a report
    pub fn new(equation: impl Into<String>, results: Vec<BenchmarkResult>) -> Self {
        Self {
            equation: equation.into(),
            results,
        }
    }

    /// Whether any row measured a fallback stub
    pub fn has_fallbacks(&self) -> bool {
        self.results.iter().any(|r| r.fallback)
    }

    /// Format the report as a table
    pub fn format_table(&self) -> String {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Benchmark", "Mode", "Cnt", "Score", "Error", "Units"]);

        for result in &self.results {
            table.add_row(vec![
                row_name(result),
                result.mode.clone(),
                result.count.to_string(),
                format!("{:.3}", result.score),
                format!("± {:.3}", result.error),
                result.units.clone(),
            ]);
        }

        format!("\nEquation: {}\n{table}\n", self.equation)
    }

    /// Format the report as aligned plain text
    pub fn format_text(&self) -> String {
        let width = self
            .results
            .iter()
            .map(|r| row_name(r).len())
            .max()
            .unwrap_or(0)
            .max("Benchmark".len());

        let mut output = format!(
            "{:<width$}  {:>5}  {:>3}  {:>10}    {:>8}  Units\n",
            "Benchmark", "Mode", "Cnt", "Score", "Error"
        );
        for result in &self.results {
            output.push_str(&format!(
                "{:<width$}  {:>5}  {:>3}  {:>10.3} ± {:>8.3}  {}\n",
                row_name(result),
                result.mode,
                result.count,
                result.score,
                result.error,
                result.units
            ));
        }
        output
    }

    /// Serialize the report as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn row_name(result: &BenchmarkResult) -> String {
    if result.fallback {
        highlight(&format!("{} {FALLBACK_MARKER}", result.name))
    } else {
        result.name.clone()
    }
}

#[cfg(feature = "terminal")]
fn highlight(text: &str) -> String {
    use colored::Colorize;
    text.yellow().to_string()
}

#[cfg(not(feature = "terminal"))]
fn highlight(text: &str) -> String {
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, fallback: bool) -> BenchmarkResult {
        BenchmarkResult {
            name: name.to_string(),
            mode: "thrpt".to_string(),
            count: 10,
            score: 31.325,
            error: 0.231,
            units: "ops/us".to_string(),
            fallback,
            samples: vec![31.325; 10],
        }
    }

    #[test]
    fn test_table_columns() {
        let report = BenchmarkReport::new(
            "state.value - prevState.value",
            vec![result("eval_native", false)],
        );
        let table = report.format_table();
        for column in ["Benchmark", "Mode", "Cnt", "Score", "Error", "Units"] {
            assert!(table.contains(column), "missing {column}");
        }
        assert!(table.contains("eval_native"));
        assert!(table.contains("31.325"));
        assert!(table.contains("± 0.231"));
        assert!(!report.has_fallbacks());
    }

    #[test]
    fn test_fallback_rows_are_marked() {
        let report = BenchmarkReport::new("x", vec![result("eval_script", true)]);
        assert!(report.has_fallbacks());
        assert!(report.format_text().contains(FALLBACK_MARKER));
    }

    #[test]
    fn test_json_round_trip() {
        let report = BenchmarkReport::new("x", vec![result("eval_shell", false)]);
        let json = report.to_json().unwrap();
        let parsed: BenchmarkReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }
}
