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

//! State function benchmark CLI
//!
//! Runs the throughput benchmark, evaluates single equations and offers an
//! interactive shell session.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand};
use state_function_bench::compiler::ExpressionCompiler;
use state_function_bench::engines::ShellSession;
use state_function_bench::{
    BenchmarkConfig, BenchmarkDriver, BenchmarkReport, DEFAULT_EQUATION, EngineKind,
    PREV_STATE_PARAM, STATE_PARAM, StateRecord, parser,
};

#[derive(Parser)]
#[command(name = "state-function-bench")]
#[command(about = "Compare the throughput of native, JIT-compiled, scripted and interpreted state functions")]
#[command(version)]
#[command(author = "OctoFHIR Team <funyloony@gmail.com>")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the throughput benchmark
    Run {
        /// Regular expression selecting benchmarks by name
        #[arg(short, long)]
        include: Option<String>,
        /// Number of forks
        #[arg(short, long)]
        forks: Option<usize>,
        /// Warm-up iterations per fork
        #[arg(short, long)]
        warmup: Option<usize>,
        /// Measurement iterations per fork
        #[arg(long)]
        iterations: Option<usize>,
        /// Length of one iteration in milliseconds
        #[arg(long)]
        time_ms: Option<u64>,
        /// Seed of the random input sequence
        #[arg(long)]
        seed: Option<u64>,
        /// Equation over prevState and state
        #[arg(short, long)]
        equation: Option<String>,
        /// JSON configuration file; flags override its values
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Fail instead of measuring a fallback stub
        #[arg(long)]
        strict: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Evaluate an equation once with one strategy
    Eval {
        /// Strategy name (native, dynamic, shell, script, polyglot)
        engine: EngineKind,
        /// Equation over prevState and state
        #[arg(short, long, default_value = DEFAULT_EQUATION)]
        equation: String,
        /// Value of the previous record
        #[arg(long, allow_hyphen_values = true)]
        prev: f64,
        /// Value of the current record
        #[arg(long, allow_hyphen_values = true)]
        current: f64,
    },
    /// Print the bytecode an equation compiles to
    Compile {
        /// Equation over prevState and state
        equation: String,
    },
    /// List benchmark names
    List,
    /// Start an interactive shell session
    Repl,
}

fn main() -> Result<()> {
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            include,
            forks,
            warmup,
            iterations,
            time_ms,
            seed,
            equation,
            config,
            strict,
            json,
        } => {
            let mut config = match config {
                Some(path) => BenchmarkConfig::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => BenchmarkConfig::default(),
            };
            config.include = include.or(config.include);
            config.forks = forks.unwrap_or(config.forks);
            config.warmup_iterations = warmup.unwrap_or(config.warmup_iterations);
            config.measurement_iterations = iterations.unwrap_or(config.measurement_iterations);
            config.iteration_time_ms = time_ms.unwrap_or(config.iteration_time_ms);
            config.seed = seed.unwrap_or(config.seed);
            config.equation = equation.unwrap_or(config.equation);
            config.fail_on_fallback |= strict;
            handle_run(config, json)
        }
        Commands::Eval {
            engine,
            equation,
            prev,
            current,
        } => handle_eval(engine, &equation, prev, current),
        Commands::Compile { equation } => handle_compile(&equation),
        Commands::List => {
            for kind in EngineKind::all() {
                println!("{}", kind.benchmark_name());
            }
            Ok(())
        }
        Commands::Repl => handle_repl(),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn handle_run(config: BenchmarkConfig, json: bool) -> Result<()> {
    let equation = config.equation.clone();
    let driver = BenchmarkDriver::new(config)?;
    let results = driver.run_selected()?;
    if results.is_empty() {
        bail!("no benchmark matches the include pattern");
    }

    let report = BenchmarkReport::new(equation, results);
    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.format_table());
    }
    Ok(())
}

fn handle_eval(engine: EngineKind, equation: &str, prev: f64, current: f64) -> Result<()> {
    let function = engine
        .instantiate(equation)
        .with_context(|| format!("building {engine} for '{equation}'"))?;
    let result = function.compute_value(&StateRecord::new(prev), &StateRecord::new(current));
    match function.fallback_reason() {
        Some(reason) => println!("{result} (fallback: {reason})"),
        None => println!("{result}"),
    }
    Ok(())
}

fn handle_compile(equation: &str) -> Result<()> {
    let expr = parser::parse(equation)?;
    let params = [PREV_STATE_PARAM.to_string(), STATE_PARAM.to_string()];
    let bytecode = ExpressionCompiler::new().compile(&expr, &params)?;
    print!("{}", bytecode.disassemble());
    Ok(())
}

fn handle_repl() -> Result<()> {
    let mut session = ShellSession::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    println!("state-function-bench shell, end with Ctrl-D");
    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            println!();
            return Ok(());
        }
        let snippet = line.trim();
        if snippet.is_empty() {
            continue;
        }

        match session.eval(snippet) {
            Ok(output) if output.is_empty() => {}
            Ok(output) => println!("{output}"),
            Err(err) => eprintln!("{err}"),
        }
    }
}
