//! CLI driver: run one bundled scenario for a configurable number of
//! executions, or list what's bundled. Following the teacher's
//! `#[derive(Parser)]`/`#[derive(Subcommand)]` shape.

use axiomck_conformance::scenarios::ScenarioName;
use axiomck_conformance::run_scenario;
use axiomck_core::{CheckerConfig, EngineError, RandomFuzzer};
use clap::{Parser, Subcommand};
use log::info;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "axiomck", about = "A stateless model checker for the C/C++11 relaxed memory model")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one bundled scenario for some number of executions.
    Run {
        /// One of: iriw, message-passing, mutex-exclusion, cas-coalescing, deadlock, notify.
        scenario: String,
        /// How many independent executions to explore.
        #[arg(long, default_value_t = 1000)]
        executions: u32,
        /// The value an uninitialized read observes.
        #[arg(long, default_value_t = 0)]
        uninit_value: u64,
        /// Repeat for more log detail (-v, -vv, -vvv).
        #[arg(short, long, action = clap::ArgAction::Count)]
        verbose: u8,
    },
    /// List the bundled scenarios.
    List,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::List => {
            for name in ScenarioName::ALL {
                println!("{name:<16} {}", name.description());
            }
            ExitCode::SUCCESS
        }
        Commands::Run { scenario, executions, uninit_value, verbose } => {
            let Ok(name) = scenario.parse::<ScenarioName>() else {
                eprintln!("unknown scenario '{scenario}' — run `axiomck list` to see what's bundled");
                return ExitCode::FAILURE;
            };

            let config = CheckerConfig::default()
                .with_verbose(verbose)
                .with_max_executions(executions)
                .with_uninitialized_value(uninit_value);

            let mut internal_failure = false;
            let mut total_bugs = 0usize;

            for i in 0..executions {
                let fuzzer = Box::new(RandomFuzzer::with_seed(u64::from(i) * 2 + 1));
                let report = run_scenario(name, config.clone(), fuzzer);
                total_bugs += report.bugs.len();
                for bug in &report.bugs {
                    println!("{bug}");
                    if matches!(bug.kind, EngineError::InvalidSync { .. }) {
                        internal_failure = true;
                    }
                }
            }

            info!("ran {executions} execution(s) of {name}, {total_bugs} bug(s) reported");
            println!("{name}: {executions} execution(s) explored, {total_bugs} bug(s) reported");

            if internal_failure {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
    }
}
