//! testgate - test session log verifier.
//!
//! Runs the target program as a subprocess, feeds it the fixed stimulus,
//! validates the emitted log stream against the session protocol and prints
//! a summary.
//!
//! # Exit Codes
//!
//! - 0: session finished, no protocol violation, no failing tests
//! - 1: anything else (spawn failure, violation, unfinished session,
//!   failing tests)
//!
//! The child's own exit status is advisory: it is reported, but only the
//! protocol verdict and the failure tally choose the exit code.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use testgate_core::protocol::Grammar;
use testgate_core::runner::{run_and_verify, RunSpec, SessionReport, Termination};
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Exit codes chosen by the verifier.
mod exit_codes {
    /// The session finished cleanly and every test passed.
    pub const SUCCESS: u8 = 0;
    /// Spawn failure, protocol violation, unfinished session or failing
    /// tests.
    pub const FAILURE: u8 = 1;
}

/// testgate - runs a test-producing program and verifies its session log.
#[derive(Parser, Debug)]
#[command(name = "testgate")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Grammar variant for the end-of-test marker
    #[arg(long, value_enum, default_value = "sequential")]
    grammar: GrammarArg,

    /// Wall-clock deadline for the child process, in seconds
    #[arg(long, default_value_t = 20)]
    deadline_secs: u64,

    /// Write the captured output stream to this file for debugging
    #[arg(long)]
    capture: Option<PathBuf>,

    /// Emit the report as JSON instead of a human-readable summary
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Target executable followed by its arguments
    #[arg(required = true, trailing_var_arg = true)]
    command: Vec<String>,
}

/// CLI spelling of the grammar variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum GrammarArg {
    /// One test at a time; bare end marker plus explicit failure marker
    Sequential,
    /// Overlapping tests; named end markers with inline outcome
    Nesting,
}

impl From<GrammarArg> for Grammar {
    fn from(arg: GrammarArg) -> Self {
        match arg {
            GrammarArg::Sequential => Self::Sequential,
            GrammarArg::Nesting => Self::NestingTolerant,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match verify(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_codes::FAILURE)
        },
    }
}

async fn verify(cli: Cli) -> Result<ExitCode> {
    let (command, args) = cli
        .command
        .split_first()
        .context("no target command given")?;

    let spec = RunSpec::new(command)
        .with_args(args.to_vec())
        .with_deadline(Duration::from_secs(cli.deadline_secs));
    let grammar = Grammar::from(cli.grammar);

    let report = run_and_verify(&spec, grammar)
        .await
        .with_context(|| format!("could not run '{command}'"))?;

    if let Some(path) = &cli.capture {
        std::fs::write(path, &report.output)
            .with_context(|| format!("could not write capture to '{}'", path.display()))?;
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    let code = if report.verdict.all_passed() {
        exit_codes::SUCCESS
    } else {
        exit_codes::FAILURE
    };
    Ok(ExitCode::from(code))
}

fn print_summary(report: &SessionReport) {
    match report.termination {
        Termination::Completed => {},
        Termination::AbnormalExit { .. } | Termination::DeadlineExpired => {
            warn!(termination = %report.termination, "target did not stop cleanly");
            println!("Target stopped with: {}", report.termination);
        },
    }

    if let Some(violation) = &report.verdict.violation {
        println!("Error: {violation}");
        return;
    }

    println!("Tests ran: {}", report.verdict.tests_run());
    println!("Failing tests: {}", report.verdict.failed.len());
    for name in &report.verdict.failed {
        println!("Failed test {name}");
    }

    if !report.verdict.finished {
        println!("Unexpected end of logs");
    }
}
