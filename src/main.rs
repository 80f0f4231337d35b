//! phpt-difftest CLI
//!
//! Runs a directory of directive-annotated PHP tests against a reference
//! interpreter and a compiler under test.

use anyhow::Context;
use clap::Parser;
use phpt_difftest::cancel::CancelToken;
use phpt_difftest::config::HarnessConfig;
use phpt_difftest::suite::{OutputFormat, Suite, SuiteReport};
use phpt_difftest::VERSION;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "phpt-difftest")]
#[command(author, version, about = "Differential test harness for PHP scripts and the compiler that builds them", long_about = None)]
struct Cli {
    /// Test file or directory (defaults to the configured root)
    #[arg(value_name = "ROOT")]
    root: Option<PathBuf>,

    /// Only run tests whose path contains this string
    #[arg(short, long)]
    filter: Option<String>,

    /// Worker threads (0 = one per CPU)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Per-invocation timeout in seconds
    #[arg(short, long, value_name = "SECS")]
    timeout: Option<f64>,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Report format printed to stdout
    #[arg(long, value_enum, default_value_t = OutputFormat::Summary)]
    format: OutputFormat,

    /// Also write the JSON report to this file
    #[arg(long, value_name = "FILE")]
    json_report: Option<PathBuf>,

    /// Report tests carrying this modifier as skipped (repeatable)
    #[arg(long = "skip-modifier", value_name = "MODIFIER")]
    skip_modifiers: Vec<String>,

    /// Reference interpreter executable
    #[arg(long, value_name = "PROG")]
    reference: Option<PathBuf>,

    /// Compiler executable
    #[arg(long, value_name = "PROG")]
    compiler: Option<PathBuf>,

    /// Verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let code = match run(cli) {
        Ok(report) => report.exit_code(),
        Err(e) => {
            eprintln!("error: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

fn run(cli: Cli) -> anyhow::Result<SuiteReport> {
    let format = cli.format;
    let json_report = cli.json_report.clone();
    let config = build_config(cli)?;
    debug!(version = VERSION, ?config, "configuration loaded");

    let cancel = CancelToken::new();
    cancel
        .install_signal_handlers()
        .context("failed to install signal handlers")?;

    let suite = Suite::new(config, cancel.clone()).context("failed to prepare test suite")?;
    let report = suite.run().context("failed to run test suite")?;

    print!("{}", report.render(format));
    if let Some(path) = json_report {
        let json = serde_json::to_string_pretty(&report.to_json())?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write JSON report to {}", path.display()))?;
    }
    if cancel.is_cancelled() {
        warn!("run was cancelled; unfinished tests are reported as errors");
    }
    Ok(report)
}

/// Defaults, then the config file, then command-line flags
fn build_config(cli: Cli) -> anyhow::Result<HarnessConfig> {
    let mut config = match &cli.config {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };

    if let Some(root) = cli.root {
        config.root = root;
    }
    if let Some(filter) = cli.filter {
        config.filter = Some(filter);
    }
    if let Some(jobs) = cli.jobs {
        config.jobs = jobs;
    }
    if let Some(secs) = cli.timeout {
        config.timeout = Duration::try_from_secs_f64(secs)
            .with_context(|| format!("invalid timeout {}", secs))?;
    }
    if !cli.skip_modifiers.is_empty() {
        config.skip_modifiers.extend(cli.skip_modifiers);
    }
    if let Some(program) = cli.reference {
        config.reference.program = program;
    }
    if let Some(program) = cli.compiler {
        config.subject.compile.program = program;
    }

    config.validate()?;
    Ok(config)
}
