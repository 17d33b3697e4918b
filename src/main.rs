//! randtest-e2e: CLI entry point.
//!
//! Checks that dieharder and the internal runs test agree on every generator.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use randtest_e2e::battery::{check_dieharder_available, find_dieharder_binary, Dieharder};
use randtest_e2e::controller::{ControllerConfig, FlakyRetryController};
use randtest_e2e::generators::Registry;
use randtest_e2e::significance::Significance;
use randtest_e2e::types::{load_config, CaseResult, Environment, HarnessConfig, Summary};

#[derive(Parser)]
#[command(name = "randtest-e2e")]
#[command(about = "E2E validation of randomness generators: dieharder vs runs test")]
#[command(version)]
struct Cli {
    /// Run all generators.
    #[arg(long)]
    all: bool,

    /// Run only these generators (repeatable).
    #[arg(short, long = "case", value_name = "NAME")]
    cases: Vec<String>,

    /// List generators and exit.
    #[arg(long)]
    list: bool,

    /// Harness config file (YAML).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Significance level, e.g. 0.01 or 1%.
    #[arg(short, long)]
    significance: Option<Significance>,

    /// Bytes per sample.
    #[arg(long)]
    sample_size: Option<usize>,

    /// Extra attempts allowed for flaky generators.
    #[arg(long)]
    flaky_attempts: Option<u32>,

    /// Path to dieharder binary (or set `DIEHARDER_BIN` env var).
    #[arg(short, long)]
    dieharder: Option<PathBuf>,

    /// Per sub-test dieharder timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Print results as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("randtest_e2e=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;
    let registry = Registry::builtin().select(&config.cases)?;

    if cli.list {
        print_registry(&registry);
        return Ok(());
    }

    let dieharder_version = check_dieharder_available(&config.dieharder).map_err(|_| {
        anyhow::anyhow!(
            "dieharder not found. Install with:\n  macOS: brew install dieharder\n  Ubuntu: apt install dieharder"
        )
    })?;

    println!("{}", "randtest-e2e".bold());
    println!("  dieharder: {}", config.dieharder.binary.display());
    println!("  version: {dieharder_version}");
    println!("  significance: {}", config.significance);
    println!("  sample size: {} bytes", config.sample_size);
    println!("  flaky attempts: {}", config.flaky_attempts);
    println!();

    if !cli.all && cli.cases.is_empty() {
        println!("Use --all to run all generators, or --case NAME");
        return Ok(());
    }

    let environment = Environment::capture(&config);
    let controller = FlakyRetryController::new(
        registry,
        Dieharder::new(config.dieharder.clone()),
        ControllerConfig::from_harness(&config, environment),
    );

    run_all_mode(&controller, cli.json)
}

fn build_config(cli: &Cli) -> anyhow::Result<HarnessConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            load_config(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?
        }
        None => HarnessConfig::default(),
    };

    if let Some(significance) = cli.significance {
        config.significance = significance;
    }
    if let Some(size) = cli.sample_size {
        config.sample_size = size;
    }
    if let Some(attempts) = cli.flaky_attempts {
        config.flaky_attempts = attempts;
    }
    if let Some(secs) = cli.timeout {
        config.dieharder.timeout = Duration::from_secs(secs);
    }
    if !cli.cases.is_empty() {
        config.cases.clone_from(&cli.cases);
    }

    // Explicit flag, then config file, then DIEHARDER_BIN / PATH.
    if let Some(ref binary) = cli.dieharder {
        config.dieharder.binary.clone_from(binary);
    } else if config.dieharder.binary == PathBuf::from("dieharder") {
        if let Some(found) = find_dieharder_binary() {
            config.dieharder.binary = found;
        }
    }

    Ok(config)
}

fn print_registry(registry: &Registry) {
    println!("{}", "Generators".bold());
    for case in registry.cases() {
        let mut flags = Vec::new();
        if case.fixed {
            flags.push("fixed");
        }
        if case.flaky {
            flags.push("flaky");
        }
        if case.expected_random {
            flags.push("random");
        }
        if case.requires_restricted_env {
            flags.push("restricted");
        }
        println!("  {:<18} {}", case.name, flags.join(", ").dimmed());
    }
}

fn run_all_mode(
    controller: &FlakyRetryController<Dieharder>,
    json: bool,
) -> anyhow::Result<()> {
    let start = Instant::now();
    let mut results = Vec::new();

    println!("{}", "Running generators...".cyan());

    for case in controller.registry().cases() {
        let result = controller.run_case(case);
        print_result(&result);
        results.push(result);
    }

    let elapsed = start.elapsed();

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }

    // Summary
    println!();
    println!("{}", "=".repeat(60));

    let summary = Summary::from_results(&results);

    if summary.is_success() {
        println!(
            "  {} {} passed, {} skipped in {:.2}s",
            "PASS".green(),
            summary.passed.to_string().green(),
            summary.skipped,
            elapsed.as_secs_f64()
        );
    } else {
        println!(
            "  {} {} passed, {} failed, {} errors, {} skipped in {:.2}s",
            "FAIL".red(),
            summary.passed,
            summary.failed.to_string().red(),
            summary.errored.to_string().red(),
            summary.skipped,
            elapsed.as_secs_f64()
        );
    }

    println!("{}", "=".repeat(60));

    if !summary.is_success() {
        std::process::exit(1);
    }

    Ok(())
}

fn print_result(result: &CaseResult) {
    match result {
        CaseResult::Pass {
            name,
            verdict,
            attempts,
            ..
        } => {
            let label = if *verdict { "random" } else { "not random" };
            println!(
                "  {} {} ({label}, {attempts} attempt{})",
                "✓".green(),
                name,
                if *attempts == 1 { "" } else { "s" }
            );
        }
        CaseResult::Fail { name, record, reason } => {
            println!("  {} {}", "✗".red(), name.red());
            println!("      {reason}");
            println!(
                "      {}: got {}, want {}",
                record.battery, record.battery_verdict, record.expected_random
            );
            println!(
                "      runstest: got {}, want {}",
                record.runstest_verdict, record.expected_random
            );
        }
        CaseResult::Error { name, error } => {
            println!("  {} {} (error)", "✗".red(), name.red());
            println!("      {error}");
        }
        CaseResult::Skip { name, reason } => {
            println!("  {} {} ({})", "○".yellow(), name.dimmed(), reason.dimmed());
        }
    }
}
