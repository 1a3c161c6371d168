//! gavel — governed compliance decisions from adversarial reasoners.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gavel_agents::config::{check_endpoint, GavelConfig};
use gavel_agents::GavelOrchestrator;

#[derive(Parser, Debug)]
#[command(
    name = "gavel",
    about = "Ask a yes/no compliance question against a governed document pack",
    version
)]
struct Cli {
    /// The compliance question to decide.
    question: String,

    /// Directory holding the markdown document pack.
    #[arg(long)]
    docs_dir: Option<PathBuf>,

    /// Trace store file (JSONL, append-only).
    #[arg(long)]
    trace_path: Option<PathBuf>,

    /// Inference endpoint base URL (overrides GAVEL_ENDPOINT_URL).
    #[arg(long)]
    endpoint_url: Option<String>,

    /// Model name (overrides GAVEL_MODEL).
    #[arg(long)]
    model: Option<String>,

    /// Skip the replay cache and force a fresh run.
    #[arg(long)]
    no_replay: bool,

    /// Print the full trace record alongside the verdict.
    #[arg(long)]
    show_trace: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = GavelConfig::default();
    if let Some(docs_dir) = cli.docs_dir {
        config.docs_dir = docs_dir;
    }
    if let Some(trace_path) = cli.trace_path {
        config.trace_path = trace_path;
    }
    if let Some(url) = cli.endpoint_url {
        config.endpoint.url = url;
    }
    if let Some(model) = cli.model {
        config.endpoint.model = model;
    }
    if cli.no_replay {
        config.deterministic_replay = false;
    }

    if !check_endpoint(&config.endpoint.url).await {
        warn!(url = %config.endpoint.url, "inference endpoint not reachable; runs will fail closed");
    }

    let orchestrator = GavelOrchestrator::from_config(config)?;
    let output = orchestrator.run(&cli.question).await;

    info!(
        run_id = %output.run_id,
        outcome = %output.verdict.outcome,
        rule = %output.verdict.rule_applied,
        replayed = output.trace.replayed,
        "decision rendered"
    );

    println!("{}", serde_json::to_string_pretty(&output.verdict)?);
    if cli.show_trace {
        println!("{}", serde_json::to_string_pretty(&output.trace)?);
    }

    Ok(())
}
