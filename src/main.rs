//! Daily AI Briefing: binary entrypoint.
//! Run once per scheduler trigger; the exit code tells the scheduler whether
//! the run reached `Done` (0), `Failed` (1) or never started (2).

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use daily_ai_briefing::config::{BriefingConfig, Stages};
use daily_ai_briefing::{telemetry, BatchRunner, RunOptions};

#[derive(Debug, Parser)]
#[command(name = "daily-ai-briefing", version, about = "Research today's AI news with Claude and file it into Notion")]
struct Cli {
    /// Config file (TOML). Falls back to $BRIEFING_CONFIG_PATH, then config/briefing.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Parse and map the briefing without writing to Notion.
    #[arg(long)]
    dry_run: bool,

    /// Use a saved model response instead of calling the API.
    #[arg(long, value_name = "RAW_FILE")]
    replay: Option<PathBuf>,

    /// Save the raw model response (for later --replay).
    #[arg(long, value_name = "PATH")]
    save_raw: Option<PathBuf>,

    /// Write the run report as JSON.
    #[arg(long, value_name = "PATH")]
    report_json: Option<PathBuf>,

    /// Write Prometheus metrics for the node_exporter textfile collector.
    #[arg(long, value_name = "PATH", env = "BRIEFING_METRICS_FILE")]
    metrics_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env locally; no-op when the scheduler injects the environment.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = ?e, "briefing run could not start");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let metrics = match &cli.metrics_file {
        Some(_) => Some(telemetry::install_prometheus()?),
        None => None,
    };

    let cfg = BriefingConfig::load(cli.config.as_deref())?.resolve_secrets();
    let stages = Stages {
        generation: cli.replay.is_none(),
        upload: !cli.dry_run,
    };
    cfg.validate(stages)?;
    // Safe diagnostics: only key lengths, never the secrets.
    info!(
        model = %cfg.anthropic.model,
        anthropic_key_len = cfg.anthropic.api_key.len(),
        notion_key_len = cfg.notion.api_key.len(),
        dry_run = cli.dry_run,
        replay = cli.replay.is_some(),
        "briefing config loaded"
    );

    let options = RunOptions {
        dry_run: cli.dry_run,
        today: None,
        save_raw: cli.save_raw.clone(),
    };
    let mut runner = BatchRunner::from_config(cfg, cli.replay.clone())?.with_options(options);
    let report = runner.run().await;

    println!("{report}");

    if let Some(path) = &cli.report_json {
        let json = serde_json::to_string_pretty(&report).context("serializing run report")?;
        std::fs::write(path, json).with_context(|| format!("writing report to {}", path.display()))?;
    }
    if let (Some(handle), Some(path)) = (&metrics, &cli.metrics_file) {
        if let Err(e) = telemetry::write_metrics_file(handle, path) {
            tracing::warn!(error = ?e, "metrics file not written");
        }
    }

    Ok(report.exit_code())
}
