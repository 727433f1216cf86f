// src/telemetry.rs
use std::path::Path;

use anyhow::Context;
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const RUNS: &str = "briefing_runs_total";
pub const ITEMS_PARSED: &str = "briefing_items_parsed_total";
pub const ITEMS_INVALID: &str = "briefing_items_invalid_total";
pub const UPLOADS: &str = "briefing_uploads_total";
pub const UPLOAD_RETRIES: &str = "briefing_upload_retries_total";
pub const GENERATION_MS: &str = "briefing_generation_ms";

const DEFAULT_FILTER: &str = "daily_ai_briefing=info,warn";

/// One-time metrics registration (so series show up in the exposition).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(RUNS, "Briefing runs by terminal state.");
        describe_counter!(ITEMS_PARSED, "Items that passed schema validation.");
        describe_counter!(ITEMS_INVALID, "Items skipped by schema validation.");
        describe_counter!(UPLOADS, "Upload outcomes by class.");
        describe_counter!(UPLOAD_RETRIES, "Upload calls retried after a transient failure.");
        describe_histogram!(GENERATION_MS, "Generation call latency in milliseconds.");
    });
}

/// Install the global subscriber. `LOG_FORMAT=json` switches to JSON lines
/// for log collectors; `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json().with_current_span(false)).try_init()
    } else {
        registry.with(fmt::layer().compact().with_target(false)).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Install a Prometheus recorder whose snapshot is written once the run ends.
pub fn install_prometheus() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("prometheus: install recorder")?;
    ensure_metrics_described();
    Ok(handle)
}

/// Write the exposition text atomically (node_exporter textfile collector
/// reads `*.prom` files and must never see a partial one).
pub fn write_metrics_file(handle: &PrometheusHandle, path: &Path) -> anyhow::Result<()> {
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, handle.render())
        .with_context(|| format!("writing metrics to {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("renaming metrics file to {}", path.display()))?;
    Ok(())
}
