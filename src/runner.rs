//! # Batch runner
//! Generation → Parse → (Map → Upload)* → Summary, as an explicit state machine.
//!
//! `Failed` is reachable from `Generating` and `Parsing` only. Once parsing
//! succeeds the run always reaches `Done`, however many uploads fail.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use metrics::{counter, histogram};
use serde::Serialize;

use crate::config::briefing::ENV_ANTHROPIC_API_KEY;
use crate::config::BriefingConfig;
use crate::error::{serialize_display_opt, ConfigError, FatalError, GenerationFailure, ItemValidationFailure};
use crate::generate::{prompt, AnthropicGenerator, GenerationRequest, Generator, ReplayGenerator};
use crate::notion::{map_item, ChoiceMap, MapperSettings, NotionClient, PageApi, UploadOutcome, Uploader};
use crate::parse::parse_briefing;
use crate::schema::Item;
use crate::telemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Generating,
    Parsing,
    Uploading { index: usize, total: usize },
    Summarizing,
    Done,
    Failed,
}

impl RunState {
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Idle, Generating) => true,
            (Generating, Parsing) | (Generating, Failed) => true,
            (Parsing, Uploading { index: 1, .. }) | (Parsing, Summarizing) | (Parsing, Failed) => true,
            (Uploading { index, total }, Uploading { index: n, total: t }) => t == total && n == index + 1,
            (Uploading { index, total }, Summarizing) => index == total,
            (Summarizing, Done) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => f.write_str("idle"),
            RunState::Generating => f.write_str("generating"),
            RunState::Parsing => f.write_str("parsing"),
            RunState::Uploading { index, total } => write!(f, "uploading {index}/{total}"),
            RunState::Summarizing => f.write_str("summarizing"),
            RunState::Done => f.write_str("done"),
            RunState::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Map items but make no upload calls.
    pub dry_run: bool,
    /// Override the run date (defaults to today, UTC).
    pub today: Option<NaiveDate>,
    /// Save the raw model output here before parsing.
    pub save_raw: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub created: usize,
    pub rejected: usize,
    pub transient_failed: usize,
    pub validation_failed: usize,
    /// Mapped but not uploaded (dry run).
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub title: String,
    pub identity: String,
    /// `None` when the upload was skipped (dry run).
    pub outcome: Option<UploadOutcome>,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_date: NaiveDate,
    pub state: RunState,
    #[serde(serialize_with = "serialize_display_opt")]
    pub fatal: Option<FatalError>,
    pub counts: RunCounts,
    pub items: Vec<ItemReport>,
    pub validation_errors: Vec<ItemValidationFailure>,
    /// Upload calls beyond the first, summed over all items.
    pub total_retries: u32,
    pub dry_run: bool,
    pub elapsed_ms: u64,
}

impl RunReport {
    fn new(run_date: NaiveDate, dry_run: bool) -> Self {
        Self {
            run_date,
            state: RunState::Idle,
            fatal: None,
            counts: RunCounts::default(),
            items: Vec::new(),
            validation_errors: Vec::new(),
            total_retries: 0,
            dry_run,
            elapsed_ms: 0,
        }
    }

    fn record(&mut self, item: &Item, outcome: Option<UploadOutcome>) {
        match &outcome {
            Some(UploadOutcome::Created { .. }) => self.counts.created += 1,
            Some(UploadOutcome::RejectedBySchema { .. }) => self.counts.rejected += 1,
            Some(UploadOutcome::TransientFailure { .. }) => self.counts.transient_failed += 1,
            None => self.counts.skipped += 1,
        }
        if let Some(o) = &outcome {
            self.total_retries += o.attempts().saturating_sub(1);
            counter!(telemetry::UPLOADS, "outcome" => o.label()).increment(1);
        }
        self.items.push(ItemReport {
            title: item.title.clone(),
            identity: item.identity(),
            outcome,
        });
    }

    pub fn is_success(&self) -> bool {
        self.state == RunState::Done
    }

    /// Process exit code for the scheduler: 0 = `Done`, 1 = `Failed`.
    pub fn exit_code(&self) -> u8 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.dry_run { " (dry run)" } else { "" };
        writeln!(f, "Daily AI briefing {}{mode}: {}", self.run_date, self.state)?;
        if let Some(fatal) = &self.fatal {
            writeln!(f, "  fatal: {fatal}")?;
            return Ok(());
        }
        let c = &self.counts;
        writeln!(
            f,
            "  created {}, rejected {}, transient-failed {}, validation-failed {}, skipped {} (retries {})",
            c.created, c.rejected, c.transient_failed, c.validation_failed, c.skipped, self.total_retries
        )?;
        for it in &self.items {
            match &it.outcome {
                Some(UploadOutcome::Created { page_id, attempts }) => {
                    writeln!(f, "  + {} [{}] page {page_id} after {attempts} attempt(s)", it.title, it.identity)?
                }
                Some(UploadOutcome::RejectedBySchema { field, message, .. }) => writeln!(
                    f,
                    "  x {} [{}] rejected ({}): {message}",
                    it.title,
                    it.identity,
                    field.as_deref().unwrap_or("unknown field")
                )?,
                Some(UploadOutcome::TransientFailure { reason, attempts }) => writeln!(
                    f,
                    "  ! {} [{}] failed after {attempts} attempt(s): {reason}",
                    it.title, it.identity
                )?,
                None => writeln!(f, "  - {} [{}] skipped", it.title, it.identity)?,
            }
        }
        for v in &self.validation_errors {
            writeln!(f, "  ? {v}")?;
        }
        Ok(())
    }
}

pub struct BatchRunner {
    config: BriefingConfig,
    generator: Arc<dyn Generator>,
    uploader: Uploader,
    mapper: MapperSettings,
    options: RunOptions,
    state: RunState,
    transitions: Vec<RunState>,
}

impl BatchRunner {
    pub fn new(config: BriefingConfig, generator: Arc<dyn Generator>, pages: Arc<dyn PageApi>) -> Self {
        let uploader = Uploader::new(pages, config.notion.database_id.clone(), config.retry.policy());
        let mapper = MapperSettings {
            choices: ChoiceMap::from_settings(&config.choices),
            tag_vocabulary: config.briefing.tags.clone(),
        };
        Self {
            config,
            generator,
            uploader,
            mapper,
            options: RunOptions::default(),
            state: RunState::Idle,
            transitions: vec![RunState::Idle],
        }
    }

    /// Wire the real providers. `replay` swaps the model call for a saved response.
    pub fn from_config(config: BriefingConfig, replay: Option<PathBuf>) -> Result<Self, ConfigError> {
        let generator: Arc<dyn Generator> = match replay {
            Some(path) => Arc::new(ReplayGenerator::new(path)),
            None => Arc::new(AnthropicGenerator::new(&config.anthropic).map_err(|e| match e {
                GenerationFailure::MissingCredential => ConfigError::MissingSecret {
                    var: ENV_ANTHROPIC_API_KEY,
                },
                other => ConfigError::HttpClient(other.to_string()),
            })?),
        };
        let pages: Arc<dyn PageApi> = Arc::new(
            NotionClient::new(&config.notion, config.notion.api_key.clone())
                .map_err(|e| ConfigError::HttpClient(e.to_string()))?,
        );
        Ok(Self::new(config, generator, pages))
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Every state visited so far, starting with `Idle`.
    pub fn transitions(&self) -> &[RunState] {
        &self.transitions
    }

    fn transition(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(from = %self.state, to = %next, "run state");
        self.state = next;
        self.transitions.push(next);
    }

    fn fail(&mut self, mut report: RunReport, fatal: FatalError, started: Instant) -> RunReport {
        self.transition(RunState::Failed);
        tracing::error!(kind = fatal.kind(), error = %fatal, "briefing run failed");
        counter!(telemetry::RUNS, "outcome" => "failed").increment(1);
        report.state = RunState::Failed;
        report.fatal = Some(fatal);
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        report
    }

    /// Execute one run. Only generation and parse failures end in `Failed`.
    /// Each call starts again from `Idle`.
    pub async fn run(&mut self) -> RunReport {
        telemetry::ensure_metrics_described();
        self.state = RunState::Idle;
        self.transitions.clear();
        self.transitions.push(RunState::Idle);
        let started = Instant::now();
        let today = self.options.today.unwrap_or_else(|| Utc::now().date_naive());
        let mut report = RunReport::new(today, self.options.dry_run);

        self.transition(RunState::Generating);
        let request = GenerationRequest {
            instruction: prompt::build_instruction(today, &self.config.briefing, &self.mapper.choices),
            web_search: self.config.anthropic.web_search,
            run_date: today,
        };
        tracing::info!(provider = self.generator.name(), date = %today, "requesting briefing");
        let t0 = Instant::now();
        let raw = match self.generator.generate(&request).await {
            Ok(raw) => raw,
            Err(e) => return self.fail(report, e.into(), started),
        };
        histogram!(telemetry::GENERATION_MS).record(t0.elapsed().as_secs_f64() * 1_000.0);

        if let Some(path) = &self.options.save_raw {
            if let Err(e) = tokio::fs::write(path, &raw.text).await {
                tracing::warn!(error = %e, path = %path.display(), "could not save raw output");
            }
        }

        self.transition(RunState::Parsing);
        let parsed = match parse_briefing(&raw.text) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(preview = e.preview(), "unparseable model output");
                return self.fail(report, e.into(), started);
            }
        };
        counter!(telemetry::ITEMS_PARSED).increment(parsed.items.len() as u64);
        counter!(telemetry::ITEMS_INVALID).increment(parsed.validation_errors.len() as u64);
        tracing::info!(
            items = parsed.items.len(),
            invalid = parsed.validation_errors.len(),
            references = parsed.references.len(),
            "briefing parsed"
        );
        report.counts.validation_failed = parsed.validation_errors.len();
        report.validation_errors = parsed.validation_errors;

        let total = parsed.items.len();
        for (i, item) in parsed.items.iter().enumerate() {
            self.transition(RunState::Uploading { index: i + 1, total });
            let payload = map_item(item, &parsed.references, today, &self.mapper);
            let outcome = if self.options.dry_run {
                tracing::info!(item = %item.title, identity = %item.identity(), "dry run, upload skipped");
                None
            } else {
                Some(self.uploader.upload(&payload).await)
            };
            report.record(item, outcome);
        }

        self.transition(RunState::Summarizing);
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        let c = report.counts;
        tracing::info!(
            created = c.created,
            rejected = c.rejected,
            transient_failed = c.transient_failed,
            validation_failed = c.validation_failed,
            skipped = c.skipped,
            retries = report.total_retries,
            "briefing summary: {}/{} items added",
            c.created,
            total + c.validation_failed
        );
        counter!(telemetry::RUNS, "outcome" => "done").increment(1);

        self.transition(RunState::Done);
        report.state = RunState::Done;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_only_reachable_before_uploading() {
        assert!(RunState::Generating.can_transition_to(RunState::Failed));
        assert!(RunState::Parsing.can_transition_to(RunState::Failed));
        assert!(!RunState::Uploading { index: 1, total: 2 }.can_transition_to(RunState::Failed));
        assert!(!RunState::Summarizing.can_transition_to(RunState::Failed));
        assert!(!RunState::Idle.can_transition_to(RunState::Failed));
    }

    #[test]
    fn uploading_advances_one_item_at_a_time() {
        let s = RunState::Uploading { index: 1, total: 3 };
        assert!(s.can_transition_to(RunState::Uploading { index: 2, total: 3 }));
        assert!(!s.can_transition_to(RunState::Uploading { index: 3, total: 3 }));
        assert!(!s.can_transition_to(RunState::Summarizing));
        assert!(RunState::Uploading { index: 3, total: 3 }.can_transition_to(RunState::Summarizing));
        assert!(RunState::Parsing.can_transition_to(RunState::Summarizing));
    }

    #[test]
    fn exit_code_reflects_terminal_state() {
        let mut r = RunReport::new(NaiveDate::MIN, false);
        r.state = RunState::Done;
        r.counts.transient_failed = 3;
        assert_eq!(r.exit_code(), 0);
        r.state = RunState::Failed;
        assert_eq!(r.exit_code(), 1);
    }
}
