//! Generation client: provider abstraction for the research call.
//! A run makes exactly one call; errors are fatal, so no retry happens here.
//! Wrap a [`Generator`] to add a retry policy.

pub mod anthropic;
pub mod prompt;

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::GenerationFailure;

pub use anthropic::AnthropicGenerator;

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub instruction: String,
    /// Enable the provider's web search tool.
    pub web_search: bool,
    pub run_date: NaiveDate,
}

/// Opaque model output for one run.
#[derive(Debug, Clone, Default)]
pub struct RawOutput {
    pub text: String,
    pub model: Option<String>,
    pub stop_reason: Option<String>,
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<RawOutput, GenerationFailure>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Replays a previously saved model response instead of calling the API.
pub struct ReplayGenerator {
    path: PathBuf,
}

impl ReplayGenerator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Generator for ReplayGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<RawOutput, GenerationFailure> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| GenerationFailure::Replay {
                path: self.path.display().to_string(),
                source,
            })?;
        if text.trim().is_empty() {
            return Err(GenerationFailure::Empty);
        }
        Ok(RawOutput {
            text,
            model: None,
            stop_reason: None,
        })
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}
