// tests/common/mod.rs
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use daily_ai_briefing::config::BriefingConfig;
use daily_ai_briefing::error::GenerationFailure;
use daily_ai_briefing::generate::{GenerationRequest, Generator, RawOutput};
use daily_ai_briefing::notion::{map_item, ApiError, MapperSettings, PageApi, PageId, PagePayload};
use daily_ai_briefing::schema::Item;

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name)).expect("fixture readable")
}

/// Mapped payload for a minimal valid item.
pub fn sample_payload(title: &str) -> PagePayload {
    let value = serde_json::json!({
        "title": title,
        "category": "benchmark",
        "importance": "low",
        "tags": ["OpenAI"],
        "summary": "summary",
        "source_url": "https://example.com/a"
    });
    let item = Item::from_value(0, &value).expect("valid sample item");
    let date = chrono::NaiveDate::from_ymd_opt(2025, 6, 12).expect("valid date");
    map_item(&item, &[], date, &MapperSettings::default())
}

/// Config with dummy secrets and zero backoff.
pub fn test_config() -> BriefingConfig {
    let mut cfg = BriefingConfig::default();
    cfg.anthropic.api_key = "sk-ant-test".into();
    cfg.notion.api_key = "secret_test".into();
    cfg.notion.database_id = "db-123".into();
    cfg.retry.base_delay_ms = 0;
    cfg.retry.max_delay_ms = 0;
    cfg
}

/// Generator returning a fixed response (or failure) and recording requests.
pub struct FixedGenerator {
    response: Mutex<Option<Result<RawOutput, GenerationFailure>>>,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl FixedGenerator {
    pub fn text(text: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(Some(Ok(RawOutput {
                text: text.into(),
                model: Some("mock-model".into()),
                stop_reason: Some("end_turn".into()),
            }))),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(err: GenerationFailure) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(Some(Err(err))),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Generator for FixedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<RawOutput, GenerationFailure> {
        self.requests.lock().push(request.clone());
        self.response
            .lock()
            .take()
            .unwrap_or(Err(GenerationFailure::Empty))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// PageApi fake: pops scripted results per call, defaults to success.
pub struct ScriptedPages {
    script: Mutex<VecDeque<Result<PageId, ApiError>>>,
    /// Per-title scripts take precedence over the shared queue.
    by_title: Mutex<Vec<(String, VecDeque<Result<PageId, ApiError>>)>>,
    pub calls: Mutex<Vec<(String, PagePayload)>>,
}

impl ScriptedPages {
    pub fn ok() -> Arc<Self> {
        Self::scripted(Vec::new())
    }

    pub fn scripted(script: Vec<Result<PageId, ApiError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            by_title: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn script_title(&self, title: &str, results: Vec<Result<PageId, ApiError>>) {
        self.by_title.lock().push((title.to_string(), results.into()));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn titles(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(_, p)| p.title().to_string()).collect()
    }
}

#[async_trait]
impl PageApi for ScriptedPages {
    async fn create_page(&self, database_id: &str, payload: &PagePayload) -> Result<PageId, ApiError> {
        let n = {
            let mut calls = self.calls.lock();
            calls.push((database_id.to_string(), payload.clone()));
            calls.len()
        };
        {
            let mut by_title = self.by_title.lock();
            if let Some((_, q)) = by_title.iter_mut().find(|entry| entry.0 == payload.title()) {
                if let Some(r) = q.pop_front() {
                    return r;
                }
            }
        }
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(PageId(format!("page-{n}"))))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

pub fn rate_limited() -> ApiError {
    ApiError::from_status(429, Some("rate_limited".into()), "Rate limited")
}

pub fn validation(message: &str) -> ApiError {
    ApiError::from_status(400, Some("validation_error".into()), message)
}

pub fn server_error() -> ApiError {
    ApiError::from_status(502, None, "Bad gateway")
}

pub fn unauthorized() -> ApiError {
    ApiError::from_status(401, Some("unauthorized".into()), "API token is invalid.")
}
