// src/notion/client.rs
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::mapper::{PagePayload, PageProperties};
use crate::config::NotionSettings;

/// Coarse class of a failed persistence call; drives the retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    Auth,
    Validation,
    RateLimited,
    Server,
    Network,
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusClass::Auth => "auth",
            StatusClass::Validation => "validation",
            StatusClass::RateLimited => "rate_limited",
            StatusClass::Server => "server",
            StatusClass::Network => "network",
        };
        f.write_str(s)
    }
}

impl StatusClass {
    /// Notion's error `code` is more precise than the status (an unshared
    /// database answers 404 `object_not_found`, a write conflict answers 409).
    pub fn classify(status: u16, code: Option<&str>) -> Self {
        match code {
            Some("unauthorized" | "restricted_resource" | "object_not_found") => StatusClass::Auth,
            Some("rate_limited") => StatusClass::RateLimited,
            Some("conflict_error" | "internal_server_error" | "service_unavailable"
                | "database_connection_unavailable" | "gateway_timeout") => StatusClass::Server,
            Some("validation_error" | "invalid_json" | "invalid_request" | "invalid_request_url"
                | "missing_version") => StatusClass::Validation,
            _ => match status {
                401 | 403 => StatusClass::Auth,
                429 => StatusClass::RateLimited,
                408 | 409 | 500..=599 => StatusClass::Server,
                _ => StatusClass::Validation,
            },
        }
    }

    pub fn is_retryable(self) -> bool {
        matches!(self, StatusClass::RateLimited | StatusClass::Server | StatusClass::Network)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("{class} error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
pub struct ApiError {
    pub class: StatusClass,
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl ApiError {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            class: StatusClass::Network,
            status: None,
            code: None,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn from_status(status: u16, code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            class: StatusClass::classify(status, code.as_deref()),
            status: Some(status),
            code,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, d: Option<Duration>) -> Self {
        self.retry_after = d;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageId(pub String);

impl PageId {
    /// Stand-in id when the row was created but the response body was unreadable.
    pub const UNKNOWN: &'static str = "unknown";

    pub fn unknown() -> Self {
        PageId(Self::UNKNOWN.to_string())
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One create-row call against the target table.
#[async_trait]
pub trait PageApi: Send + Sync {
    async fn create_page(&self, database_id: &str, payload: &PagePayload) -> Result<PageId, ApiError>;
    fn name(&self) -> &'static str;
}

pub struct NotionClient {
    http: Client,
    api_key: String,
    base_url: String,
    version: String,
}

#[derive(Serialize)]
struct CreatePageRequest<'a> {
    parent: Parent<'a>,
    properties: &'a PageProperties,
}

#[derive(Serialize)]
struct Parent<'a> {
    database_id: &'a str,
}

#[derive(Deserialize)]
struct CreatedPage {
    id: String,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl NotionClient {
    pub fn new(settings: &NotionSettings, api_key: String) -> reqwest::Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("daily-ai-briefing/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            http,
            api_key,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            version: settings.version.clone(),
        })
    }
}

#[async_trait]
impl PageApi for NotionClient {
    async fn create_page(&self, database_id: &str, payload: &PagePayload) -> Result<PageId, ApiError> {
        let body = CreatePageRequest {
            parent: Parent { database_id },
            properties: &payload.properties,
        };

        let resp = self
            .http
            .post(format!("{}/v1/pages", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Notion-Version", &self.version)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::network(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            // The row exists once Notion answers 2xx; a retry would duplicate it.
            let text = resp.text().await.unwrap_or_default();
            return Ok(match serde_json::from_str::<CreatedPage>(&text) {
                Ok(page) => PageId(page.id),
                Err(e) => {
                    tracing::warn!(status = status.as_u16(), error = %e, "created page response not decodable");
                    PageId::unknown()
                }
            });
        }

        let retry_after = parse_retry_after(resp.headers().get(RETRY_AFTER).and_then(|v| v.to_str().ok()));
        let text = resp.text().await.unwrap_or_default();
        Err(error_from_body(status, &text).with_retry_after(retry_after))
    }

    fn name(&self) -> &'static str {
        "notion"
    }
}

fn error_from_body(status: StatusCode, text: &str) -> ApiError {
    let body: ErrorBody = serde_json::from_str(text).unwrap_or_default();
    let message = body.message.unwrap_or_else(|| {
        let t: String = text.chars().take(500).collect();
        if t.is_empty() {
            status.canonical_reason().unwrap_or("unknown error").to_string()
        } else {
            t
        }
    });
    ApiError::from_status(status.as_u16(), body.code, message)
}

/// `Retry-After` in whole seconds (Notion never sends the HTTP-date form).
fn parse_retry_after(raw: Option<&str>) -> Option<Duration> {
    raw?.trim().parse::<u64>().ok().map(Duration::from_secs)
}
