//! Anthropic Messages API provider with the server-side web search tool.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{GenerationRequest, Generator, RawOutput};
use crate::config::AnthropicSettings;
use crate::error::GenerationFailure;

const API_VERSION: &str = "2023-06-01";
const WEB_SEARCH_TOOL: &str = "web_search_20250305";

pub struct AnthropicGenerator {
    http: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    web_search_max_uses: u32,
    base_url: String,
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Tool {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'static str,
    max_uses: u32,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Msg<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
}

#[derive(Deserialize)]
struct Resp {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
}

/// Only `text` blocks matter; tool-use and search-result blocks are skipped.
#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Default)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

impl AnthropicGenerator {
    pub fn new(settings: &AnthropicSettings) -> Result<Self, GenerationFailure> {
        if settings.api_key.trim().is_empty() {
            return Err(GenerationFailure::MissingCredential);
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("daily-ai-briefing/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()
            .map_err(|e| GenerationFailure::Transport(e.to_string()))?;
        Ok(Self {
            http,
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            web_search_max_uses: settings.web_search_max_uses.max(1),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn request_body<'a>(&'a self, request: &'a GenerationRequest) -> Req<'a> {
        let tools = if request.web_search {
            vec![Tool {
                kind: WEB_SEARCH_TOOL,
                name: "web_search",
                max_uses: self.web_search_max_uses,
            }]
        } else {
            Vec::new()
        };
        Req {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![Msg {
                role: "user",
                content: &request.instruction,
            }],
            tools,
        }
    }
}

#[async_trait]
impl Generator for AnthropicGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<RawOutput, GenerationFailure> {
        let resp = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| GenerationFailure::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(status_failure(status, &text));
        }

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| GenerationFailure::Decode(e.to_string()))?;
        let text = collect_text(&body.content);
        if text.trim().is_empty() {
            return Err(GenerationFailure::Empty);
        }
        tracing::debug!(
            model = body.model.as_deref().unwrap_or_default(),
            stop_reason = body.stop_reason.as_deref().unwrap_or_default(),
            chars = text.len(),
            "generation complete"
        );
        Ok(RawOutput {
            text,
            model: body.model,
            stop_reason: body.stop_reason,
        })
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}

fn collect_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter(|b| b.kind == "text")
        .filter_map(|b| b.text.as_deref())
        .collect()
}

fn status_failure(status: StatusCode, body: &str) -> GenerationFailure {
    let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
    let message = envelope
        .error
        .map(|e| e.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.chars().take(500).collect());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GenerationFailure::Unauthorized {
            status: status.as_u16(),
            message,
        },
        StatusCode::TOO_MANY_REQUESTS => GenerationFailure::RateLimited { message },
        _ => GenerationFailure::Http {
            status: status.as_u16(),
            message,
        },
    }
}
