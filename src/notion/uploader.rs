//! Uploader: one mapped payload → one create call, classified.
//!
//! `upload` never returns an error. Every outcome is folded into
//! [`UploadOutcome`] so a failing item cannot stop the batch.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::client::{PageApi, StatusClass};
use super::mapper::{PagePayload, PROPERTY_NAMES};
use crate::telemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first call.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Retries back to back; for tests and replays.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Wait before attempt `attempt + 1`: `base · 2^(attempt-1)`, raised to the
    /// server's `Retry-After` when that is longer. Both are capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let backoff = self.base_delay.saturating_mul(1u32 << shift).min(self.max_delay);
        retry_after.map_or(backoff, |ra| backoff.max(ra.min(self.max_delay)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UploadOutcome {
    Created {
        page_id: String,
        attempts: u32,
    },
    RejectedBySchema {
        field: Option<String>,
        message: String,
        attempts: u32,
    },
    TransientFailure {
        reason: String,
        attempts: u32,
    },
}

impl UploadOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            UploadOutcome::Created { attempts, .. }
            | UploadOutcome::RejectedBySchema { attempts, .. }
            | UploadOutcome::TransientFailure { attempts, .. } => *attempts,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            UploadOutcome::Created { .. } => "created",
            UploadOutcome::RejectedBySchema { .. } => "rejected",
            UploadOutcome::TransientFailure { .. } => "transient_failed",
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, UploadOutcome::Created { .. })
    }
}

pub struct Uploader {
    api: Arc<dyn PageApi>,
    database_id: String,
    policy: RetryPolicy,
}

impl Uploader {
    pub fn new(api: Arc<dyn PageApi>, database_id: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            api,
            database_id: database_id.into(),
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn upload(&self, payload: &PagePayload) -> UploadOutcome {
        let title = payload.title();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let err = match self.api.create_page(&self.database_id, payload).await {
                Ok(id) => {
                    tracing::info!(item = title, page_id = %id, attempt, "page created");
                    return UploadOutcome::Created {
                        page_id: id.0,
                        attempts: attempt,
                    };
                }
                Err(e) => e,
            };

            if err.class == StatusClass::Validation {
                let field = offending_field(&err.message);
                tracing::warn!(
                    item = title,
                    field = field.as_deref().unwrap_or("<unknown>"),
                    status = ?err.status,
                    code = err.code.as_deref().unwrap_or_default(),
                    error = %err.message,
                    "payload rejected by table schema"
                );
                return UploadOutcome::RejectedBySchema {
                    field,
                    message: err.message,
                    attempts: attempt,
                };
            }

            // Auth errors are reported as transient but a bad token will not
            // heal between attempts.
            if !err.class.is_retryable() || attempt >= self.policy.max_attempts {
                tracing::warn!(
                    item = title,
                    attempt,
                    class = %err.class,
                    error = %err,
                    "upload failed"
                );
                return UploadOutcome::TransientFailure {
                    reason: err.to_string(),
                    attempts: attempt,
                };
            }

            let delay = self.policy.delay_for(attempt, err.retry_after);
            tracing::warn!(
                item = title,
                attempt,
                class = %err.class,
                delay_ms = delay.as_millis() as u64,
                error = %err.message,
                "transient upload failure, retrying"
            );
            counter!(telemetry::UPLOAD_RETRIES).increment(1);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

static RE_BODY_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"body\.properties\.([^.\s]+)").expect("body path regex"));

/// Recover the property a validation message complains about.
pub fn offending_field(message: &str) -> Option<String> {
    if let Some(c) = RE_BODY_PATH.captures(message) {
        return Some(c[1].to_string());
    }
    PROPERTY_NAMES
        .iter()
        .find(|name| {
            message.match_indices(*name).any(|(i, _)| {
                let before = message[..i].chars().next_back();
                let after = message[i + name.len()..].chars().next();
                !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
            })
        })
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
        };
        assert_eq!(p.delay_for(1, None), Duration::from_millis(500));
        assert_eq!(p.delay_for(2, None), Duration::from_millis(1000));
        assert_eq!(p.delay_for(3, None), Duration::from_millis(2000));
        assert_eq!(p.delay_for(4, None), Duration::from_secs(3));
        assert_eq!(p.delay_for(40, None), Duration::from_secs(3));
    }

    #[test]
    fn retry_after_is_a_floor() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(1, Some(Duration::from_secs(2))), Duration::from_secs(2));
        assert_eq!(RetryPolicy::immediate(3).delay_for(2, None), Duration::ZERO);
    }

    #[test]
    fn huge_retry_after_is_capped() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(1, Some(Duration::from_secs(3600))), p.max_delay);
        assert_eq!(
            RetryPolicy::immediate(3).delay_for(1, Some(Duration::from_secs(30))),
            Duration::ZERO
        );
    }

    #[test]
    fn offending_field_from_notion_messages() {
        assert_eq!(
            offending_field("body failed validation: body.properties.Source.url should be a valid URL").as_deref(),
            Some("Source")
        );
        assert_eq!(
            offending_field("Category is expected to be select.").as_deref(),
            Some("Category")
        );
        assert_eq!(offending_field("Could not find property with name: Priority"), None);
        assert_eq!(offending_field("Titles are long"), None);
    }
}
