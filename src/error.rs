//! Error taxonomy for a briefing run.
//!
//! Only [`GenerationFailure`] and [`ParseFailure`] are fatal. Per-item problems
//! are recorded as [`ItemValidationFailure`] or as an upload outcome and the run
//! carries on.

use serde::{Serialize, Serializer};
use thiserror::Error;

/// The research call could not produce any output.
#[derive(Debug, Error)]
pub enum GenerationFailure {
    #[error("no API key configured for the generation provider")]
    MissingCredential,

    #[error("generation request failed: {0}")]
    Transport(String),

    #[error("generation provider rejected the credentials (HTTP {status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("generation provider is rate limiting requests: {message}")]
    RateLimited { message: String },

    #[error("generation provider returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("generation response could not be decoded: {0}")]
    Decode(String),

    #[error("generation response contained no text")]
    Empty,

    #[error("could not read replay file {path}: {source}")]
    Replay {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// The raw output did not contain a usable JSON object.
#[derive(Debug, Error)]
pub enum ParseFailure {
    #[error("no JSON object found in model output")]
    NoJsonObject { preview: String },

    #[error("model output is not valid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
        preview: String,
    },

    #[error("`items` must be an array, found {found}")]
    ItemsNotArray { found: &'static str, preview: String },
}

impl ParseFailure {
    /// Leading slice of the raw output, for the run log.
    pub fn preview(&self) -> &str {
        match self {
            Self::NoJsonObject { preview }
            | Self::InvalidJson { preview, .. }
            | Self::ItemsNotArray { preview, .. } => preview,
        }
    }
}

/// One element of `items` failed schema checks and was skipped.
#[derive(Debug, Clone, Error, Serialize, PartialEq, Eq)]
#[error("item #{index}: {reason}")]
pub struct ItemValidationFailure {
    /// Zero-based position inside the model's `items` array.
    pub index: usize,
    /// Title, when one could be read.
    pub title: Option<String>,
    #[serde(serialize_with = "serialize_display")]
    pub reason: ValidationReason,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationReason {
    #[error("item is not a JSON object")]
    NotAnObject,

    #[error("missing or empty title")]
    MissingTitle,

    #[error("missing source_url")]
    MissingSourceUrl,

    #[error("invalid source_url `{value}`: {detail}")]
    InvalidSourceUrl { value: String, detail: String },
}

/// Failures that abort the whole run.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationFailure),

    #[error("parse failed: {0}")]
    Parse(#[from] ParseFailure),
}

impl FatalError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Generation(_) => "generation_failure",
            Self::Parse(_) => "parse_failure",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing secret: set {var} or put it in the config file")]
    MissingSecret { var: &'static str },

    #[error("retry.max_attempts must be at least 1")]
    InvalidRetryBudget,

    #[error("briefing item range is invalid (min_items={min}, max_items={max})")]
    InvalidItemRange { min: u32, max: u32 },

    #[error("{field} is not a valid URL: {value}")]
    InvalidUrl { field: &'static str, value: String },

    #[error("could not build HTTP client: {0}")]
    HttpClient(String),
}

pub(crate) fn serialize_display<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: std::fmt::Display,
    S: Serializer,
{
    serializer.collect_str(value)
}

pub(crate) fn serialize_display_opt<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    T: std::fmt::Display,
    S: Serializer,
{
    match value {
        Some(v) => serializer.collect_str(v),
        None => serializer.serialize_none(),
    }
}
