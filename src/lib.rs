// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod error;
pub mod generate;
pub mod notion;
pub mod parse;
pub mod runner;
pub mod schema;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::config::BriefingConfig;
pub use crate::error::{ConfigError, FatalError, GenerationFailure, ItemValidationFailure, ParseFailure};
pub use crate::parse::{extract_json_payload, parse_briefing, ParsedBriefing};
pub use crate::runner::{BatchRunner, RunOptions, RunReport, RunState};
pub use crate::schema::{Category, Importance, Item, Reference};
