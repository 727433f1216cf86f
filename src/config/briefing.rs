// src/config/briefing.rs
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use anyhow::{anyhow, Context};

use crate::error::ConfigError;
use crate::notion::uploader::RetryPolicy;
use crate::schema::{Category, Importance};

pub const ENV_CONFIG_PATH: &str = "BRIEFING_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/briefing.toml";

pub const ENV_ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const ENV_NOTION_API_KEY: &str = "NOTION_API_KEY";
pub const ENV_NOTION_DATABASE_ID: &str = "NOTION_DATABASE_ID";

/// Placeholder meaning "read this secret from the environment".
const FROM_ENV: &str = "ENV";

/// Tag vocabulary of the briefing table's multi-select column.
pub const DEFAULT_TAGS: [&str; 12] = [
    "RLVR",
    "GRPO",
    "Mamba",
    "Long Context",
    "Synthetic Data",
    "KV Cache",
    "Anthropic",
    "OpenAI",
    "Google",
    "DeepSeek",
    "Meta",
    "Enterprise",
];

/// Everything one run needs. Built once and handed to the runner.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BriefingConfig {
    pub anthropic: AnthropicSettings,
    pub notion: NotionSettings,
    pub retry: RetrySettings,
    pub briefing: BriefingSettings,
    pub choices: ChoiceSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnthropicSettings {
    /// "ENV" means: read from ANTHROPIC_API_KEY
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub web_search: bool,
    pub web_search_max_uses: u32,
    pub timeout_secs: u64,
    pub base_url: String,
}

impl Default for AnthropicSettings {
    fn default() -> Self {
        Self {
            api_key: FROM_ENV.to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 8000,
            web_search: true,
            web_search_max_uses: 5,
            timeout_secs: 300,
            base_url: "https://api.anthropic.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotionSettings {
    /// "ENV" means: read from NOTION_API_KEY
    pub api_key: String,
    /// "ENV" means: read from NOTION_DATABASE_ID
    pub database_id: String,
    pub base_url: String,
    pub version: String,
    pub timeout_secs: u64,
}

impl Default for NotionSettings {
    fn default() -> Self {
        Self {
            api_key: FROM_ENV.to_string(),
            database_id: FROM_ENV.to_string(),
            base_url: "https://api.notion.com".to_string(),
            version: "2022-06-28".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms.max(self.base_delay_ms)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BriefingSettings {
    pub topic_focus: String,
    /// Language the model writes titles and summaries in.
    pub language: String,
    pub min_items: u32,
    pub max_items: u32,
    /// Allowed tags. Empty means any tag is forwarded.
    pub tags: Vec<String>,
}

impl Default for BriefingSettings {
    fn default() -> Self {
        Self {
            topic_focus: "AI research and AI market news from an AI product owner's point of view"
                .to_string(),
            language: "Korean".to_string(),
            min_items: 3,
            max_items: 5,
            tags: DEFAULT_TAGS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Choice labels configured on the target table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChoiceSettings {
    pub category: CategoryLabels,
    pub importance: ImportanceLabels,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CategoryLabels {
    pub paper_research: String,
    pub model_release: String,
    pub benchmark: String,
    pub market_business: String,
    pub infra_tooling: String,
}

impl Default for CategoryLabels {
    fn default() -> Self {
        Self {
            paper_research: Category::PaperResearch.default_label().to_string(),
            model_release: Category::ModelRelease.default_label().to_string(),
            benchmark: Category::Benchmark.default_label().to_string(),
            market_business: Category::MarketBusiness.default_label().to_string(),
            infra_tooling: Category::InfraTooling.default_label().to_string(),
        }
    }
}

impl CategoryLabels {
    pub fn get(&self, c: Category) -> &str {
        match c {
            Category::PaperResearch => &self.paper_research,
            Category::ModelRelease => &self.model_release,
            Category::Benchmark => &self.benchmark,
            Category::MarketBusiness => &self.market_business,
            Category::InfraTooling => &self.infra_tooling,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImportanceLabels {
    pub high: String,
    pub medium: String,
    pub low: String,
}

impl Default for ImportanceLabels {
    fn default() -> Self {
        Self {
            high: Importance::High.default_label().to_string(),
            medium: Importance::Medium.default_label().to_string(),
            low: Importance::Low.default_label().to_string(),
        }
    }
}

impl ImportanceLabels {
    pub fn get(&self, i: Importance) -> &str {
        match i {
            Importance::High => &self.high,
            Importance::Medium => &self.medium,
            Importance::Low => &self.low,
        }
    }
}

/// Which external calls a run will make; decides which secrets are required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stages {
    pub generation: bool,
    pub upload: bool,
}

impl Stages {
    pub const ALL: Stages = Stages {
        generation: true,
        upload: true,
    };
}

impl BriefingConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading briefing config from {}", path.display()))?;
        let cfg: BriefingConfig = toml::from_str(&data)
            .with_context(|| format!("parsing briefing config {}", path.display()))?;
        Ok(cfg)
    }

    /// Resolve the config file:
    /// 1) explicit path (must exist)
    /// 2) $BRIEFING_CONFIG_PATH (must exist)
    /// 3) config/briefing.toml
    /// 4) built-in defaults
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(p) = explicit {
            return Self::load_from_file(p);
        }
        if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from_file(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default.exists() {
            return Self::load_from_file(&default);
        }
        Ok(Self::default())
    }

    /// Replace "ENV" (or blank) secrets with the matching environment variable.
    /// Unset variables leave the field empty; `validate` reports them.
    pub fn resolve_secrets(mut self) -> Self {
        self.anthropic.api_key = resolve_secret(&self.anthropic.api_key, ENV_ANTHROPIC_API_KEY);
        self.notion.api_key = resolve_secret(&self.notion.api_key, ENV_NOTION_API_KEY);
        self.notion.database_id = resolve_secret(&self.notion.database_id, ENV_NOTION_DATABASE_ID);
        self
    }

    pub fn validate(&self, stages: Stages) -> Result<(), ConfigError> {
        if stages.generation && is_unset(&self.anthropic.api_key) {
            return Err(ConfigError::MissingSecret {
                var: ENV_ANTHROPIC_API_KEY,
            });
        }
        if stages.upload {
            if is_unset(&self.notion.api_key) {
                return Err(ConfigError::MissingSecret {
                    var: ENV_NOTION_API_KEY,
                });
            }
            if is_unset(&self.notion.database_id) {
                return Err(ConfigError::MissingSecret {
                    var: ENV_NOTION_DATABASE_ID,
                });
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidRetryBudget);
        }
        let b = &self.briefing;
        if b.min_items == 0 || b.min_items > b.max_items {
            return Err(ConfigError::InvalidItemRange {
                min: b.min_items,
                max: b.max_items,
            });
        }
        for (field, value) in [
            ("anthropic.base_url", &self.anthropic.base_url),
            ("notion.base_url", &self.notion.base_url),
        ] {
            if url::Url::parse(value).is_err() {
                return Err(ConfigError::InvalidUrl {
                    field,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }
}

fn resolve_secret(value: &str, var: &str) -> String {
    let v = value.trim();
    if v.is_empty() || v.eq_ignore_ascii_case(FROM_ENV) {
        env::var(var).map(|s| s.trim().to_string()).unwrap_or_default()
    } else {
        v.to_string()
    }
}

fn is_unset(value: &str) -> bool {
    let v = value.trim();
    v.is_empty() || v.eq_ignore_ascii_case(FROM_ENV)
}
