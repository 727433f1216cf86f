//! # Item schema
//! Canonical shape of one briefing entry plus the coercion rules applied to
//! whatever the model emitted. Pure, no I/O.
//!
//! Category and importance are closed sets. Unknown values never drop an
//! item; they fall back to [`Category::FALLBACK`] / [`Importance::DEFAULT`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{ItemValidationFailure, ValidationReason};

/// Minimum similarity for a fuzzy label match (normalized Levenshtein).
const FUZZY_MATCH_MIN: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    PaperResearch,
    ModelRelease,
    Benchmark,
    MarketBusiness,
    InfraTooling,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::PaperResearch,
        Category::ModelRelease,
        Category::Benchmark,
        Category::MarketBusiness,
        Category::InfraTooling,
    ];

    pub const FALLBACK: Category = Category::PaperResearch;

    pub fn key(self) -> &'static str {
        match self {
            Category::PaperResearch => "paper_research",
            Category::ModelRelease => "model_release",
            Category::Benchmark => "benchmark",
            Category::MarketBusiness => "market_business",
            Category::InfraTooling => "infra_tooling",
        }
    }

    /// Choice label the briefing table ships with.
    pub fn default_label(self) -> &'static str {
        match self {
            Category::PaperResearch => "📄 논문/연구",
            Category::ModelRelease => "🚀 모델 릴리스",
            Category::Benchmark => "📊 벤치마크",
            Category::MarketBusiness => "💼 시장/기업",
            Category::InfraTooling => "🔧 기술/인프라",
        }
    }

    // Stored already normalized (see `normalize_label`).
    fn aliases(self) -> &'static [&'static str] {
        match self {
            Category::PaperResearch => &[
                "paperresearch", "paper", "papers", "research", "논문연구", "논문", "연구",
            ],
            Category::ModelRelease => &[
                "modelrelease", "model", "release", "launch", "모델릴리스", "모델", "릴리스",
            ],
            Category::Benchmark => &[
                "benchmark", "benchmarks", "eval", "evaluation", "leaderboard", "벤치마크",
            ],
            Category::MarketBusiness => &[
                "marketbusiness", "market", "business", "industry", "funding", "regulation",
                "시장기업", "시장", "기업",
            ],
            Category::InfraTooling => &[
                "infratooling", "infra", "infrastructure", "tooling", "tools", "hardware",
                "기술인프라", "기술", "인프라",
            ],
        }
    }

    /// Coerce a model-supplied label. Returns the category and whether the
    /// fallback had to be used.
    pub fn coerce(raw: Option<&str>) -> (Category, bool) {
        let Some(raw) = raw else {
            return (Self::FALLBACK, true);
        };
        match match_alias(raw, &Self::ALL, Self::aliases) {
            Some(c) => (c, false),
            None => (Self::FALLBACK, true),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    High,
    Medium,
    Low,
}

impl Importance {
    pub const ALL: [Importance; 3] = [Importance::High, Importance::Medium, Importance::Low];

    pub const DEFAULT: Importance = Importance::Medium;

    pub fn key(self) -> &'static str {
        match self {
            Importance::High => "high",
            Importance::Medium => "medium",
            Importance::Low => "low",
        }
    }

    pub fn default_label(self) -> &'static str {
        match self {
            Importance::High => "🔥 High",
            Importance::Medium => "⭐ Medium",
            Importance::Low => "📌 Low",
        }
    }

    fn aliases(self) -> &'static [&'static str] {
        match self {
            Importance::High => &["high", "critical", "major", "높음", "상"],
            Importance::Medium => &["medium", "med", "moderate", "normal", "중간", "보통", "중"],
            Importance::Low => &["low", "minor", "낮음", "하"],
        }
    }

    /// Missing or unknown importance becomes [`Importance::DEFAULT`].
    pub fn coerce(raw: Option<&str>) -> (Importance, bool) {
        let Some(raw) = raw else {
            return (Self::DEFAULT, false);
        };
        match match_alias(raw, &Self::ALL, Self::aliases) {
            Some(i) => (i, false),
            None => (Self::DEFAULT, true),
        }
    }
}

/// Lowercase and keep only letters/digits, so "📄 논문/연구" and "Paper / Research"
/// compare on their words alone.
pub(crate) fn normalize_label(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn match_alias<T: Copy>(raw: &str, all: &[T], aliases: fn(T) -> &'static [&'static str]) -> Option<T> {
    let needle = normalize_label(raw);
    if needle.is_empty() {
        return None;
    }
    if let Some(hit) = all
        .iter()
        .copied()
        .find(|v| aliases(*v).contains(&needle.as_str()))
    {
        return Some(hit);
    }

    let mut best: Option<(T, f64)> = None;
    for v in all.iter().copied() {
        for alias in aliases(v) {
            let score = strsim::normalized_levenshtein(&needle, alias);
            if score >= FUZZY_MATCH_MIN && best.map_or(true, |(_, s)| score > s) {
                best = Some((v, score));
            }
        }
    }
    best.map(|(v, _)| v)
}

/// Insertion-ordered tag set; duplicates compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TagSet(Vec<String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the tag was blank or already present.
    pub fn insert(&mut self, tag: &str) -> bool {
        let t = tag.trim();
        if t.is_empty() || self.contains(t) {
            return false;
        }
        self.0.push(t.to_string());
        true
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t.eq_ignore_ascii_case(tag.trim()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> FromIterator<&'a str> for TagSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = TagSet::new();
        for t in iter {
            set.insert(t);
        }
        set
    }
}

/// One validated briefing entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub title: String,
    pub category: Category,
    pub importance: Importance,
    pub tags: TagSet,
    pub summary: String,
    pub source_url: Url,
}

impl Item {
    /// Build an item from one element of the model's `items` array.
    pub fn from_value(index: usize, value: &Value) -> Result<Item, ItemValidationFailure> {
        let fail = |title: Option<String>, reason| ItemValidationFailure {
            index,
            title,
            reason,
        };

        let Some(obj) = value.as_object() else {
            return Err(fail(None, ValidationReason::NotAnObject));
        };

        let title = obj
            .get("title")
            .and_then(Value::as_str)
            .map(collapse_whitespace)
            .filter(|t| !t.is_empty());
        let Some(title) = title else {
            return Err(fail(None, ValidationReason::MissingTitle));
        };

        let raw_url = ["source_url", "url", "source"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_str))
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let Some(raw_url) = raw_url else {
            return Err(fail(Some(title), ValidationReason::MissingSourceUrl));
        };
        let source_url = match parse_absolute_url(raw_url) {
            Ok(u) => u,
            Err(detail) => {
                return Err(fail(
                    Some(title),
                    ValidationReason::InvalidSourceUrl {
                        value: raw_url.to_string(),
                        detail,
                    },
                ))
            }
        };

        let raw_category = obj.get("category").and_then(Value::as_str);
        let (category, coerced) = Category::coerce(raw_category);
        if coerced {
            tracing::warn!(
                item = index,
                raw = raw_category.unwrap_or("<missing>"),
                fallback = category.key(),
                "unknown category, using fallback"
            );
        }

        let raw_importance = obj.get("importance").and_then(Value::as_str);
        let (importance, coerced) = Importance::coerce(raw_importance);
        if coerced {
            tracing::debug!(
                item = index,
                raw = raw_importance.unwrap_or_default(),
                "unknown importance, using default"
            );
        }

        let tags = match obj.get("tags") {
            Some(Value::Array(arr)) => arr.iter().filter_map(Value::as_str).collect(),
            Some(Value::String(s)) => s.split(',').collect(),
            _ => TagSet::new(),
        };

        let summary = obj
            .get("summary")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        Ok(Item {
            title,
            category,
            importance,
            tags,
            summary,
            source_url,
        })
    }

    /// Short digest of `(title, source_url)`. Re-running a day produces the same
    /// identity for the same finding.
    pub fn identity(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.title.as_bytes());
        hasher.update([0x1f]);
        hasher.update(self.source_url.as_str().as_bytes());
        let digest = hasher.finalize();
        digest[..6].iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// A citation the model listed under `references`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    /// Marker text without brackets, e.g. `"1"`.
    pub marker: String,
    pub url: Url,
    pub label: String,
}

static RE_MARKED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\[(?P<marker>[^\]]+)\]\s*(?P<rest>.*)$").expect("marker regex"));
static RE_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s<>\]]+").expect("url regex"));

impl Reference {
    /// Reads either `{"id": 1, "url": "...", "label": "..."}` or the
    /// `"[1] label - https://..."` string form. Anything without an absolute
    /// URL yields `None`.
    pub fn from_value(position: usize, value: &Value) -> Option<Reference> {
        match value {
            Value::Object(obj) => {
                let url = ["url", "link", "source_url"]
                    .iter()
                    .find_map(|k| obj.get(*k).and_then(Value::as_str))
                    .and_then(|s| parse_absolute_url(s.trim()).ok())?;
                let marker = ["id", "marker"]
                    .iter()
                    .find_map(|k| match obj.get(*k) {
                        Some(Value::String(s)) => Some(strip_brackets(s)),
                        Some(Value::Number(n)) => Some(n.to_string()),
                        _ => None,
                    })
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| (position + 1).to_string());
                let label = ["label", "title", "description"]
                    .iter()
                    .find_map(|k| obj.get(*k).and_then(Value::as_str))
                    .map(collapse_whitespace)
                    .filter(|l| !l.is_empty())
                    .unwrap_or_else(|| url.host_str().unwrap_or_default().to_string());
                Some(Reference { marker, url, label })
            }
            Value::String(s) => Self::from_line(position, s),
            _ => None,
        }
    }

    fn from_line(position: usize, line: &str) -> Option<Reference> {
        let (marker, rest) = match RE_MARKED.captures(line) {
            Some(c) => (strip_brackets(&c["marker"]), c["rest"].to_string()),
            None => ((position + 1).to_string(), line.to_string()),
        };
        let m = RE_URL.find(&rest)?;
        let raw_url = trim_url_tail(m.as_str());
        let url = parse_absolute_url(raw_url).ok()?;

        let url_end = m.start() + raw_url.len();
        let mut label = String::with_capacity(rest.len());
        label.push_str(&rest[..m.start()]);
        label.push_str(&rest[url_end..]);
        let label = collapse_whitespace(&label)
            .trim_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '–' | '—' | ':' | '|' | '(' | ')' | '.' | ',' | ';'))
            .to_string();
        let label = if label.is_empty() {
            url.host_str().unwrap_or_default().to_string()
        } else {
            label
        };
        Some(Reference { marker, url, label })
    }

    /// `[marker]` as it appears inside a summary.
    pub fn citation(&self) -> String {
        format!("[{}]", self.marker)
    }
}

/// Drop sentence punctuation and closing parens that do not belong to the URL,
/// so `(see https://en.wikipedia.org/wiki/Mamba_(model)).` keeps `_(model)`.
fn trim_url_tail(mut url: &str) -> &str {
    loop {
        let trimmed = url.trim_end_matches(['.', ',', ';', ':']);
        let unbalanced = trimmed.ends_with(')') && trimmed.matches(')').count() > trimmed.matches('(').count();
        let next = if unbalanced { &trimmed[..trimmed.len() - 1] } else { trimmed };
        if next.len() == url.len() {
            return url;
        }
        url = next;
    }
}

fn strip_brackets(s: &str) -> String {
    s.trim().trim_start_matches('[').trim_end_matches(']').trim().to_string()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Absolute http(s) URL with a host.
pub fn parse_absolute_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme `{}`", url.scheme()));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err("missing host".to_string());
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn category_accepts_table_labels_and_plain_words() {
        assert_eq!(Category::coerce(Some("🚀 모델 릴리스")), (Category::ModelRelease, false));
        assert_eq!(Category::coerce(Some("model-release")), (Category::ModelRelease, false));
        assert_eq!(Category::coerce(Some("Market / Business")), (Category::MarketBusiness, false));
        assert_eq!(Category::coerce(Some("Benchmarks")), (Category::Benchmark, false));
        assert_eq!(Category::coerce(Some("infrastucture")), (Category::InfraTooling, false));
    }

    #[test]
    fn unknown_category_falls_back() {
        assert_eq!(Category::coerce(Some("gossip")), (Category::FALLBACK, true));
        assert_eq!(Category::coerce(Some("🎉")), (Category::FALLBACK, true));
        assert_eq!(Category::coerce(None), (Category::FALLBACK, true));
    }

    #[test]
    fn importance_defaults_to_medium() {
        assert_eq!(Importance::coerce(Some("🔥 High")), (Importance::High, false));
        assert_eq!(Importance::coerce(Some("낮음")), (Importance::Low, false));
        assert_eq!(Importance::coerce(None), (Importance::Medium, false));
        assert_eq!(Importance::coerce(Some("urgent!!")), (Importance::Medium, true));
    }

    #[test]
    fn tag_set_keeps_first_spelling_and_order() {
        let tags: TagSet = ["OpenAI", " GRPO ", "openai", "", "Mamba"].into_iter().collect();
        assert_eq!(tags.iter().collect::<Vec<_>>(), vec!["OpenAI", "GRPO", "Mamba"]);
    }

    #[test]
    fn item_requires_title_and_absolute_url() {
        let no_title = json!({"source_url": "https://a.example/x"});
        let err = Item::from_value(0, &no_title).unwrap_err();
        assert_eq!(err.reason, ValidationReason::MissingTitle);

        let relative = json!({"title": "T", "source_url": "/news/1"});
        let err = Item::from_value(3, &relative).unwrap_err();
        assert_eq!(err.index, 3);
        assert_eq!(err.title.as_deref(), Some("T"));
        assert!(matches!(err.reason, ValidationReason::InvalidSourceUrl { .. }));

        let ftp = json!({"title": "T", "source_url": "ftp://files.example/x"});
        assert!(Item::from_value(0, &ftp).is_err());

        let missing = json!({"title": "T"});
        assert_eq!(
            Item::from_value(0, &missing).unwrap_err().reason,
            ValidationReason::MissingSourceUrl
        );
    }

    #[test]
    fn item_coerces_fields() {
        let v = json!({
            "title": "  DeepSeek   ships R2 ",
            "category": "weird",
            "tags": "DeepSeek, RLVR, deepseek",
            "summary": "Summary [1].",
            "source_url": "https://deepseek.example/r2"
        });
        let item = Item::from_value(0, &v).unwrap();
        assert_eq!(item.title, "DeepSeek ships R2");
        assert_eq!(item.category, Category::FALLBACK);
        assert_eq!(item.importance, Importance::Medium);
        assert_eq!(item.tags.len(), 2);
    }

    #[test]
    fn identity_is_stable_and_depends_on_both_fields() {
        let a = Item::from_value(0, &json!({"title": "A", "source_url": "https://x.example/1"})).unwrap();
        let b = Item::from_value(5, &json!({"title": "A", "source_url": "https://x.example/1", "category": "benchmark"})).unwrap();
        let c = Item::from_value(0, &json!({"title": "A", "source_url": "https://x.example/2"})).unwrap();
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), c.identity());
        assert_eq!(a.identity().len(), 12);
    }

    #[test]
    fn reference_string_form() {
        let r = Reference::from_value(0, &json!("[2] Anthropic blog - https://www.anthropic.com/news/x.")).unwrap();
        assert_eq!(r.marker, "2");
        assert_eq!(r.label, "Anthropic blog");
        assert_eq!(r.url.as_str(), "https://www.anthropic.com/news/x");
        assert_eq!(r.citation(), "[2]");
    }

    #[test]
    fn reference_urls_keep_balanced_parens() {
        let r = Reference::from_value(
            0,
            &json!("[4] Transformer - https://en.wikipedia.org/wiki/Transformer_(deep_learning_architecture)"),
        )
        .unwrap();
        assert_eq!(
            r.url.as_str(),
            "https://en.wikipedia.org/wiki/Transformer_(deep_learning_architecture)"
        );
        assert_eq!(r.label, "Transformer");

        let r = Reference::from_value(0, &json!("[5] Paper (https://arxiv.org/abs/2501.00001).")).unwrap();
        assert_eq!(r.url.as_str(), "https://arxiv.org/abs/2501.00001");
        assert_eq!(r.label, "Paper");

        assert_eq!(
            trim_url_tail("https://en.wikipedia.org/wiki/Mamba_(model))."),
            "https://en.wikipedia.org/wiki/Mamba_(model)"
        );
    }

    #[test]
    fn reference_object_form_and_drops() {
        let r = Reference::from_value(4, &json!({"url": "https://arxiv.org/abs/2501.00001", "title": "Paper"})).unwrap();
        assert_eq!(r.marker, "5");
        assert_eq!(r.label, "Paper");

        assert!(Reference::from_value(0, &json!("[1] no link here")).is_none());
        assert!(Reference::from_value(0, &json!({"id": 1, "url": "not a url"})).is_none());
        assert!(Reference::from_value(0, &json!(42)).is_none());
    }
}
