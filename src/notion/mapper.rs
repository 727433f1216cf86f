//! # Table mapper
//! Pure `Item → PagePayload` conversion for the briefing database.
//! No I/O; the run date is passed in by the caller.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::choices::ChoiceMap;
use crate::schema::{Item, Reference, TagSet};

/// Property names of the target database, in payload order.
pub const PROPERTY_NAMES: [&str; 7] = [
    "Title",
    "Category",
    "Date",
    "Tags",
    "Importance",
    "Summary",
    "Source",
];

pub const MAX_TITLE_CHARS: usize = 100;
/// Notion's per rich-text object limit.
pub const MAX_RICH_TEXT_CHARS: usize = 2000;
pub const MAX_TAG_CHARS: usize = 100;
pub const MAX_SUMMARY_REFERENCES: usize = 3;

const REFERENCES_HEADING: &str = "\n\n참고: ";
const REFERENCES_SEPARATOR: &str = " | ";

static RE_CITATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\[\]]{1,16})\]").expect("citation regex"));

#[derive(Debug, Clone, Default)]
pub struct MapperSettings {
    pub choices: ChoiceMap,
    /// Allowed tag spellings. Empty forwards every tag.
    pub tag_vocabulary: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PagePayload {
    pub properties: PageProperties,
}

impl PagePayload {
    /// Plain title text, for logs.
    pub fn title(&self) -> &str {
        self.properties
            .title
            .title
            .first()
            .map(|t| t.text.content.as_str())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageProperties {
    #[serde(rename = "Title")]
    pub title: TitleProperty,
    #[serde(rename = "Category")]
    pub category: SelectProperty,
    #[serde(rename = "Date")]
    pub date: DateProperty,
    #[serde(rename = "Tags")]
    pub tags: MultiSelectProperty,
    #[serde(rename = "Importance")]
    pub importance: SelectProperty,
    #[serde(rename = "Summary")]
    pub summary: RichTextProperty,
    #[serde(rename = "Source")]
    pub source: UrlProperty,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TitleProperty {
    pub title: Vec<RichText>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RichTextProperty {
    pub rich_text: Vec<RichText>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RichText {
    pub text: TextContent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextContent {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<Link>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Link {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectProperty {
    pub select: SelectOption,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiSelectProperty {
    pub multi_select: Vec<SelectOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectOption {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateProperty {
    pub date: DateValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateValue {
    /// Date-only, `YYYY-MM-DD`.
    pub start: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UrlProperty {
    pub url: String,
}

impl RichText {
    fn plain(content: impl Into<String>) -> Self {
        Self {
            text: TextContent {
                content: content.into(),
                link: None,
            },
        }
    }

    fn linked(content: impl Into<String>, url: &str) -> Self {
        Self {
            text: TextContent {
                content: content.into(),
                link: Some(Link {
                    url: url.to_string(),
                }),
            },
        }
    }
}

fn select(name: &str) -> SelectOption {
    SelectOption {
        name: name.to_string(),
    }
}

/// Map one validated item to the database's property payload.
pub fn map_item(
    item: &Item,
    references: &[Reference],
    today: NaiveDate,
    settings: &MapperSettings,
) -> PagePayload {
    let cited = cited_references(&item.summary, references);

    PagePayload {
        properties: PageProperties {
            title: TitleProperty {
                title: vec![RichText::plain(truncate_chars(&item.title, MAX_TITLE_CHARS))],
            },
            category: SelectProperty {
                select: select(settings.choices.category(item.category)),
            },
            date: DateProperty {
                date: DateValue {
                    start: today.format("%Y-%m-%d").to_string(),
                },
            },
            tags: MultiSelectProperty {
                multi_select: filter_tags(&item.tags, &settings.tag_vocabulary)
                    .iter()
                    .map(|t| select(t))
                    .collect(),
            },
            importance: SelectProperty {
                select: select(settings.choices.importance(item.importance)),
            },
            summary: RichTextProperty {
                rich_text: summary_rich_text(&item.summary, &cited),
            },
            source: UrlProperty {
                url: item.source_url.to_string(),
            },
        },
    }
}

/// Keep tags present in `vocabulary` (case-insensitive, canonical spelling
/// emitted). Commas are stripped because multi-select names cannot hold them.
pub fn filter_tags(tags: &TagSet, vocabulary: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags.iter() {
        let canonical = if vocabulary.is_empty() {
            Some(tag)
        } else {
            vocabulary
                .iter()
                .map(String::as_str)
                .find(|v| v.eq_ignore_ascii_case(tag))
        };
        let Some(canonical) = canonical else { continue };
        let cleaned = truncate_chars(canonical.replace(',', " ").trim(), MAX_TAG_CHARS);
        if !cleaned.is_empty() && !out.iter().any(|o| o.eq_ignore_ascii_case(&cleaned)) {
            out.push(cleaned);
        }
    }
    out
}

/// References whose marker appears in `summary`, in order of first citation.
/// Without any citation the first few references are used instead.
pub fn cited_references<'a>(summary: &str, references: &'a [Reference]) -> Vec<&'a Reference> {
    let mut cited: Vec<&Reference> = Vec::new();
    for cap in RE_CITATION.captures_iter(summary) {
        let marker = cap[1].trim();
        if let Some(r) = references.iter().find(|r| r.marker == marker) {
            if !cited.iter().any(|c| std::ptr::eq(*c, r)) {
                cited.push(r);
            }
        }
    }
    if cited.is_empty() {
        cited.extend(references.iter());
    }
    cited.truncate(MAX_SUMMARY_REFERENCES);
    cited
}

fn summary_rich_text(summary: &str, cited: &[&Reference]) -> Vec<RichText> {
    let mut out = Vec::with_capacity(cited.len() * 2 + 2);
    out.push(RichText::plain(truncate_chars(summary, MAX_RICH_TEXT_CHARS)));
    if cited.is_empty() {
        return out;
    }
    out.push(RichText::plain(REFERENCES_HEADING));
    for (i, r) in cited.iter().enumerate() {
        if i > 0 {
            out.push(RichText::plain(REFERENCES_SEPARATOR));
        }
        let text = format!("{} {}", r.citation(), r.label);
        out.push(RichText::linked(
            truncate_chars(&text, MAX_RICH_TEXT_CHARS),
            r.url.as_str(),
        ));
    }
    out
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max).collect()
}
