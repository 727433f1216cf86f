//! Result parser: raw model text → validated items + references.
//!
//! Extraction is best-effort (fenced blocks first, then a string-aware brace
//! scan); parsing is strict. A payload that cannot be located or decoded is a
//! single fatal [`ParseFailure`]. Malformed items and references are handled
//! one by one.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::{ItemValidationFailure, ParseFailure};
use crate::schema::{Item, Reference};

/// Characters of raw output kept in parse failures for the log.
pub const PREVIEW_CHARS: usize = 500;

static RE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[ \t]*(?P<lang>[A-Za-z0-9_+-]*)[^\n`]*\n?(?P<body>.*?)```").expect("fence regex")
});

#[derive(Debug, Clone, Default)]
pub struct ParsedBriefing {
    pub items: Vec<Item>,
    pub validation_errors: Vec<ItemValidationFailure>,
    pub references: Vec<Reference>,
}

/// Locate the JSON object inside `raw`.
///
/// Candidates in priority order: ```` ```json ```` fences, other fences, then
/// top-level balanced `{...}` spans. The first object carrying `items` or
/// `references` wins, then the first object of any shape. If nothing decodes,
/// the first candidate is returned so strict parsing can report why.
pub fn extract_json_payload(raw: &str) -> Option<&str> {
    let candidates = candidates(raw);
    let mut first_object = None;
    for c in candidates.iter().copied() {
        let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(c) else {
            continue;
        };
        if obj.contains_key("items") || obj.contains_key("references") {
            return Some(c);
        }
        first_object.get_or_insert(c);
    }
    first_object.or_else(|| candidates.first().copied())
}

fn candidates(raw: &str) -> Vec<&str> {
    let mut json_fenced = Vec::new();
    let mut other_fenced = Vec::new();
    for cap in RE_FENCE.captures_iter(raw) {
        let Some(body) = cap.name("body") else { continue };
        let body = body.as_str().trim();
        if !body.starts_with('{') {
            continue;
        }
        let lang = cap.name("lang").map_or("", |m| m.as_str());
        if lang.eq_ignore_ascii_case("json") {
            json_fenced.push(body);
        } else {
            other_fenced.push(body);
        }
    }

    let mut out = json_fenced;
    out.append(&mut other_fenced);
    out.extend(balanced_objects(raw));
    out
}

/// Top-level `{...}` spans, skipping braces inside JSON strings. An unbalanced
/// opener that starts a JSON object (`{"` or `{}`) ends the scan, so a truncated
/// object never yields a nested one; any other unbalanced `{` is stray prose
/// and the scan resumes right after it.
fn balanced_objects(raw: &str) -> Vec<&str> {
    let bytes = raw.as_bytes();
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(rel) = raw[pos..].find('{') {
        let start = pos + rel;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        let mut end = None;
        for (i, &b) in bytes.iter().enumerate().skip(start) {
            if in_string {
                match b {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }
        let Some(end) = end else {
            if opens_json_object(&raw[start + 1..]) {
                break;
            }
            pos = start + 1;
            continue;
        };
        out.push(&raw[start..=end]);
        pos = end + 1;
    }
    out
}

fn opens_json_object(after_brace: &str) -> bool {
    matches!(after_brace.trim_start().chars().next(), Some('"' | '}'))
}

fn preview(raw: &str) -> String {
    raw.chars().take(PREVIEW_CHARS).collect()
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Parse one generation run's raw output.
pub fn parse_briefing(raw: &str) -> Result<ParsedBriefing, ParseFailure> {
    let payload = extract_json_payload(raw).ok_or_else(|| ParseFailure::NoJsonObject {
        preview: preview(raw),
    })?;

    let root: Value = serde_json::from_str(payload).map_err(|source| ParseFailure::InvalidJson {
        source,
        preview: preview(raw),
    })?;
    let Value::Object(mut root) = root else {
        return Err(ParseFailure::NoJsonObject {
            preview: preview(raw),
        });
    };

    let raw_items = match root.remove("items") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(ParseFailure::ItemsNotArray {
                found: json_type_name(&other),
                preview: preview(raw),
            })
        }
    };

    let mut parsed = ParsedBriefing::default();
    for (index, value) in raw_items.iter().enumerate() {
        match Item::from_value(index, value) {
            Ok(item) => parsed.items.push(item),
            Err(failure) => {
                tracing::warn!(
                    item = index,
                    title = failure.title.as_deref().unwrap_or("<none>"),
                    reason = %failure.reason,
                    "item failed validation"
                );
                parsed.validation_errors.push(failure);
            }
        }
    }

    if let Some(Value::Array(refs)) = root.get("references") {
        let mut dropped = 0usize;
        for (position, value) in refs.iter().enumerate() {
            match Reference::from_value(position, value) {
                Some(r) => parsed.references.push(r),
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            tracing::debug!(dropped, "malformed references dropped");
        }
    }

    Ok(parsed)
}
