//! The fixed instruction sent to the research model.

use chrono::NaiveDate;

use crate::config::BriefingSettings;
use crate::notion::ChoiceMap;

/// Render the research instruction for `date`.
pub fn build_instruction(date: NaiveDate, settings: &BriefingSettings, choices: &ChoiceMap) -> String {
    let categories = quoted_alternatives(&choices.category_labels());
    let importances = quoted_alternatives(&choices.importance_labels());
    let tag_rule = if settings.tags.is_empty() {
        "Use short topical tags (one to three words each).".to_string()
    } else {
        format!("Choose tags only from: {}.", settings.tags.join(", "))
    };

    format!(
        r#"Today is {date}. Write a briefing on the newest developments in {focus}, based on news published today or within the last 7 days.

Deduplication rules:
1) Merge reports of the same event into a single item; never repeat one event in different words.
2) Skip re-summaries of old, widely known issues; prefer facts, announcements and metric changes first confirmed in the last 7 days.
3) When two items overlap, keep only the one with the larger impact.

Content rules:
- Balance research (papers, techniques) with market news (companies, products, funding, regulation).
- Summarize each item in 2-3 sentences that make clear what is new and why it matters.
- Cite the papers, official announcements or reliable articles you relied on in `references`, and mark citations in summaries as [1], [2], ...
- Every item needs a source_url that is an absolute https URL.
- Write titles and summaries in {language}.

Use web search to verify every item against today's sources, and include only {min}-{max} important, non-overlapping updates.

Reply with exactly one JSON object in a ```json code block, in this shape:

```json
{{
  "items": [
    {{
      "title": "headline",
      "category": {categories},
      "importance": {importances},
      "tags": ["tag1", "tag2"],
      "summary": "2-3 sentence summary with [1] style citations",
      "source_url": "https://..."
    }}
  ],
  "references": [
    "[1] description - URL",
    "[2] description - URL"
  ]
}}
```

{tag_rule}"#,
        date = date.format("%Y-%m-%d"),
        focus = settings.topic_focus,
        language = settings.language,
        min = settings.min_items,
        max = settings.max_items,
    )
}

fn quoted_alternatives(labels: &[&str]) -> String {
    labels
        .iter()
        .map(|l| format!("\"{l}\""))
        .collect::<Vec<_>>()
        .join(" | ")
}
