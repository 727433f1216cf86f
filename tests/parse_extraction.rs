// tests/parse_extraction.rs
mod common;

use common::fixture;
use daily_ai_briefing::error::{ParseFailure, ValidationReason};
use daily_ai_briefing::parse::PREVIEW_CHARS;
use daily_ai_briefing::{parse_briefing, Category, Importance};

#[test]
fn realistic_response_parses_every_item() {
    let parsed = parse_briefing(&fixture("briefing_response.txt")).unwrap();

    assert_eq!(parsed.items.len(), 5);
    assert!(parsed.validation_errors.is_empty());

    let cats: Vec<Category> = parsed.items.iter().map(|i| i.category).collect();
    assert_eq!(
        cats,
        vec![
            Category::PaperResearch,
            Category::ModelRelease,
            Category::Benchmark,
            Category::MarketBusiness,
            Category::InfraTooling,
        ]
    );
    let imps: Vec<Importance> = parsed.items.iter().map(|i| i.importance).collect();
    assert_eq!(
        imps,
        vec![
            Importance::High,
            Importance::High,
            Importance::Medium,
            Importance::Low,
            Importance::Medium,
        ]
    );

    // comma-separated tags are split and trimmed
    let tags: Vec<&str> = parsed.items[1].tags.iter().collect();
    assert_eq!(tags, vec!["Anthropic", "Long Context"]);

    // string and object references both resolve
    let markers: Vec<&str> = parsed.references.iter().map(|r| r.marker.as_str()).collect();
    assert_eq!(markers, vec!["1", "2", "3"]);
    assert_eq!(parsed.references[0].label, "arXiv");
    assert_eq!(parsed.references[1].label, "Anthropic News");
}

#[test]
fn identity_is_stable_across_parses() {
    let raw = fixture("briefing_response.txt");
    let a = parse_briefing(&raw).unwrap();
    let b = parse_briefing(&raw).unwrap();
    let ids: Vec<String> = a.items.iter().map(|i| i.identity()).collect();
    assert_eq!(ids, b.items.iter().map(|i| i.identity()).collect::<Vec<_>>());
    assert!(ids.iter().all(|id| id.len() == 12));
    // distinct findings, distinct identities
    let mut uniq = ids.clone();
    uniq.sort();
    uniq.dedup();
    assert_eq!(uniq.len(), 5);
}

#[test]
fn unknown_category_falls_back_and_missing_importance_defaults() {
    let raw = r#"{"items": [{"title": "Odd", "category": "Gossip", "source_url": "https://e.com"}]}"#;
    let parsed = parse_briefing(raw).unwrap();
    assert_eq!(parsed.items[0].category, Category::FALLBACK);
    assert_eq!(parsed.items[0].importance, Importance::DEFAULT);
    assert_eq!(parsed.items[0].summary, "");
}

#[test]
fn non_object_items_are_validation_failures() {
    let raw = r#"{"items": ["just a string", {"title": "  ", "source_url": "https://e.com"}]}"#;
    let parsed = parse_briefing(raw).unwrap();
    assert!(parsed.items.is_empty());
    assert_eq!(parsed.validation_errors[0].reason, ValidationReason::NotAnObject);
    assert_eq!(parsed.validation_errors[1].reason, ValidationReason::MissingTitle);
}

#[test]
fn long_unparseable_output_keeps_a_bounded_preview() {
    let raw = "가".repeat(PREVIEW_CHARS * 3);
    match parse_briefing(&raw) {
        Err(e @ ParseFailure::NoJsonObject { .. }) => {
            assert_eq!(e.preview().chars().count(), PREVIEW_CHARS);
        }
        other => panic!("expected NoJsonObject, got {other:?}"),
    }
}

#[test]
fn references_without_urls_are_dropped() {
    let raw = r#"{"items": [], "references": ["[1] no link here", 42, {"id": "2", "url": "ftp://x"}, "[3] ok https://ok.example/a."]}"#;
    let parsed = parse_briefing(raw).unwrap();
    assert_eq!(parsed.references.len(), 1);
    assert_eq!(parsed.references[0].marker, "3");
    assert_eq!(parsed.references[0].url.as_str(), "https://ok.example/a");
}
