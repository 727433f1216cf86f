// tests/uploader_retry.rs
mod common;

use common::*;
use daily_ai_briefing::notion::{ApiError, PageId, RetryPolicy, UploadOutcome, Uploader};

fn uploader(pages: std::sync::Arc<ScriptedPages>, attempts: u32) -> Uploader {
    Uploader::new(pages, "db-123", RetryPolicy::immediate(attempts))
}

#[tokio::test]
async fn rate_limited_twice_then_created() {
    let pages = ScriptedPages::scripted(vec![
        Err(rate_limited()),
        Err(rate_limited()),
        Ok(PageId("page-ok".into())),
    ]);
    let up = uploader(pages.clone(), 3);

    let out = up.upload(&sample_payload("Rate limited")).await;
    assert_eq!(
        out,
        UploadOutcome::Created {
            page_id: "page-ok".into(),
            attempts: 3
        }
    );
    assert_eq!(pages.call_count(), 3);
    // every attempt targets the configured table
    assert!(pages.calls.lock().iter().all(|(db, _)| db == "db-123"));
}

#[tokio::test]
async fn schema_rejection_is_not_retried() {
    let pages = ScriptedPages::scripted(vec![Err(validation(
        "body failed validation: body.properties.Category.select.name should be one of the options",
    ))]);
    let up = uploader(pages.clone(), 5);

    match up.upload(&sample_payload("Bad category")).await {
        UploadOutcome::RejectedBySchema { field, attempts, .. } => {
            assert_eq!(field.as_deref(), Some("Category"));
            assert_eq!(attempts, 1);
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(pages.call_count(), 1);
}

#[tokio::test]
async fn exhausted_budget_is_transient_failure() {
    let pages = ScriptedPages::scripted(vec![Err(server_error()), Err(server_error()), Err(server_error())]);
    let up = uploader(pages.clone(), 3);

    let out = up.upload(&sample_payload("Always 502")).await;
    match &out {
        UploadOutcome::TransientFailure { reason, attempts } => {
            assert_eq!(*attempts, 3);
            assert!(reason.contains("502"), "reason: {reason}");
        }
        other => panic!("expected transient failure, got {other:?}"),
    }
    assert_eq!(pages.call_count(), 3);
    assert!(!out.is_created());
}

#[tokio::test]
async fn auth_failure_stops_after_first_attempt() {
    let pages = ScriptedPages::scripted(vec![Err(unauthorized()), Ok(PageId("never".into()))]);
    let up = uploader(pages.clone(), 3);

    let out = up.upload(&sample_payload("Bad token")).await;
    assert!(matches!(out, UploadOutcome::TransientFailure { attempts: 1, .. }));
    assert_eq!(pages.call_count(), 1);
}

#[tokio::test]
async fn network_errors_are_retried() {
    let pages = ScriptedPages::scripted(vec![
        Err(ApiError::network("connection reset")),
        Ok(PageId("p2".into())),
    ]);
    let up = uploader(pages.clone(), 2);

    let out = up.upload(&sample_payload("Flaky network")).await;
    assert_eq!(out.attempts(), 2);
    assert!(out.is_created());
}

#[tokio::test]
async fn single_attempt_budget_never_retries() {
    let pages = ScriptedPages::scripted(vec![Err(rate_limited()), Ok(PageId("late".into()))]);
    let up = uploader(pages.clone(), 1);

    let out = up.upload(&sample_payload("One shot")).await;
    assert!(matches!(out, UploadOutcome::TransientFailure { attempts: 1, .. }));
    assert_eq!(pages.call_count(), 1);
}
