//! End-to-end tests for persisting engine state between sessions.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use retake_engine::{
    EngineSnapshot, EngineState, MistakeRecord, Quality, QuestionKind, ReportConfig,
    ReviewInterval, STORE_VERSION,
};
use retake_report::{json::JsonGenerator, MarkdownGenerator, ReviewDigest};

fn at(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

fn store_path(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join("retake-integration")
        .join(name)
        .join("store.json")
}

/// One week of practice on two items.
fn practiced_state() -> EngineState {
    let mut state = EngineState::new();
    let day_one = at("2026-05-01T08:00:00Z");

    state.schedule.record("two-sum", Quality::Good, day_one, 180);
    state.schedule.record("lru-cache", Quality::Forgot, day_one, 420);
    state.ledger.merge(&[MistakeRecord::new(
        "lru-cache",
        QuestionKind::CodeEdit,
        "forgot to unlink the evicted node",
        day_one,
    )]);
    state.streak.record_completion(day_one.date_naive());

    let day_two = day_one + Duration::days(1);
    state.schedule.record("lru-cache", Quality::Good, day_two, 300);
    state.ledger.merge(&[MistakeRecord::new(
        "lru-cache",
        QuestionKind::CodeEdit,
        "Forgot to unlink the evicted node ",
        day_two,
    )]);
    state.streak.record_completion(day_two.date_naive());
    state
}

/// State saved at the end of one session is what the next one loads.
#[tokio::test]
async fn test_state_survives_save_and_load() {
    let path = store_path("survives");
    let state = practiced_state();
    let saved_at = at("2026-05-02T09:00:00Z");

    EngineSnapshot::capture(&state, saved_at)
        .save(&path)
        .await
        .expect("save");
    let loaded = EngineSnapshot::load(&path)
        .await
        .expect("load")
        .expect("snapshot present");

    assert_eq!(loaded.version, STORE_VERSION);
    assert_eq!(loaded.saved_at, saved_at);

    let restored = loaded.into_state();
    assert_eq!(restored, state);

    let lru = restored.schedule.get("lru-cache").expect("lru-cache");
    assert_eq!(lru.interval, ReviewInterval::ThreeDays);
    assert_eq!(lru.history.len(), 2);
    assert_eq!(restored.ledger.len(), 1);
    assert_eq!(restored.ledger.records()[0].failure_count, 2);
    assert_eq!(restored.streak.count, 2);

    std::fs::remove_dir_all(path.parent().expect("parent")).ok();
}

/// A resolved mistake stays resolved across a save, and recurs afterwards.
#[tokio::test]
async fn test_resolution_persists_until_recurrence() {
    let path = store_path("resolution");
    let mut state = practiced_state();
    let id = state.ledger.records()[0].id.clone();
    assert!(state.ledger.mark_resolved(&id));

    EngineSnapshot::capture(&state, at("2026-05-02T09:00:00Z"))
        .save(&path)
        .await
        .expect("save");
    let mut restored = EngineSnapshot::load(&path)
        .await
        .expect("load")
        .expect("snapshot present")
        .into_state();
    assert_eq!(restored.ledger.unresolved().count(), 0);

    let report = restored.ledger.merge(&[MistakeRecord::new(
        "lru-cache",
        QuestionKind::CodeEdit,
        "forgot to unlink the evicted node",
        at("2026-05-05T08:00:00Z"),
    )]);
    assert_eq!(report.recurred, 1);
    assert_eq!(restored.ledger.unresolved().count(), 1);
    assert_eq!(restored.ledger.records()[0].id, id);

    std::fs::remove_dir_all(path.parent().expect("parent")).ok();
}

/// Digests rendered from a loaded store match the live state.
#[tokio::test]
async fn test_digest_from_loaded_store() {
    let path = store_path("digest");
    let state = practiced_state();
    let now = at("2026-05-04T12:00:00Z");

    EngineSnapshot::capture(&state, now)
        .save(&path)
        .await
        .expect("save");
    let snapshot = EngineSnapshot::load(&path)
        .await
        .expect("load")
        .expect("snapshot present");

    let config = ReportConfig::default();
    let digest = ReviewDigest::from_snapshot(&snapshot, now, &config);
    assert_eq!(digest, ReviewDigest::from_state(&state, now, &config));

    // two-sum came due on the 4th; lru-cache on the 5th
    assert_eq!(
        digest.due.iter().map(|i| i.item_id.as_str()).collect::<Vec<_>>(),
        vec!["two-sum"]
    );
    assert_eq!(
        digest.upcoming.iter().map(|i| i.item_id.as_str()).collect::<Vec<_>>(),
        vec!["lru-cache"]
    );
    assert_eq!(digest.top_mistakes[0].failure_count, 2);
    assert_eq!(digest.streak.current, 0);

    let markdown = MarkdownGenerator::new(&digest).generate();
    assert!(markdown.contains("| two-sum | 3 days | today | 1 |"));

    let json = JsonGenerator::new(&digest).generate().expect("json");
    let parsed: ReviewDigest = serde_json::from_str(&json).expect("parse");
    assert_eq!(parsed, digest);

    std::fs::remove_dir_all(path.parent().expect("parent")).ok();
}

/// No store file yet is not an error.
#[tokio::test]
async fn test_missing_store_loads_as_none() {
    let loaded = EngineSnapshot::load(&store_path("never-written"))
        .await
        .expect("load");
    assert!(loaded.is_none());
}
