#![cfg(feature = "sqlite")]

use serde_json::json;
use std::collections::BTreeMap;
use tenure_audit::{
    verify_chain, AuditEntry, AuditStore, PatchEvent, QueryWindow, ScoringEvent, SqliteAuditStore,
};
use tenure_types::CapabilityTier;

fn scoring(score: f64, counted: bool) -> ScoringEvent {
    ScoringEvent {
        text: "explain the parser".to_string(),
        predicted_intent: "explain".to_string(),
        expected_intent: Some("explain".to_string()),
        score,
        breakdown: BTreeMap::from([("keywords".to_string(), 0.3), ("total".to_string(), score)]),
        unlocks: CapabilityTier::all_locked(),
        requested_action: "explain".to_string(),
        required_unlock: CapabilityTier::AssistMode,
        allowed: true,
        counted,
    }
}

fn patch(allowed: bool) -> PatchEvent {
    PatchEvent {
        requested_action: "fix_bug".to_string(),
        required_unlock: CapabilityTier::MinorEdits,
        allowed,
        old_hash: "0f".repeat(32),
        new_hash: "0f".repeat(32),
        diff: "@@ -1 +1 @@\n-a\n+b\n".to_string(),
        meta: json!({"stage": "generate", "filename": "a.py", "stats": {"additions": 1, "deletions": 1}}),
    }
}

#[tokio::test]
async fn records_round_trip_and_chain_verifies() {
    let store = SqliteAuditStore::connect("sqlite::memory:").await.unwrap();
    store.log_scoring_event(scoring(0.1 + 0.2, true)).await.unwrap();
    store.log_patch_event(patch(false)).await.unwrap();
    let last = store.log_scoring_event(scoring(2.0 / 3.0, false)).await.unwrap();

    let records = store.list_audit(QueryWindow::default()).await.unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].sequence, 3);
    assert_eq!(records[0], last);
    assert!(matches!(records[1].entry, AuditEntry::Patch(_)));
    verify_chain(&records).unwrap();

    assert_eq!(store.latest_hash().await.unwrap(), Some(last.hash));
}

#[tokio::test]
async fn aggregate_moves_with_counted_events() {
    let store = SqliteAuditStore::connect("sqlite::memory:").await.unwrap();
    let empty = store.get_aggregate_progress().await.unwrap();
    assert_eq!(empty.sample_count, 0);
    assert!(empty.updated_at.is_none());

    store.log_scoring_event(scoring(0.5, true)).await.unwrap();
    store.log_scoring_event(scoring(0.25, true)).await.unwrap();
    store.log_scoring_event(scoring(1.0, false)).await.unwrap();

    let progress = store.get_aggregate_progress().await.unwrap();
    assert_eq!(progress.sample_count, 2);
    assert!((progress.cumulative_score - 0.75).abs() < 1e-12);
    assert!(progress.updated_at.is_some());
}

#[tokio::test]
async fn history_cannot_be_rewritten() {
    let store = SqliteAuditStore::connect("sqlite::memory:").await.unwrap();
    store.log_patch_event(patch(true)).await.unwrap();

    let update = sqlx::query("UPDATE audit_log SET hash = 'x' WHERE sequence = 1")
        .execute(store.pool())
        .await;
    assert!(update.is_err());

    let delete = sqlx::query("DELETE FROM audit_log").execute(store.pool()).await;
    assert!(delete.is_err());
}

#[tokio::test]
async fn durable_file_survives_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("audit.db").display());

    {
        let store = SqliteAuditStore::connect(&url).await.unwrap();
        store.log_scoring_event(scoring(0.9, true)).await.unwrap();
    }

    let store = SqliteAuditStore::connect(&url).await.unwrap();
    store.log_patch_event(patch(true)).await.unwrap();
    let records = store.list_audit(QueryWindow::latest(10)).await.unwrap();
    assert_eq!(records.len(), 2);
    verify_chain(&records).unwrap();
    assert_eq!(store.get_aggregate_progress().await.unwrap().sample_count, 1);
}
