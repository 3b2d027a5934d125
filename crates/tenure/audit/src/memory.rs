//! In-memory audit store for tests and non-durable deployments.

use crate::chain::compute_audit_hash;
use crate::model::{AuditEntry, AuditRecord, PatchEvent, ProgressSnapshot, ScoringEvent};
use crate::traits::{AuditStore, QueryWindow};
use crate::{AuditError, AuditResult};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::RwLock;

#[derive(Debug, Default)]
struct State {
    records: Vec<AuditRecord>,
    progress: ProgressSnapshot,
}

/// Vector-backed store. Record and aggregate share one lock, so an append
/// and its aggregate update are observed together.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    state: RwLock<State>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record, oldest first.
    pub fn records(&self) -> AuditResult<Vec<AuditRecord>> {
        let guard = self.state.read().map_err(|_| AuditError::LockError)?;
        Ok(guard.records.clone())
    }

    fn append(&self, entry: AuditEntry, counted_score: Option<f64>) -> AuditResult<AuditRecord> {
        let mut guard = self.state.write().map_err(|_| AuditError::LockError)?;

        let previous_hash = guard.records.last().map(|r| r.hash.clone());
        let sequence = guard.records.len() as u64 + 1;
        let recorded_at = Utc::now();
        let hash = compute_audit_hash(&entry, previous_hash.as_deref(), sequence, recorded_at)?;

        let record = AuditRecord {
            sequence,
            recorded_at,
            entry,
            previous_hash,
            hash,
        };
        guard.records.push(record.clone());
        if let Some(score) = counted_score {
            guard.progress.add(score, recorded_at);
        }
        Ok(record)
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn log_scoring_event(&self, event: ScoringEvent) -> AuditResult<AuditRecord> {
        let counted = event.counted.then_some(event.score);
        self.append(AuditEntry::Scoring(event), counted)
    }

    async fn log_patch_event(&self, event: PatchEvent) -> AuditResult<AuditRecord> {
        self.append(AuditEntry::Patch(event), None)
    }

    async fn get_aggregate_progress(&self) -> AuditResult<ProgressSnapshot> {
        let guard = self.state.read().map_err(|_| AuditError::LockError)?;
        Ok(guard.progress.clone())
    }

    async fn list_audit(&self, window: QueryWindow) -> AuditResult<Vec<AuditRecord>> {
        let guard = self.state.read().map_err(|_| AuditError::LockError)?;
        let mut values = guard.records.clone();
        values.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        Ok(apply_window(values, window))
    }

    async fn latest_hash(&self) -> AuditResult<Option<String>> {
        let guard = self.state.read().map_err(|_| AuditError::LockError)?;
        Ok(guard.records.last().map(|r| r.hash.clone()))
    }
}

fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::verify_chain;
    use std::collections::BTreeMap;
    use tenure_types::CapabilityTier;

    fn scoring(score: f64, counted: bool) -> ScoringEvent {
        ScoringEvent {
            text: "rename the helper".to_string(),
            predicted_intent: "refactor".to_string(),
            expected_intent: None,
            score,
            breakdown: BTreeMap::from([("total".to_string(), score)]),
            unlocks: CapabilityTier::all_locked(),
            requested_action: "refactor".to_string(),
            required_unlock: CapabilityTier::RefactorLint,
            allowed: false,
            counted,
        }
    }

    fn patch() -> PatchEvent {
        PatchEvent {
            requested_action: "minor_edit".to_string(),
            required_unlock: CapabilityTier::MinorEdits,
            allowed: false,
            old_hash: "aa".to_string(),
            new_hash: "aa".to_string(),
            diff: String::new(),
            meta: serde_json::json!({"stage": "apply", "reason": "wrong_base"}),
        }
    }

    #[tokio::test]
    async fn audit_chain_hashes_are_linked() {
        let store = InMemoryAuditStore::new();
        let first = store.log_scoring_event(scoring(0.4, true)).await.unwrap();
        let second = store.log_patch_event(patch()).await.unwrap();

        assert_eq!(first.sequence, 1);
        assert_eq!(first.previous_hash, None);
        assert_eq!(second.previous_hash, Some(first.hash));
        assert_eq!(store.latest_hash().await.unwrap(), Some(second.hash));
        verify_chain(&store.records().unwrap()).unwrap();
    }

    #[tokio::test]
    async fn aggregate_tracks_counted_scores_only() {
        let store = InMemoryAuditStore::new();
        store.log_scoring_event(scoring(0.4, true)).await.unwrap();
        store.log_scoring_event(scoring(0.8, true)).await.unwrap();
        store.log_scoring_event(scoring(1.0, false)).await.unwrap();
        store.log_patch_event(patch()).await.unwrap();

        let progress = store.get_aggregate_progress().await.unwrap();
        assert_eq!(progress.sample_count, 2);
        assert!((progress.cumulative_score - 1.2).abs() < 1e-12);
        assert!((progress.mean_score() - 0.6).abs() < 1e-12);
    }

    #[tokio::test]
    async fn list_is_newest_first_and_windowed() {
        let store = InMemoryAuditStore::new();
        for i in 0..5 {
            store.log_scoring_event(scoring(i as f64 / 10.0, true)).await.unwrap();
        }
        let page = store
            .list_audit(QueryWindow { limit: 2, offset: 1 })
            .await
            .unwrap();
        let sequences: Vec<u64> = page.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![4, 3]);
        assert_eq!(store.list_audit(QueryWindow::default()).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn tampering_breaks_the_chain() {
        let store = InMemoryAuditStore::new();
        store.log_scoring_event(scoring(0.4, true)).await.unwrap();
        store.log_patch_event(patch()).await.unwrap();
        store.log_scoring_event(scoring(0.9, true)).await.unwrap();

        let mut records = store.records().unwrap();
        if let AuditEntry::Patch(event) = &mut records[1].entry {
            event.allowed = true;
        }
        let err = verify_chain(&records).unwrap_err();
        assert_eq!(err.sequence, 2);

        let mut records = store.records().unwrap();
        records.remove(1);
        assert_eq!(verify_chain(&records).unwrap_err().sequence, 3);
    }
}
