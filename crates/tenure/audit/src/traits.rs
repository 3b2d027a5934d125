use crate::model::{AuditRecord, PatchEvent, ProgressSnapshot, ScoringEvent};
use crate::AuditResult;
use async_trait::async_trait;

/// Generic query window for paged reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

impl QueryWindow {
    pub fn latest(limit: usize) -> Self {
        Self { limit, offset: 0 }
    }
}

/// Storage interface for the append-only decision log.
///
/// Each call is one atomic unit: the record is appended, and for counted
/// scoring events the aggregate is advanced, or neither happens.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append a scoring event, advancing the aggregate when it was counted.
    async fn log_scoring_event(&self, event: ScoringEvent) -> AuditResult<AuditRecord>;

    /// Append a patch attempt.
    async fn log_patch_event(&self, event: PatchEvent) -> AuditResult<AuditRecord>;

    /// Read the single aggregate row.
    async fn get_aggregate_progress(&self) -> AuditResult<ProgressSnapshot>;

    /// List records newest-first. A zero limit means no limit.
    async fn list_audit(&self, window: QueryWindow) -> AuditResult<Vec<AuditRecord>>;

    /// Hash of the newest record.
    async fn latest_hash(&self) -> AuditResult<Option<String>>;
}
