use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tenure_types::{CapabilityTier, UnlockMap};

/// One scored submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringEvent {
    pub text: String,
    pub predicted_intent: String,
    pub expected_intent: Option<String>,
    pub score: f64,
    pub breakdown: BTreeMap<String, f64>,
    /// Unlock flags after this score was folded in.
    pub unlocks: UnlockMap,
    pub requested_action: String,
    pub required_unlock: CapabilityTier,
    pub allowed: bool,
    /// Whether the score entered the progress window (and the aggregate).
    pub counted: bool,
}

/// One patch generation or application attempt.
///
/// `new_hash` equals `old_hash` whenever nothing was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchEvent {
    pub requested_action: String,
    pub required_unlock: CapabilityTier,
    pub allowed: bool,
    pub old_hash: String,
    pub new_hash: String,
    pub diff: String,
    /// Outcome details: stage, reason, stats, filename.
    pub meta: Value,
}

/// Audit payload. Sequencing and hashes are assigned by storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "event", rename_all = "snake_case")]
pub enum AuditEntry {
    Scoring(ScoringEvent),
    Patch(PatchEvent),
}

impl AuditEntry {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scoring(_) => "scoring",
            Self::Patch(_) => "patch",
        }
    }
}

/// Persistent tamper-evident audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    pub entry: AuditEntry,
    pub previous_hash: Option<String>,
    pub hash: String,
}

/// Running aggregate over every counted score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub cumulative_score: f64,
    pub sample_count: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            cumulative_score: 0.0,
            sample_count: 0,
            updated_at: None,
        }
    }
}

impl ProgressSnapshot {
    /// All-time mean of counted scores; 0 when nothing was counted.
    pub fn mean_score(&self) -> f64 {
        if self.sample_count == 0 {
            0.0
        } else {
            self.cumulative_score / self.sample_count as f64
        }
    }

    pub(crate) fn add(&mut self, score: f64, at: DateTime<Utc>) {
        self.cumulative_score += score;
        self.sample_count += 1;
        self.updated_at = Some(at);
    }
}
