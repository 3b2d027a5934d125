//! BLAKE3 hash chain over audit records.

use crate::model::{AuditEntry, AuditRecord};
use crate::{AuditError, AuditResult};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// The first inconsistency found while walking a chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("audit chain broken at sequence {sequence}: {reason}")]
pub struct ChainBreak {
    pub sequence: u64,
    pub reason: String,
}

pub fn compute_audit_hash(
    entry: &AuditEntry,
    previous_hash: Option<&str>,
    sequence: u64,
    recorded_at: DateTime<Utc>,
) -> AuditResult<String> {
    let serializable = serde_json::json!({
        "previous_hash": previous_hash,
        "sequence": sequence,
        "recorded_at": recorded_at,
        "entry": entry,
    });
    let serialized =
        serde_json::to_vec(&serializable).map_err(|e| AuditError::Serialization(e.to_string()))?;
    Ok(blake3::hash(&serialized).to_hex().to_string())
}

/// Check a contiguous run of records, in any order.
///
/// Sequences must be consecutive, each record must link to its
/// predecessor's hash, and every hash must recompute. A run that starts at
/// sequence 1 must have no predecessor; a later run is checked from its
/// first record onwards.
pub fn verify_chain(records: &[AuditRecord]) -> Result<(), ChainBreak> {
    let mut ordered: Vec<&AuditRecord> = records.iter().collect();
    ordered.sort_by_key(|r| r.sequence);

    let mut previous: Option<&AuditRecord> = None;
    for record in ordered {
        let fail = |reason: String| ChainBreak {
            sequence: record.sequence,
            reason,
        };

        match previous {
            Some(prev) => {
                if record.sequence != prev.sequence + 1 {
                    return Err(fail(format!("expected sequence {}", prev.sequence + 1)));
                }
                if record.previous_hash.as_deref() != Some(prev.hash.as_str()) {
                    return Err(fail("previous hash does not match predecessor".to_string()));
                }
            }
            None if record.sequence == 1 && record.previous_hash.is_some() => {
                return Err(fail("first record has a predecessor hash".to_string()));
            }
            None => {}
        }

        let expected = compute_audit_hash(
            &record.entry,
            record.previous_hash.as_deref(),
            record.sequence,
            record.recorded_at,
        )
        .map_err(|e| fail(e.to_string()))?;
        if expected != record.hash {
            return Err(fail("hash does not match contents".to_string()));
        }
        previous = Some(record);
    }
    Ok(())
}
