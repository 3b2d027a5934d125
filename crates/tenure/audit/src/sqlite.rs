//! SQLite adapter for the audit log.
//!
//! One append-only `audit_log` table (guarded by triggers against UPDATE and
//! DELETE) plus a single-row `progress` aggregate. Each logical write runs in
//! one transaction.

use crate::chain::compute_audit_hash;
use crate::model::{AuditEntry, AuditRecord, PatchEvent, ProgressSnapshot, ScoringEvent};
use crate::traits::{AuditStore, QueryWindow};
use crate::{AuditError, AuditResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::info;

/// SQLite-backed audit store.
#[derive(Clone, Debug)]
pub struct SqliteAuditStore {
    pool: SqlitePool,
}

impl SqliteAuditStore {
    /// Connect (creating the database file if needed) and initialize schema.
    ///
    /// The pool holds a single connection: appends are serialized, and
    /// `sqlite::memory:` databases stay a single database.
    pub async fn connect(database_url: &str) -> AuditResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AuditError::InvalidInput(format!("bad database url: {e}")))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| AuditError::Backend(format!("failed to connect sqlite: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        info!(database_url, "Audit store ready");
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> AuditResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> AuditResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS audit_log (
                sequence INTEGER PRIMARY KEY,
                recorded_at TEXT NOT NULL,
                kind TEXT NOT NULL,
                entry TEXT NOT NULL,
                previous_hash TEXT,
                hash TEXT NOT NULL UNIQUE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS progress (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                cumulative_score REAL NOT NULL,
                sample_count INTEGER NOT NULL,
                updated_at TEXT
            )
            "#,
            r#"
            INSERT OR IGNORE INTO progress (id, cumulative_score, sample_count, updated_at)
            VALUES (1, 0.0, 0, NULL)
            "#,
            r#"
            CREATE TRIGGER IF NOT EXISTS audit_log_no_update
            BEFORE UPDATE ON audit_log
            BEGIN
                SELECT RAISE(ABORT, 'audit_log is append-only');
            END
            "#,
            r#"
            CREATE TRIGGER IF NOT EXISTS audit_log_no_delete
            BEFORE DELETE ON audit_log
            BEGIN
                SELECT RAISE(ABORT, 'audit_log is append-only');
            END
            "#,
        ];

        for statement in ddl {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn append(&self, entry: AuditEntry, counted_score: Option<f64>) -> AuditResult<AuditRecord> {
        let mut tx = self.pool.begin().await?;

        let last = sqlx::query("SELECT sequence, hash FROM audit_log ORDER BY sequence DESC LIMIT 1")
            .fetch_optional(&mut *tx)
            .await?;

        let (sequence, previous_hash) = match last {
            Some(row) => {
                let seq: i64 = row.try_get("sequence")?;
                let prev: String = row.try_get("hash")?;
                (seq + 1, Some(prev))
            }
            None => (1_i64, None),
        };

        let recorded_at = Utc::now();
        let hash = compute_audit_hash(&entry, previous_hash.as_deref(), sequence as u64, recorded_at)?;
        let entry_json = serde_json::to_string(&entry)?;

        sqlx::query(
            r#"
            INSERT INTO audit_log (sequence, recorded_at, kind, entry, previous_hash, hash)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(sequence)
        .bind(recorded_at)
        .bind(entry.kind())
        .bind(entry_json)
        .bind(previous_hash.clone())
        .bind(hash.clone())
        .execute(&mut *tx)
        .await?;

        if let Some(score) = counted_score {
            sqlx::query(
                r#"
                UPDATE progress
                   SET cumulative_score = cumulative_score + ?1,
                       sample_count = sample_count + 1,
                       updated_at = ?2
                 WHERE id = 1
                "#,
            )
            .bind(score)
            .bind(recorded_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(AuditRecord {
            sequence: sequence as u64,
            recorded_at,
            entry,
            previous_hash,
            hash,
        })
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn log_scoring_event(&self, event: ScoringEvent) -> AuditResult<AuditRecord> {
        let counted = event.counted.then_some(event.score);
        self.append(AuditEntry::Scoring(event), counted).await
    }

    async fn log_patch_event(&self, event: PatchEvent) -> AuditResult<AuditRecord> {
        self.append(AuditEntry::Patch(event), None).await
    }

    async fn get_aggregate_progress(&self) -> AuditResult<ProgressSnapshot> {
        let row = sqlx::query(
            "SELECT cumulative_score, sample_count, updated_at FROM progress WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(ProgressSnapshot::default());
        };
        Ok(ProgressSnapshot {
            cumulative_score: row.try_get("cumulative_score")?,
            sample_count: to_u64(row.try_get::<i64, _>("sample_count")?)?,
            updated_at: row.try_get::<Option<DateTime<Utc>>, _>("updated_at")?,
        })
    }

    async fn list_audit(&self, window: QueryWindow) -> AuditResult<Vec<AuditRecord>> {
        // SQLite treats a negative LIMIT as unbounded.
        let limit = if window.limit == 0 {
            -1
        } else {
            to_i64(window.limit)?
        };
        let rows = sqlx::query(
            r#"
            SELECT sequence, recorded_at, entry, previous_hash, hash
              FROM audit_log
             ORDER BY sequence DESC
             LIMIT ?1 OFFSET ?2
            "#,
        )
        .bind(limit)
        .bind(to_i64(window.offset)?)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(audit_row_to_record).collect()
    }

    async fn latest_hash(&self) -> AuditResult<Option<String>> {
        let row = sqlx::query("SELECT hash FROM audit_log ORDER BY sequence DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.try_get::<String, _>("hash")).transpose()?)
    }
}

fn audit_row_to_record(row: SqliteRow) -> AuditResult<AuditRecord> {
    let entry_json: String = row.try_get("entry")?;
    Ok(AuditRecord {
        sequence: to_u64(row.try_get::<i64, _>("sequence")?)?,
        recorded_at: row.try_get("recorded_at")?,
        entry: serde_json::from_str(&entry_json)?,
        previous_hash: row.try_get("previous_hash")?,
        hash: row.try_get("hash")?,
    })
}

fn to_i64(value: usize) -> AuditResult<i64> {
    i64::try_from(value).map_err(|_| AuditError::InvalidInput(format!("value out of range: {value}")))
}

fn to_u64(value: i64) -> AuditResult<u64> {
    u64::try_from(value).map_err(|_| AuditError::Backend(format!("negative counter in database: {value}")))
}
