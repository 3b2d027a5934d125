//! The authorization pipeline: `submit` and `edit`.
//!
//! One `AuthorityService` per process. Progress lives behind a single async
//! mutex so an allowance check and the fold that follows it are never
//! interleaved with another request; the token authority guards its own
//! secret. Audit writes are attempted for every decision and never fail a
//! request: a broken store is logged and counted.

use crate::config::AuthorityConfig;
use crate::error::{AuthorityError, AuthorityResult};
use crate::scorer::Scorer;
use crate::workspace::Workspace;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tenure_audit::{AuditError, AuditStore, InMemoryAuditStore, PatchEvent, ScoringEvent, SqliteAuditStore};
use tenure_capability::Thresholds;
use tenure_diff::{DiffEngine, DiffStats};
use tenure_progress::{ProgressTracker, ProgressView};
use tenure_token::{MintedToken, SigningSecret, TokenBinding, TokenRejection, TokenTarget, WriteTokenAuthority};
use tenure_types::{sha256_hex, ScoreReport, Scorecard, Submission, UnlockMap};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Operation name bound into every write token.
pub const EDIT_OP: &str = "edit_apply_unified_diff";

/// Target file when an edit names none.
pub const DEFAULT_FILENAME: &str = "output_script.py";

/// Stand-in text for submissions that carry only code.
pub const NO_TEXT: &str = "(no-text)";

// ── Requests and responses ──────────────────────────────────────────

/// A scoring submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    #[serde(flatten)]
    pub submission: Submission,
    /// Fold the score into the progress window.
    #[serde(default = "default_true")]
    pub count_toward_progress: bool,
}

impl From<Submission> for SubmitRequest {
    fn from(submission: Submission) -> Self {
        Self {
            submission,
            count_toward_progress: true,
        }
    }
}

/// Generate a patch from `old_code` (or the file on disk) to `new_code`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub expected_intent: Option<String>,
    #[serde(default)]
    pub requested_action: Option<String>,
    #[serde(default)]
    pub old_code: Option<String>,
    #[serde(default)]
    pub new_code: String,
    #[serde(default)]
    pub tests: Option<String>,
}

/// Apply a previously generated patch under its write token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub expected_intent: Option<String>,
    #[serde(default)]
    pub requested_action: Option<String>,
    pub base_code: String,
    pub diff: String,
    #[serde(default)]
    pub write_token: Option<String>,
}

/// An edit request. A body carrying both `base_code` and `diff` is an apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EditRequest {
    Apply(ApplyRequest),
    Generate(GenerateRequest),
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedPatch {
    pub filename: String,
    pub base_code: String,
    pub diff: String,
    pub old_hash: String,
    pub new_hash: String,
    /// Absent when write tokens are not required.
    pub write_token: Option<MintedToken>,
    pub token_target: TokenTarget,
    pub stats: DiffStats,
    pub report: ScoreReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppliedPatch {
    pub filename: String,
    pub new_code: String,
    pub wrote_file: bool,
    pub stats: DiffStats,
    pub report: ScoreReport,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EditResponse {
    Generated(GeneratedPatch),
    Applied(AppliedPatch),
}

/// Read-only snapshot of the authority.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorityState {
    pub progress: ProgressView,
    pub thresholds: Thresholds,
    pub single_use_tokens: bool,
    /// Audit writes that failed since start.
    pub audit_failures: u64,
}

fn default_true() -> bool {
    true
}

// ── Service ─────────────────────────────────────────────────────────

pub struct AuthorityService {
    config: RwLock<Arc<AuthorityConfig>>,
    progress: Mutex<ProgressTracker>,
    tokens: WriteTokenAuthority,
    audit: Arc<dyn AuditStore>,
    scorer: Arc<dyn Scorer>,
    audit_failures: AtomicU64,
}

impl AuthorityService {
    pub fn new(
        config: AuthorityConfig,
        scorer: Arc<dyn Scorer>,
        audit: Arc<dyn AuditStore>,
        secret: SigningSecret,
    ) -> AuthorityResult<Self> {
        config.validate()?;
        let progress = ProgressTracker::new(config.window_size)
            .map_err(|e| AuthorityError::Internal(e.to_string()))?;
        let tokens = WriteTokenAuthority::new(secret).with_single_use(config.patch_editing.single_use_tokens);

        info!(
            window_size = config.window_size,
            single_use_tokens = config.patch_editing.single_use_tokens,
            workspace_root = %config.patch_editing.workspace_root.display(),
            "Authority service initialized"
        );

        Ok(Self {
            config: RwLock::new(Arc::new(config)),
            progress: Mutex::new(progress),
            tokens,
            audit,
            scorer,
            audit_failures: AtomicU64::new(0),
        })
    }

    /// Build from configuration: SQLite audit when a database URL is set,
    /// in-memory otherwise, and the signing secret from the environment.
    ///
    /// An unreachable audit database degrades to the in-memory store.
    pub async fn from_config(config: AuthorityConfig, scorer: Arc<dyn Scorer>) -> AuthorityResult<Self> {
        let audit: Arc<dyn AuditStore> = match config.audit.database_url.as_deref() {
            Some(url) => match SqliteAuditStore::connect(url).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    error!(
                        target: "tenure::audit",
                        database_url = url,
                        error = %e,
                        "Audit database unavailable; decisions will NOT be durably recorded"
                    );
                    Arc::new(InMemoryAuditStore::new())
                }
            },
            None => Arc::new(InMemoryAuditStore::new()),
        };
        Self::new(config, scorer, audit, SigningSecret::from_env_or_generate())
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> AuthorityResult<Arc<AuthorityConfig>> {
        self.config
            .read()
            .map(|c| Arc::clone(&*c))
            .map_err(|_| AuthorityError::Internal("configuration lock poisoned".to_string()))
    }

    pub fn audit(&self) -> &Arc<dyn AuditStore> {
        &self.audit
    }

    /// Validate and swap configuration. Requests already running keep the
    /// snapshot they started with.
    pub async fn reload_config(&self, config: AuthorityConfig) -> AuthorityResult<()> {
        config.validate()?;
        let mut progress = self.progress.lock().await;
        progress
            .set_window_size(config.window_size)
            .map_err(|e| AuthorityError::Internal(e.to_string()))?;
        self.tokens.set_single_use(config.patch_editing.single_use_tokens);

        let mut slot = self
            .config
            .write()
            .map_err(|_| AuthorityError::Internal("configuration lock poisoned".to_string()))?;
        *slot = Arc::new(config);
        info!(window_size = progress.window_size(), "Configuration reloaded");
        Ok(())
    }

    pub async fn state(&self) -> AuthorityResult<AuthorityState> {
        let config = self.config()?;
        let progress = self.progress.lock().await;
        Ok(AuthorityState {
            progress: progress.view(&config.capabilities.thresholds),
            thresholds: config.capabilities.thresholds.clone(),
            single_use_tokens: self.tokens.single_use(),
            audit_failures: self.audit_failures.load(Ordering::Relaxed),
        })
    }

    // ── submit ──────────────────────────────────────────────────────

    /// Score a submission, decide its allowance from prior history, then
    /// fold the score in.
    ///
    /// The score is folded even when the action is refused.
    pub async fn submit(&self, request: SubmitRequest) -> AuthorityResult<ScoreReport> {
        let config = self.config()?;
        let SubmitRequest {
            mut submission,
            count_toward_progress,
        } = request;

        let has_code = submission.code.as_deref().is_some_and(|c| !c.trim().is_empty());
        if submission.text.trim().is_empty() {
            if !has_code {
                return Err(AuthorityError::Validation("Provide text and/or code.".to_string()));
            }
            submission.text = NO_TEXT.to_string();
        }

        let scorecard = self.score(&submission).await?;
        let resolution = config
            .capabilities
            .resolve(&scorecard.predicted_intent, submission.requested_action.as_deref());
        let thresholds = &config.capabilities.thresholds;

        let mut progress = self.progress.lock().await;
        progress
            .set_window_size(config.window_size)
            .map_err(|e| AuthorityError::Internal(e.to_string()))?;
        let unlocks_before = progress.unlocked(thresholds);
        let unlocks = if count_toward_progress {
            progress
                .fold_in(scorecard.total_score, thresholds)
                .map_err(|e| AuthorityError::ScoringFailed(e.to_string()))?
        } else {
            unlocks_before.clone()
        };

        let report = ScoreReport::new(
            &submission,
            scorecard,
            resolution.action,
            resolution.required_unlock,
            unlocks_before,
            unlocks,
        );

        self.record_scoring(&report, count_toward_progress).await;
        drop(progress);

        info!(
            action = report.requested_action(),
            required_unlock = %report.required_unlock(),
            allowed = report.allowed(),
            score = report.total_score(),
            counted = count_toward_progress,
            "Submission scored"
        );

        if !report.allowed() {
            return Err(locked(report));
        }
        Ok(report)
    }

    // ── edit ────────────────────────────────────────────────────────

    pub async fn edit(&self, request: EditRequest) -> AuthorityResult<EditResponse> {
        match request {
            EditRequest::Generate(req) => self.generate(req).await.map(EditResponse::Generated),
            EditRequest::Apply(req) => self.apply(req).await.map(EditResponse::Applied),
        }
    }

    /// Diff `old_code` (or the current file) against `new_code` and mint a
    /// token bound to exactly that base and diff. The scorer sees the
    /// current code, not the proposal.
    pub async fn generate(&self, req: GenerateRequest) -> AuthorityResult<GeneratedPatch> {
        let config = self.config()?;
        let policy = &config.patch_editing;
        let workspace = Workspace::new(&policy.workspace_root);
        let filename = filename_or_default(req.filename.as_deref());
        workspace.resolve(&filename).await?;

        let old_code = match req.old_code {
            Some(code) if !code.is_empty() => code,
            _ => workspace.read_or_empty(&filename).await?,
        };
        let new_code = req.new_code;

        if new_code.chars().count() > policy.max_new_code_chars {
            return Err(AuthorityError::Validation(format!(
                "new_code too large (>{} chars).",
                policy.max_new_code_chars
            )));
        }
        if old_code.is_empty() && new_code.is_empty() {
            return Err(AuthorityError::Validation("Provide old_code and new_code.".to_string()));
        }

        let submission = Submission {
            text: text_or_placeholder(req.text),
            expected_intent: non_empty(req.expected_intent),
            code: Some(old_code.clone()),
            tests: req.tests,
            requested_action: non_empty(req.requested_action),
        };
        let report = self.evaluate(&config, &submission).await?;
        let old_hash = sha256_hex(&old_code);

        if !report.allowed() {
            self.record_patch(
                &report,
                false,
                &old_hash,
                &old_hash,
                "",
                json!({"stage": "generate", "reason": "capability_locked", "filename": filename}),
            )
            .await;
            return Err(locked(report));
        }

        if policy.require_code_eval_pass {
            let verdict = report.code_eval().map(|e| (e.ok, e.diagnostics.clone()));
            if !matches!(verdict, Some((true, _))) {
                let diagnostics = verdict
                    .map(|(_, d)| d)
                    .unwrap_or_else(|| "no code evaluation was produced".to_string());
                self.record_patch(
                    &report,
                    true,
                    &old_hash,
                    &old_hash,
                    "",
                    json!({"stage": "generate", "reason": "code_eval_not_ok", "filename": filename}),
                )
                .await;
                warn!(filename = %filename, "Patch generation blocked by static evaluation");
                return Err(AuthorityError::StaticEvaluationFailed { diagnostics });
            }
        }

        let diff = DiffEngine::new().generate(&old_code, &new_code);
        let new_hash = sha256_hex(&new_code);
        let stats = DiffStats::from_diff(&diff);
        self.enforce_ceiling(&config, &report, &stats, &old_hash, &new_hash, &diff, "generate", &filename)
            .await?;

        let binding = TokenBinding {
            op: EDIT_OP,
            required_unlock: report.required_unlock(),
            filename: &filename,
            base_text: &old_code,
            diff_text: &diff,
        };
        let token_target = binding.target();
        let write_token = if policy.require_write_token {
            let minted = self
                .tokens
                .mint(&binding, policy.write_token_ttl_seconds)
                .map_err(|e| AuthorityError::Internal(e.to_string()))?;
            Some(minted)
        } else {
            None
        };

        self.record_patch(
            &report,
            true,
            &old_hash,
            &new_hash,
            &diff,
            json!({
                "stage": "generate",
                "filename": filename,
                "stats": stats,
                "token_issued": write_token.is_some(),
            }),
        )
        .await;

        info!(
            filename = %filename,
            required_unlock = %report.required_unlock(),
            total_changes = stats.total_changes,
            token_issued = write_token.is_some(),
            "Patch generated"
        );

        Ok(GeneratedPatch {
            filename,
            base_code: old_code,
            diff,
            old_hash,
            new_hash,
            write_token,
            token_target,
            stats,
            report,
        })
    }

    /// Verify the token, apply the diff in memory, record, then write.
    pub async fn apply(&self, req: ApplyRequest) -> AuthorityResult<AppliedPatch> {
        let config = self.config()?;
        let policy = &config.patch_editing;
        let workspace = Workspace::new(&policy.workspace_root);
        let filename = filename_or_default(req.filename.as_deref());
        workspace.resolve(&filename).await?;

        let submission = Submission {
            text: text_or_placeholder(req.text),
            expected_intent: non_empty(req.expected_intent),
            code: None,
            tests: None,
            requested_action: non_empty(req.requested_action),
        };
        let report = self.evaluate(&config, &submission).await?;
        let base_hash = sha256_hex(&req.base_code);

        if !report.allowed() {
            self.record_patch(
                &report,
                false,
                &base_hash,
                &base_hash,
                &req.diff,
                json!({"stage": "apply", "reason": "capability_locked", "filename": filename}),
            )
            .await;
            return Err(locked(report));
        }

        let stats = DiffStats::from_diff(&req.diff);
        self.enforce_ceiling(&config, &report, &stats, &base_hash, &base_hash, &req.diff, "apply", &filename)
            .await?;

        let binding = TokenBinding {
            op: EDIT_OP,
            required_unlock: report.required_unlock(),
            filename: &filename,
            base_text: &req.base_code,
            diff_text: &req.diff,
        };
        if policy.require_write_token {
            let token = req.write_token.as_deref().unwrap_or_default();
            let verdict = if token.is_empty() {
                Err(TokenRejection::Malformed)
            } else {
                match self.tokens.verify(token, &binding) {
                    Ok(_) => Ok(()),
                    Err(e) => match e.rejection() {
                        Some(reason) => Err(reason),
                        None => return Err(AuthorityError::Internal(e.to_string())),
                    },
                }
            };
            if let Err(reason) = verdict {
                self.record_patch(
                    &report,
                    false,
                    &base_hash,
                    &base_hash,
                    &req.diff,
                    json!({"stage": "apply", "reason": "token_invalid", "token_reason": reason, "filename": filename}),
                )
                .await;
                warn!(filename = %filename, reason = %reason, "Write token rejected");
                return Err(AuthorityError::TokenInvalid {
                    reason,
                    target: binding.target(),
                });
            }
        }

        let new_code = match tenure_diff::apply(&req.base_code, &req.diff) {
            Ok(text) => text,
            Err(e) => {
                self.record_patch(
                    &report,
                    true,
                    &base_hash,
                    &base_hash,
                    &req.diff,
                    json!({"stage": "apply", "reason": "diff_apply_error", "error": e, "filename": filename}),
                )
                .await;
                warn!(filename = %filename, kind = %e.kind, line = e.diff_line, "Patch did not apply");
                return Err(AuthorityError::DiffApply(e));
            }
        };

        let new_hash = sha256_hex(&new_code);
        self.record_patch(
            &report,
            true,
            &base_hash,
            &new_hash,
            &req.diff,
            json!({"stage": "apply", "filename": filename, "stats": stats}),
        )
        .await;

        let wrote_file = if policy.write_to_file {
            workspace.write_atomic(&filename, &new_code).await?;
            true
        } else {
            false
        };

        info!(filename = %filename, wrote_file, total_changes = stats.total_changes, "Patch applied");

        Ok(AppliedPatch {
            filename,
            new_code,
            wrote_file,
            stats,
            report,
        })
    }

    // ── internals ───────────────────────────────────────────────────

    async fn score(&self, submission: &Submission) -> AuthorityResult<Scorecard> {
        let scorecard = self
            .scorer
            .score(submission)
            .await
            .map_err(|e| AuthorityError::ScoringFailed(e.to_string()))?;
        let score = scorecard.total_score;
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(AuthorityError::ScoringFailed(format!("score out of range: {score}")));
        }
        Ok(scorecard)
    }

    /// Score without folding; edits never move proficiency.
    async fn evaluate(&self, config: &AuthorityConfig, submission: &Submission) -> AuthorityResult<ScoreReport> {
        let scorecard = self.score(submission).await?;
        let resolution = config
            .capabilities
            .resolve(&scorecard.predicted_intent, submission.requested_action.as_deref());
        let unlocks: UnlockMap = {
            let progress = self.progress.lock().await;
            progress.unlocked(&config.capabilities.thresholds)
        };
        debug!(
            action = %resolution.action,
            required_unlock = %resolution.required_unlock,
            forced = resolution.forced,
            "Edit request resolved"
        );
        Ok(ScoreReport::new(
            submission,
            scorecard,
            resolution.action,
            resolution.required_unlock,
            unlocks.clone(),
            unlocks,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    async fn enforce_ceiling(
        &self,
        config: &AuthorityConfig,
        report: &ScoreReport,
        stats: &DiffStats,
        old_hash: &str,
        new_hash: &str,
        diff: &str,
        stage: &str,
        filename: &str,
    ) -> AuthorityResult<()> {
        let tier = report.required_unlock();
        let Some(max_changes) = config.patch_editing.ceiling(tier) else {
            return Ok(());
        };
        if stats.total_changes <= max_changes {
            return Ok(());
        }
        self.record_patch(
            report,
            false,
            old_hash,
            new_hash,
            diff,
            json!({
                "stage": stage,
                "reason": "patch_too_large",
                "filename": filename,
                "stats": stats,
                "max_changes": max_changes,
            }),
        )
        .await;
        warn!(filename, %tier, total_changes = stats.total_changes, max_changes, "Patch exceeds tier ceiling");
        Err(AuthorityError::PatchTooLarge {
            required_unlock: tier,
            stats: *stats,
            max_changes,
        })
    }

    async fn record_scoring(&self, report: &ScoreReport, counted: bool) {
        let event = ScoringEvent {
            text: report.text().to_string(),
            predicted_intent: report.predicted_intent().to_string(),
            expected_intent: report.expected_intent().map(str::to_string),
            score: report.total_score(),
            breakdown: report.breakdown().clone(),
            unlocks: report.unlocks().clone(),
            requested_action: report.requested_action().to_string(),
            required_unlock: report.required_unlock(),
            allowed: report.allowed(),
            counted,
        };
        if let Err(e) = self.audit.log_scoring_event(event).await {
            self.audit_failed(&e);
        }
    }

    async fn record_patch(
        &self,
        report: &ScoreReport,
        allowed: bool,
        old_hash: &str,
        new_hash: &str,
        diff: &str,
        meta: serde_json::Value,
    ) {
        let event = PatchEvent {
            requested_action: report.requested_action().to_string(),
            required_unlock: report.required_unlock(),
            allowed,
            old_hash: old_hash.to_string(),
            new_hash: new_hash.to_string(),
            diff: diff.to_string(),
            meta,
        };
        if let Err(e) = self.audit.log_patch_event(event).await {
            self.audit_failed(&e);
        }
    }

    fn audit_failed(&self, err: &AuditError) {
        let failures = self.audit_failures.fetch_add(1, Ordering::Relaxed) + 1;
        error!(
            target: "tenure::audit",
            error = %err,
            failures,
            "Audit write failed; continuing without a durable record"
        );
    }
}

fn locked(report: ScoreReport) -> AuthorityError {
    AuthorityError::CapabilityLocked {
        action: report.requested_action().to_string(),
        required_unlock: report.required_unlock(),
        report: Box::new(report),
    }
}

fn filename_or_default(filename: Option<&str>) -> String {
    filename
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .unwrap_or(DEFAULT_FILENAME)
        .to_string()
}

fn text_or_placeholder(text: String) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        NO_TEXT.to_string()
    } else {
        trimmed.to_string()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenure_types::CapabilityTier;

    #[test]
    fn edit_request_shape_picks_mode() {
        let apply: EditRequest = serde_json::from_value(json!({
            "filename": "a.py",
            "base_code": "x\n",
            "diff": "",
            "write_token": "t"
        }))
        .unwrap();
        assert!(matches!(apply, EditRequest::Apply(_)));

        let generate: EditRequest = serde_json::from_value(json!({
            "text": "fix it",
            "new_code": "y\n"
        }))
        .unwrap();
        assert!(matches!(generate, EditRequest::Generate(ref g) if g.old_code.is_none()));
    }

    #[test]
    fn submit_request_defaults_to_counted() {
        let req: SubmitRequest = serde_json::from_value(json!({"text": "why?"})).unwrap();
        assert!(req.count_toward_progress);
        assert_eq!(req.submission.text, "why?");
    }

    #[test]
    fn defaults_fill_blank_fields() {
        assert_eq!(filename_or_default(None), DEFAULT_FILENAME);
        assert_eq!(filename_or_default(Some("  ")), DEFAULT_FILENAME);
        assert_eq!(filename_or_default(Some("m.py")), "m.py");
        assert_eq!(text_or_placeholder("  ".into()), NO_TEXT);
        assert_eq!(non_empty(Some(" ".into())), None);
    }

    #[test]
    fn tier_is_echoed_in_locked_error() {
        let report = ScoreReport::new(
            &Submission::text("refactor"),
            Scorecard::new("refactor", 0.9),
            "refactor".into(),
            CapabilityTier::RefactorLint,
            CapabilityTier::all_locked(),
            CapabilityTier::all_locked(),
        );
        let err = locked(report);
        assert_eq!(err.code(), "capability_locked");
        assert!(err.report().is_some_and(|r| !r.allowed()));
    }
}
