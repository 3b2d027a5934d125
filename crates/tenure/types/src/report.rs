//! Scorer input/output and the allowance report built from them.

use crate::tier::{CapabilityTier, UnlockMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One request to be scored: free text plus optional code.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_action: Option<String>,
}

impl Submission {
    /// A text-only submission.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Set the action the caller wants to perform.
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.requested_action = Some(action.into());
        self
    }

    /// Set the intent the caller expects the scorer to predict.
    pub fn with_expected_intent(mut self, intent: impl Into<String>) -> Self {
        self.expected_intent = Some(intent.into());
        self
    }

    /// Attach code for static evaluation.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach test text (presence only; never executed).
    pub fn with_tests(mut self, tests: impl Into<String>) -> Self {
        self.tests = Some(tests.into());
        self
    }
}

/// Structured result of the external static code evaluator.
///
/// The evaluator never executes the submitted code.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CodeEvaluation {
    pub ok: bool,
    pub score: f64,
    #[serde(default)]
    pub breakdown: BTreeMap<String, f64>,
    #[serde(default)]
    pub diagnostics: String,
    #[serde(default)]
    pub meta: Value,
}

/// What a scorer produces for a submission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scorecard {
    pub predicted_intent: String,
    /// Normalized score in `[0, 1]`.
    pub total_score: f64,
    #[serde(default)]
    pub breakdown: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_eval: Option<CodeEvaluation>,
}

impl Scorecard {
    /// A scorecard with only an intent and a total.
    pub fn new(predicted_intent: impl Into<String>, total_score: f64) -> Self {
        Self {
            predicted_intent: predicted_intent.into(),
            total_score,
            breakdown: BTreeMap::new(),
            code_eval: None,
        }
    }

    /// Attach a static evaluation result.
    pub fn with_code_eval(mut self, code_eval: CodeEvaluation) -> Self {
        self.code_eval = Some(code_eval);
        self
    }
}

/// The allowance decision for one submission.
///
/// Immutable once built. `allowed` is always `unlocks_before[required_unlock]`:
/// it reflects proficiency measured before this submission's score.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScoreReport {
    text: String,
    predicted_intent: String,
    expected_intent: Option<String>,
    requested_action: String,
    required_unlock: CapabilityTier,
    allowed: bool,
    total_score: f64,
    breakdown: BTreeMap<String, f64>,
    unlocks: UnlockMap,
    unlocks_before: UnlockMap,
    code_eval: Option<CodeEvaluation>,
}

impl ScoreReport {
    /// Build a report. `allowed` is derived from `unlocks_before`.
    pub fn new(
        submission: &Submission,
        scorecard: Scorecard,
        requested_action: String,
        required_unlock: CapabilityTier,
        unlocks_before: UnlockMap,
        unlocks: UnlockMap,
    ) -> Self {
        let allowed = unlocks_before
            .get(&required_unlock)
            .copied()
            .unwrap_or(false);
        let mut breakdown = scorecard.breakdown;
        breakdown.insert("total".to_string(), scorecard.total_score);
        if let Some(eval) = &scorecard.code_eval {
            breakdown.insert("code_score".to_string(), eval.score);
        }
        Self {
            text: submission.text.clone(),
            predicted_intent: scorecard.predicted_intent,
            expected_intent: submission.expected_intent.clone(),
            requested_action,
            required_unlock,
            allowed,
            total_score: scorecard.total_score,
            breakdown,
            unlocks,
            unlocks_before,
            code_eval: scorecard.code_eval,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn predicted_intent(&self) -> &str {
        &self.predicted_intent
    }

    pub fn expected_intent(&self) -> Option<&str> {
        self.expected_intent.as_deref()
    }

    pub fn requested_action(&self) -> &str {
        &self.requested_action
    }

    pub fn required_unlock(&self) -> CapabilityTier {
        self.required_unlock
    }

    pub fn allowed(&self) -> bool {
        self.allowed
    }

    pub fn total_score(&self) -> f64 {
        self.total_score
    }

    pub fn breakdown(&self) -> &BTreeMap<String, f64> {
        &self.breakdown
    }

    /// Unlock flags after folding this score in.
    pub fn unlocks(&self) -> &UnlockMap {
        &self.unlocks
    }

    /// Unlock flags before this submission.
    pub fn unlocks_before(&self) -> &UnlockMap {
        &self.unlocks_before
    }

    pub fn code_eval(&self) -> Option<&CodeEvaluation> {
        self.code_eval.as_ref()
    }
}
