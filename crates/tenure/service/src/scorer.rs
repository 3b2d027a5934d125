//! The scoring seam.
//!
//! Intent classification and static code evaluation live outside this crate.
//! The pipeline only needs a normalized score in `[0, 1]`, a breakdown and,
//! for code, an evaluation result.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tenure_types::{Scorecard, Submission};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("scorer failed: {0}")]
pub struct ScorerError(pub String);

/// Produces a scorecard for a submission. Never executes submitted code.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, submission: &Submission) -> Result<Scorecard, ScorerError>;
}

/// Replays queued scorecards in order, then a fixed default.
///
/// Used for offline replay and tests.
#[derive(Debug)]
pub struct ScriptedScorer {
    queue: Mutex<VecDeque<Scorecard>>,
    fallback: Scorecard,
    seen: Mutex<Vec<Submission>>,
}

impl ScriptedScorer {
    pub fn new(fallback: Scorecard) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, scorecard: Scorecard) -> Result<(), ScorerError> {
        self.queue
            .lock()
            .map_err(|_| ScorerError("scorer queue poisoned".to_string()))?
            .push_back(scorecard);
        Ok(())
    }

    /// Submissions scored so far, oldest first.
    pub fn submissions(&self) -> Vec<Submission> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

impl Default for ScriptedScorer {
    fn default() -> Self {
        Self::new(Scorecard::new("unknown", 0.0))
    }
}

#[async_trait]
impl Scorer for ScriptedScorer {
    async fn score(&self, submission: &Submission) -> Result<Scorecard, ScorerError> {
        self.seen
            .lock()
            .map_err(|_| ScorerError("scorer log poisoned".to_string()))?
            .push(submission.clone());
        let next = self
            .queue
            .lock()
            .map_err(|_| ScorerError("scorer queue poisoned".to_string()))?
            .pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_queue_then_fallback() {
        let scorer = ScriptedScorer::new(Scorecard::new("unknown", 0.1));
        scorer.push(Scorecard::new("explain", 0.9)).unwrap();

        let submission = Submission::text("why");
        assert_eq!(scorer.score(&submission).await.unwrap().total_score, 0.9);
        assert_eq!(scorer.score(&submission).await.unwrap().predicted_intent, "unknown");
        assert_eq!(scorer.score(&submission).await.unwrap().total_score, 0.1);
        assert_eq!(scorer.submissions().len(), 3);
        assert_eq!(scorer.submissions()[0].text, "why");
    }
}
