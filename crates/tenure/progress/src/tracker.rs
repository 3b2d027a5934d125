use crate::level::AuthorityStanding;
use serde::Serialize;
use std::collections::VecDeque;
use tenure_capability::Thresholds;
use tenure_types::{CapabilityTier, UnlockMap};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_WINDOW_SIZE: usize = 50;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProgressError {
    #[error("score must be a finite value in [0, 1], got {0}")]
    InvalidScore(f64),

    #[error("window size must be at least 1")]
    InvalidWindowSize,
}

/// Moving-window proficiency state.
///
/// Never rolled back: the only mutation is [`fold_in`](Self::fold_in), plus
/// eviction when the window shrinks.
#[derive(Clone, Debug)]
pub struct ProgressTracker {
    window: VecDeque<f64>,
    window_size: usize,
    proficiency: f64,
}

/// Read-only view of the tracker against a given set of thresholds.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProgressView {
    pub window_size: usize,
    pub sample_count: usize,
    /// Mean of the window, as a fraction.
    pub proficiency: f64,
    /// Mean of the window, as a percentage rounded to two decimals.
    pub proficiency_percent: f64,
    pub unlocked: UnlockMap,
    pub authority: AuthorityStanding,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self {
            window: VecDeque::with_capacity(DEFAULT_WINDOW_SIZE),
            window_size: DEFAULT_WINDOW_SIZE,
            proficiency: 0.0,
        }
    }
}

impl ProgressTracker {
    pub fn new(window_size: usize) -> Result<Self, ProgressError> {
        if window_size == 0 {
            return Err(ProgressError::InvalidWindowSize);
        }
        Ok(Self {
            window: VecDeque::with_capacity(window_size),
            window_size,
            proficiency: 0.0,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn sample_count(&self) -> usize {
        self.window.len()
    }

    /// Mean of the current window; 0 when empty.
    pub fn proficiency(&self) -> f64 {
        self.proficiency
    }

    pub fn recent_scores(&self) -> impl Iterator<Item = f64> + '_ {
        self.window.iter().copied()
    }

    /// Whether `tier` is unlocked by history so far.
    pub fn evaluate_allowance(&self, tier: CapabilityTier, thresholds: &Thresholds) -> bool {
        thresholds.is_met(tier, self.proficiency)
    }

    /// Unlock flags for the current history.
    pub fn unlocked(&self, thresholds: &Thresholds) -> UnlockMap {
        unlocks_at(self.proficiency, thresholds)
    }

    /// Unlock flags as they would be after folding `score`, without
    /// mutating anything.
    pub fn preview(&self, score: f64, thresholds: &Thresholds) -> Result<UnlockMap, ProgressError> {
        check_score(score)?;
        let skip = (self.window.len() + 1).saturating_sub(self.window_size);
        let kept = self.window.iter().skip(skip).copied();
        let proficiency = mean(kept.chain(std::iter::once(score)));
        Ok(unlocks_at(proficiency, thresholds))
    }

    /// Append `score`, evicting the oldest entries beyond the window, and
    /// recompute proficiency from scratch.
    pub fn fold_in(&mut self, score: f64, thresholds: &Thresholds) -> Result<UnlockMap, ProgressError> {
        check_score(score)?;
        self.window.push_back(score);
        self.evict();
        self.recompute();
        debug!(
            score,
            proficiency = self.proficiency,
            samples = self.window.len(),
            "Folded score into progress window"
        );
        Ok(self.unlocked(thresholds))
    }

    /// Change the window size, evicting the oldest scores if it shrinks.
    pub fn set_window_size(&mut self, window_size: usize) -> Result<(), ProgressError> {
        if window_size == 0 {
            return Err(ProgressError::InvalidWindowSize);
        }
        if window_size != self.window_size {
            self.window_size = window_size;
            self.evict();
            self.recompute();
        }
        Ok(())
    }

    pub fn view(&self, thresholds: &Thresholds) -> ProgressView {
        ProgressView {
            window_size: self.window_size,
            sample_count: self.window.len(),
            proficiency: self.proficiency,
            proficiency_percent: (self.proficiency * 100.0 * 100.0).round() / 100.0,
            unlocked: self.unlocked(thresholds),
            authority: AuthorityStanding::derive(self.proficiency, thresholds),
        }
    }

    fn evict(&mut self) {
        while self.window.len() > self.window_size {
            self.window.pop_front();
        }
    }

    fn recompute(&mut self) {
        self.proficiency = mean(self.window.iter().copied());
    }
}

fn check_score(score: f64) -> Result<(), ProgressError> {
    if score.is_finite() && (0.0..=1.0).contains(&score) {
        Ok(())
    } else {
        Err(ProgressError::InvalidScore(score))
    }
}

fn mean(scores: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = scores.fold((0.0, 0usize), |(sum, count), s| (sum + s, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn unlocks_at(proficiency: f64, thresholds: &Thresholds) -> UnlockMap {
    CapabilityTier::ALL
        .iter()
        .map(|tier| (*tier, thresholds.is_met(*tier, proficiency)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn assist_only(threshold: f64) -> Thresholds {
        Thresholds::new(BTreeMap::from([(CapabilityTier::AssistMode, threshold)]))
    }

    #[test]
    fn window_of_two_unlocks_assist() {
        let thresholds = assist_only(0.5);
        let mut tracker = ProgressTracker::new(2).unwrap();

        // First submission sees empty history.
        assert!(!tracker.evaluate_allowance(CapabilityTier::AssistMode, &thresholds));
        tracker.fold_in(0.9, &thresholds).unwrap();
        tracker.fold_in(0.9, &thresholds).unwrap();

        assert!((tracker.proficiency() - 0.9).abs() < 1e-12);
        assert!(tracker.unlocked(&thresholds)[&CapabilityTier::AssistMode]);
        assert!(tracker.evaluate_allowance(CapabilityTier::AssistMode, &thresholds));
    }

    #[test]
    fn single_submission_cannot_unlock_itself() {
        let thresholds = Thresholds::default();
        let tracker = ProgressTracker::new(1).unwrap();

        let after = tracker.preview(1.0, &thresholds).unwrap();
        assert!(after[&CapabilityTier::AutonomousEditing]);
        assert!(!tracker.evaluate_allowance(CapabilityTier::AutonomousEditing, &thresholds));
    }

    #[test]
    fn oldest_scores_are_evicted() {
        let thresholds = Thresholds::default();
        let mut tracker = ProgressTracker::new(3).unwrap();
        for score in [0.0, 0.0, 1.0, 1.0, 1.0] {
            tracker.fold_in(score, &thresholds).unwrap();
        }
        assert_eq!(tracker.sample_count(), 3);
        assert_eq!(tracker.proficiency(), 1.0);
    }

    #[test]
    fn preview_respects_eviction() {
        let thresholds = assist_only(0.5);
        let mut tracker = ProgressTracker::new(2).unwrap();
        tracker.fold_in(0.0, &thresholds).unwrap();
        tracker.fold_in(0.0, &thresholds).unwrap();
        // Window [0.0, 0.0] + 1.0 keeps [0.0, 1.0] -> 0.5.
        assert!(tracker.preview(1.0, &thresholds).unwrap()[&CapabilityTier::AssistMode]);
    }

    #[test]
    fn thresholds_are_not_cached() {
        let mut tracker = ProgressTracker::new(5).unwrap();
        tracker.fold_in(0.6, &Thresholds::default()).unwrap();
        assert!(tracker.evaluate_allowance(CapabilityTier::AssistMode, &Thresholds::default()));
        assert!(!tracker.evaluate_allowance(CapabilityTier::AssistMode, &assist_only(0.65)));
    }

    #[test]
    fn shrinking_window_evicts() {
        let thresholds = Thresholds::default();
        let mut tracker = ProgressTracker::new(4).unwrap();
        for score in [0.2, 0.4, 0.6, 0.8] {
            tracker.fold_in(score, &thresholds).unwrap();
        }
        tracker.set_window_size(2).unwrap();
        assert_eq!(tracker.recent_scores().collect::<Vec<_>>(), vec![0.6, 0.8]);
        assert!((tracker.proficiency() - 0.7).abs() < 1e-12);
    }

    #[test]
    fn rejects_invalid_scores() {
        let mut tracker = ProgressTracker::default();
        let thresholds = Thresholds::default();
        assert!(tracker.fold_in(1.5, &thresholds).is_err());
        assert!(tracker.fold_in(f64::NAN, &thresholds).is_err());
        assert_eq!(tracker.sample_count(), 0);
        assert_eq!(ProgressTracker::new(0).unwrap_err(), ProgressError::InvalidWindowSize);
    }

    #[test]
    fn view_rounds_percentage() {
        let thresholds = Thresholds::default();
        let mut tracker = ProgressTracker::new(3).unwrap();
        tracker.fold_in(1.0, &thresholds).unwrap();
        tracker.fold_in(0.0, &thresholds).unwrap();
        tracker.fold_in(0.0, &thresholds).unwrap();
        let view = tracker.view(&thresholds);
        assert_eq!(view.proficiency_percent, 33.33);
        assert_eq!(view.sample_count, 3);
    }

    proptest! {
        #[test]
        fn proficiency_is_mean_of_last_window(
            scores in prop::collection::vec(0.0f64..=1.0, 0..40),
            window in 1usize..10,
        ) {
            let thresholds = Thresholds::default();
            let mut tracker = ProgressTracker::new(window).unwrap();
            for s in &scores {
                tracker.fold_in(*s, &thresholds).unwrap();
            }
            let tail = &scores[scores.len().saturating_sub(window)..];
            let expected = if tail.is_empty() { 0.0 } else { tail.iter().sum::<f64>() / tail.len() as f64 };
            prop_assert!((tracker.proficiency() - expected).abs() < 1e-9);
        }
    }
}
