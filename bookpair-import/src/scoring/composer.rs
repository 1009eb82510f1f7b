//! Final score composition and status promotion rules
//!
//! **Final score:** `clamp01(w_sim * align_sim + w_qe * qe01 + w_rule * rule_quality)`
//! with default weights 0.45 / 0.35 / 0.20.
//!
//! **Status for a new row:**
//! - `good` when `final >= good_min` and `qe >= qe_good_min`
//! - `suspect` when `final >= suspect_min`
//! - `bad` otherwise
//!
//! The same thresholds drive the merge-time promotion in
//! [`crate::db::consolidate`].

use crate::config::ScoringConfig;
use crate::models::InboxStatus;

/// Map a QE score from any of the scales oracles are known to emit onto [0, 1].
///
/// - [0, 1] unchanged
/// - [-1, 0) via `(x + 1) / 2`
/// - (1, 2] via `x / 2`
/// - anything else clamped; missing or NaN → 0
pub fn normalize_qe(raw: Option<f64>) -> f64 {
    let Some(x) = raw.filter(|x| !x.is_nan()) else {
        return 0.0;
    };
    let mapped = if (0.0..=1.0).contains(&x) {
        x
    } else if (-1.0..0.0).contains(&x) {
        (x + 1.0) / 2.0
    } else if x > 1.0 && x <= 2.0 {
        x / 2.0
    } else {
        x
    };
    mapped.clamp(0.0, 1.0)
}

/// Combines alignment, QE and rule signals under one set of thresholds
#[derive(Debug, Clone)]
pub struct ScoreComposer {
    config: ScoringConfig,
}

impl ScoreComposer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn final_score(&self, align_sim: f64, qe_raw: Option<f64>, rule_quality: f64) -> f64 {
        let c = &self.config;
        let sim = if align_sim.is_nan() { 0.0 } else { align_sim.clamp(0.0, 1.0) };
        let score =
            c.weight_similarity * sim + c.weight_qe * normalize_qe(qe_raw) + c.weight_rule * rule_quality;
        score.clamp(0.0, 1.0)
    }

    /// Status assigned when a dedup key is first inserted
    pub fn classify(&self, final_score: Option<f64>, qe_score: Option<f64>) -> InboxStatus {
        let f = final_score.unwrap_or(0.0);
        let q = qe_score.unwrap_or(0.0);
        if f >= self.config.good_min && q >= self.config.qe_good_min {
            InboxStatus::Good
        } else if f >= self.config.suspect_min {
            InboxStatus::Suspect
        } else {
            InboxStatus::Bad
        }
    }

    /// Status after merging a new observation into an existing row.
    ///
    /// Never leaves `good`/`approved`; otherwise only moves upward.
    pub fn promote(
        &self,
        current: InboxStatus,
        final_score: Option<f64>,
        qe_score: Option<f64>,
    ) -> InboxStatus {
        if current.is_protected() {
            return current;
        }
        let f = final_score.unwrap_or(0.0);
        let q = qe_score.unwrap_or(0.0);
        if f >= self.config.good_min && q >= self.config.qe_good_min {
            return InboxStatus::Good;
        }
        match current {
            InboxStatus::Pending | InboxStatus::Rejected | InboxStatus::Suspect
                if f >= self.config.suspect_min =>
            {
                InboxStatus::Suspect
            }
            other => other,
        }
    }
}

impl Default for ScoreComposer {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_qe_scales() {
        assert_eq!(normalize_qe(None), 0.0);
        assert_eq!(normalize_qe(Some(f64::NAN)), 0.0);
        assert_eq!(normalize_qe(Some(0.42)), 0.42);
        assert_eq!(normalize_qe(Some(-1.0)), 0.0);
        assert_eq!(normalize_qe(Some(-0.5)), 0.25);
        assert_eq!(normalize_qe(Some(1.5)), 0.75);
        assert_eq!(normalize_qe(Some(2.0)), 1.0);
        assert_eq!(normalize_qe(Some(7.0)), 1.0);
        assert_eq!(normalize_qe(Some(-3.0)), 0.0);
    }

    #[test]
    fn test_final_score_weights() {
        let composer = ScoreComposer::default();
        let f = composer.final_score(1.0, Some(1.0), 1.0);
        assert!((f - 1.0).abs() < 1e-9);
        let f = composer.final_score(0.0, None, 0.5);
        assert!((f - 0.1).abs() < 1e-9);
        let f = composer.final_score(0.8, Some(0.6), 0.9);
        assert!((f - (0.36 + 0.21 + 0.18)).abs() < 1e-9);
    }

    #[test]
    fn test_classify_thresholds() {
        let composer = ScoreComposer::default();
        assert_eq!(composer.classify(Some(0.85), Some(0.80)), InboxStatus::Good);
        assert_eq!(composer.classify(Some(0.85), Some(0.50)), InboxStatus::Suspect);
        assert_eq!(composer.classify(Some(0.55), None), InboxStatus::Suspect);
        assert_eq!(composer.classify(Some(0.54), Some(0.99)), InboxStatus::Bad);
        assert_eq!(composer.classify(None, None), InboxStatus::Bad);
    }

    #[test]
    fn test_promote_never_downgrades() {
        let composer = ScoreComposer::default();
        assert_eq!(composer.promote(InboxStatus::Good, Some(0.1), Some(0.1)), InboxStatus::Good);
        assert_eq!(composer.promote(InboxStatus::Approved, Some(0.9), Some(0.9)), InboxStatus::Approved);
        assert_eq!(composer.promote(InboxStatus::Suspect, Some(0.1), None), InboxStatus::Suspect);
        assert_eq!(composer.promote(InboxStatus::Bad, Some(0.6), None), InboxStatus::Bad);
    }

    #[test]
    fn test_promote_upward() {
        let composer = ScoreComposer::default();
        assert_eq!(composer.promote(InboxStatus::Suspect, Some(0.9), Some(0.8)), InboxStatus::Good);
        assert_eq!(composer.promote(InboxStatus::Pending, Some(0.6), None), InboxStatus::Suspect);
        assert_eq!(composer.promote(InboxStatus::Rejected, Some(0.6), None), InboxStatus::Suspect);
        assert_eq!(composer.promote(InboxStatus::Pending, Some(0.2), None), InboxStatus::Pending);
    }
}
