#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use serde::Serialize;

use crate::types::{DimensionScore, Thresholds, Weights, clamp_score};

/// Final score and verdict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    /// Weighted score, rounded, in `[0, 100]`.
    pub final_score: f64,
    /// Whether every minimum was met.
    pub passed:      bool,
}

/// Writes each dimension's weight and per-dimension pass state.
///
/// `weights` must already be normalized over the active dimensions. A
/// dimension with weight zero is excluded from scoring and always passes.
pub fn assign_weights(scores: &mut [DimensionScore], weights: &Weights, thresholds: &Thresholds) {
    for score in scores.iter_mut() {
        score.weight = weights.get(score.name);
        score.passed = !score.is_active() || score.score >= thresholds.minimum_for(score.name);
    }
}

/// Combines dimension scores into the final verdict.
///
/// `final = round(Σ score × weight / 100)`, clamped to `[0, 100]`. The
/// submission passes when the final score reaches the overall minimum and
/// every active dimension with its own configured minimum reaches it.
pub fn aggregate(scores: &[DimensionScore], thresholds: &Thresholds) -> Verdict {
    let weighted: f64 = scores
        .iter()
        .filter(|s| s.is_active())
        .map(|s| clamp_score(s.score) * s.weight / 100.0)
        .sum();
    let final_score = clamp_score(weighted.round());

    let dimensions_ok = scores.iter().filter(|s| s.is_active()).all(|s| {
        thresholds
            .per_dimension
            .get(&s.name)
            .is_none_or(|min| s.score >= *min)
    });

    Verdict {
        final_score,
        passed: final_score >= thresholds.overall_min() && dimensions_ok,
    }
}
