#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::cmp::Ordering;

use itertools::Itertools;

use crate::{
    constants::{FEEDBACK_TOP_N, HIGH_WATER_MARK},
    types::{
        Dimension, DimensionScore, Feedback, FeedbackItem, Finding, FindingKind, RenderError,
        Thresholds,
    },
};

/// Most render issues reported back to the learner.
const MAX_RENDER_ISSUES: usize = 5;

/// Praise for a dimension at or above the high-water mark.
fn praise_text(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Structure => "Your page structure closely matches the expected layout.",
        Dimension::Visual => "Your page looks nearly identical to the target design.",
        Dimension::Content => "Your text content matches the expected copy.",
        Dimension::Tag => "All of the required elements are in place.",
    }
}

/// Opening sentence of an improvement item.
fn improvement_text(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Structure => {
            "Some elements are missing or arranged differently than in the expected page."
        }
        Dimension::Visual => "Parts of the page look different from the target design.",
        Dimension::Content => "Some of the text does not match the expected content.",
        Dimension::Tag => "Some required elements are missing or do not match exactly.",
    }
}

/// The findings that cost a dimension the most, errors first.
fn top_findings(details: &[Finding]) -> Vec<String> {
    details
        .iter()
        .filter(|f| f.kind != FindingKind::Note)
        .filter(|f| f.passed != Some(true))
        .filter(|f| f.kind == FindingKind::Error || f.impact > 0.0)
        .sorted_by(|a, b| {
            let a_err = a.kind == FindingKind::Error;
            let b_err = b.kind == FindingKind::Error;
            b_err
                .cmp(&a_err)
                .then(b.impact.partial_cmp(&a.impact).unwrap_or(Ordering::Equal))
        })
        .take(FEEDBACK_TOP_N)
        .map(|f| match &f.path {
            Some(path) => format!("{} (at {path})", f.message),
            None => f.message.clone(),
        })
        .collect()
}

/// Builds an improvement item for one dimension.
fn improvement(score: &DimensionScore, description: String) -> FeedbackItem {
    FeedbackItem::Improvement {
        dimension: score.name,
        description,
        details: top_findings(&score.details),
        score: score.score,
        weight: score.weight,
        passed: score.passed,
    }
}

/// Turns dimension scores and render errors into feedback.
///
/// Active dimensions at or above [`HIGH_WATER_MARK`] earn praise; those below
/// their minimum get an improvement item quoting their most costly
/// findings. Render errors become render issues. Both lists are always
/// non-empty.
pub fn generate_feedback(
    scores: &[DimensionScore],
    render_errors: &[RenderError],
    thresholds: &Thresholds,
) -> Feedback {
    let active: Vec<&DimensionScore> = scores.iter().filter(|s| s.is_active()).collect();
    let mut encouragement = Vec::new();
    let mut improvements = Vec::new();

    for score in &active {
        if score.score >= HIGH_WATER_MARK {
            encouragement.push(FeedbackItem::Praise {
                dimension:   score.name,
                description: praise_text(score.name).to_string(),
                score:       score.score,
            });
        }
        if score.score < thresholds.minimum_for(score.name) {
            improvements.push(improvement(
                score,
                format!("{} Score: {:.0}/100.", improvement_text(score.name), score.score),
            ));
        }
    }

    for error in render_errors.iter().unique().take(MAX_RENDER_ISSUES) {
        improvements.push(FeedbackItem::RenderIssue {
            stage:       error.stage.clone(),
            description: format!("While rendering your page ({}): {}", error.stage, error.message),
        });
    }

    if improvements.is_empty() {
        let weakest = active
            .iter()
            .filter(|s| s.score < 100.0)
            .min_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal));
        improvements.push(match weakest {
            Some(score) => improvement(
                score,
                format!(
                    "{} Polishing this would raise your score further.",
                    improvement_text(score.name)
                ),
            ),
            None => FeedbackItem::General {
                description: "Everything matches. Try the next challenge, or experiment with \
                              your own variations of this one."
                    .to_string(),
            },
        });
    }

    if encouragement.is_empty() {
        let strongest = active
            .iter()
            .filter(|s| s.score > 0.0)
            .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal));
        encouragement.push(FeedbackItem::General {
            description: match strongest {
                Some(score) => format!(
                    "Your strongest area is {} at {:.0}/100. Build on it.",
                    score.name.label().to_lowercase(),
                    score.score
                ),
                None => "Every attempt is progress. Start by adding the main elements of the \
                         page, then style them."
                    .to_string(),
            },
        });
    }

    Feedback {
        encouragement,
        improvements,
    }
}
