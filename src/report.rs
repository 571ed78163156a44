#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use colored::Colorize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Panel, Style, Width, object::Rows},
};

use crate::types::{EvaluationResult, FeedbackItem};

#[derive(Tabled, Clone)]
/// One row of the score table
struct DimensionRow {
    #[tabled(rename = "Dimension")]
    /// * `dimension`: label of the dimension
    dimension: String,
    #[tabled(rename = "Score")]
    /// * `score`: score out of 100
    score:     String,
    #[tabled(rename = "Weight")]
    /// * `weight`: share of the final score
    weight:    String,
    #[tabled(rename = "Status")]
    /// * `status`: met its minimum, missed it, or not scored
    status:    String,
}

#[derive(Tabled, Clone)]
/// One row of the feedback table
struct FeedbackRow {
    #[tabled(rename = "Kind")]
    /// * `kind`: praise, improvement, render issue or general
    kind:    String,
    #[tabled(rename = "Feedback")]
    /// * `message`: the description followed by its details
    message: String,
}

/// Short name of a feedback variant.
fn kind_of(item: &FeedbackItem) -> &'static str {
    match item {
        FeedbackItem::Praise { .. } => "praise",
        FeedbackItem::Improvement { .. } => "improve",
        FeedbackItem::RenderIssue { .. } => "render",
        FeedbackItem::General { .. } => "general",
    }
}

/// Flattens a feedback item into a table row.
fn feedback_row(item: &FeedbackItem) -> FeedbackRow {
    let message = match item {
        FeedbackItem::Improvement {
            description,
            details,
            ..
        } if !details.is_empty() => format!(
            "{description}\n{}",
            details
                .iter()
                .map(|d| format!("- {d}"))
                .collect::<Vec<_>>()
                .join("\n")
        ),
        other => other.description().to_string(),
    };
    FeedbackRow {
        kind: kind_of(item).to_string(),
        message,
    }
}

/// Renders the score table for a result.
pub fn score_table(result: &EvaluationResult) -> String {
    let rows: Vec<DimensionRow> = result
        .dimension_scores
        .iter()
        .map(|d| DimensionRow {
            dimension: d.name.label().to_string(),
            score:     format!("{:.1}", d.score),
            weight:    if d.is_active() { format!("{:.1}", d.weight) } else { "-".to_string() },
            status:    if !d.is_active() {
                "not scored".to_string()
            } else if d.passed {
                "ok".to_string()
            } else {
                "below minimum".to_string()
            },
        })
        .collect();

    let verdict = if result.passed { "PASS".green().bold() } else { "FAIL".red().bold() };

    Table::new(&rows)
        .with(Panel::header("Evaluation Overview"))
        .with(Panel::footer(format!("Final: {:.0}/100  {verdict}", result.final_score)))
        .with(
            Modify::new(Rows::first())
                .with(Alignment::center())
                .with(Alignment::center_vertical()),
        )
        .with(
            Modify::new(Rows::last())
                .with(Alignment::center())
                .with(Alignment::center_vertical()),
        )
        .with(Style::modern())
        .to_string()
}

/// Renders encouragement and improvements as one table.
pub fn feedback_table(result: &EvaluationResult) -> String {
    let rows: Vec<FeedbackRow> = result
        .feedback
        .encouragement
        .iter()
        .chain(result.feedback.improvements.iter())
        .map(feedback_row)
        .collect();

    Table::new(&rows)
        .with(Panel::header("Feedback"))
        .with(Modify::new(Rows::new(1..)).with(Width::wrap(72).keep_words(true)))
        .with(
            Modify::new(Rows::first())
                .with(Alignment::center())
                .with(Alignment::center_vertical()),
        )
        .with(Style::modern())
        .to_string()
}

/// Score table, feedback table and any stored screenshot references.
pub fn render_summary(result: &EvaluationResult) -> String {
    let mut out = format!("{}\n{}", score_table(result), feedback_table(result));
    for (label, reference) in [
        ("candidate", &result.candidate_screenshot_ref),
        ("expected", &result.expected_screenshot_ref),
        ("diff", &result.diff_screenshot_ref),
    ] {
        if let Some(reference) = reference {
            out.push_str(&format!("\n{label} screenshot: {reference}"));
        }
    }
    out
}
