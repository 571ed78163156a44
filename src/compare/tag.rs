#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use super::dom::{AlignMode, compare_subtrees};
use crate::{
    render::SerializedNode,
    types::{Dimension, DimensionScore, Finding, FindingKind},
};

/// Validates challenge-specific tags strictly.
///
/// For each rule the elements with that tag are paired in document order and
/// compared tag-for-tag. A rule scores the sum of its pair scores divided by
/// the larger of the two element counts, so missing and surplus elements
/// both cost points. The dimension score is the mean over rules.
pub fn compare_tags(
    candidate: &SerializedNode,
    expected: &SerializedNode,
    rules: &[String],
) -> DimensionScore {
    let rules: Vec<String> = rules
        .iter()
        .map(|r| r.trim().to_ascii_lowercase())
        .filter(|r| !r.is_empty())
        .collect();

    if rules.is_empty() {
        return DimensionScore::new(
            Dimension::Tag,
            100.0,
            vec![Finding::note("This challenge has no tag rules")],
        );
    }

    let weight = 100.0 / rules.len() as f64;
    let mut total = 0.0;
    let mut details = Vec::new();

    for rule in &rules {
        let wanted = expected.find_all(rule);
        let found = candidate.find_all(rule);
        let slots = wanted.len().max(found.len());

        let mut rule_findings = Vec::new();
        let rule_score = if slots == 0 {
            100.0
        } else {
            let mut sum = 0.0;
            for (idx, (e, c)) in wanted.iter().zip(found.iter()).enumerate() {
                let (score, findings) =
                    compare_subtrees(c, e, AlignMode::Strict, &format!("{rule}[{}]", idx + 1));
                sum += score;
                rule_findings.extend(findings);
            }
            sum / slots as f64
        };

        if found.len() < wanted.len() {
            rule_findings.push(
                Finding::builder()
                    .kind(FindingKind::Missing)
                    .message(format!(
                        "Expected {} <{rule}> element(s) but found {}",
                        wanted.len(),
                        found.len()
                    ))
                    .path(rule.clone())
                    .impact((wanted.len() - found.len()) as f64 * weight)
                    .build(),
            );
        } else if found.len() > wanted.len() {
            rule_findings.push(
                Finding::builder()
                    .kind(FindingKind::Extra)
                    .message(format!(
                        "Found {} <{rule}> element(s) where {} were expected",
                        found.len(),
                        wanted.len()
                    ))
                    .path(rule.clone())
                    .impact((found.len() - wanted.len()) as f64 * weight)
                    .build(),
            );
        }

        total += rule_score;
        details.push(
            Finding::builder()
                .kind(FindingKind::Check)
                .message(format!("<{rule}> elements match the expected page"))
                .path(rule.clone())
                .score(rule_score)
                .weight(weight)
                .passed(rule_score >= 100.0 - 1e-9)
                .impact((100.0 - rule_score) * weight / 100.0)
                .build(),
        );
        details.extend(rule_findings);
    }

    DimensionScore::new(Dimension::Tag, total / rules.len() as f64, details)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_elements_cost_their_share() {
        let expected = SerializedNode::new("body")
            .with_child(SerializedNode::new("li").with_text("a"))
            .with_child(SerializedNode::new("li").with_text("b"));
        let candidate =
            SerializedNode::new("body").with_child(SerializedNode::new("li").with_text("a"));
        let score = compare_tags(&candidate, &expected, &["li".to_string()]);
        assert!((score.score - 50.0).abs() < 1e-9);
    }

    #[test]
    fn no_rules_is_a_note() {
        let body = SerializedNode::new("body");
        let score = compare_tags(&body, &body, &[]);
        assert_eq!(score.details[0].kind, FindingKind::Note);
    }
}
