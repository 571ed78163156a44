#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::collections::BTreeSet;

use itertools::Itertools;
use similar::{Algorithm, DiffOp, capture_diff_slices};

use super::dom::jaccard;
use crate::types::{Dimension, DimensionScore, Finding, FindingKind};

/// Share of the content score taken by required phrases, when a challenge
/// has any.
const PHRASE_SHARE: f64 = 50.0;

/// Lower-cases and splits text into words, dropping punctuation at word
/// edges.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|word| {
            word.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|word| !word.is_empty())
        .collect()
}

/// Length of the longest common subsequence of two token lists.
fn lcs_len(a: &[String], b: &[String]) -> usize {
    capture_diff_slices(Algorithm::Lcs, a, b)
        .iter()
        .map(|op| match op {
            DiffOp::Equal { len, .. } => *len,
            _ => 0,
        })
        .sum()
}

/// Whether `needle` occurs as a contiguous run in `haystack`.
fn contains_run(haystack: &[String], needle: &[String]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

/// Average of token-set overlap and order-aware LCS ratio, in `[0, 100]`.
pub fn text_overlap(candidate: &[String], expected: &[String]) -> f64 {
    if candidate.is_empty() && expected.is_empty() {
        return 100.0;
    }
    let set = jaccard(
        &candidate.iter().collect::<BTreeSet<_>>(),
        &expected.iter().collect::<BTreeSet<_>>(),
    );
    let ordered = 2.0 * lcs_len(expected, candidate) as f64 / (candidate.len() + expected.len()) as f64;
    100.0 * (set + ordered) / 2.0
}

/// Compares rendered text.
///
/// The base score is [`text_overlap`] of the normalized words. Each required
/// phrase the expected page contains becomes a pass/fail sub-check; together
/// they carry half of the score. A phrase the expected page lacks is only
/// noted, since the reference itself could not satisfy it. Expected lines absent from the candidate and candidate lines absent
/// from the expected text are listed as findings.
pub fn compare_content(
    candidate: &[String],
    expected: &[String],
    required_phrases: &[String],
) -> DimensionScore {
    let candidate_words = tokenize(&candidate.join(" "));
    let expected_words = tokenize(&expected.join(" "));
    let overlap = text_overlap(&candidate_words, &expected_words);

    let (phrases, unreachable): (Vec<(&str, Vec<String>)>, Vec<_>) = required_phrases
        .iter()
        .map(|p| (p.trim(), tokenize(p)))
        .filter(|(_, words)| !words.is_empty())
        .partition(|(_, words)| contains_run(&expected_words, words));
    let overlap_weight = if phrases.is_empty() { 100.0 } else { 100.0 - PHRASE_SHARE };

    let mut details = vec![
        Finding::builder()
            .kind(FindingKind::Check)
            .message("Overall text overlap with the expected page")
            .score(overlap)
            .weight(overlap_weight)
            .passed(overlap >= 99.5)
            .impact((100.0 - overlap) * overlap_weight / 100.0)
            .build(),
    ];

    let mut score = overlap * overlap_weight / 100.0;
    let mut found = 0;
    let weight = PHRASE_SHARE / phrases.len().max(1) as f64;
    for (raw, phrase) in &phrases {
        let present = contains_run(&candidate_words, phrase);
        let sub_score = if present { 100.0 } else { 0.0 };
        if present {
            found += 1;
        }
        score += sub_score * weight / 100.0;
        details.push(
            Finding::builder()
                .kind(FindingKind::Check)
                .message(if present {
                    format!("Required phrase \"{raw}\" is present")
                } else {
                    format!("Required phrase \"{raw}\" is missing")
                })
                .score(sub_score)
                .weight(weight)
                .passed(present)
                .impact(if present { 0.0 } else { weight })
                .build(),
        );
    }

    for (raw, _) in &unreachable {
        details.push(Finding::note(format!(
            "Required phrase \"{raw}\" is not in the expected page either, so it is not scored"
        )));
    }

    for line in expected.iter().filter(|line| !line.trim().is_empty()) {
        let words = tokenize(line);
        if !words.is_empty() && !contains_run(&candidate_words, &words) {
            details.push(
                Finding::builder()
                    .kind(FindingKind::Missing)
                    .message(format!("Expected text \"{}\" was not found", line.trim()))
                    .impact(words.len() as f64)
                    .build(),
            );
        }
    }
    for line in candidate.iter().filter(|line| !line.trim().is_empty()) {
        let words = tokenize(line);
        if !words.is_empty() && !contains_run(&expected_words, &words) {
            details.push(
                Finding::builder()
                    .kind(FindingKind::Extra)
                    .message(format!("Text \"{}\" is not in the expected page", line.trim()))
                    .impact(words.len() as f64 / 2.0)
                    .build(),
            );
        }
    }

    let matched = lcs_len(&expected_words, &candidate_words);
    let mut summary = format!(
        "Matched {matched} of {} expected words in order ({overlap:.0}% text overlap).",
        expected_words.len()
    );
    if !phrases.is_empty() {
        summary.push_str(&format!(" Found {found} of {} required phrases.", phrases.len()));
    }
    let unique_missing = expected_words
        .iter()
        .filter(|w| !candidate_words.contains(w))
        .unique()
        .take(5)
        .join(", ");
    if !unique_missing.is_empty() {
        summary.push_str(&format!(" Missing words include: {unique_missing}."));
    }

    DimensionScore::new(Dimension::Content, score, details).with_summary(summary)
}
