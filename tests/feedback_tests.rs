use webgrade::{
    Dimension, DimensionScore, FeedbackItem, Thresholds, Weights,
    aggregate::assign_weights,
    feedback::generate_feedback,
    types::{Finding, FindingKind, RenderError},
};

fn weighted(values: [f64; 3], thresholds: &Thresholds) -> Vec<DimensionScore> {
    let active = [Dimension::Structure, Dimension::Visual, Dimension::Content];
    let mut scores: Vec<DimensionScore> = active
        .iter()
        .zip(values)
        .map(|(d, v)| DimensionScore::new(*d, v, Vec::new()))
        .collect();
    scores.push(DimensionScore::new(Dimension::Tag, 100.0, Vec::new()));
    assign_weights(&mut scores, &Weights::default().normalized(&active), thresholds);
    scores
}

#[test]
fn both_lists_are_never_empty() {
    let thresholds = Thresholds::default();
    for values in [[0.0; 3], [100.0; 3], [75.0, 75.0, 75.0], [95.0, 10.0, 60.0]] {
        let feedback = generate_feedback(&weighted(values, &thresholds), &[], &thresholds);
        assert!(!feedback.encouragement.is_empty(), "{values:?}");
        assert!(!feedback.improvements.is_empty(), "{values:?}");
    }
}

#[test]
fn high_scores_earn_praise_and_low_scores_improvements() {
    let thresholds = Thresholds::default();
    let feedback = generate_feedback(&weighted([95.0, 40.0, 80.0], &thresholds), &[], &thresholds);

    assert!(feedback.encouragement.iter().any(|item| matches!(
        item,
        FeedbackItem::Praise { dimension: Dimension::Structure, .. }
    )));
    let improved: Vec<_> = feedback
        .improvements
        .iter()
        .filter_map(|item| match item {
            FeedbackItem::Improvement { dimension, .. } => Some(*dimension),
            _ => None,
        })
        .collect();
    assert_eq!(improved, vec![Dimension::Visual]);
}

#[test]
fn inactive_dimensions_get_no_feedback() {
    let thresholds = Thresholds::default();
    let feedback = generate_feedback(&weighted([100.0; 3], &thresholds), &[], &thresholds);
    assert!(feedback.encouragement.iter().all(|item| !matches!(
        item,
        FeedbackItem::Praise { dimension: Dimension::Tag, .. }
    )));
    assert!(matches!(feedback.improvements[0], FeedbackItem::General { .. }));
}

#[test]
fn improvements_quote_the_costliest_findings() {
    let thresholds = Thresholds::default();
    let mut scores = weighted([20.0, 100.0, 100.0], &thresholds);
    scores[0].details = vec![
        Finding::builder()
            .kind(FindingKind::Missing)
            .message("small")
            .impact(1.0)
            .build(),
        Finding::note("ignored"),
        Finding::builder()
            .kind(FindingKind::Missing)
            .message("large")
            .path("body > main")
            .impact(9.0)
            .build(),
        Finding::builder()
            .kind(FindingKind::Extra)
            .message("medium")
            .impact(4.0)
            .build(),
        Finding::builder()
            .kind(FindingKind::Extra)
            .message("tiny")
            .impact(0.5)
            .build(),
    ];

    let feedback = generate_feedback(&scores, &[], &thresholds);
    let details = feedback
        .improvements
        .iter()
        .find_map(|item| match item {
            FeedbackItem::Improvement { details, .. } => Some(details.clone()),
            _ => None,
        })
        .expect("an improvement");
    assert_eq!(details, vec!["large (at body > main)", "medium", "small"]);
}

#[test]
fn render_errors_become_deduplicated_render_issues() {
    let thresholds = Thresholds::default();
    let errors = vec![
        RenderError::new("script", "ReferenceError: x is not defined"),
        RenderError::new("script", "ReferenceError: x is not defined"),
        RenderError::new("timeout", "Render did not finish"),
    ];
    let feedback = generate_feedback(&weighted([100.0; 3], &thresholds), &errors, &thresholds);

    let issues: Vec<_> = feedback
        .improvements
        .iter()
        .filter(|item| matches!(item, FeedbackItem::RenderIssue { .. }))
        .collect();
    assert_eq!(issues.len(), 2);
    assert!(issues[0].description().contains("ReferenceError"));
}
