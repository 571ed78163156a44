use webgrade::{
    Dimension, DimensionScore, Thresholds, Weights,
    aggregate::{aggregate, assign_weights},
};

fn scores(values: [f64; 4]) -> Vec<DimensionScore> {
    Dimension::ALL
        .iter()
        .zip(values)
        .map(|(d, v)| DimensionScore::new(*d, v, Vec::new()))
        .collect()
}

fn weighted(values: [f64; 4], weights: Weights, thresholds: &Thresholds) -> Vec<DimensionScore> {
    let mut scores = scores(values);
    assign_weights(&mut scores, &weights, thresholds);
    scores
}

#[test]
fn equal_weights_average_the_dimensions() {
    let thresholds = Thresholds::default();
    let scores = weighted([100.0, 80.0, 90.0, 90.0], Weights::default(), &thresholds);

    let verdict = aggregate(&scores, &thresholds);
    assert_eq!(verdict.final_score, 90.0);
    assert!(verdict.passed);
}

#[test]
fn final_score_is_rounded() {
    let thresholds = Thresholds::default();
    let weights = Weights::default().normalized(&[
        Dimension::Structure,
        Dimension::Visual,
        Dimension::Content,
    ]);
    let scores = weighted([100.0, 0.0, 0.0, 0.0], weights, &thresholds);
    assert_eq!(aggregate(&scores, &thresholds).final_score, 33.0);
}

#[test]
fn below_overall_minimum_fails() {
    let thresholds = Thresholds::default().with_overall(95.0);
    let scores = weighted([100.0, 80.0, 90.0, 90.0], Weights::default(), &thresholds);
    assert!(!aggregate(&scores, &thresholds).passed);
}

#[test]
fn per_dimension_minimum_is_enforced() {
    let thresholds = Thresholds::default()
        .with_overall(50.0)
        .with_dimension(Dimension::Visual, 85.0);
    let scores = weighted([100.0, 80.0, 90.0, 90.0], Weights::default(), &thresholds);

    let visual = scores
        .iter()
        .find(|s| s.name == Dimension::Visual)
        .expect("visual");
    assert!(!visual.passed);
    assert!(!aggregate(&scores, &thresholds).passed);
}

#[test]
fn inactive_dimensions_are_ignored() {
    let thresholds = Thresholds::default().with_dimension(Dimension::Tag, 90.0);
    let weights = Weights::default().normalized(&[
        Dimension::Structure,
        Dimension::Visual,
        Dimension::Content,
    ]);
    let scores = weighted([90.0, 90.0, 90.0, 0.0], weights, &thresholds);

    let tag = scores.iter().find(|s| s.name == Dimension::Tag).expect("tag");
    assert!(!tag.is_active());
    assert!(tag.passed);
    let verdict = aggregate(&scores, &thresholds);
    assert_eq!(verdict.final_score, 90.0);
    assert!(verdict.passed);
}

#[test]
fn final_score_stays_in_bounds() {
    let thresholds = Thresholds::default();
    for values in [[0.0; 4], [100.0; 4], [250.0, -5.0, f64::NAN, 100.0]] {
        let scores = weighted(values, Weights::default(), &thresholds);
        let verdict = aggregate(&scores, &thresholds);
        assert!((0.0..=100.0).contains(&verdict.final_score), "{values:?}");
    }
}

#[test]
fn weights_renormalize_over_active_dimensions() {
    let weights = Weights::parse("structure:2, visual:2, content:0").expect("parse");
    let active = [Dimension::Structure, Dimension::Visual, Dimension::Content];
    let normalized = weights.normalized(&active);
    assert_eq!(normalized.structure, 50.0);
    assert_eq!(normalized.visual, 50.0);
    assert_eq!(normalized.content, 0.0);
    assert_eq!(normalized.tag, 0.0);

    let zero = Weights::parse("tag:10").expect("parse").normalized(&active);
    let share = 100.0 / 3.0;
    assert!((zero.structure - share).abs() < 1e-9);
}

#[test]
fn malformed_weights_are_rejected() {
    assert!(Weights::parse("structure=40").is_err());
    assert!(Weights::parse("colour:10").is_err());
    assert!(Weights::parse("visual:120").is_err());
}

#[test]
fn unset_overall_minimum_resolves_to_the_given_default() {
    let thresholds = Thresholds::default().with_dimension(Dimension::Visual, 140.0);
    assert_eq!(thresholds.overall_min_score, None);

    let resolved = thresholds.resolved(55.0);
    assert_eq!(resolved.overall_min_score, Some(55.0));
    assert_eq!(resolved.minimum_for(Dimension::Visual), 100.0, "minimums are clamped");
    assert_eq!(resolved.minimum_for(Dimension::Content), 55.0);

    let explicit = Thresholds::default().with_overall(80.0).resolved(55.0);
    assert_eq!(explicit.overall_min(), 80.0);
}

