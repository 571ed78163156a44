use std::{sync::Arc, sync::atomic::Ordering, time::Duration};

use webgrade::{
    Challenge, CodeBundle, Dimension, EngineError, EvaluationState, Evaluator, Thresholds, Weights,
    render::PixelBuffer,
    types::FindingKind,
};


use render_support::{Behavior, LIST_PAGE, ScriptedRenderer, list_page, test_config};

fn challenge() -> Challenge {
    Challenge::builder()
        .id("list-page")
        .expected(list_page())
        .build()
}

fn with_marker(marker: &str) -> CodeBundle {
    CodeBundle::new(
        LIST_PAGE.replace("<body>", &format!("<body><!-- {marker} -->")),
        "",
        "",
    )
}

fn evaluator(renderer: ScriptedRenderer) -> Evaluator {
    Evaluator::new(Arc::new(renderer), test_config())
}

#[tokio::test]
async fn evaluating_the_reference_against_itself_is_perfect() {
    let result = evaluator(ScriptedRenderer::new())
        .evaluate(&list_page(), &challenge())
        .await
        .expect("evaluate");

    assert_eq!(result.final_score, 100.0);
    assert!(result.passed);
    for dimension in [Dimension::Structure, Dimension::Visual, Dimension::Content] {
        let score = result.dimension(dimension).expect("dimension present");
        assert_eq!(score.score, 100.0, "{dimension}");
        assert!(score.passed);
    }
    let tag = result.dimension(Dimension::Tag).expect("tag present");
    assert_eq!(tag.weight, 0.0, "no tag rules means the tag dimension is not scored");
    assert!(!result.feedback.encouragement.is_empty());
    assert!(!result.feedback.improvements.is_empty());
}

#[tokio::test]
async fn empty_candidate_scores_low_and_fails() {
    let result = evaluator(ScriptedRenderer::new())
        .evaluate(&CodeBundle::default(), &challenge())
        .await
        .expect("evaluate");

    assert!(!result.passed);
    assert!(result.final_score <= 34.0, "got {}", result.final_score);
    assert_eq!(result.dimension(Dimension::Structure).expect("structure").score, 0.0);
    assert_eq!(result.dimension(Dimension::Content).expect("content").score, 0.0);
    assert!(
        result
            .feedback
            .improvements
            .iter()
            .any(|item| item.description().contains("Score: 0/100"))
    );
}

#[tokio::test]
async fn candidate_timeout_still_produces_a_result() {
    let renderer = ScriptedRenderer::new().when("scenario:hang", Behavior::Hang(Duration::from_secs(10)));
    let torn = Arc::clone(&renderer.torn);
    let config = test_config().with_render_timeout(Duration::from_millis(200));
    let evaluator = Evaluator::new(Arc::new(renderer), config);

    let result = evaluator
        .evaluate(&with_marker("scenario:hang"), &challenge())
        .await
        .expect("a timed-out candidate is scored, not failed");

    assert!(!result.passed);
    assert_eq!(result.render_errors.len(), 1);
    assert_eq!(result.render_errors[0].stage, "timeout");
    assert_eq!(result.dimension(Dimension::Structure).expect("structure").score, 0.0);
    assert_eq!(torn.load(Ordering::SeqCst), 1, "the timed-out context is torn down");
    assert_eq!(evaluator.pool_stats().timed_out, 1);
}

#[tokio::test]
async fn both_renders_failing_ends_in_failed_state() {
    let renderer = ScriptedRenderer::new().when(
        "scenario:crash",
        Behavior::Fail(EngineError::RenderCrash("browser went away".into())),
    );
    let challenge = Challenge::builder()
        .id("broken")
        .expected(with_marker("scenario:crash"))
        .build();

    let failure = evaluator(renderer)
        .evaluate(&with_marker("scenario:crash"), &challenge)
        .await
        .expect_err("nothing to compare");

    assert_eq!(failure.state, EvaluationState::Rendering);
    assert_eq!(failure.error.kind(), "no_artifact_available");
    assert!(failure.error.is_fatal());
    assert!(failure.retryable());
}

#[tokio::test]
async fn expected_side_failure_is_recorded_and_scored() {
    let renderer = ScriptedRenderer::new().when(
        "scenario:crash",
        Behavior::Fail(EngineError::RenderCrash("browser went away".into())),
    );
    let challenge = Challenge::builder()
        .id("broken-reference")
        .expected(with_marker("scenario:crash"))
        .build();

    let result = evaluator(renderer)
        .evaluate(&list_page(), &challenge)
        .await
        .expect("one artifact is enough");

    assert!(
        result
            .render_errors
            .iter()
            .any(|e| e.stage == "expected:render" && e.message.contains("browser went away"))
    );
}

#[tokio::test]
async fn screenshot_size_mismatch_is_contained_in_visual() {
    let renderer = ScriptedRenderer::new().when(
        "scenario:small",
        Behavior::Screenshot(PixelBuffer::filled(10, 10, [255, 255, 255, 255])),
    );

    let result = evaluator(renderer)
        .evaluate(&with_marker("scenario:small"), &challenge())
        .await
        .expect("a comparator failure never fails the evaluation");

    let visual = result.dimension(Dimension::Visual).expect("visual");
    assert_eq!(visual.score, 0.0);
    assert!(
        visual
            .details
            .iter()
            .any(|f| f.kind == FindingKind::Error && f.message.contains("Screenshot sizes differ"))
    );
    assert_eq!(result.dimension(Dimension::Structure).expect("structure").score, 100.0);
}

#[tokio::test]
async fn same_inputs_give_identical_results() {
    let evaluator = evaluator(ScriptedRenderer::new());
    let candidate = CodeBundle::new(LIST_PAGE.replace("Coffee", "Tea"), "", "");

    let first = evaluator.evaluate(&candidate, &challenge()).await.expect("first");
    let second = evaluator.evaluate(&candidate, &challenge()).await.expect("second");

    assert_eq!(first, second);
}

#[tokio::test]
async fn pool_exhaustion_fails_the_evaluation() {
    let renderer =
        ScriptedRenderer::new().when("scenario:slow", Behavior::Hang(Duration::from_millis(400)));
    let config = test_config()
        .with_pool_size(1)
        .with_acquire_timeout(Duration::from_millis(50));
    let evaluator = Evaluator::new(Arc::new(renderer), config);
    let challenge = Challenge::builder()
        .id("slow")
        .expected(with_marker("scenario:slow"))
        .build();

    let failure = evaluator
        .evaluate(&with_marker("scenario:slow"), &challenge)
        .await
        .expect_err("only one context for two renders");

    assert_eq!(failure.state, EvaluationState::Rendering);
    assert_eq!(failure.error.kind(), "pool_exhausted");
    assert_eq!(evaluator.pool_stats().exhausted, 1);
}

#[tokio::test]
async fn tag_rules_activate_the_tag_dimension() {
    let challenge = Challenge::builder()
        .id("list-page")
        .expected(list_page())
        .tag_rules(vec!["li".to_string()])
        .build();
    let candidate = CodeBundle::new(LIST_PAGE.replace("<li>Coffee</li>", ""), "", "");

    let result = evaluator(ScriptedRenderer::new())
        .evaluate(&candidate, &challenge)
        .await
        .expect("evaluate");

    for score in &result.dimension_scores {
        assert!((score.weight - 25.0).abs() < 1e-9, "{} weighs {}", score.name, score.weight);
    }
    let tag = result.dimension(Dimension::Tag).expect("tag");
    assert!(tag.score < 100.0);
    assert!(tag.details.iter().any(|f| f.kind == FindingKind::Missing));
}

#[tokio::test]
async fn weight_overrides_are_normalized_over_active_dimensions() {
    let challenge = Challenge::builder()
        .id("structure-only")
        .expected(list_page())
        .weights(Some(Weights {
            structure: 3.0,
            visual:    0.0,
            content:   1.0,
            tag:       50.0,
        }))
        .build();

    let result = evaluator(ScriptedRenderer::new())
        .evaluate(&list_page(), &challenge)
        .await
        .expect("evaluate");

    let weight = |d| result.dimension(d).expect("present").weight;
    assert!((weight(Dimension::Structure) - 75.0).abs() < 1e-9);
    assert!((weight(Dimension::Content) - 25.0).abs() < 1e-9);
    assert_eq!(weight(Dimension::Visual), 0.0);
    assert_eq!(weight(Dimension::Tag), 0.0, "tag stays inactive without rules");
}

#[tokio::test]
async fn per_dimension_minimum_can_fail_a_high_score() {
    let challenge = Challenge::builder()
        .id("strict-copy")
        .expected(list_page())
        .thresholds(Some(
            Thresholds::default()
                .with_overall(70.0)
                .with_dimension(Dimension::Content, 95.0),
        ))
        .build();
    let candidate = CodeBundle::new(LIST_PAGE.replace("Coffee", "Tea"), "", "");

    let result = evaluator(ScriptedRenderer::new())
        .evaluate(&candidate, &challenge)
        .await
        .expect("evaluate");

    assert!(result.final_score >= 70.0, "got {}", result.final_score);
    let content = result.dimension(Dimension::Content).expect("content");
    assert!(content.score < 95.0);
    assert!(!content.passed);
    assert!(!result.passed);
}

#[tokio::test]
async fn screenshots_are_stored_under_the_artifact_key() {
    let dir = tempfile::tempdir().expect("tempdir");
    let renderer = ScriptedRenderer::new().when(
        "scenario:dark",
        Behavior::Screenshot(PixelBuffer::filled(32, 24, [0, 0, 0, 255])),
    );
    let config = test_config().with_screenshot_dir(dir.path());
    let evaluator = Evaluator::new(Arc::new(renderer), config);

    let result = evaluator
        .evaluate_keyed(&with_marker("scenario:dark"), &challenge(), Some("sub 1"))
        .await
        .expect("evaluate");

    assert_eq!(
        result.candidate_screenshot_ref.as_deref(),
        Some("/screenshots/sub_1/candidate.png")
    );
    assert_eq!(result.diff_screenshot_ref.as_deref(), Some("/screenshots/sub_1/diff.png"));
    assert!(dir.path().join("sub_1").join("expected.png").is_file());
    assert_eq!(result.dimension(Dimension::Visual).expect("visual").score, 0.0);
}

#[tokio::test]
async fn without_a_key_nothing_is_stored() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config().with_screenshot_dir(dir.path());
    let evaluator = Evaluator::new(Arc::new(ScriptedRenderer::new()), config);

    let result = evaluator
        .evaluate(&list_page(), &challenge())
        .await
        .expect("evaluate");

    assert!(result.candidate_screenshot_ref.is_none());
    assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);
}

#[tokio::test]
async fn missing_color_rule_costs_only_visual_points() {
    let mut screenshot = PixelBuffer::filled(20, 20, [255, 255, 255, 255]);
    screenshot.fill_rect(0, 0, 20, 8, [200, 30, 30, 255]);
    let renderer =
        ScriptedRenderer::new().when("scenario:unstyled", Behavior::Screenshot(screenshot));
    let evaluator = Evaluator::new(Arc::new(renderer), test_config().with_viewport(20, 20));
    let challenge = Challenge::builder()
        .id("list-page")
        .expected(list_page())
        .tag_rules(vec!["ul".to_string()])
        .build();

    let result = evaluator
        .evaluate(&with_marker("scenario:unstyled"), &challenge)
        .await
        .expect("evaluate");

    assert_eq!(result.dimension(Dimension::Structure).expect("structure").score, 100.0);
    assert!((result.dimension(Dimension::Visual).expect("visual").score - 60.0).abs() < 1e-9);
    assert_eq!(result.final_score, 90.0);
    assert!(result.passed);
}

#[tokio::test]
async fn thresholds_without_an_overall_minimum_use_the_engine_default() {
    let thresholds: Thresholds =
        serde_json::from_str(r#"{ "perDimension": { "content": 10 } }"#).expect("thresholds");
    let challenge = Challenge::builder()
        .id("strict-default")
        .expected(list_page())
        .thresholds(Some(thresholds))
        .build();
    let mut config = test_config();
    config.default_overall_min = 100.0;
    let evaluator = Evaluator::new(Arc::new(ScriptedRenderer::new()), config);

    let near_miss = evaluator
        .evaluate(&CodeBundle::new(LIST_PAGE.replace("Coffee", "Tea"), "", ""), &challenge)
        .await
        .expect("evaluate");
    assert!(near_miss.final_score >= 70.0, "got {}", near_miss.final_score);
    assert!(!near_miss.passed, "the engine default of 100 applies");

    let exact = evaluator
        .evaluate(&list_page(), &challenge)
        .await
        .expect("evaluate");
    assert!(exact.passed);
}
