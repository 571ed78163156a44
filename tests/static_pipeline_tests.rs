use std::{path::PathBuf, thread};

use webgrade::{
    Challenge, CodeBundle, Dimension, EngineConfig, Evaluator, FeedbackItem,
    compare::compare_dom,
    config::RendererKind,
    constants::MAX_DOM_DEPTH,
    render::snapshot::parse_document,
    report,
    types::FindingKind,
};

fn fixture_root(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join("web")
        .join(name)
}

fn challenge(name: &str) -> Challenge {
    let root = fixture_root(name);
    let raw = std::fs::read_to_string(root.join("challenge.json")).expect("read challenge");
    let mut challenge: Challenge = serde_json::from_str(&raw).expect("parse challenge");
    challenge.expected = CodeBundle::from_dir(&root.join("expected")).expect("expected bundle");
    challenge
}

fn evaluator() -> Evaluator {
    Evaluator::from_config(
        EngineConfig::default()
            .with_viewport(64, 48)
            .with_renderer(RendererKind::Static),
    )
}

#[tokio::test]
async fn reference_solution_passes_its_own_challenge() {
    let challenge = challenge("profile-card");
    let result = evaluator()
        .evaluate(&challenge.expected, &challenge)
        .await
        .expect("evaluate");

    assert_eq!(result.final_score, 100.0);
    assert!(result.passed);
    let tag = result.dimension(Dimension::Tag).expect("tag");
    assert!((tag.weight - 100.0 / 3.0).abs() < 1e-9, "got {}", tag.weight);
}

#[tokio::test]
async fn partial_attempt_fails_with_targeted_feedback() {
    let challenge = challenge("profile-card");
    let attempt =
        CodeBundle::from_dir(&fixture_root("profile-card").join("attempt")).expect("attempt");

    let result = evaluator()
        .evaluate(&attempt, &challenge)
        .await
        .expect("evaluate");

    assert!(!result.passed);
    assert!(result.final_score > 0.0 && result.final_score < 75.0, "got {}", result.final_score);

    let tag = result.dimension(Dimension::Tag).expect("tag");
    assert!(tag.score < 50.0, "one of two rules fails outright, got {}", tag.score);

    let content = result.dimension(Dimension::Content).expect("content");
    assert!(
        content
            .details
            .iter()
            .any(|f| f.passed == Some(false) && f.message.contains("\"Follow\""))
    );

    assert!(result.feedback.improvements.iter().any(|item| matches!(
        item,
        FeedbackItem::Improvement { dimension: Dimension::Tag, .. }
    )));

    let summary = report::render_summary(&result);
    assert!(summary.contains("Evaluation Overview"));
    assert!(summary.contains("Required elements"));
}

#[tokio::test]
async fn result_serializes_with_camel_case_fields() {
    let challenge = challenge("profile-card");
    let result = evaluator()
        .evaluate(&challenge.expected, &challenge)
        .await
        .expect("evaluate");

    let json = serde_json::to_value(&result).expect("serialize");
    assert!(json.get("finalScore").is_some());
    assert!(json.get("dimensionScores").is_some());
    assert!(json.get("diffScreenshotRef").is_none(), "absent refs are omitted");
    assert_eq!(json["dimensionScores"][0]["name"], "structure");
}

#[tokio::test]
async fn appearance_is_not_scored_without_screenshots() {
    let challenge = challenge("profile-card");
    let result = evaluator()
        .evaluate(&CodeBundle::default(), &challenge)
        .await
        .expect("evaluate");

    let visual = result.dimension(Dimension::Visual).expect("visual");
    assert_eq!(visual.weight, 0.0);
    assert!(visual.details.iter().any(|f| f.kind == FindingKind::Note));
    assert_eq!(result.final_score, 0.0, "an empty page earns nothing");
    assert!(
        !result
            .feedback
            .improvements
            .iter()
            .any(|item| matches!(item, FeedbackItem::Improvement { dimension: Dimension::Visual, .. }))
    );
}

#[tokio::test]
async fn inline_script_and_style_are_not_page_text() {
    let challenge = Challenge::builder()
        .id("welcome")
        .expected(CodeBundle::new("<p>Welcome to my page</p>", "", ""))
        .build();
    let candidate = CodeBundle::new(
        "<p>Welcome to my page</p>\
         <script>const greeting = document.querySelector('p');</script>\
         <style>p { color: red; }</style>",
        "",
        "",
    );

    let result = evaluator()
        .evaluate(&candidate, &challenge)
        .await
        .expect("evaluate");

    let content = result.dimension(Dimension::Content).expect("content");
    assert_eq!(content.score, 100.0);
    assert!(!content.details.iter().any(|f| f.kind == FindingKind::Extra));
}

fn nested_divs(depth: usize) -> String {
    format!("{}deep{}", "<div>".repeat(depth), "</div>".repeat(depth))
}

#[test]
fn deep_nesting_is_cut_off_on_a_small_stack() {
    let worker = thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(|| {
            let html = format!("<!DOCTYPE html><html><body>{}</body></html>", nested_divs(30_000));
            let snapshot = parse_document(&html);
            let tree = snapshot.root.normalized();
            let structure = compare_dom(&tree, &tree);
            (snapshot.truncated, tree.subtree_size(), structure.score, tree.collect_text())
        })
        .expect("spawn");

    let (truncated, size, score, text) = worker.join().expect("no stack overflow");
    assert!(truncated);
    assert_eq!(size, MAX_DOM_DEPTH + 1);
    assert_eq!(score, 100.0);
    assert!(text.is_empty(), "the innermost text is past the limit");
}

#[tokio::test]
async fn deeply_nested_submission_is_scored_with_a_render_error() {
    let challenge = challenge("profile-card");
    let candidate = CodeBundle::new(nested_divs(30_000), "", "");

    let result = evaluator()
        .evaluate(&candidate, &challenge)
        .await
        .expect("evaluate");

    assert!(!result.passed);
    assert!(result.render_errors.iter().any(|e| e.stage == "snapshot"));
    assert!(
        result
            .feedback
            .improvements
            .iter()
            .any(|item| matches!(item, FeedbackItem::RenderIssue { .. }))
    );
}
