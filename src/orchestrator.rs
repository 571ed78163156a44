#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{fmt::Display, sync::Arc};

use serde::Serialize;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::{
    aggregate::{aggregate, assign_weights},
    artifacts::{ScreenshotStore, StoredScreenshots},
    compare::{VisualComparison, compare_content, compare_dom, compare_tags, compare_visual},
    config::EngineConfig,
    error::{EngineError, EvaluationFailure, Side},
    feedback::generate_feedback,
    render::{PixelBuffer, PoolStats, RenderArtifact, RenderPool, Renderer, create_renderer},
    types::{
        Challenge, CodeBundle, Dimension, DimensionScore, EvaluationResult, Finding, RenderError,
    },
};

/// Where an evaluation is in its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationState {
    /// Accepted, nothing started.
    Pending,
    /// Rendering both bundles.
    Rendering,
    /// Running comparators.
    Comparing,
    /// Combining scores and building feedback.
    Aggregating,
    /// Finished with a result.
    Complete,
    /// Finished without a result.
    Failed,
}

impl EvaluationState {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EvaluationState::Complete | EvaluationState::Failed)
    }
}

impl Display for EvaluationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EvaluationState::Pending => "pending",
            EvaluationState::Rendering => "rendering",
            EvaluationState::Comparing => "comparing",
            EvaluationState::Aggregating => "aggregating",
            EvaluationState::Complete => "complete",
            EvaluationState::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// State of one evaluation run.
struct Run {
    /// Current state.
    state: EvaluationState,
}

impl Run {
    /// A run in `Pending`.
    fn new() -> Self {
        Self {
            state: EvaluationState::Pending,
        }
    }

    /// Moves to `next`.
    fn advance(&mut self, next: EvaluationState) {
        debug_assert!(!self.state.is_terminal(), "transition out of {}", self.state);
        debug!(from = %self.state, to = %next, "state transition");
        self.state = next;
    }

    /// Ends the run in `Failed`, recording the state it failed in.
    fn fail(&mut self, error: EngineError) -> EvaluationFailure {
        let failure = EvaluationFailure {
            state: self.state,
            error,
        };
        warn!(from = %self.state, kind = failure.error.kind(), "evaluation failed: {}", failure.error);
        self.state = EvaluationState::Failed;
        failure
    }
}

/// Render-stage name recorded for a failed render.
fn render_stage(error: &EngineError) -> &'static str {
    match error {
        EngineError::RenderTimeout(_) => "timeout",
        _ => "render",
    }
}

/// Runs a comparator on the blocking pool, turning a panic into a
/// [`EngineError::ComparatorFailure`].
async fn run_comparator<T: Send + 'static>(
    dimension: Dimension,
    work: impl FnOnce() -> Result<T, EngineError> + Send + 'static,
) -> Result<T, EngineError> {
    match tokio::task::spawn_blocking(work).await {
        Ok(outcome) => outcome,
        Err(e) => Err(EngineError::ComparatorFailure {
            dimension: dimension.to_string(),
            message:   if e.is_panic() {
                "the comparator panicked".to_string()
            } else {
                "the comparator was cancelled".to_string()
            },
        }),
    }
}

/// The visual score used when either page has no screenshot to compare.
fn visual_not_measured() -> DimensionScore {
    DimensionScore::new(
        Dimension::Visual,
        100.0,
        vec![Finding::note(
            "The renderer took no screenshot, so appearance is not scored for this evaluation",
        )],
    )
}

/// A contained comparator failure becomes a zero score with an error finding.
fn contained(dimension: Dimension, outcome: Result<DimensionScore, EngineError>) -> DimensionScore {
    outcome.unwrap_or_else(|e| {
        warn!(%dimension, kind = e.kind(), "comparator failure contained: {e}");
        DimensionScore::failed(dimension, e.to_string())
    })
}

/// The evaluation engine: renders both bundles, compares them, aggregates
/// and builds feedback.
#[derive(Clone)]
pub struct Evaluator {
    /// Shared render contexts.
    pool:   RenderPool,
    /// Engine settings.
    config: Arc<EngineConfig>,
    /// Screenshot persistence, when enabled.
    store:  Option<ScreenshotStore>,
}

impl Evaluator {
    /// Creates an engine over `renderer`.
    pub fn new(renderer: Arc<dyn Renderer>, config: EngineConfig) -> Self {
        let pool = RenderPool::new(renderer, &config);
        let store = ScreenshotStore::from_config(&config);
        Self {
            pool,
            config: Arc::new(config),
            store,
        }
    }

    /// Creates an engine with the backend `config` selects.
    pub fn from_config(config: EngineConfig) -> Self {
        let renderer = create_renderer(&config);
        Self::new(renderer, config)
    }

    /// Engine settings.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Render pool activity.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Evaluates a candidate against a challenge without storing screenshots.
    pub async fn evaluate(
        &self,
        candidate: &CodeBundle,
        challenge: &Challenge,
    ) -> Result<EvaluationResult, EvaluationFailure> {
        self.evaluate_keyed(candidate, challenge, None).await
    }

    /// Evaluates a candidate against a challenge. When `artifact_key` is set
    /// and a screenshot store is configured, screenshots are stored under it.
    pub async fn evaluate_keyed(
        &self,
        candidate: &CodeBundle,
        challenge: &Challenge,
        artifact_key: Option<&str>,
    ) -> Result<EvaluationResult, EvaluationFailure> {
        let span = info_span!(
            "evaluation",
            id = %Uuid::new_v4(),
            challenge = %challenge.id,
            backend = self.pool.backend(),
        );
        self.run(candidate, challenge, artifact_key)
            .instrument(span)
            .await
    }

    /// The pipeline itself.
    async fn run(
        &self,
        candidate: &CodeBundle,
        challenge: &Challenge,
        artifact_key: Option<&str>,
    ) -> Result<EvaluationResult, EvaluationFailure> {
        let mut run = Run::new();

        run.advance(EvaluationState::Rendering);
        let (candidate_render, expected_render) = futures::future::join(
            self.pool.render(candidate.clone()),
            self.pool.render(challenge.expected.clone()),
        )
        .await;

        let (candidate_art, expected_art) = match (candidate_render, expected_render) {
            (Err(e), _) | (_, Err(e)) if e.is_fatal() => return Err(run.fail(e)),
            (Err(c), Err(e)) => {
                return Err(run.fail(EngineError::NoArtifactAvailable {
                    candidate: Box::new(c),
                    expected:  Box::new(e),
                }));
            }
            (c, e) => (
                self.artifact_or_empty(Side::Candidate, c),
                self.artifact_or_empty(Side::Expected, e),
            ),
        };

        let mut render_errors = candidate_art.render_errors.clone();
        render_errors.extend(expected_art.render_errors.iter().map(|e| {
            RenderError::new(format!("{}:{}", Side::Expected, e.stage), e.message.clone())
        }));

        run.advance(EvaluationState::Comparing);
        let candidate_art = Arc::new(candidate_art);
        let expected_art = Arc::new(expected_art);
        let (scores, overlay) = self
            .compare(Arc::clone(&candidate_art), Arc::clone(&expected_art), challenge)
            .await;

        run.advance(EvaluationState::Aggregating);
        let mut scores = scores;
        let thresholds = challenge
            .thresholds
            .clone()
            .unwrap_or_default()
            .resolved(self.config.default_overall_min);
        let mut active = vec![Dimension::Structure, Dimension::Content];
        if candidate_art.screenshot.is_some() && expected_art.screenshot.is_some() {
            active.push(Dimension::Visual);
        }
        if !challenge.tag_rules.iter().all(|r| r.trim().is_empty()) {
            active.push(Dimension::Tag);
        }
        let weights = challenge
            .weights
            .unwrap_or(self.config.default_weights)
            .normalized(&active);
        assign_weights(&mut scores, &weights, &thresholds);
        let verdict = aggregate(&scores, &thresholds);
        let feedback = generate_feedback(&scores, &render_errors, &thresholds);

        let stored = match (&self.store, artifact_key) {
            (Some(store), Some(key)) => {
                store
                    .store_all(
                        key,
                        candidate_art.screenshot.clone(),
                        expected_art.screenshot.clone(),
                        overlay,
                    )
                    .await
            }
            _ => StoredScreenshots::default(),
        };

        run.advance(EvaluationState::Complete);
        info!(
            final_score = verdict.final_score,
            passed = verdict.passed,
            "evaluation complete"
        );

        Ok(EvaluationResult {
            final_score: verdict.final_score,
            passed: verdict.passed,
            dimension_scores: scores,
            feedback,
            diff_screenshot_ref: stored.diff,
            candidate_screenshot_ref: stored.candidate,
            expected_screenshot_ref: stored.expected,
            render_errors,
        })
    }

    /// Substitutes an empty artifact for a failed side.
    fn artifact_or_empty(
        &self,
        side: Side,
        render: Result<RenderArtifact, EngineError>,
    ) -> RenderArtifact {
        render.unwrap_or_else(|e| {
            warn!(%side, kind = e.kind(), "render failed, scoring against an empty page: {e}");
            let error = RenderError::new(render_stage(&e), e.to_string());
            RenderArtifact::empty(self.config.viewport, error)
        })
    }

    /// Runs every comparator concurrently. Never fails: each failure is
    /// contained in its own dimension.
    async fn compare(
        &self,
        candidate: Arc<RenderArtifact>,
        expected: Arc<RenderArtifact>,
        challenge: &Challenge,
    ) -> (Vec<DimensionScore>, Option<PixelBuffer>) {
        let tolerance = self.config.pixel_tolerance;
        let phrases = challenge.required_phrases.clone();
        let rules = challenge.tag_rules.clone();

        let structure = {
            let (c, e) = (Arc::clone(&candidate), Arc::clone(&expected));
            run_comparator(Dimension::Structure, move || {
                Ok(compare_dom(&c.dom_tree, &e.dom_tree))
            })
        };
        let visual = {
            let (c, e) = (Arc::clone(&candidate), Arc::clone(&expected));
            run_comparator(Dimension::Visual, move || match (&c.screenshot, &e.screenshot) {
                (Some(c), Some(e)) => compare_visual(c, e, tolerance).map(Some),
                _ => Ok(None),
            })
        };
        let content = {
            let (c, e) = (Arc::clone(&candidate), Arc::clone(&expected));
            run_comparator(Dimension::Content, move || {
                Ok(compare_content(&c.text_content, &e.text_content, &phrases))
            })
        };
        let tag = {
            let (c, e) = (Arc::clone(&candidate), Arc::clone(&expected));
            run_comparator(Dimension::Tag, move || {
                Ok(compare_tags(&c.dom_tree, &e.dom_tree, &rules))
            })
        };

        let (structure, visual, content, tag) = futures::join!(structure, visual, content, tag);

        let (visual, overlay) = match visual {
            Ok(Some(VisualComparison { score, overlay, .. })) => (Ok(score), overlay),
            Ok(None) => (Ok(visual_not_measured()), None),
            Err(e) => (Err(e), None),
        };

        (
            vec![
                contained(Dimension::Structure, structure),
                contained(Dimension::Visual, visual),
                contained(Dimension::Content, content),
                contained(Dimension::Tag, tag),
            ],
            overlay,
        )
    }
}
