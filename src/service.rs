#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::sync::Arc;

use tracing::info;

use crate::{
    error::ServiceError,
    orchestrator::Evaluator,
    render::PoolStats,
    repository::{ChallengeRepository, SubmissionRepository},
    types::EvaluationResult,
};

/// Evaluates stored submissions by id.
///
/// Resolves the submission and its challenge, runs the engine, saves the
/// result back onto the submission and returns it. Every call recomputes
/// from the stored code, so repeating it is safe.
#[derive(Clone)]
pub struct EvaluationService {
    /// The engine.
    evaluator:   Evaluator,
    /// Challenge lookup.
    challenges:  Arc<dyn ChallengeRepository>,
    /// Submission lookup and result storage.
    submissions: Arc<dyn SubmissionRepository>,
}

impl EvaluationService {
    /// Wires the engine to its storage.
    pub fn new(
        evaluator: Evaluator,
        challenges: Arc<dyn ChallengeRepository>,
        submissions: Arc<dyn SubmissionRepository>,
    ) -> Self {
        Self {
            evaluator,
            challenges,
            submissions,
        }
    }

    /// The engine behind this service.
    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Render pool activity.
    pub fn pool_stats(&self) -> PoolStats {
        self.evaluator.pool_stats()
    }

    /// Evaluates the stored submission `submission_id`.
    pub async fn evaluate(&self, submission_id: &str) -> Result<EvaluationResult, ServiceError> {
        let submission = self.submissions.fetch_submission(submission_id).await?;
        let challenge = self
            .challenges
            .fetch_challenge(&submission.challenge_id)
            .await?;

        let result = self
            .evaluator
            .evaluate_keyed(&submission.code, &challenge, Some(&submission.id))
            .await?;

        self.submissions.save_result(&submission.id, &result).await?;
        info!(
            submission = %submission.id,
            challenge = %challenge.id,
            final_score = result.final_score,
            "saved evaluation result"
        );
        Ok(result)
    }
}
