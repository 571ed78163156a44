#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::time::Duration;

use serde::Serialize;

use crate::orchestrator::EvaluationState;

/// Which of the two bundles a render belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The learner's submission.
    Candidate,
    /// The challenge's reference solution.
    Expected,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Candidate => write!(f, "candidate"),
            Side::Expected => write!(f, "expected"),
        }
    }
}

/// Errors raised inside the evaluation engine.
#[derive(thiserror::Error, Debug, Clone)]
pub enum EngineError {
    /// A render did not finish within its deadline.
    #[error("Render did not finish within {0:?}")]
    RenderTimeout(Duration),
    /// The sandbox failed for reasons unrelated to the submitted code.
    #[error("Render sandbox failed: {0}")]
    RenderCrash(String),
    /// Two screenshots had different resolutions.
    #[error(
        "Screenshot sizes differ: candidate is {candidate:?}, expected is {expected:?}. This is a \
         configuration bug, not a submission error."
    )]
    DimensionMismatch {
        /// Width and height of the candidate screenshot.
        candidate: (u32, u32),
        /// Width and height of the expected screenshot.
        expected:  (u32, u32),
    },
    /// A comparator failed unexpectedly.
    #[error("The {dimension} comparator failed: {message}")]
    ComparatorFailure {
        /// Name of the dimension whose comparator failed.
        dimension: String,
        /// What went wrong.
        message:   String,
    },
    /// Neither render produced an artifact.
    #[error(
        "No render artifact available: candidate failed with `{candidate}`, expected failed with \
         `{expected}`"
    )]
    NoArtifactAvailable {
        /// The candidate-side failure.
        candidate: Box<EngineError>,
        /// The expected-side failure.
        expected:  Box<EngineError>,
    },
    /// No render context became free before the acquisition deadline.
    #[error("No render context became available within {0:?}")]
    PoolExhausted(Duration),
}

impl EngineError {
    /// Whether this failure must end the evaluation instead of degrading a
    /// score.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::NoArtifactAvailable { .. } | EngineError::PoolExhausted(_))
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::RenderTimeout(_) => "render_timeout",
            EngineError::RenderCrash(_) => "render_crash",
            EngineError::DimensionMismatch { .. } => "dimension_mismatch",
            EngineError::ComparatorFailure { .. } => "comparator_failure",
            EngineError::NoArtifactAvailable { .. } => "no_artifact_available",
            EngineError::PoolExhausted(_) => "pool_exhausted",
        }
    }
}

/// An evaluation that ended in the `Failed` state.
#[derive(thiserror::Error, Debug, Clone)]
#[error("Evaluation failed while {state}: {error}")]
pub struct EvaluationFailure {
    /// State the pipeline was in when it failed.
    pub state: EvaluationState,
    /// The error that ended the run.
    #[source]
    pub error: EngineError,
}

impl EvaluationFailure {
    /// Re-evaluation recomputes everything from stored code, so every failed
    /// run may be retried.
    pub fn retryable(&self) -> bool {
        true
    }
}

/// Errors raised by challenge and submission storage backends.
#[derive(thiserror::Error, Debug)]
pub enum RepositoryError {
    /// No submission with the given id exists.
    #[error("Submission `{0}` could not be found.")]
    SubmissionNotFound(String),
    /// No challenge with the given id exists.
    #[error("Challenge `{0}` could not be found.")]
    ChallengeNotFound(String),
    /// Reading or writing the backing store failed.
    #[error("Storage I/O failed for `{path}`: {source}")]
    Io {
        /// Path that was being accessed.
        path:   String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A stored record could not be (de)serialized.
    #[error("Stored record `{path}` is not valid JSON: {source}")]
    Json {
        /// Path of the offending record.
        path:   String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors surfaced by [`crate::service::EvaluationService`].
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    /// Resolving or saving records failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    /// The evaluation itself failed.
    #[error(transparent)]
    Evaluation(#[from] EvaluationFailure),
}
