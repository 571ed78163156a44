//! # webgrade
//!
//! Grades HTML/CSS/JS challenge submissions against a reference solution.
//! Both bundles are rendered in isolated browser contexts, compared on
//! structure, pixels, text and challenge-specific tags, and combined into a
//! weighted verdict with feedback for the learner.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Combines dimension scores into a final verdict
pub mod aggregate;
/// Screenshot persistence
pub mod artifacts;
/// Per-dimension comparators
pub mod compare;
/// Engine configuration and its process-wide handle
pub mod config;
/// A module defining a bunch of constant values to be used throughout
pub mod constants;
/// Error types
pub mod error;
/// Rule-based feedback generation
pub mod feedback;
/// The evaluation pipeline
pub mod orchestrator;
/// Render backends and the render pool
pub mod render;
/// Tables for terminal output
pub mod report;
/// Challenge and submission storage
pub mod repository;
/// HTTP surface
pub mod server;
/// Evaluation of stored submissions by id
pub mod service;
/// Data model shared across the engine
pub mod types;

pub use crate::{
    config::EngineConfig,
    error::{EngineError, EvaluationFailure, RepositoryError, ServiceError},
    orchestrator::{EvaluationState, Evaluator},
    service::EvaluationService,
    types::{
        Challenge, CodeBundle, Dimension, DimensionScore, EvaluationResult, Feedback,
        FeedbackItem, Submission, Thresholds, Weights,
    },
};
