#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Storage seam for challenges, submissions and results.
//!
//! The engine never persists anything itself; callers resolve ids through
//! these traits and save results back through them. Two backends are
//! provided: [`MemoryRepository`] for tests and embedding, and
//! [`FsRepository`] for a plain directory tree.

use std::{
    collections::HashMap,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;
use serde::Deserialize;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::{
    error::RepositoryError,
    types::{Challenge, CodeBundle, EvaluationResult, Submission, Thresholds, Weights},
};

/// Result type for storage operations.
pub type RepoResult<T> = Result<T, RepositoryError>;

/// Read access to challenges.
#[async_trait]
pub trait ChallengeRepository: Send + Sync {
    /// Fetches a challenge by id.
    async fn fetch_challenge(&self, id: &str) -> RepoResult<Challenge>;
}

/// Access to submissions and their evaluation results.
#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    /// Fetches a submission by id.
    async fn fetch_submission(&self, id: &str) -> RepoResult<Submission>;

    /// Stores the result of evaluating a submission, replacing any previous
    /// one.
    async fn save_result(&self, id: &str, result: &EvaluationResult) -> RepoResult<()>;

    /// The most recently saved result, if any.
    async fn fetch_result(&self, id: &str) -> RepoResult<Option<EvaluationResult>>;
}

/// In-memory repository.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    /// Challenges by id.
    challenges:  Mutex<HashMap<String, Challenge>>,
    /// Submissions by id.
    submissions: Mutex<HashMap<String, Submission>>,
    /// Saved results by submission id.
    results:     Mutex<HashMap<String, EvaluationResult>>,
}

impl MemoryRepository {
    /// An empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a challenge.
    pub fn insert_challenge(&self, challenge: Challenge) {
        self.challenges
            .lock()
            .expect("challenge map poisoned")
            .insert(challenge.id.clone(), challenge);
    }

    /// Adds or replaces a submission.
    pub fn insert_submission(&self, submission: Submission) {
        self.submissions
            .lock()
            .expect("submission map poisoned")
            .insert(submission.id.clone(), submission);
    }
}

#[async_trait]
impl ChallengeRepository for MemoryRepository {
    async fn fetch_challenge(&self, id: &str) -> RepoResult<Challenge> {
        self.challenges
            .lock()
            .expect("challenge map poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::ChallengeNotFound(id.to_string()))
    }
}

#[async_trait]
impl SubmissionRepository for MemoryRepository {
    async fn fetch_submission(&self, id: &str) -> RepoResult<Submission> {
        self.submissions
            .lock()
            .expect("submission map poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::SubmissionNotFound(id.to_string()))
    }

    async fn save_result(&self, id: &str, result: &EvaluationResult) -> RepoResult<()> {
        if !self
            .submissions
            .lock()
            .expect("submission map poisoned")
            .contains_key(id)
        {
            return Err(RepositoryError::SubmissionNotFound(id.to_string()));
        }
        self.results
            .lock()
            .expect("result map poisoned")
            .insert(id.to_string(), result.clone());
        Ok(())
    }

    async fn fetch_result(&self, id: &str) -> RepoResult<Option<EvaluationResult>> {
        Ok(self
            .results
            .lock()
            .expect("result map poisoned")
            .get(id)
            .cloned())
    }
}

/// Settings stored in `challenge.json`. Code may be embedded or live in an
/// `expected/` directory next to it; files win.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ChallengeRecord {
    /// Embedded reference solution.
    expected:         CodeBundle,
    /// Pass thresholds.
    thresholds:       Option<Thresholds>,
    /// Weight overrides.
    weights:          Option<Weights>,
    /// Tag rules.
    tag_rules:        Vec<String>,
    /// Required phrases.
    required_phrases: Vec<String>,
}

/// Settings stored in `submission.json`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SubmissionRecord {
    /// Owning challenge.
    challenge_id: String,
    /// Embedded candidate code.
    code:         CodeBundle,
}

/// Directory-tree repository:
///
/// ```text
/// <root>/challenges/<id>/challenge.json
/// <root>/challenges/<id>/expected/{index.html,style.css,script.js}
/// <root>/submissions/<id>/submission.json
/// <root>/submissions/<id>/{index.html,style.css,script.js}
/// <root>/submissions/<id>/result.json
/// ```
#[derive(Debug, Clone)]
pub struct FsRepository {
    /// Root of the tree.
    root: PathBuf,
}

impl FsRepository {
    /// A repository rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<root>/<kind>/<id>`, or `None` for ids that are not a single plain
    /// path segment.
    fn record_dir(&self, kind: &str, id: &str) -> Option<PathBuf> {
        let valid = !id.is_empty()
            && id != "."
            && id != ".."
            && !id.contains(['/', '\\'])
            && !id.contains('\0');
        valid.then(|| self.root.join(kind).join(id))
    }
}

/// Reads a file, mapping "not found" to `None`.
async fn read_optional(path: &Path) -> RepoResult<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(RepositoryError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Parses an optional JSON record, defaulting when absent.
async fn read_record<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> RepoResult<T> {
    match read_optional(path).await? {
        Some(json) => serde_json::from_str(&json).map_err(|source| RepositoryError::Json {
            path: path.display().to_string(),
            source,
        }),
        None => Ok(T::default()),
    }
}

/// Overlays `index.html`, `style.css` and `script.js` from `dir` onto
/// `bundle`.
async fn overlay_code(dir: &Path, mut bundle: CodeBundle) -> RepoResult<CodeBundle> {
    if let Some(html) = read_optional(&dir.join("index.html")).await? {
        bundle.html = html;
    }
    if let Some(css) = read_optional(&dir.join("style.css")).await? {
        bundle.css = css;
    }
    if let Some(js) = read_optional(&dir.join("script.js")).await? {
        bundle.js = js;
    }
    Ok(bundle)
}

#[async_trait]
impl ChallengeRepository for FsRepository {
    async fn fetch_challenge(&self, id: &str) -> RepoResult<Challenge> {
        let dir = self
            .record_dir("challenges", id)
            .filter(|dir| dir.is_dir())
            .ok_or_else(|| RepositoryError::ChallengeNotFound(id.to_string()))?;

        let record: ChallengeRecord = read_record(&dir.join("challenge.json")).await?;
        let expected = overlay_code(&dir.join("expected"), record.expected).await?;

        Ok(Challenge {
            id: id.to_string(),
            expected,
            thresholds: record.thresholds,
            weights: record.weights,
            tag_rules: record.tag_rules,
            required_phrases: record.required_phrases,
        })
    }
}

#[async_trait]
impl SubmissionRepository for FsRepository {
    async fn fetch_submission(&self, id: &str) -> RepoResult<Submission> {
        let dir = self
            .record_dir("submissions", id)
            .filter(|dir| dir.is_dir())
            .ok_or_else(|| RepositoryError::SubmissionNotFound(id.to_string()))?;

        let record: SubmissionRecord = read_record(&dir.join("submission.json")).await?;
        let code = overlay_code(&dir, record.code).await?;

        Ok(Submission {
            id: id.to_string(),
            challenge_id: record.challenge_id,
            code,
        })
    }

    async fn save_result(&self, id: &str, result: &EvaluationResult) -> RepoResult<()> {
        let dir = self
            .record_dir("submissions", id)
            .filter(|dir| dir.is_dir())
            .ok_or_else(|| RepositoryError::SubmissionNotFound(id.to_string()))?;
        let target = dir.join("result.json");
        let json = serde_json::to_vec_pretty(result).map_err(|source| RepositoryError::Json {
            path: target.display().to_string(),
            source,
        })?;

        let io_error = |path: &Path| {
            let path = path.display().to_string();
            move |source: std::io::Error| RepositoryError::Io { path, source }
        };

        let write_target = target.clone();
        tokio::task::spawn_blocking(move || -> RepoResult<()> {
            let mut tmp = NamedTempFile::new_in(&dir).map_err(io_error(&dir))?;
            tmp.write_all(&json).map_err(io_error(tmp.path()))?;
            tmp.persist(&write_target)
                .map_err(|e| e.error)
                .map_err(io_error(&write_target))?;
            Ok(())
        })
        .await
        .map_err(|e| RepositoryError::Io {
            path:   target.display().to_string(),
            source: std::io::Error::other(e),
        })??;

        debug!(path = %target.display(), "saved evaluation result");
        Ok(())
    }

    async fn fetch_result(&self, id: &str) -> RepoResult<Option<EvaluationResult>> {
        let Some(dir) = self.record_dir("submissions", id) else {
            return Err(RepositoryError::SubmissionNotFound(id.to_string()));
        };
        let path = dir.join("result.json");
        match read_optional(&path).await? {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|source| RepositoryError::Json {
                    path: path.display().to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }
}
