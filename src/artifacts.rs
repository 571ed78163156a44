#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::{config::EngineConfig, render::PixelBuffer};

/// References to the screenshots stored for one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredScreenshots {
    /// URL of the candidate screenshot.
    pub candidate: Option<String>,
    /// URL of the expected screenshot.
    pub expected:  Option<String>,
    /// URL of the diff overlay.
    pub diff:      Option<String>,
}

/// Writes screenshots to `<dir>/<key>/<name>.png` and hands back URLs under
/// a public base.
#[derive(Debug, Clone)]
pub struct ScreenshotStore {
    /// Root directory.
    dir:      PathBuf,
    /// URL prefix matching `dir`.
    base_url: String,
}

impl ScreenshotStore {
    /// Creates a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            dir:      dir.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// The store configured by `config`, if persistence is enabled.
    pub fn from_config(config: &EngineConfig) -> Option<Self> {
        config
            .screenshot_dir
            .as_ref()
            .map(|dir| Self::new(dir, config.screenshot_base_url.clone()))
    }

    /// Stores one image, returning its URL, or `None` after logging why it
    /// could not be written.
    pub async fn store(&self, key: &str, name: &str, image: PixelBuffer) -> Option<String> {
        let key = sanitize(key);
        let target = self.dir.join(&key).join(format!("{name}.png"));
        let url = format!("{}/{key}/{name}.png", self.base_url);

        let write_target = target.clone();
        let outcome = tokio::task::spawn_blocking(move || write_png(&write_target, &image)).await;
        match outcome {
            Ok(Ok(())) => {
                debug!(path = %target.display(), "stored screenshot");
                Some(url)
            }
            Ok(Err(e)) => {
                warn!(path = %target.display(), "could not store screenshot: {e:#}");
                None
            }
            Err(e) => {
                warn!(path = %target.display(), "screenshot writer did not finish: {e}");
                None
            }
        }
    }

    /// [`Self::store`] for an image that may not exist.
    async fn store_some(&self, key: &str, name: &str, image: Option<PixelBuffer>) -> Option<String> {
        match image {
            Some(image) => self.store(key, name, image).await,
            None => None,
        }
    }

    /// Stores whichever of the candidate, expected and diff images exist for
    /// `key`.
    pub async fn store_all(
        &self,
        key: &str,
        candidate: Option<PixelBuffer>,
        expected: Option<PixelBuffer>,
        diff: Option<PixelBuffer>,
    ) -> StoredScreenshots {
        let (candidate, expected, diff) = futures::join!(
            self.store_some(key, "candidate", candidate),
            self.store_some(key, "expected", expected),
            self.store_some(key, "diff", diff),
        );
        StoredScreenshots {
            candidate,
            expected,
            diff,
        }
    }
}

/// Encodes and atomically writes a PNG.
fn write_png(target: &Path, image: &PixelBuffer) -> Result<()> {
    let bytes = image.to_png()?;
    let parent = target
        .parent()
        .context("Screenshot path has no parent directory")?;
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Could not create {}", parent.display()))?;

    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Could not create a temporary file in {}", parent.display()))?;
    tmp.write_all(&bytes).context("Could not write screenshot")?;
    tmp.persist(target)
        .map_err(|e| e.error)
        .with_context(|| format!("Could not move screenshot into {}", target.display()))?;
    Ok(())
}

/// Keeps a key usable as a single path segment.
fn sanitize(key: &str) -> String {
    let cleaned: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() { "_".to_string() } else { cleaned }
}
