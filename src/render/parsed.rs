#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use super::{KillSwitch, RenderArtifact, Renderer, document, snapshot};
use crate::{config::Viewport, error::EngineError, types::CodeBundle};

/// Renders without a browser: the DOM is extracted at parse time, scripts
/// never run, and no screenshot is taken.
#[derive(Debug, Default, Clone)]
pub struct StaticRenderer;

impl StaticRenderer {
    /// Creates the renderer.
    pub fn new() -> Self {
        Self
    }
}

impl Renderer for StaticRenderer {
    fn name(&self) -> &'static str {
        "static"
    }

    fn render(
        &self,
        bundle: &CodeBundle,
        _viewport: Viewport,
        _kill: &KillSwitch,
    ) -> Result<RenderArtifact, EngineError> {
        let snapshot = snapshot::parse_document(&document::compose(bundle));
        Ok(RenderArtifact::from_snapshot(snapshot, None))
    }
}
