#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Headless Chrome backend.
pub mod chrome;
/// Builds the single HTML document rendered for a bundle.
pub mod document;
/// Parse-only backend.
pub mod parsed;
/// Bounded pool of render contexts.
pub mod pool;
/// DOM snapshots and their normalization.
pub mod snapshot;

use std::{
    io::Cursor,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use anyhow::{Context, Result};
use image::{ImageFormat, RgbaImage, imageops};
use serde::{Deserialize, Serialize};

pub use self::{
    chrome::ChromeRenderer,
    parsed::StaticRenderer,
    pool::{PoolStats, RenderPool},
    snapshot::{DocumentSnapshot, FlatNode, SerializedNode},
};
use crate::{
    config::{EngineConfig, RendererKind, Viewport},
    error::EngineError,
    types::{CodeBundle, RenderError},
};

/// An RGBA screenshot.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBuffer {
    /// Width in pixels.
    width:  u32,
    /// Height in pixels.
    height: u32,
    /// Row-major RGBA bytes.
    data:   Vec<u8>,
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PixelBuffer({}x{})", self.width, self.height)
    }
}

impl PixelBuffer {
    /// Wraps raw RGBA bytes; `None` if the length does not match.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        (data.len() as u64 == u64::from(width) * u64::from(height) * 4).then_some(Self {
            width,
            height,
            data,
        })
    }

    /// A zero-valued (transparent black) buffer.
    pub fn blank(width: u32, height: u32) -> Self {
        Self::filled(width, height, [0, 0, 0, 0])
    }

    /// A buffer of a single color.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let count = width as usize * height as usize;
        let mut data = Vec::with_capacity(count * 4);
        for _ in 0..count {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Width and height.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Total pixel count.
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// The pixel at `(x, y)`. Panics when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y as usize * self.width as usize) + x as usize) * 4;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2], self.data[idx + 3]]
    }

    /// Overwrites the pixel at `(x, y)`. Panics when out of bounds.
    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let idx = ((y as usize * self.width as usize) + x as usize) * 4;
        self.data[idx..idx + 4].copy_from_slice(&rgba);
    }

    /// Paints a filled rectangle, clipped to the buffer.
    pub fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, rgba: [u8; 4]) {
        for yy in y..y.saturating_add(height).min(self.height) {
            for xx in x..x.saturating_add(width).min(self.width) {
                self.put_pixel(xx, yy, rgba);
            }
        }
    }

    /// Decodes a PNG.
    pub fn from_png(bytes: &[u8]) -> Result<Self> {
        let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)
            .context("Could not decode PNG screenshot")?
            .to_rgba8();
        Ok(Self::from(img))
    }

    /// Encodes as PNG.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let img = RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .context("Pixel buffer does not match its dimensions")?;
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png)
            .context("Could not encode PNG")?;
        Ok(out.into_inner())
    }

    /// Crops or pads (with opaque white) to exactly `viewport`.
    pub fn standardized(self, viewport: Viewport) -> Self {
        if self.dimensions() == (viewport.width, viewport.height) {
            return self;
        }
        let Some(source) = RgbaImage::from_raw(self.width, self.height, self.data) else {
            return Self::filled(viewport.width, viewport.height, [255, 255, 255, 255]);
        };
        let mut canvas =
            RgbaImage::from_pixel(viewport.width, viewport.height, image::Rgba([255; 4]));
        imageops::replace(&mut canvas, &source, 0, 0);
        Self::from(canvas)
    }
}

impl From<RgbaImage> for PixelBuffer {
    fn from(img: RgbaImage) -> Self {
        Self {
            width:  img.width(),
            height: img.height(),
            data:   img.into_raw(),
        }
    }
}

/// Everything a render produced for one bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderArtifact {
    /// Normalized DOM snapshot rooted at `body`.
    pub dom_tree:      SerializedNode,
    /// Screenshot at the configured viewport; `None` when the backend cannot
    /// take one.
    pub screenshot:    Option<PixelBuffer>,
    /// Rendered text, in document order.
    pub text_content:  Vec<String>,
    /// Problems recorded while rendering.
    pub render_errors: Vec<RenderError>,
}

impl RenderArtifact {
    /// The artifact substituted for a side whose render failed: an empty body,
    /// no text and a zero-valued screenshot.
    pub fn empty(viewport: Viewport, error: RenderError) -> Self {
        Self {
            dom_tree:      SerializedNode::new("body"),
            screenshot:    Some(PixelBuffer::blank(viewport.width, viewport.height)),
            text_content:  Vec::new(),
            render_errors: vec![error],
        }
    }

    /// Builds an artifact from a snapshot, deriving text from its runs.
    pub fn from_snapshot(snapshot: DocumentSnapshot, screenshot: Option<PixelBuffer>) -> Self {
        let render_errors = snapshot.depth_error().into_iter().collect();
        let dom_tree = snapshot.root.normalized();
        let text_content = dom_tree.collect_text();
        Self {
            dom_tree,
            screenshot,
            text_content,
            render_errors,
        }
    }
}

/// Lets a render pool tear a context down from outside the render thread.
#[derive(Clone, Default)]
pub struct KillSwitch {
    /// Set once the switch has fired.
    fired:    Arc<AtomicBool>,
    /// Teardown registered by the renderer for its current context.
    teardown: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>,
}

impl KillSwitch {
    /// Creates an unarmed switch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the teardown for the context in use. If the switch already
    /// fired, the teardown runs immediately.
    pub fn arm(&self, teardown: impl FnOnce() + Send + 'static) {
        if self.is_fired() {
            teardown();
            return;
        }
        *self.teardown.lock().expect("kill switch poisoned") = Some(Box::new(teardown));
    }

    /// Clears the registered teardown once the context has been released
    /// normally.
    pub fn disarm(&self) {
        self.teardown.lock().expect("kill switch poisoned").take();
    }

    /// Fires the switch, running the registered teardown at most once.
    pub fn fire(&self) {
        self.fired.store(true, Ordering::SeqCst);
        let teardown = self.teardown.lock().expect("kill switch poisoned").take();
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    /// Whether the switch has fired.
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

/// A render backend. `render` blocks; the pool runs it on the blocking thread
/// pool and enforces the deadline.
pub trait Renderer: Send + Sync + 'static {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Renders `bundle` in a fresh, isolated context. Implementations must arm
    /// `kill` with a teardown that makes this call return promptly.
    fn render(
        &self,
        bundle: &CodeBundle,
        viewport: Viewport,
        kill: &KillSwitch,
    ) -> Result<RenderArtifact, EngineError>;
}

/// Builds the backend selected by `config`.
pub fn create_renderer(config: &EngineConfig) -> Arc<dyn Renderer> {
    match config.renderer {
        RendererKind::Chrome => Arc::new(ChromeRenderer::new(
            config.chrome_path.clone(),
            config.chrome_sandbox,
            config.render_timeout + Duration::from_secs(2),
        )),
        RendererKind::Static => Arc::new(StaticRenderer::new()),
    }
}
