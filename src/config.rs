#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    path::PathBuf,
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

use anyhow::{Context, Result};
use which::which;

use crate::{
    constants::{
        DEFAULT_OVERALL_MIN_SCORE, DEFAULT_PIXEL_TOLERANCE, VIEWPORT_HEIGHT, VIEWPORT_WIDTH,
    },
    types::Weights,
};

/// Fixed render resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    /// Width in pixels.
    pub width:  u32,
    /// Height in pixels.
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width:  VIEWPORT_WIDTH,
            height: VIEWPORT_HEIGHT,
        }
    }
}

impl Viewport {
    /// Parses `960x960`.
    fn parse(value: &str) -> Option<Self> {
        let (w, h) = value.trim().split_once(['x', 'X'])?;
        let width = w.trim().parse::<u32>().ok().filter(|w| *w > 0)?;
        let height = h.trim().parse::<u32>().ok().filter(|h| *h > 0)?;
        Some(Self { width, height })
    }

    /// Total number of pixels.
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Which render backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererKind {
    /// Headless Chrome.
    Chrome,
    /// Parse-only rendering without a browser.
    Static,
}

/// Every setting the evaluation engine consumes.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deadline for a single render.
    pub render_timeout:      Duration,
    /// How long an evaluation waits for a free render context.
    pub acquire_timeout:     Duration,
    /// Maximum number of concurrently open render contexts.
    pub pool_size:           usize,
    /// Render resolution.
    pub viewport:            Viewport,
    /// Per-channel delta before two pixels count as different.
    pub pixel_tolerance:     u8,
    /// Weights used when a challenge does not override them.
    pub default_weights:     Weights,
    /// Overall minimum used when a challenge does not override it.
    pub default_overall_min: f64,
    /// Where screenshots are written; `None` disables persistence.
    pub screenshot_dir:      Option<PathBuf>,
    /// Public URL prefix for stored screenshots.
    pub screenshot_base_url: String,
    /// Chrome executable; discovered on `PATH` when unset.
    pub chrome_path:         Option<PathBuf>,
    /// Keep Chrome's process sandbox on. Containers running as root need it
    /// off.
    pub chrome_sandbox:      bool,
    /// Render backend.
    pub renderer:            RendererKind,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            render_timeout:      Duration::from_secs(10),
            acquire_timeout:     Duration::from_secs(30),
            pool_size:           4,
            viewport:            Viewport::default(),
            pixel_tolerance:     DEFAULT_PIXEL_TOLERANCE,
            default_weights:     Weights::default(),
            default_overall_min: DEFAULT_OVERALL_MIN_SCORE,
            screenshot_dir:      None,
            screenshot_base_url: "/screenshots".to_string(),
            chrome_path:         None,
            chrome_sandbox:      true,
            renderer:            RendererKind::Chrome,
        }
    }
}

impl EngineConfig {
    /// Builds a configuration from `WEBGRADE_*` environment variables, falling
    /// back to defaults for anything unset or unparsable.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let default_weights = match std::env::var("WEBGRADE_WEIGHTS") {
            Ok(overrides) if !overrides.trim().is_empty() => {
                Weights::parse(&overrides).context("WEBGRADE_WEIGHTS is malformed")?
            }
            _ => defaults.default_weights,
        };

        let renderer = match std::env::var("WEBGRADE_RENDERER")
            .map(|s| s.trim().to_ascii_lowercase())
            .as_deref()
        {
            Ok("static") => RendererKind::Static,
            _ => RendererKind::Chrome,
        };

        let chrome_path = std::env::var("WEBGRADE_CHROME_PATH")
            .ok()
            .map(|s| PathBuf::from(s.trim()))
            .or_else(discover_chrome);

        Ok(Self {
            render_timeout: read_duration_ms("WEBGRADE_RENDER_TIMEOUT_MS", defaults.render_timeout),
            acquire_timeout: read_duration_ms(
                "WEBGRADE_ACQUIRE_TIMEOUT_MS",
                defaults.acquire_timeout,
            ),
            pool_size: read_parsed("WEBGRADE_POOL_SIZE", defaults.pool_size).max(1),
            viewport: std::env::var("WEBGRADE_VIEWPORT")
                .ok()
                .and_then(|v| Viewport::parse(&v))
                .unwrap_or(defaults.viewport),
            pixel_tolerance: read_parsed("WEBGRADE_PIXEL_TOLERANCE", defaults.pixel_tolerance),
            default_weights,
            default_overall_min: read_parsed(
                "WEBGRADE_OVERALL_MIN_SCORE",
                defaults.default_overall_min,
            )
            .clamp(0.0, 100.0),
            screenshot_dir: std::env::var("WEBGRADE_SCREENSHOT_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            screenshot_base_url: std::env::var("WEBGRADE_SCREENSHOT_BASE_URL")
                .map(|s| s.trim().trim_end_matches('/').to_owned())
                .unwrap_or(defaults.screenshot_base_url),
            chrome_path,
            chrome_sandbox: !matches!(
                std::env::var("WEBGRADE_CHROME_NO_SANDBOX").as_deref().map(str::trim),
                Ok("1") | Ok("true") | Ok("yes")
            ),
            renderer,
        })
    }

    /// Sets the render timeout.
    pub fn with_render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout = timeout;
        self
    }

    /// Sets the pool acquisition timeout.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Sets the number of render contexts.
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size.max(1);
        self
    }

    /// Sets the viewport.
    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = Viewport { width, height };
        self
    }

    /// Sets the default weights.
    pub fn with_default_weights(mut self, weights: Weights) -> Self {
        self.default_weights = weights;
        self
    }

    /// Enables screenshot persistence under `dir`.
    pub fn with_screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = Some(dir.into());
        self
    }

    /// Selects the render backend.
    pub fn with_renderer(mut self, renderer: RendererKind) -> Self {
        self.renderer = renderer;
        self
    }
}

/// Looks for a Chrome or Chromium binary on `PATH`.
pub fn discover_chrome() -> Option<PathBuf> {
    ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser", "chrome"]
        .iter()
        .find_map(|name| which(name).ok())
}

/// Parses an environment variable as milliseconds, falling back to `default`.
fn read_duration_ms(env: &str, default: Duration) -> Duration {
    std::env::var(env)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

/// Parses an environment variable, falling back to `default`.
fn read_parsed<T: std::str::FromStr>(env: &str, default: T) -> T {
    std::env::var(env)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Shared configuration handle.
#[derive(Clone)]
pub struct ConfigHandle(Arc<EngineConfig>);

impl std::ops::Deref for ConfigHandle {
    type Target = EngineConfig;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Global storage for the lazily constructed configuration.
static CONFIG_SLOT: OnceLock<Mutex<Option<Arc<EngineConfig>>>> = OnceLock::new();

/// Returns the mutex guarding the global configuration slot.
fn slot() -> &'static Mutex<Option<Arc<EngineConfig>>> {
    CONFIG_SLOT.get_or_init(|| Mutex::new(None))
}

/// Ensures the global configuration has been read from the environment and
/// returns a handle to it.
pub fn ensure_initialized() -> Result<ConfigHandle> {
    let mut guard = slot().lock().expect("config slot poisoned");
    if let Some(cfg) = guard.as_ref() {
        return Ok(ConfigHandle(Arc::clone(cfg)));
    }

    let cfg = Arc::new(EngineConfig::from_env()?);
    *guard = Some(Arc::clone(&cfg));
    Ok(ConfigHandle(cfg))
}

/// Replaces the global configuration, e.g. after CLI overrides.
pub fn install(config: EngineConfig) -> ConfigHandle {
    let cfg = Arc::new(config);
    *slot().lock().expect("config slot poisoned") = Some(Arc::clone(&cfg));
    ConfigHandle(cfg)
}
