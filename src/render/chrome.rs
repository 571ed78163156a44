#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    ffi::OsStr,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use headless_chrome::{
    Browser, LaunchOptions, Tab,
    protocol::cdp::{Page::CaptureScreenshotFormatOption, Target},
};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{
    DocumentSnapshot, FlatNode, KillSwitch, PixelBuffer, RenderArtifact, Renderer,
    SerializedNode, document, snapshot::collapse_whitespace,
};
use crate::{
    config::Viewport,
    constants::{EXTRACTION_SCRIPT, MAX_DOM_DEPTH},
    error::EngineError,
    types::{CodeBundle, RenderError},
};

/// What the extraction script hands back.
#[derive(Debug, Deserialize)]
struct Extraction {
    /// Pre-order snapshot of `body`.
    #[serde(default)]
    nodes:     Vec<FlatNode>,
    /// Whether the script stopped descending at the depth limit.
    #[serde(default)]
    truncated: bool,
    /// `innerText` split into lines.
    #[serde(default)]
    text:      Vec<String>,
    /// Errors collected by the error hook.
    #[serde(default)]
    errors:    Vec<RenderError>,
}

/// Turns the extraction script's JSON into an artifact without a screenshot.
fn decode_extraction(json: &str) -> Result<RenderArtifact, EngineError> {
    let extraction: Extraction = serde_json::from_str(json)
        .map_err(|e| EngineError::RenderCrash(format!("Extraction was not valid JSON: {e}")))?;

    let mut render_errors = extraction.errors;
    let dom_tree = if extraction.nodes.is_empty() {
        SerializedNode::new("body")
    } else {
        let mut snapshot = DocumentSnapshot::assemble(extraction.nodes)
            .map_err(|e| EngineError::RenderCrash(format!("Extraction was malformed: {e:#}")))?;
        snapshot.truncated |= extraction.truncated;
        render_errors.extend(snapshot.depth_error());
        snapshot.root.normalized()
    };
    let text_content = extraction
        .text
        .iter()
        .map(|line| collapse_whitespace(line))
        .filter(|line| !line.is_empty())
        .collect();

    Ok(RenderArtifact {
        dom_tree,
        screenshot: None,
        text_content,
        render_errors,
    })
}

/// The shared browser process and the viewport it was launched with.
struct Launched {
    /// Browser handle; cheap to clone.
    browser:  Browser,
    /// Tab in the default context, used to send browser-level commands.
    control:  Arc<Tab>,
    /// Window size used at launch.
    viewport: Viewport,
}

/// Renders in headless Chrome.
///
/// One browser process is shared; every render gets its own incognito browser
/// context and tab, which are disposed when the render ends so nothing a
/// script did survives into the next render.
pub struct ChromeRenderer {
    /// Chrome binary; `headless_chrome` discovers one when `None`.
    chrome_path: Option<PathBuf>,
    /// Whether to keep Chrome's own sandbox enabled.
    sandbox:     bool,
    /// Per-operation timeout applied to each tab.
    tab_timeout: Duration,
    /// Lazily launched browser.
    launched:    Mutex<Option<Launched>>,
}

impl ChromeRenderer {
    /// Creates a renderer; the browser starts on first use.
    pub fn new(chrome_path: Option<PathBuf>, sandbox: bool, tab_timeout: Duration) -> Self {
        Self {
            chrome_path,
            sandbox,
            tab_timeout,
            launched: Mutex::new(None),
        }
    }

    /// Returns the shared browser and its control tab, launching or
    /// relaunching as needed.
    fn browser(&self, viewport: Viewport) -> Result<(Browser, Arc<Tab>), EngineError> {
        let mut guard = self.launched.lock().expect("browser slot poisoned");
        if let Some(launched) = guard.as_ref()
            && launched.viewport == viewport
        {
            return Ok((launched.browser.clone(), Arc::clone(&launched.control)));
        }

        let options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(self.sandbox)
            .path(self.chrome_path.clone())
            .window_size(Some((viewport.width, viewport.height)))
            .idle_browser_timeout(Duration::from_secs(600))
            .args(vec![
                OsStr::new("--force-device-scale-factor=1"),
                OsStr::new("--force-color-profile=srgb"),
                OsStr::new("--font-render-hinting=none"),
                OsStr::new("--hide-scrollbars"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-extensions"),
                OsStr::new("--disable-background-networking"),
                OsStr::new("--disable-sync"),
                OsStr::new("--allow-file-access-from-files"),
            ])
            .build()
            .map_err(|e| EngineError::RenderCrash(format!("Invalid browser options: {e}")))?;

        debug!(?viewport, "launching headless browser");
        let browser = Browser::new(options)
            .map_err(|e| EngineError::RenderCrash(format!("Could not launch browser: {e}")))?;
        let control = browser
            .new_tab()
            .map_err(|e| EngineError::RenderCrash(format!("Could not open control tab: {e}")))?;
        *guard = Some(Launched {
            browser: browser.clone(),
            control: Arc::clone(&control),
            viewport,
        });
        Ok((browser, control))
    }

    /// Drops the shared browser so the next render relaunches it.
    fn forget_browser(&self) {
        self.launched.lock().expect("browser slot poisoned").take();
    }

    /// Loads the document into `tab` and extracts the artifact.
    fn render_in_tab(
        &self,
        tab: &Tab,
        bundle: &CodeBundle,
        viewport: Viewport,
    ) -> Result<RenderArtifact, EngineError> {
        let crash = |stage: &str| {
            let stage = stage.to_string();
            move |e: anyhow::Error| EngineError::RenderCrash(format!("{stage}: {e}"))
        };

        tab.set_default_timeout(self.tab_timeout);

        let file = tempfile::Builder::new()
            .prefix("webgrade-")
            .suffix(".html")
            .tempfile()
            .map_err(|e| EngineError::RenderCrash(format!("Could not create page file: {e}")))?;
        std::fs::write(file.path(), document::compose(bundle))
            .map_err(|e| EngineError::RenderCrash(format!("Could not write page file: {e}")))?;
        let url = format!("file://{}", file.path().display());

        tab.navigate_to(&url).map_err(crash("navigate"))?;
        tab.wait_until_navigated().map_err(crash("load"))?;

        let script = EXTRACTION_SCRIPT.replace("__MAX_DEPTH__", &MAX_DOM_DEPTH.to_string());
        let value = tab
            .evaluate(&script, false)
            .map_err(crash("extract"))?
            .value
            .ok_or_else(|| EngineError::RenderCrash("Extraction returned no value".into()))?;
        let json = value
            .as_str()
            .ok_or_else(|| EngineError::RenderCrash("Extraction returned non-string".into()))?;
        let mut artifact = decode_extraction(json)?;

        let png = tab
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(crash("screenshot"))?;
        let screenshot = PixelBuffer::from_png(&png)
            .map_err(|e| EngineError::RenderCrash(format!("{e:#}")))?
            .standardized(viewport);
        artifact.screenshot = Some(screenshot);

        Ok(artifact)
    }
}

/// Closes a render's tab, then disposes its browser context through the
/// control tab.
fn teardown(control: &Tab, tab: &Tab, context_id: &str) {
    if let Err(e) = tab.close(false) {
        debug!("closing tab failed: {e}");
    }
    if let Err(e) = control.call_method(Target::DisposeBrowserContext {
        browser_context_id: context_id.to_string(),
    }) {
        warn!(context_id, "disposing browser context failed: {e}");
    }
}

impl Renderer for ChromeRenderer {
    fn name(&self) -> &'static str {
        "chrome"
    }

    fn render(
        &self,
        bundle: &CodeBundle,
        viewport: Viewport,
        kill: &KillSwitch,
    ) -> Result<RenderArtifact, EngineError> {
        let (browser, control) = self.browser(viewport)?;
        let context = match browser.new_context() {
            Ok(context) => context,
            Err(e) => {
                warn!("browser unusable, relaunching on next render: {e}");
                self.forget_browser();
                return Err(EngineError::RenderCrash(format!("Could not open context: {e}")));
            }
        };
        let context_id = context.get_id().to_string();
        let tab: Arc<Tab> = context
            .new_tab()
            .map_err(|e| EngineError::RenderCrash(format!("Could not open tab: {e}")))?;

        {
            let control = Arc::clone(&control);
            let tab = Arc::clone(&tab);
            let context_id = context_id.clone();
            kill.arm(move || teardown(&control, &tab, &context_id));
        }

        let result = self.render_in_tab(&tab, bundle, viewport);
        kill.disarm();
        teardown(&control, &tab, &context_id);
        result
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn chain(depth: usize) -> String {
        let nodes: Vec<_> = (0..=depth)
            .map(|idx| {
                json!({
                    "parent": idx.checked_sub(1),
                    "tag": if idx == 0 { "BODY" } else { "DIV" },
                    "attributes": { "data-testid": format!("n{idx}") },
                    "textRuns": [format!("  level {idx} ")],
                })
            })
            .collect();
        json!({ "nodes": nodes, "text": ["level 0", " ", "level 1"], "errors": [] }).to_string()
    }

    #[test]
    fn deep_pages_decode_without_a_browser() {
        let artifact = decode_extraction(&chain(70)).expect("decode");
        assert_eq!(artifact.dom_tree.subtree_size(), 71);
        assert_eq!(artifact.dom_tree.tag, "body");
        assert!(artifact.dom_tree.attributes.is_empty(), "instrumentation is stripped");
        assert_eq!(artifact.dom_tree.children[0].text_runs, vec!["level 1"]);
        assert_eq!(artifact.text_content, vec!["level 0", "level 1"]);
        assert!(artifact.render_errors.is_empty());
        assert!(artifact.screenshot.is_none());
    }

    #[test]
    fn nesting_past_the_limit_is_cut_and_reported() {
        let artifact = decode_extraction(&chain(MAX_DOM_DEPTH + 100)).expect("decode");
        assert_eq!(artifact.dom_tree.subtree_size(), MAX_DOM_DEPTH + 1);
        assert_eq!(artifact.render_errors.len(), 1);
        assert_eq!(artifact.render_errors[0].stage, "snapshot");
    }

    #[test]
    fn script_side_truncation_is_reported() {
        let json = json!({
            "nodes": [{ "parent": null, "tag": "body" }],
            "truncated": true,
        })
        .to_string();
        let artifact = decode_extraction(&json).expect("decode");
        assert_eq!(artifact.render_errors.len(), 1);
    }

    #[test]
    fn empty_extraction_is_an_empty_body() {
        let artifact = decode_extraction("{}").expect("decode");
        assert_eq!(artifact.dom_tree, SerializedNode::new("body"));
        assert!(decode_extraction("not json").is_err());
    }
}
