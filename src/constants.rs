#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Default viewport width in CSS pixels.
pub const VIEWPORT_WIDTH: u32 = 960;

/// Default viewport height in CSS pixels. 960×960 gives the 921,600-pixel
/// comparison basis.
pub const VIEWPORT_HEIGHT: u32 = 960;

/// Default weight of each dimension.
pub const DEFAULT_WEIGHT: f64 = 25.0;

/// Default minimum final score needed to pass.
pub const DEFAULT_OVERALL_MIN_SCORE: f64 = 70.0;

/// Default per-channel color delta (0-255) before two pixels count as
/// different.
pub const DEFAULT_PIXEL_TOLERANCE: u8 = 24;

/// Scores at or above this earn an encouragement item.
pub const HIGH_WATER_MARK: f64 = 90.0;

/// How many findings an improvement item quotes.
pub const FEEDBACK_TOP_N: usize = 3;

/// Marker attribute on nodes the engine injects into a document. Marked nodes
/// never appear in snapshots.
pub const INTERNAL_MARKER: &str = "data-grader-internal";

/// Attribute keys used purely for test instrumentation. They are stripped from
/// every snapshot.
pub const INSTRUMENTATION_ATTRIBUTES: &[&str] = &[
    "data-testid",
    "data-test-id",
    "data-test",
    "data-cy",
    "data-qa",
    INTERNAL_MARKER,
];

/// Tags whose subtrees carry no rendered structure.
pub const NON_RENDERING_TAGS: &[&str] = &["head", "meta", "link", "title", "base", "noscript"];

/// Tags whose text is source code or inert markup, never rendered text.
pub const TEXTLESS_TAGS: &[&str] = &["script", "style", "template", "noscript"];

/// Deepest element nesting kept in a snapshot, counted from `body`. Matches
/// the HTML parser limit browsers apply; anything deeper is cut off.
pub const MAX_DOM_DEPTH: usize = 512;

/// Script installed before any submitted code runs. Collects uncaught errors
/// and rejected promises so a broken script still yields a page.
pub const ERROR_HOOK_SCRIPT: &str = include_str!("scripts/error_hook.js");

/// Script evaluated after load. Returns the DOM snapshot as a flat pre-order
/// node list, the rendered text lines and any collected script errors as a
/// JSON string. `__MAX_DEPTH__` is replaced with the nesting limit.
pub const EXTRACTION_SCRIPT: &str = include_str!("scripts/extract.js");
