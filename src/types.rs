#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{collections::BTreeMap, fmt::Display, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::constants::{DEFAULT_OVERALL_MIN_SCORE, DEFAULT_WEIGHT};

/// The HTML/CSS/JS triple under evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
pub struct CodeBundle {
    /// Markup.
    #[serde(default)]
    pub html: String,
    /// Stylesheet.
    #[serde(default)]
    pub css:  String,
    /// Script.
    #[serde(default)]
    pub js:   String,
}

impl CodeBundle {
    /// Creates a bundle from its three parts.
    pub fn new(html: impl Into<String>, css: impl Into<String>, js: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            css:  css.into(),
            js:   js.into(),
        }
    }

    /// Whether all three parts are blank.
    pub fn is_empty(&self) -> bool {
        self.html.trim().is_empty() && self.css.trim().is_empty() && self.js.trim().is_empty()
    }

    /// Reads `index.html`, `style.css` and `script.js` from a directory.
    /// Missing files are treated as empty.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let read = |name: &str| -> Result<String> {
            let path = dir.join(name);
            if path.exists() {
                std::fs::read_to_string(&path)
                    .with_context(|| format!("Could not read {}", path.display()))
            } else {
                Ok(String::new())
            }
        };

        Ok(Self {
            html: read("index.html")?,
            css:  read("style.css")?,
            js:   read("script.js")?,
        })
    }
}

/// One scored axis of evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// DOM structure.
    Structure,
    /// Rendered pixels.
    Visual,
    /// Rendered text.
    Content,
    /// Challenge-specific tag rules.
    Tag,
}

impl Dimension {
    /// All dimensions, in reporting order.
    pub const ALL: [Dimension; 4] =
        [Dimension::Structure, Dimension::Visual, Dimension::Content, Dimension::Tag];

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Dimension::Structure => "Page structure",
            Dimension::Visual => "Visual appearance",
            Dimension::Content => "Text content",
            Dimension::Tag => "Required elements",
        }
    }
}

impl Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Dimension::Structure => "structure",
            Dimension::Visual => "visual",
            Dimension::Content => "content",
            Dimension::Tag => "tag",
        };
        write!(f, "{name}")
    }
}

/// Category of a structured finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// Present in the expected solution, absent from the candidate.
    Missing,
    /// Present in the candidate, absent from the expected solution.
    Extra,
    /// Present on both sides but different.
    Mismatch,
    /// A sub-check and its partial score.
    Check,
    /// A contained failure that zeroed or degraded the dimension.
    Error,
    /// Purely informational.
    Note,
}

/// A structured finding attached to a dimension score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Finding {
    /// Category of the finding.
    pub kind:    FindingKind,
    /// Human-readable description.
    pub message: String,
    /// Location in the document, if any (e.g. `body > main > ul[1]`).
    #[builder(default, setter(strip_option))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path:    Option<String>,
    /// How much this finding reduced the score; used to rank feedback.
    #[builder(default)]
    #[serde(default)]
    pub impact:  f64,
    /// Partial score for sub-checks, in `[0, 100]`.
    #[builder(default, setter(strip_option))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score:   Option<f64>,
    /// Weight of the sub-check within its dimension.
    #[builder(default, setter(strip_option))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight:  Option<f64>,
    /// Whether the sub-check passed.
    #[builder(default, setter(strip_option))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed:  Option<bool>,
}

impl Finding {
    /// Shorthand for an error finding.
    pub fn error(message: impl Into<String>) -> Self {
        Finding::builder()
            .kind(FindingKind::Error)
            .message(message)
            .build()
    }

    /// Shorthand for a note.
    pub fn note(message: impl Into<String>) -> Self {
        Finding::builder().kind(FindingKind::Note).message(message).build()
    }
}

/// The score for one dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    /// Which dimension this is.
    pub name:    Dimension,
    /// Score in `[0, 100]`.
    pub score:   f64,
    /// Weight in `[0, 100]`; zero excludes the dimension from the final score.
    pub weight:  f64,
    /// Whether the dimension met its minimum.
    pub passed:  bool,
    /// Structured findings.
    pub details: Vec<Finding>,
    /// Summary text for the content dimension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl DimensionScore {
    /// Creates an unweighted score; weight and pass state are assigned once
    /// thresholds are known.
    pub fn new(name: Dimension, score: f64, details: Vec<Finding>) -> Self {
        Self {
            name,
            score: clamp_score(score),
            weight: 0.0,
            passed: false,
            details,
            summary: None,
        }
    }

    /// A zero score carrying a single error finding.
    pub fn failed(name: Dimension, message: impl Into<String>) -> Self {
        Self::new(name, 0.0, vec![Finding::error(message)])
    }

    /// Attaches summary text.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Whether this dimension contributes to the final score.
    pub fn is_active(&self) -> bool {
        self.weight > 0.0
    }
}

/// Clamps a score into `[0, 100]`, mapping NaN to zero.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() { 0.0 } else { score.clamp(0.0, 100.0) }
}

/// Per-dimension weights. Active weights are rescaled to sum to 100 at the
/// evaluation boundary.
///
/// Dimensions left out of a serialized weight table get weight zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    /// Weight of the structure dimension.
    #[serde(default)]
    pub structure: f64,
    /// Weight of the visual dimension.
    #[serde(default)]
    pub visual:    f64,
    /// Weight of the content dimension.
    #[serde(default)]
    pub content:   f64,
    /// Weight of the tag dimension.
    #[serde(default)]
    pub tag:       f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            structure: DEFAULT_WEIGHT,
            visual:    DEFAULT_WEIGHT,
            content:   DEFAULT_WEIGHT,
            tag:       DEFAULT_WEIGHT,
        }
    }
}

impl Weights {
    /// Returns the weight configured for a dimension.
    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Structure => self.structure,
            Dimension::Visual => self.visual,
            Dimension::Content => self.content,
            Dimension::Tag => self.tag,
        }
    }

    /// Sets the weight for a dimension.
    pub fn set(&mut self, dimension: Dimension, weight: f64) {
        match dimension {
            Dimension::Structure => self.structure = weight,
            Dimension::Visual => self.visual = weight,
            Dimension::Content => self.content = weight,
            Dimension::Tag => self.tag = weight,
        }
    }

    /// Parses `structure:40,visual:60` style overrides. Unnamed dimensions get
    /// weight zero.
    pub fn parse(overrides: &str) -> Result<Self> {
        let mut weights = Weights {
            structure: 0.0,
            visual:    0.0,
            content:   0.0,
            tag:       0.0,
        };

        for pair in overrides.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = pair
                .split_once(':')
                .with_context(|| format!("Weight `{pair}` is not of the form name:value"))?;
            let dimension = match name.trim().to_ascii_lowercase().as_str() {
                "structure" | "dom" => Dimension::Structure,
                "visual" | "pixel" => Dimension::Visual,
                "content" | "text" => Dimension::Content,
                "tag" => Dimension::Tag,
                other => anyhow::bail!("Unknown dimension `{other}` in weights"),
            };
            let value = value
                .trim()
                .parse::<f64>()
                .with_context(|| format!("Weight for `{name}` is not a number"))?;
            anyhow::ensure!(
                (0.0..=100.0).contains(&value),
                "Weight for `{name}` must be between 0 and 100"
            );
            weights.set(dimension, value);
        }

        Ok(weights)
    }

    /// Rescales the weights of `active` dimensions to sum to 100 and zeroes the
    /// rest. If every active weight is zero the active dimensions share equally.
    pub fn normalized(&self, active: &[Dimension]) -> Weights {
        let mut out = Weights {
            structure: 0.0,
            visual:    0.0,
            content:   0.0,
            tag:       0.0,
        };
        let total: f64 = active.iter().map(|d| self.get(*d).max(0.0)).sum();

        for dimension in active {
            let weight = if total > 0.0 {
                self.get(*dimension).max(0.0) / total * 100.0
            } else {
                100.0 / active.len() as f64
            };
            out.set(*dimension, weight);
        }

        out
    }
}

/// Minimum scores required to pass.
///
/// A challenge may leave the overall minimum unset; the engine default is
/// filled in by [`Thresholds::resolved`] when an evaluation starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Thresholds {
    /// Minimum per dimension; dimensions not listed have no minimum.
    pub per_dimension:     BTreeMap<Dimension, f64>,
    /// Minimum final score, if the challenge sets one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_min_score: Option<f64>,
}

impl Thresholds {
    /// Overrides the overall minimum.
    pub fn with_overall(mut self, min: f64) -> Self {
        self.overall_min_score = Some(min);
        self
    }

    /// Adds a per-dimension minimum.
    pub fn with_dimension(mut self, dimension: Dimension, min: f64) -> Self {
        self.per_dimension.insert(dimension, min);
        self
    }

    /// Returns a copy with the overall minimum defaulted to `default_overall`
    /// when unset and every minimum clamped into `[0, 100]`.
    pub fn resolved(&self, default_overall: f64) -> Thresholds {
        Thresholds {
            per_dimension:     self
                .per_dimension
                .iter()
                .map(|(d, min)| (*d, clamp_score(*min)))
                .collect(),
            overall_min_score: Some(clamp_score(
                self.overall_min_score.unwrap_or(default_overall),
            )),
        }
    }

    /// The minimum final score, falling back to
    /// [`DEFAULT_OVERALL_MIN_SCORE`] when unset.
    pub fn overall_min(&self) -> f64 {
        self.overall_min_score.unwrap_or(DEFAULT_OVERALL_MIN_SCORE)
    }

    /// The minimum a single dimension is held to: its own if configured,
    /// otherwise the overall minimum.
    pub fn minimum_for(&self, dimension: Dimension) -> f64 {
        self.per_dimension
            .get(&dimension)
            .copied()
            .unwrap_or_else(|| self.overall_min())
    }
}

/// A coding challenge: the expected solution plus grading settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
#[builder(field_defaults(default, setter(into)))]
pub struct Challenge {
    /// Challenge identifier.
    #[serde(default)]
    pub id:               String,
    /// Reference solution.
    #[serde(default)]
    pub expected:         CodeBundle,
    /// Pass thresholds; engine defaults apply when absent.
    #[serde(default)]
    pub thresholds:       Option<Thresholds>,
    /// Weight overrides; engine defaults apply when absent.
    #[serde(default)]
    pub weights:          Option<Weights>,
    /// Tag names validated strictly by the tag dimension.
    #[serde(default)]
    pub tag_rules:        Vec<String>,
    /// Phrases the rendered text must contain.
    #[serde(default)]
    pub required_phrases: Vec<String>,
}

/// A learner's submission for a challenge.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
#[builder(field_defaults(default, setter(into)))]
pub struct Submission {
    /// Submission identifier.
    pub id:           String,
    /// Owning challenge.
    pub challenge_id: String,
    /// Candidate code.
    #[serde(default)]
    pub code:         CodeBundle,
}

/// A unified feedback entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedbackItem {
    /// Something the learner did well.
    Praise {
        /// Dimension being praised.
        dimension:   Dimension,
        /// Message for the learner.
        description: String,
        /// Score of the dimension.
        score:       f64,
    },
    /// Something to work on within a dimension.
    Improvement {
        /// Dimension that needs work.
        dimension:   Dimension,
        /// Message for the learner.
        description: String,
        /// The findings that cost the most points.
        details:     Vec<String>,
        /// Score of the dimension.
        score:       f64,
        /// Weight of the dimension.
        weight:      f64,
        /// Whether the dimension still met its minimum.
        passed:      bool,
    },
    /// A problem that happened while rendering the submission.
    RenderIssue {
        /// Pipeline stage that reported the problem.
        stage:       String,
        /// Message for the learner.
        description: String,
    },
    /// A message not tied to a single dimension.
    General {
        /// Message for the learner.
        description: String,
    },
}

impl FeedbackItem {
    /// The learner-facing text of this item.
    pub fn description(&self) -> &str {
        match self {
            FeedbackItem::Praise { description, .. }
            | FeedbackItem::Improvement { description, .. }
            | FeedbackItem::RenderIssue { description, .. }
            | FeedbackItem::General { description } => description,
        }
    }
}

/// Encouragement and improvement items returned with every result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    /// Things that went well.
    pub encouragement: Vec<FeedbackItem>,
    /// Things to work on.
    pub improvements:  Vec<FeedbackItem>,
}

/// A problem recorded while rendering one bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderError {
    /// Stage that reported it (e.g. `script`, `render`, `timeout`).
    pub stage:   String,
    /// Description.
    pub message: String,
}

impl RenderError {
    /// Creates a render error.
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage:   stage.into(),
            message: message.into(),
        }
    }
}

/// The outcome of one completed evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    /// Weighted final score in `[0, 100]`.
    pub final_score:              f64,
    /// Pass/fail verdict.
    pub passed:                   bool,
    /// Every dimension, including inactive ones kept for diagnostics.
    pub dimension_scores:         Vec<DimensionScore>,
    /// Feedback for the learner.
    pub feedback:                 Feedback,
    /// Reference to the diff overlay, if one was stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_screenshot_ref:      Option<String>,
    /// Reference to the candidate screenshot, if one was stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_screenshot_ref: Option<String>,
    /// Reference to the expected screenshot, if one was stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_screenshot_ref:  Option<String>,
    /// Problems recorded while rendering the candidate.
    #[serde(default)]
    pub render_errors:            Vec<RenderError>,
}

impl EvaluationResult {
    /// Looks up the score of one dimension.
    pub fn dimension(&self, dimension: Dimension) -> Option<&DimensionScore> {
        self.dimension_scores.iter().find(|d| d.name == dimension)
    }
}
