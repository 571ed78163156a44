#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result, bail};
use itertools::Itertools;
use scraper::{ElementRef, Html, Node};
use serde::{Deserialize, Serialize};

use crate::{
    constants::{
        INSTRUMENTATION_ATTRIBUTES, INTERNAL_MARKER, MAX_DOM_DEPTH, NON_RENDERING_TAGS,
        TEXTLESS_TAGS,
    },
    types::RenderError,
};

/// Normalized tree representation of rendered markup.
///
/// Attributes are kept in a sorted map so attribute order never matters, and
/// text runs are whitespace-collapsed once [`SerializedNode::normalized`] has
/// been applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedNode {
    /// Lower-case tag name.
    pub tag:        String,
    /// Attributes, keyed by name.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Element children, in order.
    #[serde(default)]
    pub children:   Vec<SerializedNode>,
    /// Direct text children, in order.
    #[serde(default)]
    pub text_runs:  Vec<String>,
}

impl SerializedNode {
    /// Creates an element with no attributes, children or text.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Self::default()
        }
    }

    /// Adds an attribute.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Appends a child element.
    pub fn with_child(mut self, child: SerializedNode) -> Self {
        self.children.push(child);
        self
    }

    /// Appends a text run.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_runs.push(text.into());
        self
    }

    /// Returns a copy with instrumentation attributes stripped, engine-injected
    /// and non-rendering nodes removed, and text runs whitespace-collapsed with
    /// empty runs dropped.
    pub fn normalized(&self) -> SerializedNode {
        let mut nodes = Vec::new();
        let mut stack = vec![(self, None)];
        while let Some((node, parent)) = stack.pop() {
            let idx = nodes.len();
            nodes.push((parent, node.normalized_shallow()));
            stack.extend(
                node.children
                    .iter()
                    .rev()
                    .filter(|child| !child.attributes.contains_key(INTERNAL_MARKER))
                    .filter(|child| !NON_RENDERING_TAGS.contains(&child.tag.as_str()))
                    .map(|child| (child, Some(idx))),
            );
        }
        link(nodes).unwrap_or_default()
    }

    /// Normalizes this node alone, without children.
    fn normalized_shallow(&self) -> SerializedNode {
        let attributes = self
            .attributes
            .iter()
            .filter(|(key, _)| !is_instrumentation_key(key))
            .map(|(key, value)| {
                let key = key.to_ascii_lowercase();
                let value = if key == "class" {
                    collapse_whitespace(value)
                } else {
                    value.trim().to_string()
                };
                (key, value)
            })
            .collect();

        let text_runs = self
            .text_runs
            .iter()
            .map(|run| collapse_whitespace(run))
            .filter(|run| !run.is_empty())
            .collect();

        SerializedNode {
            tag: self.tag.to_ascii_lowercase(),
            attributes,
            children: Vec::new(),
            text_runs,
        }
    }

    /// Number of nodes in this subtree, including itself.
    pub fn subtree_size(&self) -> usize {
        let mut size = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            size += 1;
            stack.extend(node.children.iter());
        }
        size
    }

    /// The class list as a set.
    pub fn class_set(&self) -> BTreeSet<&str> {
        self.attributes
            .get("class")
            .map(|classes| classes.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// All direct text runs joined by single spaces.
    pub fn own_text(&self) -> String {
        self.text_runs.iter().join(" ")
    }

    /// Every rendered text run in the subtree, in document order. Script,
    /// style and template source is skipped.
    pub fn collect_text(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if TEXTLESS_TAGS.contains(&node.tag.as_str()) {
                continue;
            }
            out.extend(node.text_runs.iter().cloned());
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Subtrees whose root has `tag`, in document order. Matches nested inside
    /// a match are included.
    pub fn find_all(&self, tag: &str) -> Vec<&SerializedNode> {
        let tag = tag.trim().to_ascii_lowercase();
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.tag == tag {
                out.push(node);
            }
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Short opening-tag description such as `<div id="hero" class="a b">`.
    pub fn describe(&self) -> String {
        let mut out = format!("<{}", self.tag);
        for key in ["id", "class"] {
            if let Some(value) = self.attributes.get(key) {
                out.push_str(&format!(" {key}=\"{value}\""));
            }
        }
        out.push('>');
        out
    }
}

/// Attaches pre-order nodes to their parents, returning the root.
///
/// Every parent index must point at an earlier entry. Walking backwards
/// attaches each node after all of its descendants, so children are
/// collected in reverse and flipped once complete.
fn link(mut nodes: Vec<(Option<usize>, SerializedNode)>) -> Option<SerializedNode> {
    let mut root = None;
    for idx in (0..nodes.len()).rev() {
        let parent = nodes[idx].0;
        let mut node = std::mem::take(&mut nodes[idx].1);
        node.children.reverse();
        match parent {
            Some(parent) => nodes[parent].1.children.push(node),
            None => root = Some(node),
        }
    }
    root
}

/// Whether an attribute exists purely for test instrumentation.
fn is_instrumentation_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    INSTRUMENTATION_ATTRIBUTES.contains(&key.as_str()) || key.starts_with("data-grader-")
}

/// Collapses runs of whitespace into single spaces and trims the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().join(" ")
}

/// One element of a snapshot in pre-order, pointing at its parent by index.
///
/// The extraction script and the parse-time walk both emit this flat form so
/// that no decoder has to recurse once per nesting level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatNode {
    /// Index of the parent; `None` only for the root.
    #[serde(default)]
    pub parent:     Option<usize>,
    /// Tag name.
    pub tag:        String,
    /// Attributes, keyed by name.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Direct text children, in order.
    #[serde(default)]
    pub text_runs:  Vec<String>,
}

/// A snapshot tree and whether nesting past [`MAX_DOM_DEPTH`] was cut off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    /// Root of the tree, usually `body`.
    pub root:      SerializedNode,
    /// Whether elements were dropped for being nested too deeply.
    pub truncated: bool,
}

impl DocumentSnapshot {
    /// The render error recorded for a truncated snapshot.
    pub fn depth_error(&self) -> Option<RenderError> {
        self.truncated.then(|| {
            RenderError::new(
                "snapshot",
                format!("Elements nested deeper than {MAX_DOM_DEPTH} levels were ignored"),
            )
        })
    }

    /// Rebuilds a tree from pre-order nodes without recursion. Elements deeper
    /// than [`MAX_DOM_DEPTH`] below the root are dropped along with their
    /// subtrees.
    pub fn assemble(nodes: Vec<FlatNode>) -> Result<Self> {
        let mut linked = Vec::with_capacity(nodes.len());
        // Original index to position in `linked`, `None` once cut off.
        let mut kept: Vec<Option<usize>> = Vec::with_capacity(nodes.len());
        let mut depths: Vec<usize> = Vec::with_capacity(nodes.len());
        let mut truncated = false;

        for (idx, flat) in nodes.into_iter().enumerate() {
            let depth = match (idx, flat.parent) {
                (0, None) => 0,
                (_, Some(parent)) if parent < idx => depths[parent] + 1,
                _ => bail!("Snapshot node {idx} does not follow its parent"),
            };
            depths.push(depth);

            if depth > MAX_DOM_DEPTH {
                truncated = true;
                kept.push(None);
                continue;
            }
            let mut node = SerializedNode::new(flat.tag);
            node.attributes = flat.attributes;
            node.text_runs = flat.text_runs;
            kept.push(Some(linked.len()));
            linked.push((flat.parent.and_then(|p| kept[p]), node));
        }

        let root = link(linked).context("Snapshot has no root element")?;
        Ok(Self { root, truncated })
    }
}

/// Parses a document without executing it and returns its `body`.
///
/// This is the parse-time DOM: no scripts run and no styles apply. The
/// result is not normalized yet.
pub fn parse_document(html: &str) -> DocumentSnapshot {
    let document = Html::parse_document(html);
    let root = document.root_element();
    let body = root
        .children()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name().eq_ignore_ascii_case("body"))
        .unwrap_or(root);

    let mut nodes = Vec::new();
    let mut truncated = false;
    let mut stack: Vec<(ElementRef<'_>, Option<usize>, usize)> = vec![(body, None, 0)];
    while let Some((element, parent, depth)) = stack.pop() {
        let idx = nodes.len();
        let mut flat = FlatNode {
            parent,
            tag: element.value().name().to_string(),
            ..FlatNode::default()
        };
        for (key, value) in element.value().attrs() {
            flat.attributes.insert(key.to_string(), value.to_string());
        }
        let mut children = Vec::new();
        for child in element.children() {
            match child.value() {
                Node::Element(_) => children.extend(ElementRef::wrap(child)),
                Node::Text(text) => flat.text_runs.push(text.to_string()),
                _ => {}
            }
        }
        nodes.push(flat);

        if depth == MAX_DOM_DEPTH {
            truncated |= !children.is_empty();
            continue;
        }
        stack.extend(children.into_iter().rev().map(|child| (child, Some(idx), depth + 1)));
    }

    let mut snapshot = DocumentSnapshot::assemble(nodes).unwrap_or_else(|_| DocumentSnapshot {
        root:      SerializedNode::new("body"),
        truncated: false,
    });
    snapshot.truncated |= truncated;
    snapshot
}
