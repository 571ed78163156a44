#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::collections::BTreeSet;

use similar::{Algorithm, DiffOp, TextDiff, capture_diff_slices};

use crate::{
    render::SerializedNode,
    types::{Dimension, DimensionScore, Finding, FindingKind},
};

/// Local similarities within this distance of 1 count as identical.
const EPSILON: f64 = 1e-9;

/// How children are paired at each level of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlignMode {
    /// Tag-sequence alignment: an inserted or removed element does not shift
    /// every later sibling out of alignment, and differing runs are paired
    /// best-effort by position.
    #[default]
    Fuzzy,
    /// Positional, tag-for-tag alignment. A tag mismatch leaves both nodes
    /// unmatched.
    Strict,
}

/// One pairing decision between expected and candidate siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Expected child `0` aligned with candidate child `1`.
    Pair(usize, usize),
    /// Expected child with no counterpart.
    Missing(usize),
    /// Candidate child with no counterpart.
    Extra(usize),
}

/// Running totals of a tree comparison.
#[derive(Debug, Default)]
struct Tally {
    /// Sum of per-node similarities.
    total:    f64,
    /// Number of nodes scored, unmatched ones included.
    nodes:    usize,
    /// Findings in document order.
    findings: Vec<Finding>,
}

impl Tally {
    /// Mean similarity scaled to `[0, 100]`; two empty forests are identical.
    fn score(&self) -> f64 {
        if self.nodes == 0 {
            100.0
        } else {
            100.0 * self.total / self.nodes as f64
        }
    }

    /// Scores a whole unmatched subtree as zero.
    fn unmatched(&mut self, node: &SerializedNode, path: String, kind: FindingKind) {
        let size = node.subtree_size();
        self.nodes += size;
        let message = match kind {
            FindingKind::Missing => format!("Missing element {}", node.describe()),
            _ => format!("Unexpected element {}", node.describe()),
        };
        let message = if size > 1 {
            format!("{message} ({} elements including its children)", size)
        } else {
            message
        };
        self.findings.push(
            Finding::builder()
                .kind(kind)
                .message(message)
                .path(path)
                .impact(size as f64)
                .build(),
        );
    }
}

/// A comparison still to be made, in document order.
enum Task<'a> {
    /// Score a matched pair, then its children.
    Pair {
        /// Node from the expected tree.
        expected:  &'a SerializedNode,
        /// Node from the candidate tree.
        candidate: &'a SerializedNode,
        /// Path of the expected node.
        path:      String,
    },
    /// Score a subtree with no counterpart as zero.
    Unmatched {
        /// Root of the unmatched subtree.
        node: &'a SerializedNode,
        /// Path of the node.
        path: String,
        /// Missing or extra.
        kind: FindingKind,
    },
}

/// Structural similarity of two `body` snapshots. The roots themselves are
/// not scored.
pub fn compare_dom(candidate: &SerializedNode, expected: &SerializedNode) -> DimensionScore {
    compare_dom_with(candidate, expected, AlignMode::Fuzzy)
}

/// [`compare_dom`] with an explicit alignment mode.
pub fn compare_dom_with(
    candidate: &SerializedNode,
    expected: &SerializedNode,
    mode: AlignMode,
) -> DimensionScore {
    let mut tally = Tally::default();
    let mut stack = Vec::new();
    push_children(&expected.children, &candidate.children, &expected.tag, mode, &mut stack);
    walk(stack, mode, &mut tally);
    DimensionScore::new(Dimension::Structure, tally.score(), tally.findings)
}

/// Similarity of two subtrees including their roots, in `[0, 100]`, with the
/// findings that explain it. `path` names the expected root.
pub fn compare_subtrees(
    candidate: &SerializedNode,
    expected: &SerializedNode,
    mode: AlignMode,
    path: &str,
) -> (f64, Vec<Finding>) {
    let mut tally = Tally::default();
    if mode == AlignMode::Strict && candidate.tag != expected.tag {
        tally.unmatched(expected, path.to_string(), FindingKind::Missing);
        tally.unmatched(candidate, path.to_string(), FindingKind::Extra);
    } else {
        let task = Task::Pair {
            expected,
            candidate,
            path: path.to_string(),
        };
        walk(vec![task], mode, &mut tally);
    }
    (tally.score(), tally.findings)
}

/// Works through pending comparisons depth-first with an explicit stack.
fn walk<'a>(mut stack: Vec<Task<'a>>, mode: AlignMode, tally: &mut Tally) {
    while let Some(task) = stack.pop() {
        match task {
            Task::Pair {
                expected,
                candidate,
                path,
            } => {
                score_pair(expected, candidate, &path, tally);
                push_children(&expected.children, &candidate.children, &path, mode, &mut stack);
            }
            Task::Unmatched { node, path, kind } => tally.unmatched(node, path, kind),
        }
    }
}

/// Scores a matched pair on its own.
fn score_pair(expected: &SerializedNode, candidate: &SerializedNode, path: &str, tally: &mut Tally) {
    let local = local_similarity(candidate, expected);
    tally.total += local;
    tally.nodes += 1;

    if local < 1.0 - EPSILON {
        tally.findings.push(
            Finding::builder()
                .kind(FindingKind::Mismatch)
                .message(describe_mismatch(expected, candidate))
                .path(path.to_string())
                .impact(1.0 - local)
                .build(),
        );
    }
}

/// Aligns two sibling lists and queues their comparisons so that they pop
/// in document order.
fn push_children<'a>(
    expected: &'a [SerializedNode],
    candidate: &'a [SerializedNode],
    parent: &str,
    mode: AlignMode,
    stack: &mut Vec<Task<'a>>,
) {
    let tasks: Vec<Task<'a>> = align(expected, candidate, mode)
        .into_iter()
        .map(|step| match step {
            Step::Pair(e, c) => Task::Pair {
                expected:  &expected[e],
                candidate: &candidate[c],
                path:      child_path(parent, expected, e),
            },
            Step::Missing(e) => Task::Unmatched {
                node: &expected[e],
                path: child_path(parent, expected, e),
                kind: FindingKind::Missing,
            },
            Step::Extra(c) => Task::Unmatched {
                node: &candidate[c],
                path: child_path(parent, candidate, c),
                kind: FindingKind::Extra,
            },
        })
        .collect();
    stack.extend(tasks.into_iter().rev());
}

/// Decides which children correspond.
fn align(expected: &[SerializedNode], candidate: &[SerializedNode], mode: AlignMode) -> Vec<Step> {
    let mut steps = Vec::with_capacity(expected.len().max(candidate.len()));

    match mode {
        AlignMode::Strict => {
            for i in 0..expected.len().max(candidate.len()) {
                match (expected.get(i), candidate.get(i)) {
                    (Some(e), Some(c)) if e.tag == c.tag => steps.push(Step::Pair(i, i)),
                    (Some(_), Some(_)) => {
                        steps.push(Step::Missing(i));
                        steps.push(Step::Extra(i));
                    }
                    (Some(_), None) => steps.push(Step::Missing(i)),
                    (None, Some(_)) => steps.push(Step::Extra(i)),
                    (None, None) => {}
                }
            }
        }
        AlignMode::Fuzzy => {
            let expected_tags: Vec<&str> = expected.iter().map(|n| n.tag.as_str()).collect();
            let candidate_tags: Vec<&str> = candidate.iter().map(|n| n.tag.as_str()).collect();

            for op in capture_diff_slices(Algorithm::Myers, &expected_tags, &candidate_tags) {
                match op {
                    DiffOp::Equal {
                        old_index,
                        new_index,
                        len,
                    } => steps.extend((0..len).map(|k| Step::Pair(old_index + k, new_index + k))),
                    DiffOp::Delete {
                        old_index, old_len, ..
                    } => steps.extend((old_index..old_index + old_len).map(Step::Missing)),
                    DiffOp::Insert {
                        new_index, new_len, ..
                    } => steps.extend((new_index..new_index + new_len).map(Step::Extra)),
                    DiffOp::Replace {
                        old_index,
                        old_len,
                        new_index,
                        new_len,
                    } => {
                        let paired = old_len.min(new_len);
                        steps.extend((0..paired).map(|k| Step::Pair(old_index + k, new_index + k)));
                        steps.extend((old_index + paired..old_index + old_len).map(Step::Missing));
                        steps.extend((new_index + paired..new_index + new_len).map(Step::Extra));
                    }
                }
            }
        }
    }

    steps
}

/// `parent > tag`, or `parent > tag[n]` when siblings share the tag.
fn child_path(parent: &str, siblings: &[SerializedNode], index: usize) -> String {
    let tag = &siblings[index].tag;
    let same = siblings.iter().filter(|s| &s.tag == tag).count();
    if same > 1 {
        let nth = siblings[..=index].iter().filter(|s| &s.tag == tag).count();
        format!("{parent} > {tag}[{nth}]")
    } else {
        format!("{parent} > {tag}")
    }
}

/// Similarity of a single node pair in `[0, 1]`: the mean of tag equality,
/// attribute overlap and text similarity.
pub fn local_similarity(a: &SerializedNode, b: &SerializedNode) -> f64 {
    let tag = if a.tag == b.tag { 1.0 } else { 0.0 };
    (tag + attribute_similarity(a, b) + text_similarity(&a.own_text(), &b.own_text())) / 3.0
}

/// Jaccard overlap of attribute keys, averaged with the overlap of class
/// lists (as sets) when either side has classes.
fn attribute_similarity(a: &SerializedNode, b: &SerializedNode) -> f64 {
    let keys = jaccard(
        &a.attributes.keys().map(String::as_str).collect(),
        &b.attributes.keys().map(String::as_str).collect(),
    );
    let (classes_a, classes_b) = (a.class_set(), b.class_set());
    if classes_a.is_empty() && classes_b.is_empty() {
        keys
    } else {
        (keys + jaccard(&classes_a, &classes_b)) / 2.0
    }
}

/// Normalized character-level similarity; two empty texts are identical.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    f64::from(TextDiff::from_chars(a, b).ratio())
}

/// `|a ∩ b| / |a ∪ b|`, with two empty sets counting as identical.
pub fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Explains why a matched pair is not identical.
fn describe_mismatch(expected: &SerializedNode, candidate: &SerializedNode) -> String {
    let mut parts = Vec::new();

    if expected.tag != candidate.tag {
        parts.push(format!("expected <{}> but found <{}>", expected.tag, candidate.tag));
    }

    let missing: Vec<&str> = expected
        .attributes
        .keys()
        .filter(|k| !candidate.attributes.contains_key(*k))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        parts.push(format!("missing attribute(s) {}", missing.join(", ")));
    }
    let extra: Vec<&str> = candidate
        .attributes
        .keys()
        .filter(|k| !expected.attributes.contains_key(*k))
        .map(String::as_str)
        .collect();
    if !extra.is_empty() {
        parts.push(format!("unexpected attribute(s) {}", extra.join(", ")));
    }

    let (want, have) = (expected.class_set(), candidate.class_set());
    let missing_classes: Vec<&str> = want.difference(&have).copied().collect();
    if !missing_classes.is_empty() {
        parts.push(format!("missing class(es) {}", missing_classes.join(" ")));
    }
    let extra_classes: Vec<&str> = have.difference(&want).copied().collect();
    if !extra_classes.is_empty() {
        parts.push(format!("unexpected class(es) {}", extra_classes.join(" ")));
    }

    let (want, have) = (expected.own_text(), candidate.own_text());
    if want != have {
        parts.push(format!("text is \"{have}\" instead of \"{want}\""));
    }

    format!("{} differs: {}", expected.describe(), parts.join("; "))
}
