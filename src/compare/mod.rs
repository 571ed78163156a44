#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Per-dimension comparators. Every comparator is a pure function of its
//! inputs.

/// Rendered text comparison.
pub mod content;
/// Structural DOM comparison.
pub mod dom;
/// Strict validation of challenge-specific tags.
pub mod tag;
/// Pixel comparison.
pub mod visual;

pub use self::{
    content::compare_content,
    dom::{AlignMode, compare_dom, compare_dom_with},
    tag::compare_tags,
    visual::{VisualComparison, compare_visual},
};
