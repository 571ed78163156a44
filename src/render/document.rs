#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use crate::{
    constants::{ERROR_HOOK_SCRIPT, INTERNAL_MARKER},
    types::CodeBundle,
};

/// Builds the document rendered for `bundle`.
///
/// The error hook goes first in `<head>`, followed by the bundle's stylesheet.
/// The bundle's script runs last in `<body>`. Injected elements carry
/// [`INTERNAL_MARKER`]. Fragments are wrapped in a standards-mode document;
/// full documents keep their own `<html>`/`<head>`/`<body>`.
pub fn compose(bundle: &CodeBundle) -> String {
    let head_inject = format!(
        "<script {INTERNAL_MARKER}>{}</script><style {INTERNAL_MARKER}>{}</style>",
        escape_closing(ERROR_HOOK_SCRIPT, "script"),
        escape_closing(&bundle.css, "style"),
    );
    let body_inject = if bundle.js.trim().is_empty() {
        String::new()
    } else {
        format!("<script {INTERNAL_MARKER}>{}</script>", escape_closing(&bundle.js, "script"))
    };

    let html = bundle.html.as_str();
    let lower = html.to_ascii_lowercase();

    if !lower.contains("<html") && !lower.contains("<head") && !lower.contains("<body") {
        return format!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\">{head_inject}</head><body>{html}{body_inject}</body></html>"
        );
    }

    let mut doc = html.to_string();

    if let Some(at) = open_tag_end(&lower, "<head") {
        doc.insert_str(at, &head_inject);
    } else if let Some(at) = open_tag_end(&lower, "<html") {
        doc.insert_str(at, &format!("<head>{head_inject}</head>"));
    } else {
        doc.insert_str(0, &format!("<head>{head_inject}</head>"));
    }

    let lower = doc.to_ascii_lowercase();
    match lower.rfind("</body") {
        Some(at) => doc.insert_str(at, &body_inject),
        None => doc.push_str(&body_inject),
    }

    if !lower.trim_start().starts_with("<!doctype") {
        doc.insert_str(0, "<!DOCTYPE html>");
    }

    doc
}

/// Byte offset just past the `>` of the first `tag` opening tag, e.g.
/// `<head lang="en">`. Skips longer names sharing the prefix (`<header>`).
fn open_tag_end(lower: &str, tag: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(found) = lower[from..].find(tag) {
        let start = from + found;
        let after = start + tag.len();
        match lower.as_bytes().get(after) {
            Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') | Some(b'/') => {
                return lower[after..].find('>').map(|gt| after + gt + 1);
            }
            _ => from = after,
        }
    }
    None
}

/// Prevents embedded code from closing its own element early.
fn escape_closing(code: &str, tag: &str) -> String {
    let needle = format!("</{tag}");
    let mut out = String::with_capacity(code.len());
    let lower = code.to_ascii_lowercase();
    let mut last = 0;
    for (idx, _) in lower.match_indices(&needle) {
        out.push_str(&code[last..idx]);
        out.push_str("<\\/");
        last = idx + 2;
    }
    out.push_str(&code[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_is_wrapped_in_standards_document() {
        let doc = compose(&CodeBundle::new("<h1>Hi</h1>", "h1{color:red}", "console.log(1)"));
        assert!(doc.starts_with("<!DOCTYPE html><html><head>"));
        let body = doc.find("<body>").expect("body");
        let style = doc.find("h1{color:red}").expect("style");
        let script = doc.find("console.log(1)").expect("script");
        assert!(style < body && body < script);
    }

    #[test]
    fn full_document_keeps_its_structure() {
        let html = "<!doctype html><html lang=\"en\"><head><title>T</title></head><body><header>x</header></body></html>";
        let doc = compose(&CodeBundle::new(html, "p{}", "let a = 1;"));
        assert_eq!(doc.matches("<body").count(), 1);
        assert_eq!(doc.to_ascii_lowercase().matches("<!doctype").count(), 1);
        let head_open = doc.find("<head>").expect("head");
        assert!(doc.find("p{}").expect("css") > head_open);
        assert!(doc.find("let a = 1;").expect("js") < doc.find("</body>").expect("close"));
    }

    #[test]
    fn header_is_not_mistaken_for_head() {
        assert_eq!(open_tag_end("<header><head>", "<head"), Some(14));
    }

    #[test]
    fn closing_tags_inside_code_are_escaped() {
        let doc = compose(&CodeBundle::new("", "", "document.write('</SCRIPT>')"));
        assert!(doc.contains("document.write('<\\/SCRIPT>')"));
    }
}
