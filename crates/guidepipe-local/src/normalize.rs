//! Markup → chat-markdown rendering.
//!
//! Inline rendering keeps **bold**, *italic*, `code` and `[text](url)` links. Block rendering
//! only knows paragraphs and lists; everything else renders empty. The predicates below decide
//! what never reaches a summary: breadcrumbs, recipe/UI widgets, headings and stat lines.

use crate::markup::{Document, Element, Node, NodeId};
use url::Url;

/// Containers whose content is UI rather than prose.
pub const NON_PROSE_CLASSES: &[&str] = &[
    "crafting-recipe",
    "minecraft-text",
    "item-header",
    "glb-viewer",
    "glb-viewer-container",
];

const METADATA_PREFIXES: &[&str] = &["recipe:", "multiblock:"];

pub fn is_breadcrumb(el: &Element) -> bool {
    if el.tag == "nav" {
        return true;
    }
    let aria = el.attr("aria-label").unwrap_or("").to_lowercase();
    if aria.contains("breadcrumb") {
        return true;
    }
    el.attr("class")
        .unwrap_or("")
        .to_lowercase()
        .contains("breadcrumb")
}

pub fn is_non_prose_container(el: &Element) -> bool {
    NON_PROSE_CLASSES.iter().any(|c| el.has_class(c))
}

/// True if `id` or any ancestor is a recipe/UI container.
pub fn is_within_non_prose(doc: &Document, id: NodeId) -> bool {
    doc.closest(id, is_non_prose_container).is_some()
}

/// `Recipe: ...` / `Multiblock: ...` stat lines (case-insensitive).
pub fn is_metadata_line(text: &str) -> bool {
    let lc = text.trim_start().to_lowercase();
    METADATA_PREFIXES.iter().any(|p| lc.starts_with(p))
}

pub fn is_digits_only(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit())
}

pub fn is_prose_block(el: &Element) -> bool {
    matches!(el.tag.as_str(), "p" | "ul" | "ol")
}

/// Whether an element contributes a block to extracted text.
pub fn should_include(doc: &Document, id: NodeId) -> bool {
    let Some(el) = doc.element(id) else {
        return false;
    };
    if is_breadcrumb(el) || is_within_non_prose(doc, id) || el.is_heading() {
        return false;
    }
    is_prose_block(el)
}

/// Maps an `href` to the absolute target a rendered link points at.
pub trait ResolveLink {
    fn resolve_link(&self, href: &str) -> Option<String>;
}

/// Plain join against a base URL; absolute `http(s)` hrefs pass through untouched.
impl ResolveLink for Url {
    fn resolve_link(&self, href: &str) -> Option<String> {
        if href.starts_with("http://") || href.starts_with("https://") {
            return Some(href.to_string());
        }
        self.join(href).ok().map(|u| u.to_string())
    }
}

/// Single-line rich text for the children of `id`.
pub fn to_inline(doc: &Document, id: NodeId, links: &dyn ResolveLink) -> String {
    let mut out = String::new();
    for &child in doc.children(id) {
        match doc.node(child) {
            Node::Text(t) => out.push_str(t),
            Node::Element(el) => match el.tag.as_str() {
                "br" => out.push('\n'),
                "strong" | "b" => {
                    let inner = to_inline(doc, child, links);
                    if !inner.is_empty() {
                        out.push_str(&format!("**{inner}**"));
                    }
                }
                "em" | "i" => {
                    let inner = to_inline(doc, child, links);
                    if !inner.is_empty() {
                        out.push_str(&format!("*{inner}*"));
                    }
                }
                "code" | "kbd" => {
                    // Zero-width space keeps embedded backticks from closing the span.
                    let inner = to_inline(doc, child, links).replace('`', "\u{200B}`");
                    if !inner.is_empty() {
                        out.push_str(&format!("`{inner}`"));
                    }
                }
                "a" => {
                    let href = el.attr("href").unwrap_or("").trim();
                    let inner = to_inline(doc, child, links);
                    let text = if inner.is_empty() {
                        href.to_string()
                    } else {
                        inner
                    };
                    match (!href.is_empty()).then(|| links.resolve_link(href)).flatten() {
                        Some(abs) => out.push_str(&format!("[{text}]({abs})")),
                        None => out.push_str(&text),
                    }
                }
                _ => out.push_str(&to_inline(doc, child, links)),
            },
            Node::Root => {}
        }
    }
    out
}

fn list_text(doc: &Document, id: NodeId, links: &dyn ResolveLink, ordered: bool) -> String {
    let mut lines = Vec::new();
    let items = doc
        .children(id)
        .iter()
        .copied()
        .filter(|&c| doc.element(c).is_some_and(|e| e.tag == "li"));
    for (i, li) in items.enumerate() {
        let t = to_inline(doc, li, links);
        let clean = t.trim();
        if clean.is_empty() {
            continue;
        }
        if ordered {
            lines.push(format!("{}. {clean}", i + 1));
        } else {
            lines.push(format!("- {clean}"));
        }
    }
    lines.join("\n")
}

/// Block text for `p`/`ul`/`ol`; empty for anything filtered or unsupported.
pub fn to_block(doc: &Document, id: NodeId, links: &dyn ResolveLink) -> String {
    let Some(el) = doc.element(id) else {
        return String::new();
    };
    if is_breadcrumb(el)
        || el.has_class("crafting-recipe-item-count")
        || is_within_non_prose(doc, id)
        || el.is_heading()
    {
        return String::new();
    }
    match el.tag.as_str() {
        "ul" => list_text(doc, id, links, false),
        "ol" => list_text(doc, id, links, true),
        "p" => {
            let t = to_inline(doc, id, links).trim().to_string();
            if is_metadata_line(&t) || is_digits_only(&t) {
                return String::new();
            }
            t
        }
        _ => String::new(),
    }
}
