//! Page → bounded chat artifact.
//!
//! A fragment lookup extracts the block run "owned" by one anchor (see [`Page::extract_section`]);
//! a plain page lookup renders an intro plus a table of contents merged under the shared
//! description budget. Everything here is pure: fetching happens in the caller.

use crate::locator::Locator;
use crate::markup::{Document, NodeId};
use crate::normalize::{is_breadcrumb, is_metadata_line, should_include, to_block, ResolveLink};
use crate::textprep::{is_denylisted_fragment, normalize_id};
use guidepipe_core::{
    truncate_with_ellipsis, PageArtifact, Section, TocItem, DEFAULT_TITLE, DESCRIPTION_BUDGET,
    TOC_CAP,
};
use url::Url;

/// Description used when nothing renderable survived extraction.
pub const EMPTY_DESCRIPTION: &str = "Open the page for details.";

/// Leading blocks this much longer than a title still count as a restatement of it.
const NEAR_DUPLICATE_SLACK: usize = 15;

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// A fetched, parsed guide page.
#[derive(Debug, Clone)]
pub struct Page {
    /// Canonical page URL (no fragment).
    pub url: String,
    pub doc: Document,
    locator: Locator,
    container_class: String,
}

impl Page {
    pub fn parse(html: &str, url: &str, locator: &Locator, container_class: &str) -> Self {
        Self {
            url: url.to_string(),
            doc: Document::parse(html),
            locator: locator.clone(),
            container_class: container_class.to_string(),
        }
    }

    /// Main prose container, if the page has one.
    pub fn content_root(&self) -> Option<NodeId> {
        self.doc.first_with_class(&self.container_class)
    }

    /// First `h1`, then first `h2`, then `<title>`, then the default title.
    pub fn title(&self) -> String {
        for tag in ["h1", "h2"] {
            if let Some(id) = self.doc.first_tag_within(self.doc.root(), tag) {
                let t = self.doc.text(id).trim().to_string();
                if !t.is_empty() {
                    return t;
                }
            }
        }
        self.doc
            .title_tag()
            .unwrap_or_else(|| DEFAULT_TITLE.to_string())
    }

    /// First `<img src>` inside `scope` (whole page when `None`), made absolute.
    pub fn first_image(&self, scope: Option<NodeId>) -> Option<String> {
        let scope = scope.unwrap_or(self.doc.root());
        let img = self.doc.first_tag_within(scope, "img")?;
        let src = self.doc.element(img)?.attr("src")?.trim();
        if src.is_empty() {
            return None;
        }
        if src.starts_with("http") {
            return Some(src.to_string());
        }
        let base = self.locator.content_base().ok()?;
        base.join(src).ok().map(|u| u.to_string())
    }

    /// Bounded text run owned by the element with id `fragment`.
    ///
    /// For a heading anchor the run is every following sibling up to the next heading of equal
    /// or lesser depth; deeper headings become `**bold**` lines. The scan also ends at the edge
    /// of the content container and at the first breadcrumb. Returns `None` for denylisted
    /// fragments and unknown ids.
    pub fn extract_section(&self, fragment: &str) -> Option<Section> {
        if fragment.is_empty() || is_denylisted_fragment(fragment) {
            return None;
        }
        let doc = &self.doc;
        let anchor = doc.find_by_id(fragment)?;
        let level = doc.element(anchor)?.heading_level();
        let container = doc.closest(anchor, |e| e.has_class(&self.container_class));

        let mut parts: Vec<String> = Vec::new();
        let mut joined_len = 0usize;
        let mut cursor = doc.next_element_sibling(anchor);
        while let Some(cur) = cursor {
            let Some(el) = doc.element(cur) else { break };
            let next = doc.next_element_sibling(cur);
            if let (Some(anchor_level), Some(l)) = (level, el.heading_level()) {
                if l <= anchor_level {
                    break;
                }
            }
            if container.is_some_and(|root| !doc.is_descendant_of(cur, root)) {
                break;
            }
            if is_breadcrumb(el) {
                break;
            }
            if el.is_heading() {
                let t = doc.text(cur).trim().to_string();
                if !t.is_empty() {
                    joined_len += char_len(&t) + 4 + if parts.is_empty() { 0 } else { 2 };
                    parts.push(format!("**{t}**"));
                }
                cursor = next;
                continue;
            }
            if should_include(doc, cur) {
                let t = to_block(doc, cur, self);
                if !t.is_empty() {
                    joined_len += char_len(&t) + if parts.is_empty() { 0 } else { 2 };
                    parts.push(t);
                }
            }
            cursor = next;
            if joined_len > DESCRIPTION_BUDGET {
                break;
            }
        }

        let raw_title = doc.text(anchor).trim().to_string();
        let title = if raw_title.is_empty() {
            fragment.to_string()
        } else {
            raw_title
        };
        let page_title = self.title();
        let description = dedupe_blocks(&parts, &title, &page_title).join("\n\n");

        let image = doc
            .parent(anchor)
            .and_then(|p| self.first_image(Some(p)))
            .or_else(|| self.first_image(None));

        Some(Section {
            title,
            description: truncate_with_ellipsis(&description, DESCRIPTION_BUDGET),
            image,
        })
    }

    /// Intro text for a page without a fragment.
    ///
    /// Prefers the section under the heading whose text is the page title; otherwise accumulates
    /// prose blocks from the content container until the next block would overflow the budget.
    pub fn extract_summary(&self, title: &str) -> String {
        let header = self
            .doc
            .elements()
            .find(|(id, e)| {
                matches!(e.tag.as_str(), "h1" | "h2" | "h3") && self.doc.text(*id).trim() == title
            })
            .and_then(|(_, e)| e.id().map(str::to_string));
        if let Some(id) = header.filter(|id| !is_denylisted_fragment(id)) {
            if let Some(section) = self.extract_section(&id) {
                if !section.description.is_empty() {
                    return section.description;
                }
            }
        }

        let scope = self.content_root().unwrap_or(self.doc.root());
        let mut blocks: Vec<String> = Vec::new();
        let mut used = 0usize;
        for (id, el) in self.doc.elements_within(scope) {
            if !matches!(el.tag.as_str(), "p" | "ul" | "ol") {
                continue;
            }
            let t = to_block(&self.doc, id, self);
            if t.is_empty() || is_metadata_line(&t) {
                continue;
            }
            let sep = if blocks.is_empty() { 0 } else { 2 };
            let add = sep + char_len(&t);
            if used + add > DESCRIPTION_BUDGET {
                break;
            }
            blocks.push(t);
            used += add;
        }
        truncate_with_ellipsis(&blocks.join("\n\n"), DESCRIPTION_BUDGET)
    }

    /// `h2`/`h3` headings with ids, minus the page title and denylisted anchors.
    pub fn build_toc(&self, title: &str) -> Vec<TocItem> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for (id, el) in self.doc.elements() {
            if out.len() >= TOC_CAP {
                break;
            }
            if !matches!(el.tag.as_str(), "h2" | "h3") {
                continue;
            }
            let Some(anchor) = el.id() else { continue };
            let text = self.doc.text(id).trim().to_string();
            if text.is_empty() || is_denylisted_fragment(anchor) || text == title {
                continue;
            }
            if !seen.insert(format!("{}#{}", normalize_id(&text), anchor)) {
                continue;
            }
            out.push(TocItem {
                url: format!("{}#{}", self.url, anchor),
                title: text,
            });
        }
        out
    }
}

/// Links resolve against the page itself, then go through the locator so in-guide targets
/// come out canonical (locale and `.html` applied, fragment kept).
impl ResolveLink for Page {
    fn resolve_link(&self, href: &str) -> Option<String> {
        let page_url = Url::parse(&self.url).ok()?;
        let joined = page_url.join(href).ok()?;
        Some(self.locator.canonicalize_link(&joined))
    }
}

/// Drop blocks that merely restate the section or page title, and repeats.
fn dedupe_blocks(parts: &[String], title: &str, page_title: &str) -> Vec<String> {
    let title_norm = normalize_id(title);
    let page_norm = normalize_id(page_title);
    let restates = |norm: &str, len: usize, t_norm: &str, t: &str| {
        !t_norm.is_empty() && norm.starts_with(t_norm) && len <= char_len(t) + NEAR_DUPLICATE_SLACK
    };

    let mut seen = std::collections::HashSet::new();
    let mut cleaned: Vec<String> = Vec::new();
    for block in parts {
        let pt = block.trim();
        if pt.is_empty() {
            continue;
        }
        let norm = normalize_id(pt);
        if norm == title_norm || norm == page_norm {
            continue;
        }
        let len = char_len(pt);
        if cleaned.is_empty()
            && (restates(&norm, len, &title_norm, title)
                || restates(&norm, len, &page_norm, page_title))
        {
            continue;
        }
        if !seen.insert(norm) {
            continue;
        }
        cleaned.push(pt.to_string());
    }
    cleaned
}

/// Append `- [title](url)` lines after `summary` while the whole stays within the budget.
pub fn assemble_description(summary: &str, toc: &[TocItem]) -> String {
    let mut out = summary.trim().to_string();
    let mut used = char_len(&out);
    let mut first = true;
    for item in toc {
        let line = format!("- [{}]({})", item.title, item.url);
        let sep = match (first, out.is_empty()) {
            (true, true) => "",
            (true, false) => "\n\n",
            (false, _) => "\n",
        };
        let add = sep.len() + char_len(&line);
        if used + add > DESCRIPTION_BUDGET {
            break;
        }
        out.push_str(sep);
        out.push_str(&line);
        used += add;
        first = false;
    }
    truncate_with_ellipsis(&out, DESCRIPTION_BUDGET)
}

/// Artifact for a page, or for one of its sections when `fragment` names one.
///
/// An unknown or denylisted fragment falls back to the page's table of contents.
pub fn build_page_artifact(page: &Page, fragment: Option<&str>) -> PageArtifact {
    let title = page.title();
    if let Some(f) = fragment {
        if let Some(section) = page.extract_section(f) {
            let description = if section.description.is_empty() {
                EMPTY_DESCRIPTION.to_string()
            } else {
                section.description
            };
            return PageArtifact {
                title: format!("{} — {}", section.title, title),
                url: format!("{}#{}", page.url, f),
                description: truncate_with_ellipsis(&description, DESCRIPTION_BUDGET),
                image: section.image,
                toc: Vec::new(),
            };
        }
    }

    let summary = match fragment {
        Some(_) => String::new(),
        None => page.extract_summary(&title),
    };
    let toc = page.build_toc(&title);
    let mut description = assemble_description(&summary, &toc);
    if description.is_empty() {
        description = EMPTY_DESCRIPTION.to_string();
    }
    PageArtifact {
        title,
        url: page.url.clone(),
        description,
        image: page.first_image(None),
        toc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_URL: &str = "https://guide.example/Field-Guide-Modern/en_us/tfg_ores.html";

    const ORES: &str = r#"<html><head><title>Ores | Field Guide</title></head><body>
<nav class="navbar" id="nav-primary"><a href="index.html">Home</a></nav>
<div class="container"><div class="row">
<div class="col-md-3"><p>Sidebar text</p></div>
<div class="col-md-9">
  <ol class="breadcrumb"><li>Home</li><li>Ores</li></ol>
  <h1 id="ores">Ores</h1>
  <p>Ores</p>
  <p>Ores are found in <b>veins</b> underground.</p>
  <img src="../_images/ore.png">
  <h2 id="copper">Copper</h2>
  <p>Copper short</p>
  <p>Native copper appears in <a href="tfg_ores/copper.html">shallow veins</a>.</p>
  <div class="crafting-recipe"><p>Recipe: 1x copper</p></div>
  <h3 id="copper-uses">Uses</h3>
  <ul><li>Tools</li><li>Bronze</li></ul>
  <p>42</p>
  <h2 id="tin">Tin</h2>
  <p>Tin is a <em>soft</em> metal mined from cassiterite.</p>
  <div class="glb-viewer" id="glb-viewer-1"><p>viewer</p></div>
  <h2 id="bd-theme-text">Theme</h2>
  <h3 id="copper">Copper</h3>
</div></div></div></body></html>"#;

    fn locator() -> Locator {
        Locator::new("https://guide.example/Field-Guide-Modern/", "en_us").unwrap()
    }

    fn page(html: &str) -> Page {
        Page::parse(html, PAGE_URL, &locator(), "col-md-9")
    }

    #[test]
    fn title_prefers_h1_then_h2_then_title_tag() {
        assert_eq!(page(ORES).title(), "Ores");
        assert_eq!(page("<h2>Second</h2>").title(), "Second");
        assert_eq!(page("<title>Tag</title><h1>  </h1>").title(), "Tag");
        assert_eq!(page("<p>x</p>").title(), DEFAULT_TITLE);
    }

    #[test]
    fn section_spans_until_same_level_heading() {
        let s = page(ORES).extract_section("copper").unwrap();
        assert_eq!(s.title, "Copper");
        assert_eq!(
            s.description,
            "Native copper appears in [shallow veins](https://guide.example/Field-Guide-Modern/en_us/tfg_ores/copper.html).\n\n**Uses**\n\n- Tools\n- Bronze"
        );
        assert_eq!(
            s.image.as_deref(),
            Some("https://guide.example/Field-Guide-Modern/_images/ore.png")
        );
    }

    #[test]
    fn links_on_subdirectory_pages_resolve_against_the_page() {
        let p = Page::parse(
            r##"<div class="col-md-9"><h1>Copper</h1>
            <p>See <a href="iron.html">iron</a> and <a href="../mechanics/crops.html">crops</a>.</p>
            <p>Jump to <a href="#native">native</a> or <a href="../tfg_ores">ores</a>.</p></div>"##,
            "https://guide.example/Field-Guide-Modern/en_us/tfg_ores/copper.html",
            &locator(),
            "col-md-9",
        );
        assert_eq!(
            p.extract_summary("Copper"),
            "See [iron](https://guide.example/Field-Guide-Modern/en_us/tfg_ores/iron.html) and \
             [crops](https://guide.example/Field-Guide-Modern/en_us/mechanics/crops.html).\n\n\
             Jump to [native](https://guide.example/Field-Guide-Modern/en_us/tfg_ores/copper.html#native) or \
             [ores](https://guide.example/Field-Guide-Modern/en_us/tfg_ores/index.html)."
        );
    }

    #[test]
    fn section_rejects_denylisted_and_unknown_fragments() {
        let p = page(ORES);
        assert!(p.extract_section("bd-theme-text").is_none());
        assert!(p.extract_section("glb-viewer-1").is_none());
        assert!(p.extract_section("missing").is_none());
        assert!(p.extract_section("").is_none());
    }

    #[test]
    fn section_stops_at_breadcrumb_and_falls_back_to_fragment_title() {
        let p = page(
            r#"<div class="col-md-9"><div><span id="a"></span><p>one</p><div class="breadcrumb">x</div><p>two</p></div><img src="https://cdn.test/i.png"></div>"#,
        );
        let s = p.extract_section("a").unwrap();
        assert_eq!(s.title, "a");
        assert_eq!(s.description, "one");
        // No image under the anchor's parent: page image is used.
        assert_eq!(s.image.as_deref(), Some("https://cdn.test/i.png"));
    }

    #[test]
    fn non_heading_anchor_keeps_headings_as_bold() {
        let p = page(r#"<h1>Page</h1><div><a id="x">X</a><h2>Sub</h2><p>body</p></div>"#);
        let s = p.extract_section("x").unwrap();
        assert_eq!(s.description, "**Sub**\n\nbody");
    }

    #[test]
    fn section_description_is_truncated_to_budget() {
        let mut html = String::from(r#"<h2 id="big">Big</h2>"#);
        for c in ['a', 'b', 'c', 'd', 'e', 'f'] {
            html.push_str(&format!("<p>{}</p>", c.to_string().repeat(1000)));
        }
        let s = page(&html).extract_section("big").unwrap();
        assert_eq!(s.description.chars().count(), DESCRIPTION_BUDGET);
        assert!(s.description.ends_with("..."));
        assert!(!s.description.contains('f'));
    }

    #[test]
    fn summary_prefers_title_section() {
        let p = page(ORES);
        let s = p.extract_summary("Ores");
        assert!(s.starts_with("Ores are found in **veins** underground."), "{s}");
        assert!(s.contains("**Tin**"));
        assert!(!s.contains("Recipe:"));
        assert!(!s.contains("viewer"));
        assert!(!s.contains("Sidebar"));
        assert_eq!(s.matches("**Copper**").count(), 1);
    }

    #[test]
    fn summary_scans_container_and_stops_before_overflow() {
        let p = page(
            r#"<div class="col-md-9"><h1>Crops</h1><p>Recipe: x</p><p>Para one.</p><ul><li>a</li></ul></div><p>outside</p>"#,
        );
        assert_eq!(p.extract_summary("Crops"), "Para one.\n\n- a");

        let html = format!("<p>{}</p><p>{}</p>", "a".repeat(3000), "b".repeat(3000));
        let s = page(&html).extract_summary("none");
        assert_eq!(s, "a".repeat(3000));
    }

    #[test]
    fn toc_dedupes_and_skips_title_and_denylisted() {
        let toc = page(ORES).build_toc("Ores");
        let titles: Vec<&str> = toc.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Copper", "Uses", "Tin"]);
        assert_eq!(toc[0].url, format!("{PAGE_URL}#copper"));
    }

    #[test]
    fn toc_is_capped() {
        let html: String = (0..80)
            .map(|i| format!(r#"<h2 id="s{i}">Section {i}</h2>"#))
            .collect();
        assert_eq!(page(&html).build_toc("x").len(), TOC_CAP);
    }

    #[test]
    fn assemble_drops_overflowing_toc_lines_whole() {
        let toc: Vec<TocItem> = (0..3)
            .map(|i| TocItem {
                title: format!("T{i}"),
                url: format!("u{i}"),
            })
            .collect();
        assert_eq!(
            assemble_description("intro", &toc),
            "intro\n\n- [T0](u0)\n- [T1](u1)\n- [T2](u2)"
        );
        assert_eq!(assemble_description("", &toc[..1]), "- [T0](u0)");

        // "- [T0](u0)" is 10 chars; only one line fits after the separator.
        let summary = "s".repeat(DESCRIPTION_BUDGET - 12 - 5);
        let out = assemble_description(&summary, &toc);
        assert!(out.ends_with("- [T0](u0)"));
        assert!(out.chars().count() <= DESCRIPTION_BUDGET);
    }

    #[test]
    fn artifact_for_fragment_and_page() {
        let p = page(ORES);
        let a = build_page_artifact(&p, Some("tin"));
        assert_eq!(a.title, "Tin — Ores");
        assert_eq!(a.url, format!("{PAGE_URL}#tin"));
        assert_eq!(a.description, "Tin is a *soft* metal mined from cassiterite.");
        assert!(a.toc.is_empty());

        let a = build_page_artifact(&p, None);
        assert_eq!(a.title, "Ores");
        assert_eq!(a.url, PAGE_URL);
        assert_eq!(a.toc.len(), 3);
        assert!(a.description.starts_with("Ores are found in"));
        assert_eq!(
            a.image.as_deref(),
            Some("https://guide.example/Field-Guide-Modern/_images/ore.png")
        );
    }

    #[test]
    fn artifact_with_unknown_fragment_shows_toc_only() {
        let p = page(ORES);
        let a = build_page_artifact(&p, Some("bd-theme-text"));
        assert_eq!(a.title, "Ores");
        assert!(a.description.starts_with("- [Copper]("));

        let empty = page("<p></p>");
        let a = build_page_artifact(&empty, None);
        assert_eq!(a.description, EMPTY_DESCRIPTION);
    }
}
