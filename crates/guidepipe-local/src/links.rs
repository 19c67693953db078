use crate::locator::Locator;
use crate::markup::Document;
use std::collections::BTreeSet;
use url::Url;

/// Extract (deduped) canonical links that stay inside the content tree, in document order.
///
/// - Resolves relative links against `page_url`.
/// - Skips pure-fragment links and `javascript:`/`mailto:` targets.
/// - Canonicalizes through the [`Locator`] (fragment dropped, locale and `index.html` applied).
/// - Returns at most `max_links`.
pub fn extract_internal_links(
    doc: &Document,
    page_url: &Url,
    locator: &Locator,
    max_links: usize,
) -> Vec<String> {
    if max_links == 0 {
        return Vec::new();
    }
    let Ok(content_base) = locator.content_base() else {
        return Vec::new();
    };

    let mut seen = BTreeSet::<String>::new();
    let mut out = Vec::new();
    for (_, el) in doc.elements() {
        if out.len() >= max_links {
            break;
        }
        if el.tag != "a" {
            continue;
        }
        let href = match el.attr("href") {
            Some(h) => h.trim(),
            None => continue,
        };
        if href.is_empty() || href.starts_with('#') {
            continue;
        }
        let href_lc = href.to_ascii_lowercase();
        if href_lc.starts_with("javascript:") || href_lc.starts_with("mailto:") {
            continue;
        }

        let Ok(abs) = page_url.join(href) else {
            continue;
        };
        let Ok(canonical) = locator.canonicalize(abs.as_str()) else {
            continue;
        };
        if !canonical.starts_with(content_base.as_str()) {
            continue;
        }
        if seen.insert(canonical.clone()) {
            out.push(canonical);
        }
    }
    out
}
