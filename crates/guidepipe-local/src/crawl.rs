//! Breadth-first fallback search over the guide's link graph.
//!
//! Used when the precomputed index is unavailable or finds nothing. The crawl is bounded by a
//! page budget (every fetch attempt counts, failed ones included) and a match limit; a visited
//! set guarantees no canonical URL is fetched twice within one crawl.

use crate::extract::Page;
use crate::fetch_ok;
use crate::links::extract_internal_links;
use crate::locator::Locator;
use crate::markup::Document;
use crate::textprep::{has_token, is_denylisted_fragment, normalize_id};
use guidepipe_core::{FetchBackend, FetchRequest, SearchResult};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

const SECTION_TITLE_MAX_CHARS: usize = 120;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlOutcome {
    pub results: Vec<SearchResult>,
    /// Pages attempted (successful or not).
    pub scanned: usize,
    pub failed: usize,
    /// Distinct canonical URLs ever enqueued.
    pub discovered: usize,
}

/// Anchor target on a page: a heading, an in-page link target or any element with an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionCandidate {
    pub id: String,
    pub title: String,
}

fn norm_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Candidate sections in discovery order: headings, then `href="#..."` targets, then any other
/// element with an id and at least two characters of text. Ids are unique and never denylisted.
pub fn page_sections(doc: &Document) -> Vec<SectionCandidate> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut push = |id: &str, title: String, out: &mut Vec<SectionCandidate>| {
        if id.is_empty() || title.is_empty() || is_denylisted_fragment(id) {
            return;
        }
        if seen.insert(id.to_string()) {
            out.push(SectionCandidate {
                id: id.to_string(),
                title,
            });
        }
    };

    for (nid, el) in doc.elements() {
        if let (true, Some(id)) = (el.is_heading(), el.id()) {
            push(id, norm_ws(&doc.text(nid)), &mut out);
        }
    }
    for (nid, el) in doc.elements() {
        if el.tag != "a" {
            continue;
        }
        if let Some(target) = el.attr("href").and_then(|h| h.trim().strip_prefix('#')) {
            push(target, norm_ws(&doc.text(nid)), &mut out);
        }
    }
    for (nid, el) in doc.elements() {
        let Some(id) = el.id() else { continue };
        let text = norm_ws(&doc.text(nid));
        if text.chars().count() < 2 {
            continue;
        }
        push(id, text.chars().take(SECTION_TITLE_MAX_CHARS).collect(), &mut out);
    }
    out
}

/// Does the filename (sans `.html`) or the fragment of `rel_path` contain `norm` as a token?
pub fn path_matches(rel_path: &str, norm: &str) -> bool {
    let (path, frag) = match rel_path.split_once('#') {
        Some((p, f)) => (p, Some(f)),
        None => (rel_path, None),
    };
    let filename = path.split('/').filter(|s| !s.is_empty()).last().unwrap_or(path);
    let stem = filename.strip_suffix(".html").unwrap_or(filename);
    has_token(stem, norm) || frag.is_some_and(|f| !f.is_empty() && has_token(f, norm))
}

pub struct Crawler<'a> {
    fetcher: &'a dyn FetchBackend,
    locator: &'a Locator,
    seeds: &'a [String],
    container_class: &'a str,
    timeout_ms: u64,
}

impl<'a> Crawler<'a> {
    pub fn new(
        fetcher: &'a dyn FetchBackend,
        locator: &'a Locator,
        seeds: &'a [String],
        container_class: &'a str,
        timeout_ms: u64,
    ) -> Self {
        Self {
            fetcher,
            locator,
            seeds,
            container_class,
            timeout_ms,
        }
    }

    fn seed_urls(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let root = self.locator.content_root().into_iter();
        let seeds = self
            .seeds
            .iter()
            .filter_map(|s| self.locator.resolve(s).ok().map(|l| l.canonical_url));
        for u in root.chain(seeds) {
            if !out.contains(&u) {
                out.push(u);
            }
        }
        out
    }

    /// Crawl from the content root and seed pages, collecting up to `limit` matches for `query`
    /// while attempting at most `max_pages` fetches.
    pub async fn search(&self, query: &str, max_pages: usize, limit: usize) -> CrawlOutcome {
        let t0 = Instant::now();
        let mut outcome = CrawlOutcome::default();
        let norm = normalize_id(query);
        if norm.is_empty() || limit == 0 {
            debug!(query, "crawl skipped: nothing to match");
            return outcome;
        }
        let mut queue: VecDeque<String> = self.seed_urls().into();
        let mut visited: HashSet<String> = queue.iter().cloned().collect();
        let mut matched: HashSet<String> = HashSet::new();

        while let Some(current) = queue.pop_front() {
            if outcome.scanned >= max_pages || outcome.results.len() >= limit {
                break;
            }
            outcome.scanned += 1;

            let req = FetchRequest::get(current.clone()).with_timeout_ms(self.timeout_ms);
            let html = match fetch_ok(self.fetcher, &req).await {
                Ok(resp) => resp.text_lossy(),
                Err(e) => {
                    outcome.failed += 1;
                    warn!(url = %current, error = %e, "crawl fetch failed; skipping page");
                    continue;
                }
            };
            let page = Page::parse(&html, &current, self.locator, self.container_class);

            let rel = self.locator.relative(&current);
            if path_matches(&rel, &norm) && matched.insert(current.clone()) {
                outcome.results.push(SearchResult {
                    title: page.title(),
                    url: current.clone(),
                });
            }

            for s in page_sections(&page.doc) {
                if outcome.results.len() >= limit {
                    break;
                }
                let url = format!("{current}#{}", s.id);
                let hit = has_token(&s.id, &norm)
                    || has_token(&s.title, &norm)
                    || path_matches(&self.locator.relative(&url), &norm);
                if hit && !is_denylisted_fragment(&url) && matched.insert(url.clone()) {
                    outcome.results.push(SearchResult {
                        title: s.title,
                        url,
                    });
                }
            }

            let Ok(page_url) = Url::parse(&current) else {
                continue;
            };
            for link in extract_internal_links(&page.doc, &page_url, self.locator, usize::MAX) {
                if visited.insert(link.clone()) {
                    queue.push_back(link);
                }
            }
        }

        outcome.discovered = visited.len();
        info!(
            query,
            scanned = outcome.scanned,
            failed = outcome.failed,
            discovered = outcome.discovered,
            matches = outcome.results.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "crawl search finished"
        );
        outcome
    }
}
