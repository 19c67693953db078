//! Search over the precomputed `search_index.json`.
//!
//! The index is fetched lazily and kept for [`INDEX_TTL`] per index URL. Concurrent callers that
//! find it stale may each refetch; the last write wins and no lock is held across the fetch.

use crate::fetch_ok;
use crate::locator::Locator;
use crate::textprep::{has_standalone_term, starts_with_term, tokenize};
use guidepipe_core::{
    Clock, Error, FetchBackend, FetchRequest, IndexRecord, Result, ScoredMatch, SearchResult,
    DEFAULT_TITLE, INDEX_TTL, MAX_INDEX_RESULTS,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct CachedIndex {
    records: Arc<Vec<IndexRecord>>,
    fetched_at_ms: u64,
}

pub struct IndexCache {
    ttl_ms: u64,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<String, CachedIndex>>,
}

impl IndexCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl_ms: INDEX_TTL.as_millis() as u64,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = ttl.as_millis() as u64;
        self
    }

    /// Cached records for `index_url` if still inside the TTL.
    pub fn fresh(&self, index_url: &str) -> Option<Arc<Vec<IndexRecord>>> {
        let now = self.clock.now_ms();
        let entries = self.entries.read().ok()?;
        let c = entries.get(index_url)?;
        (now.saturating_sub(c.fetched_at_ms) < self.ttl_ms).then(|| c.records.clone())
    }

    pub fn store(&self, index_url: &str, records: Arc<Vec<IndexRecord>>) {
        let fetched_at_ms = self.clock.now_ms();
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                index_url.to_string(),
                CachedIndex {
                    records,
                    fetched_at_ms,
                },
            );
        }
    }

    /// Cached records, refetching when missing or stale.
    pub async fn records(
        &self,
        fetcher: &dyn FetchBackend,
        index_url: &str,
        timeout_ms: u64,
    ) -> Result<Arc<Vec<IndexRecord>>> {
        if let Some(r) = self.fresh(index_url) {
            debug!(index_url, records = r.len(), "search index cache hit");
            return Ok(r);
        }
        let req = FetchRequest::get(index_url)
            .with_timeout_ms(timeout_ms)
            .with_header("Cache-Control", "no-cache");
        let resp = fetch_ok(fetcher, &req).await?;
        let records = Arc::new(parse_index(&resp.bytes)?);
        debug!(index_url, records = records.len(), "search index refreshed");
        self.store(index_url, records.clone());
        Ok(records)
    }
}

/// Parse an index body. Anything but a JSON array is an [`Error::IndexFormat`]; array items
/// without a usable `url` are skipped.
pub fn parse_index(bytes: &[u8]) -> Result<Vec<IndexRecord>> {
    let v: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| Error::IndexFormat(e.to_string()))?;
    let serde_json::Value::Array(items) = v else {
        return Err(Error::IndexFormat("expected a JSON array".to_string()));
    };
    let total = items.len();
    let records: Vec<IndexRecord> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<IndexRecord>(item).ok())
        .filter(|r| !r.url.trim().is_empty())
        .collect();
    if records.len() < total {
        warn!(
            skipped = total - records.len(),
            "search index items without a url"
        );
    }
    Ok(records)
}

/// +4 per term standing alone in the title, +2 in the content, +1 per term the title starts with.
pub fn score_record(record: &IndexRecord, terms: &[String]) -> u32 {
    let content = record.content.as_deref().unwrap_or("");
    let mut score = 0;
    for t in terms {
        if has_standalone_term(&record.title, t) {
            score += 4;
        }
        if has_standalone_term(content, t) {
            score += 2;
        }
    }
    for t in terms {
        if starts_with_term(&record.title, t) {
            score += 1;
        }
    }
    score
}

/// Non-zero scores, best first; ties keep index order.
pub fn rank_records(records: &[IndexRecord], terms: &[String]) -> Vec<ScoredMatch> {
    let mut scored: Vec<ScoredMatch> = records
        .iter()
        .filter_map(|r| {
            let score = score_record(r, terms);
            (score > 0).then(|| ScoredMatch {
                score,
                title: if r.title.is_empty() {
                    DEFAULT_TITLE.to_string()
                } else {
                    r.title.clone()
                },
                url: r.url.clone(),
            })
        })
        .collect();
    // `sort_by` is stable.
    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored
}

/// Rank `records` for `query`, dedupe by canonical URL and cap at `limit` (1..=500).
pub fn search_records(
    records: &[IndexRecord],
    query: &str,
    limit: usize,
    locator: &Locator,
) -> Vec<SearchResult> {
    let terms = tokenize(query);
    if terms.is_empty() {
        return Vec::new();
    }
    let cap = limit.clamp(1, MAX_INDEX_RESULTS);
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for m in rank_records(records, &terms) {
        let url = match locator.build_url(&m.url) {
            Ok(u) => u,
            Err(e) => {
                debug!(url = %m.url, error = %e, "skipping unresolvable index url");
                continue;
            }
        };
        if seen.insert(url.clone()) {
            out.push(SearchResult {
                title: m.title,
                url,
            });
        }
        if out.len() >= cap {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ManualClock, MemoryFetcher};
    use proptest::prelude::*;

    const INDEX_URL: &str = "https://guide.example/Field-Guide-Modern/en_us/search_index.json";

    fn locator() -> Locator {
        Locator::new("https://guide.example/Field-Guide-Modern/", "en_us").unwrap()
    }

    fn rec(title: &str, content: Option<&str>, url: &str) -> IndexRecord {
        IndexRecord {
            title: title.to_string(),
            content: content.map(str::to_string),
            url: url.to_string(),
        }
    }

    fn terms(q: &str) -> Vec<String> {
        tokenize(q)
    }

    #[test]
    fn blast_furnace_scores_as_title_match() {
        let r = rec(
            "Blast Furnace",
            Some("used to smelt iron"),
            "tfg_ores/blast_furnace.html",
        );
        assert_eq!(score_record(&r, &terms("blast")), 5);
        let results = search_records(&[r], "blast", 25, &locator());
        assert_eq!(
            results,
            vec![SearchResult {
                title: "Blast Furnace".to_string(),
                url: "https://guide.example/Field-Guide-Modern/en_us/tfg_ores/blast_furnace.html"
                    .to_string(),
            }]
        );
    }

    #[test]
    fn scoring_components() {
        let t = terms("iron");
        assert_eq!(score_record(&rec("Cast Iron", None, "a"), &t), 4);
        assert_eq!(score_record(&rec("Iron", None, "a"), &t), 5);
        assert_eq!(score_record(&rec("Tools", Some("iron tools"), "a"), &t), 2);
        assert_eq!(score_record(&rec("Ironwood", Some("irony"), "a"), &t), 0);
        assert_eq!(score_record(&rec("Iron Ore", Some("iron"), "a"), &terms("iron ore")), 4 + 2 + 4 + 1);
    }

    #[test]
    fn results_dedupe_by_canonical_url_and_cap() {
        let records = vec![
            rec("Copper", None, "tfg_ores/copper.html"),
            rec("Copper again", None, "tfg_ores/copper"),
            rec("Copper tools", None, "tfg_ores/copper.html#tools"),
            rec("Nothing", None, "x.html"),
        ];
        let l = locator();
        let out = search_records(&records, "copper", 25, &l);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].title, "Copper");
        assert!(out[1].url.ends_with("copper.html#tools"));
        assert_eq!(search_records(&records, "copper", 0, &l).len(), 1);
        assert!(search_records(&records, "  ?! ", 25, &l).is_empty());
    }

    #[test]
    fn empty_title_gets_default() {
        let out = rank_records(&[rec("", Some("gold"), "g.html")], &terms("gold"));
        assert_eq!(out[0].title, DEFAULT_TITLE);
    }

    #[test]
    fn parse_rejects_non_arrays() {
        assert!(matches!(
            parse_index(br#"{"entries": []}"#),
            Err(Error::IndexFormat(_))
        ));
        assert!(matches!(parse_index(b"<html>"), Err(Error::IndexFormat(_))));
        let r = parse_index(br#"[{"entry":"A","url":"a.html"},{"entry":"no url"},{"url":"b.html","content":"c"}]"#)
            .unwrap();
        assert_eq!(r.len(), 2);
        assert_eq!(r[1].title, "");
    }

    #[tokio::test]
    async fn cache_refetches_only_after_ttl() {
        let clock = Arc::new(ManualClock::at(1_000));
        let cache = IndexCache::new(clock.clone());
        let fetcher = MemoryFetcher::new().page(INDEX_URL, r#"[{"entry":"A","url":"a.html"}]"#);

        cache.records(&fetcher, INDEX_URL, 1_000).await.unwrap();
        clock.advance(INDEX_TTL.as_millis() as u64 - 1);
        cache.records(&fetcher, INDEX_URL, 1_000).await.unwrap();
        assert_eq!(fetcher.requested_urls().len(), 1);

        clock.advance(1);
        cache.records(&fetcher, INDEX_URL, 1_000).await.unwrap();
        assert_eq!(fetcher.requested_urls().len(), 2);

        let req = &fetcher.requests()[0];
        assert_eq!(req.headers.get("Cache-Control").map(String::as_str), Some("no-cache"));
    }

    #[tokio::test]
    async fn cache_surfaces_fetch_and_format_errors() {
        let cache = IndexCache::new(Arc::new(ManualClock::at(0)));
        let fetcher = MemoryFetcher::new()
            .status(INDEX_URL, 404, "not found")
            .page("https://x.test/bad.json", r#"{"a":1}"#);
        assert!(matches!(
            cache.records(&fetcher, INDEX_URL, 1_000).await,
            Err(Error::Fetch(_))
        ));
        assert!(matches!(
            cache.records(&fetcher, "https://x.test/bad.json", 1_000).await,
            Err(Error::IndexFormat(_))
        ));
        assert!(cache.fresh(INDEX_URL).is_none());
    }

    proptest! {
        #[test]
        fn ranking_is_sorted_and_stable(
            titles in proptest::collection::vec("(iron|copper|tin|gold)( (ore|ingot|tools))?", 1..40),
        ) {
            let records: Vec<IndexRecord> = titles
                .iter()
                .enumerate()
                .map(|(i, t)| rec(t, None, &format!("p{i}.html")))
                .collect();
            let ranked = rank_records(&records, &terms("iron ore"));
            for w in ranked.windows(2) {
                prop_assert!(w[0].score >= w[1].score);
                if w[0].score == w[1].score {
                    let i0: usize = w[0].url[1..w[0].url.len() - 5].parse().unwrap();
                    let i1: usize = w[1].url[1..w[1].url.len() - 5].parse().unwrap();
                    prop_assert!(i0 < i1);
                }
            }
            let results = search_records(&records, "iron ore", 500, &locator());
            let unique: HashSet<_> = results.iter().map(|r| r.url.clone()).collect();
            prop_assert_eq!(unique.len(), results.len());
        }
    }
}
