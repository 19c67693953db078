//! `FieldGuide`: the engine as one value, constructed once and shared by request handlers.
//!
//! Every lookup can target a locale other than the configured one (`*_in` methods); the index
//! cache is keyed by index URL, so locales never share cached records.

use crate::config::GuideConfig;
use crate::crawl::{CrawlOutcome, Crawler};
use crate::extract::{build_page_artifact, Page};
use crate::fetch_ok;
use crate::index_search::{search_records, IndexCache};
use crate::locator::Locator;
use crate::session::{bounded, page, select_options, SessionStore};
use crate::textprep::tokenize;
use futures_util::future::join_all;
use guidepipe_core::{
    total_pages, Clock, Error, FetchBackend, FetchRequest, Located, PageArtifact, Result,
    SearchResult, SearchSession, SelectOption, SessionPage, SystemClock, DEFAULT_TITLE,
    MAX_INDEX_RESULTS, MAX_PAGE_BYTES, PAGE_SIZE,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct FieldGuide {
    config: GuideConfig,
    locator: Locator,
    fetcher: Arc<dyn FetchBackend>,
    index: IndexCache,
    sessions: SessionStore,
}

impl FieldGuide {
    pub fn new(config: GuideConfig, fetcher: Arc<dyn FetchBackend>) -> Result<Self> {
        Self::with_clock(config, fetcher, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: GuideConfig,
        fetcher: Arc<dyn FetchBackend>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let locator = Locator::from_config(&config)?;
        Ok(Self {
            index: IndexCache::new(clock.clone()),
            sessions: SessionStore::new(clock, config.max_sessions),
            config,
            locator,
            fetcher,
        })
    }

    pub fn config(&self) -> &GuideConfig {
        &self.config
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Locator for `locale`, or the configured one when `None`.
    pub fn locator_for(&self, locale: Option<&str>) -> Result<Locator> {
        match locale.map(str::trim).filter(|l| !l.is_empty()) {
            Some(l) => self.locator.with_locale(l),
            None => Ok(self.locator.clone()),
        }
    }

    pub fn locate(&self, path_or_url: &str) -> Result<Located> {
        self.locator.resolve(path_or_url)
    }

    pub fn locate_in(&self, path_or_url: &str, locale: Option<&str>) -> Result<Located> {
        self.locator_for(locale)?.resolve(path_or_url)
    }

    pub fn search_index_url(&self) -> Result<String> {
        self.index_url_for(&self.locator)
    }

    /// The configured override only stands in for the configured locale's index.
    fn index_url_for(&self, locator: &Locator) -> Result<String> {
        if let Some(u) = &self.config.search_index_url {
            if locator.locale() == self.locator.locale() {
                return Ok(u.clone());
            }
        }
        locator
            .content_base()?
            .join("search_index.json")
            .map(|u| u.to_string())
            .map_err(|e| Error::InvalidUrl(e.to_string()))
    }

    fn request(&self, url: &str) -> FetchRequest {
        FetchRequest::get(url)
            .with_timeout_ms(self.config.fetch_timeout_ms)
            .with_max_bytes(MAX_PAGE_BYTES)
    }

    async fn fetch_page(&self, canonical_url: &str, locator: &Locator) -> Result<Page> {
        let resp = fetch_ok(self.fetcher.as_ref(), &self.request(canonical_url)).await?;
        Ok(Page::parse(
            &resp.text_lossy(),
            canonical_url,
            locator,
            &self.config.content_container_class,
        ))
    }

    /// Summary of a page, or of one section when the input carries a fragment.
    pub async fn build_page_artifact(&self, url_or_path: &str) -> Result<PageArtifact> {
        self.build_page_artifact_in(url_or_path, None).await
    }

    pub async fn build_page_artifact_in(
        &self,
        url_or_path: &str,
        locale: Option<&str>,
    ) -> Result<PageArtifact> {
        let locator = self.locator_for(locale)?;
        let located = locator.resolve(url_or_path)?;
        let page = self.fetch_page(&located.canonical_url, &locator).await?;
        Ok(build_page_artifact(&page, located.fragment.as_deref()))
    }

    /// Page title for a link, falling back to the default title when the page can't be fetched.
    pub async fn page_title(&self, url_or_path: &str) -> Result<SearchResult> {
        self.page_title_in(url_or_path, None).await
    }

    pub async fn page_title_in(
        &self,
        url_or_path: &str,
        locale: Option<&str>,
    ) -> Result<SearchResult> {
        let locator = self.locator_for(locale)?;
        let located = locator.resolve(url_or_path)?;
        let title = match self.fetch_page(&located.canonical_url, &locator).await {
            Ok(p) => p.title(),
            Err(e) => {
                debug!(url = %located.canonical_url, error = %e, "title lookup failed");
                DEFAULT_TITLE.to_string()
            }
        };
        Ok(SearchResult {
            title,
            url: located.full_url(),
        })
    }

    /// Quick-access menu of the configured entry pages, labelled `<marker> <page title>`.
    ///
    /// Pages are fetched concurrently; one that fails is labelled with its URL instead.
    pub async fn top_links(&self, locale: Option<&str>) -> Result<Vec<SelectOption>> {
        let locator = self.locator_for(locale)?;
        let mut targets = Vec::with_capacity(self.config.top_links.len());
        for t in &self.config.top_links {
            targets.push((t.marker.as_str(), locator.resolve(&t.path)?.canonical_url));
        }
        let titles = join_all(
            targets
                .iter()
                .map(|(_, url)| self.fetch_page(url, &locator)),
        )
        .await;

        Ok(targets
            .iter()
            .zip(titles)
            .map(|((marker, url), page)| {
                let name = match page {
                    Ok(p) => p.title(),
                    Err(e) => {
                        debug!(url = %url, error = %e, "top link title lookup failed");
                        url.clone()
                    }
                };
                SelectOption {
                    label: bounded(format!("{marker} {name}").trim()),
                    value: bounded(&locator.relative(url)),
                    description: bounded(url),
                }
            })
            .collect())
    }

    pub async fn search_via_index(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        self.search_via_index_in(query, limit, None).await
    }

    pub async fn search_via_index_in(
        &self,
        query: &str,
        limit: usize,
        locale: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        if tokenize(query).is_empty() {
            return Ok(Vec::new());
        }
        let locator = self.locator_for(locale)?;
        let index_url = self.index_url_for(&locator)?;
        let records = self
            .index
            .records(self.fetcher.as_ref(), &index_url, self.config.fetch_timeout_ms)
            .await?;
        Ok(search_records(&records, query, limit, &locator))
    }

    pub async fn crawl_search(&self, query: &str, max_pages: usize, limit: usize) -> CrawlOutcome {
        self.crawl_with(&self.locator, query, max_pages, limit).await
    }

    async fn crawl_with(
        &self,
        locator: &Locator,
        query: &str,
        max_pages: usize,
        limit: usize,
    ) -> CrawlOutcome {
        Crawler::new(
            self.fetcher.as_ref(),
            locator,
            &self.config.crawl_seeds,
            &self.config.content_container_class,
            self.config.fetch_timeout_ms,
        )
        .search(query, max_pages, limit)
        .await
    }

    /// Index search, falling back to a crawl when the index errors or finds nothing.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        self.search_in(query, limit, None).await.unwrap_or_default()
    }

    /// [`FieldGuide::search`] in `locale`; only an unknown locale is an error.
    pub async fn search_in(
        &self,
        query: &str,
        limit: usize,
        locale: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        let locator = self.locator_for(locale)?;
        let limit = limit.clamp(1, MAX_INDEX_RESULTS);
        let t0 = Instant::now();
        match self.search_via_index_in(query, limit, Some(locator.locale())).await {
            Ok(r) if !r.is_empty() => {
                info!(
                    query,
                    locale = locator.locale(),
                    results = r.len(),
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    "index search"
                );
                return Ok(r);
            }
            Ok(_) => debug!(query, "index search empty; crawling"),
            Err(e) => warn!(query, error = %e, "index search failed; crawling"),
        }
        Ok(self
            .crawl_with(&locator, query, self.config.crawl_max_pages, limit)
            .await
            .results)
    }

    /// Crawl-only search with the smaller page budget.
    pub async fn search_deep(&self, query: &str) -> Vec<SearchResult> {
        self.search_deep_in(query, None).await.unwrap_or_default()
    }

    pub async fn search_deep_in(
        &self,
        query: &str,
        locale: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        let locator = self.locator_for(locale)?;
        Ok(self
            .crawl_with(&locator, query, self.config.deep_crawl_max_pages, PAGE_SIZE)
            .await
            .results)
    }

    pub fn session_create(&self, results: Vec<SearchResult>, query: &str) -> String {
        self.sessions.create(results, query, self.locator.locale())
    }

    pub fn session_create_in(
        &self,
        results: Vec<SearchResult>,
        query: &str,
        locale: Option<&str>,
    ) -> Result<String> {
        let locator = self.locator_for(locale)?;
        Ok(self.sessions.create(results, query, locator.locale()))
    }

    pub fn session_get(&self, token: &str) -> Result<SearchSession> {
        self.sessions.get(token).ok_or(Error::SessionExpired)
    }

    /// One page of a session, clamped into range, with its selection options.
    pub fn session_page(&self, token: &str, page_number: usize) -> Result<SessionPage> {
        let session = self.session_get(token)?;
        let locator = self.locator_for(Some(&session.locale))?;
        let total = total_pages(session.results.len());
        let page_number = page_number.clamp(1, total);
        let results = page(&session, page_number);
        let options = select_options(&results, &locator);
        Ok(SessionPage {
            token: session.token,
            query: session.query,
            locale: session.locale,
            page: page_number,
            total_pages: total,
            total_results: session.results.len(),
            results,
            options,
        })
    }
}
