use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Hard cap (in characters) for any rendered description.
pub const DESCRIPTION_BUDGET: usize = 4096;
/// Results rendered per pagination page.
pub const PAGE_SIZE: usize = 25;
/// Maximum table-of-contents entries per page.
pub const TOC_CAP: usize = 60;
/// Maximum length of a selection label/value handed to a chat UI.
pub const OPTION_MAX_CHARS: usize = 100;
/// Hard cap on index search results regardless of the requested limit.
pub const MAX_INDEX_RESULTS: usize = 500;
pub const INDEX_TTL: Duration = Duration::from_secs(10 * 60);
pub const SESSION_TTL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);
/// Body cap for a single page or index download.
pub const MAX_PAGE_BYTES: u64 = 8 * 1024 * 1024;
/// Title used when a page or index record carries none.
pub const DEFAULT_TITLE: &str = "Field Guide";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("invalid search index: {0}")]
    IndexFormat(String),
    #[error("this search session expired")]
    SessionExpired,
    #[error("not configured: {0}")]
    NotConfigured(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    /// Timeout for the whole request (connect + body).
    pub timeout_ms: Option<u64>,
    /// Hard cap on bytes read from the response body.
    pub max_bytes: Option<u64>,
    pub headers: BTreeMap<String, String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_ms: Some(DEFAULT_FETCH_TIMEOUT.as_millis() as u64),
            max_bytes: None,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub truncated: bool,
    pub timings_ms: BTreeMap<String, u128>,
}

impl FetchResponse {
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).to_string()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Retrieves raw bytes for a URL. Implementations must not cache or retry.
#[async_trait::async_trait]
pub trait FetchBackend: Send + Sync {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse>;
}

/// Millisecond wall clock, injectable so TTL logic can be tested.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// One row of the precomputed `search_index.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    #[serde(rename = "entry", default)]
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredMatch {
    pub score: u32,
    pub title: String,
    pub url: String,
}

/// Public result shape; `url` is always absolute and canonical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub description: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocItem {
    pub title: String,
    pub url: String,
}

/// Output of `locate`: fetchable page URL plus the in-page anchor, kept apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Located {
    pub canonical_url: String,
    pub fragment: Option<String>,
}

impl Located {
    /// Canonical URL with the fragment re-attached.
    pub fn full_url(&self) -> String {
        match &self.fragment {
            Some(f) => format!("{}#{}", self.canonical_url, f),
            None => self.canonical_url.clone(),
        }
    }
}

/// Renderable summary of one page or one section of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageArtifact {
    pub title: String,
    pub url: String,
    pub description: String,
    pub image: Option<String>,
    pub toc: Vec<TocItem>,
}

/// One entry of a chat selection menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSession {
    pub token: String,
    pub query: String,
    /// Locale the results were searched in; option values are relative to its content base.
    pub locale: String,
    pub results: Vec<SearchResult>,
    pub expires_at_ms: u64,
}

impl SearchSession {
    pub fn total_pages(&self) -> usize {
        total_pages(self.results.len())
    }
}

/// One rendered page of a session, ready for a selection menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPage {
    pub token: String,
    pub query: String,
    pub locale: String,
    /// One-based, clamped to `1..=total_pages`.
    pub page: usize,
    pub total_pages: usize,
    pub total_results: usize,
    pub results: Vec<SearchResult>,
    pub options: Vec<SelectOption>,
}

/// `ceil(n / PAGE_SIZE)`, never less than 1.
pub fn total_pages(n: usize) -> usize {
    n.div_ceil(PAGE_SIZE).max(1)
}

/// Truncate to at most `limit` characters, ending in `...` when cut.
pub fn truncate_with_ellipsis(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    const ELLIPSIS: &str = "...";
    let keep = limit.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}
