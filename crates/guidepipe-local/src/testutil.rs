//! In-memory doubles for fetch and time.

use guidepipe_core::{Clock, Error, FetchBackend, FetchRequest, FetchResponse, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Serves canned bodies by exact URL; unknown URLs fail like a dead host.
#[derive(Default)]
pub struct MemoryFetcher {
    pages: HashMap<String, (u16, String)>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), (200, body.to_string()));
        self
    }

    pub fn status(mut self, url: &str, status: u16, body: &str) -> Self {
        self.pages.insert(url.to_string(), (status, body.to_string()));
        self
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.iter().map(|q| q.url.clone()).collect())
            .unwrap_or_default()
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl FetchBackend for MemoryFetcher {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse> {
        if let Ok(mut r) = self.requests.lock() {
            r.push(req.clone());
        }
        let (status, body) = self
            .pages
            .get(&req.url)
            .cloned()
            .ok_or_else(|| Error::Fetch(format!("connection refused: {}", req.url)))?;
        Ok(FetchResponse {
            url: req.url.clone(),
            final_url: req.url.clone(),
            status,
            content_type: Some("text/html".to_string()),
            bytes: body.into_bytes(),
            truncated: false,
            timings_ms: BTreeMap::new(),
        })
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn at(ms: u64) -> Self {
        Self(AtomicU64::new(ms))
    }

    pub fn set(&self, ms: u64) {
        self.0.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}
