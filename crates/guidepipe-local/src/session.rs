//! Short-lived result sessions for paging through a search from a stateless surface.
//!
//! Tokens are random v4 UUIDs. An entry is dropped on the first read at or past its expiry;
//! `create` also sweeps expired entries and, at capacity, evicts the session expiring soonest.

use crate::locator::Locator;
use crate::textprep::is_denylisted_fragment;
use guidepipe_core::{
    Clock, SearchResult, SearchSession, SelectOption, OPTION_MAX_CHARS, PAGE_SIZE, SESSION_TTL,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

pub struct SessionStore {
    ttl_ms: u64,
    max_sessions: usize,
    clock: Arc<dyn Clock>,
    sessions: Mutex<HashMap<String, SearchSession>>,
}

impl SessionStore {
    pub fn new(clock: Arc<dyn Clock>, max_sessions: usize) -> Self {
        Self {
            ttl_ms: SESSION_TTL.as_millis() as u64,
            max_sessions: max_sessions.max(1),
            clock,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = ttl.as_millis() as u64;
        self
    }

    /// Store `results` under a fresh token.
    pub fn create(&self, results: Vec<SearchResult>, query: &str, locale: &str) -> String {
        let now = self.clock.now_ms();
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.retain(|_, s| now < s.expires_at_ms);
        while sessions.len() >= self.max_sessions {
            let Some(oldest) = sessions
                .values()
                .min_by_key(|s| s.expires_at_ms)
                .map(|s| s.token.clone())
            else {
                break;
            };
            debug!(token = %oldest, "session store full; evicting");
            sessions.remove(&oldest);
        }

        let mut token = uuid::Uuid::new_v4().to_string();
        while sessions.contains_key(&token) {
            token = uuid::Uuid::new_v4().to_string();
        }
        sessions.insert(
            token.clone(),
            SearchSession {
                token: token.clone(),
                query: query.to_string(),
                locale: locale.to_string(),
                results,
                expires_at_ms: now.saturating_add(self.ttl_ms),
            },
        );
        token
    }

    /// Live session for `token`; an expired one is removed and reported as absent.
    pub fn get(&self, token: &str) -> Option<SearchSession> {
        let now = self.clock.now_ms();
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let expired = now >= sessions.get(token)?.expires_at_ms;
        if expired {
            debug!(token, "session expired");
            sessions.remove(token);
            return None;
        }
        sessions.get(token).cloned()
    }

    /// Drop every expired session; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_ms();
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let before = sessions.len();
        sessions.retain(|_, s| now < s.expires_at_ms);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Raw slice for one-based `page_number` (0 is treated as 1).
pub fn page_slice(results: &[SearchResult], page_number: usize) -> &[SearchResult] {
    let start = (page_number.max(1) - 1).saturating_mul(PAGE_SIZE);
    if start >= results.len() {
        return &[];
    }
    let end = start.saturating_add(PAGE_SIZE).min(results.len());
    &results[start..end]
}

/// Up to [`PAGE_SIZE`] results of one page, minus denylisted anchors (not backfilled).
pub fn page(session: &SearchSession, page_number: usize) -> Vec<SearchResult> {
    page_slice(&session.results, page_number)
        .iter()
        .filter(|r| !(r.url.contains('#') && is_denylisted_fragment(&r.url)))
        .cloned()
        .collect()
}

pub fn prev_page(current: usize) -> usize {
    current.saturating_sub(1).max(1)
}

pub fn next_page(current: usize, total_pages: usize) -> usize {
    current.saturating_add(1).clamp(1, total_pages.max(1))
}

pub(crate) fn bounded(s: &str) -> String {
    s.chars().take(OPTION_MAX_CHARS).collect()
}

/// Selection-menu entries for a page of results.
///
/// `value` is the URL relative to the content base; entries whose value would not fit are
/// left out rather than cut, so every value maps back to a real page.
pub fn select_options(results: &[SearchResult], locator: &Locator) -> Vec<SelectOption> {
    results
        .iter()
        .filter_map(|r| {
            let rel = locator.relative(&r.url);
            if rel.contains('#') && is_denylisted_fragment(&rel) {
                return None;
            }
            if rel.chars().count() > OPTION_MAX_CHARS {
                return None;
            }
            let label = if r.title.trim().is_empty() {
                "Result"
            } else {
                r.title.as_str()
            };
            Some(SelectOption {
                label: bounded(label),
                description: bounded(&rel),
                value: rel,
            })
        })
        .collect()
}
