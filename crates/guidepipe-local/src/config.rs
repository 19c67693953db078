use crate::locales::{is_known_locale, DEFAULT_LOCALE};
use guidepipe_core::{Error, Result, DEFAULT_FETCH_TIMEOUT};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SITE_ROOT: &str = "https://terrafirmagreg-team.github.io/Field-Guide-Modern/";

/// Entry pages every crawl starts from, relative to the content base.
pub const DEFAULT_CRAWL_SEEDS: &[&str] = &[
    "tfg_ores.html",
    "tfg_ores/earth_ore_index.html",
    "tfg_ores/earth_vein_index.html",
];

/// Quick-access entry pages as `(marker, path)`; the empty path is the locale's landing page.
pub const TOP_LINKS: &[(&str, &str)] = &[
    ("📙", ""),
    ("⛏️", "tfg_ores.html"),
    ("🌎", "the_world/geology.html"),
    ("🐖", "mechanics/animal_husbandry.html"),
    ("🌾", "mechanics/crops.html"),
    ("🍕", "firmalife.html"),
    ("🛣️", "roadsandroofs.html"),
    ("⛵", "firmaciv.html"),
    ("💡", "tfg_tips.html"),
];

/// One quick-access entry: a short visual marker and a path relative to the locale root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopLink {
    pub marker: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuideConfig {
    /// Site prefix up to and including the content-root segment.
    pub site_root: String,
    pub locale: String,
    /// Explicit `search_index.json` location; derived from the content base when unset.
    pub search_index_url: Option<String>,
    pub fetch_timeout_ms: u64,
    pub crawl_max_pages: usize,
    pub deep_crawl_max_pages: usize,
    pub max_sessions: usize,
    /// Class of the element wrapping a page's prose.
    pub content_container_class: String,
    pub crawl_seeds: Vec<String>,
    pub top_links: Vec<TopLink>,
}

impl Default for GuideConfig {
    fn default() -> Self {
        Self {
            site_root: DEFAULT_SITE_ROOT.to_string(),
            locale: DEFAULT_LOCALE.to_string(),
            search_index_url: None,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT.as_millis() as u64,
            crawl_max_pages: 800,
            deep_crawl_max_pages: 80,
            max_sessions: 1024,
            content_container_class: "col-md-9".to_string(),
            crawl_seeds: DEFAULT_CRAWL_SEEDS.iter().map(|s| s.to_string()).collect(),
            top_links: TOP_LINKS
                .iter()
                .map(|(marker, path)| TopLink {
                    marker: marker.to_string(),
                    path: path.to_string(),
                })
                .collect(),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key).and_then(|v| v.parse::<u64>().ok())
}

fn env_usize(key: &str, default: usize) -> usize {
    env_string(key)
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

impl GuideConfig {
    /// Defaults overridden by `GUIDEPIPE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        let cfg = Self {
            site_root: env_string("GUIDEPIPE_SITE_ROOT").unwrap_or(d.site_root),
            locale: env_string("GUIDEPIPE_LOCALE")
                .map(|l| l.to_ascii_lowercase())
                .unwrap_or(d.locale),
            search_index_url: env_string("GUIDEPIPE_SEARCH_INDEX_URL")
                .or_else(|| env_string("SEARCH_INDEX_URL")),
            fetch_timeout_ms: env_u64("GUIDEPIPE_FETCH_TIMEOUT_MS").unwrap_or(d.fetch_timeout_ms),
            crawl_max_pages: env_usize("GUIDEPIPE_CRAWL_MAX_PAGES", d.crawl_max_pages),
            deep_crawl_max_pages: env_usize(
                "GUIDEPIPE_DEEP_CRAWL_MAX_PAGES",
                d.deep_crawl_max_pages,
            ),
            max_sessions: env_usize("GUIDEPIPE_MAX_SESSIONS", d.max_sessions),
            ..d
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !is_known_locale(&self.locale) {
            return Err(Error::NotConfigured(format!(
                "unknown locale {:?}",
                self.locale
            )));
        }
        let root = url::Url::parse(&self.site_root)
            .map_err(|e| Error::NotConfigured(format!("site_root: {e}")))?;
        if !matches!(root.scheme(), "http" | "https") {
            return Err(Error::NotConfigured(format!(
                "site_root must be http(s): {}",
                self.site_root
            )));
        }
        if root.path_segments().map_or(true, |mut s| s.all(str::is_empty)) {
            return Err(Error::NotConfigured(
                "site_root needs a content-root path segment".to_string(),
            ));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(Error::NotConfigured(
                "fetch_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.max_sessions == 0 {
            return Err(Error::NotConfigured("max_sessions must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn with_site_root(mut self, site_root: impl Into<String>) -> Self {
        self.site_root = site_root.into();
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-global; serialize tests that mutate them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const KEYS: &[&str] = &[
        "GUIDEPIPE_SITE_ROOT",
        "GUIDEPIPE_LOCALE",
        "GUIDEPIPE_SEARCH_INDEX_URL",
        "SEARCH_INDEX_URL",
        "GUIDEPIPE_FETCH_TIMEOUT_MS",
        "GUIDEPIPE_CRAWL_MAX_PAGES",
        "GUIDEPIPE_DEEP_CRAWL_MAX_PAGES",
        "GUIDEPIPE_MAX_SESSIONS",
    ];

    fn clear() {
        for k in KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn defaults_validate() {
        let cfg = GuideConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.fetch_timeout_ms, 15_000);
        assert_eq!(cfg.crawl_seeds.len(), 3);
        assert_eq!(cfg.top_links.len(), 9);
        assert_eq!(cfg.top_links[0].path, "");
        assert_eq!(cfg.top_links[4].path, "mechanics/crops.html");
    }

    #[test]
    fn env_overrides_and_legacy_index_var() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear();
        std::env::set_var("GUIDEPIPE_SITE_ROOT", "http://127.0.0.1:9/Guide/");
        std::env::set_var("GUIDEPIPE_LOCALE", "JA_JP");
        std::env::set_var("SEARCH_INDEX_URL", "http://127.0.0.1:9/idx.json");
        std::env::set_var("GUIDEPIPE_CRAWL_MAX_PAGES", "not-a-number");
        std::env::set_var("GUIDEPIPE_MAX_SESSIONS", " 7 ");
        let cfg = GuideConfig::from_env().unwrap();
        clear();
        assert_eq!(cfg.site_root, "http://127.0.0.1:9/Guide/");
        assert_eq!(cfg.locale, "ja_jp");
        assert_eq!(
            cfg.search_index_url.as_deref(),
            Some("http://127.0.0.1:9/idx.json")
        );
        assert_eq!(cfg.crawl_max_pages, 800);
        assert_eq!(cfg.max_sessions, 7);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            GuideConfig::default().with_locale("xx_yy").validate(),
            Err(Error::NotConfigured(_))
        ));
        assert!(GuideConfig::default()
            .with_site_root("ftp://x/Guide/")
            .validate()
            .is_err());
        assert!(GuideConfig::default()
            .with_site_root("https://x/")
            .validate()
            .is_err());
    }
}
