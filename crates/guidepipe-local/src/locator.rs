//! Path/URL → canonical page address.
//!
//! A canonical URL is absolute, has no fragment, carries a locale segment directly after the
//! content-root segment and always names a file (`.../index.html` for directory-style links).
//! All identity comparisons (crawl visited set, result dedupe) go through [`Locator::canonicalize`].

use crate::config::GuideConfig;
use crate::locales::is_known_locale;
use guidepipe_core::{Error, Located, Result};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    site_root: Url,
    root_segment: String,
    locale: String,
}

fn is_absolute_http(s: &str) -> bool {
    let lc = s.get(..8).unwrap_or(s).to_ascii_lowercase();
    lc.starts_with("http://") || lc.starts_with("https://")
}

impl Locator {
    pub fn new(site_root: &str, locale: &str) -> Result<Self> {
        let mut root = site_root.trim().to_string();
        if !root.ends_with('/') {
            root.push('/');
        }
        let site_root = Url::parse(&root).map_err(|e| Error::InvalidUrl(format!("{root}: {e}")))?;
        let root_segment = site_root
            .path_segments()
            .and_then(|s| s.filter(|x| !x.is_empty()).last().map(str::to_string))
            .ok_or_else(|| Error::InvalidUrl(format!("{root}: no content-root segment")))?;
        if !is_known_locale(locale) {
            return Err(Error::NotConfigured(format!("unknown locale {locale:?}")));
        }
        Ok(Self {
            site_root,
            root_segment,
            locale: locale.to_string(),
        })
    }

    pub fn from_config(cfg: &GuideConfig) -> Result<Self> {
        Self::new(&cfg.site_root, &cfg.locale)
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn root_segment(&self) -> &str {
        &self.root_segment
    }

    pub fn site_root(&self) -> &Url {
        &self.site_root
    }

    /// Same site, different locale.
    pub fn with_locale(&self, locale: &str) -> Result<Self> {
        let locale = locale.trim().to_ascii_lowercase();
        if !is_known_locale(&locale) {
            return Err(Error::NotConfigured(format!("unknown locale {locale:?}")));
        }
        Ok(Self {
            locale,
            ..self.clone()
        })
    }

    /// Absolute link target: canonical page URL with the fragment kept. Links leaving the site
    /// root, and non-http(s) targets, are returned as joined.
    pub fn canonicalize_link(&self, url: &Url) -> String {
        if !matches!(url.scheme(), "http" | "https")
            || !url.as_str().starts_with(self.site_root.as_str())
        {
            return url.to_string();
        }
        match self.canonicalize(url.as_str()) {
            Ok(c) => match url.fragment().filter(|f| !f.is_empty()) {
                Some(f) => format!("{c}#{f}"),
                None => c,
            },
            Err(_) => url.to_string(),
        }
    }

    fn base_for(&self, locale: &str) -> Result<Url> {
        self.site_root
            .join(&format!("{locale}/"))
            .map_err(|e| Error::InvalidUrl(e.to_string()))
    }

    /// `<site_root>/<locale>/`: the prefix every guide page lives under.
    pub fn content_base(&self) -> Result<Url> {
        self.base_for(&self.locale)
    }

    /// Canonical URL of the locale's landing page.
    pub fn content_root(&self) -> Result<String> {
        Ok(self.content_base()?.join("index.html").map_err(|e| Error::InvalidUrl(e.to_string()))?.to_string())
    }

    /// Insert the configured locale after the content-root segment unless a known locale is
    /// already there. URLs without the content-root segment are returned unchanged.
    pub fn ensure_locale(&self, url: &mut Url) {
        let Some(mut segs) = url
            .path_segments()
            .map(|s| s.map(str::to_string).collect::<Vec<_>>())
        else {
            return;
        };
        let Some(i) = segs.iter().position(|s| *s == self.root_segment) else {
            return;
        };
        let has_locale = segs.get(i + 1).is_some_and(|s| is_known_locale(s));
        if !has_locale {
            segs.insert(i + 1, self.locale.clone());
            url.set_path(&format!("/{}", segs.join("/")));
        }
    }

    /// Absolute URL → canonical page URL (fragment dropped).
    pub fn canonicalize(&self, url: &str) -> Result<String> {
        let mut u = Url::parse(url.trim()).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
        if u.cannot_be_a_base() {
            return Err(Error::InvalidUrl(format!("{url}: not a hierarchical url")));
        }
        u.set_fragment(None);
        self.ensure_locale(&mut u);

        let mut segs: Vec<String> = u
            .path_segments()
            .map(|s| s.map(str::to_string).collect())
            .unwrap_or_default();
        match segs.last().map(String::as_str) {
            None | Some("") => {
                segs.pop();
                segs.push("index.html".to_string());
            }
            Some("index") => {
                segs.pop();
                segs.push("index.html".to_string());
            }
            Some(last) if !last.contains('.') => segs.push("index.html".to_string()),
            Some(_) => {}
        }
        u.set_path(&format!("/{}", segs.join("/")));
        Ok(u.to_string())
    }

    /// Path or absolute URL → canonical URL plus the fragment, kept apart.
    pub fn resolve(&self, input: &str) -> Result<Located> {
        let input = input.trim();
        if is_absolute_http(input) {
            let u = Url::parse(input).map_err(|e| Error::InvalidUrl(format!("{input}: {e}")))?;
            let fragment = u.fragment().filter(|f| !f.is_empty()).map(str::to_string);
            return Ok(Located {
                canonical_url: self.canonicalize(input)?,
                fragment,
            });
        }

        let (path, fragment) = match input.split_once('#') {
            Some((p, f)) => (p, (!f.is_empty()).then(|| f.to_string())),
            None => (input, None),
        };
        let path = path.trim_matches('/');
        let (base, rest) = match path.split_once('/') {
            Some((first, rest)) if is_known_locale(first) => (self.base_for(first)?, rest),
            _ if is_known_locale(path) => (self.base_for(path)?, ""),
            _ => (self.content_base()?, path),
        };
        let rel = if rest.is_empty() {
            "index.html".to_string()
        } else if rest.ends_with(".html") {
            rest.to_string()
        } else {
            format!("{rest}.html")
        };
        let joined = base
            .join(&rel)
            .map_err(|e| Error::InvalidUrl(format!("{input}: {e}")))?;
        Ok(Located {
            canonical_url: self.canonicalize(joined.as_str())?,
            fragment,
        })
    }

    /// Canonical URL with the fragment preserved.
    pub fn build_url(&self, input: &str) -> Result<String> {
        Ok(self.resolve(input)?.full_url())
    }

    /// `url` with the content base stripped; unchanged if it lives elsewhere.
    pub fn relative(&self, url: &str) -> String {
        match self.content_base() {
            Ok(base) => url
                .strip_prefix(base.as_str())
                .unwrap_or(url)
                .to_string(),
            Err(_) => url.to_string(),
        }
    }
}
