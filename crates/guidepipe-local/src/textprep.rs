//! Minimal, deterministic text normalization helpers used for matching.
//!
//! Nothing here is used for display text: all outputs are lossy search keys.

use unicode_normalization::UnicodeNormalization;

/// Anchor-name substrings of UI widgets (3D viewer, navbar, theme and language toggles).
pub const FRAGMENT_DENYLIST: &[&str] = &[
    "glb-viewer",
    "nav-primary",
    "navbar-content",
    "lang-dropdown-button",
    "bd-theme",
    "bd-theme-text",
];

/// True if a fragment id (or the fragment part of a URL) names a UI widget anchor.
pub fn is_denylisted_fragment(id_or_url: &str) -> bool {
    if id_or_url.is_empty() {
        return false;
    }
    let candidate = id_or_url.rsplit('#').next().unwrap_or(id_or_url);
    let lc = candidate.to_lowercase();
    FRAGMENT_DENYLIST.iter().any(|sub| lc.contains(sub))
}

fn strip_diacritics(s: &str) -> String {
    s.nfkd()
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .collect()
}

/// Lowercase, strip diacritics, collapse every non `[a-z0-9]` run into one `_`, trim `_`.
///
/// `"Blast Furnace!"` → `"blast_furnace"`.
pub fn normalize_id(s: &str) -> String {
    let s0 = strip_diacritics(&s.to_lowercase());
    let mut out = String::with_capacity(s0.len());
    let mut last_sep = true;
    for ch in s0.chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            out.push(ch);
            last_sep = false;
        } else if !last_sep {
            out.push('_');
            last_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Token-aligned containment on normalized ids: `needle` must sit between `_` or string edges.
pub fn has_token(hay: &str, needle: &str) -> bool {
    let n = normalize_id(needle);
    if n.is_empty() {
        return false;
    }
    let h = normalize_id(hay);
    h.split('_')
        .collect::<Vec<_>>()
        .windows(n.split('_').count())
        .any(|w| w.join("_") == n)
}

/// Query terms: lowercase, path/punctuation separators to spaces, drop other symbols.
pub fn tokenize(q: &str) -> Vec<String> {
    let mut cleaned = String::with_capacity(q.len());
    for ch in q.to_lowercase().chars() {
        if matches!(ch, '_' | '#' | '.' | '/' | '-') || ch.is_whitespace() {
            cleaned.push(' ');
        } else if ch.is_alphanumeric() {
            cleaned.push(ch);
        }
    }
    cleaned.split_whitespace().map(str::to_string).collect()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric()
}

/// Case-insensitive match of `term` bounded by non-letter/non-number chars or string edges.
pub fn has_standalone_term(text: &str, term: &str) -> bool {
    if text.is_empty() || term.is_empty() {
        return false;
    }
    let hay = text.to_lowercase();
    let term = term.to_lowercase();
    for (i, _) in hay.char_indices().filter(|(i, _)| hay[*i..].starts_with(&term)) {
        let before_ok = hay[..i].chars().next_back().map_or(true, |c| !is_word_char(c));
        let after_ok = hay[i + term.len()..]
            .chars()
            .next()
            .map_or(true, |c| !is_word_char(c));
        if before_ok && after_ok {
            return true;
        }
    }
    false
}

/// True if `text` begins with `term` followed by a word boundary.
pub fn starts_with_term(text: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    let hay = text.to_lowercase();
    let term = term.to_lowercase();
    match hay.strip_prefix(&term) {
        Some(rest) => rest.chars().next().map_or(true, |c| !is_word_char(c)),
        None => false,
    }
}
