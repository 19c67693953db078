//! Locale path segments the guide is published under.

pub const DEFAULT_LOCALE: &str = "en_us";

/// `(code, display label)` in menu order.
pub const LOCALES: &[(&str, &str)] = &[
    ("en_us", "English (en_us)"),
    ("ja_jp", "日本語 (ja_jp)"),
    ("ko_kr", "한국어 (ko_kr)"),
    ("pt_br", "Português (pt_br)"),
    ("ru_ru", "Русский (ru_ru)"),
    ("uk_ua", "Українська (uk_ua)"),
    ("zh_cn", "简体中文 (zh_cn)"),
    ("zh_hk", "香港繁體 (zh_hk)"),
    ("zh_tw", "繁體中文 (zh_tw)"),
];

pub fn is_known_locale(code: &str) -> bool {
    LOCALES.iter().any(|(c, _)| *c == code)
}

/// Display label; unknown codes label themselves.
pub fn locale_label(code: &str) -> &str {
    LOCALES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, l)| *l)
        .unwrap_or(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_locales_and_labels() {
        assert!(is_known_locale(DEFAULT_LOCALE));
        assert!(is_known_locale("zh_tw"));
        assert!(!is_known_locale("en_gb"));
        assert_eq!(locale_label("pt_br"), "Português (pt_br)");
        assert_eq!(locale_label("xx_yy"), "xx_yy");
    }
}
