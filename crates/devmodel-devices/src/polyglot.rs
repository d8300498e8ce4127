/*!
 * Multilingual display text.
 */
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Language used when a requested translation is missing
pub const FALLBACK_LANGUAGE: &str = "en";

/// Display strings keyed by language tag
///
/// Serializes as a flat `{"en": "Gain", "es": "Ganancia"}` map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolyglotText(BTreeMap<String, String>);

impl PolyglotText {
    /// Create an empty text
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a translation, builder style
    pub fn with<L: Into<String>, T: Into<String>>(mut self, language: L, text: T) -> Self {
        self.insert(language, text);
        self
    }

    /// Add or replace a translation
    pub fn insert<L: Into<String>, T: Into<String>>(&mut self, language: L, text: T) {
        self.0.insert(language.into(), text.into());
    }

    /// Translation for `language`, if present
    pub fn get(&self, language: &str) -> Option<&str> {
        self.0.get(language).map(String::as_str)
    }

    /// Best display string for `language`
    ///
    /// Falls back to English, then to any translation.
    pub fn display(&self, language: &str) -> Option<&str> {
        self.get(language)
            .or_else(|| self.get(FALLBACK_LANGUAGE))
            .or_else(|| self.0.values().next().map(String::as_str))
    }

    /// Languages with a translation
    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Whether there are no translations
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<L: Into<String>, T: Into<String>> FromIterator<(L, T)> for PolyglotText {
    fn from_iter<I: IntoIterator<Item = (L, T)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(l, t)| (l.into(), t.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_fallback() {
        let text = PolyglotText::new().with("en", "Gain").with("es", "Ganancia");
        assert_eq!(text.display("es"), Some("Ganancia"));
        assert_eq!(text.display("fr"), Some("Gain"));

        let only_fr: PolyglotText = [("fr", "Gain (fr)")].into_iter().collect();
        assert_eq!(only_fr.display("de"), Some("Gain (fr)"));
        assert_eq!(PolyglotText::new().display("en"), None);
    }

    #[test]
    fn test_serializes_flat() {
        let text = PolyglotText::new().with("en", "Hello");
        assert_eq!(serde_json::to_string(&text).unwrap(), r#"{"en":"Hello"}"#);
        let back: PolyglotText = serde_json::from_str(r#"{"en":"Hello"}"#).unwrap();
        assert_eq!(back, text);
    }
}
