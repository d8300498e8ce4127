/*!
 * Language packs.
 *
 * A [`LanguagePack`] maps text keys to localized strings for one language.
 * [`LanguagePacks`] is the device's collection of packs keyed by language
 * tag, and remembers which packs shipped with the device model.
 */
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collection::{Collection, ItemKind};
use crate::error::{DeviceError, Result};

/// Localized strings for one language
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguagePack {
    /// Human readable language name, e.g. "English"
    #[serde(default)]
    pub name: String,

    /// Text key to localized string
    #[serde(default)]
    pub words: BTreeMap<String, String>,
}

impl LanguagePack {
    /// Create an empty pack
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            words: BTreeMap::new(),
        }
    }

    /// Add a word, builder style
    pub fn with_word<K: Into<String>, V: Into<String>>(mut self, key: K, text: V) -> Self {
        self.words.insert(key.into(), text.into());
        self
    }

    /// Localized string for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.words.get(key).map(String::as_str)
    }

    /// Merge `incoming` into this pack
    ///
    /// New keys are added, existing keys overwritten, keys absent from
    /// `incoming` retained. A non-empty incoming name replaces the name.
    pub fn merge(&mut self, incoming: LanguagePack) {
        if !incoming.name.is_empty() {
            self.name = incoming.name;
        }
        self.words.extend(incoming.words);
    }

    /// Merge a serialized pack into this one
    pub fn merge_json(&mut self, json: &str) -> Result<()> {
        let incoming: LanguagePack = serde_json::from_str(json)
            .map_err(|e| DeviceError::invalid_argument(format!("malformed language pack: {}", e)))?;
        self.merge(incoming);
        Ok(())
    }
}

/// A language pack together with the tag it is stored under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentLanguagePack {
    /// Language tag
    pub language: String,
    /// The pack
    pub language_pack: LanguagePack,
}

/// A device's language packs, keyed by language tag
#[derive(Debug, Clone)]
pub struct LanguagePacks {
    packs: Collection<LanguagePack>,
    shipped: BTreeSet<String>,
}

impl LanguagePacks {
    /// Create an empty collection
    pub fn new() -> Self {
        Self {
            packs: Collection::new(ItemKind::LanguagePack),
            shipped: BTreeSet::new(),
        }
    }

    /// Store `pack` under `tag`, overwriting any pack already there
    pub fn add_pack<S: Into<String>>(&mut self, tag: S, pack: LanguagePack) -> Option<LanguagePack> {
        self.packs.insert(tag, pack)
    }

    /// Store a pack that shipped with the device model
    pub fn add_shipped<S: Into<String>>(&mut self, tag: S, pack: LanguagePack) {
        let tag = tag.into();
        self.shipped.insert(tag.clone());
        self.packs.insert(tag, pack);
    }

    /// Look a pack up by tag
    pub fn get_pack(&self, tag: &str) -> Result<&LanguagePack> {
        self.packs
            .get(tag)
            .ok_or_else(|| DeviceError::not_found(format!("language pack '{}'", tag)))
    }

    /// Remove a pack
    pub fn remove_pack(&mut self, tag: &str) -> Option<LanguagePack> {
        self.shipped.remove(tag);
        self.packs.remove(tag)
    }

    /// Whether `tag` shipped with the device model
    pub fn is_shipped(&self, tag: &str) -> bool {
        self.shipped.contains(tag)
    }

    /// All tags, in ascending order
    pub fn list_tags(&self) -> Vec<String> {
        self.packs.keys().map(str::to_string).collect()
    }

    /// Number of packs
    pub fn len(&self) -> usize {
        self.packs.len()
    }

    /// Whether there are no packs
    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }

    /// Store a fresh pack under `tag` filled from `incoming`
    ///
    /// Words of a pack previously stored under `tag` are dropped.
    pub fn replace_pack(&mut self, tag: &str, incoming: LanguagePack) -> Option<LanguagePack> {
        debug!("Filling language pack '{}' with {} words", tag, incoming.words.len());
        let mut pack = LanguagePack::default();
        pack.merge(incoming);
        self.packs.insert(tag, pack)
    }
}

impl Default for LanguagePacks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_list() {
        let mut packs = LanguagePacks::new();
        assert!(packs.list_tags().is_empty());

        packs.add_pack("en", LanguagePack::new("English").with_word("hello", "Hello"));
        assert_eq!(packs.list_tags(), vec!["en".to_string()]);
        assert_eq!(packs.get_pack("en").unwrap().get("hello"), Some("Hello"));
        assert!(matches!(packs.get_pack("fr"), Err(DeviceError::NotFound(_))));
    }

    #[test]
    fn test_add_overwrites() {
        let mut packs = LanguagePacks::new();
        packs.add_pack("en", LanguagePack::new("English").with_word("hello", "Hello"));
        let previous = packs.add_pack("en", LanguagePack::new("English").with_word("bye", "Bye"));
        assert!(previous.is_some());
        let pack = packs.get_pack("en").unwrap();
        assert_eq!(pack.get("hello"), None);
        assert_eq!(pack.get("bye"), Some("Bye"));
    }

    #[test]
    fn test_replace_drops_previous_words() {
        let mut packs = LanguagePacks::new();
        packs.replace_pack("fr", LanguagePack::new("Français").with_word("hello", "Bonjour"));
        let previous = packs.replace_pack("fr", LanguagePack::new("Français").with_word("bye", "Au revoir"));
        assert_eq!(previous.unwrap().get("hello"), Some("Bonjour"));

        let pack = packs.get_pack("fr").unwrap();
        assert_eq!(pack.name, "Français");
        assert_eq!(pack.get("hello"), None);
        assert_eq!(pack.get("bye"), Some("Au revoir"));
    }

    #[test]
    fn test_merge_keeps_untouched_keys() {
        let mut pack = LanguagePack::new("English")
            .with_word("hello", "Hello")
            .with_word("bye", "Bye");
        pack.merge_json(r#"{"words": {"hello": "Hi", "thanks": "Thanks"}}"#)
            .unwrap();
        assert_eq!(pack.name, "English");
        assert_eq!(pack.get("hello"), Some("Hi"));
        assert_eq!(pack.get("bye"), Some("Bye"));
        assert_eq!(pack.get("thanks"), Some("Thanks"));

        assert!(pack.merge_json("{not json").is_err());
    }

    #[test]
    fn test_round_trip_is_lossless() {
        let original = LanguagePack::new("Español")
            .with_word("hello", "Hola")
            .with_word("greeting", "¿Qué tal?");
        let json = serde_json::to_string(&original).unwrap();
        let mut restored = LanguagePack::default();
        restored.merge_json(&json).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_shipped_tracking() {
        let mut packs = LanguagePacks::new();
        packs.add_shipped("en", LanguagePack::new("English"));
        packs.replace_pack("fr", LanguagePack::new("Français").with_word("hello", "Bonjour"));
        assert!(packs.is_shipped("en"));
        assert!(!packs.is_shipped("fr"));
        assert_eq!(packs.list_tags(), vec!["en".to_string(), "fr".to_string()]);

        packs.remove_pack("en");
        assert!(!packs.is_shipped("en"));
        assert_eq!(packs.len(), 1);
    }
}
