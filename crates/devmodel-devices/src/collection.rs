/*!
 * Keyed item collections.
 *
 * A device keeps one [`Collection`] per item kind. Inserting under an
 * existing key replaces the previous item and hands it back to the caller.
 */
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::Command;
use crate::language::LanguagePack;
use crate::menu::MenuGroup;
use crate::param::Param;

/// Kind of item a device stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// A param
    Param,
    /// A command
    Command,
    /// A menu group
    MenuGroup,
    /// A language pack
    LanguagePack,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemKind::Param => "param",
            ItemKind::Command => "command",
            ItemKind::MenuGroup => "menu group",
            ItemKind::LanguagePack => "language pack",
        };
        f.write_str(name)
    }
}

/// An owned item of any kind
#[derive(Debug, Clone)]
pub enum Item {
    /// A param
    Param(Param),
    /// A command
    Command(Command),
    /// A menu group
    MenuGroup(MenuGroup),
    /// A language pack
    LanguagePack(LanguagePack),
}

impl Item {
    /// Kind of the item
    pub fn kind(&self) -> ItemKind {
        match self {
            Item::Param(_) => ItemKind::Param,
            Item::Command(_) => ItemKind::Command,
            Item::MenuGroup(_) => ItemKind::MenuGroup,
            Item::LanguagePack(_) => ItemKind::LanguagePack,
        }
    }
}

/// A borrowed item of any kind
#[derive(Debug, Clone, Copy)]
pub enum ItemRef<'a> {
    /// A param
    Param(&'a Param),
    /// A command
    Command(&'a Command),
    /// A menu group
    MenuGroup(&'a MenuGroup),
    /// A language pack
    LanguagePack(&'a LanguagePack),
}

impl ItemRef<'_> {
    /// Kind of the item
    pub fn kind(&self) -> ItemKind {
        match self {
            ItemRef::Param(_) => ItemKind::Param,
            ItemRef::Command(_) => ItemKind::Command,
            ItemRef::MenuGroup(_) => ItemKind::MenuGroup,
            ItemRef::LanguagePack(_) => ItemKind::LanguagePack,
        }
    }
}

/// Items of one kind, keyed by name in ascending order
#[derive(Debug, Clone)]
pub struct Collection<T> {
    kind: ItemKind,
    items: BTreeMap<String, T>,
}

impl<T> Collection<T> {
    /// Create an empty collection
    pub fn new(kind: ItemKind) -> Self {
        Self {
            kind,
            items: BTreeMap::new(),
        }
    }

    /// Kind of the stored items
    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    /// Store `item` under `key`, returning the item it replaced
    pub fn insert<S: Into<String>>(&mut self, key: S, item: T) -> Option<T> {
        let key = key.into();
        let previous = self.items.insert(key.clone(), item);
        if previous.is_some() {
            debug!("Replaced {} '{}'", self.kind, key);
        }
        previous
    }

    /// Look an item up
    pub fn get(&self, key: &str) -> Option<&T> {
        self.items.get(key)
    }

    /// Look an item up for modification
    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        self.items.get_mut(key)
    }

    /// Remove an item
    pub fn remove(&mut self, key: &str) -> Option<T> {
        self.items.remove(key)
    }

    /// Whether `key` is present
    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    /// Keys in ascending order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    /// Items in ascending key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_overwrites_and_returns_previous() {
        let mut groups: Collection<MenuGroup> = Collection::new(ItemKind::MenuGroup);
        assert!(groups.insert("status", MenuGroup::default()).is_none());
        let previous = groups.insert("status", MenuGroup::default());
        assert!(previous.is_some());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups.kind(), ItemKind::MenuGroup);
    }

    #[test]
    fn test_keys_are_ordered() {
        let mut packs: Collection<LanguagePack> = Collection::new(ItemKind::LanguagePack);
        packs.insert("fr", LanguagePack::default());
        packs.insert("en", LanguagePack::default());
        packs.insert("es", LanguagePack::default());
        assert_eq!(packs.keys().collect::<Vec<_>>(), vec!["en", "es", "fr"]);
        assert!(packs.contains("es"));
        assert!(packs.remove("es").is_some());
        assert!(packs.get("es").is_none());
    }
}
