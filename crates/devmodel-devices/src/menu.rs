/*!
 * Menu groups.
 *
 * Menus only organize params and commands for client UIs; they carry no
 * state of their own.
 */
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::polyglot::PolyglotText;

/// One menu inside a group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Menu {
    /// Display name
    #[serde(default)]
    pub name: PolyglotText,

    /// Whether the menu is hidden
    #[serde(default)]
    pub hidden: bool,

    /// Whether the menu is disabled
    #[serde(default)]
    pub disabled: bool,

    /// Oids of the params shown in the menu
    #[serde(default)]
    pub param_oids: Vec<String>,

    /// Oids of the commands shown in the menu
    #[serde(default)]
    pub command_oids: Vec<String>,

    /// Free-form hints for client UIs
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub client_hints: BTreeMap<String, String>,
}

/// A named group of menus
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MenuGroup {
    /// Display name
    #[serde(default)]
    pub name: PolyglotText,

    /// Menus keyed by oid
    #[serde(default)]
    pub menus: BTreeMap<String, Menu>,
}

impl MenuGroup {
    /// Create an empty group
    pub fn new(name: PolyglotText) -> Self {
        Self {
            name,
            menus: BTreeMap::new(),
        }
    }

    /// Add a menu, builder style
    pub fn with_menu<S: Into<String>>(mut self, oid: S, menu: Menu) -> Self {
        self.menus.insert(oid.into(), menu);
        self
    }
}
