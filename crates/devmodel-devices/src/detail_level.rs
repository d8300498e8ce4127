/*!
 * Detail levels for device snapshots.
 */
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

/// Requested breadth of a device snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DetailLevel {
    /// Every param, command, menu group and language pack name
    #[default]
    Full,
    /// Only params the client has subscribed to
    Subscriptions,
    /// Only identity information about the device
    Minimal,
    /// Only commands
    Commands,
    /// Slot only
    None,
}

const DETAIL_LEVEL_NAMES: [(DetailLevel, &str); 5] = [
    (DetailLevel::Full, "FULL"),
    (DetailLevel::Subscriptions, "SUBSCRIPTIONS"),
    (DetailLevel::Minimal, "MINIMAL"),
    (DetailLevel::Commands, "COMMANDS"),
    (DetailLevel::None, "NONE"),
];

impl DetailLevel {
    /// Canonical wire name
    pub fn as_str(&self) -> &'static str {
        DETAIL_LEVEL_NAMES
            .iter()
            .find(|(level, _)| level == self)
            .map(|(_, name)| *name)
            .unwrap_or("FULL")
    }

    /// Look a level up by its canonical wire name
    pub fn from_name(name: &str) -> Option<Self> {
        DETAIL_LEVEL_NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(level, _)| *level)
    }
}

impl fmt::Display for DetailLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetailLevel {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
            .ok_or_else(|| DeviceError::invalid_argument(format!("unknown detail level '{}'", s)))
    }
}

impl TryFrom<String> for DetailLevel {
    type Error = DeviceError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DetailLevel> for String {
    fn from(level: DetailLevel) -> Self {
        level.as_str().to_string()
    }
}
