/*!
 * Access scopes.
 *
 * Scopes form a total order `undefined < monitor < operate < configure < administer`
 * and have a canonical wire name in each direction.
 */
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

/// Privilege level required by, or granted for, an operation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum Scope {
    /// No scope
    #[default]
    Undefined,
    /// Read device state
    Monitor,
    /// Operate the device
    Operate,
    /// Configure the device
    Configure,
    /// Administer the device
    Administer,
}

const SCOPE_NAMES: [(Scope, &str); 5] = [
    (Scope::Undefined, "undefined"),
    (Scope::Monitor, "st2138:mon"),
    (Scope::Operate, "st2138:op"),
    (Scope::Configure, "st2138:cfg"),
    (Scope::Administer, "st2138:adm"),
];

/// Suffix that turns a scope claim into a write claim
pub const WRITE_SUFFIX: &str = ":w";

impl Scope {
    /// All scopes in ascending privilege order
    pub const ALL: [Scope; 5] = [
        Scope::Undefined,
        Scope::Monitor,
        Scope::Operate,
        Scope::Configure,
        Scope::Administer,
    ];

    /// Canonical wire name
    pub fn as_str(&self) -> &'static str {
        SCOPE_NAMES
            .iter()
            .find(|(scope, _)| scope == self)
            .map(|(_, name)| *name)
            .unwrap_or("undefined")
    }

    /// Look a scope up by its canonical wire name
    pub fn from_name(name: &str) -> Option<Self> {
        SCOPE_NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(scope, _)| *scope)
    }

    /// Whether a caller holding `self` may act where `required` is needed
    pub fn covers(&self, required: Scope) -> bool {
        *self >= required
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
            .ok_or_else(|| DeviceError::invalid_argument(format!("unknown scope '{}'", s)))
    }
}

impl TryFrom<String> for Scope {
    type Error = DeviceError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_order() {
        for pair in Scope::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert!(Scope::Configure.covers(Scope::Operate));
        assert!(Scope::Operate.covers(Scope::Operate));
        assert!(!Scope::Monitor.covers(Scope::Operate));
    }

    #[test]
    fn test_names_are_bidirectional() {
        for scope in Scope::ALL {
            assert_eq!(Scope::from_name(scope.as_str()), Some(scope));
        }
        assert_eq!("st2138:op".parse::<Scope>().unwrap(), Scope::Operate);
        assert!("st2138:root".parse::<Scope>().is_err());
    }

    #[test]
    fn test_serde_uses_wire_names() {
        assert_eq!(serde_json::to_string(&Scope::Administer).unwrap(), "\"st2138:adm\"");
        let scope: Scope = serde_json::from_str("\"st2138:mon\"").unwrap();
        assert_eq!(scope, Scope::Monitor);
        assert!(serde_json::from_str::<Scope>("\"admin\"").is_err());
    }
}
