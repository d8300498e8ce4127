/*!
 * Param subscriptions.
 *
 * A device tracks the oids its clients have subscribed to. An oid whose
 * last segment is `*` subscribes to everything below its prefix.
 */
use std::collections::BTreeSet;

use crate::error::{DeviceError, Result};
use crate::path::Path;

const WILDCARD: &str = "/*";

/// Subscribed oids of one device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscriptions {
    oids: BTreeSet<String>,
}

impl Subscriptions {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that `oid` is a path or a wildcard prefix, returning the path part
    pub fn parse(oid: &str) -> Result<Path> {
        let path = match oid.strip_suffix(WILDCARD) {
            Some(prefix) => Path::parse(prefix)?,
            None => Path::parse(oid)?,
        };
        if path.is_empty() && oid != WILDCARD {
            return Err(DeviceError::invalid_argument("cannot subscribe to an empty oid"));
        }
        Ok(path)
    }

    /// Add a subscription; returns false if it was already present
    pub fn add(&mut self, oid: &str) -> Result<bool> {
        Self::parse(oid)?;
        Ok(self.oids.insert(oid.to_string()))
    }

    /// Remove a subscription; returns false if it was not present
    pub fn remove(&mut self, oid: &str) -> bool {
        self.oids.remove(oid)
    }

    /// Whether `oid` is covered by a subscription
    pub fn is_subscribed(&self, oid: &str) -> bool {
        self.oids.iter().any(|sub| match sub.strip_suffix(WILDCARD) {
            Some(prefix) => {
                oid == prefix || oid.strip_prefix(prefix).map_or(false, |r| r.starts_with('/'))
            }
            None => sub == oid,
        })
    }

    /// Whether any subscription covers `oid` or something below it
    pub fn touches(&self, oid: &str) -> bool {
        self.is_subscribed(oid)
            || self.oids.iter().any(|sub| {
                sub.strip_prefix(oid).map_or(false, |rest| rest.starts_with('/'))
            })
    }

    /// All subscriptions in ascending order
    pub fn list(&self) -> Vec<String> {
        self.oids.iter().cloned().collect()
    }

    /// Number of subscriptions
    pub fn len(&self) -> usize {
        self.oids.len()
    }

    /// Whether there are no subscriptions
    pub fn is_empty(&self) -> bool {
        self.oids.is_empty()
    }
}
