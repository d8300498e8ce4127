/*!
 * Caller authorization.
 *
 * An [`Authorizer`] carries the scopes resolved for one caller and answers
 * whether that caller may read or write at a given scope.
 */
use tracing::debug;

use crate::error::{DeviceError, Result};
use crate::scope::{Scope, WRITE_SUFFIX};

/// Resolved permissions of one caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorizer {
    enabled: bool,
    read: Scope,
    write: Scope,
}

impl Authorizer {
    /// An authorizer that permits every read and write
    ///
    /// Read-only targets still refuse writes.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            read: Scope::Administer,
            write: Scope::Administer,
        }
    }

    /// An authorizer granting read and write up to `scope`
    pub fn with_scope(scope: Scope) -> Self {
        Self {
            enabled: true,
            read: scope,
            write: scope,
        }
    }

    /// Build an authorizer from a space separated scope claim
    ///
    /// `"st2138:mon st2138:op:w"` grants reads up to operate and writes up
    /// to operate. A plain scope grants reads, a scope with the `:w` suffix
    /// grants reads and writes. Unrecognized claims are ignored.
    pub fn from_scope_claim(claim: &str) -> Result<Self> {
        let mut read = Scope::Undefined;
        let mut write = Scope::Undefined;
        let mut recognized = 0usize;

        for token in claim.split_whitespace() {
            let (name, writable) = match token.strip_suffix(WRITE_SUFFIX) {
                Some(name) => (name, true),
                None => (token, false),
            };
            match Scope::from_name(name) {
                Some(scope) => {
                    recognized += 1;
                    read = read.max(scope);
                    if writable {
                        write = write.max(scope);
                    }
                }
                None => debug!("Ignoring unrecognized scope claim '{}'", token),
            }
        }

        if recognized == 0 && !claim.trim().is_empty() {
            return Err(DeviceError::Unauthenticated(format!(
                "no recognized scope in claim '{}'",
                claim
            )));
        }

        Ok(Self {
            enabled: true,
            read,
            write,
        })
    }

    /// Whether authorization is being enforced
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Highest scope this caller may read at
    pub fn read_scope(&self) -> Scope {
        self.read
    }

    /// Highest scope this caller may write at
    pub fn write_scope(&self) -> Scope {
        self.write
    }

    /// Whether the caller may read at `scope`
    pub fn can_read(&self, scope: Scope) -> bool {
        !self.enabled || self.read.covers(scope)
    }

    /// Whether the caller may write at `scope`
    pub fn can_write(&self, scope: Scope) -> bool {
        !self.enabled || self.write.covers(scope)
    }

    /// Fail with `PERMISSION_DENIED` unless the caller may read at `scope`
    pub fn check_read(&self, scope: Scope, what: &str) -> Result<()> {
        if self.can_read(scope) {
            Ok(())
        } else {
            Err(DeviceError::permission_denied(format!(
                "reading {} requires scope {}",
                what, scope
            )))
        }
    }

    /// Fail with `PERMISSION_DENIED` unless the caller may write a target
    /// with the given scope and read-only flag
    pub fn check_write(&self, scope: Scope, read_only: bool, what: &str) -> Result<()> {
        if read_only {
            return Err(DeviceError::permission_denied(format!("{} is read-only", what)));
        }
        if self.can_write(scope) {
            Ok(())
        } else {
            Err(DeviceError::permission_denied(format!(
                "writing {} requires scope {}{}",
                what, scope, WRITE_SUFFIX
            )))
        }
    }
}

impl Default for Authorizer {
    fn default() -> Self {
        Self::disabled()
    }
}
