/*!
 * Request status codes.
 *
 * Every request crossing the device boundary ends in exactly one of these
 * codes plus a human-readable message.
 */
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Closed set of status codes a request can finish with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    /// Success
    Ok,
    /// Unexpected internal failure caught at the transport boundary
    Unknown,
    /// Constraint violation or malformed request
    InvalidArgument,
    /// Path, slot, tag or language could not be resolved
    NotFound,
    /// The item being created already exists
    AlreadyExists,
    /// Caller scope is insufficient for the operation
    PermissionDenied,
    /// The device is not in a state that allows the operation
    FailedPrecondition,
    /// Array index outside the valid range
    OutOfRange,
    /// Operation is not implemented for this item
    Unimplemented,
    /// Internal invariant broken (e.g. poisoned lock)
    Internal,
    /// Caller credentials could not be validated
    Unauthenticated,
}

const STATUS_NAMES: [(StatusCode, &str); 11] = [
    (StatusCode::Ok, "OK"),
    (StatusCode::Unknown, "UNKNOWN"),
    (StatusCode::InvalidArgument, "INVALID_ARGUMENT"),
    (StatusCode::NotFound, "NOT_FOUND"),
    (StatusCode::AlreadyExists, "ALREADY_EXISTS"),
    (StatusCode::PermissionDenied, "PERMISSION_DENIED"),
    (StatusCode::FailedPrecondition, "FAILED_PRECONDITION"),
    (StatusCode::OutOfRange, "OUT_OF_RANGE"),
    (StatusCode::Unimplemented, "UNIMPLEMENTED"),
    (StatusCode::Internal, "INTERNAL"),
    (StatusCode::Unauthenticated, "UNAUTHENTICATED"),
];

impl StatusCode {
    /// Canonical wire name of the code
    pub fn as_str(&self) -> &'static str {
        STATUS_NAMES
            .iter()
            .find(|(code, _)| code == self)
            .map(|(_, name)| *name)
            .unwrap_or("UNKNOWN")
    }

    /// Look a code up by its canonical wire name
    pub fn from_name(name: &str) -> Option<Self> {
        STATUS_NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(code, _)| *code)
    }

    /// Whether this is the success code
    pub fn is_ok(&self) -> bool {
        matches!(self, StatusCode::Ok)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("unknown status code '{}'", s))
    }
}
