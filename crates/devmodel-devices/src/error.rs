/*!
 * Error type crossing the device boundary.
 *
 * Every failure of a device operation is one of these variants, and every
 * variant maps to exactly one [`StatusCode`].
 */
use thiserror::Error;

use devmodel_core::error::Error as CoreError;
use devmodel_core::status::StatusCode;

/// Error type for device operations
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Constraint violation, type mismatch or malformed request
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Path, slot, item or language could not be resolved
    #[error("Not found: {0}")]
    NotFound(String),

    /// The item being created already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Caller scope is insufficient, or the target is read-only
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The device is configured in a way that forbids the operation
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// Array index outside the valid range
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// The operation is not implemented for the addressed item
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// Internal invariant broken, e.g. a poisoned device lock
    #[error("Internal error: {0}")]
    Internal(String),

    /// Caller credentials could not be validated
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Business logic failed unexpectedly
    #[error("Unknown error: {0}")]
    Unknown(String),

    /// Core error
    #[error("Core error: {0}")]
    CoreError(#[from] CoreError),
}

/// Result type for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;

impl DeviceError {
    /// Create a new invalid argument error
    pub fn invalid_argument<S: AsRef<str>>(msg: S) -> Self {
        DeviceError::InvalidArgument(msg.as_ref().to_string())
    }

    /// Create a new not found error
    pub fn not_found<S: AsRef<str>>(msg: S) -> Self {
        DeviceError::NotFound(msg.as_ref().to_string())
    }

    /// Create a new permission denied error
    pub fn permission_denied<S: AsRef<str>>(msg: S) -> Self {
        DeviceError::PermissionDenied(msg.as_ref().to_string())
    }

    /// Create a new out of range error
    pub fn out_of_range<S: AsRef<str>>(msg: S) -> Self {
        DeviceError::OutOfRange(msg.as_ref().to_string())
    }

    /// Create a new internal error
    pub fn internal<S: AsRef<str>>(msg: S) -> Self {
        DeviceError::Internal(msg.as_ref().to_string())
    }

    /// The status code reported to the client for this error
    pub fn status(&self) -> StatusCode {
        match self {
            DeviceError::InvalidArgument(_) => StatusCode::InvalidArgument,
            DeviceError::NotFound(_) => StatusCode::NotFound,
            DeviceError::AlreadyExists(_) => StatusCode::AlreadyExists,
            DeviceError::PermissionDenied(_) => StatusCode::PermissionDenied,
            DeviceError::FailedPrecondition(_) => StatusCode::FailedPrecondition,
            DeviceError::OutOfRange(_) => StatusCode::OutOfRange,
            DeviceError::Unimplemented(_) => StatusCode::Unimplemented,
            DeviceError::Internal(_) => StatusCode::Internal,
            DeviceError::Unauthenticated(_) => StatusCode::Unauthenticated,
            DeviceError::Unknown(_) => StatusCode::Unknown,
            DeviceError::CoreError(e) => e.status(),
        }
    }

    /// Prefix the message with the oid the error relates to
    pub fn at(self, oid: &str) -> Self {
        let wrap = |msg: String| format!("{}: {}", oid, msg);
        match self {
            DeviceError::InvalidArgument(m) => DeviceError::InvalidArgument(wrap(m)),
            DeviceError::NotFound(m) => DeviceError::NotFound(wrap(m)),
            DeviceError::AlreadyExists(m) => DeviceError::AlreadyExists(wrap(m)),
            DeviceError::PermissionDenied(m) => DeviceError::PermissionDenied(wrap(m)),
            DeviceError::FailedPrecondition(m) => DeviceError::FailedPrecondition(wrap(m)),
            DeviceError::OutOfRange(m) => DeviceError::OutOfRange(wrap(m)),
            DeviceError::Unimplemented(m) => DeviceError::Unimplemented(wrap(m)),
            DeviceError::Internal(m) => DeviceError::Internal(wrap(m)),
            DeviceError::Unauthenticated(m) => DeviceError::Unauthenticated(wrap(m)),
            DeviceError::Unknown(m) => DeviceError::Unknown(wrap(m)),
            other => other,
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for DeviceError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        DeviceError::Internal(format!("lock poisoned: {}", err))
    }
}
