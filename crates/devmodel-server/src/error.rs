/*!
 * Error types for the devmodel server.
 */
use thiserror::Error;

use devmodel_core::error::Error as CoreError;
use devmodel_devices::DeviceError;

/// Error type for the transport
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error on a socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A peer sent something that is not a request
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Device error while starting up
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

/// Result type for the transport
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new protocol error
    pub fn protocol<S: AsRef<str>>(msg: S) -> Self {
        Error::Protocol(msg.as_ref().to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Protocol(err.to_string())
    }
}
