/*!
 * devmodel core
 *
 * This crate provides the shared foundations for the devmodel system:
 * the wire value type, status codes, configuration, and logging.
 */

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod status;
pub mod types;
pub mod utils;

/// Re-export of dependencies that are part of the public API
pub mod deps {
    pub use serde;
    pub use serde_json;
    pub use tokio;
    pub use tracing;
}

/// devmodel core crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library initialization with the default log filter
pub fn init() -> Result<(), error::Error> {
    logging::init()?;
    tracing::info!("devmodel core {} initialized", VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
