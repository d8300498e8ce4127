/*!
 * Prelude module for devmodel core.
 *
 * This module re-exports commonly used types and functions from the core crate
 * to make them easier to import.
 */

// Re-export error types
pub use crate::error::{Error, Result};

// Re-export status codes
pub use crate::status::StatusCode;

// Re-export core types
pub use crate::types::{RequestId, StructFields, Value};

// Re-export config types
pub use crate::config::{Config, ConfigBuilder};

// Re-export logging helpers
pub use crate::logging::{component_span, request_span};
pub use tracing::{debug, error, info, trace, warn};

// Re-export utility functions
pub use crate::utils::{spawn_and_log, with_timeout};

// Re-export core initialization
pub use crate::init;
