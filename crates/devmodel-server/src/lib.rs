/*!
 * devmodel Server
 *
 * This crate provides the transport front end for devmodel devices: the
 * newline delimited JSON protocol, the request dispatcher and the TCP
 * server used by the `devmodeld` daemon.
 */

#![warn(missing_docs)]

pub mod error;
pub mod protocol;
pub mod server;
pub mod service;

pub use error::{Error, Result};
pub use protocol::{Envelope, Request, Response};
pub use server::Server;
pub use service::Service;

/// devmodel server crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the server crate
pub fn init() -> std::result::Result<(), devmodel_core::error::Error> {
    tracing::info!("devmodel Server {} initialized", VERSION);
    Ok(())
}
