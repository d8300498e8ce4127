/*!
 * Commands.
 *
 * A command is shaped like a param (it has a type, a scope and optionally a
 * constraint on its argument) but represents an action. Business logic
 * attaches a handler that runs when a client executes the command.
 */
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use devmodel_core::types::Value;

use crate::param::{Param, ParamSpec};

/// Outcome of a command execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandResponse {
    /// The command produced a value
    Response(Value),
    /// The command completed without a value
    NoResponse,
    /// The command failed in a command-specific way
    Exception {
        /// Exception type
        #[serde(rename = "type")]
        kind: String,
        /// Human readable details
        details: String,
    },
}

impl CommandResponse {
    /// Build an exception response
    pub fn exception<K: Into<String>, D: Into<String>>(kind: K, details: D) -> Self {
        CommandResponse::Exception {
            kind: kind.into(),
            details: details.into(),
        }
    }
}

/// Function run when a command is executed
///
/// Handlers run while the device lock is held and must not lock the device
/// themselves.
pub type CommandHandler = Arc<dyn Fn(Value) -> CommandResponse + Send + Sync>;

/// A command item
#[derive(Clone)]
pub struct Command {
    param: Param,
    handler: Option<CommandHandler>,
}

impl Command {
    /// Wrap a param describing the command's argument
    pub fn new(param: Param) -> Self {
        Self {
            param,
            handler: None,
        }
    }

    /// Attach the handler, builder style
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(Value) -> CommandResponse + Send + Sync + 'static,
    {
        self.set_handler(Arc::new(handler));
        self
    }

    /// Replace the handler
    pub fn set_handler(&mut self, handler: CommandHandler) {
        self.handler = Some(handler);
    }

    /// The param describing the command
    pub fn param(&self) -> &Param {
        &self.param
    }

    /// Oid of the command
    pub fn oid(&self) -> &str {
        self.param.oid()
    }

    /// Whether a handler is attached
    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// The attached handler
    pub fn handler(&self) -> Option<&CommandHandler> {
        self.handler.as_ref()
    }

    /// Describe the command to clients
    pub fn to_spec(&self) -> ParamSpec {
        let mut spec = self.param.to_spec();
        spec.value = None;
        spec
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("oid", &self.oid())
            .field("has_handler", &self.has_handler())
            .finish()
    }
}
