/*!
 * Wire protocol.
 *
 * Each request is one JSON object on its own line, tagged by `method`, and
 * is answered by exactly one [`Response`] line:
 *
 * ```json
 * {"method": "set_value", "slot": 1, "oid": "/gain", "value": {"int32_value": 3}, "token": "st2138:op:w"}
 * {"status": "OK"}
 * ```
 */
use serde::{Deserialize, Serialize};

use devmodel_core::status::StatusCode;
use devmodel_core::types::Value;
use devmodel_devices::{DetailLevel, DeviceError, LanguagePack, SetValueEntry};

/// A client request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Request {
    /// List the populated slots
    GetPopulatedSlots,
    /// Serialize a device
    DeviceRequest {
        /// Device slot
        slot: u32,
        /// Detail level; the device default when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail_level: Option<DetailLevel>,
    },
    /// Read a value
    GetValue {
        /// Device slot
        slot: u32,
        /// Path of the value
        oid: String,
    },
    /// Write a value
    SetValue {
        /// Device slot
        slot: u32,
        /// Path of the value
        oid: String,
        /// New value
        value: Value,
    },
    /// Write several values, all or nothing
    MultiSetValue {
        /// Device slot
        slot: u32,
        /// Values in the order they are applied
        values: Vec<SetValueEntry>,
    },
    /// Run a command
    ExecuteCommand {
        /// Device slot
        slot: u32,
        /// Oid of the command
        oid: String,
        /// Command argument
        #[serde(default = "empty_value")]
        value: Value,
    },
    /// List the language packs of a device
    ListLanguages {
        /// Device slot
        slot: u32,
    },
    /// Fetch one language pack
    LanguagePack {
        /// Device slot
        slot: u32,
        /// Language tag
        language: String,
    },
    /// Add or replace a language pack
    AddLanguage {
        /// Device slot
        slot: u32,
        /// Language tag
        id: String,
        /// The pack
        pack: LanguagePack,
    },
    /// Remove a language pack
    RemoveLanguage {
        /// Device slot
        slot: u32,
        /// Language tag
        id: String,
    },
    /// Change the subscribed oids of a device
    UpdateSubscriptions {
        /// Device slot
        slot: u32,
        /// Oids to subscribe to
        #[serde(default)]
        add: Vec<String>,
        /// Oids to unsubscribe from
        #[serde(default)]
        remove: Vec<String>,
    },
}

fn empty_value() -> Value {
    Value::Empty
}

impl Request {
    /// Method name, used to label logs
    pub fn kind(&self) -> &'static str {
        match self {
            Request::GetPopulatedSlots => "get_populated_slots",
            Request::DeviceRequest { .. } => "device_request",
            Request::GetValue { .. } => "get_value",
            Request::SetValue { .. } => "set_value",
            Request::MultiSetValue { .. } => "multi_set_value",
            Request::ExecuteCommand { .. } => "execute_command",
            Request::ListLanguages { .. } => "list_languages",
            Request::LanguagePack { .. } => "language_pack",
            Request::AddLanguage { .. } => "add_language",
            Request::RemoveLanguage { .. } => "remove_language",
            Request::UpdateSubscriptions { .. } => "update_subscriptions",
        }
    }

    /// Slot the request addresses, if any
    pub fn slot(&self) -> Option<u32> {
        match self {
            Request::GetPopulatedSlots => None,
            Request::DeviceRequest { slot, .. }
            | Request::GetValue { slot, .. }
            | Request::SetValue { slot, .. }
            | Request::MultiSetValue { slot, .. }
            | Request::ExecuteCommand { slot, .. }
            | Request::ListLanguages { slot }
            | Request::LanguagePack { slot, .. }
            | Request::AddLanguage { slot, .. }
            | Request::RemoveLanguage { slot, .. }
            | Request::UpdateSubscriptions { slot, .. } => Some(*slot),
        }
    }
}

/// A request together with the caller's credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Scope claim of the caller, checked when authorization is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// The request
    #[serde(flatten)]
    pub request: Request,
}

impl Envelope {
    /// Wrap a request without credentials
    pub fn new(request: Request) -> Self {
        Self {
            token: None,
            request,
        }
    }

    /// Attach a scope claim, builder style
    pub fn with_token<S: Into<String>>(mut self, token: S) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// The single answer to a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Outcome
    pub status: StatusCode,

    /// Human readable detail, empty on success
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// Result payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl Response {
    /// A successful response
    pub fn ok(body: Option<serde_json::Value>) -> Self {
        Self {
            status: StatusCode::Ok,
            message: String::new(),
            body,
        }
    }

    /// A failed response
    pub fn failure<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            message: message.into(),
            body: None,
        }
    }

    /// The response for a failed device operation
    pub fn from_error(err: &DeviceError) -> Self {
        Self::failure(err.status(), err.to_string())
    }

    /// Whether the request succeeded
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}
