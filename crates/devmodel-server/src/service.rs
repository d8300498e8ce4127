/*!
 * Request dispatcher.
 *
 * The [`Service`] turns one [`Envelope`] into one [`Response`]. It resolves
 * the caller's scopes, looks the device up in the registry, locks it once
 * and runs a single device operation. A panic anywhere below is caught here
 * and reported as `UNKNOWN`.
 */
use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;
use tracing::{debug, error};

use devmodel_core::error::Error as CoreError;
use devmodel_core::logging::request_span;
use devmodel_core::status::StatusCode;
use devmodel_core::types::RequestId;
use devmodel_devices::{Authorizer, DeviceError, Result, SharedDeviceRegistry};

use crate::protocol::{Envelope, Request, Response};

type Body = Option<serde_json::Value>;

/// Dispatches requests to the registered devices
#[derive(Debug, Clone)]
pub struct Service {
    registry: SharedDeviceRegistry,
    authorization_enabled: bool,
}

impl Service {
    /// Create a service over `registry`
    pub fn new(registry: SharedDeviceRegistry, authorization_enabled: bool) -> Self {
        Self {
            registry,
            authorization_enabled,
        }
    }

    /// The device registry
    pub fn registry(&self) -> &SharedDeviceRegistry {
        &self.registry
    }

    /// Whether callers must present a scope claim
    pub fn authorization_enabled(&self) -> bool {
        self.authorization_enabled
    }

    /// Handle one request
    pub fn handle(&self, envelope: Envelope) -> Response {
        let span = request_span(RequestId::next(), envelope.request.kind(), envelope.request.slot());
        let _entered = span.enter();

        match panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(envelope))) {
            Ok(Ok(body)) => Response::ok(body),
            Ok(Err(e)) => {
                debug!("Request failed: {}", e);
                Response::from_error(&e)
            }
            Err(_) => {
                error!("Request panicked");
                Response::failure(StatusCode::Unknown, "Unexpected failure while handling request")
            }
        }
    }

    fn authorizer(&self, token: Option<&str>) -> Result<Authorizer> {
        if !self.authorization_enabled {
            return Ok(Authorizer::disabled());
        }
        match token.map(str::trim) {
            Some(claim) if !claim.is_empty() => Authorizer::from_scope_claim(claim),
            _ => Err(DeviceError::Unauthenticated("missing scope claim".to_string())),
        }
    }

    fn dispatch(&self, envelope: Envelope) -> Result<Body> {
        let authz = self.authorizer(envelope.token.as_deref())?;
        let registry = self.registry.registry();

        if let Request::GetPopulatedSlots = envelope.request {
            return body(&serde_json::json!({ "slots": registry.populated_slots()? }));
        }

        let slot = envelope
            .request
            .slot()
            .ok_or_else(|| DeviceError::invalid_argument("request does not name a slot"))?;
        let device = registry.get(slot)?;
        let mut model = device.lock()?;

        match envelope.request {
            Request::GetPopulatedSlots => Ok(None),
            Request::DeviceRequest { detail_level, .. } => {
                let level = detail_level.unwrap_or_else(|| model.detail_level());
                body(&model.serialize(level, &authz)?)
            }
            Request::GetValue { oid, .. } => body(&model.get_value(&oid, &authz)?),
            Request::SetValue { oid, value, .. } => {
                model.set_value(&oid, value, &authz)?;
                Ok(None)
            }
            Request::MultiSetValue { values, .. } => {
                model.multi_set_value(values, &authz)?;
                Ok(None)
            }
            Request::ExecuteCommand { oid, value, .. } => {
                body(&model.execute_command(&oid, value, &authz)?)
            }
            Request::ListLanguages { .. } => {
                body(&serde_json::json!({ "languages": model.list_languages(&authz)? }))
            }
            Request::LanguagePack { language, .. } => {
                body(&model.get_language_pack(&language, &authz)?)
            }
            Request::AddLanguage { id, pack, .. } => {
                model.add_language(&id, pack, &authz)?;
                Ok(None)
            }
            Request::RemoveLanguage { id, .. } => {
                model.remove_language(&id, &authz)?;
                Ok(None)
            }
            Request::UpdateSubscriptions { add, remove, .. } => {
                let oids = model.update_subscriptions(&add, &remove, &authz)?;
                body(&serde_json::json!({ "oids": oids }))
            }
        }
    }
}

fn body<T: Serialize>(value: &T) -> Result<Body> {
    let value = serde_json::to_value(value).map_err(CoreError::from)?;
    Ok(Some(value))
}
