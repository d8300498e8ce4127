/*!
 * devmodel Devices
 *
 * This crate provides the device model: slot-addressed devices holding
 * params, commands, menu groups and language packs, together with scope
 * based authorization, value constraints and the device registry.
 */

#![warn(missing_docs)]

// Re-export core types
pub use devmodel_core::prelude;

pub mod authorization;
pub mod collection;
pub mod command;
pub mod constraint;
pub mod detail_level;
pub mod device;
pub mod error;
pub mod language;
pub mod menu;
pub mod model;
pub mod param;
pub mod path;
pub mod polyglot;
pub mod registry;
pub mod scope;
pub mod subscription;

pub use authorization::Authorizer;
pub use command::{Command, CommandHandler, CommandResponse};
pub use detail_level::DetailLevel;
pub use device::{Device, DeviceEvent, DeviceModel, DeviceSnapshot, SetValueEntry};
pub use error::{DeviceError, Result};
pub use language::{ComponentLanguagePack, LanguagePack, LanguagePacks};
pub use model::DeviceModelSpec;
pub use param::{Param, ParamSpec, ParamType};
pub use registry::{DeviceRegistry, RegistryEvent, SharedDeviceRegistry};
pub use scope::Scope;

/// devmodel devices crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the device system
pub fn init() -> std::result::Result<(), devmodel_core::error::Error> {
    tracing::info!("devmodel Devices {} initialized", VERSION);
    Ok(())
}
