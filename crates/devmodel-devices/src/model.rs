/*!
 * Device model files.
 *
 * A [`DeviceModelSpec`] describes one device: its slot, flags, shared
 * constraints, params, commands, menu groups and the language packs it
 * ships with. Specs are read from JSON or TOML and built into a [`Device`].
 */
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use devmodel_core::config::ModelConfig;
use devmodel_core::error::Error as CoreError;

use crate::collection::Item;
use crate::constraint::ConstraintSpec;
use crate::detail_level::DetailLevel;
use crate::device::{Device, DeviceModel};
use crate::error::{DeviceError, Result};
use crate::language::LanguagePack;
use crate::menu::MenuGroup;
use crate::param::{ParamContext, ParamSpec};
use crate::scope::Scope;

fn default_scope() -> Scope {
    Scope::Operate
}

fn enabled() -> bool {
    true
}

/// Serializable description of a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceModelSpec {
    /// Slot the device occupies
    pub slot: u32,

    /// Detail level used when a request names none
    #[serde(default)]
    pub detail_level: DetailLevel,

    /// Scope of params that name none
    #[serde(default = "default_scope")]
    pub default_scope: Scope,

    /// Scopes the device uses; all of them when empty
    #[serde(default)]
    pub access_scopes: Vec<Scope>,

    /// Whether multi-set is enabled
    #[serde(default = "enabled")]
    pub multi_set_enabled: bool,

    /// Whether subscriptions are enabled
    #[serde(default = "enabled")]
    pub subscriptions: bool,

    /// Shared constraints keyed by oid
    #[serde(default)]
    pub constraints: BTreeMap<String, ConstraintSpec>,

    /// Params keyed by oid
    #[serde(default)]
    pub params: BTreeMap<String, ParamSpec>,

    /// Commands keyed by oid
    #[serde(default)]
    pub commands: BTreeMap<String, ParamSpec>,

    /// Menu groups keyed by oid
    #[serde(default)]
    pub menu_groups: BTreeMap<String, MenuGroup>,

    /// Language packs shipped with the device, keyed by language tag
    #[serde(default)]
    pub language_packs: BTreeMap<String, LanguagePack>,
}

impl DeviceModelSpec {
    /// An empty spec for `slot`
    pub fn new(slot: u32) -> Self {
        Self {
            slot,
            detail_level: DetailLevel::default(),
            default_scope: default_scope(),
            access_scopes: Vec::new(),
            multi_set_enabled: true,
            subscriptions: true,
            constraints: BTreeMap::new(),
            params: BTreeMap::new(),
            commands: BTreeMap::new(),
            menu_groups: BTreeMap::new(),
            language_packs: BTreeMap::new(),
        }
    }

    /// Parse a JSON spec
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json).map_err(CoreError::from)?)
    }

    /// Parse a TOML spec
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| {
            DeviceError::CoreError(CoreError::serialization(format!("invalid device model: {}", e)))
        })
    }

    /// Read a spec from a `.json` or `.toml` file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading device model from {}", path.display());
        let text = fs::read_to_string(path).map_err(CoreError::from)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&text),
            Some("toml") => Self::from_toml_str(&text),
            _ => Err(DeviceError::invalid_argument(format!(
                "{}: device models must be .json or .toml files",
                path.display()
            ))),
        }
    }

    /// Build the device model
    ///
    /// Shared constraints are registered before params so params can refer
    /// to them. Language packs become shipped packs.
    pub fn build(&self, config: &ModelConfig) -> Result<DeviceModel> {
        let mut model = DeviceModel::new(
            self.slot,
            ParamContext::from_config(self.default_scope, config),
        );
        model.set_detail_level(self.detail_level);
        model.set_multi_set_enabled(self.multi_set_enabled);
        model.set_subscriptions_enabled(self.subscriptions);
        if !self.access_scopes.is_empty() {
            model.set_access_scopes(self.access_scopes.clone());
        }

        for (oid, spec) in &self.constraints {
            model.add_shared_constraint(oid, spec)?;
        }
        for (oid, spec) in &self.params {
            model.add_param(oid, spec)?;
        }
        for (oid, spec) in &self.commands {
            model.add_command(oid, spec)?;
        }
        for (oid, group) in &self.menu_groups {
            model.add_item(oid.as_str(), Item::MenuGroup(group.clone()));
        }
        for (tag, pack) in &self.language_packs {
            model.add_shipped_language(tag, pack.clone());
        }

        info!(
            "Built device model for slot {}: {} params, {} commands",
            self.slot,
            self.params.len(),
            self.commands.len()
        );
        Ok(model)
    }

    /// Build the device model and wrap it in a [`Device`]
    pub fn into_device(&self, config: &ModelConfig) -> Result<Device> {
        Ok(Device::new(self.build(config)?))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::authorization::Authorizer;
    use devmodel_core::status::StatusCode;
    use devmodel_core::types::Value;

    const JSON_MODEL: &str = r#"{
        "slot": 2,
        "multi_set_enabled": false,
        "constraints": {
            "percent": {"type": "int_range", "min": 0, "max": 100}
        },
        "params": {
            "volume": {
                "type": "INT32",
                "constraint": {"ref_oid": "percent"},
                "value": {"int32_value": 50}
            },
            "label": {
                "type": "STRING",
                "read_only": true,
                "value": {"string_value": "Main"}
            }
        },
        "commands": {
            "mute": {"type": "EMPTY"}
        },
        "language_packs": {
            "en": {"name": "English", "words": {"volume": "Volume"}}
        }
    }"#;

    const TOML_MODEL: &str = r#"
slot = 4
default_scope = "st2138:cfg"

[params.gain]
type = "FLOAT32"
value = { float32_value = 1.5 }
constraint = { type = "float_range", min = 0.0, max = 10.0 }

[params.names]
type = "STRING_ARRAY"
value = { string_array_values = ["a", "b"] }
"#;

    #[test_log::test]
    fn test_build_from_json() {
        let spec = DeviceModelSpec::from_json_str(JSON_MODEL).unwrap();
        let model = spec.build(&ModelConfig::default()).unwrap();
        let authz = Authorizer::disabled();

        assert_eq!(model.slot(), 2);
        assert!(!model.multi_set_enabled());
        assert!(model.subscriptions_enabled());
        assert_eq!(model.default_scope(), Scope::Operate);
        assert_eq!(model.get_value("/volume", &authz).unwrap(), Value::Int32(50));
        assert!(model.language_packs().is_shipped("en"));
        assert_eq!(model.param_oids(), vec!["label".to_string(), "volume".to_string()]);
    }

    #[test]
    fn test_shared_constraint_applies() {
        let spec = DeviceModelSpec::from_json_str(JSON_MODEL).unwrap();
        let mut model = spec.build(&ModelConfig::default()).unwrap();
        let authz = Authorizer::disabled();
        model.set_value("/volume", Value::Int32(150), &authz).unwrap();
        assert_eq!(model.get_value("/volume", &authz).unwrap(), Value::Int32(100));

        let snapshot = model.serialize(DetailLevel::Full, &authz).unwrap();
        assert!(snapshot.constraints.contains_key("percent"));
    }

    #[test]
    fn test_missing_shared_constraint() {
        let json = r#"{
            "slot": 1,
            "params": {"volume": {"type": "INT32", "constraint": {"ref_oid": "nope"}}}
        }"#;
        let spec = DeviceModelSpec::from_json_str(json).unwrap();
        let err = spec.build(&ModelConfig::default()).unwrap_err();
        assert_eq!(err.status(), StatusCode::NotFound);
    }

    #[test]
    fn test_load_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixer.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(TOML_MODEL.as_bytes()).unwrap();

        let spec = DeviceModelSpec::load(&path).unwrap();
        assert_eq!(spec.slot, 4);
        assert_eq!(spec.default_scope, Scope::Configure);

        let device = spec.into_device(&ModelConfig::default()).unwrap();
        let model = device.lock().unwrap();
        assert_eq!(
            model.get_value("/gain", &Authorizer::disabled()).unwrap(),
            Value::Float32(1.5)
        );
        assert_eq!(
            model.get_value("/names/1", &Authorizer::disabled()).unwrap(),
            Value::from("b")
        );
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixer.yaml");
        std::fs::write(&path, "slot: 1").unwrap();
        let err = DeviceModelSpec::load(&path).unwrap_err();
        assert_eq!(err.status(), StatusCode::InvalidArgument);

        let err = DeviceModelSpec::load(dir.path().join("missing.json")).unwrap_err();
        assert_eq!(err.status(), StatusCode::Internal);
    }

    #[test]
    fn test_length_limits_from_config() {
        let json = r#"{"slot": 1, "params": {"names": {"type": "STRING"}}}"#;
        let config = ModelConfig {
            default_max_length: 4,
            ..ModelConfig::default()
        };
        let mut model = DeviceModelSpec::from_json_str(json)
            .unwrap()
            .build(&config)
            .unwrap();
        let err = model
            .set_value("/names", Value::from("too long"), &Authorizer::disabled())
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::InvalidArgument);
    }

    #[test]
    fn test_malformed_json() {
        let err = DeviceModelSpec::from_json_str("{\"slot\": ").unwrap_err();
        assert_eq!(err.status(), StatusCode::InvalidArgument);
    }
}
