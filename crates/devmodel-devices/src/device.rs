/*!
 * Devices.
 *
 * A [`Device`] owns one [`DeviceModel`] behind a mutex. Every operation on a
 * device locks it once and works on the guarded model, so reads always see
 * a consistent state and writes are serialized.
 *
 * Writes go through a staging step: the touched params are cloned, the
 * changes applied to the clones, and the clones swapped in only when every
 * change succeeded. A failed request therefore leaves the device untouched.
 */
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use devmodel_core::types::Value;

use crate::authorization::Authorizer;
use crate::collection::{Collection, Item, ItemKind, ItemRef};
use crate::command::{Command, CommandHandler, CommandResponse};
use crate::constraint::ConstraintSpec;
use crate::detail_level::DetailLevel;
use crate::error::{DeviceError, Result};
use crate::language::{ComponentLanguagePack, LanguagePack, LanguagePacks};
use crate::menu::MenuGroup;
use crate::param::{Param, ParamContext, ParamSpec, ParamType};
use crate::path::{Path, Segment};
use crate::scope::Scope;
use crate::subscription::Subscriptions;

const EVENT_CAPACITY: usize = 100;

/// Event published by a device
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// A client changed a value
    ValueSetByClient {
        /// Slot of the device
        slot: u32,
        /// Oid that was written
        oid: String,
        /// Value as stored after constraints were applied
        value: Value,
    },
    /// Business logic changed a value
    ValueSetByServer {
        /// Slot of the device
        slot: u32,
        /// Oid that was written
        oid: String,
        /// Value as stored after constraints were applied
        value: Value,
    },
    /// A language pack was added or replaced
    LanguageAdded {
        /// Slot of the device
        slot: u32,
        /// Language tag
        language: String,
    },
}

/// One entry of a multi-set request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetValueEntry {
    /// Path of the value to write
    pub oid: String,
    /// New value
    pub value: Value,
}

impl SetValueEntry {
    /// Create an entry
    pub fn new<S: Into<String>, V: Into<Value>>(oid: S, value: V) -> Self {
        Self {
            oid: oid.into(),
            value: value.into(),
        }
    }
}

/// A device serialized at some detail level
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    /// Slot of the device
    pub slot: u32,

    /// Detail level the snapshot was taken at
    pub detail_level: DetailLevel,

    /// Scope of params that name none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_scope: Option<Scope>,

    /// Scopes the device uses
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_scopes: Vec<Scope>,

    /// Whether multi-set is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_set_enabled: Option<bool>,

    /// Whether subscriptions are enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriptions: Option<bool>,

    /// Params keyed by oid
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, ParamSpec>,

    /// Commands keyed by oid
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub commands: BTreeMap<String, ParamSpec>,

    /// Menu groups keyed by oid
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub menu_groups: BTreeMap<String, MenuGroup>,

    /// Shared constraints keyed by oid
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub constraints: BTreeMap<String, ConstraintSpec>,

    /// Tags of the available language packs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub language_packs: Vec<String>,
}

impl DeviceSnapshot {
    /// Kind and key of every item in the snapshot
    pub fn item_keys(&self) -> BTreeSet<(ItemKind, String)> {
        let params = self.params.keys().map(|k| (ItemKind::Param, k.clone()));
        let commands = self.commands.keys().map(|k| (ItemKind::Command, k.clone()));
        let menus = self.menu_groups.keys().map(|k| (ItemKind::MenuGroup, k.clone()));
        let packs = self
            .language_packs
            .iter()
            .map(|k| (ItemKind::LanguagePack, k.clone()));
        params.chain(commands).chain(menus).chain(packs).collect()
    }
}

/// The state of one device
///
/// Once wrapped in a [`Device`], operations run on the model while the
/// device is locked.
#[derive(Debug)]
pub struct DeviceModel {
    slot: u32,
    detail_level: DetailLevel,
    access_scopes: Vec<Scope>,
    multi_set_enabled: bool,
    subscriptions_enabled: bool,
    context: ParamContext,
    params: Collection<Param>,
    commands: Collection<Command>,
    menu_groups: Collection<MenuGroup>,
    language_packs: LanguagePacks,
    subscriptions: Subscriptions,
    events: broadcast::Sender<DeviceEvent>,
}

impl DeviceModel {
    /// Create an empty model
    ///
    /// Multi-set and subscriptions start enabled and the device uses every
    /// defined scope.
    pub fn new(slot: u32, context: ParamContext) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            slot,
            detail_level: DetailLevel::Full,
            access_scopes: Scope::ALL[1..].to_vec(),
            multi_set_enabled: true,
            subscriptions_enabled: true,
            context,
            params: Collection::new(ItemKind::Param),
            commands: Collection::new(ItemKind::Command),
            menu_groups: Collection::new(ItemKind::MenuGroup),
            language_packs: LanguagePacks::new(),
            subscriptions: Subscriptions::new(),
            events,
        }
    }

    /// Slot the device occupies
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Detail level used when a request names none
    pub fn detail_level(&self) -> DetailLevel {
        self.detail_level
    }

    /// Set the default detail level
    pub fn set_detail_level(&mut self, level: DetailLevel) {
        self.detail_level = level;
    }

    /// Scope of params that name none
    pub fn default_scope(&self) -> Scope {
        self.context.default_scope()
    }

    /// Scopes the device uses
    pub fn access_scopes(&self) -> &[Scope] {
        &self.access_scopes
    }

    /// Set the scopes the device uses
    pub fn set_access_scopes(&mut self, scopes: Vec<Scope>) {
        self.access_scopes = scopes;
    }

    /// Whether multi-set requests with more than one entry are accepted
    pub fn multi_set_enabled(&self) -> bool {
        self.multi_set_enabled
    }

    /// Enable or disable multi-set
    pub fn set_multi_set_enabled(&mut self, enabled: bool) {
        self.multi_set_enabled = enabled;
    }

    /// Whether clients may subscribe to params
    pub fn subscriptions_enabled(&self) -> bool {
        self.subscriptions_enabled
    }

    /// Enable or disable subscriptions
    pub fn set_subscriptions_enabled(&mut self, enabled: bool) {
        self.subscriptions_enabled = enabled;
    }

    /// Context new params are built in
    pub fn context(&self) -> &ParamContext {
        &self.context
    }

    /// Register a constraint params may refer to by oid
    pub fn add_shared_constraint(&mut self, oid: &str, spec: &ConstraintSpec) -> Result<()> {
        self.context.add_shared(oid, spec)
    }

    /// Build a param from its spec and add it
    pub fn add_param(&mut self, oid: &str, spec: &ParamSpec) -> Result<Option<Param>> {
        let param = self.context.build(oid, spec)?;
        Ok(self.params.insert(oid, param))
    }

    /// Build a command from its spec and add it
    pub fn add_command(&mut self, oid: &str, spec: &ParamSpec) -> Result<Option<Command>> {
        let command = Command::new(self.context.build(oid, spec)?);
        Ok(self.commands.insert(oid, command))
    }

    /// Add an item under `key`, returning the item of the same kind it replaced
    pub fn add_item<S: Into<String>>(&mut self, key: S, item: Item) -> Option<Item> {
        let key = key.into();
        match item {
            Item::Param(p) => self.params.insert(key, p).map(Item::Param),
            Item::Command(c) => self.commands.insert(key, c).map(Item::Command),
            Item::MenuGroup(m) => self.menu_groups.insert(key, m).map(Item::MenuGroup),
            Item::LanguagePack(l) => self.language_packs.add_pack(key, l).map(Item::LanguagePack),
        }
    }

    /// Look up an item by kind and key
    pub fn get_item(&self, kind: ItemKind, key: &str) -> Result<ItemRef<'_>> {
        let found = match kind {
            ItemKind::Param => self.params.get(key).map(ItemRef::Param),
            ItemKind::Command => self.commands.get(key).map(ItemRef::Command),
            ItemKind::MenuGroup => self.menu_groups.get(key).map(ItemRef::MenuGroup),
            ItemKind::LanguagePack => {
                self.language_packs.get_pack(key).ok().map(ItemRef::LanguagePack)
            }
        };
        found.ok_or_else(|| DeviceError::not_found(format!("{} '{}'", kind, key)))
    }

    /// Top-level param by oid
    pub fn param(&self, oid: &str) -> Option<&Param> {
        self.params.get(oid)
    }

    /// Oids of the top-level params
    pub fn param_oids(&self) -> Vec<String> {
        self.params.keys().map(str::to_string).collect()
    }

    /// Read the value at `oid`
    pub fn get_value(&self, oid: &str, authz: &Authorizer) -> Result<Value> {
        authz.check_read(Scope::Monitor, oid)?;
        let path = Path::parse(oid)?;
        let (name, rest) = split_top(&path, oid)?;
        let param = self
            .params
            .get(name)
            .ok_or_else(|| DeviceError::not_found(format!("param {}", oid)))?;
        param.get_value(rest).map_err(|e| e.at(oid))
    }

    /// Write one value on behalf of a client
    pub fn set_value(&mut self, oid: &str, value: Value, authz: &Authorizer) -> Result<()> {
        self.multi_set_value(vec![SetValueEntry::new(oid, value)], authz)
    }

    /// Write several values on behalf of a client, all or nothing
    ///
    /// Entries may not overlap: no oid may be written twice or together with
    /// one of its ancestors, except for repeated appends to the same array.
    /// Entries are applied in order.
    pub fn multi_set_value(&mut self, entries: Vec<SetValueEntry>, authz: &Authorizer) -> Result<()> {
        if entries.is_empty() {
            return Err(DeviceError::invalid_argument("no values to set"));
        }
        if entries.len() > 1 && !self.multi_set_enabled {
            return Err(DeviceError::permission_denied(format!(
                "multi-set is disabled on slot {}",
                self.slot
            )));
        }

        check_overlap(&entries)?;

        let staged = self.stage(&entries, Some(authz))?;
        self.commit(staged);

        for entry in entries {
            let value = self.stored_value(&entry.oid);
            debug!("Slot {}: client set {}", self.slot, entry.oid);
            let _ = self.events.send(DeviceEvent::ValueSetByClient {
                slot: self.slot,
                oid: entry.oid,
                value,
            });
        }
        Ok(())
    }

    /// Write a value on behalf of business logic
    ///
    /// Skips authorization and the read-only check but still enforces type
    /// and constraints.
    pub fn set_value_by_server(&mut self, oid: &str, value: Value) -> Result<()> {
        let entries = [SetValueEntry::new(oid, value)];
        let staged = self.stage(&entries, None)?;
        self.commit(staged);

        let value = self.stored_value(oid);
        debug!("Slot {}: server set {}", self.slot, oid);
        let _ = self.events.send(DeviceEvent::ValueSetByServer {
            slot: self.slot,
            oid: oid.to_string(),
            value,
        });
        Ok(())
    }

    fn stage(
        &self,
        entries: &[SetValueEntry],
        authz: Option<&Authorizer>,
    ) -> Result<BTreeMap<String, Param>> {
        let mut staged: BTreeMap<String, Param> = BTreeMap::new();
        for entry in entries {
            let path = Path::parse(&entry.oid)?;
            let (name, rest) = split_top(&path, &entry.oid)?;

            let param = match staged.entry(name.to_string()) {
                Entry::Occupied(slot) => slot.into_mut(),
                Entry::Vacant(slot) => {
                    let param = self
                        .params
                        .get(name)
                        .ok_or_else(|| DeviceError::not_found(format!("param {}", entry.oid)))?;
                    slot.insert(param.clone())
                }
            };

            if let Some(authz) = authz {
                let touched = param
                    .touched_descriptors(rest, &entry.value)
                    .map_err(|e| e.at(&entry.oid))?;
                for descriptor in touched {
                    authz.check_write(descriptor.scope(), descriptor.read_only(), &entry.oid)?;
                }
            }
            param
                .set_value(rest, entry.value.clone())
                .map_err(|e| e.at(&entry.oid))?;
        }
        Ok(staged)
    }

    /// Value reported in change events; an appended element is reported as
    /// the whole param
    fn stored_value(&self, oid: &str) -> Value {
        self.get_value(oid, &Authorizer::disabled())
            .ok()
            .or_else(|| {
                let path = Path::parse(oid).ok()?;
                let (name, _) = path.split_name()?;
                self.params.get(name).map(Param::value)
            })
            .unwrap_or(Value::Empty)
    }

    fn commit(&mut self, staged: BTreeMap<String, Param>) {
        for (name, param) in staged {
            self.params.insert(name, param);
        }
    }

    /// Attach the handler business logic runs for the command at `oid`
    pub fn define_command(&mut self, oid: &str, handler: CommandHandler) -> Result<()> {
        let path = Path::parse(oid)?;
        let (name, rest) = split_top(&path, oid)?;
        if !rest.is_empty() {
            return Err(DeviceError::Unimplemented(format!("sub-commands such as {}", oid)));
        }
        let command = self
            .commands
            .get_mut(name)
            .ok_or_else(|| DeviceError::not_found(format!("command {}", oid)))?;
        command.set_handler(handler);
        debug!("Slot {}: defined command {}", self.slot, oid);
        Ok(())
    }

    /// Run the command at `oid` with `value` as its argument
    ///
    /// A handler that panics is reported as `UNKNOWN`.
    pub fn execute_command(
        &self,
        oid: &str,
        value: Value,
        authz: &Authorizer,
    ) -> Result<CommandResponse> {
        let path = Path::parse(oid)?;
        let (name, rest) = split_top(&path, oid)?;
        let command = self
            .commands
            .get(name)
            .ok_or_else(|| DeviceError::not_found(format!("command {}", oid)))?;
        if !rest.is_empty() {
            return Err(DeviceError::Unimplemented(format!("sub-commands such as {}", oid)));
        }

        let param = command.param();
        authz.check_write(param.scope(), param.read_only(), oid)?;

        let argument = if param.param_type() == ParamType::Empty {
            value
        } else {
            let mut staged = param.clone();
            staged.set_value(&[], value).map_err(|e| e.at(oid))?;
            staged.value()
        };

        let handler = command
            .handler()
            .ok_or_else(|| DeviceError::Unimplemented(format!("command {} has no handler", oid)))?;

        debug!("Slot {}: executing {}", self.slot, oid);
        panic::catch_unwind(AssertUnwindSafe(|| handler(argument))).map_err(|cause| {
            let details = cause
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| cause.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            warn!("Slot {}: command {} failed: {}", self.slot, oid, details);
            DeviceError::Unknown(format!("command {}: {}", oid, details))
        })
    }

    /// Serialize the device at `level`
    pub fn serialize(&self, level: DetailLevel, authz: &Authorizer) -> Result<DeviceSnapshot> {
        authz.check_read(Scope::Monitor, &format!("slot {}", self.slot))?;

        let mut snapshot = DeviceSnapshot {
            slot: self.slot,
            detail_level: level,
            ..DeviceSnapshot::default()
        };
        if level == DetailLevel::None {
            return Ok(snapshot);
        }

        snapshot.default_scope = Some(self.default_scope());
        snapshot.access_scopes = self.access_scopes.clone();
        snapshot.multi_set_enabled = Some(self.multi_set_enabled);
        snapshot.subscriptions = Some(self.subscriptions_enabled);

        match level {
            DetailLevel::Full => {
                snapshot.params = self.describe_params(|_| true);
                snapshot.commands = self.describe_commands();
                snapshot.menu_groups = self
                    .menu_groups
                    .iter()
                    .map(|(k, m)| (k.to_string(), m.clone()))
                    .collect();
                snapshot.constraints = self
                    .context
                    .shared()
                    .iter()
                    .map(|(k, c)| (k.clone(), c.spec()))
                    .collect();
                snapshot.language_packs = self.language_packs.list_tags();
            }
            DetailLevel::Commands => {
                snapshot.commands = self.describe_commands();
            }
            DetailLevel::Subscriptions => {
                if !self.subscriptions_enabled {
                    return Err(DeviceError::invalid_argument(format!(
                        "subscriptions are disabled on slot {}",
                        self.slot
                    )));
                }
                let subscriptions = &self.subscriptions;
                snapshot.params = self.describe_params(|oid| subscriptions.touches(&format!("/{}", oid)));
            }
            DetailLevel::Minimal | DetailLevel::None => {}
        }
        Ok(snapshot)
    }

    fn describe_params<F: Fn(&str) -> bool>(&self, include: F) -> BTreeMap<String, ParamSpec> {
        self.params
            .iter()
            .filter(|(oid, _)| include(oid))
            .map(|(oid, p)| (oid.to_string(), p.to_spec()))
            .collect()
    }

    fn describe_commands(&self) -> BTreeMap<String, ParamSpec> {
        self.commands
            .iter()
            .map(|(oid, c)| (oid.to_string(), c.to_spec()))
            .collect()
    }

    /// The device's language packs
    pub fn language_packs(&self) -> &LanguagePacks {
        &self.language_packs
    }

    /// Add a pack that shipped with the device model
    pub fn add_shipped_language(&mut self, id: &str, pack: LanguagePack) {
        self.language_packs.add_shipped(id, pack);
    }

    /// Tags of the available language packs
    pub fn list_languages(&self, authz: &Authorizer) -> Result<Vec<String>> {
        authz.check_read(Scope::Monitor, "language packs")?;
        Ok(self.language_packs.list_tags())
    }

    /// Fetch one language pack
    pub fn get_language_pack(&self, id: &str, authz: &Authorizer) -> Result<ComponentLanguagePack> {
        authz.check_read(Scope::Monitor, "language packs")?;
        if id.is_empty() {
            return Err(DeviceError::invalid_argument("language id is empty"));
        }
        let pack = self.language_packs.get_pack(id)?;
        Ok(ComponentLanguagePack {
            language: id.to_string(),
            language_pack: pack.clone(),
        })
    }

    /// Add a language pack, replacing one a client added before
    ///
    /// Packs that shipped with the device model cannot be changed.
    pub fn add_language(&mut self, id: &str, pack: LanguagePack, authz: &Authorizer) -> Result<()> {
        authz.check_write(Scope::Administer, false, "language packs")?;
        if id.is_empty() || pack.name.is_empty() {
            return Err(DeviceError::invalid_argument(format!(
                "language pack '{}' needs an id and a name",
                id
            )));
        }
        if self.language_packs.is_shipped(id) {
            return Err(DeviceError::permission_denied(format!(
                "language pack '{}' shipped with the device",
                id
            )));
        }

        self.language_packs.replace_pack(id, pack);
        info!("Slot {}: added language pack '{}'", self.slot, id);
        let _ = self.events.send(DeviceEvent::LanguageAdded {
            slot: self.slot,
            language: id.to_string(),
        });
        Ok(())
    }

    /// Remove a language pack a client added
    pub fn remove_language(&mut self, id: &str, authz: &Authorizer) -> Result<()> {
        authz.check_write(Scope::Administer, false, "language packs")?;
        if self.language_packs.is_shipped(id) {
            return Err(DeviceError::permission_denied(format!(
                "language pack '{}' shipped with the device",
                id
            )));
        }
        self.language_packs
            .remove_pack(id)
            .ok_or_else(|| DeviceError::not_found(format!("language pack '{}'", id)))?;
        info!("Slot {}: removed language pack '{}'", self.slot, id);
        Ok(())
    }

    /// Current subscriptions
    pub fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }

    /// Add and remove subscriptions, returning the resulting set
    ///
    /// Every added oid must resolve to a top-level param, otherwise nothing
    /// changes. Removing an oid that is not subscribed is not an error.
    pub fn update_subscriptions(
        &mut self,
        add: &[String],
        remove: &[String],
        authz: &Authorizer,
    ) -> Result<Vec<String>> {
        if !self.subscriptions_enabled {
            return Err(DeviceError::FailedPrecondition(format!(
                "subscriptions are disabled on slot {}",
                self.slot
            )));
        }
        authz.check_read(Scope::Monitor, "subscriptions")?;

        for oid in add {
            let path = Subscriptions::parse(oid)?;
            if let Some((name, _)) = path.split_name() {
                if !self.params.contains(name) {
                    return Err(DeviceError::not_found(format!("param {}", oid)));
                }
            }
        }

        for oid in remove {
            self.subscriptions.remove(oid);
        }
        for oid in add {
            self.subscriptions.add(oid)?;
        }
        debug!("Slot {}: {} subscriptions", self.slot, self.subscriptions.len());
        Ok(self.subscriptions.list())
    }
}

/// Split a path into the top-level param name and the rest
fn split_top<'a>(path: &'a Path, oid: &str) -> Result<(&'a str, &'a [Segment])> {
    path.split_name()
        .ok_or_else(|| DeviceError::invalid_argument(format!("'{}' does not name a param", oid)))
}

fn check_overlap(entries: &[SetValueEntry]) -> Result<()> {
    let paths = entries
        .iter()
        .map(|entry| Path::parse(&entry.oid))
        .collect::<Result<Vec<_>>>()?;

    for (i, a) in paths.iter().enumerate() {
        for (j, b) in paths.iter().enumerate().skip(i + 1) {
            if a == b && a.is_append() {
                continue;
            }
            if a.starts_with(b) || b.starts_with(a) {
                return Err(DeviceError::invalid_argument(format!(
                    "overlapping writes to {} and {}",
                    entries[i].oid, entries[j].oid
                )));
            }
        }
    }
    Ok(())
}

/// Guard over a locked device model
pub type DeviceGuard<'a> = MutexGuard<'a, DeviceModel>;

/// A device and the lock serializing access to it
#[derive(Debug)]
pub struct Device {
    slot: u32,
    model: Mutex<DeviceModel>,
    events: broadcast::Sender<DeviceEvent>,
}

impl Device {
    /// Wrap a model
    pub fn new(model: DeviceModel) -> Self {
        Self {
            slot: model.slot,
            events: model.events.clone(),
            model: Mutex::new(model),
        }
    }

    /// Slot the device occupies
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Lock the device for the duration of one operation
    pub fn lock(&self) -> Result<DeviceGuard<'_>> {
        Ok(self.model.lock()?)
    }

    /// Subscribe to the device's events
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use devmodel_core::status::StatusCode;
    use devmodel_core::types::StructFields;

    fn int_range(min: i32, max: i32, strict: bool) -> ConstraintSpec {
        ConstraintSpec::IntRange {
            min,
            max,
            step: 1,
            display_min: None,
            display_max: None,
            strict,
        }
    }

    fn sample_model() -> DeviceModel {
        let mut model = DeviceModel::new(1, ParamContext::default());
        model
            .add_param(
                "a_number",
                &ParamSpec::new(ParamType::Int32)
                    .with_value(5)
                    .with_constraint(int_range(0, 10, true)),
            )
            .unwrap();
        model
            .add_param(
                "gain",
                &ParamSpec::new(ParamType::Int32)
                    .with_value(1)
                    .with_constraint(int_range(0, 10, false)),
            )
            .unwrap();
        model
            .add_param(
                "serial",
                &ParamSpec::new(ParamType::String).with_value("ABC123").read_only(),
            )
            .unwrap();
        model
            .add_param(
                "secret",
                &ParamSpec::new(ParamType::Int32).with_scope(Scope::Administer),
            )
            .unwrap();
        model
            .add_param(
                "levels",
                &ParamSpec::new(ParamType::Int32Array).with_value(vec![1, 2, 3]),
            )
            .unwrap();
        model
            .add_command("reset", &ParamSpec::new(ParamType::Empty))
            .unwrap();
        model
    }

    #[test]
    fn test_get_and_set_value() {
        let mut model = sample_model();
        let authz = Authorizer::disabled();
        assert_eq!(model.get_value("/a_number", &authz).unwrap(), Value::Int32(5));

        model.set_value("/a_number", Value::Int32(7), &authz).unwrap();
        assert_eq!(model.get_value("/a_number", &authz).unwrap(), Value::Int32(7));

        model.set_value("/levels/1", Value::Int32(20), &authz).unwrap();
        assert_eq!(
            model.get_value("/levels", &authz).unwrap(),
            Value::Int32Array(vec![1, 20, 3])
        );
        assert_eq!(model.get_value("/levels/2", &authz).unwrap(), Value::Int32(3));
    }

    #[test]
    fn test_strict_range_rejects_and_keeps_value() {
        let mut model = sample_model();
        let authz = Authorizer::disabled();
        let err = model.set_value("/a_number", Value::Int32(12), &authz).unwrap_err();
        assert_eq!(err.status(), StatusCode::InvalidArgument);
        assert_eq!(model.get_value("/a_number", &authz).unwrap(), Value::Int32(5));
    }

    #[test]
    fn test_lenient_range_clamps() {
        let mut model = sample_model();
        let authz = Authorizer::disabled();
        model.set_value("/gain", Value::Int32(42), &authz).unwrap();
        assert_eq!(model.get_value("/gain", &authz).unwrap(), Value::Int32(10));
    }

    #[test]
    fn test_unresolvable_paths() {
        let mut model = sample_model();
        let authz = Authorizer::disabled();
        assert_eq!(
            model.get_value("/missing", &authz).unwrap_err().status(),
            StatusCode::NotFound
        );
        assert_eq!(
            model.get_value("/levels/3", &authz).unwrap_err().status(),
            StatusCode::OutOfRange
        );
        assert_eq!(
            model.get_value("no_slash", &authz).unwrap_err().status(),
            StatusCode::InvalidArgument
        );
        assert_eq!(
            model.get_value("", &authz).unwrap_err().status(),
            StatusCode::InvalidArgument
        );
        assert_eq!(
            model.set_value("/missing", Value::Int32(1), &authz).unwrap_err().status(),
            StatusCode::NotFound
        );
    }

    #[test]
    fn test_type_mismatch_is_invalid_argument() {
        let mut model = sample_model();
        let err = model
            .set_value("/a_number", Value::from("five"), &Authorizer::disabled())
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::InvalidArgument);
    }

    #[test]
    fn test_read_only_refuses_writes_even_without_authorization() {
        let mut model = sample_model();
        let err = model
            .set_value("/serial", Value::from("XYZ"), &Authorizer::disabled())
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::PermissionDenied);
        assert_eq!(
            model.get_value("/serial", &Authorizer::disabled()).unwrap(),
            Value::from("ABC123")
        );
    }

    #[test]
    fn test_server_set_skips_authorization_but_not_constraints() {
        let mut model = sample_model();
        model.set_value_by_server("/serial", Value::from("XYZ")).unwrap();
        assert_eq!(
            model.get_value("/serial", &Authorizer::disabled()).unwrap(),
            Value::from("XYZ")
        );
        let err = model.set_value_by_server("/a_number", Value::Int32(99)).unwrap_err();
        assert_eq!(err.status(), StatusCode::InvalidArgument);
    }

    #[test]
    fn test_scope_gating() {
        let mut model = sample_model();
        let operator = Authorizer::from_scope_claim("st2138:mon st2138:op:w").unwrap();
        let monitor = Authorizer::from_scope_claim("st2138:mon").unwrap();
        let admin = Authorizer::from_scope_claim("st2138:adm:w").unwrap();
        let nobody = Authorizer::with_scope(Scope::Undefined);

        model.set_value("/a_number", Value::Int32(3), &operator).unwrap();
        assert_eq!(
            model.set_value("/a_number", Value::Int32(4), &monitor).unwrap_err().status(),
            StatusCode::PermissionDenied
        );
        assert_eq!(
            model.set_value("/secret", Value::Int32(4), &operator).unwrap_err().status(),
            StatusCode::PermissionDenied
        );
        model.set_value("/secret", Value::Int32(4), &admin).unwrap();

        assert!(model.get_value("/a_number", &monitor).is_ok());
        assert_eq!(
            model.get_value("/a_number", &nobody).unwrap_err().status(),
            StatusCode::PermissionDenied
        );
    }

    #[test]
    fn test_write_permission_is_monotonic_in_scope() {
        let mut model = sample_model();
        for scope in Scope::ALL {
            let granted = model
                .set_value("/a_number", Value::Int32(2), &Authorizer::with_scope(scope))
                .is_ok();
            for higher in Scope::ALL.iter().filter(|s| **s > scope) {
                let higher_granted = model
                    .set_value("/a_number", Value::Int32(2), &Authorizer::with_scope(*higher))
                    .is_ok();
                assert!(!granted || higher_granted);
            }
        }
    }

    #[test]
    fn test_multi_set_is_all_or_nothing() {
        let mut model = sample_model();
        let authz = Authorizer::disabled();
        let err = model
            .multi_set_value(
                vec![
                    SetValueEntry::new("/a_number", 8),
                    SetValueEntry::new("/gain", 4),
                    SetValueEntry::new("/levels/-", Value::from("x")),
                ],
                &authz,
            )
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::InvalidArgument);
        assert_eq!(model.get_value("/a_number", &authz).unwrap(), Value::Int32(5));
        assert_eq!(model.get_value("/gain", &authz).unwrap(), Value::Int32(1));

        model
            .multi_set_value(
                vec![
                    SetValueEntry::new("/a_number", 8),
                    SetValueEntry::new("/gain", 4),
                    SetValueEntry::new("/levels/-", 4),
                ],
                &authz,
            )
            .unwrap();
        assert_eq!(model.get_value("/a_number", &authz).unwrap(), Value::Int32(8));
        assert_eq!(model.get_value("/gain", &authz).unwrap(), Value::Int32(4));
        assert_eq!(
            model.get_value("/levels", &authz).unwrap(),
            Value::Int32Array(vec![1, 2, 3, 4])
        );
    }

    #[test]
    fn test_multi_set_rejects_overlapping_entries() {
        let mut model = sample_model();
        let authz = Authorizer::disabled();
        for batch in [
            vec![SetValueEntry::new("/gain", 2), SetValueEntry::new("/gain", 6)],
            vec![
                SetValueEntry::new("/levels", vec![7, 8]),
                SetValueEntry::new("/levels/1", 9),
            ],
            vec![
                SetValueEntry::new("/levels/-", 4),
                SetValueEntry::new("/levels", vec![1]),
            ],
        ] {
            let err = model.multi_set_value(batch, &authz).unwrap_err();
            assert_eq!(err.status(), StatusCode::InvalidArgument);
        }
        assert_eq!(model.get_value("/gain", &authz).unwrap(), Value::Int32(1));
        assert_eq!(
            model.get_value("/levels", &authz).unwrap(),
            Value::Int32Array(vec![1, 2, 3])
        );

        // repeated appends to one array are allowed
        model
            .multi_set_value(
                vec![
                    SetValueEntry::new("/levels/-", 4),
                    SetValueEntry::new("/levels/-", 5),
                    SetValueEntry::new("/levels/0", 0),
                ],
                &authz,
            )
            .unwrap();
        assert_eq!(
            model.get_value("/levels", &authz).unwrap(),
            Value::Int32Array(vec![0, 2, 3, 4, 5])
        );
    }

    #[test]
    fn test_struct_write_checks_every_field_scope() {
        let mut model = sample_model();
        model
            .add_param(
                "location",
                &ParamSpec::new(ParamType::Struct)
                    .with_field("lat", ParamSpec::new(ParamType::Int32).with_value(1))
                    .with_field(
                        "alt",
                        ParamSpec::new(ParamType::Int32)
                            .with_value(10)
                            .with_scope(Scope::Administer),
                    ),
            )
            .unwrap();
        let operator = Authorizer::with_scope(Scope::Operate);
        let admin = Authorizer::with_scope(Scope::Administer);
        let alt_only = || {
            let mut fields = StructFields::new();
            fields.insert("alt".to_string(), Value::Int32(99));
            Value::Struct(fields)
        };

        assert_eq!(
            model.set_value("/location/alt", Value::Int32(99), &operator).unwrap_err().status(),
            StatusCode::PermissionDenied
        );
        assert_eq!(
            model.set_value("/location", alt_only(), &operator).unwrap_err().status(),
            StatusCode::PermissionDenied
        );
        assert_eq!(
            model.get_value("/location/alt", &operator).unwrap(),
            Value::Int32(10)
        );

        let mut lat_only = StructFields::new();
        lat_only.insert("lat".to_string(), Value::Int32(2));
        model
            .set_value("/location", Value::Struct(lat_only), &operator)
            .unwrap();
        model.set_value("/location", alt_only(), &admin).unwrap();
        assert_eq!(
            model.get_value("/location", &operator).unwrap(),
            Value::Struct(StructFields::from([
                ("alt".to_string(), Value::Int32(99)),
                ("lat".to_string(), Value::Int32(2)),
            ]))
        );
    }

    #[test]
    fn test_multi_set_permission_failure_rolls_back() {
        let mut model = sample_model();
        let operator = Authorizer::from_scope_claim("st2138:op:w").unwrap();
        let err = model
            .multi_set_value(
                vec![SetValueEntry::new("/gain", 9), SetValueEntry::new("/secret", 1)],
                &operator,
            )
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::PermissionDenied);
        assert_eq!(
            model.get_value("/gain", &Authorizer::disabled()).unwrap(),
            Value::Int32(1)
        );
    }

    #[test]
    fn test_multi_set_disabled_and_empty() {
        let mut model = sample_model();
        let authz = Authorizer::disabled();
        assert_eq!(
            model.multi_set_value(Vec::new(), &authz).unwrap_err().status(),
            StatusCode::InvalidArgument
        );

        model.set_multi_set_enabled(false);
        let err = model
            .multi_set_value(
                vec![SetValueEntry::new("/gain", 2), SetValueEntry::new("/a_number", 2)],
                &authz,
            )
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::PermissionDenied);
        model
            .multi_set_value(vec![SetValueEntry::new("/gain", 2)], &authz)
            .unwrap();
    }

    #[test]
    fn test_value_events_follow_batch_order() {
        let mut model = sample_model();
        let mut events = model.events.subscribe();
        model
            .multi_set_value(
                vec![SetValueEntry::new("/gain", 20), SetValueEntry::new("/a_number", 2)],
                &Authorizer::disabled(),
            )
            .unwrap();

        assert_eq!(
            events.try_recv().unwrap(),
            DeviceEvent::ValueSetByClient {
                slot: 1,
                oid: "/gain".to_string(),
                value: Value::Int32(10),
            }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            DeviceEvent::ValueSetByClient {
                slot: 1,
                oid: "/a_number".to_string(),
                value: Value::Int32(2),
            }
        );
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_execute_command() {
        let mut model = sample_model();
        let authz = Authorizer::disabled();
        assert_eq!(
            model.execute_command("/reset", Value::Empty, &authz).unwrap_err().status(),
            StatusCode::Unimplemented
        );

        model
            .define_command("/reset", Arc::new(|_: Value| CommandResponse::NoResponse))
            .unwrap();
        assert_eq!(
            model.execute_command("/reset", Value::Empty, &authz).unwrap(),
            CommandResponse::NoResponse
        );
        assert_eq!(
            model.execute_command("/reboot", Value::Empty, &authz).unwrap_err().status(),
            StatusCode::NotFound
        );
        assert_eq!(
            model.execute_command("/reset/now", Value::Empty, &authz).unwrap_err().status(),
            StatusCode::Unimplemented
        );
        assert_eq!(
            model
                .execute_command("/reset", Value::Empty, &Authorizer::from_scope_claim("st2138:mon").unwrap())
                .unwrap_err()
                .status(),
            StatusCode::PermissionDenied
        );
    }

    #[test]
    fn test_command_argument_is_constrained() {
        let mut model = sample_model();
        model
            .add_command(
                "double",
                &ParamSpec::new(ParamType::Int32).with_constraint(int_range(0, 10, false)),
            )
            .unwrap();
        model
            .define_command(
                "/double",
                Arc::new(|v: Value| {
                    CommandResponse::Response(Value::Int32(v.as_i32().unwrap_or(0) * 2))
                }),
            )
            .unwrap();
        let authz = Authorizer::disabled();
        assert_eq!(
            model.execute_command("/double", Value::Int32(50), &authz).unwrap(),
            CommandResponse::Response(Value::Int32(20))
        );
        assert_eq!(
            model
                .execute_command("/double", Value::from("x"), &authz)
                .unwrap_err()
                .status(),
            StatusCode::InvalidArgument
        );
    }

    #[test]
    fn test_panicking_handler_is_unknown() {
        let mut model = sample_model();
        model
            .define_command(
                "/reset",
                Arc::new(|_: Value| -> CommandResponse { panic!("relay stuck") }),
            )
            .unwrap();
        let err = model
            .execute_command("/reset", Value::Empty, &Authorizer::disabled())
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::Unknown);
        assert!(err.to_string().contains("relay stuck"));
    }

    #[test]
    fn test_serialize_detail_levels() {
        let mut model = sample_model();
        model.add_item("status", Item::MenuGroup(MenuGroup::default()));
        model.add_shipped_language("en", LanguagePack::new("English"));
        model
            .add_shared_constraint("percent", &int_range(0, 100, false))
            .unwrap();
        let authz = Authorizer::disabled();

        let full = model.serialize(DetailLevel::Full, &authz).unwrap();
        assert_eq!(full.params.len(), 5);
        assert_eq!(full.commands.len(), 1);
        assert!(full.menu_groups.contains_key("status"));
        assert!(full.constraints.contains_key("percent"));
        assert_eq!(full.language_packs, vec!["en".to_string()]);
        assert_eq!(full.params["a_number"].value, Some(Value::Int32(5)));
        assert_eq!(full.default_scope, Some(Scope::Operate));

        let commands = model.serialize(DetailLevel::Commands, &authz).unwrap();
        assert!(commands.params.is_empty());
        assert_eq!(commands.commands.len(), 1);

        let minimal = model.serialize(DetailLevel::Minimal, &authz).unwrap();
        assert!(minimal.item_keys().is_empty());
        assert_eq!(minimal.multi_set_enabled, Some(true));

        let none = model.serialize(DetailLevel::None, &authz).unwrap();
        assert_eq!(none.slot, 1);
        assert_eq!(none.default_scope, None);
        assert!(none.access_scopes.is_empty());
    }

    #[test]
    fn test_detail_levels_are_contained_in_full() {
        let mut model = sample_model();
        let authz = Authorizer::disabled();
        let levels = [
            DetailLevel::Commands,
            DetailLevel::Subscriptions,
            DetailLevel::Minimal,
            DetailLevel::None,
        ];

        let full = model.serialize(DetailLevel::Full, &authz).unwrap().item_keys();
        for level in levels {
            let keys = model.serialize(level, &authz).unwrap().item_keys();
            assert!(keys.is_subset(&full), "{:?}", level);
        }

        model
            .update_subscriptions(&["/a_number".to_string(), "/*".to_string()], &[], &authz)
            .unwrap();
        let full = model.serialize(DetailLevel::Full, &authz).unwrap().item_keys();
        let subscribed = model
            .serialize(DetailLevel::Subscriptions, &authz)
            .unwrap()
            .item_keys();
        assert!(!subscribed.is_empty());
        for level in levels {
            let keys = model.serialize(level, &authz).unwrap().item_keys();
            assert!(keys.is_subset(&full), "{:?}", level);
        }
    }

    #[test]
    fn test_subscriptions() {
        let mut model = sample_model();
        let authz = Authorizer::disabled();
        let subs = model
            .update_subscriptions(&["/a_number".to_string()], &[], &authz)
            .unwrap();
        assert_eq!(subs, vec!["/a_number".to_string()]);

        let snapshot = model.serialize(DetailLevel::Subscriptions, &authz).unwrap();
        assert_eq!(snapshot.params.keys().collect::<Vec<_>>(), vec!["a_number"]);

        assert_eq!(
            model
                .update_subscriptions(&["/gain".to_string(), "/missing".to_string()], &[], &authz)
                .unwrap_err()
                .status(),
            StatusCode::NotFound
        );
        assert_eq!(model.subscriptions().len(), 1);

        let subs = model
            .update_subscriptions(&[], &["/a_number".to_string(), "/never".to_string()], &authz)
            .unwrap();
        assert!(subs.is_empty());

        model.set_subscriptions_enabled(false);
        assert_eq!(
            model.serialize(DetailLevel::Subscriptions, &authz).unwrap_err().status(),
            StatusCode::InvalidArgument
        );
        assert_eq!(
            model.update_subscriptions(&[], &[], &authz).unwrap_err().status(),
            StatusCode::FailedPrecondition
        );
    }

    #[test]
    fn test_languages() {
        let mut model = sample_model();
        model.add_shipped_language("en", LanguagePack::new("English").with_word("hello", "Hello"));
        let admin = Authorizer::with_scope(Scope::Administer);
        let operator = Authorizer::with_scope(Scope::Operate);

        assert_eq!(
            model
                .add_language("en", LanguagePack::new("English"), &admin)
                .unwrap_err()
                .status(),
            StatusCode::PermissionDenied
        );
        assert_eq!(
            model
                .add_language("fr", LanguagePack::new("Français"), &operator)
                .unwrap_err()
                .status(),
            StatusCode::PermissionDenied
        );

        model
            .add_language("fr", LanguagePack::new("Français").with_word("hello", "Bonjour"), &admin)
            .unwrap();
        assert_eq!(
            model
                .add_language("fr", LanguagePack::default().with_word("bye", "Au revoir"), &admin)
                .unwrap_err()
                .status(),
            StatusCode::InvalidArgument
        );
        assert_eq!(
            model
                .add_language("", LanguagePack::new("Deutsch"), &admin)
                .unwrap_err()
                .status(),
            StatusCode::InvalidArgument
        );

        // re-adding a tag replaces the pack
        model
            .add_language("fr", LanguagePack::new("Français").with_word("bye", "Au revoir"), &admin)
            .unwrap();
        let fr = model.get_language_pack("fr", &operator).unwrap();
        assert_eq!(fr.language_pack.name, "Français");
        assert_eq!(fr.language_pack.get("hello"), None);
        assert_eq!(fr.language_pack.get("bye"), Some("Au revoir"));

        assert_eq!(
            model.list_languages(&operator).unwrap(),
            vec!["en".to_string(), "fr".to_string()]
        );
        assert_eq!(
            model.get_language_pack("", &operator).unwrap_err().status(),
            StatusCode::InvalidArgument
        );
        assert_eq!(
            model.get_language_pack("de", &operator).unwrap_err().status(),
            StatusCode::NotFound
        );

        assert_eq!(
            model.remove_language("en", &admin).unwrap_err().status(),
            StatusCode::PermissionDenied
        );
        model.remove_language("fr", &admin).unwrap();
        assert_eq!(
            model.remove_language("fr", &admin).unwrap_err().status(),
            StatusCode::NotFound
        );
    }

    #[test]
    fn test_get_item() {
        let model = sample_model();
        assert_eq!(
            model.get_item(ItemKind::Param, "gain").unwrap().kind(),
            ItemKind::Param
        );
        assert_eq!(
            model.get_item(ItemKind::Command, "gain").unwrap_err().status(),
            StatusCode::NotFound
        );
    }

    #[test]
    fn test_concurrent_writes_are_serialized() {
        let mut model = sample_model();
        model.set_value("/a_number", Value::Int32(1), &Authorizer::disabled()).unwrap();
        let device = Arc::new(Device::new(model));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let device = Arc::clone(&device);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let mut model = device.lock().unwrap();
                        model
                            .multi_set_value(
                                vec![
                                    SetValueEntry::new("/gain", i),
                                    SetValueEntry::new("/a_number", i),
                                ],
                                &Authorizer::disabled(),
                            )
                            .unwrap();
                    }
                })
            })
            .collect();

        for _ in 0..50 {
            let model = device.lock().unwrap();
            let gain = model.get_value("/gain", &Authorizer::disabled()).unwrap();
            let number = model.get_value("/a_number", &Authorizer::disabled()).unwrap();
            assert_eq!(gain, number);
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[tokio::test]
    async fn test_device_events() {
        let device = Device::new(sample_model());
        let mut events = device.subscribe();
        device
            .lock()
            .unwrap()
            .set_value_by_server("/gain", Value::Int32(3))
            .unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            DeviceEvent::ValueSetByServer {
                slot: 1,
                oid: "/gain".to_string(),
                value: Value::Int32(3),
            }
        );
    }
}
