/*!
 * Device registry.
 *
 * Maps slot numbers to devices. Slots are unique, and lookups hand out
 * shared references so a request can work on a device without holding the
 * registry lock.
 */
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{DeviceError, Result};

/// Event types for the device registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A device was added at a slot
    DeviceAdded(u32),
    /// A device was removed from a slot
    DeviceRemoved(u32),
}

/// Device registry
#[derive(Debug)]
pub struct DeviceRegistry {
    /// The registered devices, keyed by slot
    devices: RwLock<BTreeMap<u32, Arc<Device>>>,
    /// Event sender for registry events
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl DeviceRegistry {
    /// Create a new device registry
    pub fn new() -> Self {
        let (event_sender, _) = broadcast::channel(100);
        Self {
            devices: RwLock::new(BTreeMap::new()),
            event_sender,
        }
    }

    /// Register a device at its slot
    pub fn register(&self, device: Device) -> Result<Arc<Device>> {
        let device = Arc::new(device);
        self.register_shared(Arc::clone(&device))?;
        Ok(device)
    }

    /// Register a device that is already shared
    pub fn register_shared(&self, device: Arc<Device>) -> Result<()> {
        let slot = device.slot();
        let mut devices = self.devices.write().map_err(|_| {
            DeviceError::internal("Failed to acquire write lock on device registry")
        })?;

        if devices.contains_key(&slot) {
            return Err(DeviceError::AlreadyExists(format!(
                "a device is already registered at slot {}",
                slot
            )));
        }

        devices.insert(slot, device);
        let _ = self.event_sender.send(RegistryEvent::DeviceAdded(slot));
        info!("Registered device at slot {}", slot);

        Ok(())
    }

    /// Unregister the device at `slot`
    pub fn unregister(&self, slot: u32) -> Result<Arc<Device>> {
        let mut devices = self.devices.write().map_err(|_| {
            DeviceError::internal("Failed to acquire write lock on device registry")
        })?;

        let device = devices
            .remove(&slot)
            .ok_or_else(|| DeviceError::not_found(format!("no device at slot {}", slot)))?;

        let _ = self.event_sender.send(RegistryEvent::DeviceRemoved(slot));
        debug!("Unregistered device at slot {}", slot);

        Ok(device)
    }

    /// Get the device at `slot`
    pub fn get(&self, slot: u32) -> Result<Arc<Device>> {
        let devices = self.devices.read().map_err(|_| {
            DeviceError::internal("Failed to acquire read lock on device registry")
        })?;

        devices
            .get(&slot)
            .cloned()
            .ok_or_else(|| DeviceError::not_found(format!("no device at slot {}", slot)))
    }

    /// Populated slots in ascending order
    pub fn populated_slots(&self) -> Result<Vec<u32>> {
        let devices = self.devices.read().map_err(|_| {
            DeviceError::internal("Failed to acquire read lock on device registry")
        })?;

        Ok(devices.keys().copied().collect())
    }

    /// Count registered devices
    pub fn len(&self) -> Result<usize> {
        let devices = self.devices.read().map_err(|_| {
            DeviceError::internal("Failed to acquire read lock on device registry")
        })?;

        Ok(devices.len())
    }

    /// Check whether no device is registered
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Check if a slot is populated
    pub fn contains(&self, slot: u32) -> Result<bool> {
        let devices = self.devices.read().map_err(|_| {
            DeviceError::internal("Failed to acquire read lock on device registry")
        })?;

        Ok(devices.contains_key(&slot))
    }

    /// Subscribe to registry events
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A shared device registry that can be cloned
#[derive(Debug, Clone)]
pub struct SharedDeviceRegistry(Arc<DeviceRegistry>);

impl SharedDeviceRegistry {
    /// Create a new shared device registry
    pub fn new() -> Self {
        Self(Arc::new(DeviceRegistry::new()))
    }

    /// Get a reference to the device registry
    pub fn registry(&self) -> &DeviceRegistry {
        &self.0
    }
}

impl Default for SharedDeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<DeviceRegistry> for SharedDeviceRegistry {
    fn as_ref(&self) -> &DeviceRegistry {
        self.registry()
    }
}
