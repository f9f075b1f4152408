use std::collections::BTreeMap;

use serde::Serialize;

/// Device description supplied by an integration's entities
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    /// `(integration, device id)` pairs
    pub identifiers: Vec<(String, String)>,
    pub name: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub sw_version: Option<String>,
}

/// A device in the rointed system.
///
/// A device represents a physical device that contains one or more entities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub id: String,
    pub identifiers: Vec<(String, String)>,
    pub name: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub sw_version: Option<String>,
    pub entity_ids: Vec<String>,
}

impl Device {
    fn from_info(id: String, info: DeviceInfo) -> Self {
        Self {
            id,
            identifiers: info.identifiers,
            name: info.name,
            manufacturer: info.manufacturer,
            model: info.model,
            sw_version: info.sw_version,
            entity_ids: Vec::new(),
        }
    }

    pub fn add_entity(&mut self, entity_id: String) {
        if !self.entity_ids.contains(&entity_id) {
            self.entity_ids.push(entity_id);
        }
    }
}

/// Devices keyed by `{integration}:{device id}`, taken from their first identifier
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, Device>,
}

impl DeviceRegistry {
    pub fn key(identifier: &(String, String)) -> String {
        format!("{}:{}", identifier.0, identifier.1)
    }

    /// Register the device behind an entity, creating it on first sight
    pub fn register_entity(&mut self, info: DeviceInfo, entity_id: &str) {
        let Some(identifier) = info.identifiers.first() else {
            return;
        };
        let key = Self::key(identifier);
        self.devices
            .entry(key.clone())
            .or_insert_with(|| Device::from_info(key, info))
            .add_entity(entity_id.to_string());
    }

    /// Update the firmware version of an already registered device.
    ///
    /// Returns false when no such device is registered.
    pub fn update_sw_version(
        &mut self,
        identifier: &(String, String),
        sw_version: Option<String>,
    ) -> bool {
        match self.devices.get_mut(&Self::key(identifier)) {
            Some(device) => {
                device.sw_version = sw_version;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, identifier: &(String, String)) -> Option<&Device> {
        self.devices.get(&Self::key(identifier))
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
