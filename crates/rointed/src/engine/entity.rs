//! Entity abstraction for rointed
//!
//! Every entity an integration hands to the engine implements [`Entity`].
//! The engine reads state through it and routes user commands to it.

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use super::device::DeviceInfo;

/// A user command addressed to one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum EntityCommand {
    SetTemperature { temperature: f64 },
    SetHvacMode { hvac_mode: String },
    SetPresetMode { preset_mode: String },
    SetValue { value: f64 },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    /// The device or vendor refused the command
    #[error("{entity_id}: failed to {command}")]
    Rejected { entity_id: String, command: String },

    #[error("{value} is outside the allowed range {min}..={max}")]
    OutOfRange { value: f64, min: f64, max: f64 },

    #[error("unsupported command: {0}")]
    Unsupported(String),
}

/// Base trait that all entities must implement
#[async_trait]
pub trait Entity: Send + Sync {
    /// `{platform}.{object_id}`
    fn entity_id(&self) -> String;

    /// Stable id that survives renames
    fn unique_id(&self) -> String;

    fn name(&self) -> String;

    /// Platform of this entity (e.g. "climate", "sensor")
    fn platform(&self) -> &'static str;

    fn available(&self) -> bool;

    /// Serialize current state to JSON for the API
    fn state_json(&self) -> serde_json::Value;

    /// Device this entity belongs to, if any
    fn device_info(&self) -> Option<DeviceInfo> {
        None
    }

    async fn handle_command(&self, command: EntityCommand) -> Result<(), CommandError>;
}
