use std::collections::BTreeMap;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use super::device::HvacMode;
use super::device::Mode;
use super::device::Preset;
use super::device::PresetMode;

/// Errors reported by the vendor cloud
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("not found: {0}")]
    NotFound(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installation {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub zones: BTreeMap<String, Zone>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    #[serde(default)]
    pub name: Option<String>,
    /// Device id to "device present" flag. Only `true` entries are fetched.
    #[serde(default)]
    pub devices: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub data: DeviceData,
    #[serde(default)]
    pub firmware: DeviceFirmware,
}

fn default_um_min() -> f64 {
    7.0
}

fn default_um_max() -> f64 {
    30.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceData {
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub product_version: String,
    pub power: bool,
    pub mode: Mode,
    pub status: Preset,
    pub temp: f64,
    pub comfort: f64,
    pub eco: f64,
    pub ice: f64,
    pub probe_temp: f64,
    #[serde(default)]
    pub user_mode_supported: bool,
    #[serde(default)]
    pub user_mode: bool,
    #[serde(default = "default_um_min")]
    pub um_min_temp: f64,
    #[serde(default = "default_um_max")]
    pub um_max_temp: f64,
    #[serde(default)]
    pub ice_mode: bool,
    #[serde(default)]
    pub schedule: Vec<String>,
    #[serde(default)]
    pub active_brightness: u8,
    #[serde(default)]
    pub standby_brightness: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceFirmware {
    pub firmware_version_device: Option<String>,
}

/// Latest energy consumption sample for a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyStats {
    pub kwh: f64,
    pub effective_power: f64,
    pub start: DateTime<Utc>,
}

/// Product (`{type}_{product_version}`) to firmware upgrade path
/// (installed version to latest version).
pub type FirmwareMap = HashMap<String, HashMap<String, String>>;

/// Session with the Rointe cloud.
///
/// Methods take `&mut self` because a session carries its auth token and may
/// refresh it on any call.
#[async_trait]
pub trait RointeApi: Send + Sync + 'static {
    async fn initialize_authentication(&mut self) -> ApiResult<()>;

    fn is_logged_in(&self) -> bool;

    async fn get_local_id(&mut self) -> ApiResult<String>;

    async fn get_installations(&mut self, local_id: &str) -> ApiResult<Vec<InstallationSummary>>;

    async fn get_installation_by_id(
        &mut self,
        installation_id: &str,
        local_id: &str,
    ) -> ApiResult<Installation>;

    async fn get_device(&mut self, device_id: &str) -> ApiResult<DeviceRecord>;

    async fn get_latest_energy_stats(&mut self, device_id: &str) -> ApiResult<EnergyStats>;

    async fn get_latest_firmware(&mut self) -> ApiResult<FirmwareMap>;

    async fn set_device_temp(&mut self, device_id: &str, temp: f64) -> ApiResult<()>;

    async fn set_device_mode(&mut self, device_id: &str, mode: HvacMode) -> ApiResult<()>;

    async fn set_device_preset(&mut self, device_id: &str, preset: PresetMode) -> ApiResult<()>;

    /// Change the temperature stored for the comfort or eco preset
    async fn set_preset_temperature(
        &mut self,
        device_id: &str,
        preset: PresetMode,
        temp: f64,
    ) -> ApiResult<()>;

    async fn set_screen_options(
        &mut self,
        device_id: &str,
        active_brightness: u8,
        standby_brightness: u8,
    ) -> ApiResult<()>;
}
