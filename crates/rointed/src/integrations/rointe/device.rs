use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Datelike;
use chrono::NaiveDateTime;
use chrono::Timelike;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use super::api::DeviceRecord;
use super::api::EnergyStats;

/// All known devices, keyed by vendor device id
pub type DeviceMap = BTreeMap<String, DeviceSnapshot>;

/// Device families the integration knows how to drive
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceType {
    Radiator,
    Towel,
    Therm,
}

/// Operating mode reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    Manual,
    Auto,
}

/// Preset the device is currently running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Preset {
    Comfort,
    Eco,
    Ice,
    None,
    Off,
}

/// HVAC modes exposed on the climate entity
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HvacMode {
    Off,
    Heat,
    Auto,
}

/// Presets a user can select. Ice is shown as "Anti-frost".
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
pub enum PresetMode {
    #[serde(rename = "comfort")]
    #[strum(serialize = "comfort")]
    Comfort,
    #[serde(rename = "eco")]
    #[strum(serialize = "eco")]
    Eco,
    #[serde(rename = "Anti-frost")]
    #[strum(serialize = "Anti-frost")]
    Ice,
}

impl From<PresetMode> for Preset {
    fn from(p: PresetMode) -> Self {
        match p {
            PresetMode::Comfort => Preset::Comfort,
            PresetMode::Eco => Preset::Eco,
            PresetMode::Ice => Preset::Ice,
        }
    }
}

/// One hourly slot of the weekly schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleMode {
    Comfort,
    Eco,
    None,
}

/// Full state of one radiator as of the last successful poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub id: String,
    pub name: String,
    pub device_type: DeviceType,
    pub product_version: String,

    pub power: bool,
    pub mode: Mode,
    pub preset: Preset,

    pub temp: f64,
    pub comfort_temp: f64,
    pub eco_temp: f64,
    pub ice_temp: f64,
    pub probe_temp: f64,

    pub user_mode_supported: bool,
    pub user_mode: bool,
    pub um_min_temp: f64,
    pub um_max_temp: f64,
    pub ice_mode: bool,

    /// Seven day strings (Monday first) of 24 slots: `C`, `E` or `O`
    pub schedule: Vec<String>,

    pub firmware_version: Option<String>,
    pub latest_firmware: Option<String>,

    pub active_brightness: u8,
    pub standby_brightness: u8,

    pub energy: Option<EnergyStats>,

    pub available: bool,
}

impl DeviceSnapshot {
    /// Build a snapshot from a vendor record. Returns `None` for unsupported device types.
    pub fn from_record(
        id: &str,
        record: &DeviceRecord,
        energy: Option<EnergyStats>,
        latest_firmware: Option<String>,
    ) -> Option<Self> {
        let data = &record.data;
        let device_type = data.device_type.parse::<DeviceType>().ok()?;

        Some(Self {
            id: id.to_string(),
            name: data.name.clone(),
            device_type,
            product_version: data.product_version.clone(),
            power: data.power,
            mode: data.mode,
            preset: data.status,
            temp: data.temp,
            comfort_temp: data.comfort,
            eco_temp: data.eco,
            ice_temp: data.ice,
            probe_temp: data.probe_temp,
            user_mode_supported: data.user_mode_supported,
            user_mode: data.user_mode,
            um_min_temp: data.um_min_temp,
            um_max_temp: data.um_max_temp,
            ice_mode: data.ice_mode,
            schedule: data.schedule.clone(),
            firmware_version: record.firmware.firmware_version_device.clone(),
            latest_firmware,
            active_brightness: data.active_brightness,
            standby_brightness: data.standby_brightness,
            energy,
            available: true,
        })
    }

    /// Schedule slot in effect at the given local time
    pub fn schedule_mode_at(&self, at: NaiveDateTime) -> ScheduleMode {
        let day = at.weekday().num_days_from_monday() as usize;
        let hour = at.hour() as usize;

        match self
            .schedule
            .get(day)
            .and_then(|slots| slots.as_bytes().get(hour))
        {
            Some(b'C') => ScheduleMode::Comfort,
            Some(b'E') => ScheduleMode::Eco,
            _ => ScheduleMode::None,
        }
    }

    pub fn current_schedule_mode(&self) -> ScheduleMode {
        self.schedule_mode_at(chrono::Local::now().naive_local())
    }

    /// Temperature of the preset that is currently active, if any
    pub fn preset_temperature(&self) -> Option<f64> {
        match self.preset {
            Preset::Comfort => Some(self.comfort_temp),
            Preset::Eco => Some(self.eco_temp),
            Preset::Ice => Some(self.ice_temp),
            Preset::None | Preset::Off => None,
        }
    }

    pub fn energy_start(&self) -> Option<DateTime<Utc>> {
        self.energy.as_ref().map(|e| e.start)
    }
}
