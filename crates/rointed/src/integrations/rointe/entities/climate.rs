use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use strum::IntoEnumIterator;
use tracing::info;

use super::Platform;
use super::RadiatorEntity;
use super::RadiatorView;
use super::check_range;
use crate::engine::CommandError;
use crate::engine::DeviceInfo;
use crate::engine::Entity;
use crate::engine::EntityCommand;
use crate::integrations::rointe::coordinator::CoordinatorHandle;
use crate::integrations::rointe::device::DeviceSnapshot;
use crate::integrations::rointe::device::HvacMode;
use crate::integrations::rointe::device::Mode;
use crate::integrations::rointe::device::Preset;
use crate::integrations::rointe::device::PresetMode;
use crate::integrations::rointe::manager::Command;

const DEFAULT_MIN_TEMP: f64 = 7.0;
const DEFAULT_MAX_TEMP: f64 = 30.0;
const TEMP_STEP: f64 = 0.5;

/// What the radiator is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HvacAction {
    Idle,
    Off,
    Heating,
}

pub fn hvac_mode(d: &DeviceSnapshot) -> HvacMode {
    if !d.power {
        HvacMode::Off
    } else if d.mode == Mode::Auto {
        HvacMode::Auto
    } else {
        HvacMode::Heat
    }
}

pub fn hvac_action(d: &DeviceSnapshot) -> HvacAction {
    // Auto mode waiting for the schedule to start
    if d.mode == Mode::Auto && d.preset == Preset::Off {
        HvacAction::Idle
    } else if !d.power {
        HvacAction::Off
    } else {
        HvacAction::Heating
    }
}

/// In auto mode the active preset's temperature is the target
pub fn target_temperature(d: &DeviceSnapshot) -> f64 {
    match d.mode {
        Mode::Auto => d.preset_temperature().unwrap_or(d.temp),
        Mode::Manual => d.temp,
    }
}

pub fn temperature_bounds(d: &DeviceSnapshot) -> (f64, f64) {
    if d.user_mode_supported && d.user_mode {
        (d.um_min_temp, d.um_max_temp)
    } else {
        (DEFAULT_MIN_TEMP, DEFAULT_MAX_TEMP)
    }
}

pub fn preset_mode(d: &DeviceSnapshot) -> Option<PresetMode> {
    match d.preset {
        Preset::Comfort => Some(PresetMode::Comfort),
        Preset::Eco => Some(PresetMode::Eco),
        Preset::Ice => Some(PresetMode::Ice),
        Preset::None | Preset::Off => None,
    }
}

/// The radiator itself as a thermostat
pub struct ClimateEntity {
    view: RadiatorView,
}

impl ClimateEntity {
    pub fn construct(device_id: &str, coordinator: &CoordinatorHandle) -> RadiatorEntity {
        RadiatorEntity::Climate(Self {
            view: RadiatorView::new(device_id, coordinator),
        })
    }

    async fn set_temperature(&self, temperature: f64) -> Result<(), CommandError> {
        let (min, max) = self
            .view
            .read(temperature_bounds)
            .unwrap_or((DEFAULT_MIN_TEMP, DEFAULT_MAX_TEMP));
        check_range(temperature, min, max)?;

        self.view
            .send(&self.entity_id(), Command::SetTemperature(temperature))
            .await
    }
}

#[async_trait]
impl Entity for ClimateEntity {
    fn entity_id(&self) -> String {
        self.view.entity_id(Platform::Climate, None)
    }

    fn unique_id(&self) -> String {
        self.view.unique_id(None)
    }

    fn name(&self) -> String {
        self.view.device_name()
    }

    fn platform(&self) -> &'static str {
        Platform::Climate.into()
    }

    fn available(&self) -> bool {
        self.view.available()
    }

    fn state_json(&self) -> serde_json::Value {
        self.view
            .read(|d| {
                let (min_temp, max_temp) = temperature_bounds(d);
                json!({
                    "state": hvac_mode(d),
                    "hvac_action": hvac_action(d),
                    "hvac_modes": HvacMode::iter().collect::<Vec<_>>(),
                    "current_temperature": d.probe_temp,
                    "temperature": target_temperature(d),
                    "min_temp": min_temp,
                    "max_temp": max_temp,
                    "target_temp_step": TEMP_STEP,
                    "preset_mode": preset_mode(d),
                    "preset_modes": PresetMode::iter().collect::<Vec<_>>(),
                })
            })
            .unwrap_or_else(|| json!({ "state": "unavailable" }))
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        self.view.device_info()
    }

    async fn handle_command(&self, command: EntityCommand) -> Result<(), CommandError> {
        match command {
            EntityCommand::SetTemperature { temperature } => {
                self.set_temperature(temperature).await
            }
            EntityCommand::SetHvacMode { hvac_mode } => {
                let mode = hvac_mode
                    .parse::<HvacMode>()
                    .map_err(|_| CommandError::Unsupported(format!("hvac mode {}", hvac_mode)))?;
                info!("[rointe] Setting HVAC mode of {} to {}", self.entity_id(), mode);
                self.view
                    .send(&self.entity_id(), Command::SetHvacMode(mode))
                    .await
            }
            EntityCommand::SetPresetMode { preset_mode } => {
                let preset = preset_mode.parse::<PresetMode>().map_err(|_| {
                    CommandError::Unsupported(format!("preset mode {}", preset_mode))
                })?;
                info!("[rointe] Setting preset of {} to {}", self.entity_id(), preset);
                self.view
                    .send(&self.entity_id(), Command::SetPreset(preset))
                    .await
            }
            EntityCommand::SetValue { .. } => Err(CommandError::Unsupported(
                "set_value on a climate entity".to_string(),
            )),
        }
    }
}
