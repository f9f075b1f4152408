use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

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
use crate::integrations::rointe::manager::Command;

/// Configurable values of a radiator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    ComfortTemperature,
    EcoTemperature,
    ActiveBrightness,
    StandbyBrightness,
}

impl NumberKind {
    pub fn key(self) -> &'static str {
        match self {
            NumberKind::ComfortTemperature => "comfort_temp_preset",
            NumberKind::EcoTemperature => "eco_temp_preset",
            NumberKind::ActiveBrightness => "screen_active_brightness",
            NumberKind::StandbyBrightness => "screen_standby_brightness",
        }
    }

    fn label(self) -> &'static str {
        match self {
            NumberKind::ComfortTemperature => "Comfort Temp. Preset",
            NumberKind::EcoTemperature => "ECO Temp. Preset",
            NumberKind::ActiveBrightness => "Screen Brightness",
            NumberKind::StandbyBrightness => "Standby Brightness",
        }
    }

    /// (min, max, step)
    pub fn range(self) -> (f64, f64, f64) {
        match self {
            NumberKind::ComfortTemperature => (19.0, 30.0, 0.5),
            NumberKind::EcoTemperature => (7.5, 18.5, 0.5),
            NumberKind::ActiveBrightness | NumberKind::StandbyBrightness => (0.0, 10.0, 1.0),
        }
    }

    fn unit(self) -> Option<&'static str> {
        match self {
            NumberKind::ComfortTemperature | NumberKind::EcoTemperature => Some("°C"),
            NumberKind::ActiveBrightness | NumberKind::StandbyBrightness => None,
        }
    }

    pub fn value(self, d: &DeviceSnapshot) -> f64 {
        match self {
            NumberKind::ComfortTemperature => d.comfort_temp,
            NumberKind::EcoTemperature => d.eco_temp,
            NumberKind::ActiveBrightness => f64::from(d.active_brightness),
            NumberKind::StandbyBrightness => f64::from(d.standby_brightness),
        }
    }

    /// Both brightness values travel together, so the other one comes from the snapshot.
    ///
    /// Brightness is whole steps; fractional values round to the nearest one.
    fn command(self, value: f64, d: &DeviceSnapshot) -> Command {
        match self {
            NumberKind::ComfortTemperature => Command::SetComfortTemperature(value),
            NumberKind::EcoTemperature => Command::SetEcoTemperature(value),
            NumberKind::ActiveBrightness => Command::SetScreenBrightness {
                active: value.round() as u8,
                standby: d.standby_brightness,
            },
            NumberKind::StandbyBrightness => Command::SetScreenBrightness {
                active: d.active_brightness,
                standby: value.round() as u8,
            },
        }
    }
}

pub struct NumberEntity {
    view: RadiatorView,
    kind: NumberKind,
}

impl NumberEntity {
    fn construct(
        device_id: &str,
        coordinator: &CoordinatorHandle,
        kind: NumberKind,
    ) -> RadiatorEntity {
        RadiatorEntity::Number(Self {
            view: RadiatorView::new(device_id, coordinator),
            kind,
        })
    }

    pub fn comfort_temperature(device_id: &str, coordinator: &CoordinatorHandle) -> RadiatorEntity {
        Self::construct(device_id, coordinator, NumberKind::ComfortTemperature)
    }

    pub fn eco_temperature(device_id: &str, coordinator: &CoordinatorHandle) -> RadiatorEntity {
        Self::construct(device_id, coordinator, NumberKind::EcoTemperature)
    }

    pub fn active_brightness(device_id: &str, coordinator: &CoordinatorHandle) -> RadiatorEntity {
        Self::construct(device_id, coordinator, NumberKind::ActiveBrightness)
    }

    pub fn standby_brightness(device_id: &str, coordinator: &CoordinatorHandle) -> RadiatorEntity {
        Self::construct(device_id, coordinator, NumberKind::StandbyBrightness)
    }
}

#[async_trait]
impl Entity for NumberEntity {
    fn entity_id(&self) -> String {
        self.view.entity_id(Platform::Number, Some(self.kind.key()))
    }

    fn unique_id(&self) -> String {
        self.view.unique_id(Some(self.kind.key()))
    }

    fn name(&self) -> String {
        self.view.name_with(self.kind.label())
    }

    fn platform(&self) -> &'static str {
        Platform::Number.into()
    }

    fn available(&self) -> bool {
        self.view.available()
    }

    fn state_json(&self) -> serde_json::Value {
        let (min, max, step) = self.kind.range();
        self.view
            .read(|d| {
                json!({
                    "state": self.kind.value(d),
                    "min": min,
                    "max": max,
                    "step": step,
                    "unit_of_measurement": self.kind.unit(),
                })
            })
            .unwrap_or_else(|| json!({ "state": "unavailable" }))
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        self.view.device_info()
    }

    async fn handle_command(&self, command: EntityCommand) -> Result<(), CommandError> {
        let EntityCommand::SetValue { value } = command else {
            return Err(CommandError::Unsupported(format!(
                "{:?} on a number entity",
                command
            )));
        };

        let (min, max, _) = self.kind.range();
        check_range(value, min, max)?;

        debug!("[rointe] Setting {} to {}", self.entity_id(), value);
        let entity_id = self.entity_id();
        let Some(cmd) = self.view.read(|d| self.kind.command(value, d)) else {
            // Device is gone from the data; nothing to send
            return Err(CommandError::Rejected {
                entity_id,
                command: format!("set {} to {}", self.kind.key(), value),
            });
        };
        self.view.send(&entity_id, cmd).await
    }
}
