use async_trait::async_trait;
use serde_json::json;

use super::Platform;
use super::RadiatorEntity;
use super::RadiatorView;
use crate::engine::CommandError;
use crate::engine::DeviceInfo;
use crate::engine::Entity;
use crate::engine::EntityCommand;
use crate::integrations::rointe::coordinator::CoordinatorHandle;
use crate::integrations::rointe::device::DeviceSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    CurrentTemperature,
    Energy,
    Power,
}

impl SensorKind {
    pub fn key(self) -> &'static str {
        match self {
            SensorKind::CurrentTemperature => "current_temperature",
            SensorKind::Energy => "energy",
            SensorKind::Power => "power",
        }
    }

    fn label(self) -> &'static str {
        match self {
            SensorKind::CurrentTemperature => "Current Temperature",
            SensorKind::Energy => "Energy Consumption",
            SensorKind::Power => "Effective Power",
        }
    }

    fn unit(self) -> &'static str {
        match self {
            SensorKind::CurrentTemperature => "°C",
            SensorKind::Energy => "kWh",
            SensorKind::Power => "W",
        }
    }

    fn state_class(self) -> &'static str {
        match self {
            SensorKind::Energy => "total",
            SensorKind::CurrentTemperature | SensorKind::Power => "measurement",
        }
    }

    /// None when the device has no reading for this sensor
    pub fn value(self, d: &DeviceSnapshot) -> Option<f64> {
        match self {
            SensorKind::CurrentTemperature => Some(d.probe_temp),
            SensorKind::Energy => d.energy.as_ref().map(|e| e.kwh),
            SensorKind::Power => d.energy.as_ref().map(|e| e.effective_power),
        }
    }
}

/// Read-only radiator measurements
pub struct SensorEntity {
    view: RadiatorView,
    kind: SensorKind,
}

impl SensorEntity {
    fn construct(
        device_id: &str,
        coordinator: &CoordinatorHandle,
        kind: SensorKind,
    ) -> RadiatorEntity {
        RadiatorEntity::Sensor(Self {
            view: RadiatorView::new(device_id, coordinator),
            kind,
        })
    }

    pub fn current_temperature(device_id: &str, coordinator: &CoordinatorHandle) -> RadiatorEntity {
        Self::construct(device_id, coordinator, SensorKind::CurrentTemperature)
    }

    pub fn energy(device_id: &str, coordinator: &CoordinatorHandle) -> RadiatorEntity {
        Self::construct(device_id, coordinator, SensorKind::Energy)
    }

    pub fn power(device_id: &str, coordinator: &CoordinatorHandle) -> RadiatorEntity {
        Self::construct(device_id, coordinator, SensorKind::Power)
    }
}

#[async_trait]
impl Entity for SensorEntity {
    fn entity_id(&self) -> String {
        self.view.entity_id(Platform::Sensor, Some(self.kind.key()))
    }

    fn unique_id(&self) -> String {
        self.view.unique_id(Some(self.kind.key()))
    }

    fn name(&self) -> String {
        self.view.name_with(self.kind.label())
    }

    fn platform(&self) -> &'static str {
        Platform::Sensor.into()
    }

    fn available(&self) -> bool {
        self.view.available() && self.view.read(|d| self.kind.value(d).is_some()) == Some(true)
    }

    fn state_json(&self) -> serde_json::Value {
        let reading = self
            .view
            .read(|d| (self.kind.value(d), d.energy_start()))
            .and_then(|(value, start)| value.map(|v| (v, start)));

        let Some((value, start)) = reading else {
            return json!({ "state": "unavailable" });
        };

        let mut state = json!({
            "state": value,
            "unit_of_measurement": self.kind.unit(),
            "state_class": self.kind.state_class(),
        });
        if self.kind == SensorKind::Energy {
            state["last_reset"] = json!(start);
        }
        state
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        self.view.device_info()
    }

    async fn handle_command(&self, command: EntityCommand) -> Result<(), CommandError> {
        Err(CommandError::Unsupported(format!(
            "{:?} on sensor {}",
            command,
            self.entity_id()
        )))
    }
}
