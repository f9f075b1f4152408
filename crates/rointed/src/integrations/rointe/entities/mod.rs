mod climate;
mod number;
mod sensor;
mod update;

use async_trait::async_trait;
pub use climate::ClimateEntity;
pub use climate::HvacAction;
pub use number::NumberEntity;
pub use number::NumberKind;
pub use sensor::SensorEntity;
pub use sensor::SensorKind;
use tracing::error;
pub use update::UpdateEntity;

use super::DOMAIN;
use super::MANUFACTURER;
use super::coordinator::CoordinatorHandle;
use super::coordinator::EntityConstructor;
use super::device::DeviceSnapshot;
use super::manager::Command;
use crate::engine::CommandError;
use crate::engine::DeviceInfo;
use crate::engine::Entity;
use crate::engine::EntityCommand;

/// Entity platforms the integration provides
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum Platform {
    Climate,
    Sensor,
    Update,
    Number,
}

impl Platform {
    /// One constructor per entity each device gets on this platform
    pub fn constructors(self) -> Vec<EntityConstructor> {
        match self {
            Platform::Climate => vec![ClimateEntity::construct as EntityConstructor],
            Platform::Number => vec![
                NumberEntity::eco_temperature as EntityConstructor,
                NumberEntity::comfort_temperature as EntityConstructor,
                NumberEntity::standby_brightness as EntityConstructor,
                NumberEntity::active_brightness as EntityConstructor,
            ],
            Platform::Sensor => vec![
                SensorEntity::current_temperature as EntityConstructor,
                SensorEntity::energy as EntityConstructor,
                SensorEntity::power as EntityConstructor,
            ],
            Platform::Update => vec![UpdateEntity::construct as EntityConstructor],
        }
    }
}

/// Every entity the integration creates
pub enum RadiatorEntity {
    Climate(ClimateEntity),
    Number(NumberEntity),
    Sensor(SensorEntity),
    Update(UpdateEntity),
}

impl RadiatorEntity {
    fn inner(&self) -> &dyn Entity {
        match self {
            RadiatorEntity::Climate(e) => e,
            RadiatorEntity::Number(e) => e,
            RadiatorEntity::Sensor(e) => e,
            RadiatorEntity::Update(e) => e,
        }
    }
}

#[async_trait]
impl Entity for RadiatorEntity {
    fn entity_id(&self) -> String {
        self.inner().entity_id()
    }

    fn unique_id(&self) -> String {
        self.inner().unique_id()
    }

    fn name(&self) -> String {
        self.inner().name()
    }

    fn platform(&self) -> &'static str {
        self.inner().platform()
    }

    fn available(&self) -> bool {
        self.inner().available()
    }

    fn state_json(&self) -> serde_json::Value {
        self.inner().state_json()
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        self.inner().device_info()
    }

    async fn handle_command(&self, command: EntityCommand) -> Result<(), CommandError> {
        self.inner().handle_command(command).await
    }
}

/// Shared read and command access for one radiator
#[derive(Clone)]
pub(crate) struct RadiatorView {
    device_id: String,
    coordinator: CoordinatorHandle,
}

impl RadiatorView {
    pub(crate) fn new(device_id: &str, coordinator: &CoordinatorHandle) -> Self {
        Self {
            device_id: device_id.to_string(),
            coordinator: coordinator.clone(),
        }
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&DeviceSnapshot) -> R) -> Option<R> {
        self.coordinator.with_device(&self.device_id, f)
    }

    pub(crate) fn device_name(&self) -> String {
        self.read(|d| d.name.clone())
            .unwrap_or_else(|| self.device_id.clone())
    }

    /// Entity name for a sub-entity, e.g. "Hall Effective Power"
    pub(crate) fn name_with(&self, label: &str) -> String {
        format!("{} {}", self.device_name(), label)
    }

    pub(crate) fn available(&self) -> bool {
        self.coordinator.last_update_success() && self.read(|d| d.available).unwrap_or(false)
    }

    pub(crate) fn entity_id(&self, platform: Platform, key: Option<&str>) -> String {
        let object = object_id(&self.device_id);
        match key {
            Some(key) => format!("{}.{}_{}_{}", platform, DOMAIN, object, key),
            None => format!("{}.{}_{}", platform, DOMAIN, object),
        }
    }

    pub(crate) fn unique_id(&self, key: Option<&str>) -> String {
        match key {
            Some(key) => format!("{}-{}-{}", DOMAIN, self.device_id, key),
            None => format!("{}-{}", DOMAIN, self.device_id),
        }
    }

    pub(crate) fn device_info(&self) -> Option<DeviceInfo> {
        self.read(|d| DeviceInfo {
            identifiers: vec![(DOMAIN.to_string(), d.id.clone())],
            name: d.name.clone(),
            manufacturer: Some(MANUFACTURER.to_string()),
            model: Some(format!("{} {}", d.device_type, d.product_version)),
            sw_version: d.firmware_version.clone(),
        })
    }

    /// Send a command, then always ask for a refresh so state converges
    pub(crate) async fn send(&self, entity_id: &str, command: Command) -> Result<(), CommandError> {
        let ok = self
            .coordinator
            .send_command(&self.device_id, command)
            .await;
        self.coordinator.request_refresh();

        if !ok {
            error!(
                "[rointe] Failed to {} for [{}]",
                command,
                self.device_name()
            );
            return Err(CommandError::Rejected {
                entity_id: entity_id.to_string(),
                command: command.to_string(),
            });
        }
        Ok(())
    }
}

pub(crate) fn check_range(value: f64, min: f64, max: f64) -> Result<(), CommandError> {
    if value.is_nan() || value < min || value > max {
        return Err(CommandError::OutOfRange { value, min, max });
    }
    Ok(())
}

/// Lowercase, with anything outside `[a-z0-9]` replaced by `_`
fn object_id(device_id: &str) -> String {
    device_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
