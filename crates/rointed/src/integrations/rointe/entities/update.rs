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

const KEY: &str = "fw_update_available";

/// Firmware update availability. Installing is left to the vendor app.
pub struct UpdateEntity {
    view: RadiatorView,
}

impl UpdateEntity {
    pub fn construct(device_id: &str, coordinator: &CoordinatorHandle) -> RadiatorEntity {
        RadiatorEntity::Update(Self {
            view: RadiatorView::new(device_id, coordinator),
        })
    }
}

#[async_trait]
impl Entity for UpdateEntity {
    fn entity_id(&self) -> String {
        self.view.entity_id(Platform::Update, Some(KEY))
    }

    fn unique_id(&self) -> String {
        self.view.unique_id(Some(KEY))
    }

    fn name(&self) -> String {
        self.view.name_with("Update Available")
    }

    fn platform(&self) -> &'static str {
        Platform::Update.into()
    }

    fn available(&self) -> bool {
        self.view.available()
    }

    fn state_json(&self) -> serde_json::Value {
        self.view
            .read(|d| {
                let installed = d.firmware_version.clone();
                let latest = d.latest_firmware.clone().or_else(|| installed.clone());
                let pending = installed.is_some() && latest != installed;
                json!({
                    "state": if pending { "on" } else { "off" },
                    "installed_version": installed,
                    "latest_version": latest,
                })
            })
            .unwrap_or_else(|| json!({ "state": "unavailable" }))
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        self.view.device_info()
    }

    async fn handle_command(&self, command: EntityCommand) -> Result<(), CommandError> {
        Err(CommandError::Unsupported(format!(
            "{:?} on update {}",
            command,
            self.entity_id()
        )))
    }
}
