use std::sync::Arc;

use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::DEFAULT_TEMPERATURE;
use super::api::ApiError;
use super::api::FirmwareMap;
use super::api::RointeApi;
use super::device::DeviceMap;
use super::device::DeviceSnapshot;
use super::device::HvacMode;
use super::device::Mode;
use super::device::Preset;
use super::device::PresetMode;
use super::device::ScheduleMode;
use super::firmware::determine_latest_firmware;

/// Why a poll of the installation failed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UpdateError {
    /// The session is no longer valid. Fatal to the running entry.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Network or service failure. Retried on the next tick.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<ApiError> for UpdateError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Authentication(m) => UpdateError::Authentication(m),
            other => UpdateError::Transport(other.to_string()),
        }
    }
}

/// How a command's effect reaches the local snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    /// Patched only once the vendor accepted the command
    Confirmed,
    /// Patched before sending and kept even if sending fails
    Optimistic,
}

/// A state change for one device
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    SetTemperature(f64),
    SetHvacMode(HvacMode),
    SetPreset(PresetMode),
    SetComfortTemperature(f64),
    SetEcoTemperature(f64),
    SetScreenBrightness { active: u8, standby: u8 },
}

impl Command {
    pub fn consistency(&self) -> Consistency {
        match self {
            Command::SetScreenBrightness { .. } => Consistency::Optimistic,
            _ => Consistency::Confirmed,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::SetTemperature(t) => write!(f, "set temperature {}", t),
            Command::SetHvacMode(m) => write!(f, "set hvac mode {}", m),
            Command::SetPreset(p) => write!(f, "set preset {}", p),
            Command::SetComfortTemperature(t) => write!(f, "set comfort temperature {}", t),
            Command::SetEcoTemperature(t) => write!(f, "set eco temperature {}", t),
            Command::SetScreenBrightness { active, standby } => {
                write!(f, "set screen brightness {}/{}", active, standby)
            }
        }
    }
}

/// Owns the vendor session and the known devices of one installation.
pub struct DeviceManager<A: RointeApi> {
    api: A,
    installation_id: String,
    local_id: String,
    devices: Arc<DeviceMap>,
}

impl<A: RointeApi> DeviceManager<A> {
    pub fn new(api: A, installation_id: &str, local_id: &str) -> Self {
        Self {
            api,
            installation_id: installation_id.to_string(),
            local_id: local_id.to_string(),
            devices: Arc::default(),
        }
    }

    /// Devices as of the last update, including local patches from commands
    pub fn devices(&self) -> Arc<DeviceMap> {
        self.devices.clone()
    }

    pub async fn authenticate(&mut self) -> Result<(), UpdateError> {
        self.api.initialize_authentication().await?;
        if !self.api.is_logged_in() {
            return Err(UpdateError::Authentication(
                "session not established".to_string(),
            ));
        }
        Ok(())
    }

    /// Fetch every device of the installation.
    ///
    /// On error the known devices are left exactly as they were.
    pub async fn update(&mut self) -> Result<Arc<DeviceMap>, UpdateError> {
        debug!("[rointe] Device manager updating");

        let installation = self
            .api
            .get_installation_by_id(&self.installation_id, &self.local_id)
            .await
            .map_err(|e| {
                error!("[rointe] Unable to get installation {}: {}", self.installation_id, e);
                UpdateError::from(e)
            })?;

        let firmware_map = self.firmware_map().await;
        let mut discovered = DeviceMap::new();

        for (zone_id, zone) in &installation.zones {
            debug!("[rointe] Processing zone {}", zone_id);

            for (device_id, present) in &zone.devices {
                if !present {
                    debug!("[rointe] Device {} has no data", device_id);
                    continue;
                }

                let record = match self.api.get_device(device_id).await {
                    Ok(r) => r,
                    Err(ApiError::Authentication(m)) => return Err(UpdateError::Authentication(m)),
                    Err(e) => {
                        warn!("[rointe] Failed getting device status for {}: {}", device_id, e);
                        if let Some(previous) = self.devices.get(device_id) {
                            let mut stale = previous.clone();
                            stale.available = false;
                            discovered.insert(device_id.clone(), stale);
                        }
                        continue;
                    }
                };

                let energy = self.api.get_latest_energy_stats(device_id).await.ok();
                let latest_firmware = firmware_map
                    .as_ref()
                    .and_then(|map| determine_latest_firmware(&record, map));

                let Some(snapshot) =
                    DeviceSnapshot::from_record(device_id, &record, energy, latest_firmware)
                else {
                    warn!(
                        "[rointe] Ignoring device {} of unsupported type {}",
                        device_id, record.data.device_type
                    );
                    continue;
                };

                match self.devices.get(device_id) {
                    None => info!(
                        "[rointe] Found new device {} [{}] - {}",
                        snapshot.name, snapshot.device_type, snapshot.product_version
                    ),
                    Some(previous) if !previous.available => {
                        info!("[rointe] Restoring device {}", snapshot.name)
                    }
                    Some(_) => debug!(
                        "[rointe] Updating [{}] => power: {}, preset: {}, mode: {}, temp: {}",
                        snapshot.name, snapshot.power, snapshot.preset, snapshot.mode, snapshot.temp
                    ),
                }

                discovered.insert(device_id.clone(), snapshot);
            }
        }

        self.devices = Arc::new(discovered);
        Ok(self.devices.clone())
    }

    async fn firmware_map(&mut self) -> Option<FirmwareMap> {
        match self.api.get_latest_firmware().await {
            Ok(map) => Some(map),
            Err(e) => {
                error!("[rointe] Unable to fetch firmware update map: {}", e);
                None
            }
        }
    }

    /// Push a command to one device. Returns false on any failure.
    pub async fn send_command(&mut self, device_id: &str, command: &Command) -> bool {
        debug!("[rointe] Sending command [{}] to device {}", command, device_id);

        if !self.devices.contains_key(device_id) {
            warn!("[rointe] Command for unknown device {}", device_id);
            return false;
        }

        if command.consistency() == Consistency::Optimistic {
            self.patch(device_id, |d| apply_optimistic(d, command));
        }

        let result = match *command {
            Command::SetTemperature(t) => self.api.set_device_temp(device_id, t).await,
            Command::SetHvacMode(m) => self.api.set_device_mode(device_id, m).await,
            Command::SetPreset(p) => self.api.set_device_preset(device_id, p).await,
            Command::SetComfortTemperature(t) => {
                self.api
                    .set_preset_temperature(device_id, PresetMode::Comfort, t)
                    .await
            }
            Command::SetEcoTemperature(t) => {
                self.api
                    .set_preset_temperature(device_id, PresetMode::Eco, t)
                    .await
            }
            Command::SetScreenBrightness { active, standby } => {
                self.api.set_screen_options(device_id, active, standby).await
            }
        };

        if let Err(e) = result {
            warn!("[rointe] Command [{}] for {} failed: {}", command, device_id, e);
            return false;
        }

        if command.consistency() == Consistency::Confirmed {
            self.patch(device_id, |d| {
                let slot = d.current_schedule_mode();
                apply_confirmed(d, command, slot);
            });
        }

        true
    }

    fn patch<F: FnOnce(&mut DeviceSnapshot)>(&mut self, device_id: &str, f: F) {
        if let Some(device) = Arc::make_mut(&mut self.devices).get_mut(device_id) {
            f(device);
        }
    }
}

fn apply_optimistic(device: &mut DeviceSnapshot, command: &Command) {
    if let Command::SetScreenBrightness { active, standby } = *command {
        device.active_brightness = active;
        device.standby_brightness = standby;
    }
}

/// Local effect of an accepted command
fn apply_confirmed(device: &mut DeviceSnapshot, command: &Command, slot: ScheduleMode) {
    match *command {
        Command::SetTemperature(t) => {
            device.temp = t;
            device.mode = Mode::Manual;
            device.power = true;
            device.preset = if t == device.comfort_temp {
                Preset::Comfort
            } else if t == device.eco_temp {
                Preset::Eco
            } else if t == device.ice_temp {
                Preset::Ice
            } else {
                Preset::None
            };
        }
        Command::SetHvacMode(HvacMode::Off) => {
            if device.mode == Mode::Manual {
                device.temp = DEFAULT_TEMPERATURE;
            }
            device.power = false;
            device.preset = Preset::Off;
        }
        Command::SetHvacMode(HvacMode::Heat) => {
            device.temp = device.comfort_temp;
            device.power = true;
            device.mode = Mode::Manual;
            device.preset = Preset::None;
        }
        Command::SetHvacMode(HvacMode::Auto) => {
            match slot {
                ScheduleMode::Comfort => {
                    device.temp = device.comfort_temp;
                    device.preset = Preset::Comfort;
                }
                ScheduleMode::Eco => {
                    device.temp = device.eco_temp;
                    device.preset = Preset::Eco;
                }
                ScheduleMode::None if device.ice_mode => {
                    device.temp = device.ice_temp;
                    device.preset = Preset::Ice;
                }
                ScheduleMode::None => device.temp = DEFAULT_TEMPERATURE,
            }
            device.power = true;
            device.mode = Mode::Auto;
        }
        Command::SetPreset(p) => {
            device.power = true;
            device.mode = Mode::Manual;
            device.preset = Preset::from(p);
        }
        Command::SetComfortTemperature(t) => device.comfort_temp = t,
        Command::SetEcoTemperature(t) => device.eco_temp = t,
        Command::SetScreenBrightness { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::rointe::device::tests::snapshot;
    use crate::integrations::rointe::simulator::tests::cloud;
    use crate::integrations::rointe::simulator::tests::logged_in;

    async fn manager() -> (
        crate::integrations::rointe::simulator::SimulatedCloud,
        DeviceManager<crate::integrations::rointe::simulator::SimulatedSession>,
    ) {
        let cloud = cloud();
        let session = logged_in(&cloud).await;
        (cloud, DeviceManager::new(session, "inst-1", "local-1"))
    }

    #[tokio::test]
    async fn test_update_fetches_flagged_devices() {
        let (_cloud, mut manager) = manager().await;
        let devices = manager.update().await.unwrap();

        assert_eq!(devices.keys().collect::<Vec<_>>(), vec!["A", "B"]);
        let a = &devices["A"];
        assert_eq!(a.latest_firmware.as_deref(), Some("1.2.0"));
        assert_eq!(a.energy.as_ref().map(|e| e.kwh), Some(12.5));
        assert!(devices["B"].energy.is_none());
        assert_eq!(devices["B"].latest_firmware.as_deref(), Some("2.1.0"));
    }

    #[tokio::test]
    async fn test_update_skips_unsupported_types() {
        let (cloud, mut manager) = manager().await;
        let mut oven = cloud.device_record("A").unwrap();
        oven.data.device_type = "oven".to_string();
        cloud.add_device("inst-1", "z2", "C", oven);

        let devices = manager.update().await.unwrap();
        assert!(!devices.contains_key("C"));
    }

    #[tokio::test]
    async fn test_failed_update_keeps_devices() {
        let (cloud, mut manager) = manager().await;
        let before = manager.update().await.unwrap();

        cloud.set_offline(true);
        assert!(matches!(manager.update().await, Err(UpdateError::Transport(_))));
        assert_eq!(manager.devices(), before);

        cloud.set_offline(false);
        cloud.expire_sessions();
        assert!(matches!(
            manager.update().await,
            Err(UpdateError::Authentication(_))
        ));
        assert_eq!(manager.devices(), before);
    }

    #[tokio::test]
    async fn test_failed_device_fetch_carries_previous_forward() {
        let (cloud, mut manager) = manager().await;
        manager.update().await.unwrap();

        cloud.set_device_failing("A", true);
        cloud.set_vendor_temperature("A", 25.0);
        let devices = manager.update().await.unwrap();
        assert!(!devices["A"].available);
        assert_eq!(devices["A"].temp, 21.0);
        assert!(devices["B"].available);

        cloud.set_device_failing("A", false);
        let devices = manager.update().await.unwrap();
        assert!(devices["A"].available);
        assert_eq!(devices["A"].temp, 25.0);
    }

    #[tokio::test]
    async fn test_firmware_map_failure_drops_latest_firmware() {
        let (cloud, mut manager) = manager().await;
        cloud.set_firmware_unavailable(true);
        let devices = manager.update().await.unwrap();
        assert_eq!(devices["A"].latest_firmware, None);
        assert_eq!(devices["A"].firmware_version.as_deref(), Some("1.0.0"));
    }

    #[tokio::test]
    async fn test_rejected_command_leaves_snapshot_unchanged() {
        let (cloud, mut manager) = manager().await;
        manager.update().await.unwrap();
        let before = manager.devices()["A"].clone();

        cloud.set_reject_commands(true);
        assert!(!manager.send_command("A", &Command::SetTemperature(21.5)).await);
        assert_eq!(manager.devices()["A"], before);
    }

    #[tokio::test]
    async fn test_optimistic_brightness_survives_failure() {
        let (cloud, mut manager) = manager().await;
        manager.update().await.unwrap();

        cloud.set_reject_commands(true);
        let cmd = Command::SetScreenBrightness {
            active: 4,
            standby: 1,
        };
        assert!(!manager.send_command("A", &cmd).await);

        let a = &manager.devices()["A"];
        assert_eq!(a.active_brightness, 4);
        assert_eq!(a.standby_brightness, 1);
        assert!(a.available);
    }

    #[tokio::test]
    async fn test_unknown_device_command() {
        let (_cloud, mut manager) = manager().await;
        manager.update().await.unwrap();
        assert!(!manager.send_command("nope", &Command::SetTemperature(20.0)).await);
    }

    #[tokio::test]
    async fn test_accepted_temperature_patches_snapshot() {
        let (cloud, mut manager) = manager().await;
        manager.update().await.unwrap();

        assert!(manager.send_command("A", &Command::SetTemperature(17.0)).await);
        let a = &manager.devices()["A"];
        assert_eq!(a.temp, 17.0);
        assert_eq!(a.preset, Preset::Eco);
        assert_eq!(a.mode, Mode::Manual);
        assert_eq!(cloud.command_log(), vec!["A:set_temp=17".to_string()]);
    }

    #[tokio::test]
    async fn test_accepted_auto_follows_current_slot() {
        let (_cloud, mut manager) = manager().await;
        manager.update().await.unwrap();

        let mut expected = manager.devices()["A"].clone();
        let slot = expected.current_schedule_mode();
        apply_confirmed(&mut expected, &Command::SetHvacMode(HvacMode::Auto), slot);

        assert!(manager.send_command("A", &Command::SetHvacMode(HvacMode::Auto)).await);
        assert_eq!(manager.devices()["A"], expected);
        assert_eq!(manager.devices()["A"].mode, Mode::Auto);
    }

    #[test]
    fn test_set_temperature_derives_preset() {
        let mut d = snapshot("a");
        apply_confirmed(&mut d, &Command::SetTemperature(7.0), ScheduleMode::None);
        assert_eq!(d.preset, Preset::Ice);
        apply_confirmed(&mut d, &Command::SetTemperature(21.5), ScheduleMode::None);
        assert_eq!(d.preset, Preset::None);
        assert!(d.power);
    }

    #[test]
    fn test_hvac_off() {
        let mut d = snapshot("a");
        d.temp = 23.0;
        apply_confirmed(&mut d, &Command::SetHvacMode(HvacMode::Off), ScheduleMode::None);
        assert!(!d.power);
        assert_eq!(d.preset, Preset::Off);
        assert_eq!(d.temp, DEFAULT_TEMPERATURE);

        let mut d = snapshot("b");
        d.mode = Mode::Auto;
        d.temp = 23.0;
        apply_confirmed(&mut d, &Command::SetHvacMode(HvacMode::Off), ScheduleMode::None);
        assert_eq!(d.temp, 23.0);
    }

    #[test]
    fn test_hvac_heat() {
        let mut d = snapshot("a");
        d.power = false;
        d.temp = 10.0;
        apply_confirmed(&mut d, &Command::SetHvacMode(HvacMode::Heat), ScheduleMode::Eco);
        assert!(d.power);
        assert_eq!(d.temp, d.comfort_temp);
        assert_eq!(d.mode, Mode::Manual);
        assert_eq!(d.preset, Preset::None);
    }

    #[test]
    fn test_hvac_auto_follows_schedule() {
        let mut d = snapshot("a");
        apply_confirmed(&mut d, &Command::SetHvacMode(HvacMode::Auto), ScheduleMode::Eco);
        assert_eq!(d.mode, Mode::Auto);
        assert_eq!(d.preset, Preset::Eco);
        assert_eq!(d.temp, d.eco_temp);

        let mut d = snapshot("b");
        d.ice_mode = true;
        apply_confirmed(&mut d, &Command::SetHvacMode(HvacMode::Auto), ScheduleMode::None);
        assert_eq!(d.preset, Preset::Ice);
        assert_eq!(d.temp, d.ice_temp);

        let mut d = snapshot("c");
        apply_confirmed(&mut d, &Command::SetHvacMode(HvacMode::Auto), ScheduleMode::None);
        assert_eq!(d.temp, DEFAULT_TEMPERATURE);
        assert_eq!(d.preset, Preset::Comfort);
    }

    #[test]
    fn test_preset_and_preset_temperatures() {
        let mut d = snapshot("a");
        d.power = false;
        d.mode = Mode::Auto;
        apply_confirmed(&mut d, &Command::SetPreset(PresetMode::Ice), ScheduleMode::None);
        assert!(d.power);
        assert_eq!(d.mode, Mode::Manual);
        assert_eq!(d.preset, Preset::Ice);

        apply_confirmed(&mut d, &Command::SetComfortTemperature(22.5), ScheduleMode::None);
        apply_confirmed(&mut d, &Command::SetEcoTemperature(16.0), ScheduleMode::None);
        assert_eq!(d.comfort_temp, 22.5);
        assert_eq!(d.eco_temp, 16.0);
    }

    #[test]
    fn test_command_consistency() {
        assert_eq!(
            Command::SetTemperature(20.0).consistency(),
            Consistency::Confirmed
        );
        assert_eq!(
            Command::SetScreenBrightness {
                active: 1,
                standby: 0
            }
            .consistency(),
            Consistency::Optimistic
        );
    }
}
