//! In-memory stand-in for the Rointe cloud.
//!
//! The cloud is seeded from a JSON fixture and shared between sessions, so a
//! test can change vendor-side state or inject faults while the integration
//! keeps polling through its own session.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::api::ApiError;
use super::api::ApiResult;
use super::api::DeviceRecord;
use super::api::EnergyStats;
use super::api::FirmwareMap;
use super::api::Installation;
use super::api::InstallationSummary;
use super::api::RointeApi;
use super::api::Zone;
use super::device::HvacMode;
use super::device::Mode;
use super::device::Preset;
use super::device::PresetMode;

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("failed to read fixture '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse fixture: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize)]
struct Account {
    username: String,
    password: String,
    local_id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct FixtureDevice {
    #[serde(flatten)]
    record: DeviceRecord,
    #[serde(default)]
    energy: Option<EnergyStats>,
}

#[derive(Debug, Clone, Deserialize)]
struct Fixture {
    account: Account,
    installations: Vec<Installation>,
    #[serde(default)]
    devices: BTreeMap<String, FixtureDevice>,
    #[serde(default)]
    firmware: FirmwareMap,
}

#[derive(Debug)]
struct CloudState {
    fixture: Fixture,
    offline: bool,
    reject_commands: bool,
    firmware_unavailable: bool,
    failing_devices: HashSet<String>,
    session_epoch: u64,
    commands: Vec<String>,
}

/// Shared simulated cloud backend
#[derive(Debug, Clone)]
pub struct SimulatedCloud {
    state: Arc<Mutex<CloudState>>,
}

impl SimulatedCloud {
    pub fn from_json(json: &str) -> Result<Self, FixtureError> {
        let fixture: Fixture = serde_json::from_str(json)?;
        Ok(Self {
            state: Arc::new(Mutex::new(CloudState {
                fixture,
                offline: false,
                reject_commands: false,
                firmware_unavailable: false,
                failing_devices: HashSet::new(),
                session_epoch: 0,
                commands: Vec::new(),
            })),
        })
    }

    pub fn from_fixture_file(path: &Path) -> Result<Self, FixtureError> {
        let json = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Open a new, not yet authenticated, session
    pub fn session(&self, username: &str, password: &str) -> SimulatedSession {
        SimulatedSession {
            cloud: self.clone(),
            username: username.to_string(),
            password: password.to_string(),
            epoch: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every call fails with a transport error while offline
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Commands are refused while set
    pub fn set_reject_commands(&self, reject: bool) {
        self.lock().reject_commands = reject;
    }

    pub fn set_firmware_unavailable(&self, unavailable: bool) {
        self.lock().firmware_unavailable = unavailable;
    }

    /// Make fetches of a single device fail
    pub fn set_device_failing(&self, device_id: &str, failing: bool) {
        let mut state = self.lock();
        if failing {
            state.failing_devices.insert(device_id.to_string());
        } else {
            state.failing_devices.remove(device_id);
        }
    }

    /// Invalidate all sessions. They must authenticate again.
    pub fn expire_sessions(&self) {
        self.lock().session_epoch += 1;
    }

    /// Change a device's temperature on the vendor side, as if from its own panel
    pub fn set_vendor_temperature(&self, device_id: &str, temp: f64) {
        if let Some(d) = self.lock().fixture.devices.get_mut(device_id) {
            d.record.data.temp = temp;
        }
    }

    pub fn device_record(&self, device_id: &str) -> Option<DeviceRecord> {
        self.lock()
            .fixture
            .devices
            .get(device_id)
            .map(|d| d.record.clone())
    }

    /// Add a device to a zone of an installation, creating the zone if needed
    pub fn add_device(
        &self,
        installation_id: &str,
        zone_id: &str,
        device_id: &str,
        record: DeviceRecord,
    ) {
        let mut state = self.lock();
        if let Some(installation) = state
            .fixture
            .installations
            .iter_mut()
            .find(|i| i.id == installation_id)
        {
            installation
                .zones
                .entry(zone_id.to_string())
                .or_insert_with(|| Zone {
                    name: None,
                    devices: BTreeMap::new(),
                })
                .devices
                .insert(device_id.to_string(), true);
        }
        state.fixture.devices.insert(
            device_id.to_string(),
            FixtureDevice {
                record,
                energy: None,
            },
        );
    }

    /// Commands accepted so far, formatted as `{device_id}:{command}`
    pub fn command_log(&self) -> Vec<String> {
        self.lock().commands.clone()
    }
}

/// A session against the simulated cloud
#[derive(Debug)]
pub struct SimulatedSession {
    cloud: SimulatedCloud,
    username: String,
    password: String,
    epoch: Option<u64>,
}

impl SimulatedSession {
    /// Check connectivity and session validity, then hand out the state
    fn authorized(&self) -> ApiResult<MutexGuard<'_, CloudState>> {
        let state = self.cloud.lock();
        if state.offline {
            return Err(ApiError::Transport("cloud unreachable".to_string()));
        }
        if self.epoch != Some(state.session_epoch) {
            return Err(ApiError::Authentication("session expired".to_string()));
        }
        Ok(state)
    }

    /// Apply a command to a device after the usual checks
    fn command<F>(&self, device_id: &str, label: String, apply: F) -> ApiResult<()>
    where
        F: FnOnce(&mut DeviceRecord),
    {
        let mut state = self.authorized()?;
        if state.reject_commands {
            return Err(ApiError::Rejected(format!("{} refused", label)));
        }
        let device = state
            .fixture
            .devices
            .get_mut(device_id)
            .ok_or_else(|| ApiError::NotFound(device_id.to_string()))?;
        apply(&mut device.record);
        debug!("simulated cloud accepted {} for {}", label, device_id);
        state.commands.push(format!("{}:{}", device_id, label));
        Ok(())
    }
}

#[async_trait]
impl RointeApi for SimulatedSession {
    async fn initialize_authentication(&mut self) -> ApiResult<()> {
        let state = self.cloud.lock();
        if state.offline {
            return Err(ApiError::Transport("cloud unreachable".to_string()));
        }
        let account = &state.fixture.account;
        if account.username != self.username || account.password != self.password {
            return Err(ApiError::Authentication("invalid credentials".to_string()));
        }
        let epoch = state.session_epoch;
        drop(state);
        self.epoch = Some(epoch);
        Ok(())
    }

    fn is_logged_in(&self) -> bool {
        self.epoch == Some(self.cloud.lock().session_epoch)
    }

    async fn get_local_id(&mut self) -> ApiResult<String> {
        Ok(self.authorized()?.fixture.account.local_id.clone())
    }

    async fn get_installations(&mut self, local_id: &str) -> ApiResult<Vec<InstallationSummary>> {
        let state = self.authorized()?;
        if state.fixture.account.local_id != local_id {
            return Err(ApiError::NotFound(format!("local id {}", local_id)));
        }
        Ok(state
            .fixture
            .installations
            .iter()
            .map(|i| InstallationSummary {
                id: i.id.clone(),
                name: i.name.clone(),
            })
            .collect())
    }

    async fn get_installation_by_id(
        &mut self,
        installation_id: &str,
        local_id: &str,
    ) -> ApiResult<Installation> {
        let state = self.authorized()?;
        if state.fixture.account.local_id != local_id {
            return Err(ApiError::NotFound(format!("local id {}", local_id)));
        }
        state
            .fixture
            .installations
            .iter()
            .find(|i| i.id == installation_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("installation {}", installation_id)))
    }

    async fn get_device(&mut self, device_id: &str) -> ApiResult<DeviceRecord> {
        let state = self.authorized()?;
        if state.failing_devices.contains(device_id) {
            return Err(ApiError::Transport(format!("device {} timed out", device_id)));
        }
        state
            .fixture
            .devices
            .get(device_id)
            .map(|d| d.record.clone())
            .ok_or_else(|| ApiError::NotFound(device_id.to_string()))
    }

    async fn get_latest_energy_stats(&mut self, device_id: &str) -> ApiResult<EnergyStats> {
        self.authorized()?
            .fixture
            .devices
            .get(device_id)
            .and_then(|d| d.energy.clone())
            .ok_or_else(|| ApiError::NotFound(format!("energy stats for {}", device_id)))
    }

    async fn get_latest_firmware(&mut self) -> ApiResult<FirmwareMap> {
        let state = self.authorized()?;
        if state.firmware_unavailable {
            return Err(ApiError::Transport("firmware service unavailable".to_string()));
        }
        Ok(state.fixture.firmware.clone())
    }

    async fn set_device_temp(&mut self, device_id: &str, temp: f64) -> ApiResult<()> {
        self.command(device_id, format!("set_temp={}", temp), |r| {
            r.data.temp = temp;
            r.data.power = true;
            r.data.mode = Mode::Manual;
            r.data.status = Preset::None;
        })
    }

    async fn set_device_mode(&mut self, device_id: &str, mode: HvacMode) -> ApiResult<()> {
        self.command(device_id, format!("set_mode={}", mode), |r| match mode {
            HvacMode::Off => {
                r.data.power = false;
                r.data.status = Preset::Off;
            }
            HvacMode::Heat => {
                r.data.power = true;
                r.data.mode = Mode::Manual;
                r.data.status = Preset::None;
                r.data.temp = r.data.comfort;
            }
            HvacMode::Auto => {
                r.data.power = true;
                r.data.mode = Mode::Auto;
            }
        })
    }

    async fn set_device_preset(&mut self, device_id: &str, preset: PresetMode) -> ApiResult<()> {
        self.command(device_id, format!("set_preset={}", preset), |r| {
            r.data.power = true;
            r.data.mode = Mode::Manual;
            r.data.status = Preset::from(preset);
            r.data.temp = match preset {
                PresetMode::Comfort => r.data.comfort,
                PresetMode::Eco => r.data.eco,
                PresetMode::Ice => r.data.ice,
            };
        })
    }

    async fn set_preset_temperature(
        &mut self,
        device_id: &str,
        preset: PresetMode,
        temp: f64,
    ) -> ApiResult<()> {
        self.command(device_id, format!("set_{}_temp={}", preset, temp), |r| match preset {
            PresetMode::Comfort => r.data.comfort = temp,
            PresetMode::Eco => r.data.eco = temp,
            PresetMode::Ice => r.data.ice = temp,
        })
    }

    async fn set_screen_options(
        &mut self,
        device_id: &str,
        active_brightness: u8,
        standby_brightness: u8,
    ) -> ApiResult<()> {
        self.command(
            device_id,
            format!("set_screen={}/{}", active_brightness, standby_brightness),
            |r| {
                r.data.active_brightness = active_brightness;
                r.data.standby_brightness = standby_brightness;
            },
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const FIXTURE: &str = r#"{
        "account": { "username": "user@example.com", "password": "hunter2", "local_id": "local-1" },
        "installations": [
            {
                "id": "inst-1",
                "name": "Home",
                "zones": {
                    "z1": {
                        "name": "Ground floor",
                        "devices": { "A": true, "B": true, "gone": false }
                    }
                }
            }
        ],
        "devices": {
            "A": {
                "data": {
                    "name": "Living room", "type": "radiator", "product_version": "v2",
                    "power": true, "mode": "manual", "status": "comfort",
                    "temp": 21.0, "comfort": 21.0, "eco": 17.0, "ice": 7.0, "probe_temp": 19.5,
                    "schedule": [
                        "CCCCCCCCEEEEEEEEEEEEEEEE", "CCCCCCCCEEEEEEEEEEEEEEEE",
                        "CCCCCCCCEEEEEEEEEEEEEEEE", "CCCCCCCCEEEEEEEEEEEEEEEE",
                        "CCCCCCCCEEEEEEEEEEEEEEEE", "OOOOOOOOOOOOOOOOOOOOOOOO",
                        "OOOOOOOOOOOOOOOOOOOOOOOO"
                    ],
                    "active_brightness": 8, "standby_brightness": 2
                },
                "firmware": { "firmware_version_device": "1.0.0" },
                "energy": { "kwh": 12.5, "effective_power": 850.0, "start": "2024-01-01T00:00:00Z" }
            },
            "B": {
                "data": {
                    "name": "Bathroom", "type": "towel", "product_version": "v1",
                    "power": false, "mode": "auto", "status": "off",
                    "temp": 20.0, "comfort": 22.0, "eco": 18.0, "ice": 7.0, "probe_temp": 18.0,
                    "user_mode_supported": true, "user_mode": true,
                    "um_min_temp": 15.0, "um_max_temp": 25.0
                },
                "firmware": { "firmware_version_device": "2.1.0" }
            }
        },
        "firmware": { "radiator_v2": { "1.0.0": "1.2.0" } }
    }"#;

    pub(crate) fn cloud() -> SimulatedCloud {
        SimulatedCloud::from_json(FIXTURE).unwrap()
    }

    pub(crate) async fn logged_in(cloud: &SimulatedCloud) -> SimulatedSession {
        let mut session = cloud.session("user@example.com", "hunter2");
        session.initialize_authentication().await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_authentication() {
        let cloud = cloud();
        let mut bad = cloud.session("user@example.com", "wrong");
        assert!(matches!(
            bad.initialize_authentication().await,
            Err(ApiError::Authentication(_))
        ));
        assert!(!bad.is_logged_in());

        let mut session = logged_in(&cloud).await;
        assert!(session.is_logged_in());
        assert_eq!(session.get_local_id().await.unwrap(), "local-1");
    }

    #[tokio::test]
    async fn test_expired_session_requires_login() {
        let cloud = cloud();
        let mut session = logged_in(&cloud).await;
        cloud.expire_sessions();

        assert!(matches!(
            session.get_installation_by_id("inst-1", "local-1").await,
            Err(ApiError::Authentication(_))
        ));
        session.initialize_authentication().await.unwrap();
        assert!(session.get_installation_by_id("inst-1", "local-1").await.is_ok());
    }

    #[tokio::test]
    async fn test_offline_is_transport_error() {
        let cloud = cloud();
        let mut session = logged_in(&cloud).await;
        cloud.set_offline(true);
        assert!(matches!(
            session.get_device("A").await,
            Err(ApiError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_commands_change_vendor_state() {
        let cloud = cloud();
        let mut session = logged_in(&cloud).await;

        session.set_device_temp("A", 22.5).await.unwrap();
        session.set_screen_options("A", 3, 1).await.unwrap();

        let record = cloud.device_record("A").unwrap();
        assert_eq!(record.data.temp, 22.5);
        assert_eq!(record.data.status, Preset::None);
        assert_eq!(record.data.active_brightness, 3);
        assert_eq!(
            cloud.command_log(),
            vec!["A:set_temp=22.5".to_string(), "A:set_screen=3/1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_rejected_command_leaves_vendor_state() {
        let cloud = cloud();
        let mut session = logged_in(&cloud).await;
        cloud.set_reject_commands(true);

        assert!(matches!(
            session.set_device_preset("A", PresetMode::Eco).await,
            Err(ApiError::Rejected(_))
        ));
        assert_eq!(cloud.device_record("A").unwrap().data.status, Preset::Comfort);
        assert!(cloud.command_log().is_empty());
    }
}
