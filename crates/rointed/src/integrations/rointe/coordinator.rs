use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use strum::IntoEnumIterator;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::api::RointeApi;
use super::device::DeviceMap;
use super::device::DeviceSnapshot;
use super::entities::Platform;
use super::entities::RadiatorEntity;
use super::manager::Command;
use super::manager::Consistency;
use super::manager::DeviceManager;
use super::manager::UpdateError;

/// Builds one entity for a device id
pub type EntityConstructor = fn(&str, &CoordinatorHandle) -> RadiatorEntity;

/// Host callback receiving newly built entities in one batch
pub type AddEntities = Arc<dyn Fn(Vec<RadiatorEntity>) + Send + Sync>;

/// Called for every device after each successful refresh
pub type DeviceInfoListener = Box<dyn Fn(&DeviceSnapshot) + Send + Sync>;

const REQUEST_CHANNEL_SIZE: usize = 32;
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// What the coordinator publishes after every refresh or local patch
#[derive(Debug, Clone, Default)]
pub struct Published {
    pub devices: Arc<DeviceMap>,
    pub last_update_success: bool,
}

enum Request {
    Refresh,
    Command {
        device_id: String,
        command: Command,
        reply: oneshot::Sender<bool>,
    },
}

struct PlatformListener {
    constructors: Vec<EntityConstructor>,
    add_entities: AddEntities,
}

enum Wake {
    Tick,
    Request(Request),
}

/// Periodic refresh and device discovery for one installation.
///
/// All mutable state lives here and is touched only by the task running
/// [`Coordinator::run`]. Entities talk to it through a [`CoordinatorHandle`].
pub struct Coordinator<A: RointeApi> {
    manager: DeviceManager<A>,
    data: Arc<DeviceMap>,
    last_update_success: bool,

    /// Devices seen but not yet turned into entities, per platform
    unregistered: HashMap<Platform, DeviceMap>,
    /// Devices that already have entities, per platform
    attached: HashMap<Platform, HashSet<String>>,
    listeners: HashMap<Platform, PlatformListener>,
    device_info_listener: Option<DeviceInfoListener>,

    published: watch::Sender<Published>,
    requests_tx: mpsc::Sender<Request>,
    requests_rx: mpsc::Receiver<Request>,
}

impl<A: RointeApi> Coordinator<A> {
    pub fn new(manager: DeviceManager<A>) -> Self {
        let (published, _) = watch::channel(Published::default());
        let (requests_tx, requests_rx) = mpsc::channel(REQUEST_CHANNEL_SIZE);
        Self {
            manager,
            data: Arc::default(),
            last_update_success: false,
            unregistered: Platform::iter().map(|p| (p, DeviceMap::new())).collect(),
            attached: Platform::iter().map(|p| (p, HashSet::new())).collect(),
            listeners: HashMap::new(),
            device_info_listener: None,
            published,
            requests_tx,
            requests_rx,
        }
    }

    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle {
            published: self.published.subscribe(),
            requests: self.requests_tx.clone(),
        }
    }

    pub fn set_device_info_listener(&mut self, listener: DeviceInfoListener) {
        self.device_info_listener = Some(listener);
    }

    pub fn data(&self) -> Arc<DeviceMap> {
        self.data.clone()
    }

    pub fn last_update_success(&self) -> bool {
        self.last_update_success
    }

    /// Ids waiting to be attached on a platform
    pub fn unregistered(&self, platform: Platform) -> Vec<String> {
        self.unregistered
            .get(&platform)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_attached(&self, platform: Platform, device_id: &str) -> bool {
        self.attached
            .get(&platform)
            .is_some_and(|a| a.contains(device_id))
    }

    /// Log back in after the session was lost
    pub async fn reauthenticate(&mut self) -> Result<(), UpdateError> {
        self.manager.authenticate().await
    }

    /// Setup-time refresh. Unlike the periodic path the caller acts on the error.
    pub async fn first_refresh(&mut self) -> Result<(), UpdateError> {
        self.refresh().await
    }

    /// Poll the installation and record newly discovered devices.
    ///
    /// A failure marks the data stale and leaves devices and tables as they
    /// were. The error is returned for the supervisor; the periodic loop only
    /// stops on authentication failures.
    pub async fn refresh(&mut self) -> Result<(), UpdateError> {
        let devices = match self.manager.update().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!("[rointe] Refresh failed: {}", e);
                self.last_update_success = false;
                self.publish();
                return Err(e);
            }
        };

        self.data = devices;
        self.last_update_success = true;

        for platform in Platform::iter() {
            let attached = self.attached.entry(platform).or_default();
            let table = self.unregistered.entry(platform).or_default();
            for (id, device) in self.data.iter() {
                if !attached.contains(id) && !table.contains_key(id) {
                    table.insert(id.clone(), device.clone());
                }
            }
        }

        self.publish();

        if let Some(listener) = &self.device_info_listener {
            for device in self.data.values() {
                listener(device);
            }
        }

        let listeners: Vec<_> = self
            .listeners
            .iter()
            .map(|(p, l)| (*p, l.constructors.clone(), l.add_entities.clone()))
            .collect();
        for (platform, constructors, add_entities) in listeners {
            self.attach_discovered(platform, &constructors, &*add_entities);
        }

        Ok(())
    }

    /// Build entities for every pending device on `platform`.
    ///
    /// Each attached id leaves the table in the same call, so repeating this
    /// without a refresh in between attaches nothing. Returns how many devices
    /// were attached.
    pub fn attach_discovered(
        &mut self,
        platform: Platform,
        constructors: &[EntityConstructor],
        add_entities: &(dyn Fn(Vec<RadiatorEntity>) + Send + Sync),
    ) -> usize {
        let handle = self.handle();
        let Some(table) = self.unregistered.get_mut(&platform) else {
            return 0;
        };

        let ready: Vec<String> = table
            .keys()
            .filter(|id| self.data.contains_key(*id))
            .cloned()
            .collect();
        if ready.is_empty() {
            return 0;
        }

        let attached = self.attached.entry(platform).or_default();
        let mut entities = Vec::with_capacity(ready.len() * constructors.len());
        for id in &ready {
            entities.extend(constructors.iter().map(|c| c(id.as_str(), &handle)));
            table.remove(id);
            attached.insert(id.clone());
        }

        info!(
            "[rointe] Attaching {} device(s) on {}: {}",
            ready.len(),
            platform,
            ready.join(", ")
        );
        if !entities.is_empty() {
            add_entities(entities);
        }
        ready.len()
    }

    /// Attach pending devices now and after every later successful refresh
    pub fn register_platform(
        &mut self,
        platform: Platform,
        constructors: Vec<EntityConstructor>,
        add_entities: AddEntities,
    ) {
        self.attach_discovered(platform, &constructors, &*add_entities);
        self.listeners.insert(
            platform,
            PlatformListener {
                constructors,
                add_entities,
            },
        );
    }

    fn publish(&self) {
        self.published.send_replace(Published {
            devices: self.data.clone(),
            last_update_success: self.last_update_success,
        });
    }

    async fn execute(&mut self, device_id: &str, command: &Command) -> bool {
        let ok = self.manager.send_command(device_id, command).await;
        if ok || command.consistency() == Consistency::Optimistic {
            self.data = self.manager.devices();
            self.publish();
        }
        ok
    }

    /// Serve refresh and command requests and refresh every `interval`.
    ///
    /// The timer restarts after every refresh. Returns only when the session
    /// is lost; the caller owns recovery.
    pub async fn run(&mut self, interval: Duration) -> UpdateError {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let wake = tokio::select! {
                _ = ticker.tick() => Wake::Tick,
                Some(request) = self.requests_rx.recv() => Wake::Request(request),
            };

            match wake {
                Wake::Tick | Wake::Request(Request::Refresh) => {
                    debug!("[rointe] Refreshing");
                    if let Err(UpdateError::Authentication(m)) = self.refresh().await {
                        return UpdateError::Authentication(m);
                    }
                    ticker.reset();
                }
                Wake::Request(Request::Command {
                    device_id,
                    command,
                    reply,
                }) => {
                    // A caller that gave up was already told the command failed
                    if reply.is_closed() {
                        warn!("[rointe] Dropping stale [{}] for {}", command, device_id);
                        continue;
                    }
                    let ok = self.execute(&device_id, &command).await;
                    let _ = reply.send(ok);
                }
            }
        }
    }
}

/// Cheap, cloneable access to a running coordinator
#[derive(Clone)]
pub struct CoordinatorHandle {
    published: watch::Receiver<Published>,
    requests: mpsc::Sender<Request>,
}

impl CoordinatorHandle {
    pub fn data(&self) -> Arc<DeviceMap> {
        self.published.borrow().devices.clone()
    }

    pub fn last_update_success(&self) -> bool {
        self.published.borrow().last_update_success
    }

    /// Read one device without cloning the snapshot
    pub fn with_device<R>(
        &self,
        device_id: &str,
        f: impl FnOnce(&DeviceSnapshot) -> R,
    ) -> Option<R> {
        self.published.borrow().devices.get(device_id).map(f)
    }

    pub fn subscribe(&self) -> watch::Receiver<Published> {
        self.published.clone()
    }

    /// Run a command on the coordinator task.
    ///
    /// False if it failed, the coordinator is gone, or it did not answer in
    /// time (for instance while the session is being re-established).
    pub async fn send_command(&self, device_id: &str, command: Command) -> bool {
        let (reply, rx) = oneshot::channel();
        let request = Request::Command {
            device_id: device_id.to_string(),
            command,
            reply,
        };
        let exchange = async {
            if self.requests.send(request).await.is_err() {
                return false;
            }
            rx.await.unwrap_or(false)
        };
        match tokio::time::timeout(COMMAND_TIMEOUT, exchange).await {
            Ok(ok) => ok,
            Err(_) => {
                warn!("[rointe] No answer to [{}] for {}", command, device_id);
                false
            }
        }
    }

    /// Ask for an out-of-band refresh
    pub fn request_refresh(&self) {
        if let Err(e) = self.requests.try_send(Request::Refresh) {
            debug!("[rointe] Refresh request dropped: {}", e);
        }
    }
}
