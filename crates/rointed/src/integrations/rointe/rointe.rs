use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use strum::IntoEnumIterator;
use tokio::task::JoinHandle;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::DOMAIN;
use super::RointeConfig;
use super::api::RointeApi;
use super::coordinator::AddEntities;
use super::coordinator::Coordinator;
use super::coordinator::CoordinatorHandle;
use super::device::DeviceSnapshot;
use super::entities::Platform;
use super::entities::RadiatorEntity;
use super::manager::DeviceManager;
use super::manager::UpdateError;
use crate::engine::Entity;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;
use crate::engine::Integration;
use crate::engine::IntegrationState;
use crate::engine::ToIntegrationMessage;

const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(5);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

/// Rointe integration for rointed
///
/// Owns one installation's coordinator. After setup the coordinator runs in a
/// supervisor task that logs back in with backoff whenever the session is lost.
pub struct RointeIntegration<A: RointeApi> {
    refresh_interval: Duration,
    /// Taken by the supervisor task at setup
    coordinator: Option<Coordinator<A>>,
    handle: CoordinatorHandle,
    supervisor: Option<JoinHandle<()>>,
}

impl<A: RointeApi> RointeIntegration<A> {
    pub fn new(api: A, config: &RointeConfig) -> Self {
        let manager = DeviceManager::new(api, &config.installation, &config.local_id);
        let coordinator = Coordinator::new(manager);
        let handle = coordinator.handle();
        Self {
            refresh_interval: config.refresh_interval,
            coordinator: Some(coordinator),
            handle,
            supervisor: None,
        }
    }

    pub fn coordinator(&self) -> &CoordinatorHandle {
        &self.handle
    }
}

fn report(tx: &FromIntegrationSender, state: IntegrationState) {
    let msg = FromIntegrationMessage::IntegrationStateChanged {
        integration_name: DOMAIN.to_string(),
        state,
    };
    if let Err(e) = tx.try_send(msg) {
        warn!("[rointe] Could not report state {}: {}", state, e);
    }
}

/// Log in and run the first refresh
async fn start<A: RointeApi>(coordinator: &mut Coordinator<A>) -> Result<(), UpdateError> {
    coordinator.reauthenticate().await?;
    coordinator.first_refresh().await
}

/// Keep the coordinator running, re-establishing the session when it is lost.
///
/// Discovery tables live in the coordinator and survive every retry.
async fn supervise<A: RointeApi>(
    mut coordinator: Coordinator<A>,
    interval: Duration,
    tx: FromIntegrationSender,
) {
    let mut delay = INITIAL_RETRY_DELAY;
    loop {
        match start(&mut coordinator).await {
            Ok(()) => {
                delay = INITIAL_RETRY_DELAY;
                info!("[rointe] Connected, refreshing every {:?}", interval);
                report(&tx, IntegrationState::Loaded);

                let err = coordinator.run(interval).await;
                warn!("[rointe] Session lost: {}", err);
                report(&tx, IntegrationState::SetupRetry);
            }
            Err(e) => {
                warn!("[rointe] Not ready, retrying in {:?}: {}", delay, e);
                report(&tx, IntegrationState::SetupRetry);
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_RETRY_DELAY);
            }
        }
    }
}

#[async_trait]
impl<A: RointeApi> Integration for RointeIntegration<A> {
    fn name(&self) -> &str {
        DOMAIN
    }

    async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
        let mut coordinator = self.coordinator.take().ok_or_else(|| -> Box<dyn Error + Send> {
            Box::new(std::io::Error::other("rointe integration already set up"))
        })?;

        let info_tx = tx.clone();
        coordinator.set_device_info_listener(Box::new(move |d: &DeviceSnapshot| {
            let msg = FromIntegrationMessage::DeviceInfoUpdated {
                identifier: (DOMAIN.to_string(), d.id.clone()),
                sw_version: d.firmware_version.clone(),
            };
            if let Err(e) = info_tx.try_send(msg) {
                warn!("[rointe] Dropped device info for {}: {}", d.id, e);
            }
        }));

        for platform in Platform::iter() {
            let entities_tx = tx.clone();
            let add_entities: AddEntities = Arc::new(move |batch: Vec<RadiatorEntity>| {
                let entities = batch
                    .into_iter()
                    .map(|e| Arc::new(e) as Arc<dyn Entity>)
                    .collect();
                let msg = FromIntegrationMessage::EntitiesAdded {
                    integration_name: DOMAIN.to_string(),
                    entities,
                };
                if let Err(e) = entities_tx.try_send(msg) {
                    error!("[rointe] Failed to hand {} entities to the engine: {}", platform, e);
                }
            });
            coordinator.register_platform(platform, platform.constructors(), add_entities);
        }

        self.supervisor = Some(tokio::spawn(supervise(
            coordinator,
            self.refresh_interval,
            tx,
        )));
        Ok(())
    }

    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>> {
        match msg {
            ToIntegrationMessage::Refresh => {
                info!("[rointe] Refresh requested");
                self.handle.request_refresh();
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
        if let Some(task) = self.supervisor.take() {
            task.abort();
        }
        info!("[rointe] Stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    use super::*;
    use crate::integrations::rointe::simulator::SimulatedCloud;
    use crate::integrations::rointe::simulator::SimulatedSession;
    use crate::integrations::rointe::simulator::tests::cloud;

    fn config() -> RointeConfig {
        RointeConfig {
            username: "user@example.com".to_string(),
            password: "hunter2".to_string(),
            installation: "inst-1".to_string(),
            local_id: "local-1".to_string(),
            refresh_interval: Duration::from_secs(3600),
            fixture: None,
        }
    }

    fn integration(cloud: &SimulatedCloud, password: &str) -> RointeIntegration<SimulatedSession> {
        RointeIntegration::new(cloud.session("user@example.com", password), &config())
    }

    async fn next_message(
        rx: &mut mpsc::Receiver<FromIntegrationMessage>,
    ) -> FromIntegrationMessage {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    async fn next_state(rx: &mut mpsc::Receiver<FromIntegrationMessage>) -> IntegrationState {
        loop {
            if let FromIntegrationMessage::IntegrationStateChanged { state, .. } =
                next_message(rx).await
            {
                return state;
            }
        }
    }

    #[tokio::test]
    async fn test_setup_reports_entities_and_loaded() {
        let cloud = cloud();
        let mut integration = integration(&cloud, "hunter2");
        let (tx, mut rx) = mpsc::channel(64);
        integration.setup(tx).await.unwrap();

        let mut entity_ids = Vec::new();
        let mut device_infos = 0;
        let state = loop {
            match next_message(&mut rx).await {
                FromIntegrationMessage::EntitiesAdded { entities, .. } => {
                    entity_ids.extend(entities.iter().map(|e| e.entity_id()));
                }
                FromIntegrationMessage::DeviceInfoUpdated { .. } => device_infos += 1,
                FromIntegrationMessage::IntegrationStateChanged { state, .. } => break state,
            }
        };

        assert_eq!(state, IntegrationState::Loaded);
        assert_eq!(device_infos, 2);
        // Two devices, nine entities each
        assert_eq!(entity_ids.len(), 18);
        assert!(entity_ids.contains(&"climate.rointe_b".to_string()));
        assert!(entity_ids.contains(&"update.rointe_a_fw_update_available".to_string()));

        integration.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_credentials_retry() {
        let cloud = cloud();
        let mut integration = integration(&cloud, "wrong");
        let (tx, mut rx) = mpsc::channel(64);
        integration.setup(tx).await.unwrap();

        assert_eq!(next_state(&mut rx).await, IntegrationState::SetupRetry);
        assert!(!integration.coordinator().last_update_success());
        integration.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_delay_doubles_up_to_cap() {
        let cloud = cloud();
        let mut integration = integration(&cloud, "wrong");
        let (tx, mut rx) = mpsc::channel(64);
        integration.setup(tx).await.unwrap();

        let mut attempts = Vec::new();
        while attempts.len() < 9 {
            // No timeout here: the paused clock jumps straight to each retry
            if let Some(FromIntegrationMessage::IntegrationStateChanged { state, .. }) =
                rx.recv().await
            {
                assert_eq!(state, IntegrationState::SetupRetry);
                attempts.push(Instant::now());
            }
        }

        let delays: Vec<u64> = attempts
            .windows(2)
            .map(|w| (w[1] - w[0]).as_secs())
            .collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 80, 160, 300, 300]);
        integration.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_lost_session_recovers_without_new_entities() {
        let cloud = cloud();
        let mut integration = integration(&cloud, "hunter2");
        let (tx, mut rx) = mpsc::channel(64);
        integration.setup(tx).await.unwrap();
        assert_eq!(next_state(&mut rx).await, IntegrationState::Loaded);

        cloud.expire_sessions();
        integration
            .handle_message(ToIntegrationMessage::Refresh)
            .await
            .unwrap();
        assert_eq!(next_state(&mut rx).await, IntegrationState::SetupRetry);

        // Discovery state survives the retry, so nothing is attached twice
        let state = loop {
            match next_message(&mut rx).await {
                FromIntegrationMessage::EntitiesAdded { entities, .. } => {
                    panic!("{} entities added again after recovery", entities.len())
                }
                FromIntegrationMessage::DeviceInfoUpdated { .. } => {}
                FromIntegrationMessage::IntegrationStateChanged { state, .. } => break state,
            }
        };
        assert_eq!(state, IntegrationState::Loaded);
        assert!(integration.coordinator().last_update_success());
        integration.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_setup_twice_fails() {
        let cloud = cloud();
        let mut integration = integration(&cloud, "hunter2");
        let (tx, _rx) = mpsc::channel(64);
        integration.setup(tx.clone()).await.unwrap();
        assert!(integration.setup(tx).await.is_err());
        integration.shutdown().await.unwrap();
    }
}
