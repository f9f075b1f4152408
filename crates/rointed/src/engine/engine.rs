use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::entity::CommandError;
use super::entity::EntityCommand;
use super::integration::FromIntegrationReceiver;
use super::integration::FromIntegrationSender;
use super::integration::Integration;
use super::integration::ToIntegrationSender;
use super::message::FromIntegrationMessage;
use super::message::ToIntegrationMessage;
use super::state::EntityEntry;
use super::state::IntegrationState;
use super::state::State;
use crate::engine::IntegrationContext;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    #[error("unknown integration: {0}")]
    UnknownIntegration(String),

    #[error("integration {0} is no longer running")]
    IntegrationStopped(String),

    #[error(transparent)]
    Command(#[from] CommandError),
}

/// rointed engine
///
/// Receives entities, device updates and state changes from integrations and
/// keeps a view of the world in [`State`]. User commands go straight to the
/// entity that owns them; refresh requests go to the owning integration.
pub struct Engine {
    /// Centralized state snapshot (readers load the Arc, writer stores a new one)
    state: ArcSwap<State>,

    /// Communication channels to integrations
    integration_channels: std::sync::Mutex<HashMap<String, ToIntegrationSender>>,

    /// Receive messages from integrations
    message_rx: Mutex<FromIntegrationReceiver>,

    /// Sender for integrations to report events back to the engine
    message_tx: FromIntegrationSender,

    /// Handles for integration tasks
    integration_handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

/// Capacity for the integration→engine message channel
/// Provides backpressure when integrations send faster than the engine can process
const FROM_INTEGRATION_CHANNEL_SIZE: usize = 1024;

impl Engine {
    pub fn new() -> Self {
        let (message_tx, message_rx) = mpsc::channel(FROM_INTEGRATION_CHANNEL_SIZE);
        Self {
            state: ArcSwap::new(Arc::default()),
            integration_channels: std::sync::Mutex::new(HashMap::new()),
            message_rx: Mutex::new(message_rx),
            message_tx,
            integration_handles: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Register every integration enabled in the configuration
    pub fn register_integrations_from_config(&self, cfg: &crate::config::Config) {
        let ctx = IntegrationContext { config: cfg };
        for constr in super::integration::REGISTRY {
            let integration = match constr(&ctx) {
                Ok(Some(i)) => i,
                Err(e) => {
                    error!("failed to setup integration: {:#}", e);
                    continue;
                }
                Ok(None) => continue,
            };
            let name = integration.name().to_string();
            self.register_integration(name, integration);
        }
    }

    /// Register an integration with the engine
    ///
    /// This spawns the integration in a background task, wires up channels,
    /// and starts its setup process.
    pub fn register_integration(&self, name: String, mut integration: Box<dyn Integration>) {
        let (to_integration_tx, mut to_integration_rx) = mpsc::unbounded_channel();
        let from_integration_tx = self.message_tx.clone();

        if let Ok(mut channels) = self.integration_channels.lock() {
            channels.insert(name.clone(), to_integration_tx);
        }
        self.update_state(|state| {
            state
                .integrations
                .insert(name.clone(), IntegrationState::SetupInProgress);
        });

        let handle = tokio::spawn(async move {
            if let Err(e) = integration.setup(from_integration_tx.clone()).await {
                warn!("Integration '{}' setup failed: {}", name, e);
                let _ = from_integration_tx
                    .send(FromIntegrationMessage::IntegrationStateChanged {
                        integration_name: name,
                        state: IntegrationState::SetupError,
                    })
                    .await;
                return;
            }

            while let Some(msg) = to_integration_rx.recv().await {
                if let Err(e) = integration.handle_message(msg).await {
                    warn!("Integration '{}' failed to handle message: {}", name, e);
                }
            }

            if let Err(e) = integration.shutdown().await {
                warn!("Integration '{}' shutdown failed: {}", name, e);
            }
        });

        if let Ok(mut handles) = self.integration_handles.lock() {
            handles.push(handle);
        }
    }

    /// Get a snapshot of the current engine state.
    ///
    /// Clones the `Arc` (atomic refcount bump), essentially free.
    pub fn state_snapshot(&self) -> Arc<State> {
        self.state.load_full()
    }

    /// Send a user command to an entity and wait for the outcome
    pub async fn send_entity_command(
        &self,
        entity_id: &str,
        command: EntityCommand,
    ) -> Result<(), EngineError> {
        let entity = self
            .state
            .load()
            .entity(entity_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownEntity(entity_id.to_string()))?;

        debug!("Command for {}: {:?}", entity_id, command);
        entity.handle_command(command).await?;
        Ok(())
    }

    /// Ask an integration to poll its devices now
    pub fn request_integration_refresh(&self, name: &str) -> Result<(), EngineError> {
        self.send_to_integration(name, ToIntegrationMessage::Refresh)
    }

    fn send_to_integration(
        &self,
        name: &str,
        msg: ToIntegrationMessage,
    ) -> Result<(), EngineError> {
        let channels = self
            .integration_channels
            .lock()
            .map_err(|_| EngineError::IntegrationStopped(name.to_string()))?;
        let tx = channels
            .get(name)
            .ok_or_else(|| EngineError::UnknownIntegration(name.to_string()))?;
        tx.send(msg)
            .map_err(|_| EngineError::IntegrationStopped(name.to_string()))
    }

    /// Stop every integration and wait for their tasks to finish
    pub async fn shutdown(&self) {
        // Closing the channels ends each integration's message loop
        if let Ok(mut channels) = self.integration_channels.lock() {
            channels.clear();
        }

        let handles: Vec<_> = match self.integration_handles.lock() {
            Ok(mut handles) => handles.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Integration task ended abnormally: {}", e);
            }
        }
        info!("All integrations stopped");
    }

    /// Run the engine's main event loop
    ///
    /// Processes incoming messages from integrations and updates state.
    pub async fn run(&self) -> Result<(), Box<dyn Error + Send>> {
        info!("Engine starting");

        let mut rx = self.message_rx.lock().await;
        while let Some(msg) = rx.recv().await {
            self.handle_message(msg);
        }

        info!("Engine shutting down");
        Ok(())
    }

    fn update_state(&self, f: impl FnOnce(&mut State)) {
        let mut state = State::clone(&self.state.load());
        f(&mut state);
        self.state.store(Arc::new(state));
    }

    /// Apply one message from an integration
    fn handle_message(&self, msg: FromIntegrationMessage) {
        match msg {
            FromIntegrationMessage::EntitiesAdded {
                integration_name,
                entities,
            } => {
                self.update_state(|state| {
                    for entity in entities {
                        let entity_id = entity.entity_id();
                        if state.entities.contains_key(&entity_id) {
                            warn!(
                                "Entity {} from {} already exists, ignoring",
                                entity_id, integration_name
                            );
                            continue;
                        }

                        info!("Entity added: {} (from {})", entity_id, integration_name);
                        if let Some(info) = entity.device_info() {
                            state.devices.register_entity(info, &entity_id);
                        }
                        state.entities.insert(
                            entity_id,
                            EntityEntry {
                                integration: integration_name.clone(),
                                entity,
                            },
                        );
                    }
                });
            }
            FromIntegrationMessage::DeviceInfoUpdated {
                identifier,
                sw_version,
            } => {
                let known = self
                    .state
                    .load()
                    .devices
                    .get(&identifier)
                    .map(|d| d.sw_version != sw_version);
                match known {
                    Some(true) => self.update_state(|state| {
                        state.devices.update_sw_version(&identifier, sw_version);
                    }),
                    Some(false) => {}
                    None => debug!(
                        "Ignoring device info for unregistered device {}:{}",
                        identifier.0, identifier.1
                    ),
                }
            }
            FromIntegrationMessage::IntegrationStateChanged {
                integration_name,
                state: new_state,
            } => {
                info!("Integration '{}' is now {}", integration_name, new_state);
                self.update_state(|state| {
                    state.integrations.insert(integration_name, new_state);
                });
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
