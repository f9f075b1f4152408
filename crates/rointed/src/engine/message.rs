//! Type-safe message system for rointed
//!
//! Messages are split by direction to enforce correct usage at compile time:
//! - `FromIntegrationMessage`: Events from integrations to the engine
//! - `ToIntegrationMessage`: Requests from the engine to integrations

use std::sync::Arc;

use super::entity::Entity;
use super::state::IntegrationState;

/// Messages FROM integrations TO the engine
pub enum FromIntegrationMessage {
    /// A batch of entities built for newly discovered devices
    EntitiesAdded {
        integration_name: String,
        entities: Vec<Arc<dyn Entity>>,
    },

    /// Firmware version reported for a device after a refresh
    DeviceInfoUpdated {
        identifier: (String, String),
        sw_version: Option<String>,
    },

    IntegrationStateChanged {
        integration_name: String,
        state: IntegrationState,
    },
}

impl std::fmt::Debug for FromIntegrationMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FromIntegrationMessage::EntitiesAdded {
                integration_name,
                entities,
            } => f
                .debug_struct("EntitiesAdded")
                .field("integration_name", integration_name)
                .field(
                    "entities",
                    &entities.iter().map(|e| e.entity_id()).collect::<Vec<_>>(),
                )
                .finish(),
            FromIntegrationMessage::DeviceInfoUpdated {
                identifier,
                sw_version,
            } => f
                .debug_struct("DeviceInfoUpdated")
                .field("identifier", identifier)
                .field("sw_version", sw_version)
                .finish(),
            FromIntegrationMessage::IntegrationStateChanged {
                integration_name,
                state,
            } => f
                .debug_struct("IntegrationStateChanged")
                .field("integration_name", integration_name)
                .field("state", state)
                .finish(),
        }
    }
}

/// Messages FROM the engine TO integrations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToIntegrationMessage {
    /// Poll the vendor now instead of waiting for the next tick
    Refresh,
}
