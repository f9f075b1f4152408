use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use super::device::DeviceRegistry;
use super::entity::Entity;

/// Lifecycle of one integration entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntegrationState {
    SetupInProgress,
    Loaded,
    /// Not ready yet; setup is retried with backoff
    SetupRetry,
    SetupError,
    NotLoaded,
}

/// An entity together with the integration that owns it
#[derive(Clone)]
pub struct EntityEntry {
    pub integration: String,
    pub entity: Arc<dyn Entity>,
}

/// Centralized snapshot of the entire engine state.
///
/// Replaced wholesale on every change so readers never see a half-applied update.
#[derive(Clone, Default)]
pub struct State {
    pub entities: BTreeMap<String, EntityEntry>,
    pub devices: DeviceRegistry,
    pub integrations: BTreeMap<String, IntegrationState>,
}

impl State {
    pub fn entity(&self, entity_id: &str) -> Option<&Arc<dyn Entity>> {
        self.entities.get(entity_id).map(|e| &e.entity)
    }
}
