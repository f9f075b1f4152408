pub mod api;
mod config;
pub mod coordinator;
pub mod device;
pub mod entities;
mod firmware;
pub mod manager;
#[allow(clippy::module_inception)]
mod rointe;
pub mod setup_flow;
pub mod simulator;

use anyhow::Context;
pub use config::Config as RointeConfig;
pub use config::PartialConfig as PartialRointeConfig;
use linkme::distributed_slice;
pub use rointe::RointeIntegration;
use simulator::SimulatedCloud;

use crate::engine;

pub const DOMAIN: &str = "rointe";
pub const MANUFACTURER: &str = "Rointe";

/// Target temperature used when a device leaves manual mode with nothing better to show
pub const DEFAULT_TEMPERATURE: f64 = 20.0;

pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 60;
pub const MIN_REFRESH_INTERVAL_SECS: u64 = 10;

/// Fixture the simulated cloud starts from when none is configured
pub const BUNDLED_FIXTURE: &str = include_str!("../../../fixtures/installation.json");

/// Simulated cloud for a config entry: its fixture file, or the bundled one
pub fn simulated_cloud(config: &RointeConfig) -> anyhow::Result<SimulatedCloud> {
    match &config.fixture {
        Some(path) => SimulatedCloud::from_fixture_file(path)
            .with_context(|| format!("Failed to load Rointe fixture {}", path.display())),
        None => SimulatedCloud::from_json(BUNDLED_FIXTURE)
            .context("Bundled Rointe fixture is invalid"),
    }
}

#[distributed_slice(engine::INTEGRATION_REGISTRY)]
fn init_rointe(ctx: &engine::IntegrationContext) -> engine::IntegrationFactoryResult {
    let rointe_config = if let Some(c) = &ctx.config.integrations.rointe {
        c
    } else {
        return Ok(None);
    };

    let cloud = simulated_cloud(rointe_config)?;
    let session = cloud.session(&rointe_config.username, &rointe_config.password);
    Ok(Some(Box::new(RointeIntegration::new(session, rointe_config))))
}

#[cfg(test)]
mod tests {
    use super::api::RointeApi;
    use super::*;

    #[tokio::test]
    async fn test_bundled_fixture_loads() {
        let cloud = SimulatedCloud::from_json(BUNDLED_FIXTURE).unwrap();
        let step = setup_flow::SetupFlow::new(
            cloud.session("demo@example.com", "demo"),
            "demo@example.com",
            "demo",
        )
        .login()
            .await
            .unwrap();
        assert_eq!(step.installations.len(), 2);

        let mut session = cloud.session("demo@example.com", "demo");
        session.initialize_authentication().await.unwrap();
        let mut manager = manager::DeviceManager::new(session, "-Nx3kQ7home", &step.local_id);
        let devices = manager.update().await.unwrap();

        // The unflagged hall radiator and the unsupported socket are left out
        let ids: Vec<_> = devices.keys().map(String::as_str).collect();
        assert_eq!(
            ids,
            vec!["-Nx3kRadKitchen", "-Nx3kRadLiving", "-Nx3kThermBed", "-Nx3kTowelBath"]
        );
    }
}
