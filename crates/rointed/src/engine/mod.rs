mod device;
mod engine;
mod entity;
mod integration;
mod message;
pub mod state;

pub use device::Device;
pub use device::DeviceInfo;
pub use device::DeviceRegistry;
pub use engine::Engine;
pub use engine::EngineError;
pub use entity::CommandError;
pub use entity::Entity;
pub use entity::EntityCommand;
pub use integration::FromIntegrationSender;
pub use integration::Integration;
pub use integration::IntegrationContext;
pub use integration::IntegrationFactoryResult;
pub use integration::REGISTRY as INTEGRATION_REGISTRY;
pub use message::FromIntegrationMessage;
pub use message::ToIntegrationMessage;
pub use state::IntegrationState;
pub use state::State;
