pub mod api;
pub mod config;
pub mod engine;
pub mod integrations;

pub use config::Config;
pub use config::Diagnostics;
pub use config::LogLevel;
pub use config::format_diagnostics;
pub use engine::Engine;
pub use engine::EntityCommand;
pub use engine::IntegrationState;
pub use engine::State;
