pub mod animation;
pub mod api;
pub mod app;
pub mod config;
pub mod engine;
pub mod headless;
pub mod integrations;

pub use config::Config;
pub use config::ConfigError;
pub use config::LogLevel;
pub use engine::ActuatorController;
pub use engine::SpaceState;
pub use engine::SpaceStateMachine;
pub use engine::SwitchDebouncer;
