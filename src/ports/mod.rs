//! Ports: traits the core depends on, implemented by adapters.
pub mod config_provider;

pub use config_provider::ConfigProvider;
