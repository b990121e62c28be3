pub mod config_providers;
pub mod http_handler;

/// Re-export commonly used types from adapters
pub use config_providers::FileConfigProvider;
pub use http_handler::{HttpHandler, router};
