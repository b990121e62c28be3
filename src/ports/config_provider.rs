use async_trait::async_trait;
use eyre::Result;
use tokio::sync::mpsc;

use crate::config::models::GatewayConfig;

/// Source of gateway configuration that can signal when it changes.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Load and validate the current configuration.
    async fn load_config(&self) -> Result<GatewayConfig>;

    /// Take the change-notification channel. Each message means "reload";
    /// bursts may be coalesced. Only the first call succeeds.
    fn watch(&self) -> Result<mpsc::Receiver<()>>;
}
