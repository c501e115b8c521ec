use std::time::Duration;

use super::BoxedStream;
use crate::domain::Result;
use async_trait::async_trait;

/// Port for opening raw connections to upstream targets
#[async_trait]
pub trait ConnectorPort: Send + Sync {
    /// Connect to `target` (`host:port`), giving up after `timeout`
    async fn connect(&self, target: &str, timeout: Duration) -> Result<BoxedStream>;
}
