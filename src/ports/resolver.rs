use crate::domain::Result;
use async_trait::async_trait;
use std::net::IpAddr;

/// Port for looking up target hosts. Only used for diagnostics.
#[async_trait]
pub trait HostResolverPort: Send + Sync {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>>;
}
