use async_trait::async_trait;
use std::net::IpAddr;
use tokio::net::lookup_host;

use crate::domain::{ProxyError, Result};
use crate::ports::HostResolverPort;

/// Resolves hosts through the system resolver.
#[derive(Debug, Clone, Default)]
pub struct TokioHostResolver;

impl TokioHostResolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HostResolverPort for TokioHostResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>> {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let addrs = lookup_host((host, 0))
            .await
            .map_err(|e| ProxyError::ConnectionFailed(format!("lookup of {} failed: {}", host, e)))?;

        let mut ips: Vec<IpAddr> = addrs.map(|addr| addr.ip()).collect();
        ips.dedup();
        Ok(ips)
    }
}
