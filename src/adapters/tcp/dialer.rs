use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::debug;

use crate::domain::{ProxyError, Result};
use crate::ports::{BoxedStream, ConnectorPort};

/// Opens plain TCP connections to `host:port` targets.
///
/// Every resolved address is tried in order until one accepts; the timeout
/// covers resolution and all attempts together.
#[derive(Debug, Clone, Default)]
pub struct TcpDialer;

impl TcpDialer {
    pub fn new() -> Self {
        Self
    }

    pub async fn connect_tcp(&self, target: &str, limit: Duration) -> io::Result<TcpStream> {
        match timeout(limit, Self::dial(target)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connecting to {} timed out after {:?}", target, limit),
            )),
        }
    }

    async fn dial(target: &str) -> io::Result<TcpStream> {
        let mut last_err = None;

        for addr in lookup_host(target).await? {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => {
                    debug!("Failed to connect to {} ({}): {}", target, addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no address found for {}", target))
        }))
    }
}

#[async_trait]
impl ConnectorPort for TcpDialer {
    async fn connect(&self, target: &str, timeout: Duration) -> Result<BoxedStream> {
        let stream = self
            .connect_tcp(target, timeout)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::TimedOut => ProxyError::Timeout,
                _ => ProxyError::ConnectionFailed(format!("{}: {}", target, e)),
            })?;
        Ok(Box::new(stream))
    }
}
