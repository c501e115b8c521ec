#![cfg(test)]
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use courier::adapters::hyper_server::bind_listener;
use courier::adapters::{MonitoringServer, ProxyServer};
use courier::config::{ProxyConfig, Settings};
use courier::ports::TrackingPort;

/// Settings for a proxy bound to loopback with short timeouts.
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.proxy.server = "127.0.0.1".to_string();
    settings.proxy.timeouts.read = "5s".to_string();
    settings.proxy.timeouts.write = "5s".to_string();
    settings.proxy.timeouts.connect = "2s".to_string();
    settings
}

/// A proxy and its monitoring endpoint running on ephemeral loopback ports.
pub struct TestProxyServer {
    addr: SocketAddr,
    monitoring_addr: SocketAddr,
    config: Arc<ProxyConfig>,
    shutdown: CancellationToken,
    _proxy_handle: JoinHandle<()>,
    _monitoring_handle: JoinHandle<()>,
}

impl TestProxyServer {
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        Self::start_with(|_| {}).await
    }

    pub async fn start_with<F>(customize: F) -> Result<Self, Box<dyn std::error::Error>>
    where
        F: FnOnce(&mut Settings),
    {
        let mut settings = test_settings();
        customize(&mut settings);
        let config = Arc::new(ProxyConfig::from_settings(settings)?);

        let listener = bind_listener("127.0.0.1:0".parse()?)?;
        let addr = listener.local_addr()?;
        let monitoring_listener = bind_listener("127.0.0.1:0".parse()?)?;
        let monitoring_addr = monitoring_listener.local_addr()?;

        let shutdown = CancellationToken::new();
        let proxy = ProxyServer::new(config.clone());
        let tracker: Arc<dyn TrackingPort> = proxy.tracker();
        let monitoring = MonitoringServer::new(tracker, proxy.buffer_pool());

        let proxy_shutdown = shutdown.clone();
        let proxy_handle = tokio::spawn(async move {
            let _ = proxy.serve(listener, proxy_shutdown.cancelled_owned()).await;
        });
        let monitoring_shutdown = shutdown.clone();
        let monitoring_handle = tokio::spawn(async move {
            let _ = monitoring
                .serve(monitoring_listener, monitoring_shutdown.cancelled_owned())
                .await;
        });

        Ok(Self {
            addr,
            monitoring_addr,
            config,
            shutdown,
            _proxy_handle: proxy_handle,
            _monitoring_handle: monitoring_handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn monitoring_addr(&self) -> SocketAddr {
        self.monitoring_addr
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn proxy_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// A reqwest client sending every request through this proxy.
    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .proxy(reqwest::Proxy::all(self.proxy_url()).expect("valid proxy url"))
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build client")
    }
}

impl Drop for TestProxyServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Reads an HTTP response head (through the blank line) from `stream`.
/// Returns the head and any bytes read past it.
pub async fn read_response_head(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let mut data = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .expect("Should receive response within timeout")
            .expect("Should be able to read response");
        assert!(n > 0, "Connection closed before response head");
        data.extend_from_slice(&buf[..n]);

        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            let rest = data.split_off(pos + 4);
            return (String::from_utf8_lossy(&data).into_owned(), rest);
        }
    }
}
