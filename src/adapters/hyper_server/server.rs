use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ServerBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket};
use tracing::{debug, info, warn};

use super::{ClientLimiter, HyperConnector, HyperHttpClient, HyperProxyAdapter};
use crate::adapters::tcp::{TcpDialer, TokioHostResolver};
use crate::adapters::tracking::ConnectionTracker;
use crate::config::ProxyConfig;
use crate::domain::{BufferPool, DeadlinePolicy, ProxyService};
use crate::ports::TrackingPort;

/// Smallest read buffer hyper accepts for an HTTP/1 connection.
const MIN_CONN_BUF_SIZE: usize = 8192;
const LISTEN_BACKLOG: u32 = 1024;

/// The proxy listener: accepts client connections and serves each one
/// through [`HyperProxyAdapter`].
pub struct ProxyServer {
    config: Arc<ProxyConfig>,
    adapter: Arc<HyperProxyAdapter>,
    tracker: Arc<ConnectionTracker>,
    pool: BufferPool,
}

impl ProxyServer {
    pub fn new(config: Arc<ProxyConfig>) -> Self {
        let dialer = TcpDialer::new();
        let connector = HyperConnector::new(dialer.clone(), config.connect_timeout);
        let http_client = Arc::new(HyperHttpClient::new(connector, config.read_timeout));
        let tracker = Arc::new(ConnectionTracker::new());
        let tracker_port: Arc<dyn TrackingPort> = tracker.clone();
        let pool = BufferPool::new(config.read_buffer_size);

        let service = Arc::new(ProxyService::new(
            Arc::new(dialer),
            http_client,
            Arc::new(TokioHostResolver::new()),
            tracker_port,
            pool.clone(),
            DeadlinePolicy::from_config(&config),
        ));
        let adapter = Arc::new(HyperProxyAdapter::new(service, config.max_body_size, config.read_timeout));

        Self {
            config,
            adapter,
            tracker,
            pool,
        }
    }

    pub fn tracker(&self) -> Arc<ConnectionTracker> {
        self.tracker.clone()
    }

    pub fn buffer_pool(&self) -> BufferPool {
        self.pool.clone()
    }

    pub fn bind(&self) -> io::Result<TcpListener> {
        bind_listener(self.config.listen_addr)
    }

    /// Serves connections from `listener` until `shutdown` resolves, then
    /// waits up to the read timeout for in-flight connections to finish.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let config = &self.config;
        let limiter = ClientLimiter::new(config.max_conns_per_ip);
        let graceful = GracefulShutdown::new();
        let cleanup = self.tracker.start_cleanup();

        let mut builder = ServerBuilder::new(TokioExecutor::new()).http1_only();
        builder
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(config.read_timeout)
            .max_buf_size(
                config
                    .read_buffer_size
                    .max(config.write_buffer_size)
                    .max(MIN_CONN_BUF_SIZE),
            );

        info!("Proxy listening on {}", listener.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        continue;
                    }
                },
                _ = &mut shutdown => break,
            };

            let Some(permit) = limiter.try_acquire(peer.ip()) else {
                debug!("Dropping connection from {}: too many connections", peer);
                continue;
            };

            let adapter = self.adapter.clone();
            let service = service_fn(move |req| {
                let adapter = adapter.clone();
                async move { Ok::<_, Infallible>(adapter.handle(req, Some(peer)).await) }
            });

            let conn = builder
                .serve_connection_with_upgrades(TokioIo::new(stream), service)
                .into_owned();
            let conn = graceful.watch(conn);

            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = conn.await {
                    debug!("Connection from {} ended with error: {}", peer, e);
                }
            });
        }

        drop(listener);
        info!("Shutting down, draining connections");
        tokio::select! {
            _ = graceful.shutdown() => debug!("All connections closed"),
            _ = tokio::time::sleep(config.read_timeout) => warn!("Timed out waiting for connections to close"),
        }
        cleanup.abort();

        Ok(())
    }
}

/// Binds a listening socket with address (and, on unix, port) reuse.
pub fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    #[cfg(unix)]
    socket.set_reuseport(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}
