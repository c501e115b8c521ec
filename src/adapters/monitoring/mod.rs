//! Health and status endpoint, served on its own port.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ServerBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::domain::{BufferPool, ConnectionInfo, PoolStats};
use crate::ports::TrackingPort;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct ConnectionView {
    id: uuid::Uuid,
    method: String,
    target: String,
    dispatch: &'static str,
    peer: Option<String>,
    age_ms: u128,
}

impl From<&ConnectionInfo> for ConnectionView {
    fn from(info: &ConnectionInfo) -> Self {
        Self {
            id: info.id,
            method: info.method.clone(),
            target: info.target.clone(),
            dispatch: info.dispatch.as_str(),
            peer: info.peer.map(|p| p.to_string()),
            age_ms: info.opened_at.elapsed().as_millis(),
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    version: &'static str,
    active_connections: Vec<ConnectionView>,
    buffer_pool: PoolStats,
}

#[derive(Clone)]
pub struct MonitoringServer {
    tracker: Arc<dyn TrackingPort>,
    pool: BufferPool,
}

impl MonitoringServer {
    pub fn new(tracker: Arc<dyn TrackingPort>, pool: BufferPool) -> Self {
        Self { tracker, pool }
    }

    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let graceful = GracefulShutdown::new();
        let builder = ServerBuilder::new(TokioExecutor::new()).http1_only();

        info!("Monitoring listening on {}", listener.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            let stream = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        warn!("Failed to accept monitoring connection: {}", e);
                        continue;
                    }
                },
                _ = &mut shutdown => break,
            };

            let server = self.clone();
            let service = service_fn(move |req| {
                let server = server.clone();
                async move { Ok::<_, Infallible>(server.route(req).await) }
            });
            let conn = graceful.watch(builder.serve_connection(TokioIo::new(stream), service).into_owned());

            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    debug!("Monitoring connection ended with error: {}", e);
                }
            });
        }

        tokio::select! {
            _ = graceful.shutdown() => {}
            _ = tokio::time::sleep(DRAIN_TIMEOUT) => warn!("Timed out draining monitoring connections"),
        }
        Ok(())
    }

    async fn route(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        if req.method() != Method::GET {
            return text(StatusCode::NOT_FOUND, "");
        }
        match req.uri().path() {
            "/healthz" => text(StatusCode::OK, "ok"),
            "/status" => self.status().await,
            _ => text(StatusCode::NOT_FOUND, ""),
        }
    }

    async fn status(&self) -> Response<Full<Bytes>> {
        let active = match self.tracker.get_active_connections().await {
            Ok(active) => active,
            Err(e) => {
                warn!("Failed to list connections: {}", e);
                Vec::new()
            }
        };
        let report = StatusReport {
            version: crate::VERSION,
            active_connections: active.iter().map(ConnectionView::from).collect(),
            buffer_pool: self.pool.stats(),
        };

        match serde_json::to_vec(&report) {
            Ok(body) => {
                let mut response = Response::new(Full::new(Bytes::from(body)));
                response
                    .headers_mut()
                    .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
                response
            }
            Err(e) => {
                warn!("Failed to encode status: {}", e);
                text(StatusCode::INTERNAL_SERVER_ERROR, "")
            }
        }
    }
}

fn text(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}
