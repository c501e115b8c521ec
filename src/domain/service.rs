use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info_span, warn, Instrument};

use super::relay::{self, RelayStats};
use super::{
    BufferPool, ConnectRequest, ConnectionInfo, Deadline, DeadlinePolicy, Dispatch, ProxyError, ProxyRequest,
    ProxyResponse, Result,
};
use crate::ports::{BoxedStream, ConnectorPort, HostResolverPort, HttpClientPort, TrackingPort, TunnelStream};

/// An upstream connection that was dialed for a CONNECT request and is
/// waiting for the client side of the tunnel.
pub struct TunnelSession {
    pub target: String,
    pub deadline: Deadline,
    upstream: BoxedStream,
}

#[derive(Clone)]
pub struct ProxyService {
    connector: Arc<dyn ConnectorPort>,
    http_client: Arc<dyn HttpClientPort>,
    resolver: Arc<dyn HostResolverPort>,
    tracker: Arc<dyn TrackingPort>,
    pool: BufferPool,
    deadlines: DeadlinePolicy,
}

impl ProxyService {
    pub fn new(
        connector: Arc<dyn ConnectorPort>,
        http_client: Arc<dyn HttpClientPort>,
        resolver: Arc<dyn HostResolverPort>,
        tracker: Arc<dyn TrackingPort>,
        pool: BufferPool,
        deadlines: DeadlinePolicy,
    ) -> Self {
        Self {
            connector,
            http_client,
            resolver,
            tracker,
            pool,
            deadlines,
        }
    }

    pub fn deadlines(&self) -> &DeadlinePolicy {
        &self.deadlines
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Looks the target host up in the background and logs the result.
    ///
    /// Never blocks the caller and never influences routing.
    pub fn inspect_target(&self, host: Option<String>) {
        if !tracing::enabled!(tracing::Level::DEBUG) {
            return;
        }
        let Some(host) = host else {
            return;
        };

        let resolver = self.resolver.clone();
        tokio::spawn(
            async move {
                match resolver.lookup(&host).await {
                    Ok(addrs) => debug!(%host, ?addrs, "resolved target"),
                    Err(e) => debug!(%host, error = %e, "target lookup failed"),
                }
            }
            .in_current_span(),
        );
    }

    pub async fn forward(
        &self,
        request: &ProxyRequest,
        deadline: Deadline,
        peer: Option<SocketAddr>,
    ) -> Result<ProxyResponse> {
        let info = ConnectionInfo::new(
            request.method.as_str().to_string(),
            request.target.clone(),
            Dispatch::Forward,
        )
        .with_peer(peer);
        let id = info.id;
        let span = info_span!("forward", %id, method = request.method.as_str(), target = %request.target);

        async {
            self.track(info).await;

            let result = match deadline.run(self.http_client.execute(request, deadline)).await {
                Ok(result) => result,
                Err(elapsed) => Err(elapsed.into()),
            };

            match &result {
                Ok(response) => debug!(status = response.status.as_u16(), bytes = response.body.len(), "relayed"),
                Err(e) => warn!("could not forward request: {}", e),
            }

            self.untrack(id).await;
            result
        }
        .instrument(span)
        .await
    }

    /// Dials the CONNECT target. Nothing has been sent to the client yet when
    /// this fails, so the caller can still answer with an error status.
    pub async fn open_tunnel(&self, request: &ConnectRequest, deadline: Deadline) -> Result<TunnelSession> {
        let timeout = deadline.cap(self.deadlines.connect_timeout());

        match self.connector.connect(&request.authority, timeout).await {
            Ok(upstream) => Ok(TunnelSession {
                target: request.authority.clone(),
                deadline,
                upstream,
            }),
            Err(e) => {
                warn!("could not open tunnel to {}: {}", request.authority, e);
                Err(ProxyError::TunnelFailed(format!("{}: {}", request.authority, e)))
            }
        }
    }

    /// Relays between the hijacked client connection and the dialed upstream
    /// until both directions finish. Both connections are closed on return.
    pub async fn run_tunnel<C>(&self, session: TunnelSession, client: C, peer: Option<SocketAddr>) -> RelayStats
    where
        C: TunnelStream + 'static,
    {
        let info = ConnectionInfo::new("CONNECT".to_string(), session.target.clone(), Dispatch::Tunnel).with_peer(peer);
        let id = info.id;
        let span = info_span!("tunnel", %id, target = %session.target);

        async {
            self.track(info).await;

            let stats = relay::relay(client, session.upstream, &self.pool, session.deadline).await;

            match (&stats.client_to_upstream, &stats.upstream_to_client) {
                (Ok(sent), Ok(received)) => debug!(sent, received, "tunnel closed"),
                (Err(e), _) | (_, Err(e)) => warn!("tunnel terminated: {}", e),
            }

            self.untrack(id).await;
            stats
        }
        .instrument(span)
        .await
    }

    async fn track(&self, info: ConnectionInfo) {
        if let Err(e) = self.tracker.track_connection(info).await {
            debug!("could not track connection: {}", e);
        }
    }

    async fn untrack(&self, id: uuid::Uuid) {
        if let Err(e) = self.tracker.close_connection(id).await {
            debug!("could not close tracked connection: {}", e);
        }
    }
}
