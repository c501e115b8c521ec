use futures::future::BoxFuture;
use hyper::Uri;
use hyper_util::rt::TokioIo;
use std::io;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::net::TcpStream;
use tower_service::Service;

use crate::adapters::tcp::TcpDialer;

/// Connector for the hyper client used by the forward path.
///
/// Dials origins directly through [`TcpDialer`] with the configured connect
/// timeout.
#[derive(Clone)]
pub struct HyperConnector {
    dialer: TcpDialer,
    timeout: Duration,
}

impl HyperConnector {
    pub fn new(dialer: TcpDialer, timeout: Duration) -> Self {
        Self { dialer, timeout }
    }
}

impl Service<Uri> for HyperConnector {
    type Response = TokioIo<TcpStream>;
    type Error = io::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let dialer = self.dialer.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let authority = uri
                .authority()
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Missing authority"))?;
            let port = authority.port_u16().unwrap_or(80);
            let target = format!("{}:{}", authority.host(), port);

            let stream = dialer.connect_tcp(&target, timeout).await?;
            Ok(TokioIo::new(stream))
        })
    }
}
