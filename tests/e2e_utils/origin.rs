#![cfg(test)]
#![allow(dead_code)]

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ServerBuilder;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::rustls;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio_rustls::{TlsAcceptor, TlsConnector};

pub const HELLO_BODY: &str = "<html><body>Hello World!</body></html>";

/// Origin HTTP server.
///
/// - `/hello` answers the hello page
/// - `/status/<code>` answers `<code>` with an empty body
/// - `/echo` answers 200 with the request body and `x-method` set to the
///   request method
/// - `/slow` answers after two seconds
/// - anything else is a 404
pub struct TestOrigin {
    addr: SocketAddr,
    _handle: JoinHandle<()>,
}

impl TestOrigin {
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let _ = ServerBuilder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), service_fn(route))
                        .await;
                });
            }
        });

        Ok(Self { addr, _handle: handle })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

async fn route(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_string();

    let response = if path == "/hello" {
        Response::new(Full::new(Bytes::from_static(HELLO_BODY.as_bytes())))
    } else if path == "/echo" {
        let method = req.method().to_string();
        let body = req.into_body().collect().await.map(|b| b.to_bytes()).unwrap_or_default();
        let mut response = Response::new(Full::new(body));
        response.headers_mut().insert("x-method", method.parse().unwrap());
        response
    } else if path == "/slow" {
        tokio::time::sleep(Duration::from_secs(2)).await;
        Response::new(Full::new(Bytes::from_static(b"late")))
    } else if let Some(code) = path.strip_prefix("/status/") {
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = code
            .parse::<u16>()
            .ok()
            .and_then(|c| StatusCode::from_u16(c).ok())
            .unwrap_or(StatusCode::BAD_REQUEST);
        response
    } else {
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::NOT_FOUND;
        response
    };

    Ok(response)
}

/// Raw TCP server writing back every byte it receives.
pub struct EchoServer {
    addr: SocketAddr,
    _handle: JoinHandle<()>,
}

impl EchoServer {
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let (mut reader, mut writer) = stream.into_split();
                    if tokio::io::copy(&mut reader, &mut writer).await.is_ok() {
                        let _ = writer.shutdown().await;
                    }
                });
            }
        });

        Ok(Self { addr, _handle: handle })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Raw TCP server that accepts connections and never reads or writes.
pub struct SilentServer {
    addr: SocketAddr,
    _handle: JoinHandle<()>,
}

impl SilentServer {
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        Ok(Self { addr, _handle: handle })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// A loopback address nothing listens on.
pub async fn closed_port_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
    listener.local_addr().expect("Failed to get address")
}

/// TLS server for `localhost` with a fresh self-signed certificate. Every
/// session gets `payload` and a clean close.
pub struct TlsOrigin {
    addr: SocketAddr,
    certificate: CertificateDer<'static>,
    _handle: JoinHandle<()>,
}

impl TlsOrigin {
    pub async fn start(payload: &'static [u8]) -> Result<Self, Box<dyn std::error::Error>> {
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])?;
        let certificate = generated.cert.der().clone();
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(generated.signing_key.serialize_der()));

        let config = rustls::ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(vec![certificate.clone()], key)?;
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    let Ok(mut tls) = acceptor.accept(stream).await else {
                        return;
                    };
                    if tls.write_all(payload).await.is_ok() {
                        let _ = tls.shutdown().await;
                    }
                });
            }
        });

        Ok(Self {
            addr,
            certificate,
            _handle: handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Client connector trusting only this server's certificate.
    pub fn connector(&self) -> TlsConnector {
        let mut roots = rustls::RootCertStore::empty();
        roots.add(self.certificate.clone()).expect("Failed to trust certificate");
        let config = rustls::ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .expect("Failed to select protocol versions")
            .with_root_certificates(roots)
            .with_no_client_auth();
        TlsConnector::from(Arc::new(config))
    }
}
