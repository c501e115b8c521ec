use bytes::Bytes;
pub use http::{HeaderMap, StatusCode};
use std::net::SocketAddr;
use url::Url;

/// Body written to the client whenever the upstream side cannot be reached.
pub const UPSTREAM_UNREACHABLE: &str = "could not reach upstream server.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyMethod {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Connect,
    Patch,
    Trace,
    Other(String),
}

impl ProxyMethod {
    pub fn as_str(&self) -> &str {
        match self {
            ProxyMethod::Get => "GET",
            ProxyMethod::Post => "POST",
            ProxyMethod::Put => "PUT",
            ProxyMethod::Delete => "DELETE",
            ProxyMethod::Head => "HEAD",
            ProxyMethod::Options => "OPTIONS",
            ProxyMethod::Connect => "CONNECT",
            ProxyMethod::Patch => "PATCH",
            ProxyMethod::Trace => "TRACE",
            ProxyMethod::Other(s) => s.as_str(),
        }
    }
}

/// The two ways an inbound request can be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// CONNECT: dial the target and relay raw bytes.
    Tunnel,
    /// Everything else: replay the request against the origin.
    Forward,
}

impl Dispatch {
    /// Classifies a request by its method. This is the only place the
    /// CONNECT/forward decision is made.
    pub fn classify(method: &ProxyMethod) -> Self {
        match method {
            ProxyMethod::Connect => Dispatch::Tunnel,
            _ => Dispatch::Forward,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dispatch::Tunnel => "tunnel",
            Dispatch::Forward => "forward",
        }
    }
}

impl std::fmt::Display for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-CONNECT request to replay against the origin.
///
/// `target` is kept as the raw absolute URL the client asked for; it is only
/// parsed by the HTTP client, so a malformed target fails there.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: ProxyMethod,
    pub target: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyRequest {
    pub fn new(method: ProxyMethod, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    /// Host part of the target, if the target parses as a URL.
    pub fn host(&self) -> Option<String> {
        Url::parse(&self.target)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
    }
}

/// A CONNECT request. `authority` is the `host:port` to dial.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub authority: String,
}

impl ConnectRequest {
    pub fn new(authority: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
        }
    }

    pub fn host(&self) -> Option<String> {
        Url::parse(&format!("tcp://{}", self.authority))
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
    }
}

#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// The synthetic response sent when the upstream could not be reached.
    pub fn unreachable() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE).with_body(UPSTREAM_UNREACHABLE)
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: uuid::Uuid,
    pub method: String,
    pub target: String,
    pub dispatch: Dispatch,
    pub peer: Option<SocketAddr>,
    pub opened_at: std::time::Instant,
    pub closed_at: Option<std::time::Instant>,
}

impl ConnectionInfo {
    pub fn new(method: String, target: String, dispatch: Dispatch) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            method,
            target,
            dispatch,
            peer: None,
            opened_at: std::time::Instant::now(),
            closed_at: None,
        }
    }

    pub fn with_peer(mut self, peer: Option<SocketAddr>) -> Self {
        self.peer = peer;
        self
    }

    pub fn close(&mut self) {
        self.closed_at = Some(std::time::Instant::now());
    }
}
