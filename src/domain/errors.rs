use std::fmt;

#[derive(Debug, Clone)]
pub enum ProxyError {
    InvalidUri(String),
    MissingHost,
    InvalidRequest(String),
    ConnectionFailed(String),
    TunnelFailed(String),
    UpstreamError(String),
    BodyTooLarge(usize),
    Timeout,
}

impl ProxyError {
    /// Whether the failure happened while talking to the upstream side.
    ///
    /// Those are the failures that surface to the client as a 503.
    pub fn is_upstream_failure(&self) -> bool {
        !matches!(self, ProxyError::BodyTooLarge(_))
    }
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::InvalidUri(msg) => write!(f, "Invalid URI: {}", msg),
            ProxyError::MissingHost => write!(f, "Missing host in request"),
            ProxyError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ProxyError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            ProxyError::TunnelFailed(msg) => write!(f, "Tunnel failed: {}", msg),
            ProxyError::UpstreamError(msg) => write!(f, "Upstream error: {}", msg),
            ProxyError::BodyTooLarge(limit) => write!(f, "Request body exceeds {} bytes", limit),
            ProxyError::Timeout => write!(f, "Operation timed out"),
        }
    }
}

impl std::error::Error for ProxyError {}

impl From<tokio::time::error::Elapsed> for ProxyError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ProxyError::Timeout
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
