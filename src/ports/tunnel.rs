use tokio::io::{AsyncRead, AsyncWrite};

/// A raw, duplex byte stream that can take part in a tunnel.
///
/// Both the dialed upstream socket and the hijacked client connection are
/// handled through this trait, so the relay never sees HTTP framing.
pub trait TunnelStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> TunnelStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxedStream = Box<dyn TunnelStream>;
