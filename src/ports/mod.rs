pub mod connector;
pub mod http_client;
pub mod resolver;
pub mod tracking;
pub mod tunnel;

pub use connector::ConnectorPort;
pub use http_client::HttpClientPort;
pub use resolver::HostResolverPort;
pub use tracking::TrackingPort;
pub use tunnel::{BoxedStream, TunnelStream};
