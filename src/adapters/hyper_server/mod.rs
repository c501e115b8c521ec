mod adapter;
mod connector;
mod http_client;
mod limiter;
mod server;

pub use adapter::{Body, HyperProxyAdapter};
pub use connector::HyperConnector;
pub use http_client::HyperHttpClient;
pub use limiter::{ClientLimiter, ClientPermit};
pub use server::{bind_listener, ProxyServer};
