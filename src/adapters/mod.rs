pub mod hyper_server;
pub mod monitoring;
pub mod tcp;
pub mod tracking;

pub use hyper_server::{HyperConnector, HyperHttpClient, HyperProxyAdapter, ProxyServer};
pub use monitoring::MonitoringServer;
pub use tcp::{TcpDialer, TokioHostResolver};
pub use tracking::*;
