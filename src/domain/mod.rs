pub mod buffer_pool;
pub mod deadline;
pub mod errors;
pub mod models;
pub mod relay;
pub mod service;

pub use buffer_pool::{BufferPool, PoolStats, PooledBuffer};
pub use deadline::{Deadline, DeadlinePolicy};
pub use errors::*;
pub use models::*;
pub use relay::RelayStats;
pub use service::{ProxyService, TunnelSession};
