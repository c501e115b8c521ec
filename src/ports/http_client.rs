use crate::domain::{Deadline, ProxyRequest, ProxyResponse, Result};
use async_trait::async_trait;

#[async_trait]
pub trait HttpClientPort: Send + Sync {
    /// Performs one full round trip. Must not outlive `deadline`.
    async fn execute(&self, request: &ProxyRequest, deadline: Deadline) -> Result<ProxyResponse>;
}
