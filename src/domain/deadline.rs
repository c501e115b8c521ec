use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::time::Instant;

use super::Dispatch;
use crate::config::ProxyConfig;

/// Stand-in for "never" when a duration does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// An absolute point in time after which pending I/O fails with a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(duration: Duration) -> Self {
        let now = Instant::now();
        let at = now
            .checked_add(duration)
            .unwrap_or_else(|| now + FAR_FUTURE);
        Self { at }
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Shortest of `limit` and the time left before the deadline.
    pub fn cap(&self, limit: Duration) -> Duration {
        limit.min(self.remaining())
    }

    /// Runs `fut` to completion unless the deadline passes first.
    pub async fn run<F: Future>(self, fut: F) -> Result<F::Output, tokio::time::error::Elapsed> {
        tokio::time::timeout_at(self.at, fut).await
    }

    /// Like [`Deadline::run`] for I/O futures, folding expiry into a
    /// `TimedOut` error.
    pub async fn io<T, F>(self, fut: F) -> io::Result<T>
    where
        F: Future<Output = io::Result<T>>,
    {
        match self.run(fut).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded")),
        }
    }
}

/// Turns configured durations into per-request deadlines.
#[derive(Debug, Clone, Copy)]
pub struct DeadlinePolicy {
    connect: Duration,
    session: Duration,
    forward: Duration,
}

impl DeadlinePolicy {
    pub fn new(connect: Duration, session: Duration, forward: Duration) -> Self {
        Self {
            connect,
            session,
            forward,
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(
            config.connect_timeout,
            config.tunnel_timeout,
            config.write_timeout,
        )
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect
    }

    /// Computes the deadline for a request at the moment it enters the
    /// router. The result is never recomputed afterwards.
    pub fn deadline_for(&self, dispatch: Dispatch) -> Deadline {
        match dispatch {
            Dispatch::Tunnel => Deadline::after(self.session),
            Dispatch::Forward => Deadline::after(self.forward),
        }
    }
}
