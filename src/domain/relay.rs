//! Byte relay between the two legs of a tunnel.
//!
//! Each direction runs in its own task with its own pooled buffer. Both tasks
//! share one [`Deadline`] and one [`CancellationToken`]. As soon as either
//! direction stops, whether on end-of-stream, error or timeout, the other one
//! is cancelled and both connections are closed, so a session never outlives
//! the first peer that stops talking.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument};

use super::{BufferPool, Deadline};
use crate::ports::TunnelStream;

/// Outcome of both directions of a finished session.
#[derive(Debug)]
pub struct RelayStats {
    pub client_to_upstream: io::Result<u64>,
    pub upstream_to_client: io::Result<u64>,
}

impl RelayStats {
    pub fn is_clean(&self) -> bool {
        self.client_to_upstream.is_ok() && self.upstream_to_client.is_ok()
    }
}

/// Reads from `reader` into `buf` and writes every chunk to `writer` until
/// end-of-stream. Each read and write is bounded by `deadline`; `copied`
/// tracks the bytes written so far, even if the copy is abandoned midway.
pub async fn copy_buffered<R, W>(
    reader: &mut R,
    writer: &mut W,
    buf: &mut [u8],
    deadline: Deadline,
    copied: &mut u64,
) -> io::Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    loop {
        let n = deadline.io(reader.read(buf)).await?;
        if n == 0 {
            break;
        }
        deadline.io(writer.write_all(&buf[..n])).await?;
        *copied += n as u64;
    }
    deadline.io(writer.flush()).await
}

/// Relays bytes between `client` and `upstream` until both directions are
/// done, then drops both streams.
pub async fn relay<C, U>(client: C, upstream: U, pool: &BufferPool, deadline: Deadline) -> RelayStats
where
    C: TunnelStream + 'static,
    U: TunnelStream + 'static,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (upstream_read, upstream_write) = tokio::io::split(upstream);
    let cancel = CancellationToken::new();

    let outbound = tokio::spawn(
        pipe(client_read, upstream_write, pool.clone(), deadline, cancel.clone())
            .instrument(tracing::debug_span!("client_to_upstream")),
    );
    let inbound = tokio::spawn(
        pipe(upstream_read, client_write, pool.clone(), deadline, cancel.clone())
            .instrument(tracing::debug_span!("upstream_to_client")),
    );

    let (outbound, inbound) = tokio::join!(outbound, inbound);

    RelayStats {
        client_to_upstream: flatten(outbound),
        upstream_to_client: flatten(inbound),
    }
}

async fn pipe<R, W>(
    mut reader: R,
    mut writer: W,
    pool: BufferPool,
    deadline: Deadline,
    cancel: CancellationToken,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = pool.acquire();
    let mut copied = 0u64;

    let finished = tokio::select! {
        res = copy_buffered(&mut reader, &mut writer, &mut buf[..], deadline, &mut copied) => Some(res),
        _ = cancel.cancelled() => None,
    };

    match finished {
        Some(Ok(())) => {
            debug!(bytes = copied, "end of stream, closing session");
            if let Err(e) = deadline.io(writer.shutdown()).await {
                debug!("shutdown after end of stream failed: {}", e);
            }
            cancel.cancel();
            Ok(copied)
        }
        Some(Err(e)) => {
            cancel.cancel();
            Err(e)
        }
        None => {
            debug!(bytes = copied, "opposite direction stopped");
            Ok(copied)
        }
    }
}

fn flatten(joined: Result<io::Result<u64>, tokio::task::JoinError>) -> io::Result<u64> {
    joined.unwrap_or_else(|e| Err(io::Error::new(io::ErrorKind::Other, e)))
}
