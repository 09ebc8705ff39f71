//! Inbound peer listener.
//!
//! Accepts TCP connections and registers each one in the stream store. A
//! connecting peer first sends its 32-byte peer id; from then on the
//! connection is outbound-only as far as this node is concerned, and only
//! the write half is kept.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use gossamer_core::crypto::short_hex;
use gossamer_core::PeerId;
use gossamer_services::StreamStore;

/// How long a new connection has to identify itself.
pub const HELLO_TIMEOUT: Duration = Duration::from_secs(5);

/// Accept peers until `shutdown` fires.
pub async fn listen(listener: TcpListener, streams: StreamStore, shutdown: CancellationToken) -> Result<()> {
    let local = listener.local_addr().context("listener has no local address")?;
    tracing::info!(addr = %local, "peer listener starting");

    loop {
        let (socket, addr) = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("peer listener shutting down");
                return Ok(());
            }

            accepted = listener.accept() => match accepted {
                Ok(a) => a,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            },
        };

        let streams = streams.clone();
        tokio::spawn(async move {
            match register(socket, addr, &streams).await {
                Ok(peer) => tracing::debug!(peer = short_hex(&peer), %addr, "inbound peer registered"),
                Err(e) => tracing::debug!(%addr, error = %e, "inbound peer rejected"),
            }
        });
    }
}

async fn register(socket: TcpStream, addr: SocketAddr, streams: &StreamStore) -> Result<PeerId> {
    socket
        .set_nodelay(true)
        .with_context(|| format!("set_nodelay failed for {addr}"))?;
    let (mut read, write) = socket.into_split();

    let mut peer = [0u8; 32];
    tokio::time::timeout(HELLO_TIMEOUT, read.read_exact(&mut peer))
        .await
        .context("peer id not received in time")?
        .context("failed to read peer id")?;

    streams.add(peer, write);
    Ok(peer)
}
