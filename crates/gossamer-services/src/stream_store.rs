//! Stream store — the live set of peer streams and the fan-out send primitive.
//!
//! `apply` runs one send task per target peer and hands back a
//! `PendingResult` for each, without waiting for any of them. Every other
//! operation is safe to call from any task while sends are in flight.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{oneshot, Mutex};

use gossamer_core::crypto::short_hex;
use gossamer_core::PeerId;

/// Why a send to one peer did not complete.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("stream write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stream write timed out after {0:?}")]
    Timeout(Duration),
    #[error("send task ended without reporting a result")]
    Abandoned,
}

// ── Exclude set ──────────────────────────────────────────────────────────────

/// Peers to skip for one fan-out.
///
/// Only membership matters. The ordered set just keeps iteration stable
/// for logs and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcludeSet(BTreeSet<PeerId>);

impl ExcludeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.0.contains(peer)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerId> {
        self.0.iter()
    }
}

impl FromIterator<PeerId> for ExcludeSet {
    fn from_iter<I: IntoIterator<Item = PeerId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ── Pending result ───────────────────────────────────────────────────────────

/// One peer's outcome for one dispatch. Resolves exactly once.
///
/// Carries the generation of the stream the send ran against, so callers
/// can tell a result for a replaced stream from one for its successor.
#[derive(Debug)]
pub struct PendingResult {
    generation: u64,
    rx: oneshot::Receiver<Result<(), SendError>>,
}

impl PendingResult {
    /// A result for stream `generation` and the sender that resolves it.
    pub fn channel(generation: u64) -> (oneshot::Sender<Result<(), SendError>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { generation, rx })
    }

    /// A result that is already resolved.
    pub fn ready(generation: u64, result: Result<(), SendError>) -> Self {
        let (tx, pending) = Self::channel(generation);
        let _ = tx.send(result);
        pending
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Future for PendingResult {
    type Output = Result<(), SendError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(SendError::Abandoned)))
    }
}

// ── Peer writer ──────────────────────────────────────────────────────────────

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Shared handle to one peer's outbound stream.
///
/// Each write holds the stream for its whole duration, so concurrent
/// writers never interleave within a single unit.
#[derive(Clone)]
pub struct PeerWriter {
    generation: u64,
    inner: Arc<Mutex<BoxedWriter>>,
}

impl PeerWriter {
    fn new<W>(writer: W, generation: u64) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            generation,
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Distinguishes this stream from any earlier or later stream
    /// registered for the same peer.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Write and flush `data`, failing if that takes longer than `timeout`.
    ///
    /// The bound starts once the stream is held; waiting behind another
    /// unit for the same peer does not count against it.
    pub async fn write_with_timeout(&self, data: &[u8], timeout: Duration) -> Result<(), SendError> {
        let mut writer = self.inner.lock().await;
        let write = async {
            writer.write_all(data).await?;
            writer.flush().await
        };
        match tokio::time::timeout(timeout, write).await {
            Ok(res) => res.map_err(SendError::from),
            Err(_) => Err(SendError::Timeout(timeout)),
        }
    }

    async fn shutdown(&self) -> std::io::Result<()> {
        self.inner.lock().await.shutdown().await
    }
}

struct PeerStream {
    writer: PeerWriter,
    connected_at: Instant,
}

// ── Store ────────────────────────────────────────────────────────────────────

/// The stream store — shared across the listener, broadcasts, and their
/// cleanup tasks.
#[derive(Clone, Default)]
pub struct StreamStore {
    streams: Arc<DashMap<PeerId, PeerStream>>,
    next_generation: Arc<AtomicU64>,
}

impl StreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer stream. An existing stream for the same peer is
    /// replaced and torn down.
    pub fn add<W>(&self, peer: PeerId, writer: W)
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let stream = PeerStream {
            writer: PeerWriter::new(writer, generation),
            connected_at: Instant::now(),
        };
        if let Some(old) = self.streams.insert(peer, stream) {
            tracing::debug!(peer = short_hex(&peer), "replacing existing stream");
            spawn_teardown(peer, old.writer);
        }
        tracing::info!(peer = short_hex(&peer), peers = self.streams.len(), "peer stream added");
    }

    /// Forget a peer and close its stream. Returns false if the peer was
    /// already gone, so concurrent callers remove it exactly once.
    pub fn remove(&self, peer: &PeerId) -> bool {
        self.remove_where(peer, |_| true)
    }

    /// Like `remove`, but only if `peer` is still on stream `generation`.
    /// A stream that has since been replaced is left alone.
    pub fn remove_generation(&self, peer: &PeerId, generation: u64) -> bool {
        self.remove_where(peer, |stream| stream.writer.generation == generation)
    }

    fn remove_where(&self, peer: &PeerId, cond: impl FnOnce(&PeerStream) -> bool) -> bool {
        match self.streams.remove_if(peer, |_, stream| cond(stream)) {
            Some((_, stream)) => {
                tracing::info!(
                    peer = short_hex(peer),
                    generation = stream.writer.generation,
                    connected_for = ?stream.connected_at.elapsed(),
                    "peer stream removed"
                );
                spawn_teardown(*peer, stream.writer);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.streams.contains_key(peer)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Currently connected peers, sorted.
    pub fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.streams.iter().map(|e| *e.key()).collect();
        peers.sort_unstable();
        peers
    }

    /// Run `send` against every connected peer not in `exclude`.
    ///
    /// Each invocation gets its own task; the returned map has one pending
    /// result per peer that was dispatched to. Never waits on a send.
    pub fn apply<F, Fut>(&self, send: F, exclude: &ExcludeSet) -> HashMap<PeerId, PendingResult>
    where
        F: Fn(PeerId, PeerWriter) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SendError>> + Send + 'static,
    {
        // Snapshot targets first so no map guard is held while spawning
        let targets: Vec<(PeerId, PeerWriter)> = self
            .streams
            .iter()
            .filter(|e| !exclude.contains(e.key()))
            .map(|e| (*e.key(), e.value().writer.clone()))
            .collect();

        let send = Arc::new(send);
        let mut results = HashMap::with_capacity(targets.len());
        for (peer, writer) in targets {
            let (tx, pending) = PendingResult::channel(writer.generation);
            let send = send.clone();
            tokio::spawn(async move {
                let _ = tx.send(send(peer, writer).await);
            });
            results.insert(peer, pending);
        }
        results
    }
}

fn spawn_teardown(peer: PeerId, writer: PeerWriter) {
    tokio::spawn(async move {
        if let Err(e) = writer.shutdown().await {
            tracing::debug!(peer = short_hex(&peer), error = %e, "stream shutdown failed");
        }
    });
}
