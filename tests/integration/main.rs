//! Gossamer integration test harness.
//!
//! Tests run a full broadcast node in-process on loopback TCP: the peer
//! listener, the send worker, and the pipeline, with real sockets between
//! the node and its receivers. No root or network setup is needed:
//!
//!   cargo test --test integration
//!
//! Every node binds an OS-assigned port, so tests can run in parallel.

use std::net::SocketAddr;
use std::num::{NonZeroU32, NonZeroUsize};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use gossamer_core::artifact::decompress;
use gossamer_core::crypto::hash;
use gossamer_core::{ArtifactMetadata, ChunkPlan, Compression, PeerId, METADATA_LEN};
use gossamer_services::{ArtifactCache, StreamStore, WitnessCache};
use gossamerd::broadcast::{send_queue, BroadcastPipeline, BroadcastSettings, SendQueue, SendWorker, Shutdown};
use gossamerd::listener;

mod broadcast;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Per-chunk write bound used by every test node.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// A running broadcast node.
pub struct Node {
    pub addr: SocketAddr,
    pub streams: StreamStore,
    pub witnesses: WitnessCache,
    pub artifacts: ArtifactCache,
    pub queue: SendQueue,
    pub shutdown: Shutdown,
}

/// Start a node on 127.0.0.1 with an OS-assigned port.
pub async fn start_node(chunk_size: u32, compression: Compression) -> Result<Node> {
    let streams = StreamStore::new();
    let witnesses = WitnessCache::new(NonZeroUsize::new(64).unwrap());
    let artifacts = ArtifactCache::new(NonZeroUsize::new(64).unwrap());

    let settings = BroadcastSettings {
        chunk_size: NonZeroU32::new(chunk_size).context("chunk size must be > 0")?,
        timeout: WRITE_TIMEOUT,
    };
    let pipeline = Arc::new(BroadcastPipeline::new(streams.clone(), witnesses.clone(), settings));
    let (queue, rx) = send_queue(16);
    let codec = gossamer_core::ArtifactCodec::new(compression, 64 * 1024 * 1024);
    let shutdown = SendWorker::new(pipeline, artifacts.clone(), codec, rx).activate();

    let tcp = TcpListener::bind("127.0.0.1:0").await?;
    let addr = tcp.local_addr()?;
    tokio::spawn(listener::listen(tcp, streams.clone(), shutdown.token()));

    Ok(Node {
        addr,
        streams,
        witnesses,
        artifacts,
        queue,
        shutdown,
    })
}

impl Node {
    /// Connect a receiver and wait until the node has registered it.
    pub async fn connect(&self, id: PeerId) -> Result<Receiver> {
        let mut conn = TcpStream::connect(self.addr)
            .await
            .with_context(|| format!("failed to connect to {}", self.addr))?;
        conn.write_all(&id).await?;

        let streams = self.streams.clone();
        wait_for(move || streams.contains(&id)).await?;
        Ok(Receiver { id, conn })
    }
}

/// A peer on the receiving end of a node's broadcasts.
pub struct Receiver {
    pub id: PeerId,
    conn: TcpStream,
}

/// One artifact as seen by a receiver.
pub struct Received {
    pub metadata: ArtifactMetadata,
    /// Payload after decompression.
    pub payload: Vec<u8>,
    /// Wire lengths of the data chunks, in arrival order.
    pub chunk_lens: Vec<usize>,
}

impl Receiver {
    /// Read one full broadcast: metadata, then data chunks framed by the
    /// plan the metadata describes.
    pub async fn read_artifact(&mut self) -> Result<Received> {
        let mut header = [0u8; METADATA_LEN];
        self.conn.read_exact(&mut header).await.context("reading metadata")?;
        let metadata = ArtifactMetadata::decode(&header)?;
        let plan = ChunkPlan::from_metadata(&metadata).context("zero chunk size")?;

        let mut stream = Vec::with_capacity(plan.size() as usize);
        let mut chunk_lens = Vec::new();
        for index in 1..plan.total_chunks() {
            let len = plan.chunk_len(index).context("chunk past end of plan")?;
            let mut chunk = vec![0u8; len];
            self.conn
                .read_exact(&mut chunk)
                .await
                .with_context(|| format!("reading chunk {index}"))?;
            chunk_lens.push(len);
            stream.extend_from_slice(&chunk);
        }

        let payload = decompress(&stream, metadata.compression())?;
        if hash(&payload) != metadata.checksum {
            bail!("checksum mismatch after reassembly");
        }
        Ok(Received {
            metadata,
            payload,
            chunk_lens,
        })
    }

    /// True if nothing arrives within `window`.
    pub async fn is_silent_for(&mut self, window: Duration) -> bool {
        let mut byte = [0u8; 1];
        match tokio::time::timeout(window, self.conn.read(&mut byte)).await {
            Err(_) => true,
            // EOF without data also counts as silence
            Ok(Ok(0)) => true,
            Ok(_) => false,
        }
    }
}

/// Poll `cond` every 10ms for up to five seconds.
pub async fn wait_for(mut cond: impl FnMut() -> bool) -> Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        if tokio::time::Instant::now() >= deadline {
            bail!("condition not met within 5s");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}

/// Deterministic, poorly compressible test payload.
pub fn payload(len: usize) -> Vec<u8> {
    let mut state = 0x9e37_79b9_7f4a_7c15u64;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state as u8
        })
        .collect()
}
