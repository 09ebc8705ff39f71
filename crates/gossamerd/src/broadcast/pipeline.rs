//! Broadcast pipeline — delivers one artifact to every peer that lacks it.
//!
//! The artifact goes out as the metadata unit followed by its data chunks.
//! Every chunk is fanned out to all participating peers at once, but a
//! peer's chunk `i` is only written after its chunk `i - 1` succeeded. That
//! keeps at most one unacknowledged chunk in flight per peer, and a peer
//! whose stream fails simply stops receiving while everyone else carries
//! on. Failed peers are dropped from the stream store once their last
//! dispatch resolves.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::io::AsyncReadExt;

use gossamer_core::config::BroadcastConfig;
use gossamer_core::crypto::short_hex;
use gossamer_core::{Artifact, ArtifactMetadata, Checksum, ChunkPlan, PeerId};
use gossamer_services::{ExcludeSet, PendingResult, StreamStore, WitnessCache};

use super::exclude::exclude_set;

/// Per-broadcast knobs, fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastSettings {
    pub chunk_size: NonZeroU32,
    /// Bound on each single per-peer chunk write.
    pub timeout: Duration,
}

impl BroadcastSettings {
    /// `None` if the config carries a zero chunk size.
    pub fn from_config(config: &BroadcastConfig) -> Option<Self> {
        Some(Self {
            chunk_size: config.chunk_size()?,
            timeout: config.timeout(),
        })
    }
}

pub struct BroadcastPipeline {
    streams: StreamStore,
    witnesses: WitnessCache,
    settings: BroadcastSettings,
}

impl BroadcastPipeline {
    pub fn new(streams: StreamStore, witnesses: WitnessCache, settings: BroadcastSettings) -> Self {
        Self {
            streams,
            witnesses,
            settings,
        }
    }

    /// Broadcast `artifact`.
    ///
    /// Returns once every chunk has been read and dispatched. Writes still in
    /// flight finish on their own, and peers that fail are removed from the
    /// stream store in the background.
    pub async fn broadcast<A: Artifact>(&self, mut artifact: A) {
        let checksum = artifact.checksum();
        let BroadcastSettings { chunk_size, timeout } = self.settings;

        let metadata = ArtifactMetadata::new(checksum, artifact.size(), chunk_size, artifact.compression());
        let plan = ChunkPlan::new(artifact.size(), chunk_size);
        let exclude = exclude_set(&self.witnesses, &checksum);

        let header = Bytes::copy_from_slice(&metadata.encode());
        let first = self.streams.apply(
            move |_, writer| {
                let header = header.clone();
                async move { writer.write_with_timeout(&header, timeout).await }
            },
            &exclude,
        );

        tracing::debug!(
            checksum = short_hex(&checksum),
            size = plan.size(),
            chunks = plan.total_chunks(),
            peers = first.len(),
            excluded = exclude.len(),
            "broadcasting artifact"
        );

        let mut state = PipelineState::new(first);

        for index in 1..plan.total_chunks() {
            // chunk_len is Some for every index below total_chunks
            let len = plan.chunk_len(index).unwrap_or(0);
            let mut data = vec![0u8; len];
            if let Err(e) = artifact.read_exact(&mut data).await {
                tracing::warn!(
                    checksum = short_hex(&checksum),
                    chunk = index,
                    error = %e,
                    "cannot read artifact"
                );
                artifact.disconnect();
                state.reap(&self.streams, checksum);
                return;
            }

            state.dispatch(&self.streams, &exclude, Bytes::from(data), timeout);
            tracing::trace!(
                checksum = short_hex(&checksum),
                chunk = index,
                peers = state.len(),
                "chunk dispatched"
            );
        }

        state.reap(&self.streams, checksum);
        artifact.close();
    }
}

/// Every participating peer's outcome for the most recently dispatched chunk.
///
/// Starts as the set of streams that were sent the metadata and only ever
/// shrinks. Streams are matched by peer and generation: peers that connect
/// mid-broadcast never join, a peer whose stream is replaced mid-broadcast
/// leaves with the old stream, and peers that drop out of the stream store
/// leave.
struct PipelineState {
    pending: HashMap<PeerId, PendingResult>,
}

impl PipelineState {
    fn new(first: HashMap<PeerId, PendingResult>) -> Self {
        Self { pending: first }
    }

    fn len(&self) -> usize {
        self.pending.len()
    }

    /// Fan out the next chunk, each peer's write gated on its previous one.
    fn dispatch(&mut self, streams: &StreamStore, exclude: &ExcludeSet, data: Bytes, timeout: Duration) {
        let participants: HashMap<PeerId, u64> = self
            .pending
            .iter()
            .map(|(peer, pending)| (*peer, pending.generation()))
            .collect();
        let previous: Arc<DashMap<PeerId, PendingResult>> = Arc::new(self.pending.drain().collect());

        let mut next = streams.apply(
            move |peer, writer| {
                let previous = previous.clone();
                let data = data.clone();
                async move {
                    let Some((_, prior)) = previous.remove(&peer) else {
                        return Ok(());
                    };
                    // A fresh stream under the same id never saw the metadata
                    if prior.generation() != writer.generation() {
                        return Ok(());
                    }
                    prior.await?;
                    writer.write_with_timeout(&data, timeout).await
                }
            },
            exclude,
        );
        next.retain(|peer, pending| participants.get(peer) == Some(&pending.generation()));
        self.pending = next;
    }

    /// Drop every peer whose final dispatch fails. Does not wait.
    fn reap(self, streams: &StreamStore, checksum: Checksum) {
        for (peer, pending) in self.pending {
            let streams = streams.clone();
            let generation = pending.generation();
            tokio::spawn(async move {
                if let Err(e) = pending.await {
                    tracing::debug!(
                        peer = short_hex(&peer),
                        checksum = short_hex(&checksum),
                        error = %e,
                        "peer failed to receive the artifact"
                    );
                    streams.remove_generation(&peer, generation);
                }
            });
        }
    }
}
