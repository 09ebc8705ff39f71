//! Send worker — dequeues outbound payloads, turns each into an artifact,
//! records it as recently broadcast, and runs it through the pipeline.
//!
//! Broadcasts are strictly one after another: the next payload is not
//! taken until the current artifact has been fully read and dispatched.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use gossamer_core::crypto::short_hex;
use gossamer_core::{Artifact, ArtifactCodec};
use gossamer_services::ArtifactCache;

use super::BroadcastPipeline;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SendQueueError {
    #[error("send worker has stopped")]
    Closed,
    #[error("send queue is full")]
    Full,
}

/// Producer side of the send queue.
#[derive(Clone)]
pub struct SendQueue {
    tx: mpsc::Sender<Bytes>,
}

/// Create a send queue holding up to `capacity` payloads.
pub fn send_queue(capacity: usize) -> (SendQueue, mpsc::Receiver<Bytes>) {
    let (tx, rx) = mpsc::channel(capacity);
    (SendQueue { tx }, rx)
}

impl SendQueue {
    /// Queue a payload, waiting for room.
    pub async fn send(&self, payload: impl Into<Bytes>) -> Result<(), SendQueueError> {
        self.tx
            .send(payload.into())
            .await
            .map_err(|_| SendQueueError::Closed)
    }

    /// Queue a payload if there is room right now.
    pub fn try_send(&self, payload: impl Into<Bytes>) -> Result<(), SendQueueError> {
        self.tx.try_send(payload.into()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendQueueError::Full,
            mpsc::error::TrySendError::Closed(_) => SendQueueError::Closed,
        })
    }
}

/// Stops a running send worker.
pub struct Shutdown {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl Shutdown {
    /// Stop taking payloads. A broadcast already underway runs to the end.
    /// Safe to call any number of times.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The token this worker stops on, for tying other tasks to it.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for the worker loop to exit.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "send worker task failed");
        }
    }
}

pub struct SendWorker {
    pipeline: Arc<BroadcastPipeline>,
    artifacts: ArtifactCache,
    codec: ArtifactCodec,
    queue: mpsc::Receiver<Bytes>,
}

impl SendWorker {
    pub fn new(
        pipeline: Arc<BroadcastPipeline>,
        artifacts: ArtifactCache,
        codec: ArtifactCodec,
        queue: mpsc::Receiver<Bytes>,
    ) -> Self {
        Self {
            pipeline,
            artifacts,
            codec,
            queue,
        }
    }

    /// Start the worker task.
    pub fn activate(self) -> Shutdown {
        let token = CancellationToken::new();
        let task = tokio::spawn(self.run(token.clone()));
        Shutdown { token, task }
    }

    async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!(compression = ?self.codec.compression(), "send worker started");
        loop {
            let payload = tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    tracing::info!("send worker shutting down");
                    return;
                }

                msg = self.queue.recv() => match msg {
                    Some(payload) => payload,
                    None => {
                        tracing::info!("send queue dropped, send worker exiting");
                        return;
                    }
                },
            };

            // Outside the select: shutdown never interrupts a broadcast
            self.broadcast(payload).await;
        }
    }

    async fn broadcast(&self, payload: Bytes) {
        let artifact = match self.codec.decode(&payload) {
            Ok(artifact) => artifact,
            Err(e) => {
                tracing::warn!(error = %e, len = payload.len(), "cannot create artifact");
                return;
            }
        };

        self.artifacts.add(artifact.checksum(), artifact.size());
        tracing::debug!(
            checksum = short_hex(&artifact.checksum()),
            size = artifact.size(),
            "artifact queued for broadcast"
        );
        self.pipeline.broadcast(artifact).await;
    }
}
