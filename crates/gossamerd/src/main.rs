//! gossamerd — Gossamer peer-to-peer broadcast daemon.
//!
//! Accepts peer streams on the configured listen address and broadcasts
//! every line read from stdin as one artifact.

use std::num::NonZeroUsize;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;

use gossamer_core::config::GossamerConfig;
use gossamer_services::{ArtifactCache, StreamStore, WitnessCache};
use gossamerd::broadcast::{send_queue, BroadcastPipeline, BroadcastSettings, SendQueue, SendWorker};
use gossamerd::listener;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = GossamerConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = GossamerConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        GossamerConfig::default()
    });

    let settings = BroadcastSettings::from_config(&config.broadcast)
        .context("broadcast.artifact_chunk_size must be greater than zero")?;
    let witness_capacity = NonZeroUsize::new(config.cache.witness_cache_size)
        .context("cache.witness_cache_size must be greater than zero")?;
    let artifact_capacity = NonZeroUsize::new(config.cache.artifact_cache_size)
        .context("cache.artifact_cache_size must be greater than zero")?;

    tracing::info!(
        chunk_size = settings.chunk_size.get(),
        timeout = ?settings.timeout,
        compression = ?config.broadcast.compression,
        "gossamerd starting"
    );

    // Shared state
    let streams = StreamStore::new();
    let witnesses = WitnessCache::new(witness_capacity);
    let artifacts = ArtifactCache::new(artifact_capacity);

    // Send worker
    let pipeline = Arc::new(BroadcastPipeline::new(streams.clone(), witnesses, settings));
    let (queue, queue_rx) = send_queue(config.broadcast.send_queue_size);
    let worker = SendWorker::new(pipeline, artifacts, config.broadcast.codec(), queue_rx).activate();
    let shutdown = worker.token();

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            shutdown.cancel();
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let tcp = TcpListener::bind(config.network.listen_addr.as_str())
        .await
        .with_context(|| format!("failed to bind {}", config.network.listen_addr))?;
    let listener_task = tokio::spawn(listener::listen(tcp, streams.clone(), shutdown.clone()));

    // main keeps its own handle so the worker outlives stdin
    tokio::spawn(read_stdin(queue.clone()));

    // ── Wait for exit ────────────────────────────────────────────────────────

    tokio::select! {
        _ = shutdown.cancelled() => tracing::info!("shutting down"),
        r = listener_task => tracing::error!("peer listener exited: {:?}", r),
    }
    worker.shutdown();
    worker.join().await;
    drop(queue);

    tracing::info!(peers = streams.len(), "gossamerd stopped");
    Ok(())
}

/// Queue every stdin line for broadcast.
async fn read_stdin(queue: SendQueue) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if queue.send(line.into_bytes()).await.is_err() {
                    return;
                }
            }
            Ok(None) => {
                tracing::info!("stdin closed, no further payloads");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read stdin");
                return;
            }
        }
    }
}
