use crate::*;

use gossamer_core::crypto::hash;

const A: PeerId = [0xaa; 32];
const B: PeerId = [0xbb; 32];
const W: PeerId = [0x77; 32];

#[tokio::test]
async fn every_receiver_gets_the_artifact() -> Result<()> {
    let node = start_node(64, Compression::None).await?;
    let mut a = node.connect(A).await?;
    let mut b = node.connect(B).await?;

    let data = payload(1000);
    node.queue.send(data.clone()).await?;

    for rx in [&mut a, &mut b] {
        let got = rx.read_artifact().await?;
        assert_eq!(got.payload, data);
        assert_eq!({ got.metadata.size }, 1000);
        assert_eq!({ got.metadata.chunk_size }, 64);
        // 15 full chunks and a 40-byte tail
        assert_eq!(got.chunk_lens.len(), 16);
        assert_eq!(got.chunk_lens.last(), Some(&40));
    }

    assert_eq!(node.artifacts.get(&hash(&data)), Some(1000));
    assert_eq!(node.streams.len(), 2);
    Ok(())
}

#[tokio::test]
async fn compressed_artifact_reassembles() -> Result<()> {
    let node = start_node(32, Compression::Zstd).await?;
    let mut a = node.connect(A).await?;

    let data = b"gossamer ".repeat(200);
    node.queue.send(data.clone()).await?;

    let got = a.read_artifact().await?;
    assert_eq!(got.payload, data);
    assert_eq!(got.metadata.compression(), Compression::Zstd);

    // size on the wire is the compressed stream
    let wire_size = { got.metadata.size };
    assert!(wire_size < data.len() as u64);
    assert_eq!(node.artifacts.get(&hash(&data)), Some(wire_size));
    Ok(())
}

#[tokio::test]
async fn stream_carries_consecutive_artifacts() -> Result<()> {
    let node = start_node(16, Compression::None).await?;
    let mut a = node.connect(A).await?;

    let first = payload(100);
    node.queue.send(first.clone()).await?;
    assert_eq!(a.read_artifact().await?.payload, first);

    let second = b"second".to_vec();
    node.queue.send(second.clone()).await?;
    assert_eq!(a.read_artifact().await?.payload, second);
    assert_eq!(node.artifacts.len(), 2);
    Ok(())
}

#[tokio::test]
async fn witnesses_are_skipped() -> Result<()> {
    let node = start_node(64, Compression::None).await?;
    let mut a = node.connect(A).await?;
    let mut w = node.connect(W).await?;

    let data = payload(300);
    node.witnesses.add(hash(&data), W);
    node.queue.send(data.clone()).await?;

    assert_eq!(a.read_artifact().await?.payload, data);
    assert!(w.is_silent_for(Duration::from_millis(200)).await);
    assert!(node.streams.contains(&W));
    Ok(())
}

#[tokio::test]
async fn empty_payload_sends_metadata_only() -> Result<()> {
    let node = start_node(64, Compression::None).await?;
    let mut a = node.connect(A).await?;

    node.queue.send(Vec::new()).await?;

    let got = a.read_artifact().await?;
    assert!(got.payload.is_empty());
    assert!(got.chunk_lens.is_empty());
    assert!(a.is_silent_for(Duration::from_millis(100)).await);
    Ok(())
}

#[tokio::test]
async fn dead_receiver_is_removed_while_others_finish() -> Result<()> {
    let node = start_node(64, Compression::None).await?;
    let a = node.connect(A).await?;
    let b = node.connect(B).await?;
    drop(b);

    let data = payload(8192);
    let reader = tokio::spawn(async move {
        let mut a = a;
        a.read_artifact().await
    });
    node.queue.send(data.clone()).await?;

    let got = reader.await??;
    assert_eq!(got.payload, data);

    let streams = node.streams.clone();
    wait_for(move || !streams.contains(&B)).await?;
    assert!(node.streams.contains(&A));
    Ok(())
}

#[tokio::test]
async fn shutdown_stops_accepting_payloads() -> Result<()> {
    let node = start_node(64, Compression::None).await?;
    let mut a = node.connect(A).await?;

    node.shutdown.shutdown();
    node.shutdown.join().await;

    assert!(node.queue.send(payload(10)).await.is_err());
    assert!(a.is_silent_for(Duration::from_millis(100)).await);
    Ok(())
}
