//! Artifacts — the content-addressed byte objects a node broadcasts.
//!
//! An artifact is read exactly once, front to back, and then ends in exactly
//! one of two ways: `close` after it was fully consumed, or `disconnect` when
//! reading failed part-way. Both take `self`, so a second terminal call does
//! not compile.

use std::io::Cursor;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, ReadBuf};

use crate::crypto::{hash, short_hex};
use crate::wire::Checksum;

/// Compression applied to the artifact stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Zstd,
}

impl std::str::FromStr for Compression {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "zstd" => Ok(Self::Zstd),
            other => Err(CodecError::UnknownCompression(other.to_string())),
        }
    }
}

/// A sized, sequentially readable artifact.
pub trait Artifact: AsyncRead + Send + Unpin {
    /// Hash of the uncompressed content.
    fn checksum(&self) -> Checksum;

    /// Exact number of bytes the stream yields.
    fn size(&self) -> u64;

    fn compression(&self) -> Compression;

    /// Release after the stream was fully consumed.
    fn close(self)
    where
        Self: Sized;

    /// Abort after a read failure. The artifact is unusable afterwards.
    fn disconnect(self)
    where
        Self: Sized;
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("payload is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },
    #[error("compression failed: {0}")]
    Compress(#[source] std::io::Error),
    #[error("decompression failed: {0}")]
    Decompress(#[source] std::io::Error),
    #[error("unknown compression scheme {0:?}")]
    UnknownCompression(String),
}

// ── Codec ────────────────────────────────────────────────────────────────────

/// Turns queued payloads into artifacts.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactCodec {
    compression: Compression,
    max_size: u64,
}

/// zstd level used for outbound artifacts. 0 selects the library default.
const ZSTD_LEVEL: i32 = 0;

impl ArtifactCodec {
    pub fn new(compression: Compression, max_size: u64) -> Self {
        Self {
            compression,
            max_size,
        }
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Build an artifact from a raw payload.
    ///
    /// The checksum covers the raw payload; the artifact stream is the
    /// payload after compression.
    pub fn decode(&self, payload: &[u8]) -> Result<MemoryArtifact, CodecError> {
        let size = payload.len() as u64;
        if size > self.max_size {
            return Err(CodecError::TooLarge {
                size,
                limit: self.max_size,
            });
        }

        let checksum = hash(payload);
        let stream = match self.compression {
            Compression::None => Bytes::copy_from_slice(payload),
            Compression::Zstd => {
                Bytes::from(zstd::stream::encode_all(payload, ZSTD_LEVEL).map_err(CodecError::Compress)?)
            }
        };

        Ok(MemoryArtifact::new(checksum, stream, self.compression))
    }
}

/// Recover the raw payload from a received artifact stream.
pub fn decompress(stream: &[u8], compression: Compression) -> Result<Vec<u8>, CodecError> {
    match compression {
        Compression::None => Ok(stream.to_vec()),
        Compression::Zstd => zstd::stream::decode_all(stream).map_err(CodecError::Decompress),
    }
}

// ── In-memory artifact ───────────────────────────────────────────────────────

/// Artifact whose stream is held in memory.
#[derive(Debug)]
pub struct MemoryArtifact {
    checksum: Checksum,
    compression: Compression,
    size: u64,
    stream: Cursor<Bytes>,
}

impl MemoryArtifact {
    pub fn new(checksum: Checksum, stream: Bytes, compression: Compression) -> Self {
        Self {
            checksum,
            compression,
            size: stream.len() as u64,
            stream: Cursor::new(stream),
        }
    }

    /// Bytes not yet read.
    pub fn remaining(&self) -> u64 {
        self.size - self.stream.position()
    }
}

impl AsyncRead for MemoryArtifact {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl Artifact for MemoryArtifact {
    fn checksum(&self) -> Checksum {
        self.checksum
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn compression(&self) -> Compression {
        self.compression
    }

    fn close(self) {
        tracing::trace!(checksum = short_hex(&self.checksum), "artifact closed");
    }

    fn disconnect(self) {
        tracing::trace!(
            checksum = short_hex(&self.checksum),
            unread = self.remaining(),
            "artifact disconnected"
        );
    }
}
