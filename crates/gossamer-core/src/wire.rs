//! Gossamer wire format — what one artifact broadcast looks like on a stream.
//!
//! A broadcast is a fixed-size metadata unit followed by the artifact's bytes
//! split into `chunk_size` slices. Data chunks carry no framing of their own;
//! the receiver recovers the boundaries from the size and chunk size in the
//! metadata.
//!
//! `ArtifactMetadata` is `#[repr(C, packed)]` and uses zerocopy derives, same
//! as every other fixed-layout unit on the wire. Integers are host-endian;
//! every supported target is little-endian.

use std::num::NonZeroU32;

use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::artifact::Compression;

/// BLAKE3 hash of an artifact's uncompressed payload.
pub type Checksum = [u8; 32];

/// Stable identifier of a connected peer.
pub type PeerId = [u8; 32];

/// Current metadata version. Receivers drop anything else.
pub const METADATA_VERSION: u8 = 0x01;

/// Flag bit: the artifact stream is zstd-compressed.
pub const FLAG_ZSTD: u8 = 0x01;

/// Length of the metadata unit on the wire.
pub const METADATA_LEN: usize = std::mem::size_of::<ArtifactMetadata>();

// ── Artifact Metadata ────────────────────────────────────────────────────────

/// Logical chunk 0 of every broadcast.
///
/// Wire size: 48 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct ArtifactMetadata {
    /// BLAKE3 hash of the uncompressed payload.
    pub checksum: Checksum,

    /// Number of artifact bytes that follow the metadata.
    pub size: u64,

    /// Bytes per data chunk. The last chunk may be shorter.
    pub chunk_size: u32,

    /// Bit flags:
    ///   bit    0: stream is zstd-compressed
    ///   bits 1-7: reserved, must be zero
    pub flags: u8,

    /// Wire format version. Currently 0x01.
    pub version: u8,

    /// Reserved, must be zero.
    pub reserved: [u8; 2],
}

assert_eq_size!(ArtifactMetadata, [u8; 48]);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("metadata must be {METADATA_LEN} bytes, got {0}")]
    Length(usize),
    #[error("unsupported metadata version {0:#04x}")]
    Version(u8),
    #[error("reserved metadata bits are set")]
    Reserved,
    #[error("metadata declares a zero chunk size")]
    ZeroChunkSize,
}

impl ArtifactMetadata {
    pub fn new(checksum: Checksum, size: u64, chunk_size: NonZeroU32, compression: Compression) -> Self {
        let flags = match compression {
            Compression::None => 0,
            Compression::Zstd => FLAG_ZSTD,
        };
        Self {
            checksum,
            size,
            chunk_size: chunk_size.get(),
            flags,
            version: METADATA_VERSION,
            reserved: [0; 2],
        }
    }

    /// The exact bytes sent as chunk 0.
    pub fn encode(&self) -> [u8; METADATA_LEN] {
        let mut out = [0u8; METADATA_LEN];
        out.copy_from_slice(self.as_bytes());
        out
    }

    /// Parse and validate a received metadata unit.
    pub fn decode(bytes: &[u8]) -> Result<Self, MetadataError> {
        let meta = Self::read_from(bytes).ok_or(MetadataError::Length(bytes.len()))?;
        if meta.version != METADATA_VERSION {
            return Err(MetadataError::Version(meta.version));
        }
        if meta.flags & !FLAG_ZSTD != 0 || meta.reserved != [0; 2] {
            return Err(MetadataError::Reserved);
        }
        if { meta.chunk_size } == 0 {
            return Err(MetadataError::ZeroChunkSize);
        }
        Ok(meta)
    }

    pub fn compression(&self) -> Compression {
        if self.flags & FLAG_ZSTD != 0 {
            Compression::Zstd
        } else {
            Compression::None
        }
    }
}

// ── Chunk Plan ───────────────────────────────────────────────────────────────

/// How an artifact of `size` bytes is split for transmission.
///
/// Index 0 is always the metadata unit; indices `1..total_chunks()` are the
/// data chunks in stream order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    size: u64,
    chunk_size: NonZeroU32,
}

impl ChunkPlan {
    pub fn new(size: u64, chunk_size: NonZeroU32) -> Self {
        Self { size, chunk_size }
    }

    /// Rebuild the sender's plan from received metadata.
    pub fn from_metadata(meta: &ArtifactMetadata) -> Option<Self> {
        let chunk_size = NonZeroU32::new(meta.chunk_size)?;
        Some(Self::new(meta.size, chunk_size))
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// `ceil(size / chunk_size)`.
    pub fn data_chunks(&self) -> u64 {
        self.size.div_ceil(u64::from(self.chunk_size.get()))
    }

    /// Data chunks plus the metadata unit.
    pub fn total_chunks(&self) -> u64 {
        self.data_chunks() + 1
    }

    /// Wire length of chunk `index`, or `None` past the end of the plan.
    pub fn chunk_len(&self, index: u64) -> Option<usize> {
        if index == 0 {
            return Some(METADATA_LEN);
        }
        if index >= self.total_chunks() {
            return None;
        }
        let chunk_size = u64::from(self.chunk_size.get());
        let offset = (index - 1) * chunk_size;
        Some((self.size - offset).min(chunk_size) as usize)
    }
}
