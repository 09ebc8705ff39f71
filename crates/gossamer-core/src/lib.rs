//! gossamer-core — shared types, wire format, artifacts, and configuration.
//! All other Gossamer crates depend on this one.

pub mod artifact;
pub mod config;
pub mod crypto;
pub mod wire;

pub use artifact::{Artifact, ArtifactCodec, CodecError, Compression, MemoryArtifact};
pub use wire::{ArtifactMetadata, Checksum, ChunkPlan, PeerId, METADATA_LEN};
