//! gossamer-services — the collaborators the broadcast path runs against:
//! the peer stream store and the checksum caches.

pub mod cache;
pub mod stream_store;

pub use cache::{ArtifactCache, WitnessCache};
pub use stream_store::{ExcludeSet, PeerWriter, PendingResult, SendError, StreamStore};
