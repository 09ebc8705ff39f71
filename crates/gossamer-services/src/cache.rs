//! Checksum-keyed caches shared by the receive and broadcast paths.
//!
//! Both are bounded LRUs: once full, the least recently touched checksum is
//! forgotten. Losing an entry only means a peer may be sent an artifact it
//! already has, or an artifact may be broadcast twice.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use gossamer_core::{Checksum, PeerId};

/// Peers known to already hold an artifact, keyed by checksum.
#[derive(Clone)]
pub struct WitnessCache {
    inner: Arc<Mutex<LruCache<Checksum, Vec<PeerId>>>>,
}

impl WitnessCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Record that `peer` holds the artifact. Idempotent per peer.
    pub fn add(&self, checksum: Checksum, peer: PeerId) {
        let mut cache = self.inner.lock();
        match cache.get_mut(&checksum) {
            Some(witnesses) => {
                if !witnesses.contains(&peer) {
                    witnesses.push(peer);
                }
            }
            None => {
                cache.put(checksum, vec![peer]);
            }
        }
    }

    /// Witnesses for a checksum, in the order they were recorded.
    pub fn get(&self, checksum: &Checksum) -> Option<Vec<PeerId>> {
        self.inner.lock().get(checksum).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Artifacts this node recently broadcast, with their sizes.
#[derive(Clone)]
pub struct ArtifactCache {
    inner: Arc<Mutex<LruCache<Checksum, u64>>>,
}

impl ArtifactCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Insert or refresh an entry.
    pub fn add(&self, checksum: Checksum, size: u64) {
        self.inner.lock().put(checksum, size);
    }

    pub fn get(&self, checksum: &Checksum) -> Option<u64> {
        self.inner.lock().get(checksum).copied()
    }

    pub fn contains(&self, checksum: &Checksum) -> bool {
        self.inner.lock().contains(checksum)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
