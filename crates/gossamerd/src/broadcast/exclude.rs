//! Exclude set — peers that already witnessed an artifact are skipped.

use gossamer_core::Checksum;
use gossamer_services::{ExcludeSet, WitnessCache};

/// Peers to leave out of the broadcast of `checksum`.
///
/// Empty when the witness cache has no entry for it.
pub fn exclude_set(witnesses: &WitnessCache, checksum: &Checksum) -> ExcludeSet {
    witnesses
        .get(checksum)
        .map(|peers| peers.into_iter().collect())
        .unwrap_or_default()
}
