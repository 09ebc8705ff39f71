//! Artifact broadcast — the outbound data plane.
//!
//! Payloads queued for broadcast are turned into artifacts by the send
//! worker and pushed, one artifact at a time, through the broadcast
//! pipeline to every connected peer that has not witnessed them yet.

pub mod exclude;
pub mod pipeline;
pub mod send_worker;

pub use pipeline::{BroadcastPipeline, BroadcastSettings};
pub use send_worker::{send_queue, SendQueue, SendQueueError, SendWorker, Shutdown};
