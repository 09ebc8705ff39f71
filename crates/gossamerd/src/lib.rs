//! gossamerd — Gossamer peer-to-peer broadcast daemon.
//!
//! The library half holds the broadcast path and the inbound listener so
//! integration tests can drive them in-process; `main.rs` wires them to a
//! config, a TCP port, and stdin.

pub mod broadcast;
pub mod listener;
