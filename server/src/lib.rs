//! # Arena Host Library
//!
//! Authoritative host for the lockstep netcode. The host admits peers,
//! monitors their liveness, and is the single authority for event ids,
//! entity ids and commit decisions. Every discrete game action, including
//! the host's own, runs through the broadcast/ack/commit cycle so that all
//! participants apply the same actions with the same identifiers.
//!
//! ## Module Organization
//!
//! ### Peer Manager Module (`peer_manager`)
//! Peer admission, id assignment, heartbeat bookkeeping, timeout-based
//! disconnection and reconnection matching. Ids are never reused within a
//! session.
//!
//! ### Lockstep Module (`lockstep`)
//! The consensus core: assigns event ids, tracks acknowledgement sets per
//! pending action, re-sends broadcasts to lagging peers, discards events
//! that miss the acknowledgement deadline, and mints entity ids at commit
//! time.
//!
//! ### Network Module (`network`)
//! The UDP engine: receiver and sender tasks around a single logic loop
//! that routes packets, drives the periodic tick (liveness scan, lockstep
//! sweep, tick sync) and surfaces committed actions as game effects.
//!
//! ## Concurrency Model
//!
//! All protocol state is owned by the main loop; the receiver and sender
//! tasks only move packets across channels. Nothing in this crate is fatal
//! to the process: malformed packets, unknown peers and stale protocol
//! messages are logged and dropped.

pub mod lockstep;
pub mod network;
pub mod peer_manager;
