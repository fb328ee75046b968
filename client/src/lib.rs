//! # Arena Client Library
//!
//! Client-side half of the lockstep netcode: connects to an authoritative
//! host, buffers broadcast game actions, acknowledges them, and applies
//! them only once the host commits. Committed actions surface as
//! [`shared::action::GameEffect`] values for the simulation layer.
//!
//! ## Module Organization
//!
//! ### Lockstep Module (`lockstep`)
//! The receiving side of the broadcast/ack/commit cycle:
//! - Buffers actions keyed by host-assigned event id
//! - Applies them with the commit-time minted entity id
//! - Expires entries whose commit never arrives
//!
//! ### Network Module (`network`)
//! Connection management and the main client loop:
//! - Bounded-retry connection handshake
//! - Periodic heartbeat probe so the host can measure our silence
//! - Host-silence detection and background reconnection
//! - Packet routing into the lockstep receiver
//!
//! ## Reliability Model
//!
//! The client never retries protocol messages on its own; the host's
//! re-send sweep is the only retry mechanism. Losing a broadcast just means
//! the host nudges us again; losing an ack means we see a duplicate
//! broadcast and re-acknowledge.

pub mod lockstep;
pub mod network;
