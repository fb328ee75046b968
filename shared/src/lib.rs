//! Shared protocol definitions for the arena netcode workspace.
//!
//! Everything that must be byte-identical on both sides of the wire lives
//! here: the binary packet codec, the game-action codec with its apply
//! logic, and the protocol timing constants. This crate performs no I/O;
//! the `server` and `client` crates drive it from their network loops.

pub mod action;
pub mod packet;
pub mod wire;

use std::time::Duration;

/// Host-assigned peer identifier. Never reused within a session; 0 is invalid.
pub type ClientId = u32;
/// Host-assigned correlation key for one broadcast/ack/commit cycle.
pub type EventId = u32;
/// Host-assigned identifier for a simulation entity, identical on all peers.
pub type EntityId = u32;
/// Simulation tick counter.
pub type Tick = u32;

/// How long the host tolerates peer silence before marking it disconnected.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval at which a client probes the host, independent of other traffic.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);

/// Per-peer re-send window for an unacknowledged broadcast.
pub const ACK_RESEND_INTERVAL: Duration = Duration::from_secs(3);

/// Hard deadline after which the host abandons an unacknowledged event.
/// Must exceed [`ACK_RESEND_INTERVAL`] so at least one nudge precedes discard.
pub const PENDING_DISCARD_TIMEOUT: Duration = Duration::from_secs(10);

/// Client-side expiry for a buffered broadcast whose commit never arrived.
pub const PENDING_COMMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Handshake attempts before the client gives up on the initial connect.
pub const CONNECT_ATTEMPTS: u32 = 5;

/// Per-attempt wait for the handshake response.
pub const CONNECT_RETRY_TIMEOUT: Duration = Duration::from_secs(1);

/// Interval between reconnection requests after the host goes silent.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(2);

/// Host silence beyond this makes the client start reconnecting.
pub const HOST_SILENCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Receive buffer size; every protocol message fits a single datagram.
pub const MAX_DATAGRAM_SIZE: usize = 2048;
