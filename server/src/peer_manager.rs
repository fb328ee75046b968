//! Peer registry and liveness tracking for the host
//!
//! This module owns every remote peer record on the host side:
//! - Peer admission and id assignment on a successful handshake
//! - Heartbeat bookkeeping and timeout-based disconnection
//! - Reconnection matching against the original registered address
//! - Address-to-peer lookup for routing inbound datagrams
//!
//! Ids are allocated from a monotonically increasing counter and never
//! reused within a session, even after the peer disconnects. Disconnection
//! removes a peer from the address index but keeps its record, so a
//! reconnect request from the original address can find it again.

use log::info;
use shared::{ClientId, CLIENT_TIMEOUT};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

/// A remote participant as the host sees it.
///
/// Owned exclusively by [`PeerManager`]; created on handshake, flipped to
/// disconnected by the timeout scan, flipped back by a heartbeat or
/// reconnect from the original address.
#[derive(Debug)]
pub struct Peer {
    /// Host-assigned identifier, unique for the session, nonzero.
    pub id: ClientId,
    /// Address the peer registered from; reconnection matches against this.
    pub addr: SocketAddr,
    /// Display name from the handshake payload.
    pub name: String,
    /// Whether the peer currently counts toward commit thresholds.
    pub connected: bool,
    /// Last time any packet arrived from this peer.
    pub last_heartbeat: Instant,
}

impl Peer {
    fn new(id: ClientId, addr: SocketAddr, name: String, now: Instant) -> Self {
        Self {
            id,
            addr,
            name,
            connected: true,
            last_heartbeat: now,
        }
    }

    /// True if the peer has been silent past the liveness threshold.
    pub fn is_timed_out(&self, now: Instant) -> bool {
        now.duration_since(self.last_heartbeat) > CLIENT_TIMEOUT
    }
}

/// Tracks every peer the host has ever admitted this session.
///
/// The `by_addr` index only holds *connected* peers: it answers the hot
/// routing question "which live peer sent this datagram". Reconnection
/// deliberately bypasses the index and scans the full record table, since a
/// disconnected peer is exactly the one the index no longer knows.
pub struct PeerManager {
    peers: HashMap<ClientId, Peer>,
    by_addr: HashMap<SocketAddr, ClientId>,
    next_peer_id: ClientId,
    max_peers: usize,
}

impl PeerManager {
    /// Creates an empty registry. Ids start at 1; 0 stays invalid.
    pub fn new(max_peers: usize) -> Self {
        Self {
            peers: HashMap::new(),
            by_addr: HashMap::new(),
            next_peer_id: 1,
            max_peers,
        }
    }

    /// Admits a new peer on a first valid handshake.
    ///
    /// Returns `None` when the session is at capacity. The caller must check
    /// [`find_connected_by_addr`](Self::find_connected_by_addr) first so a
    /// duplicate request from an already-registered address re-sends the
    /// response instead of minting a second id.
    pub fn register(&mut self, addr: SocketAddr, name: String, now: Instant) -> Option<ClientId> {
        if self.connected_count() >= self.max_peers {
            return None;
        }

        let id = self.next_peer_id;
        self.next_peer_id += 1;

        info!("Peer {} ({}) connected from {}", id, name, addr);
        self.peers.insert(id, Peer::new(id, addr, name, now));
        self.by_addr.insert(addr, id);

        Some(id)
    }

    /// Looks up the connected peer registered at exactly this address.
    pub fn find_connected_by_addr(&self, addr: SocketAddr) -> Option<ClientId> {
        self.by_addr.get(&addr).copied()
    }

    /// Looks up any peer record, connected or not, by its original address.
    ///
    /// This is the reconnection path. A peer whose address changed since
    /// registration cannot be matched here; the request then falls through
    /// as a no-op.
    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<ClientId> {
        self.peers
            .values()
            .find(|peer| peer.addr == addr)
            .map(|peer| peer.id)
    }

    /// Records liveness for a peer.
    ///
    /// A heartbeat from a peer previously marked disconnected flips it back
    /// to connected and restores its address-index entry. Returns false for
    /// an unknown id.
    pub fn mark_heartbeat(&mut self, id: ClientId, now: Instant) -> bool {
        let was_disconnected = match self.peers.get_mut(&id) {
            Some(peer) => {
                peer.last_heartbeat = now;
                !peer.connected
            }
            None => return false,
        };
        if was_disconnected {
            info!("Peer {} reconnected via heartbeat", id);
            self.reconnect_peer(id, now);
        }
        true
    }

    /// Flips a peer to disconnected and drops it from the address index.
    ///
    /// The record itself stays so the id is never reallocated and a later
    /// reconnect can find it.
    pub fn mark_disconnected(&mut self, id: ClientId) -> bool {
        match self.peers.get_mut(&id) {
            Some(peer) if peer.connected => {
                peer.connected = false;
                self.by_addr.remove(&peer.addr);
                info!("Peer {} disconnected", id);
                true
            }
            _ => false,
        }
    }

    /// Re-admits a disconnected peer found at its original address.
    ///
    /// Returns the peer's original id, or `None` when no record matches the
    /// address (new peer, or a known peer whose address changed).
    pub fn reconnect(&mut self, addr: SocketAddr, now: Instant) -> Option<ClientId> {
        let id = self.find_by_addr(addr)?;
        self.reconnect_peer(id, now);
        Some(id)
    }

    fn reconnect_peer(&mut self, id: ClientId, now: Instant) {
        if let Some(peer) = self.peers.get_mut(&id) {
            peer.connected = true;
            peer.last_heartbeat = now;
            self.by_addr.insert(peer.addr, id);
        }
    }

    /// Scans all connected peers and disconnects the silent ones.
    ///
    /// Called once per host tick. Returns the ids that timed out so the
    /// engine can propagate the departure.
    pub fn check_timeouts(&mut self, now: Instant) -> Vec<ClientId> {
        let timed_out: Vec<ClientId> = self
            .peers
            .values()
            .filter(|peer| peer.connected && peer.is_timed_out(now))
            .map(|peer| peer.id)
            .collect();

        for id in &timed_out {
            self.mark_disconnected(*id);
        }

        timed_out
    }

    /// Ids and addresses of all currently-connected peers, for broadcasting.
    pub fn connected_addrs(&self) -> Vec<(ClientId, SocketAddr)> {
        self.peers
            .values()
            .filter(|peer| peer.connected)
            .map(|peer| (peer.id, peer.addr))
            .collect()
    }

    pub fn addr_of(&self, id: ClientId) -> Option<SocketAddr> {
        self.peers.get(&id).map(|peer| peer.addr)
    }

    pub fn name_of(&self, id: ClientId) -> Option<&str> {
        self.peers.get(&id).map(|peer| peer.name.as_str())
    }

    pub fn is_connected(&self, id: ClientId) -> bool {
        self.peers.get(&id).map(|p| p.connected).unwrap_or(false)
    }

    /// Number of currently-connected peers.
    pub fn connected_count(&self) -> usize {
        self.peers.values().filter(|peer| peer.connected).count()
    }

    /// Total records ever admitted this session, connected or not.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn peer_mut(&mut self, id: ClientId) -> Option<&mut Peer> {
        self.peers.get_mut(&id)
    }
}
