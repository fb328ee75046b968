//! Lockstep event dissemination: broadcast, acknowledge, commit
//!
//! The host is the only party that assigns event ids and declares commits.
//! An action submitted here (whether originated by a client or by the host
//! itself) is broadcast to every connected peer, parked as pending, and
//! finalized only once every peer that was connected at broadcast time has
//! acknowledged it. Entity ids for spawning actions are minted at commit
//! time, so the id a peer uses to create the entity is identical everywhere.
//!
//! Nobody applies an action before its commit, the host included.
//!
//! Commit order follows acknowledgement completion, not submission order:
//! two concurrently pending events may finalize swapped if the later one's
//! acks land first.

use log::{debug, info, warn};
use shared::action::GameAction;
use shared::packet::Packet;
use shared::{
    ClientId, EntityId, EventId, ACK_RESEND_INTERVAL, PENDING_DISCARD_TIMEOUT,
};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;

/// An action broadcast but not yet fully acknowledged.
#[derive(Debug)]
pub struct PendingAction {
    pub action: GameAction,
    /// Peers connected at broadcast time; later joiners never enter this set.
    pub required: HashSet<ClientId>,
    /// Peers that have acknowledged so far.
    pub acks: HashSet<ClientId>,
    /// Original broadcast time; the discard deadline runs from here.
    pub broadcast_at: Instant,
    /// Per-peer last send time, advanced by the nudge re-send.
    pub last_sent: HashMap<ClientId, Instant>,
}

impl PendingAction {
    /// True once every required peer that is still connected has acked.
    ///
    /// Peers that disconnected while the event was pending stop gating it;
    /// their silence is already accounted for by the liveness scan.
    fn is_fully_acked(&self, connected: &HashSet<ClientId>) -> bool {
        self.required
            .iter()
            .filter(|id| connected.contains(id))
            .all(|id| self.acks.contains(id))
    }
}

/// A finalized event, ready for local application and dissemination.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    pub event: EventId,
    pub action: GameAction,
    /// Minted entity id for spawning actions; 0 when the kind spawns nothing.
    pub entity: EntityId,
}

/// Host-side consensus driver for discrete game actions.
///
/// Owns both monotonic counters (event ids and entity ids) and the pending
/// table. Outbound packets go through the engine's send channel; this type
/// never touches a socket, which keeps it drivable from plain unit tests.
pub struct EventBroadcaster {
    pending: HashMap<EventId, PendingAction>,
    next_event_id: EventId,
    next_entity_id: EntityId,
    outgoing: mpsc::UnboundedSender<(Packet, SocketAddr)>,
}

impl EventBroadcaster {
    /// Both counters start at 1; 0 stays the "no entity" sentinel.
    pub fn new(outgoing: mpsc::UnboundedSender<(Packet, SocketAddr)>) -> Self {
        Self {
            pending: HashMap::new(),
            next_event_id: 1,
            next_entity_id: 1,
            outgoing,
        }
    }

    fn send(&self, packet: Packet, addr: SocketAddr) {
        // Receiver half lives in the sender task; a send only fails during
        // shutdown, when dropping the packet is the right outcome anyway.
        let _ = self.outgoing.send((packet, addr));
    }

    /// Accepts an action, broadcasts it, and parks it as pending.
    ///
    /// The action is not applied here; even a host-originated action waits
    /// for its commit. Returns the assigned event id.
    pub fn submit(
        &mut self,
        action: GameAction,
        peers: &[(ClientId, SocketAddr)],
        now: Instant,
    ) -> EventId {
        let event = self.next_event_id;
        self.next_event_id += 1;

        let packet = Packet::BroadcastEvent {
            event,
            action: action.clone(),
        };
        for (_, addr) in peers {
            self.send(packet.clone(), *addr);
        }

        let required: HashSet<ClientId> = peers.iter().map(|(id, _)| *id).collect();
        let last_sent = peers.iter().map(|(id, _)| (*id, now)).collect();
        debug!(
            "Broadcast event {} ({:?}) awaiting {} ack(s)",
            event,
            action.kind(),
            required.len()
        );
        self.pending.insert(
            event,
            PendingAction {
                action,
                required,
                acks: HashSet::new(),
                broadcast_at: now,
                last_sent,
            },
        );

        event
    }

    /// Records a peer's acknowledgement.
    ///
    /// Idempotent per peer. Acks for unknown event ids (already committed,
    /// already discarded, or never broadcast) are logged and ignored. When
    /// this ack completes the set, the event commits immediately and the
    /// commit is returned for local application.
    pub fn on_ack(
        &mut self,
        peer: ClientId,
        event: EventId,
        peers: &[(ClientId, SocketAddr)],
    ) -> Option<Commit> {
        let pending = match self.pending.get_mut(&event) {
            Some(pending) => pending,
            None => {
                debug!("Ack from peer {} for unknown event {}, ignoring", peer, event);
                return None;
            }
        };

        if !pending.acks.insert(peer) {
            debug!("Duplicate ack from peer {} for event {}", peer, event);
        }

        let connected: HashSet<ClientId> = peers.iter().map(|(id, _)| *id).collect();
        if self.pending[&event].is_fully_acked(&connected) {
            return self.commit(event, peers);
        }
        None
    }

    /// Periodic maintenance, run once per host tick.
    ///
    /// In order: finalize events whose remaining required peers all
    /// disconnected since the last ack, discard events past the hard
    /// deadline, and re-send broadcasts individually to lagging peers.
    /// Returns the commits produced by the recheck.
    pub fn sweep(&mut self, peers: &[(ClientId, SocketAddr)], now: Instant) -> Vec<Commit> {
        let connected: HashSet<ClientId> = peers.iter().map(|(id, _)| *id).collect();

        let ready: Vec<EventId> = self
            .pending
            .iter()
            .filter(|(_, p)| p.is_fully_acked(&connected))
            .map(|(event, _)| *event)
            .collect();
        let mut commits = Vec::new();
        for event in ready {
            commits.extend(self.commit(event, peers));
        }

        let expired: Vec<EventId> = self
            .pending
            .iter()
            .filter(|(_, p)| now.duration_since(p.broadcast_at) > PENDING_DISCARD_TIMEOUT)
            .map(|(event, _)| *event)
            .collect();
        for event in expired {
            if let Some(pending) = self.pending.remove(&event) {
                warn!(
                    "Discarding event {} after {:?} without full acknowledgement ({}/{} acks)",
                    event,
                    PENDING_DISCARD_TIMEOUT,
                    pending.acks.len(),
                    pending.required.len()
                );
            }
        }

        self.nudge(peers, now);
        commits
    }

    /// Re-sends a pending broadcast to each connected required peer whose
    /// last send is older than the ack window.
    fn nudge(&mut self, peers: &[(ClientId, SocketAddr)], now: Instant) {
        let mut resends: Vec<(Packet, SocketAddr)> = Vec::new();

        for (event, pending) in self.pending.iter_mut() {
            for (id, addr) in peers {
                if !pending.required.contains(id) || pending.acks.contains(id) {
                    continue;
                }
                let stale = pending
                    .last_sent
                    .get(id)
                    .map(|sent| now.duration_since(*sent) >= ACK_RESEND_INTERVAL)
                    .unwrap_or(true);
                if stale {
                    debug!("Re-sending event {} to lagging peer {}", event, id);
                    resends.push((
                        Packet::BroadcastEvent {
                            event: *event,
                            action: pending.action.clone(),
                        },
                        *addr,
                    ));
                    pending.last_sent.insert(*id, now);
                }
            }
        }

        for (packet, addr) in resends {
            self.send(packet, addr);
        }
    }

    /// Finalizes one event: mints the entity id if the kind spawns one,
    /// sends COMMIT_EVENT to every connected peer, and removes the pending
    /// entry. The caller applies the returned commit locally.
    fn commit(&mut self, event: EventId, peers: &[(ClientId, SocketAddr)]) -> Option<Commit> {
        let pending = self.pending.remove(&event)?;

        let entity = if pending.action.spawns_entity() {
            let id = self.next_entity_id;
            self.next_entity_id += 1;
            id
        } else {
            0
        };

        let packet = Packet::CommitEvent { event, entity };
        for (_, addr) in peers {
            self.send(packet.clone(), *addr);
        }
        info!(
            "Committed event {} ({} ack(s), entity {})",
            event,
            pending.acks.len(),
            entity
        );

        Some(Commit {
            event,
            action: pending.action,
            entity,
        })
    }

    /// Number of events still awaiting acknowledgement.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Acknowledgement count for a pending event, if still pending.
    pub fn ack_count(&self, event: EventId) -> Option<usize> {
        self.pending.get(&event).map(|p| p.acks.len())
    }
}
