//! Client side of the lockstep cycle: buffer, acknowledge, apply on commit
//!
//! A broadcast action is parked here until the host's commit arrives; only
//! the commit carries the minted entity id, so applying earlier would
//! desync. The receiver never retries anything itself: the host's re-send
//! sweep is the sole retry mechanism, and this side just answers every
//! broadcast with an ack.
//!
//! The host may abandon an event it never got fully acknowledged, in which
//! case the buffered entry would sit here forever. Entries older than
//! [`PENDING_COMMIT_TIMEOUT`] are therefore dropped by the housekeeping
//! sweep.

use log::{debug, warn};
use shared::action::{GameAction, GameEffect};
use shared::{EntityId, EventId, PENDING_COMMIT_TIMEOUT};
use std::collections::HashMap;
use std::time::Instant;

/// A broadcast action awaiting its commit.
#[derive(Debug)]
pub struct PendingEvent {
    pub action: GameAction,
    pub received_at: Instant,
}

/// Buffers broadcast actions keyed by event id.
#[derive(Debug, Default)]
pub struct EventReceiver {
    pending: HashMap<EventId, PendingEvent>,
}

impl EventReceiver {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// Stores a broadcast action. Returns false for a duplicate event id.
    ///
    /// The caller acknowledges in both cases; a duplicate usually means our
    /// previous ack was lost and the host nudged us again.
    pub fn on_broadcast(&mut self, event: EventId, action: GameAction, now: Instant) -> bool {
        if self.pending.contains_key(&event) {
            warn!("Duplicate broadcast for event {}, re-acknowledging", event);
            return false;
        }
        self.pending.insert(
            event,
            PendingEvent {
                action,
                received_at: now,
            },
        );
        true
    }

    /// Finalizes a buffered action with the host-minted entity id.
    ///
    /// A commit for an event we never buffered is a protocol violation
    /// (logged, dropped); it cannot be applied without the payload.
    pub fn on_commit(&mut self, event: EventId, entity: EntityId) -> Option<GameEffect> {
        match self.pending.remove(&event) {
            Some(pending) => {
                debug!("Applying committed event {} (entity {})", event, entity);
                Some(pending.action.apply(entity))
            }
            None => {
                warn!("Commit for unknown event {}, dropping", event);
                None
            }
        }
    }

    /// Drops buffered actions whose commit never arrived.
    pub fn expire_stale(&mut self, now: Instant) -> Vec<EventId> {
        let expired: Vec<EventId> = self
            .pending
            .iter()
            .filter(|(_, p)| now.duration_since(p.received_at) > PENDING_COMMIT_TIMEOUT)
            .map(|(event, _)| *event)
            .collect();
        for event in &expired {
            warn!("Expiring event {} with no commit after {:?}", event, PENDING_COMMIT_TIMEOUT);
            self.pending.remove(event);
        }
        expired
    }

    /// Number of actions still awaiting a commit.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fire_action() -> GameAction {
        GameAction::FireBullet {
            shooter: 7,
            position: (1.0, 2.0),
            rotation: 0.5,
        }
    }

    #[test]
    fn test_broadcast_buffers_until_commit() {
        let mut receiver = EventReceiver::new();
        let now = Instant::now();

        assert!(receiver.on_broadcast(1, fire_action(), now));
        assert_eq!(receiver.pending_len(), 1);

        let effect = receiver.on_commit(1, 42).unwrap();
        match effect {
            GameEffect::SpawnBullet {
                entity,
                shooter,
                position,
                rotation,
            } => {
                assert_eq!(entity, 42);
                assert_eq!(shooter, 7);
                assert_eq!(position, (1.0, 2.0));
                assert_eq!(rotation, 0.5);
            }
            other => panic!("wrong effect: {:?}", other),
        }
        assert_eq!(receiver.pending_len(), 0);
    }

    #[test]
    fn test_duplicate_broadcast_detected() {
        let mut receiver = EventReceiver::new();
        let now = Instant::now();

        assert!(receiver.on_broadcast(1, fire_action(), now));
        assert!(!receiver.on_broadcast(1, fire_action(), now));
        assert_eq!(receiver.pending_len(), 1);
    }

    #[test]
    fn test_commit_without_broadcast_dropped() {
        let mut receiver = EventReceiver::new();
        assert!(receiver.on_commit(5, 1).is_none());
    }

    #[test]
    fn test_commit_consumes_entry_once() {
        let mut receiver = EventReceiver::new();
        receiver.on_broadcast(1, fire_action(), Instant::now());

        assert!(receiver.on_commit(1, 42).is_some());
        assert!(receiver.on_commit(1, 42).is_none());
    }

    #[test]
    fn test_stale_entries_expire() {
        let mut receiver = EventReceiver::new();
        let now = Instant::now();
        receiver.on_broadcast(1, fire_action(), now);
        receiver.on_broadcast(2, GameAction::StartSession, now + Duration::from_secs(5));

        let later = now + PENDING_COMMIT_TIMEOUT + Duration::from_secs(1);
        let expired = receiver.expire_stale(later);
        assert_eq!(expired, vec![1]);
        assert_eq!(receiver.pending_len(), 1);

        // The expired event's commit is now a protocol-violation drop.
        assert!(receiver.on_commit(1, 42).is_none());
    }
}
