//! Integration tests for the lockstep netcode
//!
//! These tests run a real host and real clients over loopback UDP and
//! validate the full broadcast/ack/commit cycle across processes' worth of
//! protocol state in one test binary.

use client::network::Client;
use server::network::Server;
use shared::action::{GameAction, GameEffect};
use shared::packet::Packet;
use shared::{EntityId, MAX_DATAGRAM_SIZE};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::timeout;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Starts a host on an ephemeral port and returns its address, its action
/// handle and its effect stream.
async fn start_host() -> (
    SocketAddr,
    mpsc::UnboundedSender<GameAction>,
    mpsc::UnboundedReceiver<GameEffect>,
) {
    let mut server = Server::new("127.0.0.1:0", Duration::from_millis(20), 16)
        .await
        .expect("failed to bind host");
    let addr = server.local_addr().unwrap();
    let actions = server.action_sender();
    let effects = server.effect_receiver().unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    (addr, actions, effects)
}

/// Connects a real client engine, spawns its loop, and returns its effects.
async fn start_client(host: SocketAddr, name: &str) -> mpsc::UnboundedReceiver<GameEffect> {
    let mut client = Client::new(&host.to_string(), name)
        .await
        .expect("failed to create client");
    assert!(
        client.connect().await.expect("handshake error"),
        "client {} failed to connect",
        name
    );
    let effects = client.effect_receiver().unwrap();
    tokio::spawn(async move {
        let _ = client.run().await;
    });
    effects
}

/// Waits for the first effect matching the predicate, skipping the rest.
async fn next_effect<F>(rx: &mut mpsc::UnboundedReceiver<GameEffect>, mut pred: F) -> GameEffect
where
    F: FnMut(&GameEffect) -> bool,
{
    timeout(TEST_TIMEOUT, async {
        loop {
            let effect = rx.recv().await.expect("effect stream closed");
            if pred(&effect) {
                return effect;
            }
        }
    })
    .await
    .expect("timed out waiting for effect")
}

/// PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Packets survive a real UDP hop bit-for-bit.
    #[tokio::test]
    async fn packet_roundtrip_over_loopback() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dest = receiver.local_addr().unwrap();

        let packet = Packet::BroadcastEvent {
            event: 42,
            action: GameAction::FireBullet {
                shooter: 7,
                position: (-1.25, 3.5),
                rotation: -0.5,
            },
        };
        sender.send_to(&packet.encode(), dest).await.unwrap();

        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
        let (len, _) = timeout(TEST_TIMEOUT, receiver.recv_from(&mut buffer))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(Packet::decode(&buffer[..len]).unwrap(), packet);
    }
}

/// UNRELIABLE STATE PATH TESTS
mod state_sync_tests {
    use super::*;

    /// A state sample from one client is relayed to every other peer,
    /// bit-for-bit, with no acknowledgement cycle involved.
    #[tokio::test]
    async fn state_update_relayed_to_other_clients() {
        let (host_addr, _actions, _host_effects) = start_host().await;

        // The sender's loop never runs; state samples need no commit cycle.
        let mut sender = Client::new(&host_addr.to_string(), "sender")
            .await
            .expect("failed to create sender");
        assert!(sender.connect().await.expect("handshake error"));

        let mut watcher_fx = start_client(host_addr, "watcher").await;

        sender
            .send_state(9, (3.5, -4.25), 1.0, (0.5, 0.25))
            .await
            .unwrap();

        let effect = next_effect(&mut watcher_fx, |e| {
            matches!(e, GameEffect::StateUpdate { .. })
        })
        .await;
        match effect {
            GameEffect::StateUpdate {
                entity,
                position,
                rotation,
                velocity,
                ..
            } => {
                assert_eq!(entity, 9);
                assert_eq!(position.0.to_bits(), 3.5_f32.to_bits());
                assert_eq!(position.1.to_bits(), (-4.25_f32).to_bits());
                assert_eq!(rotation.to_bits(), 1.0_f32.to_bits());
                assert_eq!(velocity.0.to_bits(), 0.5_f32.to_bits());
                assert_eq!(velocity.1.to_bits(), 0.25_f32.to_bits());
            }
            other => panic!("expected a state update, got {:?}", other),
        }
    }
}

/// LOCKSTEP END-TO-END TESTS
mod lockstep_tests {
    use super::*;

    /// Host-originated fire action reaches both clients with one identical
    /// minted entity id and bit-identical floats.
    #[tokio::test]
    async fn host_action_commits_on_every_client() {
        let (host_addr, actions, _host_effects) = start_host().await;
        let mut fx1 = start_client(host_addr, "one").await;
        let mut fx2 = start_client(host_addr, "two").await;

        // Both joins must finish committing before the interesting part.
        next_effect(&mut fx1, |e| matches!(e, GameEffect::SpawnShip { client: 2, .. })).await;
        next_effect(&mut fx2, |e| matches!(e, GameEffect::SpawnShip { client: 2, .. })).await;

        actions
            .send(GameAction::FireBullet {
                shooter: 7,
                position: (1.0, 2.0),
                rotation: 0.5,
            })
            .unwrap();

        let bullet1 = next_effect(&mut fx1, |e| matches!(e, GameEffect::SpawnBullet { .. })).await;
        let bullet2 = next_effect(&mut fx2, |e| matches!(e, GameEffect::SpawnBullet { .. })).await;

        assert_eq!(bullet1, bullet2);
        match bullet1 {
            GameEffect::SpawnBullet {
                entity,
                shooter,
                position,
                rotation,
            } => {
                assert!(entity > 0);
                assert_eq!(shooter, 7);
                assert_eq!(position.0.to_bits(), 1.0_f32.to_bits());
                assert_eq!(position.1.to_bits(), 2.0_f32.to_bits());
                assert_eq!(rotation.to_bits(), 0.5_f32.to_bits());
            }
            other => panic!("expected bullet spawn, got {:?}", other),
        }
    }

    /// The host itself applies committed actions through the same cycle.
    #[tokio::test]
    async fn host_applies_its_own_commits() {
        let (host_addr, actions, mut host_effects) = start_host().await;
        let _fx = start_client(host_addr, "one").await;

        actions
            .send(GameAction::SpawnObstacle {
                position: (10.25, -42.5),
                scale: (1.5, 1.5),
                velocity: (-0.75, 3.25),
            })
            .unwrap();

        let effect = next_effect(&mut host_effects, |e| {
            matches!(e, GameEffect::SpawnObstacle { .. })
        })
        .await;
        match effect {
            GameEffect::SpawnObstacle { entity, .. } => assert!(entity > 0),
            other => panic!("expected obstacle spawn, got {:?}", other),
        }
    }

    /// A client-submitted action is routed through the host, broadcast, and
    /// committed with a host-minted event id.
    #[tokio::test]
    async fn client_submission_routes_through_host() {
        let (host_addr, _actions, _host_effects) = start_host().await;

        let mut peer = raw_peer::RawPeer::connect(host_addr, "raw").await;
        // Finish our own join so later required sets are clean.
        peer.ack_until_commit().await;

        peer.send(&Packet::GameEvent {
            action: GameAction::FireBullet {
                shooter: 3,
                position: (5.0, -6.0),
                rotation: 1.25,
            },
        })
        .await;

        let (event, entity, action) = peer.ack_until_commit().await;
        assert!(event > 0);
        assert!(entity > 0, "fire action must mint an entity id");
        match action {
            GameAction::FireBullet {
                shooter, position, ..
            } => {
                assert_eq!(shooter, 3);
                assert_eq!(position.0.to_bits(), 5.0_f32.to_bits());
            }
            other => panic!("expected the fire action back, got {:?}", other),
        }
    }

    /// Actions that spawn nothing commit with the zero entity sentinel.
    #[tokio::test]
    async fn non_spawning_action_commits_without_entity() {
        let (host_addr, _actions, _host_effects) = start_host().await;

        let mut peer = raw_peer::RawPeer::connect(host_addr, "raw").await;
        peer.ack_until_commit().await;

        peer.send(&Packet::GameEvent {
            action: GameAction::StartSession,
        })
        .await;

        let (_, entity, action) = peer.ack_until_commit().await;
        assert_eq!(entity, 0);
        assert_eq!(action, GameAction::StartSession);
    }
}

/// A protocol-level peer speaking raw datagrams, for tests that need to
/// control acknowledgement timing themselves.
mod raw_peer {
    use super::*;
    use shared::EventId;
    use std::collections::HashMap;

    pub struct RawPeer {
        socket: UdpSocket,
        host: SocketAddr,
        buffered: HashMap<EventId, GameAction>,
    }

    impl RawPeer {
        pub async fn connect(host: SocketAddr, name: &str) -> RawPeer {
            let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            let peer = RawPeer {
                socket,
                host,
                buffered: HashMap::new(),
            };
            peer.send(&Packet::ConnectRequest {
                name: name.to_string(),
            })
            .await;
            loop {
                if let Packet::ConnectResponse = peer.recv().await {
                    return peer;
                }
            }
        }

        pub async fn send(&self, packet: &Packet) {
            self.socket
                .send_to(&packet.encode(), self.host)
                .await
                .expect("send failed");
        }

        pub async fn recv(&self) -> Packet {
            let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
            let (len, _) = timeout(TEST_TIMEOUT, self.socket.recv_from(&mut buffer))
                .await
                .expect("timed out waiting for host packet")
                .expect("recv failed");
            Packet::decode(&buffer[..len]).expect("malformed packet from host")
        }

        /// Acknowledges every broadcast until a commit arrives; returns the
        /// committed event, its minted entity id and the buffered action.
        pub async fn ack_until_commit(&mut self) -> (EventId, EntityId, GameAction) {
            loop {
                match self.recv().await {
                    Packet::BroadcastEvent { event, action } => {
                        self.buffered.insert(event, action);
                        self.send(&Packet::AckEvent { event }).await;
                    }
                    Packet::CommitEvent { event, entity } => {
                        let action = self
                            .buffered
                            .remove(&event)
                            .expect("commit for an event we never buffered");
                        return (event, entity, action);
                    }
                    _ => {} // tick syncs and friends
                }
            }
        }
    }
}
