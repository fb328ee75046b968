//! Host network engine: UDP loop, packet routing and tick coordination
//!
//! One logical loop owns all protocol state. A receiver task decodes
//! datagrams and forwards them over a channel; a sender task drains the
//! outbound queue; the main loop routes packets into the peer registry and
//! the lockstep broadcaster, and runs the periodic tick (liveness scan,
//! lockstep sweep, tick sync). Committed actions surface as [`GameEffect`]s
//! on a channel for the simulation layer.

use crate::lockstep::{Commit, EventBroadcaster};
use crate::peer_manager::PeerManager;
use log::{debug, error, info, warn};
use shared::action::{GameAction, GameEffect};
use shared::packet::Packet;
use shared::{Tick, MAX_DATAGRAM_SIZE};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::interval;

/// Messages sent from the receiver task to the main loop.
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// The authoritative host endpoint.
pub struct Server {
    socket: Arc<UdpSocket>,
    peers: PeerManager,
    lockstep: EventBroadcaster,
    tick: Tick,
    tick_duration: Duration,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    net_tx: mpsc::UnboundedSender<(Packet, SocketAddr)>,
    net_rx: Option<mpsc::UnboundedReceiver<(Packet, SocketAddr)>>,
    action_tx: mpsc::UnboundedSender<GameAction>,
    action_rx: mpsc::UnboundedReceiver<GameAction>,
    effect_tx: mpsc::UnboundedSender<GameEffect>,
    effect_rx: Option<mpsc::UnboundedReceiver<GameEffect>>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        max_peers: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Host listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (net_tx, net_rx) = mpsc::unbounded_channel();
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let (effect_tx, effect_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            peers: PeerManager::new(max_peers),
            lockstep: EventBroadcaster::new(net_tx.clone()),
            tick: 0,
            tick_duration,
            server_tx,
            server_rx,
            net_tx,
            net_rx: Some(net_rx),
            action_tx,
            action_rx,
            effect_tx,
            effect_rx: Some(effect_rx),
        })
    }

    /// Address the host actually bound (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Handle for submitting host-originated actions into the lockstep cycle.
    pub fn action_sender(&self) -> mpsc::UnboundedSender<GameAction> {
        self.action_tx.clone()
    }

    /// Takes the committed-effect stream. The simulation layer drains this;
    /// if it is never taken, the engine discards effects each tick.
    pub fn effect_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<GameEffect>> {
        self.effect_rx.take()
    }

    /// Spawns the task that decodes and forwards inbound datagrams.
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match Packet::decode(&buffer[..len]) {
                        Ok(packet) => {
                            if server_tx
                                .send(ServerMessage::PacketReceived { packet, addr })
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(e) => warn!("Dropping malformed packet from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns the task that encodes and transmits the outbound queue.
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut net_rx = match self.net_rx.take() {
            Some(rx) => rx,
            None => return,
        };

        tokio::spawn(async move {
            while let Some((packet, addr)) = net_rx.recv().await {
                if let Err(e) = socket.send_to(&packet.encode(), addr).await {
                    error!("Failed to send packet to {}: {}", addr, e);
                }
            }
        });
    }

    fn send(&self, packet: Packet, addr: SocketAddr) {
        let _ = self.net_tx.send((packet, addr));
    }

    fn push_effect(&self, effect: GameEffect) {
        let _ = self.effect_tx.send(effect);
    }

    /// Submits a host-originated action into the broadcast/ack/commit cycle.
    ///
    /// The host's own actions take the same path as client submissions and
    /// are applied only once committed.
    pub fn submit_action(&mut self, action: GameAction) {
        let peers = self.peers.connected_addrs();
        self.lockstep.submit(action, &peers, Instant::now());
    }

    fn apply_commits(&mut self, commits: Vec<Commit>) {
        for commit in commits {
            let effect = commit.action.apply(commit.entity);
            debug!("Applying event {} locally: {:?}", commit.event, effect);
            self.push_effect(effect);
        }
    }

    /// Routes one inbound packet.
    fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        let now = Instant::now();

        // Any traffic from a known connected peer counts as liveness.
        if let Some(id) = self.peers.find_connected_by_addr(addr) {
            self.peers.mark_heartbeat(id, now);
        }

        match packet {
            Packet::ConnectRequest { name } => {
                if self.peers.find_connected_by_addr(addr).is_some() {
                    // Duplicate request before our response arrived; answer
                    // again without minting a new id.
                    debug!("Duplicate connection request from {}", addr);
                    self.send(Packet::ConnectResponse, addr);
                    return;
                }
                match self.peers.register(addr, name, now) {
                    Some(id) => {
                        self.send(Packet::ConnectResponse, addr);
                        // Everyone, the new peer included, spawns its ship
                        // through the lockstep cycle.
                        let peers = self.peers.connected_addrs();
                        self.lockstep
                            .submit(GameAction::PlayerJoined { client: id }, &peers, now);
                    }
                    None => {
                        warn!("Rejecting connection from {}: session full", addr);
                    }
                }
            }

            Packet::ReconnectRequest { name: _ } => {
                match self.peers.reconnect(addr, now) {
                    Some(id) => {
                        info!("Peer {} re-established from {}", id, addr);
                        self.send(Packet::ReconnectResponse, addr);
                    }
                    // Unknown or re-addressed peer: nothing to match, so the
                    // request falls through without a response.
                    None => debug!("Reconnect request from unmatched address {}", addr),
                }
            }

            Packet::Heartbeat => {
                match self.peers.find_by_addr(addr) {
                    Some(id) => {
                        self.peers.mark_heartbeat(id, now);
                    }
                    None => debug!("Heartbeat from unknown address {}", addr),
                }
            }

            Packet::GameEvent { action } => {
                if self.peers.find_connected_by_addr(addr).is_none() {
                    warn!("Game event from unknown peer {}, ignoring", addr);
                    return;
                }
                let peers = self.peers.connected_addrs();
                self.lockstep.submit(action, &peers, now);
            }

            Packet::AckEvent { event } => {
                let peer = match self.peers.find_connected_by_addr(addr) {
                    Some(id) => id,
                    None => {
                        warn!("Ack from unknown peer {}, ignoring", addr);
                        return;
                    }
                };
                let peers = self.peers.connected_addrs();
                if let Some(commit) = self.lockstep.on_ack(peer, event, &peers) {
                    self.apply_commits(vec![commit]);
                }
            }

            Packet::GameData {
                entity,
                tick,
                position,
                rotation,
                velocity,
            } => {
                let sender = match self.peers.find_connected_by_addr(addr) {
                    Some(id) => id,
                    None => {
                        debug!("State update from unknown peer {}, ignoring", addr);
                        return;
                    }
                };
                // Best-effort relay to everyone else; no acknowledgement.
                let relay = Packet::GameData {
                    entity,
                    tick,
                    position,
                    rotation,
                    velocity,
                };
                for (id, peer_addr) in self.peers.connected_addrs() {
                    if id != sender {
                        self.send(relay.clone(), peer_addr);
                    }
                }
                self.push_effect(GameEffect::StateUpdate {
                    entity,
                    tick,
                    position,
                    rotation,
                    velocity,
                });
            }

            other => {
                warn!("Unexpected tag 0x{:02x} from {}", other.tag(), addr);
            }
        }
    }

    /// Periodic host work: liveness scan, lockstep sweeps, tick sync.
    fn on_tick(&mut self) {
        let now = Instant::now();

        for id in self.peers.check_timeouts(now) {
            // Departure becomes a game-visible action for the survivors.
            let peers = self.peers.connected_addrs();
            self.lockstep
                .submit(GameAction::PlayerLeft { client: id }, &peers, now);
        }

        let peers = self.peers.connected_addrs();
        let commits = self.lockstep.sweep(&peers, now);
        self.apply_commits(commits);

        self.tick += 1;
        let packet = Packet::TickSync { tick: self.tick };
        for (_, addr) in &peers {
            self.send(packet.clone(), *addr);
        }

        // Nobody took the effect stream: drop this tick's output to keep the
        // channel bounded in practice.
        if let Some(rx) = self.effect_rx.as_mut() {
            while rx.try_recv().is_ok() {}
        }
    }

    /// Main host loop coordinating all operations.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();

        let mut tick_interval = interval(self.tick_duration);
        info!("Host started (tick {:?})", self.tick_duration);

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr);
                        }
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Host shutting down");
                            break;
                        }
                    }
                },

                action = self.action_rx.recv() => {
                    if let Some(action) = action {
                        self.submit_action(action);
                    }
                },

                _ = tick_interval.tick() => {
                    self.on_tick();
                },
            }
        }

        Ok(())
    }
}
