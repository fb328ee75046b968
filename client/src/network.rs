//! Client network engine: handshake, heartbeat, lockstep receiver, reconnect
//!
//! The client talks to exactly one peer, the host. A bounded-retry
//! handshake runs before the main loop starts; afterwards a single
//! `select!` loop owns all connection state: inbound packets, the periodic
//! heartbeat probe, and housekeeping (pending-event expiry, host-silence
//! detection). Reconnection requests are sent from a background task, but
//! the response is consumed by this loop, so `connected` has a single
//! writer and the task is simply aborted once the host answers.

use crate::lockstep::EventReceiver;
use log::{debug, error, info, warn};
use shared::action::{GameAction, GameEffect};
use shared::packet::Packet;
use shared::{
    EntityId, Tick, CONNECT_ATTEMPTS, CONNECT_RETRY_TIMEOUT, HEARTBEAT_INTERVAL,
    HOST_SILENCE_TIMEOUT, MAX_DATAGRAM_SIZE, RECONNECT_INTERVAL,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};

/// The client endpoint and its view of the session.
pub struct Client {
    socket: Arc<UdpSocket>,
    server_addr: SocketAddr,
    name: String,
    connected: bool,

    receiver: EventReceiver,
    local_tick: Tick,
    last_host_packet: Instant,
    reconnect_task: Option<JoinHandle<()>>,

    effect_tx: mpsc::UnboundedSender<GameEffect>,
    effect_rx: Option<mpsc::UnboundedReceiver<GameEffect>>,
}

impl Client {
    pub async fn new(server_addr: &str, name: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind("0.0.0.0:0").await?);
        let server_addr = server_addr.parse()?;
        let (effect_tx, effect_rx) = mpsc::unbounded_channel();

        Ok(Client {
            socket,
            server_addr,
            name: name.to_string(),
            connected: false,
            receiver: EventReceiver::new(),
            local_tick: 0,
            last_host_packet: Instant::now(),
            reconnect_task: None,
            effect_tx,
            effect_rx: Some(effect_rx),
        })
    }

    /// Takes the committed-effect stream. If it is never taken, the engine
    /// discards effects during housekeeping.
    pub fn effect_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<GameEffect>> {
        self.effect_rx.take()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn local_tick(&self) -> Tick {
        self.local_tick
    }

    async fn send_packet(&self, packet: &Packet) -> std::io::Result<()> {
        self.socket.send_to(&packet.encode(), self.server_addr).await?;
        Ok(())
    }

    fn push_effect(&self, effect: GameEffect) {
        let _ = self.effect_tx.send(effect);
    }

    /// Bounded-retry handshake, run once before the main loop.
    ///
    /// Sends a connection request and waits for the host's response, up to
    /// [`CONNECT_ATTEMPTS`] rounds. Fails closed: returns `Ok(false)` after
    /// exhausting retries, leaving the caller unconnected.
    pub async fn connect(&mut self) -> Result<bool, Box<dyn std::error::Error>> {
        info!("Connecting to host at {}...", self.server_addr);
        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

        for attempt in 1..=CONNECT_ATTEMPTS {
            self.send_packet(&Packet::ConnectRequest {
                name: self.name.clone(),
            })
            .await?;

            match timeout(CONNECT_RETRY_TIMEOUT, self.socket.recv_from(&mut buffer)).await {
                Ok(Ok((len, from))) if from == self.server_addr => {
                    match Packet::decode(&buffer[..len]) {
                        Ok(Packet::ConnectResponse) => {
                            info!("Connected to host as '{}'", self.name);
                            self.connected = true;
                            self.last_host_packet = Instant::now();
                            return Ok(true);
                        }
                        Ok(other) => {
                            debug!("Ignoring tag 0x{:02x} during handshake", other.tag())
                        }
                        Err(e) => warn!("Malformed handshake response: {}", e),
                    }
                }
                Ok(Ok(_)) => {} // datagram from somewhere else entirely
                Ok(Err(e)) => error!("Error receiving handshake response: {}", e),
                Err(_) => {} // this attempt timed out
            }
            info!("Retry {}/{}...", attempt, CONNECT_ATTEMPTS);
        }

        warn!("Failed to reach host after {} attempts", CONNECT_ATTEMPTS);
        Ok(false)
    }

    /// Submits a discrete action to the host for dissemination.
    ///
    /// The action is not applied locally here; it comes back through the
    /// broadcast/commit cycle like everyone else's.
    pub async fn send_action(&self, action: GameAction) -> std::io::Result<()> {
        if !self.connected {
            return Ok(());
        }
        self.send_packet(&Packet::GameEvent { action }).await
    }

    /// Sends a best-effort entity state sample to the host.
    pub async fn send_state(
        &self,
        entity: EntityId,
        position: (f32, f32),
        rotation: f32,
        velocity: (f32, f32),
    ) -> std::io::Result<()> {
        if !self.connected {
            return Ok(());
        }
        self.send_packet(&Packet::GameData {
            entity,
            tick: self.local_tick,
            position,
            rotation,
            velocity,
        })
        .await
    }

    /// Routes one packet from the host.
    async fn handle_packet(&mut self, packet: Packet) {
        self.last_host_packet = Instant::now();

        match packet {
            Packet::BroadcastEvent { event, action } => {
                self.receiver.on_broadcast(event, action, Instant::now());
                // Ack unconditionally; the host's ack handling is idempotent
                // and a duplicate here means our previous ack was lost.
                if let Err(e) = self.send_packet(&Packet::AckEvent { event }).await {
                    error!("Failed to acknowledge event {}: {}", event, e);
                }
            }

            Packet::CommitEvent { event, entity } => {
                if let Some(effect) = self.receiver.on_commit(event, entity) {
                    self.push_effect(effect);
                }
            }

            Packet::GameData {
                entity,
                tick,
                position,
                rotation,
                velocity,
            } => {
                self.push_effect(GameEffect::StateUpdate {
                    entity,
                    tick,
                    position,
                    rotation,
                    velocity,
                });
            }

            Packet::TickSync { tick } => {
                self.local_tick = tick;
                self.push_effect(GameEffect::TickSync { tick });
            }

            Packet::ReconnectResponse => match self.reconnect_task.take() {
                Some(task) => {
                    task.abort();
                    self.connected = true;
                    info!("Reconnected to host");
                }
                None => debug!("Stray reconnect response, ignoring"),
            },

            Packet::ConnectResponse => {
                debug!("Stray connection response outside handshake, ignoring")
            }

            other => {
                warn!("Unexpected tag 0x{:02x} from host", other.tag());
            }
        }
    }

    /// Starts the background task that nags the host with reconnect
    /// requests. The task only sends; the response arrives through the main
    /// loop, which aborts the task. That keeps `connected` single-writer.
    fn spawn_reconnect_task(&mut self) {
        if self.reconnect_task.is_some() {
            return;
        }
        let socket = Arc::clone(&self.socket);
        let server_addr = self.server_addr;
        let name = self.name.clone();

        self.reconnect_task = Some(tokio::spawn(async move {
            let mut retry = interval(RECONNECT_INTERVAL);
            loop {
                retry.tick().await;
                let packet = Packet::ReconnectRequest { name: name.clone() };
                if let Err(e) = socket.send_to(&packet.encode(), server_addr).await {
                    error!("Failed to send reconnect request: {}", e);
                }
            }
        }));
    }

    /// Periodic upkeep: expire commit-less events, detect host silence.
    fn housekeeping(&mut self) {
        let now = Instant::now();
        self.receiver.expire_stale(now);

        if self.connected
            && now.duration_since(self.last_host_packet) > HOST_SILENCE_TIMEOUT
        {
            warn!(
                "Host silent for over {:?}, attempting reconnection",
                HOST_SILENCE_TIMEOUT
            );
            self.connected = false;
            self.spawn_reconnect_task();
        }

        // Nobody took the effect stream: discard to keep it bounded.
        if let Some(rx) = self.effect_rx.as_mut() {
            while rx.try_recv().is_ok() {}
        }
    }

    /// Main client loop. Call [`connect`](Self::connect) first.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut heartbeat = interval(HEARTBEAT_INTERVAL);
        let mut housekeeping = interval(Duration::from_secs(1));
        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, from)) => {
                            if from != self.server_addr {
                                debug!("Datagram from non-host address {}, ignoring", from);
                                continue;
                            }
                            match Packet::decode(&buffer[..len]) {
                                Ok(packet) => self.handle_packet(packet).await,
                                Err(e) => warn!("Dropping malformed packet from host: {}", e),
                            }
                        }
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = heartbeat.tick() => {
                    if self.connected {
                        if let Err(e) = self.send_packet(&Packet::Heartbeat).await {
                            error!("Failed to send heartbeat: {}", e);
                        }
                    }
                },

                _ = housekeeping.tick() => {
                    self.housekeeping();
                },
            }
        }
    }
}
