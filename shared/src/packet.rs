//! Datagram-level protocol messages
//!
//! One datagram carries one [`Packet`]: a 1-byte command tag followed by the
//! tag's fixed payload. Tag values 0x01–0x05 are frozen from the first
//! protocol revision; the lockstep, heartbeat and reconnect tags continue
//! the sequence.

use crate::action::GameAction;
use crate::wire::{PacketReader, PacketWriter, WireError};
use crate::{EntityId, EventId, Tick};

/// Command tags (first byte of every datagram).
pub mod tag {
    pub const REQ_CONNECTION: u8 = 0x01;
    pub const RSP_CONNECTION: u8 = 0x02;
    pub const TICK_SYNC: u8 = 0x03;
    pub const GAME_DATA: u8 = 0x04;
    pub const GAME_EVENT: u8 = 0x05;
    pub const BROADCAST_EVENT: u8 = 0x06;
    pub const ACK_EVENT: u8 = 0x07;
    pub const COMMIT_EVENT: u8 = 0x08;
    pub const HEARTBEAT: u8 = 0x09;
    pub const REQ_RECONNECT: u8 = 0x0A;
    pub const RSP_RECONNECT: u8 = 0x0B;
}

/// Every message exchanged between host and clients.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Client asks to join, carrying its display name.
    ConnectRequest { name: String },
    /// Host accepts a join request.
    ConnectResponse,
    /// Known client re-establishes after a missed heartbeat window.
    ReconnectRequest { name: String },
    /// Host accepts a reconnection.
    ReconnectResponse,
    /// Client keep-alive probe.
    Heartbeat,
    /// Best-effort entity state sample, relayed without acknowledgement.
    GameData {
        entity: EntityId,
        tick: Tick,
        position: (f32, f32),
        rotation: f32,
        velocity: (f32, f32),
    },
    /// Client submits an action to the host for dissemination.
    GameEvent { action: GameAction },
    /// Host disseminates an action under a fresh event id.
    BroadcastEvent { event: EventId, action: GameAction },
    /// Client acknowledges a broadcast.
    AckEvent { event: EventId },
    /// Host finalizes an event; `entity` is the minted id (0 = none).
    CommitEvent { event: EventId, entity: EntityId },
    /// Host announces the current simulation tick.
    TickSync { tick: Tick },
}

impl Packet {
    /// Command tag of this packet.
    pub fn tag(&self) -> u8 {
        match self {
            Packet::ConnectRequest { .. } => tag::REQ_CONNECTION,
            Packet::ConnectResponse => tag::RSP_CONNECTION,
            Packet::ReconnectRequest { .. } => tag::REQ_RECONNECT,
            Packet::ReconnectResponse => tag::RSP_RECONNECT,
            Packet::Heartbeat => tag::HEARTBEAT,
            Packet::GameData { .. } => tag::GAME_DATA,
            Packet::GameEvent { .. } => tag::GAME_EVENT,
            Packet::BroadcastEvent { .. } => tag::BROADCAST_EVENT,
            Packet::AckEvent { .. } => tag::ACK_EVENT,
            Packet::CommitEvent { .. } => tag::COMMIT_EVENT,
            Packet::TickSync { .. } => tag::TICK_SYNC,
        }
    }

    /// Serializes into a single datagram.
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = PacketWriter::with_tag(self.tag());
        match self {
            Packet::ConnectRequest { name } | Packet::ReconnectRequest { name } => {
                writer.write_str(name);
            }
            Packet::ConnectResponse
            | Packet::ReconnectResponse
            | Packet::Heartbeat => {}
            Packet::GameData {
                entity,
                tick,
                position,
                rotation,
                velocity,
            } => {
                writer.write_u32(*entity);
                writer.write_u32(*tick);
                writer.write_f32_bits(position.0);
                writer.write_f32_bits(position.1);
                writer.write_f32_bits(*rotation);
                writer.write_f32_bits(velocity.0);
                writer.write_f32_bits(velocity.1);
            }
            Packet::GameEvent { action } => {
                action.encode_into(&mut writer);
            }
            Packet::BroadcastEvent { event, action } => {
                writer.write_u32(*event);
                action.encode_into(&mut writer);
            }
            Packet::AckEvent { event } => {
                writer.write_u32(*event);
            }
            Packet::CommitEvent { event, entity } => {
                writer.write_u32(*event);
                writer.write_u32(*entity);
            }
            Packet::TickSync { tick } => {
                writer.write_u32(*tick);
            }
        }
        writer.finish()
    }

    /// Parses a received datagram.
    pub fn decode(data: &[u8]) -> Result<Packet, WireError> {
        let mut reader = PacketReader::new(data);
        let tag = match reader.read_u8() {
            Ok(tag) => tag,
            Err(_) => return Err(WireError::Empty),
        };
        match tag {
            tag::REQ_CONNECTION => Ok(Packet::ConnectRequest {
                name: reader.read_str()?,
            }),
            tag::RSP_CONNECTION => Ok(Packet::ConnectResponse),
            tag::REQ_RECONNECT => Ok(Packet::ReconnectRequest {
                name: reader.read_str()?,
            }),
            tag::RSP_RECONNECT => Ok(Packet::ReconnectResponse),
            tag::HEARTBEAT => Ok(Packet::Heartbeat),
            tag::GAME_DATA => Ok(Packet::GameData {
                entity: reader.read_u32()?,
                tick: reader.read_u32()?,
                position: (reader.read_f32_bits()?, reader.read_f32_bits()?),
                rotation: reader.read_f32_bits()?,
                velocity: (reader.read_f32_bits()?, reader.read_f32_bits()?),
            }),
            tag::GAME_EVENT => Ok(Packet::GameEvent {
                action: GameAction::decode(&mut reader)?,
            }),
            tag::BROADCAST_EVENT => Ok(Packet::BroadcastEvent {
                event: reader.read_u32()?,
                action: GameAction::decode(&mut reader)?,
            }),
            tag::ACK_EVENT => Ok(Packet::AckEvent {
                event: reader.read_u32()?,
            }),
            tag::COMMIT_EVENT => Ok(Packet::CommitEvent {
                event: reader.read_u32()?,
                entity: reader.read_u32()?,
            }),
            tag::TICK_SYNC => Ok(Packet::TickSync {
                tick: reader.read_u32()?,
            }),
            other => Err(WireError::UnknownTag(other)),
        }
    }
}
