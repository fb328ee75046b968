//! Discrete game actions and their deterministic local effects
//!
//! An action is anything that must happen identically on every peer: firing
//! a bullet, resolving a collision, a player joining. Actions travel through
//! the host's broadcast/ack/commit cycle and are applied only on commit,
//! through [`GameAction::apply`], which both the host and every client call
//! with the same commit-time entity id. That shared apply path is what makes
//! the outcome deterministic across the session.
//!
//! Wire encoding note: `FireBullet` carries floats as raw `f32` bit
//! patterns, while `SpawnObstacle` keeps the older `x100` fixed-point `i16`
//! fields. Both layouts are frozen per kind; changing either desyncs peers
//! that disagree on the version.

use crate::wire::{PacketReader, PacketWriter, WireError};
use crate::{ClientId, EntityId, Tick};

/// Action kind tags (1 byte on the wire).
pub mod kind {
    pub const START_SESSION: u8 = 0x01;
    pub const PLAYER_JOINED: u8 = 0x02;
    pub const PLAYER_LEFT: u8 = 0x03;
    pub const FIRE_BULLET: u8 = 0x04;
    pub const SPAWN_OBSTACLE: u8 = 0x05;
    pub const RESOLVE_COLLISION: u8 = 0x06;
}

/// A discrete action disseminated through the lockstep cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum GameAction {
    /// Host confirms the session is starting.
    StartSession,
    /// A peer joined; every participant spawns a ship for it.
    PlayerJoined { client: ClientId },
    /// A peer left; its ship is removed everywhere.
    PlayerLeft { client: ClientId },
    /// A ship fires. The bullet's id is minted at commit time, never here.
    FireBullet {
        shooter: EntityId,
        position: (f32, f32),
        rotation: f32,
    },
    /// Host scatters an obstacle into the arena.
    SpawnObstacle {
        position: (f32, f32),
        scale: (f32, f32),
        velocity: (f32, f32),
    },
    /// A bullet hit an obstacle; both are destroyed on all peers.
    ResolveCollision {
        obstacle: EntityId,
        projectile: EntityId,
    },
}

impl GameAction {
    /// Wire tag for this kind.
    pub fn kind(&self) -> u8 {
        match self {
            GameAction::StartSession => kind::START_SESSION,
            GameAction::PlayerJoined { .. } => kind::PLAYER_JOINED,
            GameAction::PlayerLeft { .. } => kind::PLAYER_LEFT,
            GameAction::FireBullet { .. } => kind::FIRE_BULLET,
            GameAction::SpawnObstacle { .. } => kind::SPAWN_OBSTACLE,
            GameAction::ResolveCollision { .. } => kind::RESOLVE_COLLISION,
        }
    }

    /// Whether committing this action mints a fresh entity id.
    pub fn spawns_entity(&self) -> bool {
        matches!(
            self,
            GameAction::PlayerJoined { .. }
                | GameAction::FireBullet { .. }
                | GameAction::SpawnObstacle { .. }
        )
    }

    /// Appends the kind tag and kind-specific fields.
    pub fn encode_into(&self, writer: &mut PacketWriter) {
        writer.write_u8(self.kind());
        match self {
            GameAction::StartSession => {}
            GameAction::PlayerJoined { client } | GameAction::PlayerLeft { client } => {
                writer.write_u32(*client);
            }
            GameAction::FireBullet {
                shooter,
                position,
                rotation,
            } => {
                writer.write_u32(*shooter);
                writer.write_f32_bits(position.0);
                writer.write_f32_bits(position.1);
                writer.write_f32_bits(*rotation);
            }
            GameAction::SpawnObstacle {
                position,
                scale,
                velocity,
            } => {
                writer.write_fixed16(position.0);
                writer.write_fixed16(position.1);
                writer.write_fixed16(scale.0);
                writer.write_fixed16(scale.1);
                writer.write_fixed16(velocity.0);
                writer.write_fixed16(velocity.1);
            }
            GameAction::ResolveCollision {
                obstacle,
                projectile,
            } => {
                writer.write_u32(*obstacle);
                writer.write_u32(*projectile);
            }
        }
    }

    /// Reads the kind tag and kind-specific fields.
    pub fn decode(reader: &mut PacketReader) -> Result<Self, WireError> {
        let tag = reader.read_u8()?;
        match tag {
            kind::START_SESSION => Ok(GameAction::StartSession),
            kind::PLAYER_JOINED => Ok(GameAction::PlayerJoined {
                client: reader.read_u32()?,
            }),
            kind::PLAYER_LEFT => Ok(GameAction::PlayerLeft {
                client: reader.read_u32()?,
            }),
            kind::FIRE_BULLET => Ok(GameAction::FireBullet {
                shooter: reader.read_u32()?,
                position: (reader.read_f32_bits()?, reader.read_f32_bits()?),
                rotation: reader.read_f32_bits()?,
            }),
            kind::SPAWN_OBSTACLE => Ok(GameAction::SpawnObstacle {
                position: (reader.read_fixed16()?, reader.read_fixed16()?),
                scale: (reader.read_fixed16()?, reader.read_fixed16()?),
                velocity: (reader.read_fixed16()?, reader.read_fixed16()?),
            }),
            kind::RESOLVE_COLLISION => Ok(GameAction::ResolveCollision {
                obstacle: reader.read_u32()?,
                projectile: reader.read_u32()?,
            }),
            other => Err(WireError::UnknownKind(other)),
        }
    }

    /// Produces the local simulation effect of a committed action.
    ///
    /// `minted` is the entity id from the COMMIT_EVENT packet; 0 for kinds
    /// that spawn nothing. Ids embedded in the payload always refer to
    /// pre-existing entities (e.g. the shooter), never to the spawned one.
    pub fn apply(&self, minted: EntityId) -> GameEffect {
        match self {
            GameAction::StartSession => GameEffect::SessionStarted,
            GameAction::PlayerJoined { client } => GameEffect::SpawnShip {
                entity: minted,
                client: *client,
            },
            GameAction::PlayerLeft { client } => GameEffect::DespawnShip { client: *client },
            GameAction::FireBullet {
                shooter,
                position,
                rotation,
            } => GameEffect::SpawnBullet {
                entity: minted,
                shooter: *shooter,
                position: *position,
                rotation: *rotation,
            },
            GameAction::SpawnObstacle {
                position,
                scale,
                velocity,
            } => GameEffect::SpawnObstacle {
                entity: minted,
                position: *position,
                scale: *scale,
                velocity: *velocity,
            },
            GameAction::ResolveCollision {
                obstacle,
                projectile,
            } => GameEffect::DestroyPair {
                obstacle: *obstacle,
                projectile: *projectile,
            },
        }
    }
}

/// Outcome handed to the simulation layer.
///
/// Committed actions, unreliable state updates and tick syncs all surface
/// through one queue so the game layer has a single consumption point.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEffect {
    SessionStarted,
    SpawnShip {
        entity: EntityId,
        client: ClientId,
    },
    DespawnShip {
        client: ClientId,
    },
    SpawnBullet {
        entity: EntityId,
        shooter: EntityId,
        position: (f32, f32),
        rotation: f32,
    },
    SpawnObstacle {
        entity: EntityId,
        position: (f32, f32),
        scale: (f32, f32),
        velocity: (f32, f32),
    },
    DestroyPair {
        obstacle: EntityId,
        projectile: EntityId,
    },
    /// Best-effort state sample relayed outside the lockstep cycle.
    StateUpdate {
        entity: EntityId,
        tick: Tick,
        position: (f32, f32),
        rotation: f32,
        velocity: (f32, f32),
    },
    TickSync {
        tick: Tick,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn roundtrip(action: &GameAction) -> GameAction {
        let mut writer = PacketWriter::new();
        action.encode_into(&mut writer);
        let buf = writer.finish();
        let mut reader = PacketReader::new(&buf);
        let decoded = GameAction::decode(&mut reader).unwrap();
        assert_eq!(reader.remaining(), 0);
        decoded
    }

    #[test]
    fn test_roundtrip_exact_kinds() {
        let actions = [
            GameAction::StartSession,
            GameAction::PlayerJoined { client: 1 },
            GameAction::PlayerLeft { client: u32::MAX },
            GameAction::FireBullet {
                shooter: 7,
                position: (1.0, 2.0),
                rotation: 0.5,
            },
            GameAction::FireBullet {
                shooter: 0,
                position: (-123.456, 1e-3),
                rotation: -3.14159,
            },
            GameAction::ResolveCollision {
                obstacle: u32::MAX,
                projectile: 0,
            },
        ];
        for action in &actions {
            assert_eq!(&roundtrip(action), action);
        }
    }

    #[test]
    fn test_roundtrip_obstacle_at_fixed16_resolution() {
        let action = GameAction::SpawnObstacle {
            position: (10.25, -42.5),
            scale: (1.5, 1.5),
            velocity: (-0.75, 3.25),
        };
        match roundtrip(&action) {
            GameAction::SpawnObstacle {
                position,
                scale,
                velocity,
            } => {
                assert_approx_eq!(position.0, 10.25, 0.005);
                assert_approx_eq!(position.1, -42.5, 0.005);
                assert_approx_eq!(scale.0, 1.5, 0.005);
                assert_approx_eq!(scale.1, 1.5, 0.005);
                assert_approx_eq!(velocity.0, -0.75, 0.005);
                assert_approx_eq!(velocity.1, 3.25, 0.005);
            }
            other => panic!("wrong action kind after roundtrip: {:?}", other),
        }
    }

    #[test]
    fn test_negative_float_bits_survive() {
        let action = GameAction::FireBullet {
            shooter: 3,
            position: (-0.0, -1.5),
            rotation: -0.5,
        };
        match roundtrip(&action) {
            GameAction::FireBullet {
                position, rotation, ..
            } => {
                assert_eq!(position.0.to_bits(), (-0.0_f32).to_bits());
                assert_eq!(position.1.to_bits(), (-1.5_f32).to_bits());
                assert_eq!(rotation.to_bits(), (-0.5_f32).to_bits());
            }
            other => panic!("wrong action kind after roundtrip: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let buf = [0x7F];
        let mut reader = PacketReader::new(&buf);
        assert_eq!(
            GameAction::decode(&mut reader),
            Err(WireError::UnknownKind(0x7F))
        );
    }

    #[test]
    fn test_truncated_fields_rejected() {
        let mut writer = PacketWriter::new();
        GameAction::FireBullet {
            shooter: 1,
            position: (0.0, 0.0),
            rotation: 0.0,
        }
        .encode_into(&mut writer);
        let buf = writer.finish();

        let mut reader = PacketReader::new(&buf[..buf.len() - 1]);
        assert!(matches!(
            GameAction::decode(&mut reader),
            Err(WireError::Truncated { .. })
        ));
    }

    #[test]
    fn test_spawning_kinds() {
        assert!(GameAction::PlayerJoined { client: 1 }.spawns_entity());
        assert!(GameAction::FireBullet {
            shooter: 1,
            position: (0.0, 0.0),
            rotation: 0.0,
        }
        .spawns_entity());
        assert!(GameAction::SpawnObstacle {
            position: (0.0, 0.0),
            scale: (1.0, 1.0),
            velocity: (0.0, 0.0),
        }
        .spawns_entity());

        assert!(!GameAction::StartSession.spawns_entity());
        assert!(!GameAction::PlayerLeft { client: 1 }.spawns_entity());
        assert!(!GameAction::ResolveCollision {
            obstacle: 1,
            projectile: 2,
        }
        .spawns_entity());
    }

    #[test]
    fn test_apply_uses_minted_id_for_spawns() {
        let action = GameAction::FireBullet {
            shooter: 7,
            position: (1.0, 2.0),
            rotation: 0.5,
        };
        match action.apply(42) {
            GameEffect::SpawnBullet {
                entity, shooter, ..
            } => {
                assert_eq!(entity, 42);
                assert_eq!(shooter, 7);
            }
            other => panic!("wrong effect: {:?}", other),
        }
    }

    #[test]
    fn test_apply_collision_references_payload_ids() {
        let action = GameAction::ResolveCollision {
            obstacle: 9,
            projectile: 11,
        };
        assert_eq!(
            action.apply(0),
            GameEffect::DestroyPair {
                obstacle: 9,
                projectile: 11,
            }
        );
    }
}
