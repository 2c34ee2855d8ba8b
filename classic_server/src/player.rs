//! Player entities.
//!
//! A player exists for every session in the `Playing` state. Positions are
//! kept in the wire's fixed-point form (1/32 block).

use std::collections::BTreeMap;

use classic_shared::protocol::packets::{ClientboundPacket, SELF_ID};
use classic_shared::world::BlockPos;

use crate::session::SessionId;

/// Wire ids available to players; -1 is reserved for "yourself".
pub const MAX_PLAYER_ID: i8 = 127;

/// Eye height above the feet in fixed-point units.
const EYE_OFFSET: i16 = 51;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub x: i16,
    pub y: i16,
    pub z: i16,
    pub yaw: u8,
    pub pitch: u8,
}

/// Fixed-point coordinate, saturating at the edges of the wire range.
fn fixed(units: i64) -> i16 {
    units.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16
}

impl Position {
    /// Centre of a block column, feet on the block's floor.
    pub fn at_block(pos: BlockPos) -> Self {
        Self {
            x: fixed(i64::from(pos.x) * 32 + 16),
            y: fixed(i64::from(pos.y) * 32 + i64::from(EYE_OFFSET)),
            z: fixed(i64::from(pos.z) * 32 + 16),
            yaw: 0,
            pitch: 0,
        }
    }

    pub fn block(&self) -> BlockPos {
        BlockPos::new(
            i32::from(self.x) / 32,
            (i32::from(self.y) - i32::from(EYE_OFFSET)) / 32,
            i32::from(self.z) / 32,
        )
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: i8,
    pub session: SessionId,
    pub name: String,
    pub operator: bool,
    pub position: Position,
}

impl Player {
    /// `SpawnPlayer` for this player; `for_self` uses the self id.
    pub fn spawn_packet(&self, for_self: bool) -> ClientboundPacket {
        let p = self.position;
        ClientboundPacket::SpawnPlayer {
            player_id: if for_self { SELF_ID } else { self.id },
            name: self.name.clone(),
            x: p.x,
            y: p.y,
            z: p.z,
            yaw: p.yaw,
            pitch: p.pitch,
        }
    }

    pub fn position_packet(&self) -> ClientboundPacket {
        let p = self.position;
        ClientboundPacket::PositionOrientation {
            player_id: self.id,
            x: p.x,
            y: p.y,
            z: p.z,
            yaw: p.yaw,
            pitch: p.pitch,
        }
    }

    pub fn despawn_packet(&self) -> ClientboundPacket {
        ClientboundPacket::DespawnPlayer { player_id: self.id }
    }

    /// A chat line from this player.
    pub fn chat_packet(&self, message: &str) -> ClientboundPacket {
        ClientboundPacket::Message {
            player_id: self.id,
            message: format!("<{}> {}", self.name, message),
        }
    }
}

/// Players keyed by the session that mediates for them.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: BTreeMap<SessionId, Player>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn free_id(&self) -> Option<i8> {
        (0..=MAX_PLAYER_ID).find(|id| self.players.values().all(|p| p.id != *id))
    }

    /// Creates a player with the lowest free wire id.
    pub fn create(
        &mut self,
        session: SessionId,
        name: &str,
        operator: bool,
        position: Position,
    ) -> Option<&Player> {
        let id = self.free_id()?;
        self.players.insert(
            session,
            Player {
                id,
                session,
                name: name.to_string(),
                operator,
                position,
            },
        );
        self.players.get(&session)
    }

    pub fn remove(&mut self, session: SessionId) -> Option<Player> {
        self.players.remove(&session)
    }

    pub fn get(&self, session: SessionId) -> Option<&Player> {
        self.players.get(&session)
    }

    pub fn get_mut(&mut self, session: SessionId) -> Option<&mut Player> {
        self.players.get_mut(&session)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Player> {
        self.players
            .values()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
