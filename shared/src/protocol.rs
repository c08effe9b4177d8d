//! Datagram protocol between the authority and its peers
//!
//! Every datagram carries exactly one [`Packet`] encoded with bincode 1.x default
//! options: little endian, fixed-width integers, and a `u32` variant index in front
//! of each enum value. Payload widths are chosen to match the legacy opcodes:
//!
//! | packet          | payload                                              |
//! |-----------------|------------------------------------------------------|
//! | `SpawnActor`    | worm `u8`, x `i16`, y `i16`                          |
//! | `DestroyPickup` | slot `u8`                                            |
//! | `SpawnPickup`   | kind (`Health` or `Weapon` + weapon `u8`), slot `u8`, x `i16`, y `i16` |
//! | `TagUpdate`     | worm `u8`, tag time in seconds `f32`                 |
//! | `RoundOver`     | winning worm or team `i16`, `-1` for nobody          |
//! | `ReturnToLobby` | empty                                                |
//!
//! Each packet is addressed either to a single connection or broadcast to all.

use crate::{ConnectionId, WormId};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("failed to encode packet: {0}")]
    Encode(#[source] bincode::Error),
    #[error("failed to decode packet: {0}")]
    Decode(#[source] bincode::Error),
}

/// Rules that decide when a round is over and who won it.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum GameMode {
    #[default]
    Deathmatch,
    TeamDeathmatch,
    Tag,
    Vip,
}

impl GameMode {
    pub fn is_team_game(self) -> bool {
        matches!(self, GameMode::TeamDeathmatch | GameMode::Vip)
    }
}

impl std::str::FromStr for GameMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deathmatch" | "dm" => Ok(GameMode::Deathmatch),
            "teamdeathmatch" | "team-deathmatch" | "tdm" => Ok(GameMode::TeamDeathmatch),
            "tag" => Ok(GameMode::Tag),
            "vip" => Ok(GameMode::Vip),
            other => Err(format!("unknown game mode '{}'", other)),
        }
    }
}

/// What a pickup grants when collected.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PickupKind {
    Health,
    Weapon { weapon: u8 },
}

/// One weapon discharge the server recorded for replication.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Shot {
    /// Simulated server time of the shot in milliseconds
    pub time_ms: u64,
    pub worm_id: WormId,
    /// Shooter speed at fire time, zero for beams
    pub speed: f32,
    /// Aim angle in whole degrees, `0..360`
    pub angle: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // Client to server
    Connect {
        client_version: u32,
        name: String,
        team: u8,
    },
    Ready,
    Shoot {
        worm_id: WormId,
        angle: f32,
        facing_left: bool,
    },
    Death {
        worm_id: WormId,
        killer: WormId,
    },
    PickupCollected {
        worm_id: WormId,
        slot: u8,
    },
    Disconnect,

    // Server to client
    Connected {
        connection_id: ConnectionId,
        worm_ids: Vec<WormId>,
    },
    Disconnected {
        reason: String,
    },
    WormJoined {
        worm_id: WormId,
        name: String,
        team: u8,
    },
    WormLeft {
        worm_id: WormId,
    },
    PrepareGame {
        mode: GameMode,
    },
    BeginMatch,
    SpawnActor {
        worm_id: WormId,
        x: i16,
        y: i16,
    },
    DestroyPickup {
        slot: u8,
    },
    SpawnPickup {
        kind: PickupKind,
        slot: u8,
        x: i16,
        y: i16,
    },
    TagUpdate {
        worm_id: WormId,
        tag_time: f32,
    },
    WormDown {
        worm_id: WormId,
        killer: WormId,
    },
    RoundOver {
        winner: i16,
    },
    ReturnToLobby,
    Frame {
        server_frame: u32,
        server_time_ms: u64,
        shots: Vec<Shot>,
    },
}

impl Packet {
    /// Short opcode name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Packet::Connect { .. } => "Connect",
            Packet::Ready => "Ready",
            Packet::Shoot { .. } => "Shoot",
            Packet::Death { .. } => "Death",
            Packet::PickupCollected { .. } => "PickupCollected",
            Packet::Disconnect => "Disconnect",
            Packet::Connected { .. } => "Connected",
            Packet::Disconnected { .. } => "Disconnected",
            Packet::WormJoined { .. } => "WormJoined",
            Packet::WormLeft { .. } => "WormLeft",
            Packet::PrepareGame { .. } => "PrepareGame",
            Packet::BeginMatch => "BeginMatch",
            Packet::SpawnActor { .. } => "SpawnActor",
            Packet::DestroyPickup { .. } => "DestroyPickup",
            Packet::SpawnPickup { .. } => "SpawnPickup",
            Packet::TagUpdate { .. } => "TagUpdate",
            Packet::WormDown { .. } => "WormDown",
            Packet::RoundOver { .. } => "RoundOver",
            Packet::ReturnToLobby => "ReturnToLobby",
            Packet::Frame { .. } => "Frame",
        }
    }

    /// True for packets only the authority may send.
    pub fn is_from_server(&self) -> bool {
        !matches!(
            self,
            Packet::Connect { .. }
                | Packet::Ready
                | Packet::Shoot { .. }
                | Packet::Death { .. }
                | Packet::PickupCollected { .. }
                | Packet::Disconnect
        )
    }
}

pub fn encode(packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
    bincode::serialize(packet).map_err(ProtocolError::Encode)
}

pub fn decode(bytes: &[u8]) -> Result<Packet, ProtocolError> {
    bincode::deserialize(bytes).map_err(ProtocolError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_spawn_actor_layout() {
        let bytes = encode(&Packet::SpawnActor {
            worm_id: 3,
            x: -2,
            y: 300,
        })
        .unwrap();

        // u32 variant index, u8 worm, i16 x, i16 y
        assert_eq!(bytes.len(), 4 + 1 + 2 + 2);
        assert_eq!(bytes[4], 3);
        assert_eq!(&bytes[5..7], &(-2i16).to_le_bytes());
        assert_eq!(&bytes[7..9], &300i16.to_le_bytes());
    }

    #[test]
    fn test_spawn_pickup_weapon_index_only_for_weapons() {
        let health = encode(&Packet::SpawnPickup {
            kind: PickupKind::Health,
            slot: 1,
            x: 0,
            y: 0,
        })
        .unwrap();
        let weapon = encode(&Packet::SpawnPickup {
            kind: PickupKind::Weapon { weapon: 7 },
            slot: 1,
            x: 0,
            y: 0,
        })
        .unwrap();

        assert_eq!(weapon.len(), health.len() + 1);
    }

    #[test]
    fn test_tag_update_decode() {
        let bytes = encode(&Packet::TagUpdate {
            worm_id: 2,
            tag_time: 12.5,
        })
        .unwrap();

        match decode(&bytes).unwrap() {
            Packet::TagUpdate { worm_id, tag_time } => {
                assert_eq!(worm_id, 2);
                assert_approx_eq!(tag_time, 12.5, 0.0001);
            }
            other => panic!("Wrong packet type after deserialization: {:?}", other),
        }
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result = decode(&[0xff, 0xff, 0xff, 0xff, 0x01]);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_return_to_lobby_is_tag_only() {
        let bytes = encode(&Packet::ReturnToLobby).unwrap();
        assert_eq!(bytes.len(), 4);
    }

    #[test]
    fn test_packet_direction() {
        assert!(!Packet::Ready.is_from_server());
        assert!(!Packet::Disconnect.is_from_server());
        assert!(Packet::RoundOver { winner: 1 }.is_from_server());
        assert!(Packet::BeginMatch.is_from_server());
    }

    #[test]
    fn test_game_mode_parsing() {
        assert_eq!("tag".parse::<GameMode>(), Ok(GameMode::Tag));
        assert_eq!("TDM".parse::<GameMode>(), Ok(GameMode::TeamDeathmatch));
        assert!("capture".parse::<GameMode>().is_err());
        assert!(GameMode::Vip.is_team_game());
        assert!(!GameMode::Tag.is_team_game());
    }
}
