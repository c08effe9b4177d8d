use log::{debug, info, warn};
use shared::{Packet, PickupKind, Session, SessionState, WormId, NO_WINNER};
use std::collections::BTreeMap;

/// What a peer knows about one worm.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteWorm {
    pub name: String,
    pub team: u8,
    pub alive: bool,
    pub x: i16,
    pub y: i16,
    pub kills: u32,
    pub deaths: u32,
}

impl RemoteWorm {
    fn new(name: String, team: u8) -> Self {
        Self {
            name,
            team,
            alive: false,
            x: 0,
            y: 0,
            kills: 0,
            deaths: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemotePickup {
    pub kind: PickupKind,
    pub x: i16,
    pub y: i16,
}

/// Round result as announced by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Worm(WormId),
    Team(u8),
    Nobody,
}

/// Client-side mirror of the authoritative game
///
/// Applies what the server broadcasts and never decides anything itself.
#[derive(Debug)]
pub struct ClientWorld {
    pub session: Session,
    pub connection_id: Option<u32>,
    /// Worms the server created for this peer
    pub own_worms: Vec<WormId>,
    pub worms: BTreeMap<WormId, RemoteWorm>,
    pub pickups: BTreeMap<u8, RemotePickup>,
    pub mode: Option<shared::GameMode>,
    pub server_frame: u32,
    pub server_time_ms: u64,
    pub shots_seen: u64,
    pub tagged: Option<(WormId, f32)>,
    pub winner: Option<Winner>,
    pub disconnect_reason: Option<String>,
}

impl ClientWorld {
    pub fn new() -> Self {
        let mut session = Session::new();
        session.start_client();
        Self {
            session,
            connection_id: None,
            own_worms: Vec::new(),
            worms: BTreeMap::new(),
            pickups: BTreeMap::new(),
            mode: None,
            server_frame: 0,
            server_time_ms: 0,
            shots_seen: 0,
            tagged: None,
            winner: None,
            disconnect_reason: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// First own worm that is currently in play.
    pub fn active_worm(&self) -> Option<WormId> {
        self.own_worms
            .iter()
            .copied()
            .find(|id| self.worms.get(id).map_or(false, |w| w.alive))
    }

    /// Applies one packet from the server. Returns the reply to send, if any.
    pub fn apply(&mut self, packet: Packet) -> Option<Packet> {
        match packet {
            Packet::Connected {
                connection_id,
                worm_ids,
            } => {
                info!(
                    "Connected as connection {} with worms {:?}",
                    connection_id, worm_ids
                );
                self.connection_id = Some(connection_id);
                self.own_worms = worm_ids;
                self.session.on_connected();
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.disconnect_reason = Some(reason);
                self.connection_id = None;
                self.session.stop();
            }

            Packet::WormJoined {
                worm_id,
                name,
                team,
            } => {
                self.worms.insert(worm_id, RemoteWorm::new(name, team));
            }

            Packet::WormLeft { worm_id } => {
                if let Some(worm) = self.worms.remove(&worm_id) {
                    info!("{} left", worm.name);
                }
                if matches!(self.tagged, Some((id, _)) if id == worm_id) {
                    self.tagged = None;
                }
            }

            Packet::PrepareGame { mode } => {
                if !self.session.transition(SessionState::Preparing) {
                    return None;
                }
                info!("Preparing {:?} round", mode);
                self.mode = Some(mode);
                self.pickups.clear();
                self.winner = None;
                self.tagged = None;
                for worm in self.worms.values_mut() {
                    worm.alive = false;
                    worm.kills = 0;
                    worm.deaths = 0;
                }
                return Some(Packet::Ready);
            }

            Packet::BeginMatch => {
                self.session.begin_playing();
            }

            Packet::SpawnActor { worm_id, x, y } => match self.worms.get_mut(&worm_id) {
                Some(worm) => {
                    worm.alive = true;
                    worm.x = x;
                    worm.y = y;
                }
                None => warn!("Spawn for unknown worm {}", worm_id),
            },

            Packet::WormDown { worm_id, killer } => {
                if let Some(worm) = self.worms.get_mut(&worm_id) {
                    worm.alive = false;
                    worm.deaths += 1;
                }
                if killer != worm_id {
                    if let Some(worm) = self.worms.get_mut(&killer) {
                        worm.kills += 1;
                    }
                }
            }

            Packet::SpawnPickup { kind, slot, x, y } => {
                self.pickups.insert(slot, RemotePickup { kind, x, y });
            }

            Packet::DestroyPickup { slot } => {
                self.pickups.remove(&slot);
            }

            Packet::TagUpdate { worm_id, tag_time } => {
                self.tagged = Some((worm_id, tag_time));
            }

            Packet::RoundOver { winner } => {
                let winner = self.decode_winner(winner);
                info!("Round over, winner: {:?}", winner);
                self.winner = Some(winner);
            }

            Packet::ReturnToLobby => {
                self.session.return_to_lobby();
                for worm in self.worms.values_mut() {
                    worm.alive = false;
                }
            }

            Packet::Frame {
                server_frame,
                server_time_ms,
                shots,
            } => {
                if server_frame < self.server_frame {
                    debug!("Stale frame {} after {}", server_frame, self.server_frame);
                    return None;
                }
                self.server_frame = server_frame;
                self.server_time_ms = server_time_ms;
                self.shots_seen += shots.len() as u64;
            }

            other => warn!("Unexpected {} from server", other.name()),
        }
        None
    }

    fn decode_winner(&self, winner: i16) -> Winner {
        if winner == NO_WINNER {
            return Winner::Nobody;
        }
        let team_game = self.mode.map_or(false, |mode| mode.is_team_game());
        match u8::try_from(winner) {
            Ok(team) if team_game => Winner::Team(team),
            Ok(worm) => Winner::Worm(worm),
            Err(_) => Winner::Nobody,
        }
    }
}

impl Default for ClientWorld {
    fn default() -> Self {
        Self::new()
    }
}
