//! Game-side state of one remote peer

use shared::{ConnectionId, Shot};

/// Shots waiting to be replicated to one peer.
#[derive(Debug, Clone, Default)]
pub struct ShotList {
    shots: Vec<Shot>,
}

impl ShotList {
    pub fn push(&mut self, shot: Shot) {
        self.shots.push(shot);
    }

    pub fn len(&self) -> usize {
        self.shots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shots.is_empty()
    }

    /// Empties the list, handing back its shots in firing order.
    pub fn take(&mut self) -> Vec<Shot> {
        std::mem::take(&mut self.shots)
    }

    pub fn clear(&mut self) {
        self.shots.clear();
    }
}

#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub client_version: u32,
    /// Peer reported that it finished loading the round
    pub game_ready: bool,
    pub shots: ShotList,
}

impl Connection {
    pub fn new(id: ConnectionId, client_version: u32) -> Self {
        Self {
            id,
            client_version,
            game_ready: false,
            shots: ShotList::default(),
        }
    }
}
