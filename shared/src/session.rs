//! Session lifecycle shared by client and server
//!
//! Both sides walk the same states. The server enters `Lobby` directly when it starts
//! hosting, a client passes through `Connecting` first. The audit helpers compare the
//! transport's view of connectivity with the session state; they only report, they
//! never change the state.

use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum SessionState {
    #[default]
    Inactive,
    Connecting,
    Lobby,
    Preparing,
    Playing,
}

impl SessionState {
    /// Transition table of the session lifecycle.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (_, Inactive) => true,
            (Inactive, Lobby) | (Inactive, Connecting) => true,
            (Connecting, Lobby) => true,
            (Lobby, Preparing) => true,
            (Preparing, Playing) => true,
            (Playing, Lobby) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Inactive => "inactive",
            SessionState::Connecting => "connecting",
            SessionState::Lobby => "lobby",
            SessionState::Preparing => "preparing",
            SessionState::Playing => "playing",
        };
        f.write_str(name)
    }
}

/// Process-wide session lifecycle of one running game.
///
/// The same machine serves both roles: `start_server` makes this process the
/// authority, `start_client` makes it a peer that follows the authority's lead.
#[derive(Debug, Default, Clone)]
pub struct Session {
    state: SessionState,
    is_server: bool,
    local_game: bool,
    paused: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_server(&self) -> bool {
        self.is_server
    }

    pub fn is_local_game(&self) -> bool {
        self.local_game
    }

    /// Starts hosting. A local game is hosted and played by the same process.
    pub fn start_server(&mut self, local_game: bool) {
        self.is_server = true;
        self.local_game = local_game;
        self.paused = false;
        self.transition(SessionState::Lobby);
    }

    pub fn start_client(&mut self) {
        self.is_server = false;
        self.local_game = false;
        self.paused = false;
        self.transition(SessionState::Connecting);
    }

    /// The transport reported that the authority accepted us.
    pub fn on_connected(&mut self) -> bool {
        self.transition(SessionState::Lobby)
    }

    /// Moves the authority from the lobby into round preparation.
    ///
    /// Only valid on the server while in `Lobby`; anything else is logged and ignored.
    pub fn start_game(&mut self) -> bool {
        if !self.is_server {
            error!("start_game called on a client (state {})", self.state);
            return false;
        }
        if self.state != SessionState::Lobby {
            warn!(
                "start_game: expected to be in lobby but session state is {}",
                self.state
            );
            return false;
        }
        self.transition(SessionState::Preparing)
    }

    pub fn begin_playing(&mut self) -> bool {
        self.transition(SessionState::Playing)
    }

    pub fn return_to_lobby(&mut self) -> bool {
        self.transition(SessionState::Lobby)
    }

    pub fn stop(&mut self) {
        self.is_server = false;
        self.local_game = false;
        self.paused = false;
        self.transition(SessionState::Inactive);
    }

    /// Applies a transition if the lifecycle table allows it.
    pub fn transition(&mut self, next: SessionState) -> bool {
        if self.state == next {
            return true;
        }
        if !self.state.can_transition_to(next) {
            warn!("invalid session transition {} -> {}", self.state, next);
            return false;
        }
        debug!("session {} -> {}", self.state, next);
        self.state = next;
        true
    }

    /// Pausing is only honoured in local games.
    pub fn set_paused(&mut self, paused: bool) {
        if paused && !self.local_game {
            warn!("pause requested outside of a local game");
            return;
        }
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.local_game && self.paused
    }
}

/// Low-level connectivity as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Playing,
}

/// Checks a client's session state against its transport status.
///
/// Returns a description of the mismatch, if any.
pub fn audit_client(status: ConnectionStatus, state: SessionState) -> Option<String> {
    let expected = match status {
        ConnectionStatus::Disconnected => SessionState::Inactive,
        ConnectionStatus::Connecting => SessionState::Connecting,
        _ if state < SessionState::Preparing => SessionState::Lobby,
        ConnectionStatus::Playing => SessionState::Playing,
        ConnectionStatus::Connected => SessionState::Preparing,
    };

    if expected == state {
        None
    } else {
        Some(format!(
            "client transport is {:?} but session state is {} (expected {})",
            status, state, expected
        ))
    }
}

/// Checks the server's session state against whether it is hosting.
pub fn audit_server(running: bool, state: SessionState) -> Option<String> {
    match (running, state) {
        (false, SessionState::Inactive) => None,
        (false, state) => Some(format!("server is not running but session state is {}", state)),
        (true, SessionState::Inactive) | (true, SessionState::Connecting) => Some(format!(
            "server is running but session state is {}",
            state
        )),
        (true, _) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_session_lifecycle() {
        let mut session = Session::new();
        assert_eq!(session.state(), SessionState::Inactive);

        session.start_server(false);
        assert!(session.is_server());
        assert_eq!(session.state(), SessionState::Lobby);

        assert!(session.start_game());
        assert_eq!(session.state(), SessionState::Preparing);
        assert!(session.begin_playing());
        assert!(session.return_to_lobby());
        assert_eq!(session.state(), SessionState::Lobby);

        session.stop();
        assert_eq!(session.state(), SessionState::Inactive);
        assert!(!session.is_server());
    }

    #[test]
    fn test_start_game_outside_lobby_is_ignored() {
        let mut session = Session::new();
        session.start_server(false);
        assert!(session.start_game());

        assert!(!session.start_game());
        assert_eq!(session.state(), SessionState::Preparing);
    }

    #[test]
    fn test_start_game_as_client_is_ignored() {
        let mut session = Session::new();
        session.start_client();
        assert_eq!(session.state(), SessionState::Connecting);
        assert!(session.on_connected());

        assert!(!session.start_game());
        assert_eq!(session.state(), SessionState::Lobby);
    }

    #[test]
    fn test_invalid_transition_keeps_state() {
        let mut session = Session::new();
        session.start_client();
        assert!(!session.begin_playing());
        assert_eq!(session.state(), SessionState::Connecting);
    }

    #[test]
    fn test_pause_only_in_local_game() {
        let mut session = Session::new();
        session.start_server(false);
        session.set_paused(true);
        assert!(!session.is_paused());

        session.start_server(true);
        session.set_paused(true);
        assert!(session.is_paused());
    }

    #[test]
    fn test_lifecycle_transitions() {
        use SessionState::*;
        assert!(Inactive.can_transition_to(Lobby));
        assert!(Inactive.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Lobby));
        assert!(Lobby.can_transition_to(Preparing));
        assert!(Preparing.can_transition_to(Playing));
        assert!(Playing.can_transition_to(Lobby));
    }

    #[test]
    fn test_any_state_can_stop() {
        use SessionState::*;
        for state in [Inactive, Connecting, Lobby, Preparing, Playing] {
            assert!(state.can_transition_to(Inactive));
        }
    }

    #[test]
    fn test_rejected_transitions() {
        use SessionState::*;
        assert!(!Playing.can_transition_to(Preparing));
        assert!(!Connecting.can_transition_to(Playing));
        assert!(!Lobby.can_transition_to(Playing));
        assert!(!Preparing.can_transition_to(Lobby));
        assert!(!Inactive.can_transition_to(Playing));
    }

    #[test]
    fn test_client_audit_matches() {
        assert!(audit_client(ConnectionStatus::Disconnected, SessionState::Inactive).is_none());
        assert!(audit_client(ConnectionStatus::Connecting, SessionState::Connecting).is_none());
        assert!(audit_client(ConnectionStatus::Connected, SessionState::Lobby).is_none());
        assert!(audit_client(ConnectionStatus::Connected, SessionState::Preparing).is_none());
        assert!(audit_client(ConnectionStatus::Playing, SessionState::Playing).is_none());
    }

    #[test]
    fn test_client_audit_reports_mismatch() {
        let report = audit_client(ConnectionStatus::Disconnected, SessionState::Playing);
        assert!(report.unwrap().contains("playing"));
        assert!(audit_client(ConnectionStatus::Connected, SessionState::Playing).is_some());
    }

    #[test]
    fn test_server_audit() {
        assert!(audit_server(false, SessionState::Inactive).is_none());
        assert!(audit_server(true, SessionState::Lobby).is_none());
        assert!(audit_server(false, SessionState::Playing).is_some());
        assert!(audit_server(true, SessionState::Inactive).is_some());
    }
}
