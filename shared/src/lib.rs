//! Types shared between the authoritative server and its peers.
//!
//! The crate holds the datagram protocol, the session-state enumeration with its
//! transition table, and the game constants both sides must agree on.

pub mod protocol;
pub mod session;

pub use protocol::{decode, encode, GameMode, Packet, PickupKind, ProtocolError, Shot};
pub use session::{audit_client, audit_server, ConnectionStatus, Session, SessionState};

/// Compact actor identifier, one byte on the wire.
pub type WormId = u8;

/// Identifier the transport assigns to a remote peer.
pub type ConnectionId = u32;

pub const PROTOCOL_VERSION: u32 = 1;

/// Duration of one simulation tick in milliseconds.
pub const FIXED_FRAME_TIME_MS: u64 = 10;
/// Simulation delay above which the loop is considered to lag.
pub const HIGH_DELAY_MS: u64 = 100;
/// Simulation delay above which skipped ticks are fast-forwarded instead of simulated.
pub const SERIOUS_DELAY_MS: u64 = 200;

pub const MAX_WORMS: usize = 32;
pub const MAX_BONUSES: usize = 32;
pub const MAX_TEAMS: usize = 4;

/// Seconds a dead worm waits before it is respawned.
pub const RESPAWN_DELAY_SECS: f32 = 2.5;
/// Seconds the scoreboard is shown before the server returns to the lobby.
pub const GAME_OVER_WAIT_SECS: f32 = 9.0;

/// Winner value of a round that ended without survivors.
pub const NO_WINNER: i16 = -1;

pub const MAX_PACKET_SIZE: usize = 2048;
