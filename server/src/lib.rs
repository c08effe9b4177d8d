//! # Game Server Library
//!
//! Authoritative simulation and synchronization core of a multiplayer worm game.
//! The server owns the canonical game: it advances a fixed-tick simulation, decides
//! spawns, pickups, tags and round results, and broadcasts every decision to the
//! connected peers over UDP.
//!
//! ## Core Responsibilities
//!
//! ### Fixed-Tick Simulation
//! The outer loop runs at a variable frame rate. The [`scheduler`] catches the
//! simulation clock up with real time in identical ticks and fast-forwards over
//! stalls instead of simulating them.
//!
//! ### Session Lifecycle
//! A hosted game walks `Lobby → Preparing → Playing → Lobby`. Round start waits
//! until every peer reported that it finished loading.
//!
//! ### Decide Once, Broadcast Once
//! Every decision that changes what peers see is queued as exactly one packet in
//! the tick it was made, addressed either to one connection or to all of them.
//! Peers never need to reconcile with the server.
//!
//! ## Module Organization
//!
//! - `clock`: real-time sources, a manual clock for tests
//! - `transport`: the packet channel trait and an in-memory loopback
//! - `client_manager`: address book of the UDP transport
//! - `registry`: worms, their weapons and ropes, with compact ID reuse
//! - `bonus`: fixed slot table of pickups
//! - `map`, `physics`: collision grid and worm movement
//! - `ruleset`: weapons and the host's restrictions
//! - `config`: validated host settings
//! - `game`, `rules`: the game context and the per-tick server rules
//! - `scheduler`: dual-clock frame driver
//! - `network`: UDP transport and the server main loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::GameSettings;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:23400", GameSettings::default(), 42).await?;
//!
//!     // Loads the map and ruleset, then runs the frame loop until the game stops
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod bonus;
pub mod client_manager;
pub mod clock;
pub mod config;
pub mod connection;
pub mod game;
pub mod map;
pub mod network;
pub mod physics;
pub mod registry;
pub mod rules;
pub mod ruleset;
pub mod scheduler;
pub mod transport;

pub use game::{Game, GameEvent, Outgoing};
pub use rules::Outcome;
