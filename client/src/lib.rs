//! # Game Client Library
//!
//! Minimal peer for the worm game server. It connects over UDP, mirrors what the
//! server broadcasts and answers round preparation, so a server can be exercised
//! without a full game frontend.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The client-side mirror of the authoritative game:
//! - Session lifecycle driven by server packets
//! - Worm roster with spawn and death bookkeeping
//! - Pickup table and round results
//!
//! ### Network Module (`network`)
//! UDP socket handling, the connect handshake with retries, and the periodic
//! consistency check between transport status and session state.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new("127.0.0.1:23400", "player", 0, 0).await?;
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod network;
