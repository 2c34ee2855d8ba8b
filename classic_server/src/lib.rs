//! `classic_server`
//!
//! Server-side systems:
//! - Fixed-rate world loop owning sessions, players and the level
//! - Connection sessions with CPE negotiation
//! - Login bookkeeping (names, allow-list, operators, capacity)
//! - Level plugin hooks
//!
//! Networking model:
//! - TCP only, fixed-size classic frames
//! - Non-blocking drains once per tick, flush at end of tick

pub mod lobby;
pub mod player;
pub mod plugins;
pub mod server;
pub mod session;

pub use server::GameServer;
