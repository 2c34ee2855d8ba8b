//! `classic_shared`
//!
//! Libraries shared by the classic server, client and tests.
//!
//! - `protocol`: fixed-size packet codec, catalogue, CPE extensions
//! - `world`: block grid, generators, scheduled ticks, persistence
//! - `net`: non-blocking transport abstraction
//! - `config`, `error`: server configuration and typed errors
//!
//! No `unsafe`.

pub mod config;
pub mod error;
pub mod net;
pub mod protocol;
pub mod world;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::error::*;
    pub use crate::net::*;
    pub use crate::protocol::packets::*;
    pub use crate::protocol::{Frame, PacketSink};
    pub use crate::world::*;
}
