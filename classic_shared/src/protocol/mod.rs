//! Classic wire protocol.
//!
//! - `codec`: fixed-size framing and field encodings
//! - `packets`: the closed message catalogue per direction
//! - `extensions`: CPE capability table and peer bookkeeping
//! - `level_stream`: level transfer frames for a joining player

pub mod codec;
pub mod extensions;
pub mod level_stream;
pub mod packets;

pub use codec::Frame;
pub use packets::{ClientboundPacket, ServerboundPacket};

use crate::error::ProtocolError;

/// Something that accepts outbound frames for one peer.
pub trait PacketSink {
    fn send_packet(&mut self, packet: ClientboundPacket) -> Result<(), ProtocolError>;

    /// Whether the peer negotiated `CustomBlocks`.
    fn supports_custom_blocks(&self) -> bool {
        true
    }
}

impl PacketSink for Vec<ClientboundPacket> {
    fn send_packet(&mut self, packet: ClientboundPacket) -> Result<(), ProtocolError> {
        self.push(packet);
        Ok(())
    }
}
