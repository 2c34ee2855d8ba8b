//! Packet catalogue for protocol version 7 plus the CPE messages we use.
//!
//! Header `0x00` means "identification" in both directions but with different
//! fields, so each direction is its own closed enum.

use super::codec::{packets, LevelChunk};

/// Classic protocol version spoken by this server.
pub const PROTOCOL_VERSION: u8 = 7;

/// Identification padding byte announcing CPE support.
pub const CPE_MAGIC: u8 = 0x42;

/// User type byte for operators.
pub const USER_TYPE_OP: u8 = 0x64;

/// User type byte for regular players.
pub const USER_TYPE_NORMAL: u8 = 0x00;

/// Player id a client uses to address itself.
pub const SELF_ID: i8 = -1;

/// `SetBlock` mode for breaking a block.
pub const MODE_DESTROY: u8 = 0x00;

/// `SetBlock` mode for placing a block.
pub const MODE_PLACE: u8 = 0x01;

packets! {
    /// Client → server messages.
    pub enum ServerboundPacket {
        PlayerIdentification = 0x00 {
            protocol_version: u8,
            username: String,
            verification_key: String,
            padding: u8,
        },
        SetBlock = 0x05 {
            x: i16,
            y: i16,
            z: i16,
            mode: u8,
            block: u8,
        },
        PositionOrientation = 0x08 {
            player_id: u8,
            x: i16,
            y: i16,
            z: i16,
            yaw: u8,
            pitch: u8,
        },
        Message = 0x0d {
            unused: u8,
            message: String,
        },
        ExtInfo = 0x10 {
            app_name: String,
            extension_count: i16,
        },
        ExtEntry = 0x11 {
            ext_name: String,
            version: i32,
        },
        CustomBlockSupportLevel = 0x13 {
            support_level: u8,
        },
    }
}

packets! {
    /// Server → client messages.
    pub enum ClientboundPacket {
        ServerIdentification = 0x00 {
            protocol_version: u8,
            server_name: String,
            motd: String,
            user_type: u8,
        },
        Ping = 0x01 {},
        LevelInitialize = 0x02 {},
        LevelDataChunk = 0x03 {
            chunk_length: i16,
            chunk_data: LevelChunk,
            percent_complete: u8,
        },
        LevelFinalize = 0x04 {
            x_size: i16,
            y_size: i16,
            z_size: i16,
        },
        SetBlock = 0x06 {
            x: i16,
            y: i16,
            z: i16,
            block: u8,
        },
        SpawnPlayer = 0x07 {
            player_id: i8,
            name: String,
            x: i16,
            y: i16,
            z: i16,
            yaw: u8,
            pitch: u8,
        },
        PositionOrientation = 0x08 {
            player_id: i8,
            x: i16,
            y: i16,
            z: i16,
            yaw: u8,
            pitch: u8,
        },
        DespawnPlayer = 0x0c {
            player_id: i8,
        },
        Message = 0x0d {
            player_id: i8,
            message: String,
        },
        Disconnect = 0x0e {
            reason: String,
        },
        UpdateUserType = 0x0f {
            user_type: u8,
        },
        ExtInfo = 0x10 {
            app_name: String,
            extension_count: i16,
        },
        ExtEntry = 0x11 {
            ext_name: String,
            version: i32,
        },
        CustomBlockSupportLevel = 0x13 {
            support_level: u8,
        },
        EnvSetColor = 0x19 {
            variable: u8,
            red: i16,
            green: i16,
            blue: i16,
        },
        EnvSetWeatherType = 0x1f {
            weather: u8,
        },
        SetMapEnvProperty = 0x29 {
            property: u8,
            value: i32,
        },
    }
}

impl ClientboundPacket {
    pub fn disconnect(reason: &str) -> Self {
        ClientboundPacket::Disconnect {
            reason: reason.to_string(),
        }
    }

    /// A server chat line (player id 0 is rendered without a sender).
    pub fn chat(message: &str) -> Self {
        ClientboundPacket::Message {
            player_id: 0,
            message: message.to_string(),
        }
    }

    pub fn set_block(x: i16, y: i16, z: i16, block: u8) -> Self {
        ClientboundPacket::SetBlock { x, y, z, block }
    }
}
