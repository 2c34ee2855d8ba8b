//! Per-level appearance: colours, weather and map edge properties.

use serde::{Deserialize, Serialize};

use super::block::Block;
use crate::protocol::extensions::{ENV_COLORS, ENV_MAP_ASPECT};
use crate::protocol::packets::ClientboundPacket;

/// Colour channels understood by `EnvSetColor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ColorChannel {
    Sky = 0,
    Cloud = 1,
    Fog = 2,
    Ambient = 3,
    Diffuse = 4,
}

/// A colour override, or `None` channels meaning "client default".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnvColor(pub Option<[u8; 3]>);

impl EnvColor {
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        EnvColor(Some([r, g, b]))
    }

    /// Wire components; -1 on every channel resets to default.
    fn components(self) -> (i16, i16, i16) {
        match self.0 {
            Some([r, g, b]) => (i16::from(r), i16::from(g), i16::from(b)),
            None => (-1, -1, -1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Weather {
    #[default]
    Clear = 0,
    Rain = 1,
    Snow = 2,
}

impl Weather {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "clear" | "sun" => Some(Weather::Clear),
            "rain" => Some(Weather::Rain),
            "snow" => Some(Weather::Snow),
            _ => None,
        }
    }
}

/// Properties understood by `SetMapEnvProperty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EnvProperty {
    SideBlock = 0,
    EdgeBlock = 1,
    EdgeHeight = 2,
    CloudHeight = 3,
    WaterLevelDistance = 4,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub sky: EnvColor,
    pub cloud: EnvColor,
    pub fog: EnvColor,
    pub ambient: EnvColor,
    pub diffuse: EnvColor,
    pub weather: Weather,
    pub edge_block: Block,
    pub side_block: Block,
    pub edge_height: i32,
    pub edge_distance: i32,
    pub cloud_height: i32,
}

impl Environment {
    /// Defaults for a level of the given vertical extent.
    pub fn for_depth(depth: i16) -> Self {
        let depth = i32::from(depth);
        Self {
            sky: EnvColor::default(),
            cloud: EnvColor::default(),
            fog: EnvColor::default(),
            ambient: EnvColor::default(),
            diffuse: EnvColor::default(),
            weather: Weather::Clear,
            edge_block: Block::WATER,
            side_block: Block::BEDROCK,
            edge_height: depth / 2,
            edge_distance: 2,
            cloud_height: depth + 2,
        }
    }

    pub fn color(&self, channel: ColorChannel) -> EnvColor {
        match channel {
            ColorChannel::Sky => self.sky,
            ColorChannel::Cloud => self.cloud,
            ColorChannel::Fog => self.fog,
            ColorChannel::Ambient => self.ambient,
            ColorChannel::Diffuse => self.diffuse,
        }
    }

    pub fn set_color(&mut self, channel: ColorChannel, color: EnvColor) {
        let slot = match channel {
            ColorChannel::Sky => &mut self.sky,
            ColorChannel::Cloud => &mut self.cloud,
            ColorChannel::Fog => &mut self.fog,
            ColorChannel::Ambient => &mut self.ambient,
            ColorChannel::Diffuse => &mut self.diffuse,
        };
        *slot = color;
    }

    pub fn color_packet(&self, channel: ColorChannel) -> ClientboundPacket {
        let (red, green, blue) = self.color(channel).components();
        ClientboundPacket::EnvSetColor {
            variable: channel as u8,
            red,
            green,
            blue,
        }
    }

    pub fn weather_packet(&self) -> ClientboundPacket {
        ClientboundPacket::EnvSetWeatherType {
            weather: self.weather as u8,
        }
    }

    fn property(property: EnvProperty, value: i32) -> ClientboundPacket {
        ClientboundPacket::SetMapEnvProperty {
            property: property as u8,
            value,
        }
    }

    /// Everything a joining peer needs, tagged with the extension that
    /// gates each frame.
    pub fn packets(&self) -> Vec<(&'static str, ClientboundPacket)> {
        let mut out = Vec::with_capacity(11);
        for channel in [
            ColorChannel::Sky,
            ColorChannel::Cloud,
            ColorChannel::Fog,
            ColorChannel::Ambient,
            ColorChannel::Diffuse,
        ] {
            out.push((ENV_COLORS, self.color_packet(channel)));
        }
        out.push((
            ENV_MAP_ASPECT,
            Self::property(EnvProperty::EdgeBlock, i32::from(self.edge_block.id())),
        ));
        out.push((
            ENV_MAP_ASPECT,
            Self::property(EnvProperty::EdgeHeight, self.edge_height),
        ));
        out.push((
            ENV_MAP_ASPECT,
            Self::property(EnvProperty::WaterLevelDistance, -self.edge_distance),
        ));
        out.push((
            ENV_MAP_ASPECT,
            Self::property(EnvProperty::SideBlock, i32::from(self.side_block.id())),
        ));
        out.push((
            ENV_MAP_ASPECT,
            Self::property(EnvProperty::CloudHeight, self.cloud_height),
        ));
        out
    }
}
