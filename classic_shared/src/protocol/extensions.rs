//! CPE capability table and per-peer extension bookkeeping.
//!
//! The server advertises its whole list to every CPE peer. Nothing is
//! intersected or version-checked; the peer's list is only kept so other
//! code can ask "does this peer support X".

use super::packets::ClientboundPacket;

/// One (name, version) capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extension {
    pub name: &'static str,
    pub version: i32,
}

pub const CUSTOM_BLOCKS: &str = "CustomBlocks";
pub const ENV_COLORS: &str = "EnvColors";
pub const ENV_WEATHER_TYPE: &str = "EnvWeatherType";
pub const ENV_MAP_ASPECT: &str = "EnvMapAspect";

/// Support level sent in reply to a peer that reports `CustomBlocks`.
pub const CUSTOM_BLOCKS_SUPPORT_LEVEL: u8 = 1;

/// Capabilities advertised by this server, in advertisement order.
pub const SERVER_EXTENSIONS: &[Extension] = &[
    Extension {
        name: CUSTOM_BLOCKS,
        version: 1,
    },
    Extension {
        name: ENV_COLORS,
        version: 1,
    },
    Extension {
        name: ENV_WEATHER_TYPE,
        version: 1,
    },
    Extension {
        name: ENV_MAP_ASPECT,
        version: 1,
    },
];

/// `ExtInfo` followed by one `ExtEntry` per server capability.
pub fn advertisement(app_name: &str) -> Vec<ClientboundPacket> {
    let mut out = Vec::with_capacity(SERVER_EXTENSIONS.len() + 1);
    out.push(ClientboundPacket::ExtInfo {
        app_name: app_name.to_string(),
        extension_count: SERVER_EXTENSIONS.len() as i16,
    });
    out.extend(SERVER_EXTENSIONS.iter().map(|ext| ClientboundPacket::ExtEntry {
        ext_name: ext.name.to_string(),
        version: ext.version,
    }));
    out
}

/// What a peer told us about itself during negotiation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerExtensions {
    software: Option<String>,
    declared: usize,
    entries: Vec<(String, i32)>,
}

impl PeerExtensions {
    /// Records the peer's `ExtInfo`.
    pub fn declare(&mut self, software: &str, count: i16) {
        self.software = Some(software.to_string());
        self.declared = count.max(0) as usize;
        self.entries.reserve(self.declared);
    }

    /// Records one `ExtEntry`.
    pub fn record(&mut self, name: &str, version: i32) {
        self.entries.push((name.to_string(), version));
    }

    pub fn has_declared(&self) -> bool {
        self.software.is_some()
    }

    /// True once exactly the declared number of entries has arrived.
    pub fn is_complete(&self) -> bool {
        self.has_declared() && self.entries.len() == self.declared
    }

    pub fn declared(&self) -> usize {
        self.declared
    }

    pub fn received(&self) -> usize {
        self.entries.len()
    }

    pub fn software(&self) -> Option<&str> {
        self.software.as_deref()
    }

    pub fn supports(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn version_of(&self, name: &str) -> Option<i32> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn entries(&self) -> &[(String, i32)] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertisement_lists_every_capability_in_order() {
        let packets = advertisement("srv");
        assert_eq!(packets.len(), SERVER_EXTENSIONS.len() + 1);
        assert_eq!(
            packets[0],
            ClientboundPacket::ExtInfo {
                app_name: "srv".into(),
                extension_count: SERVER_EXTENSIONS.len() as i16,
            }
        );
        assert_eq!(
            packets[1],
            ClientboundPacket::ExtEntry {
                ext_name: CUSTOM_BLOCKS.into(),
                version: 1,
            }
        );
    }

    #[test]
    fn completes_after_declared_count() {
        let mut peer = PeerExtensions::default();
        assert!(!peer.is_complete());

        peer.declare("ClassiCube", 2);
        assert!(!peer.is_complete());
        peer.record(CUSTOM_BLOCKS, 1);
        assert!(!peer.is_complete());
        peer.record("HeldBlock", 7);
        assert!(peer.is_complete());

        assert!(peer.supports(CUSTOM_BLOCKS));
        assert_eq!(peer.version_of("HeldBlock"), Some(7));
        assert!(!peer.supports(ENV_COLORS));
    }

    #[test]
    fn zero_declared_is_immediately_complete() {
        let mut peer = PeerExtensions::default();
        peer.declare("Bare", 0);
        assert!(peer.is_complete());
    }

    #[test]
    fn mismatched_versions_are_kept_as_is() {
        let mut peer = PeerExtensions::default();
        peer.declare("Old", 1);
        peer.record(CUSTOM_BLOCKS, 99);
        assert_eq!(peer.version_of(CUSTOM_BLOCKS), Some(99));
    }
}
