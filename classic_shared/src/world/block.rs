//! Block ids.
//!
//! Ids 0..=49 are the classic set, 50..=65 come from the CPE `CustomBlocks`
//! extension and have a classic fallback for peers without it.

use serde::{Deserialize, Serialize};

/// One voxel. Stored and sent as a single byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Block(pub u8);

impl Block {
    pub const AIR: Block = Block(0);
    pub const STONE: Block = Block(1);
    pub const GRASS: Block = Block(2);
    pub const DIRT: Block = Block(3);
    pub const COBBLESTONE: Block = Block(4);
    pub const PLANKS: Block = Block(5);
    pub const SAPLING: Block = Block(6);
    pub const BEDROCK: Block = Block(7);
    pub const WATER: Block = Block(8);
    pub const STILL_WATER: Block = Block(9);
    pub const LAVA: Block = Block(10);
    pub const STILL_LAVA: Block = Block(11);
    pub const SAND: Block = Block(12);
    pub const GRAVEL: Block = Block(13);
    pub const GOLD_ORE: Block = Block(14);
    pub const IRON_ORE: Block = Block(15);
    pub const COAL_ORE: Block = Block(16);
    pub const LOG: Block = Block(17);
    pub const LEAVES: Block = Block(18);
    pub const SPONGE: Block = Block(19);
    pub const GLASS: Block = Block(20);
    pub const RED_WOOL: Block = Block(21);
    pub const GREEN_WOOL: Block = Block(25);
    pub const CYAN_WOOL: Block = Block(28);
    pub const BLUE_WOOL: Block = Block(29);
    pub const PINK_WOOL: Block = Block(33);
    pub const WHITE_WOOL: Block = Block(36);
    pub const DANDELION: Block = Block(37);
    pub const ROSE: Block = Block(38);
    pub const BROWN_MUSHROOM: Block = Block(39);
    pub const RED_MUSHROOM: Block = Block(40);
    pub const GOLD: Block = Block(41);
    pub const IRON: Block = Block(42);
    pub const DOUBLE_SLAB: Block = Block(43);
    pub const SLAB: Block = Block(44);
    pub const BRICK: Block = Block(45);
    pub const TNT: Block = Block(46);
    pub const BOOKSHELF: Block = Block(47);
    pub const MOSSY_COBBLESTONE: Block = Block(48);
    pub const OBSIDIAN: Block = Block(49);

    pub const COBBLESTONE_SLAB: Block = Block(50);
    pub const ROPE: Block = Block(51);
    pub const SANDSTONE: Block = Block(52);
    pub const SNOW: Block = Block(53);
    pub const FIRE: Block = Block(54);
    pub const LIGHT_PINK_WOOL: Block = Block(55);
    pub const FOREST_GREEN_WOOL: Block = Block(56);
    pub const BROWN_WOOL: Block = Block(57);
    pub const DEEP_BLUE: Block = Block(58);
    pub const TURQUOISE: Block = Block(59);
    pub const ICE: Block = Block(60);
    pub const CERAMIC_TILE: Block = Block(61);
    pub const MAGMA: Block = Block(62);
    pub const PILLAR: Block = Block(63);
    pub const CRATE: Block = Block(64);
    pub const STONE_BRICK: Block = Block(65);

    /// Highest classic id.
    pub const MAX_CLASSIC: u8 = 49;
    /// Highest id with `CustomBlocks` support level 1.
    pub const MAX_CUSTOM: u8 = 65;

    pub fn id(self) -> u8 {
        self.0
    }

    pub fn is_air(self) -> bool {
        self == Block::AIR
    }

    /// Ids a client is allowed to place or send.
    pub fn is_valid(self) -> bool {
        self.0 <= Block::MAX_CUSTOM
    }

    pub fn is_custom(self) -> bool {
        self.0 > Block::MAX_CLASSIC && self.0 <= Block::MAX_CUSTOM
    }

    pub fn is_slab(self) -> bool {
        self == Block::SLAB || self == Block::COBBLESTONE_SLAB
    }

    /// The block two stacked half-slabs of this kind turn into.
    pub fn full_slab_type(self) -> Block {
        match self {
            Block::SLAB => Block::DOUBLE_SLAB,
            Block::COBBLESTONE_SLAB => Block::COBBLESTONE,
            other => other,
        }
    }

    pub fn falls(self) -> bool {
        self == Block::SAND || self == Block::GRAVEL
    }

    pub fn is_water(self) -> bool {
        self == Block::WATER || self == Block::STILL_WATER
    }

    pub fn is_lava(self) -> bool {
        self == Block::LAVA || self == Block::STILL_LAVA
    }

    pub fn is_liquid(self) -> bool {
        self.is_water() || self.is_lava()
    }

    /// Ticks between scheduling and re-evaluation, `None` if the block has
    /// no tick behaviour. Still liquids never spread.
    pub fn tick_delay(self) -> Option<u64> {
        if self.falls() {
            Some(1)
        } else if self == Block::WATER {
            Some(4)
        } else if self == Block::LAVA {
            Some(20)
        } else {
            None
        }
    }

    /// Classic stand-in for peers that did not negotiate `CustomBlocks`.
    pub fn fallback(self) -> Block {
        match self {
            Block::COBBLESTONE_SLAB => Block::SLAB,
            Block::ROPE => Block::BROWN_MUSHROOM,
            Block::SANDSTONE => Block::SAND,
            Block::SNOW => Block::AIR,
            Block::FIRE => Block::LAVA,
            Block::LIGHT_PINK_WOOL => Block::PINK_WOOL,
            Block::FOREST_GREEN_WOOL => Block::GREEN_WOOL,
            Block::BROWN_WOOL => Block::DIRT,
            Block::DEEP_BLUE => Block::BLUE_WOOL,
            Block::TURQUOISE => Block::CYAN_WOOL,
            Block::ICE => Block::GLASS,
            Block::CERAMIC_TILE => Block::IRON,
            Block::MAGMA => Block::OBSIDIAN,
            Block::PILLAR => Block::WHITE_WOOL,
            Block::CRATE => Block::PLANKS,
            Block::STONE_BRICK => Block::STONE,
            other => other,
        }
    }

    /// The id to send to a peer, given whether it supports custom blocks.
    pub fn for_peer(self, custom_blocks: bool) -> Block {
        if custom_blocks {
            self
        } else {
            self.fallback()
        }
    }
}

impl From<u8> for Block {
    fn from(id: u8) -> Self {
        Block(id)
    }
}
