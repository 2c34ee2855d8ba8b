//! Dense voxel storage.

use serde::{Deserialize, Serialize};

use super::block::Block;

/// Largest cell count whose length fits the i32 prefixes used on the wire
/// and on disk.
pub const MAX_VOLUME: usize = i32::MAX as usize;

/// A cell coordinate. `y` is vertical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn below(self) -> Self {
        Self::new(self.x, self.y - 1, self.z)
    }

    pub fn above(self) -> Self {
        Self::new(self.x, self.y + 1, self.z)
    }

    /// The six face-adjacent cells.
    pub fn neighbours(self) -> [BlockPos; 6] {
        let BlockPos { x, y, z } = self;
        [
            BlockPos::new(x - 1, y, z),
            BlockPos::new(x + 1, y, z),
            BlockPos::new(x, y - 1, z),
            BlockPos::new(x, y + 1, z),
            BlockPos::new(x, y, z - 1),
            BlockPos::new(x, y, z + 1),
        ]
    }
}

/// Fixed-size block array indexed `(y * height + z) * width + x`.
///
/// `width` is the x extent, `depth` the vertical y extent and `height` the
/// z extent. Dimensions never change after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldGrid {
    width: i16,
    depth: i16,
    height: i16,
    blocks: Vec<Block>,
}

impl WorldGrid {
    /// An all-air grid. Non-positive dimensions yield an empty grid.
    pub fn new(width: i16, depth: i16, height: i16) -> Self {
        let len = volume(width, depth, height);
        Self {
            width,
            depth,
            height,
            blocks: vec![Block::AIR; len],
        }
    }

    /// Wraps raw block bytes. Returns `None` when the length does not match.
    pub fn from_bytes(width: i16, depth: i16, height: i16, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != volume(width, depth, height) {
            return None;
        }
        Some(Self {
            width,
            depth,
            height,
            blocks: bytes.iter().copied().map(Block).collect(),
        })
    }

    pub fn width(&self) -> i16 {
        self.width
    }

    pub fn depth(&self) -> i16 {
        self.depth
    }

    pub fn height(&self) -> i16 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        pos.x >= 0
            && pos.y >= 0
            && pos.z >= 0
            && pos.x < i32::from(self.width)
            && pos.y < i32::from(self.depth)
            && pos.z < i32::from(self.height)
    }

    /// Array index of an in-bounds position.
    pub fn index(&self, pos: BlockPos) -> Option<usize> {
        if !self.contains(pos) {
            return None;
        }
        let (x, y, z) = (pos.x as usize, pos.y as usize, pos.z as usize);
        Some((y * self.height as usize + z) * self.width as usize + x)
    }

    /// Out-of-bounds reads return air.
    pub fn get(&self, pos: BlockPos) -> Block {
        self.index(pos)
            .map(|i| self.blocks[i])
            .unwrap_or(Block::AIR)
    }

    /// Returns `false` without writing when `pos` is out of bounds.
    pub fn set(&mut self, pos: BlockPos, block: Block) -> bool {
        match self.index(pos) {
            Some(i) => {
                self.blocks[i] = block;
                true
            }
            None => false,
        }
    }

    /// Fills the box `[min, max]` (inclusive, clipped to the grid).
    pub fn fill(&mut self, min: BlockPos, max: BlockPos, block: Block) {
        let x1 = min.x.max(0);
        let y1 = min.y.max(0);
        let z1 = min.z.max(0);
        let x2 = max.x.min(i32::from(self.width) - 1);
        let y2 = max.y.min(i32::from(self.depth) - 1);
        let z2 = max.z.min(i32::from(self.height) - 1);
        for y in y1..=y2 {
            for z in z1..=z2 {
                for x in x1..=x2 {
                    self.set(BlockPos::new(x, y, z), block);
                }
            }
        }
    }

    /// Highest non-air y in a column, if any.
    pub fn top_solid(&self, x: i32, z: i32) -> Option<i32> {
        (0..i32::from(self.depth))
            .rev()
            .find(|&y| !self.get(BlockPos::new(x, y, z)).is_air())
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Block ids in index order.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.blocks.iter().map(|b| b.id()).collect()
    }
}

/// Cell count for the given extents; 0 if any extent is non-positive.
pub fn volume(width: i16, depth: i16, height: i16) -> usize {
    if width <= 0 || depth <= 0 || height <= 0 {
        return 0;
    }
    (width as usize)
        .saturating_mul(depth as usize)
        .saturating_mul(height as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_everywhere_in_bounds() {
        let mut grid = WorldGrid::new(4, 3, 5);
        let mut id = 1u8;
        for y in 0..3 {
            for z in 0..5 {
                for x in 0..4 {
                    let pos = BlockPos::new(x, y, z);
                    assert!(grid.set(pos, Block(id)));
                    assert_eq!(grid.get(pos), Block(id));
                    id = id.wrapping_add(1).max(1);
                }
            }
        }
    }

    #[test]
    fn volume_of_extreme_extents() {
        assert_eq!(volume(0, 10, 10), 0);
        assert_eq!(volume(-1, 10, 10), 0);
        assert_eq!(volume(16, 8, 4), 512);
        assert!(volume(i16::MAX, i16::MAX, i16::MAX) > MAX_VOLUME);
    }

    #[test]
    fn out_of_bounds_reads_air_and_rejects_writes() {
        let mut grid = WorldGrid::new(4, 3, 5);
        let before = grid.clone();
        for pos in [
            BlockPos::new(-1, 0, 0),
            BlockPos::new(0, -1, 0),
            BlockPos::new(0, 0, -1),
            BlockPos::new(4, 0, 0),
            BlockPos::new(0, 3, 0),
            BlockPos::new(0, 0, 5),
        ] {
            assert_eq!(grid.get(pos), Block::AIR);
            assert!(!grid.set(pos, Block::STONE));
        }
        assert_eq!(grid, before);
    }

    #[test]
    fn index_layout_is_y_major() {
        let grid = WorldGrid::new(4, 3, 5);
        assert_eq!(grid.index(BlockPos::new(1, 0, 0)), Some(1));
        assert_eq!(grid.index(BlockPos::new(0, 0, 1)), Some(4));
        assert_eq!(grid.index(BlockPos::new(0, 1, 0)), Some(20));
        assert_eq!(grid.index(BlockPos::new(3, 2, 4)), Some(grid.len() - 1));
    }

    #[test]
    fn bytes_roundtrip_and_length_check() {
        let mut grid = WorldGrid::new(2, 2, 2);
        grid.set(BlockPos::new(1, 1, 1), Block::GOLD);
        let bytes = grid.to_bytes();
        assert_eq!(WorldGrid::from_bytes(2, 2, 2, &bytes), Some(grid));
        assert_eq!(WorldGrid::from_bytes(2, 2, 3, &bytes), None);
    }

    #[test]
    fn top_solid_scans_down() {
        let mut grid = WorldGrid::new(2, 8, 2);
        assert_eq!(grid.top_solid(0, 0), None);
        grid.fill(BlockPos::new(0, 0, 0), BlockPos::new(1, 3, 1), Block::DIRT);
        assert_eq!(grid.top_solid(1, 1), Some(3));
    }
}
