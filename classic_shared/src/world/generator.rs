//! Procedural world generators.
//!
//! A generator fills a fresh world from a seeded random source. Output must
//! depend only on the dimensions and the random source, so the same seed
//! always yields the same world.
//!
//! Generators write through [`GenerationTarget`]. For a level that is
//! [`Level::set_block`](super::level::Level::set_block), so every generated
//! cell reaches the plugin hooks like any other change.
//!
//! Available generators:
//! - "flat": bedrock, stone, dirt and a grass surface at half depth
//! - "hills": Perlin-noise terrain with beaches, still water and trees
//! - "empty": nothing but air

use noise::{Fbm, NoiseFn, Perlin};
use rand::rngs::StdRng;
use rand::Rng;

use super::block::Block;
use super::grid::{BlockPos, WorldGrid};

/// Names accepted by [`by_name`].
pub const GENERATOR_NAMES: &[&str] = &["flat", "hills", "empty"];

/// The cells a generator reads and writes.
pub trait GenerationTarget {
    /// `(width, depth, height)`.
    fn dimensions(&self) -> (i16, i16, i16);

    /// Out-of-bounds reads return air.
    fn block_at(&self, pos: BlockPos) -> Block;

    /// Returns `false` for out-of-bounds positions.
    fn place(&mut self, pos: BlockPos, block: Block) -> bool;

    /// Fills the box `[min, max]` (inclusive, clipped to the world).
    fn fill(&mut self, min: BlockPos, max: BlockPos, block: Block) {
        let (width, depth, height) = self.dimensions();
        let x2 = max.x.min(i32::from(width) - 1);
        let y2 = max.y.min(i32::from(depth) - 1);
        let z2 = max.z.min(i32::from(height) - 1);
        for y in min.y.max(0)..=y2 {
            for z in min.z.max(0)..=z2 {
                for x in min.x.max(0)..=x2 {
                    self.place(BlockPos::new(x, y, z), block);
                }
            }
        }
    }

    /// Highest non-air y in a column, if any.
    fn top_solid(&self, x: i32, z: i32) -> Option<i32> {
        let (_, depth, _) = self.dimensions();
        (0..i32::from(depth))
            .rev()
            .find(|&y| !self.block_at(BlockPos::new(x, y, z)).is_air())
    }
}

impl GenerationTarget for WorldGrid {
    fn dimensions(&self) -> (i16, i16, i16) {
        (self.width(), self.depth(), self.height())
    }

    fn block_at(&self, pos: BlockPos) -> Block {
        if self.contains(pos) {
            self.get(pos)
        } else {
            Block::AIR
        }
    }

    fn place(&mut self, pos: BlockPos, block: Block) -> bool {
        self.set(pos, block)
    }

    fn fill(&mut self, min: BlockPos, max: BlockPos, block: Block) {
        WorldGrid::fill(self, min, max, block);
    }
}

/// A named fill strategy.
pub trait WorldGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    fn generate(&self, world: &mut dyn GenerationTarget, rng: &mut StdRng);
}

/// Looks up a generator by its configured name.
pub fn by_name(name: &str) -> Option<Box<dyn WorldGenerator>> {
    match name {
        "flat" => Some(Box::new(FlatGenerator)),
        "hills" => Some(Box::new(HillsGenerator::default())),
        "empty" => Some(Box::new(EmptyGenerator)),
        _ => None,
    }
}

/// Leaves the grid as air.
#[derive(Debug, Default)]
pub struct EmptyGenerator;

impl WorldGenerator for EmptyGenerator {
    fn name(&self) -> &'static str {
        "empty"
    }

    fn generate(&self, _world: &mut dyn GenerationTarget, _rng: &mut StdRng) {}
}

/// Layered flat terrain with the grass surface at half depth.
#[derive(Debug, Default)]
pub struct FlatGenerator;

impl WorldGenerator for FlatGenerator {
    fn name(&self) -> &'static str {
        "flat"
    }

    fn generate(&self, world: &mut dyn GenerationTarget, _rng: &mut StdRng) {
        let (width, depth, height) = world.dimensions();
        let w = i32::from(width);
        let h = i32::from(height);
        let surface = i32::from(depth) / 2 - 1;
        if surface < 0 {
            return;
        }

        world.fill(BlockPos::new(0, 0, 0), BlockPos::new(w - 1, 0, h - 1), Block::BEDROCK);
        world.fill(
            BlockPos::new(0, 1, 0),
            BlockPos::new(w - 1, surface - 4, h - 1),
            Block::STONE,
        );
        world.fill(
            BlockPos::new(0, (surface - 3).max(1), 0),
            BlockPos::new(w - 1, surface - 1, h - 1),
            Block::DIRT,
        );
        if surface > 0 {
            world.fill(
                BlockPos::new(0, surface, 0),
                BlockPos::new(w - 1, surface, h - 1),
                Block::GRASS,
            );
        }
    }
}

/// Rolling terrain from fractal Perlin noise.
#[derive(Debug)]
pub struct HillsGenerator {
    /// Horizontal distance covered by one noise unit.
    pub scale: f64,
    /// Terrain amplitude as a fraction of the world depth.
    pub amplitude: f64,
    /// Roughly one tree per this many surface cells.
    pub tree_spacing: usize,
}

impl Default for HillsGenerator {
    fn default() -> Self {
        Self {
            scale: 48.0,
            amplitude: 0.2,
            tree_spacing: 256,
        }
    }
}

impl HillsGenerator {
    fn plant_tree(world: &mut dyn GenerationTarget, base: BlockPos, trunk: i32) {
        let top = base.y + trunk;
        for dy in (trunk - 2)..=(trunk + 1) {
            let radius = if dy > trunk - 1 { 1 } else { 2 };
            for dz in -radius..=radius {
                for dx in -radius..=radius {
                    let pos = BlockPos::new(base.x + dx, base.y + dy, base.z + dz);
                    if world.block_at(pos).is_air() {
                        world.place(pos, Block::LEAVES);
                    }
                }
            }
        }
        for y in base.y..top {
            world.place(BlockPos::new(base.x, y, base.z), Block::LOG);
        }
    }
}

impl WorldGenerator for HillsGenerator {
    fn name(&self) -> &'static str {
        "hills"
    }

    fn generate(&self, world: &mut dyn GenerationTarget, rng: &mut StdRng) {
        let (width, depth, height) = world.dimensions();
        let w = i32::from(width);
        let d = i32::from(depth);
        let h = i32::from(height);
        if d < 4 {
            return;
        }

        let noise = Fbm::<Perlin>::new(rng.gen());
        let water_level = d / 2;
        let amplitude = f64::from(d) * self.amplitude;

        for z in 0..h {
            for x in 0..w {
                let sample = noise.get([f64::from(x) / self.scale, f64::from(z) / self.scale]);
                let surface = (f64::from(water_level) + sample * amplitude) as i32;
                let surface = surface.clamp(1, d - 2);

                world.place(BlockPos::new(x, 0, z), Block::BEDROCK);
                for y in 1..=surface {
                    let block = if y == surface {
                        if surface <= water_level {
                            Block::SAND
                        } else {
                            Block::GRASS
                        }
                    } else if y > surface - 4 {
                        if surface <= water_level {
                            Block::SAND
                        } else {
                            Block::DIRT
                        }
                    } else {
                        Block::STONE
                    };
                    world.place(BlockPos::new(x, y, z), block);
                }
                for y in (surface + 1)..water_level {
                    world.place(BlockPos::new(x, y, z), Block::STILL_WATER);
                }
            }
        }

        let trees = (w as usize * h as usize) / self.tree_spacing.max(1);
        for _ in 0..trees {
            let x = rng.gen_range(0..w);
            let z = rng.gen_range(0..h);
            let trunk = rng.gen_range(4..7);
            let Some(top) = world.top_solid(x, z) else {
                continue;
            };
            if world.block_at(BlockPos::new(x, top, z)) != Block::GRASS || top + trunk + 2 >= d {
                continue;
            }
            Self::plant_tree(world, BlockPos::new(x, top + 1, z), trunk);
        }
    }
}
