//! A loaded world: grid plus metadata, environment and scheduled ticks.
//!
//! All mutation goes through [`Level::set_block`] so the side effects stay in
//! one place: timestamps, tick scheduling, the dirty flag and the event queue
//! the server drains once per tick for broadcasts and plugin hooks.

use std::cell::Cell;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::info;

use super::block::Block;
use super::environment::{ColorChannel, EnvColor, Environment, Weather};
use super::generator::{self, GenerationTarget, WorldGenerator};
use super::grid::{volume, BlockPos, WorldGrid, MAX_VOLUME};
use super::scheduler::{ScheduledTick, TickScheduler};
use crate::error::{ConfigError, ProtocolError};
use crate::protocol::extensions::{ENV_COLORS, ENV_WEATHER_TYPE};
use crate::protocol::packets::ClientboundPacket;
use crate::protocol::PacketSink;

/// Maximum horizontal distance of a spawn point from the centre.
pub const SPAWN_RADIUS: i32 = 10;

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Random 128-bit level identifier, written as 32 hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorldId(pub u128);

impl WorldId {
    pub fn random() -> Self {
        WorldId(rand::thread_rng().gen())
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for WorldId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u128::from_str_radix(s, 16).map(WorldId)
    }
}

impl Serialize for WorldId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WorldId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Descriptive state persisted alongside the blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldMetadata {
    pub width: i16,
    pub depth: i16,
    pub height: i16,
    pub seed: u64,
    pub generator: String,
    pub id: WorldId,
    pub created: i64,
    pub modified: i64,
    /// Touched by reads, hence a `Cell`.
    pub accessed: Cell<i64>,
    pub tick: u64,
}

/// The optional JSON sidecar of a saved level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelProperties {
    pub metadata: WorldMetadata,
    pub environment: Environment,
    #[serde(default)]
    pub scheduled: Vec<ScheduledTick>,
}

/// Side effects queued for the owning server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelEvent {
    /// A cell changed. `broadcast` is false while the level is generating.
    BlockChanged {
        pos: BlockPos,
        block: Block,
        broadcast: bool,
    },
    /// An environment frame for every peer supporting `extension`.
    Environment {
        extension: &'static str,
        packet: Box<ClientboundPacket>,
    },
}

pub struct Level {
    name: String,
    grid: WorldGrid,
    meta: WorldMetadata,
    env: Environment,
    scheduler: TickScheduler,
    rng: StdRng,
    generated: bool,
    dirty: bool,
    events: Vec<LevelEvent>,
}

impl fmt::Debug for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Level")
            .field("name", &self.name)
            .field("width", &self.grid.width())
            .field("depth", &self.grid.depth())
            .field("height", &self.grid.height())
            .field("seed", &self.meta.seed)
            .field("tick", &self.meta.tick)
            .finish_non_exhaustive()
    }
}

impl Level {
    /// Creates and generates a new level with a named generator.
    pub fn generate(
        name: &str,
        width: i16,
        depth: i16,
        height: i16,
        generator_name: &str,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        let generator = generator::by_name(generator_name)
            .ok_or_else(|| ConfigError::UnknownGenerator(generator_name.to_string()))?;
        if volume(width, depth, height) > MAX_VOLUME {
            return Err(ConfigError::Invalid(format!(
                "world of {width}x{depth}x{height} exceeds {MAX_VOLUME} blocks"
            )));
        }
        Ok(Self::generate_with(name, width, depth, height, generator.as_ref(), seed))
    }

    /// Creates and generates a new level with an explicit generator.
    pub fn generate_with(
        name: &str,
        width: i16,
        depth: i16,
        height: i16,
        generator: &dyn WorldGenerator,
        seed: u64,
    ) -> Self {
        info!(level = %name, seed, generator = generator.name(), "Creating world");
        let now = unix_now();
        let mut level = Self {
            name: name.to_string(),
            grid: WorldGrid::new(width, depth, height),
            meta: WorldMetadata {
                width,
                depth,
                height,
                seed,
                generator: generator.name().to_string(),
                id: WorldId::random(),
                created: now,
                modified: now,
                accessed: Cell::new(now),
                tick: 0,
            },
            env: Environment::for_depth(depth),
            scheduler: TickScheduler::new(),
            rng: StdRng::seed_from_u64(seed),
            generated: false,
            dirty: true,
            events: Vec::new(),
        };

        let start = Instant::now();
        let mut gen_rng = StdRng::seed_from_u64(seed);
        generator.generate(&mut level, &mut gen_rng);
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        info!(
            level = %name,
            elapsed_ms,
            changes = level.events.len(),
            "Generated world"
        );

        level.generated = true;
        level
    }

    /// Rebuilds a level from a loaded grid and its optional sidecar.
    pub fn restore(name: &str, grid: WorldGrid, properties: Option<LevelProperties>) -> Self {
        let now = unix_now();
        let (mut meta, env, scheduler) = match properties {
            Some(props) => (
                props.metadata,
                props.environment,
                TickScheduler::from_pending(props.scheduled),
            ),
            None => (
                WorldMetadata {
                    width: grid.width(),
                    depth: grid.depth(),
                    height: grid.height(),
                    seed: 0,
                    generator: "unknown".to_string(),
                    id: WorldId::random(),
                    created: now,
                    modified: now,
                    accessed: Cell::new(now),
                    tick: 0,
                },
                Environment::for_depth(grid.depth()),
                TickScheduler::new(),
            ),
        };
        meta.width = grid.width();
        meta.depth = grid.depth();
        meta.height = grid.height();

        Self {
            name: name.to_string(),
            rng: StdRng::seed_from_u64(meta.seed),
            grid,
            meta,
            env,
            scheduler,
            generated: true,
            dirty: false,
            events: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn grid(&self) -> &WorldGrid {
        &self.grid
    }

    pub fn metadata(&self) -> &WorldMetadata {
        &self.meta
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Colour and map-property frames for a joining peer, tagged with the
    /// extension that gates each one.
    pub fn environment_packets(&self) -> Vec<(&'static str, ClientboundPacket)> {
        self.env.packets()
    }

    pub fn is_generated(&self) -> bool {
        self.generated
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    pub fn tick_count(&self) -> u64 {
        self.meta.tick
    }

    pub fn pending_ticks(&self) -> usize {
        self.scheduler.len()
    }

    pub fn properties(&self) -> LevelProperties {
        LevelProperties {
            metadata: self.meta.clone(),
            environment: self.env.clone(),
            scheduled: self.scheduler.pending(),
        }
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        self.grid.contains(pos)
    }

    /// Out-of-bounds reads return air.
    pub fn get_block(&self, pos: BlockPos) -> Block {
        if !self.grid.contains(pos) {
            return Block::AIR;
        }
        self.meta.accessed.set(unix_now());
        self.grid.get(pos)
    }

    /// Writes one cell. Returns `false` for out-of-bounds positions.
    ///
    /// Every write marks the level dirty and queues a change event for the
    /// plugin hooks. Once generation has finished it also schedules ticks
    /// around the cell, and the event asks for a broadcast.
    pub fn set_block(&mut self, pos: BlockPos, block: Block) -> bool {
        if !self.grid.set(pos, block) {
            return false;
        }
        self.meta.modified = unix_now();
        self.dirty = true;

        if self.generated {
            self.schedule_around(pos);
        }

        self.events.push(LevelEvent::BlockChanged {
            pos,
            block,
            broadcast: self.generated,
        });
        true
    }

    /// Player-driven block change.
    ///
    /// A half-slab placed on a half-slab does not occupy the target cell:
    /// the changer gets the target's previous block back and the slab below
    /// becomes the full block instead.
    pub fn change_block(
        &mut self,
        pos: BlockPos,
        block: Block,
        changer: &mut dyn PacketSink,
    ) -> Result<bool, ProtocolError> {
        if !self.grid.contains(pos) {
            return Ok(false);
        }

        let former = self.get_block(pos);
        let below = self.get_block(pos.below());
        if block.is_slab() && below.is_slab() {
            let restore = former.for_peer(changer.supports_custom_blocks());
            changer.send_packet(ClientboundPacket::set_block(
                pos.x as i16,
                pos.y as i16,
                pos.z as i16,
                restore.id(),
            ))?;
            self.set_block(pos.below(), block.full_slab_type());
            return Ok(true);
        }

        Ok(self.set_block(pos, block))
    }

    fn schedule_around(&mut self, pos: BlockPos) {
        let now = self.meta.tick;
        for cell in std::iter::once(pos).chain(pos.neighbours()) {
            if let Some(delay) = self.grid.get(cell).tick_delay() {
                self.scheduler.schedule(cell, now + delay);
            }
        }
    }

    /// Advances one world tick and runs every due scheduled tick.
    pub fn tick(&mut self) {
        self.meta.tick += 1;
        let due = self.scheduler.drain_due(self.meta.tick);
        for pos in due {
            self.apply_tick(pos);
        }
    }

    fn apply_tick(&mut self, pos: BlockPos) {
        let block = self.grid.get(pos);
        if block.falls() {
            let below = pos.below();
            if self.grid.contains(below) && is_replaceable(self.grid.get(below)) {
                self.set_block(pos, Block::AIR);
                self.set_block(below, block);
            }
        } else if block.tick_delay().is_some() && block.is_liquid() {
            let BlockPos { x, y, z } = pos;
            for target in [
                BlockPos::new(x, y - 1, z),
                BlockPos::new(x - 1, y, z),
                BlockPos::new(x + 1, y, z),
                BlockPos::new(x, y, z - 1),
                BlockPos::new(x, y, z + 1),
            ] {
                if self.grid.contains(target) && self.grid.get(target).is_air() {
                    self.set_block(target, block);
                }
            }
        }
    }

    /// Picks a spawn cell near the horizontal centre, two above the surface.
    pub fn spawn_point(&mut self) -> BlockPos {
        let radius = self.rng.gen_range(0..SPAWN_RADIUS);
        let xc = i32::from(self.grid.width()) / 2;
        let zc = i32::from(self.grid.height()) / 2;

        let (x, z) = if radius == 0 {
            (xc, zc)
        } else {
            (
                self.rng.gen_range(xc - radius..xc + radius),
                self.rng.gen_range(zc - radius..zc + radius),
            )
        };
        let x = x.clamp(0, (i32::from(self.grid.width()) - 1).max(0));
        let z = z.clamp(0, (i32::from(self.grid.height()) - 1).max(0));

        BlockPos::new(x, self.find_top_block(x, z) + 2, z)
    }

    /// Highest non-air y in a column, or -1 for an all-air column.
    pub fn find_top_block(&self, x: i32, z: i32) -> i32 {
        let mut y = i32::from(self.grid.depth()) - 1;
        while y >= 0 && self.get_block(BlockPos::new(x, y, z)).is_air() {
            y -= 1;
        }
        y
    }

    pub fn set_weather(&mut self, weather: Weather) {
        self.env.weather = weather;
        self.dirty = true;
        self.events.push(LevelEvent::Environment {
            extension: ENV_WEATHER_TYPE,
            packet: Box::new(self.env.weather_packet()),
        });
    }

    pub fn set_color(&mut self, channel: ColorChannel, color: EnvColor) {
        self.env.set_color(channel, color);
        self.dirty = true;
        self.events.push(LevelEvent::Environment {
            extension: ENV_COLORS,
            packet: Box::new(self.env.color_packet(channel)),
        });
    }

    /// Takes every queued event in the order it happened.
    pub fn drain_events(&mut self) -> Vec<LevelEvent> {
        std::mem::take(&mut self.events)
    }
}

impl GenerationTarget for Level {
    fn dimensions(&self) -> (i16, i16, i16) {
        (self.grid.width(), self.grid.depth(), self.grid.height())
    }

    fn block_at(&self, pos: BlockPos) -> Block {
        if self.grid.contains(pos) {
            self.grid.get(pos)
        } else {
            Block::AIR
        }
    }

    fn place(&mut self, pos: BlockPos, block: Block) -> bool {
        self.set_block(pos, block)
    }
}

fn is_replaceable(block: Block) -> bool {
    block.is_air() || block.is_liquid()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat() -> Level {
        let mut level = Level::generate("test", 16, 16, 16, "flat", 7).unwrap();
        level.drain_events();
        level
    }

    fn empty() -> Level {
        let mut level = Level::generate("test", 8, 8, 8, "empty", 7).unwrap();
        level.drain_events();
        level
    }

    #[test]
    fn set_block_queues_broadcast_and_schedules_after_generation() {
        let mut level = empty();
        let pos = BlockPos::new(2, 5, 2);
        assert!(level.set_block(pos, Block::SAND));
        assert_eq!(level.get_block(pos), Block::SAND);
        assert_eq!(
            level.drain_events(),
            vec![LevelEvent::BlockChanged {
                pos,
                block: Block::SAND,
                broadcast: true,
            }]
        );
        assert_eq!(level.pending_ticks(), 1);
        assert!(level.is_dirty());
    }

    #[test]
    fn out_of_bounds_set_is_rejected_without_events() {
        let mut level = empty();
        assert!(!level.set_block(BlockPos::new(8, 0, 0), Block::STONE));
        assert_eq!(level.get_block(BlockPos::new(8, 0, 0)), Block::AIR);
        assert!(level.drain_events().is_empty());
    }

    #[test]
    fn stacking_slabs_merges_into_lower_cell() {
        let mut level = flat();
        let lower = BlockPos::new(4, 8, 4);
        let upper = lower.above();
        level.set_block(lower, Block::SLAB);
        level.drain_events();

        let mut changer: Vec<ClientboundPacket> = Vec::new();
        assert!(level.change_block(upper, Block::SLAB, &mut changer).unwrap());

        assert_eq!(level.get_block(lower), Block::DOUBLE_SLAB);
        assert_eq!(level.get_block(upper), Block::AIR);
        assert_eq!(
            changer,
            vec![ClientboundPacket::set_block(4, 9, 4, Block::AIR.id())]
        );
        assert_eq!(
            level.drain_events(),
            vec![LevelEvent::BlockChanged {
                pos: lower,
                block: Block::DOUBLE_SLAB,
                broadcast: true,
            }]
        );
    }

    #[test]
    fn cobblestone_slab_merges_into_cobblestone() {
        let mut level = flat();
        let lower = BlockPos::new(1, 8, 1);
        level.set_block(lower, Block::SLAB);
        let mut changer: Vec<ClientboundPacket> = Vec::new();
        level
            .change_block(lower.above(), Block::COBBLESTONE_SLAB, &mut changer)
            .unwrap();
        assert_eq!(level.get_block(lower), Block::COBBLESTONE);
    }

    #[test]
    fn slab_on_solid_block_is_placed_normally() {
        let mut level = flat();
        let pos = BlockPos::new(3, 8, 3);
        let mut changer: Vec<ClientboundPacket> = Vec::new();
        level.change_block(pos, Block::SLAB, &mut changer).unwrap();
        assert!(changer.is_empty());
        assert_eq!(level.get_block(pos), Block::SLAB);
    }

    #[test]
    fn sand_falls_until_it_rests() {
        let mut level = flat();
        let start = BlockPos::new(5, 12, 5);
        level.set_block(start, Block::SAND);
        for _ in 0..10 {
            level.tick();
        }
        assert_eq!(level.get_block(start), Block::AIR);
        assert_eq!(level.get_block(BlockPos::new(5, 8, 5)), Block::SAND);
        assert_eq!(level.get_block(BlockPos::new(5, 7, 5)), Block::GRASS);
    }

    #[test]
    fn flowing_water_spreads_after_its_delay() {
        let mut level = flat();
        let source = BlockPos::new(8, 8, 8);
        level.set_block(source, Block::WATER);
        level.tick();
        assert_eq!(level.get_block(BlockPos::new(9, 8, 8)), Block::AIR);
        for _ in 0..4 {
            level.tick();
        }
        assert_eq!(level.get_block(BlockPos::new(9, 8, 8)), Block::WATER);
        assert_eq!(level.get_block(BlockPos::new(8, 8, 9)), Block::WATER);
    }

    #[test]
    fn spawn_is_two_above_surface_near_centre() {
        let mut level = flat();
        for _ in 0..20 {
            let spawn = level.spawn_point();
            assert_eq!(spawn.y, 9);
            assert!((spawn.x - 8).abs() <= SPAWN_RADIUS);
            assert!((spawn.z - 8).abs() <= SPAWN_RADIUS);
        }
    }

    #[test]
    fn spawn_over_empty_column_is_y_one() {
        let mut level = empty();
        assert_eq!(level.spawn_point().y, 1);
    }

    #[test]
    fn generation_queues_plugin_events_without_broadcasts() {
        let mut level = Level::generate("g", 8, 8, 8, "flat", 1).unwrap();
        assert!(level.is_generated());
        assert!(level.is_dirty());
        assert_eq!(level.pending_ticks(), 0);

        let events = level.drain_events();
        assert_eq!(events.len(), 8 * 8 * 4);
        assert!(events
            .iter()
            .all(|e| matches!(e, LevelEvent::BlockChanged { broadcast: false, .. })));
        let grass = events
            .iter()
            .filter(|e| matches!(e, LevelEvent::BlockChanged { block, .. } if *block == Block::GRASS))
            .count();
        assert_eq!(grass, 64);
    }

    #[test]
    fn empty_generation_queues_nothing() {
        let mut level = Level::generate("g", 8, 8, 8, "empty", 1).unwrap();
        assert!(level.drain_events().is_empty());
    }

    #[test]
    fn weather_change_queues_environment_event() {
        let mut level = empty();
        level.set_weather(Weather::Snow);
        assert_eq!(
            level.drain_events(),
            vec![LevelEvent::Environment {
                extension: ENV_WEATHER_TYPE,
                packet: Box::new(ClientboundPacket::EnvSetWeatherType { weather: 2 }),
            }]
        );
    }

    #[test]
    fn oversized_level_is_refused_before_allocating() {
        assert!(matches!(
            Level::generate("huge", i16::MAX, i16::MAX, i16::MAX, "empty", 0),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn unknown_generator_is_config_error() {
        assert!(matches!(
            Level::generate("x", 8, 8, 8, "nope", 0),
            Err(ConfigError::UnknownGenerator(_))
        ));
    }

    #[test]
    fn world_id_text_roundtrip() {
        let id = WorldId(0xdead_beef);
        let text = id.to_string();
        assert_eq!(text.len(), 32);
        assert_eq!(text.parse::<WorldId>().unwrap(), id);
    }
}
