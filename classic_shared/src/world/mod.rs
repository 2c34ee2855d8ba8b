//! World engine: block grid, generation, scheduled ticks and persistence.

pub mod block;
pub mod environment;
pub mod generator;
pub mod grid;
pub mod level;
pub mod persistence;
pub mod scheduler;

pub use block::Block;
pub use environment::{ColorChannel, EnvColor, Environment, Weather};
pub use grid::{BlockPos, WorldGrid};
pub use level::{Level, LevelEvent, LevelProperties, WorldMetadata};
pub use scheduler::{ScheduledTick, TickScheduler};
