//! Level plugin hooks.
//!
//! Plugins observe the level; they never mutate it. Hooks run on the tick
//! loop after the level's event queue is drained, in registration order.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use classic_shared::world::{Block, BlockPos, Level};
use tracing::debug;

pub trait LevelPlugin: Send {
    fn name(&self) -> &str;

    fn on_level_loaded(&mut self, _level: &Level) {}

    fn on_level_block_change(&mut self, _level: &Level, _pos: BlockPos, _block: Block) {}
}

#[derive(Default)]
pub struct PluginManager {
    plugins: Vec<Box<dyn LevelPlugin>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Box<dyn LevelPlugin>) {
        debug!(plugin = plugin.name(), "Registered plugin");
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn level_loaded(&mut self, level: &Level) {
        for plugin in &mut self.plugins {
            plugin.on_level_loaded(level);
        }
    }

    pub fn block_changed(&mut self, level: &Level, pos: BlockPos, block: Block) {
        for plugin in &mut self.plugins {
            plugin.on_level_block_change(level, pos, block);
        }
    }
}

/// Counts block changes per block id. Shared so the console can read it.
#[derive(Debug, Clone, Default)]
pub struct BlockStats {
    counts: Arc<Mutex<BTreeMap<u8, u64>>>,
    loads: Arc<Mutex<u64>>,
}

impl BlockStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> u64 {
        self.counts
            .lock()
            .map(|c| c.values().sum())
            .unwrap_or_default()
    }

    pub fn count(&self, block: Block) -> u64 {
        self.counts
            .lock()
            .ok()
            .and_then(|c| c.get(&block.id()).copied())
            .unwrap_or_default()
    }

    pub fn loads(&self) -> u64 {
        self.loads.lock().map(|l| *l).unwrap_or_default()
    }
}

impl LevelPlugin for BlockStats {
    fn name(&self) -> &str {
        "block-stats"
    }

    fn on_level_loaded(&mut self, _level: &Level) {
        if let Ok(mut loads) = self.loads.lock() {
            *loads += 1;
        }
    }

    fn on_level_block_change(&mut self, _level: &Level, _pos: BlockPos, block: Block) {
        if let Ok(mut counts) = self.counts.lock() {
            *counts.entry(block.id()).or_default() += 1;
        }
    }
}
