//! Delayed per-cell re-evaluation queue.
//!
//! Entries are never cancelled. A cell that is overwritten before its entry
//! fires is simply re-evaluated with whatever block is there by then.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use super::grid::BlockPos;

/// One pending re-evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTick {
    pub pos: BlockPos,
    pub due: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    due: u64,
    seq: u64,
    pos: BlockPos,
}

/// Min-heap of scheduled ticks ordered by due tick, then insertion order.
#[derive(Debug, Default)]
pub struct TickScheduler {
    queue: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a scheduler from persisted entries, keeping their order.
    pub fn from_pending(pending: impl IntoIterator<Item = ScheduledTick>) -> Self {
        let mut scheduler = Self::new();
        for tick in pending {
            scheduler.schedule(tick.pos, tick.due);
        }
        scheduler
    }

    pub fn schedule(&mut self, pos: BlockPos, due: u64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(Entry { due, seq, pos }));
    }

    /// Removes and returns every entry due at or before `now`.
    pub fn drain_due(&mut self, now: u64) -> Vec<BlockPos> {
        let mut due = Vec::new();
        while let Some(Reverse(entry)) = self.queue.peek() {
            if entry.due > now {
                break;
            }
            due.push(entry.pos);
            self.queue.pop();
        }
        due
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Pending entries in firing order.
    pub fn pending(&self) -> Vec<ScheduledTick> {
        let mut entries: Vec<Entry> = self.queue.iter().map(|Reverse(e)| *e).collect();
        entries.sort();
        entries
            .into_iter()
            .map(|e| ScheduledTick {
                pos: e.pos,
                due: e.due,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_only_due_entries_in_order() {
        let mut s = TickScheduler::new();
        let a = BlockPos::new(1, 0, 0);
        let b = BlockPos::new(2, 0, 0);
        let c = BlockPos::new(3, 0, 0);
        s.schedule(c, 5);
        s.schedule(a, 2);
        s.schedule(b, 2);

        assert!(s.drain_due(1).is_empty());
        assert_eq!(s.drain_due(2), vec![a, b]);
        assert_eq!(s.len(), 1);
        assert_eq!(s.drain_due(10), vec![c]);
        assert!(s.is_empty());
    }

    #[test]
    fn duplicate_positions_are_kept() {
        let mut s = TickScheduler::new();
        let p = BlockPos::new(0, 0, 0);
        s.schedule(p, 1);
        s.schedule(p, 1);
        assert_eq!(s.drain_due(1), vec![p, p]);
    }

    #[test]
    fn pending_survives_rebuild() {
        let mut s = TickScheduler::new();
        s.schedule(BlockPos::new(0, 1, 0), 9);
        s.schedule(BlockPos::new(0, 2, 0), 3);
        let rebuilt = TickScheduler::from_pending(s.pending());
        assert_eq!(rebuilt.pending(), s.pending());
    }
}
