//! # Client Storage
//!
//! Everything a client remembers between ticks.

use std::collections::BTreeMap;

use tidewake_core::{
    ChangeDetector, EventFlags, InventoryItem, RegionFlags, SaveState, SceneAutosave,
    BOTTLE_SLOTS,
};

use crate::protocol::{PlayerId, WorldId};

/// Work scheduled a number of frames ahead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerAction {
    /// Send the download request.
    RequestDownload,
    /// Mark the initial exchange complete and fill the bottle cache.
    CompleteFirstSync,
}

/// One pending frame countdown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deferred {
    /// Frames left before the action runs.
    pub remaining: u32,
    /// What to run.
    pub action: TimerAction,
}

/// Frame-countdown timers, advanced once per tick.
#[derive(Clone, Debug, Default)]
pub struct TimerQueue {
    pending: Vec<Deferred>,
}

impl TimerQueue {
    /// Creates an empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Schedules `action` to run after `frames` ticks.
    pub fn schedule(&mut self, frames: u32, action: TimerAction) {
        self.pending.push(Deferred {
            remaining: frames,
            action,
        });
    }

    /// Counts one tick down and returns the actions now due, in
    /// scheduling order.
    pub fn advance(&mut self) -> Vec<TimerAction> {
        let mut due = Vec::new();
        self.pending.retain_mut(|timer| {
            timer.remaining = timer.remaining.saturating_sub(1);
            if timer.remaining == 0 {
                due.push(timer.action);
                false
            } else {
                true
            }
        });
        due
    }

    /// Number of pending timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True if nothing is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Client-side sync state.
#[derive(Clone, Debug)]
pub struct ClientStorage {
    /// Push / forced-resync detector.
    pub detector: ChangeDetector,
    /// Save as of the last inventory poll.
    pub snapshot: SaveState,
    /// Bottle contents as last seen or sent.
    pub bottle_cache: [InventoryItem; BOTTLE_SLOTS],
    /// Scene autosave tracker.
    pub autosave: SceneAutosave,
    /// Set once the initial download exchange has settled.
    pub first_time_sync: bool,
    /// World this client plays in.
    pub world: WorldId,
    /// Event flags as last pushed or merged.
    pub event_flags: EventFlags,
    /// Region flags as last pushed or merged.
    pub region_flags: RegionFlags,
    /// Last scene reported by each remote player.
    pub remote_scenes: BTreeMap<PlayerId, String>,
}

impl ClientStorage {
    /// Creates storage for a client in `world`.
    #[must_use]
    pub fn new(world: WorldId, resync_budget: u32) -> Self {
        Self {
            detector: ChangeDetector::new(resync_budget),
            snapshot: SaveState::default(),
            bottle_cache: [InventoryItem::None; BOTTLE_SLOTS],
            autosave: SceneAutosave::new(),
            first_time_sync: false,
            world,
            event_flags: EventFlags::new(),
            region_flags: RegionFlags::new(),
            remote_scenes: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_countdown() {
        let mut timers = TimerQueue::new();
        timers.schedule(2, TimerAction::RequestDownload);
        timers.schedule(1, TimerAction::CompleteFirstSync);

        assert_eq!(timers.advance(), vec![TimerAction::CompleteFirstSync]);
        assert_eq!(timers.len(), 1);
        assert_eq!(timers.advance(), vec![TimerAction::RequestDownload]);
        assert!(timers.is_empty());
        assert!(timers.advance().is_empty());
    }

    #[test]
    fn test_zero_delay_runs_next_tick() {
        let mut timers = TimerQueue::new();
        timers.schedule(0, TimerAction::RequestDownload);
        assert_eq!(timers.advance(), vec![TimerAction::RequestDownload]);
    }
}
