//! Bounded candle windows and the per-key window store

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use super::candle::{Candle, CandleUpdate};
use super::{WINDOW_CAPACITY, WindowKey};

/// What a merge did to the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The in-progress candle was updated in place
    Updated,
    /// A new candle was appended
    Appended,
    /// A new candle was appended and the oldest one was dropped
    Evicted { timestamp: i64 },
}

/// Bounded sequence of candles in arrival order
#[derive(Debug, Clone)]
pub struct CandleWindow {
    candles: VecDeque<Candle>,
    capacity: usize,
}

impl CandleWindow {
    pub fn new() -> Self {
        Self::with_capacity(WINDOW_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            candles: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Merge a live partial update
    ///
    /// An update for the tail bucket overwrites open and close and widens
    /// high/low. Any other timestamp is appended at the tail, even when it is
    /// older than the tail; the window is never re-sorted.
    pub fn merge(&mut self, update: &CandleUpdate) -> MergeOutcome {
        if let Some(last) = self.candles.back_mut() {
            if last.timestamp == update.timestamp {
                last.open = update.open;
                last.high = last.high.max(update.high);
                last.low = last.low.min(update.low);
                last.close = update.close;
                return MergeOutcome::Updated;
            }
        }

        self.candles.push_back(update.to_candle());

        if self.candles.len() > self.capacity {
            if let Some(evicted) = self.candles.pop_front() {
                return MergeOutcome::Evicted {
                    timestamp: evicted.timestamp,
                };
            }
        }

        MergeOutcome::Appended
    }

    /// Replace the whole window with a backfill snapshot
    ///
    /// Keeps at most `limit` candles (bounded by capacity), preferring the most
    /// recent ones when the snapshot is longer.
    pub fn replace(&mut self, candles: Vec<Candle>, limit: usize) {
        let keep = limit.min(self.capacity);
        let skip = candles.len().saturating_sub(keep);

        self.candles.clear();
        self.candles.extend(candles.into_iter().skip(skip));
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.candles.iter()
    }

    /// The most recent `count` candles, oldest first
    pub fn recent(&self, count: usize) -> Vec<Candle> {
        let skip = self.candles.len().saturating_sub(count);
        self.candles.iter().skip(skip).copied().collect()
    }

    /// Snapshot of the window for the rendering side
    pub fn to_vec(&self) -> Vec<Candle> {
        self.candles.iter().copied().collect()
    }
}

impl Default for CandleWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Windows for every key seen during the session
///
/// Entries are created on first merge or backfill and kept until the store is
/// dropped, so switching back to an earlier selection shows its window at once.
#[derive(Debug, Clone)]
pub struct WindowStore {
    windows: HashMap<WindowKey, CandleWindow>,
    capacity: usize,
}

impl WindowStore {
    pub fn new() -> Self {
        Self::with_capacity(WINDOW_CAPACITY)
    }

    /// Create a store whose windows hold at most `capacity` candles
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            windows: HashMap::new(),
            capacity,
        }
    }

    /// Merge a live update into the window for `key`
    pub fn merge(&mut self, key: WindowKey, update: &CandleUpdate) -> MergeOutcome {
        let outcome = self.entry(key).merge(update);
        debug!(
            "Merged update for {} at {}: {:?}",
            key, update.timestamp, outcome
        );
        outcome
    }

    /// Replace the window for `key` with a backfill snapshot
    pub fn replace(&mut self, key: WindowKey, candles: Vec<Candle>, limit: usize) {
        let window = self.entry(key);
        window.replace(candles, limit);
        debug!("Replaced window for {} with {} candles", key, window.len());
    }

    pub fn get(&self, key: &WindowKey) -> Option<&CandleWindow> {
        self.windows.get(key)
    }

    /// Snapshot of the window for `key`; empty when the key was never seen
    pub fn snapshot(&self, key: &WindowKey) -> Vec<Candle> {
        self.windows
            .get(key)
            .map(CandleWindow::to_vec)
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &WindowKey) -> bool {
        self.windows.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &WindowKey> {
        self.windows.keys()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    fn entry(&mut self, key: WindowKey) -> &mut CandleWindow {
        let capacity = self.capacity;
        self.windows
            .entry(key)
            .or_insert_with(|| CandleWindow::with_capacity(capacity))
    }
}

impl Default for WindowStore {
    fn default() -> Self {
        Self::new()
    }
}
