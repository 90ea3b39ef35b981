//! In-memory tile grid state.
//!
//! Tracks the empirical hydration state of every cell the aircraft has come
//! near, plus a bounded recent set that drives far-tile eviction. The grid is
//! plain data; the scheduler wraps it in an RwLock and is its only writer.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

use super::CellId;

/// Default recent-set capacity.
pub const DEFAULT_RECENT_CAP: usize = 256;

/// Hydration status of a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileStatus {
    /// Nothing known; a fetch may start.
    Empty,
    /// A fetch worker owns this cell right now.
    InFlight,
    /// Fetched; `qids` live in the POI manager.
    Hydrated,
    /// Last fetch failed; no retry before the given instant.
    Failed { retry_after: Instant },
}

/// Per-cell state.
#[derive(Debug, Clone)]
pub struct TileWrapper {
    pub status: TileStatus,
    /// Last time the aircraft's area of interest touched this cell.
    pub seen_at: Instant,
    /// QIDs hydrated from this cell.
    pub qids: HashSet<String>,
    /// Radius the hydration fetch covered.
    pub radius_m: f64,
}

impl TileWrapper {
    fn new(now: Instant) -> Self {
        Self {
            status: TileStatus::Empty,
            seen_at: now,
            qids: HashSet::new(),
            radius_m: 0.0,
        }
    }

    /// Whether a fetch may start for this cell right now.
    pub fn fetchable(&self, now: Instant) -> bool {
        match &self.status {
            TileStatus::Empty => true,
            TileStatus::Failed { retry_after } => now >= *retry_after,
            TileStatus::InFlight | TileStatus::Hydrated => false,
        }
    }
}

/// Counters for the diagnostics surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridStats {
    pub total: usize,
    pub hydrated: usize,
    pub in_flight: usize,
    pub failed: usize,
}

/// The hydration grid plus its recent set.
#[derive(Debug)]
pub struct TileGrid {
    cells: HashMap<CellId, TileWrapper>,
    /// Touch order, oldest first; deduplicated on touch.
    recent: VecDeque<CellId>,
    recent_cap: usize,
}

impl Default for TileGrid {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_CAP)
    }
}

impl TileGrid {
    pub fn new(recent_cap: usize) -> Self {
        Self {
            cells: HashMap::new(),
            recent: VecDeque::new(),
            recent_cap: recent_cap.max(1),
        }
    }

    /// Mark a cell as part of the current area of interest, creating it if
    /// needed, and refresh the recent set.
    pub fn touch(&mut self, cell: CellId, now: Instant) -> &mut TileWrapper {
        self.recent.retain(|c| *c != cell);
        self.recent.push_back(cell);
        while self.recent.len() > self.recent_cap {
            self.recent.pop_front();
        }

        let wrapper = self.cells.entry(cell).or_insert_with(|| TileWrapper::new(now));
        wrapper.seen_at = now;
        wrapper
    }

    pub fn get(&self, cell: &CellId) -> Option<&TileWrapper> {
        self.cells.get(cell)
    }

    pub fn get_mut(&mut self, cell: &CellId) -> Option<&mut TileWrapper> {
        self.cells.get_mut(cell)
    }

    /// Flip a cell's status, creating the cell if unknown.
    pub fn set_status(&mut self, cell: CellId, status: TileStatus, now: Instant) {
        let wrapper = self.cells.entry(cell).or_insert_with(|| TileWrapper::new(now));
        wrapper.status = status;
    }

    /// Record a successful hydration.
    pub fn mark_hydrated(
        &mut self,
        cell: CellId,
        qids: impl IntoIterator<Item = String>,
        radius_m: f64,
        now: Instant,
    ) {
        let wrapper = self.cells.entry(cell).or_insert_with(|| TileWrapper::new(now));
        wrapper.status = TileStatus::Hydrated;
        wrapper.qids.extend(qids);
        wrapper.radius_m = radius_m;
        wrapper.seen_at = now;
    }

    /// Drop in-memory state for recent cells farther than `threshold_km`
    /// from the aircraft. Persistent records are untouched. Returns the
    /// number of cells evicted.
    pub fn evict_far(&mut self, lat: f64, lon: f64, threshold_km: f64) -> usize {
        let threshold_m = threshold_km * 1_000.0;
        let far: Vec<CellId> = self
            .recent
            .iter()
            .filter(|cell| cell.distance_to_m(lat, lon) > threshold_m)
            .copied()
            .collect();

        for cell in &far {
            self.cells.remove(cell);
            self.recent.retain(|c| c != cell);
        }
        far.len()
    }

    /// Diagnostics snapshot.
    pub fn stats(&self) -> GridStats {
        let mut stats = GridStats {
            total: self.cells.len(),
            ..Default::default()
        };
        for wrapper in self.cells.values() {
            match wrapper.status {
                TileStatus::Hydrated => stats.hydrated += 1,
                TileStatus::InFlight => stats.in_flight += 1,
                TileStatus::Failed { .. } => stats.failed += 1,
                TileStatus::Empty => {}
            }
        }
        stats
    }

    /// Number of cells in the recent set.
    pub fn recent_len(&self) -> usize {
        self.recent.len()
    }
}
