//! Tile scheduler: keeps the area of interest hydrated.
//!
//! Every tick the scheduler computes the candidate cells around and ahead of
//! the aircraft and makes sure each one is either hydrated or has exactly one
//! outstanding fetch. Duplicate requesters for the same cell subscribe to the
//! same barrier channel and observe the same result.
//!
//! Fetch workers never hold the grid lock across I/O: they flip status,
//! release, do the network round-trip, then reacquire to write results.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::classify::Classifier;
use crate::geo::destination_point;
use crate::poi::PoiManager;
use crate::provider::{Client, ClientError};
use crate::store::{bounding_box, Store};
use crate::telemetry::TelemetrySlot;
use crate::wikidata::{
    self, cheap_tile_query_url, map_rows, parse_bindings, sparql_headers, LabelSource,
    SPARQL_PROVIDER, SPARQL_TIMEOUT,
};

use super::grid::{TileGrid, TileStatus};
use super::{CellId, GridStats};

/// Scheduler tuning knobs.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Cap on candidate cells per tick.
    pub max_candidate_cells: usize,
    /// Ground speed per extra forward cell, in knots.
    pub forward_kt_per_cell: f64,
    /// Cap on the forward extension depth.
    pub max_forward_cells: u32,
    /// Recent-set capacity for eviction bookkeeping.
    pub recent_cap: usize,
    /// Retry hold after a fetch failure when backoff offers no gate.
    pub failure_retry: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_candidate_cells: 32,
            forward_kt_per_cell: 90.0,
            max_forward_cells: 8,
            recent_cap: 256,
            failure_retry: Duration::from_secs(60),
        }
    }
}

/// Barrier value observed by everyone waiting on a cell fetch.
#[derive(Debug, Clone)]
pub enum FetchPhase {
    Pending,
    Hydrated { qids: Vec<String> },
    Failed { message: String },
}

/// Failure modes of a tile fetch.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Upstream(#[from] ClientError),

    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    #[error(transparent)]
    Classify(#[from] crate::classify::ClassifyError),
}

impl From<wikidata::SparqlError> for FetchError {
    fn from(e: wikidata::SparqlError) -> Self {
        FetchError::Upstream(ClientError::Transient {
            provider: SPARQL_PROVIDER.to_string(),
            reason: e.to_string(),
        })
    }
}

/// State shared between the scheduler handle and its fetch workers.
struct Shared {
    grid: RwLock<TileGrid>,
    inflight: StdMutex<HashMap<CellId, watch::Receiver<FetchPhase>>>,
    client: Arc<Client>,
    store: Store,
    classifier: Arc<Classifier>,
    labels: Arc<dyn LabelSource>,
    manager: Arc<PoiManager>,
    config: SchedulerConfig,
}

/// The tile scheduler.
pub struct TileScheduler {
    shared: Arc<Shared>,
}

impl TileScheduler {
    pub fn new(
        client: Arc<Client>,
        store: Store,
        classifier: Arc<Classifier>,
        labels: Arc<dyn LabelSource>,
        manager: Arc<PoiManager>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                grid: RwLock::new(TileGrid::new(config.recent_cap)),
                inflight: StdMutex::new(HashMap::new()),
                client,
                store,
                classifier,
                labels,
                manager,
                config,
            }),
        }
    }

    /// Candidate cells for one tick: the aircraft's cell, its neighbors, and
    /// a forward extension whose depth scales with ground speed. Ordered by
    /// distance from the aircraft, capped.
    pub fn candidate_cells(
        &self,
        lat: f64,
        lon: f64,
        heading_deg: f64,
        ground_speed_kt: f64,
    ) -> Vec<CellId> {
        let config = &self.shared.config;
        let own = CellId::from_lat_lon(lat, lon);
        let mut cells = vec![own];
        cells.extend(own.neighbors());

        let depth = ((ground_speed_kt / config.forward_kt_per_cell).ceil() as u32)
            .clamp(1, config.max_forward_cells);
        let side = own.side_m();
        for step in 1..=depth {
            let (flat, flon) = destination_point(lat, lon, step as f64 * side, heading_deg);
            let forward = CellId::from_lat_lon(flat, flon);
            cells.push(forward);
            cells.extend(forward.neighbors());
        }

        cells.sort_by(|a, b| {
            a.distance_to_m(lat, lon)
                .total_cmp(&b.distance_to_m(lat, lon))
        });
        cells.dedup();
        cells.truncate(config.max_candidate_cells);
        cells
    }

    /// One scheduler tick.
    pub async fn tick(
        &self,
        cancel: &CancellationToken,
        lat: f64,
        lon: f64,
        heading_deg: f64,
        ground_speed_kt: f64,
    ) {
        let now = Instant::now();
        let candidates = self.candidate_cells(lat, lon, heading_deg, ground_speed_kt);

        for cell in candidates {
            if cancel.is_cancelled() {
                return;
            }

            let fetchable = {
                let mut grid = self.shared.grid.write();
                grid.touch(cell, now).fetchable(now)
            };
            if !fetchable {
                continue;
            }

            let covered = self.covered_by_geodata(&cell).await;
            if !covered && !self.shared.client.backoff().allowed(SPARQL_PROVIDER) {
                // The scheduler never blocks on a gated provider; the next
                // tick will try again.
                continue;
            }

            self.ensure_cell(cancel, cell);
        }
    }

    /// Whether a persisted fetch already covers this cell at sufficient
    /// radius.
    pub async fn covered_by_geodata(&self, cell: &CellId) -> bool {
        let (clat, clon) = cell.center();
        let (min_lat, max_lat, min_lon, max_lon) = bounding_box(clat, clon, cell.side_m() / 2.0);
        match self
            .shared
            .store
            .geodata_in_bounds(min_lat, max_lat, min_lon, max_lon)
            .await
        {
            Ok(records) => records
                .iter()
                .any(|r| r.radius_m >= cell.covering_radius_m()),
            Err(e) => {
                tracing::warn!(cell = %cell, error = %e, "Geodata coverage check failed");
                false
            }
        }
    }

    /// Register interest in a cell, spawning the single fetch worker if none
    /// is in flight. Returns the barrier receiver.
    pub fn ensure_cell(
        &self,
        cancel: &CancellationToken,
        cell: CellId,
    ) -> watch::Receiver<FetchPhase> {
        let shared = &self.shared;
        let mut inflight = shared.inflight.lock().unwrap();
        if let Some(rx) = inflight.get(&cell) {
            return rx.clone();
        }

        let now = Instant::now();
        {
            let mut grid = shared.grid.write();
            let wrapper = grid.touch(cell, now);
            match &wrapper.status {
                TileStatus::Hydrated => {
                    let qids = wrapper.qids.iter().cloned().collect();
                    let (_tx, rx) = watch::channel(FetchPhase::Hydrated { qids });
                    return rx;
                }
                TileStatus::Failed { retry_after } if now < *retry_after => {
                    let (_tx, rx) = watch::channel(FetchPhase::Failed {
                        message: "retry holdoff active".to_string(),
                    });
                    return rx;
                }
                _ => {}
            }
            wrapper.status = TileStatus::InFlight;
        }

        let (tx, rx) = watch::channel(FetchPhase::Pending);
        inflight.insert(cell, rx.clone());
        drop(inflight);

        let worker_shared = Arc::clone(shared);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            worker_shared.fetch_worker(cancel, cell, tx).await;
        });

        rx
    }

    /// Hydrate a cell and wait for the outcome. Duplicate callers share one
    /// fetch.
    pub async fn hydrate_cell(&self, cancel: &CancellationToken, cell: CellId) -> FetchPhase {
        let mut rx = self.ensure_cell(cancel, cell);
        loop {
            let phase = rx.borrow().clone();
            if !matches!(phase, FetchPhase::Pending) {
                return phase;
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }

    /// Drop in-memory state for tiles far from the aircraft.
    pub fn evict_far_tiles(&self, lat: f64, lon: f64, threshold_km: f64) -> usize {
        let evicted = self.shared.grid.write().evict_far(lat, lon, threshold_km);
        if evicted > 0 {
            tracing::debug!(evicted, "Evicted far tiles");
        }
        evicted
    }

    /// Grid diagnostics snapshot.
    pub fn stats(&self) -> GridStats {
        self.shared.grid.read().stats()
    }

    /// QIDs hydrated from a cell, if any.
    pub fn hydrated_qids(&self, cell: &CellId) -> Vec<String> {
        self.shared
            .grid
            .read()
            .get(cell)
            .map(|w| w.qids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Background loop: tick on an interval from the latest telemetry
    /// snapshot until cancelled.
    pub async fn run(
        self: Arc<Self>,
        slot: Arc<TelemetrySlot>,
        interval: Duration,
        evict_threshold_km: f64,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!("Tile scheduler started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(telemetry) = slot.latest() else {
                continue;
            };
            self.tick(
                &cancel,
                telemetry.latitude,
                telemetry.longitude,
                telemetry.heading_deg,
                telemetry.ground_speed_kt,
            )
            .await;
            self.evict_far_tiles(telemetry.latitude, telemetry.longitude, evict_threshold_km);
        }
        tracing::info!("Tile scheduler stopped");
    }
}

impl Shared {
    /// The single fetch worker for one cell.
    async fn fetch_worker(
        self: Arc<Self>,
        cancel: CancellationToken,
        cell: CellId,
        tx: watch::Sender<FetchPhase>,
    ) {
        let outcome = self.fetch_cell(&cancel, cell).await;
        let now = Instant::now();

        let phase = match outcome {
            Ok(qids) => {
                let radius = cell.covering_radius_m();
                self.grid
                    .write()
                    .mark_hydrated(cell, qids.iter().cloned(), radius, now);
                tracing::debug!(cell = %cell, pois = qids.len(), "Tile hydrated");
                FetchPhase::Hydrated { qids }
            }
            Err(FetchError::Upstream(ClientError::Cancelled)) => {
                // Cancellation is not a failure; leave the cell fetchable.
                self.grid.write().set_status(cell, TileStatus::Empty, now);
                FetchPhase::Failed {
                    message: "cancelled".to_string(),
                }
            }
            Err(e) => {
                let retry_after = self.retry_after_for(&e, now);
                self.grid
                    .write()
                    .set_status(cell, TileStatus::Failed { retry_after }, now);
                tracing::warn!(cell = %cell, error = %e, "Tile fetch failed");
                FetchPhase::Failed {
                    message: e.to_string(),
                }
            }
        };

        self.inflight.lock().unwrap().remove(&cell);
        // Receivers may all be gone; that's fine.
        let _ = tx.send(phase);
    }

    fn retry_after_for(&self, error: &FetchError, now: Instant) -> Instant {
        // For upstream failures the provider's own gate is the authoritative
        // hold; the client already extended it.
        if matches!(error, FetchError::Upstream(_)) {
            if let (_, Some(next)) = self.client.backoff().get_state(SPARQL_PROVIDER) {
                return next;
            }
        }
        now + self.config.failure_retry
    }

    /// Fetch one cell: cached payload first, then the network.
    async fn fetch_cell(
        &self,
        cancel: &CancellationToken,
        cell: CellId,
    ) -> Result<Vec<String>, FetchError> {
        let (clat, clon) = cell.center();
        let radius_m = cell.covering_radius_m();

        if let Some((payload, radius)) = self.store.geodata_get(&cell.key()).await {
            if radius >= radius_m {
                tracing::debug!(cell = %cell, "Hydrating from persisted payload");
                return self.process_payload(cancel, cell, &payload).await;
            }
        }

        let url = cheap_tile_query_url(clat, clon, radius_m / 1_000.0);
        let payload = self
            .client
            .get(cancel, SPARQL_PROVIDER, &url, &sparql_headers(), SPARQL_TIMEOUT)
            .await?;

        if let Err(e) = self
            .store
            .geodata_set(&cell.key(), &payload, radius_m, clat, clon)
            .await
        {
            tracing::warn!(cell = %cell, error = %e, "Failed to persist geodata payload");
        }

        self.process_payload(cancel, cell, &payload).await
    }

    /// Turn a raw SPARQL payload into tracked POIs. Returns the QIDs handed
    /// to the manager.
    async fn process_payload(
        &self,
        cancel: &CancellationToken,
        cell: CellId,
        payload: &[u8],
    ) -> Result<Vec<String>, FetchError> {
        let rows = match parse_bindings(payload) {
            Ok(rows) => rows,
            Err(e) => {
                // A tile with an unreadable payload hydrates with zero POIs
                // rather than retry-storming the endpoint.
                tracing::warn!(cell = %cell, error = %e, "Unparseable SPARQL payload");
                return Ok(Vec::new());
            }
        };

        let mut mapped = map_rows(&rows);

        // Dedupe against this tile's previous hydration and the negative
        // cache of entities already judged unusable.
        let existing: std::collections::HashSet<String> = self
            .grid
            .read()
            .get(&cell)
            .map(|w| w.qids.iter().cloned().collect())
            .unwrap_or_default();
        mapped.retain(|m| !existing.contains(&m.poi.qid));

        let qids: Vec<String> = mapped.iter().map(|m| m.poi.qid.clone()).collect();
        let seen = self.store.get_seen_entities(&qids).await?;
        mapped.retain(|m| !seen.contains_key(&m.poi.qid));

        if mapped.is_empty() {
            return Ok(Vec::new());
        }

        // Classify by instance chain.
        let entities: Vec<(String, Vec<String>)> = mapped
            .iter()
            .map(|m| (m.poi.qid.clone(), m.instances.clone()))
            .collect();
        let categories = self.classifier.classify_batch(cancel, &entities).await?;

        // Rich hydration: attach English labels.
        let qids: Vec<String> = mapped.iter().map(|m| m.poi.qid.clone()).collect();
        let labels = self.labels.fetch_labels(cancel, &qids).await?;

        let mut tracked = Vec::new();
        let mut rejected = Vec::new();
        for mut m in mapped {
            if let Some(category) = categories.get(&m.poi.qid) {
                m.poi.category = category.clone();
            }
            match labels.get(&m.poi.qid) {
                Some(label) => {
                    m.poi.name = label.clone();
                    let qid = m.poi.qid.clone();
                    if self.manager.track_poi(m.poi).await {
                        tracked.push(qid);
                    }
                }
                None => {
                    // Nameless entities are unusable; remember them so the
                    // next hydration skips the work.
                    let instance = m.instances.first().cloned().unwrap_or_default();
                    rejected.push((m.poi.qid.clone(), instance));
                }
            }
        }

        if !rejected.is_empty() {
            if let Err(e) = self.store.mark_entities_seen(&rejected).await {
                tracing::warn!(cell = %cell, error = %e, "Failed to update seen entities");
            }
        }

        Ok(tracked)
    }
}
