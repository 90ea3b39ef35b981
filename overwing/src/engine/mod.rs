//! Engine wiring.
//!
//! Builds the long-lived singletons (store, backoff, client, classifier,
//! manager, scheduler, scorer, selector), spawns the background loops and
//! owns the root cancellation token. Everything is passed by handle; there
//! are no ambient statics.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::classify::{CategoryRuleset, Classifier, RegionalRegistry};
use crate::config::EngineConfig;
use crate::country::CachedCountryService;
use crate::elevation::ElevationGetter;
use crate::narrate::{NarrationSelector, Narrator};
use crate::poi::{PoiManager, RiverSentinel};
use crate::provider::{Client, ProviderBackoff, ReqwestTransport, TransportError};
use crate::score::{Scorer, ScoringInput};
use crate::store::Store;
use crate::telemetry::{SimClient, TelemetryPipeline, TelemetrySlot};
use crate::tile::{SchedulerConfig, TileScheduler};
use crate::visibility::VisibilityTable;
use crate::wikidata::{EntityApi, Validator};

/// Soft deadline for draining background loops on shutdown.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(3);

/// State-table keys for live scoring knobs.
const STATE_VISIBILITY_BOOST: &str = "scoring.visibility_boost";
const STATE_REPEAT_TTL_SECS: &str = "scoring.repeat_ttl_secs";

/// Everything the engine needs from its embedding application.
pub struct EngineBuilder {
    config: EngineConfig,
    store: Store,
    table: Arc<VisibilityTable>,
    categories: crate::config::CategoriesConfig,
    ruleset: CategoryRuleset,
    sim: Arc<dyn SimClient>,
    narrator: Arc<dyn Narrator>,
    elevation: Arc<dyn ElevationGetter>,
    river_sentinel: Option<Arc<dyn RiverSentinel>>,
    country: Option<Arc<CachedCountryService>>,
}

impl EngineBuilder {
    pub fn new(
        config: EngineConfig,
        store: Store,
        table: VisibilityTable,
        categories: crate::config::CategoriesConfig,
        ruleset: CategoryRuleset,
        sim: Arc<dyn SimClient>,
        narrator: Arc<dyn Narrator>,
        elevation: Arc<dyn ElevationGetter>,
    ) -> Self {
        Self {
            config,
            store,
            table: Arc::new(table),
            categories,
            ruleset,
            sim,
            narrator,
            elevation,
            river_sentinel: None,
            country: None,
        }
    }

    /// Attach the river GeoJSON sentinel.
    pub fn with_river_sentinel(mut self, sentinel: Arc<dyn RiverSentinel>) -> Self {
        self.river_sentinel = Some(sentinel);
        self
    }

    /// Attach the country lookup cache (for its maintenance loop).
    pub fn with_country_service(mut self, country: Arc<CachedCountryService>) -> Self {
        self.country = Some(country);
        self
    }

    /// Construct the engine. Fails only if the HTTP transport cannot be
    /// built.
    pub fn build(self) -> Result<Engine, TransportError> {
        let backoff = Arc::new(ProviderBackoff::default());
        let client = Arc::new(Client::new(Arc::new(ReqwestTransport::new()?), backoff));

        let entity_api = Arc::new(EntityApi::new(Arc::clone(&client), self.store.clone()));
        let regional = Arc::new(RegionalRegistry::new());
        let classifier = Arc::new(Classifier::new(
            self.store.clone(),
            Arc::clone(&entity_api) as Arc<dyn crate::classify::NodeSource>,
            self.ruleset,
            Arc::clone(&regional),
        ));

        let mut manager = PoiManager::new(self.store.clone(), &self.config.scoring);
        if let Some(sentinel) = self.river_sentinel {
            let validator = Arc::new(Validator::new(
                Arc::clone(&entity_api) as Arc<dyn crate::wikidata::LabelSource>
            ));
            manager = manager.with_river_support(sentinel, validator);
        }
        let manager = Arc::new(manager);

        let scheduler = Arc::new(TileScheduler::new(
            Arc::clone(&client),
            self.store.clone(),
            Arc::clone(&classifier),
            Arc::clone(&entity_api) as Arc<dyn crate::wikidata::LabelSource>,
            Arc::clone(&manager),
            SchedulerConfig {
                max_candidate_cells: self.config.max_candidate_cells,
                ..SchedulerConfig::default()
            },
        ));

        let scorer = Arc::new(Scorer::new(
            Arc::clone(&self.table),
            self.categories,
            self.config.scoring.clone(),
            self.elevation,
        ));

        let slot = Arc::new(TelemetrySlot::new());
        let pipeline = Arc::new(TelemetryPipeline::new(Arc::clone(&slot)));

        let selector = Arc::new(NarrationSelector::new(
            Arc::clone(&manager),
            self.narrator,
            self.store.clone(),
            self.config.selector.clone(),
        ));

        Ok(Engine {
            config: self.config,
            store: self.store,
            manager,
            scheduler,
            scorer,
            selector,
            pipeline,
            slot,
            sim: self.sim,
            country: self.country,
            classifier,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }
}

/// The running engine: owns the loops, hands out component handles.
pub struct Engine {
    config: EngineConfig,
    store: Store,
    manager: Arc<PoiManager>,
    scheduler: Arc<TileScheduler>,
    scorer: Arc<Scorer>,
    selector: Arc<NarrationSelector>,
    pipeline: Arc<TelemetryPipeline>,
    slot: Arc<TelemetrySlot>,
    sim: Arc<dyn SimClient>,
    country: Option<Arc<CachedCountryService>>,
    classifier: Arc<Classifier>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    pub fn manager(&self) -> &Arc<PoiManager> {
        &self.manager
    }

    pub fn scheduler(&self) -> &Arc<TileScheduler> {
        &self.scheduler
    }

    pub fn scorer(&self) -> &Arc<Scorer> {
        &self.scorer
    }

    pub fn selector(&self) -> &Arc<NarrationSelector> {
        &self.selector
    }

    pub fn classifier(&self) -> &Arc<Classifier> {
        &self.classifier
    }

    pub fn telemetry(&self) -> &Arc<TelemetrySlot> {
        &self.slot
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Spawn all background loops.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            tracing::warn!("Engine already started");
            return;
        }

        tasks.push(tokio::spawn(Arc::clone(&self.pipeline).run(
            Arc::clone(&self.sim),
            self.config.tick_interval,
            self.cancel.clone(),
        )));

        tasks.push(tokio::spawn(Arc::clone(&self.scheduler).run(
            Arc::clone(&self.slot),
            self.config.tick_interval,
            self.config.evict_threshold_km,
            self.cancel.clone(),
        )));

        tasks.push(tokio::spawn(Self::scoring_loop(
            Arc::clone(&self.manager),
            Arc::clone(&self.scorer),
            Arc::clone(&self.selector),
            Arc::clone(&self.slot),
            self.store.clone(),
            self.config.clone(),
            self.cancel.clone(),
        )));

        tasks.push(tokio::spawn(Arc::clone(&self.selector).run(
            Arc::clone(&self.slot),
            self.config.tick_interval,
            self.cancel.clone(),
        )));

        if let Some(country) = &self.country {
            tasks.push(tokio::spawn(Arc::clone(country).run_pruner(
                Duration::from_secs(60),
                self.cancel.clone(),
            )));
        }

        tracing::info!(loops = tasks.len(), "Engine started");
    }

    /// The scorer tick loop: session per tick, sequential per-POI scoring,
    /// then pruning.
    async fn scoring_loop(
        manager: Arc<PoiManager>,
        scorer: Arc<Scorer>,
        selector: Arc<NarrationSelector>,
        slot: Arc<TelemetrySlot>,
        store: Store,
        config: EngineConfig,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(config.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!("Scorer loop started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(telemetry) = slot.latest() else {
                continue;
            };

            // Live knobs from the state table; static config as fallback.
            let boost = store
                .state_get_or(
                    STATE_VISIBILITY_BOOST,
                    config.scoring.visibility_boost,
                )
                .await;
            let repeat_secs = store
                .state_get_or(
                    STATE_REPEAT_TTL_SECS,
                    config.scoring.repeat_ttl.as_secs() as i64,
                )
                .await;

            let input = ScoringInput {
                telemetry,
                category_history: selector.recent_categories(),
                repeat_ttl: chrono::Duration::seconds(repeat_secs),
                visibility_boost: boost,
                busy: selector.busy_predicate(),
            };

            let session = scorer.new_session(&cancel, input).await;
            manager.score_all(|poi| session.calculate(poi));
            manager.prune_tracked(config.prune_max_age);
        }
        tracing::info!("Scorer loop stopped");
    }

    /// Cancel everything and drain the loops with a soft deadline.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if tokio::time::timeout(SHUTDOWN_DRAIN, task).await.is_err() {
                tracing::warn!("Background loop did not drain before the deadline");
            }
        }
        tracing::info!("Engine stopped");
    }
}
