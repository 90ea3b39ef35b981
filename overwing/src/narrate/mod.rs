//! Narration selection.
//!
//! Turns the scored candidate stream into at most one active narration.
//! Deferred POIs are skipped for the tick, cooldowns and the busy set are
//! honored by the candidate query, and the pick strategy is either "take the
//! best" or a rank-weighted sample so long flights do not narrate the same
//! greatest hits in the same order.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{SelectionStrategy, SelectorConfig};
use crate::poi::{Poi, PoiManager};
use crate::provider::BoxFuture;
use crate::store::Store;
use crate::telemetry::Telemetry;

/// Category history length kept for variety scoring.
const CATEGORY_HISTORY_LEN: usize = 8;

/// State-table keys consulted per pick (live config channel).
const STATE_STRATEGY: &str = "narration.strategy";
const STATE_MIN_SCORE: &str = "narration.min_score";

/// Playback facade failure.
#[derive(Debug, Clone, Error)]
#[error("narrator error: {0}")]
pub struct NarratorError(pub String);

/// Capability interface to the narration playback stack (TTS, LLM prompt
/// execution, audio queue). Lives outside the core.
pub trait Narrator: Send + Sync {
    /// Start narrating a POI. Returns whether playback was accepted.
    fn play_poi<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        poi: &'a Poi,
        manual: bool,
        enqueue_if_busy: bool,
        telemetry: Option<&'a Telemetry>,
    ) -> BoxFuture<'a, Result<bool, NarratorError>>;

    /// Whether a narration is currently playing or being prepared.
    fn is_busy(&self) -> bool;

    /// Whether a specific POI is being narrated or prepared right now.
    fn is_poi_busy(&self, qid: &str) -> bool;
}

/// Picks the next narration from the manager's candidates.
pub struct NarrationSelector {
    manager: Arc<PoiManager>,
    narrator: Arc<dyn Narrator>,
    store: Store,
    config: SelectorConfig,
    /// Recently narrated categories, most recent first.
    history: RwLock<VecDeque<String>>,
}

impl NarrationSelector {
    pub fn new(
        manager: Arc<PoiManager>,
        narrator: Arc<dyn Narrator>,
        store: Store,
        config: SelectorConfig,
    ) -> Self {
        Self {
            manager,
            narrator,
            store,
            config,
            history: RwLock::new(VecDeque::new()),
        }
    }

    /// Recently narrated categories, most recent first.
    pub fn recent_categories(&self) -> Vec<String> {
        self.history.read().iter().cloned().collect()
    }

    /// Busy predicate handle for the scorer input.
    pub fn busy_predicate(&self) -> crate::score::BusyPredicate {
        let narrator = Arc::clone(&self.narrator);
        Arc::new(move |qid| narrator.is_poi_busy(qid))
    }

    /// Live selector settings: static config overridden by the state table.
    async fn live_settings(&self) -> (SelectionStrategy, f64) {
        let strategy = match self.store.state_get(STATE_STRATEGY).await {
            Ok(Some(value)) => value.parse().unwrap_or(self.config.strategy),
            _ => self.config.strategy,
        };
        let min_score = self
            .store
            .state_get_or(STATE_MIN_SCORE, self.config.min_score)
            .await;
        (strategy, min_score)
    }

    /// Pick the next POI to narrate, or `None` when nothing qualifies.
    pub async fn pick_next(&self) -> Option<Poi> {
        let (strategy, min_score) = self.live_settings().await;

        let candidates: Vec<Poi> = self
            .manager
            .get_narration_candidates(self.config.candidate_limit, Some(min_score))
            .into_iter()
            .filter(|p| !p.is_deferred)
            .collect();

        if candidates.is_empty() {
            return None;
        }

        let index = match strategy {
            SelectionStrategy::Uniform => 0,
            SelectionStrategy::MinSkew => weighted_rank_sample(candidates.len(), 1.0),
            SelectionStrategy::MaxSkew => weighted_rank_sample(candidates.len(), 3.0),
        };
        candidates.into_iter().nth(index)
    }

    /// Record a completed pick: bump `last_played` and the category history.
    pub async fn mark_played(&self, poi: &Poi) {
        self.manager.mark_played(&poi.qid).await;
        if !poi.category.is_empty() {
            let mut history = self.history.write();
            history.push_front(poi.category.clone());
            while history.len() > CATEGORY_HISTORY_LEN {
                history.pop_back();
            }
        }
    }

    /// Background loop: while the narrator idles, pick and play.
    pub async fn run(
        self: Arc<Self>,
        slot: Arc<crate::telemetry::TelemetrySlot>,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!("Narration selector started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if self.narrator.is_busy() {
                continue;
            }
            let Some(poi) = self.pick_next().await else {
                // Nothing worth narrating; idle quietly.
                continue;
            };

            let telemetry = slot.latest();
            match self
                .narrator
                .play_poi(&cancel, &poi, false, false, telemetry.as_ref())
                .await
            {
                Ok(true) => {
                    tracing::info!(qid = %poi.qid, name = %poi.name, "Narrating POI");
                    self.mark_played(&poi).await;
                }
                Ok(false) => {
                    tracing::debug!(qid = %poi.qid, "Narrator declined POI");
                }
                Err(e) => {
                    tracing::warn!(qid = %poi.qid, error = %e, "Narration failed");
                }
            }
        }
        tracing::info!("Narration selector stopped");
    }
}

/// Sample an index in `0..len` with probability proportional to
/// `(len - rank)^skew`, favoring earlier (higher-scored) ranks.
fn weighted_rank_sample(len: usize, skew: f64) -> usize {
    if len <= 1 {
        return 0;
    }
    let weights: Vec<f64> = (0..len)
        .map(|rank| ((len - rank) as f64).powf(skew))
        .collect();
    let total: f64 = weights.iter().sum();
    let mut roll = rand::rng().random_range(0.0..total);
    for (index, weight) in weights.iter().enumerate() {
        if roll < *weight {
            return index;
        }
        roll -= weight;
    }
    len - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use parking_lot::Mutex;

    /// Narrator that accepts everything and records plays.
    struct RecordingNarrator {
        plays: Mutex<Vec<String>>,
        busy: std::sync::atomic::AtomicBool,
    }

    impl RecordingNarrator {
        fn new() -> Self {
            Self {
                plays: Mutex::new(Vec::new()),
                busy: std::sync::atomic::AtomicBool::new(false),
            }
        }
    }

    impl Narrator for RecordingNarrator {
        fn play_poi<'a>(
            &'a self,
            _cancel: &'a CancellationToken,
            poi: &'a Poi,
            _manual: bool,
            _enqueue_if_busy: bool,
            _telemetry: Option<&'a Telemetry>,
        ) -> BoxFuture<'a, Result<bool, NarratorError>> {
            self.plays.lock().push(poi.qid.clone());
            Box::pin(async move { Ok(true) })
        }

        fn is_busy(&self) -> bool {
            self.busy.load(std::sync::atomic::Ordering::SeqCst)
        }

        fn is_poi_busy(&self, _qid: &str) -> bool {
            false
        }
    }

    async fn selector_with(
        pois: Vec<Poi>,
    ) -> (Arc<NarrationSelector>, Arc<PoiManager>, Arc<RecordingNarrator>) {
        let store = Store::in_memory().await.unwrap();
        let manager = Arc::new(PoiManager::new(store.clone(), &ScoringConfig::default()));
        for poi in pois {
            manager.track_poi(poi).await;
        }
        let narrator = Arc::new(RecordingNarrator::new());
        let selector = Arc::new(NarrationSelector::new(
            Arc::clone(&manager),
            Arc::clone(&narrator) as Arc<dyn Narrator>,
            store,
            SelectorConfig::default(),
        ));
        (selector, manager, narrator)
    }

    fn candidate(qid: &str, score: f64) -> Poi {
        let mut poi = Poi::new(qid, 48.0, 7.0);
        poi.name = format!("POI {qid}");
        poi.category = "Church".to_string();
        poi.score = score;
        poi.visibility = 1.0;
        poi.is_visible = true;
        poi
    }

    #[tokio::test]
    async fn test_empty_world_picks_nothing() {
        let (selector, manager, _) = selector_with(vec![]).await;
        assert!(selector.pick_next().await.is_none());
        assert!(manager.get_narration_candidates(10, None).is_empty());
    }

    #[tokio::test]
    async fn test_uniform_picks_top() {
        let (selector, _, _) = selector_with(vec![
            candidate("Q1", 1.0),
            candidate("Q2", 3.0),
            candidate("Q3", 2.0),
        ])
        .await;

        let pick = selector.pick_next().await.unwrap();
        assert_eq!(pick.qid, "Q2");
    }

    #[tokio::test]
    async fn test_deferred_skipped() {
        let mut deferred = candidate("Q1", 5.0);
        deferred.is_deferred = true;
        let (selector, _, _) = selector_with(vec![deferred, candidate("Q2", 1.0)]).await;

        let pick = selector.pick_next().await.unwrap();
        assert_eq!(pick.qid, "Q2");
    }

    #[tokio::test]
    async fn test_all_deferred_picks_nothing() {
        let mut a = candidate("Q1", 5.0);
        a.is_deferred = true;
        let (selector, _, _) = selector_with(vec![a]).await;
        assert!(selector.pick_next().await.is_none());
    }

    #[tokio::test]
    async fn test_min_score_filter() {
        let (selector, _, _) = selector_with(vec![candidate("Q1", 0.05)]).await;
        // Default min score 0.1; combined score 0.05 does not qualify
        assert!(selector.pick_next().await.is_none());
    }

    #[tokio::test]
    async fn test_state_table_overrides_min_score() {
        let (selector, _, _) = selector_with(vec![candidate("Q1", 0.05)]).await;
        selector.store.state_set(STATE_MIN_SCORE, "0.01").await.unwrap();
        assert!(selector.pick_next().await.is_some());
    }

    #[tokio::test]
    async fn test_state_table_overrides_strategy() {
        let (selector, _, _) = selector_with(vec![candidate("Q1", 1.0)]).await;
        selector.store.state_set(STATE_STRATEGY, "max_skew").await.unwrap();
        let (strategy, _) = selector.live_settings().await;
        assert_eq!(strategy, SelectionStrategy::MaxSkew);
    }

    #[tokio::test]
    async fn test_invalid_state_strategy_falls_back() {
        let (selector, _, _) = selector_with(vec![]).await;
        selector.store.state_set(STATE_STRATEGY, "bogus").await.unwrap();
        let (strategy, _) = selector.live_settings().await;
        assert_eq!(strategy, SelectionStrategy::Uniform);
    }

    #[tokio::test]
    async fn test_mark_played_updates_history_and_cooldown() {
        let (selector, manager, _) = selector_with(vec![candidate("Q1", 2.0)]).await;

        let pick = selector.pick_next().await.unwrap();
        selector.mark_played(&pick).await;

        assert_eq!(selector.recent_categories(), vec!["Church".to_string()]);
        assert!(manager.get_poi("Q1").unwrap().last_played.is_some());
        // In cooldown now: no further candidates
        assert!(selector.pick_next().await.is_none());
    }

    #[tokio::test]
    async fn test_history_bounded() {
        let (selector, _, _) = selector_with(vec![]).await;
        for i in 0..20 {
            let mut poi = candidate(&format!("Q{i}"), 1.0);
            poi.category = format!("Cat{i}");
            selector.history.write().push_front(poi.category.clone());
            while selector.history.read().len() > CATEGORY_HISTORY_LEN {
                selector.history.write().pop_back();
            }
        }
        assert_eq!(selector.recent_categories().len(), CATEGORY_HISTORY_LEN);
    }

    #[tokio::test]
    async fn test_run_plays_and_marks() {
        let (selector, manager, narrator) = selector_with(vec![candidate("Q1", 2.0)]).await;
        let slot = Arc::new(crate::telemetry::TelemetrySlot::new());
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(Arc::clone(&selector).run(
            slot,
            Duration::from_millis(5),
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(60)).await;
        cancel.cancel();
        handle.await.unwrap();

        // Played exactly once, then the cooldown kept it off the air
        assert_eq!(narrator.plays.lock().as_slice(), &["Q1".to_string()]);
        assert!(manager.get_poi("Q1").unwrap().last_played.is_some());
    }

    #[test]
    fn test_weighted_rank_sample_bounds() {
        for _ in 0..200 {
            let index = weighted_rank_sample(5, 3.0);
            assert!(index < 5);
        }
        assert_eq!(weighted_rank_sample(0, 1.0), 0);
        assert_eq!(weighted_rank_sample(1, 1.0), 0);
    }

    #[test]
    fn test_weighted_rank_sample_favors_top() {
        let mut top = 0;
        for _ in 0..2_000 {
            if weighted_rank_sample(4, 3.0) == 0 {
                top += 1;
            }
        }
        // Rank 0 weight is 64 of a 100 total; allow generous slack
        assert!(top > 1_000, "top rank picked only {top}/2000 times");
    }
}
