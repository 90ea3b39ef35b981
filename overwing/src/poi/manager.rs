//! In-memory POI registry.
//!
//! The manager owns the map of tracked POIs under an RwLock and mediates
//! between the hydration path (which inserts), the scorer (which mutates the
//! volatile fields), the narration selector (which reads candidates and marks
//! plays) and the UI queries. Durable fields round-trip through the store on
//! every merge so a restart recovers cooldowns.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, ScoringConfig};
use crate::geo::haversine_m;
use crate::store::Store;
use crate::wikidata::Validator;

use super::rivers::RiverSentinel;
use super::{Poi, PoiSource};

/// UI POI-list mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiMode {
    #[default]
    Fixed,
    Adaptive,
}

impl FromStr for UiMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(UiMode::Fixed),
            "adaptive" => Ok(UiMode::Adaptive),
            _ => Err(ConfigError::InvalidValue {
                field: "ui mode",
                value: s.to_string(),
            }),
        }
    }
}

/// Result of a UI POI query.
#[derive(Debug, Clone)]
pub struct UiSelection {
    pub pois: Vec<Poi>,
    /// Score a POI needed to make this list; `NEG_INFINITY` when the
    /// adaptive mode ran out of scored POIs.
    pub effective_threshold: f64,
}

/// Thread-safe registry of tracked POIs.
pub struct PoiManager {
    pois: RwLock<HashMap<String, Poi>>,
    store: Store,
    repeat_ttl: chrono::Duration,
    river_sentinel: Option<Arc<dyn RiverSentinel>>,
    validator: Option<Arc<Validator>>,
}

impl PoiManager {
    pub fn new(store: Store, scoring: &ScoringConfig) -> Self {
        let repeat_ttl =
            chrono::Duration::from_std(scoring.repeat_ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            pois: RwLock::new(HashMap::new()),
            store,
            repeat_ttl,
            river_sentinel: None,
            validator: None,
        }
    }

    /// Attach the river sentinel and validator used by `update_rivers`.
    pub fn with_river_support(
        mut self,
        sentinel: Arc<dyn RiverSentinel>,
        validator: Arc<Validator>,
    ) -> Self {
        self.river_sentinel = Some(sentinel);
        self.validator = Some(validator);
        self
    }

    /// Track (or merge) a POI. Nameless POIs are dropped silently. Returns
    /// whether the POI is tracked afterwards.
    ///
    /// The merge never lets a delayed hydration move `last_played` backwards:
    /// the in-memory value and the store row both contribute, and the newest
    /// instant wins.
    pub async fn track_poi(&self, poi: Poi) -> bool {
        if poi.name.is_empty() {
            tracing::debug!(qid = %poi.qid, "Dropping nameless POI");
            return false;
        }
        if poi.qid.is_empty() {
            tracing::error!("Dropping POI with empty QID");
            return false;
        }

        // Recover durable state for first sightings before taking the lock.
        let stored = if !self.pois.read().contains_key(&poi.qid) {
            match self.store.get_poi(&poi.qid).await {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!(qid = %poi.qid, error = %e, "Store lookup failed during track");
                    None
                }
            }
        } else {
            None
        };

        let merged = {
            let mut pois = self.pois.write();
            let entry = pois
                .entry(poi.qid.clone())
                .or_insert_with(|| stored.unwrap_or_else(|| poi.clone()));
            entry.merge_from(&poi);
            entry.clone()
        };

        if let Err(e) = self.store.save_poi(&merged).await {
            tracing::warn!(qid = %merged.qid, error = %e, "Failed to persist POI");
        }
        true
    }

    /// Alias used by the hydration path; same semantics as `track_poi`.
    pub async fn upsert_poi(&self, poi: Poi) -> bool {
        self.track_poi(poi).await
    }

    /// Remove POIs tracked longer than `max_age`. Returns the count removed.
    pub fn prune_tracked(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let mut pois = self.pois.write();
        let before = pois.len();
        pois.retain(|_, poi| poi.created_at >= cutoff);
        let removed = before - pois.len();
        if removed > 0 {
            tracing::debug!(removed, "Pruned stale POIs");
        }
        removed
    }

    /// Snapshot of every tracked POI.
    pub fn get_tracked_pois(&self) -> Vec<Poi> {
        self.pois.read().values().cloned().collect()
    }

    /// One POI by QID.
    pub fn get_poi(&self, qid: &str) -> Option<Poi> {
        self.pois.read().get(qid).cloned()
    }

    /// Number of tracked POIs.
    pub fn active_count(&self) -> usize {
        self.pois.read().len()
    }

    /// Run one scoring pass over every tracked POI under the write lock, so
    /// readers observe the tick atomically.
    pub fn score_all(&self, mut calculate: impl FnMut(&mut Poi)) {
        let mut pois = self.pois.write();
        for poi in pois.values_mut() {
            calculate(poi);
        }
    }

    /// Count tracked POIs whose combined score beats `threshold` and which
    /// are out of cooldown, up to `cap`.
    pub fn count_scored_above(&self, threshold: f64, cap: usize) -> usize {
        let now = Utc::now();
        self.pois
            .read()
            .values()
            .filter(|p| p.combined_score() > threshold && !p.in_cooldown(now, self.repeat_ttl))
            .take(cap)
            .count()
    }

    /// POIs for the UI list.
    ///
    /// Fixed mode keeps everything at or above `min_score`; adaptive mode
    /// sizes the threshold so roughly `target_count` POIs show. Both modes
    /// keep recently-played POIs visible through their cooldown.
    pub fn get_pois_for_ui(&self, mode: UiMode, target_count: usize, min_score: f64) -> UiSelection {
        let now = Utc::now();
        let pois = self.pois.read();

        let recently_played: Vec<Poi> = pois
            .values()
            .filter(|p| p.in_cooldown(now, self.repeat_ttl))
            .cloned()
            .collect();

        match mode {
            UiMode::Fixed => {
                let mut selected: Vec<Poi> = pois
                    .values()
                    .filter(|p| p.combined_score() >= min_score)
                    .cloned()
                    .collect();
                Self::append_unique(&mut selected, recently_played);
                UiSelection {
                    pois: selected,
                    effective_threshold: min_score,
                }
            }
            UiMode::Adaptive => {
                if target_count == 0 {
                    // No scored slots requested: only cooldown POIs show
                    return UiSelection {
                        pois: recently_played,
                        effective_threshold: f64::INFINITY,
                    };
                }

                let mut scored: Vec<Poi> = pois
                    .values()
                    .filter(|p| p.combined_score() > 0.0)
                    .cloned()
                    .collect();
                scored.sort_by(|a, b| b.combined_score().total_cmp(&a.combined_score()));

                if scored.len() <= target_count {
                    // Exhausted: everything shows
                    Self::append_unique(&mut scored, recently_played);
                    return UiSelection {
                        pois: scored,
                        effective_threshold: f64::NEG_INFINITY,
                    };
                }

                let threshold = scored[target_count - 1].combined_score();
                let mut selected: Vec<Poi> = scored
                    .into_iter()
                    .take_while(|p| p.combined_score() >= threshold)
                    .collect();
                Self::append_unique(&mut selected, recently_played);
                UiSelection {
                    pois: selected,
                    effective_threshold: threshold,
                }
            }
        }
    }

    fn append_unique(selected: &mut Vec<Poi>, extra: Vec<Poi>) {
        for poi in extra {
            if !selected.iter().any(|p| p.qid == poi.qid) {
                selected.push(poi);
            }
        }
    }

    /// Visible, out-of-cooldown POIs ranked by combined score.
    pub fn get_narration_candidates(&self, limit: usize, min_score: Option<f64>) -> Vec<Poi> {
        let now = Utc::now();
        let mut candidates: Vec<Poi> = self
            .pois
            .read()
            .values()
            .filter(|p| p.is_visible && !p.in_cooldown(now, self.repeat_ttl))
            .filter(|p| min_score.map(|m| p.combined_score() >= m).unwrap_or(true))
            .cloned()
            .collect();
        candidates.sort_by(|a, b| b.combined_score().total_cmp(&a.combined_score()));
        candidates.truncate(limit);
        candidates
    }

    /// Record a narration: `last_played = now`, in memory and durably.
    pub async fn mark_played(&self, qid: &str) -> Option<Poi> {
        let updated = {
            let mut pois = self.pois.write();
            let poi = pois.get_mut(qid)?;
            poi.last_played = Some(Utc::now());
            poi.clone()
        };
        if let Err(e) = self.store.save_poi(&updated).await {
            tracing::warn!(qid, error = %e, "Failed to persist last-played");
        }
        Some(updated)
    }

    /// Clear `last_played` within a radius, in memory and in the store.
    /// Returns the number of POIs cleared.
    pub async fn reset_last_played(&self, lat: f64, lon: f64, radius_m: f64) -> u64 {
        let mut cleared = {
            let mut pois = self.pois.write();
            let mut count = 0u64;
            for poi in pois.values_mut() {
                if poi.last_played.is_some()
                    && haversine_m(lat, lon, poi.lat, poi.lon) <= radius_m
                {
                    poi.last_played = None;
                    count += 1;
                }
            }
            count
        };

        match self.store.clear_last_played_within(lat, lon, radius_m).await {
            Ok(stored) => cleared = cleared.max(stored),
            Err(e) => tracing::warn!(error = %e, "Failed to clear last-played in store"),
        }
        cleared
    }

    /// Consult the river sentinel for the best river ahead, confirm its
    /// identity, snap its coordinates to the closest point on the polyline,
    /// and track it.
    pub async fn update_rivers(
        &self,
        cancel: &CancellationToken,
        lat: f64,
        lon: f64,
        heading_deg: f64,
    ) -> Option<Poi> {
        let sentinel = self.river_sentinel.as_ref()?;
        let validator = self.validator.as_ref()?;

        let candidate = sentinel.best_candidate_ahead(lat, lon, heading_deg)?;
        let guess = candidate.qid_guess.clone()?;

        let suggestions = HashMap::from([(candidate.name.clone(), guess)]);
        let confirmed = match validator.validate(cancel, &suggestions).await {
            Ok(confirmed) => confirmed,
            Err(e) => {
                tracing::warn!(river = %candidate.name, error = %e, "River validation failed");
                return None;
            }
        };
        let entity = confirmed.get(&candidate.name)?;

        let (plat, plon) = candidate.closest_point(lat, lon)?;
        let mut poi = Poi::new(entity.qid.clone(), plat, plon);
        poi.name = entity.label.clone();
        poi.category = "River".to_string();
        poi.source = PoiSource::River;

        if self.track_poi(poi).await {
            self.get_poi(&entity.qid)
        } else {
            None
        }
    }

    /// Repeat TTL the manager applies to cooldown checks.
    pub fn repeat_ttl(&self) -> chrono::Duration {
        self.repeat_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poi::rivers::RiverCandidate;
    use crate::wikidata::LabelSource;
    use chrono::Duration as ChronoDuration;

    async fn manager() -> PoiManager {
        let store = Store::in_memory().await.unwrap();
        PoiManager::new(store, &ScoringConfig::default())
    }

    fn named(qid: &str, name: &str, lat: f64, lon: f64) -> Poi {
        let mut poi = Poi::new(qid, lat, lon);
        poi.name = name.to_string();
        poi
    }

    fn scored(qid: &str, score: f64, visibility: f64) -> Poi {
        let mut poi = named(qid, qid, 48.0, 7.0);
        poi.score = score;
        poi.visibility = visibility;
        poi.is_visible = visibility > 0.0;
        poi
    }

    #[tokio::test]
    async fn test_track_and_get() {
        let m = manager().await;
        assert!(m.track_poi(named("Q1", "Minster", 48.0, 7.85)).await);
        assert_eq!(m.active_count(), 1);
        assert_eq!(m.get_poi("Q1").unwrap().name, "Minster");
    }

    #[tokio::test]
    async fn test_nameless_dropped_silently() {
        let m = manager().await;
        assert!(!m.track_poi(Poi::new("Q1", 48.0, 7.85)).await);
        assert_eq!(m.active_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_qid_dropped() {
        let m = manager().await;
        let mut poi = Poi::new("", 48.0, 7.85);
        poi.name = "ghost".to_string();
        assert!(!m.track_poi(poi).await);
    }

    #[tokio::test]
    async fn test_merge_keeps_newer_last_played() {
        let m = manager().await;
        let mut first = named("Q1", "Minster", 48.0, 7.85);
        first.last_played = Some(Utc::now());
        m.track_poi(first.clone()).await;

        // A hydration copy without last_played must not erase it
        let rehydrated = named("Q1", "Minster", 48.0, 7.85);
        m.track_poi(rehydrated).await;
        assert!(m.get_poi("Q1").unwrap().last_played.is_some());
    }

    #[tokio::test]
    async fn test_last_played_recovered_from_store() {
        let store = Store::in_memory().await.unwrap();
        let m = PoiManager::new(store.clone(), &ScoringConfig::default());

        let mut poi = named("Q1", "Minster", 48.0, 7.85);
        let played = Utc::now() - ChronoDuration::minutes(30);
        poi.last_played = Some(played);
        store.save_poi(&poi).await.unwrap();

        // Fresh hydration after restart: memory is empty, store is not
        m.track_poi(named("Q1", "Minster", 48.0, 7.85)).await;
        let got = m.get_poi("Q1").unwrap().last_played.unwrap();
        assert!((got - played).num_seconds().abs() < 2);
    }

    #[tokio::test]
    async fn test_prune_tracked() {
        let m = manager().await;
        let mut old = named("Q1", "Old", 48.0, 7.0);
        old.created_at = Utc::now() - ChronoDuration::hours(2);
        m.track_poi(old).await;
        m.track_poi(named("Q2", "New", 48.0, 7.1)).await;

        let removed = m.prune_tracked(Duration::from_secs(3600));
        assert_eq!(removed, 1);
        assert!(m.get_poi("Q1").is_none());
        assert!(m.get_poi("Q2").is_some());
    }

    #[tokio::test]
    async fn test_count_scored_above() {
        let m = manager().await;
        for (qid, score, vis) in [("Q1", 2.0, 0.8), ("Q2", 1.0, 0.1), ("Q3", 3.0, 0.9)] {
            m.track_poi(scored(qid, score, vis)).await;
        }

        assert_eq!(m.count_scored_above(1.0, 10), 2); // Q1: 1.6, Q3: 2.7
        assert_eq!(m.count_scored_above(1.0, 1), 1); // capped
        assert_eq!(m.count_scored_above(5.0, 10), 0);
    }

    #[tokio::test]
    async fn test_count_scored_above_excludes_cooldown() {
        let m = manager().await;
        let mut poi = scored("Q1", 2.0, 0.8);
        poi.last_played = Some(Utc::now());
        m.track_poi(poi).await;
        assert_eq!(m.count_scored_above(1.0, 10), 0);
    }

    #[tokio::test]
    async fn test_ui_fixed_mode() {
        let m = manager().await;
        m.track_poi(scored("Q1", 2.0, 0.8)).await; // 1.6
        m.track_poi(scored("Q2", 0.1, 0.1)).await; // 0.01
        let mut played = scored("Q3", 0.0, 0.0);
        played.last_played = Some(Utc::now());
        m.track_poi(played).await;

        let selection = m.get_pois_for_ui(UiMode::Fixed, 0, 1.0);
        let qids: Vec<&str> = selection.pois.iter().map(|p| p.qid.as_str()).collect();
        assert!(qids.contains(&"Q1"));
        assert!(!qids.contains(&"Q2"));
        // Recently played stays visible during cooldown regardless of score
        assert!(qids.contains(&"Q3"));
        assert_eq!(selection.effective_threshold, 1.0);
    }

    #[tokio::test]
    async fn test_ui_adaptive_mode_threshold() {
        let m = manager().await;
        m.track_poi(scored("Q1", 5.0, 1.0)).await;
        m.track_poi(scored("Q2", 4.0, 1.0)).await;
        m.track_poi(scored("Q3", 3.0, 1.0)).await;
        m.track_poi(scored("Q4", 2.0, 1.0)).await;

        let selection = m.get_pois_for_ui(UiMode::Adaptive, 2, 0.0);
        assert_eq!(selection.pois.len(), 2);
        assert_eq!(selection.effective_threshold, 4.0);
    }

    #[tokio::test]
    async fn test_ui_adaptive_includes_ties() {
        let m = manager().await;
        m.track_poi(scored("Q1", 5.0, 1.0)).await;
        m.track_poi(scored("Q2", 4.0, 1.0)).await;
        m.track_poi(scored("Q3", 4.0, 1.0)).await;
        m.track_poi(scored("Q4", 2.0, 1.0)).await;

        let selection = m.get_pois_for_ui(UiMode::Adaptive, 2, 0.0);
        // Ties at the threshold score all show
        assert_eq!(selection.pois.len(), 3);
        assert_eq!(selection.effective_threshold, 4.0);
    }

    #[tokio::test]
    async fn test_ui_adaptive_exhausted() {
        let m = manager().await;
        m.track_poi(scored("Q1", 5.0, 1.0)).await;

        let selection = m.get_pois_for_ui(UiMode::Adaptive, 10, 0.0);
        assert_eq!(selection.pois.len(), 1);
        assert_eq!(selection.effective_threshold, f64::NEG_INFINITY);
    }

    #[tokio::test]
    async fn test_ui_adaptive_zero_target() {
        let m = manager().await;
        m.track_poi(scored("Q1", 5.0, 1.0)).await;
        m.track_poi(scored("Q2", 4.0, 1.0)).await;
        let mut played = scored("Q3", 0.0, 0.0);
        played.last_played = Some(Utc::now());
        m.track_poi(played).await;

        // A zero target shows no scored POIs, only the cooldown ones
        let selection = m.get_pois_for_ui(UiMode::Adaptive, 0, 0.0);
        let qids: Vec<&str> = selection.pois.iter().map(|p| p.qid.as_str()).collect();
        assert_eq!(qids, vec!["Q3"]);
        assert_eq!(selection.effective_threshold, f64::INFINITY);
    }

    #[tokio::test]
    async fn test_ui_adaptive_zero_target_empty_manager() {
        let m = manager().await;
        let selection = m.get_pois_for_ui(UiMode::Adaptive, 0, 0.0);
        assert!(selection.pois.is_empty());
        assert_eq!(selection.effective_threshold, f64::INFINITY);
    }

    #[tokio::test]
    async fn test_narration_candidates_filtering() {
        let m = manager().await;
        m.track_poi(scored("Q1", 2.0, 0.8)).await;

        let mut invisible = scored("Q2", 5.0, 0.0);
        invisible.is_visible = false;
        m.track_poi(invisible).await;

        let mut cooling = scored("Q3", 4.0, 0.9);
        cooling.last_played = Some(Utc::now());
        m.track_poi(cooling).await;

        let candidates = m.get_narration_candidates(10, None);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].qid, "Q1");
    }

    #[tokio::test]
    async fn test_narration_candidates_sorted_and_truncated() {
        let m = manager().await;
        m.track_poi(scored("Q1", 1.0, 1.0)).await;
        m.track_poi(scored("Q2", 3.0, 1.0)).await;
        m.track_poi(scored("Q3", 2.0, 1.0)).await;

        let candidates = m.get_narration_candidates(2, None);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].qid, "Q2");
        assert_eq!(candidates[1].qid, "Q3");
    }

    #[tokio::test]
    async fn test_narration_candidates_min_score() {
        let m = manager().await;
        m.track_poi(scored("Q1", 1.0, 0.5)).await; // 0.5
        m.track_poi(scored("Q2", 3.0, 1.0)).await; // 3.0

        let candidates = m.get_narration_candidates(10, Some(1.0));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].qid, "Q2");
    }

    #[tokio::test]
    async fn test_mark_played_persists() {
        let store = Store::in_memory().await.unwrap();
        let m = PoiManager::new(store.clone(), &ScoringConfig::default());
        m.track_poi(named("Q1", "Minster", 48.0, 7.85)).await;

        assert!(m.mark_played("Q1").await.is_some());
        assert!(m.get_poi("Q1").unwrap().last_played.is_some());
        assert!(store.get_poi("Q1").await.unwrap().unwrap().last_played.is_some());
    }

    #[tokio::test]
    async fn test_mark_played_unknown() {
        let m = manager().await;
        assert!(m.mark_played("Q404").await.is_none());
    }

    #[tokio::test]
    async fn test_reset_last_played() {
        let m = manager().await;
        let mut near = named("Q1", "Near", 48.0, 7.85);
        near.last_played = Some(Utc::now());
        m.track_poi(near).await;

        let mut far = named("Q2", "Far", 52.5, 13.4);
        far.last_played = Some(Utc::now());
        m.track_poi(far).await;

        let cleared = m.reset_last_played(48.0, 7.85, 50_000.0).await;
        assert_eq!(cleared, 1);
        assert!(m.get_poi("Q1").unwrap().last_played.is_none());
        assert!(m.get_poi("Q2").unwrap().last_played.is_some());
    }

    #[tokio::test]
    async fn test_score_all_mutates_under_lock() {
        let m = manager().await;
        m.track_poi(named("Q1", "A", 48.0, 7.0)).await;
        m.track_poi(named("Q2", "B", 48.0, 7.1)).await;

        m.score_all(|poi| {
            poi.score = 2.0;
            poi.visibility = 0.5;
            poi.is_visible = true;
        });

        assert!(m.get_tracked_pois().iter().all(|p| p.combined_score() == 1.0));
    }

    struct FixedSentinel(RiverCandidate);
    impl RiverSentinel for FixedSentinel {
        fn best_candidate_ahead(
            &self,
            _lat: f64,
            _lon: f64,
            _heading_deg: f64,
        ) -> Option<RiverCandidate> {
            Some(self.0.clone())
        }
    }

    struct RiverLabels;
    impl LabelSource for RiverLabels {
        fn fetch_labels<'a>(
            &'a self,
            _cancel: &'a CancellationToken,
            qids: &'a [String],
        ) -> crate::provider::BoxFuture<
            'a,
            Result<HashMap<String, String>, crate::provider::ClientError>,
        > {
            let out = qids
                .iter()
                .filter(|q| q.as_str() == "Q584")
                .map(|q| (q.clone(), "Rhine".to_string()))
                .collect();
            Box::pin(async move { Ok(out) })
        }

        fn search<'a>(
            &'a self,
            _cancel: &'a CancellationToken,
            _name: &'a str,
        ) -> crate::provider::BoxFuture<
            'a,
            Result<Option<(String, String)>, crate::provider::ClientError>,
        > {
            Box::pin(async move { Ok(None) })
        }
    }

    #[tokio::test]
    async fn test_update_rivers_confirmed() {
        let store = Store::in_memory().await.unwrap();
        let candidate = RiverCandidate {
            name: "Rhine".to_string(),
            qid_guess: Some("Q584".to_string()),
            polyline: vec![(48.0, 7.0), (48.0, 8.0)],
        };
        let m = PoiManager::new(store, &ScoringConfig::default()).with_river_support(
            Arc::new(FixedSentinel(candidate)),
            Arc::new(Validator::new(Arc::new(RiverLabels))),
        );

        let cancel = CancellationToken::new();
        let river = m.update_rivers(&cancel, 48.1, 7.5, 90.0).await.unwrap();
        assert_eq!(river.qid, "Q584");
        assert_eq!(river.name, "Rhine");
        assert_eq!(river.source, PoiSource::River);
        // Snapped to the closest point on the polyline
        assert!((river.lat - 48.0).abs() < 0.001);
        assert!((river.lon - 7.5).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_update_rivers_unconfirmed() {
        let store = Store::in_memory().await.unwrap();
        let candidate = RiverCandidate {
            name: "Mystery Creek".to_string(),
            qid_guess: Some("Q999".to_string()),
            polyline: vec![(48.0, 7.0), (48.0, 8.0)],
        };
        let m = PoiManager::new(store, &ScoringConfig::default()).with_river_support(
            Arc::new(FixedSentinel(candidate)),
            Arc::new(Validator::new(Arc::new(RiverLabels))),
        );

        let cancel = CancellationToken::new();
        assert!(m.update_rivers(&cancel, 48.1, 7.5, 90.0).await.is_none());
        assert_eq!(m.active_count(), 0);
    }

    #[tokio::test]
    async fn test_update_rivers_without_support() {
        let m = manager().await;
        let cancel = CancellationToken::new();
        assert!(m.update_rivers(&cancel, 48.0, 7.0, 0.0).await.is_none());
    }

    #[test]
    fn test_ui_mode_parse() {
        assert_eq!("fixed".parse::<UiMode>().unwrap(), UiMode::Fixed);
        assert_eq!("Adaptive".parse::<UiMode>().unwrap(), UiMode::Adaptive);
        assert!("auto".parse::<UiMode>().is_err());
    }
}
