//! Per-tick POI scoring.
//!
//! A session is created once per tick: it pre-computes the lowest terrain in
//! visual range (for the valley boost) and the projected future positions
//! (for the deferral predictor), then scores each tracked POI sequentially.
//! Scoring the same POI twice in one session yields identical results.
//!
//! The score field is the content rank (weights, novelty, variety, repeat
//! penalty); the geometric visibility is kept separately and the combined
//! product is what candidates are ranked by.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::config::{CategoriesConfig, ScoringConfig};
use crate::elevation::ElevationGetter;
use crate::geo::{destination_point, haversine_nm, initial_bearing_deg, normalize_angle, METERS_PER_FT, METERS_PER_NM};
use crate::poi::{Poi, PoiSource};
use crate::telemetry::Telemetry;
use crate::visibility::{calculate_poi_visibility, visibility_for_size, SizeClass, VisibilityTable};

/// Size penalty factors: large objects are impressive from afar but less
/// narratable up close.
fn size_penalty(size: SizeClass) -> f64 {
    match size {
        SizeClass::S | SizeClass::M => 1.0,
        SizeClass::L => 0.85,
        SizeClass::XL => 0.7,
    }
}

/// Sitelink boost cap for settlement categories.
const SETTLEMENT_SITELINK_CAP: f64 = 4.0;

/// Horizon boundary between the "current" and "future" deferral buckets.
const DEFERRAL_CURRENT_MAX: Duration = Duration::from_secs(4 * 60);

/// Busy predicate: is a POI currently being narrated or prepared.
pub type BusyPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Per-tick scoring input.
#[derive(Clone)]
pub struct ScoringInput {
    pub telemetry: Telemetry,
    /// Recently narrated categories, most recent first.
    pub category_history: Vec<String>,
    /// Minimum wall-clock gap between narrations of one POI.
    pub repeat_ttl: chrono::Duration,
    /// Multiplier applied to max-visible-distance lookups.
    pub visibility_boost: f64,
    pub busy: BusyPredicate,
}

impl ScoringInput {
    pub fn new(telemetry: Telemetry, config: &ScoringConfig) -> Self {
        Self {
            telemetry,
            category_history: Vec::new(),
            repeat_ttl: chrono::Duration::from_std(config.repeat_ttl)
                .unwrap_or(chrono::Duration::MAX),
            visibility_boost: config.visibility_boost,
            busy: Arc::new(|_| false),
        }
    }

    pub fn with_history(mut self, history: Vec<String>) -> Self {
        self.category_history = history;
        self
    }

    pub fn with_busy(mut self, busy: BusyPredicate) -> Self {
        self.busy = busy;
        self
    }
}

/// The scorer: long-lived configuration plus the elevation interface.
pub struct Scorer {
    table: Arc<VisibilityTable>,
    categories: CategoriesConfig,
    config: ScoringConfig,
    elevation: Arc<dyn ElevationGetter>,
}

impl Scorer {
    pub fn new(
        table: Arc<VisibilityTable>,
        categories: CategoriesConfig,
        config: ScoringConfig,
        elevation: Arc<dyn ElevationGetter>,
    ) -> Self {
        Self {
            table,
            categories,
            config,
            elevation,
        }
    }

    /// Visibility table handle (shared with the heatmap endpoint).
    pub fn table(&self) -> &Arc<VisibilityTable> {
        &self.table
    }

    /// Build the per-tick session: one elevation lookup and the projected
    /// future positions.
    pub async fn new_session(&self, cancel: &CancellationToken, input: ScoringInput) -> Session<'_> {
        let telemetry = input.telemetry;

        let radius_nm = self
            .table
            .max_visible_dist_nm(telemetry.altitude_msl_ft, SizeClass::XL, input.visibility_boost)
            .max(10.0);

        let lowest_elevation_m = match self
            .elevation
            .get_lowest_elevation(cancel, telemetry.latitude, telemetry.longitude, radius_nm)
            .await
        {
            Ok(meters) => meters as f64,
            Err(e) => {
                tracing::warn!(error = %e, "Elevation lookup failed, assuming sea level");
                0.0
            }
        };

        let future_positions = self
            .config
            .future_horizons
            .iter()
            .map(|horizon| {
                let distance_m = telemetry.ground_speed_kt
                    * METERS_PER_NM
                    * horizon.as_secs_f64()
                    / 3_600.0;
                let (lat, lon) = destination_point(
                    telemetry.latitude,
                    telemetry.longitude,
                    distance_m,
                    telemetry.heading_deg,
                );
                (*horizon, lat, lon)
            })
            .collect();

        Session {
            scorer: self,
            input,
            now: Utc::now(),
            lowest_elevation_ft: lowest_elevation_m / METERS_PER_FT,
            future_positions,
        }
    }
}

/// One tick's scoring context.
pub struct Session<'a> {
    scorer: &'a Scorer,
    input: ScoringInput,
    /// Wall clock fixed at session creation so repeated calculations agree.
    now: DateTime<Utc>,
    lowest_elevation_ft: f64,
    future_positions: Vec<(Duration, f64, f64)>,
}

impl Session<'_> {
    /// Lowest terrain within visual range, in feet.
    pub fn lowest_elevation_ft(&self) -> f64 {
        self.lowest_elevation_ft
    }

    /// Projected positions at the configured horizons.
    pub fn future_positions(&self) -> &[(Duration, f64, f64)] {
        self.future_positions.as_slice()
    }

    /// Display size for a POI: its own override, else its category's.
    fn size_for(&self, poi: &Poi) -> SizeClass {
        poi.size
            .unwrap_or_else(|| self.scorer.categories.rule(&poi.category).size)
    }

    /// Score one POI, overwriting its volatile fields.
    pub fn calculate(&self, poi: &mut Poi) {
        poi.reset_volatile();

        if (self.input.busy)(&poi.qid) {
            poi.score_details = "Busy".to_string();
            return;
        }

        let telemetry = &self.input.telemetry;
        let mut details: Vec<String> = Vec::new();

        // Geometry is judged from the predicted position so the narration
        // lands while the POI is still in view.
        let dist_nm = haversine_nm(
            telemetry.predicted_latitude,
            telemetry.predicted_longitude,
            poi.lat,
            poi.lon,
        );
        let bearing = initial_bearing_deg(
            telemetry.predicted_latitude,
            telemetry.predicted_longitude,
            poi.lat,
            poi.lon,
        );

        let effective_agl = telemetry.altitude_msl_ft - self.lowest_elevation_ft;
        let size = self.size_for(poi);

        let visibility = calculate_poi_visibility(
            &self.scorer.table,
            telemetry.heading_deg,
            telemetry.altitude_agl_ft,
            effective_agl,
            bearing,
            dist_nm,
            size,
            telemetry.is_on_ground,
            self.input.visibility_boost,
        );
        poi.visibility = visibility.score;
        details.extend(visibility.details);

        if visibility.score <= 0.0 {
            poi.is_visible = false;
            poi.score = 0.0;
            poi.score_details = details.join("\n");
            return;
        }
        poi.is_visible = true;

        let mut score = size_penalty(size);
        if score != 1.0 {
            details.push(format!("Size {size}: x{score:.2}"));
        }
        if poi.dimension_multiplier != 1.0 {
            score *= poi.dimension_multiplier;
            details.push(format!("Dimensions: x{:.2}", poi.dimension_multiplier));
        }

        score *= self.content_multiplier(poi, &mut details);
        score *= self.variety_multiplier(poi, &mut details);

        if poi.in_cooldown(self.now, self.input.repeat_ttl) {
            score = 0.0;
            details.push("Cooldown".to_string());
        }

        if score > 0.0 && self.scorer.config.deferral.enabled {
            if self.should_defer(poi, dist_nm, bearing, size, effective_agl) {
                poi.is_deferred = true;
                details.push("Deferred: better view ahead".to_string());
            }
        }

        if (poi.article_len as usize) < self.scorer.config.stub_article_len {
            poi.badges.push("stub".to_string());
        }

        poi.score = score;
        poi.score_details = details.join("\n");
    }

    fn content_multiplier(&self, poi: &Poi, details: &mut Vec<String>) -> f64 {
        let mut multiplier = 1.0;

        let article_boost = (poi.article_len as f64 / 500.0).sqrt().max(1.0);
        if article_boost > 1.0 {
            multiplier *= article_boost;
            details.push(format!("Article: x{article_boost:.2}"));
        }

        let mut sitelink_boost = 1.0 + (poi.sitelinks.saturating_sub(1) as f64).sqrt();
        let settlement = poi.category.eq_ignore_ascii_case("city")
            || poi.category.eq_ignore_ascii_case("town");
        if settlement {
            sitelink_boost = sitelink_boost.min(SETTLEMENT_SITELINK_CAP);
        }
        if sitelink_boost != 1.0 {
            multiplier *= sitelink_boost;
            details.push(format!("Sitelinks ({}): x{sitelink_boost:.2}", poi.sitelinks));
        }

        let weight = self.scorer.categories.rule(&poi.category).weight;
        if weight != 1.0 {
            multiplier *= weight;
            details.push(format!("Category {}: x{weight:.2}", poi.category));
        }

        if poi.source == PoiSource::Msfs {
            multiplier *= self.scorer.config.msfs_bonus;
            details.push(format!("Simulator landmark: x{:.1}", self.scorer.config.msfs_bonus));
        }

        multiplier
    }

    fn variety_multiplier(&self, poi: &Poi, details: &mut Vec<String>) -> f64 {
        let config = &self.scorer.config;
        let history = &self.input.category_history;

        let position = history
            .iter()
            .position(|c| !poi.category.is_empty() && c == &poi.category);

        if let Some(k) = position.filter(|k| *k < config.variety_penalty_num) {
            let t = if config.variety_penalty_num > 1 {
                k as f64 / (config.variety_penalty_num - 1) as f64
            } else {
                0.0
            };
            let penalty = config.variety_penalty_first
                + (config.variety_penalty_last - config.variety_penalty_first) * t;
            details.push(format!("Variety (heard {k} ago): x{penalty:.2}"));
            return penalty;
        }

        let mut boost = config.novelty_boost;
        details.push(format!("Novelty: x{boost:.2}"));
        if let Some(latest) = history.first() {
            if self.scorer.categories.same_group(latest, &poi.category) {
                boost *= config.group_penalty;
                details.push(format!("Same group as last: x{:.2}", config.group_penalty));
            }
        }
        boost
    }

    /// Deferral predictor: skip a visible POI this tick when a future
    /// position offers a materially better view, unless the POI is about to
    /// pass behind.
    fn should_defer(
        &self,
        poi: &Poi,
        dist_nm: f64,
        bearing: f64,
        size: SizeClass,
        effective_agl: f64,
    ) -> bool {
        let telemetry = &self.input.telemetry;
        let config = &self.scorer.config.deferral;

        if telemetry.ground_speed_kt < 1.0 {
            return false;
        }

        // Time until the POI crosses the wing line, from the along-track
        // component of its offset.
        let rel_bearing = normalize_angle(bearing - telemetry.heading_deg);
        let along_nm = dist_nm * rel_bearing.to_radians().cos();
        if along_nm <= 0.0 {
            return false;
        }
        let time_to_behind = Duration::from_secs_f64(
            along_nm / telemetry.ground_speed_kt * 3_600.0,
        );
        if time_to_behind <= config.urgent_window {
            return false;
        }

        let mut current_best: f64 = 0.0;
        let mut future_best: f64 = 0.0;
        for (horizon, lat, lon) in &self.future_positions {
            let d = haversine_nm(*lat, *lon, poi.lat, poi.lon);
            let b = initial_bearing_deg(*lat, *lon, poi.lat, poi.lon);
            let score = visibility_for_size(
                &self.scorer.table,
                telemetry.heading_deg,
                telemetry.altitude_agl_ft,
                effective_agl,
                b,
                d,
                size,
                false,
                self.input.visibility_boost,
            );
            if *horizon <= DEFERRAL_CURRENT_MAX {
                current_best = current_best.max(score);
            } else {
                future_best = future_best.max(score);
            }
        }

        future_best > current_best * config.threshold
    }
}
