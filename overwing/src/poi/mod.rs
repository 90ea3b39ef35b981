//! Point-of-interest entity and the in-memory manager.

mod manager;
mod rivers;

pub use manager::{PoiManager, UiMode, UiSelection};
pub use rivers::{RiverCandidate, RiverSentinel};

use chrono::{DateTime, Utc};

use crate::visibility::SizeClass;

/// Where a POI came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoiSource {
    #[default]
    Wikidata,
    Msfs,
    Feature,
    River,
}

impl PoiSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoiSource::Wikidata => "wikidata",
            PoiSource::Msfs => "msfs",
            PoiSource::Feature => "feature",
            PoiSource::River => "river",
        }
    }

    /// Parse a stored source tag; unknown tags fall back to wikidata.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "msfs" => PoiSource::Msfs,
            "feature" => PoiSource::Feature,
            "river" => PoiSource::River,
            _ => PoiSource::Wikidata,
        }
    }
}

impl std::fmt::Display for PoiSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A narration candidate.
///
/// The durable half (identity, coordinates, content stats, `last_played`)
/// round-trips through the store; the volatile half (score, visibility,
/// details, badges) is recomputed by every scorer tick and never persisted.
#[derive(Debug, Clone)]
pub struct Poi {
    pub qid: String,
    /// Display name; empty until rich hydration supplies a label.
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    /// Object altitude in meters, when Wikidata knows it.
    pub altitude_m: Option<f64>,
    pub category: String,
    pub subcategory: Option<String>,
    /// Monotone multiplier derived from area/height/length/width.
    pub dimension_multiplier: f64,
    pub sitelinks: u32,
    /// Character count of the backing article text; 0 if unknown.
    pub article_len: u32,
    pub source: PoiSource,
    /// Per-POI size override; the category config supplies the default.
    pub size: Option<SizeClass>,
    pub created_at: DateTime<Utc>,
    /// `None` means never narrated. Only ever moves forward.
    pub last_played: Option<DateTime<Utc>>,

    // Volatile per-tick fields.
    pub score: f64,
    pub visibility: f64,
    pub score_details: String,
    pub is_visible: bool,
    pub is_deferred: bool,
    pub badges: Vec<String>,
}

impl Poi {
    /// Create a POI skeleton with default content stats.
    pub fn new(qid: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            qid: qid.into(),
            name: String::new(),
            lat,
            lon,
            altitude_m: None,
            category: String::new(),
            subcategory: None,
            dimension_multiplier: 1.0,
            sitelinks: 0,
            article_len: 0,
            source: PoiSource::Wikidata,
            size: None,
            created_at: Utc::now(),
            last_played: None,
            score: 0.0,
            visibility: 0.0,
            score_details: String::new(),
            is_visible: false,
            is_deferred: false,
            badges: Vec::new(),
        }
    }

    /// Rank used for thresholds and candidate ordering.
    pub fn combined_score(&self) -> f64 {
        self.score * self.visibility
    }

    /// Whether the POI was narrated within the repeat TTL.
    pub fn in_cooldown(&self, now: DateTime<Utc>, repeat_ttl: chrono::Duration) -> bool {
        match self.last_played {
            Some(played) => now - played < repeat_ttl,
            None => false,
        }
    }

    /// Clear the per-tick fields before a scoring pass.
    pub fn reset_volatile(&mut self) {
        self.score = 0.0;
        self.visibility = 0.0;
        self.score_details.clear();
        self.is_visible = false;
        self.is_deferred = false;
        self.badges.clear();
    }

    /// Merge a newer observation of the same POI into this one.
    ///
    /// Durable fields take the incoming values where present; `last_played`
    /// keeps the most recent instant so delayed hydration can never erase a
    /// fresh narration.
    pub fn merge_from(&mut self, incoming: &Poi) {
        debug_assert_eq!(self.qid, incoming.qid);

        if !incoming.name.is_empty() {
            self.name = incoming.name.clone();
        }
        self.lat = incoming.lat;
        self.lon = incoming.lon;
        if incoming.altitude_m.is_some() {
            self.altitude_m = incoming.altitude_m;
        }
        if !incoming.category.is_empty() {
            self.category = incoming.category.clone();
        }
        if incoming.subcategory.is_some() {
            self.subcategory = incoming.subcategory.clone();
        }
        self.dimension_multiplier = incoming.dimension_multiplier;
        self.sitelinks = self.sitelinks.max(incoming.sitelinks);
        self.article_len = self.article_len.max(incoming.article_len);
        self.source = incoming.source;
        if incoming.size.is_some() {
            self.size = incoming.size;
        }

        self.last_played = match (self.last_played, incoming.last_played) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (Some(a), None) => Some(a),
            (None, b) => b,
        };
    }
}
