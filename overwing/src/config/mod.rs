//! Engine configuration types.
//!
//! The embedding application hands the engine parsed YAML tables (visibility,
//! categories) plus the runtime knobs collected here. The `persistent_state`
//! table in the store remains the live-config channel; these types are the
//! static defaults it overrides.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::visibility::SizeClass;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field carried a value outside its accepted domain.
    #[error("invalid value for {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },

    /// YAML parse failure for one of the table files.
    #[error("failed to parse {what}: {source}")]
    Parse {
        what: &'static str,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Display unit system exposed at the API layer.
///
/// The engine computes internally in aviation units (feet, nautical miles,
/// knots; meters for geodesy and storage). `Units` only affects how values
/// are rendered outward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Units {
    Metric,
    Imperial,
    /// Metric lengths with aviation altitudes/speeds (feet and knots).
    #[default]
    Hybrid,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
            Units::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Units {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "metric" => Ok(Units::Metric),
            "imperial" => Ok(Units::Imperial),
            "hybrid" => Ok(Units::Hybrid),
            _ => Err(ConfigError::InvalidValue {
                field: "units",
                value: s.to_string(),
            }),
        }
    }
}

/// Per-category content configuration, loaded from the categories YAML.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryRule {
    /// Content weight multiplier applied during scoring.
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Display size class used for the visibility lookup.
    #[serde(default)]
    pub size: SizeClass,
    /// Variety group; consecutive narrations within one group are penalized.
    #[serde(default)]
    pub group: Option<String>,
}

fn default_weight() -> f64 {
    1.0
}

impl Default for CategoryRule {
    fn default() -> Self {
        Self {
            weight: 1.0,
            size: SizeClass::default(),
            group: None,
        }
    }
}

/// Category table: label -> rule.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct CategoriesConfig {
    pub categories: HashMap<String, CategoryRule>,
}

impl CategoriesConfig {
    /// Parse the categories YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
            what: "categories table",
            source,
        })
    }

    /// Rule for a category, falling back to defaults for unknown labels.
    pub fn rule(&self, category: &str) -> CategoryRule {
        self.categories.get(category).cloned().unwrap_or_default()
    }

    /// Whether two categories belong to the same configured group.
    pub fn same_group(&self, a: &str, b: &str) -> bool {
        match (
            self.categories.get(a).and_then(|r| r.group.as_deref()),
            self.categories.get(b).and_then(|r| r.group.as_deref()),
        ) {
            (Some(ga), Some(gb)) => ga == gb,
            _ => false,
        }
    }
}

/// Scoring knobs consumed by the scorer session.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Minimum wall-clock gap between two narrations of the same POI.
    pub repeat_ttl: Duration,
    /// Multiplier applied to every max-visible-distance lookup.
    pub visibility_boost: f64,
    /// How many recent categories the variety penalty looks at.
    pub variety_penalty_num: usize,
    /// Penalty at history position 0 (most recent).
    pub variety_penalty_first: f64,
    /// Penalty at history position `variety_penalty_num - 1`.
    pub variety_penalty_last: f64,
    /// Boost for categories absent from recent history.
    pub novelty_boost: f64,
    /// Extra penalty when the most recent category shares a group.
    pub group_penalty: f64,
    /// Article length below which a POI gets the "stub" badge.
    pub stub_article_len: usize,
    /// Bonus multiplier for simulator-native POIs.
    pub msfs_bonus: f64,
    /// Deferral predictor settings.
    pub deferral: DeferralConfig,
    /// Future-position horizons used by the session pre-compute.
    pub future_horizons: Vec<Duration>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            repeat_ttl: Duration::from_secs(24 * 3600),
            visibility_boost: 1.0,
            variety_penalty_num: 3,
            variety_penalty_first: 0.3,
            variety_penalty_last: 0.8,
            novelty_boost: 1.3,
            group_penalty: 0.7,
            stub_article_len: 500,
            msfs_bonus: 4.0,
            deferral: DeferralConfig::default(),
            future_horizons: [1u64, 2, 3, 5, 7, 9, 11, 13, 15]
                .iter()
                .map(|m| Duration::from_secs(m * 60))
                .collect(),
        }
    }
}

/// Deferral predictor configuration.
///
/// A visible POI is deferred when a future position offers a materially
/// better view, unless the POI is about to pass behind the aircraft.
#[derive(Debug, Clone)]
pub struct DeferralConfig {
    pub enabled: bool,
    /// Future-best must exceed current-best by this ratio to defer.
    pub threshold: f64,
    /// POIs passing behind within this window are never deferred.
    pub urgent_window: Duration,
}

impl Default for DeferralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 1.1,
            urgent_window: Duration::from_secs(180),
        }
    }
}

/// Narration selector knobs.
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Candidate list length fed to the strategy.
    pub candidate_limit: usize,
    /// Minimum score a candidate must reach.
    pub min_score: f64,
    /// Selection strategy.
    pub strategy: SelectionStrategy,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            candidate_limit: 8,
            min_score: 0.1,
            strategy: SelectionStrategy::Uniform,
        }
    }
}

/// How the selector picks among ranked candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionStrategy {
    /// Always take the top-scoring candidate.
    #[default]
    Uniform,
    /// Rank-weighted sample, mildly favoring the top.
    MinSkew,
    /// Rank-weighted sample, strongly favoring the top.
    MaxSkew,
}

impl FromStr for SelectionStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uniform" => Ok(SelectionStrategy::Uniform),
            "min_skew" => Ok(SelectionStrategy::MinSkew),
            "max_skew" => Ok(SelectionStrategy::MaxSkew),
            _ => Err(ConfigError::InvalidValue {
                field: "strategy",
                value: s.to_string(),
            }),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Tick interval for the scheduler and scorer loops.
    pub tick_interval: Duration,
    /// Tracked POIs idle longer than this are pruned.
    pub prune_max_age: Duration,
    /// Tiles whose centers are farther than this are evicted from memory.
    pub evict_threshold_km: f64,
    /// Maximum candidate cells considered per scheduler tick.
    pub max_candidate_cells: usize,
    pub scoring: ScoringConfig,
    pub selector: SelectorConfig,
    /// Display units at the API boundary.
    pub units: Units,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(2),
            prune_max_age: Duration::from_secs(45 * 60),
            evict_threshold_km: 150.0,
            max_candidate_cells: 32,
            scoring: ScoringConfig::default(),
            selector: SelectorConfig::default(),
            units: Units::default(),
        }
    }
}
