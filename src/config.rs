//! Engine configuration, persisted as TOML.
//!
//! Every tunable threshold of the pipeline lives here with a default that can
//! be overridden per deployment. Sections mirror the pipeline stages:
//! `[extract]`, `[ontology]`, `[demand]`, `[forecast]` and `[gap]`.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::gap::Proficiency;

/// Errors from configuration loading and validation.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(compass::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}: {message}")]
    #[diagnostic(
        code(compass::config::parse),
        help("Check the TOML syntax. `compass config` prints a complete default file.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(compass::config::write),
        help("Ensure you have write permissions to the target directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config value `{field}`: {message}")]
    #[diagnostic(code(compass::config::invalid), help("{message}"))]
    Invalid { field: String, message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Skill extraction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Mentions below this confidence are flagged and not counted as demand.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
}

fn default_confidence_threshold() -> f32 {
    0.3
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

/// Ontology resolution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OntologyConfig {
    /// Minimum Jaro-Winkler similarity for a fuzzy alias match.
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
    /// Minimum shorter/longer length ratio for a fuzzy candidate.
    ///
    /// Keeps prefix-heavy pairs such as "java"/"javascript" apart.
    #[serde(default = "default_fuzzy_min_length_ratio")]
    pub fuzzy_min_length_ratio: f64,
    /// Maximum character edits between a term and a fuzzy-matched alias.
    ///
    /// Keeps vendor or framework siblings such as "Google Cloud"/"Google Ads"
    /// apart even though their shared prefix scores high.
    #[serde(default = "default_fuzzy_max_edits")]
    pub fuzzy_max_edits: usize,
    /// Share of the old weight kept when an existing edge is re-added.
    #[serde(default = "default_edge_retention")]
    pub edge_retention: f32,
}

fn default_fuzzy_threshold() -> f64 {
    0.85
}
fn default_fuzzy_min_length_ratio() -> f64 {
    0.6
}
fn default_fuzzy_max_edits() -> usize {
    2
}
fn default_edge_retention() -> f32 {
    0.7
}

impl Default for OntologyConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: default_fuzzy_threshold(),
            fuzzy_min_length_ratio: default_fuzzy_min_length_ratio(),
            fuzzy_max_edits: default_fuzzy_max_edits(),
            edge_retention: default_edge_retention(),
        }
    }
}

/// Demand bucketing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandConfig {
    /// Width of one period in days.
    #[serde(default = "default_period_days")]
    pub period_days: i64,
    /// Start of period zero. The default Monday aligns weekly periods with ISO weeks.
    #[serde(default = "default_anchor")]
    pub anchor: NaiveDate,
}

fn default_period_days() -> i64 {
    7
}
fn default_anchor() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 5).unwrap_or_default()
}

impl Default for DemandConfig {
    fn default() -> Self {
        Self {
            period_days: default_period_days(),
            anchor: default_anchor(),
        }
    }
}

/// How the smoothed trend is extrapolated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionModel {
    /// Ordinary least squares line through the smoothed series.
    #[default]
    Linear,
    /// Holt double exponential smoothing.
    Holt,
}

/// Trend classification and projection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    #[serde(default = "default_min_history")]
    pub min_history: usize,
    /// Growth above this rate, sustained, classifies as emerging.
    #[serde(default = "default_theta")]
    pub theta_up: f64,
    /// Growth below the negation of this rate, sustained, classifies as declining.
    #[serde(default = "default_theta")]
    pub theta_down: f64,
    /// Number of trailing periods the growth must hold for.
    #[serde(default = "default_sustained_periods")]
    pub sustained_periods: usize,
    /// Minimum mentions per period before a skill can be called emerging.
    #[serde(default = "default_noise_floor")]
    pub noise_floor: f64,
    /// Weighted moving average window.
    #[serde(default = "default_smoothing_window")]
    pub smoothing_window: usize,
    /// Number of future periods to project.
    #[serde(default = "default_horizon")]
    pub horizon: usize,
    #[serde(default)]
    pub model: ProjectionModel,
}

fn default_min_history() -> usize {
    8
}
fn default_theta() -> f64 {
    0.15
}
fn default_sustained_periods() -> usize {
    3
}
fn default_noise_floor() -> f64 {
    5.0
}
fn default_smoothing_window() -> usize {
    3
}
fn default_horizon() -> usize {
    4
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            min_history: default_min_history(),
            theta_up: default_theta(),
            theta_down: default_theta(),
            sustained_periods: default_sustained_periods(),
            noise_floor: default_noise_floor(),
            smoothing_window: default_smoothing_window(),
            horizon: default_horizon(),
            model: ProjectionModel::default(),
        }
    }
}

/// Adds a `fingerprint()` over every field of each config section.
macro_rules! fingerprinted {
    ($($section:ty),+ $(,)?) => {
        $(
            impl $section {
                /// Stable fingerprint of every field. The forecast section's
                /// is part of the forecast cache key.
                pub fn fingerprint(&self) -> u64 {
                    fingerprint_of(self)
                }
            }
        )+
    };
}

fingerprinted!(ExtractConfig, OntologyConfig, DemandConfig, ForecastConfig, GapConfig);

/// Gap analysis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapConfig {
    /// Recency half-life for role distributions, in days.
    #[serde(default = "default_half_life_days")]
    pub half_life_days: f64,
    #[serde(default = "default_emerging_multiplier")]
    pub emerging_multiplier: f64,
    #[serde(default = "default_stable_multiplier")]
    pub stable_multiplier: f64,
    #[serde(default = "default_declining_multiplier")]
    pub declining_multiplier: f64,
    /// A held skill below this level still counts as missing.
    #[serde(default = "default_min_proficiency")]
    pub min_proficiency: Proficiency,
    /// Skills weighted below this share of role postings are left out.
    #[serde(default)]
    pub min_role_weight: f64,
    /// Learning hours assumed when the difficulty table knows nothing better.
    #[serde(default = "default_hours")]
    pub default_hours: f32,
    /// Role weight from which a skill counts as core to a role when
    /// comparing career transitions.
    #[serde(default = "default_core_skill_weight")]
    pub core_skill_weight: f64,
}

fn default_half_life_days() -> f64 {
    182.0
}
fn default_emerging_multiplier() -> f64 {
    1.5
}
fn default_stable_multiplier() -> f64 {
    1.0
}
fn default_declining_multiplier() -> f64 {
    0.5
}
fn default_min_proficiency() -> Proficiency {
    Proficiency::Intermediate
}
fn default_hours() -> f32 {
    30.0
}
fn default_core_skill_weight() -> f64 {
    0.3
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            half_life_days: default_half_life_days(),
            emerging_multiplier: default_emerging_multiplier(),
            stable_multiplier: default_stable_multiplier(),
            declining_multiplier: default_declining_multiplier(),
            min_proficiency: default_min_proficiency(),
            min_role_weight: 0.0,
            default_hours: default_hours(),
            core_skill_weight: default_core_skill_weight(),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine configuration
// ---------------------------------------------------------------------------

/// Configuration for the career-compass engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Data directory for persistence. `None` for memory-only mode.
    #[serde(skip)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub ontology: OntologyConfig,
    #[serde(default)]
    pub demand: DemandConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub gap: GapConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty TOML.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = self.to_toml()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: "(in-memory)".into(),
            message: e.to_string(),
        })
    }

    /// Reject values that would make the pipeline meaningless.
    pub fn validate(&self) -> ConfigResult<()> {
        check_unit("extract.confidence_threshold", self.extract.confidence_threshold as f64)?;
        check_unit("ontology.fuzzy_threshold", self.ontology.fuzzy_threshold)?;
        check_unit("ontology.fuzzy_min_length_ratio", self.ontology.fuzzy_min_length_ratio)?;
        check_unit("ontology.edge_retention", self.ontology.edge_retention as f64)?;

        if self.demand.period_days < 1 {
            return Err(invalid("demand.period_days", "must be at least 1 day"));
        }

        let f = &self.forecast;
        if f.min_history < 2 {
            return Err(invalid("forecast.min_history", "needs at least 2 periods"));
        }
        if f.sustained_periods == 0 || f.sustained_periods >= f.min_history {
            return Err(invalid(
                "forecast.sustained_periods",
                "must be positive and smaller than min_history",
            ));
        }
        if f.smoothing_window == 0 {
            return Err(invalid("forecast.smoothing_window", "must be at least 1"));
        }
        check_positive("forecast.theta_up", f.theta_up)?;
        check_positive("forecast.theta_down", f.theta_down)?;
        check_non_negative("forecast.noise_floor", f.noise_floor)?;

        let g = &self.gap;
        check_positive("gap.half_life_days", g.half_life_days)?;
        check_non_negative("gap.emerging_multiplier", g.emerging_multiplier)?;
        check_non_negative("gap.stable_multiplier", g.stable_multiplier)?;
        check_non_negative("gap.declining_multiplier", g.declining_multiplier)?;
        check_positive("gap.default_hours", g.default_hours as f64)?;
        check_unit("gap.min_role_weight", g.min_role_weight)?;
        check_unit("gap.core_skill_weight", g.core_skill_weight)?;
        Ok(())
    }
}

fn check_positive(field: &str, value: f64) -> ConfigResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, "must be a positive number"))
    }
}

fn check_non_negative(field: &str, value: f64) -> ConfigResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, "must be a finite, non-negative number"))
    }
}

/// NaN fails the range check too.
fn check_unit(field: &str, value: f64) -> ConfigResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, "must lie within [0.0, 1.0]"))
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.into(),
        message: message.into(),
    }
}

/// SHA-256 over the JSON encoding, truncated to 64 bits.
///
/// Struct fields serialize in declaration order, so the result only changes
/// when a value does.
pub(crate) fn fingerprint_of<T: Serialize>(value: &T) -> u64 {
    let encoded = serde_json::to_vec(value).unwrap_or_default();
    let digest = Sha256::digest(&encoded);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}
