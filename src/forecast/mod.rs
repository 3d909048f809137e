//! Trend classification and demand projection per skill.
//!
//! The input is a dense, oldest-first demand series for one canonical skill.
//! It is smoothed with a weighted moving average (newest period weighted
//! heaviest), period-over-period growth is taken on the smoothed series, and
//! the trend is classified from the last `k` growth rates. Projection uses a
//! least-squares line through the smoothed series or Holt's double
//! exponential smoothing on the raw one.
//!
//! Everything here is plain `f64` arithmetic in a fixed order, so identical
//! input and configuration give bit-identical results.

pub mod cache;

use serde::{Deserialize, Serialize};

use crate::config::{ForecastConfig, ProjectionModel};
use crate::demand::Period;
use crate::error::ForecastError;
use crate::skill::SkillId;

pub use cache::ForecastCache;

/// Holt level smoothing factor.
const HOLT_ALPHA: f64 = 0.5;
/// Holt trend smoothing factor.
const HOLT_BETA: f64 = 0.3;
/// Two-sided 95% normal quantile.
const Z_95: f64 = 1.96;

/// Trajectory of a skill's demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendClass {
    Emerging,
    Stable,
    Declining,
    InsufficientData,
}

impl TrendClass {
    /// Ranking order: emerging first, insufficient data last.
    pub fn rank(self) -> u8 {
        match self {
            Self::Emerging => 0,
            Self::Stable => 1,
            Self::Declining => 2,
            Self::InsufficientData => 3,
        }
    }
}

impl std::fmt::Display for TrendClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Emerging => write!(f, "emerging"),
            Self::Stable => write!(f, "stable"),
            Self::Declining => write!(f, "declining"),
            Self::InsufficientData => write!(f, "insufficient_data"),
        }
    }
}

/// Projected demand for one future period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedDemand {
    pub period: Period,
    pub value: f64,
    /// Lower bound of the 95% interval, never below zero.
    pub lower: f64,
    pub upper: f64,
}

/// Forecast for one skill as of one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub skill: SkillId,
    pub as_of: Period,
    pub trend: TrendClass,
    /// Mean smoothed growth rate over the last `k` periods.
    pub growth_rate: f64,
    /// Smoothed demand in the `as_of` period.
    pub current_volume: f64,
    pub history_len: usize,
    /// `horizon` periods after `as_of`. Empty with insufficient data.
    pub projected: Vec<ProjectedDemand>,
    /// In [0, 1). Grows with history length, shrinks with residual spread.
    pub confidence: f64,
    pub model: ProjectionModel,
    /// Ontology version the input series was assembled against.
    pub ontology_version: u64,
}

/// Fits and classifies demand series.
#[derive(Debug, Clone)]
pub struct Forecaster {
    config: ForecastConfig,
}

impl Forecaster {
    pub fn new(config: ForecastConfig) -> Result<Self, ForecastError> {
        if config.min_history < 2 {
            return Err(ForecastError::InvalidConfig {
                message: "min_history must be at least 2".into(),
            });
        }
        if config.sustained_periods == 0 || config.sustained_periods >= config.min_history {
            return Err(ForecastError::InvalidConfig {
                message: "sustained_periods must be positive and below min_history".into(),
            });
        }
        if config.smoothing_window == 0 {
            return Err(ForecastError::InvalidConfig {
                message: "smoothing_window must be at least 1".into(),
            });
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Forecast from `series`, whose last element is the `as_of` period.
    pub fn forecast(
        &self,
        skill: SkillId,
        as_of: Period,
        series: &[u64],
        ontology_version: u64,
    ) -> ForecastResult {
        let raw: Vec<f64> = series.iter().map(|&c| c as f64).collect();
        let smoothed = weighted_moving_average(&raw, self.config.smoothing_window);
        let current_volume = smoothed.last().copied().unwrap_or(0.0);

        if raw.len() < self.config.min_history {
            return ForecastResult {
                skill,
                as_of,
                trend: TrendClass::InsufficientData,
                growth_rate: 0.0,
                current_volume,
                history_len: raw.len(),
                projected: Vec::new(),
                confidence: 0.0,
                model: self.config.model,
                ontology_version,
            };
        }

        let growth = growth_rates(&smoothed);
        let k = self.config.sustained_periods;
        let recent = &growth[growth.len() - k..];
        let growth_rate = recent.iter().sum::<f64>() / k as f64;

        let trend = if recent.iter().all(|g| *g > self.config.theta_up)
            && current_volume >= self.config.noise_floor
        {
            TrendClass::Emerging
        } else if recent.iter().all(|g| *g < -self.config.theta_down) {
            TrendClass::Declining
        } else {
            TrendClass::Stable
        };

        let fit = match self.config.model {
            ProjectionModel::Linear => linear_fit(&raw, &smoothed, self.config.horizon),
            ProjectionModel::Holt => holt_fit(&raw, self.config.horizon),
        };
        let projected = fit
            .points
            .into_iter()
            .enumerate()
            .map(|(h, (value, half_width))| ProjectedDemand {
                period: Period(as_of.0 + h as i64 + 1),
                value: value.max(0.0),
                lower: (value - half_width).max(0.0),
                upper: (value + half_width).max(0.0),
            })
            .collect();

        let n = raw.len() as f64;
        let mean = raw.iter().sum::<f64>() / n;
        let history_factor = n / (n + self.config.min_history as f64);
        let stability_factor = 1.0 / (1.0 + fit.residual_sd / mean.max(1.0));

        ForecastResult {
            skill,
            as_of,
            trend,
            growth_rate,
            current_volume,
            history_len: raw.len(),
            projected,
            confidence: history_factor * stability_factor,
            model: self.config.model,
            ontology_version,
        }
    }
}

/// Order forecasts for display: trend class, then |growth| descending, then
/// current volume descending, then skill id.
pub fn rank_forecasts(results: &mut [ForecastResult]) {
    results.sort_by(|a, b| {
        a.trend
            .rank()
            .cmp(&b.trend.rank())
            .then_with(|| b.growth_rate.abs().total_cmp(&a.growth_rate.abs()))
            .then_with(|| b.current_volume.total_cmp(&a.current_volume))
            .then_with(|| a.skill.cmp(&b.skill))
    });
}

/// Trailing weighted moving average with weights `1..=w`, newest heaviest.
/// The first `w - 1` points use the shorter available window.
pub fn weighted_moving_average(series: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..series.len())
        .map(|i| {
            let m = window.min(i + 1);
            let slice = &series[i + 1 - m..=i];
            let weighted: f64 = slice
                .iter()
                .enumerate()
                .map(|(j, v)| (j + 1) as f64 * v)
                .sum();
            weighted / (m * (m + 1) / 2) as f64
        })
        .collect()
}

/// Period-over-period growth. Growth from zero is 1.0 if demand appeared,
/// 0.0 if it stayed at zero.
pub fn growth_rates(smoothed: &[f64]) -> Vec<f64> {
    smoothed
        .windows(2)
        .map(|w| {
            if w[0].abs() < f64::EPSILON {
                if w[1] > 0.0 { 1.0 } else { 0.0 }
            } else {
                w[1] / w[0] - 1.0
            }
        })
        .collect()
}

struct Fit {
    /// `(value, interval half-width)` per horizon step.
    points: Vec<(f64, f64)>,
    residual_sd: f64,
}

/// OLS line through the smoothed series; residuals against the raw series.
fn linear_fit(raw: &[f64], smoothed: &[f64], horizon: usize) -> Fit {
    let n = smoothed.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = smoothed.iter().sum::<f64>() / n;
    let sxx: f64 = (0..smoothed.len()).map(|i| (i as f64 - x_mean).powi(2)).sum();
    let sxy: f64 = smoothed
        .iter()
        .enumerate()
        .map(|(i, y)| (i as f64 - x_mean) * (y - y_mean))
        .sum();
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    let intercept = y_mean - slope * x_mean;

    let sse: f64 = raw
        .iter()
        .enumerate()
        .map(|(i, y)| (y - (intercept + slope * i as f64)).powi(2))
        .sum();
    let dof = (raw.len() as f64 - 2.0).max(1.0);
    let residual_sd = (sse / dof).sqrt();

    let points = (1..=horizon)
        .map(|h| {
            let x = n - 1.0 + h as f64;
            let leverage = if sxx > 0.0 { (x - x_mean).powi(2) / sxx } else { 0.0 };
            let half_width = Z_95 * residual_sd * (1.0 + 1.0 / n + leverage).sqrt();
            (intercept + slope * x, half_width)
        })
        .collect();
    Fit {
        points,
        residual_sd,
    }
}

/// Holt's linear trend method; residuals are one-step-ahead errors.
fn holt_fit(raw: &[f64], horizon: usize) -> Fit {
    let mut level = raw[0];
    let mut trend = raw.get(1).map_or(0.0, |second| second - raw[0]);
    let mut sse = 0.0;
    for &y in &raw[1..] {
        let predicted = level + trend;
        sse += (y - predicted).powi(2);
        let prev_level = level;
        level = HOLT_ALPHA * y + (1.0 - HOLT_ALPHA) * (level + trend);
        trend = HOLT_BETA * (level - prev_level) + (1.0 - HOLT_BETA) * trend;
    }
    let residual_sd = (sse / (raw.len() as f64 - 1.0).max(1.0)).sqrt();
    let points = (1..=horizon)
        .map(|h| {
            let h = h as f64;
            (level + h * trend, Z_95 * residual_sd * h.sqrt())
        })
        .collect();
    Fit {
        points,
        residual_sd,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(n: u64) -> SkillId {
        SkillId::new(n).unwrap()
    }

    fn forecaster() -> Forecaster {
        Forecaster::new(ForecastConfig::default()).unwrap()
    }

    #[test]
    fn wma_weights_newest_heaviest() {
        let s = weighted_moving_average(&[10.0, 11.0, 12.0, 14.0], 3);
        assert_eq!(s[0], 10.0);
        assert!((s[1] - 32.0 / 3.0).abs() < 1e-12);
        assert!((s[3] - (11.0 + 24.0 + 42.0) / 6.0).abs() < 1e-12);
    }

    #[test]
    fn growth_from_zero() {
        assert_eq!(growth_rates(&[0.0, 0.0, 2.0, 3.0]), vec![0.0, 1.0, 0.5]);
    }

    #[test]
    fn rising_series_is_emerging() {
        let r = forecaster().forecast(sid(1), Period(7), &[10, 11, 12, 14, 17, 21, 26, 32], 3);
        assert_eq!(r.trend, TrendClass::Emerging);
        assert!(r.growth_rate > 0.15);
        assert_eq!(r.projected.len(), 4);
        assert_eq!(r.projected[0].period, Period(8));
        assert!(r.projected[0].value > 25.0);
        assert!(r.projected[3].value > r.projected[0].value);
        assert!(r.projected.iter().all(|p| p.lower <= p.value && p.value <= p.upper));
        assert_eq!(r.ontology_version, 3);
    }

    #[test]
    fn falling_series_is_declining() {
        let r = forecaster().forecast(sid(1), Period(7), &[50, 48, 45, 40, 34, 27, 19, 12], 0);
        assert_eq!(r.trend, TrendClass::Declining);
        assert!(r.growth_rate < -0.15);
        assert!(r.projected.iter().all(|p| p.value >= 0.0 && p.lower >= 0.0));
    }

    #[test]
    fn short_history_is_insufficient() {
        let r = forecaster().forecast(sid(1), Period(2), &[5, 50, 500], 0);
        assert_eq!(r.trend, TrendClass::InsufficientData);
        assert!(r.projected.is_empty());
        assert_eq!(r.confidence, 0.0);
    }

    #[test]
    fn flat_series_is_stable() {
        let r = forecaster().forecast(sid(1), Period(7), &[20; 8], 0);
        assert_eq!(r.trend, TrendClass::Stable);
        assert_eq!(r.growth_rate, 0.0);
        assert!((r.projected[0].value - 20.0).abs() < 1e-9);
    }

    #[test]
    fn noise_floor_blocks_tiny_growth() {
        let r = forecaster().forecast(sid(1), Period(7), &[0, 0, 0, 0, 1, 2, 3, 4], 0);
        assert_eq!(r.trend, TrendClass::Stable);
    }

    #[test]
    fn forecast_is_deterministic() {
        let series = [3, 9, 4, 12, 8, 15, 11, 19, 14];
        let a = forecaster().forecast(sid(1), Period(8), &series, 1);
        let b = forecaster().forecast(sid(1), Period(8), &series, 1);
        assert_eq!(a, b);
        assert_eq!(a.confidence.to_bits(), b.confidence.to_bits());
    }

    #[test]
    fn confidence_rises_with_history_and_falls_with_noise() {
        let f = forecaster();
        let short = f.forecast(sid(1), Period(7), &[20; 8], 0);
        let long = f.forecast(sid(1), Period(23), &[20; 24], 0);
        assert!(long.confidence > short.confidence);

        let noisy = f.forecast(sid(1), Period(7), &[5, 40, 5, 40, 5, 40, 5, 40], 0);
        assert!(noisy.confidence < short.confidence);
        assert!(noisy.confidence > 0.0 && noisy.confidence < 1.0);
    }

    #[test]
    fn holt_model_projects_trend() {
        let config = ForecastConfig {
            model: ProjectionModel::Holt,
            ..ForecastConfig::default()
        };
        let f = Forecaster::new(config).unwrap();
        let r = f.forecast(sid(1), Period(7), &[10, 12, 14, 16, 18, 20, 22, 24], 0);
        assert_eq!(r.model, ProjectionModel::Holt);
        assert!(r.projected[0].value > 24.0);
        assert!(r.projected[3].value > r.projected[0].value);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ForecastConfig {
            sustained_periods: 10,
            ..ForecastConfig::default()
        };
        assert!(matches!(
            Forecaster::new(config),
            Err(ForecastError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn ranking_orders_by_class_growth_volume_id() {
        let f = forecaster();
        let mut results = vec![
            f.forecast(sid(4), Period(2), &[1, 2, 3], 0),
            f.forecast(sid(3), Period(7), &[20; 8], 0),
            f.forecast(sid(2), Period(7), &[50, 48, 45, 40, 34, 27, 19, 12], 0),
            f.forecast(sid(5), Period(7), &[10, 11, 12, 14, 17, 21, 26, 32], 0),
            f.forecast(sid(1), Period(7), &[20; 8], 0),
            f.forecast(sid(6), Period(7), &[30; 8], 0),
        ];
        rank_forecasts(&mut results);
        let order: Vec<u64> = results.iter().map(|r| r.skill.get()).collect();
        assert_eq!(order, vec![5, 6, 1, 3, 2, 4]);
    }
}
