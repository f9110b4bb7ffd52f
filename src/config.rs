use crate::error::{AppError, Result};

pub const DB_PATH: &str = "price_engine.db";

/// Length of every averaging window used for trend deltas (seconds).
pub const TREND_WINDOW_SECS: i64 = 3_600;

/// Default page size when listing alerts.
pub const ALERT_LIST_LIMIT: usize = 50;

/// Market position bands around the competitor average.
pub mod position_bands {
    /// `p <= avg * BELOW` → below_median
    pub const BELOW: f64 = 0.95;
    /// `p >= avg * ABOVE` → above_median
    pub const ABOVE: f64 = 1.05;
}

/// Overall trend label bounds applied to the 7-day delta (percent).
pub mod trend_bands {
    pub const UP: f64 = 5.0;
    pub const DOWN: f64 = -5.0;
}

/// Anomaly rules evaluated against a stored market analysis.
pub mod anomaly_thresholds {
    /// stddev above `avg * HIGH_VARIANCE_RATIO` is high variance.
    pub const HIGH_VARIANCE_RATIO: f64 = 0.5;
    /// |24h delta| above this percent is a sharp move.
    pub const SHARP_MOVE_PCT: f64 = 10.0;
    pub const OUTLIER_LOW_PERCENTILE: f64 = 10.0;
    pub const OUTLIER_HIGH_PERCENTILE: f64 = 90.0;
    /// |benchmark deviation| above this percent is flagged.
    pub const BENCHMARK_DEVIATION_PCT: f64 = 20.0;
    /// Deviation beyond which benchmark validation fails outright.
    pub const BENCHMARK_VALIDATION_PCT: f64 = 30.0;
}

/// Multipliers for both pricing policies.
pub mod pricing_factors {
    /// Undercut the competitor average by 2%.
    pub const UNDERCUT_AVERAGE: f64 = 0.98;
    /// Competitors far above base: `avg > base * RICH_MARKET` → `avg * RICH_MARKET_PRICE`.
    pub const RICH_MARKET: f64 = 1.15;
    pub const RICH_MARKET_PRICE: f64 = 0.95;
    /// Competitors far below base: `avg < base * CHEAP_MARKET` → `avg * CHEAP_MARKET_PRICE`.
    pub const CHEAP_MARKET: f64 = 0.85;
    pub const CHEAP_MARKET_PRICE: f64 = 1.02;
}

/// Markup bounds, margin floor and weights for the ranker's pricing policy.
///
/// The undercut-average policy only reads `markup_max` (ceiling) and `min_margin`
/// (floor). `markup_min` and the two weights are carried settings: they are loaded and
/// validated so deployments can set them, but no formula consumes them yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingConfig {
    /// Percent. Carried; checked against `markup_max` only.
    pub markup_min: f64,
    /// Percent.
    pub markup_max: f64,
    /// Absolute currency units over cost.
    pub min_margin: f64,
    /// Carried.
    pub competitor_weight: f64,
    /// Carried.
    pub popularity_weight: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            markup_min: 10.0,
            markup_max: 30.0,
            min_margin: 50.0,
            competitor_weight: 0.7,
            popularity_weight: 0.2,
        }
    }
}

/// Thresholds the monitor applies when raising alerts and committing prices.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorThresholds {
    /// Alert when |change| exceeds this percent.
    pub alert_change_pct: f64,
    /// Commit only when |recommended - current| exceeds this many currency units...
    pub hysteresis_abs: f64,
    /// ...or the difference exceeds this percent of the current price.
    pub hysteresis_pct: f64,
}

impl Default for MonitorThresholds {
    fn default() -> Self {
        Self {
            alert_change_pct: 10.0,
            hysteresis_abs: 5.0,
            hysteresis_pct: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetentionConfig {
    pub alert_days: i64,
    pub snapshot_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            alert_days: 30,
            snapshot_days: 90,
        }
    }
}

/// Immutable engine configuration handed to every component call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub pricing: PricingConfig,
    pub monitor: MonitorThresholds,
    pub retention: RetentionConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        let p = &self.pricing;
        if p.markup_min < 0.0 || p.markup_max < 0.0 || p.min_margin < 0.0 {
            return Err(AppError::Config(
                "MARKUP_MIN, MARKUP_MAX and MIN_MARGIN must be non-negative".to_string(),
            ));
        }
        if p.markup_min > p.markup_max {
            return Err(AppError::Config(
                "MARKUP_MIN must not exceed MARKUP_MAX".to_string(),
            ));
        }
        if self.retention.alert_days <= 0 || self.retention.snapshot_days <= 0 {
            return Err(AppError::Config("retention periods must be positive".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            pricing: PricingConfig {
                markup_min: env_parse("MARKUP_MIN", defaults.pricing.markup_min)?,
                markup_max: env_parse("MARKUP_MAX", defaults.pricing.markup_max)?,
                min_margin: env_parse("MIN_MARGIN", defaults.pricing.min_margin)?,
                competitor_weight: env_parse(
                    "COMPETITOR_WEIGHT",
                    defaults.pricing.competitor_weight,
                )?,
                popularity_weight: env_parse(
                    "POPULARITY_WEIGHT",
                    defaults.pricing.popularity_weight,
                )?,
            },
            monitor: defaults.monitor,
            retention: RetentionConfig {
                alert_days: env_parse("ALERT_RETENTION_DAYS", defaults.retention.alert_days)?,
                snapshot_days: env_parse(
                    "SNAPSHOT_RETENTION_DAYS",
                    defaults.retention.snapshot_days,
                )?,
            },
        };
        engine.validate()?;

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| DB_PATH.to_string()),
            engine,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} has an invalid value: {raw}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_settings() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.pricing.markup_min, 10.0);
        assert_eq!(cfg.pricing.markup_max, 30.0);
        assert_eq!(cfg.pricing.min_margin, 50.0);
        assert_eq!(cfg.monitor.alert_change_pct, 10.0);
        assert_eq!(cfg.retention.alert_days, 30);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn inverted_markup_bounds_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.pricing.markup_min = 40.0;
        assert!(matches!(cfg.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn negative_margin_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.pricing.min_margin = -1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn env_parse_falls_back_and_rejects_garbage() {
        assert_eq!(env_parse("PRICE_ENGINE_TEST_UNSET_KEY", 7i64).unwrap(), 7);
        std::env::set_var("PRICE_ENGINE_TEST_BAD_KEY", "seven");
        assert!(env_parse::<f64>("PRICE_ENGINE_TEST_BAD_KEY", 1.0).is_err());
    }
}
