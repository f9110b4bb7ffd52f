use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ProductId = i64;
pub type SourceId = i64;

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    /// Our cost; the floor every engine-set price sits on.
    pub cost: f64,
    /// Current selling price. Written only by the engine.
    pub our_price: f64,
    /// Cached competitor stats from the last strategy evaluation.
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub avg_competitor_price: Option<f64>,
    pub is_active: bool,
}

/// A raw price seen at a competitor source. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedPrice {
    pub product_id: ProductId,
    pub source_id: SourceId,
    pub price: f64,
    pub in_stock: bool,
    pub observed_at: DateTime<Utc>,
}

impl ObservedPrice {
    /// Only in-stock, positive prices take part in market statistics.
    pub fn is_qualifying(&self) -> bool {
        self.in_stock && self.price > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Pending,
    Running,
    Success,
    Error,
}

impl std::fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceStatus::Pending => "pending",
            SourceStatus::Running => "running",
            SourceStatus::Success => "success",
            SourceStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for SourceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SourceStatus::Pending),
            "running" => Ok(SourceStatus::Running),
            "success" => Ok(SourceStatus::Success),
            "error" => Ok(SourceStatus::Error),
            other => Err(format!("unknown source status: {other}")),
        }
    }
}

/// An external place prices come from (marketplace, competitor shop).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSource {
    pub id: SourceId,
    pub name: String,
    pub source_type: String,
    pub is_active: bool,
    pub check_status: SourceStatus,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Links one of our products to its listing at a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSourceMapping {
    pub id: i64,
    pub product_id: ProductId,
    pub source_id: SourceId,
    pub last_price: Option<f64>,
    pub is_active: bool,
}

/// Strategy record driving the bulk recompute job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingStrategy {
    pub id: i64,
    /// Percent.
    pub min_markup: f64,
    /// Percent.
    pub max_markup: f64,
    pub min_margin: f64,
    pub competitor_weight: f64,
    pub popularity_weight: f64,
    pub undercut_percentage: f64,
    pub is_active: bool,
}

// ---------------------------------------------------------------------------
// Market analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketPosition {
    Cheapest,
    MostExpensive,
    BelowMedian,
    AboveMedian,
    Median,
}

impl std::fmt::Display for MarketPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MarketPosition::Cheapest => "cheapest",
            MarketPosition::MostExpensive => "most_expensive",
            MarketPosition::BelowMedian => "below_median",
            MarketPosition::AboveMedian => "above_median",
            MarketPosition::Median => "median",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MarketPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cheapest" => Ok(MarketPosition::Cheapest),
            "most_expensive" => Ok(MarketPosition::MostExpensive),
            "below_median" => Ok(MarketPosition::BelowMedian),
            "above_median" => Ok(MarketPosition::AboveMedian),
            "median" => Ok(MarketPosition::Median),
            other => Err(format!("unknown market position: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceTrend {
    Up,
    Down,
    Stable,
}

impl std::fmt::Display for PriceTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PriceTrend::Up => "up",
            PriceTrend::Down => "down",
            PriceTrend::Stable => "stable",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for PriceTrend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(PriceTrend::Up),
            "down" => Ok(PriceTrend::Down),
            "stable" => Ok(PriceTrend::Stable),
            other => Err(format!("unknown price trend: {other}")),
        }
    }
}

/// Percent change of the last hour's average snapshot price against past windows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendDeltas {
    pub trend_24h: Option<f64>,
    pub trend_7d: Option<f64>,
    pub trend_30d: Option<f64>,
    pub direction: PriceTrend,
}

impl Default for TrendDeltas {
    fn default() -> Self {
        Self {
            trend_24h: None,
            trend_7d: None,
            trend_30d: None,
            direction: PriceTrend::Stable,
        }
    }
}

/// Current market snapshot for one product. One row per product, replaced on recompute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketAnalysis {
    pub product_id: ProductId,
    pub active_sellers_count: u32,
    pub price_min: f64,
    pub price_max: f64,
    pub price_avg: f64,
    pub price_median: f64,
    /// None only for rows that never had a deviation computed.
    pub price_std_dev: Option<f64>,
    pub our_position: MarketPosition,
    pub our_price_percentile: f64,
    pub benchmark_price: Option<f64>,
    pub benchmark_deviation: Option<f64>,
    pub trend: TrendDeltas,
    pub is_price_stable: bool,
    pub analyzed_at: DateTime<Utc>,
}

/// Our rank among competitors plus the recommended price. Replaced on recompute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRanking {
    pub product_id: ProductId,
    pub total_competitors: u32,
    /// 1 = cheapest.
    pub our_rank: u32,
    pub price_above_cheapest: f64,
    pub price_below_most_expensive: f64,
    pub recommended_price: f64,
    pub recommendation_reason: String,
    pub analyzed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Alerts, snapshots, history
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    PriceDrop,
    PriceSpike,
}

impl AlertKind {
    pub fn from_change(change_percent: f64) -> Self {
        if change_percent < 0.0 {
            AlertKind::PriceDrop
        } else {
            AlertKind::PriceSpike
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::PriceDrop => write!(f, "price_drop"),
            AlertKind::PriceSpike => write!(f, "price_spike"),
        }
    }
}

impl std::str::FromStr for AlertKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "price_drop" => Ok(AlertKind::PriceDrop),
            "price_spike" => Ok(AlertKind::PriceSpike),
            other => Err(format!("unknown alert kind: {other}")),
        }
    }
}

/// Append-only price change event. Only the acknowledgment fields ever change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceAlert {
    /// Assigned by the store on append.
    pub id: Option<i64>,
    pub product_id: ProductId,
    pub source_id: SourceId,
    pub kind: AlertKind,
    pub old_price: f64,
    pub new_price: f64,
    pub change_percent: f64,
    pub message: String,
    pub is_acknowledged: bool,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

/// Point in the per-(product, source) price time series trends are derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub product_id: ProductId,
    pub source_id: SourceId,
    pub price: f64,
    pub in_stock: bool,
    pub snapshot_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceChangeReason {
    /// Committed by the monitor sweep from a ranking recommendation.
    AutoPricing,
    /// Committed by the bulk strategy recompute.
    Strategy,
}

impl std::fmt::Display for PriceChangeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceChangeReason::AutoPricing => write!(f, "auto_pricing"),
            PriceChangeReason::Strategy => write!(f, "strategy"),
        }
    }
}

impl std::str::FromStr for PriceChangeReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto_pricing" => Ok(PriceChangeReason::AutoPricing),
            "strategy" => Ok(PriceChangeReason::Strategy),
            other => Err(format!("unknown price change reason: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistoryEntry {
    pub product_id: ProductId,
    pub old_price: f64,
    pub new_price: f64,
    pub reason: PriceChangeReason,
    pub created_at: DateTime<Utc>,
}

/// A compare-and-set change of `Product.our_price`.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceChange {
    /// Price the caller read; the write is dropped if the stored price moved since.
    pub expected: f64,
    pub new_price: f64,
    pub reason: PriceChangeReason,
}

/// Result of a computation that may legitimately find nothing to work with.
/// A missing product is an error; no qualifying competitor prices is `NoData`.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Ready(T),
    NoData,
}

impl<T> Outcome<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            Outcome::Ready(v) => Some(v),
            Outcome::NoData => None,
        }
    }

    pub fn as_ready(&self) -> Option<&T> {
        match self {
            Outcome::Ready(v) => Some(v),
            Outcome::NoData => None,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Outcome::NoData)
    }
}

// ---------------------------------------------------------------------------
// Anomalies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anomaly {
    HighPriceVariance,
    SharpPriceMovement,
    PriceOutlier,
    BenchmarkDeviation,
}

impl Anomaly {
    pub fn as_str(&self) -> &'static str {
        match self {
            Anomaly::HighPriceVariance => "high_price_variance",
            Anomaly::SharpPriceMovement => "sharp_price_movement",
            Anomaly::PriceOutlier => "price_outlier",
            Anomaly::BenchmarkDeviation => "benchmark_deviation",
        }
    }
}

impl std::fmt::Display for Anomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
