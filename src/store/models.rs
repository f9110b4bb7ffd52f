//! Database row types matching `migrations/0001_init.sql`, plus conversion into
//! domain types. Timestamps are epoch milliseconds.

use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::types::{
    MarketAnalysis, ObservedPrice, PriceAlert, PriceHistoryEntry, PriceRanking, PriceSnapshot,
    PriceSource, PricingStrategy, Product, ProductSourceMapping, TrendDeltas,
};

pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| AppError::Store(format!("timestamp out of range: {ms}")))
}

fn parse_label<T>(raw: &str) -> Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    raw.parse::<T>().map_err(AppError::Store)
}

#[derive(Debug, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub sku: String,
    pub name: String,
    pub cost: f64,
    pub our_price: f64,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub avg_competitor_price: Option<f64>,
    pub is_active: bool,
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Product {
            id: r.id,
            sku: r.sku,
            name: r.name,
            cost: r.cost,
            our_price: r.our_price,
            min_price: r.min_price,
            max_price: r.max_price,
            avg_competitor_price: r.avg_competitor_price,
            is_active: r.is_active,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ObservedPriceRow {
    pub product_id: i64,
    pub source_id: i64,
    pub price: f64,
    pub in_stock: bool,
    pub observed_at: i64,
}

impl TryFrom<ObservedPriceRow> for ObservedPrice {
    type Error = AppError;

    fn try_from(r: ObservedPriceRow) -> Result<Self> {
        Ok(ObservedPrice {
            product_id: r.product_id,
            source_id: r.source_id,
            price: r.price,
            in_stock: r.in_stock,
            observed_at: from_millis(r.observed_at)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct PriceSourceRow {
    pub id: i64,
    pub name: String,
    pub source_type: String,
    pub is_active: bool,
    pub check_status: String,
    pub last_checked: Option<i64>,
    pub last_error: Option<String>,
}

impl TryFrom<PriceSourceRow> for PriceSource {
    type Error = AppError;

    fn try_from(r: PriceSourceRow) -> Result<Self> {
        Ok(PriceSource {
            id: r.id,
            name: r.name,
            source_type: r.source_type,
            is_active: r.is_active,
            check_status: parse_label(&r.check_status)?,
            last_checked: r.last_checked.map(from_millis).transpose()?,
            last_error: r.last_error,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct MappingRow {
    pub id: i64,
    pub product_id: i64,
    pub source_id: i64,
    pub last_price: Option<f64>,
    pub is_active: bool,
}

impl From<MappingRow> for ProductSourceMapping {
    fn from(r: MappingRow) -> Self {
        ProductSourceMapping {
            id: r.id,
            product_id: r.product_id,
            source_id: r.source_id,
            last_price: r.last_price,
            is_active: r.is_active,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct StrategyRow {
    pub id: i64,
    pub min_markup: f64,
    pub max_markup: f64,
    pub min_margin: f64,
    pub competitor_weight: f64,
    pub popularity_weight: f64,
    pub undercut_percentage: f64,
    pub is_active: bool,
}

impl From<StrategyRow> for PricingStrategy {
    fn from(r: StrategyRow) -> Self {
        PricingStrategy {
            id: r.id,
            min_markup: r.min_markup,
            max_markup: r.max_markup,
            min_margin: r.min_margin,
            competitor_weight: r.competitor_weight,
            popularity_weight: r.popularity_weight,
            undercut_percentage: r.undercut_percentage,
            is_active: r.is_active,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct SnapshotRow {
    pub product_id: i64,
    pub source_id: i64,
    pub price: f64,
    pub in_stock: bool,
    pub snapshot_at: i64,
}

impl TryFrom<SnapshotRow> for PriceSnapshot {
    type Error = AppError;

    fn try_from(r: SnapshotRow) -> Result<Self> {
        Ok(PriceSnapshot {
            product_id: r.product_id,
            source_id: r.source_id,
            price: r.price,
            in_stock: r.in_stock,
            snapshot_at: from_millis(r.snapshot_at)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct AnalysisRow {
    pub product_id: i64,
    pub active_sellers_count: i64,
    pub price_min: f64,
    pub price_max: f64,
    pub price_avg: f64,
    pub price_median: f64,
    pub price_std_dev: Option<f64>,
    pub our_position: String,
    pub our_price_percentile: f64,
    pub benchmark_price: Option<f64>,
    pub benchmark_deviation: Option<f64>,
    pub price_trend: String,
    pub price_trend_24h: Option<f64>,
    pub price_trend_7d: Option<f64>,
    pub price_trend_30d: Option<f64>,
    pub is_price_stable: bool,
    pub analyzed_at: i64,
}

impl TryFrom<AnalysisRow> for MarketAnalysis {
    type Error = AppError;

    fn try_from(r: AnalysisRow) -> Result<Self> {
        Ok(MarketAnalysis {
            product_id: r.product_id,
            active_sellers_count: r.active_sellers_count as u32,
            price_min: r.price_min,
            price_max: r.price_max,
            price_avg: r.price_avg,
            price_median: r.price_median,
            price_std_dev: r.price_std_dev,
            our_position: parse_label(&r.our_position)?,
            our_price_percentile: r.our_price_percentile,
            benchmark_price: r.benchmark_price,
            benchmark_deviation: r.benchmark_deviation,
            trend: TrendDeltas {
                trend_24h: r.price_trend_24h,
                trend_7d: r.price_trend_7d,
                trend_30d: r.price_trend_30d,
                direction: parse_label(&r.price_trend)?,
            },
            is_price_stable: r.is_price_stable,
            analyzed_at: from_millis(r.analyzed_at)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct RankingRow {
    pub product_id: i64,
    pub total_competitors: i64,
    pub our_rank: i64,
    pub price_above_cheapest: f64,
    pub price_below_most_expensive: f64,
    pub recommended_price: f64,
    pub recommendation_reason: String,
    pub analyzed_at: i64,
}

impl TryFrom<RankingRow> for PriceRanking {
    type Error = AppError;

    fn try_from(r: RankingRow) -> Result<Self> {
        Ok(PriceRanking {
            product_id: r.product_id,
            total_competitors: r.total_competitors as u32,
            our_rank: r.our_rank as u32,
            price_above_cheapest: r.price_above_cheapest,
            price_below_most_expensive: r.price_below_most_expensive,
            recommended_price: r.recommended_price,
            recommendation_reason: r.recommendation_reason,
            analyzed_at: from_millis(r.analyzed_at)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct AlertRow {
    pub id: i64,
    pub product_id: i64,
    pub source_id: i64,
    pub alert_type: String,
    pub old_price: f64,
    pub new_price: f64,
    pub change_percent: f64,
    pub message: String,
    pub is_acknowledged: bool,
    pub created_at: i64,
    pub acknowledged_at: Option<i64>,
}

impl TryFrom<AlertRow> for PriceAlert {
    type Error = AppError;

    fn try_from(r: AlertRow) -> Result<Self> {
        Ok(PriceAlert {
            id: Some(r.id),
            product_id: r.product_id,
            source_id: r.source_id,
            kind: parse_label(&r.alert_type)?,
            old_price: r.old_price,
            new_price: r.new_price,
            change_percent: r.change_percent,
            message: r.message,
            is_acknowledged: r.is_acknowledged,
            created_at: from_millis(r.created_at)?,
            acknowledged_at: r.acknowledged_at.map(from_millis).transpose()?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct HistoryRow {
    pub product_id: i64,
    pub old_price: f64,
    pub new_price: f64,
    pub change_reason: String,
    pub created_at: i64,
}

impl TryFrom<HistoryRow> for PriceHistoryEntry {
    type Error = AppError;

    fn try_from(r: HistoryRow) -> Result<Self> {
        Ok(PriceHistoryEntry {
            product_id: r.product_id,
            old_price: r.old_price,
            new_price: r.new_price,
            reason: parse_label(&r.change_reason)?,
            created_at: from_millis(r.created_at)?,
        })
    }
}
