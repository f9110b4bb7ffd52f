use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::error::{AppError, Result};
use crate::store::models::{
    to_millis, AlertRow, AnalysisRow, HistoryRow, MappingRow, ObservedPriceRow, PriceSourceRow,
    ProductRow, RankingRow, SnapshotRow, StrategyRow,
};
use crate::store::{CommitOutcome, PriceStore, ProductCommit};
use crate::types::{
    MarketAnalysis, ObservedPrice, PriceAlert, PriceChange, PriceHistoryEntry, PriceRanking,
    PriceSnapshot, PriceSource, PricingStrategy, Product, ProductId, ProductSourceMapping,
    SourceId, SourceStatus,
};

const PRODUCT_COLUMNS: &str =
    "id, sku, name, cost, our_price, min_price, max_price, avg_competitor_price, is_active";
const SOURCE_COLUMNS: &str =
    "id, name, source_type, is_active, check_status, last_checked, last_error";
const ALERT_COLUMNS: &str = "id, product_id, source_id, alert_type, old_price, new_price, \
     change_percent, message, is_acknowledged, created_at, acknowledged_at";

/// SQLite-backed price store. Every write that touches more than one row runs in a
/// transaction; `commit_product` is one transaction per product.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(db_path: &str) -> Result<Self> {
        let options =
            SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))?.create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        Ok(Self { pool })
    }

    /// Single-connection in-memory database; the connection is never recycled so the
    /// data lives as long as the store.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Ingestion-side writes. The engine never calls these; collectors and tests do.
    // -----------------------------------------------------------------------

    pub async fn insert_product(&self, p: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, cost, our_price, min_price, max_price,
                avg_competitor_price, is_active
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(p.id)
        .bind(&p.sku)
        .bind(&p.name)
        .bind(p.cost)
        .bind(p.our_price)
        .bind(p.min_price)
        .bind(p.max_price)
        .bind(p.avg_competitor_price)
        .bind(p.is_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_observed_price(&self, o: &ObservedPrice) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO observed_prices (product_id, source_id, price, in_stock, observed_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(o.product_id)
        .bind(o.source_id)
        .bind(o.price)
        .bind(o.in_stock)
        .bind(to_millis(o.observed_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_source(&self, s: &PriceSource) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO price_sources (
                id, name, source_type, is_active, check_status, last_checked, last_error
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(s.id)
        .bind(&s.name)
        .bind(&s.source_type)
        .bind(s.is_active)
        .bind(s.check_status.to_string())
        .bind(s.last_checked.map(to_millis))
        .bind(s.last_error.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_mapping(&self, m: &ProductSourceMapping) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO product_source_mappings (id, product_id, source_id, last_price, is_active)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(m.id)
        .bind(m.product_id)
        .bind(m.source_id)
        .bind(m.last_price)
        .bind(m.is_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_strategy(&self, s: &PricingStrategy) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pricing_strategies (
                id, min_markup, max_markup, min_margin, competitor_weight,
                popularity_weight, undercut_percentage, is_active
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(s.id)
        .bind(s.min_markup)
        .bind(s.max_markup)
        .bind(s.min_margin)
        .bind(s.competitor_weight)
        .bind(s.popularity_weight)
        .bind(s.undercut_percentage)
        .bind(s.is_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Connection-level writes shared by standalone calls and `commit_product`
// ---------------------------------------------------------------------------

async fn write_analysis(conn: &mut SqliteConnection, a: &MarketAnalysis) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO market_analysis (
            product_id, active_sellers_count, price_min, price_max, price_avg,
            price_median, price_std_dev, our_position, our_price_percentile,
            benchmark_price, benchmark_deviation, price_trend, price_trend_24h,
            price_trend_7d, price_trend_30d, is_price_stable, analyzed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(product_id) DO UPDATE SET
            active_sellers_count = excluded.active_sellers_count,
            price_min = excluded.price_min,
            price_max = excluded.price_max,
            price_avg = excluded.price_avg,
            price_median = excluded.price_median,
            price_std_dev = excluded.price_std_dev,
            our_position = excluded.our_position,
            our_price_percentile = excluded.our_price_percentile,
            benchmark_price = excluded.benchmark_price,
            benchmark_deviation = excluded.benchmark_deviation,
            price_trend = excluded.price_trend,
            price_trend_24h = excluded.price_trend_24h,
            price_trend_7d = excluded.price_trend_7d,
            price_trend_30d = excluded.price_trend_30d,
            is_price_stable = excluded.is_price_stable,
            analyzed_at = excluded.analyzed_at
        "#,
    )
    .bind(a.product_id)
    .bind(i64::from(a.active_sellers_count))
    .bind(a.price_min)
    .bind(a.price_max)
    .bind(a.price_avg)
    .bind(a.price_median)
    .bind(a.price_std_dev)
    .bind(a.our_position.to_string())
    .bind(a.our_price_percentile)
    .bind(a.benchmark_price)
    .bind(a.benchmark_deviation)
    .bind(a.trend.direction.to_string())
    .bind(a.trend.trend_24h)
    .bind(a.trend.trend_7d)
    .bind(a.trend.trend_30d)
    .bind(a.is_price_stable)
    .bind(to_millis(a.analyzed_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn write_competitor_stats(
    conn: &mut SqliteConnection,
    product_id: ProductId,
    min: f64,
    max: f64,
    avg: f64,
) -> Result<()> {
    let updated = sqlx::query(
        "UPDATE products SET min_price = ?, max_price = ?, avg_competitor_price = ? WHERE id = ?",
    )
    .bind(min)
    .bind(max)
    .bind(avg)
    .bind(product_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();
    if updated == 0 {
        return Err(AppError::ProductNotFound(product_id));
    }
    Ok(())
}

async fn write_ranking(conn: &mut SqliteConnection, r: &PriceRanking) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO price_rankings (
            product_id, total_competitors, our_rank, price_above_cheapest,
            price_below_most_expensive, recommended_price, recommendation_reason, analyzed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(product_id) DO UPDATE SET
            total_competitors = excluded.total_competitors,
            our_rank = excluded.our_rank,
            price_above_cheapest = excluded.price_above_cheapest,
            price_below_most_expensive = excluded.price_below_most_expensive,
            recommended_price = excluded.recommended_price,
            recommendation_reason = excluded.recommendation_reason,
            analyzed_at = excluded.analyzed_at
        "#,
    )
    .bind(r.product_id)
    .bind(i64::from(r.total_competitors))
    .bind(i64::from(r.our_rank))
    .bind(r.price_above_cheapest)
    .bind(r.price_below_most_expensive)
    .bind(r.recommended_price)
    .bind(&r.recommendation_reason)
    .bind(to_millis(r.analyzed_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_alert(conn: &mut SqliteConnection, a: &PriceAlert) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO price_alerts (
            product_id, source_id, alert_type, old_price, new_price, change_percent,
            message, is_acknowledged, created_at, acknowledged_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(a.product_id)
    .bind(a.source_id)
    .bind(a.kind.to_string())
    .bind(a.old_price)
    .bind(a.new_price)
    .bind(a.change_percent)
    .bind(&a.message)
    .bind(a.is_acknowledged)
    .bind(to_millis(a.created_at))
    .bind(a.acknowledged_at.map(to_millis))
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Compare-and-set on `our_price` plus the matching history row.
async fn apply_price_change(
    conn: &mut SqliteConnection,
    product_id: ProductId,
    change: &PriceChange,
    at: DateTime<Utc>,
) -> Result<bool> {
    let updated = sqlx::query("UPDATE products SET our_price = ? WHERE id = ? AND our_price = ?")
        .bind(change.new_price)
        .bind(product_id)
        .bind(change.expected)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    if updated == 0 {
        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE id = ?")
            .bind(product_id)
            .fetch_one(&mut *conn)
            .await?;
        if exists == 0 {
            return Err(AppError::ProductNotFound(product_id));
        }
        return Ok(false);
    }

    sqlx::query(
        r#"
        INSERT INTO price_history (product_id, old_price, new_price, change_reason, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(product_id)
    .bind(change.expected)
    .bind(change.new_price)
    .bind(change.reason.to_string())
    .bind(to_millis(at))
    .execute(&mut *conn)
    .await?;
    Ok(true)
}

#[async_trait]
impl PriceStore for SqliteStore {
    async fn product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let row: Option<ProductRow> =
            sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?"))
                .bind(product_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Product::from))
    }

    async fn active_products(&self) -> Result<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE is_active = 1 ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn fetch_in_stock_prices(&self, product_id: ProductId) -> Result<Vec<(SourceId, f64)>> {
        Ok(self
            .latest_observed_prices(product_id)
            .await?
            .into_iter()
            .filter(ObservedPrice::is_qualifying)
            .map(|o| (o.source_id, o.price))
            .collect())
    }

    async fn latest_observed_prices(&self, product_id: ProductId) -> Result<Vec<ObservedPrice>> {
        let rows: Vec<ObservedPriceRow> = sqlx::query_as(
            r#"
            SELECT o.product_id, o.source_id, o.price, o.in_stock, o.observed_at
            FROM observed_prices o
            WHERE o.product_id = ?
              AND o.id = (
                  SELECT o2.id FROM observed_prices o2
                  WHERE o2.product_id = o.product_id AND o2.source_id = o.source_id
                  ORDER BY o2.observed_at DESC, o2.id DESC
                  LIMIT 1
              )
            ORDER BY o.source_id
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ObservedPrice::try_from).collect()
    }

    async fn fetch_snapshot_window(
        &self,
        product_id: ProductId,
        source_id: Option<SourceId>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<(f64, DateTime<Utc>)>> {
        let rows: Vec<SnapshotRow> = sqlx::query_as(
            r#"
            SELECT product_id, source_id, price, in_stock, snapshot_at
            FROM price_snapshots
            WHERE product_id = ?
              AND snapshot_at >= ? AND snapshot_at <= ?
              AND (? IS NULL OR source_id = ?)
            ORDER BY snapshot_at, id
            "#,
        )
        .bind(product_id)
        .bind(to_millis(from))
        .bind(to_millis(to))
        .bind(source_id)
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| PriceSnapshot::try_from(r).map(|s| (s.price, s.snapshot_at)))
            .collect()
    }

    async fn average_snapshot_price(
        &self,
        product_id: ProductId,
        source_id: Option<SourceId>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        let avg: Option<f64> = sqlx::query_scalar(
            r#"
            SELECT AVG(price) FROM price_snapshots
            WHERE product_id = ?
              AND snapshot_at >= ? AND snapshot_at <= ?
              AND (? IS NULL OR source_id = ?)
            "#,
        )
        .bind(product_id)
        .bind(to_millis(from))
        .bind(to_millis(to))
        .bind(source_id)
        .bind(source_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(avg)
    }

    async fn last_snapshot_per_source(
        &self,
        product_id: ProductId,
        before: DateTime<Utc>,
    ) -> Result<HashMap<SourceId, PriceSnapshot>> {
        let rows: Vec<SnapshotRow> = sqlx::query_as(
            r#"
            SELECT s.product_id, s.source_id, s.price, s.in_stock, s.snapshot_at
            FROM price_snapshots s
            WHERE s.product_id = ?
              AND s.id = (
                  SELECT s2.id FROM price_snapshots s2
                  WHERE s2.product_id = s.product_id
                    AND s2.source_id = s.source_id
                    AND s2.snapshot_at < ?
                  ORDER BY s2.snapshot_at DESC, s2.id DESC
                  LIMIT 1
              )
            "#,
        )
        .bind(product_id)
        .bind(to_millis(before))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| PriceSnapshot::try_from(r).map(|s| (s.source_id, s)))
            .collect()
    }

    async fn source(&self, source_id: SourceId) -> Result<Option<PriceSource>> {
        let row: Option<PriceSourceRow> =
            sqlx::query_as(&format!("SELECT {SOURCE_COLUMNS} FROM price_sources WHERE id = ?"))
                .bind(source_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(PriceSource::try_from).transpose()
    }

    async fn active_sources(&self) -> Result<Vec<PriceSource>> {
        let rows: Vec<PriceSourceRow> = sqlx::query_as(&format!(
            "SELECT {SOURCE_COLUMNS} FROM price_sources WHERE is_active = 1 ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PriceSource::try_from).collect()
    }

    async fn source_mappings(&self, source_id: SourceId) -> Result<Vec<ProductSourceMapping>> {
        let rows: Vec<MappingRow> = sqlx::query_as(
            r#"
            SELECT id, product_id, source_id, last_price, is_active
            FROM product_source_mappings
            WHERE source_id = ? AND is_active = 1
            ORDER BY id
            "#,
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ProductSourceMapping::from).collect())
    }

    async fn active_strategy(&self) -> Result<Option<PricingStrategy>> {
        let row: Option<StrategyRow> = sqlx::query_as(
            r#"
            SELECT id, min_markup, max_markup, min_margin, competitor_weight,
                   popularity_weight, undercut_percentage, is_active
            FROM pricing_strategies
            WHERE is_active = 1
            ORDER BY id
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PricingStrategy::from))
    }

    async fn analysis(&self, product_id: ProductId) -> Result<Option<MarketAnalysis>> {
        let row: Option<AnalysisRow> =
            sqlx::query_as("SELECT * FROM market_analysis WHERE product_id = ?")
                .bind(product_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(MarketAnalysis::try_from).transpose()
    }

    async fn ranking(&self, product_id: ProductId) -> Result<Option<PriceRanking>> {
        let row: Option<RankingRow> =
            sqlx::query_as("SELECT * FROM price_rankings WHERE product_id = ?")
                .bind(product_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(PriceRanking::try_from).transpose()
    }

    async fn list_alerts(&self, acknowledged: bool, limit: usize) -> Result<Vec<PriceAlert>> {
        let rows: Vec<AlertRow> = sqlx::query_as(&format!(
            "SELECT {ALERT_COLUMNS} FROM price_alerts WHERE is_acknowledged = ? \
             ORDER BY created_at DESC, id DESC LIMIT ?"
        ))
        .bind(acknowledged)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PriceAlert::try_from).collect()
    }

    async fn price_history(&self, product_id: ProductId) -> Result<Vec<PriceHistoryEntry>> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            r#"
            SELECT product_id, old_price, new_price, change_reason, created_at
            FROM price_history
            WHERE product_id = ?
            ORDER BY created_at, id
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PriceHistoryEntry::try_from).collect()
    }

    async fn upsert_analysis(&self, analysis: &MarketAnalysis) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        write_analysis(&mut conn, analysis).await
    }

    async fn upsert_ranking(&self, ranking: &PriceRanking) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        write_ranking(&mut conn, ranking).await
    }

    async fn append_alert(&self, alert: &PriceAlert) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        insert_alert(&mut conn, alert).await
    }

    async fn append_snapshot(&self, snapshot: &PriceSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO price_snapshots (product_id, source_id, price, in_stock, snapshot_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(snapshot.product_id)
        .bind(snapshot.source_id)
        .bind(snapshot.price)
        .bind(snapshot.in_stock)
        .bind(to_millis(snapshot.snapshot_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_product_price(
        &self,
        product_id: ProductId,
        change: &PriceChange,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let applied = apply_price_change(&mut tx, product_id, change, at).await?;
        tx.commit().await?;
        Ok(applied)
    }

    async fn update_competitor_stats(
        &self,
        product_id: ProductId,
        min: f64,
        max: f64,
        avg: f64,
    ) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        write_competitor_stats(&mut conn, product_id, min, max, avg).await
    }

    async fn update_source_status(
        &self,
        source_id: SourceId,
        status: SourceStatus,
        error: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let query = if status == SourceStatus::Running {
            sqlx::query(
                "UPDATE price_sources SET check_status = ?, last_error = ?, last_checked = ? WHERE id = ?",
            )
            .bind(status.to_string())
            .bind(error)
            .bind(to_millis(at))
            .bind(source_id)
        } else {
            sqlx::query("UPDATE price_sources SET check_status = ?, last_error = ? WHERE id = ?")
                .bind(status.to_string())
                .bind(error)
                .bind(source_id)
        };
        let updated = query.execute(&self.pool).await?.rows_affected();
        if updated == 0 {
            return Err(AppError::SourceNotFound(source_id));
        }
        Ok(())
    }

    async fn acknowledge_alert(&self, alert_id: i64, at: DateTime<Utc>) -> Result<PriceAlert> {
        let updated = sqlx::query(
            "UPDATE price_alerts SET is_acknowledged = 1, acknowledged_at = ? WHERE id = ?",
        )
        .bind(to_millis(at))
        .bind(alert_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(AppError::AlertNotFound(alert_id));
        }
        let row: AlertRow =
            sqlx::query_as(&format!("SELECT {ALERT_COLUMNS} FROM price_alerts WHERE id = ?"))
                .bind(alert_id)
                .fetch_one(&self.pool)
                .await?;
        PriceAlert::try_from(row)
    }

    async fn commit_product(&self, commit: ProductCommit) -> Result<CommitOutcome> {
        let mut tx = self.pool.begin().await?;

        if let Some(analysis) = &commit.analysis {
            write_analysis(&mut tx, analysis).await?;
            write_competitor_stats(
                &mut tx,
                commit.product_id,
                analysis.price_min,
                analysis.price_max,
                analysis.price_avg,
            )
            .await?;
        }
        if let Some(ranking) = &commit.ranking {
            write_ranking(&mut tx, ranking).await?;
        }
        let mut alert_ids = Vec::with_capacity(commit.alerts.len());
        for alert in &commit.alerts {
            alert_ids.push(insert_alert(&mut tx, alert).await?);
        }
        let price_updated = match &commit.price_change {
            Some(change) => {
                apply_price_change(&mut tx, commit.product_id, change, commit.committed_at).await?
            }
            None => false,
        };

        tx.commit().await?;
        Ok(CommitOutcome { alert_ids, price_updated })
    }

    async fn delete_alerts_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM price_alerts WHERE created_at < ?")
            .bind(to_millis(cutoff))
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }

    async fn delete_snapshots_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM price_snapshots WHERE snapshot_at < ?")
            .bind(to_millis(cutoff))
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }
}
