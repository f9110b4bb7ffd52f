use chrono::{DateTime, Duration, Utc};

use crate::config::{trend_bands, TREND_WINDOW_SECS};
use crate::error::Result;
use crate::stats::percent_change;
use crate::store::PriceStore;
use crate::types::{PriceTrend, ProductId, TrendDeltas};

/// How far back each past window is centred: 24h, 7d, 30d.
const LOOKBACKS_HOURS: [i64; 3] = [24, 7 * 24, 30 * 24];

/// Percent change of the last hour's average snapshot price against one-hour windows
/// centred 24h, 7d and 30d before `now`. Every delta is None when the last hour has no
/// snapshots; a single delta is None when its past window is empty or averages zero.
pub async fn compute_trends(
    store: &dyn PriceStore,
    product_id: ProductId,
    now: DateTime<Utc>,
) -> Result<TrendDeltas> {
    let window = Duration::seconds(TREND_WINDOW_SECS);
    let Some(current) = store
        .average_snapshot_price(product_id, None, now - window, now)
        .await?
    else {
        return Ok(TrendDeltas::default());
    };

    let half = Duration::seconds(TREND_WINDOW_SECS / 2);
    let mut deltas = [None; 3];
    for (slot, hours) in deltas.iter_mut().zip(LOOKBACKS_HOURS) {
        let centre = now - Duration::hours(hours);
        let past = store
            .average_snapshot_price(product_id, None, centre - half, centre + half)
            .await?;
        *slot = past.and_then(|p| percent_change(p, current));
    }

    let [trend_24h, trend_7d, trend_30d] = deltas;
    Ok(TrendDeltas {
        trend_24h,
        trend_7d,
        trend_30d,
        direction: trend_direction(trend_7d),
    })
}

/// Overall label from the 7-day delta.
pub fn trend_direction(trend_7d: Option<f64>) -> PriceTrend {
    match trend_7d {
        Some(d) if d > trend_bands::UP => PriceTrend::Up,
        Some(d) if d < trend_bands::DOWN => PriceTrend::Down,
        _ => PriceTrend::Stable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{now, snapshot};
    use crate::store::MemoryStore;

    #[test]
    fn direction_bands_are_exclusive() {
        assert_eq!(trend_direction(None), PriceTrend::Stable);
        assert_eq!(trend_direction(Some(5.0)), PriceTrend::Stable);
        assert_eq!(trend_direction(Some(5.1)), PriceTrend::Up);
        assert_eq!(trend_direction(Some(-5.0)), PriceTrend::Stable);
        assert_eq!(trend_direction(Some(-7.5)), PriceTrend::Down);
    }

    #[tokio::test]
    async fn no_recent_snapshots_means_no_trends() {
        let store = MemoryStore::new();
        snapshot(&store, 1, 1, 100.0, now() - Duration::hours(24)).await;

        let t = compute_trends(store.as_ref(), 1, now()).await.unwrap();
        assert_eq!(t, TrendDeltas::default());
    }

    #[tokio::test]
    async fn deltas_against_centred_windows() {
        let store = MemoryStore::new();
        let t = now();
        snapshot(&store, 1, 1, 110.0, t - Duration::minutes(10)).await;
        // 20 minutes off the 24h mark is still inside its window.
        snapshot(&store, 1, 1, 100.0, t - Duration::hours(24) + Duration::minutes(20)).await;
        snapshot(&store, 1, 1, 125.0, t - Duration::days(7) - Duration::minutes(25)).await;

        let trends = compute_trends(store.as_ref(), 1, t).await.unwrap();
        assert!((trends.trend_24h.unwrap() - 10.0).abs() < 1e-9);
        assert!((trends.trend_7d.unwrap() + 12.0).abs() < 1e-9);
        assert_eq!(trends.trend_30d, None);
        assert_eq!(trends.direction, PriceTrend::Down);
    }

    #[tokio::test]
    async fn snapshots_outside_past_window_ignored() {
        let store = MemoryStore::new();
        let t = now();
        snapshot(&store, 1, 1, 100.0, t).await;
        snapshot(&store, 1, 1, 50.0, t - Duration::hours(25)).await;

        let trends = compute_trends(store.as_ref(), 1, t).await.unwrap();
        assert_eq!(trends.trend_24h, None);
    }
}
