//! Entry points an external scheduler calls. Each returns a `TaskReport`; no error or
//! panic inside a task escapes as anything else.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::benchmark::BenchmarkProvider;
use crate::config::EngineConfig;
use crate::detector::AnomalyDetector;
use crate::error::{AppError, Result};
use crate::monitor::{PriceMonitor, SourceCheck, SweepStats};
use crate::pricing::{RecomputeSummary, StrategyEvaluator};
use crate::store::PriceStore;
use crate::types::{Anomaly, PriceAlert, ProductId, SourceId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TaskReport<T> {
    Success(T),
    Error { message: String },
}

impl<T> TaskReport<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskReport::Success(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            TaskReport::Success(v) => Some(v),
            TaskReport::Error { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceResult {
    pub source_id: SourceId,
    pub name: String,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRound {
    pub results: Vec<SourceResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupReport {
    pub deleted: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyReport {
    pub product_id: ProductId,
    pub anomalies: Vec<Anomaly>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertList {
    pub alerts: Vec<PriceAlert>,
}

/// Owns the shared store and configuration; builds a fresh worker per task so
/// invocations share nothing but the store.
#[derive(Clone)]
pub struct TaskRunner {
    store: Arc<dyn PriceStore>,
    benchmark: Arc<dyn BenchmarkProvider>,
    cfg: EngineConfig,
}

impl TaskRunner {
    pub fn new(store: Arc<dyn PriceStore>, benchmark: Arc<dyn BenchmarkProvider>, cfg: EngineConfig) -> Self {
        Self { store, benchmark, cfg }
    }

    fn monitor(&self) -> PriceMonitor {
        PriceMonitor::new(self.store.clone(), self.benchmark.clone(), self.cfg.clone())
    }

    /// Succeeds as long as at least one product got through; a sweep where every
    /// product failed is an error report.
    pub async fn run_full_sweep(&self, now: DateTime<Utc>) -> TaskReport<SweepStats> {
        let monitor = self.monitor();
        guarded("full_sweep", async move {
            let stats = monitor.monitor_all_products(now).await?;
            if stats.total_products > 0 && stats.failures == stats.total_products {
                return Err(AppError::NoProgress {
                    total_products: stats.total_products,
                });
            }
            Ok(stats)
        })
        .await
    }

    pub async fn run_source_check(&self, source_id: SourceId, now: DateTime<Utc>) -> TaskReport<SourceCheck> {
        let monitor = self.monitor();
        guarded("source_check", async move {
            monitor.monitor_price_source(source_id, now).await
        })
        .await
    }

    /// Checks every active source in turn; one failing source does not stop the round.
    pub async fn run_source_round(&self, now: DateTime<Utc>) -> TaskReport<SourceRound> {
        let monitor = self.monitor();
        guarded("source_round", async move {
            let sources = monitor.store.active_sources().await?;
            info!("Starting price source monitoring round over {} sources", sources.len());
            let mut results = Vec::with_capacity(sources.len());
            for source in sources {
                let success = monitor.monitor_price_source(source.id, now).await.is_ok();
                results.push(SourceResult {
                    source_id: source.id,
                    name: source.name,
                    success,
                });
            }
            Ok(SourceRound { results })
        })
        .await
    }

    pub async fn run_bulk_recompute(&self, now: DateTime<Utc>) -> TaskReport<RecomputeSummary> {
        let evaluator = StrategyEvaluator::new(self.store.clone());
        guarded("bulk_recompute", async move { evaluator.recompute_all(now).await }).await
    }

    pub async fn cleanup_old_alerts(&self, now: DateTime<Utc>) -> TaskReport<CleanupReport> {
        let store = self.store.clone();
        let cutoff = now - Duration::days(self.cfg.retention.alert_days);
        guarded("cleanup_alerts", async move {
            let deleted = store.delete_alerts_before(cutoff).await?;
            info!("Deleted {deleted} old price alerts");
            Ok(CleanupReport { deleted })
        })
        .await
    }

    pub async fn cleanup_old_snapshots(&self, now: DateTime<Utc>) -> TaskReport<CleanupReport> {
        let store = self.store.clone();
        let cutoff = now - Duration::days(self.cfg.retention.snapshot_days);
        guarded("cleanup_snapshots", async move {
            let deleted = store.delete_snapshots_before(cutoff).await?;
            info!("Deleted {deleted} old price snapshots");
            Ok(CleanupReport { deleted })
        })
        .await
    }

    pub async fn detect_anomalies(&self, product_id: ProductId) -> TaskReport<AnomalyReport> {
        let detector = AnomalyDetector::new(self.store.clone());
        guarded("detect_anomalies", async move {
            let anomalies = detector.detect_for(product_id).await?;
            Ok(AnomalyReport { product_id, anomalies })
        })
        .await
    }

    pub async fn list_alerts(&self, acknowledged: bool, limit: usize) -> TaskReport<AlertList> {
        let store = self.store.clone();
        guarded("list_alerts", async move {
            let alerts = store.list_alerts(acknowledged, limit).await?;
            Ok(AlertList { alerts })
        })
        .await
    }

    pub async fn acknowledge_alert(&self, alert_id: i64, now: DateTime<Utc>) -> TaskReport<PriceAlert> {
        let store = self.store.clone();
        guarded("acknowledge_alert", async move { store.acknowledge_alert(alert_id, now).await }).await
    }
}

/// Runs the task body on its own tokio task so a panic surfaces as an error report.
async fn guarded<T, F>(task: &'static str, body: F) -> TaskReport<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    match tokio::spawn(body).await {
        Ok(Ok(value)) => TaskReport::Success(value),
        Ok(Err(e)) => {
            error!(task, "Task failed: {e}");
            TaskReport::Error { message: e.to_string() }
        }
        Err(join_err) => {
            error!(task, "Task aborted: {join_err}");
            TaskReport::Error {
                message: format!("{task} aborted: {join_err}"),
            }
        }
    }
}
