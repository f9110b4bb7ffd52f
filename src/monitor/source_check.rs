use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::error::{AppError, Result};
use crate::monitor::PriceMonitor;
use crate::types::{PriceSnapshot, PriceSource, SourceId, SourceStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceCheck {
    pub source_id: SourceId,
    pub name: String,
    pub snapshots_written: u32,
}

impl PriceMonitor {
    /// Snapshots the last known price of every active mapping for one source.
    ///
    /// The source moves `running` then `success`, or `error` with the failure text.
    /// An unknown or inactive source is `SourceNotFound` and its status is untouched.
    pub async fn monitor_price_source(&self, source_id: SourceId, now: DateTime<Utc>) -> Result<SourceCheck> {
        let source = match self.store.source(source_id).await? {
            Some(s) if s.is_active => s,
            _ => return Err(AppError::SourceNotFound(source_id)),
        };
        info!(source_id, "Starting monitoring for source: {}", source.name);

        self.store
            .update_source_status(source_id, SourceStatus::Running, None, now)
            .await?;

        match self.snapshot_mappings(&source, now).await {
            Ok(snapshots_written) => {
                self.store
                    .update_source_status(source_id, SourceStatus::Success, None, now)
                    .await?;
                info!(source_id, "Updated {snapshots_written} price snapshots for {}", source.name);
                Ok(SourceCheck {
                    source_id,
                    name: source.name,
                    snapshots_written,
                })
            }
            Err(e) => {
                let message = e.to_string();
                error!(source_id, "Error monitoring source {}: {message}", source.name);
                if let Err(status_err) = self
                    .store
                    .update_source_status(source_id, SourceStatus::Error, Some(&message), now)
                    .await
                {
                    error!(source_id, "Could not record source error: {status_err}");
                }
                Err(e)
            }
        }
    }

    async fn snapshot_mappings(&self, source: &PriceSource, now: DateTime<Utc>) -> Result<u32> {
        let mappings = self.store.source_mappings(source.id).await?;
        info!(source_id = source.id, "Found {} product mappings for {}", mappings.len(), source.name);

        let mut written = 0;
        for mapping in &mappings {
            let Some(price) = mapping.last_price.filter(|p| *p > 0.0) else {
                continue;
            };
            let snapshot = PriceSnapshot {
                product_id: mapping.product_id,
                source_id: source.id,
                price,
                in_stock: true,
                snapshot_at: now,
            };
            match self.store.append_snapshot(&snapshot).await {
                Ok(()) => written += 1,
                Err(e) => error!(mapping_id = mapping.id, "Error updating snapshot: {e}"),
            }
        }
        Ok(written)
    }
}
