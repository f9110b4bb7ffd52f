use std::io::Write;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use price_engine::benchmark::NoBenchmark;
use price_engine::config::{Config, ALERT_LIST_LIMIT};
use price_engine::error::Result;
use price_engine::store::SqliteStore;
use price_engine::tasks::{TaskReport, TaskRunner};

#[derive(Parser)]
#[command(name = "price-engine")]
#[command(about = "Competitive pricing engine: market analysis, ranking and repricing")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze, rank and reprice every active product
    Sweep,

    /// Snapshot the last known prices of one price source
    #[command(name = "check-source")]
    CheckSource {
        /// Price source id
        source_id: i64,
    },

    /// Snapshot every active price source in turn
    #[command(name = "check-sources")]
    CheckSources,

    /// Reprice every product from the active pricing strategy
    Recompute,

    /// Delete alerts and snapshots older than their retention period
    Cleanup,

    /// Report anomalies in a product's stored market analysis
    Anomalies {
        /// Product id
        product_id: i64,
    },

    /// List price alerts, newest first
    Alerts {
        /// Show acknowledged alerts instead of open ones
        #[arg(long)]
        acknowledged: bool,

        /// Maximum number of alerts to show
        #[arg(short, long, default_value_t = ALERT_LIST_LIMIT)]
        limit: usize,
    },

    /// Acknowledge one price alert
    Ack {
        /// Alert id
        alert_id: i64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .with_writer(std::io::stderr)
        .init();

    match run(cfg, cli.command).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("Fatal error: {e}");
            std::process::exit(1);
        }
    }
}

/// Returns whether every task invoked by the command succeeded.
async fn run(cfg: Config, command: Command) -> Result<bool> {
    let store = SqliteStore::connect(&cfg.db_path).await?;
    store.migrate().await?;
    info!("Database ready at {}", cfg.db_path);

    let runner = TaskRunner::new(Arc::new(store), Arc::new(NoBenchmark), cfg.engine);
    let now = Utc::now();

    match command {
        Command::Sweep => print_report(&runner.run_full_sweep(now).await),
        Command::CheckSource { source_id } => {
            print_report(&runner.run_source_check(source_id, now).await)
        }
        Command::CheckSources => print_report(&runner.run_source_round(now).await),
        Command::Recompute => print_report(&runner.run_bulk_recompute(now).await),
        Command::Cleanup => {
            let alerts = print_report(&runner.cleanup_old_alerts(now).await)?;
            let snapshots = print_report(&runner.cleanup_old_snapshots(now).await)?;
            Ok(alerts && snapshots)
        }
        Command::Anomalies { product_id } => {
            print_report(&runner.detect_anomalies(product_id).await)
        }
        Command::Alerts { acknowledged, limit } => {
            print_report(&runner.list_alerts(acknowledged, limit).await)
        }
        Command::Ack { alert_id } => print_report(&runner.acknowledge_alert(alert_id, now).await),
    }
}

fn print_report<T: Serialize>(report: &TaskReport<T>) -> Result<bool> {
    let json = serde_json::to_string_pretty(report)?;
    writeln!(std::io::stdout().lock(), "{json}")?;
    Ok(report.is_success())
}
