//! insight-collector binary.
//!
//! Reads `insight.toml` (or the path given with `--config`), opens the SQLite
//! store, and runs one collection pass for newly created and newly completed
//! deployments. Schedule it once a day, e.g. from cron.
//!
//! Every setting can be overridden from the environment with the `INSIGHT_`
//! prefix, nested keys separated by `__`, e.g.
//! `INSIGHT_STORE_PATH=/var/lib/insight.db` or
//! `INSIGHT_COLLECTOR__PAGE_SIZE=200`.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use insight_core::{
  collector::{InsightCollector, RunReport},
  config::CollectorConfig,
};
use insight_store_sqlite::SqliteStore;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Deployment insight collector")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "insight.toml")]
  config: PathBuf,

  /// Run only one of the two deployment families.
  #[arg(long, value_enum)]
  only: Option<Family>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Family {
  Created,
  Completed,
}

#[derive(Debug, Deserialize)]
struct Settings {
  store_path: PathBuf,
  #[serde(default)]
  collector:  CollectorConfig,
}

type Collector = InsightCollector<SqliteStore, SqliteStore>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings: Settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(
      config::Environment::with_prefix("INSIGHT")
        .prefix_separator("_")
        .separator("__"),
    )
    .build()
    .context("failed to read config file")?
    .try_deserialize()
    .context("failed to deserialise settings")?;

  let store = SqliteStore::open(&settings.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", settings.store_path))?;
  let store = Arc::new(store);

  let collector = InsightCollector::new(store.clone(), store, settings.collector)
    .context("invalid collector config")?;

  let cancel = CancellationToken::new();
  tokio::spawn({
    let cancel = cancel.clone();
    async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("interrupted; cancelling collection");
        cancel.cancel();
      }
    }
  });

  let (created, completed) = tokio::join!(
    run(&collector, Family::Created, cli.only, &cancel),
    run(&collector, Family::Completed, cli.only, &cancel),
  );
  created?;
  completed?;
  Ok(())
}

async fn run(
  collector: &Collector,
  family: Family,
  only: Option<Family>,
  cancel: &CancellationToken,
) -> anyhow::Result<()> {
  if only.is_some_and(|o| o != family) {
    return Ok(());
  }
  let report = match family {
    Family::Created => collector
      .process_newly_created_deployments(cancel)
      .await
      .context("processing newly created deployments")?,
    Family::Completed => collector
      .process_newly_completed_deployments(cancel)
      .await
      .context("processing newly completed deployments")?,
  };
  log_report(&report);
  Ok(())
}

fn log_report(report: &RunReport) {
  tracing::info!(
    field = %report.field,
    from = report.from,
    target = report.target,
    deployments = report.deployments,
    entities = report.entities,
    "collection finished"
  );
}
