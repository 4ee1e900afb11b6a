//! [`InsightCollector`]: the two periodic entry points.
//!
//! A run reads the milestone for its timestamp field, fetches every deployment
//! between the milestone and today, rolls the deployments up per application
//! and per project, and advances the milestone only when every entity
//! succeeded. A failed or cancelled run is retried in full by the next one;
//! chunk watermarks keep the retry from counting anything twice.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::Instrument as _;
use uuid::Uuid;

use crate::{
  Error, Result,
  chunk::Scope,
  config::CollectorConfig,
  deployment::{Deployment, TimestampField},
  fetch::DeploymentRangeFetcher,
  granularity::start_of_day,
  group::group,
  milestone::MilestoneTracker,
  repository::ChunkRepository,
  rollup::RollupEngine,
  store::{DeploymentStore, InsightStore},
};

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
  pub field:       TimestampField,
  /// Start of the processed window (the previous milestone).
  pub from:        i64,
  /// End of the processed window, now the milestone.
  pub target:      i64,
  pub deployments: usize,
  /// Number of `(entity, metric kind)` rollups performed.
  pub entities:    usize,
}

pub struct InsightCollector<D, S> {
  deployments: Arc<D>,
  chunks:      ChunkRepository<S>,
  milestones:  MilestoneTracker<S>,
  config:      CollectorConfig,
}

impl<D, S> InsightCollector<D, S>
where
  D: DeploymentStore,
  S: InsightStore,
{
  /// Fails if `config` does not validate.
  pub fn new(deployments: Arc<D>, insights: Arc<S>, config: CollectorConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self {
      deployments,
      chunks: ChunkRepository::new(insights.clone()),
      milestones: MilestoneTracker::new(insights),
      config,
    })
  }

  pub fn config(&self) -> &CollectorConfig { &self.config }

  /// Aggregate deployments created since the last successful run.
  pub async fn process_newly_created_deployments(
    &self,
    cancel: &CancellationToken,
  ) -> Result<RunReport> {
    self
      .process(TimestampField::CreatedAt, start_of_day(Utc::now()), cancel)
      .await
  }

  /// Aggregate deployments completed since the last successful run.
  pub async fn process_newly_completed_deployments(
    &self,
    cancel: &CancellationToken,
  ) -> Result<RunReport> {
    self
      .process(TimestampField::CompletedAt, start_of_day(Utc::now()), cancel)
      .await
  }

  /// Process every deployment with `field` in `[milestone, target)`.
  ///
  /// `target` must be a UTC day boundary; any other target is rejected before
  /// anything is read or written.
  pub async fn process(
    &self,
    field: TimestampField,
    target: DateTime<Utc>,
    cancel: &CancellationToken,
  ) -> Result<RunReport> {
    let span = tracing::info_span!("collect", run_id = %Uuid::new_v4(), %field);
    self.run(field, target, cancel).instrument(span).await
  }

  async fn run(
    &self,
    field: TimestampField,
    target: DateTime<Utc>,
    cancel: &CancellationToken,
  ) -> Result<RunReport> {
    // Rollups only cover whole days, so a mid-day target would move the
    // watermarks past records it never counted.
    if start_of_day(target) != target {
      return Err(Error::Validation(format!(
        "target {target} is not a day boundary"
      )));
    }

    let kinds = self.config.kinds_for(field);
    let milestone = self.milestones.load().await?;
    let from = milestone.get(field);
    let target_ts = target.timestamp();

    let mut report = RunReport {
      field,
      from,
      target: target_ts,
      deployments: 0,
      entities: 0,
    };
    if from >= target_ts {
      tracing::info!(from, target = target_ts, "milestone already at target");
      return Ok(report);
    }

    tracing::info!(from, target = target_ts, "processing deployments");
    let fetcher = DeploymentRangeFetcher::new(&*self.deployments, self.config.page_size);
    let deployments = fetcher.fetch(field, from, target_ts, cancel).await?;
    report.deployments = deployments.len();

    let grouped = group(&deployments);
    let mut work: Vec<(Scope, &[&Deployment])> = Vec::new();
    for (app_id, ds) in &grouped.by_application {
      work.push((Scope::application(ds[0].project_id.as_str(), *app_id), ds.as_slice()));
    }
    for (project_id, ds) in &grouped.by_project {
      work.push((Scope::project(*project_id), ds.as_slice()));
    }

    let engine = RollupEngine::new(&self.chunks, &self.config.granularities);
    let mut failed = 0usize;
    let mut last_error = None;
    for (scope, ds) in &work {
      for &kind in kinds {
        if cancel.is_cancelled() {
          return Err(Error::Cancelled);
        }
        report.entities += 1;
        if let Err(e) = engine.rollup(scope, kind, target, ds).await {
          tracing::error!(%scope, %kind, error = %e, "failed to update chunks");
          failed += 1;
          last_error = Some(e);
        }
      }
    }

    if let Some(last) = last_error {
      tracing::warn!(failed, total = report.entities, "milestone not advanced");
      return Err(Error::EntitiesFailed {
        failed,
        total: report.entities,
        last: Box::new(last),
      });
    }

    self.milestones.advance(field, target_ts).await?;
    tracing::info!(
      deployments = report.deployments,
      entities = report.entities,
      "milestone advanced"
    );
    Ok(report)
  }
}
