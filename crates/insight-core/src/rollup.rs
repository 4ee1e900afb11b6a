//! The rollup engine: folds daily data points into coarser chunks and
//! advances each chunk's watermark.
//!
//! Every configured granularity is rolled up on its own. It loads its own
//! chunk, derives daily points from its own watermark, and persists its own
//! result. Nothing computed for one granularity feeds another.

use std::collections::{BTreeMap, btree_map::Entry};

use chrono::{DateTime, Utc};

use crate::{
  Result,
  chunk::{Chunk, Scope, SeriesKey},
  deployment::Deployment,
  extract::daily_data_points,
  granularity::{Granularity, start_of_day, to_datetime},
  metric::MetricKind,
  repository::ChunkRepository,
  store::InsightStore,
};

pub struct RollupEngine<'r, S> {
  chunks:        &'r ChunkRepository<S>,
  granularities: &'r [Granularity],
}

impl<'r, S: InsightStore> RollupEngine<'r, S> {
  pub fn new(chunks: &'r ChunkRepository<S>, granularities: &'r [Granularity]) -> Self {
    Self { chunks, granularities }
  }

  /// Bring every granularity of `(scope, kind)` up to `target`.
  ///
  /// `target` must be a day boundary. Stops at the first failing granularity;
  /// granularities already persisted stay persisted.
  pub async fn rollup(
    &self,
    scope: &Scope,
    kind: MetricKind,
    target: DateTime<Utc>,
    deployments: &[&Deployment],
  ) -> Result<()> {
    for &granularity in self.granularities {
      let series = SeriesKey { scope: scope.clone(), kind, granularity };
      self.rollup_series(&series, target, deployments).await?;
    }
    Ok(())
  }

  async fn rollup_series(
    &self,
    series: &SeriesKey,
    target: DateTime<Utc>,
    deployments: &[&Deployment],
  ) -> Result<()> {
    let _guard = self.chunks.lock(series).await;

    let mut current = self.chunks.load_or_create(series, target).await?;
    let target_ts = target.timestamp();
    if current.accumulated_to >= target_ts {
      tracing::debug!(
        scope = %series.scope,
        kind = %series.kind,
        granularity = %series.granularity,
        "chunk already accumulated to target"
      );
      return Ok(());
    }

    let mut start = if current.accumulated_to > 0 {
      start_of_day(to_datetime(current.accumulated_to)?)
    } else {
      earliest_day(series.kind, deployments)?.unwrap_or(target)
    };

    // Points from before the current chunk's period belong to earlier chunks.
    let mut earlier: BTreeMap<i64, Chunk> = BTreeMap::new();

    // A previous chunk left short of its period end is closed by this run,
    // even when no deployment falls in its remaining days.
    if let Some(previous) = self.chunks.load_previous(series, current.anchor).await?
      && previous.accumulated_to > 0
      && previous.accumulated_to < period_end(series.granularity, previous.anchor, target_ts)?
    {
      start = start.min(start_of_day(to_datetime(previous.accumulated_to)?));
      earlier.insert(previous.anchor, previous);
    }

    let points = daily_data_points(series.kind, deployments, start, target)?;
    for point in points {
      let anchor = series.granularity.chunk_anchor_ts(point.timestamp())?;
      if anchor == current.anchor {
        current.merge(point)?;
        continue;
      }

      let chunk = match earlier.entry(anchor) {
        Entry::Occupied(e) => e.into_mut(),
        Entry::Vacant(e) => {
          e.insert(self.chunks.load_or_create_at(series, anchor).await?)
        }
      };
      if point.timestamp() >= chunk.accumulated_to {
        chunk.merge(point)?;
      }
    }

    for (anchor, mut chunk) in earlier {
      chunk.advance_to(period_end(series.granularity, anchor, target_ts)?);
      self.chunks.put(&chunk).await?;
    }

    current.advance_to(target_ts);
    self.chunks.put(&current).await?;

    tracing::debug!(
      scope = %series.scope,
      kind = %series.kind,
      granularity = %series.granularity,
      accumulated_to = target_ts,
      points = current.data_points.len(),
      "chunk updated"
    );
    Ok(())
  }
}

/// End of the chunk period starting at `anchor`, capped at `target`.
fn period_end(granularity: Granularity, anchor: i64, target: i64) -> Result<i64> {
  Ok(
    granularity
      .next_chunk_anchor(to_datetime(anchor)?)
      .map_or(target, |end| end.timestamp().min(target)),
  )
}

/// Start of the first day on which one of `deployments` counts for `kind`.
fn earliest_day(
  kind: MetricKind,
  deployments: &[&Deployment],
) -> Result<Option<DateTime<Utc>>> {
  let field = kind.timestamp_field();
  deployments
    .iter()
    .filter_map(|d| d.timestamp(field))
    .min()
    .map(|ts| to_datetime(ts).map(start_of_day))
    .transpose()
}
