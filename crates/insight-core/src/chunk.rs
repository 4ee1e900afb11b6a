//! Chunks: persisted, granularity-scoped containers of metric data points.
//!
//! A chunk belongs to a series `(scope, metric kind, granularity)` and covers
//! one chunk period of that series, identified by its anchor (see
//! [`Granularity::chunk_anchor`]). It carries its own completeness watermark,
//! `accumulated_to`, which only ever moves forward.

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  granularity::Granularity,
  metric::{DataPoint, MetricKind, merge_data_point},
};

/// The entity a chunk aggregates: a whole project, or one application in it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
  pub project_id:     String,
  pub application_id: Option<String>,
}

impl Scope {
  pub fn project(project_id: impl Into<String>) -> Self {
    Self { project_id: project_id.into(), application_id: None }
  }

  pub fn application(
    project_id: impl Into<String>,
    application_id: impl Into<String>,
  ) -> Self {
    Self {
      project_id:     project_id.into(),
      application_id: Some(application_id.into()),
    }
  }
}

impl std::fmt::Display for Scope {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match &self.application_id {
      Some(app) => write!(f, "{}/{app}", self.project_id),
      None => write!(f, "{}", self.project_id),
    }
  }
}

/// Identifies the sequence of chunks for one metric at one granularity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesKey {
  pub scope:       Scope,
  pub kind:        MetricKind,
  pub granularity: Granularity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
  pub series:         SeriesKey,
  /// Unix timestamp of the start of this chunk's period.
  pub anchor:         i64,
  /// Contents are complete for everything before this unix timestamp.
  pub accumulated_to: i64,
  /// Sorted by timestamp, one point per bucket.
  pub data_points:    Vec<DataPoint>,
}

impl Chunk {
  /// An empty chunk that has accumulated nothing yet.
  pub fn new(series: SeriesKey, anchor: i64) -> Self {
    Self { series, anchor, accumulated_to: 0, data_points: Vec::new() }
  }

  /// Fold a finer-grained point into the bucket it falls in.
  pub fn merge(&mut self, point: DataPoint) -> Result<()> {
    if point.kind() != self.series.kind {
      return Err(Error::DataPointKindMismatch {
        expected: self.series.kind,
        found:    point.kind(),
      });
    }
    let key = self.series.granularity.normalize_ts(point.timestamp())?;
    merge_data_point(&mut self.data_points, point, key)
  }

  /// Move the watermark forward to `to`; never moves it back.
  pub fn advance_to(&mut self, to: i64) {
    self.accumulated_to = self.accumulated_to.max(to);
  }
}
