//! Collector configuration.

use serde::Deserialize;

use crate::{
  Error, Result, deployment::TimestampField, granularity::Granularity,
  metric::MetricKind,
};

/// Tunables for [`InsightCollector`](crate::collector::InsightCollector).
///
/// Every field has a default, so an empty config section is valid.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
  /// Maximum number of deployments requested per page.
  pub page_size:          usize,
  /// Metrics aggregated over newly created deployments.
  pub created_at_kinds:   Vec<MetricKind>,
  /// Metrics aggregated over newly completed deployments.
  pub completed_at_kinds: Vec<MetricKind>,
  /// Chunk granularities rolled up for every metric.
  pub granularities:      Vec<Granularity>,
}

impl Default for CollectorConfig {
  fn default() -> Self {
    Self {
      page_size:          50,
      created_at_kinds:   vec![MetricKind::DeploymentFrequency],
      completed_at_kinds: vec![MetricKind::ChangeFailureRate],
      granularities:      vec![Granularity::Monthly, Granularity::Yearly],
    }
  }
}

impl CollectorConfig {
  pub fn kinds_for(&self, field: TimestampField) -> &[MetricKind] {
    match field {
      TimestampField::CreatedAt => &self.created_at_kinds,
      TimestampField::CompletedAt => &self.completed_at_kinds,
    }
  }

  pub fn validate(&self) -> Result<()> {
    if self.page_size == 0 {
      return Err(Error::Validation("page_size must be positive".into()));
    }
    if self.granularities.is_empty() {
      return Err(Error::Validation("no granularities configured".into()));
    }
    for field in [TimestampField::CreatedAt, TimestampField::CompletedAt] {
      for &kind in self.kinds_for(field) {
        if kind.timestamp_field() != field {
          return Err(Error::KindFieldMismatch {
            kind,
            expected: kind.timestamp_field(),
            requested: field,
          });
        }
      }
    }
    Ok(())
  }
}
