//! Metric kinds, data points, and the data point merge primitive.

use serde::{Deserialize, Serialize};

use crate::{Error, Result, deployment::TimestampField};

// ─── Kinds ───────────────────────────────────────────────────────────────────

/// A delivery-performance metric computed by the collector.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  strum::Display,
  strum::AsRefStr,
  strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MetricKind {
  DeploymentFrequency,
  ChangeFailureRate,
}

impl MetricKind {
  /// The deployment timestamp this metric is bucketed by.
  pub fn timestamp_field(self) -> TimestampField {
    match self {
      Self::DeploymentFrequency => TimestampField::CreatedAt,
      Self::ChangeFailureRate => TimestampField::CompletedAt,
    }
  }

  /// Parse a metric kind name, e.g. `"change_failure_rate"`.
  pub fn parse(name: &str) -> Result<Self> {
    name
      .parse()
      .map_err(|_| Error::UnknownMetricKind(name.to_owned()))
  }
}

// ─── Data points ─────────────────────────────────────────────────────────────

/// Number of deployments created in a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeployFrequency {
  pub timestamp: i64,
  pub count:     u64,
}

/// Share of completed deployments in a bucket that failed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChangeFailureRate {
  pub timestamp:     i64,
  /// `failure_count / (success_count + failure_count)`, or 0 when both are 0.
  pub rate:          f64,
  pub success_count: u64,
  pub failure_count: u64,
}

impl ChangeFailureRate {
  pub fn new(timestamp: i64, success_count: u64, failure_count: u64) -> Self {
    let total = success_count + failure_count;
    let rate = if total == 0 {
      0.0
    } else {
      failure_count as f64 / total as f64
    };
    Self { timestamp, rate, success_count, failure_count }
  }
}

/// One bucket of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataPoint {
  DeployFrequency(DeployFrequency),
  ChangeFailureRate(ChangeFailureRate),
}

impl DataPoint {
  pub fn kind(&self) -> MetricKind {
    match self {
      Self::DeployFrequency(_) => MetricKind::DeploymentFrequency,
      Self::ChangeFailureRate(_) => MetricKind::ChangeFailureRate,
    }
  }

  pub fn timestamp(&self) -> i64 {
    match self {
      Self::DeployFrequency(p) => p.timestamp,
      Self::ChangeFailureRate(p) => p.timestamp,
    }
  }

  fn set_timestamp(&mut self, timestamp: i64) {
    match self {
      Self::DeployFrequency(p) => p.timestamp = timestamp,
      Self::ChangeFailureRate(p) => p.timestamp = timestamp,
    }
  }

  /// Fold `other` into `self`, keeping `self`'s timestamp.
  fn absorb(&mut self, other: &DataPoint) -> Result<()> {
    match (self, other) {
      (Self::DeployFrequency(a), Self::DeployFrequency(b)) => {
        a.count += b.count;
      }
      (Self::ChangeFailureRate(a), Self::ChangeFailureRate(b)) => {
        *a = ChangeFailureRate::new(
          a.timestamp,
          a.success_count + b.success_count,
          a.failure_count + b.failure_count,
        );
      }
      (a, b) => {
        return Err(Error::DataPointKindMismatch {
          expected: a.kind(),
          found:    b.kind(),
        });
      }
    }
    Ok(())
  }
}

impl From<DeployFrequency> for DataPoint {
  fn from(p: DeployFrequency) -> Self { Self::DeployFrequency(p) }
}

impl From<ChangeFailureRate> for DataPoint {
  fn from(p: ChangeFailureRate) -> Self { Self::ChangeFailureRate(p) }
}

// ─── Merge ───────────────────────────────────────────────────────────────────

/// Upsert `point` into `points` under the bucket timestamp `key`.
///
/// `points` is kept sorted by timestamp with at most one point per key. An
/// existing point at `key` absorbs `point`; otherwise `point` is inserted with
/// its timestamp rewritten to `key`.
pub fn merge_data_point(
  points: &mut Vec<DataPoint>,
  mut point: DataPoint,
  key: i64,
) -> Result<()> {
  match points.binary_search_by_key(&key, DataPoint::timestamp) {
    Ok(idx) => points[idx].absorb(&point),
    Err(idx) => {
      if let Some(neighbour) = points.first()
        && neighbour.kind() != point.kind()
      {
        return Err(Error::DataPointKindMismatch {
          expected: neighbour.kind(),
          found:    point.kind(),
        });
      }
      point.set_timestamp(key);
      points.insert(idx, point);
      Ok(())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn freq(timestamp: i64, count: u64) -> DataPoint {
    DeployFrequency { timestamp, count }.into()
  }

  fn cfr(timestamp: i64, success: u64, failure: u64) -> DataPoint {
    ChangeFailureRate::new(timestamp, success, failure).into()
  }

  #[test]
  fn deploy_frequency_counts_are_summed() {
    let mut points = vec![];
    merge_data_point(&mut points, freq(10, 2), 0).unwrap();
    merge_data_point(&mut points, freq(20, 3), 0).unwrap();

    assert_eq!(points, vec![freq(0, 5)]);
  }

  #[test]
  fn change_failure_rate_is_recomputed_from_counts() {
    let mut points = vec![];
    merge_data_point(&mut points, cfr(1, 3, 1), 0).unwrap();
    merge_data_point(&mut points, cfr(2, 4, 2), 0).unwrap();

    let DataPoint::ChangeFailureRate(p) = points[0] else {
      panic!("expected a change failure rate point");
    };
    assert_eq!(p.success_count, 7);
    assert_eq!(p.failure_count, 3);
    assert!((p.rate - 0.3).abs() < 1e-9);
  }

  #[test]
  fn distinct_keys_stay_sorted_and_unique() {
    let mut points = vec![];
    for (ts, key) in [(50, 40), (15, 10), (45, 40), (35, 30), (12, 10)] {
      merge_data_point(&mut points, freq(ts, 1), key).unwrap();
    }

    let keys: Vec<i64> = points.iter().map(DataPoint::timestamp).collect();
    assert_eq!(keys, vec![10, 30, 40]);
    assert_eq!(points[0], freq(10, 2));
    assert_eq!(points[2], freq(40, 2));
  }

  #[test]
  fn mixing_kinds_is_rejected() {
    let mut points = vec![freq(0, 1)];
    assert!(matches!(
      merge_data_point(&mut points, cfr(0, 1, 0), 0),
      Err(Error::DataPointKindMismatch { .. })
    ));
    assert!(matches!(
      merge_data_point(&mut points, cfr(5, 1, 0), 5),
      Err(Error::DataPointKindMismatch { .. })
    ));
    assert_eq!(points.len(), 1);
  }

  #[test]
  fn empty_rate_is_zero() {
    let p = ChangeFailureRate::new(0, 0, 0);
    assert_eq!(p.rate, 0.0);
  }

  #[test]
  fn unknown_kind_name_is_rejected() {
    assert_eq!(
      MetricKind::parse("change_failure_rate").unwrap(),
      MetricKind::ChangeFailureRate
    );
    assert!(matches!(
      MetricKind::parse("lead_time"),
      Err(Error::UnknownMetricKind(name)) if name == "lead_time"
    ));
  }
}
