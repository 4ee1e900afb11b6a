//! Metric extractors: deployments and a window in, one data point out.
//!
//! Each extractor partitions its input into the deployments that fall inside
//! `[from, to)` and the rest. The rest is handed back so a caller stepping the
//! window forward day by day only rescans what has not been consumed yet.

use chrono::{DateTime, Utc};

use crate::{
  Result,
  deployment::{Deployment, DeploymentStatus, TimestampField},
  granularity::next_day,
  metric::{ChangeFailureRate, DataPoint, DeployFrequency, MetricKind},
};

fn partition_by<'a>(
  deployments: Vec<&'a Deployment>,
  field: TimestampField,
  from: i64,
  to: i64,
) -> (Vec<&'a Deployment>, Vec<&'a Deployment>) {
  deployments.into_iter().partition(|d| {
    d.timestamp(field)
      .is_some_and(|ts| ts >= from && ts < to)
  })
}

/// Count the deployments created within `[from, to)`.
pub fn extract_deploy_frequency<'a>(
  deployments: Vec<&'a Deployment>,
  from: i64,
  to: i64,
  bucket_timestamp: i64,
) -> (DeployFrequency, Vec<&'a Deployment>) {
  let (matched, rest) =
    partition_by(deployments, TimestampField::CreatedAt, from, to);
  let point = DeployFrequency {
    timestamp: bucket_timestamp,
    count:     matched.len() as u64,
  };
  (point, rest)
}

/// Compute the change failure rate of deployments completed within
/// `[from, to)`. Statuses other than success and failure are not counted.
pub fn extract_change_failure_rate<'a>(
  deployments: Vec<&'a Deployment>,
  from: i64,
  to: i64,
  bucket_timestamp: i64,
) -> (ChangeFailureRate, Vec<&'a Deployment>) {
  let (matched, rest) =
    partition_by(deployments, TimestampField::CompletedAt, from, to);

  let mut success_count = 0;
  let mut failure_count = 0;
  for d in &matched {
    match d.status {
      DeploymentStatus::Success => success_count += 1,
      DeploymentStatus::Failure => failure_count += 1,
      _ => {}
    }
  }

  let point =
    ChangeFailureRate::new(bucket_timestamp, success_count, failure_count);
  (point, rest)
}

/// One `kind` data point per day in `[start, end)`, each stamped with the
/// start of its day.
///
/// `start` and `end` are expected on day boundaries.
pub fn daily_data_points(
  kind: MetricKind,
  deployments: &[&Deployment],
  start: DateTime<Utc>,
  end: DateTime<Utc>,
) -> Result<Vec<DataPoint>> {
  let mut remaining = deployments.to_vec();
  let mut points = Vec::new();

  let mut from = start;
  let mut to = next_day(from)?;
  while to <= end {
    let (from_ts, to_ts) = (from.timestamp(), to.timestamp());
    let point: DataPoint = match kind {
      MetricKind::DeploymentFrequency => {
        let (p, rest) =
          extract_deploy_frequency(remaining, from_ts, to_ts, from_ts);
        remaining = rest;
        p.into()
      }
      MetricKind::ChangeFailureRate => {
        let (p, rest) =
          extract_change_failure_rate(remaining, from_ts, to_ts, from_ts);
        remaining = rest;
        p.into()
      }
    };
    points.push(point);

    from = to;
    to = next_day(to)?;
  }

  Ok(points)
}
