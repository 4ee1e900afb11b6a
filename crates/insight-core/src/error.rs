//! Error types for `insight-core`.

use thiserror::Error;

use crate::{deployment::TimestampField, metric::MetricKind};

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown metric kind: {0:?}")]
  UnknownMetricKind(String),

  #[error("metric kind {kind} is aggregated by {expected}, not {requested}")]
  KindFieldMismatch {
    kind:      MetricKind,
    expected:  TimestampField,
    requested: TimestampField,
  },

  #[error("invalid configuration: {0}")]
  Validation(String),

  #[error("cannot merge a {found} data point into a {expected} series")]
  DataPointKindMismatch {
    expected: MetricKind,
    found:    MetricKind,
  },

  #[error("timestamp out of range: {0}")]
  InvalidTimestamp(i64),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("run cancelled")]
  Cancelled,

  #[error("{failed} of {total} entity updates failed; last error: {last}")]
  EntitiesFailed {
    failed: usize,
    total:  usize,
    last:   Box<Error>,
  },
}

impl Error {
  /// Wrap an error raised by a store collaborator.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
