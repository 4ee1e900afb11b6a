//! Deployment records as supplied by the record store.
//!
//! Deployments are created and mutated entirely outside this crate; the engine
//! only reads them.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
  Pending,
  Planned,
  Running,
  RollingBack,
  Success,
  Failure,
  Cancelled,
}

impl DeploymentStatus {
  /// Whether the deployment has reached a terminal state.
  pub fn is_completed(self) -> bool {
    matches!(self, Self::Success | Self::Failure | Self::Cancelled)
  }
}

/// An immutable deployment record. Timestamps are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
  pub id:             String,
  pub application_id: String,
  pub project_id:     String,
  pub status:         DeploymentStatus,
  pub created_at:     i64,
  /// Set once the deployment reaches a terminal status.
  pub completed_at:   Option<i64>,
}

impl Deployment {
  /// The value of `field` on this record, if set.
  pub fn timestamp(&self, field: TimestampField) -> Option<i64> {
    match field {
      TimestampField::CreatedAt => Some(self.created_at),
      TimestampField::CompletedAt => self.completed_at,
    }
  }
}

/// The deployment timestamp a metric family is aggregated by.
///
/// Each field has its own milestone and its own set of metric kinds.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TimestampField {
  CreatedAt,
  CompletedAt,
}
