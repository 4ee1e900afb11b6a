//! Encoding and decoding helpers between domain types and SQLite columns.
//!
//! Timestamps are stored as unix seconds. Enumerations are stored as their
//! snake_case names. Chunk data points are stored as a compact JSON array.

use insight_core::{
  chunk::{Chunk, Scope, SeriesKey},
  deployment::{Deployment, DeploymentStatus},
  granularity::Granularity,
  metric::{DataPoint, MetricKind},
  store::{Direction, Field, Value},
};

use crate::{Error, Result};

// ─── DeploymentStatus ────────────────────────────────────────────────────────

pub fn encode_status(s: DeploymentStatus) -> &'static str {
  match s {
    DeploymentStatus::Pending => "pending",
    DeploymentStatus::Planned => "planned",
    DeploymentStatus::Running => "running",
    DeploymentStatus::RollingBack => "rolling_back",
    DeploymentStatus::Success => "success",
    DeploymentStatus::Failure => "failure",
    DeploymentStatus::Cancelled => "cancelled",
  }
}

pub fn decode_status(s: &str) -> Result<DeploymentStatus> {
  match s {
    "pending" => Ok(DeploymentStatus::Pending),
    "planned" => Ok(DeploymentStatus::Planned),
    "running" => Ok(DeploymentStatus::Running),
    "rolling_back" => Ok(DeploymentStatus::RollingBack),
    "success" => Ok(DeploymentStatus::Success),
    "failure" => Ok(DeploymentStatus::Failure),
    "cancelled" => Ok(DeploymentStatus::Cancelled),
    other => Err(Error::Decode(format!("unknown deployment status: {other:?}"))),
  }
}

// ─── Series ──────────────────────────────────────────────────────────────────

pub fn decode_kind(s: &str) -> Result<MetricKind> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown metric kind: {s:?}")))
}

pub fn decode_granularity(s: &str) -> Result<Granularity> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown granularity: {s:?}")))
}

/// Project chunks have no application; the column holds `''` instead of NULL
/// so it can take part in the primary key.
pub fn encode_application(scope: &Scope) -> String {
  scope.application_id.clone().unwrap_or_default()
}

pub fn decode_application(s: String) -> Option<String> {
  (!s.is_empty()).then_some(s)
}

// ─── Data points ─────────────────────────────────────────────────────────────

pub fn encode_data_points(points: &[DataPoint]) -> Result<String> {
  Ok(serde_json::to_string(points)?)
}

pub fn decode_data_points(s: &str) -> Result<Vec<DataPoint>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Queries ─────────────────────────────────────────────────────────────────

pub fn encode_field(f: Field) -> &'static str {
  match f {
    Field::Id => "id",
    Field::CreatedAt => "created_at",
    Field::CompletedAt => "completed_at",
  }
}

pub fn encode_direction(d: Direction) -> &'static str {
  match d {
    Direction::Asc => "ASC",
    Direction::Desc => "DESC",
  }
}

pub fn encode_value(v: &Value) -> rusqlite::types::Value {
  match v {
    Value::Int(i) => rusqlite::types::Value::Integer(*i),
    Value::Text(s) => rusqlite::types::Value::Text(s.clone()),
  }
}

// ─── Raw rows ────────────────────────────────────────────────────────────────

/// Columns read directly from a `deployments` row.
pub struct RawDeployment {
  pub id:             String,
  pub application_id: String,
  pub project_id:     String,
  pub status:         String,
  pub created_at:     i64,
  pub completed_at:   Option<i64>,
}

impl RawDeployment {
  pub fn into_deployment(self) -> Result<Deployment> {
    Ok(Deployment {
      id:             self.id,
      application_id: self.application_id,
      project_id:     self.project_id,
      status:         decode_status(&self.status)?,
      created_at:     self.created_at,
      completed_at:   self.completed_at,
    })
  }
}

/// Columns read directly from a `chunks` row.
pub struct RawChunk {
  pub project_id:     String,
  pub application_id: String,
  pub metric_kind:    String,
  pub granularity:    String,
  pub anchor:         i64,
  pub accumulated_to: i64,
  pub data_points:    String,
}

impl RawChunk {
  pub fn into_chunk(self) -> Result<Chunk> {
    let series = SeriesKey {
      scope:       Scope {
        project_id:     self.project_id,
        application_id: decode_application(self.application_id),
      },
      kind:        decode_kind(&self.metric_kind)?,
      granularity: decode_granularity(&self.granularity)?,
    };
    Ok(Chunk {
      series,
      anchor: self.anchor,
      accumulated_to: self.accumulated_to,
      data_points: decode_data_points(&self.data_points)?,
    })
  }
}
