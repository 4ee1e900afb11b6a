//! The `DeploymentStore` and `InsightStore` traits and supporting query types.
//!
//! Both traits are implemented by storage backends (e.g.
//! `insight-store-sqlite`). The collector depends on these abstractions, not on
//! any concrete backend.

use std::future::Future;

use crate::{
  chunk::{Chunk, SeriesKey},
  deployment::{Deployment, TimestampField},
  milestone::Milestone,
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// A deployment column that can be filtered or ordered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
  Id,
  CreatedAt,
  CompletedAt,
}

impl From<TimestampField> for Field {
  fn from(f: TimestampField) -> Self {
    match f {
      TimestampField::CreatedAt => Self::CreatedAt,
      TimestampField::CompletedAt => Self::CompletedAt,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
  Eq,
  Lt,
  Le,
  Gt,
  Ge,
}

impl Operator {
  pub fn as_sql(self) -> &'static str {
    match self {
      Self::Eq => "=",
      Self::Lt => "<",
      Self::Le => "<=",
      Self::Gt => ">",
      Self::Ge => ">=",
    }
  }
}

/// A filter or cursor value. Variants compare in declaration order, then by
/// content.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Value {
  Int(i64),
  Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFilter {
  pub field:    Field,
  pub operator: Operator,
  pub value:    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  Asc,
  Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
  pub field:     Field,
  pub direction: Direction,
}

/// Position after which the next page starts: the values of the order
/// fields, in order, of the last row already seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
  pub values: Vec<Value>,
}

/// Parameters for [`DeploymentStore::list_deployments`].
///
/// Filters are a conjunction; a NULL field never satisfies a filter. When a
/// cursor is given, every order must share one direction and the store
/// returns only rows that sort strictly after the cursor.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
  pub filters:   Vec<ListFilter>,
  pub orders:    Vec<Order>,
  pub page_size: usize,
  pub cursor:    Option<Cursor>,
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Read access to the deployment record store.
pub trait DeploymentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Return one page of at most `options.page_size` deployments.
  fn list_deployments<'a>(
    &'a self,
    options: &'a ListOptions,
  ) -> impl Future<Output = Result<Vec<Deployment>, Self::Error>> + Send + 'a;
}

/// Durable storage for milestones and chunks.
///
/// Absence is reported as `None` or an empty list, never as an error.
pub trait InsightStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Load the milestone singleton. Returns `None` before the first store.
  fn load_milestone(
    &self,
  ) -> impl Future<Output = Result<Option<Milestone>, Self::Error>> + Send + '_;

  fn store_milestone(
    &self,
    milestone: Milestone,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Up to `limit` chunks of `series` anchored at or before `anchor`, newest
  /// first.
  fn load_chunks<'a>(
    &'a self,
    series: &'a SeriesKey,
    anchor: i64,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Chunk>, Self::Error>> + Send + 'a;

  /// Insert or replace the chunk at `(chunk.series, chunk.anchor)`.
  fn store_chunk<'a>(
    &'a self,
    chunk: &'a Chunk,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
