//! The milestone: the durable pair of watermarks gating which deployments a
//! run treats as newly seen.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{Error, Result, deployment::TimestampField, store::InsightStore};

/// Last fully processed point in time per deployment timestamp field.
///
/// Both values are unix timestamps. A missing milestone is the default: both
/// at the epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
  pub deployment_created_at_milestone:   i64,
  pub deployment_completed_at_milestone: i64,
}

impl Milestone {
  pub fn get(&self, field: TimestampField) -> i64 {
    match field {
      TimestampField::CreatedAt => self.deployment_created_at_milestone,
      TimestampField::CompletedAt => self.deployment_completed_at_milestone,
    }
  }

  fn slot(&mut self, field: TimestampField) -> &mut i64 {
    match field {
      TimestampField::CreatedAt => &mut self.deployment_created_at_milestone,
      TimestampField::CompletedAt => &mut self.deployment_completed_at_milestone,
    }
  }
}

/// Loads and stores the milestone singleton.
///
/// Cloning is cheap; clones share the lock that serialises [`Self::advance`].
pub struct MilestoneTracker<S> {
  store: Arc<S>,
  lock:  Arc<Mutex<()>>,
}

impl<S> Clone for MilestoneTracker<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), lock: self.lock.clone() }
  }
}

impl<S: InsightStore> MilestoneTracker<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self { store, lock: Arc::new(Mutex::new(())) }
  }

  /// The stored milestone, or the zero milestone on a first run.
  pub async fn load(&self) -> Result<Milestone> {
    let stored = self.store.load_milestone().await.map_err(Error::store)?;
    Ok(stored.unwrap_or_default())
  }

  pub async fn store(&self, milestone: Milestone) -> Result<()> {
    self
      .store
      .store_milestone(milestone)
      .await
      .map_err(Error::store)
  }

  /// Move the watermark of `field` forward to `to`, leaving the other field as
  /// currently stored. Returns the milestone as written.
  pub async fn advance(&self, field: TimestampField, to: i64) -> Result<Milestone> {
    let _guard = self.lock.lock().await;

    let mut milestone = self.load().await?;
    let slot = milestone.slot(field);
    if *slot >= to {
      return Ok(milestone);
    }
    *slot = to;
    self.store(milestone).await?;
    Ok(milestone)
  }
}
