//! [`ChunkRepository`]: load-or-create and persist chunks over an
//! [`InsightStore`].

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::{
  Error, Result,
  chunk::{Chunk, SeriesKey},
  store::InsightStore,
};

pub struct ChunkRepository<S> {
  store: Arc<S>,
  locks: Mutex<HashMap<SeriesKey, Arc<AsyncMutex<()>>>>,
}

impl<S: InsightStore> ChunkRepository<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self { store, locks: Mutex::new(HashMap::new()) }
  }

  /// The chunk of `series` covering `at`, or a fresh empty one.
  pub async fn load_or_create(
    &self,
    series: &SeriesKey,
    at: DateTime<Utc>,
  ) -> Result<Chunk> {
    let anchor = series.granularity.chunk_anchor(at).timestamp();
    self.load_or_create_at(series, anchor).await
  }

  /// The chunk of `series` anchored exactly at `anchor`, or a fresh empty one.
  pub async fn load_or_create_at(
    &self,
    series: &SeriesKey,
    anchor: i64,
  ) -> Result<Chunk> {
    let latest = self
      .store
      .load_chunks(series, anchor, 1)
      .await
      .map_err(Error::store)?
      .into_iter()
      .next();

    match latest {
      Some(chunk) if chunk.anchor == anchor => Ok(chunk),
      _ => Ok(Chunk::new(series.clone(), anchor)),
    }
  }

  /// The newest chunk of `series` anchored strictly before `anchor`.
  pub async fn load_previous(&self, series: &SeriesKey, anchor: i64) -> Result<Option<Chunk>> {
    let previous = self
      .store
      .load_chunks(series, anchor - 1, 1)
      .await
      .map_err(Error::store)?
      .into_iter()
      .next();
    Ok(previous)
  }

  pub async fn put(&self, chunk: &Chunk) -> Result<()> {
    self.store.store_chunk(chunk).await.map_err(Error::store)
  }

  /// Exclusive access to `series` for a load-modify-put cycle.
  pub async fn lock(&self, series: &SeriesKey) -> OwnedMutexGuard<()> {
    let lock = {
      let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
      locks.entry(series.clone()).or_default().clone()
    };
    lock.lock_owned().await
  }
}
