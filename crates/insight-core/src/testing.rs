//! In-memory store used by the unit tests, with failure injection.

use std::{
  cmp::Ordering,
  collections::{BTreeMap, HashMap, HashSet},
  sync::{
    Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering as AtomicOrdering},
  },
};

use tokio_util::sync::CancellationToken;

use crate::{
  chunk::{Chunk, Scope, SeriesKey},
  deployment::Deployment,
  milestone::Milestone,
  store::{
    DeploymentStore, Direction, Field, InsightStore, ListFilter, ListOptions,
    Operator, Value,
  },
};

#[derive(Debug, thiserror::Error)]
#[error("injected failure: {0}")]
pub struct InjectedError(pub String);

type ChunkId = (SeriesKey, i64);

#[derive(Default)]
pub struct MemoryStore {
  deployments:     Mutex<Vec<Deployment>>,
  milestone:       Mutex<Option<Milestone>>,
  chunks:          Mutex<HashMap<ChunkId, Chunk>>,
  list_calls:      AtomicUsize,
  fail_list_after: Mutex<Option<usize>>,
  failing_scopes:  Mutex<HashSet<Scope>>,
  cancel_after:    Mutex<Option<(usize, CancellationToken)>>,
}

fn locked<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
  m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
  pub fn add_deployment(&self, d: Deployment) {
    locked(&self.deployments).push(d);
  }

  pub fn list_calls(&self) -> usize {
    self.list_calls.load(AtomicOrdering::SeqCst)
  }

  /// Fail every page request after the first `pages`.
  pub fn fail_list_after(&self, pages: usize) {
    *locked(&self.fail_list_after) = Some(pages);
  }

  /// Fail every chunk write for `scope`.
  pub fn fail_chunk_writes_for(&self, scope: Scope) {
    locked(&self.failing_scopes).insert(scope);
  }

  /// Cancel `token` once `pages` pages have been served.
  pub fn cancel_after_pages(&self, pages: usize, token: CancellationToken) {
    *locked(&self.cancel_after) = Some((pages, token));
  }

  pub fn heal(&self) {
    *locked(&self.fail_list_after) = None;
    locked(&self.failing_scopes).clear();
  }

  pub fn milestone(&self) -> Option<Milestone> { *locked(&self.milestone) }

  /// Every stored chunk, ordered by series then anchor.
  pub fn chunks(&self) -> BTreeMap<String, Chunk> {
    locked(&self.chunks)
      .iter()
      .map(|((series, anchor), chunk)| {
        let key = format!(
          "{}|{}|{}|{anchor}",
          series.scope, series.kind, series.granularity
        );
        (key, chunk.clone())
      })
      .collect()
  }
}

fn field_value(d: &Deployment, field: Field) -> Option<Value> {
  match field {
    Field::Id => Some(Value::Text(d.id.clone())),
    Field::CreatedAt => Some(Value::Int(d.created_at)),
    Field::CompletedAt => d.completed_at.map(Value::Int),
  }
}

fn matches(d: &Deployment, filter: &ListFilter) -> bool {
  let Some(v) = field_value(d, filter.field) else {
    return false;
  };
  let ord = v.cmp(&filter.value);
  match filter.operator {
    Operator::Eq => ord == Ordering::Equal,
    Operator::Lt => ord == Ordering::Less,
    Operator::Le => ord != Ordering::Greater,
    Operator::Gt => ord == Ordering::Greater,
    Operator::Ge => ord != Ordering::Less,
  }
}

fn compare(a: &Deployment, b: &Deployment, options: &ListOptions) -> Ordering {
  for order in &options.orders {
    let ord = field_value(a, order.field).cmp(&field_value(b, order.field));
    let ord = match order.direction {
      Direction::Asc => ord,
      Direction::Desc => ord.reverse(),
    };
    if ord != Ordering::Equal {
      return ord;
    }
  }
  Ordering::Equal
}

fn after_cursor(d: &Deployment, options: &ListOptions) -> bool {
  let Some(cursor) = &options.cursor else {
    return true;
  };
  let row: Vec<Option<Value>> = options
    .orders
    .iter()
    .map(|o| field_value(d, o.field))
    .collect();
  let at: Vec<Option<Value>> = cursor.values.iter().cloned().map(Some).collect();
  match options.orders.first().map(|o| o.direction) {
    Some(Direction::Desc) => row < at,
    _ => row > at,
  }
}

impl DeploymentStore for MemoryStore {
  type Error = InjectedError;

  async fn list_deployments(
    &self,
    options: &ListOptions,
  ) -> Result<Vec<Deployment>, InjectedError> {
    let calls = self.list_calls.fetch_add(1, AtomicOrdering::SeqCst);
    if let Some(limit) = *locked(&self.fail_list_after)
      && calls >= limit
    {
      return Err(InjectedError(format!("list page {calls}")));
    }

    let mut rows: Vec<Deployment> = locked(&self.deployments)
      .iter()
      .filter(|d| options.filters.iter().all(|f| matches(d, f)))
      .filter(|d| after_cursor(d, options))
      .cloned()
      .collect();
    rows.sort_by(|a, b| compare(a, b, options));
    rows.truncate(options.page_size);

    if let Some((pages, token)) = &*locked(&self.cancel_after)
      && calls + 1 >= *pages
    {
      token.cancel();
    }
    Ok(rows)
  }
}

impl InsightStore for MemoryStore {
  type Error = InjectedError;

  async fn load_milestone(&self) -> Result<Option<Milestone>, InjectedError> {
    Ok(*locked(&self.milestone))
  }

  async fn store_milestone(&self, milestone: Milestone) -> Result<(), InjectedError> {
    *locked(&self.milestone) = Some(milestone);
    Ok(())
  }

  async fn load_chunks(
    &self,
    series: &SeriesKey,
    anchor: i64,
    limit: usize,
  ) -> Result<Vec<Chunk>, InjectedError> {
    let mut found: Vec<Chunk> = locked(&self.chunks)
      .iter()
      .filter(|((s, a), _)| s == series && *a <= anchor)
      .map(|(_, c)| c.clone())
      .collect();
    found.sort_by(|a, b| b.anchor.cmp(&a.anchor));
    found.truncate(limit);
    Ok(found)
  }

  async fn store_chunk(&self, chunk: &Chunk) -> Result<(), InjectedError> {
    if locked(&self.failing_scopes).contains(&chunk.series.scope) {
      return Err(InjectedError(format!("store chunk for {}", chunk.series.scope)));
    }
    locked(&self.chunks).insert((chunk.series.clone(), chunk.anchor), chunk.clone());
    Ok(())
  }
}
