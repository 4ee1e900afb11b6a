//! Integration tests for `SqliteStore` against an in-memory database.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, TimeZone, Utc};
use insight_core::{
  chunk::{Chunk, Scope, SeriesKey},
  collector::InsightCollector,
  config::CollectorConfig,
  deployment::{Deployment, DeploymentStatus, TimestampField},
  fetch::DeploymentRangeFetcher,
  granularity::Granularity,
  metric::{DataPoint, DeployFrequency, MetricKind},
  milestone::Milestone,
  store::{
    Cursor, DeploymentStore, Direction, Field, InsightStore, ListFilter,
    ListOptions, Operator, Order, Value,
  },
};
use tokio_util::sync::CancellationToken;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn deployment(id: &str, app: &str, created_at: i64, status: DeploymentStatus) -> Deployment {
  Deployment {
    id: id.into(),
    application_id: app.into(),
    project_id: "proj".into(),
    status,
    created_at,
    completed_at: status.is_completed().then_some(created_at + 60),
  }
}

fn series(scope: Scope, granularity: Granularity) -> SeriesKey {
  SeriesKey { scope, kind: MetricKind::DeploymentFrequency, granularity }
}

fn newest_first(field: Field) -> Vec<Order> {
  vec![
    Order { field, direction: Direction::Desc },
    Order { field: Field::Id, direction: Direction::Desc },
  ]
}

// ─── Milestone ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_milestone_is_none() {
  let s = store().await;
  assert_eq!(s.load_milestone().await.unwrap(), None);
}

#[tokio::test]
async fn milestone_round_trips_and_never_regresses() {
  let s = store().await;
  let first = Milestone {
    deployment_created_at_milestone:   200,
    deployment_completed_at_milestone: 100,
  };
  s.store_milestone(first).await.unwrap();
  assert_eq!(s.load_milestone().await.unwrap(), Some(first));

  s.store_milestone(Milestone {
    deployment_created_at_milestone:   150,
    deployment_completed_at_milestone: 300,
  })
  .await
  .unwrap();
  assert_eq!(
    s.load_milestone().await.unwrap(),
    Some(Milestone {
      deployment_created_at_milestone:   200,
      deployment_completed_at_milestone: 300,
    })
  );
}

// ─── Chunks ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn chunks_load_newest_first_at_or_before_anchor() {
  let s = store().await;
  let key = series(Scope::application("proj", "app"), Granularity::Daily);

  for month in [3, 4, 5] {
    let mut chunk = Chunk::new(key.clone(), day(2024, month, 1).timestamp());
    chunk
      .merge(DeployFrequency { timestamp: day(2024, month, 2).timestamp(), count: 2 }.into())
      .unwrap();
    chunk.advance_to(day(2024, month, 3).timestamp());
    s.store_chunk(&chunk).await.unwrap();
  }

  let found = s.load_chunks(&key, day(2024, 4, 20).timestamp(), 1).await.unwrap();
  assert_eq!(found.len(), 1);
  assert_eq!(found[0].anchor, day(2024, 4, 1).timestamp());
  assert_eq!(
    found[0].data_points,
    vec![DataPoint::from(DeployFrequency {
      timestamp: day(2024, 4, 2).timestamp(),
      count:     2,
    })]
  );

  let all = s.load_chunks(&key, day(2024, 12, 1).timestamp(), 10).await.unwrap();
  let anchors: Vec<i64> = all.iter().map(|c| c.anchor).collect();
  assert_eq!(
    anchors,
    [
      day(2024, 5, 1).timestamp(),
      day(2024, 4, 1).timestamp(),
      day(2024, 3, 1).timestamp()
    ]
  );
}

#[tokio::test]
async fn project_and_application_chunks_are_separate() {
  let s = store().await;
  let anchor = day(2024, 1, 1).timestamp();
  let app = Chunk::new(series(Scope::application("proj", "app"), Granularity::Monthly), anchor);
  let mut proj = Chunk::new(series(Scope::project("proj"), Granularity::Monthly), anchor);
  proj.advance_to(anchor + 86_400);
  s.store_chunk(&app).await.unwrap();
  s.store_chunk(&proj).await.unwrap();

  let found = s.load_chunks(&proj.series, anchor, 5).await.unwrap();
  assert_eq!(found, vec![proj.clone()]);
  assert_eq!(found[0].series.scope.application_id, None);
}

#[tokio::test]
async fn chunk_write_behind_stored_watermark_is_ignored() {
  let s = store().await;
  let key = series(Scope::project("proj"), Granularity::Yearly);

  let mut ahead = Chunk::new(key.clone(), 0);
  ahead
    .merge(DeployFrequency { timestamp: day(2024, 2, 1).timestamp(), count: 5 }.into())
    .unwrap();
  ahead.advance_to(day(2024, 3, 1).timestamp());
  s.store_chunk(&ahead).await.unwrap();

  let mut stale = Chunk::new(key.clone(), 0);
  stale.advance_to(day(2024, 2, 1).timestamp());
  s.store_chunk(&stale).await.unwrap();

  assert_eq!(s.load_chunks(&key, 0, 1).await.unwrap(), vec![ahead]);
}

// ─── Deployments ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_replaces_deployment_with_same_id() {
  let s = store().await;
  s.upsert_deployment(&deployment("d", "app", 100, DeploymentStatus::Running))
    .await
    .unwrap();
  s.upsert_deployment(&deployment("d", "app", 100, DeploymentStatus::Failure))
    .await
    .unwrap();

  let rows = s.list_deployments(&ListOptions { page_size: 10, ..Default::default() })
    .await
    .unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].status, DeploymentStatus::Failure);
  assert_eq!(rows[0].completed_at, Some(160));
}

#[tokio::test]
async fn keyset_pages_break_ties_by_id() {
  let s = store().await;
  for (id, at) in [("a", 10), ("b", 20), ("c", 20), ("d", 20), ("e", 30)] {
    s.upsert_deployment(&deployment(id, "app", at, DeploymentStatus::Success))
      .await
      .unwrap();
  }

  let mut options = ListOptions {
    orders: newest_first(Field::CreatedAt),
    page_size: 2,
    ..Default::default()
  };
  let mut seen = Vec::new();
  loop {
    let page = s.list_deployments(&options).await.unwrap();
    let Some(last) = page.last() else { break };
    options.cursor = Some(Cursor {
      values: vec![Value::Int(last.created_at), Value::Text(last.id.clone())],
    });
    seen.extend(page.into_iter().map(|d| d.id));
  }
  assert_eq!(seen, ["e", "d", "c", "b", "a"]);
}

#[tokio::test]
async fn null_completion_never_matches_a_filter() {
  let s = store().await;
  s.upsert_deployment(&deployment("done", "app", 100, DeploymentStatus::Success))
    .await
    .unwrap();
  s.upsert_deployment(&deployment("busy", "app", 100, DeploymentStatus::Running))
    .await
    .unwrap();

  let rows = s
    .list_deployments(&ListOptions {
      filters: vec![ListFilter {
        field:    Field::CompletedAt,
        operator: Operator::Ge,
        value:    Value::Int(0),
      }],
      page_size: 10,
      ..Default::default()
    })
    .await
    .unwrap();
  let ids: Vec<&str> = rows.iter().map(|d| d.id.as_str()).collect();
  assert_eq!(ids, ["done"]);
}

#[tokio::test]
async fn cursor_over_mixed_directions_is_unsupported() {
  let s = store().await;
  let options = ListOptions {
    orders: vec![
      Order { field: Field::CreatedAt, direction: Direction::Desc },
      Order { field: Field::Id, direction: Direction::Asc },
    ],
    page_size: 10,
    cursor: Some(Cursor { values: vec![Value::Int(1), Value::Text("x".into())] }),
    ..Default::default()
  };
  assert!(matches!(
    s.list_deployments(&options).await,
    Err(Error::UnsupportedQuery(_))
  ));
}

#[tokio::test]
async fn fetcher_collects_every_record_across_tied_page_boundaries() {
  let s = store().await;
  let base = day(2024, 5, 1).timestamp();
  // Four deployments share each second, so ties straddle every page edge.
  for i in 0..130 {
    let d = deployment(&format!("d{i:03}"), "app", base + i / 4, DeploymentStatus::Success);
    s.upsert_deployment(&d).await.unwrap();
  }
  s.upsert_deployment(&deployment("late", "app", base + 86_400, DeploymentStatus::Success))
    .await
    .unwrap();

  let fetched = DeploymentRangeFetcher::new(&s, 50)
    .fetch(
      TimestampField::CreatedAt,
      base,
      base + 86_400,
      &CancellationToken::new(),
    )
    .await
    .unwrap();

  let ids: HashSet<&str> = fetched.iter().map(|d| d.id.as_str()).collect();
  assert_eq!(fetched.len(), 130);
  assert_eq!(ids.len(), 130);
  assert!(!ids.contains("late"));
}

// ─── End to end ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn collector_runs_against_sqlite() {
  let s = Arc::new(store().await);
  let may_2 = day(2024, 5, 2).timestamp();
  for (id, app, at) in [("1", "web", may_2), ("2", "web", may_2 + 10), ("3", "api", may_2 + 20)] {
    s.upsert_deployment(&deployment(id, app, at, DeploymentStatus::Success))
      .await
      .unwrap();
  }

  let collector =
    InsightCollector::new(s.clone(), s.clone(), CollectorConfig::default()).unwrap();
  let cancel = CancellationToken::new();
  let target = day(2024, 5, 10);

  let created = collector
    .process(TimestampField::CreatedAt, target, &cancel)
    .await
    .unwrap();
  assert_eq!(created.deployments, 3);
  assert_eq!(created.entities, 3);
  collector
    .process(TimestampField::CompletedAt, target, &cancel)
    .await
    .unwrap();

  let key = series(Scope::project("proj"), Granularity::Monthly);
  let chunks = s.load_chunks(&key, target.timestamp(), 1).await.unwrap();
  assert_eq!(
    chunks[0].data_points,
    vec![DataPoint::from(DeployFrequency {
      timestamp: day(2024, 5, 1).timestamp(),
      count:     3,
    })]
  );
  assert_eq!(chunks[0].accumulated_to, target.timestamp());

  assert_eq!(
    s.load_milestone().await.unwrap(),
    Some(Milestone {
      deployment_created_at_milestone:   target.timestamp(),
      deployment_completed_at_milestone: target.timestamp(),
    })
  );

  // A second run over the same window is a no-op.
  let again = collector
    .process(TimestampField::CreatedAt, target, &cancel)
    .await
    .unwrap();
  assert_eq!(again.deployments, 0);
  let chunks = s.load_chunks(&key, target.timestamp(), 1).await.unwrap();
  assert_eq!(chunks[0].data_points.len(), 1);
}
