//! [`SqliteStore`]: the SQLite implementation of [`DeploymentStore`] and
//! [`InsightStore`].

use std::path::Path;

use rusqlite::OptionalExtension as _;

use insight_core::{
  chunk::{Chunk, SeriesKey},
  deployment::Deployment,
  milestone::Milestone,
  store::{DeploymentStore, Direction, InsightStore, ListOptions},
};

use crate::{
  Error, Result,
  encode::{
    RawChunk, RawDeployment, encode_application, encode_data_points,
    encode_direction, encode_field, encode_status, encode_value,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// Deployment records, milestones and chunks in a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Insert a deployment, or replace the stored record with the same id.
  pub async fn upsert_deployment(&self, deployment: &Deployment) -> Result<()> {
    let d = deployment.clone();
    let status = encode_status(d.status);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO deployments
             (id, application_id, project_id, status, created_at, completed_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT(id) DO UPDATE SET
             application_id = excluded.application_id,
             project_id     = excluded.project_id,
             status         = excluded.status,
             created_at     = excluded.created_at,
             completed_at   = excluded.completed_at",
          rusqlite::params![
            d.id,
            d.application_id,
            d.project_id,
            status,
            d.created_at,
            d.completed_at
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// Build the `SELECT` for one page of `options`, with its bound parameters.
fn list_query(options: &ListOptions) -> Result<(String, Vec<rusqlite::types::Value>)> {
  let mut sql = String::from(
    "SELECT id, application_id, project_id, status, created_at, completed_at
     FROM deployments",
  );
  let mut clauses = Vec::new();
  let mut params = Vec::new();

  for filter in &options.filters {
    clauses.push(format!(
      "{} {} ?",
      encode_field(filter.field),
      filter.operator.as_sql()
    ));
    params.push(encode_value(&filter.value));
  }

  if let Some(cursor) = &options.cursor {
    let Some(first) = options.orders.first() else {
      return Err(Error::UnsupportedQuery("cursor without an order".into()));
    };
    if options.orders.iter().any(|o| o.direction != first.direction) {
      return Err(Error::UnsupportedQuery(
        "cursor over mixed order directions".into(),
      ));
    }
    if cursor.values.len() != options.orders.len() {
      return Err(Error::UnsupportedQuery(format!(
        "cursor has {} values for {} orders",
        cursor.values.len(),
        options.orders.len()
      )));
    }

    let columns: Vec<&str> =
      options.orders.iter().map(|o| encode_field(o.field)).collect();
    let holes = vec!["?"; columns.len()];
    let op = match first.direction {
      Direction::Asc => ">",
      Direction::Desc => "<",
    };
    clauses.push(format!(
      "({}) {op} ({})",
      columns.join(", "),
      holes.join(", ")
    ));
    params.extend(cursor.values.iter().map(encode_value));
  }

  if !clauses.is_empty() {
    sql.push_str(" WHERE ");
    sql.push_str(&clauses.join(" AND "));
  }

  if !options.orders.is_empty() {
    let orders: Vec<String> = options
      .orders
      .iter()
      .map(|o| format!("{} {}", encode_field(o.field), encode_direction(o.direction)))
      .collect();
    sql.push_str(" ORDER BY ");
    sql.push_str(&orders.join(", "));
  }

  sql.push_str(" LIMIT ?");
  let limit = i64::try_from(options.page_size).unwrap_or(i64::MAX);
  params.push(rusqlite::types::Value::Integer(limit));

  Ok((sql, params))
}

// ─── DeploymentStore impl ────────────────────────────────────────────────────

impl DeploymentStore for SqliteStore {
  type Error = Error;

  async fn list_deployments(&self, options: &ListOptions) -> Result<Vec<Deployment>> {
    let (sql, params) = list_query(options)?;

    let raws: Vec<RawDeployment> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), |row| {
            Ok(RawDeployment {
              id:             row.get(0)?,
              application_id: row.get(1)?,
              project_id:     row.get(2)?,
              status:         row.get(3)?,
              created_at:     row.get(4)?,
              completed_at:   row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDeployment::into_deployment).collect()
  }
}

// ─── InsightStore impl ───────────────────────────────────────────────────────

impl InsightStore for SqliteStore {
  type Error = Error;

  async fn load_milestone(&self) -> Result<Option<Milestone>> {
    let milestone = self
      .conn
      .call(|conn| {
        let row = conn
          .query_row(
            "SELECT created_at_milestone, completed_at_milestone
             FROM milestones WHERE singleton = 1",
            [],
            |r| {
              Ok(Milestone {
                deployment_created_at_milestone:   r.get(0)?,
                deployment_completed_at_milestone: r.get(1)?,
              })
            },
          )
          .optional()?;
        Ok(row)
      })
      .await?;
    Ok(milestone)
  }

  /// Never lowers a stored watermark.
  async fn store_milestone(&self, milestone: Milestone) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO milestones
             (singleton, created_at_milestone, completed_at_milestone)
           VALUES (1, ?1, ?2)
           ON CONFLICT(singleton) DO UPDATE SET
             created_at_milestone   =
               MAX(created_at_milestone, excluded.created_at_milestone),
             completed_at_milestone =
               MAX(completed_at_milestone, excluded.completed_at_milestone)",
          rusqlite::params![
            milestone.deployment_created_at_milestone,
            milestone.deployment_completed_at_milestone
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn load_chunks(
    &self,
    series: &SeriesKey,
    anchor: i64,
    limit: usize,
  ) -> Result<Vec<Chunk>> {
    let project_id  = series.scope.project_id.clone();
    let application = encode_application(&series.scope);
    let kind        = series.kind.as_ref().to_owned();
    let granularity = series.granularity.as_ref().to_owned();
    let limit       = i64::try_from(limit).unwrap_or(i64::MAX);

    let raws: Vec<RawChunk> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT project_id, application_id, metric_kind, granularity,
                  anchor, accumulated_to, data_points
           FROM chunks
           WHERE project_id = ?1
             AND application_id = ?2
             AND metric_kind = ?3
             AND granularity = ?4
             AND anchor <= ?5
           ORDER BY anchor DESC
           LIMIT ?6",
        )?;
        let rows = stmt
          .query_map(
            rusqlite::params![project_id, application, kind, granularity, anchor, limit],
            |row| {
              Ok(RawChunk {
                project_id:     row.get(0)?,
                application_id: row.get(1)?,
                metric_kind:    row.get(2)?,
                granularity:    row.get(3)?,
                anchor:         row.get(4)?,
                accumulated_to: row.get(5)?,
                data_points:    row.get(6)?,
              })
            },
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawChunk::into_chunk).collect()
  }

  /// A write carrying an older watermark than the stored chunk is ignored.
  async fn store_chunk(&self, chunk: &Chunk) -> Result<()> {
    let project_id  = chunk.series.scope.project_id.clone();
    let application = encode_application(&chunk.series.scope);
    let kind        = chunk.series.kind.as_ref().to_owned();
    let granularity = chunk.series.granularity.as_ref().to_owned();
    let anchor      = chunk.anchor;
    let watermark   = chunk.accumulated_to;
    let points      = encode_data_points(&chunk.data_points)?;

    let written = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "INSERT INTO chunks
             (project_id, application_id, metric_kind, granularity,
              anchor, accumulated_to, data_points)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
           ON CONFLICT(project_id, application_id, metric_kind, granularity, anchor)
           DO UPDATE SET
             accumulated_to = excluded.accumulated_to,
             data_points    = excluded.data_points
           WHERE excluded.accumulated_to >= chunks.accumulated_to",
          rusqlite::params![
            project_id,
            application,
            kind,
            granularity,
            anchor,
            watermark,
            points
          ],
        )?;
        Ok(n)
      })
      .await?;

    if written == 0 {
      tracing::warn!(
        series = %chunk.series.scope,
        anchor,
        watermark,
        "ignored chunk write behind stored watermark"
      );
    }
    Ok(())
  }
}
