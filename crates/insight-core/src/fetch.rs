//! Paginated retrieval of every deployment whose timestamp falls in a range.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;

use crate::{
  Error, Result,
  deployment::{Deployment, TimestampField},
  store::{
    Cursor, DeploymentStore, Direction, Field, ListFilter, ListOptions,
    Operator, Order, Value,
  },
};

/// Pages through a [`DeploymentStore`] newest first.
///
/// Pages are ordered by `(timestamp, id)` descending and each request resumes
/// strictly after the last row of the previous page, so records sharing the
/// boundary timestamp are neither dropped nor repeated.
pub struct DeploymentRangeFetcher<'s, D> {
  store:     &'s D,
  page_size: usize,
}

impl<'s, D: DeploymentStore> DeploymentRangeFetcher<'s, D> {
  pub fn new(store: &'s D, page_size: usize) -> Self {
    Self { store, page_size }
  }

  /// Every deployment with `field` in `[from, to)`.
  ///
  /// Any page failure fails the whole fetch. Cancellation is observed before
  /// each page request.
  pub async fn fetch(
    &self,
    field: TimestampField,
    from: i64,
    to: i64,
    cancel: &CancellationToken,
  ) -> Result<Vec<Deployment>> {
    let mut options = ListOptions {
      filters:   vec![
        ListFilter {
          field:    field.into(),
          operator: Operator::Ge,
          value:    Value::Int(from),
        },
        ListFilter {
          field:    field.into(),
          operator: Operator::Lt,
          value:    Value::Int(to),
        },
      ],
      orders:    vec![
        Order { field: field.into(), direction: Direction::Desc },
        Order { field: Field::Id, direction: Direction::Desc },
      ],
      page_size: self.page_size,
      cursor:    None,
    };

    let mut deployments: Vec<Deployment> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut pages = 0usize;

    loop {
      if cancel.is_cancelled() {
        return Err(Error::Cancelled);
      }

      let page = self
        .store
        .list_deployments(&options)
        .await
        .map_err(Error::store)?;
      pages += 1;

      let Some(last) = page.last() else {
        break;
      };
      // Rows without the field cannot match the range filter.
      let Some(boundary) = last.timestamp(field) else {
        break;
      };
      options.cursor = Some(Cursor {
        values: vec![Value::Int(boundary), Value::Text(last.id.clone())],
      });

      for d in page {
        if seen.insert(d.id.clone()) {
          deployments.push(d);
        } else {
          tracing::warn!(id = %d.id, "store returned a deployment twice");
        }
      }
    }

    tracing::debug!(%field, from, to, pages, count = deployments.len(), "fetched deployments");
    Ok(deployments)
  }
}
