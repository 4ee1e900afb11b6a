//! Partitioning a batch of deployments by owning application and project.

use std::collections::HashMap;

use crate::deployment::Deployment;

/// Deployments bucketed by the entities they belong to. Each bucket keeps the
/// input order.
#[derive(Debug, Default)]
pub struct Grouped<'a> {
  pub by_application: HashMap<&'a str, Vec<&'a Deployment>>,
  pub by_project:     HashMap<&'a str, Vec<&'a Deployment>>,
}

pub fn group(deployments: &[Deployment]) -> Grouped<'_> {
  let mut grouped = Grouped::default();
  for d in deployments {
    grouped
      .by_application
      .entry(d.application_id.as_str())
      .or_default()
      .push(d);
    grouped
      .by_project
      .entry(d.project_id.as_str())
      .or_default()
      .push(d);
  }
  grouped
}
