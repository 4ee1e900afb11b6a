//! SQLite backend for deployment insights.
//!
//! Implements both [`insight_core::store::DeploymentStore`] and
//! [`insight_core::store::InsightStore`]. Wraps [`tokio_rusqlite`] so all
//! database access runs on a dedicated thread without blocking the async
//! runtime.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
