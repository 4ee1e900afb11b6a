//! Core types, store traits, and the incremental rollup engine for deployment
//! insights (deployment frequency and change failure rate).
//!
//! No database code lives here. Storage backends implement
//! [`store::DeploymentStore`] and [`store::InsightStore`]; the
//! [`collector::InsightCollector`] drives everything else.

pub mod chunk;
pub mod collector;
pub mod config;
pub mod deployment;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod granularity;
pub mod group;
pub mod metric;
pub mod milestone;
pub mod repository;
pub mod rollup;
pub mod store;

pub use error::{Error, Result};

#[cfg(test)]
mod testing;
