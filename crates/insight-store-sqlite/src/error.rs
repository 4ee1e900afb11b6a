//! Error type for `insight-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// A column held a value that does not decode to its domain type.
  #[error("decode error: {0}")]
  Decode(String),

  #[error("unsupported query: {0}")]
  UnsupportedQuery(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
