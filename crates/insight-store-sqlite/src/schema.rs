//! SQL schema for the insight SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS deployments (
    id              TEXT PRIMARY KEY,
    application_id  TEXT NOT NULL,
    project_id      TEXT NOT NULL,
    status          TEXT NOT NULL,
    created_at      INTEGER NOT NULL,   -- unix seconds
    completed_at    INTEGER             -- NULL until terminal
);

CREATE INDEX IF NOT EXISTS deployments_created_idx   ON deployments(created_at, id);
CREATE INDEX IF NOT EXISTS deployments_completed_idx ON deployments(completed_at, id);

-- Exactly one row.
CREATE TABLE IF NOT EXISTS milestones (
    singleton               INTEGER PRIMARY KEY CHECK (singleton = 1),
    created_at_milestone    INTEGER NOT NULL,
    completed_at_milestone  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS chunks (
    project_id      TEXT NOT NULL,
    application_id  TEXT NOT NULL DEFAULT '',   -- '' for project chunks
    metric_kind     TEXT NOT NULL,
    granularity     TEXT NOT NULL,
    anchor          INTEGER NOT NULL,
    accumulated_to  INTEGER NOT NULL,
    data_points     TEXT NOT NULL,              -- JSON array
    PRIMARY KEY (project_id, application_id, metric_kind, granularity, anchor)
);

PRAGMA user_version = 1;
";
