//! SQL schemas for the tally SQLite databases.
//!
//! Executed once at connection startup. `PRAGMA user_version` records the
//! layout; future migrations will be gated on that number.

/// On-device store: cached scores, the pending-write queue, sync status.
pub const LOCAL_SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- At most one row per (subject_id, dimension). Writes for an existing pair
-- delete the old row and insert a new one, possibly under a new id.
CREATE TABLE IF NOT EXISTS scores (
    id          TEXT PRIMARY KEY,  -- canonical remote id, or 'local-…'
    subject_id  TEXT    NOT NULL,
    dimension   INTEGER NOT NULL,
    value       REAL    NOT NULL,
    recorded_by TEXT,
    recorded_at TEXT    NOT NULL   -- RFC 3339 UTC, fixed width
);

CREATE INDEX        IF NOT EXISTS scores_subject_idx ON scores(subject_id);
CREATE UNIQUE INDEX IF NOT EXISTS scores_pair_idx    ON scores(subject_id, dimension);

-- Writes not yet confirmed by the remote service. Rows leave this table only
-- when their key is confirmed, never because an attempt failed.
CREATE TABLE IF NOT EXISTS pending_writes (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_id  TEXT    NOT NULL,
    dimension   INTEGER NOT NULL,
    value       REAL    NOT NULL,
    recorded_by TEXT,
    created_at  TEXT    NOT NULL,
    attempts    INTEGER NOT NULL DEFAULT 0,
    last_error  TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS pending_pair_idx    ON pending_writes(subject_id, dimension);
CREATE INDEX        IF NOT EXISTS pending_created_idx ON pending_writes(created_at);

CREATE TABLE IF NOT EXISTS sync_status (
    key   TEXT PRIMARY KEY,  -- 'last_sync'
    value TEXT NOT NULL
);

PRAGMA user_version = 1;
";

/// Authoritative board: one row per (subject_id, dimension), ids assigned on
/// first insert and stable across updates.
pub const BOARD_SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS scores (
    id          TEXT PRIMARY KEY,
    subject_id  TEXT    NOT NULL,
    dimension   INTEGER NOT NULL,
    value       REAL    NOT NULL,
    recorded_by TEXT,
    recorded_at TEXT    NOT NULL
);

CREATE INDEX        IF NOT EXISTS board_subject_idx ON scores(subject_id);
CREATE UNIQUE INDEX IF NOT EXISTS board_pair_idx    ON scores(subject_id, dimension);

PRAGMA user_version = 1;
";
