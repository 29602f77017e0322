//! SQL schema for the attendo SQLite store.
//!
//! Executed at connection startup. `PRAGMA user_version` records the schema
//! revision for later migrations.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS shifts (
    shift_id    TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    start_time  TEXT NOT NULL,   -- HH:MM:SS
    end_time    TEXT NOT NULL    -- HH:MM:SS; <= start_time means overnight
);

CREATE TABLE IF NOT EXISTS staff_groups (
    group_id    TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    shift_id    TEXT REFERENCES shifts(shift_id)
);

CREATE TABLE IF NOT EXISTS identities (
    identity_id    TEXT PRIMARY KEY,
    code           TEXT NOT NULL UNIQUE,
    display_name   TEXT NOT NULL,
    is_privileged  INTEGER NOT NULL DEFAULT 0,
    image_url      TEXT,
    shift_id       TEXT REFERENCES shifts(shift_id),
    group_id       TEXT REFERENCES staff_groups(group_id),
    embedding      BLOB,            -- little-endian f32 values, NULL until enrolled
    model_version  TEXT
);

-- Attendance events are append-only.
CREATE TABLE IF NOT EXISTS attendance_events (
    event_id     TEXT PRIMARY KEY,
    identity_id  TEXT NOT NULL REFERENCES identities(identity_id),
    timestamp    TEXT NOT NULL,     -- fixed-width local time, sorts lexically
    kind         TEXT NOT NULL,     -- 'in' | 'out'
    origin       TEXT NOT NULL,     -- 'self-service' | 'auto-backfill' | 'manager-entered'
    UNIQUE (identity_id, timestamp)
);

CREATE TABLE IF NOT EXISTS suspicious_cases (
    case_id        TEXT PRIMARY KEY,
    candidate_id   TEXT REFERENCES identities(identity_id),
    distance       REAL NOT NULL,
    evidence_path  TEXT,
    captured_at    TEXT NOT NULL,
    status         TEXT NOT NULL DEFAULT 'pending',
    reviewed_by    TEXT REFERENCES identities(identity_id),
    reviewed_at    TEXT
);

CREATE INDEX IF NOT EXISTS events_identity_ts_idx ON attendance_events(identity_id, timestamp);
CREATE INDEX IF NOT EXISTS cases_status_idx       ON suspicious_cases(status, captured_at);

PRAGMA user_version = 1;
";
