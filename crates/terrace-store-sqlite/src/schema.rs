//! SQL schema for the Terrace SQLite warehouse.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Latest raw snapshot per entity type. Fully overwritten each run.
CREATE TABLE IF NOT EXISTS snapshot_batches (
    entity_type  TEXT PRIMARY KEY,    -- 'team' | 'player' | 'fixture' | 'match_result' | 'stat'
    received_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS snapshot_rows (
    entity_type   TEXT    NOT NULL REFERENCES snapshot_batches(entity_type) ON DELETE CASCADE,
    position      INTEGER NOT NULL,
    natural_code  TEXT,               -- NULL when the feed omitted it
    value_json    TEXT    NOT NULL,   -- attribute payload (inner data only)
    ingested_at   TEXT    NOT NULL,
    PRIMARY KEY (entity_type, position)
);

-- Surrogate key mapping. Rows are inserted once and never changed.
CREATE TABLE IF NOT EXISTS key_mappings (
    entity_type    TEXT    NOT NULL,
    natural_code   TEXT    NOT NULL,
    surrogate_key  INTEGER NOT NULL CHECK (surrogate_key > 0),
    minted_at      TEXT    NOT NULL,
    PRIMARY KEY (entity_type, natural_code),
    UNIQUE (entity_type, surrogate_key)
);

-- Historical records are strictly append-only.
CREATE TABLE IF NOT EXISTS history (
    record_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type    TEXT    NOT NULL,
    surrogate_key  INTEGER NOT NULL,
    natural_code   TEXT    NOT NULL,
    season         TEXT,              -- '2024/25' or NULL
    value_json     TEXT    NOT NULL,
    fingerprint    TEXT    NOT NULL CHECK (length(fingerprint) = 64),
    change_kind    TEXT    NOT NULL CHECK (change_kind IN ('new', 'changed')),
    recorded_at    TEXT    NOT NULL,  -- RFC 3339 UTC; start of the accepting run
    ingested_at    TEXT    NOT NULL,
    run_id         TEXT    NOT NULL,
    UNIQUE (entity_type, natural_code, run_id),
    FOREIGN KEY (entity_type, natural_code)
        REFERENCES key_mappings(entity_type, natural_code),
    FOREIGN KEY (entity_type, surrogate_key)
        REFERENCES key_mappings(entity_type, surrogate_key)
);

CREATE TRIGGER IF NOT EXISTS history_no_update
BEFORE UPDATE ON history
BEGIN
    SELECT RAISE(ABORT, 'history is append-only');
END;

CREATE TRIGGER IF NOT EXISTS history_no_delete
BEFORE DELETE ON history
BEGIN
    SELECT RAISE(ABORT, 'history is append-only');
END;

-- Volatile records: replaced wholesale on every run.
CREATE TABLE IF NOT EXISTS volatile_records (
    record_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type    TEXT    NOT NULL,
    surrogate_key  INTEGER NOT NULL,
    natural_code   TEXT    NOT NULL,
    season         TEXT    NOT NULL DEFAULT '',
    value_json     TEXT    NOT NULL,
    fingerprint    TEXT    NOT NULL,
    loaded_at      TEXT    NOT NULL,
    ingested_at    TEXT    NOT NULL,
    run_id         TEXT    NOT NULL,
    UNIQUE (entity_type, natural_code, season),
    FOREIGN KEY (entity_type, surrogate_key)
        REFERENCES key_mappings(entity_type, surrogate_key)
);

CREATE INDEX IF NOT EXISTS history_code_idx     ON history(entity_type, natural_code);
CREATE INDEX IF NOT EXISTS history_key_idx      ON history(entity_type, surrogate_key);
CREATE INDEX IF NOT EXISTS history_recorded_idx ON history(recorded_at);

PRAGMA user_version = 1;
";
