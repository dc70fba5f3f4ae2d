//! SQL schema for the specimen SQLite store.
//!
//! Executed once at connection startup. The schema version lives in
//! `PRAGMA user_version` and tracks
//! [`TRANSITION_TABLE_VERSION`](specimen_core::workflow::TRANSITION_TABLE_VERSION):
//! status columns hold the enum vocabulary of that version, so changing the
//! vocabulary means a migration keyed on this number rather than rewriting
//! column constraints.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS samples (
    sample_id             TEXT PRIMARY KEY,
    client_id             TEXT NOT NULL,
    description           TEXT,
    administrative_status TEXT NOT NULL,
    testing_status        TEXT NOT NULL,
    lab_sample_code       TEXT UNIQUE,     -- assigned once, never reused
    intake_round          INTEGER NOT NULL DEFAULT 0,
    return_reason         TEXT,
    created_by            TEXT NOT NULL,
    assigned_to           TEXT NOT NULL,
    created_at            TEXT NOT NULL,
    updated_at            TEXT NOT NULL,
    milestones            TEXT NOT NULL DEFAULT '{}'   -- JSON: milestone -> RFC 3339
);

CREATE TABLE IF NOT EXISTS sample_tests (
    test_id       TEXT PRIMARY KEY,
    sample_id     TEXT NOT NULL REFERENCES samples(sample_id),
    parameter_id  TEXT NOT NULL,
    method_id     TEXT,
    status        TEXT NOT NULL,
    qc_passed     INTEGER NOT NULL DEFAULT 0,
    is_verified   INTEGER NOT NULL DEFAULT 0,
    is_validated  INTEGER NOT NULL DEFAULT 0,
    verified_by   TEXT,
    validated_by  TEXT,
    created_by    TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    milestones    TEXT NOT NULL DEFAULT '{}',
    UNIQUE (sample_id, parameter_id)
);

CREATE TABLE IF NOT EXISTS intake_checklists (
    checklist_id  TEXT PRIMARY KEY,
    sample_id     TEXT NOT NULL REFERENCES samples(sample_id),
    intake_round  INTEGER NOT NULL,
    checks        TEXT NOT NULL,   -- JSON object: item -> bool
    notes         TEXT NOT NULL,   -- JSON object: item -> text
    passed        INTEGER NOT NULL,
    submitted_by  TEXT NOT NULL,
    submitted_at  TEXT NOT NULL,
    UNIQUE (sample_id, intake_round)
);

CREATE TABLE IF NOT EXISTS qc_controls (
    qc_control_id TEXT PRIMARY KEY,
    parameter_id  TEXT NOT NULL,
    method_id     TEXT,
    name          TEXT NOT NULL,
    target        REAL NOT NULL,
    tolerance     REAL NOT NULL CHECK (tolerance > 0),
    rules         TEXT NOT NULL,   -- JSON array of rule names, in priority order
    active        INTEGER NOT NULL DEFAULT 1,
    created_by    TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

-- Append-only; rowid order is evaluation order.
CREATE TABLE IF NOT EXISTS qc_runs (
    run_id         TEXT PRIMARY KEY,
    sample_id      TEXT NOT NULL REFERENCES samples(sample_id),
    qc_control_id  TEXT NOT NULL REFERENCES qc_controls(qc_control_id),
    value          REAL NOT NULL,
    z_score        REAL NOT NULL,
    violated_rules TEXT NOT NULL,  -- JSON array
    status         TEXT NOT NULL,
    recorded_by    TEXT NOT NULL,
    recorded_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sequence_counters (
    name        TEXT PRIMARY KEY,
    next_value  INTEGER NOT NULL CHECK (next_value >= 1)
);

CREATE TABLE IF NOT EXISTS artifacts (
    artifact_id    TEXT PRIMARY KEY,
    sample_id      TEXT NOT NULL REFERENCES samples(sample_id),
    kind           TEXT NOT NULL,
    number         TEXT NOT NULL UNIQUE,
    sequence_value INTEGER NOT NULL,
    loa_status     TEXT,
    locked         INTEGER NOT NULL DEFAULT 0,
    locked_at      TEXT,
    content_digest TEXT,
    created_by     TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    UNIQUE (sample_id, kind)
);

CREATE TABLE IF NOT EXISTS artifact_signatures (
    artifact_id TEXT NOT NULL REFERENCES artifacts(artifact_id),
    role        TEXT NOT NULL,
    signed_by   TEXT NOT NULL,
    signed_at   TEXT NOT NULL,
    PRIMARY KEY (artifact_id, role)
);

-- Append-only.
CREATE TABLE IF NOT EXISTS audit_log (
    entry_id     TEXT PRIMARY KEY,
    actor_id     TEXT NOT NULL,
    actor_role   TEXT NOT NULL,
    action       TEXT NOT NULL,
    entity_type  TEXT NOT NULL,
    entity_id    TEXT NOT NULL,
    note         TEXT,
    before_json  TEXT,
    after_json   TEXT NOT NULL,
    recorded_at  TEXT NOT NULL
);

CREATE TRIGGER IF NOT EXISTS audit_log_no_update BEFORE UPDATE ON audit_log
BEGIN SELECT RAISE(ABORT, 'audit_log is append-only'); END;
CREATE TRIGGER IF NOT EXISTS audit_log_no_delete BEFORE DELETE ON audit_log
BEGIN SELECT RAISE(ABORT, 'audit_log is append-only'); END;
CREATE TRIGGER IF NOT EXISTS qc_runs_no_update BEFORE UPDATE ON qc_runs
BEGIN SELECT RAISE(ABORT, 'qc_runs is append-only'); END;
CREATE TRIGGER IF NOT EXISTS qc_runs_no_delete BEFORE DELETE ON qc_runs
BEGIN SELECT RAISE(ABORT, 'qc_runs is append-only'); END;

CREATE INDEX IF NOT EXISTS sample_tests_sample_idx ON sample_tests(sample_id);
CREATE INDEX IF NOT EXISTS qc_runs_scope_idx       ON qc_runs(sample_id, qc_control_id);
CREATE INDEX IF NOT EXISTS artifacts_sample_idx    ON artifacts(sample_id);
CREATE INDEX IF NOT EXISTS audit_entity_idx        ON audit_log(entity_type, entity_id);

PRAGMA user_version = 1;
";
