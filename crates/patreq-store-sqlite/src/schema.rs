//! SQL schema for the patron request store.
//!
//! Executed once at connection startup. `PRAGMA user_version` records the
//! schema revision for future migrations.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS org_units (
    id        INTEGER PRIMARY KEY,
    parent    INTEGER REFERENCES org_units(id),
    shortname TEXT NOT NULL UNIQUE,
    name      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id          INTEGER PRIMARY KEY,
    home_ou     INTEGER NOT NULL,
    staff       INTEGER NOT NULL DEFAULT 0,
    can_request INTEGER NOT NULL DEFAULT 1
);

-- Opaque session tokens issued by operators.
CREATE TABLE IF NOT EXISTS sessions (
    token      TEXT PRIMARY KEY,
    user_id    INTEGER NOT NULL REFERENCES users(id),
    created_at TEXT NOT NULL
);

-- Requests are never deleted; terminal rows keep their timestamps.
-- Status is not stored: it is derived from the date columns and route_to.
CREATE TABLE IF NOT EXISTS requests (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    usr           INTEGER NOT NULL,
    requestor     INTEGER NOT NULL,
    title         TEXT NOT NULL,
    author        TEXT,
    identifier    TEXT,
    format        TEXT NOT NULL,
    publisher     TEXT,
    pubdate       TEXT,
    language      TEXT,
    notes         TEXT,
    pickup_lib    INTEGER,
    email         TEXT,
    phone         TEXT,
    ill_opt_out   INTEGER NOT NULL DEFAULT 0,
    id_matched    INTEGER NOT NULL DEFAULT 0,
    create_date   TEXT NOT NULL,   -- RFC 3339 UTC; server-assigned
    claim_date    TEXT,
    claimed_by    INTEGER,
    reject_date   TEXT,
    rejected_by   INTEGER,
    reject_reason TEXT,
    complete_date TEXT,
    cancel_date   TEXT,
    route_to      TEXT,            -- 'acq' | 'ill' | NULL
    lineitem      INTEGER,
    illno         TEXT,
    vendor        TEXT,
    staff_notes   TEXT,
    patron_notes  TEXT,
    revision      INTEGER NOT NULL DEFAULT 0,  -- bumped on every write
    CHECK (reject_date IS NULL OR complete_date IS NULL),
    CHECK ((claimed_by IS NULL) = (claim_date IS NULL))
);

-- Global defaults, consulted when no org unit in the ancestry sets a value.
CREATE TABLE IF NOT EXISTS settings (
    name       TEXT PRIMARY KEY,
    value_json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS org_settings (
    org_unit   INTEGER NOT NULL REFERENCES org_units(id),
    name       TEXT NOT NULL,
    value_json TEXT NOT NULL,
    PRIMARY KEY (org_unit, name)
);

CREATE TABLE IF NOT EXISTS patron_settings (
    user_id    INTEGER NOT NULL,
    name       TEXT NOT NULL,
    value_json TEXT NOT NULL,
    PRIMARY KEY (user_id, name)
);

-- Catalogue records offered as suggestions for an identifier.
CREATE TABLE IF NOT EXISTS bib_records (
    id         INTEGER PRIMARY KEY,
    source     TEXT NOT NULL DEFAULT 'local',   -- 'local' | 'external'
    identifier TEXT NOT NULL,
    title      TEXT NOT NULL,
    author     TEXT,
    pubdate    TEXT,
    publisher  TEXT
);

CREATE INDEX IF NOT EXISTS requests_usr_idx      ON requests(usr);
CREATE INDEX IF NOT EXISTS requests_created_idx  ON requests(create_date);
CREATE INDEX IF NOT EXISTS bib_records_ident_idx ON bib_records(identifier COLLATE NOCASE);

PRAGMA user_version = 2;
";
