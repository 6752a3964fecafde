//! Schema DDL and the hardcoded expected-schema map used by
//! [`super::sqlite_repository::SqliteShareRepository::try_validate`].

pub const CREATE_SCANS: &str = "CREATE TABLE IF NOT EXISTS scans (
    started_at INTEGER PRIMARY KEY,
    options_json TEXT NOT NULL,
    ended_at INTEGER,
    suspect INTEGER NOT NULL DEFAULT 0
)";

pub const CREATE_DIRECTORIES: &str = "CREATE TABLE IF NOT EXISTS directories (
    name TEXT PRIMARY KEY,
    timestamp INTEGER NOT NULL
)";

pub const CREATE_FILENAMES_FTS: &str =
    "CREATE VIRTUAL TABLE IF NOT EXISTS filenames USING fts5(masked_filename)";

pub const CREATE_FILES: &str = "CREATE TABLE IF NOT EXISTS files (
    masked_filename TEXT PRIMARY KEY,
    original_filename TEXT NOT NULL,
    size INTEGER NOT NULL,
    touched_at TEXT NOT NULL,
    code INTEGER NOT NULL DEFAULT 1,
    extension TEXT NOT NULL,
    attribute_json TEXT NOT NULL,
    timestamp INTEGER NOT NULL
)";

pub const CREATE_VERSION: &str = "CREATE TABLE IF NOT EXISTS version (a INTEGER PRIMARY KEY)";

pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// `(table name, DDL prefix expected in `sqlite_master.sql`)`. Presence and
/// a normalized-prefix match of each is what `TryValidate` checks.
pub const EXPECTED_TABLES: &[(&str, &str)] = &[
    ("scans", "CREATE TABLE scans"),
    ("directories", "CREATE TABLE directories"),
    ("filenames", "CREATE VIRTUAL TABLE filenames USING fts5"),
    ("files", "CREATE TABLE files"),
    ("version", "CREATE TABLE version"),
];

pub const DROP_STATEMENTS: &[&str] = &[
    "DROP TABLE IF EXISTS scans",
    "DROP TABLE IF EXISTS directories",
    "DROP TABLE IF EXISTS filenames",
    "DROP TABLE IF EXISTS files",
    "DROP TABLE IF EXISTS version",
];

pub const CREATE_STATEMENTS: &[&str] = &[
    CREATE_SCANS,
    CREATE_DIRECTORIES,
    CREATE_FILENAMES_FTS,
    CREATE_FILES,
    CREATE_VERSION,
];

/// Normalizes whitespace for a loose DDL-prefix comparison: collapse runs
/// of whitespace to single spaces, uppercase keywords aren't required to
/// match case since SQLite echoes the DDL verbatim as written.
pub fn normalize_ddl(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}
