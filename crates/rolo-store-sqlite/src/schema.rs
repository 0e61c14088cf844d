//! SQL schema and connection setup for the Rolo SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

use rusqlite::{Connection, functions::FunctionFlags};

/// Lower-cases its text argument with Unicode rules; `NULL` stays `NULL`.
/// SQLite's own `lower()`, `LIKE` and `NOCASE` fold ASCII only.
pub const FOLD_CASE: &str = "fold_case";

/// Register the scalar functions the store's queries rely on. Must run on
/// every connection before any query.
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
  conn.create_scalar_function(
    FOLD_CASE,
    1,
    FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
    |ctx| {
      let text: Option<String> = ctx.get(0)?;
      Ok(text.map(|t| t.to_lowercase()))
    },
  )
}

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS contacts (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name  TEXT NOT NULL,
    last_name   TEXT NOT NULL,
    email       TEXT NOT NULL UNIQUE,   -- stored lower-cased
    phone       TEXT,                   -- NULL when blank
    company     TEXT,                   -- NULL when blank
    created_at  TEXT NOT NULL,          -- ISO 8601 UTC; store-assigned
    updated_at  TEXT NOT NULL
);

DROP INDEX IF EXISTS contacts_name_idx;

PRAGMA user_version = 1;
";
