//! SQL schema for the Holocron SQLite store.
//!
//! Initialisation is additive only: tables are created if missing, then any
//! column listed in [`COLUMNS`] that an older database lacks is added with
//! `ALTER TABLE ... ADD COLUMN`. Nothing is ever dropped or rewritten.

use rusqlite::Connection;

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS characters (
    character_id TEXT PRIMARY KEY,     -- Player-<Realm>-<Name>
    name         TEXT NOT NULL,
    realm        TEXT NOT NULL,
    class        TEXT,
    level        INTEGER,
    race         TEXT,
    faction      TEXT,
    spec         TEXT,
    item_level   REAL,
    first_seen   TEXT NOT NULL,
    last_seen    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS storage_locations (
    character_id    TEXT NOT NULL REFERENCES characters(character_id),
    container_type  TEXT NOT NULL,
    container_index INTEGER NOT NULL DEFAULT 0,
    UNIQUE (character_id, container_type, container_index)
);

CREATE TABLE IF NOT EXISTS items (
    item_handle     TEXT PRIMARY KEY,  -- <character>:<item_id>:<type>:<index>
    character_id    TEXT NOT NULL,
    container_type  TEXT NOT NULL,
    container_index INTEGER NOT NULL,
    item_id         INTEGER NOT NULL,
    count           INTEGER NOT NULL CHECK (count >= 0),
    name            TEXT,
    last_updated    TEXT NOT NULL,
    FOREIGN KEY (character_id, container_type, container_index)
      REFERENCES storage_locations (character_id, container_type, container_index)
);

CREATE TABLE IF NOT EXISTS professions (
    character_id  TEXT NOT NULL REFERENCES characters(character_id),
    profession_id INTEGER NOT NULL,
    name          TEXT NOT NULL,
    skill         INTEGER NOT NULL,
    max_skill     INTEGER NOT NULL,
    updated_at    TEXT NOT NULL,
    PRIMARY KEY (character_id, profession_id)
);

CREATE TABLE IF NOT EXISTS recipe_reference (
    recipe_id        INTEGER PRIMARY KEY,
    name             TEXT,
    profession       TEXT,
    skill_tier       TEXT,
    materials        TEXT,             -- JSON [{item_id, quantity}] or NULL
    crafted_item_id  INTEGER,
    crafted_quantity INTEGER,
    updated_at       TEXT NOT NULL
);

-- Append-only. `seq` orders identical listings within one batch so a replayed
-- batch maps onto the rows it already wrote.
CREATE TABLE IF NOT EXISTS price_history (
    source    TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    item_id   INTEGER NOT NULL,
    seq       INTEGER NOT NULL,
    price     INTEGER NOT NULL,
    quantity  INTEGER NOT NULL,
    PRIMARY KEY (source, timestamp, item_id, seq)
);

CREATE TABLE IF NOT EXISTS global_constants (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,          -- JSON
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS logistics_jobs (
    character_id TEXT NOT NULL,
    item_id      INTEGER NOT NULL,
    count        INTEGER NOT NULL CHECK (count >= 0),
    target       TEXT NOT NULL,
    PRIMARY KEY (character_id, item_id, target)
);

CREATE TABLE IF NOT EXISTS item_price_snapshot (
    item_id        INTEGER PRIMARY KEY,
    min_price      INTEGER NOT NULL,
    total_quantity INTEGER NOT NULL,
    scanned_at     TEXT NOT NULL,
    source         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS items_character_idx ON items(character_id, container_type);
CREATE INDEX IF NOT EXISTS items_item_idx      ON items(item_id);
CREATE INDEX IF NOT EXISTS price_item_idx      ON price_history(item_id, timestamp);

PRAGMA user_version = 1;
";

/// Columns added after the first release. Databases created before a column
/// existed gain it on the next start.
pub const COLUMNS: &[(&str, &str, &str)] = &[
  ("characters", "spec", "TEXT"),
  ("characters", "item_level", "REAL"),
  ("items", "name", "TEXT"),
  ("recipe_reference", "skill_tier", "TEXT"),
  ("recipe_reference", "crafted_quantity", "INTEGER"),
];

/// Every table, with the ordering used when hashing its contents.
pub const TABLES: &[(&str, &str)] = &[
  ("characters", "character_id"),
  ("storage_locations", "character_id, container_type, container_index"),
  ("items", "item_handle"),
  ("professions", "character_id, profession_id"),
  ("recipe_reference", "recipe_id"),
  ("price_history", "source, timestamp, item_id, seq"),
  ("global_constants", "key"),
  ("logistics_jobs", "character_id, item_id, target"),
  ("item_price_snapshot", "item_id"),
];

/// Add any [`COLUMNS`] entry missing from the live schema. Returns the
/// `table.column` names that were added.
pub fn sync_columns(conn: &Connection) -> rusqlite::Result<Vec<String>> {
  let mut added = Vec::new();
  for (table, column, decl) in COLUMNS {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let present = stmt
      .query_map([], |row| row.get::<_, String>(1))?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    if present.iter().any(|c| c == column) {
      continue;
    }
    conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"))?;
    added.push(format!("{table}.{column}"));
  }
  Ok(added)
}
