pub mod models;
pub mod queries;

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

/// Schema version written to SQLite's `user_version` when a fresh database
/// is initialized. Any other non-zero value on open is fatal — there is no
/// auto-upgrade path; run `kindred purge` (or delete the file) first.
pub const SCHEMA_VERSION: i32 = 1;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("schema version mismatch: database has v{found}, this build expects v{expected} — run `kindred purge` or remove the database file")]
    SchemaVersion { found: i32, expected: i32 },
}

pub type Result<T> = std::result::Result<T, DbError>;

pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        // WAL mode for better concurrent read performance
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;

        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        match version {
            0 => self.create_schema(),
            SCHEMA_VERSION => Ok(()),
            found => Err(DbError::SchemaVersion {
                found,
                expected: SCHEMA_VERSION,
            }),
        }
    }

    fn create_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS songs (
                id          INTEGER PRIMARY KEY,
                uri         TEXT NOT NULL UNIQUE,
                tempo       REAL NOT NULL,
                amplitude   REAL NOT NULL,
                frequency   REAL NOT NULL,
                attack      REAL NOT NULL,
                album       TEXT,
                added_at    TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- Pairwise similarity edges. Pairs are stored normalized
            -- (song_a < song_b) so the UNIQUE constraint covers the
            -- unordered pair.
            CREATE TABLE IF NOT EXISTS distances (
                song_a      INTEGER NOT NULL REFERENCES songs(id) ON DELETE CASCADE,
                song_b      INTEGER NOT NULL REFERENCES songs(id) ON DELETE CASCADE,
                distance    REAL NOT NULL,
                similarity  REAL NOT NULL,
                UNIQUE(song_a, song_b)
            );
            CREATE INDEX IF NOT EXISTS idx_distances_a ON distances(song_a);
            CREATE INDEX IF NOT EXISTS idx_distances_b ON distances(song_b);

            -- URIs whose most recent ingest attempt failed.
            CREATE TABLE IF NOT EXISTS quarantine (
                id          INTEGER PRIMARY KEY,
                uri         TEXT NOT NULL UNIQUE
            );

            -- Scalar state; the sync watermark lives under key 'watermark'.
            CREATE TABLE IF NOT EXISTS meta (
                key         TEXT PRIMARY KEY,
                value       TEXT NOT NULL
            );
            ",
        )?;
        self.conn
            .pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }
}
