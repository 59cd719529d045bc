use super::models::{AddOutcome, IndexStats, NewSong, Song};
use super::{Database, Result};
use crate::analysis::{self, FeatureVector};
use crate::EPOCH;
use rusqlite::params;

impl Database {
    /// Insert a song and fan out one distance edge to every song that
    /// already exists, all inside a single transaction.
    ///
    /// A URI uniqueness violation rolls back and reports `Duplicate`; any
    /// other failure propagates after rollback, leaving no partial state.
    pub fn add_song_with_distances(&self, new: &NewSong) -> Result<AddOutcome> {
        let tx = self.conn.unchecked_transaction()?;

        let inserted = tx.execute(
            "INSERT INTO songs (uri, tempo, amplitude, frequency, attack, album)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                new.uri,
                new.features.tempo,
                new.features.amplitude,
                new.features.frequency,
                new.features.attack,
                new.album,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                // URI already indexed; dropping the transaction rolls back.
                return Ok(AddOutcome::Duplicate);
            }
            Err(e) => return Err(e.into()),
        }
        let new_id = tx.last_insert_rowid();

        // Snapshot peers first; the edge insert below reuses the connection.
        let peers: Vec<(i64, FeatureVector)> = {
            let mut stmt = tx.prepare(
                "SELECT id, tempo, amplitude, frequency, attack
                 FROM songs WHERE id != ?1",
            )?;
            let rows = stmt.query_map(params![new_id], |row| {
                Ok((
                    row.get(0)?,
                    FeatureVector {
                        tempo: row.get(1)?,
                        amplitude: row.get(2)?,
                        frequency: row.get(3)?,
                        attack: row.get(4)?,
                    },
                ))
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO distances (song_a, song_b, distance, similarity)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(song_a, song_b) DO NOTHING",
            )?;
            for (peer_id, features) in &peers {
                let dist = analysis::distance(&new.features, features);
                let sim = analysis::cosine_similarity(&new.features, features);
                let (a, b) = if new_id < *peer_id {
                    (new_id, *peer_id)
                } else {
                    (*peer_id, new_id)
                };
                stmt.execute(params![a, b, dist, sim])?;
            }
        }

        tx.commit()?;
        Ok(AddOutcome::Inserted(new_id))
    }

    pub fn all_songs(&self) -> Result<Vec<Song>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, uri, tempo, amplitude, frequency, attack, album
             FROM songs ORDER BY id",
        )?;
        let songs = stmt
            .query_map([], |row| {
                Ok(Song {
                    id: row.get(0)?,
                    uri: row.get(1)?,
                    features: FeatureVector {
                        tempo: row.get(2)?,
                        amplitude: row.get(3)?,
                        frequency: row.get(4)?,
                        attack: row.get(5)?,
                    },
                    album: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(songs)
    }

    /// Record a URI whose ingest attempt failed. Already-quarantined URIs
    /// stay quarantined.
    pub fn quarantine_add(&self, uri: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO quarantine (uri) VALUES (?1)",
            params![uri],
        )?;
        Ok(())
    }

    pub fn quarantine_list(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT uri FROM quarantine ORDER BY id")?;
        let uris = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(uris)
    }

    pub fn quarantine_remove(&self, uri: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM quarantine WHERE uri = ?1", params![uri])?;
        Ok(())
    }

    /// The timestamp below which all catalog entries are assumed ingested.
    pub fn watermark(&self) -> Result<i64> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'watermark'",
                [],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(value
            .and_then(|v| v.parse().ok())
            .unwrap_or(EPOCH))
    }

    /// Advance the watermark. Clamped to `max(stored, candidate)` so it can
    /// never move backward.
    pub fn set_watermark(&self, candidate: i64) -> Result<()> {
        let value = self.watermark()?.max(candidate);
        self.conn.execute(
            "INSERT INTO meta (key, value) VALUES ('watermark', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![value.to_string()],
        )?;
        Ok(())
    }

    fn reset_watermark(&self) -> Result<()> {
        self.conn.execute(
            "INSERT INTO meta (key, value) VALUES ('watermark', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![EPOCH.to_string()],
        )?;
        Ok(())
    }

    /// Empty the whole index in one transaction, then reset the watermark
    /// to epoch as a follow-up durable write. A failed transaction leaves
    /// every table untouched.
    pub fn purge(&self) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM distances", [])?;
        tx.execute("DELETE FROM songs", [])?;
        tx.execute("DELETE FROM quarantine", [])?;
        tx.commit()?;
        self.reset_watermark()
    }

    pub fn song_count(&self) -> Result<i64> {
        let n = self
            .conn
            .query_row("SELECT COUNT(*) FROM songs", [], |row| row.get(0))?;
        Ok(n)
    }

    pub fn edge_count(&self) -> Result<i64> {
        let n = self
            .conn
            .query_row("SELECT COUNT(*) FROM distances", [], |row| row.get(0))?;
        Ok(n)
    }

    pub fn quarantine_count(&self) -> Result<i64> {
        let n = self
            .conn
            .query_row("SELECT COUNT(*) FROM quarantine", [], |row| row.get(0))?;
        Ok(n)
    }

    pub fn stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            songs: self.song_count()?,
            edges: self.edge_count()?,
            quarantined: self.quarantine_count()?,
            watermark: self.watermark()?,
        })
    }
}
