use crate::analysis::Analyzer;
use crate::db::{Database, DbError};
use crate::ingest::{ingest, IngestError};
use std::path::Path;

pub struct RetryReport {
    pub attempted: usize,
    pub recovered: usize,
}

impl RetryReport {
    pub fn still_failing(&self) -> usize {
        self.attempted - self.recovered
    }
}

/// Re-attempt every quarantined URI.
///
/// The quarantine list is snapshotted once; each URI is removed *before* its
/// retry so quarantine membership always means "last attempt failed" — the
/// pipeline re-inserts it on a fresh failure, and a permanently broken file
/// cannot trap the retry loop. A `Duplicate` outcome counts as recovered:
/// the song is in the index, which is all the caller wants.
pub fn retry_all(
    db: &Database,
    analyzer: &dyn Analyzer,
    base_path: &Path,
) -> Result<RetryReport, DbError> {
    let snapshot = db.quarantine_list()?;
    let mut report = RetryReport {
        attempted: snapshot.len(),
        recovered: 0,
    };

    for uri in &snapshot {
        db.quarantine_remove(uri)?;
        match ingest(db, analyzer, base_path, uri) {
            Ok(_) | Err(IngestError::Duplicate) => report.recovered += 1,
            Err(e) => {
                // Re-quarantined by the pipeline.
                log::debug!("Retry failed for {uri}: {e}");
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeAnalyzer;
    use std::path::PathBuf;

    fn base() -> PathBuf {
        PathBuf::from("/music")
    }

    #[test]
    fn test_retry_recovers_healed_track() {
        let db = Database::open_in_memory().unwrap();
        let mut analyzer = FakeAnalyzer::new().with_failure("flaky.mp3");

        let _ = ingest(&db, &analyzer, &base(), "flaky.mp3");
        assert_eq!(db.quarantine_count().unwrap(), 1);

        analyzer.heal("flaky.mp3", 100.0);
        let report = retry_all(&db, &analyzer, &base()).unwrap();

        assert_eq!(report.attempted, 1);
        assert_eq!(report.recovered, 1);
        assert_eq!(db.song_count().unwrap(), 1);
        assert_eq!(db.quarantine_count().unwrap(), 0);
    }

    #[test]
    fn test_retry_requeues_persistent_failure() {
        let db = Database::open_in_memory().unwrap();
        let analyzer = FakeAnalyzer::new().with_failure("broken.mp3");

        let _ = ingest(&db, &analyzer, &base(), "broken.mp3");
        let report = retry_all(&db, &analyzer, &base()).unwrap();

        assert_eq!(report.attempted, 1);
        assert_eq!(report.recovered, 0);
        assert_eq!(report.still_failing(), 1);
        // Back in quarantine, exactly once.
        assert_eq!(db.quarantine_list().unwrap(), vec!["broken.mp3"]);
    }

    #[test]
    fn test_retry_counts_duplicate_as_recovered() {
        let db = Database::open_in_memory().unwrap();
        let analyzer = FakeAnalyzer::new().with_song("a.mp3", 100.0);

        ingest(&db, &analyzer, &base(), "a.mp3").unwrap();
        // Stale quarantine entry for a song that made it in anyway.
        db.quarantine_add("a.mp3").unwrap();

        let report = retry_all(&db, &analyzer, &base()).unwrap();
        assert_eq!(report.recovered, 1);
        assert_eq!(db.quarantine_count().unwrap(), 0);
        assert_eq!(db.song_count().unwrap(), 1);
    }

    #[test]
    fn test_retry_with_empty_quarantine() {
        let db = Database::open_in_memory().unwrap();
        let analyzer = FakeAnalyzer::new();
        let report = retry_all(&db, &analyzer, &base()).unwrap();
        assert_eq!(report.attempted, 0);
        assert_eq!(report.recovered, 0);
    }
}
