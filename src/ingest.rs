use crate::analysis::{AnalysisError, Analyzer};
use crate::db::models::{AddOutcome, NewSong};
use crate::db::{Database, DbError};
use lofty::file::TaggedFileExt;
use lofty::prelude::*;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    /// The external analyzer could not process the track. The URI has been
    /// quarantined; never fatal to a sync pass.
    #[error("analysis failed: {0}")]
    Analysis(#[from] AnalysisError),
    /// The URI already has a song in the index. Nothing was written and
    /// nothing was quarantined; callers treat this as a successful no-op.
    #[error("URI is already indexed")]
    Duplicate,
    /// The ingest transaction failed and was rolled back; the URI has been
    /// quarantined.
    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

/// Analyze one catalog URI and add it to the similarity index.
///
/// On success exactly one song row plus one distance edge per pre-existing
/// song are committed atomically. On failure the only durable effect is a
/// quarantine row for the URI.
pub fn ingest(
    db: &Database,
    analyzer: &dyn Analyzer,
    base_path: &Path,
    uri: &str,
) -> Result<i64, IngestError> {
    let path = base_path.join(uri);

    let features = match analyzer.analyze(&path) {
        Ok(features) => features,
        Err(e) => {
            log::warn!("Analysis failed for {uri}: {e}");
            db.quarantine_add(uri)?;
            return Err(e.into());
        }
    };

    let new = NewSong {
        uri: uri.to_string(),
        features,
        album: read_album(&path),
    };

    match db.add_song_with_distances(&new) {
        Ok(AddOutcome::Inserted(id)) => {
            log::info!("Indexed {uri} (id {id})");
            Ok(id)
        }
        Ok(AddOutcome::Duplicate) => {
            log::debug!("Skipping {uri}: already indexed");
            Err(IngestError::Duplicate)
        }
        Err(e) => {
            log::warn!("Storage failure for {uri}: {e}");
            db.quarantine_add(uri)?;
            Err(e.into())
        }
    }
}

/// Read the album tag from the media file. Returns None on any failure
/// (e.g., tag-less formats) — tags are best-effort decoration, never a
/// reason to fail an ingest.
fn read_album(path: &Path) -> Option<String> {
    let tagged_file = match lofty::read_from_path(path) {
        Ok(f) => f,
        Err(e) => {
            log::debug!("Could not read tags from {}: {}", path.display(), e);
            return None;
        }
    };
    let tag = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())?;
    tag.album().map(|s| s.to_string())
}
