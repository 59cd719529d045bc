use crate::analysis::FeatureVector;

/// Data for inserting a newly analyzed song.
pub struct NewSong {
    pub uri: String,
    pub features: FeatureVector,
    pub album: Option<String>,
}

/// A song row read from the database.
#[derive(Debug, Clone)]
pub struct Song {
    pub id: i64,
    pub uri: String,
    pub features: FeatureVector,
    pub album: Option<String>,
}

/// Outcome of inserting a song into the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Song and all fan-out edges were committed; carries the new id.
    Inserted(i64),
    /// The URI already has a song; nothing was written.
    Duplicate,
}

/// Counts shown by `kindred stats`.
pub struct IndexStats {
    pub songs: i64,
    pub edges: i64,
    pub quarantined: i64,
    pub watermark: i64,
}
