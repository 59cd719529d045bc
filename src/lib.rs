pub mod analysis;
pub mod catalog;
pub mod config;
pub mod db;
pub mod ingest;
pub mod retry;
pub mod sync;

#[cfg(test)]
pub(crate) mod testutil;

/// Application name for XDG paths
pub const APP_NAME: &str = "kindred";

/// Watermark value for a database that has never completed a sync pass.
pub const EPOCH: i64 = 0;
