use crate::analysis::Analyzer;
use crate::catalog::{Catalog, CatalogError, ChangeEvent};
use crate::db::{Database, DbError};
use crate::ingest::{ingest, IngestError};
use crate::EPOCH;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Listing or wait failure against MPD. Fatal to the current pass; the
    /// stored watermark is untouched.
    #[error("catalog unavailable: {0}")]
    Catalog(#[from] CatalogError),
    /// Whole-pass storage failure (e.g. watermark persistence).
    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

pub struct SyncReport {
    pub attempted: usize,
    pub ingested: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub watermark: i64,
}

/// One sync pass: ingest every catalog entry newer than `since`.
///
/// Entries are processed strictly in listing order. The watermark candidate
/// is the max last-modified among *attempted* entries — failed ingests
/// advance it too, so one broken file cannot stall the library (quarantine
/// retry is its rescue path). The candidate is persisted once, after the
/// listing is drained; a crash mid-pass loses only that pass's progress and
/// re-ingests are safe no-ops.
pub fn sync_since(
    db: &Database,
    analyzer: &dyn Analyzer,
    catalog: &mut dyn Catalog,
    base_path: &Path,
    since: i64,
) -> Result<SyncReport, SyncError> {
    let entries = catalog.list()?;
    let pending: Vec<_> = entries
        .into_iter()
        .filter(|e| e.last_modified > since)
        .collect();

    log::info!("Sync pass: {} entries newer than {}", pending.len(), since);

    let pb = ProgressBar::new(pending.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-"),
    );

    let mut report = SyncReport {
        attempted: 0,
        ingested: 0,
        duplicates: 0,
        failed: 0,
        watermark: since,
    };

    for entry in &pending {
        pb.set_message(entry.uri.clone());
        report.attempted += 1;
        match ingest(db, analyzer, base_path, &entry.uri) {
            Ok(_) => report.ingested += 1,
            Err(IngestError::Duplicate) => report.duplicates += 1,
            Err(IngestError::Analysis(_)) | Err(IngestError::Storage(_)) => {
                // Already logged and quarantined; the pass continues.
                report.failed += 1;
            }
        }
        report.watermark = report.watermark.max(entry.last_modified);
        pb.inc(1);
    }
    pb.finish_and_clear();

    // Single durable write per pass.
    db.set_watermark(report.watermark)?;
    Ok(report)
}

/// Incremental update: sync everything newer than the stored watermark.
pub fn update(
    db: &Database,
    analyzer: &dyn Analyzer,
    catalog: &mut dyn Catalog,
    base_path: &Path,
) -> Result<SyncReport, SyncError> {
    let since = db.watermark()?;
    sync_since(db, analyzer, catalog, base_path, since)
}

/// Clean rebuild: purge the index, then re-evaluate the whole catalog.
pub fn full_rescan(
    db: &Database,
    analyzer: &dyn Analyzer,
    catalog: &mut dyn Catalog,
    base_path: &Path,
) -> Result<SyncReport, SyncError> {
    db.purge()?;
    sync_since(db, analyzer, catalog, base_path, EPOCH)
}

/// Continuous loop: block on the catalog's change notification, run an
/// incremental update on each wakeup, re-block. Cancellation is checked at
/// the loop boundary only — a pass already in progress always finishes.
///
/// A failed update pass is logged and the loop re-blocks, matching daemon
/// expectations; a failed wait is fatal (the connection is gone).
pub fn watch(
    db: &Database,
    analyzer: &dyn Analyzer,
    catalog: &mut dyn Catalog,
    base_path: &Path,
    stop: &AtomicBool,
) -> Result<(), SyncError> {
    loop {
        if stop.load(Ordering::SeqCst) {
            return Ok(());
        }
        match catalog.wait_for_change()? {
            ChangeEvent::Cancelled => return Ok(()),
            ChangeEvent::Changed => match update(db, analyzer, catalog, base_path) {
                Ok(report) => log::info!(
                    "Pass done: {} ingested, {} duplicate, {} failed (watermark {})",
                    report.ingested,
                    report.duplicates,
                    report.failed,
                    report.watermark
                ),
                Err(SyncError::Catalog(e)) => {
                    log::error!("Sync pass aborted: {e}");
                }
                Err(fatal @ SyncError::Storage(_)) => return Err(fatal),
            },
        }
    }
}
