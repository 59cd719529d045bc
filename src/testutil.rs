//! Scripted collaborator fakes shared by the ingest/sync/retry tests.

use crate::analysis::{AnalysisError, Analyzer, FeatureVector};
use crate::catalog::{Catalog, CatalogEntry, CatalogError, ChangeEvent};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::Path;

pub fn entry(uri: &str, last_modified: i64) -> CatalogEntry {
    CatalogEntry {
        uri: uri.to_string(),
        last_modified,
    }
}

/// Analyzer fake keyed by URI suffix. Unknown paths fail analysis, as do
/// URIs explicitly scripted to fail. Records every call for assertions.
pub struct FakeAnalyzer {
    songs: Vec<(String, FeatureVector)>,
    failing: Vec<String>,
    calls: RefCell<Vec<String>>,
}

impl FakeAnalyzer {
    pub fn new() -> Self {
        Self {
            songs: Vec::new(),
            failing: Vec::new(),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn with_song(mut self, uri: &str, tempo: f64) -> Self {
        self.songs.push((
            uri.to_string(),
            FeatureVector {
                tempo,
                amplitude: 0.5,
                frequency: 440.0,
                attack: 0.1,
            },
        ));
        self
    }

    pub fn with_failure(mut self, uri: &str) -> Self {
        self.failing.push(uri.to_string());
        self
    }

    /// Promote a previously failing URI to a successful one.
    pub fn heal(&mut self, uri: &str, tempo: f64) {
        self.failing.retain(|u| u != uri);
        self.songs.push((
            uri.to_string(),
            FeatureVector {
                tempo,
                amplitude: 0.5,
                frequency: 440.0,
                attack: 0.1,
            },
        ));
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn calls_for(&self, uri: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|p| p.ends_with(uri))
            .count()
    }
}

impl Analyzer for FakeAnalyzer {
    fn analyze(&self, path: &Path) -> Result<FeatureVector, AnalysisError> {
        let key = path.to_string_lossy().to_string();
        self.calls.borrow_mut().push(key.clone());

        if self.failing.iter().any(|u| key.ends_with(u.as_str())) {
            return Err(AnalysisError::Failed {
                status: "exit status: 1".to_string(),
                path: key,
                stderr: "scripted failure".to_string(),
            });
        }
        self.songs
            .iter()
            .find(|(u, _)| key.ends_with(u.as_str()))
            .map(|(_, fv)| *fv)
            .ok_or(AnalysisError::Failed {
                status: "exit status: 1".to_string(),
                path: key,
                stderr: "unknown track".to_string(),
            })
    }
}

/// Catalog fake with a mutable listing and a queue of wait events.
/// An exhausted event queue reports `Cancelled` so watch loops terminate.
pub struct FakeCatalog {
    entries: Vec<CatalogEntry>,
    fail_listing: bool,
    events: VecDeque<ChangeEvent>,
    pub listings_served: usize,
}

impl FakeCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self {
            entries,
            fail_listing: false,
            events: VecDeque::new(),
            listings_served: 0,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            entries: Vec::new(),
            fail_listing: true,
            events: VecDeque::new(),
            listings_served: 0,
        }
    }

    pub fn set_entries(&mut self, entries: Vec<CatalogEntry>) {
        self.entries = entries;
    }

    pub fn push_event(&mut self, event: ChangeEvent) {
        self.events.push_back(event);
    }
}

impl Catalog for FakeCatalog {
    fn list(&mut self) -> Result<Vec<CatalogEntry>, CatalogError> {
        if self.fail_listing {
            return Err(CatalogError::Protocol("listing unavailable".to_string()));
        }
        self.listings_served += 1;
        Ok(self.entries.clone())
    }

    fn wait_for_change(&mut self) -> Result<ChangeEvent, CatalogError> {
        Ok(self.events.pop_front().unwrap_or(ChangeEvent::Cancelled))
    }
}
