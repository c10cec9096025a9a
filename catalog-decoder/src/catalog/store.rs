//! Holder for the active catalog
//!
//! Loads are stamped with a generation number. Only the most recently started
//! load may install its result; an older load that finishes late is discarded.
//! A failed load leaves the active catalog untouched.

use super::model::Catalog;
use crate::types::Result;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Proof that a load was started, used to install its result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
}

#[derive(Debug, Default)]
pub struct CatalogStore {
    latest: AtomicU64,
    active: RwLock<Option<Arc<Catalog>>>,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a load, superseding any load still in flight
    pub fn begin_load(&self) -> LoadTicket {
        LoadTicket {
            generation: self.latest.fetch_add(1, Ordering::SeqCst) + 1,
        }
    }

    /// Install a loaded catalog if no newer load was started since
    ///
    /// Returns the installed catalog, or `None` when the result was superseded.
    pub fn install(&self, ticket: LoadTicket, catalog: Catalog) -> Option<Arc<Catalog>> {
        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        // Checked under the write lock so a newer install cannot be overwritten
        if ticket.generation != self.latest.load(Ordering::SeqCst) {
            log::warn!(
                "Discarding catalog load #{} superseded by a newer load",
                ticket.generation
            );
            return None;
        }
        let catalog = Arc::new(catalog);
        *active = Some(Arc::clone(&catalog));
        Some(catalog)
    }

    /// Currently active catalog
    pub fn current(&self) -> Option<Arc<Catalog>> {
        self.active.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Load a catalog file and make it active
    ///
    /// `Ok(None)` means the load succeeded but was superseded. On error the
    /// previous catalog stays active.
    pub fn load_file(&self, path: &Path) -> Result<Option<Arc<Catalog>>> {
        let ticket = self.begin_load();
        let catalog = super::load_file(path)?;
        Ok(self.install(ticket, catalog))
    }

    /// Resolve catalog text and make it active
    pub fn load_str(&self, text: &str) -> Result<Option<Arc<Catalog>>> {
        let ticket = self.begin_load();
        let catalog = super::resolve(text)?;
        Ok(self.install(ticket, catalog))
    }
}
