//! Shared result list and the per-row claim discipline that keeps
//! enrichment single-writer.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::types::{Depth, PackageRow, WorkItem};

/// Ordered, shared, interior-mutable list of search hits.
///
/// Cheap to clone; every handle addresses the same rows, so the caller can
/// keep one for rendering while the active search mutates through its own.
/// Insertion order is load-bearing: enrichment walks the list by increasing
/// index and never reorders it. Rows are mutated in place, never swapped
/// out, so a handle held across the whole search stays valid.
#[derive(Clone, Default)]
pub struct ResultList {
    rows: Arc<Mutex<Vec<PackageRow>>>,
}

impl ResultList {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> MutexGuard<'_, Vec<PackageRow>> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Swap in a fresh shallow batch. The change lands in the one shared
    /// vector, so every other handle to this list observes it.
    pub fn replace_all(&self, batch: Vec<PackageRow>) {
        *self.rows() = batch;
    }

    pub fn push(&self, row: PackageRow) {
        self.rows().push(row);
    }

    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    /// Copy of the row at `index`, if present.
    pub fn get(&self, index: usize) -> Option<PackageRow> {
        self.rows().get(index).cloned()
    }

    /// Copy of the whole list, for rendering or assertions.
    pub fn snapshot(&self) -> Vec<PackageRow> {
        self.rows().clone()
    }

    /// Number of rows currently claimed by an in-flight enrichment.
    pub fn loading_count(&self) -> usize {
        self.rows().iter().filter(|r| r.loading).count()
    }

    /// Claim the row at `index` for enrichment if it qualifies: not already
    /// claimed, a real backend id, not yet deep. Marks it loading and
    /// returns the id to fetch. Check and mark happen under one lock, so two
    /// callers can never both own a row.
    pub fn claim(&self, index: usize) -> Option<i64> {
        let mut rows = self.rows();
        let row = rows.get_mut(index)?;
        if row.loading || row.id <= 0 || row.depth == Depth::Deep {
            return None;
        }
        row.loading = true;
        Some(row.id)
    }

    /// Claim the first row at or after `from` that is neither claimed nor
    /// deep. The scan never looks behind `from`: enrichment only moves
    /// forward through the list.
    pub fn claim_next(&self, from: usize) -> Option<WorkItem> {
        let mut rows = self.rows();
        for (index, row) in rows.iter_mut().enumerate().skip(from) {
            if row.loading || row.depth == Depth::Deep {
                continue;
            }
            row.loading = true;
            return Some(WorkItem { index, id: row.id });
        }
        None
    }

    /// Land the enrichment the claiming request started: record the deep
    /// count and release the row. Returns false when `index` no longer
    /// addresses a row.
    pub fn complete(&self, index: usize, count: i64) -> bool {
        let mut rows = self.rows();
        match rows.get_mut(index) {
            Some(row) => {
                row.count = count;
                row.depth = Depth::Deep;
                row.loading = false;
                true
            }
            None => false,
        }
    }

    /// Release a claimed row without enriching it (the failure path). The
    /// row stays shallow and a later search may claim it again.
    pub fn release(&self, index: usize) {
        if let Some(row) = self.rows().get_mut(index) {
            row.loading = false;
        }
    }
}
