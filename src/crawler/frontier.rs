//! Persisted crawl frontier
//!
//! The frontier lives entirely in the `crawl_queue` table, so a batch that is
//! killed loses at most the page it was fetching. Entries are handed out
//! breadth-first: shallow pages are analyzed first under any time budget.

use crate::storage::{QueueEntry, Storage, StorageResult};
use crate::url::normalize_url;
use crate::UrlResult;
use url::Url;

/// Breadth-first work queue of one audit
#[derive(Debug, Clone, Copy)]
pub struct Frontier {
    audit_id: i64,
}

impl Frontier {
    pub fn new(audit_id: i64) -> Self {
        Self { audit_id }
    }

    /// Normalizes a root URL the way every frontier entry is normalized
    pub fn normalize_root(root_url: &str) -> UrlResult<Url> {
        normalize_url(root_url)
    }

    /// Seeds the queue with the root URL at depth 0
    ///
    /// Seeding twice is harmless: the second insert is ignored.
    pub fn seed<S: Storage>(&self, storage: &mut S, root: &Url) -> StorageResult<()> {
        let inserted = storage.enqueue_urls(self.audit_id, &[root.to_string()], 0)?;
        tracing::debug!("Seeded frontier of audit {} ({} new)", self.audit_id, inserted);
        Ok(())
    }

    /// Queues links found on a page at `parent_depth + 1`
    ///
    /// URLs already known to the audit keep their original depth.
    ///
    /// # Returns
    ///
    /// The number of newly discovered URLs
    pub fn push_links<S: Storage>(
        &self,
        storage: &mut S,
        parent_depth: u32,
        links: &[String],
    ) -> StorageResult<usize> {
        if links.is_empty() {
            return Ok(0);
        }
        storage.enqueue_urls(self.audit_id, links, parent_depth + 1)
    }

    /// Claims the next pending entry, marking it crawled before returning it
    pub fn next<S: Storage>(&self, storage: &mut S) -> StorageResult<Option<QueueEntry>> {
        storage.claim_next(self.audit_id)
    }

    /// Returns true when no entry is left to claim
    pub fn is_exhausted<S: Storage>(&self, storage: &S) -> StorageResult<bool> {
        Ok(storage.count_pending(self.audit_id)? == 0)
    }

    /// Number of URLs ever discovered for the audit
    pub fn discovered<S: Storage>(&self, storage: &S) -> StorageResult<u64> {
        storage.count_queued(self.audit_id)
    }
}
