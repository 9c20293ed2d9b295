//! Outcome of a download run.

use chrono::{DateTime, Utc};
use harvest_core::{HarvestError, Identifier, IdentifierBatch};

/// A fetch that failed.
///
/// Failed groups are retried member by member, so this holds one identifier.
#[derive(Debug)]
pub struct FailedGroup {
    /// Identifiers sent in the failed call.
    pub identifiers: Vec<Identifier>,
    /// Error returned by the fetcher.
    pub error: HarvestError,
}

/// Summary of one run of [`Harvester::run`](crate::Harvester::run).
#[derive(Debug)]
pub struct RunReport {
    /// Identifiers in the resolved batch.
    pub requested: usize,
    /// Identifiers skipped because the sink already held them.
    pub skipped: usize,
    /// Groups sent to the fetcher.
    pub groups: usize,
    /// Fetches that returned no rows.
    pub empty_groups: usize,
    /// Rows handed to the sink.
    pub rows_written: usize,
    /// Failed fetches, in batch order.
    pub failed: Vec<FailedGroup>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub(crate) fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            requested: 0,
            skipped: 0,
            groups: 0,
            empty_groups: 0,
            rows_written: 0,
            failed: Vec::new(),
            started_at,
            finished_at: started_at,
        }
    }

    /// Every identifier of every failed fetch, in batch order.
    #[must_use]
    pub fn failed_identifiers(&self) -> Vec<Identifier> {
        self.failed
            .iter()
            .flat_map(|g| g.identifiers.iter().cloned())
            .collect()
    }

    /// A batch holding the failed identifiers, or `None` if nothing failed.
    #[must_use]
    pub fn retry_batch(&self) -> Option<IdentifierBatch> {
        IdentifierBatch::from_identifiers(self.failed_identifiers()).ok()
    }

    /// Returns true if no fetch failed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Wall-clock duration of the run.
    #[must_use]
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
