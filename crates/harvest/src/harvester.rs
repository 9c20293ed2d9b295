//! The fetch-and-persist loop.

use chrono::Utc;
use harvest_core::page::project;
use harvest_core::{
    HarvestError, Identifier, IdentifierBatch, PageFetcher, Result, Sink, WriteMode,
};
use harvest_sink::MemorySink;
use polars::prelude::DataFrame;
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

use crate::report::{FailedGroup, RunReport};

/// Default number of identifiers sent per fetch call.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default column holding the identifier of each row.
pub const DEFAULT_IDENTIFIER_COLUMN: &str = "ticker";

/// Settings for a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HarvestOptions {
    /// How existing data in the sink is treated.
    pub mode: WriteMode,
    /// Maximum identifiers per fetch call.
    pub batch_size: usize,
    /// Column of each page holding the row's identifier. Used to resume.
    pub identifier_column: String,
    /// Keep only these columns, in this order.
    pub columns: Option<Vec<String>>,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            mode: WriteMode::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            identifier_column: DEFAULT_IDENTIFIER_COLUMN.to_string(),
            columns: None,
        }
    }
}

impl HarvestOptions {
    /// Sets the write mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the number of identifiers per fetch call.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the identifier column.
    #[must_use]
    pub fn with_identifier_column(mut self, column: impl Into<String>) -> Self {
        self.identifier_column = column.into();
        self
    }

    /// Keeps only these columns.
    #[must_use]
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Checks the options.
    ///
    /// # Errors
    /// Returns [`HarvestError::InvalidParameter`] for a zero batch size, a
    /// blank identifier column, an empty projection, or an append-mode
    /// projection that drops the identifier column.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(HarvestError::InvalidParameter(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.identifier_column.trim().is_empty() {
            return Err(HarvestError::InvalidParameter(
                "identifier_column must not be blank".to_string(),
            ));
        }
        if let Some(columns) = &self.columns {
            if columns.is_empty() {
                return Err(HarvestError::InvalidParameter(
                    "columns must not be empty".to_string(),
                ));
            }
            if self.mode == WriteMode::Append && !columns.contains(&self.identifier_column) {
                return Err(HarvestError::InvalidParameter(format!(
                    "columns must include '{}' to resume",
                    self.identifier_column
                )));
            }
        }
        Ok(())
    }
}

/// Drives a [`PageFetcher`] over a batch of identifiers and writes every
/// page to a [`Sink`].
///
/// The batch is split into groups of at most
/// [`batch_size`](HarvestOptions::batch_size) identifiers, fetched one group
/// at a time in batch order. When a group of several identifiers fails, each
/// member is fetched again on its own so one bad identifier does not cost the
/// rest of its group. Identifiers that still fail are logged, recorded in the
/// [`RunReport`] and skipped. Sink failures, including schema mismatches, end
/// the run with an error.
///
/// # Example
///
/// ```no_run
/// use harvest::{CsvSink, FnFetcher, HarvestOptions, Harvester, IdentifierBatch, WriteMode};
/// use polars::prelude::*;
///
/// # async fn example() -> harvest::Result<()> {
/// let fetcher = FnFetcher::new("demo", |group: Vec<harvest::Identifier>| async move {
///     let tickers: Vec<String> = group.iter().map(ToString::to_string).collect();
///     DataFrame::new(vec![Column::new("ticker".into(), tickers)])
///         .map_err(|e| harvest::HarvestError::Parse(e.to_string()))
/// });
///
/// let harvester = Harvester::new(fetcher)
///     .with_options(HarvestOptions::default().with_mode(WriteMode::Append).with_batch_size(50));
/// let mut sink = CsvSink::new("out.csv");
/// let report = harvester.run(&IdentifierBatch::new(["MSFT", "IBM"])?, &mut sink).await?;
/// println!("{} rows, {} failed", report.rows_written, report.failed_identifiers().len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Harvester<F> {
    fetcher: F,
    options: HarvestOptions,
}

impl<F: PageFetcher> Harvester<F> {
    /// Create a harvester with default options.
    #[must_use]
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            options: HarvestOptions::default(),
        }
    }

    /// Replace the options.
    #[must_use]
    pub fn with_options(mut self, options: HarvestOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the options.
    #[must_use]
    pub const fn options(&self) -> &HarvestOptions {
        &self.options
    }

    /// Returns the fetcher.
    #[must_use]
    pub const fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Runs the loop over `batch`, writing into `sink`.
    ///
    /// # Errors
    /// Returns an error for invalid options, a failure to resolve the
    /// universe, a sink that cannot be read or prepared, a projection naming a
    /// column a page lacks, or any write failure. Fetch failures are not
    /// errors; they are listed in [`RunReport::failed`].
    #[instrument(skip_all, fields(fetcher = self.fetcher.name(), mode = ?self.options.mode))]
    pub async fn run<S>(&self, batch: &IdentifierBatch, sink: &mut S) -> Result<RunReport>
    where
        S: Sink + ?Sized,
    {
        let mut report = RunReport::new(Utc::now());
        self.options.validate()?;

        let requested = self.resolve(batch).await?;
        report.requested = requested.len();

        let pending = if self.options.mode == WriteMode::Append {
            let existing = sink
                .existing_identifiers(&self.options.identifier_column)
                .await?;
            let pending: Vec<Identifier> = requested
                .into_iter()
                .filter(|id| !existing.contains(id))
                .collect();
            report.skipped = report.requested - pending.len();
            info!(
                sink = %sink.describe(),
                existing = existing.len(),
                skipped = report.skipped,
                remaining = pending.len(),
                "Resuming"
            );
            pending
        } else {
            requested
        };

        sink.prepare(self.options.mode).await?;

        let groups = pending.len().div_ceil(self.options.batch_size);
        for (index, group) in pending.chunks(self.options.batch_size).enumerate() {
            report.groups += 1;
            debug!(group = index + 1, of = groups, size = group.len(), "Fetching group");

            match self.fetcher.fetch(group).await {
                Ok(page) => self.persist(page, sink, &mut report).await?,
                Err(e) if group.len() == 1 => {
                    warn!(group = index + 1, identifier = %group[0], error = %e, "Fetch failed");
                    report.failed.push(FailedGroup {
                        identifiers: group.to_vec(),
                        error: e,
                    });
                }
                Err(e) => {
                    warn!(
                        group = index + 1,
                        first = %group[0],
                        size = group.len(),
                        error = %e,
                        "Group fetch failed, retrying identifiers one at a time"
                    );
                    for id in group {
                        match self.fetcher.fetch(std::slice::from_ref(id)).await {
                            Ok(page) => self.persist(page, sink, &mut report).await?,
                            Err(e) => {
                                warn!(identifier = %id, error = %e, "Fetch failed");
                                report.failed.push(FailedGroup {
                                    identifiers: vec![id.clone()],
                                    error: e,
                                });
                            }
                        }
                    }
                }
            }
        }

        sink.finish().await?;
        report.finished_at = Utc::now();

        info!(
            requested = report.requested,
            skipped = report.skipped,
            groups = report.groups,
            rows = report.rows_written,
            failed_groups = report.failed.len(),
            elapsed_ms = report.elapsed().num_milliseconds(),
            "Run finished"
        );
        Ok(report)
    }

    /// Runs the loop into memory and returns every row as one frame.
    ///
    /// The write mode is irrelevant here; the frame holds only this run's
    /// rows. An empty result is an empty frame.
    ///
    /// # Errors
    /// Same as [`run`](Self::run).
    pub async fn collect(&self, batch: &IdentifierBatch) -> Result<(DataFrame, RunReport)> {
        let mut sink = MemorySink::new();
        let report = self.run(batch, &mut sink).await?;
        Ok((sink.into_frame()?, report))
    }

    /// Projects and writes one fetched page. Empty pages are counted, not written.
    async fn persist<S>(&self, page: DataFrame, sink: &mut S, report: &mut RunReport) -> Result<()>
    where
        S: Sink + ?Sized,
    {
        if page.height() == 0 {
            report.empty_groups += 1;
            return Ok(());
        }

        let page = match &self.options.columns {
            Some(columns) => project(&page, columns)?,
            None => page,
        };

        let rows = sink.write(&page).await?;
        report.rows_written += rows;
        debug!(rows, "Wrote page");
        Ok(())
    }

    async fn resolve(&self, batch: &IdentifierBatch) -> Result<Vec<Identifier>> {
        match batch {
            IdentifierBatch::Explicit(ids) => Ok(ids.as_slice().to_vec()),
            IdentifierBatch::Universe => {
                let mut seen = HashSet::new();
                let mut ids = self.fetcher.universe().await?;
                ids.retain(|id| seen.insert(id.clone()));
                info!(companies = ids.len(), "Resolved universe");
                Ok(ids)
            }
        }
    }
}
