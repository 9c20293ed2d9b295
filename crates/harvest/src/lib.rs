#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/harvest/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Incremental download of company data into durable sinks.
//!
//! This crate ties together the core types, the sinks and the API client:
//!
//! - [`Harvester`] - Runs a [`PageFetcher`] over a batch and writes to a [`Sink`]
//! - [`RunReport`] - Counts, timings and the groups that failed
//! - [`init_tracing`] - Log output for applications
//!
//! # Example
//!
//! ```rust,ignore
//! use harvest::{Harvester, HarvestOptions, IdentifierBatch, PartitionedParquetSink, WriteMode};
//!
//! let harvester = Harvester::new(fetcher)
//!     .with_options(HarvestOptions::default().with_mode(WriteMode::Append));
//! let mut sink = PartitionedParquetSink::new("data/fundamentals", "ticker");
//! let report = harvester.run(&IdentifierBatch::new(["MSFT", "AAPL"])?, &mut sink).await?;
//! ```

// Core types and traits
pub use harvest_core::*;

// Sinks
pub use harvest_sink::{CsvSink, MemorySink};

#[cfg(feature = "parquet")]
pub use harvest_sink::PartitionedParquetSink;

// API client
#[cfg(feature = "api")]
pub use harvest_api::{
    ApiClient, CompaniesParameters, CompaniesQuery, DateRange, EndpointFetcher, MarketIndex,
    PeriodParameters, QueryParams,
};

mod harvester;
mod report;
mod telemetry;

pub use harvester::{DEFAULT_BATCH_SIZE, DEFAULT_IDENTIFIER_COLUMN, HarvestOptions, Harvester};
pub use report::{FailedGroup, RunReport};
pub use telemetry::{init_tracing, init_tracing_from_config};
