#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/harvest/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Sink implementations for harvest.
//!
//! This crate provides implementations of the [`Sink`] trait from `harvest-core`:
//!
//! - [`CsvSink`] - Single delimited file with a header written once
//! - [`PartitionedParquetSink`] - Parquet files grouped by a partition column (requires `parquet` feature)
//! - [`MemorySink`] - In-memory frames

/// Delimited file sink.
pub mod csv;
/// In-memory sink.
pub mod memory;

/// Partitioned Parquet sink.
#[cfg(feature = "parquet")]
pub mod parquet;

// Re-export the trait for convenience
pub use harvest_core::Sink;

// Re-export implementations
pub use csv::CsvSink;
pub use memory::MemorySink;

#[cfg(feature = "parquet")]
pub use parquet::PartitionedParquetSink;

use harvest_core::HarvestError;

/// Maps a polars failure during a sink operation.
pub(crate) fn sink_error(e: impl std::fmt::Display) -> HarvestError {
    HarvestError::Sink(e.to_string())
}
