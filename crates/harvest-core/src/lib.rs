#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/harvest/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for incremental company data downloads.
//!
//! This crate provides the foundational abstractions shared by the sinks, the
//! API client and the download loop:
//!
//! - [`PageFetcher`](fetch::PageFetcher) - Source of pages for a group of identifiers
//! - [`Sink`](sink::Sink) - Durable append target for pages
//! - [`Backoff`](retry::Backoff) - Retry strategy for remote calls
//! - [`ClientConfig`](config::ClientConfig) - Credentials, proxy and toggles
//! - [`IdentifierBatch`](types::IdentifierBatch) - Companies a run targets

/// Client configuration resolved from the environment.
pub mod config;
/// Error types for harvest operations.
pub mod error;
/// Fetcher trait for pulling pages from a data source.
pub mod fetch;
/// Page schema and JSON record conversion.
pub mod page;
/// Fiscal period definitions.
pub mod period;
/// Retry with exponential backoff.
pub mod retry;
/// Sink trait for persisting pages.
pub mod sink;
/// Core data types (Identifier, IdentifierBatch, WriteMode).
pub mod types;

// Re-export commonly used items at crate root
pub use config::{ClientConfig, Credentials};
pub use error::{HarvestError, Result};
pub use fetch::{FnFetcher, PageFetcher};
pub use page::{PageSchema, concat_frames, records_to_frame};
pub use period::{FiscalPeriod, PeriodType};
pub use retry::{Backoff, IsRetryable, RetryConfig};
pub use sink::Sink;
pub use types::{ExplicitBatch, Identifier, IdentifierBatch, IdentifierScheme, WriteMode};
