//! Sink trait for persisting fetched pages.
//!
//! This module defines the [`Sink`] trait that provides a unified interface
//! for durable append targets: delimited files, partitioned columnar file sets,
//! and in-memory buffers.

use async_trait::async_trait;
use polars::prelude::DataFrame;
use std::collections::HashSet;
use std::fmt::Debug;

use crate::{
    error::Result,
    types::{Identifier, WriteMode},
};

/// A durable destination that accumulates pages over a run.
///
/// A sink has a single writer for the duration of a run, so every method
/// takes `&mut self`. Once the schema of a sink is established, pages that
/// disagree with it are rejected with
/// [`HarvestError::SchemaMismatch`](crate::HarvestError::SchemaMismatch).
#[async_trait]
pub trait Sink: Send + Debug {
    /// Returns a short description of this sink (used in logs).
    fn describe(&self) -> String;

    /// Returns the identifiers already persisted in `column`.
    ///
    /// An empty or missing sink yields an empty set. Existing data without
    /// that column is a schema mismatch.
    async fn existing_identifiers(&mut self, column: &str) -> Result<HashSet<Identifier>>;

    /// Readies the sink for a run.
    ///
    /// - [`WriteMode::Create`] fails with
    ///   [`HarvestError::SinkExists`](crate::HarvestError::SinkExists) if data is present.
    /// - [`WriteMode::Append`] keeps existing data and its schema.
    /// - [`WriteMode::Overwrite`] discards existing data.
    async fn prepare(&mut self, mode: WriteMode) -> Result<()>;

    /// Appends a page. Returns the number of rows written.
    async fn write(&mut self, page: &DataFrame) -> Result<usize>;

    /// Flushes anything buffered. Called once at the end of a run.
    async fn finish(&mut self) -> Result<()>;
}
