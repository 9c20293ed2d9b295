//! In-memory sink implementation.

use async_trait::async_trait;
use harvest_core::page::identifiers_in_column;
use harvest_core::{
    HarvestError, Identifier, PageSchema, Result, Sink, WriteMode, concat_frames,
};
use polars::prelude::DataFrame;
use std::collections::HashSet;
use tracing::{debug, instrument};

/// Sink that keeps every page in memory.
///
/// Used to collect a run into a single [`DataFrame`] and in tests. The first
/// page fixes the schema (names and dtypes).
#[derive(Debug, Default)]
pub struct MemorySink {
    frames: Vec<DataFrame>,
    schema: Option<PageSchema>,
}

impl MemorySink {
    /// Create an empty memory sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pages written so far.
    #[must_use]
    pub fn frames(&self) -> &[DataFrame] {
        &self.frames
    }

    /// Returns the total number of rows held.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.frames.iter().map(DataFrame::height).sum()
    }

    /// Returns true if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Concatenates every page into one frame.
    ///
    /// # Errors
    /// Returns an error if the frames cannot be stacked.
    pub fn to_frame(&self) -> Result<DataFrame> {
        concat_frames(&self.frames)
    }

    /// Consumes the sink and concatenates every page into one frame.
    ///
    /// # Errors
    /// Returns an error if the frames cannot be stacked.
    pub fn into_frame(self) -> Result<DataFrame> {
        concat_frames(&self.frames)
    }
}

#[async_trait]
impl Sink for MemorySink {
    fn describe(&self) -> String {
        format!("memory ({} pages)", self.frames.len())
    }

    async fn existing_identifiers(&mut self, column: &str) -> Result<HashSet<Identifier>> {
        let mut found = HashSet::new();
        for frame in &self.frames {
            found.extend(identifiers_in_column(frame, column)?);
        }
        Ok(found)
    }

    #[instrument(skip(self))]
    async fn prepare(&mut self, mode: WriteMode) -> Result<()> {
        match mode {
            WriteMode::Create if !self.frames.is_empty() => {
                Err(HarvestError::SinkExists(self.describe()))
            }
            WriteMode::Overwrite => {
                self.frames.clear();
                self.schema = None;
                debug!("Memory sink cleared");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn write(&mut self, page: &DataFrame) -> Result<usize> {
        if page.height() == 0 {
            return Ok(0);
        }

        match &self.schema {
            Some(schema) => schema.check_exact(page)?,
            None => self.schema = Some(PageSchema::from_frame(page)),
        }

        self.frames.push(page.clone());
        Ok(page.height())
    }

    async fn finish(&mut self) -> Result<()> {
        debug!(pages = self.frames.len(), rows = self.rows(), "Memory sink finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[tokio::test]
    async fn test_memory_sink_collects_pages() {
        let mut sink = MemorySink::new();
        sink.prepare(WriteMode::Create).await.unwrap();

        let a = df!("ticker" => ["MSFT"], "value" => [1.0]).unwrap();
        let b = df!("ticker" => ["AAPL", "IBM"], "value" => [2.0, 3.0]).unwrap();
        assert_eq!(sink.write(&a).await.unwrap(), 1);
        assert_eq!(sink.write(&b).await.unwrap(), 2);
        sink.finish().await.unwrap();

        assert_eq!(sink.rows(), 3);
        let ids = sink.existing_identifiers("ticker").await.unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(sink.into_frame().unwrap().height(), 3);
    }

    #[tokio::test]
    async fn test_memory_sink_rejects_schema_change() {
        let mut sink = MemorySink::new();
        let a = df!("ticker" => ["MSFT"], "value" => [1.0]).unwrap();
        let b = df!("ticker" => ["AAPL"], "other" => [2.0]).unwrap();
        sink.write(&a).await.unwrap();
        assert!(matches!(
            sink.write(&b).await,
            Err(HarvestError::SchemaMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_memory_sink_modes() {
        let mut sink = MemorySink::new();
        let a = df!("ticker" => ["MSFT"]).unwrap();
        sink.write(&a).await.unwrap();

        assert!(matches!(
            sink.prepare(WriteMode::Create).await,
            Err(HarvestError::SinkExists(_))
        ));

        sink.prepare(WriteMode::Append).await.unwrap();
        assert_eq!(sink.rows(), 1);

        sink.prepare(WriteMode::Overwrite).await.unwrap();
        assert!(sink.is_empty());
        assert_eq!(sink.to_frame().unwrap().height(), 0);
    }
}
