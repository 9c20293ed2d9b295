//! Delimited file sink implementation.

use async_trait::async_trait;
use harvest_core::page::identifiers_in_column;
use harvest_core::{HarvestError, Identifier, PageSchema, Result, Sink, WriteMode};
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

use crate::sink_error;

/// Sink writing every page to one delimited file.
///
/// The header row is written exactly once, when the file is new or empty.
/// Every later page must carry the same columns in the same order. Each page
/// is encoded in memory, appended in one write and synced to disk before
/// [`write`](Sink::write) returns. A trailing line cut short by an
/// interrupted write is dropped before the file is resumed.
#[derive(Debug)]
pub struct CsvSink {
    path: PathBuf,
    separator: u8,
    header: Option<PageSchema>,
}

impl CsvSink {
    /// Create a sink for the file at `path` using `,` as separator.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            separator: b',',
            header: None,
        }
    }

    /// Use a different field separator (e.g. `b'\t'`).
    #[must_use]
    pub const fn with_separator(mut self, separator: u8) -> Self {
        self.separator = separator;
        self
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the file exists and holds at least one byte.
    fn has_data(&self) -> Result<bool> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len() > 0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Truncates the file after its last complete line.
    fn drop_partial_line(&self) -> Result<()> {
        if !self.has_data()? {
            return Ok(());
        }
        let bytes = fs::read(&self.path)?;
        if bytes.ends_with(b"\n") {
            return Ok(());
        }

        let keep = bytes.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
        warn!(
            path = %self.path.display(),
            dropped_bytes = bytes.len() - keep,
            "Dropping incomplete trailing line"
        );
        OpenOptions::new()
            .write(true)
            .open(&self.path)?
            .set_len(keep as u64)?;
        Ok(())
    }

    /// Read the file back with every column as a string.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn read(&self) -> Result<DataFrame> {
        if !self.has_data()? {
            return Ok(DataFrame::empty());
        }

        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .with_parse_options(CsvParseOptions::default().with_separator(self.separator))
            .try_into_reader_with_file_path(Some(self.path.clone()))
            .map_err(sink_error)?
            .finish()
            .map_err(sink_error)
    }

    /// Load the header of an existing file.
    fn load_header(&mut self) -> Result<()> {
        let existing = self.read()?;
        self.header = Some(header_of(&existing));
        Ok(())
    }
}

fn header_of(df: &DataFrame) -> PageSchema {
    PageSchema::from_names(df.get_column_names().into_iter().map(|n| n.to_string()))
}

#[async_trait]
impl Sink for CsvSink {
    fn describe(&self) -> String {
        format!("csv file {}", self.path.display())
    }

    #[instrument(skip(self))]
    async fn existing_identifiers(&mut self, column: &str) -> Result<HashSet<Identifier>> {
        self.drop_partial_line()?;
        if !self.has_data()? {
            return Ok(HashSet::new());
        }

        let existing = self.read()?;
        self.header = Some(header_of(&existing));

        let ids = identifiers_in_column(&existing, column)?;
        debug!(
            rows = existing.height(),
            identifiers = ids.len(),
            "Read identifiers from existing file"
        );
        Ok(ids)
    }

    #[instrument(skip(self))]
    async fn prepare(&mut self, mode: WriteMode) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        match mode {
            WriteMode::Create => {
                if self.has_data()? {
                    return Err(HarvestError::SinkExists(self.describe()));
                }
                self.header = None;
            }
            WriteMode::Append => {
                self.drop_partial_line()?;
                if self.has_data()? {
                    if self.header.is_none() {
                        self.load_header()?;
                    }
                } else {
                    self.header = None;
                }
            }
            WriteMode::Overwrite => {
                if self.path.exists() {
                    fs::remove_file(&self.path)?;
                    info!("Removed existing file");
                }
                self.header = None;
            }
        }

        Ok(())
    }

    async fn write(&mut self, page: &DataFrame) -> Result<usize> {
        if page.height() == 0 {
            return Ok(0);
        }

        let write_header = match &self.header {
            Some(header) => {
                header.check_names(page)?;
                false
            }
            None => true,
        };

        let mut encoded = Vec::new();
        let mut frame = page.clone();
        CsvWriter::new(&mut encoded)
            .include_header(write_header)
            .with_separator(self.separator)
            .finish(&mut frame)
            .map_err(sink_error)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&encoded)?;
        file.sync_data()?;

        if write_header {
            self.header = Some(PageSchema::from_frame(page));
        }

        debug!(rows = page.height(), header = write_header, "Appended page");
        Ok(page.height())
    }

    async fn finish(&mut self) -> Result<()> {
        debug!(path = %self.path.display(), "CSV sink finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn page(tickers: &[&str], values: &[f64]) -> DataFrame {
        df!("ticker" => tickers, "value" => values).unwrap()
    }

    fn header_count(path: &Path) -> usize {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .filter(|l| l.starts_with("ticker"))
            .count()
    }

    #[tokio::test]
    async fn test_header_written_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = CsvSink::new(&path);

        sink.prepare(WriteMode::Create).await.unwrap();
        sink.write(&page(&["MSFT"], &[1.0])).await.unwrap();
        sink.write(&page(&["AAPL", "IBM"], &[2.0, 3.0])).await.unwrap();
        sink.write(&page(&["GOOG"], &[4.0])).await.unwrap();
        sink.finish().await.unwrap();

        assert_eq!(header_count(&path), 1);
        assert_eq!(sink.read().unwrap().height(), 4);
    }

    #[tokio::test]
    async fn test_append_resumes_without_second_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        let mut first = CsvSink::new(&path);
        first.prepare(WriteMode::Overwrite).await.unwrap();
        first.write(&page(&["MSFT"], &[1.0])).await.unwrap();

        let mut second = CsvSink::new(&path);
        let existing = second.existing_identifiers("ticker").await.unwrap();
        assert!(existing.contains(&Identifier::new("msft").unwrap()));

        second.prepare(WriteMode::Append).await.unwrap();
        second.write(&page(&["AAPL"], &[2.0])).await.unwrap();

        assert_eq!(header_count(&path), 1);
        assert_eq!(second.read().unwrap().height(), 2);
    }

    #[tokio::test]
    async fn test_resume_drops_cut_off_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "ticker,value\nMSFT,1.0\nIBM,2.0\nGE,3").unwrap();

        let mut sink = CsvSink::new(&path);
        let existing = sink.existing_identifiers("ticker").await.unwrap();
        assert_eq!(existing.len(), 2);
        assert!(!existing.contains(&Identifier::new("GE").unwrap()));

        sink.prepare(WriteMode::Append).await.unwrap();
        sink.write(&page(&["GE"], &[3.5])).await.unwrap();

        let df = sink.read().unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(header_count(&path), 1);
        assert!(fs::read_to_string(&path).unwrap().ends_with("GE,3.5\n"));
    }

    #[tokio::test]
    async fn test_cut_off_header_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "tick").unwrap();

        let mut sink = CsvSink::new(&path);
        sink.prepare(WriteMode::Append).await.unwrap();
        sink.write(&page(&["MSFT"], &[1.0])).await.unwrap();

        assert_eq!(header_count(&path), 1);
        assert_eq!(sink.read().unwrap().height(), 1);
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = CsvSink::new(&path);

        sink.prepare(WriteMode::Create).await.unwrap();
        sink.write(&page(&["MSFT"], &[1.0])).await.unwrap();

        let other = df!("ticker" => ["AAPL"], "revenue" => [2.0]).unwrap();
        assert!(matches!(
            sink.write(&other).await,
            Err(HarvestError::SchemaMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_existing_file_without_identifier_column() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "cik,value\n320193,1.0\n").unwrap();

        let mut sink = CsvSink::new(&path);
        assert!(matches!(
            sink.existing_identifiers("ticker").await,
            Err(HarvestError::SchemaMismatch { .. })
        ));

        let ids = sink.existing_identifiers("cik").await.unwrap();
        assert!(ids.contains(&Identifier::new("0000320193").unwrap()));
    }

    #[tokio::test]
    async fn test_create_refuses_existing_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "ticker,value\nMSFT,1.0\n").unwrap();

        let mut sink = CsvSink::new(&path);
        assert!(matches!(
            sink.prepare(WriteMode::Create).await,
            Err(HarvestError::SinkExists(_))
        ));

        sink.prepare(WriteMode::Overwrite).await.unwrap();
        assert!(!path.exists());
        assert!(sink.existing_identifiers("ticker").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_custom_separator() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.tsv");
        let mut sink = CsvSink::new(&path).with_separator(b'\t');

        sink.prepare(WriteMode::Create).await.unwrap();
        sink.write(&page(&["MSFT"], &[1.5])).await.unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("ticker\tvalue"));
        assert_eq!(sink.read().unwrap().height(), 1);
    }
}
