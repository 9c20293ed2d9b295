//! Partitioned Parquet sink implementation.

use async_trait::async_trait;
use harvest_core::page::{column_names, identifiers_in_column};
use harvest_core::{
    HarvestError, Identifier, PageSchema, Result, Sink, WriteMode, concat_frames,
};
use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

use crate::sink_error;

/// Directory value used for rows whose partition value is null.
///
/// A real value spelled the same way is stored with its first byte escaped.
pub const NULL_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// Suffix of a part file still being written.
const PENDING_SUFFIX: &str = ".tmp";

/// Sink writing Parquet files grouped by the value of one column.
///
/// Rows are split by `partition_column` and each split is written to
/// `base_dir/<column>=<value>/part-<n>.parquet`. Values are percent-encoded.
/// The partition column lives in the directory name only; [`read_all`]
/// restores it as a string column.
///
/// Part numbers keep increasing within a partition so appends never replace
/// earlier files. Each part is written under a temporary name and renamed into
/// place once complete; leftovers of an interrupted write are removed before
/// the dataset is resumed. The first page (or the existing files) fixes the schema of
/// the remaining columns, names and dtypes.
///
/// [`read_all`]: PartitionedParquetSink::read_all
#[derive(Debug)]
pub struct PartitionedParquetSink {
    base_dir: PathBuf,
    partition_column: String,
    schema: Option<PageSchema>,
    next_part: HashMap<PathBuf, usize>,
}

/// One partition directory found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Decoded partition value, `None` for the null partition.
    pub value: Option<String>,
    /// Directory holding the partition's files.
    pub dir: PathBuf,
}

impl PartitionedParquetSink {
    /// Create a sink rooted at `base_dir`, partitioned by `partition_column`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>, partition_column: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            partition_column: partition_column.into(),
            schema: None,
            next_part: HashMap::new(),
        }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Returns the partition column.
    #[must_use]
    pub fn partition_column(&self) -> &str {
        &self.partition_column
    }

    fn dir_prefix(&self) -> String {
        format!("{}=", urlencoding::encode(&self.partition_column))
    }

    fn partition_dir(&self, value: Option<&str>) -> PathBuf {
        let encoded = match value {
            None => NULL_PARTITION.to_string(),
            Some(v) if v == NULL_PARTITION => format!("%5F{}", &v[1..]),
            Some(v) => urlencoding::encode(v).into_owned(),
        };
        self.base_dir
            .join(format!("{}{}", self.dir_prefix(), encoded))
    }

    /// Lists the partition directories currently on disk, sorted by path.
    ///
    /// # Errors
    /// Returns an error if the base directory cannot be read.
    pub fn partitions(&self) -> Result<Vec<Partition>> {
        if !self.base_dir.is_dir() {
            return Ok(Vec::new());
        }

        let prefix = self.dir_prefix();
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(raw) = name.strip_prefix(&prefix) else {
                continue;
            };
            let value = if raw == NULL_PARTITION {
                None
            } else {
                Some(
                    urlencoding::decode(raw)
                        .map_err(sink_error)?
                        .into_owned(),
                )
            };
            found.push(Partition {
                value,
                dir: entry.path(),
            });
        }

        found.sort_by(|a, b| a.dir.cmp(&b.dir));
        Ok(found)
    }

    /// Lists the Parquet part files of one partition directory, in part order.
    fn part_files(dir: &Path) -> Result<Vec<(usize, PathBuf)>> {
        let mut parts = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let index = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("part-"))
                .and_then(|n| n.strip_suffix(".parquet"))
                .and_then(|n| n.parse::<usize>().ok());
            if let Some(index) = index {
                parts.push((index, path));
            }
        }
        parts.sort();
        Ok(parts)
    }

    /// Removes part files left behind by an interrupted write, and partition
    /// directories that hold nothing else.
    fn discard_pending(&self) -> Result<()> {
        for partition in self.partitions()? {
            for entry in fs::read_dir(&partition.dir)? {
                let path = entry?.path();
                let pending = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(PENDING_SUFFIX));
                if pending {
                    warn!(file = %path.display(), "Removing incomplete part file");
                    fs::remove_file(&path)?;
                }
            }
            if fs::read_dir(&partition.dir)?.next().is_none() {
                fs::remove_dir(&partition.dir)?;
            }
        }
        Ok(())
    }

    fn read_file(path: &Path) -> Result<DataFrame> {
        let file = File::open(path)?;
        ParquetReader::new(file).finish().map_err(sink_error)
    }

    /// Reads one partition, without the partition column.
    ///
    /// # Errors
    /// Returns an error if a file cannot be read.
    pub fn read_partition(&self, value: Option<&str>) -> Result<DataFrame> {
        let dir = self.partition_dir(value);
        if !dir.is_dir() {
            return Ok(DataFrame::empty());
        }

        let frames = Self::part_files(&dir)?
            .into_iter()
            .map(|(_, path)| Self::read_file(&path))
            .collect::<Result<Vec<_>>>()?;
        concat_frames(&frames)
    }

    /// Reads every partition back into one frame.
    ///
    /// The partition column is appended as the last column, typed as string.
    ///
    /// # Errors
    /// Returns an error if a file cannot be read or the files disagree on schema.
    pub fn read_all(&self) -> Result<DataFrame> {
        let mut frames = Vec::new();
        for partition in self.partitions()? {
            for (_, path) in Self::part_files(&partition.dir)? {
                let mut frame = Self::read_file(&path)?;
                let key = Column::new(
                    PlSmallStr::from(self.partition_column.as_str()),
                    vec![partition.value.clone(); frame.height()],
                );
                frame.with_column(key).map_err(sink_error)?;
                frames.push(frame);
            }
        }
        concat_frames(&frames)
    }

    /// Loads the schema of the first existing file, if any.
    fn load_schema(&mut self) -> Result<()> {
        for partition in self.partitions()? {
            if let Some((_, path)) = Self::part_files(&partition.dir)?.into_iter().next() {
                let frame = Self::read_file(&path)?;
                self.schema = Some(PageSchema::from_frame(&frame));
                return Ok(());
            }
        }
        Ok(())
    }

    /// Returns the next free part number in a partition directory.
    fn claim_part(&mut self, dir: &Path) -> Result<usize> {
        let next = match self.next_part.get(dir) {
            Some(n) => *n,
            None if dir.is_dir() => Self::part_files(dir)?
                .last()
                .map_or(0, |(index, _)| index + 1),
            None => 0,
        };
        self.next_part.insert(dir.to_path_buf(), next + 1);
        Ok(next)
    }

    fn has_data(&self) -> Result<bool> {
        if !self.base_dir.is_dir() {
            return Ok(false);
        }
        Ok(fs::read_dir(&self.base_dir)?.next().is_some())
    }
}

#[async_trait]
impl Sink for PartitionedParquetSink {
    fn describe(&self) -> String {
        format!(
            "parquet dataset {} partitioned by {}",
            self.base_dir.display(),
            self.partition_column
        )
    }

    #[instrument(skip(self))]
    async fn existing_identifiers(&mut self, column: &str) -> Result<HashSet<Identifier>> {
        self.discard_pending()?;
        let partitions = self.partitions()?;

        if column == self.partition_column {
            return Ok(partitions
                .into_iter()
                .filter_map(|p| p.value)
                .filter_map(|v| Identifier::new(v).ok())
                .collect());
        }

        let mut found = HashSet::new();
        for partition in partitions {
            for (_, path) in Self::part_files(&partition.dir)? {
                let frame = Self::read_file(&path)?;
                if self.schema.is_none() {
                    self.schema = Some(PageSchema::from_frame(&frame));
                }
                found.extend(identifiers_in_column(&frame, column)?);
            }
        }

        debug!(identifiers = found.len(), "Read identifiers from existing dataset");
        Ok(found)
    }

    #[instrument(skip(self))]
    async fn prepare(&mut self, mode: WriteMode) -> Result<()> {
        self.next_part.clear();

        match mode {
            WriteMode::Create => {
                if self.has_data()? {
                    return Err(HarvestError::SinkExists(self.describe()));
                }
                self.schema = None;
            }
            WriteMode::Append => {
                self.discard_pending()?;
                if self.schema.is_none() {
                    self.load_schema()?;
                }
            }
            WriteMode::Overwrite => {
                if self.base_dir.exists() {
                    fs::remove_dir_all(&self.base_dir)?;
                    info!(dir = %self.base_dir.display(), "Removed existing dataset");
                }
                self.schema = None;
            }
        }

        fs::create_dir_all(&self.base_dir)?;
        Ok(())
    }

    async fn write(&mut self, page: &DataFrame) -> Result<usize> {
        if page.height() == 0 {
            return Ok(0);
        }

        let key = self.partition_column.clone();
        if page.column(&key).is_err() {
            let mut expected = vec![key.clone()];
            if let Some(schema) = &self.schema {
                expected.extend(schema.names());
            }
            return Err(HarvestError::schema_mismatch(expected, column_names(page)));
        }

        let values = page.drop(&key).map_err(sink_error)?;
        match &self.schema {
            Some(schema) => schema.check_exact(&values)?,
            None => self.schema = Some(PageSchema::from_frame(&values)),
        }

        let mut written = 0;
        for part in page.partition_by_stable([key.as_str()], true).map_err(sink_error)? {
            let key_values = part
                .column(&key)
                .map_err(sink_error)?
                .as_materialized_series()
                .cast(&DataType::String)
                .map_err(sink_error)?;
            let value = key_values.str().map_err(sink_error)?.get(0).map(str::to_string);

            let dir = self.partition_dir(value.as_deref());
            fs::create_dir_all(&dir)?;
            let index = self.claim_part(&dir)?;
            let path = dir.join(format!("part-{index}.parquet"));
            let pending = dir.join(format!("part-{index}.parquet{PENDING_SUFFIX}"));

            let mut data = part.drop(&key).map_err(sink_error)?;
            let mut file = File::create(&pending)?;
            ParquetWriter::new(&mut file)
                .finish(&mut data)
                .map_err(sink_error)?;
            file.sync_all()?;
            fs::rename(&pending, &path)?;

            debug!(
                partition = value.as_deref().unwrap_or(NULL_PARTITION),
                rows = data.height(),
                file = %path.display(),
                "Wrote partition file"
            );
            written += data.height();
        }

        Ok(written)
    }

    async fn finish(&mut self) -> Result<()> {
        debug!(
            dir = %self.base_dir.display(),
            partitions = self.next_part.len(),
            "Parquet sink finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn page() -> DataFrame {
        df!(
            "ticker" => ["MSFT", "AAPL", "MSFT", "IBM"],
            "fiscal_year" => ["2022", "2023", "2023", "2022"],
            "value" => [1.0, 2.0, 3.0, 4.0]
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_one_directory_per_partition_value() {
        let dir = TempDir::new().unwrap();
        let mut sink = PartitionedParquetSink::new(dir.path().join("ds"), "fiscal_year");

        sink.prepare(WriteMode::Create).await.unwrap();
        assert_eq!(sink.write(&page()).await.unwrap(), 4);
        sink.finish().await.unwrap();

        let partitions = sink.partitions().unwrap();
        let values: Vec<Option<String>> = partitions.iter().map(|p| p.value.clone()).collect();
        assert_eq!(
            values,
            vec![Some("2022".to_string()), Some("2023".to_string())]
        );

        let y2022 = sink.read_partition(Some("2022")).unwrap();
        assert_eq!(y2022.height(), 2);
        assert!(y2022.column("fiscal_year").is_err());
        let tickers = identifiers_in_column(&y2022, "ticker").unwrap();
        assert!(tickers.contains(&Identifier::new("IBM").unwrap()));
        assert!(!tickers.contains(&Identifier::new("AAPL").unwrap()));

        let all = sink.read_all().unwrap();
        assert_eq!(all.height(), 4);
        assert_eq!(
            column_names(&all),
            vec!["ticker", "value", "fiscal_year"]
        );
    }

    #[tokio::test]
    async fn test_appends_add_part_files() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("ds");

        let mut first = PartitionedParquetSink::new(&base, "ticker");
        first.prepare(WriteMode::Overwrite).await.unwrap();
        first.write(&page()).await.unwrap();

        let mut second = PartitionedParquetSink::new(&base, "ticker");
        let existing = second.existing_identifiers("ticker").await.unwrap();
        assert_eq!(existing.len(), 3);

        second.prepare(WriteMode::Append).await.unwrap();
        let more = df!(
            "ticker" => ["MSFT"],
            "fiscal_year" => ["2024"],
            "value" => [5.0]
        )
        .unwrap();
        second.write(&more).await.unwrap();

        let msft_dir = base.join("ticker=MSFT");
        let parts = PartitionedParquetSink::part_files(&msft_dir).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(second.read_partition(Some("MSFT")).unwrap().height(), 3);
    }

    #[tokio::test]
    async fn test_resume_after_interrupted_write() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("ds");

        let mut first = PartitionedParquetSink::new(&base, "ticker");
        first.prepare(WriteMode::Overwrite).await.unwrap();
        first.write(&page()).await.unwrap();

        // A crash mid-write leaves only the temporary file behind.
        fs::write(base.join("ticker=MSFT/part-1.parquet.tmp"), b"PAR1\0\0").unwrap();
        fs::create_dir_all(base.join("ticker=GE")).unwrap();
        fs::write(base.join("ticker=GE/part-0.parquet.tmp"), b"PAR1").unwrap();

        let mut second = PartitionedParquetSink::new(&base, "ticker");
        let existing = second.existing_identifiers("ticker").await.unwrap();
        assert_eq!(existing.len(), 3);
        assert!(!existing.contains(&Identifier::new("GE").unwrap()));
        assert!(!base.join("ticker=GE").exists());
        assert!(!base.join("ticker=MSFT/part-1.parquet.tmp").exists());

        second.prepare(WriteMode::Append).await.unwrap();
        let more = df!(
            "ticker" => ["GE", "MSFT"],
            "fiscal_year" => ["2023", "2024"],
            "value" => [6.0, 5.0]
        )
        .unwrap();
        second.write(&more).await.unwrap();

        assert_eq!(second.read_all().unwrap().height(), 6);
        let leftovers = fs::read_dir(base.join("ticker=MSFT"))
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with(PENDING_SUFFIX)
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_literal_null_marker_kept_apart_from_nulls() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("ds");
        let mut sink = PartitionedParquetSink::new(&base, "ticker");
        sink.prepare(WriteMode::Create).await.unwrap();

        let page = df!(
            "ticker" => [Some(NULL_PARTITION), None, Some(NULL_PARTITION)],
            "value" => [1.0, 2.0, 3.0]
        )
        .unwrap();
        sink.write(&page).await.unwrap();

        let values: HashSet<Option<String>> =
            sink.partitions().unwrap().into_iter().map(|p| p.value).collect();
        assert_eq!(
            values,
            HashSet::from([None, Some(NULL_PARTITION.to_string())])
        );
        assert_eq!(sink.read_partition(None).unwrap().height(), 1);
        assert_eq!(sink.read_partition(Some(NULL_PARTITION)).unwrap().height(), 2);

        let all = sink.read_all().unwrap();
        assert_eq!(all.column("ticker").unwrap().null_count(), 1);
    }

    #[tokio::test]
    async fn test_schema_and_partition_column_checks() {
        let dir = TempDir::new().unwrap();
        let mut sink = PartitionedParquetSink::new(dir.path().join("ds"), "fiscal_year");
        sink.prepare(WriteMode::Create).await.unwrap();
        sink.write(&page()).await.unwrap();

        let missing_key = df!("ticker" => ["MSFT"], "value" => [1.0]).unwrap();
        assert!(matches!(
            sink.write(&missing_key).await,
            Err(HarvestError::SchemaMismatch { .. })
        ));

        let retyped = df!(
            "ticker" => ["MSFT"],
            "fiscal_year" => ["2022"],
            "value" => [1i64]
        )
        .unwrap();
        assert!(matches!(
            sink.write(&retyped).await,
            Err(HarvestError::SchemaMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_modes_and_encoding() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("ds");
        let mut sink = PartitionedParquetSink::new(&base, "ticker");
        sink.prepare(WriteMode::Create).await.unwrap();

        let odd = df!("ticker" => [Some("BRK/B"), None], "value" => [1.0, 2.0]).unwrap();
        sink.write(&odd).await.unwrap();
        assert!(base.join("ticker=BRK%2FB").is_dir());
        assert!(base.join(format!("ticker={NULL_PARTITION}")).is_dir());
        assert_eq!(sink.read_partition(None).unwrap().height(), 1);

        assert!(matches!(
            sink.prepare(WriteMode::Create).await,
            Err(HarvestError::SinkExists(_))
        ));

        sink.prepare(WriteMode::Overwrite).await.unwrap();
        assert!(sink.partitions().unwrap().is_empty());
        assert_eq!(sink.read_all().unwrap().height(), 0);
    }
}
