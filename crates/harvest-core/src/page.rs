//! Pages and their shape.
//!
//! A page is the [`DataFrame`] returned by one fetch call. This module holds
//! the helpers that build pages from JSON records, pin down a page's schema,
//! and read identifiers back out of persisted rows.

use polars::prelude::*;
use serde_json::Value;
use std::collections::HashSet;

use crate::error::{HarvestError, Result};
use crate::types::Identifier;

/// Ordered column names and dtypes established by the first page of a sink.
#[derive(Clone, Debug, PartialEq)]
pub struct PageSchema {
    columns: Vec<(String, DataType)>,
}

impl PageSchema {
    /// Captures the schema of a frame.
    #[must_use]
    pub fn from_frame(df: &DataFrame) -> Self {
        Self {
            columns: df
                .get_columns()
                .iter()
                .map(|c| (c.name().to_string(), c.dtype().clone()))
                .collect(),
        }
    }

    /// Builds a schema that only knows column names; every dtype is `String`.
    ///
    /// Used for delimited files, where types are not stored.
    #[must_use]
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: names
                .into_iter()
                .map(|n| (n.into(), DataType::String))
                .collect(),
        }
    }

    /// Column names in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Returns true if the schema has a column with this name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    /// Checks that a frame has the same column names in the same order.
    ///
    /// # Errors
    /// Returns [`HarvestError::SchemaMismatch`] on any difference.
    pub fn check_names(&self, df: &DataFrame) -> Result<()> {
        let found = column_names(df);
        if found == self.names() {
            Ok(())
        } else {
            Err(HarvestError::schema_mismatch(self.names(), found))
        }
    }

    /// Checks that a frame has the same column names and dtypes.
    ///
    /// # Errors
    /// Returns [`HarvestError::SchemaMismatch`] on any difference; dtypes are
    /// included in the reported columns.
    pub fn check_exact(&self, df: &DataFrame) -> Result<()> {
        let other = Self::from_frame(df);
        if other == *self {
            Ok(())
        } else {
            Err(HarvestError::schema_mismatch(
                self.describe(),
                other.describe(),
            ))
        }
    }

    fn describe(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|(n, t)| format!("{n}: {t}"))
            .collect()
    }
}

/// Returns a frame's column names in order.
#[must_use]
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|n| n.to_string())
        .collect()
}

/// Keeps only the requested columns, in the requested order.
///
/// # Errors
/// Returns [`HarvestError::SchemaMismatch`] if any requested column is missing.
pub fn project(df: &DataFrame, columns: &[String]) -> Result<DataFrame> {
    let present = column_names(df);
    if let Some(missing) = columns.iter().find(|c| !present.contains(c)) {
        tracing::debug!(column = %missing, "Projected column missing from page");
        return Err(HarvestError::schema_mismatch(columns, present));
    }

    df.select(columns.iter().map(String::as_str))
        .map_err(|e| HarvestError::Parse(e.to_string()))
}

/// Collects the distinct identifiers found in one column of a frame.
///
/// Values are cast to strings and normalized like [`Identifier::new`]; nulls
/// and blanks are ignored.
///
/// # Errors
/// Returns [`HarvestError::SchemaMismatch`] if the column does not exist.
pub fn identifiers_in_column(df: &DataFrame, column: &str) -> Result<HashSet<Identifier>> {
    let col = df
        .column(column)
        .map_err(|_| HarvestError::schema_mismatch([column], column_names(df)))?;

    let series = col
        .as_materialized_series()
        .cast(&DataType::String)
        .map_err(|e| HarvestError::Parse(e.to_string()))?;
    let values = series
        .str()
        .map_err(|e| HarvestError::Parse(e.to_string()))?;

    Ok(values
        .into_iter()
        .flatten()
        .filter_map(|v| Identifier::new(v).ok())
        .collect())
}

/// Stacks frames with identical schemas into one.
///
/// An empty input yields an empty frame.
///
/// # Errors
/// Returns [`HarvestError::Parse`] if the frames cannot be combined.
pub fn concat_frames(frames: &[DataFrame]) -> Result<DataFrame> {
    if frames.is_empty() {
        return Ok(DataFrame::empty());
    }

    concat(
        frames.iter().map(|df| df.clone().lazy()).collect::<Vec<_>>(),
        UnionArgs::default(),
    )
    .map_err(|e| HarvestError::Parse(e.to_string()))?
    .collect()
    .map_err(|e| HarvestError::Parse(e.to_string()))
}

/// Converts a list of JSON records into a page.
///
/// Every record must be an object with exactly the same keys as the first.
/// Column dtypes are inferred from the non-null values: all booleans become
/// `Boolean`, all integers `Int64`, any other numbers `Float64`, and anything
/// else `String`.
///
/// # Errors
/// Returns [`HarvestError::Parse`] for non-object records and
/// [`HarvestError::SchemaMismatch`] when records disagree on their keys.
pub fn records_to_frame(records: &[Value]) -> Result<DataFrame> {
    let Some(first) = records.first() else {
        return Ok(DataFrame::empty());
    };

    let first = first
        .as_object()
        .ok_or_else(|| HarvestError::Parse(format!("Expected a JSON object, got {first}")))?;
    let keys: Vec<&String> = first.keys().collect();

    let mut objects = Vec::with_capacity(records.len());
    for record in records {
        let obj = record
            .as_object()
            .ok_or_else(|| HarvestError::Parse(format!("Expected a JSON object, got {record}")))?;
        if obj.len() != keys.len() || !keys.iter().all(|k| obj.contains_key(*k)) {
            return Err(HarvestError::schema_mismatch(
                keys.iter(),
                obj.keys(),
            ));
        }
        objects.push(obj);
    }

    let columns = keys
        .iter()
        .map(|key| {
            let values: Vec<&Value> = objects.iter().map(|o| &o[key.as_str()]).collect();
            infer_column(key, &values)
        })
        .collect::<Vec<_>>();

    DataFrame::new(columns).map_err(|e| HarvestError::Parse(e.to_string()))
}

fn infer_column(name: &str, values: &[&Value]) -> Column {
    let name = PlSmallStr::from(name);
    let non_null = || values.iter().filter(|v| !v.is_null());

    if non_null().count() > 0 && non_null().all(|v| v.is_boolean()) {
        let data: Vec<Option<bool>> = values.iter().map(|v| v.as_bool()).collect();
        return Column::new(name, data);
    }

    if non_null().count() > 0 && non_null().all(|v| v.is_i64()) {
        let data: Vec<Option<i64>> = values.iter().map(|v| v.as_i64()).collect();
        return Column::new(name, data);
    }

    if non_null().count() > 0 && non_null().all(|v| v.is_number()) {
        let data: Vec<Option<f64>> = values.iter().map(|v| v.as_f64()).collect();
        return Column::new(name, data);
    }

    let data: Vec<Option<String>> = values
        .iter()
        .map(|v| match v {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
        .collect();
    Column::new(name, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_records_to_frame_infers_types() {
        let records = vec![
            json!({"ticker": "MSFT", "fiscal_year": 2023, "value": 1.5, "restated": false, "note": null}),
            json!({"ticker": "AAPL", "fiscal_year": 2022, "value": 2, "restated": true, "note": "x"}),
        ];
        let df = records_to_frame(&records).unwrap();

        assert_eq!(df.height(), 2);
        assert_eq!(df.column("ticker").unwrap().dtype(), &DataType::String);
        assert_eq!(df.column("fiscal_year").unwrap().dtype(), &DataType::Int64);
        assert_eq!(df.column("value").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("restated").unwrap().dtype(), &DataType::Boolean);
        assert_eq!(df.column("note").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn test_records_with_different_keys_rejected() {
        let records = vec![json!({"ticker": "MSFT", "value": 1}), json!({"ticker": "AAPL"})];
        assert!(matches!(
            records_to_frame(&records),
            Err(HarvestError::SchemaMismatch { .. })
        ));

        let not_object = vec![json!([1, 2, 3])];
        assert!(matches!(
            records_to_frame(&not_object),
            Err(HarvestError::Parse(_))
        ));
        assert_eq!(records_to_frame(&[]).unwrap().height(), 0);
    }

    #[test]
    fn test_schema_checks() {
        let df = df!("ticker" => ["MSFT"], "value" => [1.0]).unwrap();
        let schema = PageSchema::from_frame(&df);
        assert!(schema.check_exact(&df).is_ok());
        assert!(schema.check_names(&df).is_ok());
        assert!(schema.contains("value"));

        let reordered = df!("value" => [1.0], "ticker" => ["MSFT"]).unwrap();
        assert!(schema.check_names(&reordered).is_err());

        let retyped = df!("ticker" => ["MSFT"], "value" => [1i64]).unwrap();
        assert!(schema.check_names(&retyped).is_ok());
        assert!(schema.check_exact(&retyped).is_err());
    }

    #[test]
    fn test_identifiers_in_column() {
        let df = df!(
            "ticker" => [Some("msft"), Some("AAPL"), None, Some("MSFT")],
            "cik" => [789019i64, 320193, 1, 789019]
        )
        .unwrap();

        let tickers = identifiers_in_column(&df, "ticker").unwrap();
        assert_eq!(tickers.len(), 2);
        assert!(tickers.contains(&Identifier::new("MSFT").unwrap()));

        let ciks = identifiers_in_column(&df, "cik").unwrap();
        assert!(ciks.contains(&Identifier::new("0000320193").unwrap()));

        assert!(matches!(
            identifiers_in_column(&df, "missing"),
            Err(HarvestError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_concat_frames() {
        let a = df!("ticker" => ["MSFT"], "value" => [1.0]).unwrap();
        let b = df!("ticker" => ["AAPL", "IBM"], "value" => [2.0, 3.0]).unwrap();
        let combined = concat_frames(&[a, b]).unwrap();
        assert_eq!(combined.height(), 3);
        assert_eq!(concat_frames(&[]).unwrap().height(), 0);
    }

    #[test]
    fn test_project() {
        let df = df!("ticker" => ["MSFT"], "value" => [1.0], "extra" => [true]).unwrap();
        let projected = project(&df, &["value".to_string(), "ticker".to_string()]).unwrap();
        assert_eq!(column_names(&projected), vec!["value", "ticker"]);
        assert!(project(&df, &["nope".to_string()]).is_err());
    }
}
