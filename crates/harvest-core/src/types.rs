//! Core data types for download runs.
//!
//! - [`Identifier`] - Company ticker or registry code
//! - [`IdentifierScheme`] - Which kind of code an identifier is
//! - [`IdentifierBatch`] - Deduplicated identifiers or the whole universe
//! - [`WriteMode`] - How a run treats data already in the sink

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{HarvestError, Result};

/// A company identifier: a ticker symbol or a numeric registry code (CIK).
///
/// Tickers are trimmed and uppercased. All-digit codes lose their leading
/// zeros so `"0000320193"` and `"320193"` are the same identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Creates a new identifier, normalizing its spelling.
    ///
    /// # Errors
    /// Returns [`HarvestError::InvalidParameter`] for a blank identifier.
    pub fn new(s: impl AsRef<str>) -> Result<Self> {
        let trimmed = s.as_ref().trim();
        if trimmed.is_empty() {
            return Err(HarvestError::InvalidParameter(
                "Empty company identifier".to_string(),
            ));
        }

        if trimmed.bytes().all(|b| b.is_ascii_digit()) {
            let stripped = trimmed.trim_start_matches('0');
            let code = if stripped.is_empty() { "0" } else { stripped };
            return Ok(Self(code.to_string()));
        }

        Ok(Self(trimmed.to_uppercase()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns which scheme this identifier belongs to.
    #[must_use]
    pub fn scheme(&self) -> IdentifierScheme {
        if self.0.bytes().all(|b| b.is_ascii_digit()) {
            IdentifierScheme::CentralIndexKey
        } else {
            IdentifierScheme::Ticker
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Identifier {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = HarvestError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for Identifier {
    type Error = HarvestError;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl From<u64> for Identifier {
    fn from(code: u64) -> Self {
        Self(code.to_string())
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

/// Kind of company identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentifierScheme {
    /// Exchange ticker symbol.
    #[serde(rename = "ticker")]
    Ticker,
    /// SEC Central Index Key.
    #[serde(rename = "CIK")]
    CentralIndexKey,
}

/// An ordered, duplicate-free, non-empty list of identifiers.
///
/// Only built through [`IdentifierBatch::new`] or
/// [`IdentifierBatch::from_identifiers`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExplicitBatch(Vec<Identifier>);

impl ExplicitBatch {
    /// Returns the identifiers in batch order.
    #[must_use]
    pub fn as_slice(&self) -> &[Identifier] {
        &self.0
    }

    /// Number of identifiers. Always at least one.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The set of companies a run targets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentifierBatch {
    /// An explicit list.
    Explicit(ExplicitBatch),
    /// Every company the data source knows about.
    Universe,
}

impl IdentifierBatch {
    /// Builds an explicit batch, dropping repeated identifiers.
    ///
    /// First occurrences keep their position.
    ///
    /// # Errors
    /// Returns [`HarvestError::InvalidParameter`] if the list is empty or any
    /// entry is blank.
    pub fn new<I, S>(identifiers: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parsed = identifiers
            .into_iter()
            .map(Identifier::new)
            .collect::<Result<Vec<_>>>()?;
        Self::from_identifiers(parsed)
    }

    /// Builds an explicit batch from already parsed identifiers.
    ///
    /// # Errors
    /// Returns [`HarvestError::InvalidParameter`] if the list is empty.
    pub fn from_identifiers(identifiers: Vec<Identifier>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(identifiers.len());
        let deduped: Vec<Identifier> = identifiers
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();

        if deduped.is_empty() {
            return Err(HarvestError::InvalidParameter(
                "Identifier batch is empty; use IdentifierBatch::Universe for all companies"
                    .to_string(),
            ));
        }

        Ok(Self::Explicit(ExplicitBatch(deduped)))
    }

    /// Returns true if this batch targets the whole universe.
    #[must_use]
    pub const fn is_universe(&self) -> bool {
        matches!(self, Self::Universe)
    }

    /// Returns the explicit identifiers, or `None` for the universe sentinel.
    #[must_use]
    pub fn identifiers(&self) -> Option<&[Identifier]> {
        match self {
            Self::Explicit(ids) => Some(ids.as_slice()),
            Self::Universe => None,
        }
    }
}

/// How a run treats data already present in the sink.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Start a fresh sink; fail if it already holds data.
    Create,
    /// Keep existing data and skip identifiers already present.
    Append,
    /// Discard existing data and start over.
    #[default]
    Overwrite,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_normalization() {
        assert_eq!(Identifier::new(" msft ").unwrap().as_str(), "MSFT");
        assert_eq!(Identifier::new("0000320193").unwrap().as_str(), "320193");
        assert_eq!(Identifier::new("000").unwrap().as_str(), "0");
        assert_eq!(
            Identifier::new("0000320193").unwrap(),
            Identifier::from(320_193)
        );
        assert!(Identifier::new("   ").is_err());
    }

    #[test]
    fn test_identifier_scheme() {
        assert_eq!(
            Identifier::new("AAPL").unwrap().scheme(),
            IdentifierScheme::Ticker
        );
        assert_eq!(
            Identifier::new("320193").unwrap().scheme(),
            IdentifierScheme::CentralIndexKey
        );
    }

    #[test]
    fn test_batch_dedup_keeps_order() {
        let batch = IdentifierBatch::new(["msft", "AAPL", "MSFT", "ibm", "aapl"]).unwrap();
        let ids: Vec<&str> = batch
            .identifiers()
            .unwrap()
            .iter()
            .map(Identifier::as_str)
            .collect();
        assert_eq!(ids, vec!["MSFT", "AAPL", "IBM"]);
        assert!(!batch.is_universe());
    }

    #[test]
    fn test_empty_batch_rejected() {
        let empty: Vec<&str> = Vec::new();
        assert!(matches!(
            IdentifierBatch::new(empty),
            Err(HarvestError::InvalidParameter(_))
        ));
        assert!(IdentifierBatch::Universe.identifiers().is_none());
    }

    #[test]
    fn test_explicit_payload_holds_invariant() {
        let msft = Identifier::new("MSFT").unwrap();
        let batch =
            IdentifierBatch::from_identifiers(vec![msft.clone(), msft.clone(), msft]).unwrap();
        let IdentifierBatch::Explicit(ids) = &batch else {
            panic!("expected an explicit batch");
        };
        assert_eq!(ids.len(), 1);
        assert!(!ids.is_empty());
        assert_eq!(ids.as_slice()[0].as_str(), "MSFT");
        assert!(IdentifierBatch::from_identifiers(Vec::new()).is_err());
    }

    #[test]
    fn test_identifier_serde() {
        let id: Identifier = serde_json::from_str("\"goog\"").unwrap();
        assert_eq!(id.as_str(), "GOOG");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"GOOG\"");
        assert!(serde_json::from_str::<Identifier>("\"\"").is_err());
    }

    #[test]
    fn test_write_mode_default() {
        assert_eq!(WriteMode::default(), WriteMode::Overwrite);
    }
}
