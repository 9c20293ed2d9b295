//! Fetcher trait for pulling pages from a data source.
//!
//! - [`PageFetcher`] - Maps a group of identifiers to one page of rows
//! - [`FnFetcher`] - Adapts an async closure into a [`PageFetcher`]

use async_trait::async_trait;
use polars::prelude::DataFrame;
use std::fmt;
use std::future::Future;

use crate::{
    error::{HarvestError, Result},
    types::Identifier,
};

/// Source of pages for a download run.
///
/// One call to [`fetch`](PageFetcher::fetch) produces one page for a group of
/// identifiers. Errors are reported per group; retrying transient failures is
/// the fetcher's own business.
#[async_trait]
pub trait PageFetcher: Send + Sync + fmt::Debug {
    /// Returns the name of this fetcher (used in logs).
    fn name(&self) -> &str;

    /// Fetches one page of rows for a group of identifiers.
    async fn fetch(&self, group: &[Identifier]) -> Result<DataFrame>;

    /// Lists every identifier the source knows about.
    ///
    /// Used to resolve [`IdentifierBatch::Universe`](crate::IdentifierBatch::Universe).
    /// The default implementation reports that the source has no universe.
    async fn universe(&self) -> Result<Vec<Identifier>> {
        Err(HarvestError::NotSupported(format!(
            "{} cannot list the identifier universe",
            self.name()
        )))
    }
}

/// A [`PageFetcher`] backed by an async closure.
///
/// The closure receives an owned copy of each group.
///
/// ```
/// use harvest_core::{FnFetcher, PageFetcher};
/// use polars::prelude::*;
///
/// let fetcher = FnFetcher::new("demo", |group: Vec<harvest_core::Identifier>| async move {
///     let tickers: Vec<String> = group.iter().map(|id| id.to_string()).collect();
///     DataFrame::new(vec![Column::new("ticker".into(), tickers)])
///         .map_err(|e| harvest_core::HarvestError::Parse(e.to_string()))
/// });
/// assert_eq!(fetcher.name(), "demo");
/// ```
pub struct FnFetcher<F> {
    name: String,
    f: F,
}

impl<F> FnFetcher<F> {
    /// Wraps a closure under the given name.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> fmt::Debug for FnFetcher<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFetcher")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> PageFetcher for FnFetcher<F>
where
    F: Fn(Vec<Identifier>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<DataFrame>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, group: &[Identifier]) -> Result<DataFrame> {
        (self.f)(group.to_vec()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[tokio::test]
    async fn test_fn_fetcher_passes_group() {
        let fetcher = FnFetcher::new("echo", |group: Vec<Identifier>| async move {
            let tickers: Vec<String> = group.iter().map(ToString::to_string).collect();
            DataFrame::new(vec![Column::new("ticker".into(), tickers)])
                .map_err(|e| HarvestError::Parse(e.to_string()))
        });

        let group = vec![Identifier::new("msft").unwrap(), Identifier::new("ibm").unwrap()];
        let page = fetcher.fetch(&group).await.unwrap();
        assert_eq!(page.height(), 2);
    }

    #[tokio::test]
    async fn test_default_universe_not_supported() {
        let fetcher = FnFetcher::new("empty", |_group: Vec<Identifier>| async move {
            Ok(DataFrame::empty())
        });
        assert!(matches!(
            fetcher.universe().await,
            Err(HarvestError::NotSupported(_))
        ));
    }
}
