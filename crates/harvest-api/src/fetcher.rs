//! [`PageFetcher`] over a single API endpoint.

use async_trait::async_trait;
use harvest_core::{HarvestError, Identifier, PageFetcher, Result, records_to_frame};
use polars::prelude::DataFrame;
use serde_json::Value;
use tracing::debug;

use crate::client::ApiClient;
use crate::query::{CompaniesParameters, CompaniesQuery, PeriodParameters, QueryParams};

/// Fetches one page per group by posting the query envelope to an endpoint.
///
/// Each call sends the group as `companiesParameters`, the configured period
/// selector and page parameters, and turns the returned list of JSON records
/// into a page.
#[derive(Debug, Clone)]
pub struct EndpointFetcher {
    client: ApiClient,
    endpoint: String,
    period: Option<PeriodParameters>,
    page: Value,
    universe: CompaniesQuery,
}

impl EndpointFetcher {
    /// Create a fetcher posting to `endpoint` with empty page parameters.
    #[must_use]
    pub fn new(client: ApiClient, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            period: None,
            page: Value::Object(Default::default()),
            universe: CompaniesQuery::entire_universe(),
        }
    }

    /// Set the period selector sent with every call.
    #[must_use]
    pub fn with_period(mut self, period: PeriodParameters) -> Self {
        self.period = Some(period);
        self
    }

    /// Set the endpoint specific page parameters.
    #[must_use]
    pub fn with_page_parameters(mut self, page: Value) -> Self {
        self.page = page;
        self
    }

    /// Set the company lookup used to resolve the universe.
    #[must_use]
    pub fn with_universe(mut self, query: CompaniesQuery) -> Self {
        self.universe = query;
        self
    }

    /// Returns the endpoint name.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Builds the request body for a group.
    #[must_use]
    pub fn query(&self, group: &[Identifier]) -> QueryParams {
        QueryParams {
            companies_parameters: Some(CompaniesParameters::identifiers(group)),
            period_parameters: self.period.clone(),
            page_parameters: self.page.clone(),
        }
    }
}

#[async_trait]
impl PageFetcher for EndpointFetcher {
    fn name(&self) -> &str {
        &self.endpoint
    }

    async fn fetch(&self, group: &[Identifier]) -> Result<DataFrame> {
        if let Some(period) = &self.period {
            period.validate()?;
        }

        let answer: Value = self
            .client
            .post_json(&self.endpoint, &self.query(group))
            .await?;

        let records = match answer {
            Value::Array(records) => records,
            Value::Null => Vec::new(),
            other => {
                return Err(HarvestError::Parse(format!(
                    "Expected a list of records from {}, got {}",
                    self.endpoint,
                    json_kind(&other)
                )));
            }
        };

        debug!(
            endpoint = %self.endpoint,
            group = group.len(),
            records = records.len(),
            "Fetched records"
        );
        records_to_frame(&records)
    }

    async fn universe(&self) -> Result<Vec<Identifier>> {
        self.client.tickers(&self.universe).await
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
