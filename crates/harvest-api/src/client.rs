//! HTTP client for the data API.

use harvest_core::{Backoff, ClientConfig, Credentials, HarvestError, Identifier, Result};
use polars::prelude::DataFrame;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::query::CompaniesQuery;

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("harvest/", env!("CARGO_PKG_VERSION"));

/// Longest response excerpt kept in an error message.
const MAX_ERROR_BODY: usize = 512;

/// Client for the data API.
///
/// Holds the resolved [`ClientConfig`] and a [`Backoff`] derived from it.
/// Cloning is cheap; clones share the connection pool and configuration.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    config: Arc<ClientConfig>,
    backoff: Backoff,
}

impl ApiClient {
    /// Create a client from a configuration.
    ///
    /// # Errors
    /// Returns [`HarvestError::Config`] if the proxy URL is invalid or the
    /// HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .danger_accept_invalid_certs(!config.ssl_verify);

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| HarvestError::Config(format!("Invalid proxy {proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| HarvestError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(client, config))
    }

    /// Create a client around a pre-configured reqwest client.
    ///
    /// Timeout, proxy and TLS settings of `config` are not applied; the
    /// caller's client is used as is.
    #[must_use]
    pub fn with_client(client: reqwest::Client, config: ClientConfig) -> Self {
        let backoff = Backoff::new(config.retry.clone());
        Self {
            client,
            config: Arc::new(config),
            backoff,
        }
    }

    /// Replace the backoff strategy, e.g. to change the give-up predicate.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the backoff strategy.
    #[must_use]
    pub const fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// POST a JSON body to an endpoint and decode the JSON answer.
    ///
    /// Failed calls are retried according to the client's [`Backoff`].
    ///
    /// # Errors
    /// - [`HarvestError::AuthenticationFailed`] on 401 and 403
    /// - [`HarvestError::IdentifierNotFound`] on 404
    /// - [`HarvestError::RateLimited`] on 429
    /// - [`HarvestError::Http`] on any other non-success status
    /// - [`HarvestError::Timeout`] / [`HarvestError::Network`] on transport failures
    /// - [`HarvestError::Parse`] if the answer is not the expected JSON
    pub async fn post_json<B, T>(&self, endpoint: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned + Send,
    {
        let url = self.config.endpoint_url(endpoint);
        self.backoff.run(|| self.post_once(&url, body)).await
    }

    async fn post_once<B, T>(&self, url: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned + Send,
    {
        debug!(url, "Posting request");
        let start = Instant::now();

        let response = self
            .authorize(self.client.post(url))
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let response = check_status(response).await?;
        let decoded = response
            .json::<T>()
            .await
            .map_err(|e| HarvestError::Parse(format!("Failed to decode response from {url}: {e}")))?;

        debug!(url, elapsed_ms = start.elapsed().as_millis() as u64, "Request completed");
        Ok(decoded)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.credentials {
            Some(Credentials::Bearer { token }) => request.bearer_auth(token),
            Some(Credentials::Basic { username, password }) => {
                request.basic_auth(username, Some(password))
            }
            None => request,
        }
    }

    /// Raw company records matching a query.
    ///
    /// # Errors
    /// Returns a validation error for a malformed query, or any
    /// [`post_json`](Self::post_json) error.
    pub async fn company_records(&self, query: &CompaniesQuery) -> Result<Vec<Value>> {
        let body = query.to_body()?;
        self.post_json("companies", &body).await
    }

    /// Company details as a frame, one row per company.
    ///
    /// # Errors
    /// Same as [`company_records`](Self::company_records), plus
    /// [`HarvestError::SchemaMismatch`] if records disagree on their fields.
    pub async fn companies(&self, query: &CompaniesQuery) -> Result<DataFrame> {
        let records = self.company_records(query).await?;
        harvest_core::records_to_frame(&records)
    }

    /// Tickers of the companies matching a query.
    ///
    /// Companies without a ticker are skipped.
    ///
    /// # Errors
    /// Same as [`company_records`](Self::company_records).
    pub async fn tickers(&self, query: &CompaniesQuery) -> Result<Vec<Identifier>> {
        let records = self.company_records(query).await?;
        let tickers: Vec<Identifier> = records
            .iter()
            .filter_map(|r| r.get("ticker").and_then(Value::as_str))
            .filter_map(|t| Identifier::new(t).ok())
            .collect();

        if tickers.len() < records.len() {
            debug!(
                companies = records.len(),
                tickers = tickers.len(),
                "Skipped companies without a ticker"
            );
        }
        Ok(tickers)
    }
}

fn transport_error(e: reqwest::Error) -> HarvestError {
    if e.is_timeout() {
        HarvestError::Timeout(e.to_string())
    } else {
        HarvestError::Network(e.to_string())
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(HarvestError::AuthenticationFailed(format!("HTTP {status} from {url}")))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            warn!(url = %url, ?retry_after, "Rate limited");
            Err(HarvestError::RateLimited { retry_after })
        }
        StatusCode::NOT_FOUND => {
            let message = error_body(response).await;
            warn!(url = %url, "Not found");
            Err(HarvestError::IdentifierNotFound(if message.is_empty() {
                url
            } else {
                format!("{url}: {message}")
            }))
        }
        _ => {
            let message = error_body(response).await;
            warn!(url = %url, status = status.as_u16(), "Request failed");
            Err(HarvestError::Http {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Response body of a failed call, cut to [`MAX_ERROR_BODY`] bytes.
async fn error_body(response: Response) -> String {
    let mut message = response.text().await.unwrap_or_default();
    if message.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }
    message
}
