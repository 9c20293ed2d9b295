#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/harvest/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! HTTP transport for the company data API.
//!
//! - [`ApiClient`] - JSON POST with credentials, proxy, timeout and backoff
//! - [`EndpointFetcher`] - A [`PageFetcher`](harvest_core::PageFetcher) over one endpoint
//! - [`QueryParams`] - The request envelope most endpoints take
//! - [`CompaniesQuery`] - Company universe lookups

/// API client.
pub mod client;
/// Page fetcher over one endpoint.
pub mod fetcher;
/// Request bodies.
pub mod query;

pub use client::{ApiClient, USER_AGENT};
pub use fetcher::EndpointFetcher;
pub use query::{
    CompaniesParameters, CompaniesQuery, DateRange, MarketIndex, PeriodParameters, QueryParams,
};
