//! Request bodies understood by the data API.
//!
//! Most endpoints take the same envelope, [`QueryParams`], made of a company
//! selector, a period selector and endpoint specific page parameters. The
//! `companies` endpoint takes its own body, built by [`CompaniesQuery`].

use chrono::NaiveDate;
use harvest_core::{FiscalPeriod, HarvestError, Identifier, PeriodType, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use std::str::FromStr;

/// Which companies a query covers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompaniesParameters {
    /// Explicit tickers or CIKs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_identifiers: Option<Vec<Identifier>>,

    /// Every company the API knows about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entire_universe: Option<bool>,
}

impl CompaniesParameters {
    /// Selects an explicit list of companies.
    #[must_use]
    pub fn identifiers(ids: &[Identifier]) -> Self {
        Self {
            company_identifiers: Some(ids.to_vec()),
            entire_universe: None,
        }
    }

    /// Selects every company.
    #[must_use]
    pub const fn universe() -> Self {
        Self {
            company_identifiers: None,
            entire_universe: Some(true),
        }
    }
}

/// Inclusive date range.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    /// First day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    /// Last day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

/// Which reporting periods a query covers.
///
/// Unset fields are left out of the request body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodParameters {
    /// Fiscal year.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// Period within `year`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<FiscalPeriod>,
    /// Granularity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_type: Option<PeriodType>,
    /// Restrict to filings inside a date range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    /// Last fiscal year of a span starting at `year`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_year: Option<i32>,
    /// Last period of a span starting at `period`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_period: Option<FiscalPeriod>,
    /// Every period on record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_history: Option<bool>,
    /// Only data updated on this day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_date: Option<NaiveDate>,
    /// Interpret `year`/`period` as fiscal rather than calendar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_fiscal_period: Option<bool>,
    /// A single filing by accession id.
    #[serde(
        default,
        rename = "accessionID",
        skip_serializing_if = "Option::is_none"
    )]
    pub accession_id: Option<i64>,
    /// A single filing by filing id.
    #[serde(default, rename = "filingID", skip_serializing_if = "Option::is_none")]
    pub filing_id: Option<i64>,
    /// Every revision of each value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_modifications: Option<bool>,
    /// Only the first reported value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_originally_reported: Option<bool>,
    /// Only the most recent reported value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub most_recent_only: Option<bool>,
}

impl PeriodParameters {
    /// Sets the fiscal year.
    #[must_use]
    pub const fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    /// Sets the period within the year.
    #[must_use]
    pub const fn with_period(mut self, period: FiscalPeriod) -> Self {
        self.period = Some(period);
        self
    }

    /// Sets the granularity.
    #[must_use]
    pub const fn with_period_type(mut self, period_type: PeriodType) -> Self {
        self.period_type = Some(period_type);
        self
    }

    /// Asks for every period on record.
    #[must_use]
    pub const fn with_all_history(mut self) -> Self {
        self.all_history = Some(true);
        self
    }

    /// Asks only for data updated on `date`.
    #[must_use]
    pub const fn with_update_date(mut self, date: NaiveDate) -> Self {
        self.update_date = Some(date);
        self
    }

    /// Checks that the combination of fields makes sense.
    ///
    /// # Errors
    /// Returns [`HarvestError::InvalidParameter`] if `all_history` is combined
    /// with an explicit year, or an end year precedes the start year.
    pub fn validate(&self) -> Result<()> {
        if self.all_history == Some(true) && self.year.is_some() {
            return Err(HarvestError::InvalidParameter(
                "all_history cannot be combined with year".to_string(),
            ));
        }
        if let (Some(start), Some(end)) = (self.year, self.end_year)
            && end < start
        {
            return Err(HarvestError::InvalidParameter(format!(
                "end_year {end} precedes year {start}"
            )));
        }
        Ok(())
    }
}

/// Request envelope shared by most endpoints.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams<P = Value> {
    /// Company selector.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub companies_parameters: Option<CompaniesParameters>,
    /// Period selector.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_parameters: Option<PeriodParameters>,
    /// Endpoint specific parameters.
    pub page_parameters: P,
}

/// Market index usable as a company selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketIndex {
    /// S&P 500.
    #[serde(rename = "SP500")]
    Sp500,
    /// Dow Jones Industrial Average.
    #[serde(rename = "DJIA")]
    Djia,
}

impl MarketIndex {
    /// Returns the code the API expects.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sp500 => "SP500",
            Self::Djia => "DJIA",
        }
    }
}

impl fmt::Display for MarketIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketIndex {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SP500" => Ok(Self::Sp500),
            "DJIA" => Ok(Self::Djia),
            other => Err(HarvestError::InvalidParameter(format!(
                "index must be either 'SP500' or 'DJIA', got '{other}'"
            ))),
        }
    }
}

/// Body of a `companies` lookup.
///
/// Exactly one selector is sent. When several are set the precedence is
/// index, SIC codes, NAICS codes, identifiers, universe.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompaniesQuery {
    /// Standard Industrial Classification codes.
    pub sic_codes: Vec<u32>,
    /// North American Industry Classification System codes.
    pub naics_codes: Vec<u32>,
    /// Index membership.
    pub index: Option<MarketIndex>,
    /// Explicit companies.
    pub company_identifiers: Vec<Identifier>,
    /// Every company.
    pub entire_universe: bool,
    /// Add the most recent filing dates to each company.
    pub include_most_recent_filing_dates: bool,
}

impl CompaniesQuery {
    /// Every company the API knows about.
    #[must_use]
    pub fn entire_universe() -> Self {
        Self {
            entire_universe: true,
            ..Self::default()
        }
    }

    /// Members of a market index.
    #[must_use]
    pub fn index(index: MarketIndex) -> Self {
        Self {
            index: Some(index),
            ..Self::default()
        }
    }

    /// Explicit companies.
    #[must_use]
    pub fn identifiers(ids: impl IntoIterator<Item = Identifier>) -> Self {
        Self {
            company_identifiers: ids.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Companies with any of these SIC codes.
    #[must_use]
    pub fn sic_codes(codes: impl IntoIterator<Item = u32>) -> Self {
        Self {
            sic_codes: codes.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Companies with any of these NAICS codes.
    #[must_use]
    pub fn naics_codes(codes: impl IntoIterator<Item = u32>) -> Self {
        Self {
            naics_codes: codes.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Also return the most recent filing dates.
    #[must_use]
    pub const fn with_filing_dates(mut self) -> Self {
        self.include_most_recent_filing_dates = true;
        self
    }

    /// Checks the selectors.
    ///
    /// # Errors
    /// Returns [`HarvestError::InvalidParameter`] if no selector is set, or if
    /// the entire universe is combined with another selector.
    pub fn validate(&self) -> Result<()> {
        let narrowed = self.index.is_some()
            || !self.sic_codes.is_empty()
            || !self.naics_codes.is_empty()
            || !self.company_identifiers.is_empty();

        if !narrowed && !self.entire_universe {
            return Err(HarvestError::InvalidParameter(
                "Must supply SIC codes, NAICS codes, index, company identifiers or entire universe"
                    .to_string(),
            ));
        }
        if narrowed && self.entire_universe {
            return Err(HarvestError::InvalidParameter(
                "entire universe cannot be combined with other selectors".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the request body.
    ///
    /// # Errors
    /// Returns the [`validate`](Self::validate) error.
    pub fn to_body(&self) -> Result<Value> {
        self.validate()?;

        let mut body = Map::new();
        if let Some(index) = self.index {
            body.insert("index".to_string(), json!(index));
        } else if !self.sic_codes.is_empty() {
            body.insert("SICCodes".to_string(), json!(self.sic_codes));
        } else if !self.naics_codes.is_empty() {
            body.insert("NAICSCodes".to_string(), json!(self.naics_codes));
        } else if !self.company_identifiers.is_empty() {
            body.insert(
                "companyIdentifiers".to_string(),
                json!(self.company_identifiers),
            );
        } else {
            body.insert("universe".to_string(), Value::Bool(true));
        }
        body.insert(
            "includeMostRecentFilingExtras".to_string(),
            Value::Bool(self.include_most_recent_filing_dates),
        );

        Ok(Value::Object(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<Identifier> {
        values.iter().map(|v| Identifier::new(v).unwrap()).collect()
    }

    #[test]
    fn test_envelope_skips_unset_fields() {
        let params = QueryParams {
            companies_parameters: Some(CompaniesParameters::identifiers(&ids(&["msft", "ibm"]))),
            period_parameters: Some(
                PeriodParameters::default()
                    .with_year(2023)
                    .with_period(FiscalPeriod::Q1)
                    .with_period_type(PeriodType::Quarterly),
            ),
            page_parameters: json!({"metrics": ["revenue"]}),
        };

        let body = serde_json::to_value(&params).unwrap();
        assert_eq!(
            body,
            json!({
                "companiesParameters": {"companyIdentifiers": ["MSFT", "IBM"]},
                "periodParameters": {"year": 2023, "period": 1, "periodType": "quarterly"},
                "pageParameters": {"metrics": ["revenue"]}
            })
        );
    }

    #[test]
    fn test_period_parameter_names() {
        let params = PeriodParameters {
            accession_id: Some(42),
            update_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            ..PeriodParameters::default()
        };
        let body = serde_json::to_value(&params).unwrap();
        assert_eq!(body, json!({"accessionID": 42, "updateDate": "2024-03-01"}));
    }

    #[test]
    fn test_period_validation() {
        assert!(PeriodParameters::default().with_year(2020).validate().is_ok());
        assert!(
            PeriodParameters::default()
                .with_year(2020)
                .with_all_history()
                .validate()
                .is_err()
        );
        let reversed = PeriodParameters {
            year: Some(2022),
            end_year: Some(2020),
            ..PeriodParameters::default()
        };
        assert!(reversed.validate().is_err());
    }

    #[test]
    fn test_companies_query_validation() {
        assert!(CompaniesQuery::default().validate().is_err());
        assert!(CompaniesQuery::entire_universe().validate().is_ok());

        let mixed = CompaniesQuery {
            entire_universe: true,
            index: Some(MarketIndex::Djia),
            ..CompaniesQuery::default()
        };
        assert!(matches!(
            mixed.validate(),
            Err(HarvestError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_companies_body_precedence() {
        let query = CompaniesQuery {
            index: Some(MarketIndex::Sp500),
            sic_codes: vec![1200],
            ..CompaniesQuery::default()
        };
        assert_eq!(
            query.to_body().unwrap(),
            json!({"index": "SP500", "includeMostRecentFilingExtras": false})
        );

        let body = CompaniesQuery::sic_codes([1100, 1200])
            .with_filing_dates()
            .to_body()
            .unwrap();
        assert_eq!(
            body,
            json!({"SICCodes": [1100, 1200], "includeMostRecentFilingExtras": true})
        );

        let body = CompaniesQuery::entire_universe().to_body().unwrap();
        assert_eq!(body["universe"], json!(true));
    }

    #[test]
    fn test_market_index_parsing() {
        assert_eq!("sp500".parse::<MarketIndex>().unwrap(), MarketIndex::Sp500);
        assert_eq!("DJIA".parse::<MarketIndex>().unwrap(), MarketIndex::Djia);
        assert!("NASDAQ".parse::<MarketIndex>().is_err());
    }
}
