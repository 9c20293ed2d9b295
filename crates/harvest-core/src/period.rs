//! Fiscal period definitions.
//!
//! This module defines [`PeriodType`] for the granularity of fundamental data
//! and [`FiscalPeriod`] for a specific period within a fiscal year.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Granularity of fundamental data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodType {
    /// Annual reporting periods.
    #[default]
    #[serde(rename = "annual")]
    Annual,
    /// Quarterly reporting periods.
    #[serde(rename = "quarterly")]
    Quarterly,
    /// Annual and quarterly periods together.
    #[serde(rename = "combined")]
    Combined,
    /// Trailing twelve months.
    #[serde(rename = "TTM")]
    TrailingTwelveMonths,
}

impl PeriodType {
    /// Returns true if this period type includes quarterly data.
    #[must_use]
    pub const fn includes_quarters(&self) -> bool {
        matches!(self, Self::Quarterly | Self::Combined)
    }
}

/// A fiscal period within a fiscal year, encoded as an integer on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", from = "i8")]
pub enum FiscalPeriod {
    /// Full year.
    Annual,
    /// First quarter.
    Q1,
    /// Second quarter.
    Q2,
    /// Third quarter.
    Q3,
    /// Fourth quarter.
    Q4,
    /// First half of the year.
    H1,
    /// First three quarters of the year.
    Q3Cumulative,
    /// Irregular period, e.g. eighteen months.
    Other,
    /// The period could not be determined when the data was loaded.
    Failure,
}

impl FiscalPeriod {
    /// Returns the quarter number (1-4) if this is a quarter.
    #[must_use]
    pub const fn quarter(&self) -> Option<u8> {
        match self {
            Self::Q1 => Some(1),
            Self::Q2 => Some(2),
            Self::Q3 => Some(3),
            Self::Q4 => Some(4),
            _ => None,
        }
    }

    /// Parses a period from a JSON value, accepting numbers or numeric strings.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().and_then(|n| i8::try_from(n).ok()).map(Self::from),
            Value::String(s) => s.trim().parse::<i8>().ok().map(Self::from),
            _ => None,
        }
    }
}

impl From<i8> for FiscalPeriod {
    /// Unknown codes map to [`FiscalPeriod::Other`].
    fn from(code: i8) -> Self {
        match code {
            0 => Self::Annual,
            1 => Self::Q1,
            2 => Self::Q2,
            3 => Self::Q3,
            4 => Self::Q4,
            5 => Self::H1,
            6 => Self::Q3Cumulative,
            -1 => Self::Failure,
            _ => Self::Other,
        }
    }
}

impl From<FiscalPeriod> for i8 {
    fn from(period: FiscalPeriod) -> Self {
        match period {
            FiscalPeriod::Annual => 0,
            FiscalPeriod::Q1 => 1,
            FiscalPeriod::Q2 => 2,
            FiscalPeriod::Q3 => 3,
            FiscalPeriod::Q4 => 4,
            FiscalPeriod::H1 => 5,
            FiscalPeriod::Q3Cumulative => 6,
            FiscalPeriod::Other => 9,
            FiscalPeriod::Failure => -1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&PeriodType::TrailingTwelveMonths).unwrap(),
            "\"TTM\""
        );
        assert_eq!(
            serde_json::from_str::<PeriodType>("\"quarterly\"").unwrap(),
            PeriodType::Quarterly
        );
        assert!(PeriodType::Combined.includes_quarters());
        assert!(!PeriodType::Annual.includes_quarters());
    }

    #[test]
    fn test_fiscal_period_codes() {
        assert_eq!(FiscalPeriod::from(3), FiscalPeriod::Q3);
        assert_eq!(FiscalPeriod::from(42), FiscalPeriod::Other);
        assert_eq!(i8::from(FiscalPeriod::Other), 9);
        assert_eq!(FiscalPeriod::Q2.quarter(), Some(2));
        assert_eq!(FiscalPeriod::Annual.quarter(), None);
        assert_eq!(
            FiscalPeriod::from_json(&serde_json::json!("4")),
            Some(FiscalPeriod::Q4)
        );
        assert_eq!(serde_json::to_string(&FiscalPeriod::H1).unwrap(), "5");
    }
}
