use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const CANONICAL_FORMAT: &str = "%Y-%m-%d";

/// Error returned when a string cannot be read as a sale date.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("invalid sale date `{input}`")]
pub struct DateParseError {
    input: String,
}

impl DateParseError {
    pub fn input(&self) -> &str {
        &self.input
    }
}

/// Calendar day a sale record belongs to.
///
/// Always rendered as `YYYY-MM-DD`. Parsing accepts the canonical form, unpadded
/// `YYYY-M-D`, and RFC 3339 timestamps. A timestamp keeps the calendar day of its
/// own offset instead of being shifted to UTC.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SaleDate(NaiveDate);

impl SaleDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn parse(input: &str) -> Result<Self, DateParseError> {
        let trimmed = input.trim();
        let error = || DateParseError {
            input: input.to_string(),
        };
        if trimmed.is_empty() {
            return Err(error());
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, CANONICAL_FORMAT) {
            return Ok(Self(date));
        }
        if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(Self(timestamp.date_naive()));
        }
        Err(error())
    }

    pub fn naive(self) -> NaiveDate {
        self.0
    }

    /// The calendar day before this one.
    pub fn previous_day(self) -> Option<Self> {
        self.0.checked_sub_days(Days::new(1)).map(Self)
    }

    pub fn next_day(self) -> Option<Self> {
        self.0.checked_add_days(Days::new(1)).map(Self)
    }

    pub fn to_canonical(self) -> String {
        self.0.format(CANONICAL_FORMAT).to_string()
    }
}

impl From<NaiveDate> for SaleDate {
    fn from(value: NaiveDate) -> Self {
        Self(value)
    }
}

impl fmt::Display for SaleDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(CANONICAL_FORMAT))
    }
}

impl FromStr for SaleDate {
    type Err = DateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for SaleDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SaleDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
