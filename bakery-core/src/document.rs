//! Schema-flexible sale documents written by older versions of the back office.
//!
//! Older records spell fields in camelCase, keep the current due under one of
//! `currDue`, `currentDue` or `due`, and store amounts either as JSON numbers or
//! as strings. [`SaleDocument::normalize`] is the single place those variants are
//! folded into a typed [`DailySaleRecord`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::money::{lenient_decimal, round_money};
use crate::sale::total_amount;
use crate::{DailySaleRecord, DueBalances, SaleCategory, SaleDate, SalesmanId};

/// Reasons a legacy document cannot become a record.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum NormalizeError {
    #[error("document has no salesman id")]
    MissingSalesman,
    #[error("document has no date")]
    MissingDate,
    #[error("document date `{0}` is not a calendar date")]
    InvalidDate(String),
    #[error("document id `{0}` is not a uuid")]
    InvalidId(String),
}

/// Loosely typed sale record as found in old exports and legacy table columns.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleDocument {
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    #[serde(default, alias = "salesman", alias = "salesman_id")]
    pub salesman_id: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub categories: Vec<SaleCategory>,
    #[serde(default)]
    pub deposit: Option<Value>,
    #[serde(default, alias = "prev_due")]
    pub prev_due: Option<Value>,
    #[serde(default, alias = "total_amount")]
    pub total_amount: Option<Value>,
    #[serde(default, alias = "total_due")]
    pub total_due: Option<Value>,
    #[serde(default, alias = "curr_due")]
    pub curr_due: Option<Value>,
    #[serde(default, alias = "current_due")]
    pub current_due: Option<Value>,
    #[serde(default)]
    pub due: Option<Value>,
}

impl SaleDocument {
    /// The current due with the legacy fallback chain applied.
    pub fn resolved_curr_due(&self) -> Option<Decimal> {
        [&self.curr_due, &self.current_due, &self.due]
            .into_iter()
            .find_map(|field| field.as_ref().and_then(lenient_decimal))
    }

    /// Fold this document into a typed record.
    ///
    /// Missing or non-numeric amounts read as zero. A missing `totalAmount` is
    /// derived from the categories and a missing `totalDue` from
    /// `totalAmount + prevDue`. Stored due values are kept as found, so a stale
    /// chain stays visible to the audit.
    pub fn normalize(self) -> Result<DailySaleRecord, NormalizeError> {
        let salesman_id = self
            .salesman_id
            .as_deref()
            .and_then(SalesmanId::parse)
            .ok_or(NormalizeError::MissingSalesman)?;
        let raw_date = self
            .date
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .ok_or(NormalizeError::MissingDate)?;
        let date =
            SaleDate::parse(raw_date).map_err(|_| NormalizeError::InvalidDate(raw_date.into()))?;
        let id = match self.id.as_deref() {
            Some(raw) => Uuid::parse_str(raw).map_err(|_| NormalizeError::InvalidId(raw.into()))?,
            None => Uuid::new_v4(),
        };

        let amount = |field: &Option<Value>| field.as_ref().and_then(lenient_decimal);
        let deposit = amount(&self.deposit).unwrap_or(Decimal::ZERO);
        let prev_due = amount(&self.prev_due).unwrap_or(Decimal::ZERO);
        let total = amount(&self.total_amount).unwrap_or_else(|| total_amount(&self.categories));
        let total_due = amount(&self.total_due).unwrap_or(total.saturating_add(prev_due));
        let curr_due = self.resolved_curr_due().unwrap_or(Decimal::ZERO);

        Ok(DailySaleRecord {
            id,
            salesman_id,
            date,
            categories: self.categories,
            deposit,
            balances: DueBalances {
                prev_due: round_money(prev_due),
                total_amount: round_money(total),
                total_due: round_money(total_due),
                curr_due: round_money(curr_due),
            },
        })
    }
}

impl From<&DailySaleRecord> for SaleDocument {
    fn from(record: &DailySaleRecord) -> Self {
        let text = |value: Decimal| Some(Value::String(value.to_string()));
        Self {
            id: Some(record.id.to_string()),
            salesman_id: Some(record.salesman_id.to_string()),
            date: Some(record.date.to_string()),
            categories: record.categories.clone(),
            deposit: text(record.deposit),
            prev_due: text(record.balances.prev_due),
            total_amount: text(record.balances.total_amount),
            total_due: text(record.balances.total_due),
            curr_due: text(record.balances.curr_due),
            current_due: None,
            due: None,
        }
    }
}
