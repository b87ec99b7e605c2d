use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::{deserialize_lenient, round_money};
use crate::SaleDate;

/// Identifier of a salesman. Never empty once constructed through [`SalesmanId::parse`].
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SalesmanId(String);

impl SalesmanId {
    /// Trim and validate a raw identifier. Returns `None` when nothing is left.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for SalesmanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SalesmanId {
    fn from(value: &str) -> Self {
        Self(value.trim().to_string())
    }
}

impl FromStr for SalesmanId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| "salesman id must not be empty".to_string())
    }
}

/// Directory entry for a salesman.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Salesman {
    pub id: SalesmanId,
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Salesman {
    pub fn new(id: SalesmanId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            active: true,
        }
    }
}

/// One itemized sale line for a day.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SaleCategory {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub total: Decimal,
}

impl SaleCategory {
    pub fn new(name: impl Into<String>, total: Decimal) -> Self {
        Self {
            name: name.into(),
            total,
        }
    }
}

/// Sum of the day's category totals, rounded to cents.
///
/// A total that would overflow the running sum counts as zero, like any other
/// unusable amount.
pub fn total_amount(categories: &[SaleCategory]) -> Decimal {
    let sum = categories.iter().fold(Decimal::ZERO, |sum, category| {
        sum.checked_add(category.total).unwrap_or(sum)
    });
    round_money(sum)
}

/// The four derived balance fields stored on every record.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DueBalances {
    pub prev_due: Decimal,
    pub total_amount: Decimal,
    pub total_due: Decimal,
    pub curr_due: Decimal,
}

impl DueBalances {
    /// Derive a day's balances from the carried-over due and the day's own sales.
    ///
    /// The category sum is rounded before it is added to `prev_due`, and each
    /// stored field is rounded to cents. Sums beyond the decimal range saturate.
    pub fn compute(prev_due: Decimal, categories: &[SaleCategory], deposit: Decimal) -> Self {
        let prev_due = round_money(prev_due);
        let total_amount = total_amount(categories);
        let total_due = round_money(total_amount.saturating_add(prev_due));
        let curr_due = round_money(total_due.saturating_sub(deposit));
        Self {
            prev_due,
            total_amount,
            total_due,
            curr_due,
        }
    }

    /// Balances of a day without sales: everything collapses onto the carried due.
    pub fn carried(due: Decimal) -> Self {
        let due = round_money(due);
        Self {
            prev_due: due,
            total_amount: Decimal::ZERO,
            total_due: due,
            curr_due: due,
        }
    }
}

/// Stored sale record for one salesman on one calendar day.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySaleRecord {
    pub id: Uuid,
    pub salesman_id: SalesmanId,
    pub date: SaleDate,
    pub categories: Vec<SaleCategory>,
    pub deposit: Decimal,
    #[serde(flatten)]
    pub balances: DueBalances,
}

impl DailySaleRecord {
    /// Build a fresh record and derive its balances from `prev_due`.
    pub fn new(
        salesman_id: SalesmanId,
        date: SaleDate,
        categories: Vec<SaleCategory>,
        deposit: Decimal,
        prev_due: Decimal,
    ) -> Self {
        let balances = DueBalances::compute(prev_due, &categories, deposit);
        Self {
            id: Uuid::new_v4(),
            salesman_id,
            date,
            categories,
            deposit,
            balances,
        }
    }

    pub fn curr_due(&self) -> Decimal {
        self.balances.curr_due
    }

    /// Balances this record should hold given the supplied carried due.
    pub fn recompute(&self, prev_due: Decimal) -> DueBalances {
        DueBalances::compute(prev_due, &self.categories, self.deposit)
    }
}
