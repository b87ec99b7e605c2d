//! Detection of drift in stored due chains.
//!
//! A cascade that stops halfway leaves later records carrying balances that no
//! longer follow from earlier ones. The auditor walks a salesman's timeline,
//! reports every record that disagrees with the chain, and names the anchor from
//! which a fresh cascade heals all of them.

use std::sync::Arc;

use bakery_core::{DueBalances, SaleDate, SalesmanId};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    CascadeError, CascadeReport, CascadeRequest, DailySalesStore, DueRecalculator, LedgerResult,
    SaleQuery,
};

/// Why a stored record disagrees with its chain.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BreakKind {
    /// `prev_due` differs from the previous record's `curr_due` (zero for the first record).
    CarriedDue { expected: Decimal, stored: Decimal },
    /// Totals or dues differ from what the record's own sales and deposit imply.
    Arithmetic {
        expected: DueBalances,
        stored: DueBalances,
    },
}

/// A single record that breaks the chain.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ChainBreak {
    pub date: SaleDate,
    #[serde(flatten)]
    pub kind: BreakKind,
}

/// Audit outcome for one salesman.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ChainReport {
    pub salesman: SalesmanId,
    pub checked: usize,
    pub breaks: Vec<ChainBreak>,
    repair_anchor: Option<SaleDate>,
}

impl ChainReport {
    pub fn is_clean(&self) -> bool {
        self.breaks.is_empty()
    }

    /// Anchor from which a cascade rewrites every broken record.
    ///
    /// This is the date of the last sound record before the first break, or the
    /// day before the first record when the timeline is broken from the start.
    pub fn repair_anchor(&self) -> Option<SaleDate> {
        self.repair_anchor
    }
}

/// Walks stored timelines and compares them against the due chain.
#[derive(Clone)]
pub struct ChainAuditor {
    store: Arc<dyn DailySalesStore>,
}

impl ChainAuditor {
    pub fn new(store: Arc<dyn DailySalesStore>) -> Self {
        Self { store }
    }

    pub fn audit(&self, salesman: &SalesmanId) -> LedgerResult<ChainReport> {
        let timeline = self.store.query(SaleQuery::for_salesman(salesman))?;
        let mut breaks = Vec::new();
        let mut repair_anchor = None;
        let mut expected_prev = Decimal::ZERO;
        let mut previous_date: Option<SaleDate> = None;

        for record in &timeline {
            let stored = record.balances;
            let mut broken = false;
            if stored.prev_due != expected_prev {
                breaks.push(ChainBreak {
                    date: record.date,
                    kind: BreakKind::CarriedDue {
                        expected: expected_prev,
                        stored: stored.prev_due,
                    },
                });
                broken = true;
            }
            let expected = record.recompute(stored.prev_due);
            if expected != stored {
                breaks.push(ChainBreak {
                    date: record.date,
                    kind: BreakKind::Arithmetic { expected, stored },
                });
                broken = true;
            }
            if broken && repair_anchor.is_none() {
                repair_anchor = previous_date.or_else(|| record.date.previous_day());
            }
            expected_prev = stored.curr_due;
            previous_date = Some(record.date);
        }

        if !breaks.is_empty() {
            warn!(
                salesman = %salesman,
                breaks = breaks.len(),
                checked = timeline.len(),
                "due chain drift detected"
            );
        }
        Ok(ChainReport {
            salesman: salesman.clone(),
            checked: timeline.len(),
            breaks,
            repair_anchor,
        })
    }

    /// Audit every salesman that has stored records.
    pub fn audit_all(&self) -> LedgerResult<Vec<ChainReport>> {
        self.store
            .salesmen_with_records()?
            .iter()
            .map(|salesman| self.audit(salesman))
            .collect()
    }

    /// Re-run the cascade from the report's repair anchor. Clean reports are left alone.
    pub fn repair(
        &self,
        report: &ChainReport,
        recalculator: &DueRecalculator,
    ) -> Result<Option<CascadeReport>, CascadeError> {
        let Some(anchor) = report.repair_anchor() else {
            return Ok(None);
        };
        let outcome =
            recalculator.recalculate(&CascadeRequest::new(report.salesman.clone(), anchor))?;
        info!(
            salesman = %report.salesman,
            anchor = %anchor,
            updated = outcome.updated,
            "repaired due chain"
        );
        Ok(Some(outcome))
    }
}
