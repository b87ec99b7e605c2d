use std::collections::BTreeMap;

use bakery_core::{DueBalances, SaleCategory, SaleDate, Salesman, SalesmanId};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::{DailySalesStore, LedgerResult, SalesmanDirectory};

/// One salesman's line in the daily summary.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesmanDay {
    pub salesman_id: SalesmanId,
    pub name: Option<String>,
    pub date: SaleDate,
    pub has_record: bool,
    /// `prev_due` was replaced at read time because the stored value was zero.
    pub repaired: bool,
    pub categories: Vec<SaleCategory>,
    pub deposit: Decimal,
    #[serde(flatten)]
    pub balances: DueBalances,
}

/// Builds the per-salesman view of a single day.
///
/// Lists every active directory salesman plus every salesman with a record on or
/// before the day, whether listed, inactive or unknown to the directory. Those
/// without a record on the day get synthesized balances that carry their latest
/// earlier due. A stored zero `prev_due` is treated as missing and
/// replaced with the nearest earlier `curr_due`; the store is not modified.
pub struct DailySummaryReader<'a> {
    store: &'a dyn DailySalesStore,
    directory: &'a dyn SalesmanDirectory,
}

impl<'a> DailySummaryReader<'a> {
    pub fn new(store: &'a dyn DailySalesStore, directory: &'a dyn SalesmanDirectory) -> Self {
        Self { store, directory }
    }

    pub fn read(&self, date: SaleDate) -> LedgerResult<Vec<SalesmanDay>> {
        let directory: BTreeMap<SalesmanId, Salesman> = self
            .directory
            .list_salesmen()?
            .into_iter()
            .map(|salesman| (salesman.id.clone(), salesman))
            .collect();
        let name_of =
            |salesman: &SalesmanId| directory.get(salesman).map(|entry| entry.name.clone());
        let mut names: BTreeMap<SalesmanId, Option<String>> = directory
            .values()
            .filter(|salesman| salesman.active)
            .map(|salesman| (salesman.id.clone(), Some(salesman.name.clone())))
            .collect();
        let mut recorded = BTreeMap::new();
        for record in self.store.records_on(date)? {
            let salesman = record.salesman_id.clone();
            names
                .entry(salesman.clone())
                .or_insert_with(|| name_of(&salesman));
            recorded.insert(salesman, record);
        }
        // Anyone with earlier history still carries a due, listed or not.
        for salesman in self.store.salesmen_with_records()? {
            if names.contains_key(&salesman) {
                continue;
            }
            if self.store.latest_before(&salesman, date)?.is_some() {
                let name = name_of(&salesman);
                names.insert(salesman, name);
            }
        }

        let mut days = Vec::with_capacity(names.len());
        for (salesman, name) in names {
            let day = match recorded.remove(&salesman) {
                Some(record) => {
                    let mut balances = record.balances;
                    let mut repaired = false;
                    if balances.prev_due.is_zero() {
                        balances.prev_due = self.carried_due(&salesman, date)?;
                        repaired = !balances.prev_due.is_zero();
                    }
                    if repaired {
                        debug!(
                            salesman = %salesman,
                            date = %date,
                            prev_due = %balances.prev_due,
                            "filled zero prev_due from earlier record"
                        );
                    }
                    SalesmanDay {
                        salesman_id: salesman,
                        name,
                        date,
                        has_record: true,
                        repaired,
                        categories: record.categories,
                        deposit: record.deposit,
                        balances,
                    }
                }
                None => {
                    let due = self.carried_due(&salesman, date)?;
                    SalesmanDay {
                        salesman_id: salesman,
                        name,
                        date,
                        has_record: false,
                        repaired: false,
                        categories: Vec::new(),
                        deposit: Decimal::ZERO,
                        balances: DueBalances::carried(due),
                    }
                }
            };
            days.push(day);
        }
        Ok(days)
    }

    fn carried_due(&self, salesman: &SalesmanId, date: SaleDate) -> LedgerResult<Decimal> {
        Ok(self
            .store
            .latest_before(salesman, date)?
            .map(|record| record.curr_due())
            .unwrap_or(Decimal::ZERO))
    }
}
