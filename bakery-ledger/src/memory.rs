use std::collections::BTreeMap;

use bakery_core::{DailySaleRecord, DueBalances, SaleDate, Salesman, SalesmanId};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::{DailySalesStore, LedgerError, LedgerResult, SaleQuery, SalesmanDirectory};

/// Volatile store keyed by `(salesman, date)`, used by tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryDailySalesStore {
    records: RwLock<BTreeMap<(SalesmanId, SaleDate), DailySaleRecord>>,
    salesmen: RwLock<BTreeMap<SalesmanId, Salesman>>,
}

impl InMemoryDailySalesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl DailySalesStore for InMemoryDailySalesStore {
    fn delete_by_date(&self, date: SaleDate) -> LedgerResult<usize> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|(_, day), _| *day != date);
        Ok(before - records.len())
    }

    fn insert_many(&self, batch: &[DailySaleRecord]) -> LedgerResult<()> {
        let mut records = self.records.write();
        for record in batch {
            let key = (record.salesman_id.clone(), record.date);
            if records.contains_key(&key) {
                return Err(LedgerError::InvalidInput(format!(
                    "record for {} on {} already exists",
                    record.salesman_id, record.date
                )));
            }
        }
        for record in batch {
            records.insert((record.salesman_id.clone(), record.date), record.clone());
        }
        Ok(())
    }

    fn find_one(
        &self,
        salesman: &SalesmanId,
        date: SaleDate,
    ) -> LedgerResult<Option<DailySaleRecord>> {
        Ok(self.records.read().get(&(salesman.clone(), date)).cloned())
    }

    fn query(&self, query: SaleQuery) -> LedgerResult<Vec<DailySaleRecord>> {
        let records = self.records.read();
        let mut matched: Vec<DailySaleRecord> = records
            .values()
            .filter(|record| query.matches(&record.salesman_id, record.date))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            let by_date = if query.ascending {
                a.date.cmp(&b.date)
            } else {
                b.date.cmp(&a.date)
            };
            by_date.then_with(|| a.salesman_id.cmp(&b.salesman_id))
        });
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    fn update_balances(&self, id: Uuid, balances: &DueBalances) -> LedgerResult<()> {
        let mut records = self.records.write();
        let record = records
            .values_mut()
            .find(|record| record.id == id)
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;
        record.balances = *balances;
        Ok(())
    }

    fn records_on(&self, date: SaleDate) -> LedgerResult<Vec<DailySaleRecord>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|record| record.date == date)
            .cloned()
            .collect())
    }

    fn salesmen_with_records(&self) -> LedgerResult<Vec<SalesmanId>> {
        let mut ids: Vec<SalesmanId> = self
            .records
            .read()
            .keys()
            .map(|(salesman, _)| salesman.clone())
            .collect();
        ids.dedup();
        Ok(ids)
    }
}

impl SalesmanDirectory for InMemoryDailySalesStore {
    fn upsert_salesman(&self, salesman: &Salesman) -> LedgerResult<()> {
        self.salesmen
            .write()
            .insert(salesman.id.clone(), salesman.clone());
        Ok(())
    }

    fn list_salesmen(&self) -> LedgerResult<Vec<Salesman>> {
        Ok(self.salesmen.read().values().cloned().collect())
    }
}
