use bakery_core::{DailySaleRecord, DueBalances, SaleDate, Salesman, SalesmanId};
use uuid::Uuid;

use crate::{LedgerResult, SaleQuery};

/// Abstraction over durable daily sales storage.
pub trait DailySalesStore: Send + Sync {
    /// Remove every salesman's record for `date`. Returns how many were removed.
    fn delete_by_date(&self, date: SaleDate) -> LedgerResult<usize>;

    /// Persist a group of records atomically.
    fn insert_many(&self, records: &[DailySaleRecord]) -> LedgerResult<()>;

    /// Load the record of one salesman on one day.
    fn find_one(
        &self,
        salesman: &SalesmanId,
        date: SaleDate,
    ) -> LedgerResult<Option<DailySaleRecord>>;

    /// Load records matching the supplied query, ordered by date.
    fn query(&self, query: SaleQuery) -> LedgerResult<Vec<DailySaleRecord>>;

    /// Overwrite the due fields of a record, leaving the sales lines untouched.
    fn update_balances(&self, id: Uuid, balances: &DueBalances) -> LedgerResult<()>;

    /// Every salesman's record for `date`.
    fn records_on(&self, date: SaleDate) -> LedgerResult<Vec<DailySaleRecord>>;

    /// Nearest record strictly before `date` for the salesman.
    fn latest_before(
        &self,
        salesman: &SalesmanId,
        date: SaleDate,
    ) -> LedgerResult<Option<DailySaleRecord>> {
        let mut records = self.query(
            SaleQuery::for_salesman(salesman)
                .before(date)
                .descending()
                .with_limit(1),
        )?;
        Ok(records.pop())
    }

    /// Salesmen that have at least one stored record.
    fn salesmen_with_records(&self) -> LedgerResult<Vec<SalesmanId>>;
}

/// Catalog of known salesmen.
pub trait SalesmanDirectory: Send + Sync {
    fn upsert_salesman(&self, salesman: &Salesman) -> LedgerResult<()>;

    /// All salesmen ordered by id.
    fn list_salesmen(&self) -> LedgerResult<Vec<Salesman>>;
}
