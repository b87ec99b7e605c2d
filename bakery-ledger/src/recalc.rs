//! Forward recalculation of a salesman's running due balance.
//!
//! Every record stores the balance carried in from the salesman's previous
//! record. Rewriting a day therefore invalidates every later day, and the
//! cascade here walks those days in date order to restore the chain
//! `record[i].prev_due == record[i - 1].curr_due`.

use std::fmt;
use std::sync::Arc;

use bakery_core::{SaleDate, SalesmanId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{CascadeError, DailySalesStore, LedgerResult, SaleQuery};

/// Salesman and anchor date of one cascade.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CascadeRequest {
    pub salesman: SalesmanId,
    pub anchor: SaleDate,
}

impl CascadeRequest {
    pub fn new(salesman: SalesmanId, anchor: SaleDate) -> Self {
        Self { salesman, anchor }
    }

    /// Validate raw trigger input before any store access.
    pub fn parse(salesman: &str, anchor: &str) -> Result<Self, CascadeError> {
        let salesman = SalesmanId::parse(salesman)
            .ok_or_else(|| CascadeError::InvalidInput("salesman id is required".into()))?;
        let anchor = SaleDate::parse(anchor)
            .map_err(|err| CascadeError::InvalidInput(err.to_string()))?;
        Ok(Self { salesman, anchor })
    }
}

impl fmt::Display for CascadeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.salesman, self.anchor)
    }
}

/// Where the cascade's starting balance came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "date", rename_all = "snake_case")]
pub enum SeedSource {
    /// The salesman has a record on the anchor date itself.
    AnchorRecord,
    /// Nearest earlier record.
    EarlierRecord(SaleDate),
    /// No record on or before the anchor date.
    Empty,
}

/// Outcome of a completed cascade.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CascadeReport {
    pub salesman: SalesmanId,
    pub anchor: SaleDate,
    pub seed: Decimal,
    pub seed_source: SeedSource,
    /// Records rewritten by the cascade.
    pub updated: usize,
    /// Records whose stored balances actually differed before the rewrite.
    pub changed: usize,
    /// `curr_due` of the last rewritten record.
    pub closing_due: Option<Decimal>,
}

/// Rewrites the due fields of every record after an anchor date.
#[derive(Clone)]
pub struct DueRecalculator {
    store: Arc<dyn DailySalesStore>,
}

impl DueRecalculator {
    pub fn new(store: Arc<dyn DailySalesStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DailySalesStore> {
        &self.store
    }

    /// Resolve the balance carried into the first day after `anchor`.
    pub fn seed(
        &self,
        salesman: &SalesmanId,
        anchor: SaleDate,
    ) -> LedgerResult<(Decimal, SeedSource)> {
        if let Some(record) = self.store.find_one(salesman, anchor)? {
            return Ok((record.curr_due(), SeedSource::AnchorRecord));
        }
        match self.store.latest_before(salesman, anchor)? {
            Some(record) => Ok((record.curr_due(), SeedSource::EarlierRecord(record.date))),
            None => Ok((Decimal::ZERO, SeedSource::Empty)),
        }
    }

    /// Run the cascade for one salesman.
    ///
    /// Records are rewritten one by one in ascending date order. A failed write
    /// stops the walk and leaves earlier writes in place; re-running from the
    /// same anchor produces the same stored values.
    pub fn recalculate(&self, request: &CascadeRequest) -> Result<CascadeReport, CascadeError> {
        let CascadeRequest { salesman, anchor } = request;
        if salesman.is_empty() {
            return Err(CascadeError::InvalidInput("salesman id is required".into()));
        }
        let anchor = *anchor;

        let (seed, seed_source) = self
            .seed(salesman, anchor)
            .map_err(|source| CascadeError::SeedLookup {
                salesman: salesman.clone(),
                anchor,
                source,
            })?;

        let cascade = self
            .store
            .query(SaleQuery::for_salesman(salesman).after(anchor))
            .map_err(|source| CascadeError::Fetch {
                salesman: salesman.clone(),
                anchor,
                source,
            })?;
        let total = cascade.len();
        debug!(
            salesman = %salesman,
            anchor = %anchor,
            seed = %seed,
            records = total,
            "starting due cascade"
        );

        let mut prev_due = seed;
        let mut updated = 0;
        let mut changed = 0;
        for record in &cascade {
            let balances = record.recompute(prev_due);
            if balances != record.balances {
                changed += 1;
            }
            self.store
                .update_balances(record.id, &balances)
                .map_err(|source| CascadeError::PartialWrite {
                    salesman: salesman.clone(),
                    anchor,
                    failed_date: record.date,
                    updated,
                    total,
                    source,
                })?;
            debug!(
                salesman = %salesman,
                date = %record.date,
                prev_due = %balances.prev_due,
                curr_due = %balances.curr_due,
                "rewrote due balances"
            );
            updated += 1;
            prev_due = balances.curr_due;
        }

        Ok(CascadeReport {
            salesman: salesman.clone(),
            anchor,
            seed,
            seed_source,
            updated,
            changed,
            closing_due: cascade.last().map(|_| prev_due),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bakery_core::{DailySaleRecord, DueBalances, SaleCategory, SaleDocument};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::{InMemoryDailySalesStore, LedgerError};

    fn date(raw: &str) -> SaleDate {
        SaleDate::parse(raw).unwrap()
    }

    fn salesman() -> SalesmanId {
        SalesmanId::from("s-1")
    }

    /// Record whose stored balances are deliberately stale.
    fn stale(day: &str, totals: &[Decimal], deposit: Decimal) -> DailySaleRecord {
        let categories = totals
            .iter()
            .map(|total| SaleCategory::new("bread", *total))
            .collect();
        let mut record = DailySaleRecord::new(salesman(), date(day), categories, deposit, dec!(0));
        record.balances = DueBalances {
            prev_due: dec!(999),
            total_amount: dec!(999),
            total_due: dec!(999),
            curr_due: dec!(999),
        };
        record
    }

    fn with_curr_due(mut record: DailySaleRecord, curr_due: Decimal) -> DailySaleRecord {
        record.balances.curr_due = curr_due;
        record
    }

    fn setup(records: Vec<DailySaleRecord>) -> (Arc<InMemoryDailySalesStore>, DueRecalculator) {
        let store = Arc::new(InMemoryDailySalesStore::new());
        store.insert_many(&records).unwrap();
        let recalculator = DueRecalculator::new(store.clone());
        (store, recalculator)
    }

    fn load(store: &InMemoryDailySalesStore, day: &str) -> DailySaleRecord {
        store.find_one(&salesman(), date(day)).unwrap().unwrap()
    }

    #[test]
    fn rewrites_arithmetic_from_seed() {
        let anchor = with_curr_due(stale("2024-01-01", &[dec!(5)], dec!(0)), dec!(10));
        let next = stale("2024-01-02", &[dec!(120.555), dec!(30)], dec!(50));
        let (store, recalculator) = setup(vec![anchor, next]);

        let report = recalculator
            .recalculate(&CascadeRequest::new(salesman(), date("2024-01-01")))
            .unwrap();
        assert_eq!(report.seed, dec!(10));
        assert_eq!(report.seed_source, SeedSource::AnchorRecord);
        assert_eq!(report.updated, 1);

        let record = load(&store, "2024-01-02");
        assert_eq!(record.balances.prev_due, dec!(10));
        assert_eq!(record.balances.total_amount, dec!(150.56));
        assert_eq!(record.balances.total_due, dec!(160.56));
        assert_eq!(record.balances.curr_due, dec!(110.56));
    }

    #[test]
    fn chain_continues_across_gaps() {
        let first = with_curr_due(stale("2024-01-01", &[dec!(100)], dec!(0)), dec!(100));
        let (store, recalculator) = setup(vec![
            first,
            stale("2024-01-05", &[dec!(20)], dec!(15)),
            stale("2024-01-09", &[dec!(7)], dec!(0)),
        ]);

        recalculator
            .recalculate(&CascadeRequest::new(salesman(), date("2024-01-01")))
            .unwrap();
        let d2 = load(&store, "2024-01-05");
        let d3 = load(&store, "2024-01-09");
        assert_eq!(d2.balances.prev_due, dec!(100));
        assert_eq!(d2.balances.curr_due, dec!(105));
        assert_eq!(d3.balances.prev_due, d2.balances.curr_due);
        assert_eq!(d3.balances.curr_due, dec!(112));
    }

    #[test]
    fn seeds_from_nearest_earlier_record_when_anchor_is_empty() {
        let earlier = with_curr_due(stale("2024-01-01", &[dec!(1)], dec!(0)), dec!(33));
        let (store, recalculator) = setup(vec![earlier, stale("2024-01-04", &[dec!(2)], dec!(0))]);

        let report = recalculator
            .recalculate(&CascadeRequest::new(salesman(), date("2024-01-02")))
            .unwrap();
        assert_eq!(report.seed_source, SeedSource::EarlierRecord(date("2024-01-01")));
        assert_eq!(load(&store, "2024-01-04").balances.prev_due, dec!(33));
        // The anchor-side record itself is never touched.
        assert_eq!(load(&store, "2024-01-01").balances.prev_due, dec!(999));
    }

    #[test]
    fn seed_is_zero_without_history() {
        let (store, recalculator) = setup(vec![stale("2024-02-01", &[dec!(8)], dec!(3))]);
        let report = recalculator
            .recalculate(&CascadeRequest::new(salesman(), date("2024-01-31")))
            .unwrap();
        assert_eq!(report.seed, Decimal::ZERO);
        assert_eq!(report.seed_source, SeedSource::Empty);
        let record = load(&store, "2024-02-01");
        assert_eq!(record.balances.prev_due, Decimal::ZERO);
        assert_eq!(record.balances.curr_due, dec!(5));
    }

    #[test]
    fn legacy_current_due_seeds_the_cascade() {
        let legacy: SaleDocument = serde_json::from_value(json!({
            "salesmanId": "s-1",
            "date": "2024-01-01",
            "currentDue": 75,
        }))
        .unwrap();
        let (store, recalculator) = setup(vec![
            legacy.normalize().unwrap(),
            stale("2024-01-02", &[dec!(10)], dec!(0)),
        ]);
        recalculator
            .recalculate(&CascadeRequest::new(salesman(), date("2024-01-01")))
            .unwrap();
        assert_eq!(load(&store, "2024-01-02").balances.prev_due, dec!(75));
    }

    #[test]
    fn rerunning_is_idempotent() {
        let (store, recalculator) = setup(vec![
            with_curr_due(stale("2024-01-01", &[dec!(1)], dec!(0)), dec!(12.345)),
            stale("2024-01-02", &[dec!(10.005)], dec!(3.3)),
            stale("2024-01-03", &[dec!(0.015), dec!(4)], dec!(1)),
        ]);
        let request = CascadeRequest::new(salesman(), date("2024-01-01"));

        let first = recalculator.recalculate(&request).unwrap();
        let snapshot = store.query(SaleQuery::for_salesman(&salesman())).unwrap();
        let second = recalculator.recalculate(&request).unwrap();
        let again = store.query(SaleQuery::for_salesman(&salesman())).unwrap();

        assert_eq!(snapshot, again);
        assert_eq!(first.changed, 2);
        assert_eq!(second.changed, 0);
        assert_eq!(first.closing_due, second.closing_due);
    }

    #[test]
    fn empty_cascade_set_is_a_no_op() {
        let (_, recalculator) = setup(vec![stale("2024-01-01", &[dec!(1)], dec!(0))]);
        let report = recalculator
            .recalculate(&CascadeRequest::new(salesman(), date("2024-01-01")))
            .unwrap();
        assert_eq!(report.updated, 0);
        assert_eq!(report.closing_due, None);
    }

    #[test]
    fn rejects_empty_salesman_before_touching_store() {
        assert!(matches!(
            CascadeRequest::parse("  ", "2024-01-01"),
            Err(CascadeError::InvalidInput(_))
        ));
        assert!(matches!(
            CascadeRequest::parse("s-1", "someday"),
            Err(CascadeError::InvalidInput(_))
        ));
        let (_, recalculator) = setup(Vec::new());
        let request = CascadeRequest::new(SalesmanId::from(""), date("2024-01-01"));
        assert!(matches!(
            recalculator.recalculate(&request),
            Err(CascadeError::InvalidInput(_))
        ));
    }

    /// Store that fails the n-th balance update.
    struct FlakyStore {
        inner: InMemoryDailySalesStore,
        fail_on: usize,
        updates: AtomicUsize,
    }

    impl DailySalesStore for FlakyStore {
        fn delete_by_date(&self, date: SaleDate) -> LedgerResult<usize> {
            self.inner.delete_by_date(date)
        }

        fn insert_many(&self, records: &[DailySaleRecord]) -> LedgerResult<()> {
            self.inner.insert_many(records)
        }

        fn find_one(
            &self,
            salesman: &SalesmanId,
            date: SaleDate,
        ) -> LedgerResult<Option<DailySaleRecord>> {
            self.inner.find_one(salesman, date)
        }

        fn query(&self, query: SaleQuery) -> LedgerResult<Vec<DailySaleRecord>> {
            self.inner.query(query)
        }

        fn update_balances(&self, id: Uuid, balances: &DueBalances) -> LedgerResult<()> {
            let attempt = self.updates.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt == self.fail_on {
                return Err(LedgerError::Storage("disk unavailable".into()));
            }
            self.inner.update_balances(id, balances)
        }

        fn records_on(&self, date: SaleDate) -> LedgerResult<Vec<DailySaleRecord>> {
            self.inner.records_on(date)
        }

        fn salesmen_with_records(&self) -> LedgerResult<Vec<SalesmanId>> {
            self.inner.salesmen_with_records()
        }
    }

    #[test]
    fn failed_write_keeps_earlier_updates() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryDailySalesStore::new(),
            fail_on: 2,
            updates: AtomicUsize::new(0),
        });
        store
            .insert_many(&[
                stale("2024-01-02", &[dec!(10)], dec!(0)),
                stale("2024-01-03", &[dec!(10)], dec!(0)),
                stale("2024-01-04", &[dec!(10)], dec!(0)),
            ])
            .unwrap();
        let recalculator = DueRecalculator::new(store.clone());

        let err = recalculator
            .recalculate(&CascadeRequest::new(salesman(), date("2024-01-01")))
            .unwrap_err();
        match &err {
            CascadeError::PartialWrite {
                failed_date,
                updated,
                total,
                ..
            } => {
                assert_eq!(*failed_date, date("2024-01-03"));
                assert_eq!(*updated, 1);
                assert_eq!(*total, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.is_partial());

        let first = store.find_one(&salesman(), date("2024-01-02")).unwrap().unwrap();
        let third = store.find_one(&salesman(), date("2024-01-04")).unwrap().unwrap();
        assert_eq!(first.balances.curr_due, dec!(10));
        assert_eq!(third.balances.prev_due, dec!(999));

        // The failure was transient; the same anchor heals the chain.
        recalculator
            .recalculate(&CascadeRequest::new(salesman(), date("2024-01-01")))
            .unwrap();
        let third = store.find_one(&salesman(), date("2024-01-04")).unwrap().unwrap();
        assert_eq!(third.balances.prev_due, dec!(20));
    }
}
