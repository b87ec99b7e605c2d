use std::collections::HashSet;
use std::sync::Arc;

use bakery_core::money::deserialize_lenient;
use bakery_core::{DailySaleRecord, SaleCategory, SaleDate, SalesmanId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    CascadeError, CascadeRequest, DailySalesStore, LedgerError, LedgerResult, RecalcQueue,
    RecalcTicket,
};

/// One salesman's sales for the submitted day.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleEntry {
    pub salesman_id: String,
    #[serde(default)]
    pub categories: Vec<SaleCategory>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub deposit: Decimal,
}

/// A full day of sales across salesmen. Replaces whatever the day held before.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SalesSubmission {
    pub date: SaleDate,
    pub entries: Vec<SaleEntry>,
}

/// What a submission wrote and which cascades it queued.
pub struct SubmissionReceipt {
    pub date: SaleDate,
    /// Records of the previous version of the day that were removed.
    pub removed: usize,
    pub records: Vec<DailySaleRecord>,
    pub tickets: Vec<RecalcTicket>,
    /// Cascades that could not be queued. The submission itself still stands.
    pub unqueued: Vec<(SalesmanId, CascadeError)>,
}

/// Writes a day's sales and schedules the due cascades that follow from it.
#[derive(Clone)]
pub struct SalesSubmissionService {
    store: Arc<dyn DailySalesStore>,
    queue: RecalcQueue,
}

impl SalesSubmissionService {
    pub fn new(store: Arc<dyn DailySalesStore>, queue: RecalcQueue) -> Self {
        Self { store, queue }
    }

    pub fn queue(&self) -> &RecalcQueue {
        &self.queue
    }

    pub async fn submit(&self, submission: SalesSubmission) -> LedgerResult<SubmissionReceipt> {
        let SalesSubmission { date, entries } = submission;
        let records = self.build_records(date, entries)?;

        let removed = self.store.delete_by_date(date)?;
        self.store.insert_many(&records)?;
        info!(
            date = %date,
            removed,
            written = records.len(),
            "replaced daily sales"
        );

        let mut tickets = Vec::with_capacity(records.len());
        let mut unqueued = Vec::new();
        for record in &records {
            let request = CascadeRequest::new(record.salesman_id.clone(), date);
            match self.queue.enqueue(request).await {
                Ok(ticket) => tickets.push(ticket),
                Err(err) => {
                    warn!(
                        salesman = %record.salesman_id,
                        date = %date,
                        error = %err,
                        "failed to queue due cascade"
                    );
                    unqueued.push((record.salesman_id.clone(), err));
                }
            }
        }

        Ok(SubmissionReceipt {
            date,
            removed,
            records,
            tickets,
            unqueued,
        })
    }

    fn build_records(
        &self,
        date: SaleDate,
        entries: Vec<SaleEntry>,
    ) -> LedgerResult<Vec<DailySaleRecord>> {
        let mut seen = HashSet::with_capacity(entries.len());
        let mut validated = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            let salesman = SalesmanId::parse(&entry.salesman_id).ok_or_else(|| {
                LedgerError::InvalidInput(format!("entry #{index} has no salesman id"))
            })?;
            if !seen.insert(salesman.clone()) {
                return Err(LedgerError::InvalidInput(format!(
                    "salesman {salesman} appears more than once for {date}"
                )));
            }
            validated.push((salesman, entry));
        }

        let mut records = Vec::with_capacity(validated.len());
        for (salesman, entry) in validated {
            let prev_due = self
                .store
                .latest_before(&salesman, date)?
                .map(|record| record.curr_due())
                .unwrap_or(Decimal::ZERO);
            records.push(DailySaleRecord::new(
                salesman,
                date,
                entry.categories,
                entry.deposit,
                prev_due,
            ));
        }
        Ok(records)
    }
}
