//! Background worker that owns cascade execution.
//!
//! Submissions enqueue one cascade per affected salesman and move on. Each job
//! gets an id whose status can be polled, a ticket that can be awaited, and a
//! broadcast event once it finishes. Jobs run one at a time in arrival order.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{CascadeError, CascadeReport, CascadeRequest, DueRecalculator};

const EVENT_CAPACITY: usize = 256;
/// Size of the status table at which finished jobs are dropped on the next enqueue.
const STATUS_RETENTION: usize = 1024;

/// Identifier assigned to each queued cascade.
pub type JobId = Uuid;

/// Lifecycle of a queued cascade.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed {
        report: CascadeReport,
    },
    Failed {
        error: String,
        partial: bool,
        updated: usize,
    },
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    fn from_result(result: &Result<CascadeReport, CascadeError>) -> Self {
        match result {
            Ok(report) => Self::Completed {
                report: report.clone(),
            },
            Err(err) => Self::Failed {
                error: err.to_string(),
                partial: err.is_partial(),
                updated: err.records_updated(),
            },
        }
    }
}

/// Status change broadcast to queue subscribers.
#[derive(Clone, Debug, Serialize)]
pub struct RecalcEvent {
    pub job: JobId,
    pub request: CascadeRequest,
    pub status: JobStatus,
}

struct Job {
    id: JobId,
    request: CascadeRequest,
    responder: oneshot::Sender<Result<CascadeReport, CascadeError>>,
}

/// Handle to a queued cascade.
pub struct RecalcTicket {
    id: JobId,
    request: CascadeRequest,
    receiver: oneshot::Receiver<Result<CascadeReport, CascadeError>>,
}

impl RecalcTicket {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn request(&self) -> &CascadeRequest {
        &self.request
    }

    /// Wait for the cascade to finish.
    pub async fn wait(self) -> Result<CascadeReport, CascadeError> {
        self.receiver.await.unwrap_or_else(|_| {
            Err(CascadeError::Interrupted(
                "worker dropped the job before completion".into(),
            ))
        })
    }
}

/// Cloneable handle to the recalculation worker.
///
/// The worker stops once every handle has been dropped and the queue is drained.
#[derive(Clone)]
pub struct RecalcQueue {
    sender: mpsc::Sender<Job>,
    statuses: Arc<Mutex<HashMap<JobId, JobStatus>>>,
    events: broadcast::Sender<RecalcEvent>,
}

impl RecalcQueue {
    /// Start the worker on the current tokio runtime.
    pub fn spawn(recalculator: DueRecalculator, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let statuses = Arc::new(Mutex::new(HashMap::new()));
        let worker = Worker {
            recalculator,
            statuses: statuses.clone(),
            events: events.clone(),
        };
        let handle = tokio::spawn(worker.run(receiver));
        (
            Self {
                sender,
                statuses,
                events,
            },
            handle,
        )
    }

    /// Queue a cascade. Waits for room when the queue is full.
    pub async fn enqueue(&self, request: CascadeRequest) -> Result<RecalcTicket, CascadeError> {
        let id = Uuid::new_v4();
        let (responder, receiver) = oneshot::channel();
        {
            let mut statuses = self.statuses.lock();
            if statuses.len() >= STATUS_RETENTION {
                statuses.retain(|_, status| !status.is_finished());
            }
            statuses.insert(id, JobStatus::Queued);
        }
        let job = Job {
            id,
            request: request.clone(),
            responder,
        };
        if self.sender.send(job).await.is_err() {
            self.statuses.lock().remove(&id);
            return Err(CascadeError::Interrupted(
                "recalculation worker is not running".into(),
            ));
        }
        debug!(job = %id, request = %request, "queued due cascade");
        Ok(RecalcTicket {
            id,
            request,
            receiver,
        })
    }

    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.statuses.lock().get(&id).cloned()
    }

    /// Drop finished jobs from the status table. Returns how many were removed.
    ///
    /// `enqueue` also does this once the table holds `STATUS_RETENTION` jobs, so
    /// statuses of finished jobs stay readable only until then.
    pub fn prune_finished(&self) -> usize {
        let mut statuses = self.statuses.lock();
        let before = statuses.len();
        statuses.retain(|_, status| !status.is_finished());
        before - statuses.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecalcEvent> {
        self.events.subscribe()
    }
}

struct Worker {
    recalculator: DueRecalculator,
    statuses: Arc<Mutex<HashMap<JobId, JobStatus>>>,
    events: broadcast::Sender<RecalcEvent>,
}

impl Worker {
    async fn run(self, mut receiver: mpsc::Receiver<Job>) {
        while let Some(job) = receiver.recv().await {
            self.process(job).await;
        }
        debug!("recalculation queue drained");
    }

    async fn process(&self, job: Job) {
        let Job {
            id,
            request,
            responder,
        } = job;
        self.transition(id, &request, JobStatus::Running);

        let recalculator = self.recalculator.clone();
        let blocking_request = request.clone();
        let result = task::spawn_blocking(move || recalculator.recalculate(&blocking_request))
            .await
            .unwrap_or_else(|err| Err(CascadeError::Interrupted(err.to_string())));

        match &result {
            Ok(report) => info!(
                job = %id,
                salesman = %report.salesman,
                anchor = %report.anchor,
                updated = report.updated,
                changed = report.changed,
                "due cascade completed"
            ),
            Err(err) => error!(
                job = %id,
                salesman = %request.salesman,
                anchor = %request.anchor,
                partial = err.is_partial(),
                error = %err,
                "due cascade failed; re-run from the same anchor to heal the chain"
            ),
        }

        self.transition(id, &request, JobStatus::from_result(&result));
        let _ = responder.send(result);
    }

    fn transition(&self, id: JobId, request: &CascadeRequest, status: JobStatus) {
        self.statuses.lock().insert(id, status.clone());
        let _ = self.events.send(RecalcEvent {
            job: id,
            request: request.clone(),
            status,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bakery_core::{DailySaleRecord, SaleCategory, SaleDate, SalesmanId};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::{DailySalesStore, InMemoryDailySalesStore};

    fn date(raw: &str) -> SaleDate {
        SaleDate::parse(raw).unwrap()
    }

    fn store_with_chain() -> Arc<InMemoryDailySalesStore> {
        let store = Arc::new(InMemoryDailySalesStore::new());
        let salesman = SalesmanId::from("s-1");
        let first = DailySaleRecord::new(
            salesman.clone(),
            date("2024-01-01"),
            vec![SaleCategory::new("bread", dec!(40))],
            dec!(0),
            Decimal::ZERO,
        );
        let second = DailySaleRecord::new(
            salesman,
            date("2024-01-02"),
            vec![SaleCategory::new("bread", dec!(10))],
            dec!(5),
            Decimal::ZERO,
        );
        store.insert_many(&[first, second]).unwrap();
        store
    }

    #[tokio::test]
    async fn completes_jobs_and_reports_status() {
        let store = store_with_chain();
        let (queue, _worker) = RecalcQueue::spawn(DueRecalculator::new(store.clone()), 4);
        let mut events = queue.subscribe();

        let ticket = queue
            .enqueue(CascadeRequest::new(SalesmanId::from("s-1"), date("2024-01-01")))
            .await
            .unwrap();
        let id = ticket.id();
        let report = ticket.wait().await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.closing_due, Some(dec!(45)));

        match queue.status(id) {
            Some(JobStatus::Completed { report }) => assert_eq!(report.changed, 1),
            other => panic!("unexpected status {other:?}"),
        }

        let mut saw_running = false;
        loop {
            let event = events.recv().await.unwrap();
            assert_eq!(event.job, id);
            match event.status {
                JobStatus::Running => saw_running = true,
                JobStatus::Completed { .. } => break,
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert!(saw_running);
        assert_eq!(queue.prune_finished(), 1);
        assert!(queue.status(id).is_none());
    }

    #[tokio::test]
    async fn invalid_requests_fail_without_stopping_the_worker() {
        let store = store_with_chain();
        let (queue, _worker) = RecalcQueue::spawn(DueRecalculator::new(store), 4);

        let bad = queue
            .enqueue(CascadeRequest::new(SalesmanId::from(""), date("2024-01-01")))
            .await
            .unwrap();
        let bad_id = bad.id();
        assert!(matches!(
            bad.wait().await,
            Err(CascadeError::InvalidInput(_))
        ));
        assert!(matches!(
            queue.status(bad_id),
            Some(JobStatus::Failed { partial: false, .. })
        ));

        let good = queue
            .enqueue(CascadeRequest::new(SalesmanId::from("s-1"), date("2024-01-01")))
            .await
            .unwrap();
        assert!(good.wait().await.is_ok());
    }

    #[tokio::test]
    async fn enqueue_drops_finished_statuses_once_the_table_is_full() {
        let store = store_with_chain();
        let (queue, _worker) = RecalcQueue::spawn(DueRecalculator::new(store), 4);
        let pending = Uuid::new_v4();
        {
            let mut statuses = queue.statuses.lock();
            statuses.insert(pending, JobStatus::Running);
            for _ in 1..STATUS_RETENTION {
                statuses.insert(
                    Uuid::new_v4(),
                    JobStatus::Failed {
                        error: "boom".into(),
                        partial: false,
                        updated: 0,
                    },
                );
            }
        }

        let ticket = queue
            .enqueue(CascadeRequest::new(SalesmanId::from("s-1"), date("2024-01-01")))
            .await
            .unwrap();
        let id = ticket.id();
        ticket.wait().await.unwrap();

        let statuses = queue.statuses.lock();
        assert_eq!(statuses.len(), 2);
        assert!(statuses.contains_key(&pending));
        assert!(statuses.contains_key(&id));
    }

    #[tokio::test]
    async fn worker_exits_when_handles_drop() {
        let store = store_with_chain();
        let (queue, worker) = RecalcQueue::spawn(DueRecalculator::new(store), 1);
        drop(queue);
        worker.await.unwrap();
    }
}
