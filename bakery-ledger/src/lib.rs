//! Daily sales storage, due-balance cascades and the services built on them.

mod audit;
mod error;
mod memory;
mod query;
mod queue;
mod recalc;
mod repository;
mod sqlite;
mod submission;
mod summary;

pub use audit::{BreakKind, ChainAuditor, ChainBreak, ChainReport};
pub use error::{CascadeError, LedgerError, LedgerResult};
pub use memory::InMemoryDailySalesStore;
pub use query::SaleQuery;
pub use queue::{JobId, JobStatus, RecalcEvent, RecalcQueue, RecalcTicket};
pub use recalc::{CascadeReport, CascadeRequest, DueRecalculator, SeedSource};
pub use repository::{DailySalesStore, SalesmanDirectory};
pub use sqlite::SqliteDailySalesStore;
pub use submission::{SaleEntry, SalesSubmission, SalesSubmissionService, SubmissionReceipt};
pub use summary::{DailySummaryReader, SalesmanDay};
