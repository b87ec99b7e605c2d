use bakery_core::{NormalizeError, SaleDate, SalesmanId};
use thiserror::Error;

/// Result alias for store and service operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Error type surfaced by store operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("record {0} not found")]
    NotFound(String),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(value: std::io::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}

impl From<NormalizeError> for LedgerError {
    fn from(value: NormalizeError) -> Self {
        Self::Serialization(value.to_string())
    }
}

/// Failure of a single due-balance cascade.
///
/// Every variant is scoped to one salesman. Records rewritten before the failure
/// stay committed, and re-running the cascade from the same anchor is safe.
#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("invalid cascade request: {0}")]
    InvalidInput(String),
    #[error("failed to resolve seed due for {salesman} at {anchor}: {source}")]
    SeedLookup {
        salesman: SalesmanId,
        anchor: SaleDate,
        #[source]
        source: LedgerError,
    },
    #[error("failed to load records after {anchor} for {salesman}: {source}")]
    Fetch {
        salesman: SalesmanId,
        anchor: SaleDate,
        #[source]
        source: LedgerError,
    },
    #[error(
        "cascade for {salesman} stopped at {failed_date} after {updated} of {total} records: {source}"
    )]
    PartialWrite {
        salesman: SalesmanId,
        anchor: SaleDate,
        failed_date: SaleDate,
        updated: usize,
        total: usize,
        #[source]
        source: LedgerError,
    },
    #[error("recalculation job interrupted: {0}")]
    Interrupted(String),
}

impl CascadeError {
    /// True when some downstream records were rewritten before the failure.
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::PartialWrite { updated, .. } if *updated > 0)
    }

    /// Records rewritten before the cascade stopped.
    pub fn records_updated(&self) -> usize {
        match self {
            Self::PartialWrite { updated, .. } => *updated,
            _ => 0,
        }
    }
}
