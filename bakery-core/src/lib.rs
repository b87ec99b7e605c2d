//! Core domain types shared by the bakery back-office crates.

mod date;
mod document;
pub mod money;
mod sale;

pub use date::{DateParseError, SaleDate};
pub use document::{NormalizeError, SaleDocument};
pub use sale::{total_amount, DailySaleRecord, DueBalances, SaleCategory, Salesman, SalesmanId};
