use std::fs;
use std::path::{Path, PathBuf};

use bakery_core::money::lenient_decimal;
use bakery_core::{
    DailySaleRecord, DueBalances, SaleCategory, SaleDate, SaleDocument, Salesman, SalesmanId,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{DailySalesStore, LedgerError, LedgerResult, SaleQuery, SalesmanDirectory};

const SALES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS daily_sales (
    record_id TEXT PRIMARY KEY,
    salesman_id TEXT NOT NULL,
    sale_date TEXT NOT NULL,
    categories TEXT NOT NULL,
    deposit TEXT,
    prev_due TEXT,
    total_amount TEXT,
    total_due TEXT,
    curr_due TEXT,
    legacy_current_due TEXT,
    legacy_due TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS daily_sales_idx_salesman_date
    ON daily_sales(salesman_id, sale_date);
CREATE INDEX IF NOT EXISTS daily_sales_idx_date
    ON daily_sales(sale_date);
CREATE TABLE IF NOT EXISTS salesmen (
    salesman_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1
);
"#;

const RECORD_COLUMNS: &str = "record_id, salesman_id, sale_date, categories, deposit, prev_due, \
     total_amount, total_due, curr_due, legacy_current_due, legacy_due";

/// SQLite-backed daily sales store.
///
/// Legacy due columns are kept as imported and folded into `curr_due` by
/// [`SaleDocument::normalize`] on every read. A balance update clears them.
#[derive(Clone, Debug)]
pub struct SqliteDailySalesStore {
    path: PathBuf,
}

impl SqliteDailySalesStore {
    pub fn new(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        let store = Self { path: path.into() };
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn initialize_schema(&self) -> LedgerResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(SALES_SCHEMA)?;
        Ok(())
    }

    fn connect(&self) -> LedgerResult<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        Ok(conn)
    }

    /// Load legacy documents as-is, replacing any record on the same salesman and day.
    ///
    /// Documents are validated through normalization first; the first invalid one
    /// aborts the import before anything is written.
    pub fn import_documents(&self, documents: &[SaleDocument]) -> LedgerResult<usize> {
        let mut rows = Vec::with_capacity(documents.len());
        for (index, document) in documents.iter().enumerate() {
            let record = document.clone().normalize().map_err(|err| {
                LedgerError::InvalidInput(format!("document #{index}: {err}"))
            })?;
            rows.push((record, document));
        }
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        for (record, document) in &rows {
            let amount =
                |field: &Option<serde_json::Value>| field.as_ref().and_then(lenient_decimal);
            tx.execute(
                "INSERT OR REPLACE INTO daily_sales (
                    record_id, salesman_id, sale_date, categories, deposit, prev_due,
                    total_amount, total_due, curr_due, legacy_current_due, legacy_due
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.id.to_string(),
                    record.salesman_id.as_str(),
                    record.date.to_string(),
                    serde_json::to_string(&record.categories)?,
                    decimal_text(amount(&document.deposit)),
                    decimal_text(amount(&document.prev_due)),
                    decimal_text(amount(&document.total_amount)),
                    decimal_text(amount(&document.total_due)),
                    decimal_text(amount(&document.curr_due)),
                    decimal_text(amount(&document.current_due)),
                    decimal_text(amount(&document.due)),
                ],
            )?;
        }
        tx.commit()?;
        Ok(rows.len())
    }
}

impl DailySalesStore for SqliteDailySalesStore {
    fn delete_by_date(&self, date: SaleDate) -> LedgerResult<usize> {
        let conn = self.connect()?;
        let removed = conn.execute(
            "DELETE FROM daily_sales WHERE sale_date = ?1",
            params![date.to_string()],
        )?;
        Ok(removed)
    }

    fn insert_many(&self, records: &[DailySaleRecord]) -> LedgerResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        for record in records {
            tx.execute(
                "INSERT INTO daily_sales (
                    record_id, salesman_id, sale_date, categories, deposit, prev_due,
                    total_amount, total_due, curr_due
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id.to_string(),
                    record.salesman_id.as_str(),
                    record.date.to_string(),
                    serde_json::to_string(&record.categories)?,
                    record.deposit.to_string(),
                    record.balances.prev_due.to_string(),
                    record.balances.total_amount.to_string(),
                    record.balances.total_due.to_string(),
                    record.balances.curr_due.to_string(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn find_one(
        &self,
        salesman: &SalesmanId,
        date: SaleDate,
    ) -> LedgerResult<Option<DailySaleRecord>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM daily_sales WHERE salesman_id = ?1 AND sale_date = ?2"
        );
        let document = conn
            .query_row(
                &sql,
                params![salesman.as_str(), date.to_string()],
                row_to_document,
            )
            .optional()?;
        document.map(normalize_row).transpose()
    }

    fn query(&self, query: SaleQuery) -> LedgerResult<Vec<DailySaleRecord>> {
        let conn = self.connect()?;
        let mut sql = format!(
            "SELECT {RECORD_COLUMNS}
             FROM daily_sales
             WHERE (?1 IS NULL OR salesman_id = ?1)
               AND (?2 IS NULL OR sale_date > ?2)
               AND (?3 IS NULL OR sale_date < ?3)"
        );
        sql.push_str(if query.ascending {
            " ORDER BY sale_date ASC, salesman_id ASC"
        } else {
            " ORDER BY sale_date DESC, salesman_id ASC"
        });
        if query.limit.is_some() {
            sql.push_str(" LIMIT ?4");
        }

        let mut params: Vec<Value> = Vec::with_capacity(4);
        params.push(optional_text(
            query.salesman.map(|id| id.as_str().to_string()),
        ));
        params.push(optional_text(query.after.map(|date| date.to_string())));
        params.push(optional_text(query.before.map(|date| date.to_string())));
        if let Some(limit) = query.limit {
            params.push(Value::Integer(limit as i64));
        }

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(normalize_row(row_to_document(row)?)?);
        }
        Ok(records)
    }

    fn update_balances(&self, id: Uuid, balances: &DueBalances) -> LedgerResult<()> {
        let conn = self.connect()?;
        let changed = conn.execute(
            "UPDATE daily_sales
             SET prev_due = ?2, total_amount = ?3, total_due = ?4, curr_due = ?5,
                 legacy_current_due = NULL, legacy_due = NULL
             WHERE record_id = ?1",
            params![
                id.to_string(),
                balances.prev_due.to_string(),
                balances.total_amount.to_string(),
                balances.total_due.to_string(),
                balances.curr_due.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(LedgerError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn records_on(&self, date: SaleDate) -> LedgerResult<Vec<DailySaleRecord>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM daily_sales WHERE sale_date = ?1 ORDER BY salesman_id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![date.to_string()])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(normalize_row(row_to_document(row)?)?);
        }
        Ok(records)
    }

    fn salesmen_with_records(&self) -> LedgerResult<Vec<SalesmanId>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT salesman_id FROM daily_sales ORDER BY salesman_id ASC")?;
        let mut rows = stmt.query([])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let raw: String = row.get(0)?;
            if let Some(id) = SalesmanId::parse(&raw) {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

impl SalesmanDirectory for SqliteDailySalesStore {
    fn upsert_salesman(&self, salesman: &Salesman) -> LedgerResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO salesmen (salesman_id, name, active) VALUES (?1, ?2, ?3)
             ON CONFLICT(salesman_id) DO UPDATE SET name = excluded.name, active = excluded.active",
            params![salesman.id.as_str(), salesman.name, salesman.active],
        )?;
        Ok(())
    }

    fn list_salesmen(&self) -> LedgerResult<Vec<Salesman>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare("SELECT salesman_id, name, active FROM salesmen ORDER BY salesman_id ASC")?;
        let mut rows = stmt.query([])?;
        let mut salesmen = Vec::new();
        while let Some(row) = rows.next()? {
            let raw_id: String = row.get(0)?;
            let id = SalesmanId::parse(&raw_id).ok_or_else(|| {
                LedgerError::Serialization(format!("invalid salesman id `{raw_id}`"))
            })?;
            salesmen.push(Salesman {
                id,
                name: row.get(1)?,
                active: row.get(2)?,
            });
        }
        Ok(salesmen)
    }
}

fn decimal_text(value: Option<Decimal>) -> Option<String> {
    value.map(|amount| amount.to_string())
}

fn optional_text(value: Option<String>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}

fn amount_value(text: Option<String>) -> Option<serde_json::Value> {
    text.map(serde_json::Value::String)
}

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<(SaleDocument, String)> {
    let categories: String = row.get(3)?;
    let document = SaleDocument {
        id: Some(row.get(0)?),
        salesman_id: Some(row.get(1)?),
        date: Some(row.get(2)?),
        categories: Vec::new(),
        deposit: amount_value(row.get(4)?),
        prev_due: amount_value(row.get(5)?),
        total_amount: amount_value(row.get(6)?),
        total_due: amount_value(row.get(7)?),
        curr_due: amount_value(row.get(8)?),
        current_due: amount_value(row.get(9)?),
        due: amount_value(row.get(10)?),
    };
    Ok((document, categories))
}

fn normalize_row(
    (mut document, categories): (SaleDocument, String),
) -> LedgerResult<DailySaleRecord> {
    document.categories = serde_json::from_str::<Vec<SaleCategory>>(&categories)
        .map_err(|err| LedgerError::Serialization(format!("invalid categories payload: {err}")))?;
    Ok(document.normalize()?)
}
