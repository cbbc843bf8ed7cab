// 📥 CSV Import Pipeline
// Polymorphic importers for the four uploadable record kinds.
//
// Adding a kind means implementing `CsvImporter`; the driver loop in
// `import_csv` stays the same. A bad file header aborts the upload,
// a bad row never does.

use crate::db::{self, InsertOutcome, UpsertOutcome};
use crate::error::ImportError;
use crate::models::{
    parse_month_key, AccountInput, AccountType, BudgetInput, HoldingInput, TransactionInput,
};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::{ReaderBuilder, StringRecord, Trim};
use log::{info, warn};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Only the first errors are echoed back; `total_errors` keeps the full count.
pub const MAX_REPORTED_ERRORS: usize = 10;

// ============================================================================
// CORE TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportKind {
    Accounts,
    Transactions,
    Investments,
    Budgets,
}

impl ImportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportKind::Accounts => "accounts",
            ImportKind::Transactions => "transactions",
            ImportKind::Investments => "investments",
            ImportKind::Budgets => "budgets",
        }
    }
}

impl fmt::Display for ImportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "accounts" => Ok(ImportKind::Accounts),
            "transactions" => Ok(ImportKind::Transactions),
            "investments" | "holdings" => Ok(ImportKind::Investments),
            "budgets" => Ok(ImportKind::Budgets),
            other => Err(format!("Unknown import kind: {}", other)),
        }
    }
}

/// What happened to one stored row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Added,
    Updated,
    Duplicate,
}

impl From<UpsertOutcome> for RowOutcome {
    fn from(outcome: UpsertOutcome) -> Self {
        match outcome {
            UpsertOutcome::Inserted(_) => RowOutcome::Added,
            UpsertOutcome::Updated(_) => RowOutcome::Updated,
        }
    }
}

/// Per-upload summary returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportReport {
    pub kind: ImportKind,
    pub message: String,
    pub added_count: usize,
    pub updated_count: usize,
    pub duplicate_count: usize,
    pub total_errors: usize,
    pub errors: Vec<String>,
}

impl ImportReport {
    fn new(kind: ImportKind) -> Self {
        ImportReport {
            kind,
            message: String::new(),
            added_count: 0,
            updated_count: 0,
            duplicate_count: 0,
            total_errors: 0,
            errors: Vec::new(),
        }
    }

    fn record(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Added => self.added_count += 1,
            RowOutcome::Updated => self.updated_count += 1,
            RowOutcome::Duplicate => self.duplicate_count += 1,
        }
    }

    fn record_error(&mut self, row: usize, message: String) {
        self.total_errors += 1;
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(format!("Row {}: {}", row, message));
        }
    }

    pub fn processed_count(&self) -> usize {
        self.added_count + self.updated_count
    }
}

/// Header name → column index, matched case-insensitively
pub struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord, required: &[&str]) -> Result<Self, ImportError> {
        let index: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_lowercase(), i))
            .collect();

        let missing: Vec<String> = required
            .iter()
            .filter(|column| !index.contains_key(**column))
            .map(|column| column.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(ImportError::MissingColumns(
                required.iter().map(|c| c.to_string()).collect(),
            ));
        }

        Ok(Columns { index })
    }

    /// Trimmed field value; empty when the record is short
    pub fn get<'r>(&self, record: &'r StringRecord, column: &str) -> &'r str {
        self.index
            .get(column)
            .and_then(|&i| record.get(i))
            .map(str::trim)
            .unwrap_or("")
    }
}

// ============================================================================
// IMPORTER TRAIT
// ============================================================================

/// One uploadable record kind: which columns it needs, how a CSV row
/// becomes a typed row, and how that row is written to the store.
pub trait CsvImporter {
    type Row;

    fn kind(&self) -> ImportKind;

    fn required_columns(&self) -> &'static [&'static str];

    fn parse_row(&self, record: &StringRecord, columns: &Columns) -> Result<Self::Row, ImportError>;

    fn store_row(&self, conn: &Connection, row: &Self::Row) -> Result<RowOutcome>;
}

/// Drive one importer over a CSV stream inside a single SQLite transaction.
///
/// Returns `Err` only for file-level problems (missing columns, unreadable
/// header, database failure to begin/commit). Row problems land in the report.
pub fn import_csv<I, R>(conn: &Connection, importer: &I, input: R) -> Result<ImportReport>
where
    I: CsvImporter,
    R: Read,
{
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(input);

    let headers = reader.headers().context("Failed to read CSV header")?.clone();
    let columns = Columns::from_headers(&headers, importer.required_columns())?;

    let kind = importer.kind();
    let mut report = ImportReport::new(kind);
    let tx = conn
        .unchecked_transaction()
        .context("Failed to begin import transaction")?;

    for (index, result) in reader.records().enumerate() {
        let row_number = index + 1;

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                report.record_error(row_number, e.to_string());
                continue;
            }
        };

        let outcome = importer
            .parse_row(&record, &columns)
            .map_err(anyhow::Error::from)
            .and_then(|row| importer.store_row(&tx, &row));

        match outcome {
            Ok(outcome) => report.record(outcome),
            Err(e) => {
                warn!("Skipping {} row {}: {:#}", kind, row_number, e);
                report.record_error(row_number, format!("{:#}", e));
            }
        }
    }

    tx.commit().context("Failed to commit import")?;

    report.message = format!("Successfully processed {} {}", report.processed_count(), kind);
    info!(
        "Imported {}: {} added, {} updated, {} duplicates, {} errors",
        kind, report.added_count, report.updated_count, report.duplicate_count, report.total_errors
    );

    Ok(report)
}

/// Dispatch on `kind` for callers that only know the kind at runtime
pub fn import_kind<R: Read>(conn: &Connection, kind: ImportKind, input: R) -> Result<ImportReport> {
    match kind {
        ImportKind::Accounts => import_csv(conn, &AccountsImporter, input),
        ImportKind::Transactions => import_csv(conn, &TransactionsImporter, input),
        ImportKind::Investments => import_csv(conn, &InvestmentsImporter, input),
        ImportKind::Budgets => import_csv(conn, &BudgetsImporter, input),
    }
}

pub fn import_file(conn: &Connection, kind: ImportKind, path: &Path) -> Result<ImportReport> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    import_kind(conn, kind, file)
}

// ============================================================================
// FIELD PARSING
// ============================================================================

/// Parse a currency or quantity field; tolerates "$1,234.50" and "-$855.94"
pub fn parse_amount(column: &str, raw: &str) -> Result<f64, ImportError> {
    let cleaned: String = raw.chars().filter(|c| *c != '$' && *c != ',').collect();
    cleaned
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ImportError::InvalidField {
            column: column.to_string(),
            value: raw.to_string(),
        })
}

/// Accepts RFC 3339, ISO date-times, ISO dates and US MM/DD/YYYY dates (UTC)
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ImportError> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }

    for format in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            if let Some(naive) = date.and_hms_opt(0, 0, 0) {
                return Ok(naive.and_utc());
            }
        }
    }

    Err(ImportError::InvalidDate(raw.to_string()))
}

fn required_text(column: &str, raw: &str) -> Result<String, ImportError> {
    if raw.is_empty() {
        return Err(ImportError::InvalidField {
            column: column.to_string(),
            value: raw.to_string(),
        });
    }
    Ok(raw.to_string())
}

// ============================================================================
// IMPORTERS
// ============================================================================

/// `name, account_type, balance` — upsert by name
pub struct AccountsImporter;

impl CsvImporter for AccountsImporter {
    type Row = AccountInput;

    fn kind(&self) -> ImportKind {
        ImportKind::Accounts
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &["name", "account_type", "balance"]
    }

    fn parse_row(&self, record: &StringRecord, columns: &Columns) -> Result<AccountInput, ImportError> {
        Ok(AccountInput {
            name: required_text("name", columns.get(record, "name"))?,
            account_type: columns.get(record, "account_type").parse::<AccountType>()?,
            balance: parse_amount("balance", columns.get(record, "balance"))?,
        })
    }

    fn store_row(&self, conn: &Connection, row: &AccountInput) -> Result<RowOutcome> {
        Ok(db::upsert_account(conn, row)?.into())
    }
}

/// Transaction row before its account name is resolved to an id
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRow {
    pub account_name: String,
    pub amount: f64,
    pub description: String,
    pub category: String,
    pub date: DateTime<Utc>,
}

/// `date, amount, description, category, account_name` — unknown accounts are
/// created as empty checking accounts; re-imported rows count as duplicates
pub struct TransactionsImporter;

impl CsvImporter for TransactionsImporter {
    type Row = TransactionRow;

    fn kind(&self) -> ImportKind {
        ImportKind::Transactions
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &["date", "amount", "description", "category", "account_name"]
    }

    fn parse_row(&self, record: &StringRecord, columns: &Columns) -> Result<TransactionRow, ImportError> {
        Ok(TransactionRow {
            account_name: required_text("account_name", columns.get(record, "account_name"))?,
            amount: parse_amount("amount", columns.get(record, "amount"))?,
            description: columns.get(record, "description").to_string(),
            category: columns.get(record, "category").to_string(),
            date: parse_timestamp(columns.get(record, "date"))?,
        })
    }

    fn store_row(&self, conn: &Connection, row: &TransactionRow) -> Result<RowOutcome> {
        let account = db::ensure_account(conn, &row.account_name, AccountType::Checking)?;
        let input = TransactionInput {
            account_id: account.id,
            amount: row.amount,
            description: row.description.clone(),
            category: row.category.clone(),
            date: row.date,
        };
        match db::insert_transaction(conn, &input)? {
            InsertOutcome::Inserted(_) => Ok(RowOutcome::Added),
            InsertOutcome::Duplicate => Ok(RowOutcome::Duplicate),
        }
    }
}

/// `symbol, shares, purchase_price, current_price, purchase_date` — upsert by symbol
pub struct InvestmentsImporter;

impl CsvImporter for InvestmentsImporter {
    type Row = HoldingInput;

    fn kind(&self) -> ImportKind {
        ImportKind::Investments
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &["symbol", "shares", "purchase_price", "current_price", "purchase_date"]
    }

    fn parse_row(&self, record: &StringRecord, columns: &Columns) -> Result<HoldingInput, ImportError> {
        let shares = parse_amount("shares", columns.get(record, "shares"))?;
        if shares < 0.0 {
            return Err(ImportError::NegativeShares(shares));
        }

        Ok(HoldingInput {
            symbol: required_text("symbol", columns.get(record, "symbol"))?.to_uppercase(),
            shares,
            purchase_price: parse_amount("purchase_price", columns.get(record, "purchase_price"))?,
            current_price: parse_amount("current_price", columns.get(record, "current_price"))?,
            purchase_date: parse_timestamp(columns.get(record, "purchase_date"))?,
        })
    }

    fn store_row(&self, conn: &Connection, row: &HoldingInput) -> Result<RowOutcome> {
        Ok(db::upsert_holding(conn, row)?.into())
    }
}

/// `category, month, monthly_limit, spent` — upsert by (category, month)
pub struct BudgetsImporter;

impl CsvImporter for BudgetsImporter {
    type Row = BudgetInput;

    fn kind(&self) -> ImportKind {
        ImportKind::Budgets
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &["category", "month", "monthly_limit", "spent"]
    }

    fn parse_row(&self, record: &StringRecord, columns: &Columns) -> Result<BudgetInput, ImportError> {
        Ok(BudgetInput {
            category: required_text("category", columns.get(record, "category"))?,
            month: parse_month_key(columns.get(record, "month"))?,
            monthly_limit: parse_amount("monthly_limit", columns.get(record, "monthly_limit"))?,
            spent: parse_amount("spent", columns.get(record, "spent"))?,
        })
    }

    fn store_row(&self, conn: &Connection, row: &BudgetInput) -> Result<RowOutcome> {
        Ok(db::upsert_budget(conn, row)?.into())
    }
}
