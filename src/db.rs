// 🗄️ SQLite Store - accounts, transactions, investments, budgets + audit trail
//
// Upserts match by natural key: Account by name, Holding by symbol,
// Budget by (category, month). Transactions are insert-only and
// deduplicated through an idempotency hash.

use crate::models::{
    Account, AccountInput, AccountType, Budget, BudgetInput, FinancialSnapshot, Holding,
    HoldingInput, Transaction, TransactionInput,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ============================================================================
// OUTCOMES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(i64),
    Updated(i64),
}

impl UpsertOutcome {
    pub fn id(&self) -> i64 {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Updated(id) => *id,
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, UpsertOutcome::Inserted(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i64),
    Duplicate,
}

/// Tables whose row counts can be queried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Accounts,
    Transactions,
    Investments,
    Budgets,
    Events,
}

impl Table {
    fn as_str(&self) -> &'static str {
        match self {
            Table::Accounts => "accounts",
            Table::Transactions => "transactions",
            Table::Investments => "investments",
            Table::Budgets => "budgets",
            Table::Events => "events",
        }
    }
}

/// Transaction joined with its owning account's name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountTransaction {
    pub transaction: Transaction,
    pub account_name: String,
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

/// Event for audit trail ("every change is an event")
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

const ACTOR: &str = "store";

// ============================================================================
// SCHEMA
// ============================================================================

/// Open (or create) a database file and make sure the schema exists
pub fn open_database(path: &Path) -> Result<Connection> {
    info!("Opening database at: {:?}", path);
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database: {:?}", path))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery (in-memory databases ignore it)
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL,
            account_type TEXT NOT NULL,
            balance REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL REFERENCES accounts(id),
            idempotency_hash TEXT UNIQUE NOT NULL,
            amount REAL NOT NULL,
            description TEXT NOT NULL,
            category TEXT NOT NULL,
            date TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS investments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            symbol TEXT UNIQUE NOT NULL,
            shares REAL NOT NULL,
            purchase_price REAL NOT NULL,
            current_price REAL NOT NULL,
            purchase_date TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS budgets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            category TEXT NOT NULL,
            month TEXT NOT NULL,
            monthly_limit REAL NOT NULL,
            spent REAL NOT NULL DEFAULT 0,
            UNIQUE(category, month)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(account_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_budgets_month ON budgets(month)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn account_from_row(row: &Row) -> rusqlite::Result<Account> {
    let type_str: String = row.get(2)?;
    let account_type = type_str
        .parse::<AccountType>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(Account {
        id: row.get(0)?,
        name: row.get(1)?,
        account_type,
        balance: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn transaction_from_row(row: &Row) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        account_id: row.get(1)?,
        amount: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        date: row.get(5)?,
    })
}

fn holding_from_row(row: &Row) -> rusqlite::Result<Holding> {
    Ok(Holding {
        id: row.get(0)?,
        symbol: row.get(1)?,
        shares: row.get(2)?,
        purchase_price: row.get(3)?,
        current_price: row.get(4)?,
        purchase_date: row.get(5)?,
    })
}

fn budget_from_row(row: &Row) -> rusqlite::Result<Budget> {
    Ok(Budget {
        id: row.get(0)?,
        category: row.get(1)?,
        month: row.get(2)?,
        monthly_limit: row.get(3)?,
        spent: row.get(4)?,
    })
}

// ============================================================================
// ACCOUNTS
// ============================================================================

pub fn find_account_by_name(conn: &Connection, name: &str) -> Result<Option<Account>> {
    let account = conn
        .query_row(
            "SELECT id, name, account_type, balance, created_at FROM accounts WHERE name = ?1",
            [name],
            account_from_row,
        )
        .optional()?;
    Ok(account)
}

/// Insert a new account or update type and balance of the one with the same name
pub fn upsert_account(conn: &Connection, input: &AccountInput) -> Result<UpsertOutcome> {
    if let Some(existing) = find_account_by_name(conn, &input.name)? {
        conn.execute(
            "UPDATE accounts SET account_type = ?1, balance = ?2 WHERE id = ?3",
            params![input.account_type.as_str(), input.balance, existing.id],
        )?;
        record_event(
            conn,
            "account_updated",
            "account",
            &input.name,
            serde_json::json!({
                "account_type": input.account_type.as_str(),
                "previous_balance": existing.balance,
                "balance": input.balance,
            }),
        )?;
        return Ok(UpsertOutcome::Updated(existing.id));
    }

    conn.execute(
        "INSERT INTO accounts (name, account_type, balance, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![input.name, input.account_type.as_str(), input.balance, Utc::now()],
    )?;
    let id = conn.last_insert_rowid();
    record_event(
        conn,
        "account_added",
        "account",
        &input.name,
        serde_json::json!({
            "account_type": input.account_type.as_str(),
            "balance": input.balance,
        }),
    )?;
    debug!("Added account '{}' ({})", input.name, input.account_type);
    Ok(UpsertOutcome::Inserted(id))
}

/// Look up an account by name, creating an empty one of `default_type` if missing
pub fn ensure_account(conn: &Connection, name: &str, default_type: AccountType) -> Result<Account> {
    if let Some(account) = find_account_by_name(conn, name)? {
        return Ok(account);
    }

    upsert_account(
        conn,
        &AccountInput {
            name: name.to_string(),
            account_type: default_type,
            balance: 0.0,
        },
    )?;

    find_account_by_name(conn, name)?
        .with_context(|| format!("Account '{}' missing right after insert", name))
}

pub fn get_accounts(conn: &Connection) -> Result<Vec<Account>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, account_type, balance, created_at FROM accounts ORDER BY id",
    )?;
    let accounts = stmt
        .query_map([], account_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(accounts)
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

/// Insert a transaction unless an identical one was already imported
pub fn insert_transaction(conn: &Connection, input: &TransactionInput) -> Result<InsertOutcome> {
    let hash = input.compute_idempotency_hash();

    let result = conn.execute(
        "INSERT INTO transactions (account_id, idempotency_hash, amount, description, category, date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            input.account_id,
            hash,
            input.amount,
            input.description,
            input.category,
            input.date,
        ],
    );

    match result {
        Ok(_) => {
            let id = conn.last_insert_rowid();
            record_event(
                conn,
                "transaction_added",
                "transaction",
                &hash,
                serde_json::json!({
                    "account_id": input.account_id,
                    "amount": input.amount,
                    "category": input.category,
                }),
            )?;
            Ok(InsertOutcome::Inserted(id))
        }
        Err(rusqlite::Error::SqliteFailure(err, msg))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            // Only the hash collision is a duplicate; a dangling account id is a real error
            if msg.as_deref().map_or(false, |m| m.contains("idempotency_hash")) {
                Ok(InsertOutcome::Duplicate)
            } else {
                Err(anyhow::Error::new(rusqlite::Error::SqliteFailure(err, msg))
                    .context("Failed to insert transaction"))
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Delete one transaction; the owning account is left untouched
pub fn delete_transaction(conn: &Connection, id: i64) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM transactions WHERE id = ?1", [id])?;
    if deleted > 0 {
        record_event(
            conn,
            "transaction_deleted",
            "transaction",
            &id.to_string(),
            serde_json::json!({}),
        )?;
    }
    Ok(deleted > 0)
}

/// All transactions, oldest first
pub fn get_transactions(conn: &Connection) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(
        "SELECT id, account_id, amount, description, category, date
         FROM transactions
         ORDER BY date ASC, id ASC",
    )?;
    let transactions = stmt
        .query_map([], transaction_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(transactions)
}

/// Newest transactions first, joined with the account name
pub fn get_recent_transactions(conn: &Connection, limit: usize) -> Result<Vec<AccountTransaction>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.account_id, t.amount, t.description, t.category, t.date, a.name
         FROM transactions t
         JOIN accounts a ON a.id = t.account_id
         ORDER BY t.date DESC, t.id DESC
         LIMIT ?1",
    )?;
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = stmt
        .query_map([limit], |row| {
            Ok(AccountTransaction {
                transaction: transaction_from_row(row)?,
                account_name: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============================================================================
// INVESTMENTS
// ============================================================================

pub fn find_holding_by_symbol(conn: &Connection, symbol: &str) -> Result<Option<Holding>> {
    let holding = conn
        .query_row(
            "SELECT id, symbol, shares, purchase_price, current_price, purchase_date
             FROM investments WHERE symbol = ?1",
            [symbol],
            holding_from_row,
        )
        .optional()?;
    Ok(holding)
}

/// Insert a holding or overwrite the position with the same symbol
pub fn upsert_holding(conn: &Connection, input: &HoldingInput) -> Result<UpsertOutcome> {
    if let Some(existing) = find_holding_by_symbol(conn, &input.symbol)? {
        conn.execute(
            "UPDATE investments
             SET shares = ?1, purchase_price = ?2, current_price = ?3, purchase_date = ?4
             WHERE id = ?5",
            params![
                input.shares,
                input.purchase_price,
                input.current_price,
                input.purchase_date,
                existing.id,
            ],
        )?;
        record_event(
            conn,
            "holding_updated",
            "investment",
            &input.symbol,
            serde_json::json!({
                "previous_shares": existing.shares,
                "shares": input.shares,
                "current_price": input.current_price,
            }),
        )?;
        return Ok(UpsertOutcome::Updated(existing.id));
    }

    conn.execute(
        "INSERT INTO investments (symbol, shares, purchase_price, current_price, purchase_date)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            input.symbol,
            input.shares,
            input.purchase_price,
            input.current_price,
            input.purchase_date,
        ],
    )?;
    let id = conn.last_insert_rowid();
    record_event(
        conn,
        "holding_added",
        "investment",
        &input.symbol,
        serde_json::json!({
            "shares": input.shares,
            "current_price": input.current_price,
        }),
    )?;
    Ok(UpsertOutcome::Inserted(id))
}

/// Set the current price of one holding. Returns false if the symbol is unknown.
pub fn update_holding_price(conn: &Connection, symbol: &str, price: f64) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE investments SET current_price = ?1 WHERE symbol = ?2",
        params![price, symbol],
    )?;
    Ok(updated > 0)
}

pub fn get_holdings(conn: &Connection) -> Result<Vec<Holding>> {
    let mut stmt = conn.prepare(
        "SELECT id, symbol, shares, purchase_price, current_price, purchase_date
         FROM investments
         ORDER BY id",
    )?;
    let holdings = stmt
        .query_map([], holding_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(holdings)
}

// ============================================================================
// BUDGETS
// ============================================================================

/// Insert a budget or overwrite limit and spent for the same category and month
pub fn upsert_budget(conn: &Connection, input: &BudgetInput) -> Result<UpsertOutcome> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM budgets WHERE category = ?1 AND month = ?2",
            params![input.category, input.month],
            |row| row.get(0),
        )
        .optional()?;

    let key = format!("{}:{}", input.month, input.category);
    let data = serde_json::json!({
        "monthly_limit": input.monthly_limit,
        "spent": input.spent,
    });

    if let Some(id) = existing {
        conn.execute(
            "UPDATE budgets SET monthly_limit = ?1, spent = ?2 WHERE id = ?3",
            params![input.monthly_limit, input.spent, id],
        )?;
        record_event(conn, "budget_updated", "budget", &key, data)?;
        return Ok(UpsertOutcome::Updated(id));
    }

    conn.execute(
        "INSERT INTO budgets (category, month, monthly_limit, spent) VALUES (?1, ?2, ?3, ?4)",
        params![input.category, input.month, input.monthly_limit, input.spent],
    )?;
    let id = conn.last_insert_rowid();
    record_event(conn, "budget_added", "budget", &key, data)?;
    Ok(UpsertOutcome::Inserted(id))
}

pub fn get_budgets_for_month(conn: &Connection, month: &str) -> Result<Vec<Budget>> {
    let mut stmt = conn.prepare(
        "SELECT id, category, month, monthly_limit, spent
         FROM budgets
         WHERE month = ?1
         ORDER BY id",
    )?;
    let budgets = stmt
        .query_map([month], budget_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(budgets)
}

pub fn get_all_budgets(conn: &Connection) -> Result<Vec<Budget>> {
    let mut stmt = conn.prepare(
        "SELECT id, category, month, monthly_limit, spent FROM budgets ORDER BY month, id",
    )?;
    let budgets = stmt
        .query_map([], budget_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(budgets)
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Read accounts, transactions and holdings into one immutable view
pub fn load_snapshot(conn: &Connection) -> Result<FinancialSnapshot> {
    let snapshot = FinancialSnapshot::new(
        get_accounts(conn).context("Failed to load accounts")?,
        get_transactions(conn).context("Failed to load transactions")?,
        get_holdings(conn).context("Failed to load holdings")?,
    );
    debug!(
        "Loaded snapshot: {} accounts, {} transactions, {} holdings",
        snapshot.accounts.len(),
        snapshot.transactions.len(),
        snapshot.holdings.len()
    );
    Ok(snapshot)
}

/// Remove all accounts, transactions, holdings and budgets. The audit trail is kept.
pub fn clear_all(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "DELETE FROM transactions;
         DELETE FROM accounts;
         DELETE FROM investments;
         DELETE FROM budgets;",
    )?;
    record_event(conn, "store_cleared", "store", "all", serde_json::json!({}))?;
    info!("Cleared accounts, transactions, investments and budgets");
    Ok(())
}

pub fn count_rows(conn: &Connection, table: Table) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table.as_str());
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// EVENTS
// ============================================================================

fn record_event(
    conn: &Connection,
    event_type: &str,
    entity_type: &str,
    entity_id: &str,
    data: serde_json::Value,
) -> Result<()> {
    insert_event(conn, &Event::new(event_type, entity_type, entity_id, data, ACTOR))
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp,
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: row.get(1)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}
