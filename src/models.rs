// 💳 Domain Model - Accounts, Transactions, Holdings, Budgets
//
// Persisted entities come out of the store with their row id.
// The *Input structs are what ingestion (CSV upload or seed generation)
// hands to the store; the store matches them by natural key.

use crate::error::ImportError;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ACCOUNT TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Checking account (debit card, daily transactions)
    Checking,

    /// Savings account (interest-bearing)
    Savings,

    /// Investment account (brokerage, retirement)
    Investment,

    /// Credit card (balance is owed, not owned)
    Credit,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Checking => "checking",
            AccountType::Savings => "savings",
            AccountType::Investment => "investment",
            AccountType::Credit => "credit",
        }
    }

    /// Credit balances are liabilities and count against net worth.
    pub fn is_liability(&self) -> bool {
        matches!(self, AccountType::Credit)
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "checking" => Ok(AccountType::Checking),
            "savings" => Ok(AccountType::Savings),
            "investment" => Ok(AccountType::Investment),
            "credit" => Ok(AccountType::Credit),
            other => Err(ImportError::UnknownAccountType(other.to_string())),
        }
    }
}

// ============================================================================
// ENTITIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,

    /// Natural key used by upserts (e.g., "Chase Checking")
    pub name: String,

    pub account_type: AccountType,

    /// Signed balance. For credit accounts this is the amount owed.
    pub balance: f64,

    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Contribution of this account to net worth.
    pub fn net_worth_contribution(&self) -> f64 {
        if self.account_type.is_liability() {
            -self.balance
        } else {
            self.balance
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub account_id: i64,

    /// Positive = inflow, negative = outflow
    pub amount: f64,

    pub description: String,
    pub category: String,
    pub date: DateTime<Utc>,
}

impl Transaction {
    pub fn is_inflow(&self) -> bool {
        self.amount > 0.0
    }

    pub fn is_outflow(&self) -> bool {
        self.amount < 0.0
    }
}

/// A position in a single symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub id: i64,
    pub symbol: String,
    pub shares: f64,
    pub purchase_price: f64,
    pub current_price: f64,
    pub purchase_date: DateTime<Utc>,
}

impl Holding {
    pub fn market_value(&self) -> f64 {
        self.shares * self.current_price
    }

    pub fn cost_basis(&self) -> f64 {
        self.shares * self.purchase_price
    }

    pub fn unrealized_gain(&self) -> f64 {
        self.market_value() - self.cost_basis()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub id: i64,
    pub category: String,

    /// Month key, YYYY-MM
    pub month: String,

    pub monthly_limit: f64,
    pub spent: f64,
}

impl Budget {
    /// Not clamped: over-budget categories go negative.
    pub fn remaining(&self) -> f64 {
        self.monthly_limit - self.spent
    }

    pub fn is_over_budget(&self) -> bool {
        self.spent > self.monthly_limit
    }
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Read-only view handed to the metrics engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinancialSnapshot {
    pub accounts: Vec<Account>,
    pub transactions: Vec<Transaction>,
    pub holdings: Vec<Holding>,
}

impl FinancialSnapshot {
    pub fn new(accounts: Vec<Account>, transactions: Vec<Transaction>, holdings: Vec<Holding>) -> Self {
        FinancialSnapshot {
            accounts,
            transactions,
            holdings,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.transactions.is_empty() && self.holdings.is_empty()
    }
}

// ============================================================================
// INGESTION INPUTS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct AccountInput {
    pub name: String,
    pub account_type: AccountType,
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionInput {
    pub account_id: i64,
    pub amount: f64,
    pub description: String,
    pub category: String,
    pub date: DateTime<Utc>,
}

impl TransactionInput {
    /// Hash used to skip re-imported rows.
    /// Identity stays the row id; this is for deduplication only.
    pub fn compute_idempotency_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{:.4}|{}",
            self.account_id,
            self.date.to_rfc3339(),
            self.amount,
            self.description
        ));
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HoldingInput {
    pub symbol: String,
    pub shares: f64,
    pub purchase_price: f64,
    pub current_price: f64,
    pub purchase_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetInput {
    pub category: String,
    pub month: String,
    pub monthly_limit: f64,
    pub spent: f64,
}

// ============================================================================
// MONTH KEYS
// ============================================================================

/// Format the month key (YYYY-MM) an instant falls into.
pub fn month_key(date: &DateTime<Utc>) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Validate and normalize a YYYY-MM month key.
pub fn parse_month_key(raw: &str) -> Result<String, ImportError> {
    let trimmed = raw.trim();
    if trimmed.len() != 7 {
        return Err(ImportError::InvalidMonth(raw.to_string()));
    }
    NaiveDate::parse_from_str(&format!("{}-01", trimmed), "%Y-%m-%d")
        .map(|d| format!("{:04}-{:02}", d.year(), d.month()))
        .map_err(|_| ImportError::InvalidMonth(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn account(account_type: AccountType, balance: f64) -> Account {
        Account {
            id: 1,
            name: "Test".to_string(),
            account_type,
            balance,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_account_type_parses_case_insensitively() {
        assert_eq!("Checking".parse::<AccountType>().unwrap(), AccountType::Checking);
        assert_eq!(" CREDIT ".parse::<AccountType>().unwrap(), AccountType::Credit);
        assert!(matches!(
            "brokerage".parse::<AccountType>(),
            Err(ImportError::UnknownAccountType(_))
        ));
    }

    #[test]
    fn test_credit_balance_counts_against_net_worth() {
        assert_eq!(account(AccountType::Savings, 500.0).net_worth_contribution(), 500.0);
        assert_eq!(account(AccountType::Credit, 500.0).net_worth_contribution(), -500.0);
    }

    #[test]
    fn test_budget_remaining_is_not_clamped() {
        let budget = Budget {
            id: 1,
            category: "Utilities".to_string(),
            month: "2025-09".to_string(),
            monthly_limit: 300.0,
            spent: 320.0,
        };
        assert_eq!(budget.remaining(), -20.0);
        assert!(budget.is_over_budget());
    }

    #[test]
    fn test_holding_values() {
        let holding = Holding {
            id: 1,
            symbol: "SPY".to_string(),
            shares: 10.0,
            purchase_price: 400.0,
            current_price: 420.0,
            purchase_date: Utc::now(),
        };
        assert_eq!(holding.market_value(), 4200.0);
        assert_eq!(holding.cost_basis(), 4000.0);
        assert_eq!(holding.unrealized_gain(), 200.0);
    }

    #[test]
    fn test_month_keys() {
        let date = Utc.with_ymd_and_hms(2025, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(month_key(&date), "2025-03");
        assert_eq!(parse_month_key("2025-09").unwrap(), "2025-09");
        assert!(parse_month_key("2025-13").is_err());
        assert!(parse_month_key("2025-9").is_err());
        assert!(parse_month_key("September").is_err());
    }

    #[test]
    fn test_idempotency_hash_is_stable() {
        let input = TransactionInput {
            account_id: 1,
            amount: -45.99,
            description: "Grocery Store".to_string(),
            category: "Food".to_string(),
            date: Utc.with_ymd_and_hms(2025, 9, 19, 0, 0, 0).unwrap(),
        };
        let hash1 = input.compute_idempotency_hash();
        let hash2 = input.clone().compute_idempotency_hash();
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64, "SHA-256 hash should be 64 hex characters");

        let other = TransactionInput {
            amount: -46.99,
            ..input
        };
        assert_ne!(hash1, other.compute_idempotency_hash());
    }
}
