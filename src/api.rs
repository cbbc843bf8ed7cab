// 🔌 Query Layer
// Response shapes and the read/write operations behind every HTTP route.
// Handlers stay thin: load from the store, call the pure engine, shape JSON.

use crate::allocation::AllocationRules;
use crate::db;
use crate::error::EngineResult;
use crate::metrics::{self, round_to_cents, BudgetStatus, CashFlow, CashFlowWindow};
use crate::models::{month_key, parse_month_key};
use crate::prices::{self, PriceSource};
use crate::projection::{self, Projection, ProjectionParams};
use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_RECENT_LIMIT: usize = 100;

// ============================================================================
// RESPONSES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetWorthResponse {
    pub net_worth: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioValueResponse {
    pub portfolio_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionResponse {
    pub percentile_10: f64,
    pub percentile_50: f64,
    pub percentile_90: f64,
    pub current_value: f64,
    pub years: i32,
    pub trials: i32,
}

impl From<Projection> for ProjectionResponse {
    fn from(p: Projection) -> Self {
        ProjectionResponse {
            percentile_10: round_to_cents(p.p10),
            percentile_50: round_to_cents(p.p50),
            percentile_90: round_to_cents(p.p90),
            current_value: round_to_cents(p.current_value),
            years: p.years,
            trials: p.trials,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentTransaction {
    pub id: i64,
    pub amount: f64,
    pub description: String,
    pub category: String,
    pub date: String,
    pub account: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub net_worth: f64,
    pub portfolio_value: f64,
    pub monthly_income: f64,
    pub monthly_expenses: f64,
    pub total_transactions: usize,
    pub last_updated: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub updated: usize,
    pub failed: Vec<String>,
    pub portfolio_value: f64,
}

/// Optional overrides from the query string; unset fields use configured defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct ProjectionQuery {
    pub years: Option<i32>,
    pub trials: Option<i32>,
    pub mean_return: Option<f64>,
    pub volatility: Option<f64>,
    pub seed: Option<u64>,
}

impl ProjectionQuery {
    pub fn apply(&self, defaults: ProjectionParams) -> ProjectionParams {
        ProjectionParams {
            current_value: defaults.current_value,
            years: self.years.unwrap_or(defaults.years),
            trials: self.trials.unwrap_or(defaults.trials),
            mean_return: self.mean_return.unwrap_or(defaults.mean_return),
            volatility: self.volatility.unwrap_or(defaults.volatility),
            max_years: defaults.max_years,
            max_trials: defaults.max_trials,
        }
    }
}

// ============================================================================
// OPERATIONS
// ============================================================================

pub fn health() -> HealthResponse {
    HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    }
}

pub fn get_net_worth(conn: &Connection) -> Result<NetWorthResponse> {
    let snapshot = db::load_snapshot(conn)?;
    Ok(NetWorthResponse {
        net_worth: round_to_cents(metrics::net_worth(&snapshot)),
    })
}

/// Read-only: prices are whatever the last refresh stored
pub fn get_portfolio_value(conn: &Connection) -> Result<PortfolioValueResponse> {
    let snapshot = db::load_snapshot(conn)?;
    Ok(PortfolioValueResponse {
        portfolio_value: round_to_cents(metrics::portfolio_value(&snapshot)),
    })
}

pub fn get_cash_flow(conn: &Connection, days: i64) -> Result<CashFlow> {
    let snapshot = db::load_snapshot(conn)?;
    let mut flow = metrics::cash_flow(&snapshot, &CashFlowWindow::trailing_days(days));
    flow.income.iter_mut().for_each(|v| *v = round_to_cents(*v));
    flow.expenses.iter_mut().for_each(|v| *v = round_to_cents(*v));
    Ok(flow)
}

/// Percent per asset class, keyed by class name
pub fn get_asset_allocation(conn: &Connection, rules: &AllocationRules) -> Result<BTreeMap<String, f64>> {
    let snapshot = db::load_snapshot(conn)?;
    Ok(metrics::asset_allocation(&snapshot, rules)
        .into_iter()
        .map(|(class, pct)| (class.to_string(), pct))
        .collect())
}

/// Budgets for `month` (YYYY-MM), defaulting to the current month
pub fn get_budget_status(conn: &Connection, month: Option<&str>) -> Result<Vec<BudgetStatus>> {
    let month = match month {
        Some(raw) => parse_month_key(raw)?,
        None => month_key(&Utc::now()),
    };
    let budgets = db::get_budgets_for_month(conn, &month)?;
    Ok(metrics::budget_status(&budgets, &month))
}

/// Projection inputs seeded with the current portfolio value
pub fn projection_params(
    conn: &Connection,
    query: &ProjectionQuery,
    defaults: ProjectionParams,
) -> Result<ProjectionParams> {
    let snapshot = db::load_snapshot(conn)?;
    Ok(query
        .apply(defaults)
        .with_current_value(metrics::portfolio_value(&snapshot)))
}

/// Simulate without touching the store; a seed makes the result reproducible
pub fn run_projection(params: &ProjectionParams, seed: Option<u64>) -> EngineResult<ProjectionResponse> {
    let projection = match seed {
        Some(seed) => projection::project_seeded(params, seed)?,
        None => projection::project_with_entropy(params)?,
    };
    Ok(projection.into())
}

pub fn get_recent_transactions(conn: &Connection, limit: usize) -> Result<Vec<RecentTransaction>> {
    let rows = db::get_recent_transactions(conn, limit)?;
    Ok(rows
        .into_iter()
        .map(|row| RecentTransaction {
            id: row.transaction.id,
            amount: row.transaction.amount,
            description: row.transaction.description,
            category: row.transaction.category,
            date: row.transaction.date.to_rfc3339(),
            account: row.account_name,
        })
        .collect())
}

/// Headline numbers; monthly figures come from the latest month with activity
pub fn get_summary(conn: &Connection, cash_flow_days: i64) -> Result<SummaryResponse> {
    let snapshot = db::load_snapshot(conn)?;
    let flow = metrics::cash_flow(&snapshot, &CashFlowWindow::trailing_days(cash_flow_days));
    let (monthly_income, monthly_expenses) = flow.latest().unwrap_or((0.0, 0.0));

    Ok(SummaryResponse {
        net_worth: round_to_cents(metrics::net_worth(&snapshot)),
        portfolio_value: round_to_cents(metrics::portfolio_value(&snapshot)),
        monthly_income: round_to_cents(monthly_income),
        monthly_expenses: round_to_cents(monthly_expenses),
        total_transactions: snapshot.transactions.len(),
        last_updated: Utc::now().to_rfc3339(),
    })
}

pub fn refresh_portfolio_prices<S: PriceSource + ?Sized>(conn: &Connection, source: &mut S) -> Result<RefreshResponse> {
    let refresh = prices::refresh_prices(conn, source)?;
    let value = get_portfolio_value(conn)?;
    Ok(RefreshResponse {
        updated: refresh.updated,
        failed: refresh.failed,
        portfolio_value: value.portfolio_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{insert_transaction, setup_database, upsert_account, upsert_budget, upsert_holding};
    use crate::error::{EngineError, ImportError};
    use crate::models::{AccountInput, AccountType, BudgetInput, HoldingInput, TransactionInput};
    use crate::prices::StaticPriceSource;
    use chrono::Duration;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let checking = upsert_account(
            &conn,
            &AccountInput {
                name: "Chase Checking".into(),
                account_type: AccountType::Checking,
                balance: 5000.0,
            },
        )
        .unwrap()
        .id();
        upsert_account(
            &conn,
            &AccountInput {
                name: "Chase Sapphire Credit".into(),
                account_type: AccountType::Credit,
                balance: 1000.0,
            },
        )
        .unwrap();

        let now = Utc::now();
        for (amount, description, days_ago) in [(3000.0, "Salary", 1), (-200.0, "Groceries", 2), (-50.0, "Coffee", 400)] {
            insert_transaction(
                &conn,
                &TransactionInput {
                    account_id: checking,
                    amount,
                    description: description.into(),
                    category: "General".into(),
                    date: now - Duration::days(days_ago),
                },
            )
            .unwrap();
        }

        for (symbol, shares, price) in [("SPY", 10.0, 400.0), ("BOND", 20.0, 50.0)] {
            upsert_holding(
                &conn,
                &HoldingInput {
                    symbol: symbol.into(),
                    shares,
                    purchase_price: price,
                    current_price: price,
                    purchase_date: now,
                },
            )
            .unwrap();
        }
        conn
    }

    #[test]
    fn test_net_worth_and_portfolio_value() {
        let conn = test_db();

        // 5000 - 1000 + 4000 + 1000
        assert_eq!(get_net_worth(&conn).unwrap().net_worth, 9000.0);
        assert_eq!(get_portfolio_value(&conn).unwrap().portfolio_value, 5000.0);
    }

    #[test]
    fn test_asset_allocation_keys_are_class_names() {
        let conn = test_db();

        let allocation = get_asset_allocation(&conn, &AllocationRules::default()).unwrap();

        assert_eq!(allocation.get("Stocks"), Some(&80.0));
        assert_eq!(allocation.get("Bonds"), Some(&20.0));
        assert_eq!(allocation.len(), 2);
    }

    #[test]
    fn test_cash_flow_respects_window() {
        let conn = test_db();

        let flow = get_cash_flow(&conn, 365).unwrap();

        assert_eq!(flow.income.iter().sum::<f64>(), 3000.0);
        assert_eq!(flow.expenses.iter().sum::<f64>(), 200.0);
        assert!(get_cash_flow(&conn, 0).unwrap().is_empty());
    }

    #[test]
    fn test_budget_status_for_month() {
        let conn = test_db();
        for (category, month) in [("Food", "2025-09"), ("Rent", "2025-08")] {
            upsert_budget(
                &conn,
                &BudgetInput {
                    category: category.into(),
                    month: month.into(),
                    monthly_limit: 500.0,
                    spent: 620.0,
                },
            )
            .unwrap();
        }

        let statuses = get_budget_status(&conn, Some("2025-09")).unwrap();

        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].category, "Food");
        assert_eq!(statuses[0].remaining, -120.0);

        let err = get_budget_status(&conn, Some("September")).unwrap_err();
        assert!(matches!(err.downcast_ref::<ImportError>(), Some(ImportError::InvalidMonth(_))));
    }

    #[test]
    fn test_projection_uses_portfolio_value_and_overrides() {
        let conn = test_db();
        let query = ProjectionQuery {
            years: Some(5),
            trials: Some(200),
            seed: Some(42),
            ..ProjectionQuery::default()
        };

        let params = projection_params(&conn, &query, ProjectionParams::default()).unwrap();
        assert_eq!(params.current_value, 5000.0);
        assert_eq!(params.years, 5);
        assert_eq!(params.volatility, 0.15);

        let first = run_projection(&params, query.seed).unwrap();
        let second = run_projection(&params, query.seed).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.trials, 200);
        assert_eq!(first.current_value, 5000.0);
        assert_eq!(first.percentile_50, round_to_cents(first.percentile_50));
    }

    #[test]
    fn test_projection_rejects_bad_trials() {
        let params = ProjectionQuery {
            trials: Some(0),
            ..ProjectionQuery::default()
        }
        .apply(ProjectionParams::default());

        let err = run_projection(&params, Some(1)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_query_cannot_raise_configured_limits() {
        let defaults = ProjectionParams {
            max_trials: 100,
            ..ProjectionParams::default()
        };
        let params = ProjectionQuery {
            trials: Some(i32::MAX),
            ..ProjectionQuery::default()
        }
        .apply(defaults);

        assert_eq!(params.max_trials, 100);
        assert!(run_projection(&params, Some(1)).is_err());
    }

    #[test]
    fn test_recent_transactions_newest_first_with_account() {
        let conn = test_db();

        let recent = get_recent_transactions(&conn, 2).unwrap();

        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].description, "Salary");
        assert_eq!(recent[1].description, "Groceries");
        assert_eq!(recent[0].account, "Chase Checking");
    }

    #[test]
    fn test_summary() {
        let conn = test_db();

        let summary = get_summary(&conn, 365).unwrap();

        assert_eq!(summary.net_worth, 9000.0);
        assert_eq!(summary.portfolio_value, 5000.0);
        assert_eq!(summary.total_transactions, 3);
        assert!(!summary.last_updated.is_empty());
    }

    #[test]
    fn test_summary_on_empty_store() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let summary = get_summary(&conn, 365).unwrap();

        assert_eq!(summary.net_worth, 0.0);
        assert_eq!(summary.monthly_income, 0.0);
        assert_eq!(summary.monthly_expenses, 0.0);
        assert_eq!(summary.total_transactions, 0);
    }

    #[test]
    fn test_refresh_then_read_value() {
        let conn = test_db();
        let mut source = StaticPriceSource::new().with_price("SPY", 500.0).with_price("BOND", 50.0);

        let refreshed = refresh_portfolio_prices(&conn, &mut source).unwrap();

        assert_eq!(refreshed.updated, 2);
        assert_eq!(refreshed.portfolio_value, 6000.0);
        assert_eq!(get_portfolio_value(&conn).unwrap().portfolio_value, 6000.0);
    }

    #[test]
    fn test_health() {
        assert_eq!(health().status, "healthy");
    }
}
