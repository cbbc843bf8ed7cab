// 📊 Metrics Engine
// Deterministic aggregation over a FinancialSnapshot.
// No I/O, no randomness; every function is total and empty input degrades to zero/empty.

use crate::allocation::{AllocationRules, AssetClass};
use crate::models::{month_key, Budget, FinancialSnapshot};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trailing cash-flow window used when the caller does not override it.
pub const DEFAULT_CASH_FLOW_DAYS: i64 = 365;

// ============================================================================
// NET WORTH & PORTFOLIO VALUE
// ============================================================================

/// Non-credit balances plus holdings' market value, minus credit balances.
pub fn net_worth(snapshot: &FinancialSnapshot) -> f64 {
    let accounts: f64 = snapshot
        .accounts
        .iter()
        .map(|account| account.net_worth_contribution())
        .sum();

    accounts + portfolio_value(snapshot)
}

/// Σ shares × current_price over all holdings.
pub fn portfolio_value(snapshot: &FinancialSnapshot) -> f64 {
    snapshot.holdings.iter().map(|h| h.market_value()).sum()
}

// ============================================================================
// CASH FLOW
// ============================================================================

/// Time window for cash-flow aggregation. Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CashFlowWindow {
    pub end: DateTime<Utc>,
    pub days: i64,
}

impl CashFlowWindow {
    /// Window of `days` ending now
    pub fn trailing_days(days: i64) -> Self {
        CashFlowWindow {
            end: Utc::now(),
            days,
        }
    }

    /// Window of `days` ending at a fixed instant
    pub fn ending_at(end: DateTime<Utc>, days: i64) -> Self {
        CashFlowWindow { end, days }
    }

    /// Earliest instant inside the window. `None` when the span is too large to
    /// represent, in which case the window reaches back to the start of history.
    pub fn start(&self) -> Option<DateTime<Utc>> {
        Duration::try_days(self.days).and_then(|span| self.end.checked_sub_signed(span))
    }

    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        if self.days <= 0 || *at > self.end {
            return false;
        }
        match self.start() {
            Some(start) => *at >= start,
            None => true,
        }
    }
}

impl Default for CashFlowWindow {
    fn default() -> Self {
        CashFlowWindow::trailing_days(DEFAULT_CASH_FLOW_DAYS)
    }
}

/// Monthly income/expense series; the three vectors are index-aligned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CashFlow {
    pub income: Vec<f64>,
    pub expenses: Vec<f64>,
    pub dates: Vec<String>,
}

impl CashFlow {
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// (income, expenses) of the most recent month in the series
    pub fn latest(&self) -> Option<(f64, f64)> {
        match (self.income.last(), self.expenses.last()) {
            (Some(income), Some(expenses)) => Some((*income, *expenses)),
            _ => None,
        }
    }
}

/// Group in-window transactions by calendar month (UTC).
///
/// Inflows sum into income, outflows into expenses (as a positive number).
/// Months are chronological; months without any transaction are omitted.
pub fn cash_flow(snapshot: &FinancialSnapshot, window: &CashFlowWindow) -> CashFlow {
    // YYYY-MM keys sort chronologically
    let mut months: BTreeMap<String, (f64, f64)> = BTreeMap::new();

    for tx in snapshot.transactions.iter().filter(|tx| window.contains(&tx.date)) {
        let entry = months.entry(month_key(&tx.date)).or_insert((0.0, 0.0));
        if tx.is_inflow() {
            entry.0 += tx.amount;
        } else if tx.is_outflow() {
            entry.1 += tx.amount.abs();
        }
    }

    let mut flow = CashFlow::default();
    for (month, (income, expenses)) in months {
        flow.dates.push(month);
        flow.income.push(income);
        flow.expenses.push(expenses);
    }
    flow
}

// ============================================================================
// ASSET ALLOCATION
// ============================================================================

/// Percentage of portfolio value per asset class, rounded to 2 decimals.
///
/// Returns an empty mapping when the portfolio has no positive value.
pub fn asset_allocation(
    snapshot: &FinancialSnapshot,
    rules: &AllocationRules,
) -> BTreeMap<AssetClass, f64> {
    let mut by_class: BTreeMap<AssetClass, f64> = BTreeMap::new();
    let mut total = 0.0;

    for holding in &snapshot.holdings {
        let value = holding.market_value();
        total += value;
        *by_class.entry(rules.classify(&holding.symbol)).or_insert(0.0) += value;
    }

    if total <= 0.0 {
        return BTreeMap::new();
    }

    by_class
        .into_iter()
        .map(|(class, value)| (class, round_to_cents(value / total * 100.0)))
        .collect()
}

// ============================================================================
// BUDGETS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub category: String,
    pub limit: f64,
    pub spent: f64,
    pub remaining: f64,
}

impl BudgetStatus {
    pub fn is_over_budget(&self) -> bool {
        self.remaining < 0.0
    }
}

/// Status of every budget for `month` (YYYY-MM), in input order.
pub fn budget_status(budgets: &[Budget], month: &str) -> Vec<BudgetStatus> {
    budgets
        .iter()
        .filter(|b| b.month == month)
        .map(|b| BudgetStatus {
            category: b.category.clone(),
            limit: b.monthly_limit,
            spent: b.spent,
            remaining: b.remaining(),
        })
        .collect()
}

/// Round a currency amount or percentage to 2 decimals.
pub fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
