// 🌱 Sample Data
// Realistic demo dataset: six accounts, a year of templated transactions,
// a diversified portfolio and two months of budgets.
// All randomness comes from the caller's generator.

use crate::db::{self, InsertOutcome};
use crate::metrics::round_to_cents;
use crate::models::{
    month_key, AccountInput, AccountType, BudgetInput, HoldingInput, TransactionInput,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, Utc};
use log::info;
use rand::seq::SliceRandom;
use rand::Rng;
use rusqlite::Connection;
use serde::Serialize;

const MONTHS_OF_HISTORY: i64 = 12;

const ACCOUNTS: &[(&str, AccountType, f64)] = &[
    ("Chase Checking", AccountType::Checking, 4250.75),
    ("Wells Fargo Savings", AccountType::Savings, 28500.00),
    ("Vanguard 401k", AccountType::Investment, 125000.00),
    ("Fidelity Roth IRA", AccountType::Investment, 42000.00),
    ("Chase Sapphire Credit", AccountType::Credit, 1850.32),
    ("Emergency Fund", AccountType::Savings, 15000.00),
];

const SALARY: (&str, f64) = ("Monthly Salary - Tech Corp", 6500.00);

const FOOD: &[(&str, f64)] = &[
    ("Whole Foods Market", -85.50),
    ("Starbucks Coffee", -12.75),
    ("McDonald's", -8.99),
    ("Local Restaurant", -45.00),
    ("Grocery Store", -120.30),
    ("Food Delivery", -25.50),
];

const TRANSPORT: &[(&str, f64)] = &[
    ("Gas Station", -55.00),
    ("Uber Ride", -18.50),
    ("Metro Card", -30.00),
    ("Car Insurance", -125.00),
    ("Parking Fee", -15.00),
];

const ENTERTAINMENT: &[(&str, f64)] = &[
    ("Netflix Subscription", -15.99),
    ("Movie Theater", -28.00),
    ("Spotify Premium", -9.99),
    ("Concert Tickets", -120.00),
    ("Gaming Purchase", -59.99),
];

const SHOPPING: &[(&str, f64)] = &[
    ("Amazon Purchase", -67.99),
    ("Target", -89.50),
    ("Online Clothing", -125.00),
    ("Electronics Store", -299.99),
    ("Home Depot", -156.75),
];

const BILLS: &[(&str, f64)] = &[
    ("Electric Bill", -125.50),
    ("Internet & Cable", -89.99),
    ("Phone Bill", -65.00),
    ("Rent Payment", -2200.00),
    ("Water & Sewer", -45.30),
    ("Insurance Premium", -180.00),
];

const HEALTHCARE: &[(&str, f64)] = &[
    ("Doctor Visit", -150.00),
    ("Pharmacy", -25.99),
    ("Dental Cleaning", -200.00),
    ("Health Insurance", -320.00),
];

const INVESTMENT: &[(&str, f64)] = &[
    ("401k Contribution", -750.00),
    ("IRA Contribution", -500.00),
    ("Stock Purchase", -1000.00),
];

/// symbol, shares, purchase price, current price
const HOLDINGS: &[(&str, f64, f64, f64)] = &[
    ("SPY", 120.5, 385.00, 421.50),
    ("VTI", 85.2, 195.00, 218.75),
    ("AAPL", 25.0, 145.00, 172.50),
    ("MSFT", 18.0, 280.00, 315.25),
    ("GOOGL", 8.5, 2200.00, 2450.00),
    ("QQQ", 45.0, 325.00, 368.90),
    ("NVDA", 12.0, 425.00, 485.75),
    ("TSLA", 15.0, 180.00, 205.30),
    ("VTIAX", 200.0, 28.50, 31.20),
    ("BND", 150.0, 82.00, 78.45),
    ("VGIT", 75.0, 63.50, 61.80),
    ("VHT", 30.0, 220.00, 245.60),
    ("VIG", 40.0, 135.00, 142.85),
    ("VNQ", 55.0, 88.00, 92.15),
];

/// category, monthly limit, spent this month, spent last month
const BUDGETS: &[(&str, f64, f64, f64)] = &[
    ("Food", 1000.0, 875.50, 920.25),
    ("Transport", 400.0, 325.75, 380.50),
    ("Entertainment", 300.0, 245.30, 285.75),
    ("Shopping", 600.0, 425.99, 545.30),
    ("Bills", 2800.0, 2650.79, 2755.60),
    ("Healthcare", 500.0, 395.99, 150.00),
    ("Investment", 2250.0, 2250.00, 2250.00),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeedSummary {
    pub accounts: usize,
    pub transactions: usize,
    pub holdings: usize,
    pub budgets: usize,
}

/// Accumulates generated transactions against resolved account ids
struct Ledger<'a, R: Rng + ?Sized> {
    conn: &'a Connection,
    rng: &'a mut R,
    account_ids: Vec<i64>,
    inserted: usize,
}

impl<'a, R: Rng + ?Sized> Ledger<'a, R> {
    fn add(&mut self, account_id: i64, template: (&str, f64), jitter: f64, date: DateTime<Utc>, category: &str) -> Result<()> {
        let (description, base) = template;
        let amount = if jitter > 0.0 {
            round_to_cents(base + self.rng.gen_range(-jitter..jitter))
        } else {
            base
        };

        let input = TransactionInput {
            account_id,
            amount,
            description: description.to_string(),
            category: category.to_string(),
            date,
        };
        if let InsertOutcome::Inserted(_) = db::insert_transaction(self.conn, &input)? {
            self.inserted += 1;
        }
        Ok(())
    }

    /// Checking or savings, picked at random
    fn everyday_account(&mut self) -> i64 {
        self.account_ids[self.rng.gen_range(0..2)]
    }

    fn days_before(&mut self, anchor: DateTime<Utc>, max_days: i64) -> DateTime<Utc> {
        anchor - Duration::days(self.rng.gen_range(0..=max_days))
    }

    fn pick<'t>(&mut self, templates: &'t [(&'t str, f64)]) -> (&'t str, f64) {
        templates.choose(&mut *self.rng).copied().unwrap_or(templates[0])
    }

    fn month(&mut self, month_start: DateTime<Utc>) -> Result<()> {
        let checking = self.account_ids[0];
        let brokerage = self.account_ids[2];

        let date = self.days_before(month_start, 5);
        self.add(checking, SALARY, 0.0, date, "Salary")?;

        for (category, templates) in [("Bills", BILLS), ("Healthcare", HEALTHCARE)] {
            for &template in templates {
                if self.rng.gen::<f64>() > 0.3 {
                    let account = self.everyday_account();
                    let date = self.days_before(month_start, 28);
                    self.add(account, template, 10.0, date, category)?;
                }
            }
        }

        for week in 0..4 {
            let week_start = month_start - Duration::days(7 * week);

            for _ in 0..self.rng.gen_range(3..=7) {
                let template = self.pick(FOOD);
                let account = self.everyday_account();
                let date = self.days_before(week_start, 6);
                self.add(account, template, 5.0, date, "Food")?;
            }

            if self.rng.gen::<f64>() > 0.2 {
                let template = self.pick(TRANSPORT);
                let date = self.days_before(week_start, 6);
                self.add(checking, template, 10.0, date, "Transport")?;
            }
        }

        for (category, templates) in [("Shopping", SHOPPING), ("Entertainment", ENTERTAINMENT)] {
            for _ in 0..self.rng.gen_range(2..=5) {
                let template = self.pick(templates);
                let account = self.everyday_account();
                let date = self.days_before(month_start, 28);
                self.add(account, template, 20.0, date, category)?;
            }
        }

        if self.rng.gen::<f64>() > 0.1 {
            for &template in INVESTMENT {
                if self.rng.gen::<f64>() > 0.4 {
                    let date = self.days_before(month_start, 28);
                    self.add(brokerage, template, 0.0, date, "Investment")?;
                }
            }
        }

        Ok(())
    }
}

/// Wipe the store and write the demo dataset relative to `today`.
///
/// Same generator state and `today` always produce the same rows.
pub fn seed_sample_data<R: Rng + ?Sized>(conn: &Connection, rng: &mut R, today: DateTime<Utc>) -> Result<SeedSummary> {
    let tx = conn
        .unchecked_transaction()
        .context("Failed to begin seed transaction")?;

    db::clear_all(&tx)?;

    let mut summary = SeedSummary::default();
    let mut account_ids = Vec::with_capacity(ACCOUNTS.len());
    for &(name, account_type, balance) in ACCOUNTS {
        let outcome = db::upsert_account(
            &tx,
            &AccountInput {
                name: name.to_string(),
                account_type,
                balance,
            },
        )?;
        account_ids.push(outcome.id());
        summary.accounts += 1;
    }

    let mut ledger = Ledger {
        conn: &tx,
        rng,
        account_ids,
        inserted: 0,
    };
    for month_offset in 0..MONTHS_OF_HISTORY {
        ledger.month(today - Duration::days(30 * month_offset))?;
    }
    summary.transactions = ledger.inserted;

    let purchase_date = today - Duration::days(365);
    for &(symbol, shares, purchase_price, current_price) in HOLDINGS {
        db::upsert_holding(
            &tx,
            &HoldingInput {
                symbol: symbol.to_string(),
                shares,
                purchase_price,
                current_price,
                purchase_date,
            },
        )?;
        summary.holdings += 1;
    }

    let current_month = month_key(&today);
    let previous_month = previous_month_key(&today);
    for &(category, monthly_limit, spent_now, spent_before) in BUDGETS {
        for (month, spent) in [(&current_month, spent_now), (&previous_month, spent_before)] {
            db::upsert_budget(
                &tx,
                &BudgetInput {
                    category: category.to_string(),
                    month: month.clone(),
                    monthly_limit,
                    spent,
                },
            )?;
            summary.budgets += 1;
        }
    }

    tx.commit().context("Failed to commit sample data")?;

    info!(
        "Seeded {} accounts, {} transactions, {} holdings, {} budgets",
        summary.accounts, summary.transactions, summary.holdings, summary.budgets
    );

    Ok(summary)
}

fn previous_month_key(today: &DateTime<Utc>) -> String {
    let (year, month) = if today.month() == 1 {
        (today.year() - 1, 12)
    } else {
        (today.year(), today.month() - 1)
    };
    format!("{:04}-{:02}", year, month)
}
