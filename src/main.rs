// 💰 Financial Dashboard CLI
// init / seed / import / report / project against the local SQLite store.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::info;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::{Path, PathBuf};

use findash::api::{self, ProjectionQuery};
use findash::db::{self, Table};
use findash::{import_file, open_database, seed_sample_data, AppConfig, ImportKind};

#[derive(Parser)]
#[command(name = "findash")]
#[command(about = "Personal finance metrics and Monte Carlo projections", long_about = None)]
struct Cli {
    /// Database file (overrides FINDASH_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,

    /// Replace all data with the demo dataset
    Seed {
        /// Seed for reproducible sample data
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Import a CSV file
    Import {
        /// accounts, transactions, investments or budgets
        kind: ImportKind,

        file: PathBuf,
    },

    /// Print net worth, cash flow, allocation and budgets
    Report,

    /// Run a Monte Carlo projection of the current portfolio
    Project {
        #[arg(long)]
        years: Option<i32>,

        #[arg(long)]
        trials: Option<i32>,

        #[arg(long)]
        mean_return: Option<f64>,

        #[arg(long)]
        volatility: Option<f64>,

        /// Seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env();
    if let Some(db_path) = cli.db {
        config.db_path = db_path;
    }

    match cli.command {
        Commands::Init => run_init(&config),
        Commands::Seed { seed } => run_seed(&config, seed),
        Commands::Import { kind, file } => run_import(&config, kind, &file),
        Commands::Report => run_report(&config),
        Commands::Project {
            years,
            trials,
            mean_return,
            volatility,
            seed,
        } => run_project(
            &config,
            ProjectionQuery {
                years,
                trials,
                mean_return,
                volatility,
                seed,
            },
        ),
    }
}

fn run_init(config: &AppConfig) -> Result<()> {
    let conn = open_database(&config.db_path)?;
    println!("✓ Database ready at {}", config.db_path.display());
    println!("  {} accounts, {} transactions", db::count_rows(&conn, Table::Accounts)?, db::count_rows(&conn, Table::Transactions)?);
    Ok(())
}

fn run_seed(config: &AppConfig, seed: Option<u64>) -> Result<()> {
    let conn = open_database(&config.db_path)?;
    let mut rng = match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };

    println!("🌱 Seeding sample data...");
    let summary = seed_sample_data(&conn, &mut rng, Utc::now())?;

    println!("✓ Added {} accounts", summary.accounts);
    println!("✓ Added {} transactions over 12 months", summary.transactions);
    println!("✓ Added {} investments", summary.holdings);
    println!("✓ Added {} budgets for 2 months", summary.budgets);
    Ok(())
}

fn run_import(config: &AppConfig, kind: ImportKind, file: &Path) -> Result<()> {
    let conn = open_database(&config.db_path)?;

    println!("📂 Importing {} from {}...", kind, file.display());
    let report = import_file(&conn, kind, file)
        .with_context(|| format!("Failed to import {}", file.display()))?;

    println!("✓ {}", report.message);
    println!("  added: {}  updated: {}  duplicates: {}", report.added_count, report.updated_count, report.duplicate_count);
    if report.total_errors > 0 {
        println!("⚠️  {} rows failed:", report.total_errors);
        for error in &report.errors {
            println!("   {}", error);
        }
    }
    Ok(())
}

fn run_report(config: &AppConfig) -> Result<()> {
    let conn = open_database(&config.db_path)?;
    let rules = config.allocation_rules()?;

    let summary = api::get_summary(&conn, config.cash_flow_days)?;
    println!("📊 {}", config.app_name);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Net worth:        {:>14.2}", summary.net_worth);
    println!("Portfolio value:  {:>14.2}", summary.portfolio_value);
    println!("Monthly income:   {:>14.2}", summary.monthly_income);
    println!("Monthly expenses: {:>14.2}", summary.monthly_expenses);
    println!("Transactions:     {:>14}", summary.total_transactions);

    let flow = api::get_cash_flow(&conn, config.cash_flow_days)?;
    if !flow.is_empty() {
        println!("\n💵 Cash flow (last {} days)", config.cash_flow_days);
        for ((month, income), expenses) in flow.dates.iter().zip(&flow.income).zip(&flow.expenses) {
            println!("  {}  +{:>12.2}  -{:>12.2}", month, income, expenses);
        }
    }

    let allocation = api::get_asset_allocation(&conn, &rules)?;
    if !allocation.is_empty() {
        println!("\n🥧 Asset allocation");
        for (class, pct) in &allocation {
            println!("  {:<8} {:>6.2}%", class, pct);
        }
    }

    let budgets = api::get_budget_status(&conn, None)?;
    if !budgets.is_empty() {
        println!("\n📋 Budgets this month");
        for status in &budgets {
            let marker = if status.is_over_budget() { "❌" } else { "✓" };
            println!(
                "  {} {:<14} {:>9.2} / {:>9.2}  ({:.2} left)",
                marker, status.category, status.spent, status.limit, status.remaining
            );
        }
    }

    Ok(())
}

fn run_project(config: &AppConfig, query: ProjectionQuery) -> Result<()> {
    let conn = open_database(&config.db_path)?;
    let params = api::projection_params(&conn, &query, config.projection_defaults())?;
    drop(conn);

    info!("Running {} trials over {} years", params.trials, params.years);
    let result = api::run_projection(&params, query.seed)?;

    println!("🎲 Monte Carlo projection ({} trials, {} years)", result.trials, result.years);
    println!("  Current value:   {:>14.2}", result.current_value);
    println!("  10th percentile: {:>14.2}", result.percentile_10);
    println!("  Median:          {:>14.2}", result.percentile_50);
    println!("  90th percentile: {:>14.2}", result.percentile_90);
    Ok(())
}
