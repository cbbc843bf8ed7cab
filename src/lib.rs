// Financial Dashboard - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod models;
pub mod allocation;     // Asset class rule table
pub mod metrics;        // Net worth, cash flow, allocation, budgets
pub mod projection;     // Monte Carlo projector
pub mod db;
pub mod import;         // CSV uploads
pub mod prices;
pub mod seed;           // Demo dataset
pub mod config;
pub mod api;            // Query layer behind the HTTP routes

// Re-export commonly used types
pub use error::{EngineError, EngineResult, ImportError};
pub use models::{
    Account, AccountType, Transaction, Holding, Budget, FinancialSnapshot,
    AccountInput, TransactionInput, HoldingInput, BudgetInput,
    month_key, parse_month_key,
};
pub use allocation::{AllocationRule, AllocationRules, AssetClass};
pub use metrics::{
    net_worth, portfolio_value, cash_flow, asset_allocation, budget_status,
    CashFlow, CashFlowWindow, BudgetStatus,
};
pub use projection::{project, project_seeded, Projection, ProjectionParams};
pub use db::{
    Event, InsertOutcome, UpsertOutcome, Table,
    open_database, setup_database, load_snapshot, insert_event, get_events_for_entity,
};
pub use import::{import_csv, import_file, import_kind, ImportKind, ImportReport};
pub use prices::{refresh_prices, PriceSource, SimulatedPriceSource, StaticPriceSource};
pub use seed::{seed_sample_data, SeedSummary};
pub use config::AppConfig;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
