// 💹 Price Sources
// Where current holding prices come from. Reading portfolio value never
// touches prices; only `refresh_prices` writes them.

use crate::db::{self, Event};
use crate::metrics::round_to_cents;
use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use rand::Rng;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;

pub const SIMULATED_MIN_PRICE: f64 = 50.0;
pub const SIMULATED_MAX_PRICE: f64 = 500.0;

pub trait PriceSource {
    /// Current price for one symbol
    fn quote(&mut self, symbol: &str) -> Result<f64>;

    fn name(&self) -> &'static str;
}

// ============================================================================
// STATIC SOURCE
// ============================================================================

/// Fixed price table, keyed by upper-case symbol
#[derive(Debug, Clone, Default)]
pub struct StaticPriceSource {
    prices: HashMap<String, f64>,
}

impl StaticPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, symbol: &str, price: f64) -> Self {
        self.prices.insert(symbol.trim().to_uppercase(), price);
        self
    }
}

impl PriceSource for StaticPriceSource {
    fn quote(&mut self, symbol: &str) -> Result<f64> {
        self.prices
            .get(&symbol.trim().to_uppercase())
            .copied()
            .ok_or_else(|| anyhow!("No price available for {}", symbol))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

// ============================================================================
// SIMULATED SOURCE
// ============================================================================

/// Uniform random price between 50 and 500, rounded to cents
pub struct SimulatedPriceSource<R: Rng> {
    rng: R,
}

impl<R: Rng> SimulatedPriceSource<R> {
    pub fn new(rng: R) -> Self {
        SimulatedPriceSource { rng }
    }
}

impl<R: Rng> PriceSource for SimulatedPriceSource<R> {
    fn quote(&mut self, _symbol: &str) -> Result<f64> {
        let price = self.rng.gen_range(SIMULATED_MIN_PRICE..SIMULATED_MAX_PRICE);
        Ok(round_to_cents(price))
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

// ============================================================================
// REFRESH
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceRefresh {
    pub updated: usize,
    pub failed: Vec<String>,
}

/// Quote every holding and store the new current price.
///
/// A symbol the source cannot price keeps its old price and is listed in
/// `failed`; a database error rolls the whole refresh back.
pub fn refresh_prices<S: PriceSource + ?Sized>(conn: &Connection, source: &mut S) -> Result<PriceRefresh> {
    let tx = conn
        .unchecked_transaction()
        .context("Failed to begin price refresh")?;
    let holdings = db::get_holdings(&tx).context("Failed to load holdings")?;
    let mut refresh = PriceRefresh {
        updated: 0,
        failed: Vec::new(),
    };
    let mut quotes = serde_json::Map::new();

    for holding in &holdings {
        let price = match source.quote(&holding.symbol) {
            Ok(price) if price.is_finite() && price >= 0.0 => price,
            Ok(price) => {
                warn!("Ignoring invalid quote {} for {}", price, holding.symbol);
                refresh.failed.push(holding.symbol.clone());
                continue;
            }
            Err(e) => {
                warn!("Could not price {}: {:#}", holding.symbol, e);
                refresh.failed.push(holding.symbol.clone());
                continue;
            }
        };

        if db::update_holding_price(&tx, &holding.symbol, price)? {
            refresh.updated += 1;
            quotes.insert(holding.symbol.clone(), serde_json::json!(price));
        }
    }

    db::insert_event(
        &tx,
        &Event::new(
            "prices_refreshed",
            "investment",
            "all",
            serde_json::json!({
                "source": source.name(),
                "updated": refresh.updated,
                "failed": refresh.failed,
                "prices": quotes,
            }),
            "prices",
        ),
    )?;

    tx.commit().context("Failed to commit price refresh")?;

    info!(
        "Refreshed prices from {} source: {} updated, {} failed",
        source.name(),
        refresh.updated,
        refresh.failed.len()
    );

    Ok(refresh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_events_for_entity, get_holdings, setup_database, upsert_holding};
    use crate::models::HoldingInput;
    use chrono::{TimeZone, Utc};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn db_with_holdings(symbols: &[&str]) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        for symbol in symbols {
            upsert_holding(
                &conn,
                &HoldingInput {
                    symbol: symbol.to_string(),
                    shares: 10.0,
                    purchase_price: 100.0,
                    current_price: 100.0,
                    purchase_date: Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap(),
                },
            )
            .unwrap();
        }
        conn
    }

    #[test]
    fn test_static_source_quotes_case_insensitively() {
        let mut source = StaticPriceSource::new().with_price("spy", 421.5);

        assert_eq!(source.quote("SPY").unwrap(), 421.5);
        assert!(source.quote("VTI").is_err());
    }

    #[test]
    fn test_simulated_prices_stay_in_range_and_round_to_cents() {
        let mut source = SimulatedPriceSource::new(ChaCha8Rng::seed_from_u64(7));

        for _ in 0..200 {
            let price = source.quote("AAPL").unwrap();
            assert!((SIMULATED_MIN_PRICE..=SIMULATED_MAX_PRICE).contains(&price));
            assert!(((price * 100.0).round() - price * 100.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_simulated_source_is_deterministic_for_seed() {
        let mut a = SimulatedPriceSource::new(ChaCha8Rng::seed_from_u64(11));
        let mut b = SimulatedPriceSource::new(ChaCha8Rng::seed_from_u64(11));

        assert_eq!(a.quote("SPY").unwrap(), b.quote("SPY").unwrap());
    }

    #[test]
    fn test_refresh_updates_known_symbols_and_reports_failures() {
        let conn = db_with_holdings(&["SPY", "VTI"]);
        let mut source = StaticPriceSource::new().with_price("SPY", 430.0);

        let refresh = refresh_prices(&conn, &mut source).unwrap();

        assert_eq!(refresh.updated, 1);
        assert_eq!(refresh.failed, vec!["VTI".to_string()]);

        let holdings = get_holdings(&conn).unwrap();
        assert_eq!(holdings[0].current_price, 430.0);
        assert_eq!(holdings[1].current_price, 100.0);
    }

    #[test]
    fn test_refresh_records_event() {
        let conn = db_with_holdings(&["SPY"]);
        let mut source = SimulatedPriceSource::new(ChaCha8Rng::seed_from_u64(1));

        refresh_prices(&conn, &mut source).unwrap();

        let events = get_events_for_entity(&conn, "investment", "all").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "prices_refreshed");
        assert_eq!(events[0].data["source"], "simulated");
        assert_eq!(events[0].data["updated"], 1);
    }

    #[test]
    fn test_failed_refresh_keeps_old_prices() {
        let conn = db_with_holdings(&["SPY", "VTI"]);
        // The audit write at the end of the refresh fails
        conn.execute("DROP TABLE events", []).unwrap();
        let mut source = StaticPriceSource::new().with_price("SPY", 430.0).with_price("VTI", 220.0);

        assert!(refresh_prices(&conn, &mut source).is_err());

        let holdings = get_holdings(&conn).unwrap();
        assert_eq!(holdings[0].current_price, 100.0);
        assert_eq!(holdings[1].current_price, 100.0);
    }

    #[test]
    fn test_refresh_with_no_holdings() {
        let conn = db_with_holdings(&[]);
        let mut source = StaticPriceSource::new();

        let refresh = refresh_prices(&conn, &mut source).unwrap();

        assert_eq!(refresh.updated, 0);
        assert!(refresh.failed.is_empty());
    }
}
