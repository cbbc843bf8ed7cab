// ⚙️ Configuration
// Environment-driven settings shared by the CLI and the server.
// `.env` is loaded first; unparseable values fall back to defaults.

use crate::allocation::AllocationRules;
use crate::metrics::DEFAULT_CASH_FLOW_DAYS;
use crate::projection::{
    ProjectionParams, DEFAULT_MAX_TRIALS, DEFAULT_MAX_YEARS, DEFAULT_MEAN_RETURN, DEFAULT_TRIALS,
    DEFAULT_VOLATILITY, DEFAULT_YEARS,
};
use anyhow::{Context, Result};
use log::{info, warn};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_APP_NAME: &str = "Financial Dashboard";
pub const DEFAULT_DB_PATH: &str = "./financial_dashboard.db";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub app_name: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub cash_flow_days: i64,
    pub projection_years: i32,
    pub projection_trials: i32,
    pub mean_return: f64,
    pub volatility: f64,
    pub max_projection_years: i32,
    pub max_projection_trials: i32,
    pub allocation_rules_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            app_name: DEFAULT_APP_NAME.to_string(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            allowed_origins: vec!["*".to_string()],
            cash_flow_days: DEFAULT_CASH_FLOW_DAYS,
            projection_years: DEFAULT_YEARS,
            projection_trials: DEFAULT_TRIALS,
            mean_return: DEFAULT_MEAN_RETURN,
            volatility: DEFAULT_VOLATILITY,
            max_projection_years: DEFAULT_MAX_YEARS,
            max_projection_trials: DEFAULT_MAX_TRIALS,
            allocation_rules_path: None,
        }
    }
}

impl AppConfig {
    /// Load `.env` (if present) and read `FINDASH_*` variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();

        let allowed_origins = lookup("FINDASH_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty())
            .unwrap_or(defaults.allowed_origins);

        AppConfig {
            app_name: lookup("FINDASH_APP_NAME").unwrap_or(defaults.app_name),
            db_path: lookup("FINDASH_DB_PATH").map(PathBuf::from).unwrap_or(defaults.db_path),
            host: lookup("FINDASH_HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "FINDASH_PORT", defaults.port),
            allowed_origins,
            cash_flow_days: parsed(&lookup, "FINDASH_CASH_FLOW_DAYS", defaults.cash_flow_days),
            projection_years: parsed(&lookup, "FINDASH_PROJECTION_YEARS", defaults.projection_years),
            projection_trials: parsed(&lookup, "FINDASH_PROJECTION_TRIALS", defaults.projection_trials),
            mean_return: parsed(&lookup, "FINDASH_MEAN_RETURN", defaults.mean_return),
            volatility: parsed(&lookup, "FINDASH_VOLATILITY", defaults.volatility),
            max_projection_years: parsed(&lookup, "FINDASH_PROJECTION_MAX_YEARS", defaults.max_projection_years),
            max_projection_trials: parsed(
                &lookup,
                "FINDASH_PROJECTION_MAX_TRIALS",
                defaults.max_projection_trials,
            ),
            allocation_rules_path: lookup("FINDASH_ALLOCATION_RULES")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Projection defaults; `current_value` is filled in per request
    pub fn projection_defaults(&self) -> ProjectionParams {
        ProjectionParams {
            current_value: 0.0,
            years: self.projection_years,
            trials: self.projection_trials,
            mean_return: self.mean_return,
            volatility: self.volatility,
            max_years: self.max_projection_years,
            max_trials: self.max_projection_trials,
        }
    }

    /// Rule table from `FINDASH_ALLOCATION_RULES`, or the built-in defaults
    pub fn allocation_rules(&self) -> Result<AllocationRules> {
        match &self.allocation_rules_path {
            Some(path) => {
                let rules = AllocationRules::from_file(path)
                    .with_context(|| format!("Failed to load allocation rules from {}", path.display()))?;
                info!("Loaded {} allocation rules from {}", rules.rule_count(), path.display());
                Ok(rules)
            }
            None => Ok(AllocationRules::default()),
        }
    }
}

fn parsed<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid value '{}' for {}, using default {}", raw, key, default);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::AssetClass;
    use std::collections::HashMap;
    use std::io::Write;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = config_from(&[]);

        assert_eq!(config, AppConfig::default());
        assert_eq!(config.db_path, PathBuf::from("./financial_dashboard.db"));
        assert_eq!(config.listen_addr(), "0.0.0.0:8000");
        assert_eq!(config.allowed_origins, vec!["*"]);
    }

    #[test]
    fn test_reads_overrides() {
        let config = config_from(&[
            ("FINDASH_DB_PATH", "/tmp/finance.db"),
            ("FINDASH_PORT", "9090"),
            ("FINDASH_ALLOWED_ORIGINS", "http://localhost:3000, https://dash.example.com"),
            ("FINDASH_PROJECTION_TRIALS", "500"),
            ("FINDASH_VOLATILITY", "0.2"),
        ]);

        assert_eq!(config.db_path, PathBuf::from("/tmp/finance.db"));
        assert_eq!(config.port, 9090);
        assert_eq!(
            config.allowed_origins,
            vec!["http://localhost:3000", "https://dash.example.com"]
        );
        assert_eq!(config.projection_trials, 500);
        assert_eq!(config.volatility, 0.2);
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = config_from(&[
            ("FINDASH_PORT", "eighty"),
            ("FINDASH_MEAN_RETURN", "seven percent"),
            ("FINDASH_ALLOWED_ORIGINS", " , "),
        ]);

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.mean_return, DEFAULT_MEAN_RETURN);
        assert_eq!(config.allowed_origins, vec!["*"]);
    }

    #[test]
    fn test_projection_defaults_follow_config() {
        let config = config_from(&[("FINDASH_PROJECTION_YEARS", "25")]);

        let params = config.projection_defaults();

        assert_eq!(params.years, 25);
        assert_eq!(params.trials, DEFAULT_TRIALS);
        assert_eq!(params.current_value, 0.0);
        assert_eq!(params.max_years, DEFAULT_MAX_YEARS);
        assert_eq!(params.max_trials, DEFAULT_MAX_TRIALS);
    }

    #[test]
    fn test_projection_limits_from_env() {
        let config = config_from(&[
            ("FINDASH_PROJECTION_MAX_YEARS", "40"),
            ("FINDASH_PROJECTION_MAX_TRIALS", "5000"),
        ]);

        let params = config.projection_defaults();

        assert_eq!(params.max_years, 40);
        assert_eq!(params.max_trials, 5000);
        assert!(ProjectionParams { trials: 5001, ..params }.validate().is_err());
    }

    #[test]
    fn test_allocation_rules_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": "bnd", "pattern": "BND", "asset_class": "Bonds", "description": null}}]"#
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config = config_from(&[("FINDASH_ALLOCATION_RULES", path.as_str())]);
        let rules = config.allocation_rules().unwrap();

        assert_eq!(rules.classify("BND"), AssetClass::Bonds);
        assert_eq!(config_from(&[]).allocation_rules().unwrap().rule_count(), 4);
    }
}
