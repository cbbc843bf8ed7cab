// 🏷️ Allocation Rules - Rules as Data
// Maps a holding's symbol to a closed set of asset classes.
// New rules are added to the table (or a JSON file), never at call sites.

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

// ============================================================================
// ASSET CLASS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AssetClass {
    Stocks,
    Bonds,
    Cash,
    Other,
}

impl AssetClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Stocks => "Stocks",
            AssetClass::Bonds => "Bonds",
            AssetClass::Cash => "Cash",
            AssetClass::Other => "Other",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRule {
    /// Rule ID for tracking
    pub id: String,

    /// Symbol pattern. `*` matches any run of characters; without a
    /// wildcard the whole symbol must match (case-insensitive).
    pub pattern: String,

    pub asset_class: AssetClass,

    pub description: Option<String>,

    /// Priority (higher = applied first)
    #[serde(default)]
    pub priority: i32,
}

impl AllocationRule {
    pub fn new(id: &str, pattern: &str, asset_class: AssetClass, priority: i32) -> Self {
        AllocationRule {
            id: id.to_string(),
            pattern: pattern.to_string(),
            asset_class,
            description: None,
            priority,
        }
    }

    /// Check if the pattern matches the given symbol
    pub fn matches(&self, symbol: &str) -> bool {
        let pattern = self.pattern.trim().to_uppercase();
        let symbol = symbol.trim().to_uppercase();

        if !pattern.contains('*') {
            return pattern == symbol;
        }

        let parts: Vec<&str> = pattern.split('*').collect();
        let first = parts[0];
        let last = parts[parts.len() - 1];

        // Anchors must not overlap
        if symbol.len() < first.len() + last.len() {
            return false;
        }
        if !symbol.starts_with(first) || !symbol.ends_with(last) {
            return false;
        }

        // Middle parts appear in order between the anchors
        let mut rest = &symbol[first.len()..symbol.len() - last.len()];
        for part in &parts[1..parts.len() - 1] {
            if part.is_empty() {
                continue;
            }
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }

        true
    }
}

// ============================================================================
// RULE TABLE
// ============================================================================

#[derive(Debug, Clone)]
pub struct AllocationRules {
    rules: Vec<AllocationRule>,
    fallback: AssetClass,
}

impl AllocationRules {
    /// Create an empty table; every symbol falls back to `Other`
    pub fn new() -> Self {
        AllocationRules {
            rules: Vec::new(),
            fallback: AssetClass::Other,
        }
    }

    /// Load rules from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read allocation rules file: {:?}", path.as_ref()))?;

        let rules: Vec<AllocationRule> =
            serde_json::from_str(&content).context("Failed to parse allocation rules JSON")?;

        Ok(AllocationRules::from_rules(rules))
    }

    /// Create table from a list of rules
    pub fn from_rules(mut rules: Vec<AllocationRule>) -> Self {
        // Stable sort keeps file order among equal priorities
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        AllocationRules {
            rules,
            fallback: AssetClass::Other,
        }
    }

    pub fn with_fallback(mut self, fallback: AssetClass) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn add_rule(&mut self, rule: AllocationRule) {
        self.rules.push(rule);
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// First matching rule wins; unmatched symbols get the fallback class
    pub fn classify(&self, symbol: &str) -> AssetClass {
        self.rules
            .iter()
            .find(|rule| rule.matches(symbol))
            .map(|rule| rule.asset_class)
            .unwrap_or(self.fallback)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl Default for AllocationRules {
    /// Bond-prefixed symbols are bonds; the broad equity index funds are stocks.
    fn default() -> Self {
        AllocationRules::from_rules(vec![
            AllocationRule::new("bond-prefix", "BOND*", AssetClass::Bonds, 10),
            AllocationRule::new("equity-spy", "SPY", AssetClass::Stocks, 5),
            AllocationRule::new("equity-vti", "VTI", AssetClass::Stocks, 5),
            AllocationRule::new("equity-qqq", "QQQ", AssetClass::Stocks, 5),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_exact_pattern_match() {
        let rule = AllocationRule::new("spy", "SPY", AssetClass::Stocks, 0);

        assert!(rule.matches("SPY"));
        assert!(rule.matches("spy"));
        assert!(!rule.matches("SPYG"));
        assert!(!rule.matches("XSPY"));
    }

    #[test]
    fn test_wildcard_pattern() {
        let rule = AllocationRule::new("bond", "BOND*", AssetClass::Bonds, 0);

        assert!(rule.matches("BOND"));
        assert!(rule.matches("BONDX"));
        assert!(rule.matches("bond_fund"));
        assert!(!rule.matches("BND"));
        assert!(!rule.matches("XBOND"));
    }

    #[test]
    fn test_wildcard_anchors_do_not_overlap() {
        let rule = AllocationRule::new("t", "V*V", AssetClass::Stocks, 0);

        assert!(rule.matches("VV"));
        assert!(rule.matches("VTIV"));
        assert!(!rule.matches("V"));
    }

    #[test]
    fn test_middle_wildcard_parts_in_order() {
        let rule = AllocationRule::new("t", "V*T*X", AssetClass::Stocks, 0);

        assert!(rule.matches("VTIAX"));
        assert!(!rule.matches("VAXT"));
    }

    #[test]
    fn test_default_rules() {
        let rules = AllocationRules::default();

        assert_eq!(rules.rule_count(), 4);
        assert_eq!(rules.classify("BOND"), AssetClass::Bonds);
        assert_eq!(rules.classify("SPY"), AssetClass::Stocks);
        assert_eq!(rules.classify("VTI"), AssetClass::Stocks);
        assert_eq!(rules.classify("QQQ"), AssetClass::Stocks);
        assert_eq!(rules.classify("AAPL"), AssetClass::Other);
        // BND does not carry the bond prefix
        assert_eq!(rules.classify("BND"), AssetClass::Other);
    }

    #[test]
    fn test_rule_priority() {
        let mut rules = AllocationRules::new();

        rules.add_rule(AllocationRule::new("general", "V*", AssetClass::Stocks, 1));
        rules.add_rule(AllocationRule::new("treasuries", "VGIT", AssetClass::Bonds, 100));

        assert_eq!(rules.classify("VGIT"), AssetClass::Bonds);
        assert_eq!(rules.classify("VTI"), AssetClass::Stocks);
    }

    #[test]
    fn test_custom_fallback() {
        let rules = AllocationRules::new().with_fallback(AssetClass::Cash);
        assert_eq!(rules.classify("ANYTHING"), AssetClass::Cash);
    }

    #[test]
    fn test_load_rules_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"id": "bnd", "pattern": "BND", "asset_class": "Bonds", "description": null, "priority": 5}},
                {{"id": "mm", "pattern": "*MMF", "asset_class": "Cash", "description": "money market"}}
            ]"#
        )
        .unwrap();

        let rules = AllocationRules::from_file(file.path()).unwrap();

        assert_eq!(rules.rule_count(), 2);
        assert_eq!(rules.classify("BND"), AssetClass::Bonds);
        assert_eq!(rules.classify("VMMF"), AssetClass::Cash);
        assert_eq!(rules.classify("SPY"), AssetClass::Other);
    }

    #[test]
    fn test_load_rules_from_missing_file_fails() {
        assert!(AllocationRules::from_file("/nonexistent/rules.json").is_err());
    }
}
