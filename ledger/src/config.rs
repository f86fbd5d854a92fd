//! Ledger configuration.

use rust_decimal::Decimal;

use splitbook_common::{LedgerError, Result, DEFAULT_BALANCE_EPSILON};

use crate::rebalance::RebalancePolicy;

/// Main ledger configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Mirror a lone source split into a new split against the same account.
    /// Off by default: single-entry transactions are permitted at rest.
    /// Individual accounts may override this.
    pub forced_double_entry: bool,
    /// Magnitude below which a sum or computed amount is treated as zero.
    pub balance_epsilon: Decimal,
    /// Recompute dirty running balances when an edit session is committed.
    pub recompute_on_commit: bool,
    /// Log level.
    pub log_level: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            forced_double_entry: false,
            balance_epsilon: DEFAULT_BALANCE_EPSILON,
            recompute_on_commit: true,
            log_level: "info".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("LEDGER_FORCED_DOUBLE_ENTRY") {
            if let Some(flag) = parse_flag(&value) {
                config.forced_double_entry = flag;
            }
        }

        if let Ok(value) = std::env::var("LEDGER_BALANCE_EPSILON") {
            if let Ok(epsilon) = value.parse() {
                config.balance_epsilon = epsilon;
            }
        }

        if let Ok(value) = std::env::var("LEDGER_RECOMPUTE_ON_COMMIT") {
            if let Some(flag) = parse_flag(&value) {
                config.recompute_on_commit = flag;
            }
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.balance_epsilon.is_sign_negative() || self.balance_epsilon.is_zero() {
            return Err(LedgerError::Configuration(format!(
                "Balance epsilon must be positive, got {}",
                self.balance_epsilon
            )));
        }

        if self.balance_epsilon > Decimal::new(1, 2) {
            return Err(LedgerError::Configuration(format!(
                "Balance epsilon {} would swallow whole cents",
                self.balance_epsilon
            )));
        }

        Ok(())
    }

    /// Rebalance policy with an optional per-account override.
    pub fn policy(&self, account_override: Option<bool>) -> RebalancePolicy {
        RebalancePolicy {
            forced_double_entry: account_override.unwrap_or(self.forced_double_entry),
            epsilon: self.balance_epsilon,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config() {
        let config = LedgerConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.forced_double_entry);
    }

    #[test]
    fn test_invalid_epsilon() {
        let mut config = LedgerConfig::default();
        config.balance_epsilon = Decimal::ZERO;
        assert!(config.validate().is_err());

        config.balance_epsilon = dec!(0.5);
        let err = config.validate().unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_account_override_wins() {
        let config = LedgerConfig::default();
        assert!(config.policy(Some(true)).forced_double_entry);
        assert!(!config.policy(None).forced_double_entry);
        assert_eq!(config.policy(None).epsilon, config.balance_epsilon);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
