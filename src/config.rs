//! Loads and validates the engine's configuration document:
//!
//! ```yaml
//! liquidity_pool:
//!   initial_balances: { USD: 1000000, EUR: 1000000 }
//!   fx_settlement_times: { USD: 0, EUR: 0 }
//!   fees: { margin: 0.01 }
//!   rebalance: { interval: 600 }
//! app:
//!   host: 0.0.0.0
//!   port: 8080
//!   debug: false
//! ```

use crate::currency::Currency;
use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

const DEFAULT_MARGIN: f64 = 0.01;
const DEFAULT_REBALANCE_INTERVAL_SECS: f64 = 600.0;

#[derive(Debug, serde::Deserialize)]
struct RawConfig {
    liquidity_pool: RawLiquidityPool,
    app: AppConfig,
}

#[derive(Debug, serde::Deserialize)]
struct RawLiquidityPool {
    initial_balances: HashMap<String, f64>,
    fx_settlement_times: HashMap<String, f64>,
    #[serde(default)]
    fees: RawFees,
    #[serde(default)]
    rebalance: RawRebalance,
}

#[derive(Debug, Default, serde::Deserialize)]
struct RawFees {
    margin: Option<f64>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct RawRebalance {
    interval: Option<f64>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub debug: bool,
}

/// The engine's validated view of the configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub initial_balances: HashMap<Currency, f64>,
    pub fx_settlement_times: HashMap<Currency, f64>,
    pub margin: f64,
    pub rebalance_interval: Duration,
    pub app: AppConfig,
}

impl Config {
    /// Reads and parses the YAML document at `path`, applying the documented defaults and
    /// validating the result.
    ///
    /// Unlike the reference implementation's copy-paste bug, `rebalance.interval`'s default is
    /// gated only on whether `rebalance.interval` itself is absent, independently of whether
    /// `fees.margin` is set.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw)
    }

    fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(raw)?;

        let margin = raw.liquidity_pool.fees.margin.unwrap_or(DEFAULT_MARGIN);
        let rebalance_interval = raw
            .liquidity_pool
            .rebalance
            .interval
            .unwrap_or(DEFAULT_REBALANCE_INTERVAL_SECS);
        if !rebalance_interval.is_finite() || rebalance_interval <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "rebalance.interval must be positive, got {rebalance_interval}"
            )));
        }

        let initial_balances: HashMap<Currency, f64> = raw
            .liquidity_pool
            .initial_balances
            .into_iter()
            .map(|(code, balance)| (Currency::new(code), balance))
            .collect();
        let fx_settlement_times: HashMap<Currency, f64> = raw
            .liquidity_pool
            .fx_settlement_times
            .into_iter()
            .map(|(code, seconds)| (Currency::new(code), seconds))
            .collect();

        let config = Config {
            initial_balances,
            fx_settlement_times,
            margin,
            rebalance_interval: Duration::from_secs_f64(rebalance_interval),
            app: raw.app,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_balances.is_empty() {
            return Err(ConfigError::Invalid("initial_balances must not be empty".into()));
        }

        let mut balance_keys: Vec<&Currency> = self.initial_balances.keys().collect();
        let mut settlement_keys: Vec<&Currency> = self.fx_settlement_times.keys().collect();
        balance_keys.sort();
        settlement_keys.sort();
        if balance_keys != settlement_keys {
            return Err(ConfigError::Invalid(
                "initial_balances and fx_settlement_times must cover the same currency set".into(),
            ));
        }

        if !(0.0..1.0).contains(&self.margin) {
            return Err(ConfigError::Invalid(format!("margin {} must be in [0, 1)", self.margin)));
        }

        for (currency, seconds) in &self.fx_settlement_times {
            if *seconds < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "fx_settlement_times[{currency}] must be non-negative, got {seconds}"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(extra: &str) -> String {
        format!(
            r#"
liquidity_pool:
  initial_balances: {{ USD: 1000000, EUR: 1000000 }}
  fx_settlement_times: {{ USD: 0, EUR: 0 }}
  fees: {{ margin: 0.01 }}
  {extra}
app:
  host: 0.0.0.0
  port: 8080
  debug: false
"#
        )
    }

    #[test]
    fn defaults_rebalance_interval_to_600_when_absent_regardless_of_margin() {
        let config = Config::parse(&sample("rebalance: {}")).unwrap();
        assert_eq!(config.rebalance_interval, Duration::from_secs(600));
    }

    #[test]
    fn margin_defaults_to_one_percent_when_fees_absent() {
        let yaml = r#"
liquidity_pool:
  initial_balances: { USD: 1000000 }
  fx_settlement_times: { USD: 0 }
app:
  host: 0.0.0.0
  port: 8080
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.margin, 0.01);
        assert_eq!(config.rebalance_interval, Duration::from_secs(600));
    }

    #[test]
    fn rejects_mismatched_currency_sets() {
        let yaml = r#"
liquidity_pool:
  initial_balances: { USD: 1000000, EUR: 1000000 }
  fx_settlement_times: { USD: 0 }
app:
  host: 0.0.0.0
  port: 8080
"#;
        assert!(matches!(Config::parse(yaml), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_margin_out_of_range() {
        let config = sample("rebalance: { interval: 60 }").replace("0.01", "1.5");
        assert!(matches!(Config::parse(&config), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_negative_rebalance_interval_without_panicking() {
        let config = sample("rebalance: { interval: -60 }");
        assert!(matches!(Config::parse(&config), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_zero_rebalance_interval() {
        let config = sample("rebalance: { interval: 0 }");
        assert!(matches!(Config::parse(&config), Err(ConfigError::Invalid(_))));
    }
}
