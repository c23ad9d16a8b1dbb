//! The boundary the HTTP layer calls into. Owns every other component and the
//! background rebalance task.

use crate::clock::{Clock, RealClock};
use crate::config::Config;
use crate::currency::{Currency, Pair};
use crate::error::EngineError;
use crate::exchange::{ExchangeOutcome, ExchangeProcessor, ExchangeRequest};
use crate::ledger::BalanceLedger;
use crate::rate_book::{RateBook, RateEntry};
use crate::rebalance::{Rebalancer, RebalanceOutcome};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// `{rates, balances, profit}` snapshot served by `GET /internal/status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub rates: HashMap<String, Option<f64>>,
    pub balances: HashMap<Currency, f64>,
    pub profit: HashMap<Currency, f64>,
}

pub struct LiquidityPoolEngine {
    pairs: Vec<Pair>,
    rate_book: RateBook,
    ledger: BalanceLedger,
    exchange_processor: ExchangeProcessor,
    rebalancer: Rebalancer,
    rebalance_interval: Duration,
    clock: Arc<dyn Clock>,
}

impl LiquidityPoolEngine {
    /// Constructs the engine and spawns its background rebalance task, which runs until the
    /// process shuts down.
    pub fn new(config: Config) -> Arc<Self> {
        Self::new_with_clock(config, Arc::new(RealClock))
    }

    /// As [`Self::new`], but with an injectable [`Clock`] — used by tests to avoid sleeping in
    /// wall-clock time during settlement simulation.
    pub fn new_with_clock(config: Config, clock: Arc<dyn Clock>) -> Arc<Self> {
        let pairs = permuted_pairs(config.initial_balances.keys());
        let rate_book = RateBook::new(pairs.clone());
        let ledger = BalanceLedger::new(config.initial_balances.clone());
        let exchange_processor = ExchangeProcessor::new(config.margin, config.fx_settlement_times.clone());
        let rebalancer = Rebalancer::new(config.fx_settlement_times.clone());

        let engine = Arc::new(Self {
            pairs,
            rate_book,
            ledger,
            exchange_processor,
            rebalancer,
            rebalance_interval: config.rebalance_interval,
            clock,
        });

        let background = Arc::clone(&engine);
        tokio::spawn(async move { background.run_background_rebalance().await });

        engine
    }

    async fn run_background_rebalance(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.rebalance_interval).await;
            self.manual_rebalance().await;
        }
    }

    /// Appends a rate observation for `pair` and returns it unchanged.
    pub fn update_rate(&self, pair: &str, rate: f64, timestamp: DateTime<Utc>) -> Result<(Pair, f64), EngineError> {
        let pair = Pair::from_slash_separated(pair)
            .ok_or_else(|| EngineError::ParseError(format!("malformed pair: {pair}")))?;
        self.validate_pair(&pair)?;

        self.rate_book.insert(&pair, rate, timestamp)?;
        info!(pair = %pair, rate, "rate updated");
        Ok((pair, rate))
    }

    /// Executes a client-initiated conversion. Runs the locking/settlement/ledger
    /// pipeline on a blocking thread so the async runtime's reactor stays free across the
    /// settlement sleep.
    pub async fn exchange(self: &Arc<Self>, request: ExchangeRequest) -> Result<ExchangeOutcome, EngineError> {
        let engine = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            engine
                .exchange_processor
                .process(&engine.ledger, &engine.rate_book, engine.clock.as_ref(), request)
        })
        .await
        .unwrap_or(Err(EngineError::TransientFailure))
    }

    /// The ordered rate history for `pair`.
    pub fn rate_history(&self, pair: &Pair) -> Result<Vec<RateEntry>, EngineError> {
        self.validate_pair(pair)?;
        self.rate_book.history(pair)
    }

    /// A point-in-time, not-atomic-across-currencies snapshot.
    pub fn status(&self) -> StatusSnapshot {
        let rates = self
            .pairs
            .iter()
            .map(|pair| (pair.to_string(), self.rate_book.latest(pair).unwrap_or(None)))
            .collect();
        let snapshot = self.ledger.snapshot();
        StatusSnapshot { rates, balances: snapshot.balances, profit: snapshot.profit }
    }

    /// Runs a rebalance pass synchronously to completion. Errors are logged but never
    /// surfaced to the caller — fire-and-forget semantics.
    pub async fn manual_rebalance(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        let result =
            tokio::task::spawn_blocking(move || engine.rebalancer.run(&engine.ledger, &engine.rate_book, engine.clock.as_ref()))
                .await;

        match result {
            Ok(Ok(RebalanceOutcome::Executed { orders })) => {
                info!(order_count = orders.len(), "manual rebalance complete")
            }
            Ok(Ok(outcome)) => info!(?outcome, "manual rebalance was a no-op"),
            Ok(Err(err)) => warn!(error = %err, "rebalance encountered an error"),
            Err(join_err) => warn!(error = %join_err, "rebalance task panicked"),
        }
    }

    fn validate_pair(&self, pair: &Pair) -> Result<(), EngineError> {
        if self.pairs.contains(pair) {
            Ok(())
        } else {
            Err(EngineError::UnsupportedPair(pair.clone()))
        }
    }
}

fn permuted_pairs<'a>(currencies: impl Iterator<Item = &'a Currency>) -> Vec<Pair> {
    currencies
        .cloned()
        .permutations(2)
        .map(|pair| Pair::new(pair[0].clone(), pair[1].clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::InstantClock;
    use std::collections::HashMap as Map;

    fn test_config() -> Config {
        Config {
            initial_balances: Map::from([(Currency::new("USD"), 1_000_000.0), (Currency::new("EUR"), 1_000_000.0)]),
            fx_settlement_times: Map::from([(Currency::new("USD"), 0.0), (Currency::new("EUR"), 0.0)]),
            margin: 0.01,
            rebalance_interval: Duration::from_secs(600),
            app: crate::config::AppConfig { host: "127.0.0.1".into(), port: 8080, debug: false },
        }
    }

    #[tokio::test]
    async fn update_rate_then_exchange_round_trips_through_the_facade() {
        let engine = LiquidityPoolEngine::new_with_clock(test_config(), Arc::new(InstantClock));

        let (pair, rate) = engine.update_rate("EUR/USD", 1.10, Utc::now()).unwrap();
        assert_eq!(rate, 1.10);
        assert_eq!(pair.to_string(), "EUR/USD");

        let outcome = engine
            .exchange(ExchangeRequest { from: Currency::new("EUR"), to: Currency::new("USD"), amount: 1000.0 })
            .await
            .unwrap();
        assert_eq!(outcome.margin_profit, 10.0);

        let status = engine.status();
        assert_eq!(status.rates.get("EUR/USD"), Some(&Some(1.10)));
    }

    #[tokio::test]
    async fn update_rate_rejects_unknown_pair() {
        let engine = LiquidityPoolEngine::new_with_clock(test_config(), Arc::new(InstantClock));
        let result = engine.update_rate("USD/JPY", 150.0, Utc::now());
        assert!(matches!(result, Err(EngineError::UnsupportedPair(_))));
    }

    #[tokio::test]
    async fn status_snapshots_are_structurally_equal_with_no_intervening_mutation() {
        let engine = LiquidityPoolEngine::new_with_clock(test_config(), Arc::new(InstantClock));
        engine.update_rate("EUR/USD", 1.10, Utc::now()).unwrap();

        let a = engine.status();
        let b = engine.status();
        assert_eq!(a.balances, b.balances);
        assert_eq!(a.profit, b.profit);
        assert_eq!(a.rates, b.rates);
    }

    #[tokio::test]
    async fn manual_rebalance_never_panics_when_rates_are_missing() {
        let engine = LiquidityPoolEngine::new_with_clock(test_config(), Arc::new(InstantClock));
        engine.manual_rebalance().await;
    }
}
