//! Validates and executes a single client-initiated currency conversion.

use crate::clock::Clock;
use crate::currency::{Currency, Pair};
use crate::error::EngineError;
use crate::ledger::BalanceLedger;
use crate::lock::{self, DEFAULT_RETRY_DELAY};
use crate::rate_book::RateBook;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

const EXCHANGE_MAX_RETRIES: u32 = 10;

#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    pub from: Currency,
    pub to: Currency,
    pub amount: f64,
}

/// The full quote returned from a successful exchange, as surfaced by `POST /transfer`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeOutcome {
    pub from: Currency,
    pub to: Currency,
    pub actual_from: f64,
    pub to_amount: f64,
    pub margin_profit: f64,
    pub rate: f64,
}

pub struct ExchangeProcessor {
    margin: f64,
    settlement_time: HashMap<Currency, f64>,
}

impl ExchangeProcessor {
    pub fn new(margin: f64, settlement_time: HashMap<Currency, f64>) -> Self {
        Self { margin, settlement_time }
    }

    /// Runs the full validate → lock → quote → settle → apply pipeline. Blocks the calling
    /// thread for the duration of lock retries and the settlement sleep; callers on an async
    /// runtime must invoke this via `tokio::task::spawn_blocking`.
    pub fn process(
        &self,
        ledger: &BalanceLedger,
        rate_book: &RateBook,
        clock: &dyn Clock,
        request: ExchangeRequest,
    ) -> Result<ExchangeOutcome, EngineError> {
        if !ledger.contains(&request.from) {
            return Err(EngineError::UnsupportedCurrency(request.from));
        }
        if !ledger.contains(&request.to) {
            return Err(EngineError::UnsupportedCurrency(request.to));
        }
        if request.from == request.to {
            return Err(EngineError::UnsupportedPair(Pair::new(request.from, request.to)));
        }
        if !(request.amount > 0.0) {
            return Err(EngineError::InvalidAmount(request.amount.to_string()));
        }

        let pair = Pair::new(request.from.clone(), request.to.clone());

        let from_mutex = ledger.mutex(&request.from).expect("checked above");
        let to_mutex = ledger.mutex(&request.to).expect("checked above");

        let mut lock_set = lock::acquire(&[from_mutex, to_mutex], DEFAULT_RETRY_DELAY, Some(EXCHANGE_MAX_RETRIES))?;

        let rate = rate_book
            .latest(&pair)?
            .ok_or_else(|| EngineError::RateUnavailable(pair.clone()))?;

        let margin_profit = request.amount * self.margin;
        let actual_from = request.amount - margin_profit;
        let to_amount = actual_from * rate;

        let to_balance = lock_set.get(1).balance;
        if to_balance < to_amount {
            warn!(
                currency = %request.to,
                available = to_balance,
                requested = to_amount,
                "insufficient liquidity for exchange"
            );
            return Err(EngineError::InsufficientLiquidity {
                currency: request.to,
                available: to_balance,
                requested: to_amount,
            });
        }

        let settlement = self.settlement_seconds(&request.from, &request.to);
        clock.sleep(settlement);

        lock_set.get_mut(1).debit(to_amount);
        lock_set.get_mut(0).credit(actual_from);
        lock_set.get_mut(0).add_profit(margin_profit);
        lock_set.get_mut(0).adjust_flow(actual_from);
        lock_set.get_mut(1).adjust_flow(-to_amount);

        info!(
            pair = %pair,
            actual_from,
            to_amount,
            margin_profit,
            "exchange settled"
        );

        Ok(ExchangeOutcome {
            from: request.from,
            to: request.to,
            actual_from,
            to_amount,
            margin_profit,
            rate,
        })
    }

    fn settlement_seconds(&self, from: &Currency, to: &Currency) -> Duration {
        let from_secs = self.settlement_time.get(from).copied().unwrap_or(0.0);
        let to_secs = self.settlement_time.get(to).copied().unwrap_or(0.0);
        Duration::from_secs_f64(from_secs.max(to_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::InstantClock;

    fn setup() -> (BalanceLedger, RateBook, ExchangeProcessor) {
        let usd = Currency::new("USD");
        let eur = Currency::new("EUR");
        let ledger = BalanceLedger::new([(usd.clone(), 1_000_000.0), (eur.clone(), 1_000_000.0)]);
        let rate_book = RateBook::new([
            Pair::new(eur.clone(), usd.clone()),
            Pair::new(usd.clone(), eur.clone()),
        ]);
        let settlement = HashMap::from([(usd.clone(), 0.0), (eur.clone(), 0.0)]);
        let processor = ExchangeProcessor::new(0.01, settlement);
        (ledger, rate_book, processor)
    }

    #[test]
    fn margin_is_deducted_from_source_and_applied_before_conversion() {
        let (ledger, rate_book, processor) = setup();
        let usd = Currency::new("USD");
        let eur = Currency::new("EUR");
        rate_book
            .insert(&Pair::new(eur.clone(), usd.clone()), 1.10, chrono::Utc::now())
            .unwrap();

        let outcome = processor
            .process(
                &ledger,
                &rate_book,
                &InstantClock,
                ExchangeRequest { from: eur.clone(), to: usd.clone(), amount: 1000.0 },
            )
            .unwrap();

        assert_eq!(outcome.actual_from, 990.0);
        assert_eq!(outcome.to_amount, 1089.0);
        assert_eq!(outcome.margin_profit, 10.0);

        assert_eq!(ledger.balance(&eur), Some(1_000_990.0));
        assert_eq!(ledger.balance(&usd), Some(998_911.0));
        assert_eq!(ledger.profit(&eur), Some(10.0));
        assert_eq!(ledger.flow(&eur), Some(990.0));
        assert_eq!(ledger.flow(&usd), Some(-1089.0));
    }

    #[test]
    fn insufficient_liquidity_leaves_ledger_unchanged() {
        let usd = Currency::new("USD");
        let eur = Currency::new("EUR");
        let ledger = BalanceLedger::new([(usd.clone(), 100.0), (eur.clone(), 1_000_000.0)]);
        let rate_book = RateBook::new([Pair::new(eur.clone(), usd.clone())]);
        rate_book
            .insert(&Pair::new(eur.clone(), usd.clone()), 1.10, chrono::Utc::now())
            .unwrap();
        let processor = ExchangeProcessor::new(0.01, HashMap::from([(usd.clone(), 0.0), (eur.clone(), 0.0)]));

        let result = processor.process(
            &ledger,
            &rate_book,
            &InstantClock,
            ExchangeRequest { from: eur.clone(), to: usd.clone(), amount: 1000.0 },
        );

        assert!(matches!(result, Err(EngineError::InsufficientLiquidity { .. })));
        assert_eq!(ledger.balance(&usd), Some(100.0));
        assert_eq!(ledger.balance(&eur), Some(1_000_000.0));
        assert_eq!(ledger.profit(&eur), Some(0.0));
    }

    #[test]
    fn zero_or_negative_amount_is_invalid() {
        let (ledger, rate_book, processor) = setup();
        let usd = Currency::new("USD");
        let eur = Currency::new("EUR");

        for amount in [0.0, -5.0] {
            let result = processor.process(
                &ledger,
                &rate_book,
                &InstantClock,
                ExchangeRequest { from: eur.clone(), to: usd.clone(), amount },
            );
            assert!(matches!(result, Err(EngineError::InvalidAmount(_))));
        }
    }

    #[test]
    fn missing_rate_is_rejected() {
        let (ledger, rate_book, processor) = setup();
        let usd = Currency::new("USD");
        let eur = Currency::new("EUR");

        let result = processor.process(
            &ledger,
            &rate_book,
            &InstantClock,
            ExchangeRequest { from: eur, to: usd, amount: 100.0 },
        );
        assert!(matches!(result, Err(EngineError::RateUnavailable(_))));
    }

    #[test]
    fn exact_balance_drawdown_succeeds_and_leaves_zero() {
        let eur = Currency::new("EUR");
        let usd = Currency::new("USD");
        // to_amount for amount=1000 at rate 1.10 margin 0.01 is exactly 1089.0
        let ledger = BalanceLedger::new([(usd.clone(), 1089.0), (eur.clone(), 1_000_000.0)]);
        let rate_book = RateBook::new([Pair::new(eur.clone(), usd.clone())]);
        rate_book
            .insert(&Pair::new(eur.clone(), usd.clone()), 1.10, chrono::Utc::now())
            .unwrap();
        let processor = ExchangeProcessor::new(0.01, HashMap::from([(usd.clone(), 0.0), (eur.clone(), 0.0)]));

        let outcome = processor
            .process(&ledger, &rate_book, &InstantClock, ExchangeRequest { from: eur, to: usd.clone(), amount: 1000.0 })
            .unwrap();

        assert_eq!(outcome.to_amount, 1089.0);
        assert_eq!(ledger.balance(&usd), Some(0.0));
    }

    #[test]
    fn unsupported_currency_is_rejected() {
        let (ledger, rate_book, processor) = setup();
        let usd = Currency::new("USD");
        let zzz = Currency::new("ZZZ");

        let result = processor.process(
            &ledger,
            &rate_book,
            &InstantClock,
            ExchangeRequest { from: zzz, to: usd, amount: 10.0 },
        );
        assert!(matches!(result, Err(EngineError::UnsupportedCurrency(_))));
    }

    #[test]
    fn saturated_lock_eventually_returns_transient_failure() {
        let (ledger, rate_book, processor) = setup();
        let usd = Currency::new("USD");
        let eur = Currency::new("EUR");
        rate_book
            .insert(&Pair::new(eur.clone(), usd.clone()), 1.10, chrono::Utc::now())
            .unwrap();

        // saturate USD's lock for longer than the exchange's retry budget
        let held = ledger.mutex(&usd).unwrap().lock();
        let result = processor.process(
            &ledger,
            &rate_book,
            &InstantClock,
            ExchangeRequest { from: eur, to: usd, amount: 1000.0 },
        );
        drop(held);

        assert!(matches!(result, Err(EngineError::LockTimeout)));
    }
}
