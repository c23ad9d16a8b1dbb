//! Periodic (and on-demand) proportional netting of accumulated flow across all currencies,
//! executed under every currency lock at once.

use crate::clock::Clock;
use crate::currency::{Currency, Pair};
use crate::error::EngineError;
use crate::ledger::BalanceLedger;
use crate::lock::{self, DEFAULT_RETRY_DELAY};
use crate::rate_book::RateBook;
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

/// The hard-coded reference currency flows are valued in before netting (the reference
/// implementation values everything in USD with no configuration knob for it).
const REFERENCE_CURRENCY: &str = "USD";

/// A single synthetic internal transfer emitted by the netting algorithm.
#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceOrder {
    pub inflow: Currency,
    pub outflow: Currency,
    pub allocation: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RebalanceOutcome {
    /// Some pair in the fixed set has no rate history yet; aborted without touching state.
    MissingRates,
    /// Every currency's flow was already zero; nothing to net.
    NothingToDo,
    Executed { orders: Vec<RebalanceOrder> },
}

pub struct Rebalancer {
    settlement_time: HashMap<Currency, f64>,
}

impl Rebalancer {
    pub fn new(settlement_time: HashMap<Currency, f64>) -> Self {
        Self { settlement_time }
    }

    /// Runs one full rebalance pass. Acquires every currency lock with unbounded retries
    /// (this is background work and must eventually run) and blocks the calling thread for
    /// the duration of the retries and every order's settlement sleep; callers on an async
    /// runtime must invoke this via `tokio::task::spawn_blocking`.
    pub fn run(
        &self,
        ledger: &BalanceLedger,
        rate_book: &RateBook,
        clock: &dyn Clock,
    ) -> Result<RebalanceOutcome, EngineError> {
        if !rate_book.all_pairs_available() {
            info!("rebalance skipped: not every pair has a known rate yet");
            return Ok(RebalanceOutcome::MissingRates);
        }

        let reference = Currency::new(REFERENCE_CURRENCY);
        let currencies: Vec<Currency> = ledger.currencies().cloned().collect();
        let mutexes: Vec<_> = currencies
            .iter()
            .map(|c| ledger.mutex(c).expect("currency came from this ledger"))
            .collect();
        let index_of: HashMap<Currency, usize> =
            currencies.iter().cloned().enumerate().map(|(i, c)| (c, i)).collect();

        let mut lock_set = lock::acquire(&mutexes, DEFAULT_RETRY_DELAY, None)?;

        let (positives, negatives, total_positive, total_negative) =
            self.value_flows_in_reference_currency(&currencies, &index_of, &lock_set, &reference, rate_book)?;

        if positives.is_empty() && negatives.is_empty() {
            info!("rebalance: no net flow since last rebalance, nothing to do");
            return Ok(RebalanceOutcome::NothingToDo);
        }

        let orders = Self::sweep(positives, total_positive, negatives, total_negative);

        info!(order_count = orders.len(), "rebalancing");
        for order in &orders {
            self.execute_order(order, total_positive, &reference, &index_of, &mut lock_set, rate_book, clock)?;
        }

        for idx in 0..currencies.len() {
            lock_set.get_mut(idx).flow = 0.0;
        }

        info!("rebalancing complete");
        Ok(RebalanceOutcome::Executed { orders })
    }

    /// Step 1: scale each currency's accumulated flow into the reference currency and bucket
    /// into (positive inflow, negative outflow) lists, alongside their totals.
    fn value_flows_in_reference_currency(
        &self,
        currencies: &[Currency],
        index_of: &HashMap<Currency, usize>,
        lock_set: &lock::LockSet<'_, crate::ledger::CurrencyState>,
        reference: &Currency,
        rate_book: &RateBook,
    ) -> Result<(Vec<(Currency, f64)>, Vec<(Currency, f64)>, f64, f64), EngineError> {
        let mut positives = Vec::new();
        let mut negatives = Vec::new();
        let mut total_positive = 0.0;
        let mut total_negative = 0.0;

        for currency in currencies {
            let mut value = lock_set.get(index_of[currency]).flow;
            if currency != reference {
                let pair = Pair::new(currency.clone(), reference.clone());
                let rate = rate_book
                    .latest(&pair)?
                    .expect("rebalance pre-check guarantees every pair has a rate");
                value *= rate;
            }

            if value > 0.0 {
                total_positive += value;
                positives.push((currency.clone(), value));
            } else if value < 0.0 {
                total_negative += value.abs();
                negatives.push((currency.clone(), value.abs()));
            }
        }

        Ok((positives, negatives, total_positive, total_negative))
    }

    /// Steps 2–3: normalise each bucket to sum to 1, then greedily pair off the largest
    /// remaining inflow share against the largest remaining outflow share.
    fn sweep(
        mut positives: Vec<(Currency, f64)>,
        total_positive: f64,
        mut negatives: Vec<(Currency, f64)>,
        total_negative: f64,
    ) -> Vec<RebalanceOrder> {
        for (_, share) in positives.iter_mut() {
            *share /= total_positive;
        }
        for (_, share) in negatives.iter_mut() {
            *share /= total_negative;
        }

        positives.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        negatives.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

        let mut orders = Vec::new();
        let (mut pos, mut neg) = (0usize, 0usize);
        while pos < positives.len() && neg < negatives.len() {
            let alloc = positives[pos].1.min(negatives[neg].1);
            orders.push(RebalanceOrder {
                inflow: positives[pos].0.clone(),
                outflow: negatives[neg].0.clone(),
                allocation: alloc,
            });

            positives[pos].1 -= alloc;
            negatives[neg].1 -= alloc;
            if positives[pos].1 == 0.0 {
                pos += 1;
            }
            if negatives[neg].1 == 0.0 {
                neg += 1;
            }
        }
        orders
    }

    /// Step 4: execute one synthetic order. Balances are mutated *before* the settlement sleep
    /// here, the reverse of the Exchange Processor's order — this matches the reference
    /// implementation's rebalance execution path, which debits/credits before settling funds.
    #[allow(clippy::too_many_arguments)]
    fn execute_order(
        &self,
        order: &RebalanceOrder,
        total_positive: f64,
        reference: &Currency,
        index_of: &HashMap<Currency, usize>,
        lock_set: &mut lock::LockSet<'_, crate::ledger::CurrencyState>,
        rate_book: &RateBook,
        clock: &dyn Clock,
    ) -> Result<(), EngineError> {
        let from_usd_rate = if &order.inflow == reference {
            1.0
        } else {
            rate_book
                .latest(&Pair::new(reference.clone(), order.inflow.clone()))?
                .expect("rebalance pre-check guarantees every pair has a rate")
        };
        let pair_rate = rate_book
            .latest(&Pair::new(order.inflow.clone(), order.outflow.clone()))?
            .expect("rebalance pre-check guarantees every pair has a rate");

        let from_amount = total_positive * order.allocation * from_usd_rate;
        let to_amount = from_amount * pair_rate;

        info!(
            inflow = %order.inflow,
            outflow = %order.outflow,
            from_amount,
            to_amount,
            "rebalancing order"
        );

        lock_set.get_mut(index_of[&order.inflow]).debit(from_amount);
        lock_set.get_mut(index_of[&order.outflow]).credit(to_amount);

        let settlement = self.settlement_seconds(&order.inflow, &order.outflow);
        clock.sleep(settlement);

        Ok(())
    }

    fn settlement_seconds(&self, a: &Currency, b: &Currency) -> Duration {
        let a_secs = self.settlement_time.get(a).copied().unwrap_or(0.0);
        let b_secs = self.settlement_time.get(b).copied().unwrap_or(0.0);
        Duration::from_secs_f64(a_secs.max(b_secs))
    }
}
