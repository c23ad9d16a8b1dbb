//! Per-currency balance, accumulated margin profit and net flow.
//!
//! Each currency's triple is a single [`parking_lot::Mutex`]-guarded [`CurrencyState`] rather
//! than three separately-locked maps: `balance`, `profit` and `flow` for one currency are always
//! mutated together under the same lock acquisition, so one mutex per currency is
//! both sufficient and avoids a second lock-ordering problem between the three maps.

use crate::currency::Currency;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;

/// The mutable state owned by one currency's lock.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrencyState {
    pub balance: f64,
    pub profit: f64,
    pub flow: f64,
}

impl CurrencyState {
    pub fn debit(&mut self, amount: f64) {
        self.balance -= amount;
    }

    pub fn credit(&mut self, amount: f64) {
        self.balance += amount;
    }

    pub fn add_profit(&mut self, amount: f64) {
        self.profit += amount;
    }

    pub fn adjust_flow(&mut self, delta: f64) {
        self.flow += delta;
    }
}

/// A read-only, un-synchronised-across-currencies snapshot of the ledger, used by `status`.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceSnapshot {
    pub balances: HashMap<Currency, f64>,
    pub profit: HashMap<Currency, f64>,
}

pub struct BalanceLedger {
    currencies: HashMap<Currency, Mutex<CurrencyState>>,
}

impl BalanceLedger {
    /// Builds the ledger from `initial_balances`, sized exactly to the fixed currency set `S`.
    pub fn new(initial_balances: impl IntoIterator<Item = (Currency, f64)>) -> Self {
        Self {
            currencies: initial_balances
                .into_iter()
                .map(|(currency, balance)| {
                    (
                        currency,
                        Mutex::new(CurrencyState { balance, profit: 0.0, flow: 0.0 }),
                    )
                })
                .collect(),
        }
    }

    /// The mutex guarding `currency`'s state, for use with [`crate::lock::acquire`].
    pub fn mutex(&self, currency: &Currency) -> Option<&Mutex<CurrencyState>> {
        self.currencies.get(currency)
    }

    pub fn currencies(&self) -> impl Iterator<Item = &Currency> {
        self.currencies.keys()
    }

    pub fn contains(&self, currency: &Currency) -> bool {
        self.currencies.contains_key(currency)
    }

    pub fn balance(&self, currency: &Currency) -> Option<f64> {
        self.currencies.get(currency).map(|m| m.lock().balance)
    }

    pub fn profit(&self, currency: &Currency) -> Option<f64> {
        self.currencies.get(currency).map(|m| m.lock().profit)
    }

    pub fn flow(&self, currency: &Currency) -> Option<f64> {
        self.currencies.get(currency).map(|m| m.lock().flow)
    }

    /// A best-effort snapshot: not atomic across currencies.
    pub fn snapshot(&self) -> BalanceSnapshot {
        let mut balances = HashMap::with_capacity(self.currencies.len());
        let mut profit = HashMap::with_capacity(self.currencies.len());
        for (currency, mutex) in &self.currencies {
            let state = mutex.lock();
            balances.insert(currency.clone(), state.balance);
            profit.insert(currency.clone(), state.profit);
        }
        BalanceSnapshot { balances, profit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debit_credit_and_profit_adjust_independently_per_currency() {
        let usd = Currency::new("USD");
        let eur = Currency::new("EUR");
        let ledger = BalanceLedger::new([(usd.clone(), 100.0), (eur.clone(), 200.0)]);

        {
            let mut state = ledger.mutex(&usd).unwrap().lock();
            state.debit(10.0);
            state.add_profit(1.0);
            state.adjust_flow(-10.0);
        }

        assert_eq!(ledger.balance(&usd), Some(90.0));
        assert_eq!(ledger.profit(&usd), Some(1.0));
        assert_eq!(ledger.flow(&usd), Some(-10.0));
        assert_eq!(ledger.balance(&eur), Some(200.0));
    }
}
