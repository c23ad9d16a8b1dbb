//! Per-pair, time-ordered rate history.
//!
//! Each pair gets its own [`parking_lot::Mutex`], unlike the reference implementation which
//! mutates its rate history dict with no lock at all. Using one mutex per pair rather than a
//! single global one means concurrent updates to unrelated pairs never contend, while still
//! eliminating the data race a true parallel rate-update stream would hit against a bare,
//! unsynchronised `Vec`.

use crate::currency::Pair;
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single immutable rate observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateEntry {
    pub rate: f64,
    pub timestamp: DateTime<Utc>,
}

pub struct RateBook {
    histories: HashMap<Pair, Mutex<Vec<RateEntry>>>,
}

impl RateBook {
    /// Builds an empty history for every pair in `pairs` (the fixed, permuted pair set).
    pub fn new(pairs: impl IntoIterator<Item = Pair>) -> Self {
        Self {
            histories: pairs.into_iter().map(|pair| (pair, Mutex::new(Vec::new()))).collect(),
        }
    }

    /// Inserts `rate` at `timestamp`, preserving non-decreasing timestamp order. Equal
    /// timestamps are inserted after any existing equal entries, so the latest inserter of a
    /// tied timestamp only becomes "latest" if it lands at the tail.
    pub fn insert(&self, pair: &Pair, rate: f64, timestamp: DateTime<Utc>) -> Result<(), EngineError> {
        let history = self
            .histories
            .get(pair)
            .ok_or_else(|| EngineError::UnsupportedPair(pair.clone()))?;

        let mut history = history.lock();
        let mut i = history.len();
        while i > 0 && history[i - 1].timestamp > timestamp {
            i -= 1;
        }
        history.insert(i, RateEntry { rate, timestamp });
        Ok(())
    }

    /// Returns the tail entry's rate, or `None` if the pair has no history yet.
    pub fn latest(&self, pair: &Pair) -> Result<Option<f64>, EngineError> {
        let history = self
            .histories
            .get(pair)
            .ok_or_else(|| EngineError::UnsupportedPair(pair.clone()))?;
        Ok(history.lock().last().map(|entry| entry.rate))
    }

    /// Returns the full ordered history for `pair`.
    pub fn history(&self, pair: &Pair) -> Result<Vec<RateEntry>, EngineError> {
        let history = self
            .histories
            .get(pair)
            .ok_or_else(|| EngineError::UnsupportedPair(pair.clone()))?;
        Ok(history.lock().clone())
    }

    /// Whether every pair in the fixed set has at least one rate entry (required before a
    /// rebalance can value flows).
    pub fn all_pairs_available(&self) -> bool {
        self.histories.values().all(|history| !history.lock().is_empty())
    }
}
