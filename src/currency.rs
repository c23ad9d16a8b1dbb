use derive_more::{Constructor, Display};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt::{self, Formatter};

/// An opaque currency tag drawn from the fixed, configured set `S` (e.g. USD, EUR, JPY, GBP).
///
/// Backed by a [`SmolStr`] rather than a heap-allocated [`String`]: currency codes are short,
/// immutable, and cloned constantly (lock lookups, rate book keys, flow maps), so the
/// small-string-optimised representation avoids an allocation on every clone.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Currency(SmolStr);

impl Currency {
    pub fn new(code: impl Into<SmolStr>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for Currency {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl From<String> for Currency {
    fn from(code: String) -> Self {
        Self::new(code)
    }
}

/// An ordered currency pair `(from, to)`, rendered as `"from/to"`.
///
/// `Pair::new` does not itself reject `from == to`; callers that accept a pair from external
/// input (the exchange processor, the rate book) validate that separately.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Constructor, Serialize, Deserialize)]
pub struct Pair {
    pub from: Currency,
    pub to: Currency,
}

impl Pair {
    /// Parses a dash-separated pair as used by `GET /internal/fx-rate/{pair}` (e.g. `USD-EUR`).
    pub fn from_dash_separated(raw: &str) -> Option<Self> {
        let (from, to) = raw.split_once('-')?;
        Some(Pair::new(Currency::new(from), Currency::new(to)))
    }

    /// Parses a slash-separated pair as used in rate update payloads (e.g. `USD/EUR`).
    pub fn from_slash_separated(raw: &str) -> Option<Self> {
        let (from, to) = raw.split_once('/')?;
        Some(Pair::new(Currency::new(from), Currency::new(to)))
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.from, self.to)
    }
}
