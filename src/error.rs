use crate::currency::{Currency, Pair};
use thiserror::Error;

/// All errors surfaced by the [`crate::engine::LiquidityPoolEngine`] and its components.
///
/// Client-validation errors (`UnsupportedCurrency`, `UnsupportedPair`, `InvalidAmount`,
/// `ParseError`) are distinguished from business failures (`RateUnavailable`,
/// `InsufficientLiquidity`) and retryable failures (`LockTimeout`) so the HTTP boundary can map
/// each to the right status code without string-matching a message.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("currency {0} is not supported by this pool")]
    UnsupportedCurrency(Currency),

    #[error("pair {0} is not supported by this pool")]
    UnsupportedPair(Pair),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("error parsing request: {0}")]
    ParseError(String),

    #[error("no rate available for pair {0}")]
    RateUnavailable(Pair),

    #[error("insufficient liquidity in {currency}: have {available}, need {requested}")]
    InsufficientLiquidity {
        currency: Currency,
        available: f64,
        requested: f64,
    },

    #[error("failed to acquire required locks after retrying, please try again")]
    LockTimeout,

    #[error("transient failure, please try again")]
    TransientFailure,
}

impl EngineError {
    /// Whether this error is a retryable, no-state-mutated failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::LockTimeout | EngineError::TransientFailure)
    }
}

impl From<crate::lock::LockTimeout> for EngineError {
    fn from(_: crate::lock::LockTimeout) -> Self {
        EngineError::LockTimeout
    }
}

/// Errors raised loading and validating the engine's [`crate::config::Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
