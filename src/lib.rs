//! A small, in-memory foreign-exchange liquidity pool: streaming rate ingestion, margin'd
//! client conversions, and periodic proportional rebalancing of inventory across a fixed set of
//! currencies.
//!
//! The [`engine`] module is the sole subject of this crate's concurrency contract — see
//! [`engine::LiquidityPoolEngine`] for the boundary external callers use. Everything else
//! ([`http`], [`config`]) is a thin, out-of-core adapter around it.

pub mod clock;
pub mod config;
pub mod currency;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod http;
pub mod ledger;
pub mod lock;
pub mod rate_book;
pub mod rebalance;
