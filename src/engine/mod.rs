// 8.0: settlement engine. owns every market, account, nonce and lock, and runs each
// public operation as one atomic transaction: it either commits with its events or
// rolls back with an error. deterministic, time and prices are injected.

mod admin;
mod collateral;
mod config;
mod core;
mod liquidations;
mod orders;
mod positions;
mod pricing;
mod queries;
mod results;

pub use config::EngineConfig;
pub use core::{Engine, Ledger};
pub use orders::OrderCommitment;
pub use results::{
    CommitOutcome, EngineError, ErrorKind, LimitOrderMatch, LiquidationResult, MarketSummary, OpenPosition,
    SettlementResult,
};
