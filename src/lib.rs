// perps-settle: perpetual futures settlement engine.
// accounting-first simulator of a perps market: funding and skew, rollover
// interest, fee tiers, signed off-chain orders, margin and liquidation.
// all computation is deterministic. time and prices are injected.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: MarketId, AccountId, Address, Price, Quote, Timestamp
//   1.8  d18.rs: 18-decimal fixed point, truncating mul/div
//   2.x  order.rs: signed order payloads and the nonce state machine
//   3.x  fees.rs: fee tiers, maker/taker split, revenue share, keeper costs
//   4.x  position.rs: position record, realization on settlement
//   5.x  funding.rs: funding rate, velocity and skew-adjusted fill price
//   5.5  rollover.rs: per-second interest, fee history, market closure intervals
//   6.1  engine/admin.rs: market close and reopen
//   7.x  engine/orders.rs: async, limit, cancel and commit/settle flows
//   8.x  engine/: core ledger, settlement, margin checks, liquidations
//   9.x  collateral.rs, engine/collateral.rs: collateral types and time locks
//   11.0 events.rs: state transition events for audit
//   12.x config.rs: protocol bootstrap config, env presets
//
// unnumbered: market.rs (config + runtime state, reported debt), margin.rs,
// liquidation.rs, price_feed.rs, settlement.rs (strategies and windows),
// account.rs, signing.rs (typed-data hashing, Ed25519)

// core accounting modules
pub mod account;
pub mod d18;
pub mod engine;
pub mod events;
pub mod fees;
pub mod funding;
pub mod liquidation;
pub mod margin;
pub mod market;
pub mod position;
pub mod rollover;
pub mod types;

// order flow
pub mod collateral;
pub mod order;
pub mod settlement;
pub mod signing;

// integration modules
pub mod config;
pub mod price_feed;

// re exports for convenience
pub use account::*;
pub use collateral::*;
pub use engine::*;
pub use events::*;
pub use fees::*;
pub use funding::*;
pub use liquidation::*;
pub use margin::*;
pub use market::*;
pub use order::*;
pub use position::*;
pub use rollover::*;
pub use settlement::*;
pub use types::*;
pub use config::{ConfigError, Environment, MarketSetup, ProtocolConfig, ReferrerShare};
pub use price_feed::{OraclePrices, PriceFeedError, PriceReading, PriceSource};
pub use signing::{recover_signer, Ed25519Verifier, Eip712Domain, OrderSignature, OrderSigner, SignatureVerifier, SigningError, TypedData};
