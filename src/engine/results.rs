// 8.0.2: result types and errors for engine operations.

use crate::account::{AccountError, Permission};
use crate::collateral::LockError;
use crate::config::ConfigError;
use crate::fees::FeeBreakdown;
use crate::market::MarketError;
use crate::order::{AsyncOrder, NonceState};
use crate::position::Realized;
use crate::price_feed::PriceFeedError;
use crate::signing::SigningError;
use crate::types::{AccountId, Address, CollateralId, MarketId, Price, Quote, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Outcome of one position settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementResult {
    pub account_id: AccountId,
    pub market_id: MarketId,
    pub fill_price: Price,
    pub size_delta: Decimal,
    pub new_size: Decimal,
    pub realized: Realized,
    pub fees: FeeBreakdown,
    pub referral_fees: Quote,
    pub collected_fees: Quote,
    pub settlement_reward: Quote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOrderMatch {
    pub market_id: MarketId,
    pub price: Price,
    // unsigned amount matched this time
    pub fill_amount: Decimal,
    pub short: SettlementResult,
    pub long: SettlementResult,
    pub short_state: NonceState,
    pub long_state: NonceState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitOutcome {
    /// Waiting for a keeper inside the settlement window
    Pending(AsyncOrder),
    /// Synchronous strategy, settled on commit
    Settled(SettlementResult),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationResult {
    pub account_id: AccountId,
    // (market, size closed)
    pub closed_positions: Vec<(MarketId, Decimal)>,
    pub seized: Quote,
    pub keeper_reward: Quote,
    pub full_liquidation: bool,
}

/// (pnl, accrued funding, size, owed interest) of a position at the index price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OpenPosition {
    pub pnl: Quote,
    pub accrued_funding: Quote,
    pub size: Decimal,
    pub owed_interest: Quote,
}

impl OpenPosition {
    pub fn equity(&self) -> Quote {
        self.pnl.add(self.accrued_funding).sub(self.owed_interest)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSummary {
    pub market_id: MarketId,
    pub skew: Decimal,
    pub size: Decimal,
    pub index_price: Price,
    pub current_funding_rate: Decimal,
    pub current_funding_velocity: Decimal,
    pub reported_debt: Quote,
    pub rollover_revenue: Quote,
    pub is_closed: bool,
}

/// Failure class, for clients deciding whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bad input, nothing to retry
    Validation,
    Authorization,
    /// Retry later
    Timing,
    /// Add margin or collateral, then retry
    Resource,
    /// Nonce or lock already consumed
    Replay,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    // validation
    #[error("Invalid market {0:?}")]
    InvalidMarket(MarketId),

    #[error("Account {0:?} not found")]
    AccountNotFound(AccountId),

    #[error("Zero size order")]
    ZeroSizeOrder,

    #[error("Invalid settlement strategy {strategy_id} for market {market:?}")]
    InvalidSettlementStrategy { market: MarketId, strategy_id: u32 },

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Invalid fee tier {0}")]
    InvalidFeeTier(u32),

    #[error("Collateral {0:?} is not configured")]
    InvalidCollateral(CollateralId),

    #[error("Market {0:?} is closed")]
    MarketClosed(MarketId),

    #[error("Limit orders are for different markets: {short:?} vs {long:?}")]
    LimitOrderMarketMismatch { short: MarketId, long: MarketId },

    #[error("Mismatching order sides")]
    MismatchingOrderSides,

    #[error("Short price {short_price} above long price {long_price}")]
    LimitOrderPriceMismatch { short_price: Price, long_price: Price },

    #[error("Exactly one side must be the maker")]
    MismatchingMakerTakerLimitOrder,

    #[error("Order {nonce} of account {account:?} would be left partially filled: remaining {remaining}, fill {fill}")]
    LimitOrderAmountError {
        account: AccountId,
        nonce: u64,
        remaining: Decimal,
        fill: Decimal,
    },

    #[error("Fill price {fill_price} exceeds acceptable price {acceptable_price}")]
    AcceptablePriceExceeded { fill_price: Price, acceptable_price: Price },

    #[error("Account {account:?} has no open position in market {market:?}")]
    NoOpenPosition { account: AccountId, market: MarketId },

    #[error("Account {0:?} is not eligible for liquidation")]
    NotEligibleForLiquidation(AccountId),

    #[error("Account {0:?} already has a pending order")]
    OrderAlreadyCommitted(AccountId),

    #[error("Account {0:?} has no pending order")]
    NoPendingOrder(AccountId),

    #[error("Invalid signature: {0}")]
    InvalidSignature(#[from] SigningError),

    #[error("Price feed error: {0}")]
    PriceFeed(#[from] PriceFeedError),

    #[error("Market error: {0}")]
    Market(#[from] MarketError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    // authorization
    #[error("Unauthorized: {0}")]
    Unauthorized(Address),

    #[error("Permission {permission} denied on account {account:?} for {caller}")]
    PermissionDenied {
        account: AccountId,
        permission: Permission,
        caller: Address,
    },

    #[error("Unauthorized relayer {0}")]
    UnauthorizedRelayer(Address),

    #[error("Invalid limit order relayer {0}")]
    LimitOrderRelayerInvalid(Address),

    #[error("Limit orders use different relayers: {short} vs {long}")]
    LimitOrderDifferentRelayer { short: Address, long: Address },

    #[error("Unauthorized keeper {0}")]
    UnauthorizedKeeper(Address),

    // timing
    #[error("Order expired at {expiration}, now {now}")]
    OrderExpired { expiration: Timestamp, now: Timestamp },

    #[error("Settlement window [{start}, {end}] not open at {now}")]
    SettlementWindowNotOpen {
        now: Timestamp,
        start: Timestamp,
        end: Timestamp,
    },

    #[error("Settlement window closed at {end}, now {now}")]
    SettlementWindowExpired { now: Timestamp, end: Timestamp },

    #[error("Settlement window open until {end}, now {now}")]
    SettlementWindowNotExpired { now: Timestamp, end: Timestamp },

    #[error("Fee tier update expired at {expiry}, now {now}")]
    FeeTierUpdateExpired { expiry: Timestamp, now: Timestamp },

    // resource
    #[error("Insufficient margin: available {available}, required {required}")]
    InsufficientMargin { available: Quote, required: Quote },

    #[error("Insufficient collateral {collateral:?} on account {account:?} to lock {amount}")]
    InsufficientCollateralForLock {
        account: AccountId,
        collateral: CollateralId,
        amount: Decimal,
    },

    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    // replay
    #[error("Limit order {nonce} of account {account:?} already used")]
    LimitOrderAlreadyUsed { account: AccountId, nonce: u64 },

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        use EngineError::*;
        match self {
            Unauthorized(_)
            | PermissionDenied { .. }
            | UnauthorizedRelayer(_)
            | LimitOrderRelayerInvalid(_)
            | LimitOrderDifferentRelayer { .. }
            | UnauthorizedKeeper(_) => ErrorKind::Authorization,

            OrderExpired { .. }
            | SettlementWindowNotOpen { .. }
            | SettlementWindowExpired { .. }
            | SettlementWindowNotExpired { .. }
            | FeeTierUpdateExpired { .. }
            | Lock(LockError::LockNotExpired { .. }) => ErrorKind::Timing,

            // a stale or missing price clears up once the oracle publishes
            PriceFeed(_) => ErrorKind::Timing,

            InsufficientMargin { .. } | InsufficientCollateralForLock { .. } | Account(_) => ErrorKind::Resource,

            LimitOrderAlreadyUsed { .. } | Lock(LockError::InvalidLockId(_)) => ErrorKind::Replay,

            _ => ErrorKind::Validation,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Timing | ErrorKind::Resource)
    }
}
