// 11.0: every committed state change produces an event. rejected operations
// produce none. the EventPayload enum lists all event types.

use crate::collateral::LockId;
use crate::margin::LiquidationParameters;
use crate::settlement::SettlementStrategy;
use crate::types::{AccountId, Address, CollateralId, MarketId, Price, Quote, Timestamp, TrackingCode};
use crate::account::Permission;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    // Settlement events
    OrderSettled(OrderSettledEvent),
    LimitOrderSettled(LimitOrderSettledEvent),
    LimitOrderCancelled { account_id: AccountId, nonce: u64 },
    InterestCharged(InterestChargedEvent),
    MarketUpdated(MarketUpdatedEvent),
    OrderCommitted(OrderCommittedEvent),
    PreviousOrderExpired {
        account_id: AccountId,
        market_id: MarketId,
        size_delta: Decimal,
        acceptable_price: Price,
        commitment_time: Timestamp,
        tracking_code: TrackingCode,
    },

    // Liquidation events
    PositionLiquidated(PositionLiquidatedEvent),
    AccountLiquidationAttempt {
        account_id: AccountId,
        reward: Quote,
        full_liquidation: bool,
    },

    // Account / collateral events
    AccountCreated { account_id: AccountId, owner: Address },
    CollateralModified {
        account_id: AccountId,
        collateral_id: CollateralId,
        amount_delta: Decimal,
        sender: Address,
    },
    CollateralTimeLocked(CollateralTimeLockedEvent),
    CollateralTimeUnlocked {
        account_id: AccountId,
        collateral_id: CollateralId,
        amount: Decimal,
        lock_id: LockId,
    },
    PermissionGranted {
        account_id: AccountId,
        permission: Permission,
        target: Address,
        sender: Address,
    },
    PermissionRevoked {
        account_id: AccountId,
        permission: Permission,
        target: Address,
        sender: Address,
    },

    // Admin events
    FeeTierSet {
        tier_id: u32,
        maker_discount_bps: u32,
        taker_discount_bps: u32,
    },
    FeeTierUpdated { account_id: AccountId, tier_id: u32 },
    RolloverFeeSet { market_id: MarketId, fee_per_second: Decimal },
    LiquidationParametersSet {
        market_id: MarketId,
        params: LiquidationParameters,
    },
    MarketsClosed { market_ids: Vec<MarketId> },
    MarketsOpened { market_ids: Vec<MarketId> },
    SettlementStrategySet {
        market_id: MarketId,
        strategy_id: u32,
        strategy: SettlementStrategy,
    },
    ReferrerShareUpdated { referrer: Address, share_ratio: Decimal },
}

impl EventPayload {
    pub fn name(&self) -> &'static str {
        match self {
            EventPayload::OrderSettled(_) => "OrderSettled",
            EventPayload::LimitOrderSettled(_) => "LimitOrderSettled",
            EventPayload::LimitOrderCancelled { .. } => "LimitOrderCancelled",
            EventPayload::InterestCharged(_) => "InterestCharged",
            EventPayload::MarketUpdated(_) => "MarketUpdated",
            EventPayload::OrderCommitted(_) => "OrderCommitted",
            EventPayload::PreviousOrderExpired { .. } => "PreviousOrderExpired",
            EventPayload::PositionLiquidated(_) => "PositionLiquidated",
            EventPayload::AccountLiquidationAttempt { .. } => "AccountLiquidationAttempt",
            EventPayload::AccountCreated { .. } => "AccountCreated",
            EventPayload::CollateralModified { .. } => "CollateralModified",
            EventPayload::CollateralTimeLocked(_) => "CollateralTimeLocked",
            EventPayload::CollateralTimeUnlocked { .. } => "CollateralTimeUnlocked",
            EventPayload::PermissionGranted { .. } => "PermissionGranted",
            EventPayload::PermissionRevoked { .. } => "PermissionRevoked",
            EventPayload::FeeTierSet { .. } => "FeeTierSet",
            EventPayload::FeeTierUpdated { .. } => "FeeTierUpdated",
            EventPayload::RolloverFeeSet { .. } => "RolloverFeeSet",
            EventPayload::LiquidationParametersSet { .. } => "LiquidationParametersSet",
            EventPayload::MarketsClosed { .. } => "MarketsClosed",
            EventPayload::MarketsOpened { .. } => "MarketsOpened",
            EventPayload::SettlementStrategySet { .. } => "SettlementStrategySet",
            EventPayload::ReferrerShareUpdated { .. } => "ReferrerShareUpdated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSettledEvent {
    pub market_id: MarketId,
    pub account_id: AccountId,
    pub fill_price: Price,
    pub pnl: Quote,
    pub accrued_funding: Quote,
    pub size_delta: Decimal,
    pub new_size: Decimal,
    pub total_fees: Quote,
    pub referral_fees: Quote,
    pub collected_fees: Quote,
    pub settlement_reward: Quote,
    pub tracking_code: TrackingCode,
    pub settler: Address,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrderSettledEvent {
    pub market_id: MarketId,
    pub account_id: AccountId,
    pub nonce: u64,
    pub price: Price,
    // filled this time, signed
    pub amount: Decimal,
    pub limit_order_fees: Quote,
    pub relayer_fees: Quote,
    pub relayer: Address,
    pub tracking_code: TrackingCode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestChargedEvent {
    pub account_id: AccountId,
    pub market_id: MarketId,
    pub interest: Quote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketUpdatedEvent {
    pub market_id: MarketId,
    pub price: Price,
    pub skew: Decimal,
    pub size: Decimal,
    pub size_delta: Decimal,
    pub current_funding_rate: Decimal,
    pub current_funding_velocity: Decimal,
    pub interest_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCommittedEvent {
    pub market_id: MarketId,
    pub account_id: AccountId,
    pub size_delta: Decimal,
    pub settlement_strategy_id: u32,
    pub acceptable_price: Price,
    pub commitment_time: Timestamp,
    pub expiration_time: Timestamp,
    pub tracking_code: TrackingCode,
    pub sender: Address,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionLiquidatedEvent {
    pub account_id: AccountId,
    pub market_id: MarketId,
    pub amount_liquidated: Decimal,
    pub current_position_size: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateralTimeLockedEvent {
    pub account_id: AccountId,
    pub collateral_id: CollateralId,
    pub amount: Decimal,
    pub duration: i64,
    pub lock_id: LockId,
    pub boost_bps: u32,
}
