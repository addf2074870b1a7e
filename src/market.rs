//! Market configuration and state.
//!
//! A market tracks the aggregate of every position in it: skew, total size,
//! funding, and a debt-correction accumulator that prices all open pnl and
//! funding without walking positions.

use crate::fees::OrderFees;
use crate::funding::{funding_velocity, FundingParams, FundingState};
use crate::margin::LiquidationParameters;
use crate::position::Position;
use crate::d18::mul_decimal;
use crate::rollover::{ClosureLog, FeeSchedule};
use crate::settlement::SettlementStrategy;
use crate::types::{FeedId, MarketId, Price, Quote, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Market status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MarketStatus {
    /// Open for trading, prices read live
    #[default]
    Open,
    /// Administratively closed, prices frozen at close
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    pub id: MarketId,
    /// Human-readable name (e.g., "Ether")
    pub name: String,
    /// Ticker (e.g., "ETH-PERP")
    pub symbol: String,
    pub price_feed: FeedId,
    pub funding: FundingParams,
    pub order_fees: OrderFees,
    pub limit_order_fees: OrderFees,
    /// Rollover interest, fraction of notional per second
    pub rollover_fee_per_second: Decimal,
    pub liquidation: LiquidationParameters,
}

impl MarketConfig {
    pub fn new(id: MarketId, name: &str, symbol: &str, price_feed: FeedId) -> Self {
        Self {
            id,
            name: name.to_string(),
            symbol: symbol.to_string(),
            price_feed,
            funding: FundingParams::disabled(),
            order_fees: OrderFees::zero(),
            limit_order_fees: OrderFees::zero(),
            rollover_fee_per_second: Decimal::ZERO,
            liquidation: LiquidationParameters::default(),
        }
    }

    /// ETH perp with the usual 3/8 bps fees
    pub fn eth_perp() -> Self {
        Self::new(MarketId(100), "Ether", "ETH-PERP", FeedId(100))
            .with_funding(dec!(1_000_000), dec!(0))
            .with_order_fees(dec!(0.0003), dec!(0.0008))
            .with_limit_order_fees(dec!(0.0002), dec!(0.0006))
    }

    pub fn btc_perp() -> Self {
        Self::new(MarketId(200), "Bitcoin", "BTC-PERP", FeedId(200))
            .with_funding(dec!(100_000), dec!(9))
            .with_order_fees(dec!(0.0002), dec!(0.0006))
            .with_limit_order_fees(dec!(0.0001), dec!(0.0004))
    }

    pub fn with_funding(mut self, skew_scale: Decimal, max_funding_velocity: Decimal) -> Self {
        self.funding = FundingParams::new(skew_scale, max_funding_velocity);
        self
    }

    pub fn with_order_fees(mut self, maker: Decimal, taker: Decimal) -> Self {
        self.order_fees = OrderFees::new(maker, taker);
        self
    }

    pub fn with_limit_order_fees(mut self, maker: Decimal, taker: Decimal) -> Self {
        self.limit_order_fees = OrderFees::new(maker, taker);
        self
    }

    pub fn with_rollover_fee(mut self, fee_per_second: Decimal) -> Self {
        self.rollover_fee_per_second = fee_per_second;
        self
    }

    pub fn with_liquidation(mut self, params: LiquidationParameters) -> Self {
        self.liquidation = params;
        self
    }

    pub fn validate(&self) -> Result<(), MarketError> {
        let invalid = |reason: &str| MarketError::InvalidConfig {
            market: self.id,
            reason: reason.to_string(),
        };
        if self.funding.skew_scale.is_sign_negative() {
            return Err(invalid("skew scale must not be negative"));
        }
        if self.funding.max_funding_velocity.is_sign_negative() {
            return Err(invalid("funding velocity must not be negative"));
        }
        for fees in [&self.order_fees, &self.limit_order_fees] {
            if fees.maker_fee.is_sign_negative() || fees.taker_fee.is_sign_negative() {
                return Err(invalid("fees must not be negative"));
            }
        }
        if self.rollover_fee_per_second.is_sign_negative() {
            return Err(invalid("rollover fee must not be negative"));
        }
        if !self.liquidation.is_valid() {
            return Err(invalid("liquidation parameters out of range"));
        }
        Ok(())
    }
}

/// Dynamic market state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketState {
    pub config: MarketConfig,
    pub status: MarketStatus,
    /// Frozen index price while closed
    pub close_price: Option<Price>,
    pub closures: ClosureLog,
    /// Rollover fee history. `config.rollover_fee_per_second` is the latest entry.
    pub rollover_fees: FeeSchedule,
    /// Sum of signed position sizes
    pub skew: Decimal,
    /// Sum of absolute position sizes
    pub size: Decimal,
    pub funding: FundingState,
    /// Sum over positions of size * (entry + funding baseline)
    pub debt_correction_accumulator: Decimal,
    /// Rollover interest collected, kept out of reported debt
    pub rollover_revenue: Quote,
    pub strategies: Vec<SettlementStrategy>,
    pub created_at: Timestamp,
}

impl MarketState {
    pub fn new(config: MarketConfig, timestamp: Timestamp) -> Self {
        Self {
            rollover_fees: FeeSchedule::new(config.rollover_fee_per_second),
            config,
            status: MarketStatus::Open,
            close_price: None,
            closures: ClosureLog::new(),
            skew: Decimal::ZERO,
            size: Decimal::ZERO,
            funding: FundingState::new(timestamp),
            debt_correction_accumulator: Decimal::ZERO,
            rollover_revenue: Quote::zero(),
            strategies: Vec::new(),
            created_at: timestamp,
        }
    }

    pub fn id(&self) -> MarketId {
        self.config.id
    }

    pub fn is_closed(&self) -> bool {
        self.status == MarketStatus::Closed
    }

    pub fn close(&mut self, price: Price, at: Timestamp) {
        self.status = MarketStatus::Closed;
        self.close_price = Some(price);
        self.closures.begin(at);
    }

    pub fn reopen(&mut self, at: Timestamp) {
        self.status = MarketStatus::Open;
        self.close_price = None;
        self.closures.end(at);
    }

    // applies to time from `at` onward only
    pub fn set_rollover_fee(&mut self, fee_per_second: Decimal, at: Timestamp) {
        self.config.rollover_fee_per_second = fee_per_second;
        self.rollover_fees.set(at, fee_per_second);
    }

    pub fn strategy(&self, id: u32) -> Option<&SettlementStrategy> {
        self.strategies.get(id as usize)
    }

    pub fn add_strategy(&mut self, strategy: SettlementStrategy) -> u32 {
        self.strategies.push(strategy);
        (self.strategies.len() - 1) as u32
    }

    pub fn current_funding_velocity(&self) -> Decimal {
        funding_velocity(&self.config.funding, self.skew)
    }

    pub fn current_funding_rate(&self, now: Timestamp) -> Decimal {
        self.funding.current_rate(&self.config.funding, self.skew, now)
    }

    // fold funding up to now. always before skew moves.
    pub fn recompute_funding(&mut self, price: Price, now: Timestamp) -> Decimal {
        self.funding.recompute(&self.config.funding, self.skew, price, now);
        self.funding.last_value
    }

    // keeps skew, size and the debt accumulator in step with one position update
    pub fn apply_position_change(&mut self, before: &Position, after: &Position) {
        self.skew += after.size.value() - before.size.value();
        self.size += after.size.abs() - before.size.abs();
        self.debt_correction_accumulator += after.debt_correction() - before.debt_correction();
    }

    // unrealized pnl + funding owed to all open positions
    pub fn reported_debt(&self, price: Price, now: Timestamp) -> Quote {
        let funding_index = self.funding.next_funding(&self.config.funding, self.skew, price, now);
        Quote::new(mul_decimal(self.skew, price.value() + funding_index) - self.debt_correction_accumulator)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketError {
    #[error("Invalid config for market {market:?}: {reason}")]
    InvalidConfig { market: MarketId, reason: String },

    #[error("Market {0:?} already exists")]
    AlreadyExists(MarketId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccountId;

    fn px(v: Decimal) -> Price {
        Price::new_unchecked(v)
    }

    fn position(size: Decimal, entry: Decimal) -> Position {
        let mut pos = Position::new(AccountId(1), MarketId(100), px(entry), Decimal::ZERO, Timestamp::from_secs(0));
        pos.size = crate::types::SignedSize::new(size);
        pos.last_interest_baseline_size = size;
        pos
    }

    #[test]
    fn presets_are_valid() {
        assert!(MarketConfig::eth_perp().validate().is_ok());
        assert!(MarketConfig::btc_perp().validate().is_ok());
    }

    #[test]
    fn negative_fee_rejected() {
        let config = MarketConfig::eth_perp().with_order_fees(dec!(-0.1), dec!(0.1));
        assert!(matches!(config.validate(), Err(MarketError::InvalidConfig { .. })));
    }

    #[test]
    fn close_and_reopen() {
        let mut market = MarketState::new(MarketConfig::eth_perp(), Timestamp::from_secs(0));
        market.close(px(dec!(1000)), Timestamp::from_secs(10));
        assert!(market.is_closed());
        assert_eq!(market.close_price, Some(px(dec!(1000))));

        market.reopen(Timestamp::from_secs(70));
        assert!(!market.is_closed());
        assert_eq!(market.close_price, None);
        assert_eq!(market.closures.closed_seconds(Timestamp::from_secs(0), Timestamp::from_secs(100)), 60);
    }

    #[test]
    fn skew_and_debt_follow_positions() {
        let mut market = MarketState::new(MarketConfig::eth_perp(), Timestamp::from_secs(0));
        let empty = position(Decimal::ZERO, dec!(1000));
        let long = position(dec!(2), dec!(1000));
        let short = position(dec!(-1), dec!(1010));

        market.apply_position_change(&empty, &long);
        market.apply_position_change(&empty, &short);
        assert_eq!(market.skew, dec!(1));
        assert_eq!(market.size, dec!(3));

        // long +2*(1100-1000) = 200, short -1*(1100-1010) = -90
        let debt = market.reported_debt(px(dec!(1100)), Timestamp::from_secs(0));
        assert_eq!(debt.value(), dec!(110));
    }

    #[test]
    fn rollover_fee_history_is_kept() {
        let mut market = MarketState::new(MarketConfig::eth_perp().with_rollover_fee(dec!(0.000001)), Timestamp::from_secs(0));
        market.set_rollover_fee(dec!(0.000003), Timestamp::from_secs(50));
        assert_eq!(market.config.rollover_fee_per_second, dec!(0.000003));
        assert_eq!(market.rollover_fees.rate_at(Timestamp::from_secs(49)), dec!(0.000001));
        assert_eq!(market.rollover_fees.current(), dec!(0.000003));
    }

    #[test]
    fn strategies_are_indexed() {
        let mut market = MarketState::new(MarketConfig::eth_perp(), Timestamp::from_secs(0));
        let id = market.add_strategy(SettlementStrategy::delayed(FeedId(100), 5, 60));
        assert_eq!(id, 0);
        assert!(market.strategy(0).is_some());
        assert!(market.strategy(1).is_none());
    }
}
