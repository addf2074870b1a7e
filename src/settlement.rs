// Settlement strategies
//
// A strategy says how a committed order becomes executable: synchronous orders
// settle at the live price right away, delayed ones wait `settlement_delay` after
// their anchor timestamp and then have `settlement_window_duration` seconds to be
// settled against a verified price.

use crate::types::{FeedId, Quote, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementStrategyType {
    Synchronous,
    Delayed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementStrategy {
    pub strategy_type: SettlementStrategyType,
    pub settlement_delay: i64,
    pub settlement_window_duration: i64,
    /// Feed the verified price is read from
    pub price_feed: FeedId,
    /// Paid by the trader to whoever settles
    pub settlement_reward: Quote,
    /// Verified price is taken this long after the anchor
    pub commitment_price_delay: i64,
    pub disabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStatus {
    NotOpen,
    Open,
    Expired,
}

impl SettlementStrategy {
    pub fn delayed(price_feed: FeedId, settlement_delay: i64, settlement_window_duration: i64) -> Self {
        Self {
            strategy_type: SettlementStrategyType::Delayed,
            settlement_delay,
            settlement_window_duration,
            price_feed,
            settlement_reward: Quote::zero(),
            commitment_price_delay: 0,
            disabled: false,
        }
    }

    pub fn synchronous(price_feed: FeedId) -> Self {
        Self {
            strategy_type: SettlementStrategyType::Synchronous,
            settlement_delay: 0,
            settlement_window_duration: 0,
            price_feed,
            settlement_reward: Quote::zero(),
            commitment_price_delay: 0,
            disabled: false,
        }
    }

    pub fn with_reward(mut self, reward: Quote) -> Self {
        self.settlement_reward = reward;
        self
    }

    pub fn with_commitment_price_delay(mut self, secs: i64) -> Self {
        self.commitment_price_delay = secs;
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }

    pub fn is_valid(&self) -> bool {
        let non_negative = self.settlement_delay >= 0
            && self.commitment_price_delay >= 0
            && !self.settlement_reward.is_negative();
        match self.strategy_type {
            SettlementStrategyType::Synchronous => non_negative,
            SettlementStrategyType::Delayed => non_negative && self.settlement_window_duration > 0,
        }
    }

    // [anchor + delay, anchor + delay + window], both ends inclusive
    pub fn settlement_window(&self, anchor: Timestamp) -> (Timestamp, Timestamp) {
        let start = anchor.plus(self.settlement_delay);
        (start, start.plus(self.settlement_window_duration))
    }

    pub fn window_status(&self, anchor: Timestamp, now: Timestamp) -> WindowStatus {
        let (start, end) = self.settlement_window(anchor);
        if now < start {
            WindowStatus::NotOpen
        } else if now > end {
            WindowStatus::Expired
        } else {
            WindowStatus::Open
        }
    }

    pub fn price_time(&self, anchor: Timestamp) -> Timestamp {
        anchor.plus(self.commitment_price_delay)
    }
}
