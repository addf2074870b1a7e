//! Liquidation eligibility and reward math.
//!
//! An account is liquidatable when its available margin drops strictly below
//! maintenance margin plus the reward owed to whoever liquidates it. Seized
//! collateral pays the keeper first and the rest lands in the liquidation pool.

use crate::fees::KeeperCosts;
use crate::margin::RequiredMargins;
use crate::types::Quote;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidationStatus {
    Healthy { buffer: Quote },
    Liquidatable { shortfall: Quote },
}

impl LiquidationStatus {
    pub fn is_liquidatable(&self) -> bool {
        matches!(self, LiquidationStatus::Liquidatable { .. })
    }
}

// maintenance + flag reward + keeper costs
pub fn liquidation_threshold(margins: &RequiredMargins, costs: &KeeperCosts) -> Quote {
    margins
        .maintenance
        .add(margins.liquidation_reward)
        .add(costs.liquidation_total())
}

pub fn evaluate(available_margin: Quote, margins: &RequiredMargins, costs: &KeeperCosts) -> LiquidationStatus {
    let threshold = liquidation_threshold(margins, costs);
    if available_margin < threshold {
        LiquidationStatus::Liquidatable {
            shortfall: threshold.sub(available_margin),
        }
    } else {
        LiquidationStatus::Healthy {
            buffer: available_margin.sub(threshold),
        }
    }
}

// keeper reward is capped by what was actually seized
pub fn keeper_reward(margins: &RequiredMargins, costs: &KeeperCosts, seized: Quote) -> Quote {
    let owed = margins.liquidation_reward.add(costs.liquidation_total());
    owed.min(seized.max(Quote::zero()))
}

/// Collateral seized from liquidated accounts, net of keeper rewards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiquidationPool {
    pub balance: Quote,
    pub total_seized: Quote,
    pub total_rewards: Quote,
    // losses beyond an account's collateral
    pub bad_debt: Quote,
}

impl LiquidationPool {
    pub fn new() -> Self {
        Self::default()
    }

    // returns what the keeper gets
    pub fn absorb(&mut self, seized: Quote, reward: Quote) -> Quote {
        if seized.is_negative() {
            self.bad_debt = self.bad_debt.add(seized.abs());
            return Quote::zero();
        }
        let reward = reward.min(seized);
        self.total_seized = self.total_seized.add(seized);
        self.total_rewards = self.total_rewards.add(reward);
        self.balance = self.balance.add(seized.sub(reward));
        reward
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn margins(maintenance: rust_decimal::Decimal, reward: rust_decimal::Decimal) -> RequiredMargins {
        RequiredMargins {
            initial: Quote::new(maintenance * dec!(2)),
            maintenance: Quote::new(maintenance),
            liquidation_reward: Quote::new(reward),
        }
    }

    #[test]
    fn strict_inequality() {
        let m = margins(dec!(100), dec!(0));
        let costs = KeeperCosts::default();
        assert!(!evaluate(Quote::new(dec!(100)), &m, &costs).is_liquidatable());
        assert!(evaluate(Quote::new(dec!(99.99)), &m, &costs).is_liquidatable());
    }

    #[test]
    fn keeper_costs_raise_the_threshold() {
        let m = margins(dec!(100), dec!(5));
        let costs = KeeperCosts {
            flag_cost: Quote::new(dec!(2)),
            liquidate_cost: Quote::new(dec!(3)),
            ..KeeperCosts::default()
        };
        assert_eq!(liquidation_threshold(&m, &costs).value(), dec!(110));
        assert_eq!(
            evaluate(Quote::new(dec!(108)), &m, &costs),
            LiquidationStatus::Liquidatable { shortfall: Quote::new(dec!(2)) }
        );
    }

    #[test]
    fn reward_capped_by_seized() {
        let m = margins(dec!(100), dec!(50));
        let costs = KeeperCosts::default();
        assert_eq!(keeper_reward(&m, &costs, Quote::new(dec!(20))).value(), dec!(20));
        assert_eq!(keeper_reward(&m, &costs, Quote::new(dec!(500))).value(), dec!(50));
        assert!(keeper_reward(&m, &costs, Quote::new(dec!(-5))).is_zero());
    }

    #[test]
    fn pool_tracks_seized_and_bad_debt() {
        let mut pool = LiquidationPool::new();
        let paid = pool.absorb(Quote::new(dec!(1000)), Quote::new(dec!(10)));
        assert_eq!(paid.value(), dec!(10));
        assert_eq!(pool.balance.value(), dec!(990));

        let paid = pool.absorb(Quote::new(dec!(-40)), Quote::new(dec!(10)));
        assert!(paid.is_zero());
        assert_eq!(pool.bad_debt.value(), dec!(40));
    }
}
