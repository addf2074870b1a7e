// 4.0: one account's exposure in one market.
// every settlement realizes pnl, funding and rollover interest into collateral, then
// resets the position's baselines (entry price, funding index, interest timestamp/size)
// to the settlement point. a zero-size record keeps its baselines until liquidation or
// an explicit close removes it.

use crate::d18::mul_decimal;
use crate::rollover::{accrued_interest, ClosureLog, FeeSchedule};
use crate::types::{AccountId, MarketId, Price, Quote, SignedSize, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub account_id: AccountId,
    pub market_id: MarketId,
    pub size: SignedSize,
    // price of the last settlement that touched this position
    pub entry_price: Price,
    pub last_funding_accrued: Decimal,
    pub last_interest_charge_timestamp: Timestamp,
    // size exposed since last_interest_charge_timestamp
    pub last_interest_baseline_size: Decimal,
}

/// What one settlement realized on a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Realized {
    pub pnl: Quote,
    pub funding: Quote,
    pub interest: Quote,
}

impl Realized {
    // pnl + funding - interest, the collateral delta before fees
    pub fn net(&self) -> Quote {
        self.pnl.add(self.funding).sub(self.interest)
    }
}

impl Position {
    pub fn new(account_id: AccountId, market_id: MarketId, price: Price, funding_index: Decimal, now: Timestamp) -> Self {
        Self {
            account_id,
            market_id,
            size: SignedSize::zero(),
            entry_price: price,
            last_funding_accrued: funding_index,
            last_interest_charge_timestamp: now,
            last_interest_baseline_size: Decimal::ZERO,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.size.is_zero()
    }

    pub fn notional(&self, price: Price) -> Quote {
        Quote::new(mul_decimal(self.size.abs(), price.value()))
    }

    pub fn pnl(&self, price: Price) -> Quote {
        Quote::new(mul_decimal(self.size.value(), price.value() - self.entry_price.value()))
    }

    pub fn accrued_funding(&self, funding_index: Decimal) -> Quote {
        Quote::new(mul_decimal(self.size.value(), funding_index - self.last_funding_accrued))
    }

    // interest since the last charge, on the size held since then
    pub fn owed_interest(&self, price: Price, fees: &FeeSchedule, closures: &ClosureLog, now: Timestamp) -> Quote {
        accrued_interest(
            self.last_interest_baseline_size,
            price,
            fees,
            closures,
            self.last_interest_charge_timestamp,
            now,
        )
    }

    // size * (entry + funding baseline). the market sums this to price open debt lazily.
    pub fn debt_correction(&self) -> Decimal {
        mul_decimal(self.size.value(), self.entry_price.value() + self.last_funding_accrued)
    }

    // 4.1: realize everything up to `now` at `fill_price`, then rebase on the new size
    pub fn settle(
        &mut self,
        size_delta: Decimal,
        fill_price: Price,
        funding_index: Decimal,
        fees: &FeeSchedule,
        closures: &ClosureLog,
        now: Timestamp,
    ) -> Realized {
        let realized = Realized {
            pnl: self.pnl(fill_price),
            funding: self.accrued_funding(funding_index),
            interest: self.owed_interest(fill_price, fees, closures, now),
        };

        self.size = self.size.add(size_delta);
        self.entry_price = fill_price;
        self.last_funding_accrued = funding_index;
        self.last_interest_charge_timestamp = now;
        self.last_interest_baseline_size = self.size.value();
        realized
    }
}
