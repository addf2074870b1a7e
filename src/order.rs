// 2.0: order payloads and the per-nonce lifecycle.
// signed orders are created off-chain and can be submitted by anyone holding the
// signature, so (account, nonce) is what makes each one single use.

use crate::signing::{word_bool, word_decimal, word_i128, word_u64, SigningError, TypedData, Word};
use crate::types::{AccountId, Address, MarketId, Price, Side, Timestamp, TrackingCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// sign extended, so a pre-epoch timestamp never collides with a later one
fn word_timestamp(ts: Timestamp) -> Word {
    word_i128(ts.as_secs() as i128)
}

// 2.1: one side of a matched limit order pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOrder {
    pub account_id: AccountId,
    pub market_id: MarketId,
    pub relayer: Address,
    // signed: negative = short
    pub amount: Decimal,
    pub price: Price,
    pub limit_order_maker: bool,
    pub expiration: Timestamp,
    pub nonce: u64,
    pub tracking_code: TrackingCode,
    pub allow_partial_matching: bool,
}

impl LimitOrder {
    pub fn side(&self) -> Option<Side> {
        if self.amount > Decimal::ZERO {
            Some(Side::Long)
        } else if self.amount < Decimal::ZERO {
            Some(Side::Short)
        } else {
            None
        }
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expiration
    }
}

impl TypedData for LimitOrder {
    const TYPE_STRING: &'static str = "SignedOrderRequest(uint128 accountId,uint128 marketId,address relayer,int128 amount,uint256 price,bool limitOrderMaker,uint256 expiration,uint256 nonce,bytes32 trackingCode,bool allowPartialMatching)";

    fn encode_fields(&self) -> Result<Vec<Word>, SigningError> {
        Ok(vec![
            word_u64(self.account_id.0),
            word_u64(self.market_id.0 as u64),
            self.relayer.to_word(),
            word_decimal("amount", self.amount)?,
            word_decimal("price", self.price.value())?,
            word_bool(self.limit_order_maker),
            word_timestamp(self.expiration),
            word_u64(self.nonce),
            self.tracking_code.0,
            word_bool(self.allow_partial_matching),
        ])
    }
}

// 2.2: single party order settled straight from its signature once the
// strategy's delay has passed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffchainOrder {
    pub market_id: MarketId,
    pub account_id: AccountId,
    pub size_delta: Decimal,
    pub settlement_strategy_id: u32,
    // zero address when the trader submits directly
    pub referrer_or_relayer: Address,
    pub allow_aggregation: bool,
    pub allow_partial_matching: bool,
    pub acceptable_price: Price,
    pub tracking_code: TrackingCode,
    pub expiration: Timestamp,
    pub nonce: u64,
    // anchors the settlement window
    pub timestamp: Timestamp,
}

impl OffchainOrder {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expiration
    }
}

impl TypedData for OffchainOrder {
    const TYPE_STRING: &'static str = "OffchainOrder(uint128 marketId,uint128 accountId,int128 sizeDelta,uint128 settlementStrategyId,address referrerOrRelayer,bool allowAggregation,bool allowPartialMatching,uint256 acceptablePrice,bytes32 trackingCode,uint256 expiration,uint256 nonce,uint256 timestamp)";

    fn encode_fields(&self) -> Result<Vec<Word>, SigningError> {
        Ok(vec![
            word_u64(self.market_id.0 as u64),
            word_u64(self.account_id.0),
            word_decimal("sizeDelta", self.size_delta)?,
            word_u64(self.settlement_strategy_id as u64),
            self.referrer_or_relayer.to_word(),
            word_bool(self.allow_aggregation),
            word_bool(self.allow_partial_matching),
            word_decimal("acceptablePrice", self.acceptable_price.value())?,
            self.tracking_code.0,
            word_timestamp(self.expiration),
            word_u64(self.nonce),
            word_timestamp(self.timestamp),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrderRequest {
    pub account_id: AccountId,
    pub nonce: u64,
}

impl TypedData for CancelOrderRequest {
    const TYPE_STRING: &'static str = "CancelOrderRequest(uint128 accountId,uint256 nonce)";

    fn encode_fields(&self) -> Result<Vec<Word>, SigningError> {
        Ok(vec![word_u64(self.account_id.0), word_u64(self.nonce)])
    }
}

// long fills at or below acceptable, short fills at or above
pub fn within_acceptable_price(size_delta: Decimal, fill_price: Price, acceptable_price: Price) -> bool {
    if size_delta > Decimal::ZERO {
        fill_price <= acceptable_price
    } else {
        fill_price >= acceptable_price
    }
}

// 2.3: committed order waiting for its settlement window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncOrder {
    pub account_id: AccountId,
    pub market_id: MarketId,
    pub size_delta: Decimal,
    pub settlement_strategy_id: u32,
    pub acceptable_price: Price,
    pub tracking_code: TrackingCode,
    pub referrer: Address,
    pub commitment_time: Timestamp,
}

// 2.4: nonce lifecycle. Settled and Cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NonceState {
    #[default]
    Unused,
    PartiallyFilled { remaining: Decimal },
    Settled,
    Cancelled,
}

impl NonceState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NonceState::Settled | NonceState::Cancelled)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NonceBook {
    entries: HashMap<(AccountId, u64), NonceState>,
}

impl NonceBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, account_id: AccountId, nonce: u64) -> NonceState {
        self.entries
            .get(&(account_id, nonce))
            .copied()
            .unwrap_or_default()
    }

    pub fn is_used(&self, account_id: AccountId, nonce: u64) -> bool {
        self.state(account_id, nonce).is_terminal()
    }

    // unfilled magnitude of an order, None once terminal
    pub fn remaining(&self, account_id: AccountId, nonce: u64, order_amount: Decimal) -> Option<Decimal> {
        match self.state(account_id, nonce) {
            NonceState::Unused => Some(order_amount.abs()),
            NonceState::PartiallyFilled { remaining } => Some(remaining),
            NonceState::Settled | NonceState::Cancelled => None,
        }
    }

    // returns the new state. caller has already checked `filled <= remaining`.
    pub fn record_fill(&mut self, account_id: AccountId, nonce: u64, order_amount: Decimal, filled: Decimal) -> NonceState {
        let remaining = self
            .remaining(account_id, nonce, order_amount)
            .unwrap_or(Decimal::ZERO);
        let left = (remaining - filled.abs()).max(Decimal::ZERO);
        let next = if left.is_zero() {
            NonceState::Settled
        } else {
            NonceState::PartiallyFilled { remaining: left }
        };
        self.entries.insert((account_id, nonce), next);
        next
    }

    pub fn mark_settled(&mut self, account_id: AccountId, nonce: u64) {
        self.entries.insert((account_id, nonce), NonceState::Settled);
    }

    // Err carries the state that blocked the cancel
    pub fn cancel(&mut self, account_id: AccountId, nonce: u64) -> Result<(), NonceState> {
        let current = self.state(account_id, nonce);
        if current.is_terminal() {
            return Err(current);
        }
        self.entries.insert((account_id, nonce), NonceState::Cancelled);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const ACCT: AccountId = AccountId(2);

    fn limit(amount: Decimal) -> LimitOrder {
        LimitOrder {
            account_id: ACCT,
            market_id: MarketId(25),
            relayer: Address::from_label("relayer"),
            amount,
            price: Price::new_unchecked(dec!(1000)),
            limit_order_maker: true,
            expiration: Timestamp::from_secs(2_000),
            nonce: 9,
            tracking_code: TrackingCode::NONE,
            allow_partial_matching: false,
        }
    }

    #[test]
    fn partial_fills_walk_down_to_settled() {
        let mut book = NonceBook::new();
        assert_eq!(book.remaining(ACCT, 1, dec!(-5)), Some(dec!(5)));

        let state = book.record_fill(ACCT, 1, dec!(-5), dec!(2));
        assert_eq!(state, NonceState::PartiallyFilled { remaining: dec!(3) });
        assert_eq!(book.remaining(ACCT, 1, dec!(-5)), Some(dec!(3)));

        let state = book.record_fill(ACCT, 1, dec!(-5), dec!(3));
        assert_eq!(state, NonceState::Settled);
        assert_eq!(book.remaining(ACCT, 1, dec!(-5)), None);
        assert!(book.is_used(ACCT, 1));
    }

    #[test]
    fn cancel_is_terminal() {
        let mut book = NonceBook::new();
        assert!(book.cancel(ACCT, 4).is_ok());
        assert_eq!(book.cancel(ACCT, 4), Err(NonceState::Cancelled));
        assert_eq!(book.remaining(ACCT, 4, dec!(1)), None);

        book.mark_settled(ACCT, 5);
        assert_eq!(book.cancel(ACCT, 5), Err(NonceState::Settled));
    }

    #[test]
    fn nonces_are_per_account() {
        let mut book = NonceBook::new();
        book.mark_settled(ACCT, 1);
        assert!(!book.is_used(AccountId(3), 1));
    }

    #[test]
    fn acceptable_price_direction() {
        let p = |v| Price::new_unchecked(v);
        assert!(within_acceptable_price(dec!(1), p(dec!(1000)), p(dec!(1001))));
        assert!(!within_acceptable_price(dec!(1), p(dec!(1002)), p(dec!(1001))));
        assert!(within_acceptable_price(dec!(-1), p(dec!(1002)), p(dec!(1001))));
        assert!(!within_acceptable_price(dec!(-1), p(dec!(1000)), p(dec!(1001))));
    }

    #[test]
    fn struct_hash_covers_maker_flag() {
        let maker = limit(dec!(-1));
        let mut taker = maker.clone();
        taker.limit_order_maker = false;
        assert_ne!(maker.struct_hash().unwrap(), taker.struct_hash().unwrap());
        assert_eq!(maker.side(), Some(Side::Short));
        assert!(maker.is_expired(Timestamp::from_secs(2_001)));
        assert!(!maker.is_expired(Timestamp::from_secs(2_000)));
    }

    #[test]
    fn negative_timestamps_hash_distinctly() {
        let mut early = limit(dec!(1));
        early.expiration = Timestamp::from_secs(-1);
        let mut earlier = early.clone();
        earlier.expiration = Timestamp::from_secs(-2);
        let mut epoch = early.clone();
        epoch.expiration = Timestamp::from_secs(0);

        let hashes = [early.struct_hash().unwrap(), earlier.struct_hash().unwrap(), epoch.struct_hash().unwrap()];
        assert_ne!(hashes[0], hashes[1]);
        assert_ne!(hashes[0], hashes[2]);
        assert_ne!(hashes[1], hashes[2]);
        // non-negative values keep the plain unsigned encoding
        assert_eq!(word_timestamp(Timestamp::from_secs(2_000)), word_u64(2_000));
    }
}
