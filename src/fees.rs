// 3.0: order fees, fee tier discounts, referrer/relayer revenue share, keeper costs.

use crate::d18::{mul_decimal, truncate};
use crate::signing::{word_u64, SigningError, TypedData, Word};
use crate::types::{AccountId, Bps, Price, Quote, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// maker/taker fee as a D18 fraction of notional (0.0003 = 3 bps)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderFees {
    pub maker_fee: Decimal,
    pub taker_fee: Decimal,
}

impl OrderFees {
    pub fn new(maker_fee: Decimal, taker_fee: Decimal) -> Self {
        Self { maker_fee, taker_fee }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

// 3.1: discount pair. 10000 bps means the fee is waived entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeeTier {
    pub maker_discount: Bps,
    pub taker_discount: Bps,
}

impl FeeTier {
    pub fn new(maker_discount_bps: u32, taker_discount_bps: u32) -> Self {
        Self {
            maker_discount: Bps::new(maker_discount_bps),
            taker_discount: Bps::new(taker_discount_bps),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.maker_discount.value() <= Bps::MAX.value() && self.taker_discount.value() <= Bps::MAX.value()
    }
}

/// Fee charged for one order, split by the side of the book it landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub maker: Quote,
    pub taker: Quote,
}

impl FeeBreakdown {
    pub fn total(&self) -> Quote {
        self.maker.add(self.taker)
    }
}

// baseFee * (10000 - discount) / 10000, truncated
pub fn apply_discount(base_fee: Decimal, discount: Bps) -> Decimal {
    truncate(base_fee * discount.complement() / Decimal::from(Bps::MAX.value()))
}

// 3.2: the part of an order that walks skew back toward zero is maker flow,
// anything beyond that (or any order with skew) is taker flow. returns (maker, taker) sizes.
pub fn split_maker_taker(skew: Decimal, size_delta: Decimal) -> (Decimal, Decimal) {
    let size = size_delta.abs();
    let opposes_skew = !skew.is_zero() && skew.is_sign_positive() != size_delta.is_sign_positive();
    if !opposes_skew {
        return (Decimal::ZERO, size);
    }
    let maker = size.min(skew.abs());
    (maker, size - maker)
}

pub fn calculate_order_fees(
    skew: Decimal,
    size_delta: Decimal,
    fill_price: Price,
    fees: &OrderFees,
    tier: &FeeTier,
) -> FeeBreakdown {
    let (maker_size, taker_size) = split_maker_taker(skew, size_delta);
    let maker_base = mul_decimal(mul_decimal(maker_size, fill_price.value()), fees.maker_fee);
    let taker_base = mul_decimal(mul_decimal(taker_size, fill_price.value()), fees.taker_fee);
    FeeBreakdown {
        maker: Quote::new(apply_discount(maker_base, tier.maker_discount)),
        taker: Quote::new(apply_discount(taker_base, tier.taker_discount)),
    }
}

// 3.3: limit orders pay by their declared role, not by skew
pub fn calculate_limit_order_fees(
    amount: Decimal,
    price: Price,
    is_maker: bool,
    fees: &OrderFees,
    tier: &FeeTier,
) -> FeeBreakdown {
    let notional = mul_decimal(amount.abs(), price.value());
    if is_maker {
        let base = mul_decimal(notional, fees.maker_fee);
        FeeBreakdown {
            maker: Quote::new(apply_discount(base, tier.maker_discount)),
            taker: Quote::zero(),
        }
    } else {
        let base = mul_decimal(notional, fees.taker_fee);
        FeeBreakdown {
            maker: Quote::zero(),
            taker: Quote::new(apply_discount(base, tier.taker_discount)),
        }
    }
}

// 3.4: (referrer cut, remainder)
pub fn split_revenue_share(fees: Quote, share_ratio: Decimal) -> (Quote, Quote) {
    let share = Quote::new(mul_decimal(fees.value(), share_ratio));
    (share, fees.sub(share))
}

/// Keeper cost estimates. Added on top of the strategy's settlement reward and to
/// the liquidation reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeeperCosts {
    pub settlement_cost: Quote,
    pub flag_cost: Quote,
    pub liquidate_cost: Quote,
}

impl KeeperCosts {
    pub fn liquidation_total(&self) -> Quote {
        self.flag_cost.add(self.liquidate_cost)
    }
}

// signed permission for an endorsed updater to move an account to a fee tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeTierUpdateRequest {
    pub fee_tier_id: u32,
    pub account_id: AccountId,
    pub expiry: Timestamp,
}

impl FeeTierUpdateRequest {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expiry
    }
}

impl TypedData for FeeTierUpdateRequest {
    const TYPE_STRING: &'static str = "UpdateFeeTier(uint256 feeTierId,uint128 accountId,uint256 expiry)";

    fn encode_fields(&self) -> Result<Vec<Word>, SigningError> {
        Ok(vec![
            word_u64(self.fee_tier_id as u64),
            word_u64(self.account_id.0),
            word_u64(self.expiry.as_secs().max(0) as u64),
        ])
    }
}
