//! Margin requirements per position and per account.
//!
//! The initial margin ratio grows with the position's share of the skew scale,
//! so bigger positions need proportionally more collateral. Maintenance is a
//! fixed fraction of initial. Both carry a flat minimum position margin, which
//! is also the knob that makes a position liquidatable on demand.

use crate::d18::{div_decimal, mul_decimal};
use crate::types::{Price, Quote};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationParameters {
    pub initial_margin_ratio: Decimal,
    pub minimum_initial_margin_ratio: Decimal,
    pub maintenance_margin_scalar: Decimal,
    pub flag_reward_ratio: Decimal,
    pub minimum_position_margin: Quote,
}

impl Default for LiquidationParameters {
    fn default() -> Self {
        Self {
            initial_margin_ratio: dec!(2),
            minimum_initial_margin_ratio: dec!(0.01),
            maintenance_margin_scalar: dec!(0.5),
            flag_reward_ratio: dec!(0.0001),
            minimum_position_margin: Quote::zero(),
        }
    }
}

impl LiquidationParameters {
    // everything zero: no margin needed, never liquidatable
    pub fn none() -> Self {
        Self {
            initial_margin_ratio: Decimal::ZERO,
            minimum_initial_margin_ratio: Decimal::ZERO,
            maintenance_margin_scalar: Decimal::ZERO,
            flag_reward_ratio: Decimal::ZERO,
            minimum_position_margin: Quote::zero(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.initial_margin_ratio.is_sign_negative()
            && !self.minimum_initial_margin_ratio.is_sign_negative()
            && !self.maintenance_margin_scalar.is_sign_negative()
            && self.maintenance_margin_scalar <= Decimal::ONE
            && !self.flag_reward_ratio.is_sign_negative()
            && !self.minimum_position_margin.is_negative()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequiredMargins {
    pub initial: Quote,
    pub maintenance: Quote,
    pub liquidation_reward: Quote,
}

impl RequiredMargins {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn add(&self, other: &RequiredMargins) -> Self {
        Self {
            initial: self.initial.add(other.initial),
            maintenance: self.maintenance.add(other.maintenance),
            liquidation_reward: self.liquidation_reward.add(other.liquidation_reward),
        }
    }
}

// (initial ratio, maintenance ratio) for a position of this size
pub fn margin_ratios(size: Decimal, skew_scale: Decimal, params: &LiquidationParameters) -> (Decimal, Decimal) {
    let impact_on_skew = if skew_scale.is_zero() {
        Decimal::ZERO
    } else {
        div_decimal(size.abs(), skew_scale)
    };
    let initial = mul_decimal(impact_on_skew, params.initial_margin_ratio) + params.minimum_initial_margin_ratio;
    let maintenance = mul_decimal(initial, params.maintenance_margin_scalar);
    (initial, maintenance)
}

pub fn position_margins(size: Decimal, price: Price, skew_scale: Decimal, params: &LiquidationParameters) -> RequiredMargins {
    if size.is_zero() {
        return RequiredMargins::zero();
    }
    let notional = mul_decimal(size.abs(), price.value());
    let (imr, mmr) = margin_ratios(size, skew_scale, params);
    let floor = params.minimum_position_margin;
    RequiredMargins {
        initial: Quote::new(mul_decimal(notional, imr)).add(floor),
        maintenance: Quote::new(mul_decimal(notional, mmr)).add(floor),
        liquidation_reward: Quote::new(mul_decimal(notional, params.flag_reward_ratio)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn px(v: Decimal) -> Price {
        Price::new_unchecked(v)
    }

    #[test]
    fn ratios_scale_with_size() {
        let params = LiquidationParameters::default();
        // 1000/1_000_000 * 2 + 0.01
        let (imr, mmr) = margin_ratios(dec!(1000), dec!(1_000_000), &params);
        assert_eq!(imr, dec!(0.012));
        assert_eq!(mmr, dec!(0.006));

        let (small, _) = margin_ratios(dec!(1), dec!(1_000_000), &params);
        assert!(small < imr);
    }

    #[test]
    fn flat_minimum_applies_to_both() {
        let params = LiquidationParameters {
            minimum_position_margin: Quote::new(dec!(5000)),
            ..LiquidationParameters::none()
        };
        let margins = position_margins(dec!(1), px(dec!(1000)), dec!(100_000), &params);
        assert_eq!(margins.initial.value(), dec!(5000));
        assert_eq!(margins.maintenance.value(), dec!(5000));
        assert!(margins.liquidation_reward.is_zero());
    }

    #[test]
    fn short_positions_need_the_same_margin() {
        let params = LiquidationParameters::default();
        let long = position_margins(dec!(10), px(dec!(2000)), dec!(1_000_000), &params);
        let short = position_margins(dec!(-10), px(dec!(2000)), dec!(1_000_000), &params);
        assert_eq!(long, short);
        // 20000 notional * 0.0001 flag reward
        assert_eq!(long.liquidation_reward.value(), dec!(2));
    }

    #[test]
    fn flat_position_needs_nothing() {
        let params = LiquidationParameters {
            minimum_position_margin: Quote::new(dec!(100)),
            ..LiquidationParameters::default()
        };
        assert_eq!(position_margins(Decimal::ZERO, px(dec!(1)), dec!(1), &params), RequiredMargins::zero());
    }

    #[test]
    fn validation() {
        assert!(LiquidationParameters::default().is_valid());
        assert!(LiquidationParameters::none().is_valid());
        let bad = LiquidationParameters {
            maintenance_margin_scalar: dec!(1.5),
            ..LiquidationParameters::default()
        };
        assert!(!bad.is_valid());
    }
}
