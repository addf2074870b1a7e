// 5.0: funding is continuous and skew driven. the rate drifts at a velocity set by
// skew/skewScale, and funding per unit is the time integral of rate * price.
// 5.0 has the params/state structs. 5.1+ has the math.

use crate::d18::{div_decimal, mul_decimal};
use crate::types::{Price, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FundingParams {
    // skew at which the premium/discount and velocity saturate. zero disables both.
    pub skew_scale: Decimal,
    // max rate change per day
    pub max_funding_velocity: Decimal,
}

impl FundingParams {
    pub fn new(skew_scale: Decimal, max_funding_velocity: Decimal) -> Self {
        Self {
            skew_scale,
            max_funding_velocity,
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingState {
    // daily rate as of last_time
    pub last_rate: Decimal,
    // cumulative funding per unit of size as of last_time
    pub last_value: Decimal,
    pub last_time: Timestamp,
}

impl FundingState {
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            last_rate: Decimal::ZERO,
            last_value: Decimal::ZERO,
            last_time: timestamp,
        }
    }

    pub fn current_rate(&self, params: &FundingParams, skew: Decimal, now: Timestamp) -> Decimal {
        let velocity = funding_velocity(params, skew);
        self.last_rate + mul_decimal(velocity, proportional_elapsed(self.last_time, now))
    }

    // funding per unit accrued since last_time, not yet folded into last_value.
    // the trapezoid of last and current rate, times price. negative when longs pay.
    pub fn unrecorded_funding(
        &self,
        params: &FundingParams,
        skew: Decimal,
        price: Price,
        now: Timestamp,
    ) -> Decimal {
        let current = self.current_rate(params, skew, now);
        let avg_rate = div_decimal(self.last_rate + current, Decimal::TWO);
        let elapsed = proportional_elapsed(self.last_time, now);
        -mul_decimal(mul_decimal(avg_rate, elapsed), price.value())
    }

    pub fn next_funding(&self, params: &FundingParams, skew: Decimal, price: Price, now: Timestamp) -> Decimal {
        self.last_value + self.unrecorded_funding(params, skew, price, now)
    }

    // 5.1: fold accrued funding into state. must run before skew changes.
    pub fn recompute(&mut self, params: &FundingParams, skew: Decimal, price: Price, now: Timestamp) {
        let rate = self.current_rate(params, skew, now);
        let value = self.next_funding(params, skew, price, now);
        self.last_rate = rate;
        self.last_value = value;
        self.last_time = now;
    }
}

// 5.2: elapsed time in days, D18
pub fn proportional_elapsed(from: Timestamp, to: Timestamp) -> Decimal {
    div_decimal(Decimal::from(from.seconds_until(to)), Decimal::from(SECONDS_PER_DAY))
}

// 5.3: clamp(skew/skewScale, -1, 1) * maxFundingVelocity
pub fn funding_velocity(params: &FundingParams, skew: Decimal) -> Decimal {
    if params.skew_scale.is_zero() {
        return Decimal::ZERO;
    }
    let proportional_skew = div_decimal(skew, params.skew_scale)
        .max(Decimal::NEGATIVE_ONE)
        .min(Decimal::ONE);
    mul_decimal(proportional_skew, params.max_funding_velocity)
}

// 5.4: fill price with premium. average of the premium before and after the trade,
// so a trade that pushes skew further pays more and one that reduces skew pays less.
pub fn calculate_fill_price(skew: Decimal, skew_scale: Decimal, size_delta: Decimal, price: Price) -> Price {
    if skew_scale.is_zero() {
        return price;
    }
    let pd_before = div_decimal(skew, skew_scale);
    let pd_after = div_decimal(skew + size_delta, skew_scale);
    let price_before = mul_decimal(price.value(), Decimal::ONE + pd_before);
    let price_after = mul_decimal(price.value(), Decimal::ONE + pd_after);
    let fill = div_decimal(price_before + price_after, Decimal::TWO);
    // a premium below -100% would go non-positive; floor at the smallest D18 step
    Price::new(fill).unwrap_or_else(|| Price::new_unchecked(Decimal::new(1, crate::d18::SCALE)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn px(v: Decimal) -> Price {
        Price::new_unchecked(v)
    }

    #[test]
    fn zero_params_mean_zero_funding() {
        let params = FundingParams::disabled();
        let state = FundingState::new(Timestamp::from_secs(0));
        let later = Timestamp::from_secs(30 * SECONDS_PER_DAY);
        assert_eq!(funding_velocity(&params, dec!(500)), Decimal::ZERO);
        assert_eq!(state.current_rate(&params, dec!(500), later), Decimal::ZERO);
        assert_eq!(state.next_funding(&params, dec!(500), px(dec!(1000)), later), Decimal::ZERO);
    }

    #[test]
    fn velocity_clamps_at_skew_scale() {
        let params = FundingParams::new(dec!(1000), dec!(3));
        assert_eq!(funding_velocity(&params, dec!(100)), dec!(0.3));
        assert_eq!(funding_velocity(&params, dec!(5000)), dec!(3));
        assert_eq!(funding_velocity(&params, dec!(-5000)), dec!(-3));
    }

    #[test]
    fn longs_pay_when_skew_is_long() {
        let params = FundingParams::new(dec!(1000), dec!(1));
        let state = FundingState::new(Timestamp::from_secs(0));
        let one_day = Timestamp::from_secs(SECONDS_PER_DAY);

        // velocity 0.1/day, rate goes 0 -> 0.1 over the day, avg 0.05, price 1000
        assert_eq!(state.current_rate(&params, dec!(100), one_day), dec!(0.1));
        assert_eq!(
            state.unrecorded_funding(&params, dec!(100), px(dec!(1000)), one_day),
            dec!(-50)
        );
    }

    #[test]
    fn recompute_moves_the_baseline() {
        let params = FundingParams::new(dec!(1000), dec!(1));
        let mut state = FundingState::new(Timestamp::from_secs(0));
        let one_day = Timestamp::from_secs(SECONDS_PER_DAY);

        state.recompute(&params, dec!(100), px(dec!(1000)), one_day);
        assert_eq!(state.last_rate, dec!(0.1));
        assert_eq!(state.last_value, dec!(-50));
        assert_eq!(state.last_time, one_day);

        // nothing elapsed, nothing unrecorded
        assert_eq!(state.unrecorded_funding(&params, dec!(100), px(dec!(1000)), one_day), Decimal::ZERO);
    }

    #[test]
    fn fill_price_premium() {
        // empty market, 1 long against skew scale 100k
        let fill = calculate_fill_price(Decimal::ZERO, dec!(100000), dec!(1), px(dec!(1000)));
        assert_eq!(fill.value(), dec!(1000.005));

        // reducing skew earns a discount
        let fill = calculate_fill_price(dec!(10), dec!(100000), dec!(-10), px(dec!(1000)));
        assert_eq!(fill.value(), dec!(1000.05));
        assert!(fill.value() < dec!(1000.1));

        // no scale, no premium
        let fill = calculate_fill_price(dec!(10), Decimal::ZERO, dec!(5), px(dec!(1000)));
        assert_eq!(fill.value(), dec!(1000));
    }
}
