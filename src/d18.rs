// 1.8: D18 fixed point. every product or quotient of two D18 quantities truncates
// toward zero at 18 fractional digits, so results match integer mulDecimal/divDecimal.

use rust_decimal::{Decimal, RoundingStrategy};

pub const SCALE: u32 = 18;

pub const UNIT: Decimal = Decimal::ONE;

pub fn truncate(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(SCALE, RoundingStrategy::ToZero)
}

pub fn mul_decimal(a: Decimal, b: Decimal) -> Decimal {
    truncate(a * b)
}

// panics on a zero divisor like the integer version reverts. use checked_div_decimal
// when the divisor comes from config.
pub fn div_decimal(a: Decimal, b: Decimal) -> Decimal {
    truncate(a / b)
}

pub fn checked_mul_decimal(a: Decimal, b: Decimal) -> Option<Decimal> {
    a.checked_mul(b).map(truncate)
}

pub fn checked_div_decimal(a: Decimal, b: Decimal) -> Option<Decimal> {
    a.checked_div(b).map(truncate)
}

// raw D18 integer (value * 10^18). None when it does not fit an i128.
pub fn to_raw(value: Decimal) -> Option<i128> {
    let truncated = truncate(value);
    let missing = SCALE.checked_sub(truncated.scale())?;
    truncated.mantissa().checked_mul(10i128.checked_pow(missing)?)
}

pub fn from_raw(raw: i128) -> Option<Decimal> {
    let mut mantissa = raw;
    let mut scale = SCALE;
    // strip trailing zeros so large whole numbers still fit the 96-bit mantissa
    while scale > 0 && mantissa != 0 && mantissa % 10 == 0 {
        mantissa /= 10;
        scale -= 1;
    }
    Decimal::try_from_i128_with_scale(mantissa, scale).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn truncates_toward_zero() {
        let one_third = div_decimal(dec!(1), dec!(3));
        assert_eq!(one_third, dec!(0.333333333333333333));

        let neg = div_decimal(dec!(-2), dec!(3));
        assert_eq!(neg, dec!(-0.666666666666666666));
    }

    #[test]
    fn per_day_fee_matches_integer_math() {
        // 1e18 / 86400 = 11574074074074 in D18 units
        let per_second = div_decimal(UNIT, dec!(86400));
        assert_eq!(to_raw(per_second), Some(11_574_074_074_074));
    }

    #[test]
    fn mul_of_small_values_truncates() {
        let product = mul_decimal(dec!(0.000000001), dec!(0.000000000123456789));
        assert_eq!(product, Decimal::ZERO);
        assert_eq!(mul_decimal(dec!(1.5), dec!(2)), dec!(3));
    }

    #[test]
    fn raw_round_trip() {
        assert_eq!(to_raw(dec!(1)), Some(1_000_000_000_000_000_000));
        assert_eq!(to_raw(dec!(-0.5)), Some(-500_000_000_000_000_000));
        assert_eq!(from_raw(1_500_000_000_000_000_000), Some(dec!(1.5)));

        // 10^12 whole units survive both directions
        let big = dec!(1_000_000_000_000);
        let raw = to_raw(big).unwrap();
        assert_eq!(from_raw(raw), Some(big));
    }

    #[test]
    fn checked_division_by_zero() {
        assert_eq!(checked_div_decimal(dec!(1), Decimal::ZERO), None);
        assert_eq!(checked_mul_decimal(dec!(2), dec!(3)), Some(dec!(6)));
    }
}
