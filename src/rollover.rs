// 5.5: rollover interest. a per-second carrying fee on open notional, direction agnostic.
// nothing accrues in storage between settlements; each settlement charges the interval
// since the position's baseline and resets it. the interval is split wherever the fee
// changed, and each piece is charged at the rate that was in force during it.

use crate::d18::mul_decimal;
use crate::types::{Price, Quote, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// |baselineSize| * fillPrice * feePerSecond * elapsed. the baseline is the size that
// was exposed for the whole interval, i.e. the size before this settlement's delta.
pub fn interest_owed(baseline_size: Decimal, fill_price: Price, fee_per_second: Decimal, elapsed_secs: i64) -> Quote {
    if elapsed_secs <= 0 || baseline_size.is_zero() || fee_per_second.is_zero() {
        return Quote::zero();
    }
    let notional = mul_decimal(baseline_size.abs(), fill_price.value());
    let per_second = mul_decimal(notional, fee_per_second);
    Quote::new(per_second * Decimal::from(elapsed_secs))
}

// interest over [from, to): each fee segment charged for its chargeable (open) seconds
pub fn accrued_interest(
    baseline_size: Decimal,
    fill_price: Price,
    fees: &FeeSchedule,
    closures: &ClosureLog,
    from: Timestamp,
    to: Timestamp,
) -> Quote {
    fees.segments(from, to)
        .into_iter()
        .map(|(start, end, rate)| interest_owed(baseline_size, fill_price, rate, closures.chargeable_seconds(start, end)))
        .sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateChange {
    pub at: Timestamp,
    pub fee_per_second: Decimal,
}

/// Rollover fee history of one market. A change reprices only the time after it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    initial: Decimal,
    // ascending by `at`
    changes: Vec<RateChange>,
}

impl FeeSchedule {
    pub fn new(initial: Decimal) -> Self {
        Self {
            initial,
            changes: Vec::new(),
        }
    }

    pub fn current(&self) -> Decimal {
        self.changes.last().map_or(self.initial, |c| c.fee_per_second)
    }

    // a change at `at` supersedes anything recorded at or after it
    pub fn set(&mut self, at: Timestamp, fee_per_second: Decimal) {
        self.changes.retain(|c| c.at < at);
        self.changes.push(RateChange { at, fee_per_second });
    }

    pub fn rate_at(&self, at: Timestamp) -> Decimal {
        self.changes
            .iter()
            .rev()
            .find(|c| c.at <= at)
            .map_or(self.initial, |c| c.fee_per_second)
    }

    pub fn changes(&self) -> &[RateChange] {
        &self.changes
    }

    // [from, to) cut at every change strictly inside it, with the rate of each piece
    pub fn segments(&self, from: Timestamp, to: Timestamp) -> Vec<(Timestamp, Timestamp, Decimal)> {
        let mut pieces = Vec::new();
        if from >= to {
            return pieces;
        }
        let mut start = from;
        let mut rate = self.rate_at(from);
        for change in self.changes.iter().filter(|c| c.at > from && c.at < to) {
            pieces.push((start, change.at, rate));
            start = change.at;
            rate = change.fee_per_second;
        }
        pieces.push((start, to, rate));
        pieces
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureInterval {
    pub start: Timestamp,
    // None while the market is still closed
    pub end: Option<Timestamp>,
}

impl ClosureInterval {
    fn overlap(&self, from: Timestamp, to: Timestamp) -> i64 {
        let start = self.start.max(from);
        let end = self.end.unwrap_or(to).min(to);
        start.seconds_until(end).max(0)
    }
}

/// Administrative closures of one market. Closed time is not chargeable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureLog {
    intervals: Vec<ClosureInterval>,
}

impl ClosureLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.intervals.last().is_some_and(|i| i.end.is_none())
    }

    // no-op when already closed
    pub fn begin(&mut self, at: Timestamp) {
        if !self.is_closed() {
            self.intervals.push(ClosureInterval { start: at, end: None });
        }
    }

    // no-op when already open
    pub fn end(&mut self, at: Timestamp) {
        if let Some(last) = self.intervals.last_mut() {
            if last.end.is_none() {
                last.end = Some(at);
            }
        }
    }

    pub fn intervals(&self) -> &[ClosureInterval] {
        &self.intervals
    }

    pub fn closed_seconds(&self, from: Timestamp, to: Timestamp) -> i64 {
        self.intervals.iter().map(|i| i.overlap(from, to)).sum()
    }

    pub fn chargeable_seconds(&self, from: Timestamp, to: Timestamp) -> i64 {
        (from.seconds_until(to) - self.closed_seconds(from, to)).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::d18::div_decimal;
    use rust_decimal_macros::dec;

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    #[test]
    fn one_hour_at_one_unit_per_day() {
        // 0.1 @ 1000 = 100 notional, 1/86400 per second, 3600s -> 100/24
        let fee = div_decimal(Decimal::ONE, dec!(86400));
        let interest = interest_owed(dec!(0.1), Price::new_unchecked(dec!(1000)), fee, 3600);
        let expected = dec!(100) / dec!(24);
        assert!((interest.value() - expected).abs() < dec!(0.000000000001));
    }

    #[test]
    fn long_and_short_pay_the_same() {
        let fee = dec!(0.00001);
        let price = Price::new_unchecked(dec!(2500));
        let long = interest_owed(dec!(3), price, fee, 1800);
        let short = interest_owed(dec!(-3), price, fee, 1800);
        assert_eq!(long, short);
        assert!(long.is_positive());
    }

    #[test]
    fn nothing_owed_without_exposure_or_time() {
        let price = Price::new_unchecked(dec!(1000));
        assert!(interest_owed(Decimal::ZERO, price, dec!(0.001), 3600).is_zero());
        assert!(interest_owed(dec!(1), price, dec!(0.001), 0).is_zero());
        assert!(interest_owed(dec!(1), price, Decimal::ZERO, 3600).is_zero());
    }

    #[test]
    fn closed_time_is_not_chargeable() {
        let mut log = ClosureLog::new();
        log.begin(ts(100));
        assert!(log.is_closed());
        log.end(ts(400));
        assert!(!log.is_closed());

        // 0..1000 minus the 300s closure
        assert_eq!(log.chargeable_seconds(ts(0), ts(1000)), 700);
        // interval entirely after the closure
        assert_eq!(log.chargeable_seconds(ts(500), ts(1000)), 500);
        // partial overlap
        assert_eq!(log.chargeable_seconds(ts(300), ts(1000)), 600);
    }

    #[test]
    fn fee_change_splits_the_interval() {
        let mut fees = FeeSchedule::new(dec!(0.000001));
        fees.set(ts(3600), dec!(0.000002));
        assert_eq!(fees.current(), dec!(0.000002));
        assert_eq!(fees.rate_at(ts(3599)), dec!(0.000001));
        assert_eq!(fees.rate_at(ts(3600)), dec!(0.000002));
        assert_eq!(
            fees.segments(ts(0), ts(7200)),
            vec![(ts(0), ts(3600), dec!(0.000001)), (ts(3600), ts(7200), dec!(0.000002))]
        );
        // a window starting after the change sees one piece
        assert_eq!(fees.segments(ts(4000), ts(5000)), vec![(ts(4000), ts(5000), dec!(0.000002))]);
        assert!(fees.segments(ts(10), ts(10)).is_empty());

        // 10 @ 2000 = 20000 notional: 3600s at 0.02/s then 3600s at 0.04/s
        let price = Price::new_unchecked(dec!(2000));
        let interest = accrued_interest(dec!(10), price, &fees, &ClosureLog::new(), ts(0), ts(7200));
        assert_eq!(interest.value(), dec!(216));
    }

    #[test]
    fn closures_and_fee_changes_combine() {
        let mut fees = FeeSchedule::new(dec!(0.000001));
        fees.set(ts(1000), Decimal::ZERO);
        let mut closures = ClosureLog::new();
        closures.begin(ts(500));
        closures.end(ts(700));

        // 0..1000 at the old rate minus 200s closed, nothing after the change
        let price = Price::new_unchecked(dec!(1000));
        let interest = accrued_interest(dec!(1), price, &fees, &closures, ts(0), ts(5000));
        assert_eq!(interest.value(), dec!(0.8));
    }

    #[test]
    fn later_changes_are_superseded() {
        let mut fees = FeeSchedule::new(Decimal::ZERO);
        fees.set(ts(100), dec!(1));
        fees.set(ts(200), dec!(2));
        fees.set(ts(150), dec!(3));
        assert_eq!(fees.changes().len(), 2);
        assert_eq!(fees.current(), dec!(3));
        assert_eq!(fees.rate_at(ts(120)), dec!(1));
    }

    #[test]
    fn open_closure_counts_up_to_now() {
        let mut log = ClosureLog::new();
        log.begin(ts(100));
        log.begin(ts(200)); // ignored, already closed
        assert_eq!(log.intervals().len(), 1);
        assert_eq!(log.closed_seconds(ts(0), ts(500)), 400);
        assert_eq!(log.chargeable_seconds(ts(0), ts(500)), 100);
    }
}
