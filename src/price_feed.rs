// Price Feed Integration
//
// The engine never talks to an oracle directly. It asks a PriceSource for the
// current price of a feed, or for a benchmark price at a past timestamp (the
// verified, delayed reading used to settle committed orders). Whether that comes
// from Pyth, Chainlink or a test double is up to the implementation.

use crate::types::{FeedId, Price, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A single price observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceReading {
    pub price: Price,
    pub timestamp: Timestamp,
}

impl PriceReading {
    pub fn new(price: Price, timestamp: Timestamp) -> Self {
        Self { price, timestamp }
    }

    pub fn age(&self, now: Timestamp) -> i64 {
        self.timestamp.seconds_until(now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceFeedError {
    #[error("No price available for feed {0:?}")]
    NoPrice(FeedId),

    #[error("Price for feed {feed:?} is stale: published {published}, now {now}")]
    Stale {
        feed: FeedId,
        published: Timestamp,
        now: Timestamp,
    },
}

/// Read side of an oracle.
pub trait PriceSource {
    fn current_price(&self, feed: FeedId, now: Timestamp) -> Result<PriceReading, PriceFeedError>;

    fn benchmark_price(&self, feed: FeedId, at: Timestamp) -> Result<PriceReading, PriceFeedError>;
}

/// In-memory oracle. Tests and the simulator push prices into it directly.
#[derive(Debug, Clone, Default)]
pub struct OraclePrices {
    current: HashMap<FeedId, PriceReading>,
    /// Verified prices per feed, keyed by publish time
    benchmarks: HashMap<FeedId, BTreeMap<Timestamp, Price>>,
    /// Readings older than this are rejected. None disables the check.
    max_staleness_secs: Option<i64>,
}

impl OraclePrices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_staleness(mut self, secs: i64) -> Self {
        self.max_staleness_secs = Some(secs);
        self
    }

    pub fn set_current_price(&mut self, feed: FeedId, price: Price, at: Timestamp) {
        self.current.insert(feed, PriceReading::new(price, at));
    }

    pub fn set_benchmark_price(&mut self, feed: FeedId, at: Timestamp, price: Price) {
        self.benchmarks.entry(feed).or_default().insert(at, price);
    }

    pub fn feeds(&self) -> impl Iterator<Item = &FeedId> {
        self.current.keys()
    }
}

impl PriceSource for OraclePrices {
    fn current_price(&self, feed: FeedId, now: Timestamp) -> Result<PriceReading, PriceFeedError> {
        let reading = self
            .current
            .get(&feed)
            .copied()
            .ok_or(PriceFeedError::NoPrice(feed))?;

        if let Some(max_age) = self.max_staleness_secs {
            if reading.age(now) > max_age {
                return Err(PriceFeedError::Stale {
                    feed,
                    published: reading.timestamp,
                    now,
                });
            }
        }
        Ok(reading)
    }

    // latest verified price published at or before `at`, else the live reading
    fn benchmark_price(&self, feed: FeedId, at: Timestamp) -> Result<PriceReading, PriceFeedError> {
        let verified = self
            .benchmarks
            .get(&feed)
            .and_then(|history| history.range(..=at).next_back())
            .map(|(ts, price)| PriceReading::new(*price, *ts));

        match verified {
            Some(reading) => Ok(reading),
            None => self
                .current
                .get(&feed)
                .copied()
                .ok_or(PriceFeedError::NoPrice(feed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const ETH: FeedId = FeedId(1);

    fn px(v: rust_decimal::Decimal) -> Price {
        Price::new_unchecked(v)
    }

    #[test]
    fn missing_feed_is_an_error() {
        let oracle = OraclePrices::new();
        assert_eq!(
            oracle.current_price(ETH, Timestamp::from_secs(0)),
            Err(PriceFeedError::NoPrice(ETH))
        );
    }

    #[test]
    fn current_price_round_trip() {
        let mut oracle = OraclePrices::new();
        oracle.set_current_price(ETH, px(dec!(1000)), Timestamp::from_secs(10));
        let reading = oracle.current_price(ETH, Timestamp::from_secs(20)).unwrap();
        assert_eq!(reading.price.value(), dec!(1000));
        assert_eq!(reading.age(Timestamp::from_secs(20)), 10);
    }

    #[test]
    fn staleness_limit() {
        let mut oracle = OraclePrices::new().with_max_staleness(60);
        oracle.set_current_price(ETH, px(dec!(1000)), Timestamp::from_secs(0));
        assert!(oracle.current_price(ETH, Timestamp::from_secs(60)).is_ok());
        assert!(matches!(
            oracle.current_price(ETH, Timestamp::from_secs(61)),
            Err(PriceFeedError::Stale { .. })
        ));
    }

    #[test]
    fn benchmark_picks_latest_at_or_before() {
        let mut oracle = OraclePrices::new();
        oracle.set_current_price(ETH, px(dec!(1100)), Timestamp::from_secs(100));
        oracle.set_benchmark_price(ETH, Timestamp::from_secs(10), px(dec!(990)));
        oracle.set_benchmark_price(ETH, Timestamp::from_secs(20), px(dec!(1010)));

        let at_15 = oracle.benchmark_price(ETH, Timestamp::from_secs(15)).unwrap();
        assert_eq!(at_15.price.value(), dec!(990));

        let at_20 = oracle.benchmark_price(ETH, Timestamp::from_secs(20)).unwrap();
        assert_eq!(at_20.price.value(), dec!(1010));

        // nothing verified before t=5, fall back to live
        let at_5 = oracle.benchmark_price(ETH, Timestamp::from_secs(5)).unwrap();
        assert_eq!(at_5.price.value(), dec!(1100));
    }
}
