//! Market-level price reads.
//!
//! A closed market answers every price read with its frozen close price, live or
//! benchmark. Reopening restores oracle reads from that point on.

use super::core::Engine;
use super::results::EngineError;
use crate::funding::calculate_fill_price;
use crate::price_feed::PriceSource;
use crate::types::{CollateralId, FeedId, MarketId, Price, Timestamp};
use rust_decimal::Decimal;

impl<P: PriceSource> Engine<P> {
    pub fn index_price(&self, market_id: MarketId) -> Result<Price, EngineError> {
        let market = self.market(market_id)?;
        if let Some(close_price) = market.close_price.filter(|_| market.is_closed()) {
            return Ok(close_price);
        }
        Ok(self.prices.current_price(market.config.price_feed, self.current_time)?.price)
    }

    // verified price of `feed` at `at`, or the close price while the market is closed
    pub(super) fn settlement_price(&self, market_id: MarketId, feed: FeedId, at: Timestamp) -> Result<Price, EngineError> {
        let market = self.market(market_id)?;
        if let Some(close_price) = market.close_price.filter(|_| market.is_closed()) {
            return Ok(close_price);
        }
        Ok(self.prices.benchmark_price(feed, at)?.price)
    }

    pub fn benchmark_price(&self, market_id: MarketId, at: Timestamp) -> Result<Price, EngineError> {
        let feed = self.market(market_id)?.config.price_feed;
        self.settlement_price(market_id, feed, at)
    }

    // premium-adjusted price for trading `size_delta` against the current skew
    pub fn fill_price(&self, market_id: MarketId, size_delta: Decimal, price: Price) -> Result<Price, EngineError> {
        let market = self.market(market_id)?;
        Ok(calculate_fill_price(
            market.skew,
            market.config.funding.skew_scale,
            size_delta,
            price,
        ))
    }

    // USD is worth 1. anything else is oracle price less its discount.
    pub(super) fn collateral_price(&self, collateral_id: CollateralId) -> Result<Decimal, EngineError> {
        let config = self
            .ledger
            .collateral_types
            .get(&collateral_id)
            .ok_or(EngineError::InvalidCollateral(collateral_id))?;
        match config.price_feed {
            None => Ok(Decimal::ONE),
            Some(feed) => {
                let price = self.prices.current_price(feed, self.current_time)?.price;
                Ok(crate::d18::mul_decimal(price.value(), Decimal::ONE - config.discount))
            }
        }
    }
}
