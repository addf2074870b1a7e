//! Read-only views over markets, positions, fees and margin.

use super::core::Engine;
use super::results::{EngineError, MarketSummary, OpenPosition};
use crate::fees::{calculate_order_fees, FeeBreakdown};
use crate::funding::calculate_fill_price;
use crate::margin::{LiquidationParameters, RequiredMargins};
use crate::price_feed::PriceSource;
use crate::settlement::SettlementStrategy;
use crate::types::{AccountId, MarketId, Price, Quote};
use rust_decimal::Decimal;

impl<P: PriceSource> Engine<P> {
    // zero position when the account never traded the market
    pub fn get_open_position(&self, account_id: AccountId, market_id: MarketId) -> Result<OpenPosition, EngineError> {
        let account = self.account(account_id)?;
        self.market(market_id)?;
        match account.get_position(market_id) {
            Some(position) => self.position_snapshot(position),
            None => Ok(OpenPosition::default()),
        }
    }

    pub fn get_open_position_size(&self, account_id: AccountId, market_id: MarketId) -> Result<Decimal, EngineError> {
        Ok(self
            .account(account_id)?
            .get_position(market_id)
            .map(|p| p.size.value())
            .unwrap_or_default())
    }

    pub fn reported_debt(&self, market_id: MarketId) -> Result<Quote, EngineError> {
        let price = self.index_price(market_id)?;
        Ok(self.market(market_id)?.reported_debt(price, self.current_time))
    }

    pub fn current_funding_rate(&self, market_id: MarketId) -> Result<Decimal, EngineError> {
        Ok(self.market(market_id)?.current_funding_rate(self.current_time))
    }

    pub fn current_funding_velocity(&self, market_id: MarketId) -> Result<Decimal, EngineError> {
        Ok(self.market(market_id)?.current_funding_velocity())
    }

    pub fn market_summary(&self, market_id: MarketId) -> Result<MarketSummary, EngineError> {
        let market = self.market(market_id)?;
        let index_price = self.index_price(market_id)?;
        Ok(MarketSummary {
            market_id,
            skew: market.skew,
            size: market.size,
            index_price,
            current_funding_rate: market.current_funding_rate(self.current_time),
            current_funding_velocity: market.current_funding_velocity(),
            reported_debt: market.reported_debt(index_price, self.current_time),
            rollover_revenue: market.rollover_revenue,
            is_closed: market.is_closed(),
        })
    }

    pub fn get_rollover_fee(&self, market_id: MarketId) -> Result<Decimal, EngineError> {
        Ok(self.market(market_id)?.config.rollover_fee_per_second)
    }

    pub fn get_liquidation_parameters(&self, market_id: MarketId) -> Result<LiquidationParameters, EngineError> {
        Ok(self.market(market_id)?.config.liquidation)
    }

    pub fn is_market_closed(&self, market_id: MarketId) -> Result<bool, EngineError> {
        Ok(self.market(market_id)?.is_closed())
    }

    pub fn get_close_price(&self, market_id: MarketId) -> Result<Option<Price>, EngineError> {
        Ok(self.market(market_id)?.close_price)
    }

    pub fn get_settlement_strategy(&self, market_id: MarketId, strategy_id: u32) -> Result<&SettlementStrategy, EngineError> {
        self.market(market_id)?
            .strategy(strategy_id)
            .ok_or(EngineError::InvalidSettlementStrategy {
                market: market_id,
                strategy_id,
            })
    }

    // (maker, taker) discount bps. unknown tiers read as no discount.
    pub fn get_fee_tier(&self, tier_id: u32) -> (u32, u32) {
        self.ledger
            .fee_tiers
            .get(&tier_id)
            .map(|t| (t.maker_discount.value(), t.taker_discount.value()))
            .unwrap_or((0, 0))
    }

    pub fn get_fee_tier_id(&self, account_id: AccountId) -> Result<u32, EngineError> {
        Ok(self.account(account_id)?.fee_tier_id)
    }

    // fees and fill price for an order of `size_delta` at the current index price
    pub fn compute_order_fees(
        &self,
        account_id: AccountId,
        market_id: MarketId,
        size_delta: Decimal,
    ) -> Result<(FeeBreakdown, Price), EngineError> {
        let price = self.index_price(market_id)?;
        self.compute_order_fees_with_price(account_id, market_id, size_delta, price)
    }

    pub fn compute_order_fees_with_price(
        &self,
        account_id: AccountId,
        market_id: MarketId,
        size_delta: Decimal,
        price: Price,
    ) -> Result<(FeeBreakdown, Price), EngineError> {
        let market = self.market(market_id)?;
        let tier = self.fee_tier_of(account_id)?;
        let fill_price = calculate_fill_price(market.skew, market.config.funding.skew_scale, size_delta, price);
        let fees = calculate_order_fees(market.skew, size_delta, fill_price, &market.config.order_fees, &tier);
        Ok((fees, fill_price))
    }

    pub fn get_available_margin(&self, account_id: AccountId) -> Result<Quote, EngineError> {
        self.available_margin(self.account(account_id)?)
    }

    pub fn get_required_margins(&self, account_id: AccountId) -> Result<RequiredMargins, EngineError> {
        self.required_margins_with(self.account(account_id)?, None)
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::{CommitOutcome, Engine, EngineConfig, EngineError, OrderCommitment};
    use crate::market::MarketConfig;
    use crate::settlement::SettlementStrategy;
    use crate::types::{Address, CollateralId, FeedId, MarketId, Price, Timestamp, TrackingCode};
    use rust_decimal_macros::dec;

    const ETH: MarketId = MarketId(100);

    fn engine() -> Engine {
        let mut engine = Engine::new(EngineConfig::default());
        let owner = engine.owner();
        engine.add_market(owner, MarketConfig::eth_perp()).unwrap();
        engine
            .add_settlement_strategy(owner, ETH, SettlementStrategy::synchronous(FeedId(100)))
            .unwrap();
        engine
            .price_source_mut()
            .set_current_price(FeedId(100), Price::new_unchecked(dec!(2000)), Timestamp::from_secs(0));
        engine
    }

    #[test]
    fn tiered_fees_with_price() {
        let mut engine = Engine::new(EngineConfig::default());
        let owner = engine.owner();
        let market = MarketConfig::new(MarketId(25), "Ether", "snxETH", FeedId(25))
            .with_funding(dec!(0), dec!(0))
            .with_order_fees(dec!(0.0003), dec!(0.0008));
        engine.add_market(owner, market).unwrap();
        engine.set_fee_tier(owner, 1, 1000, 500).unwrap();
        let trader = engine.create_account(Address::from_label("trader"));
        let other = engine.create_account(Address::from_label("other"));
        engine
            .update_fee_tier(owner, trader, 1, Timestamp::from_secs(0), None)
            .unwrap();

        let px = Price::new_unchecked(dec!(1000));
        let (fees, fill) = engine
            .compute_order_fees_with_price(trader, MarketId(25), dec!(1), px)
            .unwrap();
        assert_eq!(fill, px);
        assert_eq!(fees.total().value(), dec!(0.76));

        let (base, _) = engine
            .compute_order_fees_with_price(other, MarketId(25), dec!(1), px)
            .unwrap();
        assert_eq!(base.total().value(), dec!(0.8));

        assert_eq!(engine.get_fee_tier(1), (1000, 500));
        assert_eq!(engine.get_fee_tier(42), (0, 0));
        assert_eq!(engine.get_fee_tier_id(other).unwrap(), 0);
    }

    #[test]
    fn reported_debt_tracks_trader_pnl() {
        let mut engine = engine();
        let alice = Address::from_label("alice");
        let id = engine.create_account(alice);
        engine.modify_collateral(alice, id, CollateralId::USD, dec!(10000)).unwrap();

        let outcome = engine
            .commit_order(
                alice,
                &OrderCommitment {
                    account_id: id,
                    market_id: ETH,
                    size_delta: dec!(1),
                    settlement_strategy_id: 0,
                    acceptable_price: Price::new_unchecked(dec!(2010)),
                    tracking_code: TrackingCode::NONE,
                    referrer: Address::ZERO,
                },
            )
            .unwrap();
        let CommitOutcome::Settled(result) = outcome else {
            panic!("synchronous strategy settles on commit");
        };
        // 2000 * (1 + 0.5/1e6)
        assert_eq!(result.fill_price.value(), dec!(2000.001));
        assert_eq!(engine.get_open_position_size(id, ETH).unwrap(), dec!(1));

        let position = engine.get_open_position(id, ETH).unwrap();
        assert_eq!(position.pnl.value(), dec!(-0.001));
        assert_eq!(engine.reported_debt(ETH).unwrap(), position.pnl);

        let summary = engine.market_summary(ETH).unwrap();
        assert_eq!(summary.skew, dec!(1));
        assert_eq!(summary.size, dec!(1));
        assert!(!summary.is_closed);
    }

    #[test]
    fn unknown_market_and_strategy() {
        let engine = engine();
        assert_eq!(engine.reported_debt(MarketId(1)), Err(EngineError::InvalidMarket(MarketId(1))));
        assert!(engine.get_settlement_strategy(ETH, 0).is_ok());
        assert!(matches!(
            engine.get_settlement_strategy(ETH, 1),
            Err(EngineError::InvalidSettlementStrategy { .. })
        ));
    }
}
