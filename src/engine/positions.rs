//! Position settlement and margin accounting.

use super::core::Engine;
use super::results::{EngineError, OpenPosition, SettlementResult};
use crate::account::Account;
use crate::events::{EventPayload, InterestChargedEvent, MarketUpdatedEvent, OrderSettledEvent};
use crate::fees::{split_revenue_share, FeeBreakdown};
use crate::margin::{position_margins, RequiredMargins};
use crate::position::Position;
use crate::price_feed::PriceSource;
use crate::types::{AccountId, Address, MarketId, Price, Quote, TrackingCode};
use rust_decimal::Decimal;
use std::collections::BTreeSet;

/// Everything one settlement needs. Every order path funnels into
/// [`Engine::settle_position`] with one of these.
#[derive(Debug, Clone)]
pub(super) struct SettleRequest {
    pub account_id: AccountId,
    pub market_id: MarketId,
    pub size_delta: Decimal,
    pub fill_price: Price,
    // oracle price the fill was derived from. funding is folded at this price.
    pub oracle_price: Price,
    pub fees: FeeBreakdown,
    pub settlement_reward: Quote,
    // receives its share of the fees when registered
    pub referrer: Address,
    pub tracking_code: TrackingCode,
    pub settler: Address,
}

// |new| <= |old| without crossing zero
pub(super) fn is_reduction(current: Decimal, new_size: Decimal) -> bool {
    new_size.abs() <= current.abs() && (new_size.is_zero() || new_size.is_sign_positive() == current.is_sign_positive())
}

impl<P: PriceSource> Engine<P> {
    // 8.4: realize rollover, funding and pnl, apply the delta, charge fees, pay out.
    pub(super) fn settle_position(&mut self, req: &SettleRequest) -> Result<SettlementResult, EngineError> {
        let now = self.current_time;
        let referrer_share = self
            .ledger
            .referrer_shares
            .get(&req.referrer)
            .copied()
            .filter(|_| !req.referrer.is_zero())
            .unwrap_or(Decimal::ZERO);

        let ledger = &mut self.ledger;
        let market = ledger
            .markets
            .get_mut(&req.market_id)
            .ok_or(EngineError::InvalidMarket(req.market_id))?;
        let account = ledger
            .accounts
            .get_mut(&req.account_id)
            .ok_or(EngineError::AccountNotFound(req.account_id))?;

        // 1. funding up to now, before skew moves
        let funding_index = market.recompute_funding(req.oracle_price, now);

        // 2. realize on the pre-delta position, then rebase
        let position = account.positions.entry(req.market_id).or_insert_with(|| {
            Position::new(req.account_id, req.market_id, req.fill_price, funding_index, now)
        });
        let before = position.clone();
        let realized = position.settle(
            req.size_delta,
            req.fill_price,
            funding_index,
            &market.rollover_fees,
            &market.closures,
            now,
        );
        let after = position.clone();

        // 3. everything lands in USD collateral
        let total_fees = req.fees.total();
        account.settle_usd(realized.net().sub(total_fees).sub(req.settlement_reward));
        account.realize_pnl(realized.pnl);

        // 4. market aggregates
        market.apply_position_change(&before, &after);
        market.rollover_revenue = market.rollover_revenue.add(realized.interest);

        let market_updated = MarketUpdatedEvent {
            market_id: req.market_id,
            price: req.oracle_price,
            skew: market.skew,
            size: market.size,
            size_delta: req.size_delta,
            current_funding_rate: market.funding.last_rate,
            current_funding_velocity: market.current_funding_velocity(),
            interest_rate: market.config.rollover_fee_per_second,
        };

        // 5. fees: referrer share first, the rest to the collector or the protocol
        let (referral_fees, collected_fees) = if referrer_share.is_zero() {
            (Quote::zero(), total_fees)
        } else {
            split_revenue_share(total_fees, referrer_share)
        };
        ledger.credit(req.referrer, referral_fees);
        match ledger.fee_collector {
            Some(collector) => ledger.credit(collector, collected_fees),
            None => ledger.protocol_revenue = ledger.protocol_revenue.add(collected_fees),
        }
        ledger.credit(req.settler, req.settlement_reward);

        self.emit_event(EventPayload::InterestCharged(InterestChargedEvent {
            account_id: req.account_id,
            market_id: req.market_id,
            interest: realized.interest,
        }));
        self.emit_event(EventPayload::OrderSettled(OrderSettledEvent {
            market_id: req.market_id,
            account_id: req.account_id,
            fill_price: req.fill_price,
            pnl: realized.pnl,
            accrued_funding: realized.funding,
            size_delta: req.size_delta,
            new_size: after.size.value(),
            total_fees,
            referral_fees,
            collected_fees,
            settlement_reward: req.settlement_reward,
            tracking_code: req.tracking_code,
            settler: req.settler,
        }));
        self.emit_event(EventPayload::MarketUpdated(market_updated));

        Ok(SettlementResult {
            account_id: req.account_id,
            market_id: req.market_id,
            fill_price: req.fill_price,
            size_delta: req.size_delta,
            new_size: after.size.value(),
            realized,
            fees: req.fees,
            referral_fees,
            collected_fees,
            settlement_reward: req.settlement_reward,
        })
    }

    // pnl, funding and owed interest at the index price, as of now
    pub(super) fn position_snapshot(&self, position: &Position) -> Result<OpenPosition, EngineError> {
        let market = self.market(position.market_id)?;
        if !position.is_open() {
            return Ok(OpenPosition::default());
        }
        let price = self.index_price(position.market_id)?;
        let now = self.current_time;
        let funding_index = market
            .funding
            .next_funding(&market.config.funding, market.skew, price, now);
        Ok(OpenPosition {
            pnl: position.pnl(price),
            accrued_funding: position.accrued_funding(funding_index),
            size: position.size.value(),
            owed_interest: position.owed_interest(price, &market.rollover_fees, &market.closures, now),
        })
    }

    // unlocked collateral at oracle value, USD at par (may be negative)
    pub(super) fn unlocked_collateral_value(&self, account: &Account) -> Result<Quote, EngineError> {
        let mut total = Quote::zero();
        for (collateral_id, amount) in &account.collateral {
            let unlocked = *amount - self.ledger.locks.locked_amount(account.id, *collateral_id);
            if unlocked.is_zero() {
                continue;
            }
            let price = self.collateral_price(*collateral_id)?;
            total = total.add(Quote::new(crate::d18::mul_decimal(unlocked, price)));
        }
        Ok(total)
    }

    pub(super) fn available_margin(&self, account: &Account) -> Result<Quote, EngineError> {
        let mut total = self.unlocked_collateral_value(account)?;
        for position in account.open_positions() {
            total = total.add(self.position_snapshot(position)?.equity());
        }
        Ok(total)
    }

    // requirements summed over positions. `change` swaps in a hypothetical size
    // (and price) for one market.
    pub(super) fn required_margins_with(
        &self,
        account: &Account,
        change: Option<(MarketId, Decimal, Price)>,
    ) -> Result<RequiredMargins, EngineError> {
        let mut market_ids: BTreeSet<MarketId> = account.positions.keys().copied().collect();
        if let Some((market_id, _, _)) = change {
            market_ids.insert(market_id);
        }

        let mut total = RequiredMargins::zero();
        for market_id in market_ids {
            let (size, price) = match change {
                Some((changed, new_size, price)) if changed == market_id => (new_size, price),
                _ => {
                    let size = account
                        .get_position(market_id)
                        .map(|p| p.size.value())
                        .unwrap_or_default();
                    if size.is_zero() {
                        continue;
                    }
                    (size, self.index_price(market_id)?)
                }
            };
            let market = self.market(market_id)?;
            let margins = position_margins(size, price, market.config.funding.skew_scale, &market.config.liquidation);
            total = total.add(&margins);
        }
        Ok(total)
    }

    // 8.5: initial margin must still be covered after the order and its charges
    pub(super) fn check_order_margin(
        &self,
        account_id: AccountId,
        market_id: MarketId,
        size_delta: Decimal,
        fill_price: Price,
        charges: Quote,
    ) -> Result<(), EngineError> {
        let account = self.account(account_id)?;
        let current = account
            .get_position(market_id)
            .map(|p| p.size.value())
            .unwrap_or_default();
        let new_size = current + size_delta;
        if self.config.waive_margin_on_reduce && is_reduction(current, new_size) {
            return Ok(());
        }

        let available = self.available_margin(account)?.sub(charges);
        let required = self
            .required_margins_with(account, Some((market_id, new_size, fill_price)))?
            .initial;
        if available < required {
            return Err(EngineError::InsufficientMargin { available, required });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn reductions() {
        assert!(is_reduction(dec!(2), dec!(1)));
        assert!(is_reduction(dec!(-2), dec!(0)));
        assert!(is_reduction(dec!(-2), dec!(-2)));
        assert!(!is_reduction(dec!(2), dec!(3)));
        // flipping sides adds fresh exposure
        assert!(!is_reduction(dec!(2), dec!(-1)));
        assert!(!is_reduction(Decimal::ZERO, dec!(1)));
    }
}
