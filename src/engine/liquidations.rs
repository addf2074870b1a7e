//! Liquidation detection and execution.

use super::core::Engine;
use super::positions::SettleRequest;
use super::results::{EngineError, LiquidationResult};
use crate::events::{EventPayload, PositionLiquidatedEvent};
use crate::fees::FeeBreakdown;
use crate::liquidation::{evaluate, keeper_reward, LiquidationStatus};
use crate::price_feed::PriceSource;
use crate::types::{AccountId, Address, MarketId, Price, Quote, TrackingCode};
use rust_decimal::Decimal;
use tracing::{info, warn};

impl<P: PriceSource> Engine<P> {
    pub fn liquidation_status(&self, account_id: AccountId) -> Result<LiquidationStatus, EngineError> {
        let account = self.account(account_id)?;
        let available = self.available_margin(account)?;
        let margins = self.required_margins_with(account, None)?;
        Ok(evaluate(available, &margins, &self.ledger.keeper_costs))
    }

    // open positions and margin strictly below the liquidation threshold
    pub fn can_liquidate(&self, account_id: AccountId) -> Result<bool, EngineError> {
        if !self.account(account_id)?.has_open_positions() {
            return Ok(false);
        }
        Ok(self.liquidation_status(account_id)?.is_liquidatable())
    }

    // flat, fee-free close through the normal settlement path
    fn close_at(
        &mut self,
        caller: Address,
        account_id: AccountId,
        market_id: MarketId,
        oracle_price: Price,
    ) -> Result<Decimal, EngineError> {
        let size = self
            .account(account_id)?
            .get_position(market_id)
            .map(|p| p.size.value())
            .unwrap_or_default();
        let fill_price = self.fill_price(market_id, -size, oracle_price)?;
        self.settle_position(&SettleRequest {
            account_id,
            market_id,
            size_delta: -size,
            fill_price,
            oracle_price,
            fees: FeeBreakdown::default(),
            settlement_reward: Quote::zero(),
            referrer: Address::ZERO,
            tracking_code: TrackingCode::NONE,
            settler: caller,
        })?;
        self.account_mut(account_id)?.remove_position(market_id);
        Ok(size)
    }

    // 8.6: close everything, seize all collateral, pay the keeper, pool the rest
    pub fn liquidate(&mut self, caller: Address, account_id: AccountId) -> Result<LiquidationResult, EngineError> {
        self.atomically("liquidate", |engine| {
            if !engine.can_liquidate(account_id)? {
                return Err(EngineError::NotEligibleForLiquidation(account_id));
            }
            let margins = engine.required_margins_with(engine.account(account_id)?, None)?;

            let market_ids: Vec<MarketId> = engine
                .account(account_id)?
                .open_positions()
                .map(|p| p.market_id)
                .collect();
            let mut closed_positions = Vec::with_capacity(market_ids.len());
            for market_id in market_ids {
                let price = engine.index_price(market_id)?;
                let size = engine.close_at(caller, account_id, market_id, price)?;
                engine.emit_event(EventPayload::PositionLiquidated(PositionLiquidatedEvent {
                    account_id,
                    market_id,
                    amount_liquidated: size,
                    current_position_size: Decimal::ZERO,
                }));
                closed_positions.push((market_id, size));
            }

            // flat records and locks go with the account's collateral
            let seized = engine.total_collateral_value(account_id)?;
            engine.ledger.locks.release_all(account_id);
            let account = engine.account_mut(account_id)?;
            account.positions.clear();
            account.pending_order = None;
            account.collateral.clear();

            let costs = engine.ledger.keeper_costs;
            let reward = keeper_reward(&margins, &costs, seized);
            let paid = engine.ledger.liquidation_pool.absorb(seized, reward);
            engine.ledger.credit(caller, paid);
            if seized.is_negative() {
                warn!(account = account_id.0, bad_debt = %seized.abs(), "liquidation left bad debt");
            }
            info!(account = account_id.0, %seized, reward = %paid, "account liquidated");

            engine.emit_event(EventPayload::AccountLiquidationAttempt {
                account_id,
                reward: paid,
                full_liquidation: true,
            });
            Ok(LiquidationResult {
                account_id,
                closed_positions,
                seized,
                keeper_reward: paid,
                full_liquidation: true,
            })
        })
    }

    // 8.7: the owner or a registered keeper flattens one position at the
    // benchmark price for now. works on closed markets.
    pub fn close_position(
        &mut self,
        caller: Address,
        account_id: AccountId,
        market_id: MarketId,
    ) -> Result<Decimal, EngineError> {
        self.atomically("close_position", |engine| {
            if caller != engine.config.owner && !engine.is_authorized_relayer(caller) {
                return Err(EngineError::UnauthorizedKeeper(caller));
            }
            engine.market(market_id)?;
            let is_open = engine
                .account(account_id)?
                .get_position(market_id)
                .is_some_and(|p| p.is_open());
            if !is_open {
                return Err(EngineError::NoOpenPosition {
                    account: account_id,
                    market: market_id,
                });
            }
            let price = engine.benchmark_price(market_id, engine.current_time)?;
            let size = engine.close_at(caller, account_id, market_id, price)?;
            info!(account = account_id.0, market = market_id.0, %size, "position closed by keeper");
            Ok(size)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::{Engine, EngineConfig, EngineError};
    use crate::types::{Address, MarketId};

    #[test]
    fn flat_accounts_are_not_liquidatable() {
        let mut engine = Engine::new(EngineConfig::default());
        let id = engine.create_account(Address::from_label("alice"));
        assert!(!engine.can_liquidate(id).unwrap());
        assert_eq!(
            engine.liquidate(Address::from_label("keeper"), id),
            Err(EngineError::NotEligibleForLiquidation(id))
        );
    }

    #[test]
    fn close_position_needs_a_keeper() {
        let mut engine = Engine::new(EngineConfig::default());
        let id = engine.create_account(Address::from_label("alice"));
        let stranger = Address::from_label("stranger");
        assert_eq!(
            engine.close_position(stranger, id, MarketId(100)),
            Err(EngineError::UnauthorizedKeeper(stranger))
        );
        let owner = engine.owner();
        assert_eq!(
            engine.close_position(owner, id, MarketId(100)),
            Err(EngineError::InvalidMarket(MarketId(100)))
        );
    }
}
