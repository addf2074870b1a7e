//! Owner-only protocol configuration.

use super::core::Engine;
use super::results::EngineError;
use crate::collateral::CollateralConfig;
use crate::events::EventPayload;
use crate::fees::{FeeTier, FeeTierUpdateRequest, KeeperCosts};
use crate::margin::LiquidationParameters;
use crate::price_feed::PriceSource;
use crate::settlement::SettlementStrategy;
use crate::signing::{recover_signer, OrderSignature};
use crate::account::Permission;
use crate::types::{AccountId, Address, Bps, MarketId, Timestamp};
use rust_decimal::Decimal;
use tracing::info;

impl<P: PriceSource> Engine<P> {
    pub fn set_fee_tier(
        &mut self,
        caller: Address,
        tier_id: u32,
        maker_discount_bps: u32,
        taker_discount_bps: u32,
    ) -> Result<(), EngineError> {
        self.atomically("set_fee_tier", |engine| {
            engine.ensure_owner(caller)?;
            let tier = FeeTier::new(maker_discount_bps, taker_discount_bps);
            if !tier.is_valid() {
                return Err(EngineError::InvalidParameter {
                    name: "discount_bps",
                    reason: format!("must not exceed {}", Bps::MAX.value()),
                });
            }
            engine.ledger.fee_tiers.insert(tier_id, tier);
            info!(tier_id, maker_discount_bps, taker_discount_bps, "fee tier set");
            engine.emit_event(EventPayload::FeeTierSet {
                tier_id,
                maker_discount_bps,
                taker_discount_bps,
            });
            Ok(())
        })
    }

    pub fn set_fee_tier_updater(&mut self, caller: Address, updater: Address) -> Result<(), EngineError> {
        self.atomically("set_fee_tier_updater", |engine| {
            engine.ensure_owner(caller)?;
            engine.ledger.fee_tier_updater = Some(updater).filter(|a| !a.is_zero());
            info!(%updater, "fee tier updater set");
            Ok(())
        })
    }

    // 3.5: the account owner (or the protocol owner) assigns tiers directly.
    // anyone may relay an assignment signed by the endorsed updater before it expires.
    pub fn update_fee_tier(
        &mut self,
        caller: Address,
        account_id: AccountId,
        tier_id: u32,
        expiry: Timestamp,
        signature: Option<&OrderSignature>,
    ) -> Result<(), EngineError> {
        self.atomically("update_fee_tier", |engine| {
            let now = engine.current_time;
            engine.account(account_id)?;
            if tier_id != 0 && !engine.ledger.fee_tiers.contains_key(&tier_id) {
                return Err(EngineError::InvalidFeeTier(tier_id));
            }

            match signature {
                None if caller == engine.config.owner => {}
                None => engine.ensure_permission(account_id, Permission::FeeTierUpdate, caller)?,
                Some(signature) => {
                    let request = FeeTierUpdateRequest {
                        fee_tier_id: tier_id,
                        account_id,
                        expiry,
                    };
                    if request.is_expired(now) {
                        return Err(EngineError::FeeTierUpdateExpired { expiry, now });
                    }
                    let signer = recover_signer(engine.verifier.as_ref(), &engine.domain, &request, signature)?;
                    if engine.ledger.fee_tier_updater != Some(signer) {
                        return Err(EngineError::PermissionDenied {
                            account: account_id,
                            permission: Permission::FeeTierUpdate,
                            caller: signer,
                        });
                    }
                }
            }

            engine.account_mut(account_id)?.fee_tier_id = tier_id;
            engine.emit_event(EventPayload::FeeTierUpdated { account_id, tier_id });
            Ok(())
        })
    }

    // reprices only time after now. already elapsed time keeps the old rate.
    pub fn set_rollover_fee(&mut self, caller: Address, market_id: MarketId, fee_per_second: Decimal) -> Result<(), EngineError> {
        self.atomically("set_rollover_fee", |engine| {
            engine.ensure_owner(caller)?;
            if fee_per_second.is_sign_negative() {
                return Err(EngineError::InvalidParameter {
                    name: "rollover_fee_per_second",
                    reason: "must be non-negative".to_string(),
                });
            }
            let now = engine.current_time;
            engine.market_mut(market_id)?.set_rollover_fee(fee_per_second, now);
            info!(market = market_id.0, %fee_per_second, "rollover fee set");
            engine.emit_event(EventPayload::RolloverFeeSet {
                market_id,
                fee_per_second,
            });
            Ok(())
        })
    }

    pub fn set_liquidation_parameters(
        &mut self,
        caller: Address,
        market_id: MarketId,
        params: LiquidationParameters,
    ) -> Result<(), EngineError> {
        self.atomically("set_liquidation_parameters", |engine| {
            engine.ensure_owner(caller)?;
            if !params.is_valid() {
                return Err(EngineError::InvalidParameter {
                    name: "liquidation_parameters",
                    reason: format!("{params:?}"),
                });
            }
            engine.market_mut(market_id)?.config.liquidation = params;
            info!(market = market_id.0, "liquidation parameters set");
            engine.emit_event(EventPayload::LiquidationParametersSet { market_id, params });
            Ok(())
        })
    }

    // 6.1: freeze each market at its current index price. already closed markets
    // keep their original close price.
    pub fn close_markets(&mut self, caller: Address, market_ids: &[MarketId]) -> Result<(), EngineError> {
        self.atomically("close_markets", |engine| {
            engine.ensure_owner(caller)?;
            let now = engine.current_time;
            let mut closed = Vec::new();
            for &market_id in market_ids {
                if engine.market(market_id)?.is_closed() {
                    continue;
                }
                let price = engine.index_price(market_id)?;
                let market = engine.market_mut(market_id)?;
                market.recompute_funding(price, now);
                market.close(price, now);
                info!(market = market_id.0, close_price = %price, "market closed");
                closed.push(market_id);
            }
            engine.emit_event(EventPayload::MarketsClosed { market_ids: closed });
            Ok(())
        })
    }

    pub fn open_markets(&mut self, caller: Address, market_ids: &[MarketId]) -> Result<(), EngineError> {
        self.atomically("open_markets", |engine| {
            engine.ensure_owner(caller)?;
            let now = engine.current_time;
            let mut opened = Vec::new();
            for &market_id in market_ids {
                let market = engine.market_mut(market_id)?;
                let Some(close_price) = market.close_price.filter(|_| market.is_closed()) else {
                    continue;
                };
                // funding kept running at the frozen price while closed
                market.recompute_funding(close_price, now);
                market.reopen(now);
                info!(market = market_id.0, "market reopened");
                opened.push(market_id);
            }
            engine.emit_event(EventPayload::MarketsOpened { market_ids: opened });
            Ok(())
        })
    }

    // a nonzero share also registers `referrer` as a relayer
    pub fn update_referrer_share(&mut self, caller: Address, referrer: Address, share_ratio: Decimal) -> Result<(), EngineError> {
        self.atomically("update_referrer_share", |engine| {
            engine.ensure_owner(caller)?;
            if referrer.is_zero() || share_ratio.is_sign_negative() || share_ratio > Decimal::ONE {
                return Err(EngineError::InvalidParameter {
                    name: "share_ratio",
                    reason: format!("{share_ratio} for {referrer}"),
                });
            }
            if share_ratio.is_zero() {
                engine.ledger.referrer_shares.remove(&referrer);
            } else {
                engine.ledger.referrer_shares.insert(referrer, share_ratio);
            }
            info!(%referrer, %share_ratio, "referrer share updated");
            engine.emit_event(EventPayload::ReferrerShareUpdated { referrer, share_ratio });
            Ok(())
        })
    }

    pub fn update_relayer_share(&mut self, caller: Address, relayer: Address, share_ratio: Decimal) -> Result<(), EngineError> {
        self.update_referrer_share(caller, relayer, share_ratio)
    }

    pub fn set_fee_collector(&mut self, caller: Address, collector: Option<Address>) -> Result<(), EngineError> {
        self.atomically("set_fee_collector", |engine| {
            engine.ensure_owner(caller)?;
            engine.ledger.fee_collector = collector.filter(|a| !a.is_zero());
            info!(collector = ?engine.ledger.fee_collector, "fee collector set");
            Ok(())
        })
    }

    pub fn set_keeper_costs(&mut self, caller: Address, costs: KeeperCosts) -> Result<(), EngineError> {
        self.atomically("set_keeper_costs", |engine| {
            engine.ensure_owner(caller)?;
            let values = [costs.settlement_cost, costs.flag_cost, costs.liquidate_cost];
            if values.iter().any(|c| c.is_negative()) {
                return Err(EngineError::InvalidParameter {
                    name: "keeper_costs",
                    reason: "must be non-negative".to_string(),
                });
            }
            engine.ledger.keeper_costs = costs;
            info!(settlement = %costs.settlement_cost, flag = %costs.flag_cost, liquidate = %costs.liquidate_cost, "keeper costs set");
            Ok(())
        })
    }

    pub fn add_settlement_strategy(
        &mut self,
        caller: Address,
        market_id: MarketId,
        strategy: SettlementStrategy,
    ) -> Result<u32, EngineError> {
        self.atomically("add_settlement_strategy", |engine| {
            engine.ensure_owner(caller)?;
            if !strategy.is_valid() {
                return Err(EngineError::InvalidParameter {
                    name: "settlement_strategy",
                    reason: format!("{strategy:?}"),
                });
            }
            let strategy_id = engine.market_mut(market_id)?.add_strategy(strategy.clone());
            info!(market = market_id.0, strategy_id, "settlement strategy added");
            engine.emit_event(EventPayload::SettlementStrategySet {
                market_id,
                strategy_id,
                strategy,
            });
            Ok(strategy_id)
        })
    }

    pub fn set_settlement_strategy(
        &mut self,
        caller: Address,
        market_id: MarketId,
        strategy_id: u32,
        strategy: SettlementStrategy,
    ) -> Result<(), EngineError> {
        self.atomically("set_settlement_strategy", |engine| {
            engine.ensure_owner(caller)?;
            if !strategy.is_valid() {
                return Err(EngineError::InvalidParameter {
                    name: "settlement_strategy",
                    reason: format!("{strategy:?}"),
                });
            }
            let slot = engine
                .market_mut(market_id)?
                .strategies
                .get_mut(strategy_id as usize)
                .ok_or(EngineError::InvalidSettlementStrategy {
                    market: market_id,
                    strategy_id,
                })?;
            *slot = strategy.clone();
            engine.emit_event(EventPayload::SettlementStrategySet {
                market_id,
                strategy_id,
                strategy,
            });
            Ok(())
        })
    }

    pub fn set_settlement_strategy_enabled(
        &mut self,
        caller: Address,
        market_id: MarketId,
        strategy_id: u32,
        enabled: bool,
    ) -> Result<(), EngineError> {
        self.atomically("set_settlement_strategy_enabled", |engine| {
            engine.ensure_owner(caller)?;
            let slot = engine
                .market_mut(market_id)?
                .strategies
                .get_mut(strategy_id as usize)
                .ok_or(EngineError::InvalidSettlementStrategy {
                    market: market_id,
                    strategy_id,
                })?;
            slot.disabled = !enabled;
            let strategy = slot.clone();
            info!(market = market_id.0, strategy_id, enabled, "settlement strategy toggled");
            engine.emit_event(EventPayload::SettlementStrategySet {
                market_id,
                strategy_id,
                strategy,
            });
            Ok(())
        })
    }

    pub fn set_collateral_configuration(&mut self, caller: Address, config: CollateralConfig) -> Result<(), EngineError> {
        self.atomically("set_collateral_configuration", |engine| {
            engine.ensure_owner(caller)?;
            if !config.is_valid() {
                return Err(EngineError::InvalidCollateral(config.id));
            }
            info!(collateral = config.id.0, symbol = %config.symbol, "collateral configured");
            engine.ledger.collateral_types.insert(config.id, config);
            Ok(())
        })
    }
}
