//! Order settlement: signed async orders, matched limit orders, cancellation and
//! commit-then-settle delayed orders.

use super::core::Engine;
use super::positions::SettleRequest;
use super::results::{CommitOutcome, EngineError, LimitOrderMatch, SettlementResult};
use crate::account::Permission;
use crate::events::{EventPayload, LimitOrderSettledEvent, OrderCommittedEvent};
use crate::fees::{calculate_limit_order_fees, calculate_order_fees, FeeTier};
use crate::funding::calculate_fill_price;
use crate::order::{within_acceptable_price, AsyncOrder, CancelOrderRequest, LimitOrder, NonceState, OffchainOrder};
use crate::price_feed::PriceSource;
use crate::settlement::{SettlementStrategy, SettlementStrategyType, WindowStatus};
use crate::signing::{recover_signer, OrderSignature, TypedData};
use crate::types::{AccountId, Address, MarketId, Price, Quote, TrackingCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Parameters of a delayed order commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCommitment {
    pub account_id: AccountId,
    pub market_id: MarketId,
    pub size_delta: Decimal,
    pub settlement_strategy_id: u32,
    pub acceptable_price: Price,
    pub tracking_code: TrackingCode,
    pub referrer: Address,
}

impl<P: PriceSource> Engine<P> {
    pub(super) fn fee_tier_of(&self, account_id: AccountId) -> Result<FeeTier, EngineError> {
        let tier_id = self.account(account_id)?.fee_tier_id;
        Ok(self.ledger.fee_tiers.get(&tier_id).copied().unwrap_or_default())
    }

    pub fn is_authorized_relayer(&self, who: Address) -> bool {
        !who.is_zero()
            && self
                .ledger
                .referrer_shares
                .get(&who)
                .is_some_and(|share| !share.is_zero())
    }

    // signer of `payload`, who must hold `permission` on the account (or own it)
    fn authorized_signer<T: TypedData>(
        &self,
        account_id: AccountId,
        permission: Permission,
        payload: &T,
        signature: &OrderSignature,
    ) -> Result<Address, EngineError> {
        let signer = recover_signer(self.verifier.as_ref(), &self.domain, payload, signature)?;
        self.ensure_permission(account_id, permission, signer)?;
        Ok(signer)
    }

    fn enabled_strategy(&self, market_id: MarketId, strategy_id: u32) -> Result<SettlementStrategy, EngineError> {
        self.market(market_id)?
            .strategy(strategy_id)
            .filter(|s| s.is_enabled())
            .cloned()
            .ok_or(EngineError::InvalidSettlementStrategy {
                market: market_id,
                strategy_id,
            })
    }

    fn ensure_open(&self, market_id: MarketId) -> Result<(), EngineError> {
        if self.market(market_id)?.is_closed() {
            return Err(EngineError::MarketClosed(market_id));
        }
        Ok(())
    }

    // 7.1: trader signed, anyone (or the named relayer) submits once the window opens
    pub fn settle_offchain_async_order(
        &mut self,
        caller: Address,
        order: &OffchainOrder,
        signature: &OrderSignature,
    ) -> Result<SettlementResult, EngineError> {
        self.atomically("settle_offchain_async_order", |engine| {
            let now = engine.current_time;
            let market_id = order.market_id;
            let account_id = order.account_id;

            engine.market(market_id)?;
            engine.account(account_id)?;
            engine.authorized_signer(account_id, Permission::PerpsCommitOffchainOrder, order, signature)?;

            let relayer = order.referrer_or_relayer;
            if !relayer.is_zero() && (caller != relayer || !engine.is_authorized_relayer(relayer)) {
                return Err(EngineError::UnauthorizedRelayer(caller));
            }
            if order.size_delta.is_zero() {
                return Err(EngineError::ZeroSizeOrder);
            }
            let strategy = engine.enabled_strategy(market_id, order.settlement_strategy_id)?;
            engine.ensure_open(market_id)?;
            if engine.ledger.nonces.state(account_id, order.nonce) != NonceState::Unused {
                return Err(EngineError::LimitOrderAlreadyUsed {
                    account: account_id,
                    nonce: order.nonce,
                });
            }
            if order.is_expired(now) {
                return Err(EngineError::OrderExpired {
                    expiration: order.expiration,
                    now,
                });
            }
            let (start, end) = strategy.settlement_window(order.timestamp);
            if strategy.window_status(order.timestamp, now) != WindowStatus::Open {
                return Err(EngineError::SettlementWindowNotOpen { now, start, end });
            }

            let price = engine.settlement_price(market_id, strategy.price_feed, strategy.price_time(order.timestamp))?;
            let market = engine.market(market_id)?;
            let fill_price = calculate_fill_price(market.skew, market.config.funding.skew_scale, order.size_delta, price);
            if !within_acceptable_price(order.size_delta, fill_price, order.acceptable_price) {
                return Err(EngineError::AcceptablePriceExceeded {
                    fill_price,
                    acceptable_price: order.acceptable_price,
                });
            }

            let tier = engine.fee_tier_of(account_id)?;
            let fees = calculate_order_fees(market.skew, order.size_delta, fill_price, &market.config.order_fees, &tier);
            let reward = strategy
                .settlement_reward
                .add(engine.ledger.keeper_costs.settlement_cost);
            engine.check_order_margin(account_id, market_id, order.size_delta, fill_price, fees.total().add(reward))?;

            let result = engine.settle_position(&SettleRequest {
                account_id,
                market_id,
                size_delta: order.size_delta,
                fill_price,
                oracle_price: price,
                fees,
                settlement_reward: reward,
                referrer: relayer,
                tracking_code: order.tracking_code,
                settler: caller,
            })?;
            engine.ledger.nonces.mark_settled(account_id, order.nonce);
            debug!(account = account_id.0, nonce = order.nonce, fill = %fill_price, "async order settled");
            Ok(result)
        })
    }

    // 7.2: a signed short and a signed long crossed by their relayer. both fill at
    // the maker's price with limit-order fees.
    pub fn settle_offchain_limit_order(
        &mut self,
        caller: Address,
        short_order: &LimitOrder,
        short_signature: &OrderSignature,
        long_order: &LimitOrder,
        long_signature: &OrderSignature,
    ) -> Result<LimitOrderMatch, EngineError> {
        self.atomically("settle_offchain_limit_order", |engine| {
            let now = engine.current_time;
            let market_id = short_order.market_id;
            if long_order.market_id != market_id {
                return Err(EngineError::LimitOrderMarketMismatch {
                    short: market_id,
                    long: long_order.market_id,
                });
            }
            engine.market(market_id)?;
            engine.ensure_open(market_id)?;
            engine.account(short_order.account_id)?;
            engine.account(long_order.account_id)?;

            engine.authorized_signer(
                short_order.account_id,
                Permission::PerpsCommitOffchainOrder,
                short_order,
                short_signature,
            )?;
            engine.authorized_signer(
                long_order.account_id,
                Permission::PerpsCommitOffchainOrder,
                long_order,
                long_signature,
            )?;

            if short_order.relayer != long_order.relayer {
                return Err(EngineError::LimitOrderDifferentRelayer {
                    short: short_order.relayer,
                    long: long_order.relayer,
                });
            }
            let relayer = short_order.relayer;
            if caller != relayer || !engine.is_authorized_relayer(relayer) {
                return Err(EngineError::LimitOrderRelayerInvalid(relayer));
            }

            if !(short_order.amount < Decimal::ZERO && long_order.amount > Decimal::ZERO) {
                return Err(EngineError::MismatchingOrderSides);
            }
            if short_order.price > long_order.price {
                return Err(EngineError::LimitOrderPriceMismatch {
                    short_price: short_order.price,
                    long_price: long_order.price,
                });
            }
            if short_order.limit_order_maker == long_order.limit_order_maker {
                return Err(EngineError::MismatchingMakerTakerLimitOrder);
            }
            for order in [short_order, long_order] {
                if order.is_expired(now) {
                    return Err(EngineError::OrderExpired {
                        expiration: order.expiration,
                        now,
                    });
                }
            }

            let remaining_of = |order: &LimitOrder| {
                engine
                    .ledger
                    .nonces
                    .remaining(order.account_id, order.nonce, order.amount)
                    .ok_or(EngineError::LimitOrderAlreadyUsed {
                        account: order.account_id,
                        nonce: order.nonce,
                    })
            };
            let short_remaining = remaining_of(short_order)?;
            let long_remaining = remaining_of(long_order)?;
            let fill = short_remaining.min(long_remaining);
            for (order, remaining) in [(short_order, short_remaining), (long_order, long_remaining)] {
                if remaining > fill && !order.allow_partial_matching {
                    return Err(EngineError::LimitOrderAmountError {
                        account: order.account_id,
                        nonce: order.nonce,
                        remaining,
                        fill,
                    });
                }
            }

            let price = if short_order.limit_order_maker {
                short_order.price
            } else {
                long_order.price
            };
            let oracle_price = engine.index_price(market_id)?;
            let limit_fees = engine.market(market_id)?.config.limit_order_fees;

            let mut requests = Vec::with_capacity(2);
            for (order, size_delta) in [(short_order, -fill), (long_order, fill)] {
                let tier = engine.fee_tier_of(order.account_id)?;
                let fees = calculate_limit_order_fees(size_delta, price, order.limit_order_maker, &limit_fees, &tier);
                engine.check_order_margin(order.account_id, market_id, size_delta, price, fees.total())?;
                requests.push(SettleRequest {
                    account_id: order.account_id,
                    market_id,
                    size_delta,
                    fill_price: price,
                    oracle_price,
                    fees,
                    settlement_reward: Quote::zero(),
                    referrer: relayer,
                    tracking_code: order.tracking_code,
                    settler: caller,
                });
            }

            let mut settled = Vec::with_capacity(2);
            for (order, request) in [short_order, long_order].into_iter().zip(&requests) {
                let result = engine.settle_position(request)?;
                let state = engine
                    .ledger
                    .nonces
                    .record_fill(order.account_id, order.nonce, order.amount, fill);
                engine.emit_event(EventPayload::LimitOrderSettled(LimitOrderSettledEvent {
                    market_id,
                    account_id: order.account_id,
                    nonce: order.nonce,
                    price,
                    amount: request.size_delta,
                    limit_order_fees: result.fees.total(),
                    relayer_fees: result.referral_fees,
                    relayer,
                    tracking_code: order.tracking_code,
                }));
                settled.push((result, state));
            }

            let (long, long_state) = settled.pop().ok_or(EngineError::MismatchingOrderSides)?;
            let (short, short_state) = settled.pop().ok_or(EngineError::MismatchingOrderSides)?;
            debug!(market = market_id.0, fill = %fill, price = %price, "limit orders matched");
            Ok(LimitOrderMatch {
                market_id,
                price,
                fill_amount: fill,
                short,
                long,
                short_state,
                long_state,
            })
        })
    }

    // 7.3: owner or a PERPS_CANCEL_LIMIT_ORDER holder retires a nonce
    pub fn cancel_offchain_limit_order(
        &mut self,
        caller: Address,
        account_id: AccountId,
        nonce: u64,
    ) -> Result<(), EngineError> {
        self.atomically("cancel_offchain_limit_order", |engine| {
            engine.ensure_permission(account_id, Permission::PerpsCancelLimitOrder, caller)?;
            engine.cancel_nonce(account_id, nonce)
        })
    }

    // any caller may relay a cancel signed by an authorized signer
    pub fn cancel_offchain_limit_order_with_signature(
        &mut self,
        _caller: Address,
        request: &CancelOrderRequest,
        signature: &OrderSignature,
    ) -> Result<(), EngineError> {
        self.atomically("cancel_offchain_limit_order_with_signature", |engine| {
            engine.account(request.account_id)?;
            engine.authorized_signer(request.account_id, Permission::PerpsCancelLimitOrder, request, signature)?;
            engine.cancel_nonce(request.account_id, request.nonce)
        })
    }

    fn cancel_nonce(&mut self, account_id: AccountId, nonce: u64) -> Result<(), EngineError> {
        self.ledger
            .nonces
            .cancel(account_id, nonce)
            .map_err(|_| EngineError::LimitOrderAlreadyUsed {
                account: account_id,
                nonce,
            })?;
        self.emit_event(EventPayload::LimitOrderCancelled { account_id, nonce });
        Ok(())
    }

    // 7.4: commit now, settle inside the strategy window. synchronous strategies
    // settle on the spot at the index price.
    pub fn commit_order(&mut self, caller: Address, commitment: &OrderCommitment) -> Result<CommitOutcome, EngineError> {
        self.atomically("commit_order", |engine| {
            let now = engine.current_time;
            let account_id = commitment.account_id;
            let market_id = commitment.market_id;

            engine.market(market_id)?;
            engine.ensure_permission(account_id, Permission::PerpsCommitOffchainOrder, caller)?;
            if commitment.size_delta.is_zero() {
                return Err(EngineError::ZeroSizeOrder);
            }
            let strategy = engine.enabled_strategy(market_id, commitment.settlement_strategy_id)?;
            engine.ensure_open(market_id)?;

            if let Some(pending) = engine.account(account_id)?.pending_order.clone() {
                let pending_strategy = engine.enabled_strategy(pending.market_id, pending.settlement_strategy_id);
                let expired = pending_strategy
                    .map(|s| s.window_status(pending.commitment_time, now) == WindowStatus::Expired)
                    .unwrap_or(true);
                if !expired {
                    return Err(EngineError::OrderAlreadyCommitted(account_id));
                }
                engine.expire_pending_order(account_id, pending)?;
            }

            let price = engine.index_price(market_id)?;
            let market = engine.market(market_id)?;
            let fill_price = calculate_fill_price(market.skew, market.config.funding.skew_scale, commitment.size_delta, price);
            let tier = engine.fee_tier_of(account_id)?;
            let fees = calculate_order_fees(market.skew, commitment.size_delta, fill_price, &market.config.order_fees, &tier);
            let reward = strategy
                .settlement_reward
                .add(engine.ledger.keeper_costs.settlement_cost);
            engine.check_order_margin(account_id, market_id, commitment.size_delta, fill_price, fees.total().add(reward))?;

            if strategy.strategy_type == SettlementStrategyType::Synchronous {
                if !within_acceptable_price(commitment.size_delta, fill_price, commitment.acceptable_price) {
                    return Err(EngineError::AcceptablePriceExceeded {
                        fill_price,
                        acceptable_price: commitment.acceptable_price,
                    });
                }
                let result = engine.settle_position(&SettleRequest {
                    account_id,
                    market_id,
                    size_delta: commitment.size_delta,
                    fill_price,
                    oracle_price: price,
                    fees,
                    settlement_reward: reward,
                    referrer: commitment.referrer,
                    tracking_code: commitment.tracking_code,
                    settler: caller,
                })?;
                return Ok(CommitOutcome::Settled(result));
            }

            let order = AsyncOrder {
                account_id,
                market_id,
                size_delta: commitment.size_delta,
                settlement_strategy_id: commitment.settlement_strategy_id,
                acceptable_price: commitment.acceptable_price,
                tracking_code: commitment.tracking_code,
                referrer: commitment.referrer,
                commitment_time: now,
            };
            let (_, expiration_time) = strategy.settlement_window(now);
            engine.account_mut(account_id)?.pending_order = Some(order.clone());
            engine.emit_event(EventPayload::OrderCommitted(OrderCommittedEvent {
                market_id,
                account_id,
                size_delta: commitment.size_delta,
                settlement_strategy_id: commitment.settlement_strategy_id,
                acceptable_price: commitment.acceptable_price,
                commitment_time: now,
                expiration_time,
                tracking_code: commitment.tracking_code,
                sender: caller,
            }));
            Ok(CommitOutcome::Pending(order))
        })
    }

    // keeper settles a committed order against the verified price
    pub fn settle_order(&mut self, keeper: Address, account_id: AccountId) -> Result<SettlementResult, EngineError> {
        self.atomically("settle_order", |engine| {
            let now = engine.current_time;
            let order = engine
                .account(account_id)?
                .pending_order
                .clone()
                .ok_or(EngineError::NoPendingOrder(account_id))?;
            let market_id = order.market_id;
            let strategy = engine.enabled_strategy(market_id, order.settlement_strategy_id)?;
            engine.ensure_open(market_id)?;

            let (start, end) = strategy.settlement_window(order.commitment_time);
            match strategy.window_status(order.commitment_time, now) {
                WindowStatus::NotOpen => return Err(EngineError::SettlementWindowNotOpen { now, start, end }),
                WindowStatus::Expired => return Err(EngineError::SettlementWindowExpired { now, end }),
                WindowStatus::Open => {}
            }

            let price = engine.settlement_price(market_id, strategy.price_feed, strategy.price_time(order.commitment_time))?;
            let market = engine.market(market_id)?;
            let fill_price = calculate_fill_price(market.skew, market.config.funding.skew_scale, order.size_delta, price);
            if !within_acceptable_price(order.size_delta, fill_price, order.acceptable_price) {
                return Err(EngineError::AcceptablePriceExceeded {
                    fill_price,
                    acceptable_price: order.acceptable_price,
                });
            }
            let tier = engine.fee_tier_of(account_id)?;
            let fees = calculate_order_fees(market.skew, order.size_delta, fill_price, &market.config.order_fees, &tier);
            let reward = strategy
                .settlement_reward
                .add(engine.ledger.keeper_costs.settlement_cost);
            engine.check_order_margin(account_id, market_id, order.size_delta, fill_price, fees.total().add(reward))?;

            engine.account_mut(account_id)?.pending_order = None;
            engine.settle_position(&SettleRequest {
                account_id,
                market_id,
                size_delta: order.size_delta,
                fill_price,
                oracle_price: price,
                fees,
                settlement_reward: reward,
                referrer: order.referrer,
                tracking_code: order.tracking_code,
                settler: keeper,
            })
        })
    }

    // clears a committed order nobody settled in time
    pub fn cancel_expired_order(&mut self, _caller: Address, account_id: AccountId) -> Result<(), EngineError> {
        self.atomically("cancel_expired_order", |engine| {
            let now = engine.current_time;
            let order = engine
                .account(account_id)?
                .pending_order
                .clone()
                .ok_or(EngineError::NoPendingOrder(account_id))?;
            let strategy = engine.market(order.market_id)?.strategy(order.settlement_strategy_id).cloned();
            if let Some(strategy) = strategy {
                let (_, end) = strategy.settlement_window(order.commitment_time);
                if strategy.window_status(order.commitment_time, now) != WindowStatus::Expired {
                    return Err(EngineError::SettlementWindowNotExpired { now, end });
                }
            }
            engine.expire_pending_order(account_id, order)
        })
    }

    fn expire_pending_order(&mut self, account_id: AccountId, order: AsyncOrder) -> Result<(), EngineError> {
        self.account_mut(account_id)?.pending_order = None;
        self.emit_event(EventPayload::PreviousOrderExpired {
            account_id,
            market_id: order.market_id,
            size_delta: order.size_delta,
            acceptable_price: order.acceptable_price,
            commitment_time: order.commitment_time,
            tracking_code: order.tracking_code,
        });
        Ok(())
    }

    pub fn nonce_state(&self, account_id: AccountId, nonce: u64) -> NonceState {
        self.ledger.nonces.state(account_id, nonce)
    }
}
