//! Perps settlement engine simulation.
//!
//! Walks the engine through its main flows: fee tiers, signed async orders,
//! matched limit orders with partial fills, rollover interest, market closure
//! and liquidation, and collateral time locks.

use perps_settle::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{error, info, warn};

const ETH: MarketId = MarketId(100);
const ETH_FEED: FeedId = FeedId(100);
const START: i64 = 1_700_000_000;

type Scenario = fn() -> Result<(), EngineError>;

fn main() {
    tracing_subscriber::fmt::init();
    info!("perps settlement engine simulation");

    let scenarios: [(&str, Scenario); 6] = [
        ("fee tiers", scenario_1_fee_tiers),
        ("signed async order", scenario_2_async_order),
        ("matched limit orders", scenario_3_limit_orders),
        ("rollover interest", scenario_4_rollover),
        ("market closure and liquidation", scenario_5_closure_and_liquidation),
        ("collateral time lock", scenario_6_collateral_lock),
    ];
    for (name, run) in scenarios {
        info!(scenario = name, "start");
        if let Err(err) = run() {
            error!(scenario = name, error = %err, "scenario failed");
            std::process::exit(1);
        }
    }
    info!("all simulations completed");
}

fn px(value: Decimal) -> Price {
    Price::new_unchecked(value)
}

fn bootstrap() -> Result<Engine, EngineError> {
    let mut engine = Engine::from_config(EngineConfig::default(), &ProtocolConfig::default())?;
    engine.set_time(Timestamp::from_secs(START));
    set_eth_price(&mut engine, dec!(2000));
    Ok(engine)
}

fn set_eth_price(engine: &mut Engine, price: Decimal) {
    let now = engine.time();
    engine.price_source_mut().set_current_price(ETH_FEED, px(price), now);
}

fn funded_account(engine: &mut Engine, owner: Address, usd: Decimal) -> Result<AccountId, EngineError> {
    let id = engine.create_account(owner);
    engine.modify_collateral(owner, id, CollateralId::USD, usd)?;
    Ok(id)
}

// settles on commit through a synchronous strategy
fn market_trade(engine: &mut Engine, strategy_id: u32, owner: Address, account_id: AccountId, size: Decimal) -> Result<SettlementResult, EngineError> {
    let acceptable = if size > Decimal::ZERO { px(dec!(1_000_000)) } else { px(dec!(0.000001)) };
    let outcome = engine.commit_order(
        owner,
        &OrderCommitment {
            account_id,
            market_id: ETH,
            size_delta: size,
            settlement_strategy_id: strategy_id,
            acceptable_price: acceptable,
            tracking_code: TrackingCode::from_text("perps-sim"),
            referrer: Address::ZERO,
        },
    )?;
    match outcome {
        CommitOutcome::Settled(result) => Ok(result),
        CommitOutcome::Pending(_) => Err(EngineError::InvalidSettlementStrategy {
            market: ETH,
            strategy_id,
        }),
    }
}

/// Tier discounts on the same order.
fn scenario_1_fee_tiers() -> Result<(), EngineError> {
    let mut engine = bootstrap()?;
    let owner = engine.owner();

    for (label, tier) in [("tier-0", 0), ("tier-1", 1), ("tier-2", 2)] {
        let trader = Address::from_label(label);
        let id = funded_account(&mut engine, trader, dec!(10000))?;
        if tier != 0 {
            engine.update_fee_tier(owner, id, tier, engine.time(), None)?;
        }
        let (fees, fill) = engine.compute_order_fees(id, ETH, dec!(5))?;
        let (maker, taker) = engine.get_fee_tier(tier);
        info!(tier, maker_discount = maker, taker_discount = taker, fill = %fill, fee = %fees.total(), "5 ETH taker order");
    }
    Ok(())
}

/// A trader signs an order, a keeper settles it inside the window.
fn scenario_2_async_order() -> Result<(), EngineError> {
    let mut engine = bootstrap()?;
    let signer = OrderSigner::from_seed([1; 32]);
    let keeper = Address::from_label("keeper");
    let id = funded_account(&mut engine, signer.address(), dec!(5000))?;

    let order = OffchainOrder {
        market_id: ETH,
        account_id: id,
        size_delta: dec!(2),
        settlement_strategy_id: 0,
        referrer_or_relayer: Address::ZERO,
        allow_aggregation: false,
        allow_partial_matching: false,
        acceptable_price: px(dec!(2010)),
        tracking_code: TrackingCode::from_text("perps-sim"),
        expiration: engine.time().plus(3600),
        nonce: 1,
        timestamp: engine.time(),
    };
    let signature = signer.sign(engine.domain(), &order)?;

    engine.advance_time(5);
    let result = engine.settle_offchain_async_order(keeper, &order, &signature)?;
    info!(fill = %result.fill_price, size = %result.new_size, fees = %result.fees.total(), "async order settled");

    match engine.settle_offchain_async_order(keeper, &order, &signature) {
        Err(err) => info!(error = %err, "replay rejected"),
        Ok(_) => warn!("replay was accepted"),
    }
    info!(state = ?engine.nonce_state(id, 1), "nonce state");
    Ok(())
}

/// A maker short is filled by two taker longs through the same relayer.
fn scenario_3_limit_orders() -> Result<(), EngineError> {
    let mut engine = bootstrap()?;
    let owner = engine.owner();
    let relayer = Address::from_label("relayer");
    engine.update_relayer_share(owner, relayer, dec!(0.2))?;

    let maker = OrderSigner::from_seed([2; 32]);
    let taker = OrderSigner::from_seed([3; 32]);
    let maker_id = funded_account(&mut engine, maker.address(), dec!(20000))?;
    let taker_id = funded_account(&mut engine, taker.address(), dec!(20000))?;

    let expiration = engine.time().plus(3600);
    let short = LimitOrder {
        account_id: maker_id,
        market_id: ETH,
        relayer,
        amount: dec!(-3),
        price: px(dec!(1999)),
        limit_order_maker: true,
        expiration,
        nonce: 10,
        tracking_code: TrackingCode::NONE,
        allow_partial_matching: true,
    };
    let short_sig = maker.sign(engine.domain(), &short)?;

    for (nonce, amount) in [(20, dec!(1)), (21, dec!(2))] {
        let long = LimitOrder {
            account_id: taker_id,
            market_id: ETH,
            relayer,
            amount,
            price: px(dec!(2001)),
            limit_order_maker: false,
            expiration,
            nonce,
            tracking_code: TrackingCode::NONE,
            allow_partial_matching: false,
        };
        let long_sig = taker.sign(engine.domain(), &long)?;
        let matched = engine.settle_offchain_limit_order(relayer, &short, &short_sig, &long, &long_sig)?;
        info!(
            fill = %matched.fill_amount,
            price = %matched.price,
            short_state = ?matched.short_state,
            relayer_fees = %matched.short.referral_fees.add(matched.long.referral_fees),
            "limit orders matched"
        );
    }
    info!(relayer_payout = %engine.payout(relayer), skew = %engine.market_summary(ETH)?.skew, "after matching");
    Ok(())
}

/// Interest accrues on a held position and is realized when it closes.
fn scenario_4_rollover() -> Result<(), EngineError> {
    let mut engine = bootstrap()?;
    let owner = engine.owner();
    engine.set_rollover_fee(owner, ETH, dec!(0.000000003170979198))?;
    let sync = engine.add_settlement_strategy(owner, ETH, SettlementStrategy::synchronous(ETH_FEED))?;

    let trader = Address::from_label("holder");
    let id = funded_account(&mut engine, trader, dec!(50000))?;
    market_trade(&mut engine, sync, trader, id, dec!(10))?;

    engine.advance_time(30 * 86_400);
    set_eth_price(&mut engine, dec!(2000));
    let owed = engine.get_open_position(id, ETH)?.owed_interest;
    info!(owed = %owed, "interest owed after 30 days");

    let result = market_trade(&mut engine, sync, trader, id, dec!(-10))?;
    info!(
        interest = %result.realized.interest,
        rollover_revenue = %engine.market_summary(ETH)?.rollover_revenue,
        "position closed"
    );
    Ok(())
}

/// Funding and interest pause accounting while closed, then a price drop
/// after reopening leaves the trader liquidatable.
fn scenario_5_closure_and_liquidation() -> Result<(), EngineError> {
    let mut engine = bootstrap()?;
    let owner = engine.owner();
    let sync = engine.add_settlement_strategy(owner, ETH, SettlementStrategy::synchronous(ETH_FEED))?;
    let keeper = Address::from_label("keeper");

    let trader = Address::from_label("levered");
    let id = funded_account(&mut engine, trader, dec!(400))?;
    market_trade(&mut engine, sync, trader, id, dec!(10))?;
    info!(available = %engine.get_available_margin(id)?, "levered long opened");

    engine.close_markets(owner, &[ETH])?;
    engine.advance_time(86_400);
    info!(close_price = ?engine.get_close_price(ETH)?, "market closed for a day");

    set_eth_price(&mut engine, dec!(1950));
    engine.open_markets(owner, &[ETH])?;
    info!(
        available = %engine.get_available_margin(id)?,
        status = ?engine.liquidation_status(id)?,
        "market reopened lower"
    );

    if engine.can_liquidate(id)? {
        let result = engine.liquidate(keeper, id)?;
        info!(
            seized = %result.seized,
            reward = %result.keeper_reward,
            pool = %engine.liquidation_pool().balance,
            bad_debt = %engine.liquidation_pool().bad_debt,
            "account liquidated"
        );
    }
    Ok(())
}

/// Locked collateral earns a boost and stays put until expiry.
fn scenario_6_collateral_lock() -> Result<(), EngineError> {
    let mut engine = bootstrap()?;
    let saver = Address::from_label("saver");
    let id = funded_account(&mut engine, saver, dec!(1000))?;

    let lock_id = engine.lock_collateral(saver, id, CollateralId::USD, dec!(500), 90 * DAY)?;
    let summary = engine.get_collateral_summary(id, CollateralId::USD)?;
    info!(locked = %summary.time_locked, boosted = %summary.boosted, available = %summary.available, "collateral locked");
    if let Some(lock) = engine.get_lock_info(lock_id) {
        info!(unlocks_at = %lock.unlock_time.to_rfc3339(), "lock expiry");
    }

    if let Err(err) = engine.unlock_collateral(saver, lock_id) {
        info!(error = %err, "early unlock rejected");
    }
    engine.advance_time(90 * DAY);
    let lock = engine.unlock_collateral(saver, lock_id)?;
    info!(amount = %lock.amount, boost_bps = lock.boost_bps, "collateral unlocked");
    Ok(())
}
