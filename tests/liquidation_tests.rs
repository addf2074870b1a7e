//! Liquidation and keeper close tests.

use perps_settle::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const ETH: MarketId = MarketId(100);
const ETH_FEED: FeedId = FeedId(100);
const T0: i64 = 1_000_000;

fn setup() -> (Engine, u32) {
    let mut engine = Engine::new(EngineConfig::default());
    let owner = engine.owner();
    engine.add_market(owner, MarketConfig::eth_perp()).unwrap();
    let sync = engine
        .add_settlement_strategy(owner, ETH, SettlementStrategy::synchronous(ETH_FEED))
        .unwrap();
    engine.set_time(Timestamp::from_secs(T0));
    set_price(&mut engine, dec!(2000));
    (engine, sync)
}

fn set_price(engine: &mut Engine, price: Decimal) {
    let now = engine.time();
    engine
        .price_source_mut()
        .set_current_price(ETH_FEED, Price::new_unchecked(price), now);
}

fn last_market_update(engine: &Engine) -> MarketUpdatedEvent {
    engine
        .events()
        .iter()
        .rev()
        .find_map(|e| match &e.payload {
            EventPayload::MarketUpdated(ev) => Some(ev.clone()),
            _ => None,
        })
        .unwrap()
}

fn require_min_margin(engine: &mut Engine, usd: Decimal) {
    let owner = engine.owner();
    let params = LiquidationParameters {
        minimum_position_margin: Quote::new(usd),
        ..engine.get_liquidation_parameters(ETH).unwrap()
    };
    engine.set_liquidation_parameters(owner, ETH, params).unwrap();
}

// 10 ETH long at 2000.01 on `usd` of collateral
fn levered_long(engine: &mut Engine, sync: u32, label: &str, usd: Decimal) -> AccountId {
    let trader = Address::from_label(label);
    let id = engine.create_account(trader);
    engine.modify_collateral(trader, id, CollateralId::USD, usd).unwrap();
    let outcome = engine
        .commit_order(
            trader,
            &OrderCommitment {
                account_id: id,
                market_id: ETH,
                size_delta: dec!(10),
                settlement_strategy_id: sync,
                acceptable_price: Price::new_unchecked(dec!(2100)),
                tracking_code: TrackingCode::NONE,
                referrer: Address::ZERO,
            },
        )
        .unwrap();
    assert!(matches!(outcome, CommitOutcome::Settled(_)));
    id
}

#[test]
fn healthy_account_is_not_liquidatable() {
    let (mut engine, sync) = setup();
    let id = levered_long(&mut engine, sync, "trader", dec!(400));
    // 400 - 16.00008 fees - 0.1 pnl against 100.2 maintenance + 2 reward
    assert_eq!(
        engine.liquidation_status(id).unwrap(),
        LiquidationStatus::Healthy { buffer: Quote::new(dec!(281.69992)) }
    );
    assert!(!engine.can_liquidate(id).unwrap());
    assert_eq!(
        engine.liquidate(Address::from_label("keeper"), id),
        Err(EngineError::NotEligibleForLiquidation(id))
    );
}

#[test]
fn price_drop_triggers_liquidation() {
    let (mut engine, sync) = setup();
    let id = levered_long(&mut engine, sync, "trader", dec!(400));
    let keeper = Address::from_label("keeper");
    set_price(&mut engine, dec!(1970));
    assert!(engine.can_liquidate(id).unwrap());

    let result = engine.liquidate(keeper, id).unwrap();
    assert_eq!(result.closed_positions, vec![(ETH, dec!(10))]);
    // closed at 1970 * (1 + 5/1e6): 383.99992 - 300.0015
    assert_eq!(result.seized.value(), dec!(83.99842));
    // flag reward on 19700 notional
    assert_eq!(result.keeper_reward.value(), dec!(1.97));
    assert!(result.full_liquidation);

    assert_eq!(engine.payout(keeper).value(), dec!(1.97));
    let pool = engine.liquidation_pool();
    assert_eq!(pool.balance.value(), dec!(82.02842));
    assert!(pool.bad_debt.is_zero());

    let account = engine.get_account(id).unwrap();
    assert!(account.positions.is_empty());
    assert!(account.collateral.is_empty());
    let summary = engine.market_summary(ETH).unwrap();
    assert_eq!(summary.skew, Decimal::ZERO);
    assert_eq!(summary.size, Decimal::ZERO);

    let names: Vec<&str> = engine.recent_events(2).iter().map(|e| e.payload.name()).collect();
    assert_eq!(names, vec!["PositionLiquidated", "AccountLiquidationAttempt"]);
    assert!(!engine.can_liquidate(id).unwrap());
}

#[test]
fn losses_beyond_collateral_become_bad_debt() {
    let (mut engine, sync) = setup();
    let id = levered_long(&mut engine, sync, "trader", dec!(400));
    let keeper = Address::from_label("keeper");
    set_price(&mut engine, dec!(1900));

    let result = engine.liquidate(keeper, id).unwrap();
    // 383.99992 - 10 * (2000.01 - 1900.0095)
    assert_eq!(result.seized.value(), dec!(-616.00508));
    assert!(result.keeper_reward.is_zero());
    assert!(engine.payout(keeper).is_zero());
    assert_eq!(engine.liquidation_pool().bad_debt.value(), dec!(616.00508));
}

#[test]
fn keeper_costs_raise_the_threshold() {
    let (mut engine, sync) = setup();
    let owner = engine.owner();
    let id = levered_long(&mut engine, sync, "trader", dec!(400));
    assert!(!engine.can_liquidate(id).unwrap());

    engine
        .set_keeper_costs(
            owner,
            KeeperCosts {
                settlement_cost: Quote::zero(),
                flag_cost: Quote::new(dec!(150)),
                liquidate_cost: Quote::new(dec!(150)),
            },
        )
        .unwrap();
    assert!(engine.can_liquidate(id).unwrap());
}

#[test]
fn minimum_position_margin_forces_liquidation() {
    let (mut engine, sync) = setup();
    let owner = engine.owner();
    let id = levered_long(&mut engine, sync, "trader", dec!(400));

    let params = LiquidationParameters {
        minimum_position_margin: Quote::new(dec!(1000)),
        ..engine.get_liquidation_parameters(ETH).unwrap()
    };
    engine.set_liquidation_parameters(owner, ETH, params).unwrap();
    assert!(engine.can_liquidate(id).unwrap());
    assert!(engine.liquidate(Address::from_label("keeper"), id).is_ok());
}

#[test]
fn liquidation_clears_pending_order() {
    let (mut engine, sync) = setup();
    let owner = engine.owner();
    let delayed = engine
        .add_settlement_strategy(owner, ETH, SettlementStrategy::delayed(ETH_FEED, 5, 60))
        .unwrap();
    let id = levered_long(&mut engine, sync, "trader", dec!(400));
    let trader = Address::from_label("trader");
    engine
        .commit_order(
            trader,
            &OrderCommitment {
                account_id: id,
                market_id: ETH,
                size_delta: dec!(-1),
                settlement_strategy_id: delayed,
                acceptable_price: Price::new_unchecked(dec!(1)),
                tracking_code: TrackingCode::NONE,
                referrer: Address::ZERO,
            },
        )
        .unwrap();

    set_price(&mut engine, dec!(1970));
    engine.liquidate(Address::from_label("keeper"), id).unwrap();
    assert!(engine.get_account(id).unwrap().pending_order.is_none());
}

#[test]
fn registered_keeper_closes_a_position() {
    let (mut engine, sync) = setup();
    let owner = engine.owner();
    let id = levered_long(&mut engine, sync, "trader", dec!(5000));
    let keeper = Address::from_label("keeper");

    assert_eq!(
        engine.close_position(keeper, id, ETH),
        Err(EngineError::UnauthorizedKeeper(keeper))
    );
    engine.update_relayer_share(owner, keeper, dec!(0.1)).unwrap();

    let closed = engine.close_position(keeper, id, ETH).unwrap();
    assert_eq!(closed, dec!(10));
    assert_eq!(engine.get_open_position_size(id, ETH).unwrap(), Decimal::ZERO);
    assert!(engine.get_account(id).unwrap().get_position(ETH).is_none());
    assert_eq!(
        engine.close_position(keeper, id, ETH),
        Err(EngineError::NoOpenPosition { account: id, market: ETH })
    );
}

#[test]
fn owner_closes_positions_on_a_closed_market() {
    let (mut engine, sync) = setup();
    let owner = engine.owner();
    let id = levered_long(&mut engine, sync, "trader", dec!(5000));
    engine.close_markets(owner, &[ETH]).unwrap();
    set_price(&mut engine, dec!(2500));

    let before = engine.get_collateral_amount(id, CollateralId::USD).unwrap();
    engine.close_position(owner, id, ETH).unwrap();
    let after = engine.get_collateral_amount(id, CollateralId::USD).unwrap();
    // settled at the 2000 close price, not the live 2500
    assert!(after - before < dec!(1));
    assert_eq!(engine.market_summary(ETH).unwrap().skew, Decimal::ZERO);
}

#[test]
fn closed_market_liquidates_at_close_price_then_reopens_live() {
    let (mut engine, sync) = setup();
    let owner = engine.owner();
    let keeper = Address::from_label("keeper");
    let defaults = engine.get_liquidation_parameters(ETH).unwrap();
    let first = levered_long(&mut engine, sync, "first", dec!(400));

    engine.close_markets(owner, &[ETH]).unwrap();
    set_price(&mut engine, dec!(777));
    require_min_margin(&mut engine, dec!(1000));

    engine.liquidate(keeper, first).unwrap();
    // the oracle moved but the closed market still marks at 2000
    assert_eq!(last_market_update(&engine).price, Price::new_unchecked(dec!(2000)));
    assert_eq!(engine.market_summary(ETH).unwrap().skew, Decimal::ZERO);

    engine.open_markets(owner, &[ETH]).unwrap();
    engine.set_liquidation_parameters(owner, ETH, defaults).unwrap();
    let second = levered_long(&mut engine, sync, "second", dec!(400));
    assert_eq!(
        engine.get_account(second).unwrap().get_position(ETH).unwrap().entry_price,
        Price::new_unchecked(dec!(777.003885))
    );

    require_min_margin(&mut engine, dec!(1000));
    engine.liquidate(keeper, second).unwrap();
    assert_eq!(last_market_update(&engine).price, Price::new_unchecked(dec!(777)));
}
