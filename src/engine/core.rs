// 8.0 engine/core.rs: main engine. holds the ledger, the injected price source and
// signature verifier, the event log and the clock.

use super::config::EngineConfig;
use super::results::EngineError;
use crate::account::{Account, Permission};
use crate::collateral::{CollateralConfig, LockBook};
use crate::config::ProtocolConfig;
use crate::events::{Event, EventId, EventPayload};
use crate::fees::{FeeTier, KeeperCosts};
use crate::liquidation::LiquidationPool;
use crate::market::{MarketConfig, MarketError, MarketState};
use crate::order::NonceBook;
use crate::price_feed::{OraclePrices, PriceSource};
use crate::signing::{Ed25519Verifier, Eip712Domain, SignatureVerifier};
use crate::types::{AccountId, Address, CollateralId, MarketId, Quote, Timestamp};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// 8.1: all mutable protocol state. cloned before every operation so a failure
/// can put it back untouched.
#[derive(Debug, Clone)]
pub struct Ledger {
    pub markets: BTreeMap<MarketId, MarketState>,
    pub accounts: BTreeMap<AccountId, Account>,
    pub collateral_types: BTreeMap<CollateralId, CollateralConfig>,
    pub locks: LockBook,
    pub nonces: NonceBook,
    pub fee_tiers: BTreeMap<u32, FeeTier>,
    pub fee_tier_updater: Option<Address>,
    // referrers and relayers share one registry. a nonzero share authorizes a relayer.
    pub referrer_shares: BTreeMap<Address, Decimal>,
    pub fee_collector: Option<Address>,
    pub keeper_costs: KeeperCosts,
    // fees, rewards and relayer shares owed to addresses
    pub payouts: BTreeMap<Address, Quote>,
    // fees kept when no collector is set
    pub protocol_revenue: Quote,
    pub liquidation_pool: LiquidationPool,
    pub next_account_id: u64,
}

impl Ledger {
    pub fn new() -> Self {
        let mut collateral_types = BTreeMap::new();
        collateral_types.insert(CollateralId::USD, CollateralConfig::usd());
        Self {
            markets: BTreeMap::new(),
            accounts: BTreeMap::new(),
            collateral_types,
            locks: LockBook::new(),
            nonces: NonceBook::new(),
            fee_tiers: BTreeMap::new(),
            fee_tier_updater: None,
            referrer_shares: BTreeMap::new(),
            fee_collector: None,
            keeper_costs: KeeperCosts::default(),
            payouts: BTreeMap::new(),
            protocol_revenue: Quote::zero(),
            liquidation_pool: LiquidationPool::new(),
            next_account_id: 1,
        }
    }

    pub(super) fn credit(&mut self, to: Address, amount: Quote) {
        if amount.is_zero() {
            return;
        }
        let balance = self.payouts.entry(to).or_insert_with(Quote::zero);
        *balance = balance.add(amount);
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct Engine<P: PriceSource = OraclePrices> {
    pub(super) config: EngineConfig,
    pub(super) ledger: Ledger,
    pub(super) prices: P,
    pub(super) verifier: Box<dyn SignatureVerifier>,
    pub(super) domain: Eip712Domain,
    pub(super) events: Vec<Event>,
    // emitted by the running operation, published on commit
    pub(super) pending_events: Vec<Event>,
    pub(super) next_event_id: u64,
    pub(super) current_time: Timestamp,
}

impl Engine<OraclePrices> {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_price_source(config, OraclePrices::new())
    }

    // 8.2: bootstrap markets, strategies, tiers, collateral and shares from a protocol
    // config, going through the same owner operations an admin would call.
    pub fn from_config(config: EngineConfig, protocol: &ProtocolConfig) -> Result<Self, EngineError> {
        protocol.validate()?;
        let prices = match protocol.max_price_staleness_secs {
            Some(secs) => OraclePrices::new().with_max_staleness(secs),
            None => OraclePrices::new(),
        };
        let mut engine = Self::with_price_source(config, prices);
        let owner = engine.config.owner;

        for setup in &protocol.markets {
            let market_id = engine.add_market(owner, setup.market.clone())?;
            for strategy in &setup.strategies {
                engine.add_settlement_strategy(owner, market_id, strategy.clone())?;
            }
        }
        for (tier_id, tier) in &protocol.fee_tiers {
            engine.set_fee_tier(owner, *tier_id, tier.maker_discount.value(), tier.taker_discount.value())?;
        }
        for collateral in &protocol.collateral_types {
            engine.set_collateral_configuration(owner, collateral.clone())?;
        }
        for share in &protocol.referrer_shares {
            engine.update_referrer_share(owner, share.referrer, share.share_ratio)?;
        }
        engine.set_keeper_costs(owner, protocol.keeper_costs)?;
        if let Some(collector) = protocol.fee_collector {
            engine.set_fee_collector(owner, Some(collector))?;
        }
        if let Some(updater) = protocol.fee_tier_updater {
            engine.set_fee_tier_updater(owner, updater)?;
        }
        Ok(engine)
    }
}

impl<P: PriceSource> Engine<P> {
    pub fn with_price_source(config: EngineConfig, prices: P) -> Self {
        let domain = Eip712Domain::new(config.chain_id, config.contract_address);
        Self {
            config,
            ledger: Ledger::new(),
            prices,
            verifier: Box::new(Ed25519Verifier),
            domain,
            events: Vec::new(),
            pending_events: Vec::new(),
            next_event_id: 1,
            current_time: Timestamp::from_secs(0),
        }
    }

    pub fn with_verifier(mut self, verifier: Box<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn owner(&self) -> Address {
        self.config.owner
    }

    pub fn domain(&self) -> &Eip712Domain {
        &self.domain
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn prices(&self) -> &P {
        &self.prices
    }

    pub fn price_source_mut(&mut self) -> &mut P {
        &mut self.prices
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, secs: i64) {
        self.current_time = self.current_time.plus(secs);
    }

    // 8.3: run `op` as one transaction. on error the ledger and the event cursor are
    // restored, so nothing the operation did is observable.
    pub(super) fn atomically<T>(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&mut Self) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let snapshot = self.ledger.clone();
        let event_cursor = self.next_event_id;

        match f(self) {
            Ok(value) => {
                self.publish_events();
                Ok(value)
            }
            Err(err) => {
                self.ledger = snapshot;
                self.pending_events.clear();
                self.next_event_id = event_cursor;
                warn!(op, kind = ?err.kind(), error = %err, "operation rejected");
                Err(err)
            }
        }
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.next_event_id), self.current_time, payload);
        self.next_event_id += 1;
        self.pending_events.push(event);
    }

    fn publish_events(&mut self) {
        for event in self.pending_events.drain(..) {
            if self.config.verbose {
                info!(id = event.id.0, event = event.payload.name(), payload = ?event.payload, "event");
            } else {
                debug!(id = event.id.0, event = event.payload.name(), "event");
            }
            self.events.push(event);
        }

        if self.events.len() > self.config.max_events {
            let drain_count = self.events.len() - self.config.max_events;
            self.events.drain(0..drain_count);
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    // events with id strictly greater than `id`
    pub fn events_since(&self, id: EventId) -> &[Event] {
        let start = self.events.partition_point(|e| e.id <= id);
        &self.events[start..]
    }

    pub(super) fn ensure_owner(&self, caller: Address) -> Result<(), EngineError> {
        if caller != self.config.owner {
            return Err(EngineError::Unauthorized(caller));
        }
        Ok(())
    }

    pub(super) fn market(&self, market_id: MarketId) -> Result<&MarketState, EngineError> {
        self.ledger
            .markets
            .get(&market_id)
            .ok_or(EngineError::InvalidMarket(market_id))
    }

    pub(super) fn market_mut(&mut self, market_id: MarketId) -> Result<&mut MarketState, EngineError> {
        self.ledger
            .markets
            .get_mut(&market_id)
            .ok_or(EngineError::InvalidMarket(market_id))
    }

    pub(super) fn account(&self, account_id: AccountId) -> Result<&Account, EngineError> {
        self.ledger
            .accounts
            .get(&account_id)
            .ok_or(EngineError::AccountNotFound(account_id))
    }

    pub(super) fn account_mut(&mut self, account_id: AccountId) -> Result<&mut Account, EngineError> {
        self.ledger
            .accounts
            .get_mut(&account_id)
            .ok_or(EngineError::AccountNotFound(account_id))
    }

    // owner of the account or an explicit holder of `permission`
    pub(super) fn ensure_permission(
        &self,
        account_id: AccountId,
        permission: Permission,
        caller: Address,
    ) -> Result<(), EngineError> {
        if !self.account(account_id)?.is_authorized(permission, caller) {
            return Err(EngineError::PermissionDenied {
                account: account_id,
                permission,
                caller,
            });
        }
        Ok(())
    }

    pub fn add_market(&mut self, caller: Address, config: MarketConfig) -> Result<MarketId, EngineError> {
        self.atomically("add_market", |engine| {
            engine.ensure_owner(caller)?;
            config.validate()?;
            let market_id = config.id;
            if engine.ledger.markets.contains_key(&market_id) {
                return Err(MarketError::AlreadyExists(market_id).into());
            }
            info!(market = market_id.0, symbol = %config.symbol, "market added");
            let state = MarketState::new(config, engine.current_time);
            engine.ledger.markets.insert(market_id, state);
            Ok(market_id)
        })
    }

    pub fn get_market(&self, market_id: MarketId) -> Option<&MarketState> {
        self.ledger.markets.get(&market_id)
    }

    pub fn markets(&self) -> impl Iterator<Item = &MarketState> {
        self.ledger.markets.values()
    }

    // sequential ids starting at 1
    pub fn create_account(&mut self, owner: Address) -> AccountId {
        let id = AccountId(self.ledger.next_account_id);
        self.ledger.next_account_id += 1;
        self.ledger
            .accounts
            .insert(id, Account::new(id, owner, self.current_time));
        self.emit_event(EventPayload::AccountCreated { account_id: id, owner });
        self.publish_events();
        id
    }

    pub fn get_account(&self, account_id: AccountId) -> Option<&Account> {
        self.ledger.accounts.get(&account_id)
    }

    pub fn accounts_iter(&self) -> impl Iterator<Item = (&AccountId, &Account)> {
        self.ledger.accounts.iter()
    }

    pub fn grant_permission(
        &mut self,
        caller: Address,
        account_id: AccountId,
        permission: Permission,
        target: Address,
    ) -> Result<(), EngineError> {
        self.atomically("grant_permission", |engine| {
            let account = engine.account_mut(account_id)?;
            if account.owner != caller {
                return Err(EngineError::PermissionDenied {
                    account: account_id,
                    permission: Permission::Admin,
                    caller,
                });
            }
            account.grant(permission, target);
            engine.emit_event(EventPayload::PermissionGranted {
                account_id,
                permission,
                target,
                sender: caller,
            });
            Ok(())
        })
    }

    pub fn revoke_permission(
        &mut self,
        caller: Address,
        account_id: AccountId,
        permission: Permission,
        target: Address,
    ) -> Result<(), EngineError> {
        self.atomically("revoke_permission", |engine| {
            let account = engine.account_mut(account_id)?;
            if account.owner != caller {
                return Err(EngineError::PermissionDenied {
                    account: account_id,
                    permission: Permission::Admin,
                    caller,
                });
            }
            account.revoke(permission, target);
            engine.emit_event(EventPayload::PermissionRevoked {
                account_id,
                permission,
                target,
                sender: caller,
            });
            Ok(())
        })
    }

    pub fn has_permission(&self, account_id: AccountId, permission: Permission, who: Address) -> bool {
        self.get_account(account_id)
            .is_some_and(|account| account.is_authorized(permission, who))
    }

    pub fn payout(&self, to: Address) -> Quote {
        self.ledger.payouts.get(&to).copied().unwrap_or_else(Quote::zero)
    }

    pub fn protocol_revenue(&self) -> Quote {
        self.ledger.protocol_revenue
    }

    pub fn liquidation_pool(&self) -> &LiquidationPool {
        &self.ledger.liquidation_pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventPayload;

    fn owner() -> Address {
        EngineConfig::default().owner
    }

    #[test]
    fn accounts_are_sequential() {
        let mut engine = Engine::new(EngineConfig::default());
        let a = engine.create_account(Address::from_label("alice"));
        let b = engine.create_account(Address::from_label("bob"));
        assert_eq!(a, AccountId(1));
        assert_eq!(b, AccountId(2));
        assert_eq!(engine.events().len(), 2);
        assert_eq!(engine.events()[1].id, EventId(2));
    }

    #[test]
    fn only_owner_adds_markets() {
        let mut engine = Engine::new(EngineConfig::default());
        let stranger = Address::from_label("stranger");
        assert_eq!(
            engine.add_market(stranger, MarketConfig::eth_perp()),
            Err(EngineError::Unauthorized(stranger))
        );
        assert!(engine.add_market(owner(), MarketConfig::eth_perp()).is_ok());
        assert_eq!(
            engine.add_market(owner(), MarketConfig::eth_perp()),
            Err(EngineError::Market(MarketError::AlreadyExists(MarketId(100))))
        );
    }

    #[test]
    fn failed_operation_leaves_no_trace() {
        let mut engine = Engine::new(EngineConfig::default());
        let alice = Address::from_label("alice");
        let id = engine.create_account(alice);
        let before = engine.events().len();

        let result = engine.atomically("test", |e| {
            e.account_mut(id)?.deposit(CollateralId::USD, Decimal::ONE_HUNDRED);
            e.emit_event(EventPayload::FeeTierUpdated { account_id: id, tier_id: 1 });
            Err::<(), _>(EngineError::ZeroSizeOrder)
        });

        assert_eq!(result, Err(EngineError::ZeroSizeOrder));
        assert!(engine.get_account(id).unwrap().collateral_amount(CollateralId::USD).is_zero());
        assert_eq!(engine.events().len(), before);
        // the failed event id is reused by the next commit
        engine.create_account(alice);
        assert_eq!(engine.events().last().unwrap().id, EventId(before as u64 + 1));
    }

    #[test]
    fn event_log_is_capped() {
        let config = EngineConfig {
            max_events: 3,
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(config);
        for i in 0..5 {
            engine.create_account(Address::from_label(&format!("user{i}")));
        }
        assert_eq!(engine.events().len(), 3);
        assert_eq!(engine.events()[0].id, EventId(3));
        assert_eq!(engine.events_since(EventId(4)).len(), 1);
        assert_eq!(engine.recent_events(2).len(), 2);
    }

    #[test]
    fn permissions_granted_by_owner_only() {
        let mut engine = Engine::new(EngineConfig::default());
        let alice = Address::from_label("alice");
        let bot = Address::from_label("bot");
        let id = engine.create_account(alice);

        assert!(matches!(
            engine.grant_permission(bot, id, Permission::Withdraw, bot),
            Err(EngineError::PermissionDenied { .. })
        ));
        engine.grant_permission(alice, id, Permission::Withdraw, bot).unwrap();
        assert!(engine.has_permission(id, Permission::Withdraw, bot));
        engine.revoke_permission(alice, id, Permission::Withdraw, bot).unwrap();
        assert!(!engine.has_permission(id, Permission::Withdraw, bot));
    }
}
