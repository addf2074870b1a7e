//! Collateral deposits, withdrawals and time locks.

use super::core::Engine;
use super::results::EngineError;
use crate::account::{Account, Permission};
use crate::collateral::{lock_boost, CollateralLock, CollateralSummary, LockError, LockId};
use crate::d18::mul_decimal;
use crate::events::{CollateralTimeLockedEvent, EventPayload};
use crate::price_feed::PriceSource;
use crate::types::{AccountId, Address, CollateralId, Quote};
use rust_decimal::Decimal;
use tracing::debug;

impl<P: PriceSource> Engine<P> {
    fn ensure_collateral_type(&self, collateral_id: CollateralId) -> Result<(), EngineError> {
        if !self.ledger.collateral_types.contains_key(&collateral_id) {
            return Err(EngineError::InvalidCollateral(collateral_id));
        }
        Ok(())
    }

    fn unlocked_amount(&self, account: &Account, collateral_id: CollateralId) -> Decimal {
        account.collateral_amount(collateral_id) - self.ledger.locks.locked_amount(account.id, collateral_id)
    }

    // positive deposits, negative withdraws
    pub fn modify_collateral(
        &mut self,
        caller: Address,
        account_id: AccountId,
        collateral_id: CollateralId,
        amount_delta: Decimal,
    ) -> Result<(), EngineError> {
        self.atomically("modify_collateral", |engine| {
            engine.account(account_id)?;
            engine.ensure_collateral_type(collateral_id)?;
            if amount_delta.is_zero() {
                return Err(EngineError::InvalidParameter {
                    name: "amount_delta",
                    reason: "must be nonzero".to_string(),
                });
            }

            if amount_delta.is_sign_positive() {
                engine.account_mut(account_id)?.deposit(collateral_id, amount_delta);
            } else {
                engine.ensure_permission(account_id, Permission::Withdraw, caller)?;
                let unlocked = engine.unlocked_amount(engine.account(account_id)?, collateral_id);
                engine
                    .account_mut(account_id)?
                    .withdraw(collateral_id, amount_delta.abs(), unlocked)?;

                let account = engine.account(account_id)?;
                if account.has_open_positions() {
                    let available = engine.available_margin(account)?;
                    let required = engine.required_margins_with(account, None)?.initial;
                    if available < required {
                        return Err(EngineError::InsufficientMargin { available, required });
                    }
                }
            }

            debug!(account = account_id.0, collateral = collateral_id.0, %amount_delta, "collateral modified");
            engine.emit_event(EventPayload::CollateralModified {
                account_id,
                collateral_id,
                amount_delta,
                sender: caller,
            });
            Ok(())
        })
    }

    // 9.1: lock part of the unlocked balance for a fixed term
    pub fn lock_collateral(
        &mut self,
        caller: Address,
        account_id: AccountId,
        collateral_id: CollateralId,
        amount: Decimal,
        duration: i64,
    ) -> Result<LockId, EngineError> {
        self.atomically("lock_collateral", |engine| {
            engine.ensure_permission(account_id, Permission::Admin, caller)?;
            engine.ensure_collateral_type(collateral_id)?;
            let boost_bps = lock_boost(duration).ok_or(LockError::InvalidLockDuration(duration))?;
            if amount <= Decimal::ZERO {
                return Err(EngineError::InvalidParameter {
                    name: "amount",
                    reason: "must be positive".to_string(),
                });
            }
            if amount > engine.unlocked_amount(engine.account(account_id)?, collateral_id) {
                return Err(EngineError::InsufficientCollateralForLock {
                    account: account_id,
                    collateral: collateral_id,
                    amount,
                });
            }

            let now = engine.current_time;
            let lock_id = engine
                .ledger
                .locks
                .lock(account_id, collateral_id, amount, duration, now)?
                .id;
            debug!(account = account_id.0, lock = lock_id.0, %amount, duration, "collateral locked");
            engine.emit_event(EventPayload::CollateralTimeLocked(CollateralTimeLockedEvent {
                account_id,
                collateral_id,
                amount,
                duration,
                lock_id,
                boost_bps,
            }));
            Ok(lock_id)
        })
    }

    pub fn unlock_collateral(&mut self, caller: Address, lock_id: LockId) -> Result<CollateralLock, EngineError> {
        self.atomically("unlock_collateral", |engine| {
            let account_id = engine
                .ledger
                .locks
                .get(lock_id)
                .filter(|l| !l.unlocked)
                .map(|l| l.account_id)
                .ok_or(LockError::InvalidLockId(lock_id))?;
            engine.ensure_permission(account_id, Permission::Admin, caller)?;

            let now = engine.current_time;
            let lock = engine.ledger.locks.unlock(lock_id, now)?;
            engine.emit_event(EventPayload::CollateralTimeUnlocked {
                account_id,
                collateral_id: lock.collateral_id,
                amount: lock.amount,
                lock_id,
            });
            Ok(lock)
        })
    }

    pub fn get_lock_info(&self, lock_id: LockId) -> Option<&CollateralLock> {
        self.ledger.locks.get(lock_id)
    }

    pub fn can_unlock(&self, lock_id: LockId) -> bool {
        self.ledger
            .locks
            .get(lock_id)
            .is_some_and(|l| l.can_unlock(self.current_time))
    }

    // seconds until unlock, 0 once expired
    pub fn get_remaining_lock_time(&self, lock_id: LockId) -> Option<i64> {
        self.ledger
            .locks
            .get(lock_id)
            .map(|l| l.remaining(self.current_time).max(0))
    }

    pub fn get_boosted_value(&self, lock_id: LockId) -> Option<Decimal> {
        self.ledger.locks.get(lock_id).map(|l| l.boosted_value())
    }

    pub fn get_active_locks(&self, account_id: AccountId) -> Vec<&CollateralLock> {
        self.ledger.locks.active_locks(account_id).collect()
    }

    pub fn get_collateral_summary(
        &self,
        account_id: AccountId,
        collateral_id: CollateralId,
    ) -> Result<CollateralSummary, EngineError> {
        let account = self.account(account_id)?;
        Ok(CollateralSummary {
            deposited: account.collateral_amount(collateral_id),
            available: self.unlocked_amount(account, collateral_id),
            time_locked: self.ledger.locks.locked_amount(account_id, collateral_id),
            boosted: self.ledger.locks.boosted_amount(account_id, collateral_id),
        })
    }

    pub fn get_collateral_amount(&self, account_id: AccountId, collateral_id: CollateralId) -> Result<Decimal, EngineError> {
        Ok(self.account(account_id)?.collateral_amount(collateral_id))
    }

    // every balance at oracle value, locked included
    pub fn total_collateral_value(&self, account_id: AccountId) -> Result<Quote, EngineError> {
        let account = self.account(account_id)?;
        let mut total = Quote::zero();
        for (collateral_id, amount) in &account.collateral {
            if amount.is_zero() {
                continue;
            }
            let price = self.collateral_price(*collateral_id)?;
            total = total.add(Quote::new(mul_decimal(*amount, price)));
        }
        Ok(total)
    }
}
