// 9.0: collateral types and time locks.
// locking collateral for a fixed term earns a boost on its reported value. locked
// amounts back nothing else: they are excluded from margin and from withdrawals
// until the lock is released after expiry.

use crate::types::{AccountId, CollateralId, FeedId, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DAY: i64 = 86_400;

// (lock duration, boost in bps where 10000 = 1x)
pub const LOCK_TIERS: [(i64, u32); 3] = [(90 * DAY, 10_250), (180 * DAY, 10_500), (365 * DAY, 11_000)];

pub fn lock_boost(duration_secs: i64) -> Option<u32> {
    LOCK_TIERS
        .iter()
        .find(|(duration, _)| *duration == duration_secs)
        .map(|(_, boost)| *boost)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralConfig {
    pub id: CollateralId,
    pub symbol: String,
    /// None for the USD stable, which is always worth 1
    pub price_feed: Option<FeedId>,
    /// Haircut applied to the oracle value
    pub discount: Decimal,
}

impl CollateralConfig {
    pub fn usd() -> Self {
        Self {
            id: CollateralId::USD,
            symbol: "snxUSD".to_string(),
            price_feed: None,
            discount: Decimal::ZERO,
        }
    }

    pub fn priced(id: CollateralId, symbol: &str, feed: FeedId, discount: Decimal) -> Self {
        Self {
            id,
            symbol: symbol.to_string(),
            price_feed: Some(feed),
            discount,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.discount.is_sign_negative() && self.discount < Decimal::ONE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LockId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralLock {
    pub id: LockId,
    pub account_id: AccountId,
    pub collateral_id: CollateralId,
    pub amount: Decimal,
    pub duration: i64,
    pub boost_bps: u32,
    pub locked_at: Timestamp,
    pub unlock_time: Timestamp,
    pub unlocked: bool,
}

impl CollateralLock {
    pub fn boosted_value(&self) -> Decimal {
        self.amount * Decimal::from(self.boost_bps) / dec!(10000)
    }

    pub fn can_unlock(&self, now: Timestamp) -> bool {
        !self.unlocked && now >= self.unlock_time
    }

    pub fn remaining(&self, now: Timestamp) -> i64 {
        now.seconds_until(self.unlock_time)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    #[error("Invalid lock duration {0}s")]
    InvalidLockDuration(i64),

    #[error("Invalid lock id {0:?}")]
    InvalidLockId(LockId),

    #[error("Lock {lock_id:?} not expired: now {now}, unlocks at {unlock_time}")]
    LockNotExpired {
        lock_id: LockId,
        now: Timestamp,
        unlock_time: Timestamp,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CollateralSummary {
    pub deposited: Decimal,
    pub available: Decimal,
    pub time_locked: Decimal,
    pub boosted: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct LockBook {
    locks: BTreeMap<LockId, CollateralLock>,
    next_id: u64,
}

impl LockBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(
        &mut self,
        account_id: AccountId,
        collateral_id: CollateralId,
        amount: Decimal,
        duration: i64,
        now: Timestamp,
    ) -> Result<&CollateralLock, LockError> {
        let boost_bps = lock_boost(duration).ok_or(LockError::InvalidLockDuration(duration))?;
        self.next_id += 1;
        let id = LockId(self.next_id);
        let lock = CollateralLock {
            id,
            account_id,
            collateral_id,
            amount,
            duration,
            boost_bps,
            locked_at: now,
            unlock_time: now.plus(duration),
            unlocked: false,
        };
        Ok(self.locks.entry(id).or_insert(lock))
    }

    pub fn unlock(&mut self, lock_id: LockId, now: Timestamp) -> Result<CollateralLock, LockError> {
        let lock = self
            .locks
            .get_mut(&lock_id)
            .filter(|l| !l.unlocked)
            .ok_or(LockError::InvalidLockId(lock_id))?;
        if now < lock.unlock_time {
            return Err(LockError::LockNotExpired {
                lock_id,
                now,
                unlock_time: lock.unlock_time,
            });
        }
        lock.unlocked = true;
        Ok(lock.clone())
    }

    pub fn get(&self, lock_id: LockId) -> Option<&CollateralLock> {
        self.locks.get(&lock_id)
    }

    pub fn active_locks(&self, account_id: AccountId) -> impl Iterator<Item = &CollateralLock> {
        self.locks
            .values()
            .filter(move |l| l.account_id == account_id && !l.unlocked)
    }

    pub fn locked_amount(&self, account_id: AccountId, collateral_id: CollateralId) -> Decimal {
        self.active_locks(account_id)
            .filter(|l| l.collateral_id == collateral_id)
            .map(|l| l.amount)
            .sum()
    }

    pub fn boosted_amount(&self, account_id: AccountId, collateral_id: CollateralId) -> Decimal {
        self.active_locks(account_id)
            .filter(|l| l.collateral_id == collateral_id)
            .map(|l| l.boosted_value())
            .sum()
    }

    // active locks are forfeited with the rest of the collateral on liquidation
    pub fn release_all(&mut self, account_id: AccountId) -> Vec<LockId> {
        let mut released = Vec::new();
        for lock in self.locks.values_mut() {
            if lock.account_id == account_id && !lock.unlocked {
                lock.unlocked = true;
                released.push(lock.id);
            }
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCT: AccountId = AccountId(7);

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    #[test]
    fn boost_tiers() {
        assert_eq!(lock_boost(90 * DAY), Some(10_250));
        assert_eq!(lock_boost(180 * DAY), Some(10_500));
        assert_eq!(lock_boost(365 * DAY), Some(11_000));
        assert_eq!(lock_boost(30 * DAY), None);
    }

    #[test]
    fn lock_then_unlock_after_expiry() {
        let mut book = LockBook::new();
        let lock = book.lock(ACCT, CollateralId::USD, dec!(1000), 365 * DAY, ts(0)).unwrap().clone();
        assert_eq!(lock.boosted_value(), dec!(1100));
        assert_eq!(book.locked_amount(ACCT, CollateralId::USD), dec!(1000));

        let early = book.unlock(lock.id, ts(365 * DAY - 1));
        assert_eq!(
            early,
            Err(LockError::LockNotExpired {
                lock_id: lock.id,
                now: ts(365 * DAY - 1),
                unlock_time: ts(365 * DAY),
            })
        );
        assert_eq!(lock.remaining(ts(365 * DAY - 1)), 1);

        assert!(book.unlock(lock.id, ts(365 * DAY)).is_ok());
        assert!(book.locked_amount(ACCT, CollateralId::USD).is_zero());
        // second unlock of the same id
        assert_eq!(book.unlock(lock.id, ts(400 * DAY)), Err(LockError::InvalidLockId(lock.id)));
    }

    #[test]
    fn invalid_duration_and_unknown_id() {
        let mut book = LockBook::new();
        assert_eq!(
            book.lock(ACCT, CollateralId::USD, dec!(1), 10, ts(0)).map(|l| l.id),
            Err(LockError::InvalidLockDuration(10))
        );
        assert_eq!(book.unlock(LockId(99), ts(0)), Err(LockError::InvalidLockId(LockId(99))));
    }

    #[test]
    fn release_all_frees_only_that_account() {
        let mut book = LockBook::new();
        book.lock(ACCT, CollateralId::USD, dec!(10), 90 * DAY, ts(0)).unwrap();
        book.lock(AccountId(8), CollateralId::USD, dec!(10), 90 * DAY, ts(0)).unwrap();
        assert_eq!(book.release_all(ACCT).len(), 1);
        assert_eq!(book.active_locks(ACCT).count(), 0);
        assert_eq!(book.active_locks(AccountId(8)).count(), 1);
    }

    #[test]
    fn usd_config_is_valid() {
        assert!(CollateralConfig::usd().is_valid());
        assert!(!CollateralConfig::priced(CollateralId(1), "snxBTC", FeedId(3), dec!(1)).is_valid());
    }
}
