//! Accounts, permissions and the collateral ledger.
//!
//! An account is cross margined: every collateral type it holds backs every
//! position it has. Realized pnl, funding, fees and interest all settle into
//! the USD balance, which may go negative while other collateral covers it.

use crate::order::AsyncOrder;
use crate::position::Position;
use crate::types::{AccountId, Address, CollateralId, MarketId, Quote, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    Admin,
    PerpsCommitOffchainOrder,
    PerpsCancelLimitOrder,
    Withdraw,
    FeeTierUpdate,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Admin => "ADMIN",
            Permission::PerpsCommitOffchainOrder => "PERPS_COMMIT_OFFCHAIN_ORDER",
            Permission::PerpsCancelLimitOrder => "PERPS_CANCEL_LIMIT_ORDER",
            Permission::Withdraw => "WITHDRAW",
            Permission::FeeTierUpdate => "FEE_TIER_UPDATE",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner: Address,
    pub permissions: BTreeMap<Permission, BTreeSet<Address>>,
    pub collateral: BTreeMap<CollateralId, Decimal>,
    pub positions: BTreeMap<MarketId, Position>,
    pub fee_tier_id: u32,
    pub pending_order: Option<AsyncOrder>,
    pub total_deposited: Quote,
    pub total_withdrawn: Quote,
    pub realized_pnl: Quote,
    pub created_at: Timestamp,
}

impl Account {
    pub fn new(id: AccountId, owner: Address, timestamp: Timestamp) -> Self {
        Self {
            id,
            owner,
            permissions: BTreeMap::new(),
            collateral: BTreeMap::new(),
            positions: BTreeMap::new(),
            fee_tier_id: 0,
            pending_order: None,
            total_deposited: Quote::zero(),
            total_withdrawn: Quote::zero(),
            realized_pnl: Quote::zero(),
            created_at: timestamp,
        }
    }

    // owner implicitly holds every permission
    pub fn is_authorized(&self, permission: Permission, who: Address) -> bool {
        who == self.owner
            || self
                .permissions
                .get(&permission)
                .is_some_and(|holders| holders.contains(&who))
    }

    pub fn grant(&mut self, permission: Permission, who: Address) -> bool {
        self.permissions.entry(permission).or_default().insert(who)
    }

    pub fn revoke(&mut self, permission: Permission, who: Address) -> bool {
        let removed = self
            .permissions
            .get_mut(&permission)
            .is_some_and(|holders| holders.remove(&who));
        self.permissions.retain(|_, holders| !holders.is_empty());
        removed
    }

    pub fn collateral_amount(&self, collateral: CollateralId) -> Decimal {
        self.collateral.get(&collateral).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn deposit(&mut self, collateral: CollateralId, amount: Decimal) {
        *self.collateral.entry(collateral).or_insert(Decimal::ZERO) += amount;
        if collateral == CollateralId::USD {
            self.total_deposited = self.total_deposited.add(Quote::new(amount));
        }
    }

    // `available` is what the caller considers withdrawable (net of locks)
    pub fn withdraw(&mut self, collateral: CollateralId, amount: Decimal, available: Decimal) -> Result<(), AccountError> {
        if amount > available {
            return Err(AccountError::InsufficientCollateral {
                collateral,
                requested: amount,
                available,
            });
        }
        *self.collateral.entry(collateral).or_insert(Decimal::ZERO) -= amount;
        if collateral == CollateralId::USD {
            self.total_withdrawn = self.total_withdrawn.add(Quote::new(amount));
        }
        Ok(())
    }

    // pnl/funding/fees/interest land here. may leave the USD balance negative.
    pub fn settle_usd(&mut self, amount: Quote) {
        *self.collateral.entry(CollateralId::USD).or_insert(Decimal::ZERO) += amount.value();
    }

    pub fn realize_pnl(&mut self, pnl: Quote) {
        self.realized_pnl = self.realized_pnl.add(pnl);
    }

    pub fn get_position(&self, market_id: MarketId) -> Option<&Position> {
        self.positions.get(&market_id)
    }

    pub fn remove_position(&mut self, market_id: MarketId) -> Option<Position> {
        self.positions.remove(&market_id)
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(|p| p.is_open())
    }

    pub fn has_open_positions(&self) -> bool {
        self.open_positions().next().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    #[error("Insufficient collateral {collateral:?}: requested {requested}, available {available}")]
    InsufficientCollateral {
        collateral: CollateralId,
        requested: Decimal,
        available: Decimal,
    },
}
