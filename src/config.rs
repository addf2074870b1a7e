// 12.0 config.rs: protocol bootstrap settings in one place. markets with their
// settlement strategies, fee tiers, collateral types, keeper costs, referrer shares.
// 12.1 Environment presets. Engine::from_config turns one of these into a live engine.

use crate::collateral::CollateralConfig;
use crate::fees::{FeeTier, KeeperCosts};
use crate::margin::LiquidationParameters;
use crate::market::MarketConfig;
use crate::settlement::SettlementStrategy;
use crate::types::{Address, CollateralId, MarketId, Quote};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// one market plus the strategies registered on it, in id order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSetup {
    pub market: MarketConfig,
    pub strategies: Vec<SettlementStrategy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferrerShare {
    pub referrer: Address,
    pub share_ratio: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub markets: Vec<MarketSetup>,
    // tier 0 is the implicit default and may be omitted
    pub fee_tiers: BTreeMap<u32, FeeTier>,
    // USD is always registered, listing it here is optional
    pub collateral_types: Vec<CollateralConfig>,
    pub keeper_costs: KeeperCosts,
    pub referrer_shares: Vec<ReferrerShare>,
    pub fee_collector: Option<Address>,
    pub fee_tier_updater: Option<Address>,
    // None disables the staleness check on live prices
    pub max_price_staleness_secs: Option<i64>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        let mut fee_tiers = BTreeMap::new();
        fee_tiers.insert(1, FeeTier::new(1000, 500));
        fee_tiers.insert(2, FeeTier::new(2500, 1500));

        Self {
            markets: vec![
                MarketSetup {
                    market: MarketConfig::eth_perp(),
                    strategies: vec![SettlementStrategy::delayed(MarketConfig::eth_perp().price_feed, 0, 120)],
                },
                MarketSetup {
                    market: MarketConfig::btc_perp(),
                    strategies: vec![SettlementStrategy::delayed(MarketConfig::btc_perp().price_feed, 0, 120)],
                },
            ],
            fee_tiers,
            collateral_types: vec![CollateralConfig::usd()],
            keeper_costs: KeeperCosts::default(),
            referrer_shares: Vec::new(),
            fee_collector: None,
            fee_tier_updater: None,
            max_price_staleness_secs: None,
        }
    }
}

impl ProtocolConfig {
    // testnet: rollover switched on, small keeper costs
    pub fn testnet() -> Self {
        let mut config = Self::default();
        for setup in &mut config.markets {
            // 10% a year, roughly
            setup.market.rollover_fee_per_second = dec!(0.000000003170979198);
        }
        config.keeper_costs = KeeperCosts {
            settlement_cost: Quote::new(dec!(0.5)),
            flag_cost: Quote::new(dec!(1)),
            liquidate_cost: Quote::new(dec!(1)),
        };
        config.max_price_staleness_secs = Some(60);
        config
    }

    // mainnet: stricter margins, settlement rewards, fresh prices only
    pub fn mainnet() -> Self {
        let mut config = Self::testnet();
        for setup in &mut config.markets {
            setup.market.liquidation = LiquidationParameters {
                minimum_position_margin: Quote::new(dec!(50)),
                ..LiquidationParameters::default()
            };
            for strategy in &mut setup.strategies {
                strategy.settlement_reward = Quote::new(dec!(2));
                strategy.settlement_delay = 2;
                strategy.commitment_price_delay = 2;
            }
        }
        config.max_price_staleness_secs = Some(15);
        config
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for setup in &self.markets {
            let id = setup.market.id;
            if !seen.insert(id) {
                return Err(ConfigError::DuplicateMarket(id));
            }
            setup
                .market
                .validate()
                .map_err(|e| ConfigError::InvalidMarket {
                    market: id,
                    reason: e.to_string(),
                })?;
            if let Some(index) = setup.strategies.iter().position(|s| !s.is_valid()) {
                return Err(ConfigError::InvalidStrategy {
                    market: id,
                    strategy_id: index as u32,
                });
            }
        }

        if let Some((id, _)) = self.fee_tiers.iter().find(|(_, tier)| !tier.is_valid()) {
            return Err(ConfigError::InvalidFeeTier(*id));
        }

        for collateral in &self.collateral_types {
            if !collateral.is_valid() {
                return Err(ConfigError::InvalidCollateral {
                    collateral: collateral.id,
                    reason: "discount must be in [0, 1)".to_string(),
                });
            }
            if collateral.id != CollateralId::USD && collateral.price_feed.is_none() {
                return Err(ConfigError::InvalidCollateral {
                    collateral: collateral.id,
                    reason: "non-USD collateral needs a price feed".to_string(),
                });
            }
        }

        for share in &self.referrer_shares {
            if share.share_ratio.is_sign_negative() || share.share_ratio > Decimal::ONE {
                return Err(ConfigError::InvalidReferrerShare {
                    referrer: share.referrer,
                    share_ratio: share.share_ratio,
                });
            }
        }

        if self.max_price_staleness_secs.is_some_and(|secs| secs < 0) {
            return Err(ConfigError::InvalidPriceStaleness);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid market {market:?}: {reason}")]
    InvalidMarket { market: MarketId, reason: String },

    #[error("Market {0:?} configured twice")]
    DuplicateMarket(MarketId),

    #[error("Invalid settlement strategy {strategy_id} on market {market:?}")]
    InvalidStrategy { market: MarketId, strategy_id: u32 },

    #[error("Invalid fee tier {0}")]
    InvalidFeeTier(u32),

    #[error("Invalid collateral {collateral:?}: {reason}")]
    InvalidCollateral { collateral: CollateralId, reason: String },

    #[error("Invalid share {share_ratio} for referrer {referrer}")]
    InvalidReferrerShare { referrer: Address, share_ratio: Decimal },

    #[error("Price staleness limit must not be negative")]
    InvalidPriceStaleness,

    #[error("Config parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn config(&self) -> ProtocolConfig {
        match self {
            Environment::Development => ProtocolConfig::default(),
            Environment::Testnet => ProtocolConfig::testnet(),
            Environment::Mainnet => ProtocolConfig::mainnet(),
        }
    }
}
