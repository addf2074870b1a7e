//! Engine configuration options.

use crate::types::Address;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of events to retain in memory.
    pub max_events: usize,
    /// Log every committed event at info instead of debug.
    pub verbose: bool,
    /// Chain id bound into every signed payload.
    pub chain_id: u64,
    /// Verifying contract bound into every signed payload.
    pub contract_address: Address,
    /// Protocol owner, the only caller allowed to run admin operations.
    pub owner: Address,
    /// Skip the initial margin check for orders that only shrink a position.
    pub waive_margin_on_reduce: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            verbose: false,
            chain_id: 13370,
            contract_address: Address::from_label("perps-market"),
            owner: Address::from_label("owner"),
            waive_margin_on_reduce: true,
        }
    }
}
