//! Chain parameters consulted by the consensus state engine.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};
use vertex_types::{Amount, PublicKey};

/// Protocol heights, penalties and bounds.
///
/// Every value here is consensus-critical: two nodes disagreeing on any field
/// will diverge at the height where it first matters. Heights gate protocol
/// upgrades; amounts are denominated in sela.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainParams {
    /// Height from which arbiter inactivity is counted.
    pub public_dpos_height: u64,

    /// Height from which CR members may claim DPoS nodes (inactivity V1).
    pub cr_claim_dpos_node_start_height: u64,

    /// Height of the committee change that introduces inactivity V2,
    /// the illegal penalty, and the inactive penalty.
    pub change_committee_new_cr_height: u64,

    /// Height from which the DPoS v2 staked-vote regime is live.
    pub dposv2_start_height: u64,

    /// Height from which illegal producers may be re-activated.
    pub enable_activate_illegal_height: u64,

    /// Height from which POW fallback and irreversibility tracking apply.
    pub revert_to_pow_start_height: u64,

    /// Blocks a canceled producer's deposit stays locked before the
    /// deposit requirement is released.
    pub deposit_lockup_blocks: u64,

    /// Deposit required to register a producer.
    pub min_deposit_amount: Amount,

    /// Minimum transaction fee; the return-deposit residual threshold.
    pub min_transaction_fee: Amount,

    /// Penalty added to producers found illegal.
    pub illegal_penalty: Amount,

    /// Penalty added to producers set inactive.
    pub inactive_penalty: Amount,

    /// Penalty added to producers deactivated through the emergency path.
    pub emergency_inactive_penalty: Amount,

    /// Missed rounds before a producer is set inactive.
    pub max_inactive_rounds: u32,

    /// Missed rounds before a randomly selected candidate is set inactive.
    pub max_inactive_rounds_of_random_node: u32,

    /// v2 vote total from which a producer counts as effective.
    pub dposv2_effective_votes: Amount,

    /// Number of elected (non-CRC) arbiters per round.
    pub general_arbiters: usize,

    /// Node keys of the CRC-operated arbiters.
    pub crc_arbiters: Vec<PublicKey>,

    /// Bound on the transaction-input reference cache.
    pub max_reference_size: usize,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            public_dpos_height: 400_000,
            cr_claim_dpos_node_start_height: 700_000,
            change_committee_new_cr_height: 900_000,
            dposv2_start_height: 1_200_000,
            enable_activate_illegal_height: 450_000,
            revert_to_pow_start_height: 950_000,
            deposit_lockup_blocks: 2_160,
            min_deposit_amount: Amount::from_coins(5_000),
            min_transaction_fee: Amount::from_sela(10_000),
            illegal_penalty: Amount::from_coins(200),
            inactive_penalty: Amount::from_coins(0),
            emergency_inactive_penalty: Amount::from_coins(0),
            max_inactive_rounds: 720,
            max_inactive_rounds_of_random_node: 10,
            dposv2_effective_votes: Amount::from_coins(80_000),
            general_arbiters: 24,
            crc_arbiters: Vec::new(),
            max_reference_size: 1_000,
        }
    }
}

impl ChainParams {
    /// Loads parameters from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        info!("Loading chain parameters from {:?}", path);

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let params = Self::from_toml_str(&content)?;

        info!(
            "Chain parameters loaded: dposv2_start_height={}, max_inactive_rounds={}",
            params.dposv2_start_height, params.max_inactive_rounds
        );

        Ok(params)
    }

    /// Parses parameters from a TOML string.
    ///
    /// Fields absent from the input keep their mainnet defaults.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let params: ChainParams = toml::from_str(content)?;
        debug!("Chain parameters parsed, validating...");
        params.validate()?;
        Ok(params)
    }

    /// Validates internal consistency.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.public_dpos_height > self.cr_claim_dpos_node_start_height {
            return Err(ConfigError::InvalidHeightOrdering {
                earlier: "public_dpos_height",
                later: "cr_claim_dpos_node_start_height",
            });
        }
        if self.cr_claim_dpos_node_start_height > self.change_committee_new_cr_height {
            return Err(ConfigError::InvalidHeightOrdering {
                earlier: "cr_claim_dpos_node_start_height",
                later: "change_committee_new_cr_height",
            });
        }
        if self.max_inactive_rounds == 0 {
            return Err(ConfigError::InvalidBound("max_inactive_rounds"));
        }
        if self.max_inactive_rounds_of_random_node == 0 {
            return Err(ConfigError::InvalidBound("max_inactive_rounds_of_random_node"));
        }
        if self.max_reference_size == 0 {
            return Err(ConfigError::InvalidBound("max_reference_size"));
        }
        if self.min_deposit_amount.is_negative() {
            return Err(ConfigError::InvalidAmount("min_deposit_amount"));
        }
        if self.min_transaction_fee.is_negative() {
            return Err(ConfigError::InvalidAmount("min_transaction_fee"));
        }
        if self.illegal_penalty.is_negative() {
            return Err(ConfigError::InvalidAmount("illegal_penalty"));
        }
        if self.inactive_penalty.is_negative() {
            return Err(ConfigError::InvalidAmount("inactive_penalty"));
        }
        if self.emergency_inactive_penalty.is_negative() {
            return Err(ConfigError::InvalidAmount("emergency_inactive_penalty"));
        }
        Ok(())
    }
}
