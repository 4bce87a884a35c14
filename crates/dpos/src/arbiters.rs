//! Arbiter and CR-member descriptors, and the hook surface.
//!
//! The engine never owns the arbiter set or the CR committee; it is told who
//! the arbiters are through accessors supplied at construction, and it pushes
//! CR-member effects back through function hooks. The hooks are plain `Arc`
//! closures so the host wires them without the engine and the committee ever
//! sharing a mutable object.

use std::collections::HashMap;
use std::sync::Arc;

use vertex_types::{Amount, Input, Output, ProgramHash, PublicKey, Transaction};

use crate::error::Result;

/// A member of the current arbiter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbiterInfo {
    /// The arbiter's block-signing key.
    pub node_public_key: PublicKey,
    /// Whether the arbiter is operating normally this round.
    pub is_normal: bool,
    /// Whether the slot is held by a CR council member.
    pub is_cr_member: bool,
    /// Whether that CR member has claimed a DPoS node key.
    pub claimed_dpos_node: bool,
}

/// Lifecycle state of a CR council member, as reported by the committee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrMemberState {
    /// Serving member.
    Elected,
    /// Deactivated for missed rounds.
    Inactive,
    /// Found to have broken consensus.
    Illegal,
    /// Impeached by vote.
    Impeached,
    /// Term ended.
    Terminated,
}

/// A CR council member descriptor, as the committee reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrMember {
    /// The member's DID.
    pub did: ProgramHash,
    /// The member's registration code; embeds the owner public key.
    pub code: Vec<u8>,
    /// The claimed DPoS node key, if any.
    pub dpos_public_key: Option<PublicKey>,
    /// Current lifecycle state.
    pub member_state: CrMemberState,
    /// Missed-round counter maintained by the committee.
    pub inactive_count: u32,
}

impl CrMember {
    /// Extracts the owner public key embedded in the registration code.
    pub fn owner_public_key(&self) -> Option<PublicKey> {
        if self.code.len() < 2 {
            return None;
        }
        PublicKey::from_slice(&self.code[1..self.code.len() - 1]).ok()
    }
}

/// CR committee mutation hooks and their revert twins.
///
/// Invoked from inside mutations; the revert twin receives the values the
/// engine captured before the forward call so the committee can restore its
/// own state.
#[derive(Clone)]
pub struct CrHooks {
    /// Advances or resets a member's inactivity counting.
    pub try_update_cr_member_inactivity: Arc<dyn Fn(ProgramHash, bool, u64) + Send + Sync>,
    /// Reverts an inactivity update.
    pub try_revert_cr_member_inactivity:
        Arc<dyn Fn(ProgramHash, CrMemberState, u32, u64) + Send + Sync>,
    /// Marks a member illegal.
    pub try_update_cr_member_illegal: Arc<dyn Fn(ProgramHash, u64) + Send + Sync>,
    /// Reverts an illegal marking.
    pub try_revert_cr_member_illegal: Arc<dyn Fn(ProgramHash, CrMemberState, u64) + Send + Sync>,
}

impl CrHooks {
    /// Hooks that do nothing; for hosts running without a CR committee.
    pub fn noop() -> Self {
        Self {
            try_update_cr_member_inactivity: Arc::new(|_, _, _| {}),
            try_revert_cr_member_inactivity: Arc::new(|_, _, _, _| {}),
            try_update_cr_member_illegal: Arc::new(|_, _| {}),
            try_revert_cr_member_illegal: Arc::new(|_, _, _| {}),
        }
    }
}

/// Accessors and hooks supplied by the host at construction.
#[derive(Clone)]
pub struct StateHooks {
    /// Returns the current arbiter set.
    pub get_arbiters: Arc<dyn Fn() -> Vec<ArbiterInfo> + Send + Sync>,
    /// Returns the CR committee members; absent when no committee runs.
    pub get_cr_members: Option<Arc<dyn Fn() -> Vec<CrMember> + Send + Sync>>,
    /// Whether the committee is inside an election period.
    pub is_in_election_period: Option<Arc<dyn Fn() -> bool + Send + Sync>>,
    /// Returns the deposit held for a producer deposit program hash.
    pub get_producer_deposit_amount:
        Arc<dyn Fn(&ProgramHash) -> Result<Amount> + Send + Sync>,
    /// Resolves every input of a transaction to the output it spends;
    /// implemented by [`crate::UtxoCache`].
    pub get_tx_reference:
        Arc<dyn Fn(&Transaction) -> Result<HashMap<Input, Output>> + Send + Sync>,
    /// CR committee mutation hooks.
    pub cr: CrHooks,
}

/// Functions registered after construction, once the surrounding node exists.
#[derive(Clone)]
pub struct StateFuncsConfig {
    /// Returns the current best height.
    pub get_height: Arc<dyn Fn() -> u64 + Send + Sync>,
    /// Whether this node is synced to the chain tip.
    pub is_current: Arc<dyn Fn() -> bool + Send + Sync>,
    /// Broadcasts a transaction to peers.
    pub broadcast: Arc<dyn Fn(Transaction) + Send + Sync>,
    /// Enqueues a transaction into the local pool.
    pub append_to_txpool:
        Arc<dyn Fn(Transaction) -> std::result::Result<(), String> + Send + Sync>,
    /// Builds the aggregated real-withdraw transaction.
    pub create_dposv2_real_withdraw_transaction: Arc<
        dyn Fn(Vec<vertex_types::H256>, Vec<vertex_types::OutputInfo>)
                -> std::result::Result<Transaction, String>
            + Send
            + Sync,
    >,
}
