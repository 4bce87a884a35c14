//! The aggregate mutable state.
//!
//! [`StateKeyFrame`] is the one authoritative picture of all producers, votes,
//! staking rights and mode flags. The producer registry is a single owning
//! map; lifecycle containers are index sets over it, so moving a producer
//! between states is one set edit plus a field edit and a producer can never
//! be owned by two containers at once.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use vertex_types::{Amount, DetailedVoteInfo, H256, OutputInfo, ProgramHash, PublicKey};

use crate::producer::{Producer, ProducerState};

/// The consensus algorithm currently producing blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConsensusAlgorithm {
    /// Delegated proof of stake.
    #[default]
    Dpos,
    /// Proof-of-work fallback.
    Pow,
}

/// The aggregate mutable state of the DPoS engine.
///
/// All fields are public for the read surface; mutation goes through the
/// history log so every change is reversible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateKeyFrame {
    /// The authoritative producer registry, keyed by owner public key.
    pub producers: HashMap<PublicKey, Producer>,

    /// Owner keys of pending producers.
    pub pending: HashSet<PublicKey>,
    /// Owner keys of active producers.
    pub active: HashSet<PublicKey>,
    /// Owner keys of inactive producers.
    pub inactive: HashSet<PublicKey>,
    /// Owner keys of canceled producers, including those already returned.
    pub canceled: HashSet<PublicKey>,
    /// Owner keys of illegal producers.
    pub illegal: HashSet<PublicKey>,
    /// Owner keys of producers canceled straight out of pending state.
    pub pending_canceled: HashSet<PublicKey>,
    /// Owner keys of active v2-capable producers.
    pub dposv2_active: HashSet<PublicKey>,
    /// Owner keys of producers whose v2 votes reached the effective threshold.
    pub dposv2_effected: HashSet<PublicKey>,

    /// Nicknames of live (non-canceled, non-returned) producers.
    pub nicknames: HashSet<String>,
    /// Node public key to owner public key index over live producers.
    pub node_owner_keys: HashMap<PublicKey, PublicKey>,
    /// Deposit program hashes of registered producers.
    pub producer_deposit_map: HashSet<ProgramHash>,
    /// Live deposit outputs by refer key.
    pub deposit_outputs: HashMap<H256, Amount>,

    /// Refer keys of live v1 vote outputs.
    pub votes: HashSet<H256>,
    /// v1 vote rights used, by stake identity.
    pub dpos_votes: HashMap<ProgramHash, Amount>,
    /// v2 vote rights used, by stake identity.
    pub dposv2_votes: HashMap<ProgramHash, Amount>,
    /// CR vote rights used, by stake identity.
    pub cr_votes: HashMap<ProgramHash, Amount>,
    /// CR proposal vote rights used, by stake identity.
    pub crc_proposal_votes: HashMap<ProgramHash, Amount>,
    /// CR impeachment vote rights used, by stake identity.
    pub cr_impeachment_votes: HashMap<ProgramHash, Amount>,
    /// Total staked vote rights, by stake identity.
    pub dposv2_vote_rights: HashMap<ProgramHash, Amount>,
    /// Detailed v1 vote records by refer key.
    pub detail_dposv1_votes: HashMap<H256, DetailedVoteInfo>,

    /// Hashes of processed special (illegal/inactive) transactions.
    pub special_tx_hashes: HashSet<H256>,
    /// Owner keys deactivated through the emergency path.
    pub emergency_inactive_arbiters: HashSet<PublicKey>,
    /// Arbiter keys of the previous round (V0 inactivity counting).
    pub pre_block_arbiters: HashSet<PublicKey>,

    /// Pending reward settlements by claim transaction hash.
    pub withdrawable_tx_info: HashMap<H256, OutputInfo>,
    /// Claimable v2 rewards by recipient.
    pub dposv2_reward_info: HashMap<ProgramHash, Amount>,
    /// Rewards in the claiming pipeline by recipient.
    pub dposv2_reward_claiming_info: HashMap<ProgramHash, Amount>,
    /// Settled rewards by recipient.
    pub dposv2_reward_claimed_info: HashMap<ProgramHash, Amount>,

    /// The consensus algorithm currently in force.
    pub consensus_algorithm: ConsensusAlgorithm,
    /// Whether the chain fell back to POW for lack of producers.
    pub no_producers: bool,
    /// Whether no CR member has claimed a DPoS node.
    pub no_claim_dpos_node: bool,
    /// Whether a next-turn arbiter announcement is still owed.
    pub need_next_turn_dpos_info: bool,
    /// Whether a revert-to-DPoS transaction is still owed.
    pub need_revert_to_dpos_tx: bool,

    /// First height of the penalty-waiver window.
    pub version_start_height: u64,
    /// First height after the penalty-waiver window.
    pub version_end_height: u64,
    /// Height at which DPoS work resumes after a POW fallback.
    pub dpos_work_height: u64,
    /// Height DPoS started advancing irreversibility from.
    pub dpos_start_height: u64,
    /// Height of the last POW fallback.
    pub revert_to_pow_block_height: u64,
    /// Highest height the chain can no longer reorganize across.
    pub last_irreversible_height: u64,
    /// Timestamp of the last processed block.
    pub last_block_timestamp: u64,
}

impl StateKeyFrame {
    /// Creates an empty key frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a producer by owner public key across every container.
    pub fn producer_by_owner(&self, owner: &PublicKey) -> Option<&Producer> {
        self.producers.get(owner)
    }

    /// Resolves a node or owner public key to the producer's owner key.
    pub fn producer_key(&self, public_key: &PublicKey) -> PublicKey {
        match self.node_owner_keys.get(public_key) {
            Some(owner) => *owner,
            None => *public_key,
        }
    }

    /// Looks up a producer by node or owner public key.
    pub fn producer(&self, public_key: &PublicKey) -> Option<&Producer> {
        self.producers.get(&self.producer_key(public_key))
    }

    /// Looks up a v2-capable producer by node or owner public key.
    pub fn dposv2_producer(&self, public_key: &PublicKey) -> Option<&Producer> {
        self.producer(public_key).filter(|p| p.is_dposv2())
    }

    /// Looks up a producer by its deposit program hash.
    ///
    /// Searches the live containers the way deposits can still accrue:
    /// pending, active, inactive, canceled and illegal producers.
    pub fn producer_by_deposit_hash(&self, hash: &ProgramHash) -> Option<&Producer> {
        for set in [
            &self.pending,
            &self.active,
            &self.inactive,
            &self.canceled,
            &self.illegal,
        ] {
            for owner in set {
                if let Some(producer) = self.producers.get(owner) {
                    if producer.deposit_hash() == hash {
                        return Some(producer);
                    }
                }
            }
        }
        None
    }

    /// Producers currently in the given index set.
    pub(crate) fn producers_in<'a>(
        &'a self,
        set: &'a HashSet<PublicKey>,
    ) -> impl Iterator<Item = &'a Producer> {
        set.iter().filter_map(|owner| self.producers.get(owner))
    }

    /// All producers in canceled state (excluding returned).
    pub fn canceled_producers(&self) -> Vec<&Producer> {
        self.producers_in(&self.canceled)
            .filter(|p| p.state() == ProducerState::Canceled)
            .collect()
    }

    /// All producers whose deposit has been returned.
    pub fn returned_producers(&self) -> Vec<&Producer> {
        self.producers_in(&self.canceled)
            .filter(|p| p.state() == ProducerState::Returned)
            .collect()
    }

    /// Node public keys of every live producer.
    pub fn all_node_public_keys(&self) -> HashSet<PublicKey> {
        let mut keys = HashSet::new();
        for set in [
            &self.pending,
            &self.active,
            &self.inactive,
            &self.canceled,
            &self.illegal,
        ] {
            for owner in set {
                if let Some(producer) = self.producers.get(owner) {
                    keys.insert(*producer.node_public_key());
                }
            }
        }
        keys
    }

    /// Deep snapshot for historical queries.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    /// Adds `delta` to a per-stake amount ledger, dropping entries that
    /// return to zero so applying a delta and its inverse restores the map
    /// byte-identically.
    pub(crate) fn adjust_amount(
        map: &mut HashMap<ProgramHash, Amount>,
        key: &ProgramHash,
        delta: Amount,
    ) {
        let entry = map.entry(*key).or_insert(Amount::ZERO);
        *entry += delta;
        if *entry == Amount::ZERO {
            map.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjust_amount_prunes_zero_entries() {
        let mut map = HashMap::new();
        let stake = ProgramHash::stake_from_code(b"code");

        StateKeyFrame::adjust_amount(&mut map, &stake, Amount::from_sela(100));
        assert_eq!(map.get(&stake), Some(&Amount::from_sela(100)));

        StateKeyFrame::adjust_amount(&mut map, &stake, Amount::from_sela(-100));
        assert!(map.is_empty());
    }

    #[test]
    fn test_producer_key_falls_back_to_input() {
        let frame = StateKeyFrame::new();
        let key = PublicKey::new([0x02; 33]);
        assert_eq!(frame.producer_key(&key), key);
    }
}
