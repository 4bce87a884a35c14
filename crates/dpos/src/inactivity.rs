//! Arbiter inactivity counting.
//!
//! A producer misses a round whenever a confirm advances the height while it
//! is a current arbiter but not the sponsor of the confirmed proposal. Three
//! protocol versions of the counting coexist, selected by height:
//!
//! - V0 tracks the previous round's arbiter set and counts misses in a
//!   height window.
//! - V1 (from `cr_claim_dpos_node_start_height`) skips abnormal arbiters and
//!   unclaimed CR slots, and delegates elected CR members to the committee.
//! - V2 (from `change_committee_new_cr_height`) splits the counter between
//!   randomly selected candidates and regular arbiters.

use std::collections::HashMap;

use vertex_types::{Confirm, PublicKey};

use crate::mutation::{InactivePrior, InactivityVersion, Mutation};
use crate::state::{Inner, State};

impl State {
    /// Runs the V1 counter under the write lock; used by the host when a
    /// confirm arrives outside normal block processing.
    pub fn count_arbitrators_inactivity_v1(&self, height: u64, confirm: &Confirm) {
        let mut guard = self.inner.write();
        self.count_arbitrators_inactivity_v1_locked(&mut guard, height, confirm);
    }

    // changing_arbiters marks the producers whose counting state moves this
    // round: true resets the counter (on duty, or joined/left the set),
    // false advances it.

    pub(crate) fn count_arbitrators_inactivity_v2(
        &self,
        inner: &mut Inner,
        height: u64,
        confirm: &Confirm,
    ) {
        if height < self.params.public_dpos_height {
            return;
        }

        let is_dpos_as_cr = height > self.params.change_committee_new_cr_height;

        let mut changing_arbiters: HashMap<PublicKey, bool> = HashMap::new();
        for arbiter in (self.hooks.get_arbiters)() {
            if !arbiter.is_normal {
                continue;
            }
            if !is_dpos_as_cr && arbiter.is_cr_member && !arbiter.claimed_dpos_node {
                continue;
            }
            let key = inner.key_frame.producer_key(&arbiter.node_public_key);
            changing_arbiters.insert(key, false);
        }
        changing_arbiters.insert(inner.key_frame.producer_key(&confirm.sponsor), true);

        let cr_members = self.claimed_cr_members_by_owner_key();
        let in_election = self
            .hooks
            .is_in_election_period
            .as_ref()
            .is_some_and(|f| f());

        for (key, need_reset) in changing_arbiters {
            if in_election {
                if let Some(member) = cr_members.get(&key) {
                    if member.member_state != crate::arbiters::CrMemberState::Elected {
                        continue;
                    }
                    if is_dpos_as_cr && member.dpos_public_key.is_none() {
                        self.push_producer_inactivity(
                            inner,
                            &key,
                            InactivityVersion::SplitCounter,
                            need_reset,
                            height,
                        );
                    } else {
                        let mutation = Mutation::CrMemberInactivity {
                            did: member.did,
                            need_reset,
                            ori_state: member.member_state,
                            ori_inactive_count: member.inactive_count,
                            height,
                        };
                        self.push(inner, mutation);
                    }
                    continue;
                }
            }

            self.push_producer_inactivity(
                inner,
                &key,
                InactivityVersion::SplitCounter,
                need_reset,
                height,
            );
        }
    }

    pub(crate) fn count_arbitrators_inactivity_v1_locked(
        &self,
        inner: &mut Inner,
        height: u64,
        confirm: &Confirm,
    ) {
        if height < self.params.public_dpos_height {
            return;
        }

        let mut changing_arbiters: HashMap<PublicKey, bool> = HashMap::new();
        for arbiter in (self.hooks.get_arbiters)() {
            if !arbiter.is_normal || (arbiter.is_cr_member && !arbiter.claimed_dpos_node) {
                continue;
            }
            let key = inner.key_frame.producer_key(&arbiter.node_public_key);
            changing_arbiters.insert(key, false);
        }
        changing_arbiters.insert(inner.key_frame.producer_key(&confirm.sponsor), true);

        let cr_members = self.claimed_cr_members_by_owner_key();
        let in_election = self
            .hooks
            .is_in_election_period
            .as_ref()
            .is_some_and(|f| f());

        for (key, need_reset) in changing_arbiters {
            if in_election {
                if let Some(member) = cr_members.get(&key) {
                    if member.member_state != crate::arbiters::CrMemberState::Elected {
                        continue;
                    }
                    let mutation = Mutation::CrMemberInactivity {
                        did: member.did,
                        need_reset,
                        ori_state: member.member_state,
                        ori_inactive_count: member.inactive_count,
                        height,
                    };
                    self.push(inner, mutation);
                    continue;
                }
            }

            self.push_producer_inactivity(
                inner,
                &key,
                InactivityVersion::CountingHeight,
                need_reset,
                height,
            );
        }
    }

    pub(crate) fn count_arbitrators_inactivity_v0(
        &self,
        inner: &mut Inner,
        height: u64,
        confirm: &Confirm,
    ) {
        if height < self.params.public_dpos_height {
            return;
        }

        // A producer is "changing" when it was an arbiter last round or is
        // one now; only producers present in both rounds and off duty keep
        // counting. The previous-round set itself is bookkeeping, not
        // consensus state, and is rebuilt on replay rather than rolled back.
        let mut changing_arbiters: HashMap<PublicKey, bool> = HashMap::new();
        for key in &inner.key_frame.pre_block_arbiters {
            changing_arbiters.insert(*key, true);
        }
        inner.key_frame.pre_block_arbiters.clear();
        for arbiter in (self.hooks.get_arbiters)() {
            let key = inner.key_frame.producer_key(&arbiter.node_public_key);
            inner.key_frame.pre_block_arbiters.insert(key);
            if let Some(flag) = changing_arbiters.get_mut(&key) {
                *flag = false;
            }
        }
        changing_arbiters.insert(inner.key_frame.producer_key(&confirm.sponsor), true);

        for (key, need_reset) in changing_arbiters {
            self.push_producer_inactivity(
                inner,
                &key,
                InactivityVersion::CountingHeight,
                need_reset,
                height,
            );
        }
    }

    // Appends one counting step for an active producer, capturing the full
    // counter snapshot for exact rollback.
    fn push_producer_inactivity(
        &self,
        inner: &mut Inner,
        key: &PublicKey,
        version: InactivityVersion,
        need_reset: bool,
        height: u64,
    ) {
        if !inner.key_frame.active.contains(key) {
            return;
        }
        let prior = match inner.key_frame.producers.get(key) {
            Some(producer) => InactivePrior::capture(producer),
            None => return,
        };
        self.push(
            inner,
            Mutation::UpdateInactivity {
                owner: *key,
                version,
                need_reset,
                height,
                prior,
            },
        );
    }
}
