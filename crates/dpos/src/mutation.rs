//! The tagged mutation log entries.
//!
//! Every state change a handler makes is expressed as one [`Mutation`]
//! variant carrying the data needed to apply it and the prior values needed
//! to revert it exactly. Because mutations are plain data rather than
//! captured closures, the history can replay them against any frame - the
//! live one during block processing, or a detached clone when serving
//! historical snapshots.
//!
//! Invariant: `revert` after `apply` restores the frame byte-identically.
//! Variants that create ledger entries therefore prune what they created,
//! and variants that deactivate producers carry a full counter snapshot.

use vertex_config::ChainParams;
use vertex_types::{
    Amount, DetailedVoteInfo, H256, OutputInfo, ProducerInfo, ProgramHash, PublicKey,
};

use crate::arbiters::{CrHooks, CrMemberState};
use crate::keyframe::{ConsensusAlgorithm, StateKeyFrame};
use crate::producer::{Producer, ProducerState};
use crate::IRREVERSIBLE_HEIGHT;

/// Context a mutation executes under.
///
/// Historical-snapshot replays pass `cr_hooks: None` so rewinding a clone
/// never re-fires calls into the CR committee.
#[derive(Clone, Copy)]
pub struct MutationCtx<'a> {
    /// Chain parameters consulted by threshold and penalty logic.
    pub params: &'a ChainParams,
    /// CR committee hooks; absent during detached replays.
    pub cr_hooks: Option<&'a CrHooks>,
}

/// Which per-stake ledger an adjustment targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StakeLedger {
    /// Total staked vote rights.
    VoteRights,
    /// v1 vote rights used.
    DposV1,
    /// v2 vote rights used.
    DposV2,
    /// CR vote rights used.
    Cr,
    /// CR impeachment vote rights used.
    CrImpeachment,
}

/// Which inactivity-counting algorithm an update runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InactivityVersion {
    /// Height-window counting (V0 and V1).
    CountingHeight,
    /// Split-counter counting (V2).
    SplitCounter,
}

/// Snapshot of the producer fields an illegal marking touches.
#[derive(Debug, Clone, Copy)]
pub struct IllegalPrior {
    /// State before the marking.
    pub state: ProducerState,
    /// Penalty before the marking.
    pub penalty: Amount,
    /// Illegal height before the marking.
    pub illegal_height: u64,
    /// Activation request height before the marking.
    pub activate_request_height: u64,
}

/// Snapshot of the producer fields inactivity accounting touches.
#[derive(Debug, Clone, Copy)]
pub struct InactivePrior {
    /// State before the update.
    pub state: ProducerState,
    /// Penalty before the update.
    pub penalty: Amount,
    /// Inactive-since height before the update.
    pub inactive_since: u64,
    /// Activation request height before the update.
    pub activate_request_height: u64,
    /// Random-candidate flag before the update.
    pub selected: bool,
    /// Plain miss counter before the update.
    pub inactive_count: u32,
    /// Random-candidate miss counter before the update.
    pub random_candidate_inactive_count: u32,
    /// First-miss height before the update.
    pub inactive_counting_height: u64,
    /// Last counted height before the update.
    pub last_update_inactive_height: u64,
}

impl InactivePrior {
    /// Captures the touched fields of a producer.
    pub fn capture(producer: &Producer) -> Self {
        Self {
            state: producer.state,
            penalty: producer.penalty,
            inactive_since: producer.inactive_since,
            activate_request_height: producer.activate_request_height,
            selected: producer.selected,
            inactive_count: producer.inactive_count,
            random_candidate_inactive_count: producer.random_candidate_inactive_count,
            inactive_counting_height: producer.inactive_counting_height,
            last_update_inactive_height: producer.last_update_inactive_height,
        }
    }
}

/// One reversible state change.
#[derive(Debug, Clone)]
pub enum Mutation {
    /// A new producer entered the registry.
    RegisterProducer {
        /// Owner key of the new producer.
        owner: PublicKey,
        /// The freshly built pending record.
        producer: Box<Producer>,
        /// Deposit outputs indexed by the registration, with their values.
        deposit_outputs: Vec<(H256, Amount)>,
    },
    /// A producer's registered info changed.
    UpdateProducerInfo {
        /// Owner key of the producer.
        owner: PublicKey,
        /// Info before the update.
        origin: Box<ProducerInfo>,
        /// Info after the update.
        update: Box<ProducerInfo>,
    },
    /// A producer was canceled.
    CancelProducer {
        /// Owner key of the producer.
        owner: PublicKey,
        /// Cancellation height.
        height: u64,
        /// State the producer was canceled out of.
        prior_state: ProducerState,
    },
    /// A producer requested re-activation.
    SetActivateRequest {
        /// Owner key of the producer.
        owner: PublicKey,
        /// Request height.
        height: u64,
        /// Previous request height.
        prior: u64,
    },
    /// A producer finished its confirmation window and became active.
    PromoteToActive {
        /// Owner key of the producer.
        owner: PublicKey,
        /// Container the producer was promoted out of.
        from: ProducerState,
    },
    /// A v1 vote output became live.
    VoteRefAdd {
        /// Refer key of the vote output.
        refer_key: H256,
    },
    /// A v1 vote output was spent.
    VoteRefRemove {
        /// Refer key of the vote output.
        refer_key: H256,
    },
    /// A producer's v1 vote tally moved.
    AdjustVotes {
        /// Owner key of the producer.
        owner: PublicKey,
        /// Signed vote delta.
        delta: Amount,
    },
    /// A producer's received deposit total moved.
    AdjustTotalAmount {
        /// Owner key of the producer.
        owner: PublicKey,
        /// Signed value delta.
        delta: Amount,
    },
    /// A producer's required deposit moved.
    AdjustDepositAmount {
        /// Owner key of the producer.
        owner: PublicKey,
        /// Signed value delta.
        delta: Amount,
    },
    /// A per-stake ledger moved.
    AdjustStakeLedger {
        /// Which ledger.
        ledger: StakeLedger,
        /// Stake identity.
        stake: ProgramHash,
        /// Signed delta.
        delta: Amount,
    },
    /// A detailed v1 vote record was stored.
    DetailV1Insert {
        /// Refer key of the record.
        refer_key: H256,
        /// The record.
        info: Box<DetailedVoteInfo>,
    },
    /// A detailed v2 vote landed on a producer.
    DetailV2Insert {
        /// Owner key of the voted producer.
        owner: PublicKey,
        /// Stake identity of the voter.
        stake: ProgramHash,
        /// Refer key of the record.
        refer_key: H256,
        /// The record.
        info: Box<DetailedVoteInfo>,
    },
    /// A detailed v2 vote was renewed under a new refer key.
    DetailV2Renew {
        /// Owner key of the voted producer.
        owner: PublicKey,
        /// Stake identity of the voter.
        stake: ProgramHash,
        /// Refer key being retired.
        old_refer_key: H256,
        /// The retired record.
        old_info: Box<DetailedVoteInfo>,
        /// Replacement refer key.
        new_refer_key: H256,
        /// The replacement record.
        new_info: Box<DetailedVoteInfo>,
    },
    /// A producer was found illegal.
    MarkIllegal {
        /// Owner key of the producer.
        owner: PublicKey,
        /// Evidence height.
        height: u64,
        /// Fields before the marking.
        prior: IllegalPrior,
    },
    /// A CR member was found illegal (forwarded to the committee).
    CrMemberIllegal {
        /// DID of the member.
        did: ProgramHash,
        /// Member state before the marking.
        ori_state: CrMemberState,
        /// Evidence height.
        height: u64,
    },
    /// A CR member's inactivity counting advanced (forwarded to the committee).
    CrMemberInactivity {
        /// DID of the member.
        did: ProgramHash,
        /// Whether the member was on duty this round.
        need_reset: bool,
        /// Member state before the update.
        ori_state: CrMemberState,
        /// Miss counter before the update.
        ori_inactive_count: u32,
        /// Confirmed height.
        height: u64,
    },
    /// A producer was deactivated through the emergency path.
    EmergencyInactive {
        /// Owner key of the producer.
        owner: PublicKey,
        /// Emergency height.
        height: u64,
        /// Fields before the deactivation.
        prior: InactivePrior,
    },
    /// The emergency set was cleared after recovery.
    LeaveEmergency {
        /// The emergency set being cleared.
        arbiters: Vec<PublicKey>,
    },
    /// A special transaction hash was recorded.
    SpecialTxRecord {
        /// The payload hash.
        hash: H256,
    },
    /// A deposit refund was processed.
    ReturnDeposit {
        /// Owner key of the producer.
        owner: PublicKey,
        /// Total deposit-output value consumed by the refund inputs.
        input_value: Amount,
        /// Change returned to the deposit address.
        change_value: Amount,
        /// State before the refund.
        prior_state: ProducerState,
    },
    /// An on-duty/missed-round counting step for one producer.
    UpdateInactivity {
        /// Owner key of the producer.
        owner: PublicKey,
        /// Which counting algorithm.
        version: InactivityVersion,
        /// Whether the producer was on duty or left/joined the set.
        need_reset: bool,
        /// Confirmed height.
        height: u64,
        /// Fields before the step.
        prior: InactivePrior,
    },
    /// The last block timestamp advanced.
    SetLastBlockTimestamp {
        /// Previous timestamp.
        old: u64,
        /// New timestamp.
        new: u64,
    },
    /// The no-claimed-DPoS-node flag changed.
    SetNoClaimDposNode {
        /// Previous value.
        old: bool,
        /// New value.
        new: bool,
    },
    /// The consensus algorithm flipped.
    SetConsensusAlgorithm {
        /// Previous algorithm.
        old: ConsensusAlgorithm,
        /// New algorithm.
        new: ConsensusAlgorithm,
    },
    /// The chain fell back to POW.
    RevertToPowState {
        /// Fallback height.
        height: u64,
        /// Algorithm before the fallback.
        prior_algorithm: ConsensusAlgorithm,
        /// `no_producers` before the fallback.
        prior_no_producers: bool,
        /// `no_claim_dpos_node` before the fallback.
        prior_no_claim: bool,
        /// `dpos_work_height` before the fallback.
        prior_work_height: u64,
        /// `revert_to_pow_block_height` before the fallback.
        prior_revert_height: u64,
    },
    /// A return to DPoS was scheduled.
    RevertToDposState {
        /// Height DPoS work resumes at.
        work_height: u64,
        /// `dpos_work_height` before the scheduling.
        prior_work_height: u64,
        /// `need_revert_to_dpos_tx` before the scheduling.
        prior_need_revert: bool,
    },
    /// The penalty-waiver window changed.
    SetVersionWindow {
        /// New window start.
        start: u64,
        /// New window end.
        end: u64,
        /// Previous window start.
        prior_start: u64,
        /// Previous window end.
        prior_end: u64,
    },
    /// The next-turn announcement debt changed.
    SetNeedNextTurnDposInfo {
        /// Previous value.
        old: bool,
        /// New value.
        new: bool,
    },
    /// A CR member claimed (or rotated) a DPoS node key.
    ClaimNodeKey {
        /// Owner key the node key maps to.
        owner: PublicKey,
        /// The claimed node key.
        new_node_key: PublicKey,
        /// The replaced node key, if one was mapped.
        old_node_key: Option<PublicKey>,
    },
    /// A v2 reward claim moved value into the claiming pipeline.
    ClaimReward {
        /// Reward recipient.
        recipient: ProgramHash,
        /// Claimed amount.
        amount: Amount,
        /// Hash of the claim transaction.
        tx_hash: H256,
    },
    /// A real-withdraw transaction settled pending claims.
    RealWithdraw {
        /// The settlements consumed, in input order.
        settlements: Vec<(H256, OutputInfo)>,
    },
    /// Irreversibility tracking initialized.
    InitIrreversible {
        /// Height of the first observation.
        height: u64,
        /// `last_irreversible_height` before initialization.
        prior_lih: u64,
        /// `dpos_start_height` before initialization.
        prior_dsh: u64,
    },
    /// The DPoS start height was pinned after a POW-to-DPoS transition.
    SetDposStartHeight {
        /// The new start height.
        new: u64,
        /// The previous start height.
        prior: u64,
    },
    /// The irreversible height advanced by one.
    AdvanceIrreversible {
        /// `last_irreversible_height` before the advance.
        prior_lih: u64,
        /// `dpos_start_height` before the advance.
        prior_dsh: u64,
    },
}

impl Mutation {
    /// Applies the mutation to a frame.
    pub fn apply(&self, frame: &mut StateKeyFrame, ctx: &MutationCtx<'_>) {
        match self {
            Self::RegisterProducer {
                owner,
                producer,
                deposit_outputs,
            } => {
                frame.nicknames.insert(producer.info.nickname.clone());
                frame
                    .node_owner_keys
                    .insert(producer.info.node_public_key, *owner);
                frame.producer_deposit_map.insert(producer.deposit_hash);
                for (refer_key, value) in deposit_outputs {
                    frame.deposit_outputs.insert(*refer_key, *value);
                }
                frame.producers.insert(*owner, (**producer).clone());
                frame.pending.insert(*owner);
            }
            Self::UpdateProducerInfo { owner, origin, update } => {
                update_producer_info(frame, owner, origin, update);
            }
            Self::CancelProducer {
                owner,
                height,
                prior_state,
            } => {
                let (nickname, is_v2) = match frame.producers.get_mut(owner) {
                    Some(p) => {
                        p.state = ProducerState::Canceled;
                        p.cancel_height = *height;
                        (p.info.nickname.clone(), p.is_dposv2())
                    }
                    None => return,
                };
                frame.canceled.insert(*owner);
                match prior_state {
                    ProducerState::Pending => {
                        frame.pending.remove(owner);
                        frame.pending_canceled.insert(*owner);
                    }
                    ProducerState::Active => {
                        frame.active.remove(owner);
                        if is_v2 {
                            frame.dposv2_active.remove(owner);
                        }
                    }
                    ProducerState::Inactive => {
                        frame.inactive.remove(owner);
                    }
                    _ => {}
                }
                frame.nicknames.remove(&nickname);
            }
            Self::SetActivateRequest { owner, height, .. } => {
                if let Some(p) = frame.producers.get_mut(owner) {
                    p.activate_request_height = *height;
                }
            }
            Self::PromoteToActive { owner, from } => {
                let is_v2 = match frame.producers.get_mut(owner) {
                    Some(p) => {
                        p.state = ProducerState::Active;
                        p.is_dposv2()
                    }
                    None => return,
                };
                frame.active.insert(*owner);
                if is_v2 {
                    frame.dposv2_active.insert(*owner);
                }
                match from {
                    ProducerState::Pending => frame.pending.remove(owner),
                    ProducerState::Inactive => frame.inactive.remove(owner),
                    ProducerState::Illegal => frame.illegal.remove(owner),
                    _ => false,
                };
            }
            Self::VoteRefAdd { refer_key } => {
                frame.votes.insert(*refer_key);
            }
            Self::VoteRefRemove { refer_key } => {
                frame.votes.remove(refer_key);
            }
            Self::AdjustVotes { owner, delta } => {
                if let Some(p) = frame.producers.get_mut(owner) {
                    p.votes += *delta;
                }
            }
            Self::AdjustTotalAmount { owner, delta } => {
                if let Some(p) = frame.producers.get_mut(owner) {
                    p.total_amount += *delta;
                }
            }
            Self::AdjustDepositAmount { owner, delta } => {
                if let Some(p) = frame.producers.get_mut(owner) {
                    p.deposit_amount += *delta;
                }
            }
            Self::AdjustStakeLedger { ledger, stake, delta } => {
                adjust_stake_ledger(frame, *ledger, stake, *delta);
            }
            Self::DetailV1Insert { refer_key, info } => {
                frame
                    .detail_dposv1_votes
                    .insert(*refer_key, (**info).clone());
            }
            Self::DetailV2Insert {
                owner,
                stake,
                refer_key,
                info,
            } => {
                let reached = match frame.producers.get_mut(owner) {
                    Some(p) => {
                        p.detailed_dposv2_votes
                            .entry(*stake)
                            .or_default()
                            .insert(*refer_key, (**info).clone());
                        p.dposv2_votes += info.info.votes;
                        p.dposv2_votes >= ctx.params.dposv2_effective_votes
                    }
                    None => return,
                };
                if reached {
                    frame.dposv2_effected.insert(*owner);
                }
            }
            Self::DetailV2Renew {
                owner,
                stake,
                old_refer_key,
                new_refer_key,
                new_info,
                ..
            } => {
                if let Some(p) = frame.producers.get_mut(owner) {
                    if let Some(inner) = p.detailed_dposv2_votes.get_mut(stake) {
                        inner.insert(*new_refer_key, (**new_info).clone());
                        inner.remove(old_refer_key);
                    }
                }
            }
            Self::MarkIllegal { owner, height, prior } => {
                let is_v2 = match frame.producers.get_mut(owner) {
                    Some(p) => {
                        p.illegal_height = *height;
                        if *height >= ctx.params.change_committee_new_cr_height {
                            p.penalty += ctx.params.illegal_penalty;
                        }
                        match prior.state {
                            ProducerState::Active
                            | ProducerState::Inactive
                            | ProducerState::Canceled => p.state = ProducerState::Illegal,
                            _ => {}
                        }
                        if prior.state != ProducerState::Canceled {
                            p.activate_request_height = u64::MAX;
                        }
                        p.is_dposv2()
                    }
                    None => return,
                };
                match prior.state {
                    ProducerState::Active => {
                        frame.illegal.insert(*owner);
                        frame.active.remove(owner);
                        if is_v2 {
                            frame.dposv2_active.remove(owner);
                        }
                    }
                    ProducerState::Inactive => {
                        frame.illegal.insert(*owner);
                        frame.inactive.remove(owner);
                    }
                    ProducerState::Canceled => {
                        frame.illegal.insert(*owner);
                        frame.canceled.remove(owner);
                    }
                    _ => {}
                }
            }
            Self::CrMemberIllegal { did, height, .. } => {
                if let Some(hooks) = ctx.cr_hooks {
                    (hooks.try_update_cr_member_illegal)(*did, *height);
                }
            }
            Self::CrMemberInactivity {
                did,
                need_reset,
                height,
                ..
            } => {
                if let Some(hooks) = ctx.cr_hooks {
                    (hooks.try_update_cr_member_inactivity)(*did, *need_reset, *height);
                }
            }
            Self::EmergencyInactive { owner, height, .. } => {
                set_inactive_producer(frame, ctx.params, owner, *height, true);
                frame.emergency_inactive_arbiters.insert(*owner);
            }
            Self::LeaveEmergency { .. } => {
                frame.emergency_inactive_arbiters.clear();
            }
            Self::SpecialTxRecord { hash } => {
                frame.special_tx_hashes.insert(*hash);
            }
            Self::ReturnDeposit {
                owner,
                input_value,
                change_value,
                ..
            } => {
                if let Some(p) = frame.producers.get_mut(owner) {
                    p.total_amount -= *input_value;
                    if p.state == ProducerState::Canceled
                        && p.total_amount + *change_value - p.penalty
                            <= ctx.params.min_transaction_fee
                    {
                        p.state = ProducerState::Returned;
                    }
                }
            }
            Self::UpdateInactivity {
                owner,
                version,
                need_reset,
                height,
                ..
            } => match version {
                InactivityVersion::CountingHeight => {
                    update_inactivity_counting_height(frame, ctx.params, owner, *need_reset, *height)
                }
                InactivityVersion::SplitCounter => {
                    update_inactivity_split_counter(frame, ctx.params, owner, *need_reset, *height)
                }
            },
            Self::SetLastBlockTimestamp { new, .. } => {
                frame.last_block_timestamp = *new;
            }
            Self::SetNoClaimDposNode { new, .. } => {
                frame.no_claim_dpos_node = *new;
            }
            Self::SetConsensusAlgorithm { new, .. } => {
                frame.consensus_algorithm = *new;
            }
            Self::RevertToPowState { height, .. } => {
                frame.consensus_algorithm = ConsensusAlgorithm::Pow;
                frame.no_producers = false;
                frame.no_claim_dpos_node = false;
                frame.dpos_work_height = 0;
                frame.revert_to_pow_block_height = *height;
            }
            Self::RevertToDposState { work_height, .. } => {
                frame.dpos_work_height = *work_height;
                frame.need_revert_to_dpos_tx = false;
            }
            Self::SetVersionWindow { start, end, .. } => {
                frame.version_start_height = *start;
                frame.version_end_height = *end;
            }
            Self::SetNeedNextTurnDposInfo { new, .. } => {
                frame.need_next_turn_dpos_info = *new;
            }
            Self::ClaimNodeKey {
                owner,
                new_node_key,
                old_node_key,
            } => {
                frame.node_owner_keys.insert(*new_node_key, *owner);
                if let Some(old) = old_node_key {
                    frame.node_owner_keys.remove(old);
                }
            }
            Self::ClaimReward {
                recipient,
                amount,
                tx_hash,
            } => {
                StateKeyFrame::adjust_amount(&mut frame.dposv2_reward_info, recipient, -*amount);
                StateKeyFrame::adjust_amount(
                    &mut frame.dposv2_reward_claiming_info,
                    recipient,
                    *amount,
                );
                frame.withdrawable_tx_info.insert(
                    *tx_hash,
                    OutputInfo {
                        recipient: *recipient,
                        amount: *amount,
                    },
                );
            }
            Self::RealWithdraw { settlements } => {
                for (hash, info) in settlements {
                    StateKeyFrame::adjust_amount(
                        &mut frame.dposv2_reward_claiming_info,
                        &info.recipient,
                        -info.amount,
                    );
                    StateKeyFrame::adjust_amount(
                        &mut frame.dposv2_reward_claimed_info,
                        &info.recipient,
                        info.amount,
                    );
                    frame.withdrawable_tx_info.remove(hash);
                }
            }
            Self::InitIrreversible { height, .. } => {
                frame.last_irreversible_height = *height - IRREVERSIBLE_HEIGHT;
                frame.dpos_start_height = frame.last_irreversible_height;
            }
            Self::SetDposStartHeight { new, .. } => {
                frame.dpos_start_height = *new;
            }
            Self::AdvanceIrreversible { .. } => {
                frame.dpos_start_height += 1;
                frame.last_irreversible_height = frame.dpos_start_height;
            }
        }
    }

    /// Reverts the mutation on a frame.
    pub fn revert(&self, frame: &mut StateKeyFrame, ctx: &MutationCtx<'_>) {
        match self {
            Self::RegisterProducer {
                owner,
                producer,
                deposit_outputs,
            } => {
                frame.nicknames.remove(&producer.info.nickname);
                frame.node_owner_keys.remove(&producer.info.node_public_key);
                frame.producer_deposit_map.remove(&producer.deposit_hash);
                for (refer_key, _) in deposit_outputs {
                    frame.deposit_outputs.remove(refer_key);
                }
                frame.pending.remove(owner);
                frame.producers.remove(owner);
            }
            Self::UpdateProducerInfo { owner, origin, update } => {
                update_producer_info(frame, owner, update, origin);
            }
            Self::CancelProducer {
                owner, prior_state, ..
            } => {
                let (nickname, is_v2) = match frame.producers.get_mut(owner) {
                    Some(p) => {
                        p.state = *prior_state;
                        p.cancel_height = 0;
                        (p.info.nickname.clone(), p.is_dposv2())
                    }
                    None => return,
                };
                frame.canceled.remove(owner);
                match prior_state {
                    ProducerState::Pending => {
                        frame.pending.insert(*owner);
                        frame.pending_canceled.remove(owner);
                    }
                    ProducerState::Active => {
                        frame.active.insert(*owner);
                        if is_v2 {
                            frame.dposv2_active.insert(*owner);
                        }
                    }
                    ProducerState::Inactive => {
                        frame.inactive.insert(*owner);
                    }
                    _ => {}
                }
                frame.nicknames.insert(nickname);
            }
            Self::SetActivateRequest { owner, prior, .. } => {
                if let Some(p) = frame.producers.get_mut(owner) {
                    p.activate_request_height = *prior;
                }
            }
            Self::PromoteToActive { owner, from } => {
                let is_v2 = match frame.producers.get_mut(owner) {
                    Some(p) => {
                        p.state = *from;
                        p.is_dposv2()
                    }
                    None => return,
                };
                frame.active.remove(owner);
                if is_v2 {
                    frame.dposv2_active.remove(owner);
                }
                match from {
                    ProducerState::Pending => frame.pending.insert(*owner),
                    ProducerState::Inactive => frame.inactive.insert(*owner),
                    ProducerState::Illegal => frame.illegal.insert(*owner),
                    _ => false,
                };
            }
            Self::VoteRefAdd { refer_key } => {
                frame.votes.remove(refer_key);
            }
            Self::VoteRefRemove { refer_key } => {
                frame.votes.insert(*refer_key);
            }
            Self::AdjustVotes { owner, delta } => {
                if let Some(p) = frame.producers.get_mut(owner) {
                    p.votes -= *delta;
                }
            }
            Self::AdjustTotalAmount { owner, delta } => {
                if let Some(p) = frame.producers.get_mut(owner) {
                    p.total_amount -= *delta;
                }
            }
            Self::AdjustDepositAmount { owner, delta } => {
                if let Some(p) = frame.producers.get_mut(owner) {
                    p.deposit_amount -= *delta;
                }
            }
            Self::AdjustStakeLedger { ledger, stake, delta } => {
                adjust_stake_ledger(frame, *ledger, stake, -*delta);
            }
            Self::DetailV1Insert { refer_key, .. } => {
                frame.detail_dposv1_votes.remove(refer_key);
            }
            Self::DetailV2Insert {
                owner,
                stake,
                refer_key,
                info,
            } => {
                let below = match frame.producers.get_mut(owner) {
                    Some(p) => {
                        if let Some(inner) = p.detailed_dposv2_votes.get_mut(stake) {
                            inner.remove(refer_key);
                            if inner.is_empty() {
                                p.detailed_dposv2_votes.remove(stake);
                            }
                        }
                        p.dposv2_votes -= info.info.votes;
                        p.dposv2_votes < ctx.params.dposv2_effective_votes
                    }
                    None => return,
                };
                if below {
                    frame.dposv2_effected.remove(owner);
                }
            }
            Self::DetailV2Renew {
                owner,
                stake,
                old_refer_key,
                old_info,
                new_refer_key,
                ..
            } => {
                if let Some(p) = frame.producers.get_mut(owner) {
                    if let Some(inner) = p.detailed_dposv2_votes.get_mut(stake) {
                        inner.insert(*old_refer_key, (**old_info).clone());
                        inner.remove(new_refer_key);
                    }
                }
            }
            Self::MarkIllegal { owner, prior, .. } => {
                let is_v2 = match frame.producers.get_mut(owner) {
                    Some(p) => {
                        p.state = prior.state;
                        p.penalty = prior.penalty;
                        p.illegal_height = prior.illegal_height;
                        p.activate_request_height = prior.activate_request_height;
                        p.is_dposv2()
                    }
                    None => return,
                };
                match prior.state {
                    ProducerState::Active => {
                        frame.illegal.remove(owner);
                        frame.active.insert(*owner);
                        if is_v2 {
                            frame.dposv2_active.insert(*owner);
                        }
                    }
                    ProducerState::Inactive => {
                        frame.illegal.remove(owner);
                        frame.inactive.insert(*owner);
                    }
                    ProducerState::Canceled => {
                        frame.illegal.remove(owner);
                        frame.canceled.insert(*owner);
                    }
                    _ => {}
                }
            }
            Self::CrMemberIllegal {
                did,
                ori_state,
                height,
            } => {
                if let Some(hooks) = ctx.cr_hooks {
                    (hooks.try_revert_cr_member_illegal)(*did, *ori_state, *height);
                }
            }
            Self::CrMemberInactivity {
                did,
                ori_state,
                ori_inactive_count,
                height,
                ..
            } => {
                if let Some(hooks) = ctx.cr_hooks {
                    (hooks.try_revert_cr_member_inactivity)(
                        *did,
                        *ori_state,
                        *ori_inactive_count,
                        *height,
                    );
                }
            }
            Self::EmergencyInactive { owner, prior, .. } => {
                restore_inactive_prior(frame, owner, prior);
                frame.emergency_inactive_arbiters.remove(owner);
            }
            Self::LeaveEmergency { arbiters } => {
                frame.emergency_inactive_arbiters = arbiters.iter().copied().collect();
            }
            Self::SpecialTxRecord { hash } => {
                frame.special_tx_hashes.remove(hash);
            }
            Self::ReturnDeposit {
                owner,
                input_value,
                prior_state,
                ..
            } => {
                if let Some(p) = frame.producers.get_mut(owner) {
                    p.total_amount += *input_value;
                    p.state = *prior_state;
                }
            }
            Self::UpdateInactivity { owner, prior, .. } => {
                restore_inactive_prior(frame, owner, prior);
            }
            Self::SetLastBlockTimestamp { old, .. } => {
                frame.last_block_timestamp = *old;
            }
            Self::SetNoClaimDposNode { old, .. } => {
                frame.no_claim_dpos_node = *old;
            }
            Self::SetConsensusAlgorithm { old, .. } => {
                frame.consensus_algorithm = *old;
            }
            Self::RevertToPowState {
                prior_algorithm,
                prior_no_producers,
                prior_no_claim,
                prior_work_height,
                prior_revert_height,
                ..
            } => {
                frame.consensus_algorithm = *prior_algorithm;
                frame.no_producers = *prior_no_producers;
                frame.no_claim_dpos_node = *prior_no_claim;
                frame.dpos_work_height = *prior_work_height;
                frame.revert_to_pow_block_height = *prior_revert_height;
            }
            Self::RevertToDposState {
                prior_work_height,
                prior_need_revert,
                ..
            } => {
                frame.dpos_work_height = *prior_work_height;
                frame.need_revert_to_dpos_tx = *prior_need_revert;
            }
            Self::SetVersionWindow {
                prior_start,
                prior_end,
                ..
            } => {
                frame.version_start_height = *prior_start;
                frame.version_end_height = *prior_end;
            }
            Self::SetNeedNextTurnDposInfo { old, .. } => {
                frame.need_next_turn_dpos_info = *old;
            }
            Self::ClaimNodeKey {
                owner,
                new_node_key,
                old_node_key,
            } => {
                frame.node_owner_keys.remove(new_node_key);
                if let Some(old) = old_node_key {
                    frame.node_owner_keys.insert(*old, *owner);
                }
            }
            Self::ClaimReward {
                recipient,
                amount,
                tx_hash,
            } => {
                StateKeyFrame::adjust_amount(&mut frame.dposv2_reward_info, recipient, *amount);
                StateKeyFrame::adjust_amount(
                    &mut frame.dposv2_reward_claiming_info,
                    recipient,
                    -*amount,
                );
                frame.withdrawable_tx_info.remove(tx_hash);
            }
            Self::RealWithdraw { settlements } => {
                for (hash, info) in settlements.iter().rev() {
                    frame.withdrawable_tx_info.insert(*hash, *info);
                    StateKeyFrame::adjust_amount(
                        &mut frame.dposv2_reward_claiming_info,
                        &info.recipient,
                        info.amount,
                    );
                    StateKeyFrame::adjust_amount(
                        &mut frame.dposv2_reward_claimed_info,
                        &info.recipient,
                        -info.amount,
                    );
                }
            }
            Self::InitIrreversible {
                prior_lih,
                prior_dsh,
                ..
            } => {
                frame.last_irreversible_height = *prior_lih;
                frame.dpos_start_height = *prior_dsh;
            }
            Self::SetDposStartHeight { prior, .. } => {
                frame.dpos_start_height = *prior;
            }
            Self::AdvanceIrreversible {
                prior_lih,
                prior_dsh,
            } => {
                frame.last_irreversible_height = *prior_lih;
                frame.dpos_start_height = *prior_dsh;
            }
        }
    }
}

// Symmetric info update: swapping the argument order reverts it.
fn update_producer_info(
    frame: &mut StateKeyFrame,
    owner: &PublicKey,
    origin: &ProducerInfo,
    update: &ProducerInfo,
) {
    if origin.nickname != update.nickname {
        frame.nicknames.remove(&origin.nickname);
        frame.nicknames.insert(update.nickname.clone());
    }
    if origin.node_public_key != update.node_public_key {
        frame.node_owner_keys.remove(&origin.node_public_key);
        frame
            .node_owner_keys
            .insert(update.node_public_key, origin.owner_public_key);
    }
    if let Some(p) = frame.producers.get_mut(owner) {
        p.info = update.clone();
    }
}

fn adjust_stake_ledger(
    frame: &mut StateKeyFrame,
    ledger: StakeLedger,
    stake: &ProgramHash,
    delta: Amount,
) {
    let map = match ledger {
        StakeLedger::VoteRights => &mut frame.dposv2_vote_rights,
        StakeLedger::DposV1 => &mut frame.dpos_votes,
        StakeLedger::DposV2 => &mut frame.dposv2_votes,
        StakeLedger::Cr => &mut frame.cr_votes,
        StakeLedger::CrImpeachment => &mut frame.cr_impeachment_votes,
    };
    StateKeyFrame::adjust_amount(map, stake, delta);
}

/// Moves an active producer to inactive state, with the penalty rules.
pub(crate) fn set_inactive_producer(
    frame: &mut StateKeyFrame,
    params: &ChainParams,
    owner: &PublicKey,
    height: u64,
    emergency: bool,
) {
    let outside_waiver =
        height < frame.version_start_height || height >= frame.version_end_height;
    let is_v2 = match frame.producers.get_mut(owner) {
        Some(p) => {
            p.inactive_since = height;
            p.activate_request_height = u64::MAX;
            p.state = ProducerState::Inactive;
            p.selected = false;
            if outside_waiver {
                if emergency {
                    p.penalty += params.emergency_inactive_penalty;
                } else if height >= params.change_committee_new_cr_height {
                    p.penalty += params.inactive_penalty;
                }
            }
            p.is_dposv2()
        }
        None => return,
    };
    frame.inactive.insert(*owner);
    frame.active.remove(owner);
    if is_v2 {
        frame.dposv2_active.remove(owner);
    }
}

// Exact restoration of everything inactivity accounting can touch. If the
// step deactivated the producer, the container move is undone as well.
fn restore_inactive_prior(frame: &mut StateKeyFrame, owner: &PublicKey, prior: &InactivePrior) {
    let (was_deactivated, is_v2) = match frame.producers.get_mut(owner) {
        Some(p) => {
            let was_deactivated =
                p.state == ProducerState::Inactive && prior.state == ProducerState::Active;
            p.state = prior.state;
            p.penalty = prior.penalty;
            p.inactive_since = prior.inactive_since;
            p.activate_request_height = prior.activate_request_height;
            p.selected = prior.selected;
            p.inactive_count = prior.inactive_count;
            p.random_candidate_inactive_count = prior.random_candidate_inactive_count;
            p.inactive_counting_height = prior.inactive_counting_height;
            p.last_update_inactive_height = prior.last_update_inactive_height;
            (was_deactivated, p.is_dposv2())
        }
        None => return,
    };
    if was_deactivated {
        frame.inactive.remove(owner);
        frame.active.insert(*owner);
        if is_v2 {
            frame.dposv2_active.insert(*owner);
        }
    }
}

// V0/V1 counting: a window measured from the first missed round.
fn update_inactivity_counting_height(
    frame: &mut StateKeyFrame,
    params: &ChainParams,
    owner: &PublicKey,
    need_reset: bool,
    height: u64,
) {
    let deactivate = match frame.producers.get_mut(owner) {
        Some(p) => {
            if need_reset {
                p.inactive_counting_height = 0;
                return;
            }
            if p.inactive_counting_height == 0 {
                p.inactive_counting_height = height;
            }
            if height - p.inactive_counting_height >= params.max_inactive_rounds as u64 {
                p.inactive_counting_height = 0;
                true
            } else {
                false
            }
        }
        None => return,
    };
    if deactivate {
        set_inactive_producer(frame, params, owner, height, false);
    }
}

// V2 counting: separate counters for randomly selected candidates and
// regular arbiters. The regular counter is zeroed only when it crosses the
// bound; the random counter additionally resets on non-contiguous misses.
fn update_inactivity_split_counter(
    frame: &mut StateKeyFrame,
    params: &ChainParams,
    owner: &PublicKey,
    need_reset: bool,
    height: u64,
) {
    let deactivate = match frame.producers.get_mut(owner) {
        Some(p) => {
            if need_reset {
                if p.selected {
                    p.random_candidate_inactive_count = 0;
                } else {
                    p.inactive_count = 0;
                }
                p.last_update_inactive_height = height;
                return;
            }

            if height != p.last_update_inactive_height + 1 && p.selected {
                p.random_candidate_inactive_count = 0;
            }

            let deactivate = if p.selected {
                p.random_candidate_inactive_count += 1;
                p.random_candidate_inactive_count >= params.max_inactive_rounds_of_random_node
            } else {
                p.inactive_count += 1;
                if p.inactive_count >= params.max_inactive_rounds {
                    p.inactive_count = 0;
                    true
                } else {
                    false
                }
            };
            p.last_update_inactive_height = height;
            deactivate
        }
        None => return,
    };
    if deactivate {
        set_inactive_producer(frame, params, owner, height, false);
    }
}
