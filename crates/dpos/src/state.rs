//! The consensus state engine.
//!
//! [`State`] owns the aggregate key frame and its reversible history, routes
//! every transaction kind to its handler, and serves the read surface. One
//! logical writer advances the state block by block; readers take the shared
//! lock and either query the live frame or clone it for historical seeks.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use tracing::{error, info, warn};

use vertex_config::ChainParams;
use vertex_types::{
    ActivateProducer, Block, Confirm, CrCouncilMemberClaimNode, DposV2ClaimReward,
    DposV2ClaimRewardRealWithdraw, H256, InactiveArbitrators, OutputInfo, Payload,
    ProcessProducer, ProducerInfo, ProgramHash, PublicKey, RevertToDpos, RevertToPow,
    Transaction, TxType, UpdateVersion, VoteType, TX_VERSION_09, VOTE_PRODUCER_VERSION,
};

use crate::arbiters::{CrMember, StateFuncsConfig, StateHooks};
use crate::error::{Result, StateError};
use crate::history::History;
use crate::keyframe::{ConsensusAlgorithm, StateKeyFrame};
use crate::mutation::{IllegalPrior, InactivePrior, Mutation, MutationCtx};
use crate::producer::{Producer, ProducerState};
use crate::{
    ACTIVATE_DURATION, IRREVERSIBLE_HEIGHT, MAJORITY_SIGN_RATIO_DENOMINATOR,
    MAJORITY_SIGN_RATIO_NUMERATOR, MAX_HISTORY_CAPACITY,
};

pub(crate) struct Inner {
    pub(crate) key_frame: StateKeyFrame,
    pub(crate) history: History,
}

/// The DPoS consensus state engine.
pub struct State {
    pub(crate) params: Arc<ChainParams>,
    pub(crate) hooks: StateHooks,
    funcs: RwLock<Option<StateFuncsConfig>>,
    pub(crate) inner: RwLock<Inner>,
}

impl State {
    /// Creates a state engine over the given parameters and host hooks.
    pub fn new(params: Arc<ChainParams>, hooks: StateHooks) -> Self {
        Self {
            params,
            hooks,
            funcs: RwLock::new(None),
            inner: RwLock::new(Inner {
                key_frame: StateKeyFrame::new(),
                history: History::new(MAX_HISTORY_CAPACITY),
            }),
        }
    }

    /// Registers the functions only available once the surrounding node is up.
    pub fn register_functions(&self, cfg: StateFuncsConfig) {
        *self.funcs.write() = Some(cfg);
    }

    pub(crate) fn ctx(&self) -> MutationCtx<'_> {
        MutationCtx {
            params: &self.params,
            cr_hooks: Some(&self.hooks.cr),
        }
    }

    fn snapshot_ctx(&self) -> MutationCtx<'_> {
        MutationCtx {
            params: &self.params,
            cr_hooks: None,
        }
    }

    pub(crate) fn push(&self, inner: &mut Inner, mutation: Mutation) {
        let ctx = self.ctx();
        inner.history.append(mutation, &mut inner.key_frame, &ctx);
    }

    // ---- block processing ------------------------------------------------

    /// Advances the state over a block and, when present, its confirm.
    pub fn process_block(&self, block: &Block, confirm: Option<&Confirm>) {
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        self.process_transactions(inner, &block.transactions, block.height);
        self.update_producers_deposit_coin(inner, block.height);
        self.record_last_block_timestamp(inner, block);
        self.try_revert_to_pow_by_state_of_cr_member(inner, block.height);
        self.try_update_last_irreversible_height(inner, block.height);

        if let Some(confirm) = confirm {
            if block.height >= self.params.change_committee_new_cr_height {
                self.count_arbitrators_inactivity_v2(inner, block.height, confirm);
            } else if block.height >= self.params.cr_claim_dpos_node_start_height {
                self.count_arbitrators_inactivity_v1_locked(inner, block.height, confirm);
            } else {
                self.count_arbitrators_inactivity_v0(inner, block.height, confirm);
            }
        }

        if block.height >= self.params.dposv2_start_height
            && !inner.key_frame.withdrawable_tx_info.is_empty()
        {
            self.create_real_withdraw_transaction(inner, block.height);
        }

        inner.history.commit(block.height);
    }

    /// Applies a special (illegal/inactive) payload ahead of block packing.
    pub fn process_special_tx_payload(&self, payload: &Payload, height: u64) {
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        if let Payload::InactiveArbitrators(p) = payload {
            self.process_emergency_inactive_arbitrators(inner, p, 0);
        } else {
            self.process_illegal_evidence(inner, payload, 0);
        }

        inner.history.commit(height);
    }

    fn process_transactions(&self, inner: &mut Inner, txs: &[Transaction], height: u64) {
        for tx in txs {
            self.process_transaction(inner, tx, height);
        }

        // Pending producers that accrued enough confirmations become active.
        let pending: Vec<PublicKey> = inner
            .key_frame
            .producers_in(&inner.key_frame.pending)
            .filter(|p| height - p.register_height() + 1 >= ACTIVATE_DURATION)
            .map(|p| *p.owner_public_key())
            .collect();
        for owner in pending {
            self.push(
                inner,
                Mutation::PromoteToActive {
                    owner,
                    from: ProducerState::Pending,
                },
            );
        }

        let inactive: Vec<PublicKey> = inner
            .key_frame
            .producers_in(&inner.key_frame.inactive)
            .filter(|p| {
                height > p.activate_request_height()
                    && height - p.activate_request_height() + 1 >= ACTIVATE_DURATION
            })
            .map(|p| *p.owner_public_key())
            .collect();
        for owner in inactive {
            self.push(
                inner,
                Mutation::PromoteToActive {
                    owner,
                    from: ProducerState::Inactive,
                },
            );
        }

        if height >= self.params.enable_activate_illegal_height {
            let illegal: Vec<PublicKey> = inner
                .key_frame
                .producers_in(&inner.key_frame.illegal)
                .filter(|p| {
                    height > p.activate_request_height()
                        && height - p.activate_request_height() + 1 >= ACTIVATE_DURATION
                })
                .map(|p| *p.owner_public_key())
                .collect();
            for owner in illegal {
                self.push(
                    inner,
                    Mutation::PromoteToActive {
                        owner,
                        from: ProducerState::Illegal,
                    },
                );
            }
        }

        // Scheduled return from the POW fallback.
        if inner.key_frame.dpos_work_height != 0
            && height >= inner.key_frame.dpos_work_height
            && inner.key_frame.consensus_algorithm == ConsensusAlgorithm::Pow
        {
            self.push(
                inner,
                Mutation::SetConsensusAlgorithm {
                    old: ConsensusAlgorithm::Pow,
                    new: ConsensusAlgorithm::Dpos,
                },
            );
        }
    }

    fn process_transaction(&self, inner: &mut Inner, tx: &Transaction, height: u64) {
        match &tx.payload {
            Payload::CoinBase | Payload::TransferAsset => {
                if tx.tx_type == TxType::TransferAsset {
                    self.process_votes(inner, tx, height);
                }
            }
            Payload::RegisterProducer(info) => self.register_producer(inner, tx, info, height),
            Payload::UpdateProducer(info) => self.update_producer(inner, info, height),
            Payload::CancelProducer(p) => self.cancel_producer(inner, p, height),
            Payload::ActivateProducer(p) => self.activate_producer(inner, p, height),
            Payload::ExchangeVotes(_) => self.process_exchange_votes(inner, tx, height),
            Payload::Voting(_) => self.process_voting(inner, tx, height),
            Payload::IllegalProposals(_)
            | Payload::IllegalVotes(_)
            | Payload::IllegalBlocks(_)
            | Payload::SidechainIllegalData(_) => {
                self.process_illegal_evidence(inner, &tx.payload, height);
                self.record_special_tx(inner, tx);
            }
            Payload::InactiveArbitrators(p) => {
                self.process_emergency_inactive_arbitrators(inner, p, height);
                self.record_special_tx(inner, tx);
            }
            Payload::ReturnDepositCoin => self.return_deposit_locked(inner, tx, height),
            Payload::UpdateVersion(p) => self.update_version(inner, p),
            Payload::NextTurnDposInfo(_) => self.process_next_turn_dpos_info(inner, tx),
            Payload::CrCouncilMemberClaimNode(p) => {
                self.process_cr_council_member_claim_node(inner, p)
            }
            Payload::RevertToPow(p) => self.process_revert_to_pow(inner, p, height),
            Payload::RevertToDpos(p) => self.process_revert_to_dpos(inner, p, height),
            Payload::DposV2ClaimReward(p) => self.process_dposv2_claim_reward(inner, tx, p),
            Payload::DposV2ClaimRewardRealWithdraw(p) => {
                self.process_dposv2_claim_reward_real_withdraw(inner, p)
            }
        }

        if tx.tx_type != TxType::RegisterProducer {
            self.process_deposit(inner, tx, height);
        }
        self.process_cancel_votes(inner, tx, height);
    }

    // ---- producer lifecycle ----------------------------------------------

    fn register_producer(
        &self,
        inner: &mut Inner,
        tx: &Transaction,
        info: &ProducerInfo,
        height: u64,
    ) {
        let owner = info.owner_public_key;
        let program_hash = ProgramHash::deposit_from_public_key(&owner);

        let mut amount = vertex_types::Amount::ZERO;
        let mut deposit_outputs = Vec::new();
        let tx_hash = tx.hash();
        for (i, output) in tx.outputs.iter().enumerate() {
            if output.program_hash == program_hash {
                amount += output.value;
                let refer_key =
                    vertex_types::OutPoint::new(tx_hash, i as u16).refer_key();
                deposit_outputs.push((refer_key, output.value));
            }
        }

        if inner.key_frame.producer(&info.node_public_key).is_none() {
            let producer = Producer::new_pending(
                info.clone(),
                height,
                self.params.min_deposit_amount,
                amount,
                program_hash,
            );
            self.push(
                inner,
                Mutation::RegisterProducer {
                    owner,
                    producer: Box::new(producer),
                    deposit_outputs,
                },
            );
        } else {
            self.update_producer(inner, info, height);
        }
    }

    fn update_producer(&self, inner: &mut Inner, info: &ProducerInfo, height: u64) {
        let (owner, origin) = match inner.key_frame.producer(&info.owner_public_key) {
            Some(p) => (*p.owner_public_key(), p.info().clone()),
            None => {
                warn!(height, "update for unknown producer {}", info.owner_public_key);
                return;
            }
        };
        if origin.nickname != info.nickname {
            info!("update nickname {} to {}", origin.nickname, info.nickname);
        }
        self.push(
            inner,
            Mutation::UpdateProducerInfo {
                owner,
                origin: Box::new(origin),
                update: Box::new(info.clone()),
            },
        );
    }

    fn cancel_producer(&self, inner: &mut Inner, payload: &ProcessProducer, height: u64) {
        let (owner, prior_state) = match inner.key_frame.producer(&payload.owner_public_key) {
            Some(p) => (*p.owner_public_key(), p.state()),
            None => {
                warn!(height, "cancel for unknown producer {}", payload.owner_public_key);
                return;
            }
        };
        self.push(
            inner,
            Mutation::CancelProducer {
                owner,
                height,
                prior_state,
            },
        );
    }

    fn activate_producer(&self, inner: &mut Inner, payload: &ActivateProducer, height: u64) {
        let (owner, prior) = match inner.key_frame.producer(&payload.node_public_key) {
            Some(p) => (*p.owner_public_key(), p.activate_request_height()),
            None => return,
        };
        self.push(
            inner,
            Mutation::SetActivateRequest {
                owner,
                height,
                prior,
            },
        );
    }

    // ---- deposits --------------------------------------------------------

    fn process_deposit(&self, inner: &mut Inner, tx: &Transaction, _height: u64) {
        let tx_hash = tx.hash();
        for (i, output) in tx.outputs.iter().enumerate() {
            if !output.program_hash.is_deposit() {
                continue;
            }
            let owner = match inner.key_frame.producer_by_deposit_hash(&output.program_hash) {
                Some(p) => *p.owner_public_key(),
                None => continue,
            };
            self.push(
                inner,
                Mutation::AdjustTotalAmount {
                    owner,
                    delta: output.value,
                },
            );
            let refer_key = vertex_types::OutPoint::new(tx_hash, i as u16).refer_key();
            inner.key_frame.deposit_outputs.insert(refer_key, output.value);
        }
    }

    /// Processes a deposit-return transaction under the write lock.
    pub fn return_deposit(&self, tx: &Transaction, height: u64) {
        let mut guard = self.inner.write();
        self.return_deposit_locked(&mut guard, tx, height);
    }

    fn return_deposit_locked(&self, inner: &mut Inner, tx: &Transaction, _height: u64) {
        let mut input_value = vertex_types::Amount::ZERO;
        for input in &tx.inputs {
            if let Some(value) = inner.key_frame.deposit_outputs.get(&input.refer_key()) {
                input_value += *value;
            }
        }

        for program in &tx.programs {
            let public_key = match program.code_public_key() {
                Some(pk) => pk,
                None => continue,
            };
            let (owner, deposit_hash, prior_state) =
                match inner.key_frame.producer(&public_key) {
                    Some(p) => (*p.owner_public_key(), *p.deposit_hash(), p.state()),
                    None => continue,
                };

            let mut change_value = vertex_types::Amount::ZERO;
            for output in &tx.outputs {
                if output.program_hash == deposit_hash {
                    change_value += output.value;
                }
            }

            self.push(
                inner,
                Mutation::ReturnDeposit {
                    owner,
                    input_value,
                    change_value,
                    prior_state,
                },
            );
        }
    }

    fn update_producers_deposit_coin(&self, inner: &mut Inner, height: u64) {
        let owners: Vec<PublicKey> = inner
            .key_frame
            .canceled_producers()
            .iter()
            .filter(|p| height - p.cancel_height() == self.params.deposit_lockup_blocks)
            .map(|p| *p.owner_public_key())
            .collect();
        for owner in owners {
            self.push(
                inner,
                Mutation::AdjustDepositAmount {
                    owner,
                    delta: -self.params.min_deposit_amount,
                },
            );
        }
    }

    // ---- illegal evidence ------------------------------------------------

    fn process_illegal_evidence(&self, inner: &mut Inner, payload: &Payload, height: u64) {
        let illegal_producers: Vec<PublicKey> = match payload {
            Payload::IllegalProposals(p) => vec![p.evidence.sponsor],
            Payload::IllegalVotes(p) => vec![p.evidence.signer],
            Payload::IllegalBlocks(p) => {
                let signers: std::collections::HashSet<&PublicKey> =
                    p.evidence.signers.iter().collect();
                p.compare_evidence
                    .signers
                    .iter()
                    .filter(|pk| signers.contains(pk))
                    .copied()
                    .collect()
            }
            Payload::SidechainIllegalData(p) => vec![p.illegal_signer],
            _ => return,
        };

        let cr_members = self.claimed_cr_members_by_dpos_key();
        for public_key in illegal_producers {
            if let Some(member) = cr_members.get(&public_key) {
                if member.dpos_public_key.is_some() {
                    self.push(
                        inner,
                        Mutation::CrMemberIllegal {
                            did: member.did,
                            ori_state: member.member_state,
                            height,
                        },
                    );
                }
            }

            let owner = match inner.key_frame.node_owner_keys.get(&public_key) {
                Some(owner) => *owner,
                None => continue,
            };
            let frame = &inner.key_frame;
            let in_known_container = frame.active.contains(&owner)
                || frame.inactive.contains(&owner)
                || frame.illegal.contains(&owner)
                || frame.canceled.contains(&owner);
            if !in_known_container {
                continue;
            }
            let prior = match frame.producers.get(&owner) {
                Some(p) => IllegalPrior {
                    state: p.state(),
                    penalty: p.penalty(),
                    illegal_height: p.illegal_height(),
                    activate_request_height: p.activate_request_height(),
                },
                None => continue,
            };
            self.push(
                inner,
                Mutation::MarkIllegal {
                    owner,
                    height,
                    prior,
                },
            );
        }
    }

    fn record_special_tx(&self, inner: &mut Inner, tx: &Transaction) {
        match tx.special_tx_hash() {
            Some(hash) => self.push(inner, Mutation::SpecialTxRecord { hash }),
            None => error!("special tx payload hash missing for {}", tx.hash()),
        }
    }

    /// Drops a special transaction hash, e.g. when its block was orphaned.
    pub fn remove_special_tx(&self, hash: &H256) {
        self.inner.write().key_frame.special_tx_hashes.remove(hash);
    }

    fn process_emergency_inactive_arbitrators(
        &self,
        inner: &mut Inner,
        payload: &InactiveArbitrators,
        height: u64,
    ) {
        for node_key in &payload.arbitrators {
            let owner = match inner.key_frame.node_owner_keys.get(node_key) {
                Some(owner) => *owner,
                None => continue,
            };
            let frame = &inner.key_frame;
            if !frame.active.contains(&owner) && !frame.inactive.contains(&owner) {
                continue;
            }
            let prior = match frame.producers.get(&owner) {
                Some(p) => InactivePrior::capture(p),
                None => continue,
            };
            self.push(
                inner,
                Mutation::EmergencyInactive {
                    owner,
                    height,
                    prior,
                },
            );
        }
    }

    /// Clears the emergency set once the chain has recovered.
    pub fn leave_emergency(&self, height: u64) {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let arbiters: Vec<PublicKey> = inner
            .key_frame
            .emergency_inactive_arbiters
            .iter()
            .copied()
            .collect();
        self.push(inner, Mutation::LeaveEmergency { arbiters });
        inner.history.commit(height);
    }

    // ---- mode and window transactions ------------------------------------

    fn update_version(&self, inner: &mut Inner, payload: &UpdateVersion) {
        let mutation = Mutation::SetVersionWindow {
            start: payload.start_height,
            end: payload.end_height,
            prior_start: inner.key_frame.version_start_height,
            prior_end: inner.key_frame.version_end_height,
        };
        self.push(inner, mutation);
    }

    fn process_next_turn_dpos_info(&self, inner: &mut Inner, tx: &Transaction) {
        warn!("next turn dpos info tx: {}", tx.hash());
        let mutation = Mutation::SetNeedNextTurnDposInfo {
            old: inner.key_frame.need_next_turn_dpos_info,
            new: false,
        };
        self.push(inner, mutation);
    }

    fn process_cr_council_member_claim_node(
        &self,
        inner: &mut Inner,
        payload: &CrCouncilMemberClaimNode,
    ) {
        let owner = match self.cr_member_owner_key(&payload.cr_council_committee_did) {
            Some(owner) => owner,
            None => return,
        };
        let old_node_key = inner
            .key_frame
            .node_owner_keys
            .iter()
            .find(|(_, mapped_owner)| **mapped_owner == owner)
            .map(|(node_key, _)| *node_key);
        self.push(
            inner,
            Mutation::ClaimNodeKey {
                owner,
                new_node_key: payload.node_public_key,
                old_node_key,
            },
        );
    }

    fn process_revert_to_pow(&self, inner: &mut Inner, payload: &RevertToPow, height: u64) {
        let frame = &inner.key_frame;
        let mutation = Mutation::RevertToPowState {
            height,
            prior_algorithm: frame.consensus_algorithm,
            prior_no_producers: frame.no_producers,
            prior_no_claim: frame.no_claim_dpos_node,
            prior_work_height: frame.dpos_work_height,
            prior_revert_height: frame.revert_to_pow_block_height,
        };
        self.push(inner, mutation);
        info!(
            height,
            "revert to POW, type: {:?}", payload.revert_type
        );
    }

    fn process_revert_to_dpos(&self, inner: &mut Inner, payload: &RevertToDpos, height: u64) {
        let mutation = Mutation::RevertToDposState {
            work_height: height + payload.work_height_interval,
            prior_work_height: inner.key_frame.dpos_work_height,
            prior_need_revert: inner.key_frame.need_revert_to_dpos_tx,
        };
        self.push(inner, mutation);
    }

    fn try_revert_to_pow_by_state_of_cr_member(&self, inner: &mut Inner, height: u64) {
        let in_election = match &self.hooks.is_in_election_period {
            Some(f) => f(),
            None => return,
        };
        if !in_election
            || inner.key_frame.no_claim_dpos_node
            || inner.key_frame.consensus_algorithm == ConsensusAlgorithm::Pow
        {
            return;
        }
        let members = match &self.hooks.get_cr_members {
            Some(f) => f(),
            None => return,
        };
        if members
            .iter()
            .any(|m| m.member_state == crate::arbiters::CrMemberState::Elected)
        {
            return;
        }
        let mutation = Mutation::SetNoClaimDposNode {
            old: inner.key_frame.no_claim_dpos_node,
            new: true,
        };
        self.push(inner, mutation);
        info!(height, "no CR member claimed a DPoS node");
    }

    fn record_last_block_timestamp(&self, inner: &mut Inner, block: &Block) {
        let mutation = Mutation::SetLastBlockTimestamp {
            old: inner.key_frame.last_block_timestamp,
            new: block.timestamp,
        };
        self.push(inner, mutation);
    }

    // ---- rewards ---------------------------------------------------------

    fn process_dposv2_claim_reward(
        &self,
        inner: &mut Inner,
        tx: &Transaction,
        payload: &DposV2ClaimReward,
    ) {
        let recipient = match tx
            .programs
            .first()
            .and_then(|program| program.code_public_key())
        {
            Some(pk) => ProgramHash::standard_from_public_key(&pk),
            None => {
                warn!("claim reward tx {} without a standard program", tx.hash());
                return;
            }
        };
        self.push(
            inner,
            Mutation::ClaimReward {
                recipient,
                amount: payload.amount,
                tx_hash: tx.hash(),
            },
        );
    }

    fn process_dposv2_claim_reward_real_withdraw(
        &self,
        inner: &mut Inner,
        payload: &DposV2ClaimRewardRealWithdraw,
    ) {
        let mut settlements = Vec::with_capacity(payload.withdraw_transaction_hashes.len());
        for hash in &payload.withdraw_transaction_hashes {
            match inner.key_frame.withdrawable_tx_info.get(hash) {
                Some(info) => settlements.push((*hash, *info)),
                None => warn!("real withdraw names unknown claim tx {hash}"),
            }
        }
        self.push(inner, Mutation::RealWithdraw { settlements });
    }

    fn create_real_withdraw_transaction(&self, inner: &mut Inner, height: u64) {
        let funcs = match self.funcs.read().clone() {
            Some(funcs) => funcs,
            None => {
                warn!(
                    "{}",
                    StateError::HookUnregistered("create_dposv2_real_withdraw_transaction")
                );
                return;
            }
        };
        if height != (funcs.get_height)() {
            return;
        }

        let mut hashes = Vec::with_capacity(inner.key_frame.withdrawable_tx_info.len());
        let mut outputs = Vec::with_capacity(inner.key_frame.withdrawable_tx_info.len());
        for (hash, info) in &inner.key_frame.withdrawable_tx_info {
            hashes.push(*hash);
            outputs.push(*info);
        }

        let tx = match (funcs.create_dposv2_real_withdraw_transaction)(hashes, outputs) {
            Ok(tx) => tx,
            Err(e) => {
                error!("create real withdraw tx failed: {e}");
                return;
            }
        };
        info!("created real withdraw transaction {}", tx.hash());

        // Mempool and broadcast run off the write path, fire and forget.
        thread::spawn(move || {
            if (funcs.is_current)() {
                match (funcs.append_to_txpool)(tx.clone()) {
                    Ok(()) => (funcs.broadcast)(tx),
                    Err(e) => warn!("real withdraw tx rejected by tx pool: {e}"),
                }
            }
        });
    }

    // ---- irreversibility -------------------------------------------------

    fn try_update_last_irreversible_height(&self, inner: &mut Inner, height: u64) {
        if height < self.params.revert_to_pow_start_height {
            return;
        }

        let frame = &inner.key_frame;
        if frame.last_irreversible_height == 0 {
            let mutation = Mutation::InitIrreversible {
                height,
                prior_lih: frame.last_irreversible_height,
                prior_dsh: frame.dpos_start_height,
            };
            self.push(inner, mutation);
        } else if frame.consensus_algorithm == ConsensusAlgorithm::Dpos {
            if frame.dpos_work_height != 0 && height == frame.dpos_work_height + 1 {
                let mutation = Mutation::SetDposStartHeight {
                    new: height,
                    prior: frame.dpos_start_height,
                };
                self.push(inner, mutation);
            }
            let frame = &inner.key_frame;
            if height - frame.dpos_start_height >= IRREVERSIBLE_HEIGHT {
                let mutation = Mutation::AdvanceIrreversible {
                    prior_lih: frame.last_irreversible_height,
                    prior_dsh: frame.dpos_start_height,
                };
                self.push(inner, mutation);
            }
        }
    }

    /// Whether a reorganization detaching `detach_len` blocks from
    /// `cur_height` would cross the irreversible height.
    pub fn is_irreversible(&self, cur_height: u64, detach_len: u64) -> bool {
        let guard = self.inner.read();
        let frame = &guard.key_frame;

        if cur_height > detach_len
            && cur_height - detach_len - 1 <= frame.last_irreversible_height
        {
            return true;
        }
        if cur_height >= self.params.revert_to_pow_start_height {
            if frame.consensus_algorithm == ConsensusAlgorithm::Dpos
                && detach_len > IRREVERSIBLE_HEIGHT
            {
                return true;
            }
        } else if detach_len > IRREVERSIBLE_HEIGHT {
            return true;
        }
        false
    }

    /// The highest height the chain can no longer reorganize across.
    pub fn get_last_irreversible_height(&self) -> u64 {
        self.inner.read().key_frame.last_irreversible_height
    }

    // ---- rollback and history --------------------------------------------

    /// Rolls the state back so `height` is the last committed height.
    pub fn rollback_to(&self, height: u64) -> Result<()> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let ctx = self.ctx();
        inner
            .history
            .rollback_to(height, &mut inner.key_frame, &ctx)
    }

    /// Like [`State::rollback_to`], but caps at the retention window.
    pub fn rollback_seek_to(&self, height: u64) {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let ctx = self.ctx();
        inner
            .history
            .rollback_seek_to(height, &mut inner.key_frame, &ctx);
    }

    /// Returns a deep snapshot of the state as of `height`.
    pub fn get_history(&self, height: u64) -> Result<StateKeyFrame> {
        let guard = self.inner.read();
        let mut snapshot = guard.key_frame.snapshot();
        let ctx = self.snapshot_ctx();
        guard
            .history
            .seek_to(height, guard.history.current_height(), &mut snapshot, &ctx)?;
        Ok(snapshot)
    }

    /// A deep snapshot of the live state.
    pub fn snapshot(&self) -> StateKeyFrame {
        self.inner.read().key_frame.snapshot()
    }

    /// The last committed height.
    pub fn current_height(&self) -> u64 {
        self.inner.read().history.current_height()
    }

    // ---- CR committee plumbing -------------------------------------------

    fn cr_member_owner_key(&self, did: &ProgramHash) -> Option<PublicKey> {
        let get_cr_members = self.hooks.get_cr_members.as_ref()?;
        let members = get_cr_members();
        members
            .iter()
            .find(|m| m.did == *did)
            .and_then(|m| m.owner_public_key())
    }

    /// CR members that claimed a DPoS node, indexed by their owner key.
    pub(crate) fn claimed_cr_members_by_owner_key(&self) -> HashMap<PublicKey, CrMember> {
        let mut map = HashMap::new();
        if let Some(get_cr_members) = &self.hooks.get_cr_members {
            for member in get_cr_members() {
                if member.dpos_public_key.is_some() {
                    if let Some(owner) = member.owner_public_key() {
                        map.insert(owner, member);
                    }
                }
            }
        }
        map
    }

    /// CR members that claimed a DPoS node, indexed by that node key.
    pub(crate) fn claimed_cr_members_by_dpos_key(&self) -> HashMap<PublicKey, CrMember> {
        let mut map = HashMap::new();
        if let Some(get_cr_members) = &self.hooks.get_cr_members {
            for member in get_cr_members() {
                if let Some(dpos_key) = member.dpos_public_key {
                    map.insert(dpos_key, member);
                }
            }
        }
        map
    }

    /// Flags a producer as the round's randomly selected candidate.
    ///
    /// Invoked by arbiter election when the random slot is drawn. The flag
    /// routes inactivity counting to the random-candidate counter and is
    /// cleared again when the producer is set inactive.
    pub fn set_producer_selected(&self, public_key: &PublicKey, selected: bool) {
        let mut guard = self.inner.write();
        let frame = &mut guard.key_frame;
        let key = frame.producer_key(public_key);
        if let Some(producer) = frame.producers.get_mut(&key) {
            producer.selected = selected;
        }
    }

    /// Prunes node-key mappings that no longer belong to any live producer.
    ///
    /// Invoked by the host's event bus when the CR committee changes.
    pub fn handle_committee_change(&self) {
        let mut guard = self.inner.write();
        let frame = &mut guard.key_frame;
        let live = frame.all_node_public_keys();
        frame.node_owner_keys.retain(|node_key, _| live.contains(node_key));
    }
}

/// Pending reward settlements, exposed for transaction construction.
impl State {
    /// The pending reward settlements by claim transaction hash.
    pub fn get_real_withdraw_transactions(&self) -> HashMap<H256, OutputInfo> {
        self.inner.read().key_frame.withdrawable_tx_info.clone()
    }

    /// Looks up a detailed v1 vote record.
    pub fn get_detailed_dposv1_votes(
        &self,
        refer_key: &H256,
    ) -> Result<vertex_types::DetailedVoteInfo> {
        self.inner
            .read()
            .key_frame
            .detail_dposv1_votes
            .get(refer_key)
            .cloned()
            .ok_or(StateError::ReferKeyNotFound)
    }
}

// ---- read surface --------------------------------------------------------

impl State {
    /// Looks up a producer by node or owner public key, in any state.
    pub fn get_producer(&self, public_key: &PublicKey) -> Option<Producer> {
        self.inner.read().key_frame.producer(public_key).cloned()
    }

    /// All pending and active producers.
    pub fn get_producers(&self) -> Vec<Producer> {
        let guard = self.inner.read();
        let frame = &guard.key_frame;
        frame
            .producers_in(&frame.pending)
            .chain(frame.producers_in(&frame.active))
            .cloned()
            .collect()
    }

    /// All producers in every lifecycle state.
    pub fn get_all_producers(&self) -> Vec<Producer> {
        let guard = self.inner.read();
        let frame = &guard.key_frame;
        frame
            .producers_in(&frame.pending)
            .chain(frame.producers_in(&frame.active))
            .chain(frame.producers_in(&frame.inactive))
            .chain(frame.producers_in(&frame.canceled))
            .chain(frame.producers_in(&frame.illegal))
            .cloned()
            .collect()
    }

    /// Node public keys of all live producers plus the configured CRC
    /// arbiters.
    pub fn get_all_producers_public_keys(&self) -> Vec<PublicKey> {
        let guard = self.inner.read();
        let mut keys: Vec<PublicKey> = guard.key_frame.node_owner_keys.keys().copied().collect();
        keys.extend(self.params.crc_arbiters.iter().copied());
        keys
    }

    /// All pending producers.
    pub fn get_pending_producers(&self) -> Vec<Producer> {
        let guard = self.inner.read();
        let frame = &guard.key_frame;
        frame.producers_in(&frame.pending).cloned().collect()
    }

    /// All active producers.
    pub fn get_active_producers(&self) -> Vec<Producer> {
        let guard = self.inner.read();
        let frame = &guard.key_frame;
        frame.producers_in(&frame.active).cloned().collect()
    }

    /// All active v2-capable producers.
    pub fn get_activity_v2_producers(&self) -> Vec<Producer> {
        let guard = self.inner.read();
        let frame = &guard.key_frame;
        frame.producers_in(&frame.dposv2_active).cloned().collect()
    }

    /// Active producers holding v1 votes.
    pub fn get_voted_producers(&self) -> Vec<Producer> {
        let guard = self.inner.read();
        let frame = &guard.key_frame;
        frame
            .producers_in(&frame.active)
            .filter(|p| p.votes() > vertex_types::Amount::ZERO)
            .cloned()
            .collect()
    }

    /// Active producers whose v2 votes exceed the effective threshold.
    pub fn get_dposv2_effective_producers(&self) -> Vec<Producer> {
        let guard = self.inner.read();
        let frame = &guard.key_frame;
        frame
            .producers_in(&frame.active)
            .filter(|p| p.dposv2_votes() > self.params.dposv2_effective_votes)
            .cloned()
            .collect()
    }

    /// All canceled (not yet returned) producers.
    pub fn get_canceled_producers(&self) -> Vec<Producer> {
        let guard = self.inner.read();
        guard
            .key_frame
            .canceled_producers()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Producers canceled straight out of pending state.
    pub fn get_pending_canceled_producers(&self) -> Vec<Producer> {
        let guard = self.inner.read();
        let frame = &guard.key_frame;
        frame
            .producers_in(&frame.pending_canceled)
            .cloned()
            .collect()
    }

    /// Producers whose deposit has been returned.
    pub fn get_returned_deposit_producers(&self) -> Vec<Producer> {
        let guard = self.inner.read();
        guard
            .key_frame
            .returned_producers()
            .into_iter()
            .cloned()
            .collect()
    }

    /// All illegal producers.
    pub fn get_illegal_producers(&self) -> Vec<Producer> {
        let guard = self.inner.read();
        let frame = &guard.key_frame;
        frame.producers_in(&frame.illegal).cloned().collect()
    }

    /// All inactive producers.
    pub fn get_inactive_producers(&self) -> Vec<Producer> {
        let guard = self.inner.read();
        let frame = &guard.key_frame;
        frame.producers_in(&frame.inactive).cloned().collect()
    }

    /// Whether the key names a pending producer.
    pub fn is_pending_producer(&self, public_key: &PublicKey) -> bool {
        let guard = self.inner.read();
        let key = guard.key_frame.producer_key(public_key);
        guard.key_frame.pending.contains(&key)
    }

    /// Whether the key names an active producer.
    pub fn is_active_producer(&self, public_key: &PublicKey) -> bool {
        let guard = self.inner.read();
        let key = guard.key_frame.producer_key(public_key);
        guard.key_frame.active.contains(&key)
    }

    /// Whether the key names an inactive producer.
    pub fn is_inactive_producer(&self, public_key: &PublicKey) -> bool {
        let guard = self.inner.read();
        let key = guard.key_frame.producer_key(public_key);
        guard.key_frame.inactive.contains(&key)
    }

    /// Whether the key names a canceled producer.
    pub fn is_canceled_producer(&self, public_key: &PublicKey) -> bool {
        let guard = self.inner.read();
        let key = guard.key_frame.producer_key(public_key);
        guard.key_frame.canceled.contains(&key)
    }

    /// Whether the key names an illegal producer.
    pub fn is_illegal_producer(&self, public_key: &PublicKey) -> bool {
        let guard = self.inner.read();
        let key = guard.key_frame.producer_key(public_key);
        guard.key_frame.illegal.contains(&key)
    }

    /// Whether a producer exists under the node or owner public key.
    pub fn producer_exists(&self, public_key: &PublicKey) -> bool {
        self.inner.read().key_frame.producer(public_key).is_some()
    }

    /// Whether a producer exists under this owner public key.
    pub fn producer_owner_public_key_exists(&self, public_key: &PublicKey) -> bool {
        self.inner.read().key_frame.producers.contains_key(public_key)
    }

    /// Whether a producer exists under this node public key.
    pub fn producer_node_public_key_exists(&self, public_key: &PublicKey) -> bool {
        self.inner
            .read()
            .key_frame
            .node_owner_keys
            .contains_key(public_key)
    }

    /// Whether a producer registered this deposit program hash.
    pub fn exist_producer_by_deposit_hash(&self, program_hash: &ProgramHash) -> bool {
        self.inner
            .read()
            .key_frame
            .producer_deposit_map
            .contains(program_hash)
    }

    /// Whether the nickname is taken.
    pub fn nickname_exists(&self, nickname: &str) -> bool {
        self.inner.read().key_frame.nicknames.contains(nickname)
    }

    /// Whether a special transaction with this payload was processed.
    pub fn special_tx_exists(&self, tx: &Transaction) -> bool {
        let hash = match tx.special_tx_hash() {
            Some(hash) => hash,
            None => {
                error!("special tx payload cast failed, tx: {}", tx.hash());
                return false;
            }
        };
        self.inner.read().key_frame.special_tx_hashes.contains(&hash)
    }

    /// The consensus algorithm currently in force.
    pub fn get_consensus_algorithm(&self) -> ConsensusAlgorithm {
        self.inner.read().key_frame.consensus_algorithm
    }

    /// Whether most emergency-inactive arbiters have re-activated.
    pub fn is_able_to_recover_from_inactive_mode(&self) -> bool {
        let guard = self.inner.read();
        let frame = &guard.key_frame;
        let total = frame.emergency_inactive_arbiters.len();
        if total == 0 {
            return true;
        }
        let activated = frame
            .emergency_inactive_arbiters
            .iter()
            .filter(|key| !frame.inactive.contains(*key))
            .count();
        activated as f64 / total as f64
            > MAJORITY_SIGN_RATIO_NUMERATOR / MAJORITY_SIGN_RATIO_DENOMINATOR
    }

    /// Whether enough producers are active to run a full arbiter set.
    pub fn is_able_to_recover_from_understaffed_state(&self) -> bool {
        self.inner.read().key_frame.active.len() >= self.params.general_arbiters
    }

    /// Whether the transaction would change producer or vote state.
    pub fn is_dpos_transaction(&self, tx: &Transaction) -> bool {
        match tx.tx_type {
            TxType::RegisterProducer
            | TxType::UpdateProducer
            | TxType::CancelProducer
            | TxType::ActivateProducer
            | TxType::IllegalProposalEvidence
            | TxType::IllegalVoteEvidence
            | TxType::IllegalBlockEvidence
            | TxType::IllegalSidechainEvidence
            | TxType::InactiveArbitrators
            | TxType::ReturnDepositCoin => return true,
            TxType::TransferAsset => {
                if tx.version >= TX_VERSION_09 {
                    for output in &tx.outputs {
                        let payload = match output.payload.as_vote() {
                            Some(p) => p,
                            None => continue,
                        };
                        if payload.version == VOTE_PRODUCER_VERSION {
                            return true;
                        }
                        if payload
                            .contents
                            .iter()
                            .any(|c| c.vote_type == VoteType::Delegate)
                        {
                            return true;
                        }
                    }
                }
            }
            _ => {}
        }

        let guard = self.inner.read();
        tx.inputs
            .iter()
            .any(|input| guard.key_frame.votes.contains(&input.refer_key()))
    }
}
