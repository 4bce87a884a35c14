//! The vote engine.
//!
//! Two regimes coexist. v1 votes ride on tagged transaction outputs and are
//! canceled when a later transaction spends them; v2 votes are staked through
//! exchange-votes and cast through `Voting` payloads with per-vote lock
//! times. Both flow through the history log like every other state change.

use tracing::warn;

use vertex_types::{
    Amount, DetailedVoteInfo, Output, PublicKey, Transaction, VoteType, Voting,
    RENEWAL_VOTE_VERSION, VOTE_VERSION, TX_VERSION_09, VOTE_PRODUCER_VERSION,
};

use crate::mutation::{Mutation, StakeLedger};
use crate::state::{Inner, State};
use crate::MIN_VOTES_LOCK_TIME;

impl State {
    // ---- v1 vote outputs -------------------------------------------------

    pub(crate) fn process_votes(&self, inner: &mut Inner, tx: &Transaction, height: u64) {
        if tx.version < TX_VERSION_09 {
            return;
        }
        let tx_hash = tx.hash();
        for (i, output) in tx.outputs.iter().enumerate() {
            let payload = match output.payload.as_vote() {
                Some(p) => p,
                None => continue,
            };
            let counts = payload.version == VOTE_PRODUCER_VERSION
                || payload
                    .contents
                    .iter()
                    .any(|c| c.vote_type == VoteType::Delegate);
            if !counts {
                continue;
            }
            let refer_key = vertex_types::OutPoint::new(tx_hash, i as u16).refer_key();
            self.push(inner, Mutation::VoteRefAdd { refer_key });
            self.process_vote_output(inner, output, height);
        }
    }

    fn process_vote_output(&self, inner: &mut Inner, output: &Output, _height: u64) {
        let payload = match output.payload.as_vote() {
            Some(p) => p,
            None => return,
        };
        for content in &payload.contents {
            if content.vote_type != VoteType::Delegate {
                continue;
            }
            for cv in &content.candidate_votes {
                let owner = match self.candidate_owner(inner, &cv.candidate) {
                    Some(owner) => owner,
                    None => continue,
                };
                let delta = if payload.version == VOTE_PRODUCER_VERSION {
                    output.value
                } else {
                    cv.votes
                };
                self.push(inner, Mutation::AdjustVotes { owner, delta });
            }
        }
    }

    // ---- v1 vote cancellation --------------------------------------------

    pub(crate) fn process_cancel_votes(&self, inner: &mut Inner, tx: &Transaction, height: u64) {
        let exist = tx
            .inputs
            .iter()
            .any(|input| inner.key_frame.votes.contains(&input.refer_key()));
        if !exist {
            return;
        }

        let references = match (self.hooks.get_tx_reference)(tx) {
            Ok(references) => references,
            Err(e) => {
                tracing::error!("get tx reference failed, tx hash: {}: {e}", tx.hash());
                return;
            }
        };
        for input in &tx.inputs {
            let refer_key = input.refer_key();
            if !inner.key_frame.votes.contains(&refer_key) {
                continue;
            }
            let output = match references.get(input) {
                Some(output) => output.clone(),
                None => continue,
            };
            self.process_vote_cancel(inner, &output, height);
            self.push(inner, Mutation::VoteRefRemove { refer_key });
        }
    }

    fn process_vote_cancel(&self, inner: &mut Inner, output: &Output, _height: u64) {
        let payload = match output.payload.as_vote() {
            Some(p) => p,
            None => return,
        };
        for content in &payload.contents {
            if content.vote_type != VoteType::Delegate {
                continue;
            }
            for cv in &content.candidate_votes {
                let owner = match self.candidate_owner(inner, &cv.candidate) {
                    Some(owner) => owner,
                    None => continue,
                };
                let delta = if payload.version == VOTE_PRODUCER_VERSION {
                    -output.value
                } else {
                    -cv.votes
                };
                self.push(inner, Mutation::AdjustVotes { owner, delta });
            }
        }
    }

    // ---- exchange votes --------------------------------------------------

    pub(crate) fn process_exchange_votes(&self, inner: &mut Inner, tx: &Transaction, height: u64) {
        let exchange_value = match &tx.payload {
            vertex_types::Payload::ExchangeVotes(p) => p.exchange_value,
            _ => return,
        };
        let stake = match tx.outputs.first() {
            Some(output) => output.program_hash,
            None => {
                warn!(height, "exchange votes tx {} has no outputs", tx.hash());
                return;
            }
        };
        self.push(
            inner,
            Mutation::AdjustStakeLedger {
                ledger: StakeLedger::VoteRights,
                stake,
                delta: exchange_value,
            },
        );
    }

    // ---- v2 voting -------------------------------------------------------

    pub(crate) fn process_voting(&self, inner: &mut Inner, tx: &Transaction, height: u64) {
        match tx.payload_version {
            VOTE_VERSION => self.process_voting_content(inner, tx, height),
            RENEWAL_VOTE_VERSION => self.process_renewal_voting_content(inner, tx, height),
            v => warn!("voting tx {} with unknown payload version {v}", tx.hash()),
        }
    }

    fn voting_payload_and_stake(
        &self,
        tx: &Transaction,
    ) -> Option<(Voting, vertex_types::ProgramHash)> {
        let payload = match &tx.payload {
            vertex_types::Payload::Voting(p) => p.clone(),
            _ => return None,
        };
        let stake = match tx.programs.first() {
            Some(program) => program.stake_program_hash(),
            None => {
                warn!("voting tx {} has no program", tx.hash());
                return None;
            }
        };
        Some((payload, stake))
    }

    fn process_voting_content(&self, inner: &mut Inner, tx: &Transaction, height: u64) {
        let (payload, stake) = match self.voting_payload_and_stake(tx) {
            Some(v) => v,
            None => return,
        };

        for content in &payload.contents {
            match content.vote_type {
                VoteType::Delegate => {
                    let max_votes = content
                        .votes_info
                        .iter()
                        .map(|v| v.votes)
                        .max()
                        .unwrap_or(Amount::ZERO);
                    self.push(
                        inner,
                        Mutation::AdjustStakeLedger {
                            ledger: StakeLedger::DposV1,
                            stake,
                            delta: max_votes,
                        },
                    );

                    for vote in &content.votes_info {
                        let owner = match self.candidate_owner(inner, &vote.candidate) {
                            Some(owner) => owner,
                            None => continue,
                        };
                        self.push(
                            inner,
                            Mutation::AdjustVotes {
                                owner,
                                delta: vote.votes,
                            },
                        );
                    }

                    for vote in &content.votes_info {
                        let detail = DetailedVoteInfo {
                            stake_program_hash: stake,
                            transaction_hash: tx.hash(),
                            block_height: height,
                            payload_version: tx.payload_version,
                            vote_type: content.vote_type,
                            info: vote.clone(),
                        };
                        let refer_key = detail.refer_key();
                        self.push(
                            inner,
                            Mutation::DetailV1Insert {
                                refer_key,
                                info: Box::new(detail),
                            },
                        );
                    }
                }
                VoteType::Crc => {
                    let total: Amount = content.votes_info.iter().map(|v| v.votes).sum();
                    self.push(
                        inner,
                        Mutation::AdjustStakeLedger {
                            ledger: StakeLedger::Cr,
                            stake,
                            delta: total,
                        },
                    );
                }
                // Proposal votes accumulate into the CR ledger with the max
                // rule, matching the deployed accounting.
                VoteType::CrcProposal => {
                    let max_votes = content
                        .votes_info
                        .iter()
                        .map(|v| v.votes)
                        .max()
                        .unwrap_or(Amount::ZERO);
                    self.push(
                        inner,
                        Mutation::AdjustStakeLedger {
                            ledger: StakeLedger::Cr,
                            stake,
                            delta: max_votes,
                        },
                    );
                }
                VoteType::CrcImpeachment => {
                    let total: Amount = content.votes_info.iter().map(|v| v.votes).sum();
                    self.push(
                        inner,
                        Mutation::AdjustStakeLedger {
                            ledger: StakeLedger::CrImpeachment,
                            stake,
                            delta: total,
                        },
                    );
                }
                VoteType::DposV2 => {
                    // Validate every vote of the content before mutating so a
                    // bad lock time rejects the content as a whole.
                    let mut valid = true;
                    for vote in &content.votes_info {
                        let producer = match self
                            .candidate_owner(inner, &vote.candidate)
                            .and_then(|owner| inner.key_frame.producers.get(&owner))
                            .filter(|p| p.is_dposv2())
                        {
                            Some(p) => p,
                            None => continue,
                        };
                        if vote.lock_time > producer.info().stake_until
                            || vote.lock_time < height + MIN_VOTES_LOCK_TIME
                        {
                            warn!(
                                height,
                                lock_time = vote.lock_time,
                                stake_until = producer.info().stake_until,
                                "invalid staked-vote lock time for {}",
                                producer.owner_public_key()
                            );
                            valid = false;
                            break;
                        }
                    }
                    if !valid {
                        continue;
                    }

                    let total: Amount = content.votes_info.iter().map(|v| v.votes).sum();
                    self.push(
                        inner,
                        Mutation::AdjustStakeLedger {
                            ledger: StakeLedger::DposV2,
                            stake,
                            delta: total,
                        },
                    );

                    for vote in &content.votes_info {
                        let owner = match self
                            .candidate_owner(inner, &vote.candidate)
                            .filter(|owner| {
                                inner
                                    .key_frame
                                    .producers
                                    .get(owner)
                                    .is_some_and(|p| p.is_dposv2())
                            }) {
                            Some(owner) => owner,
                            None => continue,
                        };
                        let detail = DetailedVoteInfo {
                            stake_program_hash: stake,
                            transaction_hash: tx.hash(),
                            block_height: height,
                            payload_version: tx.payload_version,
                            vote_type: content.vote_type,
                            info: vote.clone(),
                        };
                        let refer_key = detail.refer_key();
                        self.push(
                            inner,
                            Mutation::DetailV2Insert {
                                owner,
                                stake,
                                refer_key,
                                info: Box::new(detail),
                            },
                        );
                    }
                }
            }
        }
    }

    // ---- v2 vote renewal -------------------------------------------------

    fn process_renewal_voting_content(&self, inner: &mut Inner, tx: &Transaction, _height: u64) {
        let (payload, stake) = match self.voting_payload_and_stake(tx) {
            Some(v) => v,
            None => return,
        };

        for content in &payload.renewal_contents {
            let owner = match self
                .candidate_owner(inner, &content.votes_info.candidate)
                .filter(|owner| {
                    inner
                        .key_frame
                        .producers
                        .get(owner)
                        .is_some_and(|p| p.is_dposv2())
                }) {
                Some(owner) => owner,
                None => continue,
            };
            let old_info = match inner
                .key_frame
                .producers
                .get(&owner)
                .and_then(|p| p.detailed_dposv2_vote(&stake, &content.refer_key).ok())
            {
                Some(info) => info.clone(),
                None => {
                    warn!(
                        "renewal names unknown vote {} for {}",
                        content.refer_key, owner
                    );
                    continue;
                }
            };

            if old_info.vote_type != VoteType::DposV2
                || old_info.info.votes != content.votes_info.votes
                || old_info.info.candidate != content.votes_info.candidate
                || content.votes_info.lock_time <= old_info.block_height
            {
                warn!("rejected vote renewal {} for {}", content.refer_key, owner);
                continue;
            }

            let new_info = DetailedVoteInfo {
                stake_program_hash: stake,
                transaction_hash: tx.hash(),
                block_height: old_info.block_height,
                payload_version: old_info.payload_version,
                vote_type: VoteType::DposV2,
                info: content.votes_info.clone(),
            };
            let new_refer_key = new_info.refer_key();
            self.push(
                inner,
                Mutation::DetailV2Renew {
                    owner,
                    stake,
                    old_refer_key: content.refer_key,
                    old_info: Box::new(old_info),
                    new_refer_key,
                    new_info: Box::new(new_info),
                },
            );
        }
    }

    // Resolves a raw candidate identifier to a registered producer's owner
    // key, accepting either the node or the owner public key.
    fn candidate_owner(&self, inner: &Inner, candidate: &[u8]) -> Option<PublicKey> {
        let key = PublicKey::from_slice(candidate).ok()?;
        inner
            .key_frame
            .producer(&key)
            .map(|p| *p.owner_public_key())
    }
}
