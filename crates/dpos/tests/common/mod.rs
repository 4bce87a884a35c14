//! Shared fixtures for the state engine tests.

#![allow(dead_code)]

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use vertex_config::ChainParams;
use vertex_dpos::{ArbiterInfo, CrHooks, State, StateHooks, TransactionStore, UtxoCache};
use vertex_types::{
    ActivateProducer, Amount, Block, CandidateVotes, Confirm, ExchangeVotes, H256, InactiveArbitrators,
    Input, OutPoint, Output, OutputPayload, OutputType, Payload, ProcessProducer, ProducerInfo,
    Program, ProgramHash, PublicKey, RenewalVotesContent, Transaction, TxType, VoteContent,
    VoteOutput, VoteType, VotesContent, VotesWithLockTime, Voting, RENEWAL_VOTE_VERSION,
    VOTE_PRODUCER_VERSION,
};

/// In-memory transaction store backing the reference cache.
#[derive(Default)]
pub struct MemoryStore {
    transactions: RwLock<HashMap<H256, (Transaction, u64)>>,
}

impl MemoryStore {
    pub fn put(&self, tx: &Transaction, height: u64) {
        self.transactions
            .write()
            .insert(tx.hash(), (tx.clone(), height));
    }
}

impl TransactionStore for MemoryStore {
    fn get_transaction(&self, tx_id: &H256) -> Result<(Transaction, u64), String> {
        self.transactions
            .read()
            .get(tx_id)
            .cloned()
            .ok_or_else(|| "db: not found".to_string())
    }
}

/// A state engine wired with an in-memory store and a settable arbiter set.
pub struct Fixture {
    pub params: Arc<ChainParams>,
    pub state: State,
    pub store: Arc<MemoryStore>,
    pub arbiters: Arc<RwLock<Vec<ArbiterInfo>>>,
}

impl Fixture {
    pub fn new(params: ChainParams) -> Self {
        let params = Arc::new(params);
        let store = Arc::new(MemoryStore::default());
        let cache = Arc::new(UtxoCache::new(store.clone(), params.max_reference_size));
        let arbiters: Arc<RwLock<Vec<ArbiterInfo>>> = Arc::new(RwLock::new(Vec::new()));

        let arbiters_hook = arbiters.clone();
        let hooks = StateHooks {
            get_arbiters: Arc::new(move || arbiters_hook.read().clone()),
            get_cr_members: None,
            is_in_election_period: Some(Arc::new(|| false)),
            get_producer_deposit_amount: Arc::new(|_| Ok(Amount::ZERO)),
            get_tx_reference: Arc::new(move |tx| cache.get_tx_reference(tx)),
            cr: CrHooks::noop(),
        };

        let state = State::new(params.clone(), hooks);
        Self {
            params,
            state,
            store,
            arbiters,
        }
    }

    /// Parameters with protocol gates low enough for short test chains.
    pub fn test_params() -> ChainParams {
        ChainParams {
            public_dpos_height: 1,
            cr_claim_dpos_node_start_height: 1,
            change_committee_new_cr_height: 1,
            dposv2_start_height: 1,
            enable_activate_illegal_height: 1,
            revert_to_pow_start_height: 1_000_000,
            deposit_lockup_blocks: 20,
            min_deposit_amount: Amount::from_sela(5_000),
            min_transaction_fee: Amount::from_sela(10),
            illegal_penalty: Amount::from_sela(200),
            inactive_penalty: Amount::from_sela(50),
            emergency_inactive_penalty: Amount::from_sela(80),
            max_inactive_rounds: 720,
            max_inactive_rounds_of_random_node: 3,
            dposv2_effective_votes: Amount::from_sela(5_000),
            general_arbiters: 2,
            crc_arbiters: Vec::new(),
            max_reference_size: 1_000,
        }
    }

    pub fn set_arbiters(&self, node_keys: &[PublicKey]) {
        *self.arbiters.write() = node_keys
            .iter()
            .map(|key| ArbiterInfo {
                node_public_key: *key,
                is_normal: true,
                is_cr_member: false,
                claimed_dpos_node: false,
            })
            .collect();
    }

    pub fn process(&self, height: u64, txs: Vec<Transaction>) {
        for tx in &txs {
            self.store.put(tx, height);
        }
        self.state
            .process_block(&Block::new(height, height * 2_000, txs), None);
    }

    pub fn process_confirmed(&self, height: u64, txs: Vec<Transaction>, sponsor: PublicKey) {
        for tx in &txs {
            self.store.put(tx, height);
        }
        let confirm = Confirm::new(H256::NIL, sponsor);
        self.state
            .process_block(&Block::new(height, height * 2_000, txs), Some(&confirm));
    }

    pub fn process_empty(&self, heights: std::ops::RangeInclusive<u64>) {
        for height in heights {
            self.process(height, Vec::new());
        }
    }
}

// ---- keys and transactions ------------------------------------------------

pub fn test_key(tag: u8) -> PublicKey {
    let mut bytes = [0u8; 33];
    bytes[0] = 0x02;
    bytes[32] = tag;
    PublicKey::new(bytes)
}

pub fn node_key(tag: u8) -> PublicKey {
    let mut bytes = [0u8; 33];
    bytes[0] = 0x03;
    bytes[32] = tag;
    PublicKey::new(bytes)
}

pub fn producer_info(tag: u8, nickname: &str, stake_until: u64) -> ProducerInfo {
    ProducerInfo {
        owner_public_key: test_key(tag),
        node_public_key: node_key(tag),
        nickname: nickname.into(),
        url: String::new(),
        location: 0,
        net_address: String::new(),
        stake_until,
    }
}

pub fn register_tx(tag: u8, nickname: &str, deposit: i64, stake_until: u64) -> Transaction {
    let info = producer_info(tag, nickname, stake_until);
    let deposit_hash = ProgramHash::deposit_from_public_key(&info.owner_public_key);
    let mut tx = Transaction::new(TxType::RegisterProducer, Payload::RegisterProducer(info));
    tx.outputs
        .push(Output::plain(Amount::from_sela(deposit), deposit_hash));
    tx
}

pub fn cancel_tx(tag: u8) -> Transaction {
    Transaction::new(
        TxType::CancelProducer,
        Payload::CancelProducer(ProcessProducer {
            owner_public_key: test_key(tag),
        }),
    )
}

pub fn activate_tx(node: PublicKey) -> Transaction {
    Transaction::new(
        TxType::ActivateProducer,
        Payload::ActivateProducer(ActivateProducer {
            node_public_key: node,
        }),
    )
}

/// A v1 vote output transaction under the gross-value accounting version.
pub fn v1_vote_tx(candidates: &[PublicKey], value: i64) -> Transaction {
    let mut tx = Transaction::new(TxType::TransferAsset, Payload::TransferAsset);
    tx.outputs.push(Output {
        value: Amount::from_sela(value),
        output_lock: 0,
        program_hash: ProgramHash::standard_from_public_key(&test_key(200)),
        output_type: OutputType::Vote,
        payload: OutputPayload::Vote(VoteOutput {
            version: VOTE_PRODUCER_VERSION,
            contents: vec![VoteContent {
                vote_type: VoteType::Delegate,
                candidate_votes: candidates
                    .iter()
                    .map(|candidate| CandidateVotes {
                        candidate: candidate.as_bytes().to_vec(),
                        votes: Amount::from_sela(value),
                    })
                    .collect(),
            }],
        }),
    });
    tx
}

/// A plain transfer spending the given outpoints.
pub fn spend_tx(outpoints: &[(H256, u16)]) -> Transaction {
    let mut tx = Transaction::new(TxType::TransferAsset, Payload::TransferAsset);
    for (tx_id, index) in outpoints {
        tx.inputs
            .push(Input::new(OutPoint::new(*tx_id, *index), 0));
    }
    tx
}

/// Converts stake into vote rights; returns the transaction and the stake
/// identity it credits.
pub fn exchange_votes_tx(staker: &PublicKey, value: i64) -> (Transaction, ProgramHash) {
    let program = Program::standard(staker);
    let stake = program.stake_program_hash();
    let mut tx = Transaction::new(
        TxType::ExchangeVotes,
        Payload::ExchangeVotes(ExchangeVotes {
            exchange_value: Amount::from_sela(value),
        }),
    );
    tx.outputs.push(Output::plain(Amount::from_sela(value), stake));
    tx.programs.push(program);
    (tx, stake)
}

pub fn dposv2_vote_tx(
    staker: &PublicKey,
    candidate: &PublicKey,
    votes: i64,
    lock_time: u64,
) -> Transaction {
    let mut tx = Transaction::new(
        TxType::Voting,
        Payload::Voting(Voting {
            contents: vec![VotesContent {
                vote_type: VoteType::DposV2,
                votes_info: vec![VotesWithLockTime {
                    candidate: candidate.as_bytes().to_vec(),
                    votes: Amount::from_sela(votes),
                    lock_time,
                }],
            }],
            renewal_contents: Vec::new(),
        }),
    );
    tx.programs.push(Program::standard(staker));
    tx
}

pub fn renewal_vote_tx(
    staker: &PublicKey,
    refer_key: H256,
    candidate: &PublicKey,
    votes: i64,
    lock_time: u64,
) -> Transaction {
    let mut tx = Transaction::new(
        TxType::Voting,
        Payload::Voting(Voting {
            contents: Vec::new(),
            renewal_contents: vec![RenewalVotesContent {
                refer_key,
                votes_info: VotesWithLockTime {
                    candidate: candidate.as_bytes().to_vec(),
                    votes: Amount::from_sela(votes),
                    lock_time,
                },
            }],
        }),
    );
    tx.payload_version = RENEWAL_VOTE_VERSION;
    tx.programs.push(Program::standard(staker));
    tx
}

/// Conflicting-blocks evidence naming the given signer in both halves.
pub fn illegal_blocks_tx(signer: PublicKey, height: u64) -> Transaction {
    use vertex_types::{BlockEvidence, DposIllegalBlocks};
    Transaction::new(
        TxType::IllegalBlockEvidence,
        Payload::IllegalBlocks(DposIllegalBlocks {
            evidence: BlockEvidence {
                signers: vec![signer],
                block_height: height,
            },
            compare_evidence: BlockEvidence {
                signers: vec![signer],
                block_height: height,
            },
        }),
    )
}

pub fn inactive_arbitrators_tx(sponsor: PublicKey, nodes: Vec<PublicKey>, height: u64) -> Transaction {
    Transaction::new(
        TxType::InactiveArbitrators,
        Payload::InactiveArbitrators(InactiveArbitrators {
            sponsor,
            arbitrators: nodes,
            block_height: height,
        }),
    )
}

/// A deposit refund spending the given outpoints, paying `value` to a plain
/// standard address.
pub fn return_deposit_tx(tag: u8, outpoints: &[(H256, u16)], value: i64) -> Transaction {
    let mut tx = spend_tx(outpoints);
    tx.tx_type = TxType::ReturnDepositCoin;
    tx.payload = Payload::ReturnDepositCoin;
    tx.outputs.push(Output::plain(
        Amount::from_sela(value),
        ProgramHash::standard_from_public_key(&test_key(250)),
    ));
    tx.programs.push(Program::standard(&test_key(tag)));
    tx
}
