//! The UTXO transaction model.
//!
//! This module provides the transaction-related types consumed by the state
//! engine:
//! - [`Transaction`] - version, kind, payload, inputs, outputs and programs
//! - [`Input`] / [`OutPoint`] - spent-output references with content-derived
//!   refer keys
//! - [`Output`] / [`OutputPayload`] - outputs, including tagged vote outputs
//! - [`TxType`] - the closed set of transaction kinds
//!
//! Transactions arrive at the engine pre-validated; the types here carry no
//! signature machinery. Hashing uses the canonical codec so transaction ids
//! and refer keys are stable across processes.

use crate::amount::Amount;
use crate::codec::WriteExt;
use crate::hash::{hash_serializable, H256};
use crate::keys::PublicKey;
use crate::payload::Payload;
use crate::program_hash::ProgramHash;
use serde::{Deserialize, Serialize};
use std::io;

/// Transaction version from which vote outputs are recognized.
pub const TX_VERSION_09: u8 = 0x09;

/// Vote output payload version that accounts votes by the output's gross value.
pub const VOTE_PRODUCER_VERSION: u8 = 0x00;

/// The closed set of transaction kinds.
///
/// The set is fixed by protocol; the dispatcher matches on it exhaustively,
/// so adding a kind is a compile-visible change everywhere it matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TxType {
    /// Block reward transaction.
    CoinBase = 0x00,
    /// Plain value transfer; may carry v1 vote outputs.
    TransferAsset = 0x02,
    /// Producer registration.
    RegisterProducer = 0x09,
    /// Producer cancellation.
    CancelProducer = 0x0a,
    /// Producer info update.
    UpdateProducer = 0x0b,
    /// Deposit refund for a canceled producer.
    ReturnDepositCoin = 0x0c,
    /// Activation request for an inactive or illegal producer.
    ActivateProducer = 0x0d,
    /// Evidence of conflicting proposals.
    IllegalProposalEvidence = 0x0e,
    /// Evidence of conflicting votes.
    IllegalVoteEvidence = 0x0f,
    /// Evidence of conflicting signed blocks.
    IllegalBlockEvidence = 0x10,
    /// Evidence of sidechain misbehavior.
    IllegalSidechainEvidence = 0x11,
    /// Emergency deactivation of arbiters.
    InactiveArbitrators = 0x12,
    /// Penalty-waiver window declaration.
    UpdateVersion = 0x13,
    /// Next-turn arbiter set announcement.
    NextTurnDposInfo = 0x14,
    /// CR council member claiming a DPoS node key.
    CrCouncilMemberClaimNode = 0x31,
    /// Consensus fallback to proof of work.
    RevertToPow = 0x41,
    /// Consensus return to DPoS.
    RevertToDpos = 0x42,
    /// Stake-to-vote-rights conversion.
    ExchangeVotes = 0x61,
    /// Staked (v2) voting and vote renewal.
    Voting = 0x62,
    /// DPoS v2 reward claim.
    DposV2ClaimReward = 0x70,
    /// Aggregated on-chain settlement of claimed rewards.
    DposV2ClaimRewardRealWithdraw = 0x71,
}

/// The category of votes a vote content carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum VoteType {
    /// Votes for block producers (v1 regime).
    Delegate = 0x00,
    /// Votes for CR council candidates.
    Crc = 0x01,
    /// Votes on CR council proposals.
    CrcProposal = 0x02,
    /// Votes to impeach a CR council member.
    CrcImpeachment = 0x03,
    /// Staked votes for producers (v2 regime).
    DposV2 = 0x04,
}

impl VoteType {
    fn serialize<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u8(*self as u8)
    }

    /// Decodes a vote type byte.
    pub fn from_byte(byte: u8) -> io::Result<Self> {
        match byte {
            0x00 => Ok(Self::Delegate),
            0x01 => Ok(Self::Crc),
            0x02 => Ok(Self::CrcProposal),
            0x03 => Ok(Self::CrcImpeachment),
            0x04 => Ok(Self::DposV2),
            b => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown vote type: {b:#04x}"),
            )),
        }
    }
}

/// Reference to a transaction output: transaction id plus output index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    /// Id of the transaction holding the referenced output.
    pub tx_id: H256,
    /// Index of the output inside that transaction.
    pub index: u16,
}

impl OutPoint {
    /// Creates an outpoint.
    pub const fn new(tx_id: H256, index: u16) -> Self {
        Self { tx_id, index }
    }

    /// The stable content-derived identifier of the referenced output.
    pub fn refer_key(&self) -> H256 {
        hash_serializable(|w| self.serialize(w))
    }

    /// Writes the outpoint to the canonical codec.
    pub fn serialize<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        self.tx_id.serialize(w)?;
        w.write_u16(self.index)
    }
}

/// A transaction input spending a previous output.
///
/// Inputs hash and compare by value: two inputs naming the same previous
/// output and sequence are the same key in any map, which is exactly what the
/// reference cache relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Input {
    /// The output being spent.
    pub previous: OutPoint,
    /// Input sequence number.
    pub sequence: u32,
}

impl Input {
    /// Creates an input spending the given outpoint.
    pub const fn new(previous: OutPoint, sequence: u32) -> Self {
        Self { previous, sequence }
    }

    /// The refer key of the output this input spends.
    pub fn refer_key(&self) -> H256 {
        self.previous.refer_key()
    }

    fn serialize<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        self.previous.serialize(w)?;
        w.write_u32(self.sequence)
    }
}

/// Tags describing the role of an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum OutputType {
    /// Plain value output.
    #[default]
    None = 0x00,
    /// Output carrying v1 producer votes.
    Vote = 0x01,
    /// Output carrying v2 staked votes.
    DposV2Vote = 0x03,
    /// Output converting stake into vote rights.
    ExchangeVotes = 0x04,
}

/// Votes for a single candidate inside a v1 vote output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateVotes {
    /// Candidate identifier (producer public key, or CID for CR votes).
    pub candidate: Vec<u8>,
    /// Vote weight assigned to the candidate.
    pub votes: Amount,
}

impl CandidateVotes {
    fn serialize<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_var_bytes(&self.candidate)?;
        self.votes.serialize(w)
    }
}

/// One vote content of a v1 vote output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteContent {
    /// Category of the votes.
    pub vote_type: VoteType,
    /// Per-candidate vote weights.
    pub candidate_votes: Vec<CandidateVotes>,
}

impl VoteContent {
    fn serialize<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        self.vote_type.serialize(w)?;
        w.write_var_uint(self.candidate_votes.len() as u64)?;
        for cv in &self.candidate_votes {
            cv.serialize(w)?;
        }
        Ok(())
    }
}

/// Payload of an output tagged [`OutputType::Vote`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOutput {
    /// Payload version; [`VOTE_PRODUCER_VERSION`] accounts by gross value.
    pub version: u8,
    /// The vote contents.
    pub contents: Vec<VoteContent>,
}

impl VoteOutput {
    fn serialize<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u8(self.version)?;
        w.write_var_uint(self.contents.len() as u64)?;
        for content in &self.contents {
            content.serialize(w)?;
        }
        Ok(())
    }
}

/// Payload of an output tagged [`OutputType::ExchangeVotes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeVoteOutput {
    /// Payload version.
    pub version: u8,
    /// The stake identity receiving vote rights.
    pub stake_address: ProgramHash,
    /// The converted value.
    pub votes: Amount,
}

impl ExchangeVoteOutput {
    fn serialize<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u8(self.version)?;
        self.stake_address.serialize(w)?;
        self.votes.serialize(w)
    }
}

/// The typed payload attached to an output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutputPayload {
    /// No payload.
    #[default]
    None,
    /// v1 vote payload.
    Vote(VoteOutput),
    /// Stake-exchange payload.
    ExchangeVotes(ExchangeVoteOutput),
}

impl OutputPayload {
    /// Returns the vote payload, if this output carries one.
    pub fn as_vote(&self) -> Option<&VoteOutput> {
        match self {
            Self::Vote(v) => Some(v),
            _ => None,
        }
    }

    fn serialize<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        match self {
            Self::None => w.write_u8(0x00),
            Self::Vote(v) => {
                w.write_u8(0x01)?;
                v.serialize(w)
            }
            Self::ExchangeVotes(ev) => {
                w.write_u8(0x02)?;
                ev.serialize(w)
            }
        }
    }
}

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    /// Output value.
    pub value: Amount,
    /// Height until which the output is locked.
    pub output_lock: u64,
    /// Destination script hash.
    pub program_hash: ProgramHash,
    /// Role tag.
    pub output_type: OutputType,
    /// Typed payload matching the role tag.
    pub payload: OutputPayload,
}

impl Output {
    /// Creates a plain value output.
    pub fn plain(value: Amount, program_hash: ProgramHash) -> Self {
        Self {
            value,
            output_lock: 0,
            program_hash,
            output_type: OutputType::None,
            payload: OutputPayload::None,
        }
    }

    fn serialize<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        self.value.serialize(w)?;
        w.write_u64(self.output_lock)?;
        self.program_hash.serialize(w)?;
        w.write_u8(self.output_type as u8)?;
        self.payload.serialize(w)
    }
}

/// A signing program: locking code plus its parameter.
///
/// For standard programs the code is `[len, key bytes..., op_checksig]`; the
/// engine extracts the embedded public key when it needs the signer identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    /// Locking code.
    pub code: Vec<u8>,
    /// Unlocking parameter (signature bytes; opaque here).
    pub parameter: Vec<u8>,
}

impl Program {
    /// Builds a standard program embedding the given public key.
    pub fn standard(key: &PublicKey) -> Self {
        let mut code = Vec::with_capacity(35);
        code.push(33);
        code.extend_from_slice(key.as_bytes());
        code.push(0xac);
        Self {
            code,
            parameter: Vec::new(),
        }
    }

    /// Extracts the public key embedded in a standard program code.
    pub fn code_public_key(&self) -> Option<PublicKey> {
        if self.code.len() < 2 {
            return None;
        }
        PublicKey::from_slice(&self.code[1..self.code.len() - 1]).ok()
    }

    /// Derives the stake identity of this program's code.
    pub fn stake_program_hash(&self) -> ProgramHash {
        ProgramHash::stake_from_code(&self.code)
    }

    fn serialize<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_var_bytes(&self.code)?;
        w.write_var_bytes(&self.parameter)
    }
}

/// A pre-validated transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction format version.
    pub version: u8,
    /// Transaction kind.
    pub tx_type: TxType,
    /// Payload format version.
    pub payload_version: u8,
    /// The typed payload.
    pub payload: Payload,
    /// Spent outputs.
    pub inputs: Vec<Input>,
    /// Created outputs.
    pub outputs: Vec<Output>,
    /// Earliest height the transaction may be packed at.
    pub lock_time: u64,
    /// Signing programs.
    pub programs: Vec<Program>,
}

impl Transaction {
    /// Creates a transaction of the given kind with empty inputs/outputs.
    pub fn new(tx_type: TxType, payload: Payload) -> Self {
        Self {
            version: TX_VERSION_09,
            tx_type,
            payload_version: 0,
            payload,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
            programs: Vec::new(),
        }
    }

    /// The transaction id: the hash of the canonical serialization.
    pub fn hash(&self) -> H256 {
        hash_serializable(|w| self.serialize(w))
    }

    /// The hash identifying a special (illegal/inactive) transaction by its
    /// evidence payload, deduplicated across re-submissions.
    pub fn special_tx_hash(&self) -> Option<H256> {
        self.payload.special_tx_hash()
    }

    /// Writes the transaction to the canonical codec.
    pub fn serialize<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u8(self.version)?;
        w.write_u8(self.tx_type as u8)?;
        w.write_u8(self.payload_version)?;
        self.payload.serialize(w)?;
        w.write_var_uint(self.inputs.len() as u64)?;
        for input in &self.inputs {
            input.serialize(w)?;
        }
        w.write_var_uint(self.outputs.len() as u64)?;
        for output in &self.outputs {
            output.serialize(w)?;
        }
        w.write_u64(self.lock_time)?;
        w.write_var_uint(self.programs.len() as u64)?;
        for program in &self.programs {
            program.serialize(w)?;
        }
        Ok(())
    }
}
