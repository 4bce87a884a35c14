//! Transaction payloads.
//!
//! Every transaction kind the state engine dispatches on carries its payload
//! as one variant of the closed [`Payload`] enum; the dispatcher matches
//! exhaustively, so an unhandled kind cannot compile.

use crate::amount::Amount;
use crate::codec::{ReadExt, WriteExt};
use crate::hash::{hash_serializable, H256};
use crate::keys::PublicKey;
use crate::program_hash::ProgramHash;
use crate::transaction::VoteType;
use serde::{Deserialize, Serialize};
use std::io;

/// Payload version of plain (content) voting transactions.
pub const VOTE_VERSION: u8 = 0x00;

/// Payload version of vote-renewal transactions.
pub const RENEWAL_VOTE_VERSION: u8 = 0x01;

/// Registered producer information.
///
/// The owner key is the stable identity; the node key is rotatable through
/// producer updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerInfo {
    /// Long-lived identity key.
    pub owner_public_key: PublicKey,
    /// Operational block-signing key.
    pub node_public_key: PublicKey,
    /// Display name; unique among live producers.
    pub nickname: String,
    /// Producer website.
    pub url: String,
    /// Geographic location code.
    pub location: u64,
    /// Network address of the producer node.
    pub net_address: String,
    /// Height until which the producer accepts v2 staked votes;
    /// zero for v1-only producers.
    pub stake_until: u64,
}

impl ProducerInfo {
    /// Writes the info to the canonical codec.
    pub fn serialize<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        self.owner_public_key.serialize(w)?;
        self.node_public_key.serialize(w)?;
        w.write_var_string(&self.nickname)?;
        w.write_var_string(&self.url)?;
        w.write_u64(self.location)?;
        w.write_var_string(&self.net_address)?;
        w.write_u64(self.stake_until)
    }

    /// Reads the info from the canonical codec.
    pub fn deserialize<R: io::Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self {
            owner_public_key: PublicKey::deserialize(r)?,
            node_public_key: PublicKey::deserialize(r)?,
            nickname: r.read_var_string()?,
            url: r.read_var_string()?,
            location: r.read_u64()?,
            net_address: r.read_var_string()?,
            stake_until: r.read_u64()?,
        })
    }
}

/// Payload of cancel-producer transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessProducer {
    /// Owner key of the producer being canceled.
    pub owner_public_key: PublicKey,
}

/// Payload of activate-producer transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateProducer {
    /// Node key of the producer requesting activation.
    pub node_public_key: PublicKey,
}

/// Payload of exchange-votes transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeVotes {
    /// Stake value converted into vote rights.
    pub exchange_value: Amount,
}

/// A single vote with its lock time, as carried by v2 voting payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotesWithLockTime {
    /// Candidate identifier (producer public key, CID or proposal hash).
    pub candidate: Vec<u8>,
    /// Vote weight.
    pub votes: Amount,
    /// Height until which the vote is locked; zero outside the v2 regime.
    pub lock_time: u64,
}

impl VotesWithLockTime {
    /// Writes the vote to the canonical codec.
    pub fn serialize<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_var_bytes(&self.candidate)?;
        self.votes.serialize(w)?;
        w.write_u64(self.lock_time)
    }

    /// Reads a vote from the canonical codec.
    pub fn deserialize<R: io::Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self {
            candidate: r.read_var_bytes()?,
            votes: Amount::deserialize(r)?,
            lock_time: r.read_u64()?,
        })
    }
}

/// One content of a v2 voting payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotesContent {
    /// Category of the votes.
    pub vote_type: VoteType,
    /// The votes.
    pub votes_info: Vec<VotesWithLockTime>,
}

/// One renewal content of a v2 voting payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalVotesContent {
    /// Refer key of the detailed vote being renewed.
    pub refer_key: H256,
    /// The replacement vote (same candidate and weight, new lock time).
    pub votes_info: VotesWithLockTime,
}

/// Payload of v2 voting transactions.
///
/// `contents` is read under [`VOTE_VERSION`], `renewal_contents` under
/// [`RENEWAL_VOTE_VERSION`]; the other list is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Voting {
    /// Vote contents.
    pub contents: Vec<VotesContent>,
    /// Renewal contents.
    pub renewal_contents: Vec<RenewalVotesContent>,
}

/// A recorded vote with the context needed to identify and revert it.
///
/// The refer key is derived from every field, so any observable change to a
/// vote produces a distinct key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailedVoteInfo {
    /// Stake identity of the voter.
    pub stake_program_hash: ProgramHash,
    /// Transaction that carried the vote.
    pub transaction_hash: H256,
    /// Height the vote was recorded at.
    pub block_height: u64,
    /// Payload version of the carrying transaction.
    pub payload_version: u8,
    /// Category of the vote.
    pub vote_type: VoteType,
    /// The vote itself.
    pub info: VotesWithLockTime,
}

impl DetailedVoteInfo {
    /// The stable content-derived identifier of this vote record.
    pub fn refer_key(&self) -> H256 {
        hash_serializable(|w| self.serialize(w))
    }

    /// Writes the record to the canonical codec.
    pub fn serialize<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        self.stake_program_hash.serialize(w)?;
        self.transaction_hash.serialize(w)?;
        w.write_u64(self.block_height)?;
        w.write_u8(self.payload_version)?;
        w.write_u8(self.vote_type as u8)?;
        self.info.serialize(w)
    }

    /// Reads a record from the canonical codec.
    pub fn deserialize<R: io::Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self {
            stake_program_hash: ProgramHash::deserialize(r)?,
            transaction_hash: H256::deserialize(r)?,
            block_height: r.read_u64()?,
            payload_version: r.read_u8()?,
            vote_type: VoteType::from_byte(r.read_u8()?)?,
            info: VotesWithLockTime::deserialize(r)?,
        })
    }
}

/// Evidence half of an illegal-proposals payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalEvidence {
    /// Sponsor of the offending proposal.
    pub sponsor: PublicKey,
    /// Height the proposal was made for.
    pub block_height: u64,
}

/// Payload proving a sponsor issued conflicting proposals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DposIllegalProposals {
    /// First proposal.
    pub evidence: ProposalEvidence,
    /// Conflicting proposal by the same sponsor.
    pub compare_evidence: ProposalEvidence,
}

/// Evidence half of an illegal-votes payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteEvidence {
    /// Signer of the offending vote.
    pub signer: PublicKey,
    /// Height the vote was cast for.
    pub block_height: u64,
}

/// Payload proving a signer cast conflicting votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DposIllegalVotes {
    /// First vote.
    pub evidence: VoteEvidence,
    /// Conflicting vote by the same signer.
    pub compare_evidence: VoteEvidence,
}

/// Evidence half of an illegal-blocks payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEvidence {
    /// Signers of the offending block.
    pub signers: Vec<PublicKey>,
    /// Height of the block.
    pub block_height: u64,
}

/// Payload proving arbiters signed two blocks at one height.
///
/// The offenders are the signers present in both evidence halves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DposIllegalBlocks {
    /// First signed block.
    pub evidence: BlockEvidence,
    /// Conflicting signed block at the same height.
    pub compare_evidence: BlockEvidence,
}

/// Payload carrying sidechain misbehavior evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidechainIllegalData {
    /// The offending signer.
    pub illegal_signer: PublicKey,
    /// Height of the offense.
    pub height: u64,
}

/// Payload deactivating arbiters in an emergency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InactiveArbitrators {
    /// Sponsor of the emergency transaction.
    pub sponsor: PublicKey,
    /// Node keys of the arbiters being deactivated.
    pub arbitrators: Vec<PublicKey>,
    /// Height of the emergency.
    pub block_height: u64,
}

/// Payload declaring a penalty-waiver window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateVersion {
    /// First height of the window.
    pub start_height: u64,
    /// First height after the window.
    pub end_height: u64,
}

/// Payload announcing the next-turn arbiter set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NextTurnDposInfo {
    /// Height the announced set takes effect at.
    pub working_height: u64,
    /// CRC arbiter node keys.
    pub crc_public_keys: Vec<Vec<u8>>,
    /// Elected producer node keys.
    pub dpos_public_keys: Vec<Vec<u8>>,
}

/// Payload of a CR council member claiming a DPoS node key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrCouncilMemberClaimNode {
    /// The claimed node key.
    pub node_public_key: PublicKey,
    /// DID of the claiming council member.
    pub cr_council_committee_did: ProgramHash,
}

/// Why the chain reverted to proof of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RevertType {
    /// No block was produced in time.
    NoBlock = 0x00,
    /// Not enough producers remain.
    NoProducers = 0x01,
}

/// Payload switching consensus to proof of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertToPow {
    /// Reason for the fallback.
    pub revert_type: RevertType,
    /// Height the fallback takes effect at.
    pub working_height: u64,
}

/// Payload scheduling the return to DPoS consensus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertToDpos {
    /// Number of blocks after which DPoS resumes.
    pub work_height_interval: u64,
}

/// Payload claiming accumulated v2 rewards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DposV2ClaimReward {
    /// Claimed amount.
    pub amount: Amount,
}

/// Payload settling previously claimed rewards on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DposV2ClaimRewardRealWithdraw {
    /// Hashes of the claim transactions being settled.
    pub withdraw_transaction_hashes: Vec<H256>,
}

/// Recipient and amount of a pending reward settlement output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputInfo {
    /// Settlement recipient.
    pub recipient: ProgramHash,
    /// Settlement amount.
    pub amount: Amount,
}

/// The closed set of transaction payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Block reward; no data.
    CoinBase,
    /// Plain transfer; votes ride on outputs.
    TransferAsset,
    /// Producer registration.
    RegisterProducer(ProducerInfo),
    /// Producer info update.
    UpdateProducer(ProducerInfo),
    /// Producer cancellation.
    CancelProducer(ProcessProducer),
    /// Producer activation request.
    ActivateProducer(ActivateProducer),
    /// Deposit refund; data rides on inputs/outputs.
    ReturnDepositCoin,
    /// Conflicting-proposals evidence.
    IllegalProposals(DposIllegalProposals),
    /// Conflicting-votes evidence.
    IllegalVotes(DposIllegalVotes),
    /// Conflicting-blocks evidence.
    IllegalBlocks(DposIllegalBlocks),
    /// Sidechain misbehavior evidence.
    SidechainIllegalData(SidechainIllegalData),
    /// Emergency arbiter deactivation.
    InactiveArbitrators(InactiveArbitrators),
    /// Penalty-waiver window.
    UpdateVersion(UpdateVersion),
    /// Next-turn arbiter set announcement.
    NextTurnDposInfo(NextTurnDposInfo),
    /// CR member node-key claim.
    CrCouncilMemberClaimNode(CrCouncilMemberClaimNode),
    /// Fallback to proof of work.
    RevertToPow(RevertToPow),
    /// Scheduled return to DPoS.
    RevertToDpos(RevertToDpos),
    /// Stake-to-vote-rights conversion.
    ExchangeVotes(ExchangeVotes),
    /// v2 voting or renewal.
    Voting(Voting),
    /// v2 reward claim.
    DposV2ClaimReward(DposV2ClaimReward),
    /// Aggregated reward settlement.
    DposV2ClaimRewardRealWithdraw(DposV2ClaimRewardRealWithdraw),
}

impl Payload {
    /// The deduplication hash of special (illegal/inactive) payloads.
    ///
    /// Returns `None` for payloads that are not special transactions.
    pub fn special_tx_hash(&self) -> Option<H256> {
        match self {
            Self::IllegalProposals(_)
            | Self::IllegalVotes(_)
            | Self::IllegalBlocks(_)
            | Self::SidechainIllegalData(_)
            | Self::InactiveArbitrators(_) => {
                Some(hash_serializable(|w| self.serialize(w)))
            }
            _ => None,
        }
    }

    /// Writes the payload to the canonical codec, tag byte first.
    pub fn serialize<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        match self {
            Self::CoinBase => w.write_u8(0x00),
            Self::TransferAsset => w.write_u8(0x01),
            Self::RegisterProducer(info) => {
                w.write_u8(0x02)?;
                info.serialize(w)
            }
            Self::UpdateProducer(info) => {
                w.write_u8(0x03)?;
                info.serialize(w)
            }
            Self::CancelProducer(p) => {
                w.write_u8(0x04)?;
                p.owner_public_key.serialize(w)
            }
            Self::ActivateProducer(p) => {
                w.write_u8(0x05)?;
                p.node_public_key.serialize(w)
            }
            Self::ReturnDepositCoin => w.write_u8(0x06),
            Self::IllegalProposals(p) => {
                w.write_u8(0x07)?;
                p.evidence.sponsor.serialize(w)?;
                w.write_u64(p.evidence.block_height)?;
                p.compare_evidence.sponsor.serialize(w)?;
                w.write_u64(p.compare_evidence.block_height)
            }
            Self::IllegalVotes(p) => {
                w.write_u8(0x08)?;
                p.evidence.signer.serialize(w)?;
                w.write_u64(p.evidence.block_height)?;
                p.compare_evidence.signer.serialize(w)?;
                w.write_u64(p.compare_evidence.block_height)
            }
            Self::IllegalBlocks(p) => {
                w.write_u8(0x09)?;
                for evidence in [&p.evidence, &p.compare_evidence] {
                    w.write_var_uint(evidence.signers.len() as u64)?;
                    for signer in &evidence.signers {
                        signer.serialize(w)?;
                    }
                    w.write_u64(evidence.block_height)?;
                }
                Ok(())
            }
            Self::SidechainIllegalData(p) => {
                w.write_u8(0x0a)?;
                p.illegal_signer.serialize(w)?;
                w.write_u64(p.height)
            }
            Self::InactiveArbitrators(p) => {
                w.write_u8(0x0b)?;
                p.sponsor.serialize(w)?;
                w.write_var_uint(p.arbitrators.len() as u64)?;
                for arbiter in &p.arbitrators {
                    arbiter.serialize(w)?;
                }
                w.write_u64(p.block_height)
            }
            Self::UpdateVersion(p) => {
                w.write_u8(0x0c)?;
                w.write_u64(p.start_height)?;
                w.write_u64(p.end_height)
            }
            Self::NextTurnDposInfo(p) => {
                w.write_u8(0x0d)?;
                w.write_u64(p.working_height)?;
                w.write_var_uint(p.crc_public_keys.len() as u64)?;
                for key in &p.crc_public_keys {
                    w.write_var_bytes(key)?;
                }
                w.write_var_uint(p.dpos_public_keys.len() as u64)?;
                for key in &p.dpos_public_keys {
                    w.write_var_bytes(key)?;
                }
                Ok(())
            }
            Self::CrCouncilMemberClaimNode(p) => {
                w.write_u8(0x0e)?;
                p.node_public_key.serialize(w)?;
                p.cr_council_committee_did.serialize(w)
            }
            Self::RevertToPow(p) => {
                w.write_u8(0x0f)?;
                w.write_u8(p.revert_type as u8)?;
                w.write_u64(p.working_height)
            }
            Self::RevertToDpos(p) => {
                w.write_u8(0x10)?;
                w.write_u64(p.work_height_interval)
            }
            Self::ExchangeVotes(p) => {
                w.write_u8(0x11)?;
                p.exchange_value.serialize(w)
            }
            Self::Voting(p) => {
                w.write_u8(0x12)?;
                w.write_var_uint(p.contents.len() as u64)?;
                for content in &p.contents {
                    w.write_u8(content.vote_type as u8)?;
                    w.write_var_uint(content.votes_info.len() as u64)?;
                    for vote in &content.votes_info {
                        vote.serialize(w)?;
                    }
                }
                w.write_var_uint(p.renewal_contents.len() as u64)?;
                for renewal in &p.renewal_contents {
                    renewal.refer_key.serialize(w)?;
                    renewal.votes_info.serialize(w)?;
                }
                Ok(())
            }
            Self::DposV2ClaimReward(p) => {
                w.write_u8(0x13)?;
                p.amount.serialize(w)
            }
            Self::DposV2ClaimRewardRealWithdraw(p) => {
                w.write_u8(0x14)?;
                w.write_var_uint(p.withdraw_transaction_hashes.len() as u64)?;
                for hash in &p.withdraw_transaction_hashes {
                    hash.serialize(w)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_info_roundtrip() {
        let info = ProducerInfo {
            owner_public_key: PublicKey::new([0x02; 33]),
            node_public_key: PublicKey::new([0x03; 33]),
            nickname: "alice".into(),
            url: "https://alice.example".into(),
            location: 86,
            net_address: "127.0.0.1:20338".into(),
            stake_until: 600,
        };
        let mut buf = Vec::new();
        info.serialize(&mut buf).unwrap();
        let decoded = ProducerInfo::deserialize(&mut buf.as_slice()).unwrap();
        assert_eq!(info, decoded);
    }

    #[test]
    fn test_detailed_vote_refer_key_covers_all_fields() {
        let base = DetailedVoteInfo {
            stake_program_hash: ProgramHash::stake_from_code(b"code"),
            transaction_hash: H256::keccak256(b"tx"),
            block_height: 500,
            payload_version: VOTE_VERSION,
            vote_type: VoteType::DposV2,
            info: VotesWithLockTime {
                candidate: vec![0x02; 33],
                votes: Amount::from_sela(8_000),
                lock_time: 7_700,
            },
        };
        let mut changed = base.clone();
        changed.info.lock_time = 7_701;
        assert_ne!(base.refer_key(), changed.refer_key());

        let mut buf = Vec::new();
        base.serialize(&mut buf).unwrap();
        let decoded = DetailedVoteInfo::deserialize(&mut buf.as_slice()).unwrap();
        assert_eq!(base, decoded);
        assert_eq!(base.refer_key(), decoded.refer_key());
    }

    #[test]
    fn test_special_tx_hash_dedupes_by_content() {
        let payload = Payload::SidechainIllegalData(SidechainIllegalData {
            illegal_signer: PublicKey::new([0x02; 33]),
            height: 401,
        });
        let same = payload.clone();
        assert_eq!(payload.special_tx_hash(), same.special_tx_hash());
        assert!(Payload::TransferAsset.special_tx_hash().is_none());
    }
}
