//! # Vertex Core Types
//!
//! Core type definitions for the Vertex Core blockchain.
//!
//! This crate provides the fundamental types used throughout Vertex Core:
//! - [`H256`] - 32-byte content hashes with Keccak256 support
//! - [`Amount`] - fixed-point coin quantities (8 decimal places)
//! - [`ProgramHash`] - prefixed 21-byte script hashes (standard, deposit, stake)
//! - [`PublicKey`] - 33-byte compressed public keys
//! - [`Transaction`] and [`Payload`] - the closed transaction model
//! - [`Block`] and [`Confirm`] - block structures and finality certificates
//!
//! ## Example
//!
//! ```rust
//! use vertex_types::{Amount, H256, PublicKey, ProgramHash};
//!
//! let hash = H256::keccak256(b"hello world");
//! assert_ne!(hash, H256::NIL);
//!
//! let owner = PublicKey::new([0x02; 33]);
//! let deposit = ProgramHash::deposit_from_public_key(&owner);
//! assert!(deposit.is_deposit());
//!
//! let amount = Amount::from_sela(5_000);
//! assert_eq!(amount + Amount::from_sela(1), Amount::from_sela(5_001));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod amount;
pub mod block;
pub mod codec;
pub mod hash;
pub mod keys;
pub mod payload;
pub mod program_hash;
pub mod transaction;

// Re-export main types at crate root
pub use amount::Amount;
pub use block::{Block, Confirm};
pub use codec::{ReadExt, WriteExt};
pub use hash::H256;
pub use keys::PublicKey;
pub use payload::{
    ActivateProducer, BlockEvidence, CrCouncilMemberClaimNode, DetailedVoteInfo,
    DposIllegalBlocks, DposIllegalProposals, DposIllegalVotes, DposV2ClaimReward,
    DposV2ClaimRewardRealWithdraw, ExchangeVotes, InactiveArbitrators, NextTurnDposInfo,
    OutputInfo, Payload, ProcessProducer, ProducerInfo, ProposalEvidence, RenewalVotesContent,
    RevertToDpos, RevertToPow, RevertType, SidechainIllegalData, UpdateVersion, VoteEvidence,
    VotesContent, VotesWithLockTime, Voting, RENEWAL_VOTE_VERSION, VOTE_VERSION,
};
pub use program_hash::{Prefix, ProgramHash};
pub use transaction::{
    CandidateVotes, ExchangeVoteOutput, Input, OutPoint, Output, OutputPayload, OutputType,
    Program, Transaction, TxType, VoteContent, VoteOutput, VoteType, TX_VERSION_09,
    VOTE_PRODUCER_VERSION,
};

/// Result type alias for Vertex Core types operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when working with Vertex Core types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid hex string
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Invalid length for a fixed-size type
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Invalid hash format
    #[error("invalid hash format: {0}")]
    InvalidHash(String),

    /// Invalid public key format
    #[error("invalid public key format: {0}")]
    InvalidPublicKey(String),

    /// Invalid program hash format
    #[error("invalid program hash format: {0}")]
    InvalidProgramHash(String),

    /// Invalid transaction
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// Canonical codec error
    #[error("codec error: {0}")]
    Codec(#[from] std::io::Error),
}
