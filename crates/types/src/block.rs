//! Block and confirm structures.
//!
//! The state engine advances on [`Block`]s and, when present, the [`Confirm`]
//! finality certificate that names the round's proposal sponsor - the input
//! the inactivity counter runs on.

use crate::hash::H256;
use crate::keys::PublicKey;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};

/// A block as seen by the state engine: position, time and transactions.
///
/// Header commitments, difficulty and the rest of the wire block are the
/// block chain's concern; the engine only consumes what mutates DPoS state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block height.
    pub height: u64,
    /// Block timestamp (seconds).
    pub timestamp: u64,
    /// The packed transactions, in block order.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Creates a block at the given height.
    pub fn new(height: u64, timestamp: u64, transactions: Vec<Transaction>) -> Self {
        Self {
            height,
            timestamp,
            transactions,
        }
    }
}

/// A finality certificate for a block.
///
/// Carries the sponsor of the confirmed proposal; an on-duty arbiter that is
/// not the sponsor has missed its round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirm {
    /// Hash of the confirmed block.
    pub block_hash: H256,
    /// Sponsor of the confirmed proposal.
    pub sponsor: PublicKey,
}

impl Confirm {
    /// Creates a confirm for the given block and sponsor.
    pub const fn new(block_hash: H256, sponsor: PublicKey) -> Self {
        Self { block_hash, sponsor }
    }
}
