//! # Vertex Core DPoS State Engine
//!
//! The authoritative in-memory picture of all producer identities, their
//! lifecycle, their votes (the v1 output regime and the v2 staked regime),
//! staking rights and arbiter inactivity accounting - advanced block by
//! block from pre-validated transactions, and able to roll back to any prior
//! height within a bounded window by inverting every state mutation.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌─────────────────────────────┐
//!    process_block──▶│        State (dispatcher)   │──▶ queries (shared lock)
//!                    └──────────────┬──────────────┘
//!                                   │ append(Mutation)
//!                    ┌──────────────▼──────────────┐
//!                    │   History (720-height log)  │
//!                    │  apply ──▶ StateKeyFrame    │
//!                    │  revert ◀── rollback_to     │
//!                    └──────────────┬──────────────┘
//!                                   │
//!          ┌────────────────────────┼───────────────────────┐
//!          ▼                        ▼                       ▼
//!   producer registry        vote ledgers            mode & heights
//!   (single owning map       (v1 outputs, v2         (POW↔DPoS,
//!    + per-state index        staked votes,           irreversibility)
//!    sets)                    stake rights)
//! ```
//!
//! Every handler expresses its changes as [`Mutation`] values; the history
//! applies them immediately and keeps them for the retention window, so a
//! rollback replays exact inverses in reverse order and a historical query
//! rewinds a detached snapshot without disturbing the live cursor.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vertex_config::ChainParams;
//! use vertex_dpos::{State, StateHooks};
//!
//! let state = State::new(Arc::new(ChainParams::default()), hooks);
//! state.process_block(&block, Some(&confirm));
//! state.rollback_to(block.height - 1)?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

mod arbiters;
mod error;
mod history;
mod inactivity;
mod keyframe;
mod mutation;
mod producer;
mod ref_cache;
mod state;
mod voting;

pub use arbiters::{ArbiterInfo, CrHooks, CrMember, CrMemberState, StateFuncsConfig, StateHooks};
pub use error::{Result, StateError};
pub use history::History;
pub use keyframe::{ConsensusAlgorithm, StateKeyFrame};
pub use mutation::{
    IllegalPrior, InactivePrior, InactivityVersion, Mutation, MutationCtx, StakeLedger,
};
pub use producer::{Producer, ProducerState};
pub use ref_cache::{TransactionStore, UtxoCache};
pub use state::State;

/// Maximum number of heights the history log retains.
pub const MAX_HISTORY_CAPACITY: usize = 720;

/// Confirmations before a pending or re-activating producer becomes active.
pub const ACTIVATE_DURATION: u64 = 6;

/// Maximum depth the chain can be reorganized by.
pub const IRREVERSIBLE_HEIGHT: u64 = 6;

/// Number of rounds of vote statistics kept for arbiter election.
pub const CACHE_VOTES_SIZE: usize = 6;

/// Minimum number of blocks a v2 staked vote must stay locked.
pub const MIN_VOTES_LOCK_TIME: u64 = 7_200;

/// Numerator of the arbiter majority ratio.
pub const MAJORITY_SIGN_RATIO_NUMERATOR: f64 = 2.0;

/// Denominator of the arbiter majority ratio.
pub const MAJORITY_SIGN_RATIO_DENOMINATOR: f64 = 3.0;
