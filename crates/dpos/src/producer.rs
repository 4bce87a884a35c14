//! Producer records and their lifecycle states.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io;

use vertex_types::{
    Amount, DetailedVoteInfo, H256, ProducerInfo, ProgramHash, PublicKey, ReadExt, WriteExt,
};

use crate::error::{Result, StateError};

/// Lifecycle state of a producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProducerState {
    /// Just registered, waiting for 6 confirmations.
    Pending = 0,
    /// Registered and confirmed; eligible for duty.
    Active = 1,
    /// Deactivated for missed rounds; may be re-activated.
    Inactive = 2,
    /// Canceled; deposit still locked.
    Canceled = 3,
    /// Found to have broken consensus.
    Illegal = 4,
    /// Canceled with deposit returned.
    Returned = 5,
}

impl ProducerState {
    fn from_byte(byte: u8) -> io::Result<Self> {
        match byte {
            0 => Ok(Self::Pending),
            1 => Ok(Self::Active),
            2 => Ok(Self::Inactive),
            3 => Ok(Self::Canceled),
            4 => Ok(Self::Illegal),
            5 => Ok(Self::Returned),
            b => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown producer state: {b:#04x}"),
            )),
        }
    }
}

impl fmt::Display for ProducerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "Pending",
            Self::Active => "Active",
            Self::Inactive => "Inactive",
            Self::Canceled => "Canceled",
            Self::Illegal => "Illegal",
            Self::Returned => "Returned",
        };
        f.write_str(name)
    }
}

/// A producer's full record.
///
/// Mutation happens through the history log; outside the engine the record is
/// read-only through the accessor methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Producer {
    pub(crate) info: ProducerInfo,
    pub(crate) state: ProducerState,
    pub(crate) register_height: u64,
    pub(crate) cancel_height: u64,
    pub(crate) inactive_since: u64,
    pub(crate) activate_request_height: u64,
    pub(crate) illegal_height: u64,
    pub(crate) penalty: Amount,
    pub(crate) votes: Amount,
    pub(crate) dposv2_votes: Amount,

    // Detailed v2 vote records: stake identity -> refer key -> vote.
    pub(crate) detailed_dposv2_votes: HashMap<ProgramHash, HashMap<H256, DetailedVoteInfo>>,

    pub(crate) deposit_amount: Amount,
    pub(crate) total_amount: Amount,
    pub(crate) deposit_hash: ProgramHash,
    pub(crate) selected: bool,
    pub(crate) random_candidate_inactive_count: u32,
    pub(crate) inactive_counting_height: u64,
    pub(crate) last_update_inactive_height: u64,
    pub(crate) inactive_count: u32,
}

impl Producer {
    /// Creates a pending producer from its registration.
    pub(crate) fn new_pending(
        info: ProducerInfo,
        register_height: u64,
        deposit_amount: Amount,
        total_amount: Amount,
        deposit_hash: ProgramHash,
    ) -> Self {
        Self {
            info,
            state: ProducerState::Pending,
            register_height,
            cancel_height: 0,
            inactive_since: 0,
            activate_request_height: u64::MAX,
            illegal_height: 0,
            penalty: Amount::ZERO,
            votes: Amount::ZERO,
            dposv2_votes: Amount::ZERO,
            detailed_dposv2_votes: HashMap::new(),
            deposit_amount,
            total_amount,
            deposit_hash,
            selected: false,
            random_candidate_inactive_count: 0,
            inactive_counting_height: 0,
            last_update_inactive_height: 0,
            inactive_count: 0,
        }
    }

    /// A copy of the registered producer info.
    pub fn info(&self) -> &ProducerInfo {
        &self.info
    }

    /// The producer's lifecycle state.
    pub fn state(&self) -> ProducerState {
        self.state
    }

    /// Height the producer registered at.
    pub fn register_height(&self) -> u64 {
        self.register_height
    }

    /// Height the producer was canceled at; zero while not canceled.
    pub fn cancel_height(&self) -> u64 {
        self.cancel_height
    }

    /// Height the producer was set inactive at.
    pub fn inactive_since(&self) -> u64 {
        self.inactive_since
    }

    /// Height of the pending activation request; `u64::MAX` when none.
    pub fn activate_request_height(&self) -> u64 {
        self.activate_request_height
    }

    /// Height the producer was found illegal at.
    pub fn illegal_height(&self) -> u64 {
        self.illegal_height
    }

    /// Accumulated penalty.
    pub fn penalty(&self) -> Amount {
        self.penalty
    }

    /// v1 vote total.
    pub fn votes(&self) -> Amount {
        self.votes
    }

    /// v2 staked vote total.
    pub fn dposv2_votes(&self) -> Amount {
        self.dposv2_votes
    }

    /// The operational block-signing key.
    pub fn node_public_key(&self) -> &PublicKey {
        &self.info.node_public_key
    }

    /// The long-lived identity key.
    pub fn owner_public_key(&self) -> &PublicKey {
        &self.info.owner_public_key
    }

    /// Deposit required of this producer.
    pub fn deposit_amount(&self) -> Amount {
        self.deposit_amount
    }

    /// Total value received on the deposit address.
    pub fn total_amount(&self) -> Amount {
        self.total_amount
    }

    /// The producer's deposit program hash.
    pub fn deposit_hash(&self) -> &ProgramHash {
        &self.deposit_hash
    }

    /// Value still withdrawable after the deposit requirement and penalty.
    pub fn available_amount(&self) -> Amount {
        self.total_amount - self.deposit_amount - self.penalty
    }

    /// Whether the producer is the round's randomly selected candidate.
    pub fn selected(&self) -> bool {
        self.selected
    }

    /// Whether the producer accepts v2 staked votes.
    pub fn is_dposv2(&self) -> bool {
        self.info.stake_until != 0
    }

    /// Looks up a detailed v2 vote record.
    pub fn detailed_dposv2_vote(
        &self,
        stake_address: &ProgramHash,
        refer_key: &H256,
    ) -> Result<&DetailedVoteInfo> {
        let votes = self
            .detailed_dposv2_votes
            .get(stake_address)
            .ok_or(StateError::StakeAddressNotFound)?;
        votes.get(refer_key).ok_or(StateError::ReferKeyNotFound)
    }

    /// All detailed v2 vote records.
    pub fn detailed_dposv2_votes(
        &self,
    ) -> &HashMap<ProgramHash, HashMap<H256, DetailedVoteInfo>> {
        &self.detailed_dposv2_votes
    }

    /// Writes the record in the persisted field order.
    pub fn serialize<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        self.info.serialize(w)?;
        w.write_u8(self.state as u8)?;
        w.write_u64(self.register_height)?;
        w.write_u64(self.cancel_height)?;
        w.write_u64(self.inactive_since)?;
        w.write_u64(self.activate_request_height)?;
        w.write_u64(self.illegal_height)?;
        self.penalty.serialize(w)?;
        self.votes.serialize(w)?;
        self.dposv2_votes.serialize(w)?;
        serialize_detail_vote_map(&self.detailed_dposv2_votes, w)?;
        self.deposit_amount.serialize(w)?;
        self.total_amount.serialize(w)?;
        self.deposit_hash.serialize(w)?;
        w.write_bool(self.selected)?;
        w.write_u32(self.random_candidate_inactive_count)?;
        w.write_u64(self.inactive_counting_height)?;
        w.write_u64(self.last_update_inactive_height)?;
        w.write_u32(self.inactive_count)
    }

    /// Reads a record in the persisted field order.
    pub fn deserialize<R: io::Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self {
            info: ProducerInfo::deserialize(r)?,
            state: ProducerState::from_byte(r.read_u8()?)?,
            register_height: r.read_u64()?,
            cancel_height: r.read_u64()?,
            inactive_since: r.read_u64()?,
            activate_request_height: r.read_u64()?,
            illegal_height: r.read_u64()?,
            penalty: Amount::deserialize(r)?,
            votes: Amount::deserialize(r)?,
            dposv2_votes: Amount::deserialize(r)?,
            detailed_dposv2_votes: deserialize_detail_vote_map(r)?,
            deposit_amount: Amount::deserialize(r)?,
            total_amount: Amount::deserialize(r)?,
            deposit_hash: ProgramHash::deserialize(r)?,
            selected: r.read_bool()?,
            random_candidate_inactive_count: r.read_u32()?,
            inactive_counting_height: r.read_u64()?,
            last_update_inactive_height: r.read_u64()?,
            inactive_count: r.read_u32()?,
        })
    }
}

// Nested maps are length-prefixed at both levels. The iteration order is made
// deterministic by sorting keys so two nodes serialize identical records to
// identical bytes.
fn serialize_detail_vote_map<W: io::Write>(
    map: &HashMap<ProgramHash, HashMap<H256, DetailedVoteInfo>>,
    w: &mut W,
) -> io::Result<()> {
    w.write_var_uint(map.len() as u64)?;
    let mut outer: Vec<_> = map.iter().collect();
    outer.sort_by_key(|(stake, _)| **stake);
    for (stake, inner_map) in outer {
        stake.serialize(w)?;
        w.write_var_uint(inner_map.len() as u64)?;
        let mut inner: Vec<_> = inner_map.iter().collect();
        inner.sort_by_key(|(refer_key, _)| **refer_key);
        for (refer_key, info) in inner {
            refer_key.serialize(w)?;
            info.serialize(w)?;
        }
    }
    Ok(())
}

fn deserialize_detail_vote_map<R: io::Read>(
    r: &mut R,
) -> io::Result<HashMap<ProgramHash, HashMap<H256, DetailedVoteInfo>>> {
    let outer_len = r.read_var_uint()?;
    let mut map = HashMap::with_capacity(outer_len as usize);
    for _ in 0..outer_len {
        let stake = ProgramHash::deserialize(r)?;
        let inner_len = r.read_var_uint()?;
        let mut inner = HashMap::with_capacity(inner_len as usize);
        for _ in 0..inner_len {
            let refer_key = H256::deserialize(r)?;
            let info = DetailedVoteInfo::deserialize(r)?;
            inner.insert(refer_key, info);
        }
        map.insert(stake, inner);
    }
    Ok(map)
}
