//! Poll — the unit of federation consensus.

use crate::hash::BlockRef;
use crate::voting::{Vote, VoterKey, VotingData};
use serde::{Deserialize, Serialize};

/// A proposed federation change and its voting state.
///
/// Lifecycle: pending → approved (quorum reached, awaiting the reorg-safety
/// delay) → executed, or pending → expired. Expiry and approval are mutually
/// exclusive outcomes.
///
/// `expired` is a real flag in memory; the persisted record encodes it as a
/// legacy sentinel in the approved-block slot (see `crest-store`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    /// Store-assigned id: strictly increasing, gapless, never reused.
    pub id: u32,
    /// What this poll proposes.
    pub voting_data: VotingData,
    /// Block that carried the poll's first vote.
    pub start_block: BlockRef,
    /// Votes in favor, in arrival order; at most one entry per voter.
    pub votes_in_favor: Vec<Vote>,
    /// Set exactly once, when quorum is first reached. `None` ⇒ pending.
    pub approved_block: Option<BlockRef>,
    /// Set exactly once, `max_reorg_length` blocks after approval.
    pub executed_block: Option<BlockRef>,
    /// Quorum was not reached within the expiry window.
    pub expired: bool,
}

impl Poll {
    /// Create a fresh poll from its first vote.
    pub fn new(id: u32, voting_data: VotingData, start_block: BlockRef, first_voter: VoterKey) -> Self {
        Self {
            id,
            voting_data,
            start_block,
            votes_in_favor: vec![Vote {
                voter: first_voter,
                height: start_block.height,
            }],
            approved_block: None,
            executed_block: None,
            expired: false,
        }
    }

    /// Awaiting quorum: not approved, not expired.
    pub fn is_pending(&self) -> bool {
        self.approved_block.is_none() && !self.expired
    }

    /// Quorum reached but the reorg-safety delay has not elapsed.
    pub fn is_approved(&self) -> bool {
        self.approved_block.is_some() && self.executed_block.is_none() && !self.expired
    }

    /// The proposed change has been applied to the live federation state.
    pub fn is_executed(&self) -> bool {
        self.executed_block.is_some()
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// Whether `voter` already has a vote recorded on this poll.
    pub fn has_vote_from(&self, voter: &VoterKey) -> bool {
        self.votes_in_favor.iter().any(|v| &v.voter == voter)
    }

    /// Remove `voter`'s vote entry, if present. Returns whether one was removed.
    pub fn remove_vote_from(&mut self, voter: &VoterKey) -> bool {
        let before = self.votes_in_favor.len();
        self.votes_in_favor.retain(|v| &v.voter != voter);
        self.votes_in_favor.len() != before
    }

    /// Remove `voter`'s vote only if it was cast at `height`.
    ///
    /// Used when unwinding a disconnected block: a duplicate vote in a later
    /// block was a no-op on connect, so unwinding that block must not strip
    /// the voter's original entry from an earlier block.
    pub fn remove_vote_at(&mut self, voter: &VoterKey, height: u64) -> bool {
        let before = self.votes_in_favor.len();
        self.votes_in_favor
            .retain(|v| !(&v.voter == voter && v.height == height));
        self.votes_in_favor.len() != before
    }
}
