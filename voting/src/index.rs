//! In-memory poll index — ordered iteration plus O(1) lookup of the pending
//! poll for a proposal.
//!
//! Owned exclusively by the voting engine and only ever touched under its
//! lock; external consumers see snapshot copies, never the index itself.

use std::collections::HashMap;

use crest_types::{Poll, VotingData};
use tracing::error;

use crate::VotingError;

/// All known polls in id order, with a pending-proposal lookup map.
///
/// Pending/approved/executed/expired are predicates over poll fields, not
/// separate collections — only "pending" gets a dedicated map because the
/// at-most-one-pending-per-proposal invariant hangs off it.
#[derive(Debug, Default)]
pub struct PollIndex {
    /// Id order == insertion order; ids form a gapless prefix.
    polls: Vec<Poll>,
    /// Proposal → id of its single pending poll.
    pending: HashMap<VotingData, u32>,
}

impl PollIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from the authoritative store contents.
    pub fn from_polls(polls: Vec<Poll>) -> Result<Self, VotingError> {
        let mut index = Self::new();
        for poll in polls {
            if poll.is_pending() {
                if let Some(&existing) = index.pending.get(&poll.voting_data) {
                    return Err(VotingError::DuplicatePendingPoll(existing, poll.id));
                }
                index.pending.insert(poll.voting_data.clone(), poll.id);
            }
            index.polls.push(poll);
        }
        Ok(index)
    }

    /// Insert a freshly created poll. A second pending poll for the same
    /// proposal is a programming-error invariant violation, not a condition
    /// to recover from.
    pub fn add(&mut self, poll: Poll) {
        debug_assert!(
            self.polls.last().map_or(true, |last| last.id < poll.id),
            "polls must be added in id order"
        );
        if poll.is_pending() {
            if let Some(&existing) = self.pending.get(&poll.voting_data) {
                error!(
                    existing,
                    added = poll.id,
                    "invariant violation: second pending poll for one proposal"
                );
                debug_assert!(false, "second pending poll for one proposal");
            }
            self.pending.insert(poll.voting_data.clone(), poll.id);
        }
        self.polls.push(poll);
    }

    /// Remove a poll (reorg unwind of its last vote). Drops any pending map
    /// entry pointing at it.
    pub fn remove(&mut self, id: u32) -> Option<Poll> {
        let pos = self.polls.iter().position(|p| p.id == id)?;
        let poll = self.polls.remove(pos);
        if self.pending.get(&poll.voting_data) == Some(&id) {
            self.pending.remove(&poll.voting_data);
        }
        Some(poll)
    }

    /// Re-index a poll after it transitioned into or out of "pending"
    /// (quorum reached, expiry set, or either undone by a reorg).
    pub fn on_pending_status_changed(&mut self, id: u32) {
        let Some(poll) = self.polls.iter().find(|p| p.id == id) else {
            return;
        };
        if poll.is_pending() {
            if let Some(&existing) = self.pending.get(&poll.voting_data) {
                if existing != id {
                    error!(
                        existing,
                        reindexed = id,
                        "invariant violation: second pending poll for one proposal"
                    );
                    debug_assert!(false, "second pending poll for one proposal");
                }
            }
            self.pending.insert(poll.voting_data.clone(), id);
        } else if self.pending.get(&poll.voting_data) == Some(&id) {
            self.pending.remove(&poll.voting_data);
        }
    }

    /// Id of the pending poll for `data`, if one exists.
    pub fn pending_for(&self, data: &VotingData) -> Option<u32> {
        self.pending.get(data).copied()
    }

    /// The most recently created poll matching `data`, pending or not.
    /// Several historical polls may match; only the newest can be affected
    /// by unwinding the chain tip.
    pub fn latest_matching(&self, data: &VotingData) -> Option<u32> {
        self.polls
            .iter()
            .rev()
            .find(|p| &p.voting_data == data)
            .map(|p| p.id)
    }

    pub fn get(&self, id: u32) -> Option<&Poll> {
        self.polls.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Poll> {
        self.polls.iter_mut().find(|p| p.id == id)
    }

    /// All polls in id order.
    pub fn polls(&self) -> &[Poll] {
        &self.polls
    }

    pub fn highest_id(&self) -> Option<u32> {
        self.polls.last().map(|p| p.id)
    }

    pub fn len(&self) -> usize {
        self.polls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polls.is_empty()
    }
}
