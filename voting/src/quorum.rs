//! Quorum policy — how many votes approve a poll, and whose votes count.

use std::collections::HashSet;

use crest_types::{FederationMember, Poll, VoterKey};
use tracing::debug;

use crate::inactivity::InactivityTracker;

/// Majority quorum over the active federation.
///
/// Active = federation members minus those already flagged inactive at the
/// poll's start block. Multisig members are ordinary voters here; they are
/// only special as vote *targets* (the engine ignores votes about them).
pub struct QuorumPolicy<'a> {
    members: &'a [FederationMember],
    inactivity: &'a dyn InactivityTracker,
}

impl<'a> QuorumPolicy<'a> {
    pub fn new(members: &'a [FederationMember], inactivity: &'a dyn InactivityTracker) -> Self {
        Self { members, inactivity }
    }

    /// Strict majority: floor(n / 2) + 1. An empty federation can never
    /// approve anything.
    pub fn required_votes(active_count: usize) -> usize {
        active_count / 2 + 1
    }

    /// The members whose votes count toward `poll`'s quorum.
    fn active_members(&self, poll: &Poll) -> HashSet<&VoterKey> {
        self.members
            .iter()
            .filter(|m| !self.inactivity.is_inactive(&m.key, &poll.start_block))
            .map(|m| &m.key)
            .collect()
    }

    /// Whether `poll` has a strict majority of active-member votes.
    ///
    /// Votes from keys outside the active set (departed members, members
    /// flagged inactive at poll start) are on record but do not count.
    pub fn is_quorum_reached(&self, poll: &Poll) -> bool {
        let active = self.active_members(poll);
        if active.is_empty() {
            return false;
        }
        let counted = poll
            .votes_in_favor
            .iter()
            .filter(|v| active.contains(&v.voter))
            .count();
        let required = Self::required_votes(active.len());
        debug!(
            poll_id = poll.id,
            counted,
            required,
            active = active.len(),
            "quorum check"
        );
        counted >= required
    }
}
