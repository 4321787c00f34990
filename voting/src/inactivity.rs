//! Inactivity seam — who would already be flagged for an inactivity kick.
//!
//! The quorum calculation excludes members that were already on their way
//! out when a poll started: they will never vote, and counting them would
//! let a shrinking federation deadlock every poll.

use std::collections::HashMap;

use crest_types::{BlockRef, VoterKey};

/// Supplies "is member X inactive as of block Y".
pub trait InactivityTracker: Send + Sync {
    /// Whether `member` would already have been flagged for kicking as of
    /// `at` (typically a poll's start block).
    fn is_inactive(&self, member: &VoterKey, at: &BlockRef) -> bool;
}

/// Tracker that never flags anyone. The default for networks without the
/// inactivity heuristic, and for tests.
pub struct NoInactivity;

impl InactivityTracker for NoInactivity {
    fn is_inactive(&self, _member: &VoterKey, _at: &BlockRef) -> bool {
        false
    }
}

/// Fixed schedule: each listed member counts as inactive from a given
/// height onward.
#[derive(Default)]
pub struct InactivitySchedule {
    flagged_from: HashMap<VoterKey, u64>,
}

impl InactivitySchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flag_from(mut self, member: VoterKey, height: u64) -> Self {
        self.flagged_from.insert(member, height);
        self
    }
}

impl InactivityTracker for InactivitySchedule {
    fn is_inactive(&self, member: &VoterKey, at: &BlockRef) -> bool {
        self.flagged_from
            .get(member)
            .is_some_and(|&from| at.height >= from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crest_types::BlockHash;

    fn at(height: u64) -> BlockRef {
        BlockRef::new(BlockHash::new([1u8; 32]), height)
    }

    #[test]
    fn no_inactivity_never_flags() {
        assert!(!NoInactivity.is_inactive(&VoterKey::new("02aa"), &at(1000)));
    }

    #[test]
    fn schedule_flags_from_height() {
        let tracker = InactivitySchedule::new().flag_from(VoterKey::new("02aa"), 50);
        assert!(!tracker.is_inactive(&VoterKey::new("02aa"), &at(49)));
        assert!(tracker.is_inactive(&VoterKey::new("02aa"), &at(50)));
        assert!(!tracker.is_inactive(&VoterKey::new("02bb"), &at(100)));
    }
}
