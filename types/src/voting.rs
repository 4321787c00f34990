//! Voting primitives — what a poll proposes and who voted for it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hex-encoded compressed public key of a federation member.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoterKey(String);

impl VoterKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for VoterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = if self.0.len() > 8 { &self.0[..8] } else { &self.0 };
        write!(f, "VoterKey({short}…)")
    }
}

impl fmt::Display for VoterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of federation change a vote proposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteKind {
    /// Add a new member to the federation.
    AddMember,
    /// Remove an existing member from the federation.
    KickMember,
    /// Add a content hash to the whitelist.
    WhitelistHash,
    /// Remove a content hash from the whitelist.
    RemoveHash,
}

impl VoteKind {
    /// Wire/storage discriminant.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::AddMember => 1,
            Self::KickMember => 2,
            Self::WhitelistHash => 3,
            Self::RemoveHash => 4,
        }
    }

    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::AddMember),
            2 => Some(Self::KickMember),
            3 => Some(Self::WhitelistHash),
            4 => Some(Self::RemoveHash),
            _ => None,
        }
    }

    /// Whether this kind changes federation membership (as opposed to the
    /// hash whitelist).
    pub fn is_membership_change(self) -> bool {
        matches!(self, Self::AddMember | Self::KickMember)
    }
}

/// A proposed change, as embedded in a block by its producer.
///
/// Immutable once embedded; equality and hashing are by `(kind, payload)`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VotingData {
    pub kind: VoteKind,
    pub payload: Vec<u8>,
}

impl VotingData {
    pub fn new(kind: VoteKind, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }
}

impl fmt::Debug for VotingData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VotingData({:?}, {} payload bytes)",
            self.kind,
            self.payload.len()
        )
    }
}

/// One federation member's vote in favor of a poll.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Who voted (the producer of the block that carried the vote).
    pub voter: VoterKey,
    /// Height of the block that carried the vote.
    pub height: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_discriminants_round_trip() {
        for kind in [
            VoteKind::AddMember,
            VoteKind::KickMember,
            VoteKind::WhitelistHash,
            VoteKind::RemoveHash,
        ] {
            assert_eq!(VoteKind::from_u8(kind.as_u8()), Some(kind));
        }
        assert_eq!(VoteKind::from_u8(0), None);
        assert_eq!(VoteKind::from_u8(5), None);
    }

    #[test]
    fn voting_data_equality_is_by_kind_and_payload() {
        let a = VotingData::new(VoteKind::AddMember, vec![1, 2, 3]);
        let b = VotingData::new(VoteKind::AddMember, vec![1, 2, 3]);
        let c = VotingData::new(VoteKind::KickMember, vec![1, 2, 3]);
        let d = VotingData::new(VoteKind::AddMember, vec![1, 2]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn membership_change_kinds() {
        assert!(VoteKind::AddMember.is_membership_change());
        assert!(VoteKind::KickMember.is_membership_change());
        assert!(!VoteKind::WhitelistHash.is_membership_change());
        assert!(!VoteKind::RemoveHash.is_membership_change());
    }
}
