//! Persisted poll record — the serialization boundary.
//!
//! The stored format cannot express a null block reference: every slot is a
//! plain `(hash, height)` pair where all-zero means "absent". "Expired" is
//! encoded in the approved slot as a reserved sentinel hash with height zero
//! (the legacy sentinel). Decoding matches that exact hash, so a poll
//! genuinely approved at height zero keeps its own hash and stays
//! distinguishable; only an approval block whose hash equals the sentinel
//! itself would collide. The in-memory [`Poll`] uses proper `Option` fields
//! and a real `expired` flag; the translation happens only here.

use crest_types::{BlockHash, BlockRef, Poll, Vote, VoteKind, VoterKey, VotingData};
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// Sentinel written into the approved slot when a poll expires.
const EXPIRED_SENTINEL_HASH: [u8; 32] = {
    let mut h = [0u8; 32];
    h[31] = 1;
    h
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct PollRecord {
    pub id: u32,
    pub kind: u8,
    pub payload: Vec<u8>,
    pub start_hash: [u8; 32],
    pub start_height: u64,
    /// `(voter key, vote height)` in arrival order.
    pub votes: Vec<(String, u64)>,
    pub approved_hash: [u8; 32],
    pub approved_height: u64,
    pub executed_hash: [u8; 32],
    pub executed_height: u64,
}

impl PollRecord {
    pub fn from_poll(poll: &Poll) -> Self {
        let (approved_hash, approved_height) = if poll.expired {
            (EXPIRED_SENTINEL_HASH, 0)
        } else {
            match poll.approved_block {
                Some(b) => (*b.hash.as_bytes(), b.height),
                None => ([0u8; 32], 0),
            }
        };
        let (executed_hash, executed_height) = match poll.executed_block {
            Some(b) => (*b.hash.as_bytes(), b.height),
            None => ([0u8; 32], 0),
        };
        Self {
            id: poll.id,
            kind: poll.voting_data.kind.as_u8(),
            payload: poll.voting_data.payload.clone(),
            start_hash: *poll.start_block.hash.as_bytes(),
            start_height: poll.start_block.height,
            votes: poll
                .votes_in_favor
                .iter()
                .map(|v| (v.voter.as_str().to_owned(), v.height))
                .collect(),
            approved_hash,
            approved_height,
            executed_hash,
            executed_height,
        }
    }

    pub fn into_poll(self) -> Result<Poll, StoreError> {
        let kind = VoteKind::from_u8(self.kind).ok_or_else(|| {
            StoreError::Corruption(format!("poll {} has unknown vote kind {}", self.id, self.kind))
        })?;

        let approved_hash = BlockHash::new(self.approved_hash);
        let (approved_block, expired) = if self.approved_hash == EXPIRED_SENTINEL_HASH
            && self.approved_height == 0
        {
            (None, true)
        } else if !approved_hash.is_zero() {
            (Some(BlockRef::new(approved_hash, self.approved_height)), false)
        } else {
            (None, false)
        };

        let executed_hash = BlockHash::new(self.executed_hash);
        let executed_block = if executed_hash.is_zero() {
            None
        } else {
            Some(BlockRef::new(executed_hash, self.executed_height))
        };

        if executed_block.is_some() && (approved_block.is_none() || expired) {
            return Err(StoreError::Corruption(format!(
                "poll {} is executed but not approved",
                self.id
            )));
        }

        Ok(Poll {
            id: self.id,
            voting_data: VotingData::new(kind, self.payload),
            start_block: BlockRef::new(BlockHash::new(self.start_hash), self.start_height),
            votes_in_favor: self
                .votes
                .into_iter()
                .map(|(voter, height)| Vote {
                    voter: VoterKey::new(voter),
                    height,
                })
                .collect(),
            approved_block,
            executed_block,
            expired,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_poll() -> Poll {
        Poll::new(
            3,
            VotingData::new(VoteKind::KickMember, vec![9, 9]),
            BlockRef::new(BlockHash::new([7u8; 32]), 42),
            VoterKey::new("02aa"),
        )
    }

    #[test]
    fn pending_poll_round_trips() {
        let poll = pending_poll();
        let back = PollRecord::from_poll(&poll).into_poll().unwrap();
        assert_eq!(back, poll);
    }

    #[test]
    fn approved_poll_round_trips() {
        let mut poll = pending_poll();
        poll.approved_block = Some(BlockRef::new(BlockHash::new([8u8; 32]), 44));
        let back = PollRecord::from_poll(&poll).into_poll().unwrap();
        assert_eq!(back, poll);
    }

    #[test]
    fn executed_poll_round_trips() {
        let mut poll = pending_poll();
        poll.approved_block = Some(BlockRef::new(BlockHash::new([8u8; 32]), 44));
        poll.executed_block = Some(BlockRef::new(BlockHash::new([9u8; 32]), 49));
        let back = PollRecord::from_poll(&poll).into_poll().unwrap();
        assert_eq!(back, poll);
    }

    #[test]
    fn expired_poll_round_trips_through_sentinel() {
        let mut poll = pending_poll();
        poll.expired = true;
        let record = PollRecord::from_poll(&poll);
        assert_eq!(record.approved_height, 0);
        assert_ne!(record.approved_hash, [0u8; 32]);
        let back = record.into_poll().unwrap();
        assert!(back.is_expired());
        assert!(back.approved_block.is_none());
        assert_eq!(back, poll);
    }

    #[test]
    fn poll_approved_at_height_zero_is_not_expired() {
        let mut poll = pending_poll();
        poll.approved_block = Some(BlockRef::new(BlockHash::new([8u8; 32]), 0));
        let back = PollRecord::from_poll(&poll).into_poll().unwrap();
        assert!(!back.is_expired());
        assert_eq!(back.approved_block, poll.approved_block);
        assert_eq!(back, poll);
    }

    #[test]
    fn unknown_kind_is_corruption() {
        let mut record = PollRecord::from_poll(&pending_poll());
        record.kind = 0xEE;
        assert!(matches!(
            record.into_poll(),
            Err(StoreError::Corruption(_))
        ));
    }

    #[test]
    fn executed_without_approval_is_corruption() {
        let mut record = PollRecord::from_poll(&pending_poll());
        record.executed_hash = [5u8; 32];
        record.executed_height = 50;
        assert!(matches!(
            record.into_poll(),
            Err(StoreError::Corruption(_))
        ));
    }
}
