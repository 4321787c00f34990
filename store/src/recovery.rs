//! Startup recovery — bring the poll store to a state consistent with the
//! canonical chain before the voting engine touches it.
//!
//! The authoritative source of truth is always the canonical chain plus
//! deterministic replay, so the recovery strategy for anything unrecoverable
//! is a full local reset: the engine then re-synchronizes from genesis.

use tracing::{info, warn};

use crest_types::{BlockRef, ChainView, NetworkParams, Poll};

use crate::record::PollRecord;
use crate::store::{poll_key, PollStore, TIP_KEY};
use crate::StoreError;

/// What [`PollStore::initialize`] found and did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Store tip is on the canonical chain; nothing to repair.
    Clean,
    /// Local state was unusable and has been erased; the engine must
    /// re-synchronize from genesis.
    RebuildRequired,
    /// The stored tip survived a reorg the store never saw. Poll data past
    /// the recovered tip was truncated; the engine replays from `new_tip`.
    Truncated { new_tip: BlockRef },
}

impl PollStore {
    /// Validate and repair the store against the canonical chain.
    pub fn initialize(
        &self,
        chain: &dyn ChainView,
        params: &NetworkParams,
    ) -> Result<RecoveryOutcome, StoreError> {
        let tip = match self.tip()? {
            Some(tip) => tip,
            None => {
                // Poll data without a tip is meaningless — the tip is what
                // ties the polls to a chain position.
                if self.highest_id()?.is_some() {
                    warn!("poll store has polls but no tip record, resetting");
                }
                self.wipe()?;
                return Ok(RecoveryOutcome::RebuildRequired);
            }
        };

        let polls = match self.all_polls() {
            Ok(polls) => polls,
            Err(StoreError::Serialization(e)) | Err(StoreError::Corruption(e)) => {
                warn!(error = %e, "poll store is undecodable, resetting");
                self.wipe()?;
                return Ok(RecoveryOutcome::RebuildRequired);
            }
            Err(e) => return Err(e),
        };

        if let Some((a, b)) = find_duplicate_proposals(&polls) {
            warn!(
                poll_a = a,
                poll_b = b,
                "two polls share voting data and start height (double vote at start), resetting"
            );
            self.wipe()?;
            return Ok(RecoveryOutcome::RebuildRequired);
        }

        if on_canonical_chain(chain, &tip) {
            info!(%tip, polls = polls.len(), "poll store is consistent with the chain");
            return Ok(RecoveryOutcome::Clean);
        }

        // The tip is a stale reorg survivor. Scan every block reference the
        // polls recorded for the highest one still on the canonical chain.
        // This can land lower than the true fork point when an old poll's
        // height coincides with a canonical block — harmless, the extra
        // replay is redundant but deterministic.
        let new_tip = polls
            .iter()
            .flat_map(recorded_refs)
            .filter(|r| on_canonical_chain(chain, r))
            .max_by_key(|r| r.height);

        let new_tip = match new_tip {
            Some(new_tip) => new_tip,
            None => {
                warn!(stale_tip = %tip, "no stored block reference is on the canonical chain, resetting");
                self.wipe()?;
                return Ok(RecoveryOutcome::RebuildRequired);
            }
        };

        warn!(stale_tip = %tip, %new_tip, "store tip is off-chain, truncating to recovered tip");
        self.truncate_above(&polls, &new_tip, params)?;
        Ok(RecoveryOutcome::Truncated { new_tip })
    }

    /// Rewrite poll data so nothing references a height past `new_tip`, and
    /// persist `new_tip`, all in one transaction.
    fn truncate_above(
        &self,
        polls: &[Poll],
        new_tip: &BlockRef,
        params: &NetworkParams,
    ) -> Result<(), StoreError> {
        let _guard = self.lock_writes();
        let mut wtxn = self.write_txn()?;

        // Polls are created in block order, so those started past the new
        // tip form a suffix of the id sequence — whole-poll removal cannot
        // leave gaps.
        for poll in polls.iter().rev() {
            if poll.start_block.height > new_tip.height {
                self.polls_db.delete(&mut wtxn, &poll_key(poll.id))?;
                continue;
            }

            let mut repaired = poll.clone();
            repaired
                .votes_in_favor
                .retain(|v| v.height <= new_tip.height);
            if matches!(repaired.executed_block, Some(b) if b.height > new_tip.height) {
                repaired.executed_block = None;
            }
            if matches!(repaired.approved_block, Some(b) if b.height > new_tip.height) {
                repaired.approved_block = None;
            }
            if repaired.expired && params.expiry_height(repaired.start_block.height) > new_tip.height
            {
                repaired.expired = false;
            }

            if repaired != *poll {
                let bytes = bincode::serialize(&PollRecord::from_poll(&repaired))?;
                self.polls_db.put(&mut wtxn, &poll_key(repaired.id), &bytes)?;
            }
        }

        let bytes = bincode::serialize(new_tip)?;
        self.meta_db.put(&mut wtxn, TIP_KEY, &bytes)?;
        wtxn.commit()?;
        Ok(())
    }
}

fn on_canonical_chain(chain: &dyn ChainView, r: &BlockRef) -> bool {
    matches!(chain.header(&r.hash), Some(found) if found.height == r.height)
}

/// Every block reference a poll has durably recorded.
fn recorded_refs(poll: &Poll) -> Vec<BlockRef> {
    let mut refs = vec![poll.start_block];
    if let Some(approved) = poll.approved_block {
        refs.push(approved);
    }
    if let Some(executed) = poll.executed_block {
        refs.push(executed);
    }
    refs
}

/// Two polls with the same voting data and start height is a fatal double
/// vote at start.
fn find_duplicate_proposals(polls: &[Poll]) -> Option<(u32, u32)> {
    for (i, a) in polls.iter().enumerate() {
        for b in &polls[i + 1..] {
            if a.voting_data == b.voting_data && a.start_block.height == b.start_block.height {
                return Some((a.id, b.id));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crest_types::{BlockHash, FederationBlock, Vote, VoteKind, VoterKey, VotingData};
    use std::collections::HashMap;

    /// Minimal canonical chain: height -> hash, linear.
    struct TestChain {
        by_hash: HashMap<BlockHash, BlockRef>,
    }

    impl TestChain {
        fn linear(heights: u64) -> Self {
            let mut by_hash = HashMap::new();
            for h in 0..=heights {
                let r = block_at(h);
                by_hash.insert(r.hash, r);
            }
            Self { by_hash }
        }
    }

    impl ChainView for TestChain {
        fn tip(&self) -> BlockRef {
            *self.by_hash.values().max_by_key(|r| r.height).unwrap()
        }

        fn header(&self, hash: &BlockHash) -> Option<BlockRef> {
            self.by_hash.get(hash).copied()
        }

        fn find_fork(&self, a: &BlockRef, _b: &BlockRef) -> Option<BlockRef> {
            Some(*a)
        }

        fn block(&self, _hash: &BlockHash) -> Option<FederationBlock> {
            None
        }
    }

    fn block_at(height: u64) -> BlockRef {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&height.to_be_bytes());
        bytes[31] = 0xC0;
        BlockRef::new(BlockHash::new(bytes), height)
    }

    fn off_chain_block(height: u64) -> BlockRef {
        BlockRef::new(BlockHash::new([0xEE; 32]), height)
    }

    fn temp_store() -> (tempfile::TempDir, PollStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PollStore::open(dir.path(), 10 * 1024 * 1024).unwrap();
        (dir, store)
    }

    fn params() -> NetworkParams {
        NetworkParams::dev(vec![])
    }

    fn make_poll(id: u32, start: BlockRef) -> Poll {
        Poll::new(
            id,
            VotingData::new(VoteKind::AddMember, vec![id as u8]),
            start,
            VoterKey::new(format!("02{id:02x}")),
        )
    }

    #[test]
    fn missing_tip_resets_store() {
        let (_dir, store) = temp_store();
        let mut batch = store.begin_batch().unwrap();
        batch.add_poll(&make_poll(0, block_at(5))).unwrap();
        batch.commit().unwrap();

        let outcome = store.initialize(&TestChain::linear(10), &params()).unwrap();
        assert_eq!(outcome, RecoveryOutcome::RebuildRequired);
        assert!(store.all_polls().unwrap().is_empty());
    }

    #[test]
    fn clean_store_untouched() {
        let (_dir, store) = temp_store();
        let mut batch = store.begin_batch().unwrap();
        batch.add_poll(&make_poll(0, block_at(5))).unwrap();
        batch.save_tip(&block_at(8)).unwrap();
        batch.commit().unwrap();

        let outcome = store.initialize(&TestChain::linear(10), &params()).unwrap();
        assert_eq!(outcome, RecoveryOutcome::Clean);
        assert_eq!(store.all_polls().unwrap().len(), 1);
        assert_eq!(store.tip().unwrap(), Some(block_at(8)));
    }

    #[test]
    fn duplicate_proposals_reset_store() {
        let (_dir, store) = temp_store();
        let data = VotingData::new(VoteKind::AddMember, vec![1]);
        let mut a = make_poll(0, block_at(5));
        a.voting_data = data.clone();
        let mut b = make_poll(1, block_at(5));
        b.voting_data = data;

        let mut batch = store.begin_batch().unwrap();
        batch.add_poll(&a).unwrap();
        batch.add_poll(&b).unwrap();
        batch.save_tip(&block_at(8)).unwrap();
        batch.commit().unwrap();

        let outcome = store.initialize(&TestChain::linear(10), &params()).unwrap();
        assert_eq!(outcome, RecoveryOutcome::RebuildRequired);
        assert!(store.all_polls().unwrap().is_empty());
    }

    #[test]
    fn stale_tip_truncates_to_highest_known_reference() {
        let (_dir, store) = temp_store();

        // Poll 0 started on-chain at 5, was approved on-chain at 7, but the
        // recorded tip and a later vote are reorg orphans.
        let mut poll = make_poll(0, block_at(5));
        poll.votes_in_favor.push(Vote {
            voter: VoterKey::new("02ff"),
            height: 12,
        });
        poll.approved_block = Some(block_at(7));
        poll.executed_block = Some(off_chain_block(12));

        let mut batch = store.begin_batch().unwrap();
        batch.add_poll(&poll).unwrap();
        batch.save_tip(&off_chain_block(12)).unwrap();
        batch.commit().unwrap();

        let outcome = store.initialize(&TestChain::linear(10), &params()).unwrap();
        assert_eq!(
            outcome,
            RecoveryOutcome::Truncated {
                new_tip: block_at(7)
            }
        );

        let repaired = store.get_poll(0).unwrap().unwrap();
        assert_eq!(repaired.approved_block, Some(block_at(7)));
        assert!(repaired.executed_block.is_none());
        // The orphaned height-12 vote is gone, the start vote survives.
        assert_eq!(repaired.votes_in_favor.len(), 1);
        assert_eq!(store.tip().unwrap(), Some(block_at(7)));
    }

    #[test]
    fn stale_tip_drops_polls_started_past_recovered_tip() {
        let (_dir, store) = temp_store();

        let mut batch = store.begin_batch().unwrap();
        batch.add_poll(&make_poll(0, block_at(5))).unwrap();
        batch.add_poll(&make_poll(1, off_chain_block(20))).unwrap();
        batch.save_tip(&off_chain_block(20)).unwrap();
        batch.commit().unwrap();

        let outcome = store.initialize(&TestChain::linear(10), &params()).unwrap();
        assert_eq!(
            outcome,
            RecoveryOutcome::Truncated {
                new_tip: block_at(5)
            }
        );
        let polls = store.all_polls().unwrap();
        assert_eq!(polls.len(), 1);
        assert_eq!(polls[0].id, 0);
    }

    #[test]
    fn no_common_reference_resets_store() {
        let (_dir, store) = temp_store();

        let mut batch = store.begin_batch().unwrap();
        batch.add_poll(&make_poll(0, off_chain_block(50))).unwrap();
        batch.save_tip(&off_chain_block(60)).unwrap();
        batch.commit().unwrap();

        let outcome = store.initialize(&TestChain::linear(10), &params()).unwrap();
        assert_eq!(outcome, RecoveryOutcome::RebuildRequired);
        assert!(store.all_polls().unwrap().is_empty());
        assert!(store.tip().unwrap().is_none());
    }
}
