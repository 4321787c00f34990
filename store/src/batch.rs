//! Write batching — all poll mutations for one processed block go through a
//! single LMDB write transaction, committed (or rolled back) as a unit, so a
//! crash mid-block can never leave polls and tip inconsistent with each
//! other.

use std::sync::MutexGuard;

use heed::RwTxn;

use crest_types::{BlockRef, Poll};

use crate::record::PollRecord;
use crate::store::{parse_poll_key, poll_key, PollStore, TIP_KEY};
use crate::StoreError;

/// A write batch over one LMDB transaction.
///
/// Holds the store's process-wide write lock for its lifetime. If the batch
/// is dropped without [`PollBatch::commit`], every operation is rolled back.
pub struct PollBatch<'a> {
    store: &'a PollStore,
    txn: RwTxn<'a>,
    _guard: MutexGuard<'a, ()>,
}

impl<'a> PollBatch<'a> {
    pub(crate) fn new(store: &'a PollStore, txn: RwTxn<'a>, guard: MutexGuard<'a, ()>) -> Self {
        Self {
            store,
            txn,
            _guard: guard,
        }
    }

    /// Highest poll id as seen inside this transaction.
    pub fn highest_id(&self) -> Result<Option<u32>, StoreError> {
        match self.store.polls_db.last(&self.txn)? {
            Some((key, _)) => Ok(Some(parse_poll_key(key)?)),
            None => Ok(None),
        }
    }

    /// The id the next added poll must carry.
    pub fn next_id(&self) -> Result<u32, StoreError> {
        Ok(match self.highest_id()? {
            Some(highest) => highest + 1,
            None => 0,
        })
    }

    /// Insert a new poll. Its id must be exactly `highest_id + 1` — ids are
    /// strictly sequential and never reused, so a violation here is a bug in
    /// the caller, not a runtime condition.
    pub fn add_poll(&mut self, poll: &Poll) -> Result<(), StoreError> {
        let expected = self.next_id()?;
        if poll.id != expected {
            return Err(StoreError::IdOutOfSequence {
                got: poll.id,
                expected,
            });
        }
        self.put(poll)
    }

    /// Overwrite an existing poll.
    pub fn update_poll(&mut self, poll: &Poll) -> Result<(), StoreError> {
        if self.store.polls_db.get(&self.txn, &poll_key(poll.id))?.is_none() {
            return Err(StoreError::NotFound(poll.id));
        }
        self.put(poll)
    }

    /// Remove a poll. Only the current highest id may be removed — anything
    /// else would punch a hole in the gapless id sequence.
    pub fn remove_poll(&mut self, id: u32) -> Result<(), StoreError> {
        match self.highest_id()? {
            Some(highest) if highest == id => {
                self.store.polls_db.delete(&mut self.txn, &poll_key(id))?;
                Ok(())
            }
            Some(highest) => Err(StoreError::NotTip { got: id, highest }),
            None => Err(StoreError::NotFound(id)),
        }
    }

    /// Record the repository tip inside this transaction.
    pub fn save_tip(&mut self, tip: &BlockRef) -> Result<(), StoreError> {
        let bytes = bincode::serialize(tip)?;
        self.store.meta_db.put(&mut self.txn, TIP_KEY, &bytes)?;
        Ok(())
    }

    /// Commit all batched operations atomically.
    pub fn commit(self) -> Result<(), StoreError> {
        self.txn.commit()?;
        Ok(())
    }

    fn put(&mut self, poll: &Poll) -> Result<(), StoreError> {
        let bytes = bincode::serialize(&PollRecord::from_poll(poll))?;
        self.store
            .polls_db
            .put(&mut self.txn, &poll_key(poll.id), &bytes)?;
        Ok(())
    }
}
