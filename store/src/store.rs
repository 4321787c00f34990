//! LMDB environment and read-side poll access.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use crest_types::{BlockRef, Poll};

use crate::batch::PollBatch;
use crate::record::PollRecord;
use crate::StoreError;

/// Fixed meta key holding the repository tip.
pub(crate) const TIP_KEY: &[u8] = b"tip";

/// Durable, transactional storage of polls and the repository tip.
///
/// Polls are keyed by 4-byte big-endian id so LMDB's lexicographic key order
/// is numeric id order. The tip lives in a separate meta database and is
/// written in the same transaction as any poll mutation it depends on.
///
/// All mutation goes through a single process-wide lock: the underlying
/// write transaction handle is not safe for concurrent use.
pub struct PollStore {
    env: Env,
    pub(crate) polls_db: Database<Bytes, Bytes>,
    pub(crate) meta_db: Database<Bytes, Bytes>,
    write_lock: Mutex<()>,
}

pub(crate) fn poll_key(id: u32) -> [u8; 4] {
    id.to_be_bytes()
}

pub(crate) fn parse_poll_key(key: &[u8]) -> Result<u32, StoreError> {
    let arr: [u8; 4] = key
        .try_into()
        .map_err(|_| StoreError::Corruption(format!("poll key has {} bytes, expected 4", key.len())))?;
    Ok(u32::from_be_bytes(arr))
}

impl PollStore {
    /// Open or create the poll store at `path`.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, StoreError> {
        std::fs::create_dir_all(path)
            .map_err(|e| StoreError::Backend(format!("create {}: {e}", path.display())))?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(2)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let polls_db = env.create_database(&mut wtxn, Some("polls"))?;
        let meta_db = env.create_database(&mut wtxn, Some("meta"))?;
        wtxn.commit()?;

        Ok(Self {
            env,
            polls_db,
            meta_db,
            write_lock: Mutex::new(()),
        })
    }

    /// Begin a write batch. Holds the process-wide write lock until the batch
    /// is committed or dropped; a dropped batch rolls back.
    pub fn begin_batch(&self) -> Result<PollBatch<'_>, StoreError> {
        let guard = self.lock_writes();
        let txn = self.env.write_txn()?;
        Ok(PollBatch::new(self, txn, guard))
    }

    pub(crate) fn lock_writes(&self) -> MutexGuard<'_, ()> {
        match self.write_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn write_txn(&self) -> Result<heed::RwTxn<'_>, StoreError> {
        Ok(self.env.write_txn()?)
    }

    /// Fetch one poll by id.
    pub fn get_poll(&self, id: u32) -> Result<Option<Poll>, StoreError> {
        let rtxn = self.env.read_txn()?;
        match self.polls_db.get(&rtxn, &poll_key(id))? {
            Some(bytes) => {
                let record: PollRecord = bincode::deserialize(bytes)?;
                Ok(Some(record.into_poll()?))
            }
            None => Ok(None),
        }
    }

    /// All polls in id order.
    pub fn all_polls(&self) -> Result<Vec<Poll>, StoreError> {
        let rtxn = self.env.read_txn()?;
        let mut polls = Vec::new();
        for entry in self.polls_db.iter(&rtxn)? {
            let (key, bytes) = entry?;
            let id = parse_poll_key(key)?;
            let record: PollRecord = bincode::deserialize(bytes)?;
            let poll = record.into_poll()?;
            if poll.id != id {
                return Err(StoreError::Corruption(format!(
                    "poll stored under key {id} claims id {}",
                    poll.id
                )));
            }
            polls.push(poll);
        }
        Ok(polls)
    }

    /// The highest assigned poll id, if any polls exist.
    pub fn highest_id(&self) -> Result<Option<u32>, StoreError> {
        let rtxn = self.env.read_txn()?;
        match self.polls_db.last(&rtxn)? {
            Some((key, _)) => Ok(Some(parse_poll_key(key)?)),
            None => Ok(None),
        }
    }

    /// The repository tip: the last block whose effects are reflected here.
    pub fn tip(&self) -> Result<Option<BlockRef>, StoreError> {
        let rtxn = self.env.read_txn()?;
        match self.meta_db.get(&rtxn, TIP_KEY)? {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    /// Advance the tip for a block that changed no poll data. Still one
    /// committed transaction, so crash recovery sees the tip move exactly
    /// once per processed block.
    pub fn save_tip_standalone(&self, tip: &BlockRef) -> Result<(), StoreError> {
        let _guard = self.lock_writes();
        let mut wtxn = self.env.write_txn()?;
        let bytes = bincode::serialize(tip)?;
        self.meta_db.put(&mut wtxn, TIP_KEY, &bytes)?;
        wtxn.commit()?;
        Ok(())
    }

    /// Erase all polls and the tip. The consuming engine will re-synchronize
    /// from genesis.
    pub fn wipe(&self) -> Result<(), StoreError> {
        let _guard = self.lock_writes();
        let mut wtxn = self.env.write_txn()?;
        self.polls_db.clear(&mut wtxn)?;
        self.meta_db.clear(&mut wtxn)?;
        wtxn.commit()?;
        Ok(())
    }
}
