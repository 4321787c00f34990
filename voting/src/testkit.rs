//! Test support: an in-memory chain the engine can synchronize against.
//!
//! Not part of the public API proper — kept public so integration tests can
//! drive the engine without a real chain manager behind it.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crest_types::codec::encode_voting_data;
use crest_types::{BlockHash, BlockRef, ChainView, FederationBlock, VoterKey, VotingData};

/// In-memory chain with a mutable canonical branch.
///
/// Disconnected blocks stay resolvable by hash, as the engine requires for
/// unwinding. Hashes are synthesized from a serial counter, so competing
/// branches never collide.
#[derive(Default)]
pub struct MockChain {
    inner: Mutex<MockChainInner>,
}

#[derive(Default)]
struct MockChainInner {
    canonical: Vec<FederationBlock>,
    by_hash: HashMap<BlockHash, FederationBlock>,
    serial: u64,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block to the canonical branch and return it.
    pub fn push_block(&self, producer: &str, votes: Option<&[VotingData]>) -> FederationBlock {
        let mut inner = self.inner.lock().expect("mock chain lock");
        inner.serial += 1;
        let mut hash_bytes = [0u8; 32];
        hash_bytes[..8].copy_from_slice(&inner.serial.to_be_bytes());
        let hash = BlockHash::new(hash_bytes);

        let (previous, height) = match inner.canonical.last() {
            Some(tip) => (tip.block_ref.hash, tip.block_ref.height + 1),
            None => (BlockHash::ZERO, 0),
        };

        let block = FederationBlock {
            block_ref: BlockRef::new(hash, height),
            previous,
            producer: VoterKey::new(producer),
            votes_payload: votes.map(encode_voting_data),
        };
        inner.canonical.push(block.clone());
        inner.by_hash.insert(hash, block.clone());
        block
    }

    /// Push `n` empty blocks by `producer`.
    pub fn push_empty_blocks(&self, producer: &str, n: usize) {
        for _ in 0..n {
            self.push_block(producer, None);
        }
    }

    /// Drop the canonical tip. The block remains resolvable by hash so the
    /// engine can unwind it.
    pub fn disconnect_tip(&self) -> FederationBlock {
        let mut inner = self.inner.lock().expect("mock chain lock");
        inner.canonical.pop().expect("disconnect on empty chain")
    }

    pub fn tip_ref(&self) -> BlockRef {
        self.tip()
    }
}

impl ChainView for MockChain {
    fn tip(&self) -> BlockRef {
        let inner = self.inner.lock().expect("mock chain lock");
        inner
            .canonical
            .last()
            .map(|b| b.block_ref)
            .unwrap_or(BlockRef::ZERO)
    }

    fn header(&self, hash: &BlockHash) -> Option<BlockRef> {
        let inner = self.inner.lock().expect("mock chain lock");
        inner
            .canonical
            .iter()
            .find(|b| &b.block_ref.hash == hash)
            .map(|b| b.block_ref)
    }

    fn find_fork(&self, a: &BlockRef, b: &BlockRef) -> Option<BlockRef> {
        let inner = self.inner.lock().expect("mock chain lock");

        let mut ancestors = HashSet::new();
        let mut cursor = a.hash;
        loop {
            ancestors.insert(cursor);
            match inner.by_hash.get(&cursor) {
                Some(block) if !block.previous.is_zero() => cursor = block.previous,
                _ => break,
            }
        }

        let mut cursor = b.hash;
        loop {
            if ancestors.contains(&cursor) {
                return inner.by_hash.get(&cursor).map(|b| b.block_ref);
            }
            match inner.by_hash.get(&cursor) {
                Some(block) if !block.previous.is_zero() => cursor = block.previous,
                _ => return None,
            }
        }
    }

    fn block(&self, hash: &BlockHash) -> Option<FederationBlock> {
        let inner = self.inner.lock().expect("mock chain lock");
        inner.by_hash.get(hash).cloned()
    }
}
