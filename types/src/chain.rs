//! Canonical-chain access seam.
//!
//! The voting engine never validates or stores blocks itself — an upstream
//! chain manager hands it already-connected blocks and answers ancestry
//! queries through this trait.

use crate::hash::{BlockHash, BlockRef};
use crate::voting::VoterKey;

/// A connected block as seen by the voting engine: identity, producer, and
/// the raw embedded voting payload (if the producer included one).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FederationBlock {
    pub block_ref: BlockRef,
    /// Hash of the predecessor block.
    pub previous: BlockHash,
    /// Key of the federation member that produced this block.
    pub producer: VoterKey,
    /// Raw encoded `Vec<VotingData>` extracted from the block, if any.
    pub votes_payload: Option<Vec<u8>>,
}

/// Read-only view of the canonical chain.
pub trait ChainView {
    /// The current canonical tip.
    fn tip(&self) -> BlockRef;

    /// Look up a block on the canonical chain by hash. Returns `None` for
    /// unknown or orphaned hashes.
    fn header(&self, hash: &BlockHash) -> Option<BlockRef>;

    /// The lowest common ancestor of two blocks, or `None` if they share no
    /// history.
    fn find_fork(&self, a: &BlockRef, b: &BlockRef) -> Option<BlockRef>;

    /// Full block data for replay/unwind. Unlike [`ChainView::header`], this
    /// must also serve recently disconnected blocks so they can be unwound.
    fn block(&self, hash: &BlockHash) -> Option<FederationBlock>;
}
