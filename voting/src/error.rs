use crest_store::StoreError;
use crest_types::{BlockHash, BlockRef};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VotingError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("this node is not a federation member")]
    NotAFederationMember,

    #[error("block {0} is not available from the chain view")]
    MissingBlock(BlockHash),

    #[error("no fork point between store tip {store_tip} and target {target}")]
    ForkPointNotFound { store_tip: BlockRef, target: BlockRef },

    #[error("polls {0} and {1} are both pending for the same proposal")]
    DuplicatePendingPoll(u32, u32),
}
