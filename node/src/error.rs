use crest_store::StoreError;
use crest_types::BlockRef;
use crest_voting::VotingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("voting error: {0}")]
    Voting(#[from] VotingError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("config error: {0}")]
    Config(String),

    #[error("notified block {0} is not available from the chain view")]
    UnknownBlock(BlockRef),

    #[error("block notification channel closed")]
    ChannelClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
