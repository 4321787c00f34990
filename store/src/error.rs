use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("poll {0} not found")]
    NotFound(u32),

    #[error("poll id {got} is out of sequence, expected {expected}")]
    IdOutOfSequence { got: u32, expected: u32 },

    #[error("poll {got} is not the highest id ({highest}); only the tip may be removed")]
    NotTip { got: u32, highest: u32 },

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("poll store is corrupted: {0}")]
    Corruption(String),
}

impl From<heed::Error> for StoreError {
    fn from(e: heed::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
