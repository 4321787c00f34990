//! LMDB-backed transactional poll repository.
//!
//! Polls and the repository tip persist in lock-step with the consensus
//! chain: every processed block is one committed write transaction, so the
//! store is always byte-for-byte reproducible from a chain replay.

mod batch;
mod error;
mod record;
mod recovery;
mod store;

pub use batch::PollBatch;
pub use error::StoreError;
pub use recovery::RecoveryOutcome;
pub use store::PollStore;
