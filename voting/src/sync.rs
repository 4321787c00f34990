//! Catch-up synchronization — drive the poll store from wherever its tip is
//! to a target block, unwinding across reorgs as needed.
//!
//! Progress is durable per block: every unwind and every replay commits its
//! own transaction, so a crash or cancellation mid-sync resumes from the
//! last committed tip.

use crest_types::{BlockRef, FederationBlock};
use tracing::{debug, info, warn};

use crate::engine::VotingEngine;
use crate::VotingError;

/// How a synchronization run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The store tip now matches the target.
    Synchronized,
    /// The cancellation flag was raised; progress so far is persisted.
    Interrupted,
}

impl VotingEngine {
    /// Bring the poll store to `target`.
    ///
    /// Unwinds from the stored tip back to the fork point with `target`
    /// (newest first), then replays forward (oldest first). Each block takes
    /// the engine lock separately, so queries interleave with a long sync.
    /// The cancellation flag is checked between blocks.
    pub fn synchronize(&self, target: &BlockRef) -> Result<SyncOutcome, VotingError> {
        let tip = self.store.tip()?;
        if tip == Some(*target) {
            debug!(%target, "store already at target");
            return Ok(SyncOutcome::Synchronized);
        }
        info!(tip = ?tip, %target, "synchronizing poll store");

        let fork = match tip {
            Some(tip) => {
                let fork = self
                    .chain
                    .find_fork(&tip, target)
                    .ok_or(VotingError::ForkPointNotFound {
                        store_tip: tip,
                        target: *target,
                    })?;
                if fork != tip {
                    warn!(stale_tip = %tip, %fork, "store tip is off the target chain, unwinding");
                    if self.unwind_to(&tip, &fork)? == SyncOutcome::Interrupted {
                        return Ok(SyncOutcome::Interrupted);
                    }
                }
                Some(fork)
            }
            None => None,
        };

        self.replay_to(fork.as_ref(), target)
    }

    /// Disconnect blocks from `from` down to (exclusive) `fork`.
    fn unwind_to(&self, from: &BlockRef, fork: &BlockRef) -> Result<SyncOutcome, VotingError> {
        let mut cursor = *from;
        while cursor.hash != fork.hash {
            if self.is_cancelled() {
                info!(at = %cursor, "synchronization cancelled during unwind");
                return Ok(SyncOutcome::Interrupted);
            }
            let block = self
                .chain
                .block(&cursor.hash)
                .ok_or(VotingError::MissingBlock(cursor.hash))?;
            debug!(block = %block.block_ref, "unwinding block");
            self.unprocess_block(&block)?;
            cursor = BlockRef::new(block.previous, cursor.height.saturating_sub(1));
        }
        Ok(SyncOutcome::Synchronized)
    }

    /// Connect blocks from just above `fork` (or from genesis when the store
    /// was rebuilt) up to `target`.
    fn replay_to(
        &self,
        fork: Option<&BlockRef>,
        target: &BlockRef,
    ) -> Result<SyncOutcome, VotingError> {
        // Walk the target's ancestry back to the fork point to build the
        // replay path, then apply it oldest first.
        let mut path: Vec<FederationBlock> = Vec::new();
        let mut cursor = *target;
        loop {
            if fork.is_some_and(|f| f.hash == cursor.hash) {
                break;
            }
            let block = self
                .chain
                .block(&cursor.hash)
                .ok_or(VotingError::MissingBlock(cursor.hash))?;
            let previous = block.previous;
            let height = cursor.height;
            path.push(block);
            if previous.is_zero() {
                break;
            }
            cursor = BlockRef::new(previous, height.saturating_sub(1));
        }

        for block in path.into_iter().rev() {
            if self.is_cancelled() {
                info!(at = %block.block_ref, "synchronization cancelled during replay");
                return Ok(SyncOutcome::Interrupted);
            }
            debug!(block = %block.block_ref, "replaying block");
            self.process_block(&block)?;
        }
        info!(%target, "poll store synchronized");
        Ok(SyncOutcome::Synchronized)
    }
}
