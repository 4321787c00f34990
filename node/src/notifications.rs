//! Block notification plumbing between the chain manager and the voting
//! engine.
//!
//! The chain manager publishes connect/disconnect events into an mpsc
//! channel; one dedicated loop consumes them in order and drives the engine.
//! Routing everything through the channel keeps chain callbacks from
//! re-entering the engine lock.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info};

use crest_types::{BlockRef, ChainView};
use crest_voting::{SyncOutcome, VotingEngine};

use crate::NodeError;

/// A chain tip change as published by the upstream chain manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockEvent {
    /// `block` was connected as the new canonical tip.
    Connected(BlockRef),
    /// `block` was disconnected from the canonical tip.
    Disconnected(BlockRef),
}

/// Producer half of the block notification channel.
#[derive(Clone)]
pub struct BlockNotifier {
    tx: mpsc::Sender<BlockEvent>,
}

impl BlockNotifier {
    /// Create the notification channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<BlockEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub async fn connected(&self, block: BlockRef) -> Result<(), NodeError> {
        self.tx
            .send(BlockEvent::Connected(block))
            .await
            .map_err(|_| NodeError::ChannelClosed)
    }

    pub async fn disconnected(&self, block: BlockRef) -> Result<(), NodeError> {
        self.tx
            .send(BlockEvent::Disconnected(block))
            .await
            .map_err(|_| NodeError::ChannelClosed)
    }
}

/// Consume block events until shutdown or channel close.
///
/// Events are handled strictly in arrival order. A failed event is logged
/// and the loop continues; the next connect event re-synchronizes past any
/// gap it left.
pub async fn run_notification_loop(
    engine: Arc<VotingEngine>,
    chain: Arc<dyn ChainView + Send + Sync>,
    mut events: mpsc::Receiver<BlockEvent>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("block notification loop shutting down");
                return;
            }
            event = events.recv() => match event {
                Some(event) => {
                    if let Err(err) = handle_event(&engine, chain.as_ref(), event) {
                        error!(%err, ?event, "block notification failed");
                    }
                }
                None => {
                    info!("block notification channel closed");
                    return;
                }
            },
        }
    }
}

fn handle_event(
    engine: &VotingEngine,
    chain: &dyn ChainView,
    event: BlockEvent,
) -> Result<(), NodeError> {
    match event {
        BlockEvent::Connected(block_ref) => {
            let block = chain
                .block(&block_ref.hash)
                .ok_or(NodeError::UnknownBlock(block_ref))?;
            // Catch up to the block's predecessor first; a node that was
            // offline sees only the latest tip, not every block in between.
            if !block.previous.is_zero() {
                let previous = BlockRef::new(block.previous, block_ref.height.saturating_sub(1));
                if engine.tip()? != Some(previous)
                    && engine.synchronize(&previous)? == SyncOutcome::Interrupted
                {
                    return Ok(());
                }
            }
            engine.process_block(&block)?;
        }
        BlockEvent::Disconnected(block_ref) => {
            if engine.tip()? == Some(block_ref) {
                let block = chain
                    .block(&block_ref.hash)
                    .ok_or(NodeError::UnknownBlock(block_ref))?;
                engine.unprocess_block(&block)?;
            } else {
                // The store never reached this block; nothing to undo.
                debug!(%block_ref, "stale disconnect notification ignored");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ShutdownController;
    use crest_store::PollStore;
    use crest_types::codec::encode_member;
    use crest_types::{FederationMember, NetworkParams, VoteKind, VoterKey, VotingData};
    use crest_voting::testkit::MockChain;
    use crest_voting::{LiveFederation, NoInactivity};

    fn engine_with_chain() -> (tempfile::TempDir, Arc<MockChain>, Arc<VotingEngine>) {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = Arc::new(PollStore::open(dir.path(), 10 * 1024 * 1024).expect("open store"));
        let chain = Arc::new(MockChain::new());
        let genesis = vec![FederationMember::new(VoterKey::new("02aa"))];
        let federation = Arc::new(LiveFederation::new(genesis.clone()));
        let engine = Arc::new(VotingEngine::new(
            store,
            chain.clone(),
            federation.clone(),
            federation,
            Arc::new(NoInactivity),
            NetworkParams::dev(genesis),
            None,
        ));
        engine.initialize().expect("initialize");
        (dir, chain, engine)
    }

    fn add_member_data(key: &str) -> VotingData {
        VotingData::new(
            VoteKind::AddMember,
            encode_member(&FederationMember::new(VoterKey::new(key))),
        )
    }

    #[tokio::test]
    async fn connected_events_drive_the_engine() {
        let (_dir, chain, engine) = engine_with_chain();
        let shutdown = ShutdownController::new();
        let (notifier, events) = BlockNotifier::channel(16);

        chain.push_block("02aa", None);
        chain.push_block("02aa", Some(&[add_member_data("02bb")]));
        let tip = chain.tip_ref();

        // Only the tip is notified; the loop synchronizes the gap.
        notifier.connected(tip).await.unwrap();
        drop(notifier);

        run_notification_loop(engine.clone(), chain, events, shutdown.subscribe()).await;

        assert_eq!(engine.tip().unwrap(), Some(tip));
        // Single-member federation: the vote approved its own poll.
        assert_eq!(engine.approved_polls().len(), 1);
    }

    #[tokio::test]
    async fn disconnect_event_unwinds_the_tip() {
        let (_dir, chain, engine) = engine_with_chain();
        let shutdown = ShutdownController::new();
        let (notifier, events) = BlockNotifier::channel(16);

        chain.push_block("02aa", None);
        let vote_block = chain.push_block("02aa", Some(&[add_member_data("02bb")]));
        notifier.connected(vote_block.block_ref).await.unwrap();

        chain.disconnect_tip();
        notifier.disconnected(vote_block.block_ref).await.unwrap();
        drop(notifier);

        run_notification_loop(engine.clone(), chain.clone(), events, shutdown.subscribe()).await;

        assert_eq!(engine.tip().unwrap(), Some(chain.tip_ref()));
        assert!(engine.all_polls().is_empty());
    }

    #[tokio::test]
    async fn stale_disconnect_is_ignored() {
        let (_dir, chain, engine) = engine_with_chain();
        let shutdown = ShutdownController::new();
        let (notifier, events) = BlockNotifier::channel(16);

        let block = chain.push_block("02aa", None);
        // Never connected; the disconnect must be a no-op.
        notifier.disconnected(block.block_ref).await.unwrap();
        drop(notifier);

        run_notification_loop(engine.clone(), chain, events, shutdown.subscribe()).await;
        assert_eq!(engine.tip().unwrap(), None);
    }
}
