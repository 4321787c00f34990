//! The voting engine — poll lifecycle driven by connected and disconnected
//! blocks.
//!
//! All block processing is serialized through one internal lock, and every
//! processed block becomes exactly one committed store transaction. If any
//! step of a block fails, the transaction rolls back and the in-memory index
//! is reloaded from the store, so memory never drifts from disk.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crest_store::{PollBatch, PollStore, RecoveryOutcome};
use crest_types::codec::{decode_member, decode_voting_data};
use crest_types::{
    BlockRef, ChainView, FederationBlock, FederationMember, NetworkParams, Poll, Vote, VoterKey,
    VotingData,
};
use tracing::{debug, info, warn};

use crate::applier::{FederationProvider, PollOutcomeApplier};
use crate::federation::federation_at_height;
use crate::inactivity::InactivityTracker;
use crate::index::PollIndex;
use crate::quorum::QuorumPolicy;
use crate::VotingError;

pub(crate) struct EngineInner {
    pub(crate) index: PollIndex,
    /// Proposals this node intends to embed in its next produced block.
    scheduled: Vec<VotingData>,
}

/// Poll consensus engine.
///
/// Consumes already-connected blocks from an upstream chain manager and
/// maintains the poll repository: creating polls on first votes, stamping
/// approval at quorum, executing after the reorg-safety delay, expiring
/// stale polls, and undoing all of it when blocks are disconnected.
pub struct VotingEngine {
    pub(crate) store: Arc<PollStore>,
    pub(crate) chain: Arc<dyn ChainView + Send + Sync>,
    applier: Arc<dyn PollOutcomeApplier>,
    federation: Arc<dyn FederationProvider>,
    inactivity: Arc<dyn InactivityTracker>,
    params: NetworkParams,
    /// This node's own signing key, if it is a block producer.
    node_key: Option<VoterKey>,
    inner: Mutex<EngineInner>,
    cancel: Arc<AtomicBool>,
}

impl VotingEngine {
    pub fn new(
        store: Arc<PollStore>,
        chain: Arc<dyn ChainView + Send + Sync>,
        applier: Arc<dyn PollOutcomeApplier>,
        federation: Arc<dyn FederationProvider>,
        inactivity: Arc<dyn InactivityTracker>,
        params: NetworkParams,
        node_key: Option<VoterKey>,
    ) -> Self {
        Self {
            store,
            chain,
            applier,
            federation,
            inactivity,
            params,
            node_key,
            inner: Mutex::new(EngineInner {
                index: PollIndex::new(),
                scheduled: Vec::new(),
            }),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Validate the store against the chain and load the poll index.
    ///
    /// Must be called before any block processing. After `RebuildRequired`
    /// or `Truncated`, the caller drives [`VotingEngine::synchronize`] to
    /// catch the store back up to the chain tip.
    pub fn initialize(&self) -> Result<RecoveryOutcome, VotingError> {
        let mut outcome = self.store.initialize(self.chain.as_ref(), &self.params)?;
        let mut inner = self.lock_inner();
        match self.reload_index(&mut inner) {
            Ok(()) => {}
            Err(VotingError::DuplicatePendingPoll(a, b)) => {
                // Two pending polls for one proposal at different start
                // heights get past store recovery. The chain is the source
                // of truth, so treat it like any other corruption: reset
                // and replay from genesis.
                warn!(
                    poll_a = a,
                    poll_b = b,
                    "two pending polls share one proposal, resetting store"
                );
                self.store.wipe()?;
                self.reload_index(&mut inner)?;
                outcome = RecoveryOutcome::RebuildRequired;
            }
            Err(e) => return Err(e),
        }
        info!(?outcome, polls = inner.index.len(), "voting engine initialized");
        Ok(outcome)
    }

    /// Cancellation flag shared with whoever drives long synchronizations.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub(crate) fn lock_inner(&self) -> MutexGuard<'_, EngineInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn reload_index(&self, inner: &mut EngineInner) -> Result<(), VotingError> {
        inner.index = PollIndex::from_polls(self.store.all_polls()?)?;
        Ok(())
    }

    /// Apply one connected block. One store transaction; on any error the
    /// store rolls back and the index is reloaded to match.
    pub fn process_block(&self, block: &FederationBlock) -> Result<(), VotingError> {
        let mut inner = self.lock_inner();
        let result = self.process_block_locked(&mut inner, block);
        if result.is_err() {
            self.reload_index(&mut inner)?;
        }
        result
    }

    /// Undo one disconnected block, the exact inverse of
    /// [`VotingEngine::process_block`].
    pub fn unprocess_block(&self, block: &FederationBlock) -> Result<(), VotingError> {
        let mut inner = self.lock_inner();
        let result = self.unprocess_block_locked(&mut inner, block);
        if result.is_err() {
            self.reload_index(&mut inner)?;
        }
        result
    }

    fn process_block_locked(
        &self,
        inner: &mut EngineInner,
        block: &FederationBlock,
    ) -> Result<(), VotingError> {
        let height = block.block_ref.height;
        let mut batch = self.store.begin_batch()?;

        self.expire_polls(inner, &mut batch, height)?;
        self.execute_polls(inner, &mut batch, block)?;

        if self.params.multisig_activation_height == Some(height) {
            self.applier.set_multisig_mining(true);
        }

        self.ingest_votes(inner, &mut batch, block)?;

        // The tip moves for every block, poll changes or not.
        batch.save_tip(&block.block_ref)?;
        batch.commit()?;
        Ok(())
    }

    fn unprocess_block_locked(
        &self,
        inner: &mut EngineInner,
        block: &FederationBlock,
    ) -> Result<(), VotingError> {
        let height = block.block_ref.height;
        let mut batch = self.store.begin_batch()?;

        // Inverse order of process_block, so each step sees the same
        // federation state it saw on the way in.
        self.unwind_votes(inner, &mut batch, block)?;

        if self.params.multisig_activation_height == Some(height) {
            self.applier.set_multisig_mining(false);
        }

        self.revert_executions(inner, &mut batch, block)?;
        self.unexpire_polls(inner, &mut batch, height)?;

        let previous = BlockRef::new(block.previous, height.saturating_sub(1));
        batch.save_tip(&previous)?;
        batch.commit()?;
        Ok(())
    }

    /// Expire every pending poll whose expiry window closes at exactly this
    /// height.
    fn expire_polls(
        &self,
        inner: &mut EngineInner,
        batch: &mut PollBatch<'_>,
        height: u64,
    ) -> Result<(), VotingError> {
        let due: Vec<u32> = inner
            .index
            .polls()
            .iter()
            .filter(|p| p.is_pending() && self.params.expiry_height(p.start_block.height) == height)
            .map(|p| p.id)
            .collect();

        for id in due {
            let poll = inner.index.get_mut(id).ok_or(VotingError::Store(
                crest_store::StoreError::NotFound(id),
            ))?;
            poll.expired = true;
            info!(poll_id = id, height, "poll expired without reaching quorum");
            batch.update_poll(poll)?;
            inner.index.on_pending_status_changed(id);
        }
        Ok(())
    }

    /// Undo expiry stamped at exactly this height.
    fn unexpire_polls(
        &self,
        inner: &mut EngineInner,
        batch: &mut PollBatch<'_>,
        height: u64,
    ) -> Result<(), VotingError> {
        let due: Vec<u32> = inner
            .index
            .polls()
            .iter()
            .filter(|p| p.is_expired() && self.params.expiry_height(p.start_block.height) == height)
            .map(|p| p.id)
            .collect();

        for id in due {
            let poll = inner.index.get_mut(id).ok_or(VotingError::Store(
                crest_store::StoreError::NotFound(id),
            ))?;
            poll.expired = false;
            debug!(poll_id = id, height, "poll expiry unwound");
            batch.update_poll(poll)?;
            inner.index.on_pending_status_changed(id);
        }
        Ok(())
    }

    /// Execute every approved poll whose reorg-safety delay elapses at
    /// exactly this height.
    fn execute_polls(
        &self,
        inner: &mut EngineInner,
        batch: &mut PollBatch<'_>,
        block: &FederationBlock,
    ) -> Result<(), VotingError> {
        let height = block.block_ref.height;
        let due: Vec<u32> = inner
            .index
            .polls()
            .iter()
            .filter(|p| {
                p.is_approved()
                    && p.approved_block
                        .is_some_and(|a| self.params.execution_height(a.height) == height)
            })
            .map(|p| p.id)
            .collect();

        for id in due {
            let poll = inner.index.get_mut(id).ok_or(VotingError::Store(
                crest_store::StoreError::NotFound(id),
            ))?;
            poll.executed_block = Some(block.block_ref);
            info!(poll_id = id, height, kind = ?poll.voting_data.kind, "poll executed");
            batch.update_poll(poll)?;
            self.applier.apply(&poll.voting_data);
        }
        Ok(())
    }

    /// Undo executions stamped by exactly this block.
    fn revert_executions(
        &self,
        inner: &mut EngineInner,
        batch: &mut PollBatch<'_>,
        block: &FederationBlock,
    ) -> Result<(), VotingError> {
        let due: Vec<u32> = inner
            .index
            .polls()
            .iter()
            .filter(|p| p.executed_block.is_some_and(|e| e.hash == block.block_ref.hash))
            .map(|p| p.id)
            .collect();

        for id in due {
            let poll = inner.index.get_mut(id).ok_or(VotingError::Store(
                crest_store::StoreError::NotFound(id),
            ))?;
            poll.executed_block = None;
            info!(poll_id = id, "poll execution unwound");
            batch.update_poll(poll)?;
            self.applier.revert(&poll.voting_data);
        }
        Ok(())
    }

    fn decode_block_votes(&self, block: &FederationBlock) -> Vec<VotingData> {
        match &block.votes_payload {
            Some(payload) => match decode_voting_data(payload) {
                Ok(items) => items,
                Err(err) => {
                    // All-or-nothing: a malformed payload contributes no
                    // votes, but the block still advances the tip.
                    warn!(block = %block.block_ref, %err, "malformed voting payload ignored");
                    Vec::new()
                }
            },
            None => Vec::new(),
        }
    }

    /// Whether a proposal targets a current multisig member. Multisig
    /// members cannot be voted in or out; such votes are ignored.
    fn targets_multisig_member(&self, members: &[FederationMember], data: &VotingData) -> bool {
        if !data.kind.is_membership_change() {
            return false;
        }
        match decode_member(&data.payload) {
            Ok(target) => members.iter().any(|m| m.key == target.key && m.is_multisig),
            Err(_) => false,
        }
    }

    fn ingest_votes(
        &self,
        inner: &mut EngineInner,
        batch: &mut PollBatch<'_>,
        block: &FederationBlock,
    ) -> Result<(), VotingError> {
        let votes = self.decode_block_votes(block);
        if votes.is_empty() {
            return Ok(());
        }

        let members = self.federation.members();
        if !members.iter().any(|m| m.key == block.producer) {
            warn!(
                block = %block.block_ref,
                producer = %block.producer,
                "votes from a non-member block producer ignored"
            );
            return Ok(());
        }
        let height = block.block_ref.height;

        for data in votes {
            if self.targets_multisig_member(&members, &data) {
                debug!(block = %block.block_ref, ?data, "vote targeting a multisig member ignored");
                continue;
            }

            // This node's own published vote no longer needs scheduling.
            if self.node_key.as_ref() == Some(&block.producer) {
                inner.scheduled.retain(|d| d != &data);
            }

            match inner.index.pending_for(&data) {
                Some(id) => {
                    let policy = QuorumPolicy::new(&members, self.inactivity.as_ref());
                    let poll = inner.index.get_mut(id).ok_or(VotingError::Store(
                        crest_store::StoreError::NotFound(id),
                    ))?;
                    if poll.has_vote_from(&block.producer) {
                        debug!(poll_id = id, voter = %block.producer, "duplicate vote ignored");
                        continue;
                    }
                    poll.votes_in_favor.push(Vote {
                        voter: block.producer.clone(),
                        height,
                    });
                    let mut approved = false;
                    if policy.is_quorum_reached(poll) {
                        poll.approved_block = Some(block.block_ref);
                        approved = true;
                        info!(poll_id = id, height, "poll reached quorum");
                    }
                    batch.update_poll(poll)?;
                    if approved {
                        inner.index.on_pending_status_changed(id);
                    }
                }
                None => {
                    let id = batch.next_id()?;
                    let mut poll =
                        Poll::new(id, data.clone(), block.block_ref, block.producer.clone());
                    // A one-member federation approves its own first vote.
                    let policy = QuorumPolicy::new(&members, self.inactivity.as_ref());
                    if policy.is_quorum_reached(&poll) {
                        poll.approved_block = Some(block.block_ref);
                        info!(poll_id = id, height, "poll reached quorum at creation");
                    }
                    info!(poll_id = id, height, kind = ?poll.voting_data.kind, "poll created");
                    batch.add_poll(&poll)?;
                    inner.index.add(poll);
                }
            }
        }
        Ok(())
    }

    /// Remove this block's votes, newest embed first. Un-approves polls that
    /// reached quorum here, and deletes a poll whose vote list empties — it
    /// was created by this block and is necessarily the highest id.
    fn unwind_votes(
        &self,
        inner: &mut EngineInner,
        batch: &mut PollBatch<'_>,
        block: &FederationBlock,
    ) -> Result<(), VotingError> {
        let votes = self.decode_block_votes(block);
        if votes.is_empty() {
            return Ok(());
        }

        let members = self.federation.members();
        if !members.iter().any(|m| m.key == block.producer) {
            // Mirrors ingestion: the votes were never recorded.
            return Ok(());
        }
        let height = block.block_ref.height;

        for data in votes.iter().rev() {
            if self.targets_multisig_member(&members, data) {
                continue;
            }
            let Some(id) = inner.index.latest_matching(data) else {
                continue;
            };
            let poll = inner.index.get_mut(id).ok_or(VotingError::Store(
                crest_store::StoreError::NotFound(id),
            ))?;

            let mut unapproved = false;
            if poll.approved_block.is_some_and(|a| a.hash == block.block_ref.hash) {
                poll.approved_block = None;
                unapproved = true;
                info!(poll_id = id, "poll approval unwound");
            }
            let removed = poll.remove_vote_at(&block.producer, height);

            if removed && poll.votes_in_favor.is_empty() {
                batch.remove_poll(id)?;
                inner.index.remove(id);
                info!(poll_id = id, "poll unwound entirely");
                continue;
            }
            if removed || unapproved {
                batch.update_poll(poll)?;
            }
            if unapproved {
                inner.index.on_pending_status_changed(id);
            }
        }
        Ok(())
    }

    // --- queries -----------------------------------------------------------

    pub fn pending_polls(&self) -> Vec<Poll> {
        self.polls_where(Poll::is_pending)
    }

    pub fn approved_polls(&self) -> Vec<Poll> {
        self.polls_where(Poll::is_approved)
    }

    pub fn executed_polls(&self) -> Vec<Poll> {
        self.polls_where(Poll::is_executed)
    }

    pub fn expired_polls(&self) -> Vec<Poll> {
        self.polls_where(Poll::is_expired)
    }

    pub fn all_polls(&self) -> Vec<Poll> {
        self.lock_inner().index.polls().to_vec()
    }

    fn polls_where(&self, predicate: impl Fn(&Poll) -> bool) -> Vec<Poll> {
        self.lock_inner()
            .index
            .polls()
            .iter()
            .filter(|p| predicate(p))
            .cloned()
            .collect()
    }

    // --- scheduled votes ---------------------------------------------------

    /// Queue a proposal for this node's next produced block.
    pub fn schedule_vote(&self, data: VotingData) -> Result<(), VotingError> {
        let key = self.node_key.as_ref().ok_or(VotingError::NotAFederationMember)?;
        if !self.federation.members().iter().any(|m| &m.key == key) {
            return Err(VotingError::NotAFederationMember);
        }
        let mut inner = self.lock_inner();
        if !inner.scheduled.contains(&data) {
            inner.scheduled.push(data);
        }
        Ok(())
    }

    pub fn scheduled_votes(&self) -> Vec<VotingData> {
        self.lock_inner().scheduled.clone()
    }

    /// Drain the scheduled votes for embedding into a block under
    /// construction.
    pub fn take_scheduled_votes(&self) -> Vec<VotingData> {
        std::mem::take(&mut self.lock_inner().scheduled)
    }

    /// Whether voting for `data` would be redundant: it is scheduled, this
    /// node already voted on the pending poll, or the change is approved and
    /// only waiting out the reorg-safety delay.
    pub fn already_voting_for(&self, data: &VotingData) -> bool {
        let Some(key) = self.node_key.as_ref() else {
            return false;
        };
        let inner = self.lock_inner();
        if inner.scheduled.contains(data) {
            return true;
        }
        if inner
            .index
            .polls()
            .iter()
            .any(|p| p.is_approved() && &p.voting_data == data)
        {
            return true;
        }
        inner
            .index
            .pending_for(data)
            .and_then(|id| inner.index.get(id))
            .is_some_and(|poll| poll.has_vote_from(key))
    }

    // --- federation reconstruction -----------------------------------------

    /// The federation at `height`, deterministically replayed from genesis
    /// membership and executed polls.
    pub fn federation_at_height(&self, height: u64) -> Vec<FederationMember> {
        let inner = self.lock_inner();
        federation_at_height(
            &self.params.genesis_members,
            inner.index.polls(),
            &self.params,
            height,
        )
    }

    /// Per-height federations over `[start, end]`, computed lazily from one
    /// poll snapshot.
    pub fn federations_for_height_range(
        &self,
        start: u64,
        end: u64,
    ) -> impl Iterator<Item = (u64, Vec<FederationMember>)> {
        let polls = self.all_polls();
        let genesis = self.params.genesis_members.clone();
        let params = self.params.clone();
        (start..=end)
            .map(move |h| (h, federation_at_height(&genesis, &polls, &params, h)))
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    /// The repository tip: the last block whose effects the store reflects.
    pub fn tip(&self) -> Result<Option<BlockRef>, VotingError> {
        Ok(self.store.tip()?)
    }
}
