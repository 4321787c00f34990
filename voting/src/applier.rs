//! Outcome seam — where approved poll results land, and where the engine
//! reads the current federation from.
//!
//! The engine never mutates federation state directly; it drives these traits
//! at execution/revert time so embedders can hook their own wallet and
//! whitelist machinery. `LiveFederation` is the reference implementation and
//! the state that deterministic federation replay reconstructs.

use std::collections::HashSet;
use std::sync::RwLock;

use crest_types::codec::{decode_hash_payload, decode_member};
use crest_types::{BlockHash, FederationMember, VoteKind, VotingData};
use tracing::{info, warn};

/// Source of the current federation member list.
pub trait FederationProvider: Send + Sync {
    fn members(&self) -> Vec<FederationMember>;
}

/// Applies and reverts executed poll outcomes.
///
/// Both directions must be idempotent: applying an already-applied outcome
/// (or reverting one never applied) is a logged no-op, never an error —
/// replay after a crash may re-drive the same transition.
pub trait PollOutcomeApplier: Send + Sync {
    fn apply(&self, data: &VotingData);
    fn revert(&self, data: &VotingData);
    /// One-time federation-wide flag flip at the multisig activation height.
    fn set_multisig_mining(&self, enabled: bool);
}

/// In-memory federation state driven by executed polls.
pub struct LiveFederation {
    state: RwLock<FederationState>,
}

struct FederationState {
    members: Vec<FederationMember>,
    whitelist: HashSet<BlockHash>,
    multisig_mining: bool,
}

impl LiveFederation {
    pub fn new(genesis_members: Vec<FederationMember>) -> Self {
        Self {
            state: RwLock::new(FederationState {
                members: genesis_members,
                whitelist: HashSet::new(),
                multisig_mining: false,
            }),
        }
    }

    pub fn whitelisted_hashes(&self) -> Vec<BlockHash> {
        self.read().whitelist.iter().copied().collect()
    }

    pub fn is_whitelisted(&self, hash: &BlockHash) -> bool {
        self.read().whitelist.contains(hash)
    }

    pub fn multisig_mining(&self) -> bool {
        self.read().multisig_mining
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, FederationState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, FederationState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl FederationProvider for LiveFederation {
    fn members(&self) -> Vec<FederationMember> {
        self.read().members.clone()
    }
}

impl PollOutcomeApplier for LiveFederation {
    fn apply(&self, data: &VotingData) {
        let mut state = self.write();
        match data.kind {
            VoteKind::AddMember => match decode_member(&data.payload) {
                Ok(member) => {
                    if state.members.iter().any(|m| m.key == member.key) {
                        warn!(key = %member.key, "add-member outcome already applied");
                        return;
                    }
                    info!(key = %member.key, "federation member added");
                    state.members.push(member);
                }
                Err(err) => warn!(%err, "undecodable add-member outcome ignored"),
            },
            VoteKind::KickMember => match decode_member(&data.payload) {
                Ok(member) => {
                    let before = state.members.len();
                    state.members.retain(|m| m.key != member.key);
                    if state.members.len() == before {
                        warn!(key = %member.key, "kick-member outcome already applied");
                    } else {
                        info!(key = %member.key, "federation member kicked");
                    }
                }
                Err(err) => warn!(%err, "undecodable kick-member outcome ignored"),
            },
            VoteKind::WhitelistHash => match decode_hash_payload(&data.payload) {
                Ok(hash) => {
                    if !state.whitelist.insert(hash) {
                        warn!(%hash, "whitelist outcome already applied");
                    }
                }
                Err(err) => warn!(%err, "undecodable whitelist outcome ignored"),
            },
            VoteKind::RemoveHash => match decode_hash_payload(&data.payload) {
                Ok(hash) => {
                    if !state.whitelist.remove(&hash) {
                        warn!(%hash, "remove-hash outcome already applied");
                    }
                }
                Err(err) => warn!(%err, "undecodable remove-hash outcome ignored"),
            },
        }
    }

    fn revert(&self, data: &VotingData) {
        let mut state = self.write();
        match data.kind {
            VoteKind::AddMember => match decode_member(&data.payload) {
                Ok(member) => {
                    let before = state.members.len();
                    state.members.retain(|m| m.key != member.key);
                    if state.members.len() == before {
                        warn!(key = %member.key, "add-member outcome was not applied");
                    }
                }
                Err(err) => warn!(%err, "undecodable add-member revert ignored"),
            },
            VoteKind::KickMember => match decode_member(&data.payload) {
                Ok(member) => {
                    if state.members.iter().any(|m| m.key == member.key) {
                        warn!(key = %member.key, "kick-member outcome was not applied");
                        return;
                    }
                    state.members.push(member);
                }
                Err(err) => warn!(%err, "undecodable kick-member revert ignored"),
            },
            VoteKind::WhitelistHash => match decode_hash_payload(&data.payload) {
                Ok(hash) => {
                    if !state.whitelist.remove(&hash) {
                        warn!(%hash, "whitelist outcome was not applied");
                    }
                }
                Err(err) => warn!(%err, "undecodable whitelist revert ignored"),
            },
            VoteKind::RemoveHash => match decode_hash_payload(&data.payload) {
                Ok(hash) => {
                    if !state.whitelist.insert(hash) {
                        warn!(%hash, "remove-hash outcome was not applied");
                    }
                }
                Err(err) => warn!(%err, "undecodable remove-hash revert ignored"),
            },
        }
    }

    fn set_multisig_mining(&self, enabled: bool) {
        let mut state = self.write();
        if state.multisig_mining == enabled {
            warn!(enabled, "multisig mining flag already in requested state");
            return;
        }
        info!(enabled, "multisig mining flag flipped");
        state.multisig_mining = enabled;
    }
}
