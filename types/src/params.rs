//! Network consensus parameters for the voting engine.

use crate::member::FederationMember;
use serde::{Deserialize, Serialize};

/// Consensus parameters governing poll lifecycle timing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkParams {
    /// Reorg-safety delay: an approved poll is executed exactly this many
    /// blocks after the block where quorum was reached.
    pub max_reorg_length: u64,

    /// A pending poll expires once this many blocks have passed since its
    /// start block (subject to `expiry_activation_height`).
    pub poll_expiry_blocks: u64,

    /// Expiry floor: no poll expires before this height, so polls created
    /// before the expiry feature activated are not retroactively killed at
    /// the activation block.
    pub expiry_activation_height: u64,

    /// Height at which multisig members become eligible block producers — a
    /// one-time federation-wide flag flip, unrelated to individual polls.
    pub multisig_activation_height: Option<u64>,

    /// The federation at genesis; the base of every membership replay.
    pub genesis_members: Vec<FederationMember>,
}

impl NetworkParams {
    /// Parameters for local development and tests: short windows, no
    /// multisig activation.
    pub fn dev(genesis_members: Vec<FederationMember>) -> Self {
        Self {
            max_reorg_length: 5,
            poll_expiry_blocks: 50,
            expiry_activation_height: 0,
            multisig_activation_height: None,
            genesis_members,
        }
    }

    /// Height at which a poll started at `start_height` expires.
    pub fn expiry_height(&self, start_height: u64) -> u64 {
        (start_height + self.poll_expiry_blocks).max(self.expiry_activation_height)
    }

    /// Height at which a poll approved at `approved_height` is executed.
    pub fn execution_height(&self, approved_height: u64) -> u64 {
        approved_height + self.max_reorg_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_height_is_start_plus_window() {
        let params = NetworkParams::dev(vec![]);
        assert_eq!(params.expiry_height(100), 150);
    }

    #[test]
    fn expiry_height_respects_activation_floor() {
        let mut params = NetworkParams::dev(vec![]);
        params.expiry_activation_height = 1000;
        // A poll started early never expires before the floor.
        assert_eq!(params.expiry_height(100), 1000);
        // Past the floor, the normal window applies.
        assert_eq!(params.expiry_height(2000), 2050);
    }

    #[test]
    fn execution_height_is_approval_plus_reorg_delay() {
        let params = NetworkParams::dev(vec![]);
        assert_eq!(params.execution_height(102), 107);
    }
}
