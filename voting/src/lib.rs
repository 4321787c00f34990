//! Federation voting and poll consensus.
//!
//! Turns a stream of connected/disconnected federation blocks into poll
//! state: polls open on first votes, approve at quorum, execute after the
//! reorg-safety delay, expire when stale — and every transition unwinds
//! exactly when the chain reorganizes under it.

pub mod applier;
pub mod engine;
pub mod error;
pub mod federation;
pub mod inactivity;
pub mod index;
pub mod quorum;
pub mod sync;
pub mod testkit;

pub use applier::{FederationProvider, LiveFederation, PollOutcomeApplier};
pub use engine::VotingEngine;
pub use error::VotingError;
pub use federation::{federation_at_height, federations_for_height_range};
pub use inactivity::{InactivitySchedule, InactivityTracker, NoInactivity};
pub use index::PollIndex;
pub use quorum::QuorumPolicy;
pub use sync::SyncOutcome;
