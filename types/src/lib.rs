//! Core data model for the CREST federation voting protocol.
//!
//! Pure data and encoding — no storage, no I/O. Everything here is shared by
//! the poll store, the voting engine, and the node shell.

pub mod chain;
pub mod codec;
pub mod hash;
pub mod member;
pub mod params;
pub mod poll;
pub mod voting;

pub use chain::{ChainView, FederationBlock};
pub use codec::CodecError;
pub use hash::{BlockHash, BlockRef};
pub use member::{CollateralRef, FederationMember};
pub use params::NetworkParams;
pub use poll::Poll;
pub use voting::{Vote, VoteKind, VoterKey, VotingData};
