//! Block hash and block reference types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte block hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockHash([u8; 32]);

impl BlockHash {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

/// A `(hash, height)` pair identifying one block on the chain.
///
/// Used for poll start/approval/execution markers and for the repository tip.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRef {
    pub hash: BlockHash,
    pub height: u64,
}

impl BlockRef {
    pub const ZERO: Self = Self {
        hash: BlockHash::ZERO,
        height: 0,
    };

    pub fn new(hash: BlockHash, height: u64) -> Self {
        Self { hash, height }
    }

    pub fn is_zero(&self) -> bool {
        self.hash.is_zero() && self.height == 0
    }
}

impl fmt::Debug for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockRef({}:{})", hex::encode(&self.hash.0[..4]), self.height)
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", hex::encode(&self.hash.0[..4]), self.height)
    }
}

// Inline hex encoding to avoid adding the `hex` crate as a dependency of types.
mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_hash_is_zero() {
        assert!(BlockHash::ZERO.is_zero());
        assert!(!BlockHash::new([1u8; 32]).is_zero());
    }

    #[test]
    fn zero_block_ref() {
        assert!(BlockRef::ZERO.is_zero());
        assert!(!BlockRef::new(BlockHash::ZERO, 5).is_zero());
        assert!(!BlockRef::new(BlockHash::new([1u8; 32]), 0).is_zero());
    }

    #[test]
    fn display_is_full_hex() {
        let h = BlockHash::new([0xAB; 32]);
        assert_eq!(h.to_string().len(), 64);
        assert!(h.to_string().starts_with("abab"));
    }
}
