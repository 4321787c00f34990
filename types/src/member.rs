//! Federation membership types.

use crate::voting::VoterKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address backing a member's collateral deposit.
///
/// Opaque to the voting engine; only uniqueness matters — no two members may
/// ever be backed by the same collateral.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollateralRef(String);

impl CollateralRef {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CollateralRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CollateralRef({})", self.0)
    }
}

/// One authorized block producer / voter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationMember {
    /// The member's signing key, as embedded in produced blocks.
    pub key: VoterKey,
    /// Collateral backing the membership, if any.
    pub collateral: Option<CollateralRef>,
    /// Multisig members operate the cross-chain wallet and are exempt from
    /// federation voting — votes targeting them are ignored.
    pub is_multisig: bool,
}

impl FederationMember {
    pub fn new(key: VoterKey) -> Self {
        Self {
            key,
            collateral: None,
            is_multisig: false,
        }
    }

    pub fn with_collateral(mut self, collateral: CollateralRef) -> Self {
        self.collateral = Some(collateral);
        self
    }

    pub fn multisig(mut self) -> Self {
        self.is_multisig = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let m = FederationMember::new(VoterKey::new("aa"))
            .with_collateral(CollateralRef::new("addr1"))
            .multisig();
        assert_eq!(m.key.as_str(), "aa");
        assert_eq!(m.collateral.as_ref().unwrap().as_str(), "addr1");
        assert!(m.is_multisig);
    }

    #[test]
    fn plain_member_has_no_collateral() {
        let m = FederationMember::new(VoterKey::new("bb"));
        assert!(m.collateral.is_none());
        assert!(!m.is_multisig);
    }
}
