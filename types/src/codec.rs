//! Deterministic binary codec for embedded voting payloads.
//!
//! A block producer embeds a `Vec<VotingData>` in its block as one opaque
//! byte string. Decoding is all-or-nothing: any truncation, trailing bytes,
//! or unknown kind fails the whole payload — partial decode is never
//! attempted, so two nodes can never disagree on which votes a block carried.

use crate::hash::BlockHash;
use crate::member::{CollateralRef, FederationMember};
use crate::voting::{VoteKind, VoterKey, VotingData};
use thiserror::Error;

/// Two-byte prefix identifying a CREST voting payload.
pub const VOTING_PAYLOAD_MAGIC: [u8; 2] = [0x43, 0x56]; // "CV"

/// Upper bound on a single item's payload, to reject absurd length prefixes
/// before allocating.
pub const MAX_ITEM_PAYLOAD: usize = 64 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("payload does not start with the voting magic prefix")]
    BadMagic,

    #[error("payload ended unexpectedly while decoding")]
    UnexpectedEnd,

    #[error("unknown vote kind discriminant {0}")]
    UnknownKind(u8),

    #[error("{0} trailing bytes after the last item")]
    TrailingBytes(usize),

    #[error("item payload of {len} bytes exceeds the {max} byte limit")]
    OversizedPayload { len: usize, max: usize },

    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    #[error("hash payload must be exactly 32 bytes, got {0}")]
    BadHashLength(usize),
}

/// Encode a list of voting items into the embedded block payload format.
pub fn encode_voting_data(items: &[VotingData]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + items.iter().map(|i| 5 + i.payload.len()).sum::<usize>());
    out.extend_from_slice(&VOTING_PAYLOAD_MAGIC);
    out.extend_from_slice(&(items.len() as u16).to_be_bytes());
    for item in items {
        out.push(item.kind.as_u8());
        out.extend_from_slice(&(item.payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&item.payload);
    }
    out
}

/// Decode an embedded voting payload. Fails as a unit on any malformation.
pub fn decode_voting_data(bytes: &[u8]) -> Result<Vec<VotingData>, CodecError> {
    let mut r = Reader::new(bytes);

    if r.take(2)? != VOTING_PAYLOAD_MAGIC {
        return Err(CodecError::BadMagic);
    }
    let count = u16::from_be_bytes(r.take(2)?.try_into().expect("checked length"));

    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let kind_byte = r.take(1)?[0];
        let kind = VoteKind::from_u8(kind_byte).ok_or(CodecError::UnknownKind(kind_byte))?;
        let len = u32::from_be_bytes(r.take(4)?.try_into().expect("checked length")) as usize;
        if len > MAX_ITEM_PAYLOAD {
            return Err(CodecError::OversizedPayload {
                len,
                max: MAX_ITEM_PAYLOAD,
            });
        }
        let payload = r.take(len)?.to_vec();
        items.push(VotingData::new(kind, payload));
    }

    if r.remaining() != 0 {
        return Err(CodecError::TrailingBytes(r.remaining()));
    }
    Ok(items)
}

/// Encode a federation member as an Add/Kick vote payload.
///
/// Layout: key length (u16 BE) + key UTF-8, then a presence flag byte and,
/// if set, collateral length (u16 BE) + collateral UTF-8.
pub fn encode_member(member: &FederationMember) -> Vec<u8> {
    let key = member.key.as_str().as_bytes();
    let mut out = Vec::with_capacity(3 + key.len());
    out.extend_from_slice(&(key.len() as u16).to_be_bytes());
    out.extend_from_slice(key);
    match &member.collateral {
        Some(collateral) => {
            let addr = collateral.as_str().as_bytes();
            out.push(1);
            out.extend_from_slice(&(addr.len() as u16).to_be_bytes());
            out.extend_from_slice(addr);
        }
        None => out.push(0),
    }
    out
}

/// Decode an Add/Kick vote payload back into a federation member.
///
/// The multisig flag is not carried in the payload — it is a property of the
/// live federation state, not of the proposal.
pub fn decode_member(bytes: &[u8]) -> Result<FederationMember, CodecError> {
    let mut r = Reader::new(bytes);

    let key_len = u16::from_be_bytes(r.take(2)?.try_into().expect("checked length")) as usize;
    let key = std::str::from_utf8(r.take(key_len)?).map_err(|_| CodecError::InvalidUtf8)?;
    let mut member = FederationMember::new(VoterKey::new(key));

    match r.take(1)?[0] {
        0 => {}
        _ => {
            let addr_len =
                u16::from_be_bytes(r.take(2)?.try_into().expect("checked length")) as usize;
            let addr =
                std::str::from_utf8(r.take(addr_len)?).map_err(|_| CodecError::InvalidUtf8)?;
            member = member.with_collateral(CollateralRef::new(addr));
        }
    }

    if r.remaining() != 0 {
        return Err(CodecError::TrailingBytes(r.remaining()));
    }
    Ok(member)
}

/// Decode a Whitelist/Remove vote payload: exactly one 32-byte hash.
pub fn decode_hash_payload(bytes: &[u8]) -> Result<BlockHash, CodecError> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CodecError::BadHashLength(bytes.len()))?;
    Ok(BlockHash::new(arr))
}

/// Bounds-checked cursor over the raw payload.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.pos + n > self.bytes.len() {
            return Err(CodecError::UnexpectedEnd);
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}
