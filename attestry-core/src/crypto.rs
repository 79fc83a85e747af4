//! Hashing primitives and identifier derivation.
//!
//! All identifiers are Keccak-256 hashes over tightly packed fields
//! (no padding, integers big-endian at their declared width), so they can be
//! reproduced by any party holding the same inputs.

use crate::types::Uid;
use ethers_core::types::{Address, H256};

/// Compute the Keccak-256 hash of data.
pub fn keccak256(data: &[u8]) -> H256 {
    H256::from(ethers_core::utils::keccak256(data))
}

/// Derive a schema uid from its three attributes.
///
/// `keccak256(schema ‖ resolver ‖ revocable)`
pub fn schema_uid(schema: &str, resolver: Address, revocable: bool) -> Uid {
    let mut buf = Vec::with_capacity(schema.len() + 20 + 1);
    buf.extend_from_slice(schema.as_bytes());
    buf.extend_from_slice(resolver.as_bytes());
    buf.push(revocable as u8);
    keccak256(&buf)
}

/// Fields hashed into an attestation uid.
#[derive(Debug, Clone, Copy)]
pub struct AttestationUidInput<'a> {
    pub schema: Uid,
    pub recipient: Address,
    pub attester: Address,
    pub time: u64,
    pub expiration_time: u64,
    pub revocable: bool,
    pub ref_uid: Uid,
    pub data: &'a [u8],
}

/// Derive an attestation uid.
///
/// `bump` disambiguates otherwise identical attestations; the engine
/// increments it until the resulting uid is unused.
pub fn attestation_uid(input: &AttestationUidInput<'_>, bump: u32) -> Uid {
    let mut buf = Vec::with_capacity(32 + 20 + 20 + 8 + 8 + 1 + 32 + input.data.len() + 4);
    buf.extend_from_slice(input.schema.as_bytes());
    buf.extend_from_slice(input.recipient.as_bytes());
    buf.extend_from_slice(input.attester.as_bytes());
    buf.extend_from_slice(&input.time.to_be_bytes());
    buf.extend_from_slice(&input.expiration_time.to_be_bytes());
    buf.push(input.revocable as u8);
    buf.extend_from_slice(input.ref_uid.as_bytes());
    buf.extend_from_slice(input.data);
    buf.extend_from_slice(&bump.to_be_bytes());
    keccak256(&buf)
}
