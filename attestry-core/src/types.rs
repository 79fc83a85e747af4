//! Core types used across the attestation registry.

use ethers_core::types::{Address, H256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of a schema or an attestation (32-byte Keccak-256 hash).
pub type Uid = H256;

/// The empty uid, used for "no reference" and "not found".
pub const EMPTY_UID: Uid = H256([0u8; 32]);

/// Expiration time meaning "never expires".
pub const NO_EXPIRATION: u64 = 0;

/// Short hex rendering of a uid for log lines (`0x1234abcd…`).
pub fn short_uid(uid: &Uid) -> String {
    format!("0x{}…", hex::encode(&uid.as_bytes()[..4]))
}

/// An immutable claim template registered once in the schema registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRecord {
    /// Content hash over (schema, resolver, revocable)
    pub uid: Uid,
    /// Address of the resolver hook bound at registration (zero if none)
    pub resolver: Address,
    /// Whether attestations under this schema may be revoked
    pub revocable: bool,
    /// Template string, e.g. `uint256 value`
    pub schema: String,
}

impl SchemaRecord {
    /// Whether a resolver hook is bound to this schema.
    pub fn has_resolver(&self) -> bool {
        !self.resolver.is_zero()
    }
}

/// The per-attestation fields supplied by an issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRequestData {
    /// Subject of the claim (zero address for "no recipient")
    pub recipient: Address,
    /// Unix time after which the claim is void, or [`NO_EXPIRATION`]
    pub expiration_time: u64,
    /// Whether the issuer may revoke it later
    pub revocable: bool,
    /// Optional back-link to another attestation ([`EMPTY_UID`] for none)
    pub ref_uid: Uid,
    /// Opaque payload bytes
    pub data: Vec<u8>,
}

impl AttestationRequestData {
    /// Request data carrying `data` with every other field at its protocol default.
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }
}

impl Default for AttestationRequestData {
    fn default() -> Self {
        Self {
            recipient: Address::zero(),
            expiration_time: NO_EXPIRATION,
            revocable: true,
            ref_uid: EMPTY_UID,
            data: Vec::new(),
        }
    }
}

/// One claim to be issued against a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRequest {
    pub schema: Uid,
    pub data: AttestationRequestData,
}

/// Many claims to be issued against the same schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiAttestationRequest {
    pub schema: Uid,
    pub data: Vec<AttestationRequestData>,
}

/// Revocation of one attestation issued under `schema`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationRequest {
    pub schema: Uid,
    pub uid: Uid,
}

/// Revocation of many attestations issued under the same schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiRevocationRequest {
    pub schema: Uid,
    pub uids: Vec<Uid>,
}

/// A persisted, issued claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    /// Content + uniqueness hash minted by the engine
    pub uid: Uid,
    pub schema: Uid,
    /// Issue time (unix seconds)
    pub time: u64,
    pub expiration_time: u64,
    /// Revocation time, 0 while not revoked
    pub revocation_time: u64,
    pub ref_uid: Uid,
    pub recipient: Address,
    /// Issuer identity, the only party allowed to revoke
    pub attester: Address,
    pub revocable: bool,
    pub data: Vec<u8>,
}

impl Attestation {
    /// Whether a revocation time has been stamped.
    pub fn is_revoked(&self) -> bool {
        self.revocation_time != 0
    }

    /// Whether the attestation has an expiration time earlier than `now`.
    pub fn is_expired(&self, now: u64) -> bool {
        self.expiration_time != NO_EXPIRATION && self.expiration_time < now
    }
}

impl fmt::Display for Attestation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (schema {}, attester {:?})",
            short_uid(&self.uid),
            short_uid(&self.schema),
            self.attester
        )
    }
}
