//! Transport envelope for signed claims.

use crate::types::SignedOffchainAttestation;
use attestry_core::serialization::{from_canonical_cbor, to_canonical_cbor, SerializationError};
use ethers_core::types::Address;
use serde::{Deserialize, Serialize};

/// A signed claim together with the address that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffchainPackage {
    pub sig: SignedOffchainAttestation,
    pub signer: Address,
}

impl OffchainPackage {
    pub fn new(sig: SignedOffchainAttestation) -> Self {
        let signer = sig.attester;
        Self { sig, signer }
    }

    pub fn encode(&self) -> Result<Vec<u8>, SerializationError> {
        to_canonical_cbor(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SerializationError> {
        from_canonical_cbor(bytes)
    }
}
