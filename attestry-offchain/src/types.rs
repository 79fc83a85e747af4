//! Offchain claim types.

use attestry_core::crypto::keccak256;
use attestry_core::types::Uid;
use ethers_core::types::{Address, H256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed-data layout a claim was signed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum OffchainAttestationVersion {
    /// `Attestation(...)` struct without a version field
    Legacy = 0,
    /// `Attest(uint16 version, ...)` struct
    Version1 = 1,
}

impl OffchainAttestationVersion {
    pub const ALL: [OffchainAttestationVersion; 2] = [Self::Legacy, Self::Version1];

    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for OffchainAttestationVersion {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Legacy),
            1 => Ok(Self::Version1),
            other => Err(other),
        }
    }
}

impl fmt::Display for OffchainAttestationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::Version1 => write!(f, "v1"),
        }
    }
}

/// The signed fields of an offchain claim.
///
/// `version` is kept raw so that claims declaring an unknown layout can still
/// be represented and rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffchainAttestationMessage {
    pub version: u16,
    pub schema: Uid,
    pub recipient: Address,
    /// Issue time (unix seconds)
    pub time: u64,
    pub expiration_time: u64,
    pub revocable: bool,
    pub ref_uid: Uid,
    pub data: Vec<u8>,
}

impl OffchainAttestationMessage {
    /// Derive the offchain uid of this claim.
    ///
    /// `keccak256(version ‖ schema ‖ recipient ‖ 0x00*20 ‖ time ‖ expiration ‖ revocable ‖ ref_uid ‖ data ‖ 0u32)`,
    /// the attester slot left zero since the claim is identified before signing.
    pub fn offchain_uid(&self) -> Uid {
        let mut buf = Vec::with_capacity(2 + 32 + 20 + 20 + 8 + 8 + 1 + 32 + self.data.len() + 4);
        buf.extend_from_slice(&self.version.to_be_bytes());
        buf.extend_from_slice(self.schema.as_bytes());
        buf.extend_from_slice(self.recipient.as_bytes());
        buf.extend_from_slice(Address::zero().as_bytes());
        buf.extend_from_slice(&self.time.to_be_bytes());
        buf.extend_from_slice(&self.expiration_time.to_be_bytes());
        buf.push(self.revocable as u8);
        buf.extend_from_slice(self.ref_uid.as_bytes());
        buf.extend_from_slice(&self.data);
        buf.extend_from_slice(&0u32.to_be_bytes());
        keccak256(&buf)
    }
}

/// Detached secp256k1 signature split into its three scalar components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcdsaSignature {
    /// Recovery id, 27 or 28
    pub v: u8,
    pub r: H256,
    pub s: H256,
}

/// A claim plus its declared issuer and detached signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedOffchainAttestation {
    pub attester: Address,
    pub message: OffchainAttestationMessage,
    pub signature: EcdsaSignature,
}

impl SignedOffchainAttestation {
    pub fn uid(&self) -> Uid {
        self.message.offchain_uid()
    }
}
