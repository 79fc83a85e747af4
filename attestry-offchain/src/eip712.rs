//! Structured-data (EIP-712) digests for offchain claims.
//!
//! ## Layout
//! ```text
//! digest          = keccak256(0x19 0x01 ‖ domainSeparator ‖ structHash)
//! domainSeparator = keccak256(abi.encode(DOMAIN_TYPEHASH, keccak256(name), keccak256(version), chainId, verifyingContract))
//! structHash      = keccak256(abi.encode(TYPEHASH, fields...))   // `bytes data` as keccak256(data)
//! ```
//! The legacy layout hashes the fields without the version tag; version 1
//! hashes the tag as a leading `uint16`.

use crate::types::{OffchainAttestationMessage, OffchainAttestationVersion};
use attestry_core::crypto::keccak256;
use attestry_core::AttestationEngine;
use ethers_core::abi::{self, Token};
use ethers_core::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

/// Protocol name bound into every domain separator.
pub const DOMAIN_NAME: &str = "EAS Attestation";

pub const DOMAIN_TYPE: &str = "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

pub const LEGACY_ATTEST_TYPE: &str =
    "Attestation(bytes32 schema,address recipient,uint64 time,uint64 expirationTime,bool revocable,bytes32 refUID,bytes data)";

pub const VERSION1_ATTEST_TYPE: &str =
    "Attest(uint16 version,bytes32 schema,address recipient,uint64 time,uint64 expirationTime,bool revocable,bytes32 refUID,bytes data)";

/// The signing domain: who verifies, under which protocol, on which network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eip712Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl Eip712Domain {
    /// Domain of claims verified against `engine`.
    pub fn for_engine<E: AttestationEngine + ?Sized>(engine: &E, name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: engine.version().to_string(),
            chain_id: engine.chain_id(),
            verifying_contract: engine.address(),
        }
    }

    pub fn separator(&self) -> H256 {
        let encoded = abi::encode(&[
            word(keccak256(DOMAIN_TYPE.as_bytes())),
            word(keccak256(self.name.as_bytes())),
            word(keccak256(self.version.as_bytes())),
            Token::Uint(U256::from(self.chain_id)),
            Token::Address(self.verifying_contract),
        ]);
        keccak256(&encoded)
    }
}

fn word(hash: H256) -> Token {
    Token::FixedBytes(hash.as_bytes().to_vec())
}

/// Type hash of the struct a version signs.
pub fn type_hash(version: OffchainAttestationVersion) -> H256 {
    match version {
        OffchainAttestationVersion::Legacy => keccak256(LEGACY_ATTEST_TYPE.as_bytes()),
        OffchainAttestationVersion::Version1 => keccak256(VERSION1_ATTEST_TYPE.as_bytes()),
    }
}

/// Hash the message fields using the given layout.
pub fn struct_hash(version: OffchainAttestationVersion, message: &OffchainAttestationMessage) -> H256 {
    let mut tokens = vec![word(type_hash(version))];
    if version == OffchainAttestationVersion::Version1 {
        tokens.push(Token::Uint(U256::from(message.version)));
    }
    tokens.extend([
        word(message.schema),
        Token::Address(message.recipient),
        Token::Uint(U256::from(message.time)),
        Token::Uint(U256::from(message.expiration_time)),
        Token::Bool(message.revocable),
        word(message.ref_uid),
        word(keccak256(&message.data)),
    ]);
    keccak256(&abi::encode(&tokens))
}

/// Final digest of a struct hash under a domain separator.
pub fn typed_data_digest(domain_separator: H256, struct_hash: H256) -> H256 {
    let mut buf = Vec::with_capacity(2 + 32 + 32);
    buf.extend_from_slice(&[0x19, 0x01]);
    buf.extend_from_slice(domain_separator.as_bytes());
    buf.extend_from_slice(struct_hash.as_bytes());
    keccak256(&buf)
}

/// Digest a claim under the layout it declares, `None` for an unknown version.
pub fn attestation_digest(domain_separator: H256, message: &OffchainAttestationMessage) -> Option<H256> {
    let version = OffchainAttestationVersion::try_from(message.version).ok()?;
    Some(typed_data_digest(domain_separator, struct_hash(version, message)))
}
