//! secp256k1 signing and recovery for offchain claims.

use crate::eip712::{attestation_digest, Eip712Domain};
use crate::types::{EcdsaSignature, OffchainAttestationMessage, SignedOffchainAttestation};
use ethers_core::types::{Address, Signature, H256, U256};
use ethers_core::utils::secret_key_to_address;
use k256::ecdsa::{RecoveryId, SigningKey};
use thiserror::Error;

/// Half the secp256k1 group order. Signatures with `s` above it are malleable.
const SECP256K1_HALF_ORDER: [u8; 32] = [
    0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x5d, 0x57,
    0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d, 0xdf, 0xe9, 0x2f, 0x46, 0x68, 0x1b, 0x20, 0xa0,
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignerError {
    #[error("invalid secret key")]
    InvalidKey,

    #[error("unknown offchain attestation version {0}")]
    UnknownVersion(u16),

    #[error("signing failed: {0}")]
    Signing(String),
}

/// Why a signature failed to recover to an address.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecoveryError {
    #[error("recovery id {0} is not 27 or 28")]
    InvalidV(u8),

    #[error("signature s value is in the upper half of the curve order")]
    HighS,

    #[error("signature does not recover to a public key")]
    Unrecoverable,
}

/// Issues offchain claims under one secp256k1 key.
pub struct OffchainSigner {
    signing_key: SigningKey,
    address: Address,
}

impl OffchainSigner {
    pub fn new(signing_key: SigningKey) -> Self {
        let address = secret_key_to_address(&signing_key);
        Self { signing_key, address }
    }

    /// Generate a new random signing key.
    pub fn generate() -> Self {
        use rand::rngs::OsRng;
        Self::new(SigningKey::random(&mut OsRng))
    }

    /// Load a key from its 32-byte big-endian scalar.
    pub fn from_bytes(secret: &[u8]) -> Result<Self, SignerError> {
        let signing_key = SigningKey::from_slice(secret).map_err(|_| SignerError::InvalidKey)?;
        Ok(Self::new(signing_key))
    }

    /// Address derived from the public key.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a 32-byte digest, producing a low-s signature with `v` in {27, 28}.
    pub fn sign_digest(&self, digest: H256) -> Result<EcdsaSignature, SignerError> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest.as_bytes())
            .map_err(|e| SignerError::Signing(e.to_string()))?;

        let (signature, recovery_id) = match signature.normalize_s() {
            Some(normalized) => (
                normalized,
                RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced()),
            ),
            None => (signature, recovery_id),
        };

        let bytes = signature.to_bytes();
        Ok(EcdsaSignature {
            v: 27 + recovery_id.to_byte(),
            r: H256::from_slice(&bytes[..32]),
            s: H256::from_slice(&bytes[32..]),
        })
    }

    /// Sign a claim for the given domain.
    pub fn sign(
        &self,
        domain: &Eip712Domain,
        message: OffchainAttestationMessage,
    ) -> Result<SignedOffchainAttestation, SignerError> {
        let digest = attestation_digest(domain.separator(), &message)
            .ok_or(SignerError::UnknownVersion(message.version))?;
        let signature = self.sign_digest(digest)?;

        tracing::debug!(
            signer = ?self.address,
            uid = ?message.offchain_uid(),
            version = message.version,
            "signed offchain attestation"
        );

        Ok(SignedOffchainAttestation {
            attester: self.address,
            message,
            signature,
        })
    }
}

impl std::fmt::Debug for OffchainSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OffchainSigner").field("address", &self.address).finish()
    }
}

/// Recover the signer of `digest`, rejecting malleable or malformed signatures.
pub fn recover_signer(digest: H256, signature: &EcdsaSignature) -> Result<Address, RecoveryError> {
    if signature.v != 27 && signature.v != 28 {
        return Err(RecoveryError::InvalidV(signature.v));
    }
    if signature.s.as_bytes() > &SECP256K1_HALF_ORDER[..] {
        return Err(RecoveryError::HighS);
    }

    let signature = Signature {
        r: U256::from_big_endian(signature.r.as_bytes()),
        s: U256::from_big_endian(signature.s.as_bytes()),
        v: u64::from(signature.v),
    };
    signature.recover(digest).map_err(|_| RecoveryError::Unrecoverable)
}
