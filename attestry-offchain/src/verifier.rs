//! Stateless verification of signed offchain claims.
//!
//! A claim is valid when all of the following hold:
//! 1. its declared version is recognized, and matches the fixed version if one is set
//! 2. the signature recovers, under the engine's domain, to the declared non-zero issuer
//! 3. its schema is registered
//! 4. it was not issued after `now + max_clock_skew_secs` and has not expired
//!
//! Field tampering is caught by (2): every signed field feeds the digest.

use crate::config::VerifierConfig;
use crate::eip712::{struct_hash, typed_data_digest, Eip712Domain};
use crate::signer::{recover_signer, RecoveryError};
use crate::types::{OffchainAttestationVersion, SignedOffchainAttestation};
use attestry_core::types::{Uid, NO_EXPIRATION};
use attestry_core::AttestationEngine;
use ethers_core::types::{Address, H256};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Construction errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifierError {
    #[error("engine has no address")]
    InvalidEngine,

    #[error("unsupported offchain attestation version {0}")]
    InvalidVersion(u16),
}

/// Why a claim was judged invalid. Callers that only need the boolean use
/// [`OffchainAttestationVerifier::verify`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerificationFailure {
    #[error("unrecognized version {0}")]
    UnknownVersion(u16),

    #[error("version {actual} does not match required version {expected}")]
    VersionMismatch { expected: u16, actual: u16 },

    #[error("declared attester is the zero address")]
    ZeroAttester,

    #[error("bad signature: {0}")]
    BadSignature(#[from] RecoveryError),

    #[error("signature recovers to {recovered:?}, not {declared:?}")]
    SignerMismatch { declared: Address, recovered: Address },

    #[error("schema {0:?} is not registered")]
    UnknownSchema(Uid),

    #[error("issued at {time}, after {now}")]
    IssuedInFuture { time: u64, now: u64 },

    #[error("expired at {expiration_time}, before {now}")]
    Expired { expiration_time: u64, now: u64 },
}

pub struct OffchainAttestationVerifier<E: AttestationEngine + ?Sized> {
    engine: Arc<E>,
    version: Option<OffchainAttestationVersion>,
    config: VerifierConfig,
    domain_separator: H256,
}

impl<E: AttestationEngine + ?Sized> OffchainAttestationVerifier<E> {
    /// Build a verifier that accepts `version` only, or any recognized version when `None`.
    pub fn new(engine: Arc<E>, version: Option<u16>) -> Result<Self, VerifierError> {
        Self::with_config(engine, version, VerifierConfig::default())
    }

    pub fn with_config(engine: Arc<E>, version: Option<u16>, config: VerifierConfig) -> Result<Self, VerifierError> {
        if engine.address().is_zero() {
            return Err(VerifierError::InvalidEngine);
        }
        let version = version
            .map(|raw| OffchainAttestationVersion::try_from(raw).map_err(VerifierError::InvalidVersion))
            .transpose()?;

        let domain = Eip712Domain::for_engine(engine.as_ref(), &config.domain_name);
        tracing::debug!(
            engine = ?domain.verifying_contract,
            chain_id = domain.chain_id,
            version = ?version,
            "offchain verifier ready"
        );

        Ok(Self {
            domain_separator: domain.separator(),
            engine,
            version,
            config,
        })
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// The fixed version this verifier accepts, if any.
    pub fn version(&self) -> Option<u16> {
        self.version.map(OffchainAttestationVersion::as_u16)
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn domain_separator(&self) -> H256 {
        self.domain_separator
    }

    /// Whether `claim` is currently valid.
    pub fn verify(&self, claim: &SignedOffchainAttestation) -> bool {
        match self.check(claim) {
            Ok(()) => true,
            Err(failure) => {
                tracing::debug!(uid = ?claim.uid(), %failure, "offchain attestation rejected");
                false
            }
        }
    }

    /// Same evaluation as [`verify`](Self::verify), reporting the first failed rule.
    pub fn check(&self, claim: &SignedOffchainAttestation) -> Result<(), VerificationFailure> {
        let message = &claim.message;

        let version = OffchainAttestationVersion::try_from(message.version)
            .map_err(VerificationFailure::UnknownVersion)?;
        if let Some(expected) = self.version {
            if expected != version {
                return Err(VerificationFailure::VersionMismatch {
                    expected: expected.as_u16(),
                    actual: version.as_u16(),
                });
            }
        }

        if claim.attester.is_zero() {
            return Err(VerificationFailure::ZeroAttester);
        }
        let digest = typed_data_digest(self.domain_separator, struct_hash(version, message));
        let recovered = recover_signer(digest, &claim.signature)?;
        if recovered != claim.attester {
            return Err(VerificationFailure::SignerMismatch {
                declared: claim.attester,
                recovered,
            });
        }

        if self.engine.schema_registry().get_schema(&message.schema).is_none() {
            return Err(VerificationFailure::UnknownSchema(message.schema));
        }

        let now = self.engine.now();
        if message.time > now.saturating_add(self.config.max_clock_skew_secs) {
            return Err(VerificationFailure::IssuedInFuture {
                time: message.time,
                now,
            });
        }
        if message.expiration_time != NO_EXPIRATION && message.expiration_time < now {
            return Err(VerificationFailure::Expired {
                expiration_time: message.expiration_time,
                now,
            });
        }

        Ok(())
    }
}

impl<E: AttestationEngine + ?Sized> fmt::Debug for OffchainAttestationVerifier<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OffchainAttestationVerifier")
            .field("engine", &self.engine.address())
            .field("version", &self.version)
            .field("config", &self.config)
            .finish()
    }
}
