//! Offchain attestations: claims signed with a secp256k1 key over a
//! structured-data digest, never submitted to the ledger.
//!
//! ## Verification Flow
//! 1. Check the declared version against the recognized layouts
//! 2. Rebuild the digest under the engine's signing domain
//! 3. Recover the signer and compare with the declared issuer
//! 4. Look the schema up in the registry
//! 5. Check issue and expiration times against the engine clock

pub mod config;
pub mod eip712;
pub mod package;
pub mod signer;
pub mod types;
pub mod verifier;

pub use config::VerifierConfig;
pub use eip712::{Eip712Domain, DOMAIN_NAME};
pub use package::OffchainPackage;
pub use signer::{recover_signer, OffchainSigner, RecoveryError, SignerError};
pub use types::{EcdsaSignature, OffchainAttestationMessage, OffchainAttestationVersion, SignedOffchainAttestation};
pub use verifier::{OffchainAttestationVerifier, VerificationFailure, VerifierError};
