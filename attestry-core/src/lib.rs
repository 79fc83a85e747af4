//! # Attestry Core
//!
//! Schema registry, attestation engine, resolver hooks and the batching
//! attester client.
//!
//! ## Key Features
//! - **Content-addressed schemas**: ids are a pure function of (template, resolver, revocable)
//! - **Atomic batches**: every engine call stages into one transaction and commits all-or-nothing
//! - **Resolver hooks**: per-schema acceptance gates that run inside the unit of work they guard
//! - **Canonical CBOR**: deterministic bytes for records shipped between parties

pub mod attester;
pub mod clock;
pub mod codec;
pub mod crypto;
pub mod ledger;
pub mod registry;
pub mod resolver;
pub mod serialization;
pub mod types;

mod transaction;

pub use attester::{Attester, AttesterError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{decode_uint, encode_uint, CodecError};
pub use ledger::{AttestationEngine, InMemoryLedger, LedgerConfig, LedgerError, LedgerEvent};
pub use registry::{InMemorySchemaRegistry, RegistryError, SchemaRegistry};
pub use resolver::{
    AttestationView, HookContext, HookPhase, LogResolver, PredicateResolver, Resolver, ResolverError, ResolverEvent,
};
pub use types::*;

/// Re-export for convenience
pub use ethers_core::types::{Address, H256, U256};
