//! Attestation engine: the source of truth for issued claims.
//!
//! ## Unit of work
//! Every call (single or batch) runs against a fresh [`Transaction`]. For each
//! element, in caller order:
//! 1. validate against staged + committed state
//! 2. stage the new attestation (or the revocation stamp)
//! 3. invoke the schema's resolver against the staged value
//!
//! Any failure drops the transaction, so nothing from the call is observable
//! afterwards. Only a fully successful call commits, and only the commit takes
//! the state write lock.
//!
//! A resolver may read the engine while its hook runs and sees committed
//! state. Starting another unit of work from inside a hook fails with
//! [`LedgerError::Reentrancy`].

use crate::clock::Clock;
use crate::crypto::{attestation_uid, AttestationUidInput};
use crate::registry::SchemaRegistry;
use crate::resolver::{HookContext, HookPhase, Resolver, ResolverError, ResolverEvent};
use crate::transaction::{Committed, LedgerState, StagedView, Transaction, UnitLock};
use crate::types::*;
use ethers_core::types::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use thiserror::Error;

/// The engine interface consumed by the attester and the offchain verifier.
pub trait AttestationEngine: Send + Sync {
    /// Identity of this engine; also the verifying contract of offchain claims.
    fn address(&self) -> Address;

    /// Network identifier bound into offchain signatures.
    fn chain_id(&self) -> u64;

    /// Protocol version string bound into offchain signatures.
    fn version(&self) -> &str;

    /// Current evaluation time (unix seconds).
    fn now(&self) -> u64;

    fn schema_registry(&self) -> &dyn SchemaRegistry;

    fn get_attestation(&self, uid: &Uid) -> Option<Attestation>;

    /// Whether an attestation with this uid has been issued.
    fn is_attestation_valid(&self, uid: &Uid) -> bool {
        self.get_attestation(uid).is_some()
    }

    /// Issue one attestation on behalf of `attester`.
    fn attest(&self, attester: Address, request: AttestationRequest) -> Result<Uid, LedgerError> {
        let batch = [MultiAttestationRequest {
            schema: request.schema,
            data: vec![request.data],
        }];
        let mut uids = self.multi_attest(attester, &batch)?;
        uids.pop().ok_or(LedgerError::InvalidLength)
    }

    /// Issue many attestations atomically; uids are returned in input order.
    fn multi_attest(&self, attester: Address, requests: &[MultiAttestationRequest]) -> Result<Vec<Uid>, LedgerError>;

    /// Revoke one attestation on behalf of `revoker`.
    fn revoke(&self, revoker: Address, request: RevocationRequest) -> Result<(), LedgerError> {
        let batch = [MultiRevocationRequest {
            schema: request.schema,
            uids: vec![request.uid],
        }];
        self.multi_revoke(revoker, &batch)
    }

    /// Revoke many attestations atomically.
    fn multi_revoke(&self, revoker: Address, requests: &[MultiRevocationRequest]) -> Result<(), LedgerError>;
}

/// Errors that abort an engine unit of work.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("schema {0:?} is not registered")]
    InvalidSchema(Uid),

    #[error("attestation {uid:?} belongs to schema {actual:?}, not {expected:?}")]
    SchemaMismatch { uid: Uid, expected: Uid, actual: Uid },

    #[error("expiration time {0} is in the past")]
    InvalidExpirationTime(u64),

    #[error("{0:?} is not revocable")]
    Irrevocable(Uid),

    #[error("attestation {0:?} not found")]
    NotFound(Uid),

    #[error("{revoker:?} is not the attester of {uid:?}")]
    AccessDenied { uid: Uid, revoker: Address },

    #[error("attestation {0:?} is already revoked")]
    AlreadyRevoked(Uid),

    #[error("resolver rejected attestation {0:?}")]
    InvalidAttestation(Uid),

    #[error("resolver rejected revocation of {0:?}")]
    InvalidRevocation(Uid),

    #[error("resolver failed on {uid:?}: {source}")]
    Resolver {
        uid: Uid,
        #[source]
        source: ResolverError,
    },

    #[error("empty request list")]
    InvalidLength,

    #[error("no free uid for attestation")]
    UidExhausted,

    #[error("engine called from inside its own unit of work")]
    Reentrancy,
}

/// Events published by committed units of work, in commit order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    Attested {
        recipient: Address,
        attester: Address,
        uid: Uid,
        schema: Uid,
    },
    Revoked {
        recipient: Address,
        attester: Address,
        uid: Uid,
        schema: Uid,
    },
    Resolver(ResolverEvent),
}

/// Identity of an in-memory ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub address: Address,
    pub chain_id: u64,
    pub version: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            address: Address::from_low_u64_be(0xea5),
            chain_id: 31337,
            version: "1.3.0".to_string(),
        }
    }
}

/// In-memory attestation engine.
///
/// Units of work run one at a time. While a unit stages and runs hooks the
/// committed state stays readable; it is replaced only at commit.
pub struct InMemoryLedger {
    config: LedgerConfig,
    registry: Arc<dyn SchemaRegistry>,
    clock: Arc<dyn Clock>,
    unit: UnitLock,
    state: RwLock<LedgerState>,
}

impl InMemoryLedger {
    pub fn new(config: LedgerConfig, registry: Arc<dyn SchemaRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            registry,
            clock,
            unit: UnitLock::default(),
            state: RwLock::new(LedgerState::default()),
        }
    }

    /// Snapshot of every committed event.
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).events.clone()
    }

    /// Number of committed attestations.
    pub fn attestation_count(&self) -> usize {
        self.state.read().unwrap_or_else(PoisonError::into_inner).attestations.len()
    }

    // The guard is only held while a finished transaction is applied, and
    // applying never calls out, so a poisoned guard still protects whole state.
    fn write_state(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    #[allow(clippy::too_many_arguments)]
    fn stage_attestation(
        &self,
        committed: Committed<'_>,
        tx: &mut Transaction,
        now: u64,
        attester: Address,
        schema: &SchemaRecord,
        resolver: Option<&dyn Resolver>,
        request: &AttestationRequestData,
    ) -> Result<Uid, LedgerError> {
        if request.expiration_time != NO_EXPIRATION && request.expiration_time <= now {
            return Err(LedgerError::InvalidExpirationTime(request.expiration_time));
        }

        if !schema.revocable && request.revocable {
            return Err(LedgerError::Irrevocable(schema.uid));
        }

        if request.ref_uid != EMPTY_UID && !tx.contains(committed, &request.ref_uid) {
            return Err(LedgerError::NotFound(request.ref_uid));
        }

        let input = AttestationUidInput {
            schema: schema.uid,
            recipient: request.recipient,
            attester,
            time: now,
            expiration_time: request.expiration_time,
            revocable: request.revocable,
            ref_uid: request.ref_uid,
            data: &request.data,
        };
        let uid = (0..=u32::MAX)
            .map(|bump| attestation_uid(&input, bump))
            .find(|uid| !tx.contains(committed, uid))
            .ok_or(LedgerError::UidExhausted)?;

        let attestation = Attestation {
            uid,
            schema: schema.uid,
            time: now,
            expiration_time: request.expiration_time,
            revocation_time: 0,
            ref_uid: request.ref_uid,
            recipient: request.recipient,
            attester,
            revocable: request.revocable,
            data: request.data.clone(),
        };

        tx.stage(attestation.clone());
        tx.emit(LedgerEvent::Attested {
            recipient: attestation.recipient,
            attester,
            uid,
            schema: schema.uid,
        });

        if let Some(resolver) = resolver {
            if !run_hook(committed, tx, now, resolver, HookPhase::Attest, &attestation)? {
                return Err(LedgerError::InvalidAttestation(uid));
            }
        }

        tracing::debug!(uid = %short_uid(&uid), schema = %short_uid(&schema.uid), "attestation staged");
        Ok(uid)
    }

    #[allow(clippy::too_many_arguments)]
    fn stage_revocation(
        &self,
        committed: Committed<'_>,
        tx: &mut Transaction,
        now: u64,
        revoker: Address,
        schema: &SchemaRecord,
        resolver: Option<&dyn Resolver>,
        uid: Uid,
    ) -> Result<(), LedgerError> {
        let mut attestation = tx.get(committed, &uid).ok_or(LedgerError::NotFound(uid))?;

        if attestation.schema != schema.uid {
            return Err(LedgerError::SchemaMismatch {
                uid,
                expected: schema.uid,
                actual: attestation.schema,
            });
        }

        if attestation.attester != revoker {
            return Err(LedgerError::AccessDenied { uid, revoker });
        }

        if !attestation.revocable {
            return Err(LedgerError::Irrevocable(uid));
        }

        if attestation.is_revoked() {
            return Err(LedgerError::AlreadyRevoked(uid));
        }

        attestation.revocation_time = now;
        tx.stage(attestation.clone());
        tx.emit(LedgerEvent::Revoked {
            recipient: attestation.recipient,
            attester: attestation.attester,
            uid,
            schema: schema.uid,
        });

        if let Some(resolver) = resolver {
            if !run_hook(committed, tx, now, resolver, HookPhase::Revoke, &attestation)? {
                return Err(LedgerError::InvalidRevocation(uid));
            }
        }

        tracing::debug!(uid = %short_uid(&uid), "revocation staged");
        Ok(())
    }

    fn lookup_schema(&self, uid: &Uid) -> Result<(SchemaRecord, Option<Arc<dyn Resolver>>), LedgerError> {
        let record = self
            .registry
            .get_schema(uid)
            .ok_or(LedgerError::InvalidSchema(*uid))?;
        // Whatever hook is bound runs, whatever address it reports.
        Ok((record, self.registry.resolver(uid)))
    }
}

/// Invoke a resolver against a staged attestation and stage its events.
fn run_hook(
    committed: Committed<'_>,
    tx: &mut Transaction,
    now: u64,
    resolver: &dyn Resolver,
    phase: HookPhase,
    attestation: &Attestation,
) -> Result<bool, LedgerError> {
    let mut emitted = Vec::new();
    let outcome = {
        let view = StagedView { committed, tx: &*tx };
        let mut ctx = HookContext::new(now, &view, &mut emitted);
        match phase {
            HookPhase::Attest => resolver.on_attest(attestation, &mut ctx),
            HookPhase::Revoke => resolver.on_revoke(attestation, &mut ctx),
        }
    };

    let accepted = outcome.map_err(|source| LedgerError::Resolver {
        uid: attestation.uid,
        source,
    })?;
    tx.extend_events(emitted.into_iter().map(LedgerEvent::Resolver));
    Ok(accepted)
}

impl AttestationEngine for InMemoryLedger {
    fn address(&self) -> Address {
        self.config.address
    }

    fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    fn version(&self) -> &str {
        &self.config.version
    }

    fn now(&self) -> u64 {
        self.clock.now()
    }

    fn schema_registry(&self) -> &dyn SchemaRegistry {
        self.registry.as_ref()
    }

    fn get_attestation(&self, uid: &Uid) -> Option<Attestation> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .attestations
            .get(uid)
            .cloned()
    }

    fn multi_attest(&self, attester: Address, requests: &[MultiAttestationRequest]) -> Result<Vec<Uid>, LedgerError> {
        let _unit = self.unit.enter()?;
        let committed = Committed(&self.state);
        let now = self.clock.now();
        let mut tx = Transaction::new();
        let mut uids = Vec::new();

        for request in requests {
            if request.data.is_empty() {
                return Err(LedgerError::InvalidLength);
            }

            let (schema, resolver) = self.lookup_schema(&request.schema)?;
            for data in &request.data {
                match self.stage_attestation(committed, &mut tx, now, attester, &schema, resolver.as_deref(), data) {
                    Ok(uid) => uids.push(uid),
                    Err(e) => {
                        tracing::warn!(error = %e, staged = tx.staged_len(), "attest batch rolled back");
                        return Err(e);
                    }
                }
            }
        }

        tx.commit(&mut self.write_state());
        tracing::info!(attester = ?attester, count = uids.len(), "attestations committed");
        Ok(uids)
    }

    fn multi_revoke(&self, revoker: Address, requests: &[MultiRevocationRequest]) -> Result<(), LedgerError> {
        let _unit = self.unit.enter()?;
        let committed = Committed(&self.state);
        let now = self.clock.now();
        let mut tx = Transaction::new();
        let mut count = 0usize;

        for request in requests {
            if request.uids.is_empty() {
                return Err(LedgerError::InvalidLength);
            }

            let (schema, resolver) = self.lookup_schema(&request.schema)?;
            for uid in &request.uids {
                if let Err(e) = self.stage_revocation(committed, &mut tx, now, revoker, &schema, resolver.as_deref(), *uid) {
                    tracing::warn!(error = %e, staged = tx.staged_len(), "revoke batch rolled back");
                    return Err(e);
                }
                count += 1;
            }
        }

        tx.commit(&mut self.write_state());
        tracing::info!(revoker = ?revoker, count, "revocations committed");
        Ok(())
    }
}

impl fmt::Debug for InMemoryLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryLedger")
            .field("config", &self.config)
            .field("attestations", &self.attestation_count())
            .finish()
    }
}
