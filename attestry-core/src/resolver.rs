//! Resolver hooks: pluggable acceptance gates bound to a schema.
//!
//! The engine invokes a schema's resolver synchronously on every attest and
//! revoke, after the attestation has been staged and before the unit of work
//! commits. A hook answers accept/reject and may emit observability events;
//! it never writes attestation or schema state. Events emitted by a hook are
//! part of the same unit of work and disappear if that unit is rolled back.

use crate::codec::{decode_uint, CodecError};
use crate::types::{Attestation, Uid};
use ethers_core::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which engine operation triggered a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookPhase {
    Attest,
    Revoke,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPhase::Attest => write!(f, "attest"),
            HookPhase::Revoke => write!(f, "revoke"),
        }
    }
}

/// An observability record emitted by a resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolverEvent {
    /// A decoded payload value seen by the resolver at `resolver`.
    Log {
        resolver: Address,
        phase: HookPhase,
        uid: Uid,
        value: U256,
    },
}

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("payload decoding failed: {0}")]
    Codec(#[from] CodecError),

    #[error("resolver failure: {0}")]
    Internal(String),
}

/// Read access to attestations as the current unit of work sees them.
///
/// Includes attestations staged earlier in the same batch, so a hook observes
/// already-applied state rather than a half-applied one.
pub trait AttestationView {
    fn attestation(&self, uid: &Uid) -> Option<Attestation>;
}

/// Context handed to a resolver for one invocation.
pub struct HookContext<'a> {
    now: u64,
    view: &'a dyn AttestationView,
    events: &'a mut Vec<ResolverEvent>,
}

impl<'a> HookContext<'a> {
    pub fn new(now: u64, view: &'a dyn AttestationView, events: &'a mut Vec<ResolverEvent>) -> Self {
        Self { now, view, events }
    }

    /// Evaluation time of the enclosing unit of work.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Look up an attestation through the staged view.
    pub fn attestation(&self, uid: &Uid) -> Option<Attestation> {
        self.view.attestation(uid)
    }

    /// Record an event; it is published only if the unit of work commits.
    pub fn emit(&mut self, event: ResolverEvent) {
        self.events.push(event);
    }
}

/// A pluggable hook bound to a schema at registration time.
///
/// Returning `Ok(false)` or an error aborts the triggering operation and any
/// batch enclosing it.
pub trait Resolver: Send + Sync {
    /// Identity recorded in the schema record.
    fn address(&self) -> Address;

    fn on_attest(&self, attestation: &Attestation, ctx: &mut HookContext<'_>) -> Result<bool, ResolverError>;

    fn on_revoke(&self, attestation: &Attestation, ctx: &mut HookContext<'_>) -> Result<bool, ResolverError>;
}

/// Accepts everything and republishes the decoded `uint256` payload as a log.
#[derive(Debug, Clone)]
pub struct LogResolver {
    address: Address,
}

impl LogResolver {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    fn log(&self, phase: HookPhase, attestation: &Attestation, ctx: &mut HookContext<'_>) -> Result<bool, ResolverError> {
        let value = decode_uint(&attestation.data)?;
        ctx.emit(ResolverEvent::Log {
            resolver: self.address,
            phase,
            uid: attestation.uid,
            value,
        });
        Ok(true)
    }
}

impl Resolver for LogResolver {
    fn address(&self) -> Address {
        self.address
    }

    fn on_attest(&self, attestation: &Attestation, ctx: &mut HookContext<'_>) -> Result<bool, ResolverError> {
        self.log(HookPhase::Attest, attestation, ctx)
    }

    fn on_revoke(&self, attestation: &Attestation, ctx: &mut HookContext<'_>) -> Result<bool, ResolverError> {
        self.log(HookPhase::Revoke, attestation, ctx)
    }
}

/// Logs like [`LogResolver`] but only accepts values the predicate admits.
///
/// The log is emitted before the decision so that a rejected batch can be
/// shown to discard hook side effects too.
pub struct PredicateResolver<F> {
    address: Address,
    predicate: F,
}

impl<F> PredicateResolver<F>
where
    F: Fn(HookPhase, &Attestation, U256) -> bool + Send + Sync,
{
    pub fn new(address: Address, predicate: F) -> Self {
        Self { address, predicate }
    }

    fn decide(&self, phase: HookPhase, attestation: &Attestation, ctx: &mut HookContext<'_>) -> Result<bool, ResolverError> {
        let value = decode_uint(&attestation.data)?;
        ctx.emit(ResolverEvent::Log {
            resolver: self.address,
            phase,
            uid: attestation.uid,
            value,
        });

        let accepted = (self.predicate)(phase, attestation, value);
        if !accepted {
            tracing::debug!(
                resolver = ?self.address,
                %phase,
                %value,
                "resolver rejected attestation"
            );
        }
        Ok(accepted)
    }
}

impl<F> Resolver for PredicateResolver<F>
where
    F: Fn(HookPhase, &Attestation, U256) -> bool + Send + Sync,
{
    fn address(&self) -> Address {
        self.address
    }

    fn on_attest(&self, attestation: &Attestation, ctx: &mut HookContext<'_>) -> Result<bool, ResolverError> {
        self.decide(HookPhase::Attest, attestation, ctx)
    }

    fn on_revoke(&self, attestation: &Attestation, ctx: &mut HookContext<'_>) -> Result<bool, ResolverError> {
        self.decide(HookPhase::Revoke, attestation, ctx)
    }
}

impl<F> fmt::Debug for PredicateResolver<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateResolver")
            .field("address", &self.address)
            .finish()
    }
}
