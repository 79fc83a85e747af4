//! Batching attestation client for `uint256 value` schemas.
//!
//! Encodes values into attestation payloads and forwards single or batched
//! requests to the engine under a fixed issuer identity. Batches are handed to
//! the engine as one unit of work, so they either fully apply or leave no
//! trace.

use crate::codec::encode_uint;
use crate::ledger::{AttestationEngine, LedgerError};
use crate::types::*;
use ethers_core::types::{Address, U256};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttesterError {
    #[error("invalid attestation engine")]
    InvalidEngine,

    #[error("{schemas} schemas but {inputs} input lists")]
    InvalidLength { schemas: usize, inputs: usize },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub type Result<T> = std::result::Result<T, AttesterError>;

/// Issues and revokes attestations as a single issuer.
pub struct Attester<E: AttestationEngine + ?Sized> {
    engine: Arc<E>,
    identity: Address,
}

impl<E: AttestationEngine + ?Sized> Attester<E> {
    /// Bind an attester to an engine. `identity` is recorded as the issuer of
    /// every attestation and is the only party the engine lets revoke them.
    ///
    /// # Errors
    /// [`AttesterError::InvalidEngine`] if the engine has the zero address.
    pub fn new(engine: Arc<E>, identity: Address) -> Result<Self> {
        if engine.address().is_zero() {
            return Err(AttesterError::InvalidEngine);
        }
        Ok(Self { engine, identity })
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn identity(&self) -> Address {
        self.identity
    }

    /// Attest to `value` under `schema`, returning the engine-assigned uid.
    pub fn attest(&self, schema: Uid, value: U256) -> Result<Uid> {
        let request = AttestationRequest {
            schema,
            data: AttestationRequestData::with_data(encode_uint(value)),
        };
        let uid = self.engine.attest(self.identity, request)?;
        tracing::debug!(uid = %short_uid(&uid), %value, "attested");
        Ok(uid)
    }

    /// Attest to every value of every schema as one atomic batch.
    ///
    /// `values[i]` holds the values for `schemas[i]`; the result is grouped the
    /// same way and preserves order.
    pub fn multi_attest(&self, schemas: &[Uid], values: &[Vec<U256>]) -> Result<Vec<Vec<Uid>>> {
        check_lengths(schemas.len(), values.len())?;

        let requests: Vec<MultiAttestationRequest> = schemas
            .iter()
            .zip(values)
            .map(|(schema, values)| MultiAttestationRequest {
                schema: *schema,
                data: values
                    .iter()
                    .map(|value| AttestationRequestData::with_data(encode_uint(*value)))
                    .collect(),
            })
            .collect();

        let mut uids = self.engine.multi_attest(self.identity, &requests)?.into_iter();
        let grouped: Vec<Vec<Uid>> = values
            .iter()
            .map(|values| uids.by_ref().take(values.len()).collect::<Vec<_>>())
            .collect();

        Ok(grouped)
    }

    /// Revoke one attestation previously issued by this attester.
    pub fn revoke(&self, schema: Uid, uid: Uid) -> Result<()> {
        self.engine.revoke(self.identity, RevocationRequest { schema, uid })?;
        tracing::debug!(uid = %short_uid(&uid), "revoked");
        Ok(())
    }

    /// Revoke every uid of every schema as one atomic batch.
    pub fn multi_revoke(&self, schemas: &[Uid], uids: &[Vec<Uid>]) -> Result<()> {
        check_lengths(schemas.len(), uids.len())?;

        let requests: Vec<MultiRevocationRequest> = schemas
            .iter()
            .zip(uids)
            .map(|(schema, uids)| MultiRevocationRequest {
                schema: *schema,
                uids: uids.clone(),
            })
            .collect();

        self.engine.multi_revoke(self.identity, &requests)?;
        Ok(())
    }
}

fn check_lengths(schemas: usize, inputs: usize) -> Result<()> {
    if schemas == 0 || schemas != inputs {
        return Err(AttesterError::InvalidLength { schemas, inputs });
    }
    Ok(())
}

impl<E: AttestationEngine + ?Sized> fmt::Debug for Attester<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attester")
            .field("engine", &self.engine.address())
            .field("identity", &self.identity)
            .finish()
    }
}
