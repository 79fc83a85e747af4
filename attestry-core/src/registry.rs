//! Schema registry: content-addressed claim templates.

use crate::crypto::schema_uid;
use crate::resolver::Resolver;
use crate::types::{short_uid, SchemaRecord, Uid};
use ethers_core::types::Address;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Read-only view of registered schemas consumed by the engine and verifier.
pub trait SchemaRegistry: Send + Sync {
    /// Look up a schema record, `None` if unregistered.
    fn get_schema(&self, uid: &Uid) -> Option<SchemaRecord>;

    /// The resolver hook bound to a schema, if any.
    fn resolver(&self, uid: &Uid) -> Option<Arc<dyn Resolver>>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The identical (schema, resolver, revocable) tuple is already registered.
    #[error("schema {0:?} already registered")]
    AlreadyExists(Uid),

    /// A resolver hook must report a non-zero address, which the record and uid bind.
    #[error("resolver hook has the zero address")]
    InvalidResolver,
}

struct Entry {
    record: SchemaRecord,
    resolver: Option<Arc<dyn Resolver>>,
}

/// In-memory schema registry.
///
/// Records are immutable once registered and are never removed.
#[derive(Default)]
pub struct InMemorySchemaRegistry {
    schemas: RwLock<HashMap<Uid, Entry>>,
}

impl InMemorySchemaRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema and bind its resolver hook.
    ///
    /// The uid is a pure function of the three attributes, so registering the
    /// same tuple twice fails with the uid of the existing record.
    pub fn register(
        &self,
        schema: &str,
        resolver: Option<Arc<dyn Resolver>>,
        revocable: bool,
    ) -> Result<Uid, RegistryError> {
        let resolver_address = match &resolver {
            Some(hook) if hook.address().is_zero() => return Err(RegistryError::InvalidResolver),
            Some(hook) => hook.address(),
            None => Address::zero(),
        };
        let uid = schema_uid(schema, resolver_address, revocable);

        let mut schemas = self.schemas.write().unwrap_or_else(PoisonError::into_inner);
        if schemas.contains_key(&uid) {
            return Err(RegistryError::AlreadyExists(uid));
        }

        schemas.insert(
            uid,
            Entry {
                record: SchemaRecord {
                    uid,
                    resolver: resolver_address,
                    revocable,
                    schema: schema.to_string(),
                },
                resolver,
            },
        );

        tracing::info!(uid = %short_uid(&uid), schema, revocable, "schema registered");
        Ok(uid)
    }

    /// Number of registered schemas.
    pub fn len(&self) -> usize {
        self.schemas.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SchemaRegistry for InMemorySchemaRegistry {
    fn get_schema(&self, uid: &Uid) -> Option<SchemaRecord> {
        self.schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uid)
            .map(|e| e.record.clone())
    }

    fn resolver(&self, uid: &Uid) -> Option<Arc<dyn Resolver>> {
        self.schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uid)
            .and_then(|e| e.resolver.clone())
    }
}

impl fmt::Debug for InMemorySchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemorySchemaRegistry")
            .field("schemas", &self.len())
            .finish()
    }
}
