//! Explicit commit/rollback context for one engine unit of work.
//!
//! Every attestation created or revoked by a call is staged here first. The
//! committed store is only touched by [`Transaction::commit`]; dropping the
//! transaction discards the whole unit, including resolver events.
//!
//! Units are serialized by a [`UnitLock`]. Committed state is read one lookup
//! at a time, so no state guard is held while a resolver runs and a hook that
//! reads the engine sees committed state without blocking.

use crate::ledger::{LedgerError, LedgerEvent};
use crate::resolver::AttestationView;
use crate::types::{Attestation, Uid};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, ThreadId};

/// Committed ledger contents.
#[derive(Debug, Default)]
pub(crate) struct LedgerState {
    pub attestations: HashMap<Uid, Attestation>,
    pub events: Vec<LedgerEvent>,
}

/// Read access to the committed store, one short-lived guard per lookup.
#[derive(Clone, Copy)]
pub(crate) struct Committed<'a>(pub &'a RwLock<LedgerState>);

impl Committed<'_> {
    pub fn get(&self, uid: &Uid) -> Option<Attestation> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .attestations
            .get(uid)
            .cloned()
    }

    pub fn contains(&self, uid: &Uid) -> bool {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .attestations
            .contains_key(uid)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Transaction {
    staged: HashMap<Uid, Attestation>,
    events: Vec<LedgerEvent>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read through staged writes to the committed store.
    pub fn get(&self, committed: Committed<'_>, uid: &Uid) -> Option<Attestation> {
        match self.staged.get(uid) {
            Some(staged) => Some(staged.clone()),
            None => committed.get(uid),
        }
    }

    pub fn contains(&self, committed: Committed<'_>, uid: &Uid) -> bool {
        self.staged.contains_key(uid) || committed.contains(uid)
    }

    /// Stage a new or updated attestation, replacing any earlier stage of the same uid.
    pub fn stage(&mut self, attestation: Attestation) {
        self.staged.insert(attestation.uid, attestation);
    }

    pub fn emit(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }

    pub fn extend_events(&mut self, events: impl IntoIterator<Item = LedgerEvent>) {
        self.events.extend(events);
    }

    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Apply every staged write and publish the pending events in order.
    pub fn commit(self, state: &mut LedgerState) {
        state.attestations.extend(self.staged);
        state.events.extend(self.events);
    }
}

/// Staged-then-committed view handed to resolver hooks.
pub(crate) struct StagedView<'a> {
    pub committed: Committed<'a>,
    pub tx: &'a Transaction,
}

impl AttestationView for StagedView<'_> {
    fn attestation(&self, uid: &Uid) -> Option<Attestation> {
        self.tx.get(self.committed, uid)
    }
}

/// Admits one unit of work at a time and remembers the thread running it.
#[derive(Debug, Default)]
pub(crate) struct UnitLock {
    unit: Mutex<()>,
    owner: Mutex<Option<ThreadId>>,
}

pub(crate) struct UnitGuard<'a> {
    lock: &'a UnitLock,
    _unit: MutexGuard<'a, ()>,
}

impl UnitLock {
    /// Wait for the running unit to finish, or fail with
    /// [`LedgerError::Reentrancy`] if the caller is already inside one.
    pub fn enter(&self) -> Result<UnitGuard<'_>, LedgerError> {
        let me = thread::current().id();
        if *self.owner.lock().unwrap_or_else(PoisonError::into_inner) == Some(me) {
            return Err(LedgerError::Reentrancy);
        }

        let unit = self.unit.lock().unwrap_or_else(PoisonError::into_inner);
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner) = Some(me);
        Ok(UnitGuard { lock: self, _unit: unit })
    }
}

impl Drop for UnitGuard<'_> {
    fn drop(&mut self) {
        *self.lock.owner.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EMPTY_UID;
    use ethers_core::types::{Address, H256};
    use std::sync::Arc;

    fn attestation(byte: u8, revocation_time: u64) -> Attestation {
        Attestation {
            uid: H256::repeat_byte(byte),
            schema: H256::repeat_byte(0xee),
            time: 1,
            expiration_time: 0,
            revocation_time,
            ref_uid: EMPTY_UID,
            recipient: Address::zero(),
            attester: Address::repeat_byte(1),
            revocable: true,
            data: vec![],
        }
    }

    #[test]
    fn test_staged_shadows_committed() {
        let state = RwLock::new(LedgerState::default());
        state
            .write()
            .unwrap()
            .attestations
            .insert(H256::repeat_byte(1), attestation(1, 0));

        let mut tx = Transaction::new();
        tx.stage(attestation(1, 99));

        let committed = Committed(&state);
        assert_eq!(tx.get(committed, &H256::repeat_byte(1)).unwrap().revocation_time, 99);
        assert_eq!(committed.get(&H256::repeat_byte(1)).unwrap().revocation_time, 0);
    }

    #[test]
    fn test_drop_discards() {
        let state = RwLock::new(LedgerState::default());
        {
            let mut tx = Transaction::new();
            tx.stage(attestation(2, 0));
            assert!(tx.contains(Committed(&state), &H256::repeat_byte(2)));
        }
        assert!(state.read().unwrap().attestations.is_empty());
    }

    #[test]
    fn test_commit_applies_writes_and_events() {
        let mut state = LedgerState::default();
        let mut tx = Transaction::new();
        tx.stage(attestation(3, 0));
        tx.emit(LedgerEvent::Attested {
            recipient: Address::zero(),
            attester: Address::repeat_byte(1),
            uid: H256::repeat_byte(3),
            schema: H256::repeat_byte(0xee),
        });
        assert_eq!(tx.staged_len(), 1);

        tx.commit(&mut state);

        assert!(state.attestations.contains_key(&H256::repeat_byte(3)));
        assert_eq!(state.events.len(), 1);
    }

    #[test]
    fn test_staged_view() {
        let state = RwLock::new(LedgerState::default());
        let mut tx = Transaction::new();
        tx.stage(attestation(4, 0));

        let view = StagedView {
            committed: Committed(&state),
            tx: &tx,
        };
        assert!(view.attestation(&H256::repeat_byte(4)).is_some());
        assert!(view.attestation(&H256::repeat_byte(5)).is_none());
    }

    #[test]
    fn test_unit_lock_rejects_same_thread() {
        let lock = UnitLock::default();
        let guard = lock.enter().unwrap();
        assert!(matches!(lock.enter(), Err(LedgerError::Reentrancy)));

        drop(guard);
        assert!(lock.enter().is_ok());
    }

    #[test]
    fn test_unit_lock_waits_for_other_threads() {
        let lock = Arc::new(UnitLock::default());
        let guard = lock.enter().unwrap();

        let other = {
            let lock = lock.clone();
            std::thread::spawn(move || lock.enter().is_ok())
        };
        drop(guard);
        assert!(other.join().unwrap());
    }
}
