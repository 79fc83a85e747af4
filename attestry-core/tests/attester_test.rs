//! Attester scenarios against the in-memory engine: hook observation order,
//! batch atomicity and revocation guards.

use attestry_core::crypto::schema_uid;
use attestry_core::*;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::{mpsc, Arc, Mutex, OnceLock, Weak};
use std::thread;
use std::time::Duration;

const T0: u64 = 1_700_000_000;

struct Env {
    registry: Arc<InMemorySchemaRegistry>,
    clock: Arc<ManualClock>,
    ledger: Arc<InMemoryLedger>,
    attester: Attester<InMemoryLedger>,
}

fn env() -> Env {
    let registry = Arc::new(InMemorySchemaRegistry::new());
    let clock = Arc::new(ManualClock::new(T0));
    let ledger = Arc::new(InMemoryLedger::new(
        LedgerConfig::default(),
        registry.clone(),
        clock.clone(),
    ));
    let attester = Attester::new(ledger.clone(), Address::repeat_byte(0x42)).unwrap();
    Env {
        registry,
        clock,
        ledger,
        attester,
    }
}

fn log_resolver(byte: u8) -> Arc<dyn Resolver> {
    Arc::new(LogResolver::new(Address::repeat_byte(byte)))
}

/// Rejects any value above `limit`.
fn capped_resolver(byte: u8, limit: u64) -> Arc<dyn Resolver> {
    Arc::new(PredicateResolver::new(
        Address::repeat_byte(byte),
        move |_: HookPhase, _: &Attestation, value: U256| value <= U256::from(limit),
    ))
}

fn logged(ledger: &InMemoryLedger) -> Vec<(HookPhase, Uid, U256)> {
    ledger
        .events()
        .into_iter()
        .filter_map(|event| match event {
            LedgerEvent::Resolver(ResolverEvent::Log { phase, uid, value, .. }) => Some((phase, uid, value)),
            _ => None,
        })
        .collect()
}

fn values(raw: &[u64]) -> Vec<U256> {
    raw.iter().map(|v| U256::from(*v)).collect()
}

#[test]
fn single_attest_is_observed_once() {
    let env = env();
    let schema = env.registry.register("uint256 value", Some(log_resolver(0xaa)), true).unwrap();

    let uid = env.attester.attest(schema, U256::from(123456u64)).unwrap();

    assert_eq!(logged(&env.ledger), vec![(HookPhase::Attest, uid, U256::from(123456u64))]);
}

#[test]
fn batch_hooks_run_in_caller_order() {
    let env = env();
    let a = env.registry.register("uint256 value", Some(log_resolver(0xaa)), true).unwrap();
    let b = env.registry.register("uint256 value", Some(log_resolver(0xbb)), true).unwrap();

    let uids = env
        .attester
        .multi_attest(&[a, b], &[values(&[10, 100, 123456]), values(&[5, 23423234])])
        .unwrap();

    let seen: Vec<(Uid, U256)> = logged(&env.ledger).into_iter().map(|(_, uid, value)| (uid, value)).collect();
    let expected: Vec<(Uid, U256)> = vec![
        (uids[0][0], U256::from(10u64)),
        (uids[0][1], U256::from(100u64)),
        (uids[0][2], U256::from(123456u64)),
        (uids[1][0], U256::from(5u64)),
        (uids[1][1], U256::from(23423234u64)),
    ];
    assert_eq!(seen, expected);

    for uid in &uids[0] {
        assert_eq!(env.ledger.get_attestation(uid).unwrap().schema, a);
    }
    for uid in &uids[1] {
        assert_eq!(env.ledger.get_attestation(uid).unwrap().schema, b);
    }
}

#[test]
fn rejected_element_discards_whole_batch() {
    let env = env();
    let a = env.registry.register("uint256 value", Some(log_resolver(0xaa)), true).unwrap();
    let b = env.registry.register("uint256 value", Some(capped_resolver(0xbb, 1000)), true).unwrap();

    let result = env
        .attester
        .multi_attest(&[a, b], &[values(&[1, 2, 3]), values(&[5, 5000])]);

    assert!(matches!(
        result,
        Err(AttesterError::Ledger(LedgerError::InvalidAttestation(_)))
    ));
    assert_eq!(env.ledger.attestation_count(), 0);
    assert!(env.ledger.events().is_empty(), "hook side effects must be discarded too");
}

#[test]
fn unknown_schema_discards_whole_batch() {
    let env = env();
    let a = env.registry.register("uint256 value", Some(log_resolver(0xaa)), true).unwrap();

    let result = env
        .attester
        .multi_attest(&[a, H256::repeat_byte(0x77)], &[values(&[1]), values(&[2])]);

    assert!(matches!(result, Err(AttesterError::Ledger(LedgerError::InvalidSchema(_)))));
    assert_eq!(env.ledger.attestation_count(), 0);
}

#[test]
fn multi_revoke_is_atomic() {
    let env = env();
    let schema = env.registry.register("uint256 value", Some(log_resolver(0xaa)), true).unwrap();
    let uids = env.attester.multi_attest(&[schema], &[values(&[1, 2, 3])]).unwrap().remove(0);
    let events_before = env.ledger.events().len();

    env.clock.advance(60);
    let batch = vec![uids[0], uids[1], H256::repeat_byte(0x99)];
    assert!(matches!(
        env.attester.multi_revoke(&[schema], &[batch]),
        Err(AttesterError::Ledger(LedgerError::NotFound(_)))
    ));

    for uid in &uids {
        assert!(!env.ledger.get_attestation(uid).unwrap().is_revoked());
    }
    assert_eq!(env.ledger.events().len(), events_before);

    env.attester.multi_revoke(&[schema], &[uids.clone()]).unwrap();
    for uid in &uids {
        assert_eq!(env.ledger.get_attestation(uid).unwrap().revocation_time, T0 + 60);
    }

    let revokes: Vec<Uid> = logged(&env.ledger)
        .into_iter()
        .filter(|(phase, _, _)| *phase == HookPhase::Revoke)
        .map(|(_, uid, _)| uid)
        .collect();
    assert_eq!(revokes, uids);
}

#[test]
fn revocation_guards() {
    let env = env();
    let revocable = env.registry.register("uint256 value", None, true).unwrap();
    let other = env.registry.register("uint256 value", Some(log_resolver(0xcc)), true).unwrap();
    let irrevocable = env.registry.register("uint256 value", None, false).unwrap();

    let uid = env.attester.attest(revocable, U256::one()).unwrap();

    // schema/uid mismatch
    assert!(matches!(
        env.attester.revoke(other, uid),
        Err(AttesterError::Ledger(LedgerError::SchemaMismatch { .. }))
    ));

    // attester always requests revocable claims, which an irrevocable schema refuses
    assert!(matches!(
        env.attester.attest(irrevocable, U256::one()),
        Err(AttesterError::Ledger(LedgerError::Irrevocable(_)))
    ));

    env.attester.revoke(revocable, uid).unwrap();
    assert!(matches!(
        env.attester.revoke(revocable, uid),
        Err(AttesterError::Ledger(LedgerError::AlreadyRevoked(_)))
    ));
}

#[test]
fn irrevocable_attestation_cannot_be_revoked() {
    let env = env();
    let schema = env.registry.register("uint256 value", None, false).unwrap();
    let request = AttestationRequest {
        schema,
        data: AttestationRequestData {
            revocable: false,
            ..AttestationRequestData::with_data(encode_uint(U256::from(9u64)))
        },
    };
    let uid = env.ledger.attest(env.attester.identity(), request).unwrap();

    assert!(matches!(
        env.attester.revoke(schema, uid),
        Err(AttesterError::Ledger(LedgerError::Irrevocable(_)))
    ));
    assert_eq!(env.ledger.get_attestation(&uid).unwrap().revocation_time, 0);
}

#[test]
fn resolver_sees_batch_staged_state() {
    let env = env();
    // Accepts a value only if the previous attestation in the batch is already visible.
    let observer: Arc<dyn Resolver> = Arc::new(RefChecker);
    let schema = env.registry.register("uint256 value", Some(observer), true).unwrap();

    let uids = env.attester.multi_attest(&[schema], &[values(&[1, 2])]).unwrap();
    assert_eq!(uids[0].len(), 2);
}

struct RefChecker;

impl Resolver for RefChecker {
    fn address(&self) -> Address {
        Address::repeat_byte(0xdd)
    }

    fn on_attest(&self, attestation: &Attestation, ctx: &mut HookContext<'_>) -> Result<bool, ResolverError> {
        Ok(ctx.attestation(&attestation.uid).as_ref() == Some(attestation))
    }

    fn on_revoke(&self, attestation: &Attestation, ctx: &mut HookContext<'_>) -> Result<bool, ResolverError> {
        Ok(ctx.attestation(&attestation.uid).map(|a| a.is_revoked()).unwrap_or(false))
    }
}

#[test]
fn resolver_rejecting_one_revocation_discards_batch() {
    let env = env();
    let guarded: Arc<dyn Resolver> = Arc::new(PredicateResolver::new(
        Address::repeat_byte(0xab),
        |phase: HookPhase, _: &Attestation, value: U256| !(phase == HookPhase::Revoke && value == U256::from(2u64)),
    ));
    let schema = env.registry.register("uint256 value", Some(guarded), true).unwrap();
    let uids = env.attester.multi_attest(&[schema], &[values(&[1, 2, 3])]).unwrap().remove(0);
    let events_before = env.ledger.events();

    env.clock.advance(60);
    let result = env.attester.multi_revoke(&[schema], &[uids.clone()]);

    match result {
        Err(AttesterError::Ledger(LedgerError::InvalidRevocation(uid))) => assert_eq!(uid, uids[1]),
        other => panic!("expected InvalidRevocation, got {other:?}"),
    }
    for uid in &uids {
        assert_eq!(env.ledger.get_attestation(uid).unwrap().revocation_time, 0);
    }
    assert_eq!(env.ledger.events(), events_before);
}

#[test]
fn undecodable_payload_fails_the_hook_and_commits_nothing() {
    let env = env();
    let schema = env.registry.register("uint256 value", Some(log_resolver(0xaa)), true).unwrap();
    let batch = [MultiAttestationRequest {
        schema,
        data: vec![
            AttestationRequestData::with_data(encode_uint(U256::from(1u64))),
            AttestationRequestData::with_data(vec![1, 2, 3]),
        ],
    }];

    assert!(matches!(
        env.ledger.multi_attest(env.attester.identity(), &batch),
        Err(LedgerError::Resolver {
            source: ResolverError::Codec(_),
            ..
        })
    ));
    assert_eq!(env.ledger.attestation_count(), 0);
    assert!(env.ledger.events().is_empty());
}

/// Calls back into the engine from its attest hook, recording
/// (uid visible as committed, nested attest refused as reentrant).
#[derive(Default)]
struct CallsBack {
    ledger: OnceLock<Weak<InMemoryLedger>>,
    seen: Mutex<Vec<(bool, bool)>>,
}

impl Resolver for CallsBack {
    fn address(&self) -> Address {
        Address::repeat_byte(0xee)
    }

    fn on_attest(&self, attestation: &Attestation, _: &mut HookContext<'_>) -> Result<bool, ResolverError> {
        let ledger = self
            .ledger
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| ResolverError::Internal("engine dropped".to_string()))?;

        let committed = ledger.get_attestation(&attestation.uid).is_some();
        let nested = ledger.attest(
            attestation.attester,
            AttestationRequest {
                schema: attestation.schema,
                data: AttestationRequestData::with_data(attestation.data.clone()),
            },
        );
        self.seen
            .lock()
            .unwrap()
            .push((committed, matches!(nested, Err(LedgerError::Reentrancy))));
        Ok(true)
    }

    fn on_revoke(&self, _: &Attestation, _: &mut HookContext<'_>) -> Result<bool, ResolverError> {
        Ok(true)
    }
}

#[test]
fn hook_calling_back_into_engine_sees_committed_state() {
    let env = env();
    let hook = Arc::new(CallsBack::default());
    let bound: Arc<dyn Resolver> = hook.clone();
    let schema = env.registry.register("uint256 value", Some(bound), true).unwrap();
    hook.ledger.set(Arc::downgrade(&env.ledger)).unwrap();

    let (done, finished) = mpsc::channel();
    let ledger = env.ledger.clone();
    thread::spawn(move || {
        let attester = Attester::new(ledger, Address::repeat_byte(0x42)).unwrap();
        let _ = done.send(attester.attest(schema, U256::from(7u64)));
    });
    let uid = finished
        .recv_timeout(Duration::from_secs(5))
        .expect("attest must not block on its own hook")
        .unwrap();

    // the staged uid is not yet committed, and the nested unit is refused
    assert_eq!(*hook.seen.lock().unwrap(), vec![(false, true)]);
    assert!(env.ledger.get_attestation(&uid).is_some());
    assert_eq!(env.ledger.attestation_count(), 1);
}

proptest! {
    #[test]
    fn schema_uid_is_deterministic(schema in "[a-z0-9 ]{0,40}", resolver in any::<[u8; 20]>(), revocable in any::<bool>()) {
        let resolver = Address::from(resolver);
        prop_assert_eq!(schema_uid(&schema, resolver, revocable), schema_uid(&schema, resolver, revocable));
        prop_assert_ne!(schema_uid(&schema, resolver, revocable), schema_uid(&schema, resolver, !revocable));
    }

    #[test]
    fn attestation_uids_are_pairwise_distinct(raw in prop::collection::vec(0u64..4, 1..12)) {
        let env = env();
        let schema = env.registry.register("uint256 value", None, true).unwrap();

        let mut seen = HashSet::new();
        for (i, value) in raw.iter().enumerate() {
            if i % 3 == 0 {
                env.clock.advance(1);
            }
            let uid = env.attester.attest(schema, U256::from(*value)).unwrap();
            prop_assert!(seen.insert(uid));
        }

        let batch = env.attester.multi_attest(&[schema], &[values(&raw)]).unwrap();
        for uid in &batch[0] {
            prop_assert!(seen.insert(*uid));
        }
    }
}
