//! Example: batching attestations and verifying an offchain claim
//!
//! Run with: cargo run -p attestry-offchain --example offchain_roundtrip

use anyhow::Context;
use attestry_core::types::{EMPTY_UID, NO_EXPIRATION};
use attestry_core::{
    encode_uint, Address, AttestationEngine, Attester, InMemoryLedger, InMemorySchemaRegistry, LedgerConfig,
    LedgerEvent, LogResolver, Resolver, ResolverEvent, SystemClock, U256,
};
use attestry_offchain::{
    Eip712Domain, OffchainAttestationMessage, OffchainAttestationVerifier, OffchainPackage, OffchainSigner,
    DOMAIN_NAME,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Attestry - offchain roundtrip\n");

    // Step 1: registry with a logging resolver
    println!("1. Registering schemas...");
    let registry = Arc::new(InMemorySchemaRegistry::new());
    let resolver: Arc<dyn Resolver> = Arc::new(LogResolver::new(Address::repeat_byte(0xaa)));
    let scores = registry.register("uint256 score", Some(resolver.clone()), true)?;
    let votes = registry.register("uint256 votes", Some(resolver), true)?;
    println!("   score schema: {scores:?}");
    println!("   votes schema: {votes:?}\n");

    // Step 2: ledger and attester
    let ledger = Arc::new(InMemoryLedger::new(
        LedgerConfig::default(),
        registry,
        Arc::new(SystemClock),
    ));
    let attester = Attester::new(ledger.clone(), Address::repeat_byte(0x42))?;

    println!("2. Batch attesting...");
    let uids = attester
        .multi_attest(
            &[scores, votes],
            &[
                vec![U256::from(10u64), U256::from(100u64), U256::from(123_456u64)],
                vec![U256::from(5u64), U256::from(23_423_234u64)],
            ],
        )
        .context("batch attest")?;
    println!("   issued {} + {} attestations\n", uids[0].len(), uids[1].len());

    println!("3. Revoking the first score...");
    attester.revoke(scores, uids[0][0])?;
    let revoked = ledger
        .get_attestation(&uids[0][0])
        .context("revoked attestation missing")?;
    println!("   revocation time: {}\n", revoked.revocation_time);

    println!("4. Event log:");
    for event in ledger.events() {
        match event {
            LedgerEvent::Attested { uid, .. } => println!("   attested {uid:?}"),
            LedgerEvent::Revoked { uid, .. } => println!("   revoked  {uid:?}"),
            LedgerEvent::Resolver(ResolverEvent::Log { phase, value, .. }) => {
                println!("   hook {phase}: {value}")
            }
        }
    }
    println!();

    // Step 5: offchain claim, shipped as CBOR and verified
    println!("5. Signing an offchain claim...");
    let signer = OffchainSigner::generate();
    let domain = Eip712Domain::for_engine(ledger.as_ref(), DOMAIN_NAME);
    let message = OffchainAttestationMessage {
        version: 1,
        schema: scores,
        recipient: Address::repeat_byte(0x0b),
        time: ledger.now(),
        expiration_time: NO_EXPIRATION,
        revocable: true,
        ref_uid: EMPTY_UID,
        data: encode_uint(U256::from(42u64)),
    };
    let package = OffchainPackage::new(signer.sign(&domain, message)?);
    let bytes = package.encode()?;
    println!("   signer: {:?}", package.signer);
    println!("   uid: {:?}", package.sig.uid());
    println!("   package size: {} bytes\n", bytes.len());

    println!("6. Verifying...");
    let received = OffchainPackage::decode(&bytes)?;
    let verifier = OffchainAttestationVerifier::new(ledger.clone(), Some(1))?;
    println!("   valid: {}", verifier.verify(&received.sig));

    let mut forged = received.sig.clone();
    forged.message.data = encode_uint(U256::from(43u64));
    println!("   tampered valid: {}", verifier.verify(&forged));

    Ok(())
}
