//! # Secure Message Demo
//!
//! Alice and Bob exchange signed, sealed messages, then Bob sees what
//! happens to a tampered ciphertext and to a replayed one.
//!
//! ## Run
//!
//! ```bash
//! RUST_LOG=securemsg=debug cargo run --example secure_message_demo
//! ```

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use securemsg::{KeyPair, MessageProtocol, ProtocolConfig, ReplayGuard, SecureMessage};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    from: String,
    msg: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== securemsg: Alice and Bob ===\n");

    // Step 1: Keys
    println!("Step 1: Generating key pairs...");

    let alice = KeyPair::generate();
    let bob = KeyPair::generate();
    let alice_pub = alice.public_keys();
    let bob_pub = bob.public_keys();

    println!("  Alice signing key:    {}", alice_pub.signing);
    println!("  Alice encryption key: {}", alice_pub.encryption);
    println!("  Bob signing key:      {}", bob_pub.signing);
    println!("  Bob encryption key:   {}", bob_pub.encryption);
    println!();

    // Step 2: Alice signs and seals for Bob
    println!("Step 2: Alice signs and seals a message for Bob...");

    let mut outbound = SecureMessage::sign(
        ChatMessage {
            from: "Alice".into(),
            msg: "Hello Bob".into(),
        },
        &alice,
    )
    .expect("Alice signing failed");
    outbound
        .encrypt(&alice, &bob_pub.encryption.encode())
        .expect("Alice encryption failed");

    let wire = outbound.to_base64().expect("sealed message has ciphertext");
    println!("  Nonce:     {}", outbound.nonce().expect("signed"));
    println!("  Timestamp: {}", outbound.timestamp().expect("signed"));
    println!("  Wire (base64, {} chars): {}...", wire.len(), &wire[..48]);
    println!();

    // Step 3: Bob opens, verifies, decodes
    println!("Step 3: Bob decrypts and verifies...");

    let mut at_bob = SecureMessage::<ChatMessage>::from_base64(&wire).expect("valid base64");
    at_bob
        .decrypt(
            &bob,
            &alice_pub.encryption.encode(),
            &alice_pub.signing.encode(),
        )
        .expect("Bob decryption failed");

    println!("  Bob received from Alice: {:?}", at_bob.payload().expect("verified"));
    println!();

    // Step 4: Bob replies
    println!("Step 4: Bob replies to Alice...");

    let mut reply = SecureMessage::sign(
        ChatMessage {
            from: "Bob".into(),
            msg: "Hello Alice".into(),
        },
        &bob,
    )
    .expect("Bob signing failed");
    reply
        .encrypt(&bob, &alice_pub.encryption.encode())
        .expect("Bob encryption failed");

    let mut at_alice =
        SecureMessage::<ChatMessage>::from_encrypted(reply.encrypted().expect("sealed").to_vec());
    at_alice
        .decrypt(&alice, &bob_pub.encryption.encode(), &bob_pub.signing.encode())
        .expect("Alice decryption failed");

    println!("  Alice received from Bob: {:?}", at_alice.payload().expect("verified"));
    println!();

    // Step 5: Tampering
    println!("Step 5: A single flipped bit in transit...");

    let mut tampered = outbound.encrypted().expect("sealed").to_vec();
    tampered[20] ^= 0x01;

    let mut forged = SecureMessage::<ChatMessage>::from_encrypted(tampered);
    match forged.decrypt(
        &bob,
        &alice_pub.encryption.encode(),
        &alice_pub.signing.encode(),
    ) {
        Ok(()) => println!("  Unexpectedly accepted!"),
        Err(e) => println!("  Rejected: {} (code {})", e, e.code()),
    }
    println!();

    // Step 6: Replay
    println!("Step 6: The same ciphertext delivered twice...");

    let protocol = MessageProtocol::new(
        ProtocolConfig::default().with_max_message_age(Duration::minutes(5)),
    )
    .with_replay_guard(Arc::new(ReplayGuard::new(Duration::minutes(10))));

    for attempt in 1..=2 {
        let mut delivery = SecureMessage::<ChatMessage>::from_base64(&wire).expect("valid base64");
        match protocol.decrypt(
            &mut delivery,
            &bob,
            &alice_pub.encryption,
            &alice_pub.signing,
        ) {
            Ok(()) => println!("  Delivery {}: accepted", attempt),
            Err(e) => println!("  Delivery {}: rejected, {}", attempt, e),
        }
    }
    println!();

    println!("=== Demo Complete ===");
}
