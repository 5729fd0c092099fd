use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde::{Deserialize, Serialize};

use securemsg::{KeyPair, SecureMessage};

#[derive(Clone, Serialize, Deserialize)]
struct ChatMessage {
    from: String,
    msg: String,
}

fn payload() -> ChatMessage {
    ChatMessage {
        from: "Alice".into(),
        msg: "x".repeat(256),
    }
}

fn bench_secure_message(c: &mut Criterion) {
    let alice = KeyPair::generate();
    let bob = KeyPair::generate();
    let alice_pub = alice.public_keys();
    let bob_enc = bob.public_keys().encryption.encode();
    let alice_enc = alice_pub.encryption.encode();
    let alice_sig = alice_pub.signing.encode();

    c.bench_function("sign", |b| {
        b.iter(|| SecureMessage::sign(black_box(payload()), &alice).unwrap())
    });

    c.bench_function("encrypt", |b| {
        b.iter_batched(
            || SecureMessage::sign(payload(), &alice).unwrap(),
            |mut msg| msg.encrypt(&alice, black_box(&bob_enc)).unwrap(),
            criterion::BatchSize::SmallInput,
        )
    });

    let mut sealed = SecureMessage::sign(payload(), &alice).unwrap();
    sealed.encrypt(&alice, &bob_enc).unwrap();
    let wire = sealed.encrypted().unwrap().to_vec();

    c.bench_function("decrypt", |b| {
        b.iter_batched(
            || SecureMessage::<ChatMessage>::from_encrypted(wire.clone()),
            |mut msg| msg.decrypt(&bob, &alice_enc, &alice_sig).unwrap(),
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_secure_message);
criterion_main!(benches);
