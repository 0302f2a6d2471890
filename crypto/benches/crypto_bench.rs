use criterion::{black_box, criterion_group, criterion_main, Criterion};
use txbot_types::{Amount, Fee, Message, TxBody};

fn ed25519_sign_bench(c: &mut Criterion) {
    let kp = txbot_crypto::keypair_from_seed(&[42u8; 32]);
    let msg = [42u8; 128];

    c.bench_function("ed25519_sign_128B", |b| {
        b.iter(|| txbot_crypto::sign_message(black_box(&msg), &kp.private))
    });
}

fn sign_tx_bench(c: &mut Criterion) {
    let kp = txbot_crypto::keypair_from_seed(&[42u8; 32]);
    let signer = txbot_crypto::derive_address(&kp.public);
    let body = TxBody {
        chain_id: 9000,
        cosmos_chain_id: "evmos_9000-1".into(),
        signer: signer.clone(),
        account_number: 1,
        sequence: 12,
        fee: Fee::new(Amount::new(10_000), "aevmos", 200_000),
        memo: String::new(),
        messages: vec![Message::Send {
            from: signer.clone(),
            to: signer,
            amount: Amount::new(1),
            denom: "aevmos".into(),
        }],
    };

    c.bench_function("sign_tx_send", |b| {
        b.iter(|| txbot_crypto::sign_tx(black_box(body.clone()), &kp))
    });
}

fn account_generation_bench(c: &mut Criterion) {
    c.bench_function("account_generate", |b| {
        b.iter(txbot_crypto::generate_account)
    });
}

criterion_group!(
    benches,
    ed25519_sign_bench,
    sign_tx_bench,
    account_generation_bench
);
criterion_main!(benches);
