use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{Duration, Utc};
use corebank_banking::{AccountNumber, CompoundingPeriod};
use corebank_core::UserId;
use corebank_events::{BankingEvent, EventEnvelope, InMemoryEventBus};
use corebank_infra::{
    AccountNumberCipher, CoreBank, CoreConfig, InMemoryBankStore, InMemoryOwnerDirectory,
    OperationContext,
};
use rust_decimal::Decimal;
use std::sync::Arc;

type Bank = CoreBank<Arc<InMemoryBankStore>, Arc<InMemoryEventBus<EventEnvelope<BankingEvent>>>>;

fn cipher() -> AccountNumberCipher {
    AccountNumberCipher::new(&[7u8; 32], &[9u8; 16]).unwrap()
}

fn bank() -> Bank {
    CoreBank::new(
        &CoreConfig::default(),
        Arc::new(InMemoryBankStore::new()),
        Arc::new(InMemoryEventBus::new()),
        Arc::new(InMemoryOwnerDirectory::new()),
        cipher(),
    )
}

fn open(bank: &Bank, owner: UserId, balance: i64) -> String {
    bank.accounts()
        .open(&OperationContext::system(), owner, "EGP", Decimal::from(balance))
        .unwrap()
        .number
        .as_str()
        .to_string()
}

fn bench_cipher(c: &mut Criterion) {
    let cipher = cipher();
    let number = AccountNumber::parse("1234567890123456").unwrap();
    let encoded = cipher.encode(&number).unwrap();

    c.bench_function("cipher_encode", |b| {
        b.iter(|| cipher.encode(black_box(&number)).unwrap())
    });
    c.bench_function("cipher_decode", |b| {
        b.iter(|| cipher.decode(black_box(&encoded)).unwrap())
    });
}

fn bench_deposit(c: &mut Criterion) {
    let bank = bank();
    let number = open(&bank, UserId::new(), 0);
    let ctx = OperationContext::system();

    c.bench_function("deposit", |b| {
        b.iter(|| {
            bank.ledger()
                .deposit(&ctx, black_box(&number), Decimal::ONE, None)
                .unwrap()
        })
    });
}

fn bench_transfer(c: &mut Criterion) {
    let bank = bank();
    let alice = UserId::new();
    let bob = UserId::new();
    let a = open(&bank, alice, 1_000_000_000);
    let b = open(&bank, bob, 1_000_000_000);
    let ctx = OperationContext::system();

    c.bench_function("transfer_round_trip", |bench| {
        bench.iter(|| {
            bank.ledger().transfer(&ctx, &a, bob, Decimal::ONE, None).unwrap();
            bank.ledger().transfer(&ctx, &b, alice, Decimal::ONE, None).unwrap();
        })
    });
}

fn bench_interest_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("interest_sweep");

    for accounts in [10usize, 100, 1_000] {
        group.throughput(Throughput::Elements(accounts as u64));
        group.bench_with_input(BenchmarkId::from_parameter(accounts), &accounts, |b, &n| {
            let bank = bank();
            for _ in 0..n {
                open(&bank, UserId::new(), 1_000);
            }
            let system = OperationContext::system();
            bank.interest_rules()
                .create(&system, "EGP", Decimal::ONE, CompoundingPeriod::Daily)
                .unwrap();

            // Each iteration lands in a fresh daily period.
            let mut now = Utc::now();
            b.iter(|| {
                now += Duration::days(1);
                black_box(bank.interest().apply_interest(&system, now))
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_cipher,
    bench_deposit,
    bench_transfer,
    bench_interest_sweep
);
criterion_main!(benches);
