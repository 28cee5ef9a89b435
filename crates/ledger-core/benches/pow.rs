use criterion::{criterion_group, criterion_main, Criterion};
use ledger_core::{pow::search_nonces, Block, Transaction};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::hint::black_box;

fn sample_block(difficulty: u32) -> Block {
    let mut rng = StdRng::seed_from_u64(42);
    let mut txs: Vec<Transaction> = (0..4)
        .map(|i| {
            let amount = rng.gen_range(1..10);
            let fee = rng.gen_range(0..3);
            Transaction::new(format!("alice-{i}"), "bob", amount, fee)
        })
        .collect();
    txs.push(Transaction::coinbase("miner", 110));
    Block::new(ledger_core::now_millis(), txs, "Genesis", difficulty)
}

fn bench_pow(c: &mut Criterion) {
    for difficulty in [2u32, 4] {
        let block = sample_block(difficulty);
        let prefix = block.hash_prefix();
        c.bench_function(&format!("search_difficulty_{difficulty}"), |b| {
            b.iter(|| search_nonces(black_box(&prefix), 0, u64::MAX, difficulty));
        });
    }
}

fn bench_block_hash(c: &mut Criterion) {
    let block = sample_block(1);
    c.bench_function("compute_hash", |b| b.iter(|| black_box(&block).compute_hash()));
}

criterion_group!(benches, bench_pow, bench_block_hash);
criterion_main!(benches);
