//! Allocator micro-benchmarks
//!
//! Run with: `cargo bench --package strata_memory`

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use strata_memory::{Arena, BuddyAllocator, Pool};

fn bench_arena_push(c: &mut Criterion) {
    c.bench_function("arena_push_128x64", |b| {
        let mut arena = Arena::with_capacity_kb(64);
        b.iter(|| {
            arena.clear();
            for _ in 0..128 {
                black_box(arena.push_bytes(64));
            }
        });
    });
}

fn bench_pool_cycle(c: &mut Criterion) {
    c.bench_function("pool_acquire_release_256", |b| {
        let mut pool: Pool<[u8; 32], 256> = Pool::new();
        let mut slots = Vec::with_capacity(256);
        b.iter(|| {
            for _ in 0..256 {
                slots.push(pool.acquire());
            }
            for slot in slots.drain(..) {
                pool.release(slot);
            }
        });
    });
}

fn bench_buddy_churn(c: &mut Criterion) {
    c.bench_function("buddy_alloc_free_8k", |b| {
        let arena = Arena::with_capacity_kb(256);
        let mut allocator = BuddyAllocator::new(&arena, 4 * 1024, 64 * 1024, 4 * 1024 * 1024);
        b.iter(|| {
            let allocation = allocator.alloc(black_box(8 * 1024)).unwrap();
            allocator.free(allocation.offset);
        });
    });
}

criterion_group!(
    benches,
    bench_arena_push,
    bench_pool_cycle,
    bench_buddy_churn
);
criterion_main!(benches);
