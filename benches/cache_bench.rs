//! Benchmarks for the cache subsystem.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

use tiered_cache::cache::clock::ManualClock;
use tiered_cache::cache::codec::{Codec, StoredValue};
use tiered_cache::cache::entry::{CacheEntry, PriorityClass};
use tiered_cache::cache::eviction::{EvictionIndex, Rank};
use tiered_cache::cache::memory::MemoryTier;
use tiered_cache::config::CompressionConfig;
use tiered_cache::{CacheEngine, Config, SetOptions};

fn make_entry(i: u64) -> CacheEntry {
    let mut entry = CacheEntry::new(
        format!("key-{i}"),
        StoredValue::Raw(json!(i)),
        i,
        Duration::from_secs(300),
        PriorityClass::Normal,
        BTreeSet::new(),
        64,
    );
    entry.hit_count = i % 17;
    entry
}

fn bench_eviction_index(c: &mut Criterion) {
    // Index over 10,000 keys.
    let mut index = EvictionIndex::new();
    for i in 0..10_000u64 {
        index.insert_or_update(&format!("key-{i}"), Rank::of(&make_entry(i), 20_000));
    }

    c.bench_function("eviction_rescore_in_10k", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i = (i + 7_919) % 10_000;
            let rank = Rank { score: (i % 97) as f64, created_at: i, seq: i };
            index.insert_or_update(black_box(&format!("key-{i}")), rank);
            black_box(index.peek_min());
        })
    });
}

fn bench_tier_overflow(c: &mut Criterion) {
    let mut tier = MemoryTier::new(10_000, None);
    for i in 0..10_000u64 {
        let _ = tier.put(make_entry(i), 10_000);
    }

    c.bench_function("tier_put_with_eviction_10k", |b| {
        let mut i = 10_000u64;
        b.iter(|| {
            i += 1;
            let evicted = tier.put(make_entry(i), i);
            black_box(evicted.map(|v| v.len()).unwrap_or(0));
        })
    });
}

fn bench_compression(c: &mut Criterion) {
    let codec = Codec::new(CompressionConfig {
        enabled: true,
        ..Default::default()
    });

    // Play-by-play sized document.
    let value = json!({
        "plays": (0..500).map(|i| json!({"inning": i % 9, "pitch": "FF", "mph": 95.1})).collect::<Vec<_>>()
    });
    let encoded = codec.encode(&value).unwrap();

    c.bench_function("zstd_encode_play_by_play", |b| {
        b.iter(|| black_box(codec.encode(black_box(&value)).unwrap()))
    });

    c.bench_function("zstd_decode_play_by_play", |b| {
        b.iter(|| black_box(codec.decode(black_box(&encoded)).unwrap()))
    });
}

fn bench_engine_get_set(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let engine = runtime.block_on(async {
        let mut config = Config::default();
        config.cache.max_entries = 10_000;
        let engine = CacheEngine::open_with(Arc::new(config), Arc::new(ManualClock::new(0)), None)
            .await
            .unwrap();
        for i in 0..10_000u64 {
            engine
                .set(&format!("key-{i}"), json!(i), SetOptions::default())
                .await
                .unwrap();
        }
        engine
    });

    c.bench_function("engine_get_hit", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i = (i + 1) % 10_000;
            black_box(runtime.block_on(engine.get(&format!("key-{i}"))));
        })
    });

    c.bench_function("engine_set_replace", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i = (i + 1) % 10_000;
            runtime
                .block_on(engine.set(&format!("key-{i}"), json!(i), SetOptions::default()))
                .unwrap();
        })
    });
}

criterion_group!(
    benches,
    bench_eviction_index,
    bench_tier_overflow,
    bench_compression,
    bench_engine_get_set,
);
criterion_main!(benches);
