use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};

use sb_chess::PositionHistory;
use sb_net::{create_network, encode_history, CachedEval, NetworkConfig, NnCache};
use sb_search::{Search, SearchLimits, SearchParams};

fn bench_encoder(c: &mut Criterion) {
    let history = PositionHistory::starting();
    c.bench_function("encode_history_startpos", |b| {
        b.iter(|| encode_history(criterion::black_box(&history)))
    });
}

fn bench_cache(c: &mut Criterion) {
    let cache = NnCache::new(100_000);
    let eval = CachedEval {
        value: 0.1,
        priors: (0..32u16).map(|i| (i, 1.0 / 32.0)).collect(),
    };
    for key in 0..10_000u64 {
        cache.insert(key, eval.clone());
    }
    c.bench_function("cache_lookup_hit", |b| {
        let mut key = 0u64;
        b.iter(|| {
            key = (key + 1) % 10_000;
            criterion::black_box(cache.lookup(key))
        })
    });
}

fn bench_small_search(c: &mut Criterion) {
    let network = create_network(&NetworkConfig {
        backend: "uniform".to_string(),
        weights: None,
        options: String::new(),
    })
    .unwrap();
    c.bench_function("search_256_visits_single_thread", |b| {
        b.iter(|| {
            let search = Search::new(
                network.clone(),
                Arc::new(NnCache::new(0)),
                PositionHistory::starting(),
                SearchLimits {
                    visits: Some(256),
                    ..SearchLimits::default()
                },
                SearchParams {
                    minibatch_size: 16,
                    ..SearchParams::default()
                },
                Box::new(|_| {}),
                Box::new(|_| {}),
            )
            .unwrap();
            search.run_blocking(1);
            criterion::black_box(search.total_playouts())
        })
    });
}

criterion_group!(benches, bench_encoder, bench_cache, bench_small_search);
criterion_main!(benches);
