use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rust_decimal::Decimal;
use std::time::Duration;
use uuid::Uuid;

use product_gateway::cache::{CacheStats, ResponseCache};
use product_gateway::config::{CacheSettings, IdempotencySettings};
use product_gateway::idempotency::{IdempotencyCoordinator, IdempotencyKeyGenerator};
use product_gateway::models::{ErpProduct, ErpProductPage, ProductPage, StockInfo};
use product_gateway::observability::LatencyTimer;

fn erp_product(id: Uuid) -> ErpProduct {
    let now = chrono::Utc::now();
    ErpProduct {
        id,
        sku: format!("SKU-{}", &id.simple().to_string()[..8]),
        name: "Bench product".to_string(),
        description: None,
        price: Decimal::from(1999) / Decimal::from(100),
        category: Some("bench".to_string()),
        created_at: now,
        updated_at: now,
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn benchmark_idempotency(c: &mut Criterion) {
    let mut group = c.benchmark_group("idempotency");
    let rt = runtime();

    group.bench_function("get_or_create_new_key", |b| {
        let coordinator = IdempotencyCoordinator::new(IdempotencySettings::default());
        b.to_async(&rt).iter(|| async {
            let key = Uuid::new_v4().to_string();
            let result = coordinator
                .get_or_create_operation(&key, "POST /api/v1/products", "body-hash")
                .await
                .unwrap();
            black_box(result)
        });
    });

    group.bench_function("get_or_create_replay", |b| {
        let coordinator = IdempotencyCoordinator::new(IdempotencySettings::default());
        let key = Uuid::new_v4().to_string();
        rt.block_on(async {
            coordinator
                .get_or_create_operation(&key, "POST /api/v1/products", "body-hash")
                .await
                .unwrap();
        });
        coordinator.complete_operation(
            &key,
            "POST /api/v1/products",
            "body-hash",
            "{\"id\":1}".to_string(),
            201,
        );

        b.to_async(&rt).iter(|| async {
            let result = coordinator
                .get_or_create_operation(&key, "POST /api/v1/products", "body-hash")
                .await
                .unwrap();
            black_box(result)
        });
    });

    group.bench_function("create_and_complete", |b| {
        let coordinator = IdempotencyCoordinator::new(IdempotencySettings::default());
        b.to_async(&rt).iter(|| async {
            let key = Uuid::new_v4().to_string();
            coordinator
                .get_or_create_operation(&key, "PUT /api/v1/products/1", "body-hash")
                .await
                .unwrap();
            coordinator.complete_operation(
                &key,
                "PUT /api/v1/products/1",
                "body-hash",
                "{}".to_string(),
                200,
            );
        });
    });

    for size in [100usize, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("sweep", size), size, |b, &size| {
            b.iter_batched(
                || {
                    let coordinator = IdempotencyCoordinator::new(IdempotencySettings::default());
                    rt.block_on(async {
                        for _ in 0..size {
                            let key = Uuid::new_v4().to_string();
                            coordinator
                                .get_or_create_operation(&key, "POST /api/v1/products", "h")
                                .await
                                .unwrap();
                        }
                    });
                    coordinator
                },
                |coordinator| black_box(coordinator.sweep()),
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn benchmark_key_generator(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_generator");
    let generator = IdempotencyKeyGenerator::with_default_config();
    let body = serde_json::to_vec(&erp_product(Uuid::new_v4())).unwrap();

    group.bench_function("hash_body", |b| {
        b.iter(|| black_box(generator.hash_body(black_box(&body))));
    });

    group.bench_function("composite_key", |b| {
        let key = Uuid::new_v4().to_string();
        b.iter(|| {
            black_box(generator.composite_key(
                black_box(&key),
                "POST /api/v1/products",
                "0f1e2d3c4b5a",
            ))
        });
    });

    group.finish();
}

fn benchmark_response_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("response_cache");
    let ttl = Duration::from_secs(300);

    group.bench_function("set_product", |b| {
        let cache = ResponseCache::new(CacheSettings::default());
        let product = erp_product(Uuid::new_v4());
        b.iter(|| {
            cache
                .set(&format!("products:{}", product.id), black_box(&product), ttl)
                .unwrap();
        });
    });

    group.bench_function("get_hit", |b| {
        let cache = ResponseCache::new(CacheSettings::default());
        let product = erp_product(Uuid::new_v4());
        let key = format!("products:{}", product.id);
        cache.set(&key, &product, ttl).unwrap();

        b.iter(|| black_box(cache.get::<ErpProduct>(black_box(&key))));
    });

    group.bench_function("get_miss", |b| {
        let cache = ResponseCache::new(CacheSettings::default());
        b.iter(|| black_box(cache.get::<ErpProduct>("products:missing")));
    });

    for size in [100usize, 1_000, 5_000].iter() {
        group.bench_with_input(
            BenchmarkId::new("remove_by_pattern", size),
            size,
            |b, &size| {
                b.iter_batched(
                    || {
                        let cache = ResponseCache::new(CacheSettings {
                            max_entries: size * 2,
                            ..CacheSettings::default()
                        });
                        for i in 0..size {
                            let key = if i % 10 == 0 {
                                format!("products:list:{}:20", i)
                            } else {
                                format!("products:{}", Uuid::new_v4())
                            };
                            cache.set(&key, &i, ttl).unwrap();
                        }
                        cache
                    },
                    |cache| black_box(cache.remove_by_pattern("products:list:")),
                    BatchSize::LargeInput,
                );
            },
        );
    }

    group.bench_function("record_hit", |b| {
        let stats = CacheStats::new();
        b.iter(|| stats.record_hit());
    });

    group.finish();
}

fn benchmark_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");

    for size in [20usize, 100].iter() {
        group.bench_with_input(BenchmarkId::new("product_page", size), size, |b, &size| {
            let items: Vec<ErpProduct> = (0..size).map(|_| erp_product(Uuid::new_v4())).collect();
            // Every other product has stock, the rest get the placeholder.
            let stock: Vec<StockInfo> = items
                .iter()
                .step_by(2)
                .map(|p| StockInfo::new(p.id, 5))
                .collect();

            b.iter_batched(
                || {
                    (
                        ErpProductPage {
                            items: items.clone(),
                            page: 1,
                            page_size: size as u32,
                            total: size as u64,
                        },
                        stock.clone(),
                    )
                },
                |(page, stock)| black_box(ProductPage::merge(page, stock)),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn benchmark_latency_timer(c: &mut Criterion) {
    let mut group = c.benchmark_group("latency_timer");

    group.bench_function("create_and_elapsed", |b| {
        b.iter(|| {
            let timer = LatencyTimer::new();
            black_box(timer.elapsed_ms())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_idempotency,
    benchmark_key_generator,
    benchmark_response_cache,
    benchmark_merge,
    benchmark_latency_timer,
);

criterion_main!(benches);
