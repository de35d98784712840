//! Benchmarks for the Platter ingest pipeline hot paths.
//!
//! Run with: cargo bench -p platter-core

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use platter_core::config::{GuardConfig, ResponseConfig, ValidationConfig};
use platter_core::pipeline::fetch::{FetchBody, FetchOutcome};
use platter_core::pipeline::validate::sniff_image_type;
use platter_core::pipeline::{Hasher, UrlGuard, Validator};
use platter_core::ResponsePolicy;
use url::Url;

fn benchmark_guard(c: &mut Criterion) {
    let guard = UrlGuard::new(GuardConfig::default());

    c.bench_function("guard_resolve_plain", |b| {
        b.iter(|| {
            let _ = guard.resolve(black_box("https://cdn.example.com/photos/dish.jpg?w=800"));
        })
    });

    c.bench_function("guard_resolve_proxied", |b| {
        b.iter(|| {
            let _ = guard.resolve(black_box(
                "/image?target=https%3A%2F%2Fcdn.example.com%2Fphotos%2Fdish.jpg",
            ));
        })
    });

    c.bench_function("guard_reject_metadata", |b| {
        b.iter(|| {
            let _ = guard.resolve(black_box("http://169.254.169.254/latest/meta-data/"));
        })
    });
}

fn benchmark_content_hash(c: &mut Criterion) {
    let data = vec![0xA5u8; 2 * 1024 * 1024];

    c.bench_function("content_hash_blake3_2mib", |b| {
        b.iter(|| {
            let _ = Hasher::content_hash_from_bytes(black_box(&data));
        })
    });
}

fn benchmark_validate(c: &mut Criterion) {
    let validator = Validator::new(ValidationConfig::default());
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0];
    jpeg.resize(512 * 1024, 0);
    let chunks: Vec<Bytes> = jpeg.chunks(16 * 1024).map(Bytes::copy_from_slice).collect();
    let url = Url::parse("https://cdn.example.com/dish.jpg").unwrap();

    c.bench_function("sniff_image_type", |b| {
        b.iter(|| {
            let _ = sniff_image_type(black_box(&jpeg[..16]));
        })
    });

    c.bench_function("validate_512kib_jpeg", |b| {
        b.iter(|| {
            let outcome = FetchOutcome {
                status: 200,
                declared_content_type: Some("image/jpeg".into()),
                final_url: url.clone(),
                body: FetchBody::from_chunks(chunks.clone(), 8 * 1024 * 1024),
            };
            let _ = rt.block_on(validator.validate(black_box(outcome)));
        })
    });
}

fn benchmark_fallback(c: &mut Criterion) {
    let policy = ResponsePolicy::new(ResponseConfig::default());

    c.bench_function("fallback_response", |b| {
        b.iter(|| {
            let _ = black_box(policy.fallback());
        })
    });
}

criterion_group!(
    benches,
    benchmark_guard,
    benchmark_content_hash,
    benchmark_validate,
    benchmark_fallback
);
criterion_main!(benches);
