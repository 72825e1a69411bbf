//! Benchmarks for the upload hot path against the in-memory store
//!
//! Measures orchestration overhead: part splitting, per-part bookkeeping and
//! assembly, without network cost.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use partwise_core::*;
use partwise_engine::testing::TrickleReader;
use partwise_engine::*;

const PART_SIZE: u64 = 256 * 1024;
const OBJECT_SIZES: &[usize] = &[64 * 1024, 1024 * 1024, 8 * 1024 * 1024];

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn uploader() -> Uploader<Arc<MemoryStore>> {
    let store = Arc::new(MemoryStore::with_min_part_size(PART_SIZE));
    Uploader::new(store, UploadConfig::with_part_size(PART_SIZE)).unwrap()
}

fn bench_upload(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("upload");

    for &size in OBJECT_SIZES {
        let data = vec![42u8; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("sized", size), &data, |b, data| {
            let uploader = uploader();
            // One key, so the store overwrites instead of growing
            let key = ObjectKey::new("bench-object").unwrap();
            b.iter(|| {
                let reference = rt
                    .block_on(uploader.upload(&data[..], data.len() as u64, key.clone()))
                    .unwrap();
                black_box(reference);
            });
        });

        group.bench_with_input(BenchmarkId::new("trickle_stream", size), &data, |b, data| {
            let uploader = uploader();
            let key = ObjectKey::new("bench-stream").unwrap();
            b.iter(|| {
                let source = TrickleReader::new(data.clone(), 16 * 1024);
                let reference = rt.block_on(uploader.upload_stream(source, key.clone())).unwrap();
                black_box(reference);
            });
        });
    }

    group.finish();
}

fn bench_part_reader(c: &mut Criterion) {
    let rt = runtime();
    let data = vec![7u8; 4 * 1024 * 1024];

    c.bench_function("part_reader_4mib", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut reader = PartReader::unbounded(&data[..], PART_SIZE as usize);
                let mut parts = 0;
                while let Some(part) = reader.next_part().await.unwrap() {
                    black_box(part);
                    parts += 1;
                }
                parts
            })
        });
    });
}

criterion_group!(benches, bench_upload, bench_part_reader);
criterion_main!(benches);
