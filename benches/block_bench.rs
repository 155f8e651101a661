// SPDX-License-Identifier: MIT
//! Block engine benchmarks
//! Measures allocation, verified reads, document encoding and compaction

use blockdoc::tags::NdArray;
use blockdoc::{
    compact_document, BlockManager, CompressionId, Document, DocumentConfig, StorageMode,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use tempfile::TempDir;

fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

fn block_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("blocks");

    for size in [4 * 1024, 256 * 1024, 4 * 1024 * 1024] {
        let data = payload(size);
        group.throughput(Throughput::Bytes(size as u64));

        for (name, codec) in [("none", None), ("zlib", Some(CompressionId::ZLIB))] {
            group.bench_with_input(
                BenchmarkId::new(format!("allocate_{}", name), size),
                &data,
                |b, data| {
                    b.iter(|| {
                        let mut blocks = BlockManager::new(StorageMode::Internal);
                        blocks.allocate(black_box(data), codec).unwrap();
                        blocks
                    })
                },
            );

            // Read includes CRC32, decompression and SHA-256 verification
            let mut blocks = BlockManager::new(StorageMode::Internal);
            blocks.allocate(&data, codec).unwrap();
            group.bench_with_input(BenchmarkId::new(format!("read_{}", name), size), &blocks, |b, blocks| {
                b.iter(|| blocks.read(black_box(0)).unwrap())
            });
        }
    }

    group.finish();
}

fn document_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("document");

    let mut doc = Document::new();
    for i in 0..32 {
        let values: Vec<f64> = (0..8192).map(|j| (i * j) as f64).collect();
        doc.insert(format!("array_{}", i), NdArray::from_f64(&values))
            .unwrap();
    }

    group.bench_function("encode", |b| b.iter(|| doc.encode(None).unwrap()));

    let bytes = doc.encode(None).unwrap().main;
    group.bench_function("decode", |b| {
        b.iter(|| Document::from_bytes(black_box(bytes.clone())).unwrap())
    });

    group.finish();
}

fn compaction_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("compaction");
    group.sample_size(20);

    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bdoc");
    let output = temp_dir.path().join("output.bdoc");

    let config = DocumentConfig {
        durable_writes: false,
        ..Default::default()
    };
    let mut doc = Document::with_config(config.clone()).unwrap();
    for i in 0..64 {
        doc.insert(format!("array_{}", i), NdArray::from_u8(&payload(64 * 1024)))
            .unwrap();
    }
    // Orphan every other block
    for i in (0..64).step_by(2) {
        doc.remove(&format!("array_{}", i));
    }
    doc.write_to(&input).unwrap();

    for (name, codec) in [("copy", None), ("recompress_zlib", Some(CompressionId::ZLIB))] {
        group.bench_function(name, |b| {
            b.iter(|| {
                blockdoc::compact_document_with(&input, &output, codec, &config).unwrap()
            })
        });
    }

    group.bench_function("default_config", |b| {
        b.iter(|| compact_document(&input, &output, None).unwrap())
    });

    group.finish();
}

criterion_group!(
    benches,
    block_benchmarks,
    document_benchmarks,
    compaction_benchmarks
);
criterion_main!(benches);
