//! Benchmarks for block and fragment packing throughput

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use sqfs_pack::{CompressionConfig, ImageWriter, Packer, Tree};
use std::io::Cursor;

const BLOCK_SIZE: u32 = 128 * 1024;

/// Half random, half repeated text so compressors have something to do
fn sample_data(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let text = b"usr/share/doc/packages/README ";
    (0..len)
        .map(|i| {
            if (i / 4096) % 2 == 0 {
                rng.gen()
            } else {
                text[i % text.len()]
            }
        })
        .collect()
}

fn pack_files(config: &CompressionConfig, contents: &[Vec<u8>]) -> u64 {
    let mut tree = Tree::new();
    let mut ids = Vec::new();
    for (i, content) in contents.iter().enumerate() {
        let name = format!("file{}", i);
        let node = tree
            .add_file(tree.root(), &name, &name, content.len() as u64)
            .unwrap();
        ids.push(tree.file_id(node).unwrap());
    }

    let (_, files) = tree.split_mut();
    let mut packer = Packer::new(
        BLOCK_SIZE,
        config.build().unwrap(),
        ImageWriter::new(Vec::new()),
    )
    .unwrap();
    for (id, content) in ids.iter().zip(contents) {
        packer
            .process_reader(files, *id, &mut Cursor::new(content))
            .unwrap();
    }
    packer.finish(files).unwrap().bytes_used
}

fn benchmark_large_files(c: &mut Criterion) {
    let mut group = c.benchmark_group("pack_large_files");
    let contents: Vec<Vec<u8>> = (0..4).map(|i| sample_data(4 * 1024 * 1024, i)).collect();
    let total: usize = contents.iter().map(Vec::len).sum();
    group.throughput(Throughput::Bytes(total as u64));

    for (name, config) in [
        ("none", CompressionConfig::none()),
        ("lz4", CompressionConfig::lz4()),
        ("zstd", CompressionConfig::zstd()),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &config, |b, config| {
            b.iter(|| black_box(pack_files(config, &contents)));
        });
    }

    group.finish();
}

fn benchmark_small_files(c: &mut Criterion) {
    let mut group = c.benchmark_group("pack_small_files");

    for count in [100usize, 1000, 5000].iter() {
        let mut rng = StdRng::seed_from_u64(*count as u64);
        let contents: Vec<Vec<u8>> = (0..*count)
            .map(|i| sample_data(rng.gen_range(1..16 * 1024), i as u64))
            .collect();
        let config = CompressionConfig::lz4();

        group.bench_with_input(BenchmarkId::from_parameter(count), &contents, |b, contents| {
            b.iter(|| black_box(pack_files(&config, contents)));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_large_files, benchmark_small_files);
criterion_main!(benches);
