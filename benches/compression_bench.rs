use criterion::{black_box, criterion_group, criterion_main, Criterion};
use packvault::codec::{compress_bytes, decompress_bytes, CodecId};
use packvault::container::{pack, ContainerFormat};
use packvault::record::FileRecord;
use std::io::Cursor;

fn text_corpus(len: usize) -> Vec<u8> {
    b"the quick brown fox jumps over the lazy dog. "
        .iter()
        .copied()
        .cycle()
        .take(len)
        .collect()
}

fn bench_compression(c: &mut Criterion) {
    // The greedy LZ77 match search is O(n * window); keep the corpus small
    // enough for sane iteration times.
    let data = text_corpus(64 * 1024);

    c.bench_function("huffman_compress_64k", |b| {
        b.iter(|| compress_bytes(CodecId::Huffman, black_box(&data)).unwrap())
    });
    c.bench_function("lz77_compress_64k", |b| {
        b.iter(|| compress_bytes(CodecId::Lz77, black_box(&data)).unwrap())
    });

    let huff = compress_bytes(CodecId::Huffman, &data).unwrap();
    let lz = compress_bytes(CodecId::Lz77, &data).unwrap();
    c.bench_function("huffman_decompress_64k", |b| {
        b.iter(|| decompress_bytes(CodecId::Huffman, black_box(&huff), data.len() as u64).unwrap())
    });
    c.bench_function("lz77_decompress_64k", |b| {
        b.iter(|| decompress_bytes(CodecId::Lz77, black_box(&lz), data.len() as u64).unwrap())
    });
}

fn bench_pack(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bench.bin"), text_corpus(1024 * 1024)).unwrap();
    let entries = vec![FileRecord::synthetic("bench.bin", 1024 * 1024)];

    for format in [ContainerFormat::Custom, ContainerFormat::Tar, ContainerFormat::Zip] {
        c.bench_function(&format!("pack_1mb_{}", format.name()), |b| {
            b.iter(|| {
                let mut buf = Cursor::new(Vec::new());
                pack(&mut buf, dir.path(), black_box(&entries), format).unwrap();
                buf
            })
        });
    }
}

criterion_group!(benches, bench_compression, bench_pack);
criterion_main!(benches);
