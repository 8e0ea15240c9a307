use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ipgeo::source::{IterSource, Row};
use ipgeo::{BuildOptions, SnapshotBuilder};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::hint::black_box;
use std::net::Ipv4Addr;

fn rows(count: usize, duplicate_every: usize) -> Vec<Row> {
    let mut rng = StdRng::seed_from_u64(42);
    let mut rows: Vec<Row> = Vec::with_capacity(count);
    for i in 0..count {
        if duplicate_every > 0 && i > 0 && i % duplicate_every == 0 {
            rows.push(rows[i - 1].clone());
            continue;
        }
        let addr = Ipv4Addr::from(rng.random::<u32>());
        let len = [16u8, 20, 24, 32][i % 4];
        let mut row = Row::new();
        row.insert("cidr".to_string(), format!("{}/{}", addr, len));
        row.insert("country".to_string(), format!("country_{}", i % 200));
        row.insert("city".to_string(), format!("city_{}", i));
        row.insert("latitude".to_string(), "52.52".to_string());
        row.insert("longitude".to_string(), "13.40".to_string());
        row.insert("asn".to_string(), (i % 65535).to_string());
        row.insert("timezone".to_string(), "Europe/Berlin".to_string());
        rows.push(row);
    }
    rows
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    group.sample_size(20);

    for count in [1_000usize, 10_000, 50_000] {
        for (label, duplicate_every) in [("unique", 0usize), ("dup_10pct", 10)] {
            let source = IterSource::new(rows(count, duplicate_every));
            group.throughput(Throughput::Elements(count as u64));
            group.bench_with_input(BenchmarkId::new(label, count), &source, |b, source| {
                b.iter(|| {
                    let mut builder = SnapshotBuilder::new(BuildOptions::default());
                    builder.load(source).unwrap();
                    black_box(builder.finish().unwrap());
                });
            });
        }
    }

    group.finish();
}

fn bench_snapshot_encode(c: &mut Criterion) {
    let mut builder = SnapshotBuilder::new(BuildOptions::default());
    builder.load(&IterSource::new(rows(10_000, 0))).unwrap();
    let (snapshot, _) = builder.finish().unwrap();
    let bytes = snapshot.to_bytes().unwrap();

    let mut group = c.benchmark_group("snapshot");
    group.sample_size(20);
    group.bench_function("to_bytes", |b| {
        b.iter(|| black_box(snapshot.to_bytes().unwrap()))
    });
    group.bench_function("from_bytes", |b| {
        b.iter(|| black_box(ipgeo::Snapshot::from_bytes(black_box(&bytes)).unwrap()))
    });
    group.finish();
}

criterion_group!(benches, bench_build, bench_snapshot_encode);
criterion_main!(benches);
