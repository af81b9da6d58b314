// Store throughput: batched symbol inserts, USR lookups and worker-store merges

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use cxxd::store::{SymbolKind, SymbolRecord, SymbolStore};
use tempfile::TempDir;

fn records(files: usize, per_file: usize) -> Vec<SymbolRecord> {
    let mut out = Vec::with_capacity(files * per_file);
    for f in 0..files {
        for s in 0..per_file {
            out.push(SymbolRecord {
                file: format!("src/file_{}.cpp", f),
                line: (s + 1) as u32,
                column: 5,
                usr: format!("c:@N@bench@F@function_{}", s % 200),
                context: format!("int function_{}(int value) {{ return value; }}", s),
                kind: SymbolKind::Function,
                is_definition: f == 0,
            });
        }
    }
    out
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_symbol_batch");

    for size in [100usize, 1_000, 10_000] {
        let batch = records(size / 100, 100);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &batch, |b, batch| {
            b.iter_with_setup(
                || {
                    let dir = TempDir::new().unwrap();
                    let store = SymbolStore::create(dir.path().join("bench.db")).unwrap();
                    (dir, store)
                },
                |(_dir, store)| black_box(store.insert_symbol_batch(batch).unwrap()),
            );
        });
    }

    group.finish();
}

fn bench_fetch_by_usr(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let store = SymbolStore::create(dir.path().join("bench.db")).unwrap();
    store.insert_symbol_batch(&records(100, 200)).unwrap();

    c.bench_function("fetch_by_usr", |b| {
        b.iter(|| black_box(store.fetch_by_usr("c:@N@bench@F@function_42").unwrap()))
    });

    c.bench_function("fetch_definition_by_usr", |b| {
        b.iter(|| black_box(store.fetch_definition_by_usr("c:@N@bench@F@function_42").unwrap()))
    });
}

fn bench_merge(c: &mut Criterion) {
    let source_dir = TempDir::new().unwrap();
    let source = SymbolStore::create(source_dir.path().join("worker.db")).unwrap();
    source.insert_symbol_batch(&records(50, 100)).unwrap();

    c.bench_function("merge_worker_store", |b| {
        b.iter_with_setup(
            || {
                let dir = TempDir::new().unwrap();
                let canonical = SymbolStore::create(dir.path().join("canonical.db")).unwrap();
                (dir, canonical)
            },
            |(_dir, canonical)| black_box(canonical.merge_from(&source).unwrap()),
        );
    });
}

criterion_group!(benches, bench_insert, bench_fetch_by_usr, bench_merge);
criterion_main!(benches);
