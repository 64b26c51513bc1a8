#![allow(missing_docs)]

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;

use hickle::{Hickle, MemStore, ObjId, Unpickler, ValueGraph};

const ROWS: usize = 256;

fn build_graph(rows: usize) -> (ValueGraph, ObjId) {
    let mut graph = ValueGraph::new();
    let mut items = Vec::with_capacity(rows);
    for i in 0..rows {
        let id_key = graph.text("id");
        let id_val = graph.int(i as i64);
        let name_key = graph.text("name");
        let name_val = graph.text(format!("row-{i}"));
        let vals_key = graph.text("vals");
        let vals: Vec<ObjId> = (0..32).map(|j| graph.int((i * j) as i64)).collect();
        let vals_val = graph.list(vals);
        items.push(graph.dict(vec![
            (id_key, id_val),
            (name_key, name_val),
            (vals_key, vals_val),
        ]));
    }
    let root = graph.list(items);
    (graph, root)
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(ROWS as u64));
    group.bench_function("encode_rows", |b| {
        b.iter(|| {
            let (mut graph, root) = build_graph(ROWS);
            let mut store = MemStore::new();
            Hickle::dump(&mut store, &mut graph, root, "/data").unwrap();
            black_box(store.len())
        })
    });
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let (mut graph, root) = build_graph(ROWS);
    let mut store = MemStore::new();
    Hickle::dump(&mut store, &mut graph, root, "/data").unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(ROWS as u64));
    group.bench_function("decode_rows", |b| {
        b.iter(|| {
            let mut unpickler = Unpickler::new(&store);
            let id = unpickler.decode_one("/data").unwrap();
            black_box(id)
        })
    });
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
