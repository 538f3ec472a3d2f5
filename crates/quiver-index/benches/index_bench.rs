//! Index benchmarks: Arrow hydration throughput, compaction, adjacency scans.

use arrow::array::{ArrayRef, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use quiver_core::NOW;
use quiver_index::GraphIndex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Builds an Arrow IPC stream of `num_edges` random edges over `num_nodes`
/// node identifiers, chunked into batches of `batch_rows`.
fn random_edge_stream(num_nodes: usize, num_edges: usize, batch_rows: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let schema = Arc::new(Schema::new(vec![
        Field::new("source", DataType::Utf8, false),
        Field::new("target", DataType::Utf8, false),
        Field::new("type", DataType::Utf8, false),
        Field::new("valid_from", DataType::Int64, false),
        Field::new("valid_to", DataType::Int64, true),
    ]));

    let node_names: Vec<String> = (0..num_nodes).map(|i| format!("node-{i:08}")).collect();
    let etypes = ["CITES", "LINKS", "REFERS"];

    let mut buf = Vec::new();
    {
        let mut writer = StreamWriter::try_new(&mut buf, &schema).unwrap();
        let mut remaining = num_edges;
        while remaining > 0 {
            let rows = remaining.min(batch_rows);
            let mut sources = Vec::with_capacity(rows);
            let mut targets = Vec::with_capacity(rows);
            let mut types = Vec::with_capacity(rows);
            let mut from = Vec::with_capacity(rows);
            for _ in 0..rows {
                sources.push(node_names[rng.gen_range(0..num_nodes)].as_str());
                targets.push(node_names[rng.gen_range(0..num_nodes)].as_str());
                types.push(etypes[rng.gen_range(0..etypes.len())]);
                from.push(rng.gen_range(0..1_000_000i64));
            }
            let batch = RecordBatch::try_new(
                schema.clone(),
                vec![
                    Arc::new(StringArray::from(sources)) as ArrayRef,
                    Arc::new(StringArray::from(targets)),
                    Arc::new(StringArray::from(types)),
                    Arc::new(Int64Array::from(from)),
                    Arc::new(Int64Array::from(vec![None::<i64>; rows])),
                ],
            )
            .unwrap();
            writer.write(&batch).unwrap();
            remaining -= rows;
        }
        writer.finish().unwrap();
    }
    buf
}

fn bench_hydration(c: &mut Criterion) {
    const EDGES: usize = 100_000;
    let stream = random_edge_stream(10_000, EDGES, 8_192, 42);

    let mut group = c.benchmark_group("hydration");
    group.throughput(Throughput::Elements(EDGES as u64));
    group.bench_function("load_arrow_stream_100k", |b| {
        b.iter(|| {
            let mut index = GraphIndex::new();
            index.load_arrow_stream(black_box(&stream)).unwrap();
            black_box(index.edge_count())
        })
    });
    group.finish();
}

fn bench_compaction(c: &mut Criterion) {
    let stream = random_edge_stream(10_000, 100_000, 8_192, 42);
    let mut hydrated = GraphIndex::new();
    hydrated.load_arrow_stream(&stream).unwrap();

    c.bench_function("compact_100k", |b| {
        b.iter_batched(
            || hydrated.clone(),
            |mut index| {
                index.compact();
                black_box(index.edge_count())
            },
            criterion::BatchSize::LargeInput,
        )
    });
}

fn bench_adjacency_scan(c: &mut Criterion) {
    let stream = random_edge_stream(10_000, 100_000, 8_192, 42);
    let mut index = GraphIndex::new();
    index.load_arrow_stream(&stream).unwrap();
    index.compact();

    let cites = index.lookup_etype("CITES").unwrap();
    let seeds = index.resolve_seeds(&["node-00000000", "node-00000001", "node-00000002"]);

    c.bench_function("active_out_now", |b| {
        b.iter(|| {
            let mut total = 0;
            for &seed in &seeds {
                total += index.active_out(black_box(seed), cites, NOW).len();
            }
            black_box(total)
        })
    });
}

criterion_group!(benches, bench_hydration, bench_compaction, bench_adjacency_scan);
criterion_main!(benches);
