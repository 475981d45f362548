use std::hint::black_box;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use spillway_common::{SpillConfig, Tuple, Value};
use spillway_core::collect::{SpillableTupleList, SpillableTupleMap};

const ROWS: i64 = 50_000;

fn row(i: i64) -> Tuple {
    Tuple::from(vec![
        Value::from(i),
        Value::from(format!("name_{i:06}")),
        Value::from(i as f64 * 0.5),
    ])
}

fn config(codec: Option<&str>) -> SpillConfig {
    let config = SpillConfig::default().with_list_threshold(4_096);
    match codec {
        Some(name) => config.with_codec(name),
        None => config.with_compression(false),
    }
}

fn bench_list_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_append");
    for (label, codec) in [("plain", None), ("lz4", Some("lz4")), ("zstd", Some("zstd"))] {
        group.bench_function(label, |b| {
            b.iter_batched(
                || SpillableTupleList::new(&config(codec)).unwrap(),
                |mut list| {
                    for i in 0..ROWS {
                        list.append(row(i)).unwrap();
                    }
                    black_box(list.segment_count())
                },
                BatchSize::PerIteration,
            );
        });
    }
    group.finish();
}

fn bench_list_iterate(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_iterate");
    for (label, codec) in [("plain", None), ("lz4", Some("lz4"))] {
        let mut list = SpillableTupleList::new(&config(codec)).unwrap();
        list.append_all((0..ROWS).map(row)).unwrap();

        group.bench_function(label, |b| {
            b.iter(|| {
                let mut n = 0usize;
                for tuple in list.iter().unwrap() {
                    black_box(tuple.unwrap());
                    n += 1;
                }
                n
            });
        });
    }
    group.finish();
}

fn bench_map_put(c: &mut Criterion) {
    c.bench_function("map_put_1k_keys", |b| {
        let config = SpillConfig::default()
            .with_map_threshold(8_192)
            .with_map_initial_capacity(2_048)
            .with_compression(false);
        b.iter_batched(
            || SpillableTupleMap::new(&config).unwrap(),
            |mut map| {
                for i in 0..ROWS {
                    map.put(Tuple::single(i % 1_000), row(i)).unwrap();
                }
                black_box(map.segment_count())
            },
            BatchSize::PerIteration,
        );
    });
}

criterion_group!(benches, bench_list_append, bench_list_iterate, bench_map_put);
criterion_main!(benches);
