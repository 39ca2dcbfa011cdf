use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use reftrack_cache::{Node, ReferenceCache, ScopeId};
use serde_json::{Value, json};

fn wide_graph(items: usize) -> Value {
    let list: Vec<Value> = (0..items)
        .map(|i| json!({"id": format!("C{}", i % (items / 2 + 1)), "title": i, "tags": ["a", "b"]}))
        .collect();
    json!({"id": "E1", "items": list})
}

fn deep_graph(depth: usize) -> Value {
    let mut node = json!({"id": format!("D{depth}")});
    for level in (0..depth).rev() {
        node = json!({"id": format!("D{level}"), "child": node, "meta": {"level": level}});
    }
    node
}

fn bench_add_reference(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_reference");

    for size in [100, 1_000] {
        let graph = wide_graph(size);
        group.bench_with_input(BenchmarkId::new("wide", size), &graph, |b, graph| {
            b.iter(|| {
                let mut cache = ReferenceCache::default();
                let scope = ScopeId::named("bench");
                black_box(cache.add_reference(&Node::from(graph.clone()), &scope));
            })
        });
    }

    for depth in [50, 200] {
        let graph = deep_graph(depth);
        group.bench_with_input(BenchmarkId::new("deep", depth), &graph, |b, graph| {
            b.iter(|| {
                let mut cache = ReferenceCache::default();
                let scope = ScopeId::named("bench");
                black_box(cache.add_reference(&Node::from(graph.clone()), &scope));
            })
        });
    }

    group.finish();
}

fn bench_update(c: &mut Criterion) {
    let mut cache = ReferenceCache::default();
    cache.add_reference(&Node::from(wide_graph(1_000)), &ScopeId::named("bench"));
    let event = Node::from(json!({"title": "pushed"}));

    c.bench_function("update_wide_entity", |b| {
        b.iter(|| black_box(cache.update("E1", &event)))
    });
}

criterion_group!(benches, bench_add_reference, bench_update);
criterion_main!(benches);
