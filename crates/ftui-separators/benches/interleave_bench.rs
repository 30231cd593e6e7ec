//! Benchmarks for incremental separator upkeep vs full rebuild.
//!
//! Run with: cargo bench -p ftui-separators --bench interleave_bench
//!
//! Expected results:
//!
//! | Scenario              | Rebuild work | Incremental work |
//! |-----------------------|--------------|------------------|
//! | Append one element    | 2N mutations | 1 separator      |
//! | Remove one element    | 2N mutations | 1 separator      |
//! | Template swap         | 2N mutations | n/a              |

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use ftui_separators::{
    Container, Dispatcher, Element, LabelTemplate, SeparatorSynchronizer, SyncConfig,
};

// ============================================================================
// Setup helpers
// ============================================================================

/// Attached synchronizer over `n` elements, already interleaved.
fn setup(n: usize) -> (Dispatcher, Container, SeparatorSynchronizer) {
    let dispatcher = Dispatcher::new();
    let container = Container::from_elements((0..n).map(|i| Element::new(format!("row{i}"))));
    let sync = SeparatorSynchronizer::new(&dispatcher)
        .with_config(SyncConfig::default())
        .with_factory(LabelTemplate::new("─"));
    sync.attach(&container);
    (dispatcher, container, sync)
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("separators_append");
    for n in [16usize, 256, 2048] {
        group.bench_with_input(BenchmarkId::new("incremental", n), &n, |b, &n| {
            let (dispatcher, container, _sync) = setup(n);
            b.iter(|| {
                let element = Element::new("tail");
                container.push(element.clone()).unwrap();
                dispatcher.drain();
                container.remove(&element).unwrap();
                dispatcher.drain();
                black_box(container.len())
            });
        });

        group.bench_with_input(BenchmarkId::new("rebuild", n), &n, |b, &n| {
            let (_dispatcher, container, sync) = setup(n);
            b.iter(|| {
                sync.refresh(true);
                black_box(container.len())
            });
        });
    }
    group.finish();
}

fn bench_front_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("separators_front_insert");
    for n in [16usize, 256, 2048] {
        group.bench_with_input(BenchmarkId::new("incremental", n), &n, |b, &n| {
            let (dispatcher, container, _sync) = setup(n);
            b.iter(|| {
                let element = Element::new("head");
                container.insert_at(0, element.clone()).unwrap();
                dispatcher.drain();
                container.remove(&element).unwrap();
                dispatcher.drain();
                black_box(container.len())
            });
        });
    }
    group.finish();
}

fn bench_template_swap(c: &mut Criterion) {
    let mut group = c.benchmark_group("separators_template_swap");
    for n in [16usize, 256, 2048] {
        group.bench_with_input(BenchmarkId::new("set_separator_factory", n), &n, |b, &n| {
            let (_dispatcher, container, sync) = setup(n);
            let mut flip = false;
            b.iter(|| {
                flip = !flip;
                sync.set_separator_factory(LabelTemplate::new(if flip { "═" } else { "─" }));
                black_box(container.len())
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_append,
    bench_front_insert,
    bench_template_swap
);
criterion_main!(benches);
