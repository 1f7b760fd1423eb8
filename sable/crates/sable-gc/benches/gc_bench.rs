//! Sable GC Benchmarks
//!
//! Allocation, finalizer registration and full collection cycles.
//! Run with: `cargo bench --package sable-gc`

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use sable_gc::{Class, CollectMode, Handle, Heap, HeapConfig, Token};
use std::rc::Rc;

struct Blob;

impl Class for Blob {
    fn name(&self) -> &str {
        "blob"
    }

    fn trace(&self, heap: &Heap, handle: Handle, visit: &mut dyn FnMut(Handle)) {
        if let Ok(refs) = heap.external::<Vec<Handle>>(handle) {
            refs.iter().copied().for_each(|child| visit(child));
        }
    }
}

fn create_heap() -> Heap {
    let config = HeapConfig {
        poison_on_free: false,
        mask_interrupts: false,
        ..Default::default()
    };
    Heap::new(config).unwrap()
}

/// Heap holding a rooted list of `live` pairs and `garbage` unrooted ones
fn populated_heap(live: usize, garbage: usize) -> Heap {
    let mut heap = create_heap();
    let mut head = None;
    for _ in 0..live {
        head = Some(heap.make_pair(None, head).unwrap());
    }
    heap.define("live", head).unwrap();
    for _ in 0..garbage {
        heap.make_pair(None, None).unwrap();
    }
    heap
}

fn noop_finalizer(_heap: &mut Heap, _target: Handle, _arg: Token) {}

fn bench_heap_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("heap_creation");

    group.bench_function("default_config", |b| {
        b.iter(|| black_box(Heap::new(HeapConfig::default()).unwrap()))
    });

    group.bench_function("config_validation", |b| {
        let config = HeapConfig::default();
        b.iter(|| black_box(config.validate()))
    });

    group.finish();
}

fn bench_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation");

    for &count in &[10usize, 100, 1000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_function(format!("pairs_{}", count), |b| {
            b.iter_batched(
                create_heap,
                |mut heap| {
                    for _ in 0..count {
                        black_box(heap.make_pair(None, None).unwrap());
                    }
                    heap
                },
                BatchSize::SmallInput,
            )
        });
    }

    let blob: Rc<dyn Class> = Rc::new(Blob);
    group.throughput(Throughput::Elements(100));
    group.bench_function("externals_100", |b| {
        b.iter_batched(
            create_heap,
            |mut heap| {
                for _ in 0..100 {
                    black_box(heap.make_external(Rc::clone(&blob), Vec::<Handle>::new()).unwrap());
                }
                heap
            },
            BatchSize::SmallInput,
        )
    });

    group.bench_function("alloc_free_reuse", |b| {
        let mut heap = create_heap();
        b.iter(|| {
            let pair = heap.make_pair(None, None).unwrap();
            heap.deallocate(black_box(pair)).unwrap();
        })
    });

    group.finish();
}

fn bench_finalizers(c: &mut Criterion) {
    let mut group = c.benchmark_group("finalizers");

    group.bench_function("register_1000", |b| {
        b.iter_batched(
            || {
                let mut heap = create_heap();
                let targets: Vec<Handle> = (0..1000)
                    .map(|_| heap.make_pair(None, None).unwrap())
                    .collect();
                (heap, targets)
            },
            |(mut heap, targets)| {
                for (i, &target) in targets.iter().enumerate() {
                    heap.add_finalizer(Some(target), noop_finalizer, Token(i as u64))
                        .unwrap();
                }
                heap
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

fn bench_collect(c: &mut Criterion) {
    let mut group = c.benchmark_group("collect");

    for &(live, garbage) in &[(1_000usize, 0usize), (1_000, 10_000), (10_000, 10_000)] {
        group.throughput(Throughput::Elements((live + garbage) as u64));
        group.bench_function(format!("purge_{}_live_{}_garbage", live, garbage), |b| {
            b.iter_batched(
                || populated_heap(live, garbage),
                |mut heap| {
                    black_box(heap.collect(CollectMode::Purge));
                    heap
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.bench_function("purge_steady_state", |b| {
        let mut heap = populated_heap(10_000, 0);
        b.iter(|| black_box(heap.collect(CollectMode::Purge)))
    });

    group.bench_function("teardown_10000", |b| {
        b.iter_batched(
            || populated_heap(5_000, 5_000),
            |mut heap| {
                black_box(heap.collect(CollectMode::Teardown));
                heap
            },
            BatchSize::LargeInput,
        )
    });

    group.finish();
}

fn bench_recount(c: &mut Criterion) {
    let mut group = c.benchmark_group("recount");

    let mut heap = populated_heap(10_000, 0);
    group.bench_function("list_10000", |b| b.iter(|| black_box(heap.recount())));

    group.finish();
}

criterion_group!(
    benches,
    bench_heap_creation,
    bench_allocation,
    bench_finalizers,
    bench_collect,
    bench_recount
);
criterion_main!(benches);
