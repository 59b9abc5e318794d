//! Hot-path benchmarks: read-side brackets, lookup, toggle, enqueue.

use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};

use quiesce_core::{List, ListNode, Rcu, Reader, Toggle};

fn bench_read_section(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_section");
    let reader = Reader::new();

    group.bench_function("lock_unlock", |b| {
        b.iter(|| {
            reader.lock();
            criterion::black_box(&reader);
            reader.unlock();
        });
    });

    group.bench_function("nested_2deep", |b| {
        b.iter(|| {
            reader.lock();
            reader.lock();
            criterion::black_box(&reader);
            reader.unlock();
            reader.unlock();
        });
    });

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let sizes: &[u32] = &[16, 64, 256, 1024];
    let mut group = c.benchmark_group("lookup");

    for &size in sizes {
        let list = List::new();
        // Even keys only, so odd probes always miss between nodes.
        for value in 0..size {
            list.toggle(value * 2);
        }

        group.bench_with_input(BenchmarkId::new("hit", size), &size, |b, &n| {
            b.iter(|| criterion::black_box(list.lookup(n)));
        });
        group.bench_with_input(BenchmarkId::new("miss", size), &size, |b, &n| {
            b.iter(|| criterion::black_box(list.lookup(n + 1)));
        });
    }

    group.finish();
}

fn bench_toggle_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("toggle_cycle");
    let list = List::new();
    for value in 0..512 {
        list.toggle(value * 2);
    }

    // Insert then remove an absent mid-list key. No readers exist, so the
    // unlinked node can be freed immediately.
    group.bench_function("insert_remove_mid", |b| {
        b.iter(|| {
            assert_eq!(list.toggle(257), Toggle::Inserted);
            match list.toggle(257) {
                Toggle::Removed(node) => ListNode::reclaim(node.as_ptr() as usize),
                Toggle::Inserted => unreachable!("key 257 was just inserted"),
            }
        });
    });

    group.finish();
}

fn bench_call_enqueue(c: &mut Criterion) {
    fn nop(_arg: usize) {}

    let mut group = c.benchmark_group("call_enqueue");

    group.bench_function("enqueue_100", |b| {
        b.iter_batched(
            Rcu::new,
            |rcu| {
                for _ in 0..100 {
                    // SAFETY: arg is not a pointer; nothing to own.
                    unsafe { rcu.call(nop, 0) }.expect("enqueue failed");
                }
                rcu
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_read_section,
    bench_lookup,
    bench_toggle_cycle,
    bench_call_enqueue
);
criterion_main!(benches);
