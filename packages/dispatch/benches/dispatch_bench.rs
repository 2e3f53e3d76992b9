//! Benchmark: queue and dispatch throughput
//!
//! - `bound_queue`: push N demands then pop them all, FIFO vs priority policy
//! - `dispatch`: N demands through a running single-thread dispatcher,
//!   measured until the last handler has run

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use crossbeam_channel::bounded;
use custom_queue_dispatch::{
    AgentPriorities, AgentRef, BoundQueue, Demand, Dispatcher, DispatcherConfig, Priority,
    SingleThreadDispatcher,
};

struct Ping;

fn bench_bound_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("bound_queue");
    let agent = AgentRef::new("bench");

    for size in [100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("fifo", size), &size, |b, &size| {
            b.iter(|| {
                let queue = BoundQueue::new();
                for _ in 0..size {
                    queue.push(Demand::message::<Ping, _>(agent.clone(), || Ok(()))).unwrap();
                }
                while let Some(demand) = queue.try_pop() {
                    black_box(demand);
                }
            });
        });

        let priorities = AgentPriorities::new();
        priorities.define_priority::<Ping>(&agent, Priority::High);
        group.bench_with_input(BenchmarkId::new("priority", size), &size, |b, &size| {
            b.iter(|| {
                let queue = BoundQueue::with_policy(priorities.queue());
                for _ in 0..size {
                    queue.push(Demand::message::<Ping, _>(agent.clone(), || Ok(()))).unwrap();
                }
                while let Some(demand) = queue.try_pop() {
                    black_box(demand);
                }
            });
        });
    }

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");

    let dispatcher = SingleThreadDispatcher::new(DispatcherConfig::named("bench")).unwrap();
    let agent = AgentRef::new("bench");
    let handle = dispatcher.bind(&agent).unwrap();
    dispatcher.start().unwrap();

    for size in [100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("single_thread", size), &size, |b, &size| {
            b.iter(|| {
                let (tx, rx) = bounded(1);
                for _ in 0..size - 1 {
                    handle.send_message::<Ping, _>(|| Ok(())).unwrap();
                }
                handle
                    .send_message::<Ping, _>(move || {
                        tx.send(())?;
                        Ok(())
                    })
                    .unwrap();
                rx.recv().unwrap();
            });
        });
    }

    group.finish();
    dispatcher.shutdown(true).unwrap();
}

criterion_group!(benches, bench_bound_queue, bench_dispatch);
criterion_main!(benches);
