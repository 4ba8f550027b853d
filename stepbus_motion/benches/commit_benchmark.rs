//! Commit-path benchmark: cost of one guarded read-modify-write plus
//! simulated transmission, across register populations.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use stepbus_motion::drivers::SimulationSink;
use stepbus_motion::register::{RegisterAllocator, RegisterBus};
use stepbus_motion::sequence::HALF_STEP_CCW;

fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("register_commit");

    for motors in [1u32, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(motors), &motors, |b, &motors| {
            let mut allocator = RegisterAllocator::new(32).unwrap();
            let fields: Vec<_> = (0..motors).map(|_| allocator.allocate().unwrap()).collect();
            let bus = RegisterBus::new(Box::new(SimulationSink::new()), 32);

            let mut cursor = 0usize;
            b.iter(|| {
                cursor = (cursor + 1) % HALF_STEP_CCW.len();
                for field in &fields {
                    bus.commit(*field, HALF_STEP_CCW[cursor]).unwrap();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_commit);
criterion_main!(benches);
