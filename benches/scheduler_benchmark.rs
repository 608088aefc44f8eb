use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use distmatch::scheduler::{AdaptiveScheduler, DocidRangeScheduler, PartitionScheduler, TaskScheduler};

/// Drains every range a scheduler hands out to `num_threads` workers, round
/// robin, as a stand-in for the real match loop's per-doc work.
fn drain(scheduler: &dyn DocidRangeScheduler, num_threads: usize) -> u64 {
    let mut total = 0u64;
    for tid in 0..num_threads {
        let mut range = scheduler.first_range(tid);
        while !range.is_empty() {
            total += range.size() as u64;
            range = scheduler.next_range(tid);
        }
    }
    total
}

fn bench_partition_scheduler(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition_scheduler");
    for num_threads in [1usize, 4, 16].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(num_threads), num_threads, |b, &num_threads| {
            b.iter(|| {
                let scheduler = PartitionScheduler::new(1_000_000, num_threads);
                black_box(drain(&scheduler, num_threads));
            });
        });
    }
    group.finish();
}

fn bench_task_scheduler(c: &mut Criterion) {
    let mut group = c.benchmark_group("task_scheduler");
    for num_tasks in [16usize, 64, 256].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(num_tasks), num_tasks, |b, &num_tasks| {
            b.iter(|| {
                let scheduler = TaskScheduler::new(1_000_000, 8, num_tasks);
                black_box(drain(&scheduler, 8));
            });
        });
    }
    group.finish();
}

fn bench_adaptive_scheduler(c: &mut Criterion) {
    let mut group = c.benchmark_group("adaptive_scheduler");
    for min_task in [100u32, 1000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(min_task), min_task, |b, &min_task| {
            b.iter(|| {
                let scheduler = AdaptiveScheduler::new(1_000_000, 8, min_task);
                black_box(drain(&scheduler, 8));
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_partition_scheduler, bench_task_scheduler, bench_adaptive_scheduler);
criterion_main!(benches);
