use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::types::DocidRange;

use super::{DocidRangeScheduler, IdleObserver};

/// Splits `[1, doc_id_limit)` into `num_tasks` fixed slices; a shared counter
/// guarded by a mutex assigns the next slice, in increasing-docid order, to
/// whichever thread calls `next_range` first.
pub struct TaskScheduler {
    tasks: Vec<DocidRange>,
    next_task: Mutex<usize>,
    handed_out: Vec<AtomicU32>,
    unassigned: AtomicU32,
}

impl TaskScheduler {
    pub fn new(doc_id_limit: u32, num_threads: usize, num_tasks: usize) -> Self {
        let span = DocidRange::new(1, doc_id_limit.max(1));
        let tasks = span.split(num_tasks.max(1) as u32);
        let total: u32 = tasks.iter().map(|t| t.size()).sum();
        TaskScheduler {
            tasks,
            next_task: Mutex::new(0),
            handed_out: (0..num_threads).map(|_| AtomicU32::new(0)).collect(),
            unassigned: AtomicU32::new(total),
        }
    }

    fn take_next(&self, tid: usize) -> DocidRange {
        let mut idx = self.next_task.lock();
        if *idx >= self.tasks.len() {
            return DocidRange::empty();
        }
        let range = self.tasks[*idx];
        *idx += 1;
        drop(idx);
        self.handed_out[tid].fetch_add(range.size(), Ordering::Relaxed);
        self.unassigned.fetch_sub(range.size(), Ordering::Relaxed);
        range
    }
}

impl DocidRangeScheduler for TaskScheduler {
    fn first_range(&self, tid: usize) -> DocidRange {
        self.take_next(tid)
    }

    fn next_range(&self, tid: usize) -> DocidRange {
        self.take_next(tid)
    }

    fn share_range(&self, _tid: usize, remaining: DocidRange) -> DocidRange {
        remaining
    }

    fn total_size(&self, tid: usize) -> u32 {
        self.handed_out[tid].load(Ordering::Relaxed)
    }

    fn unassigned_size(&self) -> u32 {
        self.unassigned.load(Ordering::Relaxed)
    }

    fn total_span(&self, tid: usize) -> u32 {
        self.total_size(tid)
    }

    fn idle_observer(&self) -> IdleObserver {
        IdleObserver::constant_zero()
    }
}
