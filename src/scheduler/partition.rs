use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::types::DocidRange;

use super::{DocidRangeScheduler, IdleObserver};

/// Splits `[1, doc_id_limit)` into `num_threads` equal slices once; each thread
/// receives exactly one range and every subsequent call returns empty. No
/// coordination between threads is needed.
pub struct PartitionScheduler {
    ranges: Vec<DocidRange>,
    consumed: Vec<AtomicBool>,
    handed_out: Vec<AtomicU32>,
}

impl PartitionScheduler {
    pub fn new(doc_id_limit: u32, num_threads: usize) -> Self {
        let span = DocidRange::new(1, doc_id_limit.max(1));
        let ranges = span.split(num_threads as u32);
        let consumed = (0..num_threads).map(|_| AtomicBool::new(false)).collect();
        let handed_out = (0..num_threads).map(|_| AtomicU32::new(0)).collect();
        PartitionScheduler { ranges, consumed, handed_out }
    }
}

impl DocidRangeScheduler for PartitionScheduler {
    fn first_range(&self, tid: usize) -> DocidRange {
        self.next_range(tid)
    }

    fn next_range(&self, tid: usize) -> DocidRange {
        if self.consumed[tid].swap(true, Ordering::AcqRel) {
            return DocidRange::empty();
        }
        let range = self.ranges[tid];
        self.handed_out[tid].store(range.size(), Ordering::Relaxed);
        range
    }

    fn share_range(&self, _tid: usize, remaining: DocidRange) -> DocidRange {
        remaining
    }

    fn total_size(&self, tid: usize) -> u32 {
        self.handed_out[tid].load(Ordering::Relaxed)
    }

    fn unassigned_size(&self) -> u32 {
        self.ranges
            .iter()
            .enumerate()
            .filter(|(tid, _)| !self.consumed[*tid].load(Ordering::Relaxed))
            .map(|(_, r)| r.size())
            .sum()
    }

    fn total_span(&self, tid: usize) -> u32 {
        self.ranges[tid].size()
    }

    fn idle_observer(&self) -> IdleObserver {
        IdleObserver::constant_zero()
    }
}
