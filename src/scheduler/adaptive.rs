use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::types::DocidRange;

use super::{DocidRangeScheduler, IdleObserver};

struct Inner {
    /// Range currently held by each thread but not yet handed out via
    /// `next_range`/donation. Empty means the thread has nothing waiting.
    ranges: Vec<DocidRange>,
    idle: HashSet<usize>,
}

/// Work-stealing scheduler. Starts from an even partition; a thread that runs dry
/// blocks on a condition variable in the idle set, and an active thread with a
/// large-enough remainder can `share_range` pieces of it to idle peers.
pub struct AdaptiveScheduler {
    num_threads: usize,
    min_task: u32,
    state: Mutex<Inner>,
    condvar: Condvar,
    idle_count: Arc<AtomicUsize>,
    handed_out: Vec<AtomicU32>,
    original_span: Vec<u32>,
}

impl AdaptiveScheduler {
    pub fn new(doc_id_limit: u32, num_threads: usize, min_task: u32) -> Self {
        let span = DocidRange::new(1, doc_id_limit.max(1));
        let parts = span.split(num_threads as u32);
        let original_span = parts.iter().map(|p| p.size()).collect();
        AdaptiveScheduler {
            num_threads,
            min_task: min_task.max(1),
            state: Mutex::new(Inner { ranges: parts, idle: HashSet::new() }),
            condvar: Condvar::new(),
            idle_count: Arc::new(AtomicUsize::new(0)),
            handed_out: (0..num_threads).map(|_| AtomicU32::new(0)).collect(),
            original_span,
        }
    }

    fn record_handout(&self, tid: usize, range: DocidRange) {
        if !range.is_empty() {
            self.handed_out[tid].fetch_add(range.size(), Ordering::Relaxed);
        }
    }
}

impl DocidRangeScheduler for AdaptiveScheduler {
    fn first_range(&self, tid: usize) -> DocidRange {
        self.next_range(tid)
    }

    fn next_range(&self, tid: usize) -> DocidRange {
        let mut inner = self.state.lock();
        loop {
            if !inner.ranges[tid].is_empty() {
                let r = inner.ranges[tid];
                inner.ranges[tid] = DocidRange::empty();
                drop(inner);
                self.record_handout(tid, r);
                return r;
            }

            inner.idle.insert(tid);
            self.idle_count.store(inner.idle.len(), Ordering::Relaxed);

            if inner.idle.len() == self.num_threads {
                // Every thread is now idle: release everyone with empty ranges.
                self.condvar.notify_all();
                return DocidRange::empty();
            }

            self.condvar.wait(&mut inner);

            if !inner.idle.contains(&tid) {
                // We were woken by a donation that already removed us from idle;
                // loop around to pick up `ranges[tid]`.
                continue;
            }
            if inner.ranges[tid].is_empty() && inner.idle.len() == self.num_threads {
                // Woken by the all-idle finalize broadcast.
                return DocidRange::empty();
            }
        }
    }

    fn share_range(&self, tid: usize, remaining: DocidRange) -> DocidRange {
        if remaining.size() < self.min_task * 2 {
            return remaining;
        }
        let mut inner = self.state.lock();
        if inner.idle.is_empty() {
            return remaining;
        }
        let max_parts = remaining.size() / self.min_task;
        if max_parts <= 1 {
            return remaining;
        }
        let parts = (inner.idle.len() as u32 + 1).min(max_parts);
        if parts <= 1 {
            return remaining;
        }
        let pieces = remaining.split(parts);
        let keep = pieces[0];
        let idle_targets: Vec<usize> = inner.idle.iter().copied().take(pieces.len() - 1).collect();
        for (donee, piece) in idle_targets.iter().zip(pieces[1..].iter()) {
            inner.ranges[*donee] = *piece;
            inner.idle.remove(donee);
        }
        self.idle_count.store(inner.idle.len(), Ordering::Relaxed);
        drop(inner);
        self.condvar.notify_all();
        for (donee, piece) in idle_targets.iter().zip(pieces[1..].iter()) {
            self.record_handout(*donee, *piece);
        }
        keep
    }

    fn total_size(&self, tid: usize) -> u32 {
        self.handed_out[tid].load(Ordering::Relaxed)
    }

    fn unassigned_size(&self) -> u32 {
        let inner = self.state.lock();
        inner.ranges.iter().map(|r| r.size()).sum()
    }

    fn total_span(&self, tid: usize) -> u32 {
        self.original_span[tid]
    }

    fn idle_observer(&self) -> IdleObserver {
        IdleObserver::backed_by(self.idle_count.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::tests::assert_partitions_exactly;
    use std::thread;

    #[test]
    fn partitions_cover_every_docid_exactly_once_single_threaded_drive() {
        let s = AdaptiveScheduler::new(1001, 4, 1);
        assert_partitions_exactly(&s, 4, 1001);
    }

    #[test]
    fn share_range_donates_to_idle_peers() {
        let s = AdaptiveScheduler::new(1_000_001, 4, 1);
        // Threads 1..3 immediately exhaust their tiny slices and go idle.
        for tid in 1..4 {
            let r = s.first_range(tid);
            assert!(!r.is_empty());
            assert!(s.next_range(tid).is_empty());
        }
        assert_eq!(s.idle_observer().idle_count(), 3);

        // Thread 0 holds a huge remainder and shares it.
        let mine = s.first_range(0);
        let kept = s.share_range(0, mine);
        assert!(kept.size() < mine.size());
        assert_eq!(s.idle_observer().idle_count(), 0);
    }

    #[test]
    fn small_remainder_is_not_shared() {
        let s = AdaptiveScheduler::new(101, 2, 50);
        let r0 = s.first_range(0);
        // thread 1 goes idle
        assert!(s.next_range(1).is_empty());
        let kept = s.share_range(0, r0);
        assert_eq!(kept, r0);
    }

    #[test]
    fn adaptive_scheduler_terminates_under_concurrent_drive() {
        let s = Arc::new(AdaptiveScheduler::new(200_001, 4, 4));
        let handles: Vec<_> = (0..4)
            .map(|tid| {
                let s = s.clone();
                thread::spawn(move || {
                    let mut covered = 0u64;
                    let mut range = s.first_range(tid);
                    loop {
                        if range.is_empty() {
                            range = s.next_range(tid);
                            if range.is_empty() {
                                break;
                            }
                            continue;
                        }
                        covered += range.size() as u64;
                        range = s.share_range(tid, DocidRange::empty());
                        let _ = range; // no local remainder to keep in this drive
                        range = s.next_range(tid);
                    }
                    covered
                })
            })
            .collect();
        let total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 200_000);
    }
}
