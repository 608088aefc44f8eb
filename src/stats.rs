//! Aggregate statistics the match master rolls up across threads for one
//! request, and the matcher accumulates across requests for adaptive tuning.

use std::time::Duration;

/// One thread's contribution, merged into [`MatchingStats`] by the master.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadStats {
    pub docs_matched: u64,
    pub docs_searched: u64,
    pub active_time: Duration,
    pub wait_time: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct MatchingStats {
    pub docs_matched: u64,
    pub docs_searched: u64,
    pub num_threads: usize,
    pub active_time_total: Duration,
    pub wait_time_total: Duration,
    pub soft_doomed: bool,
    pub match_phase_limited: bool,
}

impl MatchingStats {
    pub fn merge(&mut self, thread: &ThreadStats) {
        self.docs_matched += thread.docs_matched;
        self.docs_searched += thread.docs_searched;
        self.num_threads += 1;
        self.active_time_total += thread.active_time;
        self.wait_time_total += thread.wait_time;
    }

    /// Mean of per-thread `active_time`, used to drive the matcher's adaptive
    /// soft-timeout factor (§4.10): skewed toward the slowest thread is
    /// avoided by averaging across every thread rather than using only thread 0.
    pub fn average_active_time(&self) -> Duration {
        if self.num_threads == 0 {
            Duration::ZERO
        } else {
            self.active_time_total / self.num_threads as u32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_accumulates_across_threads() {
        let mut stats = MatchingStats::default();
        stats.merge(&ThreadStats { docs_matched: 10, docs_searched: 100, active_time: Duration::from_millis(5), wait_time: Duration::ZERO });
        stats.merge(&ThreadStats { docs_matched: 20, docs_searched: 200, active_time: Duration::from_millis(15), wait_time: Duration::ZERO });
        assert_eq!(stats.docs_matched, 30);
        assert_eq!(stats.num_threads, 2);
        assert_eq!(stats.average_active_time(), Duration::from_millis(10));
    }
}
