//! Query limiter: an admission gate bounding how many "expensive" queries
//! (sorting or grouping, and estimated to touch many hits) run concurrently.
//! Grounded on the reference matcher's token-bucket-style admission gate.

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::types::Doom;

struct Inner {
    active_threads: i32,
}

/// RAII admission token. Holding one counts against `max_threads`; dropping it
/// releases the slot. A non-expensive query gets a token that costs nothing.
pub struct Token<'a> {
    limiter: Option<&'a QueryLimiter>,
}

impl Drop for Token<'_> {
    fn drop(&mut self) {
        if let Some(limiter) = self.limiter {
            limiter.release_token();
        }
    }
}

pub struct QueryLimiter {
    inner: Mutex<Inner>,
    condvar: Condvar,
    max_threads: AtomicI32,
    min_hits: AtomicU32,
    /// Advisory only: informs callers what coverage tradeoff admission implies,
    /// never consulted by `grab_token` itself.
    coverage: Mutex<f64>,
}

impl QueryLimiter {
    pub fn new(max_threads: i32, min_hits: u32, coverage: f64) -> Self {
        QueryLimiter {
            inner: Mutex::new(Inner { active_threads: 0 }),
            condvar: Condvar::new(),
            max_threads: AtomicI32::new(max_threads),
            min_hits: AtomicU32::new(min_hits),
            coverage: Mutex::new(coverage),
        }
    }

    pub fn configure(&self, max_threads: i32, min_hits: u32, coverage: f64) {
        self.max_threads.store(max_threads, Ordering::Relaxed);
        self.min_hits.store(min_hits, Ordering::Relaxed);
        *self.coverage.lock() = coverage;
    }

    pub fn coverage(&self) -> f64 {
        *self.coverage.lock()
    }

    /// A query is "expensive" when it sorts or groups AND its estimated hit
    /// count exceeds `min_hits`.
    pub fn is_expensive(&self, has_sorting_or_grouping: bool, estimated_hits: u64) -> bool {
        has_sorting_or_grouping && estimated_hits > self.min_hits.load(Ordering::Relaxed) as u64
    }

    /// Blocks until a slot is free or `doom`'s hard deadline passes. A query
    /// that isn't expensive, or a limiter configured unlimited, never blocks.
    pub fn grab_token(&self, expensive: bool, doom: &Doom) -> Token<'_> {
        let max = self.max_threads.load(Ordering::Relaxed);
        if !expensive || max <= 0 {
            return Token { limiter: None };
        }

        let mut inner = self.inner.lock();
        while inner.active_threads >= max {
            let now = Instant::now();
            if doom.hard_doom(now) {
                return Token { limiter: None };
            }
            let remaining = doom.hard_deadline().saturating_duration_since(now);
            let result = self.condvar.wait_for(&mut inner, remaining);
            if result.timed_out() && doom.hard_doom(Instant::now()) {
                return Token { limiter: None };
            }
        }
        inner.active_threads += 1;
        Token { limiter: Some(self) }
    }

    fn release_token(&self) {
        let mut inner = self.inner.lock();
        inner.active_threads -= 1;
        self.condvar.notify_one();
    }

    pub fn active_threads(&self) -> i32 {
        self.inner.lock().active_threads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn doom(timeout: Duration) -> Doom {
        let now = Instant::now();
        Doom::from_timeout(now, timeout, 1.0)
    }

    #[test]
    fn non_expensive_queries_never_block() {
        let limiter = QueryLimiter::new(1, 100, 1.0);
        let _t1 = limiter.grab_token(false, &doom(Duration::from_secs(1)));
        let _t2 = limiter.grab_token(false, &doom(Duration::from_secs(1)));
        assert_eq!(limiter.active_threads(), 0);
    }

    #[test]
    fn expensive_queries_are_admitted_up_to_max_threads() {
        let limiter = QueryLimiter::new(2, 0, 1.0);
        let t1 = limiter.grab_token(true, &doom(Duration::from_secs(1)));
        let t2 = limiter.grab_token(true, &doom(Duration::from_secs(1)));
        assert_eq!(limiter.active_threads(), 2);
        drop(t1);
        assert_eq!(limiter.active_threads(), 1);
        drop(t2);
        assert_eq!(limiter.active_threads(), 0);
    }

    #[test]
    fn admission_bails_out_past_hard_doom() {
        let limiter = QueryLimiter::new(1, 0, 1.0);
        let _t1 = limiter.grab_token(true, &doom(Duration::from_secs(60)));
        let start = Instant::now();
        let blocked = limiter.grab_token(true, &doom(Duration::from_millis(20)));
        assert!(start.elapsed() < Duration::from_secs(5));
        drop(blocked);
        assert_eq!(limiter.active_threads(), 1);
    }

    #[test]
    fn is_expensive_requires_both_sort_and_hit_count() {
        let limiter = QueryLimiter::new(4, 1000, 1.0);
        assert!(!limiter.is_expensive(true, 500));
        assert!(!limiter.is_expensive(false, 5000));
        assert!(limiter.is_expensive(true, 5000));
    }
}
