//! Session manager (C11): two caches a `Matcher` front-end keeps between
//! requests — an unbounded search-session cache keyed by client-supplied id,
//! and a capacity-bounded grouping-session cache that evicts its least
//! recently used entry under pressure (§4.11).

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Runs a destructor off whatever thread is doing the pruning. A real backend
/// hands this a thread pool; tests can hand it something that just runs inline.
pub trait Executor: Send + Sync {
    fn execute(&self, task: Box<dyn FnOnce() + Send + 'static>);
}

pub struct RayonExecutor;

impl Executor for RayonExecutor {
    fn execute(&self, task: Box<dyn FnOnce() + Send + 'static>) {
        rayon::spawn(task);
    }
}

/// A cached search result, reusable by a later `getSummaryFeatures`-style
/// request against the same query instead of re-matching from scratch.
pub struct SearchSession<T> {
    pub id: String,
    pub created_at: Instant,
    pub timeout: Duration,
    pub payload: T,
}

impl<T> SearchSession<T> {
    pub fn new(id: impl Into<String>, created_at: Instant, timeout: Duration, payload: T) -> Self {
        SearchSession { id: id.into(), created_at, timeout, payload }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.timeout
    }
}

/// Unbounded hash-map cache: search sessions live until picked up or pruned by
/// timeout, never evicted under memory pressure (the reference implementation
/// leaves this cache's sizing to query-side admission control, not the cache).
pub struct SearchSessionCache<T> {
    sessions: Mutex<HashMap<String, SearchSession<T>>>,
}

impl<T> Default for SearchSessionCache<T> {
    fn default() -> Self {
        SearchSessionCache { sessions: Mutex::new(HashMap::new()) }
    }
}

impl<T> SearchSessionCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: SearchSession<T>) {
        self.sessions.lock().insert(session.id.clone(), session);
    }

    /// Removes and returns the session, if present. Pick is destructive: a
    /// session is good for exactly one follow-up request.
    pub fn pick(&self, id: &str) -> Option<SearchSession<T>> {
        self.sessions.lock().remove(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Removes every session whose timeout has elapsed and returns them, for
    /// the caller to destroy off-thread.
    pub fn prune_timed_out(&self, now: Instant) -> Vec<SearchSession<T>> {
        let mut sessions = self.sessions.lock();
        let expired_ids: Vec<String> = sessions.iter().filter(|(_, s)| s.is_expired(now)).map(|(id, _)| id.clone()).collect();
        expired_ids.into_iter().filter_map(|id| sessions.remove(&id)).collect()
    }
}

pub struct GroupingSession<T> {
    pub id: String,
    pub created_at: Instant,
    pub timeout: Duration,
    pub payload: T,
}

impl<T> GroupingSession<T> {
    pub fn new(id: impl Into<String>, created_at: Instant, timeout: Duration, payload: T) -> Self {
        GroupingSession { id: id.into(), created_at, timeout, payload }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.timeout
    }
}

/// LRU-bounded cache: grouping sessions can be large (holding partial grouping
/// state across a multi-pass query), so capacity is enforced directly rather
/// than left to timeout pruning alone.
pub struct GroupingSessionCache<T> {
    cache: Mutex<LruCache<String, GroupingSession<T>>>,
}

impl<T> GroupingSessionCache<T> {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).expect("capacity is clamped to at least 1");
        GroupingSessionCache { cache: Mutex::new(LruCache::new(cap)) }
    }

    /// Inserts a session, evicting the least recently used one if the cache is
    /// already full.
    pub fn insert(&self, session: GroupingSession<T>) {
        let mut cache = self.cache.lock();
        if cache.len() >= cache.cap().get() && !cache.contains(&session.id) {
            if let Some((evicted_id, _)) = cache.peek_lru() {
                warn!(session_id = %evicted_id, "grouping session cache full, evicting least recently used session");
            }
        }
        cache.put(session.id.clone(), session);
    }

    pub fn pick(&self, id: &str) -> Option<GroupingSession<T>> {
        self.cache.lock().pop(id)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn prune_timed_out(&self, now: Instant) -> Vec<GroupingSession<T>> {
        let mut cache = self.cache.lock();
        let expired_ids: Vec<String> = cache.iter().filter(|(_, s)| s.is_expired(now)).map(|(id, _)| id.clone()).collect();
        expired_ids.into_iter().filter_map(|id| cache.pop(&id)).collect()
    }
}

/// Owns both caches for one schema's matcher. `prune_timed_out` is meant to be
/// called periodically by a maintenance task, not inline with request handling.
pub struct SessionManager<S, G> {
    search: SearchSessionCache<S>,
    grouping: GroupingSessionCache<G>,
}

impl<S, G> SessionManager<S, G>
where
    S: Send + 'static,
    G: Send + 'static,
{
    pub fn new(grouping_capacity: usize) -> Self {
        SessionManager { search: SearchSessionCache::new(), grouping: GroupingSessionCache::new(grouping_capacity) }
    }

    pub fn insert_search(&self, session: SearchSession<S>) {
        self.search.insert(session);
    }

    pub fn pick_search(&self, id: &str) -> Option<SearchSession<S>> {
        self.search.pick(id)
    }

    pub fn insert_grouping(&self, session: GroupingSession<G>) {
        self.grouping.insert(session);
    }

    pub fn pick_grouping(&self, id: &str) -> Option<GroupingSession<G>> {
        self.grouping.pick(id)
    }

    /// Scans both caches for expired sessions and destroys them on `executor`,
    /// off the calling (scheduling) thread.
    pub fn prune_timed_out(&self, now: Instant, executor: &dyn Executor) {
        let expired_search = self.search.prune_timed_out(now);
        let expired_grouping = self.grouping.prune_timed_out(now);
        let pruned = expired_search.len() + expired_grouping.len();
        if pruned > 0 {
            debug!(count = pruned, "pruning timed out sessions");
            executor.execute(Box::new(move || {
                drop(expired_search);
                drop(expired_grouping);
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    struct InlineExecutor;
    impl Executor for InlineExecutor {
        fn execute(&self, task: Box<dyn FnOnce() + Send + 'static>) {
            task();
        }
    }

    #[test]
    fn search_session_pick_is_destructive() {
        let cache: SearchSessionCache<u32> = SearchSessionCache::new();
        cache.insert(SearchSession::new("a", Instant::now(), Duration::from_secs(60), 7));
        assert_eq!(cache.pick("a").map(|s| s.payload), Some(7));
        assert!(cache.pick("a").is_none());
    }

    #[test]
    fn grouping_cache_evicts_least_recently_used_when_full() {
        let cache: GroupingSessionCache<u32> = GroupingSessionCache::new(2);
        cache.insert(GroupingSession::new("a", Instant::now(), Duration::from_secs(60), 1));
        cache.insert(GroupingSession::new("b", Instant::now(), Duration::from_secs(60), 2));
        cache.insert(GroupingSession::new("c", Instant::now(), Duration::from_secs(60), 3));
        assert_eq!(cache.len(), 2);
        assert!(cache.pick("a").is_none());
        assert!(cache.pick("c").is_some());
    }

    #[test]
    fn prune_timed_out_destroys_expired_sessions_via_executor() {
        let manager: SessionManager<u32, u32> = SessionManager::new(4);
        let past = Instant::now() - Duration::from_secs(120);
        manager.insert_search(SearchSession::new("old", past, Duration::from_secs(1), 1));
        manager.insert_search(SearchSession::new("fresh", Instant::now(), Duration::from_secs(600), 2));

        let (tx, rx) = mpsc::channel();
        struct SignalingExecutor(mpsc::Sender<()>);
        impl Executor for SignalingExecutor {
            fn execute(&self, task: Box<dyn FnOnce() + Send + 'static>) {
                task();
                self.0.send(()).unwrap();
            }
        }
        manager.prune_timed_out(Instant::now(), &SignalingExecutor(tx));
        rx.recv_timeout(Duration::from_secs(1)).expect("executor should have run");

        assert!(manager.pick_search("old").is_none());
        assert!(manager.pick_search("fresh").is_some());
    }

    #[test]
    fn pruning_with_nothing_expired_does_not_invoke_executor() {
        let manager: SessionManager<u32, u32> = SessionManager::new(4);
        manager.insert_search(SearchSession::new("fresh", Instant::now(), Duration::from_secs(600), 1));
        manager.prune_timed_out(Instant::now(), &InlineExecutor);
        assert!(manager.pick_search("fresh").is_some());
    }
}
