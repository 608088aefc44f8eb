//! Matcher façade (C10): the long-lived per-schema entry point. Compiles the
//! rank setup once, then dispatches one `MatchMaster` run per request and
//! tracks the adaptive soft-timeout factor across them.

pub mod docsum;
pub mod index_environment;
pub mod rank_setup;

pub use docsum::DocsumMatcher;
pub use index_environment::IndexEnvironment;
pub use rank_setup::{CompiledRankSetup, RankSetupFactory};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::{MatchConfig, MatcherDefaults};
use crate::error::Result;
use crate::limiter::MatchPhaseLimiter;
use crate::master::{MasterConfig, MatchMaster, SecondPhaseConfig};
use crate::matcher::index_environment::DOCUMENT_META_STORE_FIELD;
use crate::plan::{optimizer, split_fields, whitelist, PlanBuilder, PlanNode, QueryNode, Searchable, ViewResolver};
use crate::query_limiter::QueryLimiter;
use crate::result::{assemble_reply, LidToGidResolver, MergeOrder, Reply};
use crate::stats::MatchingStats;
use crate::thread::MatchThreadFlags;
use crate::types::Doom;

/// A never-below-floor change a single request's softdoom outcome is allowed
/// to push the running factor by, relative to its current value.
const MAX_CHANGE_FACTOR: f64 = 5.0;
const MIN_TIMEOUT: Duration = Duration::from_millis(1);
/// Soft-timeout factor adjustment is deferred for this long after process
/// start, so early requests (often unrepresentative, e.g. warm-up traffic)
/// don't skew the running average.
const SECONDS_BEFORE_ALLOWING_FACTOR_ADJUSTMENT: u64 = 60;

pub struct MatchRequest {
    pub query: QueryNode,
    pub rank_profile: String,
    pub properties: HashMap<String, String>,
    pub offset: usize,
    pub max_hits: usize,
    pub has_sorting_or_grouping: bool,
    pub now: Instant,
    pub timeout: Duration,
}

pub struct MatchReply {
    pub reply: Reply,
    pub stats: MatchingStats,
}

pub struct Matcher {
    index_environment: IndexEnvironment,
    rank_setup_factory: Arc<dyn RankSetupFactory>,
    view_resolver: Arc<dyn ViewResolver>,
    defaults: MatcherDefaults,
    query_limiter: QueryLimiter,
    soft_timeout_factor: Mutex<f64>,
    started_at: Instant,
    stats: Mutex<MatchingStats>,
}

impl Matcher {
    pub fn new(
        index_environment: IndexEnvironment,
        rank_setup_factory: Arc<dyn RankSetupFactory>,
        view_resolver: Arc<dyn ViewResolver>,
        defaults: MatcherDefaults,
    ) -> Self {
        let query_limiter = QueryLimiter::new(defaults.query_limiter_max_threads, defaults.query_limiter_min_hits, defaults.query_limiter_coverage);
        Matcher {
            index_environment,
            rank_setup_factory,
            view_resolver,
            defaults,
            query_limiter,
            soft_timeout_factor: Mutex::new(1.0),
            started_at: Instant::now(),
            stats: Mutex::new(MatchingStats::default()),
        }
    }

    pub fn index_environment(&self) -> &IndexEnvironment {
        &self.index_environment
    }

    pub fn stats(&self) -> MatchingStats {
        self.stats.lock().clone()
    }

    /// Runs one query to completion: builds the plan, picks a used soft-timeout
    /// factor, admits through the query limiter, runs the master, and folds the
    /// outcome back into this matcher's running stats and adaptive factor.
    pub fn match_request(&self, request: &MatchRequest, searchable: Arc<dyn Searchable>, doc_id_limit: u32, resolver: &dyn LidToGidResolver) -> Result<MatchReply> {
        let compiled = self.rank_setup_factory.compile(&request.rank_profile)?;
        let config = MatchConfig::from_properties(&request.properties, &self.defaults);

        let split = split_fields(&request.query);
        if split.changed {
            debug!("query rewritten by field splitting before plan build");
        }
        let builder = PlanBuilder::new(searchable.clone(), self.view_resolver.clone(), doc_id_limit);
        let (plan, issues) = builder.build(&split.tree);
        for issue in &issues {
            debug!(?issue, "plan build raised an issue");
        }
        // Same builder, so the whitelist term's handle can't collide with any
        // handle the query itself allocated.
        let (whitelist_plan, _) = builder.build(&QueryNode::term(DOCUMENT_META_STORE_FIELD, "alive"));

        let mut plan: PlanNode = optimizer::optimize(plan);
        plan = whitelist::compose(plan, whitelist_plan);
        plan.freeze();
        plan.fetch_postings(true);

        let est_hits = plan.estimate.hits;
        let configured_threads = config.num_threads_per_search.unwrap_or(self.defaults.num_threads_per_search).max(1);
        let min_hits_per_thread = config.min_hits_per_thread.max(1) as u64;
        let wanted_threads = est_hits.div_ceil(min_hits_per_thread).max(1) as usize;
        let num_threads = configured_threads.min(wanted_threads).max(1);

        let used_factor = config.soft_timeout_factor.unwrap_or_else(|| *self.soft_timeout_factor.lock());
        let doom = if config.soft_timeout_enabled {
            Doom::from_timeout(request.now, request.timeout, used_factor)
        } else {
            Doom::new(request.now + request.timeout, request.now + request.timeout)
        };

        let expensive = self.query_limiter.is_expensive(request.has_sorting_or_grouping, est_hits);
        let _token = self.query_limiter.grab_token(expensive, &doom);

        let match_phase_limiter = config.match_phase.enabled().then(|| MatchPhaseLimiter::new(&config.match_phase, searchable.clone(), doc_id_limit));

        let flags = MatchThreadFlags { do_rank: true, do_limit: match_phase_limiter.is_some(), do_share: true, rank_drop_mode: config.rank_drop_mode() };
        let second_phase = compiled.second_phase.as_ref().map(|rp| SecondPhaseConfig { plan: &plan, rank_program: rp.as_ref(), rerank_count: config.heap_size });

        let master_config = MasterConfig {
            doc_id_limit,
            num_threads,
            num_search_partitions: config.num_search_partitions,
            min_task_size: 1000,
            doom,
            flags,
            rank_drop_limit: config.rank_drop_limit.unwrap_or(f64::NEG_INFINITY),
            match_phase_limiter: match_phase_limiter.as_ref(),
            sample_hits_per_thread: (min_hits_per_thread as f64 * config.match_phase.sample_percentage.max(0.01)).max(1.0) as u32,
            array_size: config.array_size,
            heap_size: config.heap_size,
            first_phase: compiled.first_phase.as_ref(),
            second_phase,
            merge_order: MergeOrder::Rank,
            offset: request.offset,
            max_hits: request.max_hits,
        };

        let start = Instant::now();
        let output = MatchMaster::run(&plan, &master_config);
        let duration = start.elapsed();

        if config.soft_timeout_enabled && !config.has_explicit_soft_timeout_factor() {
            self.update_soft_timeout_factor(duration, request.timeout, compiled.soft_timeout_tail_cost);
        }

        self.stats.lock().merge(&crate::stats::ThreadStats {
            docs_matched: output.stats.docs_matched,
            docs_searched: output.stats.docs_searched,
            active_time: output.stats.active_time_total,
            wait_time: output.stats.wait_time_total,
        });

        let reply = assemble_reply(&output.result, resolver, output.coverage);
        Ok(MatchReply { reply, stats: output.stats })
    }

    /// §4.10 / reference `MatchingStats::updatesoftDoomFactor`: nudges the
    /// running factor toward whatever would have landed this request exactly
    /// at the soft limit, asymmetrically (slower to relax than to tighten) and
    /// deferred for a bootstrap window after process start.
    fn update_soft_timeout_factor(&self, duration: Duration, timeout: Duration, tail_cost: f64) {
        if self.started_at.elapsed().as_secs() <= SECONDS_BEFORE_ALLOWING_FACTOR_ADJUSTMENT {
            return;
        }
        let hard_limit = timeout;
        let soft_limit = Duration::from_secs_f64(timeout.as_secs_f64() * (1.0 - tail_cost).max(0.0));
        if hard_limit < MIN_TIMEOUT || soft_limit < MIN_TIMEOUT {
            return;
        }

        let mut factor = self.soft_timeout_factor.lock();
        let mut diff = (soft_limit.as_secs_f64() - duration.as_secs_f64()) / hard_limit.as_secs_f64();
        if duration < soft_limit {
            diff = diff.min(*factor * MAX_CHANGE_FACTOR);
            *factor += 0.01 * diff;
        } else {
            diff = diff.max(-*factor * MAX_CHANGE_FACTOR);
            *factor += 0.02 * diff;
            info!(duration_ms = duration.as_millis() as u64, new_factor = *factor, "soft timeout triggered, factor adjusted");
        }
        *factor = factor.max(0.01);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::rank_setup::StaticRankSetupFactory;
    use crate::plan::{FakeSearchable, MatchData, SimpleViewResolver};
    use crate::thread::ClosureRankProgram;
    use crate::types::{DegradedReasons, DocId, Gid};

    struct IdentityResolver;
    impl LidToGidResolver for IdentityResolver {
        fn resolve(&self, docid: DocId) -> Gid {
            let mut bytes = [0u8; 12];
            bytes[..4].copy_from_slice(&docid.value().to_be_bytes());
            Gid(bytes)
        }
    }

    fn matcher() -> Matcher {
        let mut factory = StaticRankSetupFactory::new();
        factory.register(
            "default",
            CompiledRankSetup {
                first_phase: Arc::new(ClosureRankProgram(|docid: DocId, _: &MatchData| docid.value() as f64)),
                second_phase: None,
                soft_timeout_enabled: true,
                soft_timeout_tail_cost: 0.1,
            },
        );
        let env = IndexEnvironment::build(&[], &["title"], &[]);
        Matcher::new(env, Arc::new(factory), Arc::new(SimpleViewResolver::new()), MatcherDefaults::default())
    }

    #[test]
    fn match_request_returns_hits_in_rank_order() {
        let m = matcher();
        let searchable = Arc::new(FakeSearchable::new());
        searchable.add_term("title", "rust", vec![DocId::new(2), DocId::new(5)]);
        searchable.add_term(DOCUMENT_META_STORE_FIELD, "alive", vec![DocId::new(2), DocId::new(5)]);

        let request = MatchRequest {
            query: QueryNode::term("title", "rust"),
            rank_profile: "default".into(),
            properties: HashMap::new(),
            offset: 0,
            max_hits: 10,
            has_sorting_or_grouping: false,
            now: Instant::now(),
            timeout: Duration::from_secs(5),
        };

        let reply = m.match_request(&request, searchable, 10, &IdentityResolver).expect("match should succeed");
        assert_eq!(reply.reply.total_hit_count, 2);
        assert_eq!(reply.reply.hits[0].score, 5.0);
    }

    #[test]
    fn match_request_excludes_docs_not_in_the_whitelist() {
        let m = matcher();
        let searchable = Arc::new(FakeSearchable::new());
        searchable.add_term("title", "rust", vec![DocId::new(2), DocId::new(5)]);
        // Only docid 2 is live; 5 matched the query but was removed.
        searchable.add_term(DOCUMENT_META_STORE_FIELD, "alive", vec![DocId::new(2)]);

        let request = MatchRequest {
            query: QueryNode::term("title", "rust"),
            rank_profile: "default".into(),
            properties: HashMap::new(),
            offset: 0,
            max_hits: 10,
            has_sorting_or_grouping: false,
            now: Instant::now(),
            timeout: Duration::from_secs(5),
        };

        let reply = m.match_request(&request, searchable, 10, &IdentityResolver).expect("match should succeed");
        assert_eq!(reply.reply.total_hit_count, 1);
        assert_eq!(reply.reply.hits.len(), 1);
    }

    #[test]
    fn match_request_applies_configured_rank_drop_limit() {
        let m = matcher();
        let searchable = Arc::new(FakeSearchable::new());
        searchable.add_term("title", "rust", vec![DocId::new(2), DocId::new(5)]);
        searchable.add_term(DOCUMENT_META_STORE_FIELD, "alive", vec![DocId::new(2), DocId::new(5)]);

        let mut properties = HashMap::new();
        properties.insert("vespa.matching.rankdroplimit".to_string(), "3.0".to_string());

        let request = MatchRequest {
            query: QueryNode::term("title", "rust"),
            rank_profile: "default".into(),
            properties,
            offset: 0,
            max_hits: 10,
            has_sorting_or_grouping: false,
            now: Instant::now(),
            timeout: Duration::from_secs(5),
        };

        let reply = m.match_request(&request, searchable, 10, &IdentityResolver).expect("match should succeed");
        // Both docids matched the boolean query, so the count includes the
        // rank-dropped one even though only one hit survives the heap.
        assert_eq!(reply.reply.total_hit_count, 2);
        assert_eq!(reply.reply.hits.len(), 1);
        assert_eq!(reply.reply.hits[0].score, 5.0);
    }

    #[test]
    fn unknown_rank_profile_fails_construction() {
        let m = matcher();
        let searchable = Arc::new(FakeSearchable::new());
        let request = MatchRequest {
            query: QueryNode::term("title", "rust"),
            rank_profile: "missing".into(),
            properties: HashMap::new(),
            offset: 0,
            max_hits: 10,
            has_sorting_or_grouping: false,
            now: Instant::now(),
            timeout: Duration::from_secs(5),
        };
        assert!(m.match_request(&request, searchable, 10, &IdentityResolver).is_err());
    }

    #[test]
    #[allow(unused)]
    fn degraded_reasons_default_is_clean() {
        assert!(!DegradedReasons::default().any());
    }
}
