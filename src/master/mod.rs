//! Match master (C9): drives one query's matching to completion by choosing a
//! scheduler strategy, spawning match threads, and merging their partials.

use crate::communicator::MatchLoopCommunicator;
use crate::limiter::MatchPhaseLimiter;
use crate::plan::PlanNode;
use crate::result::{MergeOrder, PartialResult, ResultProcessor};
use crate::scheduler::{AdaptiveScheduler, DocidRangeScheduler, PartitionScheduler, TaskScheduler};
use crate::stats::MatchingStats;
use crate::thread::{run_first_phase, run_second_phase, MatchThreadConfig, MatchThreadFlags, RankProgram};
use crate::types::{Coverage, DegradedReasons, Doom};

/// The second-phase rerank plan's own iterator is built fresh per thread and
/// never shares state with the first-phase plan (§4.8).
pub struct SecondPhaseConfig<'a> {
    pub plan: &'a PlanNode,
    pub rank_program: &'a dyn RankProgram,
    pub rerank_count: usize,
}

pub struct MasterConfig<'a> {
    pub doc_id_limit: u32,
    pub num_threads: usize,
    pub num_search_partitions: Option<u32>,
    pub min_task_size: u32,
    pub doom: Doom,
    pub flags: MatchThreadFlags,
    pub rank_drop_limit: f64,
    pub match_phase_limiter: Option<&'a MatchPhaseLimiter>,
    pub sample_hits_per_thread: u32,
    pub array_size: usize,
    pub heap_size: usize,
    pub first_phase: &'a dyn RankProgram,
    pub second_phase: Option<SecondPhaseConfig<'a>>,
    pub merge_order: MergeOrder,
    pub offset: usize,
    pub max_hits: usize,
}

pub struct MasterOutput {
    pub result: PartialResult,
    pub stats: MatchingStats,
    pub coverage: Coverage,
}

pub struct MatchMaster;

impl MatchMaster {
    /// Mirrors the reference matcher's strategy selection: no explicit partition
    /// count (or zero) gets work-stealing; a count at or below the thread count
    /// gets one fixed range per thread; anything larger gets many small fixed
    /// tasks redistributed on demand.
    pub fn choose_scheduler(doc_id_limit: u32, num_threads: usize, num_search_partitions: Option<u32>, min_task_size: u32) -> Box<dyn DocidRangeScheduler> {
        match num_search_partitions {
            None | Some(0) => Box::new(AdaptiveScheduler::new(doc_id_limit, num_threads, min_task_size.max(1))),
            Some(n) if (n as usize) <= num_threads => Box::new(PartitionScheduler::new(doc_id_limit, num_threads)),
            Some(n) => Box::new(TaskScheduler::new(doc_id_limit, num_threads, n as usize)),
        }
    }

    pub fn run(plan: &PlanNode, config: &MasterConfig) -> MasterOutput {
        let scheduler = Self::choose_scheduler(config.doc_id_limit, config.num_threads, config.num_search_partitions, config.min_task_size);
        let top_n = config.second_phase.as_ref().map(|sp| sp.rerank_count).unwrap_or(0);
        let communicator = MatchLoopCommunicator::new(config.num_threads, top_n);

        let thread_results: Vec<(PartialResult, crate::stats::ThreadStats, bool)> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..config.num_threads)
                .map(|tid| {
                    let scheduler = scheduler.as_ref();
                    let communicator = &communicator;
                    let config = &config;
                    scope.spawn(move || {
                        let cfg = MatchThreadConfig {
                            tid,
                            doc_id_limit: config.doc_id_limit,
                            scheduler,
                            communicator,
                            plan,
                            doom: config.doom,
                            flags: config.flags,
                            rank_drop_limit: config.rank_drop_limit,
                            match_phase_limiter: config.match_phase_limiter,
                            sample_hits_per_thread: config.sample_hits_per_thread,
                            array_size: config.array_size,
                            heap_size: config.heap_size,
                            first_phase: config.first_phase,
                        };
                        let out = run_first_phase(&cfg);

                        let reranked = config.second_phase.as_ref().map(|sp| {
                            run_second_phase(tid, communicator, &out.collector, sp.plan, sp.rank_program, config.doc_id_limit, sp.rerank_count)
                        });

                        let (hits, score_range) = match reranked {
                            Some((hits, range)) => (hits, Some(range)),
                            None => (out.collector.sorted_hits(), None),
                        };

                        let partial = PartialResult { hits, total_hit_count: out.docs_matched, score_range, sort_data: None };
                        (partial, out.stats, out.soft_doomed)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().expect("match thread panicked")).collect()
        });

        let mut stats = MatchingStats::default();
        let mut soft_doomed_any = false;
        let mut partials = Vec::with_capacity(thread_results.len());
        for (partial, thread_stats, soft_doomed) in thread_results {
            stats.merge(&thread_stats);
            soft_doomed_any |= soft_doomed;
            partials.push(partial);
        }
        stats.soft_doomed = soft_doomed_any;
        stats.match_phase_limited = config.match_phase_limiter.map(|l| l.was_limited()).unwrap_or(false);

        let merged = ResultProcessor::merge(&partials, config.merge_order, config.offset, config.max_hits);

        let target_active = config.doc_id_limit.saturating_sub(1) as u64;
        let covered: u64 = (0..config.num_threads).map(|tid| scheduler.total_size(tid) as u64).sum::<u64>().min(target_active);
        let coverage = Coverage {
            covered,
            active: target_active,
            target_active,
            degraded: DegradedReasons { match_phase: stats.match_phase_limited, timeout: soft_doomed_any, adaptive_timeout: false },
        };

        MasterOutput { result: merged, stats, coverage }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{FakeSearchable, MatchData, PlanBuilder, QueryNode, SimpleViewResolver};
    use crate::thread::{ClosureRankProgram, RankDropMode};
    use crate::types::DocId;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[test]
    fn single_thread_run_matches_and_merges() {
        let searchable = Arc::new(FakeSearchable::new());
        searchable.add_term("title", "rust", vec![DocId::new(1), DocId::new(4), DocId::new(9)]);
        let builder = PlanBuilder::new(searchable, Arc::new(SimpleViewResolver::new()), 20);
        let (mut plan, _) = builder.build(&QueryNode::term("title", "rust"));
        plan.freeze();
        plan.fetch_postings(true);

        let ranker = ClosureRankProgram(|docid: DocId, _: &MatchData| docid.value() as f64);
        let config = MasterConfig {
            doc_id_limit: 20,
            num_threads: 2,
            num_search_partitions: None,
            min_task_size: 1,
            doom: Doom::from_timeout(Instant::now(), Duration::from_secs(10), 1.0),
            flags: MatchThreadFlags { do_rank: true, do_limit: false, do_share: false, rank_drop_mode: RankDropMode::No },
            rank_drop_limit: f64::NEG_INFINITY,
            match_phase_limiter: None,
            sample_hits_per_thread: u32::MAX,
            array_size: 10,
            heap_size: 10,
            first_phase: &ranker,
            second_phase: None,
            merge_order: MergeOrder::Rank,
            offset: 0,
            max_hits: 10,
        };

        let out = MatchMaster::run(&plan, &config);
        assert_eq!(out.result.total_hit_count, 3);
        let docids: Vec<u32> = out.result.hits.iter().map(|h| h.docid.value()).collect();
        assert_eq!(docids, vec![9, 4, 1]);
        assert_eq!(out.coverage.target_active, 19);
    }
}
