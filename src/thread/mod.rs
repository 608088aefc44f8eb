//! Match thread (C8): the per-thread inner loop, driven by four independent
//! flags rather than compile-time template specialization (§9).

use std::time::Instant;

use crate::communicator::{FrequencySample, MatchLoopCommunicator};
use crate::limiter::MatchPhaseLimiter;
use crate::plan::{MatchData, PlanNode, SearchIterator};
use crate::result::{HitCollector, PartialResult};
use crate::scheduler::DocidRangeScheduler;
use crate::stats::ThreadStats;
use crate::types::{normalize_score, DocId, DocidRange, Doom, Hit, ScoreRange};

/// Whether the rank-drop threshold is enforced, and if so, whether dropped
/// docids are only discarded (`Yes`) or also counted (`Track`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankDropMode {
    No,
    Yes,
    Track,
}

/// The ranking program is an out-of-scope black box (§1): given the match-data
/// an iterator's `unpack` populated, produce one score.
pub trait RankProgram: Send + Sync {
    fn score(&self, docid: DocId, match_data: &MatchData) -> f64;
}

pub struct ClosureRankProgram<F>(pub F);

impl<F> RankProgram for ClosureRankProgram<F>
where
    F: Fn(DocId, &MatchData) -> f64 + Send + Sync,
{
    fn score(&self, docid: DocId, match_data: &MatchData) -> f64 {
        (self.0)(docid, match_data)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MatchThreadFlags {
    pub do_rank: bool,
    pub do_limit: bool,
    pub do_share: bool,
    pub rank_drop_mode: RankDropMode,
}

pub struct MatchThreadConfig<'a> {
    pub tid: usize,
    pub doc_id_limit: u32,
    pub scheduler: &'a dyn DocidRangeScheduler,
    pub communicator: &'a MatchLoopCommunicator,
    pub plan: &'a PlanNode,
    pub doom: Doom,
    pub flags: MatchThreadFlags,
    pub rank_drop_limit: f64,
    pub match_phase_limiter: Option<&'a MatchPhaseLimiter>,
    pub sample_hits_per_thread: u32,
    pub array_size: usize,
    pub heap_size: usize,
    pub first_phase: &'a dyn RankProgram,
}

pub struct FirstPhaseOutput {
    pub collector: HitCollector,
    pub stats: ThreadStats,
    /// Every docid that matched the boolean query, independent of whether it
    /// was later rank-dropped from the collector. This, not the collector's
    /// post-filter count, is what feeds `docsMatched`/`totalHitCount`.
    pub docs_matched: u64,
    pub dropped_by_rank: u64,
    pub soft_doomed: bool,
}

/// Runs the first-phase inner loop to completion (every range this thread is
/// assigned, including donated/stolen work).
pub fn run_first_phase(cfg: &MatchThreadConfig) -> FirstPhaseOutput {
    let mut match_data = MatchData::new();
    let mut iterator = cfg.plan.create_search(&mut match_data, true);
    let mut collector = HitCollector::new(cfg.array_size, cfg.heap_size);
    let mut docs_searched: u64 = 0;
    let mut docs_matched: u64 = 0;
    let mut dropped_by_rank: u64 = 0;
    let mut sampled = false;
    let mut soft_doomed = false;

    let mut range = cfg.scheduler.first_range(cfg.tid);
    'ranges: loop {
        if range.is_empty() {
            range = cfg.scheduler.next_range(cfg.tid);
            if range.is_empty() {
                break;
            }
        }
        iterator.init_range(DocId::new(range.begin), DocId::new(range.end));
        let mut docid = iterator.seek(DocId::new(range.begin));

        while docid.value() < range.end {
            if cfg.doom.soft_doom(Instant::now()) {
                soft_doomed = true;
                break 'ranges;
            }

            match_data.reset();
            iterator.unpack(docid, &mut match_data);
            docs_searched += 1;
            docs_matched += 1;

            let score = if cfg.flags.do_rank { normalize_score(cfg.first_phase.score(docid, &match_data)) } else { 0.0 };
            let dropped = cfg.flags.do_rank && cfg.flags.rank_drop_mode != RankDropMode::No && score < cfg.rank_drop_limit;
            if dropped {
                if cfg.flags.rank_drop_mode == RankDropMode::Track {
                    dropped_by_rank += 1;
                }
            } else {
                collector.add(Hit::new(docid, score));
            }

            if cfg.flags.do_limit && !sampled && collector.total_matches() as u32 >= cfg.sample_hits_per_thread {
                sampled = true;
                let freq = cfg.communicator.estimate_match_frequency(cfg.tid, FrequencySample { hits: collector.total_matches(), docs: docs_searched });
                if let Some(limiter) = cfg.match_phase_limiter {
                    let decision = limiter.decide(freq, cfg.doc_id_limit);
                    iterator = limiter.compose(&decision, iterator, &mut match_data);
                    iterator.init_range(DocId::new(docid.value() + 1), DocId::new(range.end));
                }
            }

            let next = DocId::new(docid.value() + 1);
            if cfg.flags.do_share && cfg.scheduler.idle_observer().any_idle() {
                let remaining = DocidRange::new(next.value(), range.end);
                if !remaining.is_empty() {
                    let kept = cfg.scheduler.share_range(cfg.tid, remaining);
                    if kept.end != range.end {
                        range.end = kept.end;
                        iterator.init_range(next, DocId::new(range.end));
                    }
                }
            }

            docid = iterator.seek(next);
        }
        range = DocidRange::empty();
    }

    FirstPhaseOutput {
        stats: ThreadStats { docs_matched, docs_searched, active_time: std::time::Duration::ZERO, wait_time: std::time::Duration::ZERO },
        collector,
        docs_matched,
        dropped_by_rank,
        soft_doomed,
    }
}

/// Rerank flow (§4.8 step 4): extract candidates, rendezvous for the global
/// top-N assignment, score this thread's bucket, rendezvous back.
pub fn run_second_phase(
    tid: usize,
    communicator: &MatchLoopCommunicator,
    collector: &HitCollector,
    second_phase_plan: &PlanNode,
    second_phase: &dyn RankProgram,
    doc_id_limit: u32,
    rerank_limit: usize,
) -> (Vec<Hit>, ScoreRange) {
    let candidates = collector.rerank_candidates(rerank_limit);
    let assigned = communicator.get_second_phase_work(tid, candidates);

    let mut match_data = MatchData::new();
    let mut iterator = second_phase_plan.create_search(&mut match_data, false);
    iterator.init_range(DocId::new(0), DocId::new(doc_id_limit));

    let mut my_results = Vec::with_capacity(assigned.len());
    for (hit, origin) in assigned {
        match_data.reset();
        if iterator.seek(hit.docid) == hit.docid {
            iterator.unpack(hit.docid, &mut match_data);
        }
        let score = normalize_score(second_phase.score(hit.docid, &match_data));
        my_results.push((Hit::new(hit.docid, score), origin));
    }

    let (reranked, (first_range, _second_range)) = communicator.complete_second_phase(tid, my_results);
    (reranked, first_range)
}

/// Assembles this thread's final [`PartialResult`] from its (possibly
/// reranked) hits. `docs_matched` is the thread's unconditional per-docid
/// match count (see [`FirstPhaseOutput::docs_matched`]), not the collector's
/// post-rank-drop hit count.
pub fn into_partial_result(collector: HitCollector, reranked: Option<Vec<Hit>>, docs_matched: u64) -> PartialResult {
    let mut hits = reranked.unwrap_or_else(|| collector.sorted_hits());
    hits.sort_by(crate::result::rank_order_cmp);
    PartialResult { hits, total_hit_count: docs_matched, score_range: None, sort_data: None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communicator::MatchLoopCommunicator;
    use crate::plan::{FakeSearchable, PlanBuilder, QueryNode, SimpleViewResolver};
    use crate::scheduler::PartitionScheduler;
    use std::sync::Arc;
    use std::time::Duration;

    fn doom() -> Doom {
        Doom::from_timeout(Instant::now(), Duration::from_secs(10), 1.0)
    }

    #[test]
    fn first_phase_collects_every_matching_docid() {
        let searchable = Arc::new(FakeSearchable::new());
        searchable.add_term("title", "rust", vec![DocId::new(1), DocId::new(3), DocId::new(5)]);
        let builder = PlanBuilder::new(searchable, Arc::new(SimpleViewResolver::new()), 10);
        let (mut plan, _) = builder.build(&QueryNode::term("title", "rust"));
        plan.freeze();
        plan.fetch_postings(true);

        let scheduler = PartitionScheduler::new(10, 1);
        let comm = MatchLoopCommunicator::new(1, 10);
        let ranker = ClosureRankProgram(|docid: DocId, _: &MatchData| docid.value() as f64);

        let cfg = MatchThreadConfig {
            tid: 0,
            doc_id_limit: 10,
            scheduler: &scheduler,
            communicator: &comm,
            plan: &plan,
            doom: doom(),
            flags: MatchThreadFlags { do_rank: true, do_limit: false, do_share: false, rank_drop_mode: RankDropMode::No },
            rank_drop_limit: f64::NEG_INFINITY,
            match_phase_limiter: None,
            sample_hits_per_thread: u32::MAX,
            array_size: 10,
            heap_size: 10,
            first_phase: &ranker,
        };

        let out = run_first_phase(&cfg);
        assert_eq!(out.collector.total_matches(), 3);
        assert_eq!(out.docs_matched, 3);
        assert!(!out.soft_doomed);
        let docids: Vec<u32> = out.collector.sorted_hits().iter().map(|h| h.docid.value()).collect();
        assert_eq!(docids, vec![5, 3, 1]);
    }

    #[test]
    fn docs_matched_counts_rank_dropped_docs_the_collector_discarded() {
        let searchable = Arc::new(FakeSearchable::new());
        searchable.add_term("title", "rust", vec![DocId::new(1), DocId::new(3), DocId::new(5)]);
        let builder = PlanBuilder::new(searchable, Arc::new(SimpleViewResolver::new()), 10);
        let (mut plan, _) = builder.build(&QueryNode::term("title", "rust"));
        plan.freeze();
        plan.fetch_postings(true);

        let scheduler = PartitionScheduler::new(10, 1);
        let comm = MatchLoopCommunicator::new(1, 10);
        // Every docid scores below the drop limit, so the collector keeps none.
        let ranker = ClosureRankProgram(|_docid: DocId, _: &MatchData| 0.0);

        let cfg = MatchThreadConfig {
            tid: 0,
            doc_id_limit: 10,
            scheduler: &scheduler,
            communicator: &comm,
            plan: &plan,
            doom: doom(),
            flags: MatchThreadFlags { do_rank: true, do_limit: false, do_share: false, rank_drop_mode: RankDropMode::Track },
            rank_drop_limit: 1.0,
            match_phase_limiter: None,
            sample_hits_per_thread: u32::MAX,
            array_size: 10,
            heap_size: 10,
            first_phase: &ranker,
        };

        let out = run_first_phase(&cfg);
        assert_eq!(out.collector.total_matches(), 0);
        assert_eq!(out.dropped_by_rank, 3);
        assert_eq!(out.docs_matched, 3);
    }
}
