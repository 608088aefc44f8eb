//! Match-loop communicator (C2): N-party rendezvous points used by the match
//! loop for match-frequency estimation, global top-N selection, and second-phase
//! work distribution / reconciliation.

mod rendezvous;

pub use rendezvous::Rendezvous;

use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::types::{DocId, Hit, ScoreRange};

/// Accepts or rejects a hit during second-phase work selection, e.g. to enforce
/// result diversity over some grouping attribute. An out-of-scope collaborator;
/// specified only by this behavioral contract.
pub trait Diversifier: Send + Sync {
    fn accepted(&self, docid: DocId) -> bool;
}

/// Records the final first-phase rank (1-based position, including rejected
/// positions) of every docid considered for second-phase work.
pub trait FirstPhaseRankLookup: Send + Sync {
    fn add(&self, docid: DocId, rank: u32);
}

/// Per-(search-request) estimate of how many of the first N kept hits were
/// contributed by each candidate thread, and the watermark score of the first
/// hit a diversifier rejected, if any.
#[derive(Debug, Clone, Copy, Default)]
struct BestDropped {
    valid: bool,
    score: f64,
}

/// `{matches_seen, docs_seen}` reported by one thread for frequency estimation.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrequencySample {
    pub hits: u64,
    pub docs: u64,
}

/// A thread's hits in descending `(score, docid)` order, ready for the second-
/// phase-work rendezvous.
pub type SortedHitSequence = Vec<Hit>;

/// A hit tagged with the thread that originally produced it.
pub type TaggedHit = (Hit, usize);

/// `(first_phase_range, second_phase_range)` reported alongside reconciled hits.
pub type RangePair = (ScoreRange, ScoreRange);

struct MergeItem {
    hit: Hit,
    thread: usize,
}

impl PartialEq for MergeItem {
    fn eq(&self, other: &Self) -> bool {
        self.hit == other.hit && self.thread == other.thread
    }
}
impl Eq for MergeItem {}

impl PartialOrd for MergeItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// `Hit::cmp` already orders "best" as the minimum (so `HitCollector` can use a
/// plain `BinaryHeap` as a bounded min-heap, see `result::hit_collector`).
/// Reversing it here gives the merge queue the usual max-heap-of-best-score
/// behavior it needs.
impl Ord for MergeItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.hit.cmp(&self.hit).then_with(|| self.thread.cmp(&other.thread))
    }
}

/// The three rendezvous points the match loop drives, bundled so they can share
/// the running `best_scores` / `best_dropped` watermarks between the second-
/// phase-work and complete-second-phase steps.
pub struct MatchLoopCommunicator {
    num_threads: usize,
    top_n: usize,
    estimate_match_frequency: Rendezvous<FrequencySample, f64>,
    get_second_phase_work: Rendezvous<SortedHitSequence, Vec<TaggedHit>>,
    complete_second_phase: Rendezvous<Vec<TaggedHit>, (Vec<Hit>, RangePair)>,
    best_scores: Mutex<ScoreRange>,
    best_dropped: Mutex<BestDropped>,
    diversifier: Option<Box<dyn Diversifier>>,
    first_phase_rank_lookup: Option<Box<dyn FirstPhaseRankLookup>>,
}

impl MatchLoopCommunicator {
    pub fn new(num_threads: usize, top_n: usize) -> Self {
        Self::with_diversifier(num_threads, top_n, None, None)
    }

    pub fn with_diversifier(
        num_threads: usize,
        top_n: usize,
        diversifier: Option<Box<dyn Diversifier>>,
        first_phase_rank_lookup: Option<Box<dyn FirstPhaseRankLookup>>,
    ) -> Self {
        MatchLoopCommunicator {
            num_threads,
            top_n,
            estimate_match_frequency: Rendezvous::new(num_threads),
            get_second_phase_work: Rendezvous::new(num_threads),
            complete_second_phase: Rendezvous::new(num_threads),
            best_scores: Mutex::new(ScoreRange::default()),
            best_dropped: Mutex::new(BestDropped::default()),
            diversifier,
            first_phase_rank_lookup,
        }
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Rendezvous 1: mean of per-thread `hits/docs`, skipping threads that have
    /// not seen any docs yet.
    pub fn estimate_match_frequency(&self, tid: usize, sample: FrequencySample) -> f64 {
        let n = self.num_threads;
        self.estimate_match_frequency.rendezvous(tid, sample, move |inputs| {
            let sum: f64 = inputs
                .iter()
                .filter(|s| s.docs > 0)
                .map(|s| s.hits as f64 / s.docs as f64)
                .sum();
            let freq = sum / n as f64;
            vec![freq; n]
        })
    }

    /// Rendezvous 2: merge per-thread descending-score sequences, round-robin
    /// assign the global top `top_n` to rerank buckets, tagged with origin thread.
    pub fn get_second_phase_work(&self, tid: usize, sorted_hits: SortedHitSequence) -> Vec<TaggedHit> {
        let n = self.num_threads;
        let top_n = self.top_n;
        let best_scores = &self.best_scores;
        let best_dropped = &self.best_dropped;
        let diversifier = self.diversifier.as_deref();
        let rank_lookup = self.first_phase_rank_lookup.as_deref();

        self.get_second_phase_work.rendezvous(tid, sorted_hits, move |inputs| {
            *best_scores.lock() = ScoreRange::default();
            best_dropped.lock().valid = false;

            let mut heap: BinaryHeap<MergeItem> = BinaryHeap::new();
            let mut positions = vec![0usize; n];
            for (i, seq) in inputs.iter().enumerate() {
                if !seq.is_empty() {
                    heap.push(MergeItem { hit: seq[0], thread: i });
                }
            }

            let mut out: Vec<Vec<TaggedHit>> = vec![Vec::with_capacity(top_n / n.max(1) + 1); n];
            let mut picked = 0usize;
            let mut last_score = 0.0;
            let mut rank = 0u32;

            while picked < top_n {
                let Some(MergeItem { hit, thread }) = heap.pop() else { break };

                let accepted = diversifier.map(|d| d.accepted(hit.docid)).unwrap_or(true);
                if accepted {
                    rank += 1;
                    if let Some(lookup) = rank_lookup {
                        lookup.add(hit.docid, rank);
                    }
                    out[picked % n].push((hit, thread));
                    last_score = hit.score;
                    picked += 1;
                    if picked == 1 {
                        best_scores.lock().high = hit.score;
                    }
                } else {
                    rank += 1;
                    let mut dropped = best_dropped.lock();
                    if !dropped.valid {
                        dropped.valid = true;
                        dropped.score = hit.score;
                    }
                }

                positions[thread] += 1;
                if let Some(next_hit) = inputs[thread].get(positions[thread]) {
                    heap.push(MergeItem { hit: *next_hit, thread });
                }
            }
            if picked > 0 {
                best_scores.lock().low = last_score;
            }
            out
        })
    }

    /// Rendezvous 3: route reranked `{hit, origin_tag}` pairs back to their
    /// origin thread, and compute the reconciled `(first_phase, second_phase)`
    /// score range pair shared by all threads.
    pub fn complete_second_phase(&self, tid: usize, my_results: Vec<TaggedHit>) -> (Vec<Hit>, RangePair) {
        let n = self.num_threads;
        let best_scores = *self.best_scores.lock();
        let best_dropped = *self.best_dropped.lock();

        self.complete_second_phase.rendezvous(tid, my_results, move |inputs| {
            let mut out: Vec<Vec<Hit>> = vec![Vec::new(); n];
            let mut new_scores = ScoreRange { high: f64::NEG_INFINITY, low: f64::INFINITY };
            let mut any = false;
            for per_thread in &inputs {
                for (hit, tag) in per_thread {
                    out[*tag].push(*hit);
                    any = true;
                    new_scores.high = new_scores.high.max(hit.score);
                    new_scores.low = new_scores.low.min(hit.score);
                }
            }
            let mut first_range = best_scores;
            if any && best_dropped.valid {
                first_range.low = first_range.low.max(best_dropped.score);
            }
            let range_pair = (first_range, if any { new_scores } else { ScoreRange::default() });
            out.into_iter().map(|hits| (hits, range_pair)).collect()
        })
    }
}
