//! Dual-merge director (C7): sequences per-thread `PartialResult`s into one
//! final result, either by rank order or by an explicit sort spec.

use crate::types::{Hit, ScoreRange};

use super::hit_collector::rank_order_cmp;
use super::partial_result::PartialResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOrder {
    /// Score descending, docid ascending on ties.
    Rank,
    /// Sort-spec bytes ascending, docid ascending on ties.
    SortSpec,
}

/// One entry per surviving hit, carrying whatever sort-spec bytes its source
/// thread attached (empty when the request used rank order).
struct MergeEntry {
    hit: Hit,
    sort_key: Vec<u8>,
}

pub struct ResultProcessor;

impl ResultProcessor {
    /// Merges all per-thread partials, truncating to `[offset, offset + max_hits)`.
    pub fn merge(partials: &[PartialResult], order: MergeOrder, offset: usize, max_hits: usize) -> PartialResult {
        let mut entries: Vec<MergeEntry> = Vec::new();
        for p in partials {
            for (i, hit) in p.hits.iter().enumerate() {
                let sort_key = p.sort_data.as_ref().and_then(|sd| sd.get(i)).cloned().unwrap_or_default();
                entries.push(MergeEntry { hit: *hit, sort_key });
            }
        }

        match order {
            MergeOrder::Rank => entries.sort_by(|a, b| rank_order_cmp(&a.hit, &b.hit)),
            MergeOrder::SortSpec => entries.sort_by(|a, b| a.sort_key.cmp(&b.sort_key).then_with(|| a.hit.docid.cmp(&b.hit.docid))),
        }

        let total_hit_count = partials.iter().map(|p| p.total_hit_count).sum();
        let score_range = merge_score_ranges(partials);
        let has_sort_data = partials.iter().any(|p| p.sort_data.is_some());

        let selected: Vec<MergeEntry> = entries.into_iter().skip(offset).take(max_hits).collect();
        let hits = selected.iter().map(|e| e.hit).collect();
        let sort_data = has_sort_data.then(|| selected.iter().map(|e| e.sort_key.clone()).collect());

        PartialResult { hits, total_hit_count, score_range, sort_data }
    }
}

fn merge_score_ranges(partials: &[PartialResult]) -> Option<ScoreRange> {
    partials.iter().filter_map(|p| p.score_range).reduce(|a, b| ScoreRange { high: a.high.max(b.high), low: a.low.min(b.low) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocId;

    fn hit(docid: u32, score: f64) -> Hit {
        Hit { docid: DocId::new(docid), score }
    }

    #[test]
    fn merges_in_rank_order_across_threads() {
        let p1 = PartialResult { hits: vec![hit(1, 3.0), hit(2, 9.0)], total_hit_count: 2, score_range: None, sort_data: None };
        let p2 = PartialResult { hits: vec![hit(3, 7.0)], total_hit_count: 1, score_range: None, sort_data: None };
        let merged = ResultProcessor::merge(&[p1, p2], MergeOrder::Rank, 0, 10);
        let docids: Vec<u32> = merged.hits.iter().map(|h| h.docid.value()).collect();
        assert_eq!(docids, vec![2, 3, 1]);
        assert_eq!(merged.total_hit_count, 3);
    }

    #[test]
    fn respects_offset_and_max_hits() {
        let p1 = PartialResult { hits: vec![hit(1, 3.0), hit(2, 9.0), hit(3, 7.0)], total_hit_count: 3, score_range: None, sort_data: None };
        let merged = ResultProcessor::merge(&[p1], MergeOrder::Rank, 1, 1);
        assert_eq!(merged.hits.len(), 1);
        assert_eq!(merged.hits[0].docid.value(), 3);
    }
}
