//! Per-thread hit collector (C7): an unsorted array up to `array_size`, then a
//! bounded min-heap up to `heap_size`, with a bit-vector for everything that
//! overflows both (§4.7).

use std::cmp::Ordering;

use roaring::RoaringBitmap;
use std::collections::BinaryHeap;

use crate::types::Hit;

/// Rank order: highest score first, docid ascending to break ties. `Hit`'s own
/// `Ord` is reversed (for heap eviction, see below) so sorting for output must
/// use this explicit comparator instead.
pub fn rank_order_cmp(a: &Hit, b: &Hit) -> Ordering {
    b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then_with(|| a.docid.cmp(&b.docid))
}

pub struct HitCollector {
    array_size: usize,
    heap_size: usize,
    array: Vec<Hit>,
    /// Bounded at `heap_size`; `Hit::Ord` is reversed so `peek()` surfaces the
    /// lowest-scoring kept hit, the one a new higher-scoring hit should evict.
    heap: BinaryHeap<Hit>,
    overflow: RoaringBitmap,
    total_matches: u64,
}

impl HitCollector {
    pub fn new(array_size: usize, heap_size: usize) -> Self {
        HitCollector { array_size, heap_size, array: Vec::new(), heap: BinaryHeap::new(), overflow: RoaringBitmap::new(), total_matches: 0 }
    }

    pub fn add(&mut self, hit: Hit) {
        self.total_matches += 1;
        if self.array.len() < self.array_size {
            self.array.push(hit);
            return;
        }
        if self.heap.len() < self.heap_size {
            self.heap.push(hit);
            return;
        }
        let should_evict = self.heap.peek().map(|min| hit.score > min.score).unwrap_or(false);
        if should_evict {
            self.heap.pop();
            self.heap.push(hit);
        } else {
            self.overflow.insert(hit.docid.value());
        }
    }

    pub fn total_matches(&self) -> u64 {
        self.total_matches
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow.len()
    }

    /// All kept hits (array + heap), in rank order. Used both for final output
    /// and to extract the sorted sequence handed to second-phase rerank.
    pub fn sorted_hits(&self) -> Vec<Hit> {
        let mut all: Vec<Hit> = self.array.iter().copied().chain(self.heap.iter().copied()).collect();
        all.sort_by(rank_order_cmp);
        all
    }

    /// The prefix to send for second-phase rerank: `array_size` entries for a
    /// diversified (pre-sorted-by-group) collection, `heap_size` otherwise —
    /// here we always have both tiers merged, so this just bounds the prefix.
    pub fn rerank_candidates(&self, limit: usize) -> Vec<Hit> {
        let mut sorted = self.sorted_hits();
        sorted.truncate(limit);
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocId;

    fn hit(docid: u32, score: f64) -> Hit {
        Hit { docid: DocId::new(docid), score }
    }

    #[test]
    fn keeps_the_highest_scoring_hits_once_over_capacity() {
        let mut c = HitCollector::new(1, 2);
        c.add(hit(1, 1.0));
        c.add(hit(2, 5.0));
        c.add(hit(3, 3.0));
        c.add(hit(4, 9.0));
        assert_eq!(c.total_matches(), 4);
        let sorted = c.sorted_hits();
        let scores: Vec<f64> = sorted.iter().map(|h| h.score).collect();
        assert_eq!(scores, vec![9.0, 5.0]);
        assert_eq!(c.overflow_count(), 1);
    }

    #[test]
    fn sorted_hits_are_in_rank_order() {
        let mut c = HitCollector::new(10, 10);
        c.add(hit(1, 3.0));
        c.add(hit(2, 5.0));
        c.add(hit(3, 5.0));
        let sorted = c.sorted_hits();
        assert_eq!(sorted[0].docid.value(), 2);
        assert_eq!(sorted[1].docid.value(), 3);
        assert_eq!(sorted[2].docid.value(), 1);
    }
}
