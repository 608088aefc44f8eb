//! Per-thread result produced after the match loop and optional rerank,
//! ready for the dual-merge director (§4.7).

use crate::types::{Hit, ScoreRange};

#[derive(Debug, Clone, Default)]
pub struct PartialResult {
    pub hits: Vec<Hit>,
    pub total_hit_count: u64,
    pub score_range: Option<ScoreRange>,
    /// Lexicographically-comparable sort-spec bytes, one per hit, when the
    /// request asked for explicit sort data instead of rank order.
    pub sort_data: Option<Vec<Vec<u8>>>,
}

impl PartialResult {
    pub fn new(capacity: usize) -> Self {
        PartialResult { hits: Vec::with_capacity(capacity), total_hit_count: 0, score_range: None, sort_data: None }
    }
}
