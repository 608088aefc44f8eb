//! Attribute limiter (C5): a shared, lazily-built plan node over an ordered
//! attribute that returns at most `want_hits` docids, with optional diversity.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::plan::{MatchData, PlanNode, SearchIterator, Searchable};
use crate::types::Handle;

use super::range_spec::{DiversityCutoffStrategy, DiversitySpec, RangeSpec};

#[derive(Debug, Clone)]
pub struct DiversityParams {
    pub attribute: String,
    pub max_group_size: u64,
    pub cutoff_factor: f64,
    pub cutoff_strategy: DiversityCutoffStrategy,
}

#[derive(Debug, Clone)]
pub struct LimiterParams {
    pub attribute: String,
    pub low: f64,
    pub high: f64,
    pub descending: bool,
    pub want_hits: u64,
    pub strict: bool,
    pub diversity: Option<DiversityParams>,
}

impl LimiterParams {
    fn range_spec(&self) -> RangeSpec {
        let diversity = self.diversity.as_ref().filter(|d| d.max_group_size < self.want_hits).map(|d| {
            let cutoff_groups = super::calculator::MatchPhaseLimitCalculator::cutoff_groups(
                d.cutoff_factor,
                self.want_hits,
                d.max_group_size,
            );
            DiversitySpec {
                attribute: d.attribute.clone(),
                max_group_size: d.max_group_size,
                cutoff_groups,
                strategy: d.cutoff_strategy,
            }
        });
        RangeSpec { low: self.low, high: self.high, descending: self.descending, want_hits: self.want_hits, diversity }
    }
}

/// First caller builds and freezes the plan (serialized on the mutex); every
/// caller after that — including the first — gets a fresh per-thread iterator
/// over the same frozen node.
pub struct AttributeLimiter {
    searchable: Arc<dyn Searchable>,
    doc_id_limit: u32,
    built: Mutex<Option<Arc<PlanNode>>>,
}

impl AttributeLimiter {
    pub fn new(searchable: Arc<dyn Searchable>, doc_id_limit: u32) -> Self {
        AttributeLimiter { searchable, doc_id_limit, built: Mutex::new(None) }
    }

    fn build_or_reuse(&self, params: &LimiterParams) -> Arc<PlanNode> {
        let mut guard = self.built.lock();
        if let Some(node) = guard.as_ref() {
            return node.clone();
        }
        let repr = params.range_spec().to_string();
        let estimate = self.searchable.estimate_hits(&params.attribute, &repr);
        let mut node = PlanNode::term(params.attribute.clone(), repr, Handle(0), self.searchable.clone(), estimate, self.doc_id_limit);
        node.freeze();
        node.fetch_postings(params.strict);
        let node = Arc::new(node);
        *guard = Some(node.clone());
        node
    }

    pub fn create_iterator(&self, params: &LimiterParams, match_data: &mut MatchData) -> Box<dyn SearchIterator> {
        let node = self.build_or_reuse(params);
        node.create_search(match_data, params.strict)
    }

    pub fn estimated_hits(&self) -> Option<u64> {
        self.built.lock().as_ref().map(|n| n.estimate.hits)
    }
}
