//! Match-phase limiter (C6): decides, mid-match, whether to cut the live
//! iterator down to an attribute-ordered subset, and composes the result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::MatchPhaseConfig;
use crate::plan::{MatchData, SearchIterator, Searchable};
use crate::types::DocId;

use super::attribute_limiter::{AttributeLimiter, DiversityParams, LimiterParams};
use super::calculator::MatchPhaseLimitCalculator;

pub enum LimiterDecision {
    NoLimit,
    Limit { pre_filter: bool, wanted: u64, max_group_size: u64 },
}

/// `AND`-composition of the limiter's attribute-ordered iterator and the
/// original live iterator. `unpack` only ever delegates to `live`: the limiter
/// side is a synthetic range term with no real match-data handles.
pub struct LimitedSearch {
    limiter: Box<dyn SearchIterator>,
    live: Box<dyn SearchIterator>,
    end: DocId,
}

impl LimitedSearch {
    pub fn new(limiter: Box<dyn SearchIterator>, live: Box<dyn SearchIterator>) -> Self {
        LimitedSearch { limiter, live, end: DocId::new(0) }
    }
}

impl SearchIterator for LimitedSearch {
    fn init_range(&mut self, begin: DocId, end: DocId) {
        self.end = end;
        self.limiter.init_range(begin, end);
        self.live.init_range(begin, end);
    }

    fn seek(&mut self, docid: DocId) -> DocId {
        let mut candidate = docid;
        loop {
            let a = self.limiter.seek(candidate);
            let b = self.live.seek(candidate);
            if a.value() >= self.end.value() || b.value() >= self.end.value() {
                return self.end;
            }
            if a == b {
                return a;
            }
            candidate = DocId::new(a.value().max(b.value()));
        }
    }

    fn unpack(&mut self, docid: DocId, match_data: &mut MatchData) {
        self.live.unpack(docid, match_data);
    }
}

pub struct MatchPhaseLimiter {
    enabled: bool,
    max_hits: u64,
    max_filter_coverage: f64,
    post_filter_multiplier: f64,
    diversity_min_groups: u32,
    diversity: Option<DiversityParams>,
    attribute: String,
    descending: bool,
    attribute_limiter: AttributeLimiter,
    limited: AtomicBool,
}

impl MatchPhaseLimiter {
    pub fn new(config: &MatchPhaseConfig, searchable: Arc<dyn Searchable>, doc_id_limit: u32) -> Self {
        let diversity = config.diversity_attribute.clone().map(|attribute| DiversityParams {
            attribute,
            max_group_size: 0, // filled in per-decision from `wanted`/min_groups
            cutoff_factor: config.diversity_cutoff_factor,
            cutoff_strategy: config.diversity_cutoff_strategy,
        });
        MatchPhaseLimiter {
            enabled: config.enabled(),
            max_hits: config.max_hits,
            max_filter_coverage: config.max_filter_coverage,
            post_filter_multiplier: config.post_filter_multiplier,
            diversity_min_groups: config.diversity_min_groups,
            diversity,
            attribute: config.attribute.clone().unwrap_or_default(),
            descending: config.descending,
            attribute_limiter: AttributeLimiter::new(searchable, doc_id_limit),
            limited: AtomicBool::new(false),
        }
    }

    pub fn disabled(searchable: Arc<dyn Searchable>, doc_id_limit: u32) -> Self {
        MatchPhaseLimiter {
            enabled: false,
            max_hits: 0,
            max_filter_coverage: 0.0,
            post_filter_multiplier: 1.0,
            diversity_min_groups: 1,
            diversity: None,
            attribute: String::new(),
            descending: false,
            attribute_limiter: AttributeLimiter::new(searchable, doc_id_limit),
            limited: AtomicBool::new(false),
        }
    }

    pub fn decide(&self, hit_rate: f64, doc_id_limit: u32) -> LimiterDecision {
        if !self.enabled {
            return LimiterDecision::NoLimit;
        }
        let wanted = MatchPhaseLimitCalculator::wanted(self.max_hits, hit_rate);
        if !MatchPhaseLimitCalculator::should_limit(doc_id_limit as u64, self.max_filter_coverage, wanted) {
            return LimiterDecision::NoLimit;
        }
        let estimated_hits = hit_rate * doc_id_limit as f64;
        let max_group_size = MatchPhaseLimitCalculator::max_group_size(wanted, self.diversity_min_groups);
        let pre_filter = MatchPhaseLimitCalculator::prefer_pre_filter(wanted, estimated_hits, self.post_filter_multiplier);
        self.limited.store(true, Ordering::Relaxed);
        LimiterDecision::Limit { pre_filter, wanted, max_group_size }
    }

    pub fn was_limited(&self) -> bool {
        self.limited.load(Ordering::Relaxed)
    }

    /// Builds the limiter's iterator and composes it with `live` per `decision`.
    pub fn compose(&self, decision: &LimiterDecision, live: Box<dyn SearchIterator>, match_data: &mut MatchData) -> Box<dyn SearchIterator> {
        let (pre_filter, wanted, max_group_size) = match decision {
            LimiterDecision::NoLimit => return live,
            LimiterDecision::Limit { pre_filter, wanted, max_group_size } => (*pre_filter, *wanted, *max_group_size),
        };
        let diversity = self.diversity.clone().map(|mut d| {
            d.max_group_size = max_group_size;
            d
        });
        let params = LimiterParams {
            attribute: self.attribute.clone(),
            low: f64::NEG_INFINITY,
            high: f64::INFINITY,
            descending: self.descending,
            want_hits: wanted,
            strict: pre_filter,
            diversity,
        };
        let limiter_it = self.attribute_limiter.create_iterator(&params, match_data);
        if pre_filter {
            Box::new(LimitedSearch::new(limiter_it, live))
        } else {
            Box::new(LimitedSearch::new(live, limiter_it))
        }
    }

    pub fn estimated_hits(&self) -> Option<u64> {
        self.attribute_limiter.estimated_hits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchPhaseConfig;
    use crate::plan::FakeSearchable;

    fn enabled_config() -> MatchPhaseConfig {
        MatchPhaseConfig {
            attribute: Some("price".into()),
            max_hits: 1000,
            descending: true,
            max_filter_coverage: 0.2,
            sample_percentage: 0.2,
            post_filter_multiplier: 1.0,
            diversity_attribute: None,
            diversity_min_groups: 1,
            diversity_cutoff_factor: 10.0,
            diversity_cutoff_strategy: Default::default(),
        }
    }

    #[test]
    fn no_limit_when_upper_bound_under_wanted() {
        let cfg = enabled_config();
        let fake = Arc::new(FakeSearchable::new());
        let limiter = MatchPhaseLimiter::new(&cfg, fake, 1_000);
        match limiter.decide(0.5, 1_000) {
            LimiterDecision::NoLimit => {}
            _ => panic!("expected no limit on a tiny corpus"),
        }
        assert!(!limiter.was_limited());
    }

    #[test]
    fn limits_a_large_low_selectivity_corpus() {
        let cfg = enabled_config();
        let fake = Arc::new(FakeSearchable::new());
        let limiter = MatchPhaseLimiter::new(&cfg, fake, 1_000_000);
        match limiter.decide(0.5, 1_000_000) {
            LimiterDecision::Limit { pre_filter, wanted, .. } => {
                assert_eq!(wanted, 2000);
                assert!(pre_filter);
            }
            LimiterDecision::NoLimit => panic!("expected a limit decision"),
        }
        assert!(limiter.was_limited());
    }

    #[test]
    fn disabled_limiter_never_limits() {
        let fake = Arc::new(FakeSearchable::new());
        let limiter = MatchPhaseLimiter::disabled(fake, 1_000_000);
        match limiter.decide(0.0001, 1_000_000) {
            LimiterDecision::NoLimit => {}
            _ => panic!("disabled limiter must never limit"),
        }
    }
}
