//! Pure arithmetic for the match-phase limit decision (§4.6). No state, no I/O.

const LOWER_BOUND_HITS: f64 = 128.0;
const UPPER_BOUND_HITS: f64 = i32::MAX as f64;

pub struct MatchPhaseLimitCalculator;

impl MatchPhaseLimitCalculator {
    /// `clamp(128, max_hits / hit_rate, 2^31 - 1)`.
    pub fn wanted(max_hits: u64, hit_rate: f64) -> u64 {
        let raw = if hit_rate > 0.0 { max_hits as f64 / hit_rate } else { UPPER_BOUND_HITS };
        raw.clamp(LOWER_BOUND_HITS, UPPER_BOUND_HITS) as u64
    }

    /// `upper = min(num_docs, num_docs * max_filter_coverage)`; limit iff `upper > wanted`.
    pub fn should_limit(num_docs: u64, max_filter_coverage: f64, wanted: u64) -> bool {
        let cap = (num_docs as f64 * max_filter_coverage) as u64;
        let upper = num_docs.min(cap);
        upper > wanted
    }

    pub fn max_group_size(wanted: u64, min_groups: u32) -> u64 {
        wanted / min_groups.max(1) as u64
    }

    /// Pre-filter iff `wanted < estimated_hits * post_filter_multiplier`.
    pub fn prefer_pre_filter(wanted: u64, estimated_hits: f64, post_filter_multiplier: f64) -> bool {
        (wanted as f64) < estimated_hits * post_filter_multiplier
    }

    pub fn cutoff_groups(cutoff_factor: f64, want_hits: u64, max_group_size: u64) -> u64 {
        ((cutoff_factor * want_hits as f64) / max_group_size.max(1) as f64).floor() as u64
    }
}

/// Running coverage accounting across `(searched, remaining, estimated_hits)`
/// observations reported by match-phase-limited threads.
#[derive(Debug, Default)]
pub struct CoverageAccumulator {
    searched_total: f64,
}

impl CoverageAccumulator {
    pub fn new() -> Self {
        CoverageAccumulator::default()
    }

    /// With an estimate: `searched + hits*remaining/doc_id_limit`. Without one,
    /// treats the remainder as fully covered for accounting purposes.
    pub fn observe(&mut self, searched: u64, remaining: u64, doc_id_limit: u32, estimated_hits: Option<u64>) {
        self.searched_total += match estimated_hits {
            Some(hits) => searched as f64 + (hits as f64 * remaining as f64) / doc_id_limit.max(1) as f64,
            None => (searched + remaining) as f64,
        };
    }

    pub fn searched_total(&self) -> f64 {
        self.searched_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wanted_is_clamped() {
        assert_eq!(MatchPhaseLimitCalculator::wanted(1000, 0.5), 2000);
        assert_eq!(MatchPhaseLimitCalculator::wanted(1, 0.9999999), 128);
    }

    #[test]
    fn should_limit_when_upper_exceeds_wanted() {
        assert!(MatchPhaseLimitCalculator::should_limit(1_000_000, 0.2, 2_000));
        assert!(!MatchPhaseLimitCalculator::should_limit(1_000, 0.2, 2_000));
    }

    #[test]
    fn coverage_accumulator_uses_estimate_when_available() {
        let mut cov = CoverageAccumulator::new();
        cov.observe(100, 900, 1000, Some(500));
        assert_eq!(cov.searched_total(), 100.0 + (500.0 * 900.0) / 1000.0);
        cov.observe(10, 20, 1000, None);
        assert_eq!(cov.searched_total(), 100.0 + 450.0 + 30.0);
    }
}
