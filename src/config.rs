use std::collections::HashMap;

use crate::limiter::DiversityCutoffStrategy;
use crate::thread::RankDropMode;

/// Process-wide defaults for a `Matcher`. Per-request overrides come from the
/// rank-properties bag via [`MatchConfig::from_properties`].
#[derive(Debug, Clone)]
pub struct MatcherDefaults {
    pub num_threads_per_search: usize,
    pub min_hits_per_thread: u32,
    pub heap_size: usize,
    pub array_size: usize,
    pub soft_timeout_enabled: bool,
    pub soft_timeout_factor: f64,
    pub soft_timeout_tail_cost: f64,
    pub query_limiter_max_threads: i32,
    pub query_limiter_min_hits: u32,
    pub query_limiter_coverage: f64,
}

impl Default for MatcherDefaults {
    fn default() -> Self {
        MatcherDefaults {
            num_threads_per_search: num_cpus::get().max(1),
            min_hits_per_thread: 10,
            heap_size: 100,
            array_size: 100,
            soft_timeout_enabled: true,
            soft_timeout_factor: 0.5,
            soft_timeout_tail_cost: 0.1,
            query_limiter_max_threads: i32::MAX,
            query_limiter_min_hits: 1000,
            query_limiter_coverage: 1.0,
        }
    }
}

/// Degradation knobs recognized under `vespa.matchphase.*`.
#[derive(Debug, Clone, Default)]
pub struct MatchPhaseConfig {
    pub attribute: Option<String>,
    pub max_hits: u64,
    pub descending: bool,
    pub max_filter_coverage: f64,
    pub sample_percentage: f64,
    pub post_filter_multiplier: f64,
    pub diversity_attribute: Option<String>,
    pub diversity_min_groups: u32,
    pub diversity_cutoff_factor: f64,
    pub diversity_cutoff_strategy: DiversityCutoffStrategy,
}

impl MatchPhaseConfig {
    pub fn enabled(&self) -> bool {
        self.attribute.is_some() && self.max_hits > 0
    }

    pub fn diversity_enabled(&self) -> bool {
        self.diversity_attribute.is_some() && self.diversity_min_groups > 0
    }
}

/// A fully-resolved per-request configuration, built once from the rank-properties
/// bag rather than re-parsed per thread. Unrecognized keys are ignored; recognized
/// keys with unparsable values fall back to the process default and are logged.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    pub num_threads_per_search: Option<usize>,
    pub min_hits_per_thread: u32,
    pub num_search_partitions: Option<u32>,
    pub termwise_limit: f64,
    pub match_phase: MatchPhaseConfig,
    pub heap_size: usize,
    pub array_size: usize,
    pub soft_timeout_enabled: bool,
    pub soft_timeout_factor: Option<f64>,
    pub soft_timeout_tail_cost: f64,
    /// Unset (`NaN` in the reference matcher) disables rank-drop entirely.
    pub rank_drop_limit: Option<f64>,
    /// Whether dropped docids are still counted (`Track`) or simply discarded
    /// (`Yes`) once `rank_drop_limit` is set.
    pub rank_drop_track: bool,
}

impl MatchConfig {
    pub fn from_properties(props: &HashMap<String, String>, defaults: &MatcherDefaults) -> Self {
        let get = |key: &str| props.get(key).map(|s| s.as_str());
        let parse_f64 = |key: &str, default: f64| {
            get(key).and_then(|v| v.parse::<f64>().ok()).unwrap_or(default)
        };
        let parse_u64 = |key: &str, default: u64| {
            get(key).and_then(|v| v.parse::<u64>().ok()).unwrap_or(default)
        };
        let parse_u32 = |key: &str, default: u32| {
            get(key).and_then(|v| v.parse::<u32>().ok()).unwrap_or(default)
        };

        MatchConfig {
            num_threads_per_search: get("vespa.matching.numthreadspersearch")
                .and_then(|v| v.parse::<usize>().ok()),
            min_hits_per_thread: parse_u32(
                "vespa.matching.minhitsperthread",
                defaults.min_hits_per_thread,
            ),
            num_search_partitions: get("vespa.matching.numsearchpartitions")
                .and_then(|v| v.parse::<u32>().ok()),
            termwise_limit: parse_f64("vespa.matching.termwise_limit", 1.0),
            match_phase: MatchPhaseConfig {
                attribute: get("vespa.matchphase.degradation.attribute").map(String::from),
                max_hits: parse_u64("vespa.matchphase.degradation.maxhits", 0),
                descending: get("vespa.matchphase.degradation.descending")
                    .map(|v| v == "true")
                    .unwrap_or(true),
                max_filter_coverage: parse_f64("vespa.matchphase.degradation.maxfiltercoverage", 0.2),
                sample_percentage: parse_f64("vespa.matchphase.degradation.samplepercentage", 0.2),
                post_filter_multiplier: parse_f64(
                    "vespa.matchphase.degradation.postfiltermultiplier",
                    1.0,
                ),
                diversity_attribute: get("vespa.matchphase.diversity.attribute").map(String::from),
                diversity_min_groups: parse_u32("vespa.matchphase.diversity.mingroups", 1),
                diversity_cutoff_factor: parse_f64("vespa.matchphase.diversity.cutofffactor", 10.0),
                diversity_cutoff_strategy: match get("vespa.matchphase.diversity.cutoffstrategy") {
                    Some("strict") => DiversityCutoffStrategy::Strict,
                    _ => DiversityCutoffStrategy::Loose,
                },
            },
            heap_size: get("vespa.hitcollector.heapsize")
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(defaults.heap_size),
            array_size: get("vespa.hitcollector.arraysize")
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(defaults.array_size),
            soft_timeout_enabled: get("vespa.softtimeout.enabled")
                .map(|v| v == "true")
                .unwrap_or(defaults.soft_timeout_enabled),
            soft_timeout_factor: get("vespa.softtimeout.factor").and_then(|v| v.parse::<f64>().ok()),
            soft_timeout_tail_cost: parse_f64(
                "vespa.softtimeout.tailcost",
                defaults.soft_timeout_tail_cost,
            ),
            rank_drop_limit: get("vespa.matching.rankdroplimit")
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|limit| !limit.is_nan()),
            rank_drop_track: get("vespa.matching.rankdroplimittrack").map(|v| v == "true").unwrap_or(false),
        }
    }

    /// `true` when the caller supplied an explicit soft-timeout factor, which
    /// disables adaptive adjustment for this request (see §4.10).
    pub fn has_explicit_soft_timeout_factor(&self) -> bool {
        self.soft_timeout_factor.is_some()
    }

    /// §4.8's `use_rank_drop_limit`: disabled unless a limit was configured,
    /// then either just discarding dropped docids or also counting them.
    pub fn rank_drop_mode(&self) -> RankDropMode {
        match self.rank_drop_limit {
            Some(_) if self.rank_drop_track => RankDropMode::Track,
            Some(_) => RankDropMode::Yes,
            None => RankDropMode::No,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_properties_fall_back_to_defaults() {
        let props = HashMap::new();
        let defaults = MatcherDefaults::default();
        let cfg = MatchConfig::from_properties(&props, &defaults);
        assert_eq!(cfg.heap_size, defaults.heap_size);
        assert!(!cfg.match_phase.enabled());
        assert!(!cfg.has_explicit_soft_timeout_factor());
    }

    #[test]
    fn parses_match_phase_properties() {
        let mut props = HashMap::new();
        props.insert("vespa.matchphase.degradation.attribute".to_string(), "price".to_string());
        props.insert("vespa.matchphase.degradation.maxhits".to_string(), "1000".to_string());
        let defaults = MatcherDefaults::default();
        let cfg = MatchConfig::from_properties(&props, &defaults);
        assert!(cfg.match_phase.enabled());
        assert_eq!(cfg.match_phase.max_hits, 1000);
    }

    #[test]
    fn rank_drop_mode_is_no_without_a_configured_limit() {
        let cfg = MatchConfig::from_properties(&HashMap::new(), &MatcherDefaults::default());
        assert_eq!(cfg.rank_drop_mode(), RankDropMode::No);
    }

    #[test]
    fn rank_drop_mode_is_yes_or_track_depending_on_the_track_flag() {
        let mut props = HashMap::new();
        props.insert("vespa.matching.rankdroplimit".to_string(), "0.2".to_string());
        let defaults = MatcherDefaults::default();

        let cfg = MatchConfig::from_properties(&props, &defaults);
        assert_eq!(cfg.rank_drop_limit, Some(0.2));
        assert_eq!(cfg.rank_drop_mode(), RankDropMode::Yes);

        props.insert("vespa.matching.rankdroplimittrack".to_string(), "true".to_string());
        let cfg = MatchConfig::from_properties(&props, &defaults);
        assert_eq!(cfg.rank_drop_mode(), RankDropMode::Track);
    }
}
