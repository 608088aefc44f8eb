//! Compiled ranking setup: resolves a rank-profile name to a first/second
//! phase program pair. Ranking-feature evaluation internals are an
//! out-of-scope black box (§1); this is the boundary a real backend plugs
//! a compiled feature executor into.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{MatchError, Result};
use crate::thread::RankProgram;

#[derive(Clone)]
pub struct CompiledRankSetup {
    pub first_phase: Arc<dyn RankProgram>,
    pub second_phase: Option<Arc<dyn RankProgram>>,
    pub soft_timeout_enabled: bool,
    pub soft_timeout_tail_cost: f64,
}

/// Compiles a named rank profile against the feature blueprint factory.
/// Failure is the one construction-time error this crate surfaces as `Err`
/// rather than in-band on a reply (§4.10).
pub trait RankSetupFactory: Send + Sync {
    fn compile(&self, profile: &str) -> Result<CompiledRankSetup>;
}

/// A factory keyed by profile name. Real backends compile profiles once at
/// schema-load time and register the results here; this crate's own tests do
/// the same with trivial programs.
#[derive(Default)]
pub struct StaticRankSetupFactory {
    profiles: HashMap<String, CompiledRankSetup>,
}

impl StaticRankSetupFactory {
    pub fn new() -> Self {
        StaticRankSetupFactory::default()
    }

    pub fn register(&mut self, profile: impl Into<String>, setup: CompiledRankSetup) {
        self.profiles.insert(profile.into(), setup);
    }
}

impl RankSetupFactory for StaticRankSetupFactory {
    fn compile(&self, profile: &str) -> Result<CompiledRankSetup> {
        self.profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| MatchError::RankSetupCompile { profile: profile.to_string(), reason: "no such rank profile registered".into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::MatchData;
    use crate::thread::ClosureRankProgram;
    use crate::types::DocId;

    #[test]
    fn unregistered_profile_fails_to_compile() {
        let factory = StaticRankSetupFactory::new();
        assert!(factory.compile("default").is_err());
    }

    #[test]
    fn registered_profile_compiles() {
        let mut factory = StaticRankSetupFactory::new();
        factory.register(
            "default",
            CompiledRankSetup {
                first_phase: Arc::new(ClosureRankProgram(|docid: DocId, _: &MatchData| docid.value() as f64)),
                second_phase: None,
                soft_timeout_enabled: true,
                soft_timeout_tail_cost: 0.1,
            },
        );
        assert!(factory.compile("default").is_ok());
    }
}
